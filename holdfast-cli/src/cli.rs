use crate::project_info::{metadata, version_info};
use clap::{Args, Parser, Subcommand};
use client_core::constants::env;
use client_core::preset::Frequency;
use std::path::PathBuf;

/// 预设字段选项，create 和 edit 共用
#[derive(Args, Debug, Default, Clone, PartialEq)]
pub struct PresetOptions {
    /// 备份频率：manual, hourly, daily, weekly, monthly
    #[arg(long)]
    pub frequency: Option<Frequency>,

    /// 执行时间，格式 HH:MM
    #[arg(long)]
    pub time: Option<String>,

    /// 执行日期：每周为星期名称（如 Sunday），每月为日期数字
    #[arg(long)]
    pub day: Option<String>,

    /// 备份源目录（可重复），指定后替换原有列表
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// 排除路径（可重复），指定后替换原有列表
    #[arg(long = "exclude")]
    pub exclusions: Vec<String>,

    /// 包含的扩展名规则，例如 "*.pdf"（可重复）
    #[arg(long = "include-ext")]
    pub include_ext: Vec<String>,

    /// 排除的扩展名规则，例如 "*.tmp"（可重复）
    #[arg(long = "exclude-ext")]
    pub exclude_ext: Vec<String>,

    /// 仅包含模式：只备份匹配包含规则的文件
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub include_only: Option<bool>,

    /// 暂停计划任务
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub paused: Option<bool>,
}

/// 预设管理命令
#[derive(Subcommand, Debug)]
pub enum PresetCommand {
    /// 列出所有预设
    List,
    /// 显示预设详情
    Show {
        /// 预设 ID 或名称
        preset: String,
    },
    /// 创建新预设
    Create {
        /// 预设名称
        name: String,
        #[command(flatten)]
        options: PresetOptions,
    },
    /// 修改预设
    Edit {
        /// 预设 ID 或名称
        preset: String,
        /// 新名称
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        options: PresetOptions,
    },
    /// 删除预设并停用其计划任务
    Delete {
        /// 预设 ID 或名称
        preset: String,
    },
    /// 输出预设生成的模式文件内容
    Patterns {
        /// 预设 ID 或名称
        preset: String,
    },
    /// 把计划任务同步到系统（不指定时同步全部预设）
    Sync {
        /// 预设 ID 或名称
        preset: Option<String>,
    },
}

/// 备份执行命令
#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// 立即执行一次备份，Ctrl-C 取消
    Run {
        /// 预设 ID 或名称
        preset: String,
    },
    /// 列出服务器上的备份归档
    Archives,
    /// 列出归档中的文件
    Files {
        /// 归档名称
        archive: String,
    },
    /// 恢复归档：指定 --to 时下载保存，否则恢复到原位置。Ctrl-C 取消
    Restore {
        /// 归档名称
        archive: String,
        /// 归档保存路径
        #[arg(long)]
        to: Option<PathBuf>,
        /// 原位恢复时不再确认
        #[arg(long, short)]
        yes: bool,
    },
    /// 查看备份历史
    History {
        /// 备份记录 ID，指定时列出该次备份的文件
        id: Option<String>,
        /// 只显示最近一次备份的统计
        #[arg(long, conflicts_with = "id")]
        latest: bool,
        /// 按路径筛选文件（不区分大小写）
        #[arg(long, requires = "id")]
        filter: Option<String>,
        /// 按状态筛选文件：A 新增, M 修改, D 删除, E 错误
        #[arg(long, requires = "id")]
        status: Option<char>,
    },
}

/// 应用配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示当前配置
    Show,
    /// 修改配置项，例如 `network.upload_rate 512`
    Set {
        /// 点分键名
        key: String,
        /// 新值
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// 显示配置目录
    Path,
}

/// HoldFast CLI - 桌面备份客户端
#[derive(Parser)]
#[command(name = "holdfast")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置目录，默认为系统配置目录下的 holdfast
    #[arg(long, global = true, env = env::CONFIG_DIR)]
    pub config_dir: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 登录（或注册）并开通备份环境
    Login {
        /// 用户名
        username: String,
        /// 密码，未提供时从标准输入读取
        #[arg(long, env = env::PASSWORD, hide_env_values = true)]
        password: Option<String>,
        /// 注册新账号
        #[arg(long)]
        register: bool,
    },
    /// 退出登录，清除缓存的会话身份
    Logout,
    /// 备份预设管理
    #[command(subcommand)]
    Preset(PresetCommand),
    /// 备份执行
    #[command(subcommand)]
    Backup(BackupCommand),
    /// 应用配置
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_preset_create_options() {
        let cli = Cli::try_parse_from([
            "holdfast",
            "preset",
            "create",
            "Docs",
            "--frequency",
            "weekly",
            "--day",
            "Sunday",
            "--time",
            "09:05",
            "--source",
            "/home/alice/docs",
            "--source",
            "/srv/share",
            "--include-ext",
            "*.pdf",
            "--include-only",
        ])
        .unwrap();

        let Commands::Preset(PresetCommand::Create { name, options }) = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(name, "Docs");
        assert_eq!(options.frequency, Some(Frequency::Weekly));
        assert_eq!(options.sources, vec!["/home/alice/docs", "/srv/share"]);
        assert_eq!(options.include_ext, vec!["*.pdf"]);
        assert_eq!(options.include_only, Some(true));
        assert_eq!(options.paused, None);
    }

    #[test]
    fn test_parse_explicit_false_flag() {
        let cli =
            Cli::try_parse_from(["holdfast", "preset", "edit", "Docs", "--paused", "false"]).unwrap();
        let Commands::Preset(PresetCommand::Edit { options, .. }) = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(options.paused, Some(false));
    }

    #[test]
    fn test_parse_restore_and_history() {
        let cli = Cli::try_parse_from([
            "holdfast", "backup", "restore", "client-42-2024", "--to", "/tmp/out.tar",
        ])
        .unwrap();
        let Commands::Backup(BackupCommand::Restore { archive, to, yes }) = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(archive, "client-42-2024");
        assert_eq!(to, Some(PathBuf::from("/tmp/out.tar")));
        assert!(!yes);

        let cli = Cli::try_parse_from([
            "holdfast", "backup", "history", "b1", "--filter", "pdf", "--status", "A",
        ])
        .unwrap();
        let Commands::Backup(BackupCommand::History { id, filter, status, latest }) = cli.command
        else {
            panic!("unexpected command");
        };
        assert_eq!(id.as_deref(), Some("b1"));
        assert_eq!(filter.as_deref(), Some("pdf"));
        assert_eq!(status, Some('A'));
        assert!(!latest);

        assert!(Cli::try_parse_from(["holdfast", "backup", "history", "--filter", "pdf"]).is_err());
        assert!(Cli::try_parse_from(["holdfast", "backup", "history", "b1", "--latest"]).is_err());
    }

    #[test]
    fn test_invalid_frequency_is_rejected() {
        let result =
            Cli::try_parse_from(["holdfast", "preset", "create", "Docs", "--frequency", "yearly"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_and_negative_value() {
        let cli = Cli::try_parse_from([
            "holdfast",
            "-v",
            "config",
            "set",
            "--config-dir",
            "/tmp/hf",
            "network.upload_rate",
            "-5",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/hf")));
        let Commands::Config(ConfigCommand::Set { value, .. }) = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(value, "-5");
    }
}
