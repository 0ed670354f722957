/// 应用目录与文件名常量
pub mod app {
    use std::path::PathBuf;

    /// 应用私有配置目录名
    pub const APP_DIR_NAME: &str = "holdfast";

    /// 应用配置文件名
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// 预设列表文件名（唯一数据源）
    pub const PRESETS_FILE_NAME: &str = "presets.json";

    /// 会话身份缓存文件名
    pub const SESSION_FILE_NAME: &str = "session.json";

    /// 获取默认配置目录（跨平台）
    /// Linux: ~/.config/holdfast
    /// Windows: %APPDATA%\holdfast
    pub fn get_default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }
}

/// 模式文件相关常量
pub mod pattern {
    /// 模式文件名前缀
    pub const FILE_PREFIX: &str = "patterns_";

    /// 模式文件扩展名
    pub const FILE_EXTENSION: &str = ".lst";

    /// 安全文件名最大长度
    pub const SAFE_NAME_MAX_LEN: usize = 50;

    /// 名称清理后为空时的替代名
    pub const UNNAMED: &str = "unnamed";

    /// 仅包含模式下的兜底排除规则
    pub const CATCH_ALL_EXCLUDE: &str = "- **";
}

/// 特权后端通信相关常量
pub mod api {
    /// 默认后端地址
    pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:47830";

    /// 命令调用路径前缀
    pub const INVOKE_PREFIX: &str = "/invoke";

    /// 事件流端点
    pub const EVENTS_ENDPOINT: &str = "/events";

    /// 后端命令名称
    pub mod commands {
        pub const LOGIN_USER: &str = "login_user";
        pub const GET_REPO_KEY: &str = "get_repo_key_req";
        pub const SEND_SSH_KEY: &str = "send_ssh_key_req";
        pub const GET_CLIENT_ID: &str = "get_client_id_req";
        pub const GET_SERVER_SSH_KEY: &str = "get_server_ssh_key_req";
        pub const CHECK_SSH_RUNNING: &str = "check_ssh_running";
        pub const START_SSH_SERVICE: &str = "start_ssh_service";
        pub const STOP_SSH_SERVICE: &str = "stop_ssh_service";
        pub const WSL_SETUP_USER: &str = "wsl_setup_user";
        pub const WSL_PROVISION_SCRIPTS: &str = "wsl_provision_scripts";
        pub const GET_TUNNEL_SSH_KEY: &str = "get_tunnel_ssh_key";
        pub const GET_BORG_SSH_KEY: &str = "get_borg_ssh_key";
        pub const SAVE_SERVER_SSH_KEY: &str = "save_server_ssh_key";
        pub const WSL_CONFIGURE_BORG_CLIENT: &str = "wsl_configure_borg_client";
        pub const SAVE_MASTER_KEY: &str = "save_master_key";
        pub const UPDATE_BACKUP_SCHEDULE: &str = "update_backup_schedule";
        pub const RUN_BACKUP_SCRIPT: &str = "run_backup_script";
        pub const CANCEL_BACKUP: &str = "cancel_backup";
        pub const FETCH_ARCHIVES: &str = "fetch_archives_list_req";
        pub const FETCH_ARCHIVE_FILES: &str = "fetch_archive_files_req";
        pub const DOWNLOAD_ARCHIVE: &str = "download_and_save_archive_req";
        pub const RESTORE_ARCHIVE: &str = "restore_to_original_req";
        pub const CANCEL_RESTORE: &str = "cancel_restore_operation";
        pub const GET_LOGS: &str = "get_logs_req";
        pub const GET_BACKUP_LOGS: &str = "get_backup_logs";
        /// 订阅事件流（不是命令调用，用于错误标注）
        pub const SUBSCRIBE_EVENTS: &str = "backup_events";
    }

    /// HTTP相关常量
    pub mod http {
        /// 默认请求超时时间（秒）
        pub const DEFAULT_TIMEOUT: u64 = 30;

        /// 事件流连接超时时间（秒）
        pub const EVENTS_CONNECT_TIMEOUT: u64 = 10;

        /// User-Agent头
        pub const USER_AGENT: &str = "holdfast-client/0.1";
    }
}

/// 固定时延常量
pub mod timing {
    use std::time::Duration;

    /// 密钥获取失败后的重试等待时间
    pub const KEY_RETRY_DELAY: Duration = Duration::from_millis(1000);

    /// 备份成功后自动复位为空闲状态的延迟
    pub const SUCCESS_RESET_DELAY: Duration = Duration::from_millis(5000);
}

/// 备份执行状态相关常量
pub mod backup {
    /// 日志缓冲区最多保留的条数
    pub const MAX_LOG_LINES: usize = 50;
}

/// 环境变量名
pub mod env {
    /// 覆盖配置目录
    pub const CONFIG_DIR: &str = "HOLDFAST_CONFIG_DIR";

    /// 日志文件路径
    pub const LOG_FILE: &str = "HOLDFAST_LOG_FILE";

    /// 登录密码
    pub const PASSWORD: &str = "HOLDFAST_PASSWORD";
}

/// 版本信息
pub mod version {
    /// 核心库版本
    pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
}
