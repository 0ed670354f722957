//! 预设 → Borg 模式文件
//!
//! 纯转换，不做任何 I/O。行格式：
//! - `R <path>` 备份根目录
//! - `! <path>` 显式排除
//! - `+ <glob>` / `- <glob>` 扩展名规则
//! - 仅包含模式下最后追加 `- **`

use crate::constants::pattern;
use crate::preset::{BackupPreset, RuleMode};

/// 路径风格，决定是否把 Windows 盘符路径转换为 `/mnt/<drive>` 形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFlavor {
    Windows,
    Posix,
}

impl HostFlavor {
    /// 当前编译目标的路径风格
    pub fn current() -> Self {
        if cfg!(windows) {
            HostFlavor::Windows
        } else {
            HostFlavor::Posix
        }
    }
}

/// 模式文件编译器
#[derive(Debug, Clone, Copy)]
pub struct PatternCompiler {
    host: HostFlavor,
}

impl Default for PatternCompiler {
    fn default() -> Self {
        Self::new(HostFlavor::current())
    }
}

impl PatternCompiler {
    pub fn new(host: HostFlavor) -> Self {
        Self { host }
    }

    pub fn host(&self) -> HostFlavor {
        self.host
    }

    /// 生成预设对应的模式文件内容，以换行结尾
    pub fn compile(&self, preset: &BackupPreset) -> String {
        let mut lines = Vec::with_capacity(
            2 + preset.sources.len() + preset.exclusions.len() + preset.extension_rules.len(),
        );
        lines.push(format!("# Patterns for: {}", single_line(&preset.name)));

        for source in &preset.sources {
            lines.push(format!("R {}", self.format_path(source)));
        }

        for exclusion in &preset.exclusions {
            lines.push(format!("! {}", self.format_path(exclusion)));
        }

        // 仅包含模式只认 include 规则，其余情况只认 exclude 规则
        for rule in &preset.extension_rules {
            let glob = recursive_glob(&rule.pattern);
            match (preset.include_only_mode, rule.mode) {
                (true, RuleMode::Include) => lines.push(format!("+ {glob}")),
                (false, RuleMode::Exclude) => lines.push(format!("- {glob}")),
                _ => {}
            }
        }

        if preset.include_only_mode {
            lines.push(pattern::CATCH_ALL_EXCLUDE.to_string());
        }

        let mut content = lines.join("\n");
        content.push('\n');
        content
    }

    /// 规范化路径并转义单引号，结果可安全放入单引号 shell 上下文
    pub fn format_path(&self, raw: &str) -> String {
        let mut path = raw.trim().to_string();

        if self.host == HostFlavor::Windows {
            path = path.replace('\\', "/");
            let mut chars = path.chars();
            if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
                if drive.is_ascii_alphabetic() {
                    path = format!("/mnt/{}{}", drive.to_ascii_lowercase(), &path[2..]);
                }
            }
        }

        path.replace('\'', r#"'"'"'"#)
    }
}

/// 把开头的 `*.` 改写为递归的 `**/*.`
fn recursive_glob(pattern: &str) -> String {
    match pattern.strip_prefix("*.") {
        Some(rest) => format!("**/*.{rest}"),
        None => pattern.to_string(),
    }
}

/// 预设名写入注释行时不能跨行
fn single_line(name: &str) -> String {
    name.replace(['\r', '\n'], " ")
}

/// 把预设名转换为安全的模式文件名：`patterns_<safe>.lst`
pub fn safe_filename(name: &str) -> String {
    let mut safe = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            c
        } else {
            '_'
        };
        if c == '_' && safe.ends_with('_') {
            continue;
        }
        safe.push(c);
    }

    // 只包含 ASCII，按字节截断是安全的
    safe.truncate(pattern::SAFE_NAME_MAX_LEN);
    let safe = safe.trim_end_matches('_');
    let safe = if safe.is_empty() { pattern::UNNAMED } else { safe };

    format!("{}{}{}", pattern::FILE_PREFIX, safe, pattern::FILE_EXTENSION)
}

/// 判断文件名是否符合生成的模式文件命名规则
pub fn is_pattern_filename(file_name: &str) -> bool {
    file_name.starts_with(pattern::FILE_PREFIX) && file_name.ends_with(pattern::FILE_EXTENSION)
}
