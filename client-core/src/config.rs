use crate::constants::{api, app};
use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// 常规设置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneralConfig {
    pub startup: bool,
    pub admin: bool,
    pub start_tray: bool,
    pub minimize_tray: bool,
    pub prevent_sleep: bool,
    pub battery_limit: bool,
}

/// 通知设置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationConfig {
    pub on_start: bool,
    pub on_success: bool,
    pub on_warning: bool,
    pub on_error: bool,
    pub sound: bool,
    pub on_client_issue: bool,
}

/// 网络设置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct NetworkConfig {
    /// 上传限速（KiB/s），0 表示不限速
    pub upload_rate: u32,
}

/// 特权后端连接设置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            startup: false,
            admin: false,
            start_tray: false,
            minimize_tray: false,
            prevent_sleep: true,
            battery_limit: true,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_start: true,
            on_success: true,
            on_warning: true,
            on_error: true,
            sound: false,
            on_client_issue: true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: api::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: api::http::DEFAULT_TIMEOUT,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            notifications: NotificationConfig::default(),
            network: NetworkConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl AppConfig {
    /// 配置文件在配置目录中的路径
    pub fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(app::CONFIG_FILE_NAME)
    }

    /// 加载配置，文件不存在时写入默认配置
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::debug!("加载配置文件: {}", path.display());
            return Self::load_from_file(path);
        }

        tracing::warn!("未找到配置文件，创建默认配置: {}", path.display());
        let default_config = Self::default();
        default_config.save_to_file(path)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ClientError::config_load(path, e))?;
        toml::from_str(&content).map_err(|e| ClientError::config_load(path, e))
    }

    /// 保存配置到文件
    ///
    /// 先写临时文件再重命名，写入中途崩溃不会破坏已有配置
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| ClientError::config_save(path, e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ClientError::config_save(path, e))?;
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, content).map_err(|e| ClientError::config_save(path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| ClientError::config_save(path, e))?;
        tracing::info!("配置已保存: {}", path.display());
        Ok(())
    }

    /// 按点分键名修改单个配置项，例如 `network.upload_rate`
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let flag = || parse_bool(key, value);
        match key {
            "general.startup" => self.general.startup = flag()?,
            "general.admin" => self.general.admin = flag()?,
            "general.start_tray" => self.general.start_tray = flag()?,
            "general.minimize_tray" => self.general.minimize_tray = flag()?,
            "general.prevent_sleep" => self.general.prevent_sleep = flag()?,
            "general.battery_limit" => self.general.battery_limit = flag()?,
            "notifications.on_start" => self.notifications.on_start = flag()?,
            "notifications.on_success" => self.notifications.on_success = flag()?,
            "notifications.on_warning" => self.notifications.on_warning = flag()?,
            "notifications.on_error" => self.notifications.on_error = flag()?,
            "notifications.sound" => self.notifications.sound = flag()?,
            "notifications.on_client_issue" => self.notifications.on_client_issue = flag()?,
            "network.upload_rate" => self.network.upload_rate = parse_upload_rate(key, value)?,
            "backend.base_url" => {
                self.backend.base_url = value.trim().trim_end_matches('/').to_string()
            }
            "backend.request_timeout_secs" => {
                self.backend.request_timeout_secs = value
                    .trim()
                    .parse()
                    .map_err(|_| ClientError::custom(format!("无效的数值 {key}={value}")))?
            }
            _ => return Err(ClientError::custom(format!("未知的配置项: {key}"))),
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ClientError::custom(format!("无效的布尔值 {key}={value}"))),
    }
}

/// 上传限速只接受非负整数，负数和小数按 0 和向下取整处理
fn parse_upload_rate(key: &str, value: &str) -> Result<u32> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| ClientError::custom(format!("无效的数值 {key}={value}")))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Ok(0);
    }
    Ok(parsed.floor().min(u32::MAX as f64) as u32)
}
