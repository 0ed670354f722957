use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// 特权后端调用的结果类型
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// 特权后端调用失败的原因
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("后端返回错误: {0}")]
    Remote(String),

    #[error("HTTP 传输错误: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("响应解析失败: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("后端不可用: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// 提取可以展示给用户的错误描述，没有可用内容时返回 None
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            BackendError::Remote(msg) | BackendError::Unavailable(msg) => msg.trim().to_string(),
            BackendError::Transport(err) => err.to_string(),
            BackendError::Decode(err) => err.to_string(),
        };
        if message.is_empty() { None } else { Some(message) }
    }
}

/// 本地持久化（配置、预设、会话）的底层错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("用户认证失败")]
    AuthenticationFailure(#[source] BackendError),

    #[error("Linux 环境用户创建失败")]
    EnvironmentProvisioningFailure(#[source] BackendError),

    #[error("配置脚本部署失败")]
    ScriptProvisioningFailure(#[source] BackendError),

    #[error("重试后仍无法获取密钥: {operation}")]
    KeyRetrievalFailure {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("服务器公钥保存失败")]
    ServerKeyPersistFailure(#[source] BackendError),

    #[error("Borg 客户端配置失败")]
    BorgConfigFailure(#[source] BackendError),

    #[error("仓库主密钥为空")]
    MasterKeyMissing,

    #[error("仓库主密钥保存失败")]
    MasterKeyPersistFailure(#[source] BackendError),

    #[error("备份计划同步失败: {preset_id}")]
    ScheduleSyncFailure {
        preset_id: String,
        #[source]
        source: BackendError,
    },

    #[error("{message}")]
    BackupExecutionFailure {
        message: String,
        #[source]
        source: BackendError,
    },

    #[error("取消备份请求失败")]
    BackupCancelled(#[source] BackendError),

    #[error("已有备份正在执行: {preset_id}")]
    BackupInProgress { preset_id: String },

    #[error("归档列表获取失败")]
    ArchiveFetchFailure(#[source] BackendError),

    #[error("归档内容获取失败: {archive}")]
    ArchiveFilesFetchFailure {
        archive: String,
        #[source]
        source: BackendError,
    },

    #[error("归档恢复失败: {archive}")]
    RestoreFailure {
        archive: String,
        #[source]
        source: BackendError,
    },

    #[error("备份历史获取失败")]
    LogFetchFailure(#[source] BackendError),

    #[error("最近备份统计获取失败")]
    DashboardStatsFailure(#[source] BackendError),

    #[error("预设 {name} 与 {existing} 对应同一个模式文件 {file_name}")]
    PatternFileConflict {
        name: String,
        existing: String,
        file_name: String,
    },

    #[error("配置加载失败: {}", path.display())]
    ConfigLoadFailure {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("配置保存失败: {}", path.display())]
    ConfigSaveFailure {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("后端调用失败: {operation}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// 错误分类标签，调用方据此分支处理而无需解析错误文本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthenticationFailure,
    EnvironmentProvisioningFailure,
    ScriptProvisioningFailure,
    KeyRetrievalFailure,
    ServerKeyPersistFailure,
    BorgConfigFailure,
    MasterKeyMissing,
    MasterKeyPersistFailure,
    ScheduleSyncFailure,
    BackupExecutionFailure,
    BackupCancelled,
    BackupInProgress,
    ArchiveFetchFailure,
    ArchiveFilesFetchFailure,
    RestoreFailure,
    LogFetchFailure,
    DashboardStatsFailure,
    PatternFileConflict,
    ConfigLoadFailure,
    ConfigSaveFailure,
    Backend,
    Io,
    Serde,
    Custom,
}

impl ClientError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn backend(operation: &'static str, source: BackendError) -> Self {
        Self::Backend { operation, source }
    }

    pub fn config_load(path: impl Into<PathBuf>, source: impl Into<StorageError>) -> Self {
        Self::ConfigLoadFailure {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn config_save(path: impl Into<PathBuf>, source: impl Into<StorageError>) -> Self {
        Self::ConfigSaveFailure {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::AuthenticationFailure(_) => ErrorKind::AuthenticationFailure,
            ClientError::EnvironmentProvisioningFailure(_) => {
                ErrorKind::EnvironmentProvisioningFailure
            }
            ClientError::ScriptProvisioningFailure(_) => ErrorKind::ScriptProvisioningFailure,
            ClientError::KeyRetrievalFailure { .. } => ErrorKind::KeyRetrievalFailure,
            ClientError::ServerKeyPersistFailure(_) => ErrorKind::ServerKeyPersistFailure,
            ClientError::BorgConfigFailure(_) => ErrorKind::BorgConfigFailure,
            ClientError::MasterKeyMissing => ErrorKind::MasterKeyMissing,
            ClientError::MasterKeyPersistFailure(_) => ErrorKind::MasterKeyPersistFailure,
            ClientError::ScheduleSyncFailure { .. } => ErrorKind::ScheduleSyncFailure,
            ClientError::BackupExecutionFailure { .. } => ErrorKind::BackupExecutionFailure,
            ClientError::BackupCancelled(_) => ErrorKind::BackupCancelled,
            ClientError::BackupInProgress { .. } => ErrorKind::BackupInProgress,
            ClientError::ArchiveFetchFailure(_) => ErrorKind::ArchiveFetchFailure,
            ClientError::ArchiveFilesFetchFailure { .. } => ErrorKind::ArchiveFilesFetchFailure,
            ClientError::RestoreFailure { .. } => ErrorKind::RestoreFailure,
            ClientError::LogFetchFailure(_) => ErrorKind::LogFetchFailure,
            ClientError::DashboardStatsFailure(_) => ErrorKind::DashboardStatsFailure,
            ClientError::PatternFileConflict { .. } => ErrorKind::PatternFileConflict,
            ClientError::ConfigLoadFailure { .. } => ErrorKind::ConfigLoadFailure,
            ClientError::ConfigSaveFailure { .. } => ErrorKind::ConfigSaveFailure,
            ClientError::Backend { .. } => ErrorKind::Backend,
            ClientError::Io(_) => ErrorKind::Io,
            ClientError::Serde(_) => ErrorKind::Serde,
            ClientError::Custom(_) => ErrorKind::Custom,
        }
    }

    /// 返回被包装的后端错误（如果有）
    pub fn backend_cause(&self) -> Option<&BackendError> {
        match self {
            ClientError::AuthenticationFailure(source)
            | ClientError::EnvironmentProvisioningFailure(source)
            | ClientError::ScriptProvisioningFailure(source)
            | ClientError::ServerKeyPersistFailure(source)
            | ClientError::BorgConfigFailure(source)
            | ClientError::MasterKeyPersistFailure(source)
            | ClientError::BackupCancelled(source)
            | ClientError::ArchiveFetchFailure(source)
            | ClientError::LogFetchFailure(source)
            | ClientError::DashboardStatsFailure(source)
            | ClientError::ArchiveFilesFetchFailure { source, .. }
            | ClientError::RestoreFailure { source, .. }
            | ClientError::KeyRetrievalFailure { source, .. }
            | ClientError::ScheduleSyncFailure { source, .. }
            | ClientError::BackupExecutionFailure { source, .. }
            | ClientError::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}
