//! 特权后端能力接口
//!
//! 客户端的所有重活（密钥、归档、计划任务执行）都在一个独立的特权后端中完成，
//! 这里只定义调用边界。编排逻辑只依赖 [`PrivilegedBackend`]，测试中可以替换为假实现。

use crate::error::BackendResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// 两类 SSH 风格密钥
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// 隧道连接密钥
    Tunnel,
    /// Borg 备份引擎密钥
    Borg,
}

impl KeyKind {
    pub fn is_tunnel(&self) -> bool {
        matches!(self, KeyKind::Tunnel)
    }

    /// 获取该密钥对应的后端命令名
    pub fn fetch_command(&self) -> &'static str {
        use crate::constants::api::commands;
        match self {
            KeyKind::Tunnel => commands::GET_TUNNEL_SSH_KEY,
            KeyKind::Borg => commands::GET_BORG_SSH_KEY,
        }
    }
}

/// 后端事件通道上的原始事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendEvent {
    pub event_type: String,
    pub data: String,
}

impl BackendEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

/// 备份计划写入请求，以 preset_id + username + client_id 为键，可重复提交
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub username: String,
    pub preset_id: String,
    pub cron_string: String,
    pub preset_path: String,
    pub client_id: String,
    pub enabled: bool,
}

/// 服务器上的一个备份归档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveItem {
    pub archive: String,
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveEntryKind {
    #[serde(rename = "-")]
    File,
    #[serde(rename = "d")]
    Directory,
}

/// 归档中的一个文件或目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    #[serde(rename = "type")]
    pub kind: ArchiveEntryKind,
    pub path: String,
    pub mtime: String,
    pub size: u64,
}

impl ArchiveEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == ArchiveEntryKind::Directory
    }
}

/// 备份记录中单个文件的变化，status 为 A/M/D/E 等单字符标记
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub status: char,
}

/// 一次备份的完整记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupLogEntry {
    pub id: String,
    pub date: String,
    pub duration: f64,
    pub total_size: u64,
    pub total_files: u64,
    pub status: String,
    pub count_added: u64,
    pub count_modified: u64,
    pub count_deleted: u64,
    pub count_error: u64,
    #[serde(default)]
    pub files: Vec<FileStatus>,
}

/// 不含文件列表的备份记录，用于概览
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSummary {
    pub id: String,
    pub date: String,
    #[serde(default)]
    pub duration: f64,
    pub total_size: u64,
    pub total_files: u64,
    pub status: String,
    pub count_added: u64,
    pub count_modified: u64,
    pub count_deleted: u64,
    pub count_error: u64,
}

impl From<BackupLogEntry> for BackupSummary {
    fn from(entry: BackupLogEntry) -> Self {
        Self {
            id: entry.id,
            date: entry.date,
            duration: entry.duration,
            total_size: entry.total_size,
            total_files: entry.total_files,
            status: entry.status,
            count_added: entry.count_added,
            count_modified: entry.count_modified,
            count_deleted: entry.count_deleted,
            count_error: entry.count_error,
        }
    }
}

/// 特权后端的远程调用集合
#[async_trait]
pub trait PrivilegedBackend: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str, is_signup: bool)
    -> BackendResult<()>;

    async fn fetch_repository_key(&self) -> BackendResult<Vec<u8>>;

    async fn send_ssh_key(&self, content: &str, kind: KeyKind) -> BackendResult<()>;

    async fn fetch_client_id(&self) -> BackendResult<String>;

    async fn fetch_server_public_key(&self) -> BackendResult<String>;

    async fn is_elevated_service_running(&self) -> BackendResult<bool>;

    async fn start_elevated_service(&self) -> BackendResult<()>;

    async fn stop_elevated_service(&self) -> BackendResult<()>;

    async fn provision_environment_user(&self, username: &str) -> BackendResult<()>;

    async fn provision_config_scripts(&self, username: &str, client_id: &str)
    -> BackendResult<()>;

    async fn fetch_ssh_key(
        &self,
        kind: KeyKind,
        username: &str,
        client_id: &str,
    ) -> BackendResult<String>;

    async fn persist_server_key(&self, username: &str, key: &str) -> BackendResult<()>;

    async fn finalize_borg_config(&self, username: &str) -> BackendResult<()>;

    async fn persist_master_key(
        &self,
        username: &str,
        client_id: &str,
        key: &[u8],
    ) -> BackendResult<()>;

    async fn upsert_schedule(&self, request: &ScheduleRequest) -> BackendResult<()>;

    async fn run_backup(&self, client_id: &str, preset_path: &str, username: &str)
    -> BackendResult<()>;

    async fn cancel_backup(&self) -> BackendResult<()>;

    async fn fetch_archives(&self) -> BackendResult<Vec<ArchiveItem>>;

    async fn fetch_archive_files(&self, archive: &str) -> BackendResult<Vec<ArchiveEntry>>;

    /// 下载归档并保存到 `target_path`，返回后端的结果描述
    async fn download_archive(&self, archive: &str, target_path: &str) -> BackendResult<String>;

    /// 把归档恢复到文件原来的位置，返回后端的结果描述
    async fn restore_archive(&self, archive: &str) -> BackendResult<String>;

    async fn cancel_restore(&self) -> BackendResult<()>;

    /// 完整备份历史，最新的在前
    async fn fetch_backup_history(&self) -> BackendResult<Vec<BackupLogEntry>>;

    /// 不含文件列表的备份历史，最新的在前
    async fn fetch_backup_summaries(&self) -> BackendResult<Vec<BackupSummary>>;

    /// 打开事件通道，事件按到达顺序送出
    async fn subscribe_events(&self) -> BackendResult<mpsc::UnboundedReceiver<BackendEvent>>;
}
