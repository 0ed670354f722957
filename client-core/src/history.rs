//! 备份历史查询

use crate::backend::{BackupLogEntry, BackupSummary, FileStatus, PrivilegedBackend};
use crate::error::{ClientError, Result};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct HistoryService {
    backend: Arc<dyn PrivilegedBackend>,
}

impl HistoryService {
    pub fn new(backend: Arc<dyn PrivilegedBackend>) -> Self {
        Self { backend }
    }

    /// 完整备份历史，最新的在前
    pub async fn entries(&self) -> Result<Vec<BackupLogEntry>> {
        let entries = self
            .backend
            .fetch_backup_history()
            .await
            .map_err(ClientError::LogFetchFailure)?;
        debug!("获取到 {} 条备份记录", entries.len());
        Ok(entries)
    }

    /// 最近一次备份的统计，没有任何备份时返回 None
    pub async fn latest(&self) -> Result<Option<BackupSummary>> {
        let summaries = self
            .backend
            .fetch_backup_summaries()
            .await
            .map_err(ClientError::DashboardStatsFailure)?;
        Ok(summaries.into_iter().next())
    }
}

/// 备份记录中文件列表的筛选条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    /// 路径包含的文字，不区分大小写，空字符串匹配全部
    pub term: String,
    /// 状态标记（A/M/D/E...），None 表示全部
    pub status: Option<char>,
}

impl FileFilter {
    pub fn matches(&self, file: &FileStatus) -> bool {
        let status_ok = self
            .status
            .is_none_or(|status| status.eq_ignore_ascii_case(&file.status));
        status_ok
            && (self.term.is_empty()
                || file.path.to_lowercase().contains(&self.term.to_lowercase()))
    }
}

/// 按条件筛选一条备份记录中的文件
pub fn filter_files<'a>(
    entry: &'a BackupLogEntry,
    filter: &'a FileFilter,
) -> impl Iterator<Item = &'a FileStatus> + 'a {
    entry.files.iter().filter(move |file| filter.matches(file))
}
