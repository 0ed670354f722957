//! 归档浏览与恢复
//!
//! 归档的下载和解包都在特权后端中完成，这里负责参数校验、错误分类和取消语义。

use crate::backend::{ArchiveEntry, ArchiveItem, PrivilegedBackend};
use crate::error::{ClientError, Result};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

/// 恢复的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreTarget<'a> {
    /// 下载归档并保存到指定路径
    SaveTo(&'a Path),
    /// 把文件写回原来的位置
    InPlace,
}

/// 一次恢复调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// 后端返回的结果描述
    Completed(String),
    Cancelled,
}

#[derive(Clone)]
pub struct RestoreService {
    backend: Arc<dyn PrivilegedBackend>,
    cancelled: Arc<AtomicBool>,
}

impl RestoreService {
    pub fn new(backend: Arc<dyn PrivilegedBackend>) -> Self {
        Self {
            backend,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 服务器上可用的归档
    pub async fn list_archives(&self) -> Result<Vec<ArchiveItem>> {
        let archives = self
            .backend
            .fetch_archives()
            .await
            .map_err(ClientError::ArchiveFetchFailure)?;
        debug!("获取到 {} 个归档", archives.len());
        Ok(archives)
    }

    /// 归档中的文件列表
    pub async fn list_files(&self, archive: &str) -> Result<Vec<ArchiveEntry>> {
        let archive = require_archive_name(archive)?;
        self.backend
            .fetch_archive_files(archive)
            .await
            .map_err(|source| ClientError::ArchiveFilesFetchFailure {
                archive: archive.to_string(),
                source,
            })
    }

    /// 执行恢复，等待后端完成
    ///
    /// 被 [`cancel`](Self::cancel) 中断的恢复返回 `Ok(RestoreOutcome::Cancelled)`。
    #[instrument(skip(self))]
    pub async fn restore(&self, archive: &str, target: RestoreTarget<'_>) -> Result<RestoreOutcome> {
        let archive = require_archive_name(archive)?;
        self.cancelled.store(false, Ordering::SeqCst);

        let result = match target {
            RestoreTarget::SaveTo(path) => {
                info!("下载归档 {} 到 {}", archive, path.display());
                self.backend
                    .download_archive(archive, &path.to_string_lossy())
                    .await
            }
            RestoreTarget::InPlace => {
                info!("原位恢复归档: {}", archive);
                self.backend.restore_archive(archive).await
            }
        };

        match result {
            Ok(message) => Ok(RestoreOutcome::Completed(message)),
            Err(e) if self.cancelled.load(Ordering::SeqCst) => {
                debug!("恢复已被取消: {}", e);
                Ok(RestoreOutcome::Cancelled)
            }
            Err(source) => Err(ClientError::RestoreFailure {
                archive: archive.to_string(),
                source,
            }),
        }
    }

    /// 请求中断正在进行的下载或恢复，发送失败只记录日志
    pub async fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Err(e) = self.backend.cancel_restore().await {
            warn!("取消恢复请求发送失败: {}", e);
        }
    }
}

fn require_archive_name(archive: &str) -> Result<&str> {
    let archive = archive.trim();
    if archive.is_empty() {
        return Err(ClientError::custom("归档名称不能为空"));
    }
    Ok(archive)
}

/// 归档总大小（只计文件）
pub fn total_size(entries: &[ArchiveEntry]) -> u64 {
    entries.iter().filter(|e| !e.is_dir()).map(|e| e.size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ArchiveEntryKind;
    use crate::backend::testing::FakeBackend;
    use crate::constants::api::commands;
    use crate::error::{BackendError, ErrorKind};
    use std::path::PathBuf;

    fn archive(name: &str) -> ArchiveItem {
        ArchiveItem {
            archive: name.to_string(),
            time: "2024-05-01T10:00:00".to_string(),
        }
    }

    fn entry(kind: ArchiveEntryKind, path: &str, size: u64) -> ArchiveEntry {
        ArchiveEntry {
            kind,
            path: path.to_string(),
            mtime: "2024-05-01T10:00:00".to_string(),
            size,
        }
    }

    #[tokio::test]
    async fn test_list_archives_and_files() {
        let files = vec![
            entry(ArchiveEntryKind::Directory, "home/alice", 4096),
            entry(ArchiveEntryKind::File, "home/alice/a.txt", 10),
            entry(ArchiveEntryKind::File, "home/alice/b.txt", 32),
        ];
        let fake = Arc::new(
            FakeBackend::new()
                .with_archives(vec![archive("client-42-2024-05-01")])
                .with_archive_files("client-42-2024-05-01", files.clone()),
        );
        let service = RestoreService::new(fake.clone());

        assert_eq!(
            service.list_archives().await.unwrap(),
            vec![archive("client-42-2024-05-01")]
        );
        let listed = service.list_files(" client-42-2024-05-01 ").await.unwrap();
        assert_eq!(listed, files);
        assert_eq!(total_size(&listed), 42);
    }

    #[tokio::test]
    async fn test_fetch_failures_are_classified() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail_always(commands::FETCH_ARCHIVES);
        let service = RestoreService::new(fake.clone());

        let err = service.list_archives().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveFetchFailure);

        let err = service.list_files("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveFilesFetchFailure);
        assert_eq!(err.to_string(), "归档内容获取失败: missing");

        let err = service.list_files("  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Custom);
        assert_eq!(fake.count(commands::FETCH_ARCHIVE_FILES), 1);
    }

    #[tokio::test]
    async fn test_restore_targets() {
        let fake = Arc::new(FakeBackend::new());
        let service = RestoreService::new(fake.clone());
        let target = PathBuf::from("/tmp/restore.tar");

        let saved = service
            .restore("a1", RestoreTarget::SaveTo(&target))
            .await
            .unwrap();
        assert_eq!(saved, RestoreOutcome::Completed("restored a1".into()));

        service.restore("a2", RestoreTarget::InPlace).await.unwrap();
        assert_eq!(
            fake.restore_requests(),
            vec![
                ("a1".to_string(), Some("/tmp/restore.tar".to_string())),
                ("a2".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_restore_failure_wraps_cause() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail(commands::RESTORE_ARCHIVE, 1);
        let service = RestoreService::new(fake.clone());

        let err = service.restore("a1", RestoreTarget::InPlace).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RestoreFailure);
        assert_eq!(
            err.backend_cause().map(|e| e.to_string()),
            Some("后端返回错误: restore_to_original_req failed #1".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancelled_restore_is_not_an_error() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail_always(commands::CANCEL_RESTORE);
        let service = RestoreService::new(fake.clone());

        let gate = fake.hold_restore();
        let task = {
            let service = service.clone();
            tokio::spawn(async move { service.restore("a1", RestoreTarget::InPlace).await })
        };
        while fake.count(commands::RESTORE_ARCHIVE) == 0 {
            tokio::task::yield_now().await;
        }

        service.cancel().await;
        gate.send(Err(BackendError::remote("interrupted"))).unwrap();

        assert_eq!(task.await.unwrap().unwrap(), RestoreOutcome::Cancelled);
        assert_eq!(fake.count(commands::CANCEL_RESTORE), 1);

        // 新的恢复重新计算取消状态
        fake.fail(commands::RESTORE_ARCHIVE, 1);
        let err = service.restore("a1", RestoreTarget::InPlace).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RestoreFailure);
    }
}
