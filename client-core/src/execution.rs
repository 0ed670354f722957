//! 备份执行状态机
//!
//! 后端通过事件通道推送进度，协调器把事件依次应用到一份 [`BackupStatus`] 上，
//! 界面通过 [`BackupExecutionCoordinator::subscribe`] 观察每一次变化。

use crate::backend::{BackendEvent, PrivilegedBackend};
use crate::constants::{api::commands, backup, timing};
use crate::error::{ClientError, Result};
use crate::session::SessionIdentity;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupState {
    #[default]
    Idle,
    Preparing,
    Running,
    Error,
    Success,
}

impl BackupState {
    /// 备份会话是否仍在进行
    pub fn is_active(&self) -> bool {
        matches!(self, BackupState::Preparing | BackupState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupState::Idle => "idle",
            BackupState::Preparing => "preparing",
            BackupState::Running => "running",
            BackupState::Error => "error",
            BackupState::Success => "success",
        }
    }
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 备份执行状态快照
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackupStatus {
    pub preset_id: Option<String>,
    pub state: BackupState,
    /// 只在 running / success 状态下有意义
    pub progress: i32,
    pub current_file: String,
    logs: VecDeque<String>,
}

impl BackupStatus {
    fn preparing(preset_id: &str, message: &str) -> Self {
        Self {
            preset_id: Some(preset_id.to_string()),
            state: BackupState::Preparing,
            current_file: message.to_string(),
            ..Self::default()
        }
    }

    /// 最近的日志，按时间从旧到新
    pub fn logs(&self) -> impl Iterator<Item = &str> {
        self.logs.iter().map(String::as_str)
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    fn push_log(&mut self, line: String) {
        while self.logs.len() >= backup::MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    fn fail(&mut self, message: String) {
        self.state = BackupState::Error;
        self.current_file = message;
    }

    /// 应用一个事件，返回是否进入了 success 状态
    pub fn apply(&mut self, event: &BackupEvent, messages: &ExecutionMessages) -> bool {
        match event {
            BackupEvent::Progress(data) => {
                if self.state == BackupState::Idle {
                    self.state = BackupState::Running;
                }
                if let Some(progress) = parse_progress(data) {
                    self.progress = progress;
                }
                false
            }
            BackupEvent::File(path) => {
                self.current_file = path.clone();
                false
            }
            BackupEvent::Success => {
                self.state = BackupState::Success;
                self.progress = 100;
                self.current_file = messages.completed.clone();
                true
            }
            BackupEvent::Error(data) => {
                self.state = BackupState::Error;
                self.push_log(format!("{}: {}", messages.error_line_prefix, data));
                false
            }
            BackupEvent::Log(line) => {
                self.push_log(line.clone());
                false
            }
        }
    }
}

/// 解析进度值：跳过前导空白，读取可选符号和连续数字，其余字符忽略
///
/// 超出 i32 范围的数值饱和到 `i32::MAX` / `i32::MIN`
fn parse_progress(data: &str) -> Option<i32> {
    let trimmed = data.trim_start();
    let negative = trimmed.starts_with('-');
    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits = trimmed[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(trimmed.len(), |end| sign_len + end);
    if digits == sign_len {
        return None;
    }
    match trimmed[..digits].parse() {
        Ok(value) => Some(value),
        Err(_) if negative => Some(i32::MIN),
        Err(_) => Some(i32::MAX),
    }
}

/// 已识别的后端事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupEvent {
    Progress(String),
    File(String),
    Success,
    Error(String),
    Log(String),
}

impl BackupEvent {
    /// 未知的事件类型返回 None
    pub fn from_backend(event: &BackendEvent) -> Option<Self> {
        let data = event.data.clone();
        match event.event_type.as_str() {
            "progress" => Some(BackupEvent::Progress(data)),
            "file" => Some(BackupEvent::File(data)),
            "success" => Some(BackupEvent::Success),
            "error" => Some(BackupEvent::Error(data)),
            "log" => Some(BackupEvent::Log(data)),
            _ => None,
        }
    }
}

/// 状态中展示给用户的文本，由调用方按语言提供
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMessages {
    pub initializing: String,
    pub completed: String,
    pub cancelled: String,
    pub error_prefix: String,
    pub error_line_prefix: String,
    pub unknown_error: String,
}

impl Default for ExecutionMessages {
    fn default() -> Self {
        Self {
            initializing: "Initializing...".to_string(),
            completed: "Backup completed successfully".to_string(),
            cancelled: "Backup cancelled".to_string(),
            error_prefix: "Backup failed".to_string(),
            error_line_prefix: "Error".to_string(),
            unknown_error: "Unknown error".to_string(),
        }
    }
}

/// 一次 start 调用的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Completed,
    Cancelled,
}

struct CoordinatorInner {
    backend: Arc<dyn PrivilegedBackend>,
    status: watch::Sender<BackupStatus>,
    listening: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
    reset_timer: Mutex<Option<JoinHandle<()>>>,
    cancelled: AtomicBool,
    /// 正在执行的 run_backup 所属的预设
    in_flight: Mutex<Option<String>>,
    messages: Mutex<ExecutionMessages>,
    reset_delay: Duration,
}

impl CoordinatorInner {
    fn handle_event(self: &Arc<Self>, raw: &BackendEvent) {
        let Some(event) = BackupEvent::from_backend(raw) else {
            debug!("忽略未知的备份事件: {}", raw.event_type);
            return;
        };

        let messages = self.messages.lock().clone();
        let mut succeeded = false;
        self.status.send_modify(|status| {
            succeeded = status.apply(&event, &messages);
        });

        if succeeded {
            info!("备份完成");
            self.schedule_reset();
        }
    }

    /// 成功后延迟把状态恢复为初始值，已有的定时器会被替换
    fn schedule_reset(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.reset_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.status.send_replace(BackupStatus::default());
                debug!("备份状态已重置");
            }
        });

        if let Some(previous) = self.reset_timer.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel_reset(&self) {
        if let Some(timer) = self.reset_timer.lock().take() {
            timer.abort();
        }
    }
}

/// 占用执行槽位，释放时（包括 start 的 future 被丢弃）清除
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<String>>,
}

impl<'a> InFlightGuard<'a> {
    fn claim(slot: &'a Mutex<Option<String>>, preset_id: &str) -> Result<Self> {
        let mut current = slot.lock();
        if let Some(active) = current.as_ref() {
            return Err(ClientError::BackupInProgress {
                preset_id: active.clone(),
            });
        }
        *current = Some(preset_id.to_string());
        Ok(Self { slot })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
        if let Some(timer) = self.reset_timer.get_mut().take() {
            timer.abort();
        }
    }
}

/// 备份执行协调器，每个进程一个，按句柄共享
#[derive(Clone)]
pub struct BackupExecutionCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl BackupExecutionCoordinator {
    pub fn new(backend: Arc<dyn PrivilegedBackend>) -> Self {
        Self::with_reset_delay(backend, timing::SUCCESS_RESET_DELAY)
    }

    pub fn with_reset_delay(backend: Arc<dyn PrivilegedBackend>, reset_delay: Duration) -> Self {
        let (status, _) = watch::channel(BackupStatus::default());
        Self {
            inner: Arc::new(CoordinatorInner {
                backend,
                status,
                listening: AtomicBool::new(false),
                listener: Mutex::new(None),
                reset_timer: Mutex::new(None),
                cancelled: AtomicBool::new(false),
                in_flight: Mutex::new(None),
                messages: Mutex::new(ExecutionMessages::default()),
                reset_delay,
            }),
        }
    }

    /// 当前状态快照
    pub fn status(&self) -> BackupStatus {
        self.inner.status.borrow().clone()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<BackupStatus> {
        self.inner.status.subscribe()
    }

    /// 是否有 start 调用正在等待后端返回
    pub fn is_running(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// 是否有待执行的自动重置
    pub fn has_pending_reset(&self) -> bool {
        self.inner
            .reset_timer
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// 确保事件订阅已建立，重复调用不会重复订阅
    pub async fn listen(&self) -> Result<()> {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut events = match self.inner.backend.subscribe_events().await {
            Ok(events) => events,
            Err(e) => {
                self.inner.listening.store(false, Ordering::SeqCst);
                return Err(ClientError::backend(commands::SUBSCRIBE_EVENTS, e));
            }
        };

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.handle_event(&event);
            }
            debug!("备份事件通道已关闭");
            if let Some(inner) = weak.upgrade() {
                inner.listening.store(false, Ordering::SeqCst);
            }
        });

        if let Some(previous) = self.inner.listener.lock().replace(handle) {
            previous.abort();
        }
        debug!("已订阅备份事件");
        Ok(())
    }

    /// 取消事件订阅，之后的 start 会重新订阅
    pub fn stop_listening(&self) {
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
        self.inner.listening.store(false, Ordering::SeqCst);
    }

    /// 执行一次备份
    ///
    /// 同一时刻只允许一个 start 在等待后端返回，否则返回 `BackupInProgress`。
    /// 正常结束时状态由后端事件驱动；后端调用失败时直接进入 error 状态。
    /// 已被 [`cancel`](Self::cancel) 的会话返回 `Ok(BackupOutcome::Cancelled)`。
    #[instrument(skip(self, identity, messages), fields(username = %identity.username))]
    pub async fn start(
        &self,
        preset_id: &str,
        preset_path: &str,
        identity: &SessionIdentity,
        messages: ExecutionMessages,
    ) -> Result<BackupOutcome> {
        let _slot = InFlightGuard::claim(&self.inner.in_flight, preset_id)?;

        self.inner.cancel_reset();
        self.inner.cancelled.store(false, Ordering::SeqCst);
        self.inner
            .status
            .send_replace(BackupStatus::preparing(preset_id, &messages.initializing));
        *self.inner.messages.lock() = messages.clone();

        if let Err(e) = self.listen().await {
            let reason = e
                .backend_cause()
                .and_then(|cause| cause.user_message())
                .unwrap_or_else(|| messages.unknown_error.clone());
            self.inner
                .status
                .send_modify(|s| s.fail(format!("{}: {}", messages.error_prefix, reason)));
            return Err(e);
        }

        info!("开始执行备份: {}", preset_path);
        let result = self
            .inner
            .backend
            .run_backup(&identity.client_id, preset_path, &identity.username)
            .await;

        match result {
            Ok(()) => Ok(BackupOutcome::Completed),
            Err(e) if self.inner.cancelled.load(Ordering::SeqCst) => {
                debug!("备份已被取消: {}", e);
                self.inner
                    .status
                    .send_modify(|s| s.fail(messages.cancelled.clone()));
                Ok(BackupOutcome::Cancelled)
            }
            Err(e) => {
                let reason = e
                    .user_message()
                    .unwrap_or_else(|| messages.unknown_error.clone());
                error!("备份执行失败: {}", reason);
                self.inner
                    .status
                    .send_modify(|s| s.fail(format!("{}: {}", messages.error_prefix, reason)));
                Err(ClientError::BackupExecutionFailure {
                    message: reason,
                    source: e,
                })
            }
        }
    }

    /// 取消当前备份
    ///
    /// 立即把状态置为 error，不等待后端确认；取消请求在后台发送。
    pub fn cancel(&self, message: &str) {
        self.inner.cancelled.store(true, Ordering::SeqCst);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let backend = self.inner.backend.clone();
                handle.spawn(async move {
                    if let Err(e) = backend.cancel_backup().await {
                        let err = ClientError::BackupCancelled(e);
                        warn!("{}: {:?}", err, err.backend_cause());
                    }
                });
            }
            Err(_) => warn!("没有可用的运行时，无法发送取消请求"),
        }

        self.inner
            .status
            .send_modify(|s| s.fail(message.to_string()));
        info!("已请求取消备份");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::error::{BackendError, ErrorKind};

    fn identity() -> SessionIdentity {
        SessionIdentity {
            username: "alice".into(),
            client_id: "client-42".into(),
        }
    }

    fn apply_all(status: &mut BackupStatus, events: &[BackupEvent]) {
        let messages = ExecutionMessages::default();
        for event in events {
            status.apply(event, &messages);
        }
    }

    async fn wait_for_call(fake: &FakeBackend, command: &str) {
        for _ in 0..100 {
            if fake.count(command) > 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("{command} was never called");
    }

    #[test]
    fn test_log_buffer_keeps_last_fifty() {
        let mut status = BackupStatus::default();
        let events: Vec<_> = (0..60).map(|i| BackupEvent::Log(format!("line {i}"))).collect();
        apply_all(&mut status, &events);

        let logs: Vec<&str> = status.logs().collect();
        assert_eq!(logs.len(), 50);
        assert_eq!(logs.first(), Some(&"line 10"));
        assert_eq!(logs.last(), Some(&"line 59"));
    }

    #[test]
    fn test_progress_moves_idle_to_running() {
        let mut status = BackupStatus::default();
        apply_all(&mut status, &[BackupEvent::Progress("42".into())]);
        assert_eq!(status.state, BackupState::Running);
        assert_eq!(status.progress, 42);

        apply_all(&mut status, &[BackupEvent::Progress("not a number".into())]);
        assert_eq!(status.progress, 42);

        apply_all(&mut status, &[BackupEvent::Progress(" 57%".into())]);
        assert_eq!(status.progress, 57);
    }

    #[test]
    fn test_progress_keeps_non_idle_state() {
        let mut status = BackupStatus::preparing("p1", "Initializing...");
        apply_all(&mut status, &[BackupEvent::Progress("5".into())]);
        assert_eq!(status.state, BackupState::Preparing);
        assert_eq!(status.progress, 5);
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("100"), Some(100));
        assert_eq!(parse_progress("-3"), Some(-3));
        assert_eq!(parse_progress("12.9"), Some(12));
        assert_eq!(parse_progress(""), None);
        assert_eq!(parse_progress("-"), None);
        assert_eq!(parse_progress("abc"), None);
        assert_eq!(parse_progress("99999999999999999999"), Some(i32::MAX));
        assert_eq!(parse_progress("-99999999999999999999"), Some(i32::MIN));
    }

    #[test]
    fn test_success_and_error_events() {
        let mut status = BackupStatus::default();
        apply_all(
            &mut status,
            &[
                BackupEvent::Progress("30".into()),
                BackupEvent::File("/home/alice/a.txt".into()),
            ],
        );
        assert_eq!(status.current_file, "/home/alice/a.txt");

        let messages = ExecutionMessages::default();
        assert!(status.apply(&BackupEvent::Success, &messages));
        assert_eq!(status.state, BackupState::Success);
        assert_eq!(status.progress, 100);
        assert_eq!(status.current_file, "Backup completed successfully");

        assert!(!status.apply(&BackupEvent::Error("disk full".into()), &messages));
        assert_eq!(status.state, BackupState::Error);
        assert_eq!(status.logs().last(), Some("Error: disk full"));
    }

    #[test]
    fn test_unknown_event_type_is_ignored() {
        assert!(BackupEvent::from_backend(&BackendEvent::new("heartbeat", "x")).is_none());
        assert_eq!(
            BackupEvent::from_backend(&BackendEvent::new("file", "/a")),
            Some(BackupEvent::File("/a".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_schedules_single_reset() {
        let fake = Arc::new(FakeBackend::new());
        let coordinator = BackupExecutionCoordinator::new(fake.clone());
        let mut rx = coordinator.subscribe();
        coordinator.listen().await.unwrap();
        coordinator.listen().await.unwrap();
        assert_eq!(fake.count(commands::SUBSCRIBE_EVENTS), 1);

        fake.emit("progress", "10");
        fake.emit("success", "");
        rx.wait_for(|s| s.state == BackupState::Success).await.unwrap();
        assert_eq!(coordinator.status().progress, 100);
        assert!(coordinator.has_pending_reset());

        fake.emit("success", "");
        fake.emit("log", "after");
        rx.wait_for(|s| s.log_count() == 1).await.unwrap();
        assert!(coordinator.has_pending_reset());

        tokio::time::sleep(timing::SUCCESS_RESET_DELAY + Duration::from_millis(1)).await;
        assert_eq!(coordinator.status(), BackupStatus::default());
        assert!(!coordinator.has_pending_reset());
    }

    #[tokio::test]
    async fn test_start_subscribes_once_and_runs() {
        let fake = Arc::new(FakeBackend::new());
        let coordinator = BackupExecutionCoordinator::new(fake.clone());
        let mut rx = coordinator.subscribe();

        let gate = fake.hold_run();
        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .start("p1", "/cfg/patterns_Docs.lst", &identity(), ExecutionMessages::default())
                    .await
            })
        };

        wait_for_call(&fake, commands::RUN_BACKUP_SCRIPT).await;
        let status = coordinator.status();
        assert_eq!(status.state, BackupState::Preparing);
        assert_eq!(status.preset_id.as_deref(), Some("p1"));
        assert_eq!(status.current_file, "Initializing...");

        fake.emit("success", "");
        rx.wait_for(|s| s.state == BackupState::Success).await.unwrap();
        gate.send(Ok(())).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), BackupOutcome::Completed);

        coordinator
            .start("p1", "/cfg/patterns_Docs.lst", &identity(), ExecutionMessages::default())
            .await
            .unwrap();
        assert!(!coordinator.has_pending_reset());
        assert_eq!(fake.count(commands::SUBSCRIBE_EVENTS), 1);
        assert_eq!(fake.count(commands::RUN_BACKUP_SCRIPT), 2);
    }

    #[tokio::test]
    async fn test_second_start_while_active_is_rejected() {
        let fake = Arc::new(FakeBackend::new());
        let coordinator = BackupExecutionCoordinator::new(fake.clone());

        let gate = fake.hold_run();
        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .start("p1", "/cfg/a.lst", &identity(), ExecutionMessages::default())
                    .await
            })
        };
        wait_for_call(&fake, commands::RUN_BACKUP_SCRIPT).await;

        let err = coordinator
            .start("p2", "/cfg/b.lst", &identity(), ExecutionMessages::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackupInProgress);
        assert_eq!(coordinator.status().preset_id.as_deref(), Some("p1"));

        gate.send(Ok(())).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(fake.count(commands::RUN_BACKUP_SCRIPT), 1);
    }

    #[tokio::test]
    async fn test_start_without_terminal_event_does_not_block_next_run() {
        let fake = Arc::new(FakeBackend::new());
        let coordinator = BackupExecutionCoordinator::new(fake.clone());

        let outcome = coordinator
            .start("p1", "/cfg/a.lst", &identity(), ExecutionMessages::default())
            .await
            .unwrap();
        assert_eq!(outcome, BackupOutcome::Completed);
        assert_eq!(coordinator.status().state, BackupState::Preparing);
        assert!(!coordinator.is_running());

        coordinator
            .start("p2", "/cfg/b.lst", &identity(), ExecutionMessages::default())
            .await
            .unwrap();
        assert_eq!(coordinator.status().preset_id.as_deref(), Some("p2"));
        assert_eq!(fake.count(commands::RUN_BACKUP_SCRIPT), 2);
    }

    #[tokio::test]
    async fn test_dropped_start_releases_slot() {
        let fake = Arc::new(FakeBackend::new());
        let coordinator = BackupExecutionCoordinator::new(fake.clone());

        let _gate = fake.hold_run();
        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .start("p1", "/cfg/a.lst", &identity(), ExecutionMessages::default())
                    .await
            })
        };
        wait_for_call(&fake, commands::RUN_BACKUP_SCRIPT).await;
        assert!(coordinator.is_running());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_cancel_is_optimistic() {
        let fake = Arc::new(FakeBackend::new());
        let coordinator = BackupExecutionCoordinator::new(fake.clone());

        let gate = fake.hold_run();
        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .start("p1", "/cfg/a.lst", &identity(), ExecutionMessages::default())
                    .await
            })
        };
        wait_for_call(&fake, commands::RUN_BACKUP_SCRIPT).await;

        coordinator.cancel("Stopped by user");
        let status = coordinator.status();
        assert_eq!(status.state, BackupState::Error);
        assert_eq!(status.current_file, "Stopped by user");

        wait_for_call(&fake, commands::CANCEL_BACKUP).await;
        gate.send(Err(BackendError::remote("killed"))).unwrap();

        assert_eq!(task.await.unwrap().unwrap(), BackupOutcome::Cancelled);
        assert_eq!(coordinator.status().current_file, "Backup cancelled");
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_message() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail(commands::RUN_BACKUP_SCRIPT, 1);
        let coordinator = BackupExecutionCoordinator::new(fake.clone());

        let err = coordinator
            .start("p1", "/cfg/a.lst", &identity(), ExecutionMessages::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BackupExecutionFailure);
        assert_eq!(err.to_string(), "run_backup_script failed #1");
        let status = coordinator.status();
        assert_eq!(status.state, BackupState::Error);
        assert_eq!(status.current_file, "Backup failed: run_backup_script failed #1");
    }

    #[tokio::test]
    async fn test_blank_failure_uses_fallback_message() {
        let fake = Arc::new(FakeBackend::new());
        let coordinator = BackupExecutionCoordinator::new(fake.clone());
        let gate = fake.hold_run();
        gate.send(Err(BackendError::remote("  "))).unwrap();

        let messages = ExecutionMessages {
            error_prefix: "Échec".into(),
            unknown_error: "inconnue".into(),
            ..ExecutionMessages::default()
        };
        let err = coordinator
            .start("p1", "/cfg/a.lst", &identity(), messages)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "inconnue");
        assert_eq!(coordinator.status().current_file, "Échec: inconnue");
    }

    #[tokio::test]
    async fn test_stop_listening_allows_resubscribe() {
        let fake = Arc::new(FakeBackend::new());
        let coordinator = BackupExecutionCoordinator::new(fake.clone());

        coordinator.listen().await.unwrap();
        coordinator.stop_listening();
        coordinator
            .start("p1", "/cfg/a.lst", &identity(), ExecutionMessages::default())
            .await
            .unwrap();

        assert_eq!(fake.count(commands::SUBSCRIBE_EVENTS), 2);
    }
}
