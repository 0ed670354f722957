//! 登录与环境开通流程
//!
//! 认证 → 获取客户端ID → 临时开启 SSH 服务 → 创建 WSL 用户 → 部署脚本 →
//! 交换隧道/Borg 密钥 → 固定服务器公钥 → 配置 Borg → 保存仓库主密钥。
//!
//! SSH 服务只在开通期间开启；如果是本流程开启的，无论成功失败都会关闭它。

use crate::backend::{KeyKind, PrivilegedBackend};
use crate::constants::{api::commands, timing};
use crate::error::{ClientError, Result};
use crate::session::{SessionIdentity, SessionStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// 开通流程的阶段，按发出顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnboardingPhase {
    Authenticating,
    RetrievingIdentity,
    SecuringConnection,
    InitEnvironment,
    ConfigProtocols,
    EstablishTunnel,
    EstablishBorg,
    VerifyServer,
    SetupBackup,
    FinalizeEncryption,
    /// 密钥获取失败，等待后重试
    Retrying,
    Welcome,
}

impl OnboardingPhase {
    /// 界面本地化使用的消息键
    pub fn message_key(&self) -> &'static str {
        match self {
            OnboardingPhase::Authenticating => "login.process.authenticating",
            OnboardingPhase::RetrievingIdentity => "login.process.retrieving_id",
            OnboardingPhase::SecuringConnection => "login.process.securing_connection",
            OnboardingPhase::InitEnvironment => "login.process.init_env",
            OnboardingPhase::ConfigProtocols => "login.process.config_protocols",
            OnboardingPhase::EstablishTunnel => "login.process.establish_tunnel",
            OnboardingPhase::EstablishBorg => "login.process.establish_borg",
            OnboardingPhase::VerifyServer => "login.process.verify_server",
            OnboardingPhase::SetupBackup => "login.process.setup_backup",
            OnboardingPhase::FinalizeEncryption => "login.process.finalize_encryption",
            OnboardingPhase::Retrying => "login.process.retrying",
            OnboardingPhase::Welcome => "login.process.welcome",
        }
    }
}

/// 阶段通知的接收方
pub trait PhaseObserver: Send + Sync {
    fn on_phase(&self, phase: OnboardingPhase);
}

impl<F> PhaseObserver for F
where
    F: Fn(OnboardingPhase) + Send + Sync,
{
    fn on_phase(&self, phase: OnboardingPhase) {
        self(phase)
    }
}

impl PhaseObserver for mpsc::UnboundedSender<OnboardingPhase> {
    fn on_phase(&self, phase: OnboardingPhase) {
        // 接收端关闭时阶段通知不再有意义
        let _ = self.send(phase);
    }
}

/// 登录凭据，只在流程中短暂持有
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 临时开启的特权服务
///
/// 只有本守卫开启的服务才会被关闭。正常路径调用 [`ServiceElevation::release`]；
/// 如果 future 被中途丢弃，`Drop` 会在当前运行时上补发一次关闭请求。
pub struct ServiceElevation {
    backend: Arc<dyn PrivilegedBackend>,
    owned: bool,
    released: bool,
}

impl ServiceElevation {
    /// 检查服务状态，未运行时开启并接管其生命周期
    pub async fn acquire(backend: Arc<dyn PrivilegedBackend>) -> Result<Self> {
        let running = backend
            .is_elevated_service_running()
            .await
            .map_err(|e| ClientError::backend(commands::CHECK_SSH_RUNNING, e))?;

        if running {
            debug!("SSH 服务已在运行，本次流程不负责关闭");
            return Ok(Self::borrowed(backend));
        }

        backend
            .start_elevated_service()
            .await
            .map_err(|e| ClientError::backend(commands::START_SSH_SERVICE, e))?;
        info!("已临时开启 SSH 服务");

        Ok(Self {
            backend,
            owned: true,
            released: false,
        })
    }

    /// 不负责生命周期的守卫，release 不做任何事
    pub fn borrowed(backend: Arc<dyn PrivilegedBackend>) -> Self {
        Self {
            backend,
            owned: false,
            released: false,
        }
    }

    pub fn owns_service(&self) -> bool {
        self.owned
    }

    /// 关闭本守卫开启的服务，错误被丢弃
    pub async fn release(mut self) {
        if !self.owned || self.released {
            return;
        }
        self.released = true;

        match self.backend.stop_elevated_service().await {
            Ok(()) => info!("已关闭临时开启的 SSH 服务"),
            Err(e) => debug!("关闭 SSH 服务失败（忽略）: {}", e),
        }
    }
}

impl Drop for ServiceElevation {
    fn drop(&mut self) {
        if !self.owned || self.released {
            return;
        }
        self.released = true;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("开通流程被中断，后台关闭 SSH 服务");
                let backend = self.backend.clone();
                handle.spawn(async move {
                    let _ = backend.stop_elevated_service().await;
                });
            }
            Err(_) => warn!("开通流程被中断且没有可用的运行时，SSH 服务可能仍在运行"),
        }
    }
}

/// 登录开通流程编排器
#[derive(Clone)]
pub struct ProvisioningOrchestrator {
    backend: Arc<dyn PrivilegedBackend>,
    session: SessionStore,
    retry_delay: Duration,
}

impl ProvisioningOrchestrator {
    pub fn new(backend: Arc<dyn PrivilegedBackend>, session: SessionStore) -> Self {
        Self {
            backend,
            session,
            retry_delay: timing::KEY_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// 执行完整的登录开通流程
    ///
    /// 每一步开始前通过 `observer` 报告阶段，步骤严格串行。
    /// 成功后返回缓存的会话身份。
    #[instrument(skip_all, fields(username = %credentials.username, registering = is_registering))]
    pub async fn run_onboarding(
        &self,
        credentials: &Credentials,
        is_registering: bool,
        observer: &dyn PhaseObserver,
    ) -> Result<SessionIdentity> {
        let username = credentials.username.as_str();

        observer.on_phase(OnboardingPhase::Authenticating);
        self.backend
            .authenticate(username, credentials.password(), is_registering)
            .await
            .map_err(ClientError::AuthenticationFailure)?;
        self.session.set_username(username).await?;
        info!("用户认证成功");

        observer.on_phase(OnboardingPhase::RetrievingIdentity);
        let client_id = self
            .backend
            .fetch_client_id()
            .await
            .map_err(|e| ClientError::backend(commands::GET_CLIENT_ID, e))?;
        self.session.set_client_id(&client_id).await?;
        debug!("已获取客户端ID: {}", client_id);

        observer.on_phase(OnboardingPhase::SecuringConnection);
        let elevation = ServiceElevation::acquire(self.backend.clone()).await?;

        let outcome = self.provision(username, &client_id, observer).await;
        elevation.release().await;
        outcome?;

        observer.on_phase(OnboardingPhase::Welcome);
        info!("登录开通流程完成");
        Ok(SessionIdentity {
            username: username.to_string(),
            client_id,
        })
    }

    /// 需要 SSH 服务的步骤
    async fn provision(
        &self,
        username: &str,
        client_id: &str,
        observer: &dyn PhaseObserver,
    ) -> Result<()> {
        observer.on_phase(OnboardingPhase::InitEnvironment);
        self.backend
            .provision_environment_user(username)
            .await
            .map_err(ClientError::EnvironmentProvisioningFailure)?;

        observer.on_phase(OnboardingPhase::ConfigProtocols);
        self.backend
            .provision_config_scripts(username, client_id)
            .await
            .map_err(ClientError::ScriptProvisioningFailure)?;

        observer.on_phase(OnboardingPhase::EstablishTunnel);
        let tunnel_key = self
            .fetch_key_with_retry(KeyKind::Tunnel, username, client_id, observer)
            .await?;
        self.backend
            .send_ssh_key(&tunnel_key, KeyKind::Tunnel)
            .await
            .map_err(|e| ClientError::backend(commands::SEND_SSH_KEY, e))?;

        observer.on_phase(OnboardingPhase::EstablishBorg);
        let borg_key = self
            .fetch_key_with_retry(KeyKind::Borg, username, client_id, observer)
            .await?;
        self.backend
            .send_ssh_key(&borg_key, KeyKind::Borg)
            .await
            .map_err(|e| ClientError::backend(commands::SEND_SSH_KEY, e))?;

        observer.on_phase(OnboardingPhase::VerifyServer);
        let server_key = self
            .backend
            .fetch_server_public_key()
            .await
            .map_err(|e| ClientError::backend(commands::GET_SERVER_SSH_KEY, e))?;
        self.backend
            .persist_server_key(username, &server_key)
            .await
            .map_err(ClientError::ServerKeyPersistFailure)?;

        observer.on_phase(OnboardingPhase::SetupBackup);
        self.backend
            .finalize_borg_config(username)
            .await
            .map_err(ClientError::BorgConfigFailure)?;

        observer.on_phase(OnboardingPhase::FinalizeEncryption);
        let repo_key = self
            .backend
            .fetch_repository_key()
            .await
            .map_err(|e| ClientError::backend(commands::GET_REPO_KEY, e))?;
        if repo_key.is_empty() {
            return Err(ClientError::MasterKeyMissing);
        }
        self.backend
            .persist_master_key(username, client_id, &repo_key)
            .await
            .map_err(ClientError::MasterKeyPersistFailure)?;

        Ok(())
    }

    /// 获取 WSL 中生成的密钥，失败后等待固定时长再试一次
    ///
    /// WSL 写文件到宿主机存在短暂延迟，第一次读取可能拿不到。
    /// 第二次仍失败时返回包装第二次错误的 `KeyRetrievalFailure`。
    pub async fn fetch_key_with_retry(
        &self,
        kind: KeyKind,
        username: &str,
        client_id: &str,
        observer: &dyn PhaseObserver,
    ) -> Result<String> {
        match self.backend.fetch_ssh_key(kind, username, client_id).await {
            Ok(key) => Ok(key),
            Err(first) => {
                debug!("获取密钥失败，{}ms 后重试: {}", self.retry_delay.as_millis(), first);
                observer.on_phase(OnboardingPhase::Retrying);
                tokio::time::sleep(self.retry_delay).await;

                self.backend
                    .fetch_ssh_key(kind, username, client_id)
                    .await
                    .map_err(|source| ClientError::KeyRetrievalFailure {
                        operation: kind.fetch_command(),
                        source,
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::error::ErrorKind;
    use parking_lot::Mutex;
    use std::error::Error;

    #[derive(Default)]
    struct RecordingObserver {
        phases: Mutex<Vec<OnboardingPhase>>,
    }

    impl PhaseObserver for RecordingObserver {
        fn on_phase(&self, phase: OnboardingPhase) {
            self.phases.lock().push(phase);
        }
    }

    impl RecordingObserver {
        fn phases(&self) -> Vec<OnboardingPhase> {
            self.phases.lock().clone()
        }

        fn count(&self, phase: OnboardingPhase) -> usize {
            self.phases.lock().iter().filter(|p| **p == phase).count()
        }
    }

    fn orchestrator_for(fake: &Arc<FakeBackend>) -> (ProvisioningOrchestrator, SessionStore) {
        let session = SessionStore::in_memory();
        let orchestrator = ProvisioningOrchestrator::new(fake.clone(), session.clone());
        (orchestrator, session)
    }

    fn credentials() -> Credentials {
        Credentials::new("alice", "s3cret")
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_onboarding_success() {
        let fake = Arc::new(FakeBackend::new());
        let (orchestrator, session) = orchestrator_for(&fake);
        let observer = RecordingObserver::default();

        let identity = orchestrator
            .run_onboarding(&credentials(), false, &observer)
            .await
            .unwrap();

        assert_eq!(identity.username, "alice");
        assert_eq!(identity.client_id, "client-42");
        assert_eq!(fake.auth_requests(), vec![("alice".to_string(), false)]);
        assert_eq!(session.identity().await, Some(identity));
        assert_eq!(
            observer.phases(),
            vec![
                OnboardingPhase::Authenticating,
                OnboardingPhase::RetrievingIdentity,
                OnboardingPhase::SecuringConnection,
                OnboardingPhase::InitEnvironment,
                OnboardingPhase::ConfigProtocols,
                OnboardingPhase::EstablishTunnel,
                OnboardingPhase::EstablishBorg,
                OnboardingPhase::VerifyServer,
                OnboardingPhase::SetupBackup,
                OnboardingPhase::FinalizeEncryption,
                OnboardingPhase::Welcome,
            ]
        );
        assert_eq!(fake.count(commands::START_SSH_SERVICE), 1);
        assert_eq!(fake.count(commands::STOP_SSH_SERVICE), 1);
        assert_eq!(fake.count(commands::SEND_SSH_KEY), 2);
        assert_eq!(fake.count(commands::SAVE_MASTER_KEY), 1);
        // 关闭服务发生在最后一个后端步骤之后
        assert_eq!(fake.calls().last().map(String::as_str), Some(commands::STOP_SSH_SERVICE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registering_requests_signup() {
        let fake = Arc::new(FakeBackend::new());
        let (orchestrator, _) = orchestrator_for(&fake);

        orchestrator
            .run_onboarding(&credentials(), true, &|_: OnboardingPhase| {})
            .await
            .unwrap();

        assert_eq!(fake.auth_requests(), vec![("alice".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_running_service_is_never_stopped() {
        let fake = Arc::new(FakeBackend::new().with_service_running(true));
        let (orchestrator, _) = orchestrator_for(&fake);
        orchestrator
            .run_onboarding(&credentials(), false, &|_: OnboardingPhase| {})
            .await
            .unwrap();

        let failing = Arc::new(FakeBackend::new().with_service_running(true));
        failing.fail_always(commands::WSL_SETUP_USER);
        let (orchestrator, _) = orchestrator_for(&failing);
        let err = orchestrator
            .run_onboarding(&credentials(), false, &|_: OnboardingPhase| {})
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EnvironmentProvisioningFailure);
        assert_eq!(fake.count(commands::START_SSH_SERVICE), 0);
        assert_eq!(fake.count(commands::STOP_SSH_SERVICE), 0);
        assert_eq!(failing.count(commands::STOP_SSH_SERVICE), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_service_stopped_once_on_every_failure() {
        let cases = [
            (commands::WSL_SETUP_USER, ErrorKind::EnvironmentProvisioningFailure),
            (commands::WSL_PROVISION_SCRIPTS, ErrorKind::ScriptProvisioningFailure),
            (commands::GET_TUNNEL_SSH_KEY, ErrorKind::KeyRetrievalFailure),
            (commands::GET_BORG_SSH_KEY, ErrorKind::KeyRetrievalFailure),
            (commands::SEND_SSH_KEY, ErrorKind::Backend),
            (commands::GET_SERVER_SSH_KEY, ErrorKind::Backend),
            (commands::SAVE_SERVER_SSH_KEY, ErrorKind::ServerKeyPersistFailure),
            (commands::WSL_CONFIGURE_BORG_CLIENT, ErrorKind::BorgConfigFailure),
            (commands::GET_REPO_KEY, ErrorKind::Backend),
            (commands::SAVE_MASTER_KEY, ErrorKind::MasterKeyPersistFailure),
        ];

        for (command, expected) in cases {
            let fake = Arc::new(FakeBackend::new());
            fake.fail_always(command);
            let (orchestrator, _) = orchestrator_for(&fake);
            let observer = RecordingObserver::default();

            let err = orchestrator
                .run_onboarding(&credentials(), true, &observer)
                .await
                .unwrap_err();

            assert_eq!(err.kind(), expected, "failing command: {command}");
            assert_eq!(fake.count(commands::STOP_SSH_SERVICE), 1, "failing command: {command}");
            assert_eq!(observer.count(OnboardingPhase::Welcome), 0);
        }
    }

    #[tokio::test]
    async fn test_empty_master_key_is_missing() {
        let fake = Arc::new(FakeBackend::new().with_repo_key(Vec::new()));
        let (orchestrator, _) = orchestrator_for(&fake);

        let err = orchestrator
            .run_onboarding(&credentials(), false, &|_: OnboardingPhase| {})
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MasterKeyMissing);
        assert_eq!(fake.count(commands::SAVE_MASTER_KEY), 0);
        assert_eq!(fake.count(commands::STOP_SSH_SERVICE), 1);
    }

    #[tokio::test]
    async fn test_stop_failure_is_discarded() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail_always(commands::STOP_SSH_SERVICE);
        let (orchestrator, _) = orchestrator_for(&fake);

        let result = orchestrator.run_onboarding(&credentials(), false, &|_: OnboardingPhase| {}).await;
        assert!(result.is_ok());
        assert_eq!(fake.count(commands::STOP_SSH_SERVICE), 1);

        let failing = Arc::new(FakeBackend::new());
        failing.fail_always(commands::STOP_SSH_SERVICE);
        failing.fail_always(commands::WSL_CONFIGURE_BORG_CLIENT);
        let (orchestrator, _) = orchestrator_for(&failing);
        let err = orchestrator
            .run_onboarding(&credentials(), false, &|_: OnboardingPhase| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BorgConfigFailure);
    }

    #[tokio::test]
    async fn test_authentication_failure_stops_before_elevation() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail_always(commands::LOGIN_USER);
        let (orchestrator, session) = orchestrator_for(&fake);

        let err = orchestrator
            .run_onboarding(&credentials(), false, &|_: OnboardingPhase| {})
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
        assert_eq!(fake.calls(), vec![commands::LOGIN_USER.to_string()]);
        assert!(session.username().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_retry_succeeds_on_second_attempt() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail(commands::GET_TUNNEL_SSH_KEY, 1);
        let (orchestrator, _) = orchestrator_for(&fake);
        let observer = RecordingObserver::default();

        let started = tokio::time::Instant::now();
        let key = orchestrator
            .fetch_key_with_retry(KeyKind::Tunnel, "alice", "client-42", &observer)
            .await
            .unwrap();

        assert_eq!(key, "get_tunnel_ssh_key-key#2");
        assert_eq!(observer.phases(), vec![OnboardingPhase::Retrying]);
        assert_eq!(fake.count(commands::GET_TUNNEL_SSH_KEY), 2);
        assert!(started.elapsed() >= timing::KEY_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_retry_exhausted_wraps_second_cause() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail_always(commands::GET_BORG_SSH_KEY);
        let (orchestrator, _) = orchestrator_for(&fake);
        let observer = RecordingObserver::default();

        let err = orchestrator
            .fetch_key_with_retry(KeyKind::Borg, "alice", "client-42", &observer)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::KeyRetrievalFailure);
        let cause = err.source().unwrap().to_string();
        assert!(cause.contains("#2"), "unexpected cause: {cause}");
        assert!(!cause.contains("#1"));
        assert_eq!(observer.count(OnboardingPhase::Retrying), 1);
        assert_eq!(fake.count(commands::GET_BORG_SSH_KEY), 2);
    }

    #[tokio::test]
    async fn test_no_retry_notification_on_first_success() {
        let fake = Arc::new(FakeBackend::new());
        let (orchestrator, _) = orchestrator_for(&fake);
        let (tx, mut rx) = mpsc::unbounded_channel();

        orchestrator
            .fetch_key_with_retry(KeyKind::Tunnel, "alice", "client-42", &tx)
            .await
            .unwrap();

        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_guard_stops_owned_service() {
        let fake = Arc::new(FakeBackend::new());
        let backend: Arc<dyn PrivilegedBackend> = fake.clone();

        let guard = ServiceElevation::acquire(backend.clone()).await.unwrap();
        assert!(guard.owns_service());
        drop(guard);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fake.count(commands::STOP_SSH_SERVICE), 1);

        let borrowed = ServiceElevation::borrowed(backend);
        borrowed.release().await;
        assert_eq!(fake.count(commands::STOP_SSH_SERVICE), 1);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let printed = format!("{:?}", credentials());
        assert!(printed.contains("alice"));
        assert!(!printed.contains("s3cret"));
    }
}
