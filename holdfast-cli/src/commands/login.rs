use crate::app::CliApp;
use crate::utils::read_line_from_stdin;
use client_core::error::Result;
use client_core::provisioning::{Credentials, OnboardingPhase};
use tokio::sync::mpsc;
use tracing::{info, instrument};

/// 阶段的终端显示文本
pub fn describe_phase(phase: OnboardingPhase) -> &'static str {
    match phase {
        OnboardingPhase::Authenticating => "正在验证账号...",
        OnboardingPhase::RetrievingIdentity => "正在获取客户端标识...",
        OnboardingPhase::SecuringConnection => "正在准备安全连接...",
        OnboardingPhase::InitEnvironment => "正在初始化 Linux 环境...",
        OnboardingPhase::ConfigProtocols => "正在部署配置脚本...",
        OnboardingPhase::EstablishTunnel => "正在建立隧道密钥...",
        OnboardingPhase::EstablishBorg => "正在建立备份引擎密钥...",
        OnboardingPhase::VerifyServer => "正在验证服务器身份...",
        OnboardingPhase::SetupBackup => "正在配置备份客户端...",
        OnboardingPhase::FinalizeEncryption => "正在保存加密主密钥...",
        OnboardingPhase::Retrying => "密钥尚未就绪，稍后重试...",
        OnboardingPhase::Welcome => "欢迎使用 HoldFast",
    }
}

/// 登录并开通备份环境
#[instrument(skip(app, password))]
pub async fn run_login(
    app: &CliApp,
    username: String,
    password: Option<String>,
    register: bool,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_line_from_stdin("密码: ")?,
    };
    let credentials = Credentials::new(username, password);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(phase) = rx.recv().await {
            info!("⏳ {}", describe_phase(phase));
        }
    });

    let result = app
        .orchestrator()
        .run_onboarding(&credentials, register, &tx)
        .await;
    drop(tx);
    let _ = printer.await;

    let identity = result?;
    info!(
        "✅ 登录成功: {} (客户端ID: {})",
        identity.username, identity.client_id
    );
    Ok(())
}

/// 退出登录
pub async fn run_logout(app: &CliApp) -> Result<()> {
    app.session.clear().await?;
    info!("👋 已退出登录");
    Ok(())
}
