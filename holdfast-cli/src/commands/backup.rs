use crate::app::CliApp;
use client_core::error::{ClientError, Result};
use client_core::execution::{BackupOutcome, BackupState, BackupStatus, ExecutionMessages};
use client_core::preset_store::find_preset;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {spinner} ▕{bar:40.blue}▏{pos:>3}% {wide_msg}";
const STEADY_TICK_MS: u64 = 100;

/// 后端返回后等待最终事件的时间
const FINAL_EVENT_WAIT: Duration = Duration::from_secs(3);

fn new_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
        .map(|style| style.progress_chars("█▓▒░  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(STEADY_TICK_MS));
    pb
}

fn render(pb: &ProgressBar, status: &BackupStatus) {
    if matches!(status.state, BackupState::Running | BackupState::Success) {
        pb.set_position(status.progress.clamp(0, 100) as u64);
    }
    pb.set_message(status.current_file.clone());
}

/// 把状态变化渲染到进度条，直到协调器被释放
async fn drive_progress(pb: ProgressBar, mut rx: watch::Receiver<BackupStatus>) {
    loop {
        render(&pb, &rx.borrow_and_update());
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// 立即执行预设的备份，Ctrl-C 取消
#[instrument(skip(app))]
pub async fn run_backup(app: &CliApp, key: &str) -> Result<()> {
    let identity = app
        .session
        .identity()
        .await
        .ok_or_else(|| ClientError::custom("尚未登录，请先运行 holdfast login"))?;

    let presets = app.presets.load().await?;
    let preset = find_preset(&presets, key)
        .ok_or_else(|| ClientError::custom(format!("未找到预设: {key}")))?;

    // 备份引擎读取模式文件，执行前重新生成
    app.presets.save_one(&presets, preset, None).await?;
    let preset_path = std::path::absolute(app.presets.pattern_file_path(preset))?;
    let preset_path = preset_path.to_string_lossy().to_string();

    let coordinator = app.coordinator();
    let pb = new_progress_bar();
    let renderer = tokio::spawn(drive_progress(pb.clone(), coordinator.subscribe()));
    let mut final_state = coordinator.subscribe();

    info!("🚀 开始备份: {}", preset.name);
    let result = {
        let run =
            coordinator.start(preset.id(), &preset_path, &identity, ExecutionMessages::default());
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("收到中断信号，正在取消备份...");
                coordinator.cancel("Backup cancelled by user");
                run.await
            }
        }
    };

    if matches!(result, Ok(BackupOutcome::Completed)) {
        let settled = tokio::time::timeout(
            FINAL_EVENT_WAIT,
            final_state.wait_for(|s| !s.state.is_active()),
        )
        .await;
        if settled.is_err() {
            warn!("后端已返回，但未收到备份结束事件");
        }
    }

    coordinator.stop_listening();
    let status = coordinator.status();
    drop(coordinator);
    let _ = renderer.await;

    match (&result, status.state) {
        (Ok(BackupOutcome::Completed), BackupState::Success) => {
            pb.finish_with_message(status.current_file.clone());
            info!("✅ 备份完成: {}", preset.name);
        }
        (Ok(BackupOutcome::Cancelled), _) => {
            pb.abandon_with_message(status.current_file.clone());
            warn!("⏹️ 备份已取消: {}", preset.name);
        }
        _ => {
            pb.abandon_with_message(status.current_file.clone());
            for line in status.logs() {
                error!("   {}", line);
            }
        }
    }

    match result? {
        BackupOutcome::Completed if status.state == BackupState::Error => Err(
            ClientError::custom(format!("备份失败: {}", status.current_file)),
        ),
        _ => Ok(()),
    }
}
