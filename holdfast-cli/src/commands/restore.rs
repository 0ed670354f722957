use crate::app::CliApp;
use crate::utils::read_line_from_stdin;
use client_core::backend::BackupSummary;
use client_core::error::{ClientError, Result};
use client_core::history::{FileFilter, filter_files};
use client_core::restore::{RestoreOutcome, RestoreTarget, total_size};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument, warn};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 人类可读的字节数
fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn is_confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_summary(summary: &BackupSummary) {
    println!("备份 {}  {}  状态: {}", summary.id, summary.date, summary.status);
    println!(
        "  文件: {}  大小: {}  耗时: {:.1}s",
        summary.total_files,
        format_size(summary.total_size),
        summary.duration
    );
    println!(
        "  新增 {}  修改 {}  删除 {}  错误 {}",
        summary.count_added, summary.count_modified, summary.count_deleted, summary.count_error
    );
}

/// 列出服务器上的归档
pub async fn list_archives(app: &CliApp) -> Result<()> {
    let archives = app.restore_service().list_archives().await?;
    if archives.is_empty() {
        info!("服务器上还没有备份归档");
        return Ok(());
    }
    for item in &archives {
        println!("{:<40} {}", item.archive, item.time);
    }
    Ok(())
}

/// 列出归档中的文件
pub async fn list_archive_files(app: &CliApp, archive: &str) -> Result<()> {
    let entries = app.restore_service().list_files(archive).await?;
    for entry in &entries {
        let marker = if entry.is_dir() { 'd' } else { '-' };
        println!(
            "{} {:>10} {}  {}",
            marker,
            format_size(entry.size),
            entry.mtime,
            entry.path
        );
    }
    info!("共 {} 项，文件总大小 {}", entries.len(), format_size(total_size(&entries)));
    Ok(())
}

/// 恢复归档，Ctrl-C 取消
#[instrument(skip(app))]
pub async fn restore_archive(
    app: &CliApp,
    archive: &str,
    to: Option<PathBuf>,
    yes: bool,
) -> Result<()> {
    let target_path = to.map(std::path::absolute).transpose()?;
    let target = match target_path.as_deref() {
        Some(path) => RestoreTarget::SaveTo(path),
        None => {
            if !yes {
                let answer =
                    read_line_from_stdin(&format!("将覆盖原位置的文件，确认恢复 {archive}? [y/N] "))?;
                if !is_confirmed(&answer) {
                    info!("已放弃恢复");
                    return Ok(());
                }
            }
            RestoreTarget::InPlace
        }
    };

    let service = app.restore_service();
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("正在恢复 {archive}..."));

    let result = {
        let run = service.restore(archive, target);
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("收到中断信号，正在取消恢复...");
                service.cancel().await;
                run.await
            }
        }
    };

    match result {
        Ok(RestoreOutcome::Completed(message)) => {
            spinner.finish_and_clear();
            info!("✅ 恢复完成: {}", message);
            Ok(())
        }
        Ok(RestoreOutcome::Cancelled) => {
            spinner.abandon_with_message("已取消");
            warn!("⏹️ 恢复已取消: {}", archive);
            Ok(())
        }
        Err(e) => {
            spinner.abandon();
            Err(e)
        }
    }
}

/// 查看备份历史；指定 id 时列出该次备份的文件
pub async fn show_history(
    app: &CliApp,
    id: Option<&str>,
    latest: bool,
    filter: Option<String>,
    status: Option<char>,
) -> Result<()> {
    let service = app.history_service();

    if latest {
        match service.latest().await? {
            Some(summary) => print_summary(&summary),
            None => info!("还没有备份记录"),
        }
        return Ok(());
    }

    let entries = service.entries().await?;
    let Some(id) = id else {
        if entries.is_empty() {
            info!("还没有备份记录");
        }
        for entry in &entries {
            println!(
                "{}  {}  {:<8} {:>10}  +{} ~{} -{} !{}",
                entry.id,
                entry.date,
                entry.status,
                format_size(entry.total_size),
                entry.count_added,
                entry.count_modified,
                entry.count_deleted,
                entry.count_error
            );
        }
        return Ok(());
    };

    let entry = entries
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| ClientError::custom(format!("未找到备份记录: {id}")))?;
    print_summary(&BackupSummary::from(entry.clone()));

    let filter = FileFilter {
        term: filter.unwrap_or_default(),
        status,
    };
    let mut shown = 0usize;
    for file in filter_files(&entry, &filter) {
        println!("  {} {}", file.status, file.path);
        shown += 1;
    }
    info!("显示 {}/{} 个文件", shown, entry.files.len());
    Ok(())
}
