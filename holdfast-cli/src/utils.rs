use client_core::constants::env;
use client_core::error::{ClientError, Result};
use std::io::{BufRead, Write};
use tracing_appender::non_blocking::WorkerGuard;

/// # HoldFast CLI 日志系统使用说明
///
/// 1. **库代码只使用 `tracing` 宏**：`info!()`, `warn!()`, `error!()`, `debug!()`
/// 2. **应用入口控制日志配置**：在 `main.rs` 中调用 `setup_logging()`
///
/// ## 日志配置选项
///
/// - `-v, --verbose`：启用详细日志模式（DEBUG 级别）
/// - `RUST_LOG`：标准的 Rust 日志级别控制
/// - `HOLDFAST_LOG_FILE`：日志文件路径，设置后日志输出到文件而非终端
///
/// ```bash
/// holdfast preset list
/// holdfast -v backup run Docs
/// HOLDFAST_LOG_FILE=holdfast.log holdfast preset sync
/// RUST_LOG=client_core::execution=debug holdfast backup run Docs
/// ```
///
/// ## 日志格式
/// - **终端输出**：人类可读格式，不显示模块路径，写到 stderr
/// - **文件输出**：包含完整模块路径和行号
///
/// 返回的 guard 需要在 main 中一直持有，否则文件日志可能丢失
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_file = std::env::var(env::LOG_FILE).ok();
    let file = log_file.as_ref().map(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
    });

    match file {
        Some(Ok(file)) => {
            // 输出到文件，使用详细格式便于调试
            let (writer, guard) = tracing_appender::non_blocking(file);
            fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_line_number(true)
                .init();
            Some(guard)
        }
        other => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(false)
                .with_line_number(false)
                .without_time()
                .compact()
                .init();

            if let Some(Err(e)) = other {
                tracing::warn!("无法打开日志文件，改为输出到终端: {}", e);
            }
            None
        }
    }
}

/// 从标准输入读取一行（去掉行尾换行），用于交互式输入密码
pub fn read_line_from_stdin(prompt: &str) -> Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(ClientError::custom("标准输入已关闭，未读取到内容"));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
