use clap::Parser;
use holdfast_cli::{Cli, CliApp, project_info, setup_logging};
use std::error::Error;
use std::process::ExitCode;
use tracing::{debug, error};

/// 输出错误及其完整的原因链
fn report_error(context: &str, err: &dyn Error) {
    error!("❌ {}: {}", context, err);
    let mut source = err.source();
    while let Some(cause) = source {
        error!("   原因: {}", cause);
        source = cause.source();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录，guard 在 main 返回时刷新文件日志
    let _log_guard = setup_logging(cli.verbose);
    debug!("{}", project_info::get_version_string());

    let mut app = match CliApp::new_with_config_dir(cli.config_dir).await {
        Ok(app) => app,
        Err(e) => {
            report_error("应用初始化失败", &e);
            return ExitCode::FAILURE;
        }
    };

    // 运行命令
    match app.run_command(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error("操作失败", &e);
            ExitCode::FAILURE
        }
    }
}
