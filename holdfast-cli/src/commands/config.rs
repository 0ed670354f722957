use crate::app::CliApp;
use client_core::error::{ClientError, Result};
use tracing::info;

/// 显示当前配置（TOML）
pub fn show_config(app: &CliApp) -> Result<()> {
    let content = toml::to_string_pretty(&app.config)
        .map_err(|e| ClientError::config_save(app.config_path(), e))?;
    println!("# {}", app.config_path().display());
    print!("{content}");
    Ok(())
}

/// 修改单个配置项并保存
pub fn set_config(app: &mut CliApp, key: &str, value: &str) -> Result<()> {
    app.config.set_value(key, value)?;
    app.config.save_to_file(app.config_path())?;
    info!("✅ 已更新配置项: {}", key);
    Ok(())
}

/// 显示配置目录和文件位置
pub fn show_config_path(app: &CliApp) -> Result<()> {
    println!("{}", app.config_dir.display());
    Ok(())
}
