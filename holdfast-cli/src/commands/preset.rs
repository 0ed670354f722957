use crate::app::CliApp;
use crate::cli::PresetOptions;
use client_core::error::{ClientError, Result};
use client_core::preset::{BackupPreset, ExtensionRule};
use client_core::preset_store::{find_preset, find_preset_mut};
use client_core::schedule::{SyncOutcome, compute_cron};
use tracing::{info, warn};

fn not_found(key: &str) -> ClientError {
    ClientError::custom(format!("未找到预设: {key}"))
}

/// 把命令行选项写入预设，返回被跳过的重复扩展名规则
pub fn apply_options(preset: &mut BackupPreset, options: PresetOptions) -> Vec<String> {
    if let Some(frequency) = options.frequency {
        preset.frequency = frequency;
    }
    if let Some(time) = options.time {
        preset.schedule_time = time;
    }
    if let Some(day) = options.day {
        preset.schedule_day = day;
    }
    if !options.sources.is_empty() {
        preset.sources = options.sources;
    }
    if !options.exclusions.is_empty() {
        preset.exclusions = options.exclusions;
    }
    if let Some(include_only) = options.include_only {
        preset.include_only_mode = include_only;
    }
    if let Some(paused) = options.paused {
        preset.paused = paused;
    }

    let rules = options
        .include_ext
        .into_iter()
        .map(ExtensionRule::include)
        .chain(options.exclude_ext.into_iter().map(ExtensionRule::exclude));

    let mut skipped = Vec::new();
    for rule in rules {
        let pattern = rule.pattern.clone();
        if !preset.add_extension_rule(rule) {
            skipped.push(pattern);
        }
    }
    skipped
}

fn report_sync(preset: &BackupPreset, outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Synced => info!(
            "⏰ 计划任务已同步: {} [{}]",
            preset.name,
            display_cron(preset)
        ),
        SyncOutcome::SkippedNoIdentity => {
            warn!("⚠️ 尚未登录，跳过计划同步: {}（请先运行 holdfast login）", preset.name)
        }
    }
}

fn display_cron(preset: &BackupPreset) -> String {
    let cron = compute_cron(preset);
    if cron.is_empty() {
        "manual".to_string()
    } else {
        cron
    }
}

/// 列出所有预设
pub async fn list_presets(app: &CliApp) -> Result<()> {
    let presets = app.presets.load().await?;
    if presets.is_empty() {
        info!("暂无预设，使用 holdfast preset create <name> 创建");
        return Ok(());
    }

    for preset in &presets {
        let state = if preset.paused { " (已暂停)" } else { "" };
        println!(
            "{}  {:<24} {:<8} {}{}",
            preset.id(),
            preset.name,
            preset.frequency,
            display_cron(preset),
            state
        );
    }
    Ok(())
}

/// 显示预设详情（JSON）
pub async fn show_preset(app: &CliApp, key: &str) -> Result<()> {
    let presets = app.presets.load().await?;
    let preset = find_preset(&presets, key).ok_or_else(|| not_found(key))?;

    println!("{}", serde_json::to_string_pretty(preset)?);
    println!("# cron: {}", display_cron(preset));
    println!(
        "# pattern file: {}",
        app.presets.pattern_file_path(preset).display()
    );
    Ok(())
}

/// 创建预设、保存并同步计划任务
pub async fn create_preset(app: &CliApp, name: String, options: PresetOptions) -> Result<()> {
    let mut presets = app.presets.load().await?;

    let mut preset = BackupPreset::named(name);
    for pattern in apply_options(&mut preset, options) {
        warn!("⚠️ 扩展名规则重复，已跳过: {}", pattern);
    }

    app.presets.upsert(&mut presets, preset.clone()).await?;
    info!("✅ 预设已创建: {} ({})", preset.name, preset.id());

    let outcome = app.synchronizer().sync_to_system(&preset).await?;
    report_sync(&preset, outcome);
    Ok(())
}

/// 修改预设、保存并同步计划任务
pub async fn edit_preset(
    app: &CliApp,
    key: &str,
    name: Option<String>,
    options: PresetOptions,
) -> Result<()> {
    let mut presets = app.presets.load().await?;
    let preset = find_preset_mut(&mut presets, key).ok_or_else(|| not_found(key))?;

    let previous_name = preset.name.clone();
    if let Some(name) = name {
        preset.name = name;
    }
    for pattern in apply_options(preset, options) {
        warn!("⚠️ 扩展名规则重复，已跳过: {}", pattern);
    }
    let changed = preset.clone();

    app.presets
        .save_one(&presets, &changed, Some(&previous_name))
        .await?;
    info!("✅ 预设已更新: {}", changed.name);

    let outcome = app.synchronizer().sync_to_system(&changed).await?;
    report_sync(&changed, outcome);
    Ok(())
}

/// 删除预设并停用其计划任务
pub async fn delete_preset(app: &CliApp, key: &str) -> Result<()> {
    let mut presets = app.presets.load().await?;
    let id = find_preset(&presets, key)
        .map(|p| p.id().to_string())
        .ok_or_else(|| not_found(key))?;

    let Some(removed) = app.presets.remove(&mut presets, &id).await? else {
        return Err(not_found(key));
    };

    match app.synchronizer().disable(&removed).await? {
        SyncOutcome::Synced => info!("⏰ 计划任务已停用: {}", removed.name),
        SyncOutcome::SkippedNoIdentity => warn!("⚠️ 尚未登录，系统中的计划任务未停用"),
    }
    info!("🗑️ 预设已删除: {}", removed.name);
    Ok(())
}

/// 输出预设生成的模式文件内容
pub async fn print_patterns(app: &CliApp, key: &str) -> Result<()> {
    let presets = app.presets.load().await?;
    let preset = find_preset(&presets, key).ok_or_else(|| not_found(key))?;
    print!("{}", app.presets.compiler().compile(preset));
    Ok(())
}

/// 重写模式文件并同步计划任务
pub async fn sync_presets(app: &CliApp, key: Option<&str>) -> Result<()> {
    let presets = app.presets.load().await?;
    let targets: Vec<&BackupPreset> = match key {
        Some(key) => vec![find_preset(&presets, key).ok_or_else(|| not_found(key))?],
        None => presets.iter().collect(),
    };

    // 计划任务引用模式文件路径，先保证文件是最新的
    app.presets.save_all(&presets).await?;

    let synchronizer = app.synchronizer();
    let mut failures = 0usize;
    for preset in targets {
        match synchronizer.sync_to_system(preset).await {
            Ok(outcome) => report_sync(preset, outcome),
            Err(e) => {
                failures += 1;
                warn!("❌ 计划同步失败: {} ({})", preset.name, e);
            }
        }
    }

    if failures > 0 {
        return Err(ClientError::custom(format!("{failures} 个预设的计划同步失败")));
    }
    Ok(())
}
