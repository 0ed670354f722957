use client_core::{
    api::HttpBackend,
    backend::PrivilegedBackend,
    config::AppConfig,
    constants::app,
    error::{ClientError, Result},
    execution::BackupExecutionCoordinator,
    history::HistoryService,
    pattern::PatternCompiler,
    preset_store::PresetStore,
    provisioning::ProvisioningOrchestrator,
    restore::RestoreService,
    schedule::ScheduleSynchronizer,
    session::SessionStore,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{BackupCommand, Commands, ConfigCommand, PresetCommand};
use crate::commands;
use tracing::{debug, info};

#[derive(Clone)]
pub struct CliApp {
    pub config_dir: PathBuf,
    pub config: AppConfig,
    pub backend: Arc<dyn PrivilegedBackend>,
    pub session: SessionStore,
    pub presets: PresetStore,
}

impl CliApp {
    /// 加载配置目录中的配置与会话，并创建后端客户端
    ///
    /// 未指定目录时使用系统配置目录下的 holdfast
    pub async fn new_with_config_dir(config_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.unwrap_or_else(app::get_default_config_dir);
        debug!("使用配置目录: {}", config_dir.display());

        let config = AppConfig::load_or_create(AppConfig::path_in(&config_dir))?;
        let backend = HttpBackend::new(&config.backend)
            .map_err(|e| ClientError::backend("http_client", e))?;
        let session = SessionStore::load(config_dir.join(app::SESSION_FILE_NAME)).await;
        let presets = PresetStore::new(&config_dir, PatternCompiler::default());

        Ok(Self {
            config_dir,
            config,
            backend: Arc::new(backend),
            session,
            presets,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        AppConfig::path_in(&self.config_dir)
    }

    pub fn orchestrator(&self) -> ProvisioningOrchestrator {
        ProvisioningOrchestrator::new(self.backend.clone(), self.session.clone())
    }

    pub fn synchronizer(&self) -> ScheduleSynchronizer {
        ScheduleSynchronizer::new(
            self.backend.clone(),
            self.session.clone(),
            self.presets.clone(),
        )
    }

    pub fn coordinator(&self) -> BackupExecutionCoordinator {
        BackupExecutionCoordinator::new(self.backend.clone())
    }

    pub fn restore_service(&self) -> RestoreService {
        RestoreService::new(self.backend.clone())
    }

    pub fn history_service(&self) -> HistoryService {
        HistoryService::new(self.backend.clone())
    }

    /// 运行应用命令
    pub async fn run_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Login {
                username,
                password,
                register,
            } => commands::run_login(self, username, password, register).await,
            Commands::Logout => commands::run_logout(self).await,
            Commands::Preset(cmd) => self.run_preset_command(cmd).await,
            Commands::Backup(cmd) => self.run_backup_command(cmd).await,
            Commands::Config(cmd) => self.run_config_command(cmd),
        }
    }

    /// 运行预设相关命令
    async fn run_preset_command(&mut self, cmd: PresetCommand) -> Result<()> {
        match cmd {
            PresetCommand::List => commands::list_presets(self).await,
            PresetCommand::Show { preset } => commands::show_preset(self, &preset).await,
            PresetCommand::Create { name, options } => {
                info!("📝 创建预设: {}", name);
                commands::create_preset(self, name, options).await
            }
            PresetCommand::Edit {
                preset,
                name,
                options,
            } => commands::edit_preset(self, &preset, name, options).await,
            PresetCommand::Delete { preset } => commands::delete_preset(self, &preset).await,
            PresetCommand::Patterns { preset } => commands::print_patterns(self, &preset).await,
            PresetCommand::Sync { preset } => {
                info!("🔄 同步计划任务...");
                commands::sync_presets(self, preset.as_deref()).await
            }
        }
    }

    /// 运行备份相关命令
    async fn run_backup_command(&mut self, cmd: BackupCommand) -> Result<()> {
        match cmd {
            BackupCommand::Run { preset } => commands::run_backup(self, &preset).await,
            BackupCommand::Archives => commands::list_archives(self).await,
            BackupCommand::Files { archive } => commands::list_archive_files(self, &archive).await,
            BackupCommand::Restore { archive, to, yes } => {
                commands::restore_archive(self, &archive, to, yes).await
            }
            BackupCommand::History {
                id,
                latest,
                filter,
                status,
            } => commands::show_history(self, id.as_deref(), latest, filter, status).await,
        }
    }

    /// 运行配置相关命令
    fn run_config_command(&mut self, cmd: ConfigCommand) -> Result<()> {
        match cmd {
            ConfigCommand::Show => commands::show_config(self),
            ConfigCommand::Set { key, value } => commands::set_config(self, &key, &value),
            ConfigCommand::Path => commands::show_config_path(self),
        }
    }
}
