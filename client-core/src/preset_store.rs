use crate::constants::app;
use crate::error::{ClientError, Result};
use crate::pattern::{PatternCompiler, is_pattern_filename, safe_filename};
use crate::preset::BackupPreset;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// 预设持久化
///
/// `presets.json` 是唯一数据源，每个预设另有一个生成的模式文件。
/// 任何保存路径都会先写 JSON 文档，保证它与内存中的列表一致。
#[derive(Debug, Clone)]
pub struct PresetStore {
    dir: PathBuf,
    compiler: PatternCompiler,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>, compiler: PatternCompiler) -> Self {
        Self {
            dir: dir.into(),
            compiler,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn compiler(&self) -> &PatternCompiler {
        &self.compiler
    }

    /// presets.json 的路径
    pub fn presets_file(&self) -> PathBuf {
        self.dir.join(app::PRESETS_FILE_NAME)
    }

    /// 预设对应的模式文件路径
    pub fn pattern_file_path(&self, preset: &BackupPreset) -> PathBuf {
        self.dir.join(safe_filename(&preset.name))
    }

    /// 读取全部预设，文件不存在时返回空列表
    pub async fn load(&self) -> Result<Vec<BackupPreset>> {
        let path = self.presets_file();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("预设文件不存在，返回空列表: {}", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(ClientError::config_load(path, e)),
        };

        let presets: Vec<BackupPreset> =
            serde_json::from_str(&content).map_err(|e| ClientError::config_load(&path, e))?;
        debug!("已加载 {} 个预设", presets.len());
        Ok(presets)
    }

    /// 完整保存：写 JSON 文档和所有模式文件，并清理不再对应任何预设的模式文件
    pub async fn save_all(&self, presets: &[BackupPreset]) -> Result<()> {
        let mut owners: HashMap<String, &str> = HashMap::new();
        for preset in presets {
            let file_name = safe_filename(&preset.name);
            if let Some(existing) = owners.insert(file_name.clone(), &preset.name) {
                return Err(ClientError::PatternFileConflict {
                    name: preset.name.clone(),
                    existing: existing.to_string(),
                    file_name,
                });
            }
        }

        self.write_document(presets).await?;

        for preset in presets {
            self.write_pattern_file(preset).await?;
        }

        self.prune_stale_pattern_files(presets).await?;
        info!("已保存 {} 个预设", presets.len());
        Ok(())
    }

    /// 单个保存：写 JSON 文档和变更预设的模式文件
    ///
    /// `previous_name` 是修改前的名称，文件名因改名变化时删除旧的模式文件。
    pub async fn save_one(
        &self,
        presets: &[BackupPreset],
        changed: &BackupPreset,
        previous_name: Option<&str>,
    ) -> Result<()> {
        ensure_unique_filename(presets, changed)?;
        self.write_document(presets).await?;
        self.write_pattern_file(changed).await?;

        if let Some(previous) = previous_name {
            let old_file = safe_filename(previous);
            if old_file != safe_filename(&changed.name) && !is_file_in_use(presets, &old_file) {
                self.remove_pattern_file(&old_file).await?;
            }
        }

        debug!("已保存预设: {} ({})", changed.name, changed.id());
        Ok(())
    }

    /// 按 id 插入或替换预设，再按单个保存的方式持久化
    pub async fn upsert(&self, presets: &mut Vec<BackupPreset>, preset: BackupPreset) -> Result<()> {
        ensure_unique_filename(presets, &preset)?;
        let previous_name = match presets.iter_mut().find(|p| p.id() == preset.id()) {
            Some(existing) => Some(std::mem::replace(existing, preset.clone()).name),
            None => {
                presets.push(preset.clone());
                None
            }
        };
        self.save_one(presets, &preset, previous_name.as_deref()).await
    }

    /// 从列表中删除预设并保存，同时删除它的模式文件
    pub async fn remove(
        &self,
        presets: &mut Vec<BackupPreset>,
        id: &str,
    ) -> Result<Option<BackupPreset>> {
        let Some(index) = presets.iter().position(|p| p.id() == id) else {
            return Ok(None);
        };
        let removed = presets.remove(index);
        self.write_document(presets).await?;

        let file_name = safe_filename(&removed.name);
        if !is_file_in_use(presets, &file_name) {
            self.remove_pattern_file(&file_name).await?;
        }

        info!("已删除预设: {} ({})", removed.name, removed.id());
        Ok(Some(removed))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ClientError::config_save(&self.dir, e))
    }

    async fn write_document(&self, presets: &[BackupPreset]) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.presets_file();
        let content =
            serde_json::to_string_pretty(presets).map_err(|e| ClientError::config_save(&path, e))?;
        write_atomic(&path, content.as_bytes()).await
    }

    async fn write_pattern_file(&self, preset: &BackupPreset) -> Result<()> {
        let path = self.pattern_file_path(preset);
        let content = self.compiler.compile(preset);
        fs::write(&path, content)
            .await
            .map_err(|e| ClientError::config_save(&path, e))
    }

    async fn remove_pattern_file(&self, file_name: &str) -> Result<()> {
        let path = self.dir.join(file_name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("已删除模式文件: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::config_save(path, e)),
        }
    }

    async fn prune_stale_pattern_files(&self, presets: &[BackupPreset]) -> Result<()> {
        let live: HashSet<String> = presets.iter().map(|p| safe_filename(&p.name)).collect();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("无法扫描配置目录，跳过模式文件清理: {}", e);
                return Ok(());
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if is_pattern_filename(&file_name) && !live.contains(&file_name) {
                info!("清理过期的模式文件: {}", file_name);
                self.remove_pattern_file(&file_name).await?;
            }
        }
        Ok(())
    }
}

/// 不同预设的名称不能清理成同一个模式文件名
fn ensure_unique_filename(presets: &[BackupPreset], preset: &BackupPreset) -> Result<()> {
    let file_name = safe_filename(&preset.name);
    match presets
        .iter()
        .find(|p| p.id() != preset.id() && safe_filename(&p.name) == file_name)
    {
        Some(existing) => Err(ClientError::PatternFileConflict {
            name: preset.name.clone(),
            existing: existing.name.clone(),
            file_name,
        }),
        None => Ok(()),
    }
}

fn is_file_in_use(presets: &[BackupPreset], file_name: &str) -> bool {
    presets.iter().any(|p| safe_filename(&p.name) == file_name)
}

/// 先写临时文件再重命名
async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)
        .await
        .map_err(|e| ClientError::config_save(path, e))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ClientError::config_save(path, e))
}

/// 按 id 或名称查找预设，id 优先
pub fn find_preset<'a>(presets: &'a [BackupPreset], key: &str) -> Option<&'a BackupPreset> {
    presets
        .iter()
        .find(|p| p.id() == key)
        .or_else(|| presets.iter().find(|p| p.name == key))
}

/// [`find_preset`] 的可变版本
pub fn find_preset_mut<'a>(
    presets: &'a mut [BackupPreset],
    key: &str,
) -> Option<&'a mut BackupPreset> {
    let index = presets
        .iter()
        .position(|p| p.id() == key)
        .or_else(|| presets.iter().position(|p| p.name == key))?;
    presets.get_mut(index)
}
