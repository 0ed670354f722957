use crate::backend::{PrivilegedBackend, ScheduleRequest};
use crate::error::{ClientError, Result};
use crate::preset::{BackupPreset, Frequency};
use crate::preset_store::PresetStore;
use crate::session::SessionStore;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 根据预设生成标准 5 段 crontab 表达式，手动预设返回空字符串
pub fn compute_cron(preset: &BackupPreset) -> String {
    let (hour, minute) = parse_schedule_time(&preset.schedule_time);

    match preset.frequency {
        Frequency::Manual => String::new(),
        Frequency::Hourly => "0 * * * *".to_string(),
        Frequency::Daily => format!("{minute} {hour} * * *"),
        Frequency::Weekly => {
            let dow = weekday_number(&preset.schedule_day)
                .map(|d| d.to_string())
                .unwrap_or_else(|| "*".to_string());
            format!("{minute} {hour} * * {dow}")
        }
        Frequency::Monthly => {
            let dom = parse_or_zero(&preset.schedule_day);
            let dom = if dom == 0 { 1 } else { dom.clamp(1, 31) };
            format!("{minute} {hour} {dom} * *")
        }
    }
}

/// 解析 "HH:MM"，小时限制在 [0,23]，分钟限制在 [0,59]，无法解析的部分取 0
fn parse_schedule_time(time: &str) -> (i64, i64) {
    let mut parts = time.split(':');
    let hour = parts.next().map(parse_or_zero).unwrap_or(0).clamp(0, 23);
    let minute = parts.next().map(parse_or_zero).unwrap_or(0).clamp(0, 59);
    (hour, minute)
}

/// 整数解析，超出范围的纯数字饱和到 i64 边界，其余无法解析的取 0
fn parse_or_zero(value: &str) -> i64 {
    let value = value.trim();
    if let Ok(parsed) = value.parse() {
        return parsed;
    }
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        0
    } else if negative {
        i64::MIN
    } else {
        i64::MAX
    }
}

/// 星期名称（不区分大小写）→ cron 星期数，周日为 0
fn weekday_number(day: &str) -> Option<u8> {
    match day.trim().to_ascii_lowercase().as_str() {
        "sunday" => Some(0),
        "monday" => Some(1),
        "tuesday" => Some(2),
        "wednesday" => Some(3),
        "thursday" => Some(4),
        "friday" => Some(5),
        "saturday" => Some(6),
        _ => None,
    }
}

/// 同步结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    /// 尚未登录，缺少用户名或客户端ID
    SkippedNoIdentity,
}

/// 把预设的计划同步到后端的系统计划任务
#[derive(Clone)]
pub struct ScheduleSynchronizer {
    backend: Arc<dyn PrivilegedBackend>,
    session: SessionStore,
    store: PresetStore,
}

impl ScheduleSynchronizer {
    pub fn new(backend: Arc<dyn PrivilegedBackend>, session: SessionStore, store: PresetStore) -> Self {
        Self {
            backend,
            session,
            store,
        }
    }

    /// 同步预设的计划任务，启用条件为非手动且未暂停
    #[instrument(skip_all, fields(preset_id = %preset.id()))]
    pub async fn sync_to_system(&self, preset: &BackupPreset) -> Result<SyncOutcome> {
        self.push(preset, preset.schedule_enabled()).await
    }

    /// 停用预设的计划任务（预设被删除时调用）
    #[instrument(skip_all, fields(preset_id = %preset.id()))]
    pub async fn disable(&self, preset: &BackupPreset) -> Result<SyncOutcome> {
        self.push(preset, false).await
    }

    async fn push(&self, preset: &BackupPreset, enabled: bool) -> Result<SyncOutcome> {
        let Some(identity) = self.session.identity().await else {
            debug!("缺少会话身份，跳过计划同步");
            return Ok(SyncOutcome::SkippedNoIdentity);
        };

        let pattern_path = std::path::absolute(self.store.pattern_file_path(preset))?;
        let request = ScheduleRequest {
            username: identity.username,
            preset_id: preset.id().to_string(),
            cron_string: compute_cron(preset),
            preset_path: pattern_path.to_string_lossy().to_string(),
            client_id: identity.client_id,
            enabled,
        };

        self.backend
            .upsert_schedule(&request)
            .await
            .map_err(|source| ClientError::ScheduleSyncFailure {
                preset_id: preset.id().to_string(),
                source,
            })?;

        info!(
            cron = %request.cron_string,
            enabled = request.enabled,
            "计划任务已同步: {}",
            preset.name
        );
        Ok(SyncOutcome::Synced)
    }
}
