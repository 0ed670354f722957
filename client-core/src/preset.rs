use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 备份频率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Manual,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Manual => "manual",
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Frequency::Manual),
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(format!("未知的备份频率: {other}")),
        }
    }
}

/// 扩展名规则的作用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Include,
    Exclude,
}

/// 按扩展名匹配的规则，例如 `*.pdf`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRule {
    pub pattern: String,
    pub mode: RuleMode,
}

impl ExtensionRule {
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: RuleMode::Include,
        }
    }

    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: RuleMode::Exclude,
        }
    }
}

/// 用户定义的备份预设
///
/// `id` 在创建时生成，之后不可修改；模式文件内容完全由其余字段决定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPreset {
    id: String,
    pub name: String,
    pub frequency: Frequency,
    /// "HH:MM"
    pub schedule_time: String,
    pub schedule_day: String,
    pub sources: Vec<String>,
    pub exclusions: Vec<String>,
    pub extension_rules: Vec<ExtensionRule>,
    pub include_only_mode: bool,
    #[serde(default)]
    pub paused: bool,
}

impl Default for BackupPreset {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl BackupPreset {
    /// 创建带默认值和新 id 的空预设
    pub fn new_empty() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: "New Preset".to_string(),
            frequency: Frequency::Manual,
            schedule_time: "12:00".to_string(),
            schedule_day: "Monday".to_string(),
            sources: Vec::new(),
            exclusions: Vec::new(),
            extension_rules: Vec::new(),
            include_only_mode: false,
            paused: false,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new_empty()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 计划任务是否应在系统中启用
    pub fn schedule_enabled(&self) -> bool {
        self.frequency != Frequency::Manual && !self.paused
    }

    /// 添加扩展名规则，已存在同名规则（不区分大小写）时返回 false
    pub fn add_extension_rule(&mut self, rule: ExtensionRule) -> bool {
        if !validate_extension_rule(&self.extension_rules, &rule.pattern) {
            return false;
        }
        self.extension_rules.push(rule);
        true
    }
}

/// 检查新规则是否与已有规则冲突（模式不区分大小写）
pub fn validate_extension_rule(current_rules: &[ExtensionRule], new_pattern: &str) -> bool {
    !current_rules
        .iter()
        .any(|r| r.pattern.eq_ignore_ascii_case(new_pattern))
}
