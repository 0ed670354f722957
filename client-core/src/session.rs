use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 登录流程缓存的身份信息，不包含密码
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SessionState {
    username: Option<String>,
    client_id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// 完整的会话身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub username: String,
    pub client_id: String,
}

/// 会话身份缓存
///
/// 内存中共享，配置了路径时同步写入 `session.json`，供之后的命令读取。
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: Option<PathBuf>,
    state: Arc<RwLock<SessionState>>,
}

impl SessionStore {
    /// 仅内存的会话缓存
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(RwLock::new(SessionState::default())),
        }
    }

    /// 从文件加载会话缓存，文件缺失或损坏时从空状态开始
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("会话文件损坏，忽略: {} ({})", path.display(), e);
                SessionState::default()
            }),
            Err(_) => SessionState::default(),
        };

        Self {
            path: Some(path),
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn username(&self) -> Option<String> {
        self.state.read().await.username.clone()
    }

    pub async fn client_id(&self) -> Option<String> {
        self.state.read().await.client_id.clone()
    }

    /// 用户名和客户端ID都存在时返回完整身份
    pub async fn identity(&self) -> Option<SessionIdentity> {
        let state = self.state.read().await;
        match (&state.username, &state.client_id) {
            (Some(username), Some(client_id)) if !username.is_empty() && !client_id.is_empty() => {
                Some(SessionIdentity {
                    username: username.clone(),
                    client_id: client_id.clone(),
                })
            }
            _ => None,
        }
    }

    /// 缓存用户名
    pub async fn set_username(&self, username: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.username = Some(username.to_string());
        state.updated_at = Some(Utc::now());
        self.persist(&state).await
    }

    /// 缓存客户端ID
    pub async fn set_client_id(&self, client_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.client_id = Some(client_id.to_string());
        state.updated_at = Some(Utc::now());
        self.persist(&state).await
    }

    /// 清空会话（退出登录）
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        *state = SessionState::default();
        if let Some(path) = &self.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("已删除会话文件: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn persist(&self, state: &SessionState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(state)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
