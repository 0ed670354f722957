use crate::backend::{
    ArchiveEntry, ArchiveItem, BackendEvent, BackupLogEntry, BackupSummary, KeyKind,
    PrivilegedBackend, ScheduleRequest,
};
use crate::config::BackendConfig;
use crate::constants::api::{self, commands};
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 通过本地 HTTP 桥接访问特权后端
///
/// 每个命令映射为 `POST {base_url}/invoke/{command}`，请求体为 camelCase 参数，
/// 事件流来自 `GET {base_url}/events`，每行一个 JSON 事件。
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    stream_client: Client,
    base_url: String,
}

impl HttpBackend {
    /// 创建新的后端客户端
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(api::http::USER_AGENT)
            .build()?;

        // 事件流是长连接，不能套用整体请求超时
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_secs(api::http::EVENTS_CONNECT_TIMEOUT))
            .user_agent(api::http::USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 获取命令调用的完整URL
    fn invoke_url(&self, command: &str) -> String {
        format!("{}{}/{}", self.base_url, api::INVOKE_PREFIX, command)
    }

    /// 发送命令并检查响应状态
    async fn post(&self, command: &str, args: Value) -> BackendResult<Response> {
        self.send(&self.client, command, args).await
    }

    /// 长时间运行的命令（备份、下载、恢复）不使用整体请求超时
    async fn post_long(&self, command: &str, args: Value) -> BackendResult<Response> {
        self.send(&self.stream_client, command, args).await
    }

    async fn send(&self, client: &Client, command: &str, args: Value) -> BackendResult<Response> {
        let url = self.invoke_url(command);
        debug!("调用后端命令: {}", command);

        let response = client.post(&url).json(&args).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        error!("后端命令 {} 失败: {}", command, status);
        if text.trim().is_empty() {
            Err(BackendError::Remote(format!("{command}: {status}")))
        } else {
            Err(BackendError::Remote(text))
        }
    }

    /// 调用命令并解析返回值
    async fn invoke<T: DeserializeOwned>(&self, command: &str, args: Value) -> BackendResult<T> {
        let response = self.post(command, args).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 调用不关心返回值的命令
    async fn invoke_unit(&self, command: &str, args: Value) -> BackendResult<()> {
        self.post(command, args).await.map(|_| ())
    }
}

#[async_trait]
impl PrivilegedBackend for HttpBackend {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        is_signup: bool,
    ) -> BackendResult<()> {
        self.invoke_unit(
            commands::LOGIN_USER,
            json!({ "username": username, "password": password, "isSignup": is_signup }),
        )
        .await
    }

    async fn fetch_repository_key(&self) -> BackendResult<Vec<u8>> {
        self.invoke(commands::GET_REPO_KEY, json!({})).await
    }

    async fn send_ssh_key(&self, content: &str, kind: KeyKind) -> BackendResult<()> {
        self.invoke_unit(
            commands::SEND_SSH_KEY,
            json!({ "keyContent": content, "isTunnel": kind.is_tunnel() }),
        )
        .await
    }

    async fn fetch_client_id(&self) -> BackendResult<String> {
        self.invoke(commands::GET_CLIENT_ID, json!({})).await
    }

    async fn fetch_server_public_key(&self) -> BackendResult<String> {
        self.invoke(commands::GET_SERVER_SSH_KEY, json!({})).await
    }

    async fn is_elevated_service_running(&self) -> BackendResult<bool> {
        self.invoke(commands::CHECK_SSH_RUNNING, json!({})).await
    }

    async fn start_elevated_service(&self) -> BackendResult<()> {
        self.invoke_unit(commands::START_SSH_SERVICE, json!({})).await
    }

    async fn stop_elevated_service(&self) -> BackendResult<()> {
        self.invoke_unit(commands::STOP_SSH_SERVICE, json!({})).await
    }

    async fn provision_environment_user(&self, username: &str) -> BackendResult<()> {
        self.invoke_unit(commands::WSL_SETUP_USER, json!({ "username": username }))
            .await
    }

    async fn provision_config_scripts(&self, username: &str, client_id: &str) -> BackendResult<()> {
        self.invoke_unit(
            commands::WSL_PROVISION_SCRIPTS,
            json!({ "username": username, "clientId": client_id }),
        )
        .await
    }

    async fn fetch_ssh_key(
        &self,
        kind: KeyKind,
        username: &str,
        client_id: &str,
    ) -> BackendResult<String> {
        self.invoke(
            kind.fetch_command(),
            json!({ "username": username, "clientId": client_id }),
        )
        .await
    }

    async fn persist_server_key(&self, username: &str, key: &str) -> BackendResult<()> {
        self.invoke_unit(
            commands::SAVE_SERVER_SSH_KEY,
            json!({ "username": username, "sshKey": key }),
        )
        .await
    }

    async fn finalize_borg_config(&self, username: &str) -> BackendResult<()> {
        self.invoke_unit(
            commands::WSL_CONFIGURE_BORG_CLIENT,
            json!({ "username": username }),
        )
        .await
    }

    async fn persist_master_key(
        &self,
        username: &str,
        client_id: &str,
        key: &[u8],
    ) -> BackendResult<()> {
        self.invoke_unit(
            commands::SAVE_MASTER_KEY,
            json!({ "username": username, "clientId": client_id, "key": key }),
        )
        .await
    }

    async fn upsert_schedule(&self, request: &ScheduleRequest) -> BackendResult<()> {
        self.invoke_unit(commands::UPDATE_BACKUP_SCHEDULE, serde_json::to_value(request)?)
            .await
    }

    async fn run_backup(
        &self,
        client_id: &str,
        preset_path: &str,
        username: &str,
    ) -> BackendResult<()> {
        self.post_long(
            commands::RUN_BACKUP_SCRIPT,
            json!({ "clientId": client_id, "presetPath": preset_path, "username": username }),
        )
        .await
        .map(|_| ())
    }

    async fn cancel_backup(&self) -> BackendResult<()> {
        self.invoke_unit(commands::CANCEL_BACKUP, json!({})).await
    }

    async fn fetch_archives(&self) -> BackendResult<Vec<ArchiveItem>> {
        self.invoke(commands::FETCH_ARCHIVES, json!({})).await
    }

    async fn fetch_archive_files(&self, archive: &str) -> BackendResult<Vec<ArchiveEntry>> {
        self.invoke(
            commands::FETCH_ARCHIVE_FILES,
            json!({ "archiveName": archive }),
        )
        .await
    }

    async fn download_archive(&self, archive: &str, target_path: &str) -> BackendResult<String> {
        let response = self
            .post_long(
                commands::DOWNLOAD_ARCHIVE,
                json!({ "archiveName": archive, "targetPath": target_path }),
            )
            .await?;
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    async fn restore_archive(&self, archive: &str) -> BackendResult<String> {
        let response = self
            .post_long(commands::RESTORE_ARCHIVE, json!({ "archiveName": archive }))
            .await?;
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    async fn cancel_restore(&self) -> BackendResult<()> {
        self.invoke_unit(commands::CANCEL_RESTORE, json!({})).await
    }

    async fn fetch_backup_history(&self) -> BackendResult<Vec<BackupLogEntry>> {
        let history: Option<Vec<BackupLogEntry>> =
            self.invoke(commands::GET_LOGS, json!({})).await?;
        Ok(history.unwrap_or_default())
    }

    async fn fetch_backup_summaries(&self) -> BackendResult<Vec<BackupSummary>> {
        let summaries: Option<Vec<BackupSummary>> =
            self.invoke(commands::GET_BACKUP_LOGS, json!({})).await?;
        Ok(summaries.unwrap_or_default())
    }

    async fn subscribe_events(&self) -> BackendResult<mpsc::UnboundedReceiver<BackendEvent>> {
        let url = format!("{}{}", self.base_url, api::EVENTS_ENDPOINT);
        let response = self.stream_client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(BackendError::Unavailable(format!("事件流连接失败: {status}")));
        }

        info!("已连接后端事件流: {}", url);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("事件流读取中断: {}", e);
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(event) = parse_event_line(&line) {
                        if tx.send(event).is_err() {
                            debug!("事件接收端已关闭，停止读取事件流");
                            return;
                        }
                    }
                }
            }

            if let Some(event) = parse_event_line(&buffer) {
                let _ = tx.send(event);
            }
            info!("后端事件流已结束");
        });

        Ok(rx)
    }
}

/// 解析事件流中的一行，空行和无法解析的行返回 None
fn parse_event_line(line: &[u8]) -> Option<BackendEvent> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<BackendEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("忽略无法解析的事件: {} ({})", text, e);
            None
        }
    }
}
