//! HashiCorp Vault audit-log variant of the TCP socket listener: same
//! accept/frame loop, a different frame processor that understands Vault's
//! audit record shape instead of a bare secret-identifier path.

use std::sync::Arc;

use async_trait::async_trait;
use reloader_api::{HashicorpVaultSource, NotificationSource, RotationEvent};
use tokio::net::TcpListener as TokioTcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::listener::{
    await_shutdown, new_task_handle, Listener, ListenerContext, ListenerFactory, ListenerState, ListenerStateCell,
    TaskHandle,
};
use crate::listeners::tcp_socket::{run_accept_loop, FrameProcessor};

const DEFAULT_HOST: &str = "0.0.0.0";

pub struct HashicorpVaultListener {
    config: HashicorpVaultSource,
    context: ListenerContext,
    state: ListenerStateCell,
    cancel: CancellationToken,
    handle: TaskHandle,
}

impl HashicorpVaultListener {
    pub fn new(context: ListenerContext, config: HashicorpVaultSource) -> Self {
        Self {
            config,
            context,
            state: ListenerStateCell::new(),
            cancel: CancellationToken::new(),
            handle: new_task_handle(),
        }
    }
}

#[async_trait]
impl Listener for HashicorpVaultListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if !self.state.try_start() {
            return Ok(());
        }
        let host = self.config.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string());
        let address = format!("{host}:{}", self.config.port);
        let listener = TokioTcpListener::bind(&address)
            .await
            .map_err(|e| ListenerError::Transport(e.into()))?;

        let processor: FrameProcessor = Arc::new(vault_audit_frame_processor);
        let sender = self.context.sender.clone();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(run_accept_loop(listener, processor, sender, cancel));
        *self.handle.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ListenerError> {
        self.cancel.cancel();
        let task = self.handle.lock().take();
        await_shutdown(task).await;
        self.state.set(ListenerState::Stopped);
        Ok(())
    }

    fn state(&self) -> ListenerState {
        self.state.get()
    }
}

/// Valid iff `type == "response"`, `response.mount_type == "kv"`, and
/// `request.operation` is `create` or `update`. The secret path strips the
/// mount point prefix, then an optional leading `data/` KVv2 marker.
fn vault_audit_frame_processor(line: &str) -> Option<RotationEvent> {
    if !gjson::valid(line) {
        return None;
    }
    if gjson::get(line, "type").str() != "response" {
        return None;
    }
    if gjson::get(line, "response.mount_type").str() != "kv" {
        return None;
    }
    let operation_value = gjson::get(line, "request.operation");
    let operation = operation_value.str();
    if operation != "create" && operation != "update" {
        return None;
    }
    let request_path = gjson::get(line, "request.path");
    let mount_point = gjson::get(line, "response.mount_point");
    if !request_path.exists() {
        return None;
    }
    let path = request_path
        .str()
        .strip_prefix(mount_point.str())
        .unwrap_or(request_path.str());
    let path = path.strip_prefix("data/").unwrap_or(path);
    Some(RotationEvent::new(path, chrono::Utc::now().to_rfc3339(), "hashicorp-vault"))
}

pub fn factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::HashicorpVault(config) => {
            Ok(Arc::new(HashicorpVaultListener::new(context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig("hashivault factory given a non-HashicorpVault source".into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mount_point: &str, path: &str, operation: &str) -> String {
        serde_json::json!({
            "type": "response",
            "response": {"mount_type": "kv", "mount_point": mount_point},
            "request": {"operation": operation, "path": path},
        })
        .to_string()
    }

    #[test]
    fn strips_mount_point_and_data_prefix() {
        let line = record("secret/", "secret/data/db-password", "update");
        let event = vault_audit_frame_processor(&line).unwrap();
        assert_eq!(event.secret_identifier, "db-password");
    }

    #[test]
    fn ignores_read_operations() {
        let line = record("secret/", "secret/data/db-password", "read");
        assert!(vault_audit_frame_processor(&line).is_none());
    }

    #[test]
    fn ignores_non_kv_mounts() {
        let line = serde_json::json!({
            "type": "response",
            "response": {"mount_type": "database", "mount_point": "db/"},
            "request": {"operation": "update", "path": "db/creds/app"},
        })
        .to_string();
        assert!(vault_audit_frame_processor(&line).is_none());
    }
}
