//! Subscribes to a Google Cloud Pub/Sub subscription and decodes GCP audit
//! log entries for secret-version creation. Authentication is either a
//! service-account JSON key from a secret ref, or GKE Workload Identity
//! (the k8s SA token federated into a GCP access token, optionally
//! impersonating a target service account).

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use google_cloud_pubsub::client::{Client, ClientConfig};
use reloader_api::{GcpAuth, GooglePubSubSource, NotificationSource, RotationEvent};
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::listener::{
    await_shutdown, new_task_handle, Listener, ListenerContext, ListenerFactory, ListenerState, ListenerStateCell,
    TaskHandle,
};
use crate::util::secret_ref;

pub struct GooglePubSubListener {
    config: GooglePubSubSource,
    context: ListenerContext,
    state: ListenerStateCell,
    cancel: CancellationToken,
    handle: TaskHandle,
}

impl GooglePubSubListener {
    pub fn new(context: ListenerContext, config: GooglePubSubSource) -> Self {
        Self {
            config,
            context,
            state: ListenerStateCell::new(),
            cancel: CancellationToken::new(),
            handle: new_task_handle(),
        }
    }

    async fn build_client(&self) -> Result<Client, ListenerError> {
        let client_config = match &self.config.auth {
            Some(GcpAuth::SecretRefJwt { secret_ref }) => {
                let key_json = secret_ref::resolve_string(&self.context.client, secret_ref).await?;
                let credentials_file = google_cloud_auth::credentials::CredentialsFile::new_from_str(&key_json)
                    .await
                    .map_err(|e| ListenerError::InvalidConfig(format!("invalid pubsub credentials JSON: {e}")))?;
                ClientConfig::default()
                    .with_credentials(credentials_file)
                    .await
                    .map_err(|e| ListenerError::Transport(e.into()))?
            }
            Some(GcpAuth::WorkloadIdentity { service_account, .. }) => {
                let access_token = crate::util::token_exchange::workload_identity_access_token(
                    &self.context.client,
                    service_account,
                    &self.config.project,
                )
                .await?;
                let token_source = google_cloud_auth::token::DefaultTokenSourceProvider::new_with_token(access_token)
                    .await
                    .map_err(|e| ListenerError::Transport(e.into()))?;
                ClientConfig {
                    token_source_provider: Box::new(token_source),
                    project_id: Some(self.config.project.clone()),
                    ..Default::default()
                }
            }
            None => ClientConfig::default()
                .with_auth()
                .await
                .map_err(|e| ListenerError::Transport(e.into()))?,
        };
        Client::new(client_config).await.map_err(|e| ListenerError::Transport(e.into()))
    }
}

#[async_trait]
impl Listener for GooglePubSubListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if !self.state.try_start() {
            return Ok(());
        }
        let client = self.build_client().await?;
        let subscription = client.subscription(&self.config.subscription);
        let sender = self.context.sender.clone();
        let cancel = self.cancel.clone();

        let task = tokio::spawn(async move {
            let stream = match subscription.subscribe(None).await {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::error!(%err, "failed to open pubsub subscription stream");
                    return;
                }
            };
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    message = stream.next() => {
                        let Some(message) = message else { return };
                        let body = String::from_utf8_lossy(&message.message.data).into_owned();
                        match parse_audit_log(&body) {
                            Some(event) => {
                                let _ = sender.send(event).await;
                                let _ = message.ack().await;
                            }
                            None => {
                                let _ = message.nack().await;
                            }
                        }
                    }
                }
            }
        });
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

/// A rotation entry is `protoPayload.methodName ==
/// "google.cloud.secretmanager.v1.SecretManagerService.AddSecretVersion"`;
/// the secret name is the fourth `/`-separated segment of `resourceName`
/// (`projects/<p>/secrets/<name>/versions/<n>`).
fn parse_audit_log(body: &str) -> Option<RotationEvent> {
    if !gjson::valid(body) {
        return None;
    }
    let method = gjson::get(body, "protoPayload.methodName");
    if method.str() != "google.cloud.secretmanager.v1.SecretManagerService.AddSecretVersion" {
        return None;
    }
    let resource_name = gjson::get(body, "protoPayload.resourceName");
    if !resource_name.exists() {
        return None;
    }
    let secret_name = resource_name.str().split('/').nth(3)?;
    let timestamp = gjson::get(body, "timestamp");
    Some(RotationEvent::new(secret_name, timestamp.str(), "google-pubsub"))
}

pub fn factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::GooglePubSub(config) => {
            Ok(Arc::new(GooglePubSubListener::new(context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig("google_pubsub factory given a non-GooglePubSub source".into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_secret_version_audit_entry() {
        let body = serde_json::json!({
            "timestamp": "2026-08-01T00:00:00Z",
            "protoPayload": {
                "methodName": "google.cloud.secretmanager.v1.SecretManagerService.AddSecretVersion",
                "resourceName": "projects/my-project/secrets/db-password/versions/2",
            }
        })
        .to_string();
        let event = parse_audit_log(&body).unwrap();
        assert_eq!(event.secret_identifier, "db-password");
        assert_eq!(event.trigger_source, "google-pubsub");
    }

    #[test]
    fn ignores_other_methods() {
        let body = serde_json::json!({
            "protoPayload": {"methodName": "google.cloud.secretmanager.v1.SecretManagerService.GetSecret"}
        })
        .to_string();
        assert!(parse_audit_log(&body).is_none());
    }
}
