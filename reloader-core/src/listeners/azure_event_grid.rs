//! HTTP server accepting Event Grid push deliveries. Each configured
//! subscription name gets its own `/<name>` route; two event types matter:
//! the subscription-validation handshake, and Key Vault secret-version
//! notifications.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use reloader_api::{AzureEventGridSource, NotificationSource, RotationEvent};
use tokio::net::TcpListener as TokioTcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::listener::{
    await_shutdown, new_task_handle, EventSender, Listener, ListenerContext, ListenerFactory, ListenerState,
    ListenerStateCell, TaskHandle,
};

const DEFAULT_ADDRESS: &str = "0.0.0.0:8091";
const VALIDATION_EVENT: &str = "Microsoft.EventGrid.SubscriptionValidationEvent";
const SECRET_NEW_VERSION_EVENT: &str = "Microsoft.KeyVault.SecretNewVersionCreated";

#[derive(Clone)]
struct AppState {
    subscriptions: Arc<HashSet<String>>,
    sender: EventSender,
}

pub struct AzureEventGridListener {
    config: AzureEventGridSource,
    context: ListenerContext,
    state: ListenerStateCell,
    cancel: CancellationToken,
    handle: TaskHandle,
}

impl AzureEventGridListener {
    pub fn new(context: ListenerContext, config: AzureEventGridSource) -> Self {
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
impl Listener for AzureEventGridListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if !self.state.try_start() {
            return Ok(());
        }
        let address = self.config.address.clone().unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let listener = TokioTcpListener::bind(&address)
            .await
            .map_err(|e| ListenerError::Transport(e.into()))?;

        let state = AppState {
            subscriptions: Arc::new(self.config.subscriptions.iter().cloned().collect()),
            sender: self.context.sender.clone(),
        };
        let app = Router::new()
            .route("/{subscription}", post(handle_events))
            .with_state(state);
        let cancel = self.cancel.clone();

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                cancel.cancelled().await;
            });
            if let Err(err) = serve.await {
                tracing::error!(%err, "azure event grid server exited");
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

async fn handle_events(
    State(state): State<AppState>,
    Path(subscription): Path<String>,
    headers: HeaderMap,
    Json(events): Json<Vec<serde_json::Value>>,
) -> (StatusCode, Json<serde_json::Value>) {
    if !state.subscriptions.contains(&subscription) {
        return (StatusCode::NOT_FOUND, Json(serde_json::Value::Null));
    }
    let mut validation_response = None;
    for event in events {
        let event_type = event.get("eventType").and_then(|v| v.as_str()).unwrap_or_default();
        match event_type {
            VALIDATION_EVENT => {
                let Some(subscription_name) = headers
                    .get("aeg-subscription-name")
                    .and_then(|v| v.to_str().ok())
                else {
                    return (StatusCode::BAD_REQUEST, Json(serde_json::Value::Null));
                };
                if subscription_name != subscription {
                    return (StatusCode::BAD_REQUEST, Json(serde_json::Value::Null));
                }
                let data = event.get("data");
                if let Some(validation_code) = data.and_then(|d| d.get("validationCode")).and_then(|v| v.as_str()) {
                    validation_response = Some(serde_json::json!({ "validationResponse": validation_code }));
                }
                if let Some(validation_url) = data.and_then(|d| d.get("validationUrl")).and_then(|v| v.as_str()) {
                    let url = validation_url.to_string();
                    tokio::spawn(async move {
                        if let Err(err) = reqwest::get(&url).await {
                            tracing::warn!(%err, "failed to complete event grid validation handshake");
                        }
                    });
                }
            }
            SECRET_NEW_VERSION_EVENT => {
                let object_name = event
                    .get("data")
                    .and_then(|d| d.get("objectName"))
                    .and_then(|v| v.as_str());
                let event_time = event.get("eventTime").and_then(|v| v.as_str()).unwrap_or_default();
                if let Some(object_name) = object_name {
                    let rotation = RotationEvent::new(object_name, event_time, "azure-event-grid");
                    let _ = state.sender.send(rotation).await;
                }
            }
            _ => {}
        }
    }
    (StatusCode::OK, Json(validation_response.unwrap_or(serde_json::Value::Null)))
}

pub fn factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::AzureEventGrid(config) => {
            Ok(Arc::new(AzureEventGridListener::new(context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig(
            "azure_event_grid factory given a non-AzureEventGrid source".into(),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_subscription_is_rejected() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let state = AppState {
            subscriptions: Arc::new(["payments".to_string()].into_iter().collect()),
            sender: tx,
        };
        let (status, _body) = handle_events(
            State(state),
            Path("other".to_string()),
            HeaderMap::new(),
            Json(vec![]),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn secret_new_version_event_emits_rotation() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let state = AppState {
            subscriptions: Arc::new(["payments".to_string()].into_iter().collect()),
            sender: tx,
        };
        let event = serde_json::json!({
            "eventType": SECRET_NEW_VERSION_EVENT,
            "eventTime": "2026-08-01T00:00:00Z",
            "data": {"objectName": "db-password"},
        });
        let (status, _body) = handle_events(
            State(state),
            Path("payments".to_string()),
            HeaderMap::new(),
            Json(vec![event]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.secret_identifier, "db-password");
    }

    #[tokio::test]
    async fn validation_event_echoes_validation_code() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let state = AppState {
            subscriptions: Arc::new(["payments".to_string()].into_iter().collect()),
            sender: tx,
        };
        let event = serde_json::json!({
            "eventType": VALIDATION_EVENT,
            "data": {"validationCode": "abc123"},
        });
        let mut headers = HeaderMap::new();
        headers.insert("aeg-subscription-name", "payments".parse().unwrap());
        let (status, body) = handle_events(
            State(state),
            Path("payments".to_string()),
            headers,
            Json(vec![event]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0, serde_json::json!({"validationResponse": "abc123"}));
    }
}
