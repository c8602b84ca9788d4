//! Generic HTTP push listener: a single POST path accepting an arbitrary
//! JSON body, with the secret identifier pulled out via a configurable
//! GJSON-style path. Optional Basic or Bearer auth; optional bounded retry
//! queue for events the processor failed to handle.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use reloader_api::{NotificationSource, RotationEvent, WebhookAuth, WebhookSource};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::listener::{
    await_shutdown, new_task_handle, EventSender, Listener, ListenerContext, ListenerFactory, ListenerState,
    ListenerStateCell, TaskHandle,
};
use crate::util::payload::extract_secret_identifier;
use crate::util::retry::{next_retry_delay, retries_exhausted};
use crate::util::secret_ref;

const DEFAULT_ADDRESS: &str = "0.0.0.0:8090";
const DEFAULT_PATH: &str = "/webhook";
const DEFAULT_SECRET_IDENTIFIER_PATH: &str = "0.data.ObjectName";
const MAX_RETRY_QUEUE: usize = 256;
const MAX_RETRIES_CEILING: u32 = 10;

#[derive(Clone)]
enum ResolvedAuth {
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// A queued retry, paired with how many attempts have already been made at
/// it specifically — never a count shared across the whole queue, since
/// different events fail and back off independently.
type RetryQueue = Arc<Mutex<VecDeque<(RotationEvent, u32)>>>;

#[derive(Clone)]
struct AppState {
    auth: Option<ResolvedAuth>,
    secret_identifier_path: String,
    sender: EventSender,
    retry_queue: RetryQueue,
    retry_policy: Option<reloader_api::RetryPolicy>,
}

pub struct WebhookListener {
    config: WebhookSource,
    context: ListenerContext,
    state: ListenerStateCell,
    cancel: CancellationToken,
    retry_queue: RetryQueue,
    server_handle: TaskHandle,
    retry_handle: TaskHandle,
}

impl WebhookListener {
    pub fn new(context: ListenerContext, config: WebhookSource) -> Self {
        Self {
            config,
            context,
            state: ListenerStateCell::new(),
            cancel: CancellationToken::new(),
            retry_queue: Arc::new(Mutex::new(VecDeque::new())),
            server_handle: new_task_handle(),
            retry_handle: new_task_handle(),
        }
    }

    async fn resolve_auth(&self) -> Result<Option<ResolvedAuth>, ListenerError> {
        let Some(auth) = &self.config.auth else { return Ok(None) };
        match auth {
            WebhookAuth::Basic { username_secret_ref, password_secret_ref } => {
                let username = secret_ref::resolve_string(&self.context.client, username_secret_ref).await?;
                let password = secret_ref::resolve_string(&self.context.client, password_secret_ref).await?;
                Ok(Some(ResolvedAuth::Basic { username, password }))
            }
            WebhookAuth::Bearer { token_secret_ref } => {
                let token = secret_ref::resolve_string(&self.context.client, token_secret_ref).await?;
                Ok(Some(ResolvedAuth::Bearer { token }))
            }
        }
    }
}

#[async_trait]
impl Listener for WebhookListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if !self.state.try_start() {
            return Ok(());
        }
        let address = self.config.address.clone().unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let path = self.config.path.clone().unwrap_or_else(|| DEFAULT_PATH.to_string());
        let listener = TokioTcpListener::bind(&address)
            .await
            .map_err(|e| ListenerError::Transport(e.into()))?;

        let auth = self.resolve_auth().await?;
        let state = AppState {
            auth,
            secret_identifier_path: self
                .config
                .secret_identifier_path
                .clone()
                .unwrap_or_else(|| DEFAULT_SECRET_IDENTIFIER_PATH.to_string()),
            sender: self.context.sender.clone(),
            retry_queue: Arc::clone(&self.retry_queue),
            retry_policy: self.config.retry_policy.clone(),
        };
        let app = Router::new().route(&path, post(handle_webhook)).with_state(state.clone());
        let cancel = self.cancel.clone();

        let server_task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                cancel.cancelled().await;
            });
            if let Err(err) = serve.await {
                tracing::error!(%err, "webhook server exited");
            }
        });
        *self.server_handle.lock() = Some(server_task);

        if let Some(policy) = state.retry_policy.clone() {
            let retry_queue = Arc::clone(&self.retry_queue);
            let sender = self.context.sender.clone();
            let cancel = self.cancel.clone();
            let retry_task = tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let next = retry_queue.lock().pop_front();
                    let Some((event, attempt)) = next else {
                        sleep(std::time::Duration::from_millis(200)).await;
                        continue;
                    };
                    sleep(next_retry_delay(&policy, attempt)).await;
                    if sender.send(event.clone()).await.is_err() {
                        return;
                    }
                    let attempt = attempt + 1;
                    if !retries_exhausted(&policy, attempt) && attempt < MAX_RETRIES_CEILING {
                        retry_queue.lock().push_back((event, attempt));
                    }
                }
            });
            *self.retry_handle.lock() = Some(retry_task);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ListenerError> {
        self.cancel.cancel();
        let server_task = self.server_handle.lock().take();
        let retry_task = self.retry_handle.lock().take();
        await_shutdown(server_task).await;
        await_shutdown(retry_task).await;
        self.state.set(ListenerState::Stopped);
        Ok(())
    }

    fn state(&self) -> ListenerState {
        self.state.get()
    }
}

fn authorized(auth: &Option<ResolvedAuth>, headers: &HeaderMap) -> bool {
    let Some(auth) = auth else { return true };
    let Some(header) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    match auth {
        ResolvedAuth::Basic { username, password } => {
            let Some(encoded) = header.strip_prefix("Basic ") else { return false };
            let Ok(decoded) = BASE64.decode(encoded) else { return false };
            let Ok(decoded) = String::from_utf8(decoded) else { return false };
            decoded == format!("{username}:{password}")
        }
        ResolvedAuth::Bearer { token } => {
            header.strip_prefix("Bearer ").is_some_and(|presented| presented == token)
        }
    }
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    if !authorized(&state.auth, &headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let Some(secret_identifier) = extract_secret_identifier(&body, &state.secret_identifier_path) else {
        return StatusCode::BAD_REQUEST;
    };
    let event = RotationEvent::new(secret_identifier, chrono::Utc::now().to_rfc3339(), "webhook");
    if state.sender.send(event.clone()).await.is_err() {
        if state.retry_policy.is_some() {
            let mut queue = state.retry_queue.lock();
            if queue.len() < MAX_RETRY_QUEUE {
                queue.push_back((event, 0));
            }
        }
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::NO_CONTENT
}

pub fn factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::Webhook(config) => {
            Ok(Arc::new(WebhookListener::new(context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig("webhook factory given a non-Webhook source".into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_auth_matches_presented_token() {
        let auth = Some(ResolvedAuth::Bearer { token: "s3cr3t".to_string() });
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer s3cr3t".parse().unwrap());
        assert!(authorized(&auth, &headers));
        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(!authorized(&auth, &headers));
    }

    #[test]
    fn basic_auth_decodes_and_compares() {
        let auth = Some(ResolvedAuth::Basic {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        });
        let encoded = BASE64.encode("svc:hunter2");
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Basic {encoded}").parse().unwrap());
        assert!(authorized(&auth, &headers));
    }

    #[test]
    fn missing_header_is_unauthorized_when_auth_configured() {
        let auth = Some(ResolvedAuth::Bearer { token: "s3cr3t".to_string() });
        assert!(!authorized(&auth, &HeaderMap::new()));
    }

    #[test]
    fn no_auth_configured_always_passes() {
        assert!(authorized(&None, &HeaderMap::new()));
    }
}
