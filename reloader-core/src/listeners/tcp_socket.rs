//! Newline-delimited JSON-frame TCP listener. Generic over how a frame is
//! turned into a [`RotationEvent`], so [`crate::listeners::hashivault`] can
//! reuse the same accept/frame loop with a different frame processor.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use reloader_api::{NotificationSource, RotationEvent, TcpSocketSource};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener as TokioTcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::listener::{
    await_shutdown, new_task_handle, EventSender, Listener, ListenerContext, ListenerFactory, ListenerState,
    ListenerStateCell, TaskHandle,
};
use crate::util::payload::extract_secret_identifier;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_SECRET_IDENTIFIER_PATH: &str = "secretIdentifier";

/// Turns one line of input into an event, or `None` to silently drop it
/// (malformed frames are not worth logging on every connection).
pub type FrameProcessor = Arc<dyn Fn(&str) -> Option<RotationEvent> + Send + Sync>;

pub fn generic_frame_processor(secret_identifier_path: String) -> FrameProcessor {
    Arc::new(move |line: &str| {
        let secret_identifier = extract_secret_identifier(line, &secret_identifier_path)?;
        Some(RotationEvent::new(secret_identifier, chrono::Utc::now().to_rfc3339(), "tcp-socket"))
    })
}

/// Runs the accept loop for a bound `TcpListener`, dispatching each
/// connection's newline-delimited frames through `processor`. Shared by the
/// generic and HashiCorp Vault variants; only `processor` differs between
/// them.
pub async fn run_accept_loop(
    listener: TokioTcpListener,
    processor: FrameProcessor,
    sender: EventSender,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        let (socket, peer): (_, SocketAddr) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%err, "tcp accept failed");
                continue;
            }
        };
        let processor = Arc::clone(&processor);
        let sender = sender.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(socket).lines();
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = lines.next_line() => next,
                };
                match next {
                    Ok(Some(line)) => {
                        if let Some(event) = processor(&line) {
                            let _ = sender.send(event).await;
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        tracing::warn!(%err, %peer, "tcp connection read failed");
                        return;
                    }
                }
            }
        });
    }
}

pub struct TcpSocketListener {
    config: TcpSocketSource,
    context: ListenerContext,
    state: ListenerStateCell,
    cancel: CancellationToken,
    handle: TaskHandle,
}

impl TcpSocketListener {
    pub fn new(context: ListenerContext, config: TcpSocketSource) -> Self {
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
impl Listener for TcpSocketListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if !self.state.try_start() {
            return Ok(());
        }
        let host = self.config.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string());
        let address = format!("{host}:{}", self.config.port);
        let listener = TokioTcpListener::bind(&address)
            .await
            .map_err(|e| ListenerError::Transport(e.into()))?;

        let processor = generic_frame_processor(
            self.config
                .secret_identifier_path
                .clone()
                .unwrap_or_else(|| DEFAULT_SECRET_IDENTIFIER_PATH.to_string()),
        );
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

pub fn factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::TcpSocket(config) => {
            Ok(Arc::new(TcpSocketListener::new(context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig("tcp_socket factory given a non-TCPSocket source".into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_processor_extracts_configured_path() {
        let processor = generic_frame_processor("secretIdentifier".to_string());
        let event = processor(r#"{"secretIdentifier":"db-password"}"#).unwrap();
        assert_eq!(event.secret_identifier, "db-password");
        assert_eq!(event.trigger_source, "tcp-socket");
    }

    #[test]
    fn generic_processor_drops_malformed_frame() {
        let processor = generic_frame_processor("secretIdentifier".to_string());
        assert!(processor("not json").is_none());
    }
}
