//! Replays a pre-baked, deterministic sequence of [`RotationEvent`]s at a
//! fixed interval. Exists purely for tests and demos — it never talks to
//! anything outside the process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reloader_api::{MockSource, NotificationSource, RotationEvent};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::listener::{
    await_shutdown, new_task_handle, Listener, ListenerContext, ListenerFactory, ListenerState, ListenerStateCell,
    TaskHandle,
};

pub struct MockListener {
    config: MockSource,
    context: ListenerContext,
    state: ListenerStateCell,
    cancel: CancellationToken,
    handle: TaskHandle,
}

impl MockListener {
    pub fn new(context: ListenerContext, config: MockSource) -> Self {
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
impl Listener for MockListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if !self.state.try_start() {
            return Ok(());
        }
        let events = self.config.events.clone();
        let period = Duration::from_secs(self.config.interval_seconds.max(1));
        let sender = self.context.sender.clone();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut index = 0usize;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        if events.is_empty() {
                            continue;
                        }
                        let mock_event = &events[index % events.len()];
                        let event = RotationEvent::new(
                            &mock_event.secret_identifier,
                            &mock_event.rotation_timestamp,
                            &mock_event.trigger_source,
                        );
                        let _ = sender.send(event).await;
                        index += 1;
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

pub fn factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::Mock(config) => {
            Ok(Arc::new(MockListener::new(context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig("mock factory given a non-Mock source".into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reloader_api::MockEvent;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn emits_events_on_interval() {
        let (tx, mut rx) = mpsc::channel(8);
        let context = ListenerContext {
            client: kube::Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap(),
            sender: tx,
        };
        let config = MockSource {
            interval_seconds: 0,
            events: vec![MockEvent {
                secret_identifier: "db-password".to_string(),
                rotation_timestamp: "2026-08-01T00:00:00Z".to_string(),
                trigger_source: "mock".to_string(),
            }],
        };
        let listener = MockListener::new(context, config);
        listener.start().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.secret_identifier, "db-password");
        listener.stop().await.unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
    }
}
