//! The source-listener contract every provider (`aws_sqs`, `webhook`, ...)
//! implements, plus the tiny state machine a [`crate::manager::ListenerManager`]
//! drives it through.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::Client;
use parking_lot::Mutex;
use reloader_api::{NotificationSource, RotationEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ListenerError;

/// Shared sending half of the event channel every listener publishes
/// [`RotationEvent`]s onto. Bounded so a stalled event processor applies
/// backpressure to the listeners instead of unbounded memory growth.
pub type EventSender = mpsc::Sender<RotationEvent>;
pub type EventReceiver = mpsc::Receiver<RotationEvent>;

pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created = 0,
    Running = 1,
    Stopped = 2,
}

impl From<u8> for ListenerState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopped,
            _ => Self::Created,
        }
    }
}

/// Tracks a listener's created -> running -> stopped progression so
/// `start`/`stop` stay idempotent even if called concurrently or out of
/// order (a manager diff pass may ask a listener to stop before its spawned
/// task has finished transitioning to `Running`).
#[derive(Default)]
pub struct ListenerStateCell(AtomicU8);

impl ListenerStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ListenerState::Created as u8))
    }

    pub fn get(&self) -> ListenerState {
        self.0.load(Ordering::SeqCst).into()
    }

    pub fn set(&self, state: ListenerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Transitions `Created -> Running`, returning `false` (a no-op) if a
    /// concurrent `stop()` already moved it to `Stopped` first.
    pub fn try_start(&self) -> bool {
        self.0
            .compare_exchange(
                ListenerState::Created as u8,
                ListenerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// A running source listener. `start` must be non-blocking (it spawns its
/// own background task); `stop` must be idempotent and block until that
/// task has actually wound down.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn start(&self) -> Result<(), ListenerError>;
    async fn stop(&self) -> Result<(), ListenerError>;
    fn state(&self) -> ListenerState;
}

/// How long `stop()` waits for a spawned worker task to exit on its own
/// after its cancellation token fires before giving up on a clean join.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Holds the `JoinHandle` of a listener's spawned worker task so `stop()`
/// can await it. `Mutex` rather than a plain field because `stop` takes
/// `&self`, not `&mut self`.
pub type TaskHandle = Mutex<Option<JoinHandle<()>>>;

pub fn new_task_handle() -> TaskHandle {
    Mutex::new(None)
}

/// Awaits a spawned worker's completion, capped at [`SHUTDOWN_GRACE`]. The
/// caller is expected to have already triggered cancellation; this only
/// waits for the task to notice and unwind. Logs instead of hanging forever
/// if the worker doesn't wind down in time.
pub async fn await_shutdown(handle: Option<JoinHandle<()>>) {
    let Some(handle) = handle else { return };
    if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
        tracing::warn!("listener worker did not wind down within the shutdown grace period");
    }
}

/// Everything a provider factory needs to build a listener: the
/// Kubernetes client (for auth secret/service-account lookups and, for the
/// in-cluster sources, the watch itself), the channel to publish onto, and
/// the source-specific config already unwrapped from its `NotificationSource`
/// variant by the registry dispatch in [`crate::manager`].
#[derive(Clone)]
pub struct ListenerContext {
    pub client: Client,
    pub sender: EventSender,
}

/// The registry's factory signature: build a boxed `Listener` from a full
/// `NotificationSource` (the provider picks its own variant back apart) plus
/// context. Returning `Arc` rather than `Box` lets the manager hold the same
/// listener instance across diff passes without re-wrapping it.
pub type ListenerFactory =
    Arc<dyn Fn(ListenerContext, NotificationSource) -> Result<Arc<dyn Listener>, ListenerError> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_created_and_transitions_once() {
        let cell = ListenerStateCell::new();
        assert_eq!(cell.get(), ListenerState::Created);
        assert!(cell.try_start());
        assert_eq!(cell.get(), ListenerState::Running);
        assert!(!cell.try_start());
    }

    #[test]
    fn stop_before_start_prevents_start() {
        let cell = ListenerStateCell::new();
        cell.set(ListenerState::Stopped);
        assert!(!cell.try_start());
    }
}
