use thiserror::Error;

/// Errors surfaced by a listener while starting, running, or stopping.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listener configuration is invalid: {0}")]
    InvalidConfig(String),
    #[error("listener transport failed: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("listener was asked to stop before it finished starting")]
    StoppedWhileStarting,
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Errors surfaced by a destination handler's `filter`/`references`/`apply`/`wait_for`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("object has no name")]
    UnnamedObject,
    #[error("invalid label selector: {0}")]
    InvalidSelector(#[source] kube::core::ErrorResponse),
    #[error("wait_for timed out after {0} attempts")]
    WaitTimedOut(u32),
    #[error("update strategy template error: {0}")]
    Template(String),
    #[error("no handler registered for destination kind {0}")]
    UnknownKind(String),
    #[error("generic destination requires a {0} override since it has no kind-specific default")]
    MissingOverride(&'static str),
}

/// Errors surfaced while reconciling a `Config` object.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("finalizer error: {0}")]
    Finalizer(#[source] anyhow::Error),
    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),
}
