use serde::{Deserialize, Serialize};

/// A normalized rotation notification produced by a source listener and
/// consumed by the event processor.
///
/// Immutable once emitted: listeners construct one value per notification
/// and never mutate it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationEvent {
    /// Opaque identifier of the rotated secret in the external system. Not
    /// necessarily a Kubernetes object name (e.g. an ARN, a GCP resource
    /// name, a Vault path).
    pub secret_identifier: String,
    /// Source-defined timestamp of the rotation. RFC-3339 is preferred but
    /// not enforced, since some sources hand us whatever string they have.
    pub rotation_timestamp: String,
    /// Human-readable provenance tag, e.g. `"aws-sqs"`, `"webhook"`.
    pub trigger_source: String,
    /// Only set by in-cluster source listeners (Secret/ConfigMap watches)
    /// that observe a specific namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl RotationEvent {
    pub fn new(
        secret_identifier: impl Into<String>,
        rotation_timestamp: impl Into<String>,
        trigger_source: impl Into<String>,
    ) -> Self {
        Self {
            secret_identifier: secret_identifier.into(),
            rotation_timestamp: rotation_timestamp.into(),
            trigger_source: trigger_source.into(),
            namespace: None,
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}
