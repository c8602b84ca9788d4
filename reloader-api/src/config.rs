use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::destination::DestinationToWatch;
use crate::source::NotificationSource;

/// The cluster-scoped `Config` resource a user declares to wire up
/// notification sources to the destinations that should be touched when a
/// secret rotates.
///
/// ```yaml
/// apiVersion: reloader.external-secrets.io/v1alpha1
/// kind: Config
/// metadata:
///   name: payments-team
/// spec:
///   notificationSources:
///     - type: AwsSqs
///       awsSqs:
///         queueUrl: https://sqs.us-east-1.amazonaws.com/123456789012/rotations
///         region: us-east-1
///   destinationsToWatch:
///     - type: ExternalSecret
///       externalSecret:
///         names: [es-a]
/// ```
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    kind = "Config",
    group = "reloader.external-secrets.io",
    version = "v1alpha1",
    status = "ConfigStatus",
    shortname = "reloaderconfig",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    #[serde(default)]
    pub notification_sources: Vec<NotificationSource>,
    #[serde(default)]
    pub destinations_to_watch: Vec<DestinationToWatch>,
}

/// Tracks reconcile health: a single `Ready` condition plus the generation
/// it was last computed against, refreshed on every reconcile pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Finalizer this controller appends to every `Config` it manages.
pub const FINALIZER: &str = "reloader.external-secrets.io/finalizer";

/// Annotation stamped once, on first reconcile, with an RFC-3339 timestamp.
pub const PROCESSED_ANNOTATION: &str = "reloader/processed";

/// Annotations stamped on every touched destination object.
pub const LAST_ROTATED_ANNOTATION: &str = "reloader/last-rotated";
pub const TRIGGER_SOURCE_ANNOTATION: &str = "reloader/trigger-source";

/// `status.conditions[].type` used for the single condition this controller
/// populates.
pub const READY_CONDITION: &str = "Ready";
