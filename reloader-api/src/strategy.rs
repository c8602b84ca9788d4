use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Overrides the default `references` algorithm of a destination handler.
/// The path is evaluated against a canonical JSON rendering of the
/// candidate object; condition truth values combine with logical AND.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchStrategy {
    pub path: String,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub value: String,
    pub operation: ConditionOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionOperation {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    RegularExpression,
}

/// Overrides the default `apply` action of a destination handler.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "operation")]
pub enum UpdateStrategy {
    /// Render `template` as a Go-template-style string (here: a minimal
    /// `{{ .Field }}` substitution engine, see `reloader_core::util::template`)
    /// against the event and patch it at `path` on the main resource.
    Patch { path: String, template: String },
    /// Same as `Patch`, but against the object's `status` subresource.
    PatchStatus { path: String, template: String },
    /// Delete the matched object outright instead of patching it.
    Delete,
}

/// Overrides the default `wait_for` of a destination handler.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitStrategy {
    /// Simply sleep for a fixed duration before considering the destination
    /// settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_seconds: Option<u64>,
    /// Poll the object's `status.conditions` until one matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<WaitForCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitForCondition {
    /// Condition `type` to look for.
    pub r#type: String,
    /// Expected `status` value; empty matches any status.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// Seconds between polls. Defaults to 5s when unset.
    #[serde(default)]
    pub retry_interval_seconds: Option<u64>,
    /// Maximum number of polls before giving up. Defaults to 120.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Only accept the condition once its `lastTransitionTime` is at least
    /// this old.
    #[serde(default)]
    pub min_transition_age_seconds: Option<u64>,
    /// Only accept the condition once its carrying object's update is at
    /// least this old.
    #[serde(default)]
    pub min_update_age_seconds: Option<u64>,
}
