use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The three orthogonal filters every destination kind shares. An object is
/// watched iff all three match; each filter vacuously matches everything
/// when left empty/absent (see spec.md §3, "Destination selector").
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSelector {
    /// Zero-or-more label selectors over namespace objects; matches if ANY
    /// selector matches the namespace's labels. Empty matches all namespaces.
    #[serde(default)]
    pub namespace_selectors: Vec<LabelSelector>,
    /// A single selector over the object's own labels. Absent matches
    /// everything.
    #[serde(default)]
    pub label_selectors: Option<LabelSelector>,
    /// Explicit name allow-list. Empty matches every name.
    #[serde(default)]
    pub names: Vec<String>,
}

/// `Generic`'s selector: everything `DestinationSelector` offers, plus the
/// GVK to list, since a generic destination has no kind-specific schema to
/// infer one from the way `ExternalSecret`/`Deployment`/etc. do.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenericSelector {
    pub api_version: String,
    pub kind: String,
    #[serde(flatten)]
    pub common: DestinationSelector,
}

/// Reference to a single key within a Kubernetes `Secret`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
    pub namespace: String,
}

/// Reference to a `ServiceAccount` used to mint a projected token for
/// cloud-identity federation (IRSA, GKE Workload Identity).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSelector {
    pub name: String,
    pub namespace: String,
    /// `aud` claim for the minted token. If the service account carries a
    /// well-known federation annotation (IRSA/Workload Identity) this is
    /// appended to those audiences.
    #[serde(default)]
    pub audiences: Vec<String>,
}
