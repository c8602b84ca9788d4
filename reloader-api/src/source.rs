//! Notification source configuration.
//!
//! The wire format for a source is `{"type": "<Tag>", "<tag>": {...}}`: the
//! `type` field names which of the sibling fields holds the type-specific
//! config. We derive `Serialize`/`JsonSchema` the ordinary (externally
//! tagged) way and hand-write `Deserialize` to accept the wire format,
//! mirroring how this crate's upstream CRDs encode their own discriminated
//! provider configs.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::selector::{SecretKeySelector, ServiceAccountSelector};

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum NotificationSource {
    AwsSqs(AwsSqsSource),
    AzureEventGrid(AzureEventGridSource),
    GooglePubSub(GooglePubSubSource),
    Webhook(WebhookSource),
    #[serde(rename = "TCPSocket")]
    TcpSocket(TcpSocketSource),
    HashicorpVault(HashicorpVaultSource),
    KubernetesSecret(KubernetesObjectSource),
    KubernetesConfigMap(KubernetesObjectSource),
    Mock(MockSource),
}

impl NotificationSource {
    /// The discriminant string as it appears on the wire, used to build the
    /// listener key (`type + "-" + hex(hash)`) and for provider lookup.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::AwsSqs(_) => "AwsSqs",
            Self::AzureEventGrid(_) => "AzureEventGrid",
            Self::GooglePubSub(_) => "GooglePubSub",
            Self::Webhook(_) => "Webhook",
            Self::TcpSocket(_) => "TCPSocket",
            Self::HashicorpVault(_) => "HashicorpVault",
            Self::KubernetesSecret(_) => "KubernetesSecret",
            Self::KubernetesConfigMap(_) => "KubernetesConfigMap",
            Self::Mock(_) => "Mock",
        }
    }

    /// Canonical JSON of the type-specific sub-object only, used by the
    /// listener-key hash. Two sources of the same type with byte-different
    /// JSON orderings still hash identically because `serde_json::to_value`
    /// normalizes map key order before we serialize it back out sorted.
    pub fn config_value(&self) -> serde_json::Value {
        match self {
            Self::AwsSqs(c) => serde_json::to_value(c),
            Self::AzureEventGrid(c) => serde_json::to_value(c),
            Self::GooglePubSub(c) => serde_json::to_value(c),
            Self::Webhook(c) => serde_json::to_value(c),
            Self::TcpSocket(c) => serde_json::to_value(c),
            Self::HashicorpVault(c) => serde_json::to_value(c),
            Self::KubernetesSecret(c) => serde_json::to_value(c),
            Self::KubernetesConfigMap(c) => serde_json::to_value(c),
            Self::Mock(c) => serde_json::to_value(c),
        }
        .unwrap_or(serde_json::Value::Null)
    }
}

impl<'de> Deserialize<'de> for NotificationSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SourceVisitor;

        impl<'de> Visitor<'de> for SourceVisitor {
            type Value = NotificationSource;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a notification source object with a `type` field and a matching config field")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut ty: Option<String> = None;
                let mut raw: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();
                while let Some(key) = map.next_key::<String>()? {
                    if key == "type" {
                        ty = Some(map.next_value()?);
                    } else {
                        let value: serde_json::Value = map.next_value()?;
                        raw.insert(key, value);
                    }
                }
                let ty = ty.ok_or_else(|| de::Error::missing_field("type"))?;
                let field = match ty.as_str() {
                    "AwsSqs" => "awsSqs",
                    "AzureEventGrid" => "azureEventGrid",
                    "GooglePubSub" => "googlePubSub",
                    "Webhook" => "webhook",
                    "TCPSocket" => "tcpSocket",
                    "HashicorpVault" => "hashicorpVault",
                    "KubernetesSecret" => "kubernetesSecret",
                    "KubernetesConfigMap" => "kubernetesConfigMap",
                    "Mock" => "mock",
                    other => return Err(de::Error::unknown_variant(other, &[
                        "AwsSqs", "AzureEventGrid", "GooglePubSub", "Webhook", "TCPSocket",
                        "HashicorpVault", "KubernetesSecret", "KubernetesConfigMap", "Mock",
                    ])),
                };
                let Some(cfg) = raw.remove(field) else {
                    return Err(de::Error::missing_field(Box::leak(field.to_string().into_boxed_str())));
                };
                macro_rules! into {
                    ($variant:ident) => {
                        serde_json::from_value(cfg)
                            .map(NotificationSource::$variant)
                            .map_err(de::Error::custom)
                    };
                }
                match ty.as_str() {
                    "AwsSqs" => into!(AwsSqs),
                    "AzureEventGrid" => into!(AzureEventGrid),
                    "GooglePubSub" => into!(GooglePubSub),
                    "Webhook" => into!(Webhook),
                    "TCPSocket" => into!(TcpSocket),
                    "HashicorpVault" => into!(HashicorpVault),
                    "KubernetesSecret" => into!(KubernetesSecret),
                    "KubernetesConfigMap" => into!(KubernetesConfigMap),
                    "Mock" => into!(Mock),
                    _ => unreachable!(),
                }
            }
        }

        deserializer.deserialize_map(SourceVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AwsAuth {
    StaticKeyPair {
        access_key_id_secret_ref: SecretKeySelector,
        secret_access_key_secret_ref: SecretKeySelector,
    },
    Irsa {
        role_arn: String,
        service_account: ServiceAccountSelector,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsSqsSource {
    pub queue_url: String,
    pub region: String,
    #[serde(default)]
    pub auth: Option<AwsAuth>,
    #[serde(default = "default_max_messages")]
    pub max_messages: i32,
    #[serde(default = "default_wait_time_seconds")]
    pub wait_time_seconds: i32,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: i32,
}

fn default_max_messages() -> i32 {
    10
}
fn default_wait_time_seconds() -> i32 {
    20
}
fn default_visibility_timeout() -> i32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureEventGridSource {
    /// `host:port` to bind the validation/delivery HTTP server on.
    #[serde(default)]
    pub address: Option<String>,
    /// Event Grid subscription names; each gets a `/<name>` route.
    pub subscriptions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum GcpAuth {
    SecretRefJwt { secret_ref: SecretKeySelector },
    WorkloadIdentity {
        service_account_email: String,
        service_account: ServiceAccountSelector,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GooglePubSubSource {
    pub project: String,
    pub subscription: String,
    #[serde(default)]
    pub auth: Option<GcpAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum WebhookAuth {
    Basic {
        username_secret_ref: SecretKeySelector,
        password_secret_ref: SecretKeySelector,
    },
    Bearer {
        token_secret_ref: SecretKeySelector,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// `"linear"` waits 1s between tries; anything else (including empty)
    /// is treated as `"exponential"` (`2^n` seconds).
    #[serde(default)]
    pub algorithm: String,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSource {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secret_identifier_path: Option<String>,
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TcpSocketSource {
    #[serde(default)]
    pub host: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub secret_identifier_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HashicorpVaultSource {
    #[serde(default)]
    pub host: Option<String>,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum KubernetesAuth {
    Ambient,
    KubeconfigSecretRef { secret_ref: SecretKeySelector },
    BearerTokenSecretRef { secret_ref: SecretKeySelector },
    ServiceAccountTokenRequest { service_account: ServiceAccountSelector },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesObjectSource {
    #[serde(default)]
    pub label_selector: Option<LabelSelector>,
    #[serde(default)]
    pub auth: Option<KubernetesAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MockEvent {
    pub secret_identifier: String,
    pub rotation_timestamp: String,
    #[serde(default = "default_mock_trigger_source")]
    pub trigger_source: String,
}

fn default_mock_trigger_source() -> String {
    "mock".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MockSource {
    #[serde(default = "default_mock_interval_seconds")]
    pub interval_seconds: u64,
    pub events: Vec<MockEvent>,
}

fn default_mock_interval_seconds() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_aws_sqs_with_type_tag() {
        let json = serde_json::json!({
            "type": "AwsSqs",
            "awsSqs": {
                "queueUrl": "https://sqs.us-east-1.amazonaws.com/123/rotations",
                "region": "us-east-1",
            }
        });
        let source: NotificationSource = serde_json::from_value(json).unwrap();
        assert_eq!(source.type_tag(), "AwsSqs");
        match source {
            NotificationSource::AwsSqs(cfg) => {
                assert_eq!(cfg.region, "us-east-1");
                assert_eq!(cfg.max_messages, 10);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn deserializes_tcp_socket_variant() {
        let json = serde_json::json!({"type": "TCPSocket", "tcpSocket": {"port": 9000}});
        let source: NotificationSource = serde_json::from_value(json).unwrap();
        assert_eq!(source.type_tag(), "TCPSocket");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = serde_json::json!({"type": "Telepathy", "telepathy": {}});
        let err = serde_json::from_value::<NotificationSource>(json).unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn missing_matching_field_is_rejected() {
        let json = serde_json::json!({"type": "AwsSqs"});
        let err = serde_json::from_value::<NotificationSource>(json).unwrap_err();
        assert!(err.to_string().contains("missing field"));
    }
}
