//! Destination configuration: which cluster objects get touched, and with
//! which strategy overrides.

use schemars::JsonSchema;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::selector::{DestinationSelector, GenericSelector};
use crate::strategy::{MatchStrategy, UpdateStrategy, WaitStrategy};

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DestinationKind {
    ExternalSecret(DestinationSelector),
    PushSecret(DestinationSelector),
    Deployment(DestinationSelector),
    WorkflowRunTemplate(DestinationSelector),
    Certificate(DestinationSelector),
    Secret(DestinationSelector),
    /// Has no kind-specific default `references`/`apply`: a `Generic`
    /// destination only works paired with an explicit `matchStrategy` and
    /// `updateStrategy` on its `DestinationToWatch`.
    Generic(GenericSelector),
}

impl DestinationKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::ExternalSecret(_) => "ExternalSecret",
            Self::PushSecret(_) => "PushSecret",
            Self::Deployment(_) => "Deployment",
            Self::WorkflowRunTemplate(_) => "WorkflowRunTemplate",
            Self::Certificate(_) => "Certificate",
            Self::Secret(_) => "Secret",
            Self::Generic(_) => "Generic",
        }
    }

    pub fn selector(&self) -> &DestinationSelector {
        match self {
            Self::ExternalSecret(s)
            | Self::PushSecret(s)
            | Self::Deployment(s)
            | Self::WorkflowRunTemplate(s)
            | Self::Certificate(s)
            | Self::Secret(s) => s,
            Self::Generic(s) => &s.common,
        }
    }

    pub fn generic(&self) -> Option<&GenericSelector> {
        match self {
            Self::Generic(s) => Some(s),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for DestinationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KindVisitor;

        impl<'de> Visitor<'de> for KindVisitor {
            type Value = DestinationKind;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a destination object with a `type` field and a matching selector field")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut ty: Option<String> = None;
                let mut raw: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();
                while let Some(key) = map.next_key::<String>()? {
                    if key == "type" || key == "updateStrategy" || key == "matchStrategy" || key == "waitStrategy"
                    {
                        // consumed separately by DestinationToWatch; skip here
                        if key == "type" {
                            ty = Some(map.next_value()?);
                        } else {
                            let _: de::IgnoredAny = map.next_value()?;
                        }
                    } else {
                        let value: serde_json::Value = map.next_value()?;
                        raw.insert(key, value);
                    }
                }
                let ty = ty.ok_or_else(|| de::Error::missing_field("type"))?;
                let field = match ty.as_str() {
                    "ExternalSecret" => "externalSecret",
                    "PushSecret" => "pushSecret",
                    "Deployment" => "deployment",
                    "WorkflowRunTemplate" => "workflowRunTemplate",
                    "Certificate" => "certificate",
                    "Secret" => "secret",
                    "Generic" => "generic",
                    other => {
                        return Err(de::Error::unknown_variant(other, &[
                            "ExternalSecret", "PushSecret", "Deployment", "WorkflowRunTemplate",
                            "Certificate", "Secret", "Generic",
                        ]))
                    }
                };
                if ty == "Generic" {
                    let generic: GenericSelector = match raw.remove(field) {
                        Some(v) => serde_json::from_value(v).map_err(de::Error::custom)?,
                        None => return Err(de::Error::missing_field("generic")),
                    };
                    return Ok(DestinationKind::Generic(generic));
                }
                let selector: DestinationSelector = match raw.remove(field) {
                    Some(v) => serde_json::from_value(v).map_err(de::Error::custom)?,
                    // A bare `{type: Foo}` with no sibling config is legal: it means
                    // "watch everything", same as an explicit empty selector triple.
                    None => DestinationSelector::default(),
                };
                macro_rules! into {
                    ($variant:ident) => {
                        Ok(DestinationKind::$variant(selector))
                    };
                }
                match ty.as_str() {
                    "ExternalSecret" => into!(ExternalSecret),
                    "PushSecret" => into!(PushSecret),
                    "Deployment" => into!(Deployment),
                    "WorkflowRunTemplate" => into!(WorkflowRunTemplate),
                    "Certificate" => into!(Certificate),
                    "Secret" => into!(Secret),
                    _ => unreachable!(),
                }
            }
        }

        deserializer.deserialize_map(KindVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_destination_with_selector() {
        let json = serde_json::json!({
            "type": "ExternalSecret",
            "externalSecret": {"names": ["es-a"]},
        });
        let dest: DestinationToWatch = serde_json::from_value(json).unwrap();
        assert_eq!(dest.kind.type_tag(), "ExternalSecret");
        assert_eq!(dest.kind.selector().names, vec!["es-a".to_string()]);
        assert!(dest.update_strategy.is_none());
    }

    #[test]
    fn bare_type_with_no_sibling_config_matches_everything() {
        let json = serde_json::json!({"type": "Deployment"});
        let dest: DestinationToWatch = serde_json::from_value(json).unwrap();
        assert!(dest.kind.selector().names.is_empty());
    }

    #[test]
    fn generic_requires_its_own_config() {
        let json = serde_json::json!({"type": "Generic"});
        let err = serde_json::from_value::<DestinationToWatch>(json).unwrap_err();
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn generic_carries_its_own_gvk() {
        let json = serde_json::json!({
            "type": "Generic",
            "generic": {"apiVersion": "cert-manager.io/v1", "kind": "Certificate", "names": ["tls-a"]},
        });
        let dest: DestinationToWatch = serde_json::from_value(json).unwrap();
        let generic = dest.kind.generic().unwrap();
        assert_eq!(generic.api_version, "cert-manager.io/v1");
        assert_eq!(generic.kind, "Certificate");
        assert_eq!(generic.common.names, vec!["tls-a".to_string()]);
    }

    #[test]
    fn carries_strategy_overrides() {
        let json = serde_json::json!({
            "type": "Certificate",
            "certificate": {},
            "waitStrategy": {"timeSeconds": 30},
        });
        let dest: DestinationToWatch = serde_json::from_value(json).unwrap();
        assert_eq!(dest.wait_strategy.unwrap().time_seconds, Some(30));
    }
}

/// One entry of `spec.destinations_to_watch`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DestinationToWatch {
    #[serde(flatten)]
    pub kind: DestinationKind,
    #[serde(default)]
    pub update_strategy: Option<UpdateStrategy>,
    #[serde(default)]
    pub match_strategy: Option<MatchStrategy>,
    #[serde(default)]
    pub wait_strategy: Option<WaitStrategy>,
}
