//! Namespace/label/name matching shared by every destination handler's
//! default `filter` implementation.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams};
use kube::core::ObjectMeta;
use kube::Client;
use reloader_api::DestinationSelector;
use std::collections::{BTreeMap, HashSet};

use crate::error::HandlerError;

/// Compiles a `DestinationSelector`'s namespace selectors, label selector,
/// and name list into something that can be matched against many objects
/// without re-parsing the selector on every call.
pub struct CompiledSelector {
    namespace_selectors: Vec<String>,
    label_selector: Option<String>,
    names: HashSet<String>,
    matching_namespaces: Option<HashSet<String>>,
}

impl CompiledSelector {
    pub async fn compile(client: &Client, selector: &DestinationSelector) -> Result<Self, HandlerError> {
        let namespace_selectors: Vec<String> = selector
            .namespace_selectors
            .iter()
            .map(label_selector_to_query)
            .collect();

        let matching_namespaces = if namespace_selectors.is_empty() {
            None
        } else {
            let namespaces: Api<k8s_openapi::api::core::v1::Namespace> = Api::all(client.clone());
            let mut matched = HashSet::new();
            for query in &namespace_selectors {
                let lp = ListParams::default().labels(query);
                let list = namespaces.list(&lp).await?;
                matched.extend(list.items.iter().filter_map(|ns| ns.metadata.name.clone()));
            }
            Some(matched)
        };

        let label_selector = selector
            .label_selectors
            .as_ref()
            .map(label_selector_to_query);

        Ok(Self {
            namespace_selectors,
            label_selector,
            names: selector.names.iter().cloned().collect(),
            matching_namespaces,
        })
    }

    /// Whether `obj` satisfies every non-empty criterion: namespace, labels,
    /// and name all combine with logical AND.
    pub fn matches(&self, obj: &ObjectMeta) -> bool {
        let namespace_ok = match &self.matching_namespaces {
            None => true,
            Some(namespaces) => obj
                .namespace
                .as_deref()
                .is_some_and(|ns| namespaces.contains(ns)),
        };
        let empty = BTreeMap::new();
        let labels_ok = match &self.label_selector {
            None => true,
            Some(query) => matches_label_query(query, obj.labels.as_ref().unwrap_or(&empty)),
        };
        let name_ok = self.names.is_empty() || obj.name.as_deref().is_some_and(|n| self.names.contains(n));
        namespace_ok && labels_ok && name_ok
    }

    pub fn has_namespace_selectors(&self) -> bool {
        !self.namespace_selectors.is_empty()
    }
}

fn label_selector_to_query(selector: &LabelSelector) -> String {
    let mut parts = Vec::new();
    if let Some(match_labels) = &selector.match_labels {
        for (k, v) in match_labels {
            parts.push(format!("{k}={v}"));
        }
    }
    if let Some(exprs) = &selector.match_expressions {
        for expr in exprs {
            match expr.operator.as_str() {
                "In" => {
                    let values = expr.values.clone().unwrap_or_default().join(",");
                    parts.push(format!("{} in ({})", expr.key, values));
                }
                "NotIn" => {
                    let values = expr.values.clone().unwrap_or_default().join(",");
                    parts.push(format!("{} notin ({})", expr.key, values));
                }
                "Exists" => parts.push(expr.key.clone()),
                "DoesNotExist" => parts.push(format!("!{}", expr.key)),
                _ => {}
            }
        }
    }
    parts.join(",")
}

fn matches_label_query(query: &str, labels: &std::collections::BTreeMap<String, String>) -> bool {
    if query.is_empty() {
        return true;
    }
    query.split(',').all(|clause| {
        let clause = clause.trim();
        if let Some(key) = clause.strip_prefix('!') {
            !labels.contains_key(key)
        } else if let Some((key, rest)) = clause.split_once(" in (") {
            let values: HashSet<&str> = rest.trim_end_matches(')').split(',').collect();
            labels.get(key.trim()).is_some_and(|v| values.contains(v.as_str()))
        } else if let Some((key, rest)) = clause.split_once(" notin (") {
            let values: HashSet<&str> = rest.trim_end_matches(')').split(',').collect();
            !labels.get(key.trim()).is_some_and(|v| values.contains(v.as_str()))
        } else if let Some((key, value)) = clause.split_once('=') {
            labels.get(key.trim()).is_some_and(|v| v == value.trim())
        } else {
            labels.contains_key(clause)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, ns: &str, labels: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(ns.into()),
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(matches_label_query("", &Default::default()));
    }

    #[test]
    fn equality_clause_matches() {
        let mut labels = std::collections::BTreeMap::new();
        labels.insert("team".to_string(), "payments".to_string());
        assert!(matches_label_query("team=payments", &labels));
        assert!(!matches_label_query("team=checkout", &labels));
    }

    #[test]
    fn compiled_selector_name_only_matches_by_name() {
        let selector = CompiledSelector {
            namespace_selectors: vec![],
            label_selector: None,
            names: ["es-a".to_string()].into_iter().collect(),
            matching_namespaces: None,
        };
        assert!(selector.matches(&meta("es-a", "default", &[])));
        assert!(!selector.matches(&meta("es-b", "default", &[])));
    }
}
