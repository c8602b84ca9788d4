//! Evaluates the override strategies a `DestinationToWatch` may carry
//! (`matchStrategy`/`updateStrategy`/`waitStrategy`) against a dynamic
//! object, independent of which destination kind it came from.

use std::time::Duration;

use kube::api::{Api, Patch, PatchParams};
use kube::core::DynamicObject;
use regex::Regex;
use reloader_api::{Condition, ConditionOperation, MatchStrategy, RotationEvent, UpdateStrategy, WaitStrategy};
use tokio::time::sleep;

use crate::error::HandlerError;
use crate::util::template;

/// Evaluates `strategy.path` against the canonical JSON of `obj` and ANDs
/// every condition's truth value.
pub fn matches(strategy: &MatchStrategy, obj: &DynamicObject) -> bool {
    let rendered = gjson_target(obj);
    let value = gjson::get(&rendered, &strategy.path);
    strategy
        .conditions
        .iter()
        .all(|condition| condition_holds(condition, &value))
}

fn condition_holds(condition: &Condition, value: &gjson::Value) -> bool {
    let actual = value.str();
    match condition.operation {
        ConditionOperation::Equal => actual == condition.value,
        ConditionOperation::NotEqual => actual != condition.value,
        ConditionOperation::Contains => actual.contains(&condition.value),
        ConditionOperation::NotContains => !actual.contains(&condition.value),
        ConditionOperation::RegularExpression => Regex::new(&condition.value)
            .map(|re| re.is_match(actual))
            .unwrap_or(false),
    }
}

fn gjson_target(obj: &DynamicObject) -> String {
    serde_json::to_string(obj).unwrap_or_default()
}

/// Applies `strategy` to `obj` in the cluster: a JSON merge patch rendering
/// `template` at `path` (on the main resource or its `status` subresource),
/// or an outright delete.
pub async fn apply(
    strategy: &UpdateStrategy,
    api: &Api<DynamicObject>,
    obj: &DynamicObject,
    event: &RotationEvent,
) -> Result<(), HandlerError> {
    let name = obj.metadata.name.clone().ok_or(HandlerError::UnnamedObject)?;
    match strategy {
        UpdateStrategy::Patch { path, template } => {
            let rendered = template::render(template, event);
            let patch = json_patch_at(path, &rendered);
            api.patch(&name, &PatchParams::default(), &Patch::Merge(patch))
                .await?;
        }
        UpdateStrategy::PatchStatus { path, template } => {
            let rendered = template::render(template, event);
            let patch = json_patch_at(path, &rendered);
            api.patch_status(&name, &PatchParams::default(), &Patch::Merge(patch))
                .await?;
        }
        UpdateStrategy::Delete => {
            api.delete(&name, &Default::default()).await?;
        }
    }
    Ok(())
}

/// Builds `{"a":{"b":"value"}}` for a dotted `path` of `"a.b"`.
fn json_patch_at(path: &str, value: &str) -> serde_json::Value {
    let mut segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let mut node = serde_json::Value::String(value.to_string());
    while let Some(segment) = segments.pop() {
        node = serde_json::json!({ segment: node });
    }
    node
}

/// Blocks until `strategy` is satisfied: a flat sleep, or polling
/// `status.conditions` on the live object until a match (or the retry
/// budget runs out).
pub async fn wait(strategy: &WaitStrategy, api: &Api<DynamicObject>, name: &str) -> Result<(), HandlerError> {
    if let Some(seconds) = strategy.time_seconds {
        sleep(Duration::from_secs(seconds)).await;
        return Ok(());
    }
    let Some(condition) = &strategy.condition else {
        return Ok(());
    };
    let interval = Duration::from_secs(condition.retry_interval_seconds.unwrap_or(5));
    let max_retries = condition.max_retries.unwrap_or(120);

    for attempt in 0..max_retries {
        let obj = api.get(name).await?;
        if condition_satisfied(condition, &obj) {
            return Ok(());
        }
        if attempt + 1 < max_retries {
            sleep(interval).await;
        }
    }
    Err(HandlerError::WaitTimedOut(max_retries))
}

fn condition_satisfied(wanted: &reloader_api::WaitForCondition, obj: &DynamicObject) -> bool {
    let rendered = gjson_target(obj);
    let conditions = gjson::get(&rendered, "status.conditions");
    if !conditions.exists() {
        return false;
    }
    conditions_match(&conditions, wanted, obj)
}

fn conditions_match(conditions: &gjson::Value, wanted: &reloader_api::WaitForCondition, obj: &DynamicObject) -> bool {
    let mut found = false;
    conditions.each(|_, entry| {
        if entry.get("type").str() == wanted.r#type
            && (wanted.status.is_empty() || entry.get("status").str() == wanted.status)
            && (wanted.reason.is_empty() || entry.get("reason").str() == wanted.reason)
            && (wanted.message.is_empty() || entry.get("message").str() == wanted.message)
            && transition_old_enough(wanted, &entry)
            && update_old_enough(wanted, obj)
        {
            found = true;
            return false;
        }
        true
    });
    found
}

/// Best-effort: the only wall-clock signal available on an arbitrary object
/// is a `managedFields` entry's `time`. Objects with none (or a malformed
/// timestamp) are treated as satisfying the constraint rather than blocking
/// `wait_for` forever on an unrelated field server-side-apply doesn't set.
fn update_old_enough(wanted: &reloader_api::WaitForCondition, obj: &DynamicObject) -> bool {
    let Some(min_age) = wanted.min_update_age_seconds else {
        return true;
    };
    let Some(latest) = obj
        .metadata
        .managed_fields
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|mf| mf.time.as_ref())
        .map(|t| t.0)
        .max()
    else {
        return true;
    };
    let age = chrono::Utc::now().signed_duration_since(latest);
    age.num_seconds() >= min_age as i64
}

fn transition_old_enough(wanted: &reloader_api::WaitForCondition, entry: &gjson::Value) -> bool {
    let Some(min_age) = wanted.min_transition_age_seconds else {
        return true;
    };
    let last_transition_time = entry.get("lastTransitionTime");
    let raw = last_transition_time.str();
    let Ok(transitioned_at) = chrono::DateTime::parse_from_rfc3339(raw) else {
        return true;
    };
    let age = chrono::Utc::now().signed_duration_since(transitioned_at.with_timezone(&chrono::Utc));
    age.num_seconds() >= min_age as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;

    fn obj(spec: serde_json::Value) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: serde_json::json!({ "spec": spec }),
        }
    }

    #[test]
    fn equal_condition_matches_path_value() {
        let strategy = MatchStrategy {
            path: "spec.secretName".to_string(),
            conditions: vec![Condition {
                value: "db-password".to_string(),
                operation: ConditionOperation::Equal,
            }],
        };
        assert!(matches(&strategy, &obj(serde_json::json!({"secretName": "db-password"}))));
        assert!(!matches(&strategy, &obj(serde_json::json!({"secretName": "other"}))));
    }

    #[test]
    fn regex_condition() {
        let strategy = MatchStrategy {
            path: "spec.secretName".to_string(),
            conditions: vec![Condition {
                value: "^db-.*".to_string(),
                operation: ConditionOperation::RegularExpression,
            }],
        };
        assert!(matches(&strategy, &obj(serde_json::json!({"secretName": "db-password"}))));
        assert!(!matches(&strategy, &obj(serde_json::json!({"secretName": "cache-key"}))));
    }

    #[test]
    fn patch_path_builds_nested_object() {
        let patch = json_patch_at("metadata.annotations", "value");
        assert_eq!(patch, serde_json::json!({"metadata": {"annotations": "value"}}));
    }
}
