//! `apps/v1` `Deployment` destination. The touch is a pod-template
//! annotations patch (so it actually triggers a new rollout, unlike a
//! top-level metadata annotation), references match any container's
//! `env[*].valueFrom.secretKeyRef.name`/`configMapKeyRef.name` or
//! `envFrom[*].secretRef.name`/`configMapRef.name`, and `wait_for` polls
//! rollout completion.

use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use reloader_api::{DestinationToWatch, RotationEvent, LAST_ROTATED_ANNOTATION, TRIGGER_SOURCE_ANNOTATION};
use tokio::time::{interval, timeout};

use crate::destinations::common::{api_for, filter_by_selector};
use crate::error::HandlerError;
use crate::handler::DestinationHandler;

const ROLLOUT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ROLLOUT_TIMEOUT: Duration = Duration::from_secs(600);

pub fn gvk() -> ApiResource {
    ApiResource {
        group: "apps".to_string(),
        version: "v1".to_string(),
        api_version: "apps/v1".to_string(),
        kind: "Deployment".to_string(),
        plural: "deployments".to_string(),
    }
}

pub struct DeploymentHandler {
    client: Client,
    api: Api<DynamicObject>,
}

impl DeploymentHandler {
    pub fn new(client: Client) -> Self {
        let api = api_for(&client, &gvk(), None);
        Self { client, api }
    }
}

#[async_trait]
impl DestinationHandler for DeploymentHandler {
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
        filter_by_selector(&self.client, &gvk(), destination.kind.selector(), None).await
    }

    async fn references(&self, obj: &DynamicObject, secret_identifier: &str) -> Result<bool, HandlerError> {
        let rendered = serde_json::to_string(obj).unwrap_or_default();
        let mut matched = false;
        gjson::get(&rendered, "spec.template.spec.containers").each(|_, container| {
            container.get("env").each(|_, env| {
                let secret_ref = env.get("valueFrom.secretKeyRef.name");
                let config_map_ref = env.get("valueFrom.configMapKeyRef.name");
                if (secret_ref.exists() && secret_ref.str() == secret_identifier)
                    || (config_map_ref.exists() && config_map_ref.str() == secret_identifier)
                {
                    matched = true;
                    return false;
                }
                true
            });
            container.get("envFrom").each(|_, env_from| {
                let secret_ref = env_from.get("secretRef.name");
                let config_map_ref = env_from.get("configMapRef.name");
                if (secret_ref.exists() && secret_ref.str() == secret_identifier)
                    || (config_map_ref.exists() && config_map_ref.str() == secret_identifier)
                {
                    matched = true;
                    return false;
                }
                true
            });
            !matched
        });
        Ok(matched)
    }

    async fn apply(&self, obj: &DynamicObject, event: &RotationEvent) -> Result<(), HandlerError> {
        let name = obj.metadata.name.clone().ok_or(HandlerError::UnnamedObject)?;
        let patch = serde_json::json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            LAST_ROTATED_ANNOTATION: event.rotation_timestamp,
                            TRIGGER_SOURCE_ANNOTATION: event.trigger_source,
                        }
                    }
                }
            }
        });
        self.api.patch(&name, &PatchParams::default(), &Patch::Merge(patch)).await?;
        Ok(())
    }

    async fn wait_for(&self, obj: &DynamicObject) -> Result<(), HandlerError> {
        let name = obj.metadata.name.clone().ok_or(HandlerError::UnnamedObject)?;
        let api = self.api.clone();
        let poll = async move {
            let mut ticker = interval(ROLLOUT_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let current = api.get(&name).await?;
                if rollout_complete(&current) {
                    return Ok::<(), HandlerError>(());
                }
            }
        };
        timeout(ROLLOUT_TIMEOUT, poll)
            .await
            .map_err(|_| HandlerError::WaitTimedOut((ROLLOUT_TIMEOUT.as_millis() / ROLLOUT_POLL_INTERVAL.as_millis()) as u32))?
    }

    fn api(&self) -> &Api<DynamicObject> {
        &self.api
    }
}

fn rollout_complete(deployment: &DynamicObject) -> bool {
    let rendered = serde_json::to_string(deployment).unwrap_or_default();
    let generation = gjson::get(&rendered, "metadata.generation");
    let observed = gjson::get(&rendered, "status.observedGeneration");
    if !generation.exists() || !observed.exists() || generation.i64() != observed.i64() {
        return false;
    }
    if gjson::get(&rendered, "spec.paused").bool() {
        return false;
    }
    let replicas = gjson::get(&rendered, "spec.replicas");
    if !replicas.exists() {
        return false;
    }
    let wanted = replicas.i64();

    let mut progressing = false;
    gjson::get(&rendered, "status.conditions").each(|_, condition| {
        if condition.get("type").str() == "Progressing"
            && condition.get("status").str() == "True"
            && condition.get("reason").str() == "NewReplicaSetAvailable"
        {
            progressing = true;
            return false;
        }
        true
    });
    if !progressing {
        return false;
    }

    let updated = gjson::get(&rendered, "status.updatedReplicas").i64();
    let available = gjson::get(&rendered, "status.availableReplicas").i64();
    let ready = gjson::get(&rendered, "status.readyReplicas").i64();
    updated == wanted && available == wanted && ready == wanted
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;

    fn obj(data: serde_json::Value) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data,
        }
    }

    #[test]
    fn generation_mismatch_is_incomplete() {
        let d = obj(serde_json::json!({
            "metadata": {"generation": 2},
            "status": {"observedGeneration": 1},
        }));
        assert!(!rollout_complete(&d));
    }

    #[test]
    fn paused_is_incomplete() {
        let d = obj(serde_json::json!({
            "metadata": {"generation": 1},
            "spec": {"paused": true},
            "status": {"observedGeneration": 1},
        }));
        assert!(!rollout_complete(&d));
    }

    #[test]
    fn missing_replicas_is_never_complete() {
        let d = obj(serde_json::json!({
            "metadata": {"generation": 1},
            "status": {
                "observedGeneration": 1,
                "conditions": [{"type": "Progressing", "status": "True", "reason": "NewReplicaSetAvailable"}],
                "updatedReplicas": 1,
                "availableReplicas": 1,
                "readyReplicas": 1,
            },
        }));
        assert!(!rollout_complete(&d));
    }

    #[test]
    fn fully_rolled_out_matches_replica_counts() {
        let d = obj(serde_json::json!({
            "metadata": {"generation": 1},
            "spec": {"replicas": 3},
            "status": {
                "observedGeneration": 1,
                "conditions": [{"type": "Progressing", "status": "True", "reason": "NewReplicaSetAvailable"}],
                "updatedReplicas": 3,
                "availableReplicas": 3,
                "readyReplicas": 3,
            },
        }));
        assert!(rollout_complete(&d));
    }

    #[tokio::test]
    async fn references_env_secret_key_ref() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = DeploymentHandler::new(client);
        let d = obj(serde_json::json!({
            "spec": {"template": {"spec": {"containers": [
                {"env": [{"valueFrom": {"secretKeyRef": {"name": "db-password"}}}]}
            ]}}}
        }));
        assert!(handler.references(&d, "db-password").await.unwrap());
        assert!(!handler.references(&d, "other").await.unwrap());
    }
}
