//! `PushSecret` (external-secrets.io) destination: default references check
//! matches `spec.selector.secret.name` or any `spec.data[*].match.remoteRef.remoteKey`
//! by equality. `apply` is a plain annotations patch; `wait_for` is a no-op.

use async_trait::async_trait;
use kube::api::Api;
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use reloader_api::{DestinationToWatch, RotationEvent};

use crate::destinations::common::{api_for, filter_by_selector, patch_annotations};
use crate::error::HandlerError;
use crate::handler::DestinationHandler;

pub fn gvk() -> ApiResource {
    ApiResource {
        group: "external-secrets.io".to_string(),
        version: "v1alpha1".to_string(),
        api_version: "external-secrets.io/v1alpha1".to_string(),
        kind: "PushSecret".to_string(),
        plural: "pushsecrets".to_string(),
    }
}

pub struct PushSecretHandler {
    client: Client,
    api: Api<DynamicObject>,
}

impl PushSecretHandler {
    pub fn new(client: Client) -> Self {
        let api = api_for(&client, &gvk(), None);
        Self { client, api }
    }
}

#[async_trait]
impl DestinationHandler for PushSecretHandler {
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
        filter_by_selector(&self.client, &gvk(), destination.kind.selector(), None).await
    }

    async fn references(&self, obj: &DynamicObject, secret_identifier: &str) -> Result<bool, HandlerError> {
        let rendered = serde_json::to_string(obj).unwrap_or_default();
        let selector_name = gjson::get(&rendered, "spec.selector.secret.name");
        if selector_name.exists() && selector_name.str() == secret_identifier {
            return Ok(true);
        }
        let mut matched = false;
        gjson::get(&rendered, "spec.data").each(|_, entry| {
            if entry.get("match.remoteRef.remoteKey").str() == secret_identifier {
                matched = true;
                return false;
            }
            true
        });
        Ok(matched)
    }

    async fn apply(&self, obj: &DynamicObject, event: &RotationEvent) -> Result<(), HandlerError> {
        patch_annotations(&self.api, obj, event).await
    }

    fn api(&self) -> &Api<DynamicObject> {
        &self.api
    }
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

    #[tokio::test]
    async fn references_via_selector() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = PushSecretHandler::new(client);
        let ps = obj(serde_json::json!({"selector": {"secret": {"name": "db-password"}}}));
        assert!(handler.references(&ps, "db-password").await.unwrap());
    }

    #[tokio::test]
    async fn references_via_data_match() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = PushSecretHandler::new(client);
        let ps = obj(serde_json::json!({"data": [{"match": {"remoteRef": {"remoteKey": "db-password"}}}]}));
        assert!(handler.references(&ps, "db-password").await.unwrap());
        assert!(!handler.references(&ps, "other").await.unwrap());
    }
}
