//! Core `v1.Secret` destination: the rotated item annotates itself. This
//! covers the case where nothing downstream owns a reconcile loop but
//! something outside the cluster (a sidecar, a mount refresher) polls the
//! Secret's own annotations for a rotation timestamp. References match the
//! object's own name against the rotated identifier; `apply` is a plain
//! annotations patch; `wait_for` is a no-op, there being nothing further
//! to settle.

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
        group: String::new(),
        version: "v1".to_string(),
        api_version: "v1".to_string(),
        kind: "Secret".to_string(),
        plural: "secrets".to_string(),
    }
}

pub struct SecretHandler {
    client: Client,
    api: Api<DynamicObject>,
}

impl SecretHandler {
    pub fn new(client: Client) -> Self {
        let api = api_for(&client, &gvk(), None);
        Self { client, api }
    }
}

#[async_trait]
impl DestinationHandler for SecretHandler {
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
        filter_by_selector(&self.client, &gvk(), destination.kind.selector(), None).await
    }

    async fn references(&self, obj: &DynamicObject, secret_identifier: &str) -> Result<bool, HandlerError> {
        Ok(obj.metadata.name.as_deref() == Some(secret_identifier))
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

    #[tokio::test]
    async fn references_by_own_name() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = SecretHandler::new(client);
        let secret = DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("db-password".to_string()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        };
        assert!(handler.references(&secret, "db-password").await.unwrap());
        assert!(!handler.references(&secret, "other").await.unwrap());
    }
}
