//! `WorkflowRunTemplate` destination. Unlike the other kinds, references
//! always returns `true`: a workflow run should be triggered on every
//! matched rotation regardless of which field changed, since the whole
//! point of a workflow destination is "run this on any rotation event
//! touching the watched names/labels/namespaces". `apply` is a plain
//! annotations patch; `wait_for` is a no-op.

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
        group: "workflows.external-secrets.io".to_string(),
        version: "v1alpha1".to_string(),
        api_version: "workflows.external-secrets.io/v1alpha1".to_string(),
        kind: "WorkflowRunTemplate".to_string(),
        plural: "workflowruntemplates".to_string(),
    }
}

pub struct WorkflowHandler {
    client: Client,
    api: Api<DynamicObject>,
}

impl WorkflowHandler {
    pub fn new(client: Client) -> Self {
        let api = api_for(&client, &gvk(), None);
        Self { client, api }
    }
}

#[async_trait]
impl DestinationHandler for WorkflowHandler {
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
        filter_by_selector(&self.client, &gvk(), destination.kind.selector(), None).await
    }

    async fn references(&self, _obj: &DynamicObject, _secret_identifier: &str) -> Result<bool, HandlerError> {
        Ok(true)
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
    async fn always_references() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = WorkflowHandler::new(client);
        let obj = DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: serde_json::json!({}),
        };
        assert!(handler.references(&obj, "anything").await.unwrap());
    }
}
