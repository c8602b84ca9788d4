//! cert-manager.io `Certificate` destination. References match by equality
//! against `spec.secretName` — a rotated item that names the certificate's
//! own output secret should retrigger issuance. `apply` patches the
//! `/status` subresource rather than the top-level object, since a
//! `Certificate`'s default update goes through status; `wait_for` is a
//! no-op, since cert-manager's own controller owns the issuance timeline
//! and this engine has no condition to poll that distinguishes
//! "reissuing" from "still on the old cert".

use async_trait::async_trait;
use kube::api::Api;
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use reloader_api::{DestinationToWatch, RotationEvent};

use crate::destinations::common::{api_for, filter_by_selector, patch_status_annotations};
use crate::error::HandlerError;
use crate::handler::DestinationHandler;

pub fn gvk() -> ApiResource {
    ApiResource {
        group: "cert-manager.io".to_string(),
        version: "v1".to_string(),
        api_version: "cert-manager.io/v1".to_string(),
        kind: "Certificate".to_string(),
        plural: "certificates".to_string(),
    }
}

pub struct CertificateHandler {
    client: Client,
    api: Api<DynamicObject>,
}

impl CertificateHandler {
    pub fn new(client: Client) -> Self {
        let api = api_for(&client, &gvk(), None);
        Self { client, api }
    }
}

#[async_trait]
impl DestinationHandler for CertificateHandler {
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
        filter_by_selector(&self.client, &gvk(), destination.kind.selector(), None).await
    }

    async fn references(&self, obj: &DynamicObject, secret_identifier: &str) -> Result<bool, HandlerError> {
        let rendered = serde_json::to_string(obj).unwrap_or_default();
        let secret_name = gjson::get(&rendered, "spec.secretName");
        Ok(secret_name.exists() && secret_name.str() == secret_identifier)
    }

    async fn apply(&self, obj: &DynamicObject, event: &RotationEvent) -> Result<(), HandlerError> {
        patch_status_annotations(&self.api, obj, event).await
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
    async fn references_matching_secret_name() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = CertificateHandler::new(client);
        let cert = obj(serde_json::json!({"secretName": "tls-cert"}));
        assert!(handler.references(&cert, "tls-cert").await.unwrap());
        assert!(!handler.references(&cert, "other").await.unwrap());
    }

    #[tokio::test]
    async fn missing_secret_name_never_references() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = CertificateHandler::new(client);
        let cert = obj(serde_json::json!({}));
        assert!(!handler.references(&cert, "tls-cert").await.unwrap());
    }
}
