//! `ExternalSecret` (external-secrets.io) destination: default references
//! check matches `spec.data[*].remoteRef.key` by equality or
//! `spec.dataFrom[*].find.name.regexp` by regular expression, and `apply`
//! is a plain annotations patch. `wait_for` has nothing to wait on: an
//! `ExternalSecret`'s own controller reconciles on its own schedule once
//! touched, and this engine has no signal for "the secret value changed"
//! distinct from "the annotation changed".

use async_trait::async_trait;
use kube::api::Api;
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use reloader_api::{DestinationToWatch, RotationEvent};
use regex::Regex;

use crate::destinations::common::{api_for, filter_by_selector, patch_annotations};
use crate::error::HandlerError;
use crate::handler::DestinationHandler;

pub fn gvk() -> ApiResource {
    ApiResource {
        group: "external-secrets.io".to_string(),
        version: "v1beta1".to_string(),
        api_version: "external-secrets.io/v1beta1".to_string(),
        kind: "ExternalSecret".to_string(),
        plural: "externalsecrets".to_string(),
    }
}

pub struct ExternalSecretHandler {
    client: Client,
    api: Api<DynamicObject>,
}

impl ExternalSecretHandler {
    pub fn new(client: Client) -> Self {
        let resource = gvk();
        let api = api_for(&client, &resource, None);
        Self { client, api }
    }
}

#[async_trait]
impl DestinationHandler for ExternalSecretHandler {
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
        filter_by_selector(&self.client, &gvk(), destination.kind.selector(), None).await
    }

    async fn references(&self, obj: &DynamicObject, secret_identifier: &str) -> Result<bool, HandlerError> {
        let rendered = serde_json::to_string(obj).unwrap_or_default();
        let data = gjson_get(&rendered, "spec.data");
        let direct = data.into_iter().any(|entry| entry.get("remoteRef.key").str() == secret_identifier);
        if direct {
            return Ok(true);
        }
        let data_from = gjson_get(&rendered, "spec.dataFrom");
        Ok(data_from.into_iter().any(|entry| {
            let extract_key = entry.get("extract.key");
            if extract_key.exists() && extract_key.str() == secret_identifier {
                return true;
            }
            let regexp = entry.get("find.name.regexp");
            regexp.exists()
                && Regex::new(regexp.str())
                    .map(|re| re.is_match(secret_identifier))
                    .unwrap_or(false)
        }))
    }

    async fn apply(&self, obj: &DynamicObject, event: &RotationEvent) -> Result<(), HandlerError> {
        patch_annotations(&self.api, obj, event).await
    }

    fn api(&self) -> &Api<DynamicObject> {
        &self.api
    }
}

fn gjson_get<'a>(rendered: &'a str, path: &'a str) -> Vec<gjson::Value<'a>> {
    let mut items = Vec::new();
    gjson::get(rendered, path).each(|_, value| {
        items.push(value);
        true
    });
    items
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
    async fn references_direct_key_match() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = ExternalSecretHandler::new(client);
        let es = obj(serde_json::json!({"data": [{"remoteRef": {"key": "db-password"}}]}));
        assert!(handler.references(&es, "db-password").await.unwrap());
        assert!(!handler.references(&es, "other").await.unwrap());
    }

    #[tokio::test]
    async fn references_regexp_find() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let handler = ExternalSecretHandler::new(client);
        let es = obj(serde_json::json!({
            "dataFrom": [{"find": {"name": {"regexp": "^db-.*"}}}]
        }));
        assert!(handler.references(&es, "db-password").await.unwrap());
        assert!(!handler.references(&es, "cache-key").await.unwrap());
    }
}
