//! The `Generic` destination kind: any GVK the cluster serves, named by
//! `apiVersion`/`kind` on the destination's own [`reloader_api::GenericSelector`]
//! rather than inferred from a fixed `gvk()` the way every other kind is.
//! It has no default `references`/`apply` — those only make sense for a
//! schema this engine actually knows — so a `Generic` destination is only
//! usable paired with an explicit `matchStrategy` and `updateStrategy`;
//! [`ComposedHandler`](crate::handler::ComposedHandler) is expected to
//! intercept both before this handler's own defaults ever run. `wait_for`
//! falls back to the same restriction for symmetry, unless a `waitStrategy`
//! is present.

use async_trait::async_trait;
use kube::api::Api;
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use reloader_api::{DestinationToWatch, RotationEvent};

use crate::destinations::common::{api_for, filter_by_selector};
use crate::error::HandlerError;
use crate::handler::DestinationHandler;

/// Splits `group/version` (or a bare `version` for the core group) the way
/// `kube::core::ApiResource` wants it, and pluralizes `kind` the same naive
/// way `kube::core::gvk::ParsedTypeMeta`/discovery output usually agrees
/// with for the common case of a regular-plural English noun.
pub fn gvk_from(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    let plural = format!("{}s", kind.to_lowercase());
    ApiResource {
        group,
        version,
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        plural,
    }
}

pub struct GenericHandler {
    client: Client,
    api: Api<DynamicObject>,
}

impl GenericHandler {
    pub fn new(client: Client, destination: &DestinationToWatch) -> Result<Self, HandlerError> {
        let generic = destination
            .kind
            .generic()
            .ok_or_else(|| HandlerError::UnknownKind("Generic".to_string()))?;
        let resource = gvk_from(&generic.api_version, &generic.kind);
        let api = api_for(&client, &resource, None);
        Ok(Self { client, api })
    }
}

#[async_trait]
impl DestinationHandler for GenericHandler {
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
        let generic = destination
            .kind
            .generic()
            .ok_or_else(|| HandlerError::UnknownKind("Generic".to_string()))?;
        let resource = gvk_from(&generic.api_version, &generic.kind);
        filter_by_selector(&self.client, &resource, &generic.common, None).await
    }

    async fn references(&self, _obj: &DynamicObject, _secret_identifier: &str) -> Result<bool, HandlerError> {
        Err(HandlerError::MissingOverride("matchStrategy"))
    }

    async fn apply(&self, _obj: &DynamicObject, _event: &RotationEvent) -> Result<(), HandlerError> {
        Err(HandlerError::MissingOverride("updateStrategy"))
    }

    fn api(&self) -> &Api<DynamicObject> {
        &self.api
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_without_group_uses_core() {
        let resource = gvk_from("v1", "ConfigMap");
        assert_eq!(resource.group, "");
        assert_eq!(resource.version, "v1");
        assert_eq!(resource.plural, "configmaps");
    }

    #[test]
    fn api_version_with_group_splits_on_slash() {
        let resource = gvk_from("cert-manager.io/v1", "Certificate");
        assert_eq!(resource.group, "cert-manager.io");
        assert_eq!(resource.version, "v1");
        assert_eq!(resource.kind, "Certificate");
    }

    #[tokio::test]
    async fn references_without_match_strategy_errors() {
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let json = serde_json::json!({
            "type": "Generic",
            "generic": {"apiVersion": "cert-manager.io/v1", "kind": "Certificate"},
        });
        let destination: DestinationToWatch = serde_json::from_value(json).unwrap();
        let handler = GenericHandler::new(client, &destination).unwrap();
        let obj = DynamicObject {
            types: None,
            metadata: kube::core::ObjectMeta::default(),
            data: serde_json::json!({}),
        };
        let err = handler.references(&obj, "anything").await.unwrap_err();
        assert!(matches!(err, HandlerError::MissingOverride("matchStrategy")));
    }
}
