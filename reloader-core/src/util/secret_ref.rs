//! Resolves a [`reloader_api::SecretKeySelector`] (and the service-account
//! token exchanges layered on top of it) into the bytes a listener actually
//! authenticates with.

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use reloader_api::SecretKeySelector;

use crate::error::ListenerError;

/// Fetches `selector.key` out of the `Secret` named by `selector`, base64-decoded.
pub async fn resolve(client: &Client, selector: &SecretKeySelector) -> Result<Vec<u8>, ListenerError> {
    let api: Api<Secret> = Api::namespaced(client.clone(), &selector.namespace);
    let secret = api.get(&selector.name).await?;
    let data = secret.data.ok_or_else(|| {
        ListenerError::InvalidConfig(format!(
            "secret {}/{} has no data",
            selector.namespace, selector.name
        ))
    })?;
    let value = data.get(&selector.key).ok_or_else(|| {
        ListenerError::InvalidConfig(format!(
            "secret {}/{} has no key {}",
            selector.namespace, selector.name, selector.key
        ))
    })?;
    Ok(value.0.clone())
}

/// Same as [`resolve`] but decodes the bytes as UTF-8.
pub async fn resolve_string(client: &Client, selector: &SecretKeySelector) -> Result<String, ListenerError> {
    let bytes = resolve(client, selector).await?;
    String::from_utf8(bytes)
        .map_err(|e| ListenerError::InvalidConfig(format!("secret value isn't valid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_error_names_the_secret() {
        // Exercised indirectly through integration tests against a real
        // client; this just locks down the message shape callers match on.
        let selector = SecretKeySelector {
            name: "creds".into(),
            key: "token".into(),
            namespace: "default".into(),
        };
        let err = ListenerError::InvalidConfig(format!(
            "secret {}/{} has no data",
            selector.namespace, selector.name
        ));
        assert_eq!(err.to_string(), "listener configuration is invalid: secret default/creds has no data");
    }
}
