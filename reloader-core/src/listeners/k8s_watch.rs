//! Watches in-cluster `Secret` or `ConfigMap` objects and turns new
//! resource versions into [`RotationEvent`]s. One generic listener backs
//! both `KubernetesSecret` and `KubernetesConfigMap` source types, the
//! object kind being the only thing that differs between them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use kube::core::{ApiResource, DynamicObject};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use parking_lot::Mutex;
use reloader_api::{KubernetesAuth, KubernetesObjectSource, NotificationSource, RotationEvent};
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::listener::{
    await_shutdown, new_task_handle, Listener, ListenerContext, ListenerFactory, ListenerState, ListenerStateCell,
    TaskHandle,
};
use crate::util::secret_ref;
use crate::util::token_exchange::service_account_token;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WatchedKind {
    Secret,
    ConfigMap,
}

impl WatchedKind {
    fn gvk(self) -> ApiResource {
        match self {
            WatchedKind::Secret => ApiResource {
                group: String::new(),
                version: "v1".to_string(),
                api_version: "v1".to_string(),
                kind: "Secret".to_string(),
                plural: "secrets".to_string(),
            },
            WatchedKind::ConfigMap => ApiResource {
                group: String::new(),
                version: "v1".to_string(),
                api_version: "v1".to_string(),
                kind: "ConfigMap".to_string(),
                plural: "configmaps".to_string(),
            },
        }
    }

    fn tag(self) -> &'static str {
        match self {
            WatchedKind::Secret => "Secret",
            WatchedKind::ConfigMap => "ConfigMap",
        }
    }
}

pub struct KubernetesObjectListener {
    kind: WatchedKind,
    config: KubernetesObjectSource,
    context: ListenerContext,
    state: ListenerStateCell,
    cancel: CancellationToken,
    handle: TaskHandle,
}

impl KubernetesObjectListener {
    pub fn new(kind: WatchedKind, context: ListenerContext, config: KubernetesObjectSource) -> Self {
        Self {
            kind,
            config,
            context,
            state: ListenerStateCell::new(),
            cancel: CancellationToken::new(),
            handle: new_task_handle(),
        }
    }

    /// Builds the client the watch itself runs on, honoring the source's own
    /// auth override rather than always reusing the controller's ambient
    /// client — a source may legitimately watch a different cluster.
    async fn build_client(&self) -> Result<Client, ListenerError> {
        match &self.config.auth {
            None | Some(KubernetesAuth::Ambient) => Ok(self.context.client.clone()),
            Some(KubernetesAuth::KubeconfigSecretRef { secret_ref: selector }) => {
                let kubeconfig_yaml = secret_ref::resolve_string(&self.context.client, selector).await?;
                let kubeconfig = kube::config::Kubeconfig::from_yaml(&kubeconfig_yaml)
                    .map_err(|e| ListenerError::InvalidConfig(format!("invalid kubeconfig secret: {e}")))?;
                let options = kube::config::KubeConfigOptions::default();
                let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| ListenerError::InvalidConfig(format!("failed to build config from kubeconfig: {e}")))?;
                Client::try_from(config).map_err(ListenerError::Kube)
            }
            Some(KubernetesAuth::BearerTokenSecretRef { secret_ref: selector }) => {
                let token = secret_ref::resolve_string(&self.context.client, selector).await?;
                let mut config = kube::Config::infer()
                    .await
                    .map_err(|e| ListenerError::InvalidConfig(format!("failed to infer base config: {e}")))?;
                config.auth_info.token = Some(token.into());
                Client::try_from(config).map_err(ListenerError::Kube)
            }
            Some(KubernetesAuth::ServiceAccountTokenRequest { service_account }) => {
                let token = service_account_token(&self.context.client, service_account, "https://kubernetes.default.svc").await?;
                let mut config = kube::Config::infer()
                    .await
                    .map_err(|e| ListenerError::InvalidConfig(format!("failed to infer base config: {e}")))?;
                config.auth_info.token = Some(token.into());
                Client::try_from(config).map_err(ListenerError::Kube)
            }
        }
    }
}

#[async_trait]
impl Listener for KubernetesObjectListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if !self.state.try_start() {
            return Ok(());
        }
        let client = self.build_client().await?;
        let resource = self.kind.gvk();
        let api: Api<DynamicObject> = Api::all_with(client, &resource);

        let mut watcher_config = watcher::Config::default();
        if let Some(label_selector) = &self.config.label_selector {
            if let Some(match_labels) = &label_selector.match_labels {
                let query = match_labels
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");
                watcher_config = watcher_config.labels(&query);
            }
        }

        let tag = self.kind.tag();
        let sender = self.context.sender.clone();
        let cancel = self.cancel.clone();
        let seen: Arc<Mutex<HashMap<(String, String), String>>> = Arc::new(Mutex::new(HashMap::new()));

        let task = tokio::spawn(async move {
            let stream = watcher(api, watcher_config).applied_objects();
            tokio::pin!(stream);
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = stream.next() => next,
                };
                let Some(result) = next else { return };
                let obj = match result {
                    Ok(obj) => obj,
                    Err(err) => {
                        tracing::warn!(%err, kind = tag, "kubernetes object watch error");
                        continue;
                    }
                };
                if obj.metadata.deletion_timestamp.is_some() {
                    continue;
                }
                let Some(name) = obj.metadata.name.clone() else { continue };
                let namespace = obj.metadata.namespace.clone().unwrap_or_default();
                let Some(resource_version) = obj.metadata.resource_version.clone() else { continue };

                let key = (namespace.clone(), name.clone());
                let mut guard = seen.lock();
                let is_new_version = match guard.get(&key) {
                    None => {
                        guard.insert(key, resource_version);
                        false
                    }
                    Some(previous) if previous == &resource_version => false,
                    Some(_) => {
                        guard.insert(key, resource_version);
                        true
                    }
                };
                drop(guard);
                if !is_new_version {
                    continue;
                }

                let event = RotationEvent::new(name.clone(), chrono::Utc::now().to_rfc3339(), format!("{tag}/{name}"))
                    .with_namespace(namespace);
                let _ = sender.send(event).await;
            }
        });
        *self.handle.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ListenerError> {
        self.cancel.cancel();
        let task = self.handle.lock().take();
        await_shutdown(task).await;
        self.state.set(ListenerState::Stopped);
        Ok(())
    }

    fn state(&self) -> ListenerState {
        self.state.get()
    }
}

pub fn secret_factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::KubernetesSecret(config) => {
            Ok(Arc::new(KubernetesObjectListener::new(WatchedKind::Secret, context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig("k8s_watch secret factory given a non-KubernetesSecret source".into())),
    })
}

pub fn config_map_factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::KubernetesConfigMap(config) => {
            Ok(Arc::new(KubernetesObjectListener::new(WatchedKind::ConfigMap, context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig("k8s_watch config_map factory given a non-KubernetesConfigMap source".into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gvk_names_match_core_group() {
        assert_eq!(WatchedKind::Secret.gvk().plural, "secrets");
        assert_eq!(WatchedKind::ConfigMap.gvk().plural, "configmaps");
        assert_eq!(WatchedKind::Secret.gvk().group, "");
    }
}
