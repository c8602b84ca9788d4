//! Diffs a `Config`'s declared notification sources against the listeners
//! already running for it, starting what's new and stopping what's gone.

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ObjectReference;
use parking_lot::Mutex;
use reloader_api::NotificationSource;
use tracing::{error, info, warn};

use crate::listener::{Listener, ListenerContext, ListenerFactory};
use crate::registry::Registry;
use crate::util::hash::listener_key;

/// `namespace/name` of the `Config` object a set of listeners belongs to.
/// A plain string rather than `ObjectReference` would do, but this mirrors
/// the manager's original keying by `types.NamespacedName` one-for-one.
pub type ManifestKey = String;

pub fn manifest_key(namespace: &str, name: &str) -> ManifestKey {
    format!("{namespace}/{name}")
}

pub fn manifest_key_from_ref(reference: &ObjectReference) -> ManifestKey {
    manifest_key(
        reference.namespace.as_deref().unwrap_or_default(),
        reference.name.as_deref().unwrap_or_default(),
    )
}

struct Managed {
    listener: Arc<dyn Listener>,
}

/// Owns every listener this controller process currently runs, grouped by
/// the `Config` manifest that declared them.
pub struct ListenerManager {
    context: ListenerContext,
    providers: Registry<ListenerFactory>,
    listeners: Mutex<HashMap<ManifestKey, HashMap<String, Managed>>>,
}

impl ListenerManager {
    pub fn new(context: ListenerContext, providers: Registry<ListenerFactory>) -> Self {
        Self {
            context,
            providers,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Reconciles the listener set for `manifest` against `sources`: starts
    /// a listener for every source key not already running, stops and
    /// drops every running listener whose key is no longer desired, and
    /// leaves everything else untouched. Best-effort: a single source
    /// failing to start or stop is logged and skipped rather than aborting
    /// the whole pass.
    pub async fn manage_listeners(&self, manifest: &ManifestKey, sources: &[NotificationSource]) {
        let mut desired: HashMap<String, &NotificationSource> = HashMap::new();
        for source in sources {
            desired.insert(listener_key(source), source);
        }

        let to_stop: Vec<(String, Arc<dyn Listener>)> = {
            let mut guard = self.listeners.lock();
            let existing = guard.entry(manifest.clone()).or_default();
            let stale: Vec<String> = existing
                .keys()
                .filter(|key| !desired.contains_key(key.as_str()))
                .cloned()
                .collect();
            stale
                .into_iter()
                .filter_map(|key| existing.remove(&key).map(|m| (key, m.listener)))
                .collect()
        };
        for (key, listener) in to_stop {
            info!(manifest, key, "stopping listener no longer declared");
            if let Err(err) = listener.stop().await {
                error!(manifest, key, %err, "failed to stop listener");
            }
            metrics::gauge!("reloader_active_listeners").decrement(1.0);
        }

        for (key, source) in desired {
            let already_running = self
                .listeners
                .lock()
                .get(manifest)
                .is_some_and(|m| m.contains_key(&key));
            if already_running {
                continue;
            }
            let type_tag = source.type_tag();
            let Some(factory) = self.providers.get(type_tag) else {
                warn!(manifest, %type_tag, "no provider registered for source type");
                continue;
            };
            let listener = match factory(self.context.clone(), source.clone()) {
                Ok(listener) => listener,
                Err(err) => {
                    error!(manifest, key, %err, "failed to construct listener");
                    continue;
                }
            };
            if let Err(err) = listener.start().await {
                error!(manifest, key, %err, "failed to start listener");
                continue;
            }
            info!(manifest, key, %type_tag, "started listener");
            metrics::gauge!("reloader_active_listeners").increment(1.0);
            self.listeners
                .lock()
                .entry(manifest.clone())
                .or_default()
                .insert(key, Managed { listener });
        }

        let mut guard = self.listeners.lock();
        if guard.get(manifest).is_some_and(HashMap::is_empty) {
            guard.remove(manifest);
        }
    }

    /// Stops every listener across every manifest, e.g. on controller
    /// shutdown. Collects failures but always attempts every listener.
    pub async fn stop_all(&self) -> Result<(), Vec<anyhow::Error>> {
        let all: Vec<(ManifestKey, String, Arc<dyn Listener>)> = {
            let mut guard = self.listeners.lock();
            guard
                .drain()
                .flat_map(|(manifest, listeners)| {
                    listeners
                        .into_iter()
                        .map(move |(key, m)| (manifest.clone(), key, m.listener))
                })
                .collect()
        };
        let mut errors = Vec::new();
        for (manifest, key, listener) in all {
            if let Err(err) = listener.stop().await {
                error!(manifest, key, %err, "failed to stop listener during shutdown");
                errors.push(anyhow::anyhow!("{manifest}/{key}: {err}"));
            }
            metrics::gauge!("reloader_active_listeners").decrement(1.0);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Removes and stops the listeners for a single manifest, used when its
    /// `Config` is deleted.
    pub async fn stop_manifest(&self, manifest: &ManifestKey) {
        let listeners: Vec<(String, Arc<dyn Listener>)> = {
            let mut guard = self.listeners.lock();
            guard
                .remove(manifest)
                .map(|m| m.into_iter().map(|(k, v)| (k, v.listener)).collect())
                .unwrap_or_default()
        };
        for (key, listener) in listeners {
            if let Err(err) = listener.stop().await {
                error!(manifest, key, %err, "failed to stop listener");
            }
            metrics::gauge!("reloader_active_listeners").decrement(1.0);
        }
    }

    #[cfg(test)]
    pub(crate) fn active_keys(&self, manifest: &ManifestKey) -> Vec<String> {
        self.listeners
            .lock()
            .get(manifest)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}
