//! Turns a stream of [`RotationEvent`]s into destination touches: for every
//! declared destination, filter the objects it names, skip the ones that
//! don't reference the rotated identifier, apply the touch, and wait for it
//! to settle. One event is handled independently of the next — a rotation
//! arriving while another is mid-flight spawns its own task rather than
//! queuing behind it — but a single event walks its destinations one at a
//! time, in declaration order, the same as the engine this one is modeled
//! on.

use std::sync::Arc;

use kube::Client;
use parking_lot::RwLock;
use reloader_api::{DestinationToWatch, RotationEvent};
use tracing::{error, info, warn};

use crate::destinations::build_handler;
use crate::error::HandlerError;
use crate::handler::HandlerFactory;
use crate::listener::EventReceiver;
use crate::registry::Registry;

/// Applies every destination currently declared for a manifest against each
/// event it receives. Holds its own snapshot of the destination list so a
/// reconcile can swap it out without synchronizing with in-flight event
/// handling.
pub struct EventProcessor {
    client: Client,
    registry: Arc<Registry<HandlerFactory>>,
    destinations: RwLock<Arc<Vec<DestinationToWatch>>>,
}

impl EventProcessor {
    pub fn new(client: Client, registry: Registry<HandlerFactory>) -> Self {
        Self {
            client,
            registry: Arc::new(registry),
            destinations: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Replaces the destination list this processor walks on every
    /// subsequent event. Called by the reconciler whenever a `Config`'s
    /// spec changes.
    pub fn update_destinations(&self, destinations: Vec<DestinationToWatch>) {
        *self.destinations.write() = Arc::new(destinations);
    }

    /// Drains `events`, spawning an independent task per event so a slow
    /// `wait_for` on one rotation never blocks the next one from starting.
    /// Returns once the channel's sender side is dropped.
    pub async fn run(self: Arc<Self>, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            let processor = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = processor.handle_event(&event).await {
                    error!(secret_identifier = %event.secret_identifier, %err, "failed to process rotation event");
                }
            });
        }
    }

    /// Walks every declared destination for `event`, in order, stopping
    /// early if a destination's `references` check or `wait_for` errors —
    /// both are treated as signals that something is badly wrong, unlike an
    /// `apply` failure, which is logged and skipped so the rest of the
    /// matched objects still get touched.
    pub async fn handle_event(&self, event: &RotationEvent) -> Result<(), HandlerError> {
        metrics::counter!("reloader_events_processed_total").increment(1);
        let destinations = Arc::clone(&self.destinations.read());
        for destination in destinations.iter() {
            let handler = match build_handler(&self.registry, self.client.clone(), destination.clone()) {
                Ok(handler) => handler,
                Err(err) => {
                    warn!(kind = destination.kind.type_tag(), %err, "no handler for destination kind");
                    continue;
                }
            };
            let objects = handler.filter(destination).await?;
            for obj in objects {
                let name = obj.metadata.name.clone().unwrap_or_default();
                let namespace = obj.metadata.namespace.clone().unwrap_or_default();
                let referenced = handler.references(&obj, &event.secret_identifier).await?;
                if !referenced {
                    continue;
                }
                if let Err(err) = handler.apply(&obj, event).await {
                    error!(%namespace, %name, kind = destination.kind.type_tag(), %err, "failed to apply destination update");
                    continue;
                }
                if let Err(err) = handler.wait_for(&obj).await {
                    error!(%namespace, %name, kind = destination.kind.type_tag(), %err, "destination update did not settle");
                    return Err(err);
                }
                metrics::counter!("reloader_destinations_touched_total").increment(1);
                info!(%namespace, %name, kind = destination.kind.type_tag(), "touched destination for rotated secret");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kube::api::Api;
    use kube::core::{ApiResource, DynamicObject, ObjectMeta};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::handler::DestinationHandler;

    struct CountingHandler {
        applied: Arc<AtomicUsize>,
        api: Api<DynamicObject>,
    }

    #[async_trait]
    impl DestinationHandler for CountingHandler {
        async fn filter(&self, _destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
            Ok(vec![DynamicObject {
                types: None,
                metadata: ObjectMeta {
                    name: Some("target".to_string()),
                    namespace: Some("default".to_string()),
                    ..Default::default()
                },
                data: serde_json::json!({}),
            }])
        }

        async fn references(&self, _obj: &DynamicObject, secret_identifier: &str) -> Result<bool, HandlerError> {
            Ok(secret_identifier == "db-password")
        }

        async fn apply(&self, _obj: &DynamicObject, _event: &RotationEvent) -> Result<(), HandlerError> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn api(&self) -> &Api<DynamicObject> {
            &self.api
        }
    }

    fn client() -> Client {
        Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap()
    }

    #[tokio::test]
    async fn non_referencing_event_never_applies() {
        let applied = Arc::new(AtomicUsize::new(0));
        let mut registry: Registry<HandlerFactory> = Registry::new();
        let counter = Arc::clone(&applied);
        let resource = ApiResource {
            group: String::new(),
            version: "v1".to_string(),
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            plural: "secrets".to_string(),
        };
        let api: Api<DynamicObject> = Api::all_with(client(), &resource);
        registry.register(
            "Secret",
            Arc::new(move |_client, _destination| {
                Ok(Box::new(CountingHandler {
                    applied: Arc::clone(&counter),
                    api: api.clone(),
                }) as Box<dyn DestinationHandler>)
            }) as HandlerFactory,
        );
        let processor = EventProcessor::new(client(), registry);
        processor.update_destinations(vec![serde_json::from_value(serde_json::json!({"type": "Secret"})).unwrap()]);

        processor.handle_event(&RotationEvent::new("other-secret", "2026-08-01T00:00:00Z", "mock")).await.unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 0);

        processor.handle_event(&RotationEvent::new("db-password", "2026-08-01T00:00:00Z", "mock")).await.unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }
}
