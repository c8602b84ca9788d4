//! Exercises the listener manager and event processor together rather than
//! in isolation: a `Mock` source's emitted events flow through the shared
//! channel into an `EventProcessor` driving a fake destination handler, the
//! same end-to-end path `main.rs` wires for real.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::Api;
use kube::core::{ApiResource, DynamicObject, ObjectMeta};
use kube::Client;
use reloader_api::{DestinationToWatch, MockEvent, MockSource, NotificationSource, RotationEvent};
use reloader_core::error::HandlerError;
use reloader_core::handler::{DestinationHandler, HandlerFactory};
use reloader_core::listener::{event_channel, ListenerContext};
use reloader_core::manager::manifest_key;
use reloader_core::processor::EventProcessor;
use reloader_core::registry::Registry;
use reloader_core::{listeners, ListenerManager};

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
async fn mock_listener_drives_the_full_pipeline() {
    let (sender, receiver) = event_channel(16);
    let manager = ListenerManager::new(
        ListenerContext { client: client(), sender },
        listeners::build_registry(),
    );

    let applied = Arc::new(AtomicUsize::new(0));
    let mut handler_registry: Registry<HandlerFactory> = Registry::new();
    let counter = Arc::clone(&applied);
    let resource = ApiResource {
        group: String::new(),
        version: "v1".to_string(),
        api_version: "v1".to_string(),
        kind: "Secret".to_string(),
        plural: "secrets".to_string(),
    };
    let api: Api<DynamicObject> = Api::all_with(client(), &resource);
    handler_registry.register(
        "Secret",
        Arc::new(move |_client, _destination| {
            Ok(Box::new(CountingHandler {
                applied: Arc::clone(&counter),
                api: api.clone(),
            }) as Box<dyn DestinationHandler>)
        }) as HandlerFactory,
    );
    let processor = Arc::new(EventProcessor::new(client(), handler_registry));
    processor.update_destinations(vec![serde_json::from_value(serde_json::json!({"type": "Secret"})).unwrap()]);

    tokio::spawn(Arc::clone(&processor).run(receiver));

    let manifest = manifest_key("default", "pipeline-test");
    let mock = NotificationSource::Mock(MockSource {
        interval_seconds: 1,
        events: vec![
            MockEvent {
                secret_identifier: "other-secret".to_string(),
                rotation_timestamp: "2026-08-01T00:00:00Z".to_string(),
                trigger_source: "mock".to_string(),
            },
            MockEvent {
                secret_identifier: "db-password".to_string(),
                rotation_timestamp: "2026-08-01T00:00:01Z".to_string(),
                trigger_source: "mock".to_string(),
            },
        ],
    });
    manager.manage_listeners(&manifest, &[mock]).await;

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    manager.stop_manifest(&manifest).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(applied.load(Ordering::SeqCst) >= 1, "db-password rotation should have reached the destination");
}
