//! Drives a single `Config` object through its lifecycle: add the
//! finalizer, keep the listener set and destination snapshot in sync with
//! its spec, and tear both down cleanly on deletion.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition as K8sCondition, Time};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Client, ResourceExt};
use reloader_api::{Config, FINALIZER, PROCESSED_ANNOTATION, READY_CONDITION};
use tracing::{info, warn};

use crate::error::ReconcileError;
use crate::manager::{manifest_key, ListenerManager};
use crate::processor::EventProcessor;

/// Shared state every reconcile invocation borrows: the client the
/// reconciler itself patches status with, plus the manager and processor
/// that actually own the listeners and destination handlers a `Config`
/// declares.
pub struct Context {
    pub client: Client,
    pub manager: Arc<ListenerManager>,
    pub processor: Arc<EventProcessor>,
}

/// The `kube::runtime::Controller` entry point: reconciles one `Config`,
/// using [`finalizer`] so a deletion always drains its listeners before
/// Kubernetes is allowed to remove the object.
pub async fn reconcile(config: Arc<Config>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let api: Api<Config> = Api::all(ctx.client.clone());
    let key = manifest_key("", &config.name_any());

    finalizer(&api, FINALIZER, Arc::clone(&config), |event| async {
        match event {
            FinalizerEvent::Apply(config) => apply(&api, &key, &config, &ctx).await,
            FinalizerEvent::Cleanup(config) => cleanup(&key, &config, &ctx).await,
        }
    })
    .await
    .map_err(|err| ReconcileError::Finalizer(anyhow::anyhow!(err)))
}

pub fn error_policy(_config: Arc<Config>, err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(%err, "reconcile failed, retrying");
    Action::requeue(Duration::from_secs(30))
}

async fn apply(api: &Api<Config>, key: &str, config: &Config, ctx: &Context) -> Result<Action, ReconcileError> {
    stamp_processed_annotation(api, config).await?;

    ctx.manager.manage_listeners(&key.to_string(), &config.spec.notification_sources).await;
    ctx.processor.update_destinations(config.spec.destinations_to_watch.clone());

    publish_ready_condition(api, config).await?;
    info!(manifest = key, "reconciled config");
    Ok(Action::requeue(Duration::from_secs(300)))
}

async fn cleanup(key: &str, config: &Config, ctx: &Context) -> Result<Action, ReconcileError> {
    ctx.manager.stop_manifest(&key.to_string()).await;
    ctx.processor.update_destinations(Vec::new());
    info!(manifest = key, name = %config.name_any(), "drained listeners for deleted config");
    Ok(Action::await_change())
}

/// Sets `reloader/processed` to the current time the first time this
/// object is ever reconciled. Later reconciles leave it untouched, so it
/// records when the `Config` was first picked up rather than last seen.
async fn stamp_processed_annotation(api: &Api<Config>, config: &Config) -> Result<(), ReconcileError> {
    if config.annotations().contains_key(PROCESSED_ANNOTATION) {
        return Ok(());
    }
    let name = config.name_any();
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                PROCESSED_ANNOTATION: chrono::Utc::now().to_rfc3339(),
            }
        }
    });
    api.patch(&name, &PatchParams::apply("reloader").force(), &Patch::Apply(patch))
        .await?;
    Ok(())
}

async fn publish_ready_condition(api: &Api<Config>, config: &Config) -> Result<(), ReconcileError> {
    let name = config.name_any();
    let condition = K8sCondition {
        type_: READY_CONDITION.to_string(),
        status: "True".to_string(),
        reason: "ListenersReconciled".to_string(),
        message: "notification sources and destinations are reconciled".to_string(),
        last_transition_time: Time(chrono::Utc::now()),
        observed_generation: config.metadata.generation,
    };
    let patch = serde_json::json!({
        "status": {
            "conditions": [condition],
            "observedGeneration": config.metadata.generation,
        }
    });
    api.patch_status(&name, &PatchParams::apply("reloader").force(), &Patch::Apply(patch))
        .await?;
    Ok(())
}
