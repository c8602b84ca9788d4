//! Plumbing shared by every default destination handler: list-then-filter
//! against a `DestinationSelector`, and the plain annotations-merge-patch
//! `apply` every kind but Deployment uses verbatim.

use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use reloader_api::{DestinationSelector, RotationEvent, LAST_ROTATED_ANNOTATION, TRIGGER_SOURCE_ANNOTATION};

use crate::error::HandlerError;
use crate::util::selector::CompiledSelector;

pub fn api_for(client: &Client, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, resource),
        None => Api::all_with(client.clone(), resource),
    }
}

/// Lists every object of `resource` across the cluster and keeps the ones
/// `selector` matches. `event_namespace` narrows the list to a single
/// namespace first when the triggering event carried one (mirroring the
/// Go deployment handler's `client.InNamespace` optimization); other kinds
/// pass `None` and rely purely on the selector.
pub async fn filter_by_selector(
    client: &Client,
    resource: &ApiResource,
    selector: &DestinationSelector,
    event_namespace: Option<&str>,
) -> Result<Vec<DynamicObject>, HandlerError> {
    let compiled = CompiledSelector::compile(client, selector).await?;
    let api = api_for(client, resource, event_namespace);
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .into_iter()
        .filter(|obj| compiled.matches(&obj.metadata))
        .collect())
}

/// The default `apply`: merge-patch `reloader/last-rotated` and
/// `reloader/trigger-source` onto the object's top-level annotations.
pub async fn patch_annotations(
    api: &Api<DynamicObject>,
    obj: &DynamicObject,
    event: &RotationEvent,
) -> Result<(), HandlerError> {
    let name = obj.metadata.name.clone().ok_or(HandlerError::UnnamedObject)?;
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                LAST_ROTATED_ANNOTATION: event.rotation_timestamp,
                TRIGGER_SOURCE_ANNOTATION: event.trigger_source,
            }
        }
    });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(patch)).await?;
    Ok(())
}

/// Same merge patch as [`patch_annotations`], but against the status
/// subresource — for kinds whose default update goes through `/status`
/// rather than top-level metadata.
pub async fn patch_status_annotations(
    api: &Api<DynamicObject>,
    obj: &DynamicObject,
    event: &RotationEvent,
) -> Result<(), HandlerError> {
    let name = obj.metadata.name.clone().ok_or(HandlerError::UnnamedObject)?;
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                LAST_ROTATED_ANNOTATION: event.rotation_timestamp,
                TRIGGER_SOURCE_ANNOTATION: event.trigger_source,
            }
        }
    });
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(patch)).await?;
    Ok(())
}
