//! The destination-handler contract: given a `DestinationToWatch`, find the
//! objects it names, decide whether each one references a rotated secret,
//! touch it, and (optionally) wait for that touch to take effect.
//!
//! Every default algorithm lives in `destinations/*`. `matchStrategy`,
//! `updateStrategy`, and `waitStrategy` on the `DestinationToWatch` override
//! `references`, `apply`, and `wait_for` respectively without touching the
//! kind-specific `filter`; [`ComposedHandler`] is the decorator that wires
//! an override in front of a base handler, mirroring the `WithApply`/
//! `WithReference`/`WithWaitFor` composers of the algorithm this engine is
//! modeled on.

use async_trait::async_trait;
use kube::api::Api;
use kube::core::DynamicObject;
use kube::Client;
use reloader_api::{DestinationToWatch, RotationEvent};

use crate::error::HandlerError;
use crate::strategy_eval;

#[async_trait]
pub trait DestinationHandler: Send + Sync {
    /// Lists every object this destination's kind-specific selector names.
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError>;

    /// Whether `obj` references the rotated secret.
    async fn references(&self, obj: &DynamicObject, secret_identifier: &str) -> Result<bool, HandlerError>;

    /// Touches `obj` to make its own controller reconcile.
    async fn apply(&self, obj: &DynamicObject, event: &RotationEvent) -> Result<(), HandlerError>;

    /// Blocks until `obj`'s own reconcile has settled, or returns an error
    /// if it never does. The default is a no-op for kinds with nothing
    /// meaningful to wait on.
    async fn wait_for(&self, obj: &DynamicObject) -> Result<(), HandlerError> {
        let _ = obj;
        Ok(())
    }

    /// The `Api<DynamicObject>` this handler touches; used by the
    /// strategy-override implementations for patch/delete/poll.
    fn api(&self) -> &Api<DynamicObject>;
}

/// Wraps a kind-specific `DestinationHandler`, substituting the generic
/// strategy-driven algorithm for whichever of `references`/`apply`/`wait_for`
/// the destination declares an override for.
pub struct ComposedHandler<H> {
    inner: H,
    destination: DestinationToWatch,
}

impl<H: DestinationHandler> ComposedHandler<H> {
    pub fn new(inner: H, destination: DestinationToWatch) -> Self {
        Self { inner, destination }
    }
}

#[async_trait]
impl<H: DestinationHandler> DestinationHandler for ComposedHandler<H> {
    async fn filter(&self, destination: &DestinationToWatch) -> Result<Vec<DynamicObject>, HandlerError> {
        self.inner.filter(destination).await
    }

    async fn references(&self, obj: &DynamicObject, secret_identifier: &str) -> Result<bool, HandlerError> {
        match &self.destination.match_strategy {
            Some(strategy) => Ok(strategy_eval::matches(strategy, obj)),
            None => self.inner.references(obj, secret_identifier).await,
        }
    }

    async fn apply(&self, obj: &DynamicObject, event: &RotationEvent) -> Result<(), HandlerError> {
        match &self.destination.update_strategy {
            Some(strategy) => strategy_eval::apply(strategy, self.inner.api(), obj, event).await,
            None => self.inner.apply(obj, event).await,
        }
    }

    async fn wait_for(&self, obj: &DynamicObject) -> Result<(), HandlerError> {
        match &self.destination.wait_strategy {
            Some(strategy) => {
                let name = obj.metadata.name.clone().ok_or(HandlerError::UnnamedObject)?;
                strategy_eval::wait(strategy, self.inner.api(), &name).await
            }
            None => self.inner.wait_for(obj).await,
        }
    }

    fn api(&self) -> &Api<DynamicObject> {
        self.inner.api()
    }
}

/// Registry factory signature: build a boxed handler for a destination kind
/// given a client and the destination config itself (the config is needed
/// up front, unlike listeners, because `filter`'s `Api` may need a specific
/// GVK or namespace baked in — `Generic` in particular resolves its GVK from
/// the destination's own config, so construction itself can fail).
pub type HandlerFactory = std::sync::Arc<
    dyn Fn(Client, DestinationToWatch) -> Result<Box<dyn DestinationHandler>, HandlerError> + Send + Sync,
>;

/// Stamps the two rotation annotations every default `apply` writes, the
/// one piece of behavior shared verbatim across every destination kind.
pub fn stamp_annotations(obj: &mut DynamicObject, event: &RotationEvent) {
    let annotations = obj.metadata.annotations.get_or_insert_with(Default::default);
    annotations.insert(
        reloader_api::LAST_ROTATED_ANNOTATION.to_string(),
        event.rotation_timestamp.clone(),
    );
    annotations.insert(
        reloader_api::TRIGGER_SOURCE_ANNOTATION.to_string(),
        event.trigger_source.clone(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;

    #[test]
    fn stamp_annotations_sets_both_keys() {
        let mut obj = DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: serde_json::json!({}),
        };
        let event = RotationEvent::new("db-password", "2026-08-01T00:00:00Z", "aws-sqs");
        stamp_annotations(&mut obj, &event);
        let annotations = obj.metadata.annotations.unwrap();
        assert_eq!(
            annotations.get(reloader_api::LAST_ROTATED_ANNOTATION).unwrap(),
            "2026-08-01T00:00:00Z"
        );
        assert_eq!(annotations.get(reloader_api::TRIGGER_SOURCE_ANNOTATION).unwrap(), "aws-sqs");
    }
}
