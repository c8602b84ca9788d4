//! The default handler for each destination kind, and the registry that
//! wires a kind's name to its handler factory (composed with whatever
//! strategy overrides the destination itself declares).

pub mod certificate;
pub mod common;
pub mod deployment;
pub mod external_secret;
pub mod generic;
pub mod push_secret;
pub mod secret;
pub mod workflow;

use kube::Client;
use reloader_api::DestinationToWatch;

use crate::error::HandlerError;
use crate::handler::{ComposedHandler, DestinationHandler, HandlerFactory};
use crate::registry::Registry;

/// Builds the registry of every destination kind this engine ships a
/// default handler for, each wrapped in [`ComposedHandler`] so a
/// destination's own `matchStrategy`/`updateStrategy`/`waitStrategy` always
/// takes precedence over the kind's default.
pub fn build_registry() -> Registry<HandlerFactory> {
    let mut registry: Registry<HandlerFactory> = Registry::new();

    registry.register(
        "ExternalSecret",
        std::sync::Arc::new(|client: Client, destination: DestinationToWatch| {
            let inner = external_secret::ExternalSecretHandler::new(client);
            Ok(Box::new(ComposedHandler::new(inner, destination)) as Box<dyn DestinationHandler>)
        }) as HandlerFactory,
    );
    registry.register(
        "PushSecret",
        std::sync::Arc::new(|client: Client, destination: DestinationToWatch| {
            let inner = push_secret::PushSecretHandler::new(client);
            Ok(Box::new(ComposedHandler::new(inner, destination)) as Box<dyn DestinationHandler>)
        }) as HandlerFactory,
    );
    registry.register(
        "Deployment",
        std::sync::Arc::new(|client: Client, destination: DestinationToWatch| {
            let inner = deployment::DeploymentHandler::new(client);
            Ok(Box::new(ComposedHandler::new(inner, destination)) as Box<dyn DestinationHandler>)
        }) as HandlerFactory,
    );
    registry.register(
        "WorkflowRunTemplate",
        std::sync::Arc::new(|client: Client, destination: DestinationToWatch| {
            let inner = workflow::WorkflowHandler::new(client);
            Ok(Box::new(ComposedHandler::new(inner, destination)) as Box<dyn DestinationHandler>)
        }) as HandlerFactory,
    );
    registry.register(
        "Certificate",
        std::sync::Arc::new(|client: Client, destination: DestinationToWatch| {
            let inner = certificate::CertificateHandler::new(client);
            Ok(Box::new(ComposedHandler::new(inner, destination)) as Box<dyn DestinationHandler>)
        }) as HandlerFactory,
    );
    registry.register(
        "Secret",
        std::sync::Arc::new(|client: Client, destination: DestinationToWatch| {
            let inner = secret::SecretHandler::new(client);
            Ok(Box::new(ComposedHandler::new(inner, destination)) as Box<dyn DestinationHandler>)
        }) as HandlerFactory,
    );
    registry.register(
        "Generic",
        std::sync::Arc::new(|client: Client, destination: DestinationToWatch| {
            let inner = generic::GenericHandler::new(client, &destination)?;
            Ok(Box::new(ComposedHandler::new(inner, destination)) as Box<dyn DestinationHandler>)
        }) as HandlerFactory,
    );

    registry
}

/// Looks up and builds a handler for `destination.kind.type_tag()`, the
/// entry point [`crate::processor::EventProcessor`] uses per destination.
pub fn build_handler(
    registry: &Registry<HandlerFactory>,
    client: Client,
    destination: DestinationToWatch,
) -> Result<Box<dyn DestinationHandler>, HandlerError> {
    let tag = destination.kind.type_tag().to_string();
    let factory = registry.get(&tag).ok_or(HandlerError::UnknownKind(tag))?;
    factory(client, destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_every_kind() {
        let registry = build_registry();
        let names: std::collections::HashSet<_> = registry.names().collect();
        for kind in [
            "ExternalSecret",
            "PushSecret",
            "Deployment",
            "WorkflowRunTemplate",
            "Certificate",
            "Secret",
            "Generic",
        ] {
            assert!(names.contains(kind), "missing handler for {kind}");
        }
    }

    #[test]
    fn build_handler_for_unknown_kind_errors() {
        let registry: Registry<HandlerFactory> = Registry::new();
        let client = Client::try_from(kube::Config::new("https://localhost".parse().unwrap())).unwrap();
        let json = serde_json::json!({"type": "Deployment"});
        let destination: DestinationToWatch = serde_json::from_value(json).unwrap();
        let err = build_handler(&registry, client, destination).unwrap_err();
        assert!(matches!(err, HandlerError::UnknownKind(_)));
    }
}
