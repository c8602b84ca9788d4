//! One module per source type, each exposing a `factory()` that builds its
//! [`crate::listener::ListenerFactory`]; [`build_registry`] wires all nine
//! into the provider table the manager dispatches through.

pub mod aws_sqs;
pub mod azure_event_grid;
pub mod google_pubsub;
pub mod hashivault;
pub mod k8s_watch;
pub mod mock;
pub mod tcp_socket;
pub mod webhook;

use crate::listener::ListenerFactory;
use crate::registry::Registry;

pub fn build_registry() -> Registry<ListenerFactory> {
    let mut registry: Registry<ListenerFactory> = Registry::new();
    registry.register("AwsSqs", aws_sqs::factory());
    registry.register("AzureEventGrid", azure_event_grid::factory());
    registry.register("GooglePubSub", google_pubsub::factory());
    registry.register("Webhook", webhook::factory());
    registry.register("TCPSocket", tcp_socket::factory());
    registry.register("HashicorpVault", hashivault::factory());
    registry.register("KubernetesSecret", k8s_watch::secret_factory());
    registry.register("KubernetesConfigMap", k8s_watch::config_map_factory());
    registry.register("Mock", mock::factory());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_every_source_type() {
        let registry = build_registry();
        let names: std::collections::HashSet<_> = registry.names().collect();
        for tag in [
            "AwsSqs",
            "AzureEventGrid",
            "GooglePubSub",
            "Webhook",
            "TCPSocket",
            "HashicorpVault",
            "KubernetesSecret",
            "KubernetesConfigMap",
            "Mock",
        ] {
            assert!(names.contains(tag), "missing listener provider for {tag}");
        }
    }
}
