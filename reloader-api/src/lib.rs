//! Declarative data model for the reloader secret-rotation controller:
//! the `Config` CRD, the notification-source and destination discriminated
//! unions it carries, and the `RotationEvent` message that flows between
//! source listeners and destination handlers.
//!
//! This crate has no Kubernetes client logic of its own — it only depends
//! on `kube`'s `derive` feature for the `CustomResource` macro and on
//! `k8s-openapi` for the shared apimachinery types, the same split
//! `kube-core` makes from `kube-client`.

mod config;
mod destination;
mod event;
mod selector;
mod source;
mod strategy;

pub use config::{
    Config, ConfigSpec, ConfigStatus, FINALIZER, LAST_ROTATED_ANNOTATION, PROCESSED_ANNOTATION,
    READY_CONDITION, TRIGGER_SOURCE_ANNOTATION,
};
pub use destination::{DestinationKind, DestinationToWatch};
pub use event::RotationEvent;
pub use selector::{DestinationSelector, GenericSelector, SecretKeySelector, ServiceAccountSelector};
pub use source::{
    AwsAuth, AwsSqsSource, AzureEventGridSource, GcpAuth, GooglePubSubSource, HashicorpVaultSource,
    KubernetesAuth, KubernetesObjectSource, MockEvent, MockSource, NotificationSource, RetryPolicy,
    TcpSocketSource, WebhookAuth, WebhookSource,
};
pub use strategy::{Condition, ConditionOperation, MatchStrategy, UpdateStrategy, WaitForCondition, WaitStrategy};
