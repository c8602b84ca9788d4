//! Name-keyed factory lookup shared by the source-listener and
//! destination-handler registries. Both are "first writer wins": the first
//! `register` for a given name sticks, later calls are silently ignored, so
//! that a binary's own `main` can seed built-ins and a test can still swap
//! one out via [`Registry::force_register`] without fighting init order.

use std::collections::HashMap;
use std::sync::Arc;

/// A `name -> factory` table. `F` is whatever factory closure/trait-object
/// type a given registry needs (a listener constructor, a handler
/// constructor, ...).
pub struct Registry<F> {
    entries: HashMap<String, Arc<F>>,
}

impl<F> Default for Registry<F> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<F> Registry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name` unless something is already
    /// registered there.
    pub fn register(&mut self, name: impl Into<String>, factory: F) {
        self.entries.entry(name.into()).or_insert_with(|| Arc::new(factory));
    }

    /// Registers `factory` under `name`, replacing any existing entry.
    /// Intended for tests that need to substitute a fake provider.
    pub fn force_register(&mut self, name: impl Into<String>, factory: F) {
        self.entries.insert(name.into(), Arc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<Arc<F>> {
        self.entries.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_register_wins() {
        let mut registry: Registry<u32> = Registry::new();
        registry.register("a", 1);
        registry.register("a", 2);
        assert_eq!(*registry.get("a").unwrap(), 1);
    }

    #[test]
    fn force_register_overrides() {
        let mut registry: Registry<u32> = Registry::new();
        registry.register("a", 1);
        registry.force_register("a", 2);
        assert_eq!(*registry.get("a").unwrap(), 2);
    }

    #[test]
    fn missing_name_is_none() {
        let registry: Registry<u32> = Registry::new();
        assert!(registry.get("missing").is_none());
    }
}
