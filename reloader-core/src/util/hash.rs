use reloader_api::NotificationSource;
use sha1::{Digest, Sha1};

/// Derives the stable key a [`crate::manager::ListenerManager`] uses to tell
/// whether a source in a new `Config` generation is the same listener as one
/// already running: `"<type>-<sha1 of its canonical-JSON config>"`.
///
/// Two sources of the same type with byte-identical configuration always
/// produce the same key, regardless of where in the list they appear.
pub fn listener_key(source: &NotificationSource) -> String {
    let type_tag = source.type_tag();
    let config = serde_json::to_vec(&source.config_value()).unwrap_or_default();
    let mut hasher = Sha1::new();
    hasher.update(&config);
    let digest = hasher.finalize();
    format!("{type_tag}-{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reloader_api::MockSource;

    fn mock(interval: u64) -> NotificationSource {
        NotificationSource::Mock(MockSource {
            interval_seconds: interval,
            events: vec![],
        })
    }

    #[test]
    fn same_config_produces_same_key() {
        assert_eq!(listener_key(&mock(5)), listener_key(&mock(5)));
    }

    #[test]
    fn different_config_produces_different_key() {
        assert_ne!(listener_key(&mock(5)), listener_key(&mock(10)));
    }

    #[test]
    fn key_is_prefixed_with_type_tag() {
        assert!(listener_key(&mock(5)).starts_with("Mock-"));
    }
}
