//! JSON-path extraction for line-delimited TCP frames and webhook bodies,
//! both of which carry the secret identifier at a configurable path rather
//! than a fixed schema.

/// Pulls the string at `path` out of a raw JSON payload. Returns `None` if
/// the payload isn't valid JSON or the path doesn't resolve to a value.
pub fn extract_secret_identifier(payload: &str, path: &str) -> Option<String> {
    if !gjson::valid(payload) {
        return None;
    }
    let value = gjson::get(payload, path);
    if !value.exists() {
        return None;
    }
    Some(value.str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_path() {
        let payload = r#"{"data":{"ObjectName":"db-password"}}"#;
        assert_eq!(
            extract_secret_identifier(payload, "data.ObjectName"),
            Some("db-password".to_string())
        );
    }

    #[test]
    fn extracts_indexed_path() {
        let payload = r#"[{"data":{"ObjectName":"db-password"}}]"#;
        assert_eq!(
            extract_secret_identifier(payload, "0.data.ObjectName"),
            Some("db-password".to_string())
        );
    }

    #[test]
    fn invalid_json_returns_none() {
        assert_eq!(extract_secret_identifier("not json", "foo"), None);
    }

    #[test]
    fn missing_path_returns_none() {
        let payload = r#"{"data":{}}"#;
        assert_eq!(extract_secret_identifier(payload, "data.ObjectName"), None);
    }
}
