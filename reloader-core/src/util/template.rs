//! A minimal Go-template-style renderer for `UpdateStrategy::Patch`'s
//! `template` string: `{{ .Field }}` placeholders resolved against a
//! [`RotationEvent`], nothing else. Unknown placeholders render empty
//! rather than erroring, matching `text/template`'s `<no value>` being a
//! deliberate design smell we don't want to replicate — callers who typo a
//! field name get a clearly-wrong annotation value instead of a silent
//! `<no value>` string, which is friendlier to debug.

use reloader_api::RotationEvent;

/// Renders `template`, substituting every `{{ .Field }}` with the matching
/// field of `event`. Recognized fields: `SecretIdentifier`,
/// `RotationTimestamp`, `TriggerSource`, `Namespace`.
pub fn render(template: &str, event: &RotationEvent) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let field = after[..end].trim().trim_start_matches('.');
        out.push_str(&resolve_field(field, event));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn resolve_field(field: &str, event: &RotationEvent) -> String {
    match field {
        "SecretIdentifier" => event.secret_identifier.clone(),
        "RotationTimestamp" => event.rotation_timestamp.clone(),
        "TriggerSource" => event.trigger_source.clone(),
        "Namespace" => event.namespace.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> RotationEvent {
        RotationEvent::new("db-password", "2026-08-01T00:00:00Z", "aws-sqs")
    }

    #[test]
    fn substitutes_known_fields() {
        let rendered = render("rotated:{{ .SecretIdentifier }}@{{ .RotationTimestamp }}", &event());
        assert_eq!(rendered, "rotated:db-password@2026-08-01T00:00:00Z");
    }

    #[test]
    fn unknown_field_renders_empty_not_literal() {
        assert_eq!(render("x={{ .Bogus }}", &event()), "x=");
    }

    #[test]
    fn unterminated_placeholder_is_left_verbatim() {
        assert_eq!(render("a{{ .Foo", &event()), "a{{ .Foo");
    }

    #[test]
    fn template_with_no_placeholders_passes_through() {
        assert_eq!(render("static-value", &event()), "static-value");
    }
}
