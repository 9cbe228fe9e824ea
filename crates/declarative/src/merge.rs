//! Re-derivation of observed state after a remote write
//!
//! The remote service does not echo every written field, so the observed
//! state persisted for the next cycle is merged from the fresh read, the
//! just-applied declaration and the previous observation.

use crate::model::FieldSet;
use crate::schema::KindSchema;

/// Merge a fresh read into the canonical observed state.
///
/// Per field:
/// - computed: the read
/// - write-only: the declared value, else the previous observation
/// - preserve-if-omitted: the declared value, else the read, else the previous observation
/// - post-create: the read, else the declared value, else the previous observation
/// - everything else: the read alone, so a remote clear shows up as drift
pub fn merge_observed(
    schema: &KindSchema,
    declared: &FieldSet,
    read: &FieldSet,
    prior: Option<&FieldSet>,
) -> FieldSet {
    let previous = |name: &str| prior.and_then(|p| p.get(name));

    schema
        .fields
        .iter()
        .filter_map(|spec| {
            let name = spec.name;
            let value = if spec.computed {
                read.get(name)
            } else if spec.write_only {
                declared.get(name).or_else(|| previous(name))
            } else if spec.preserve_if_omitted {
                declared
                    .get(name)
                    .or_else(|| read.get(name))
                    .or_else(|| previous(name))
            } else if spec.post_create {
                read.get(name)
                    .or_else(|| declared.get(name))
                    .or_else(|| previous(name))
            } else {
                read.get(name)
            };
            value
                .filter(|v| !v.is_empty())
                .map(|v| (name.to_string(), v.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, FieldValue};
    use crate::schema::schema_for;

    fn fields(pairs: &[(&str, &str)]) -> FieldSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), FieldValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_unechoed_fields_come_from_declared() {
        let schema = schema_for(EntityKind::Application);
        let declared = fields(&[("name", "Web"), ("type", "reg"), ("login_uri", "https://x/login")]);
        let read = fields(&[("name", "Web"), ("type", "reg"), ("client_id", "cid_1")]);

        let merged = merge_observed(schema, &declared, &read, None);
        assert_eq!(
            merged,
            fields(&[
                ("client_id", "cid_1"),
                ("login_uri", "https://x/login"),
                ("name", "Web"),
                ("type", "reg"),
            ])
        );
    }

    #[test]
    fn test_write_only_never_taken_from_read() {
        let schema = schema_for(EntityKind::Connection);
        let prior = fields(&[("client_id", "id"), ("client_secret", "s3cret")]);
        let read = fields(&[("name", "gh"), ("display_name", "GitHub"), ("strategy", "oauth2:github")]);

        let merged = merge_observed(schema, &FieldSet::new(), &read, Some(&prior));
        assert_eq!(merged.get("client_secret"), Some(&FieldValue::from("s3cret")));

        let declared = fields(&[("client_id", "id"), ("client_secret", "rotated")]);
        let merged = merge_observed(schema, &declared, &read, Some(&prior));
        assert_eq!(merged.get("client_secret"), Some(&FieldValue::from("rotated")));
    }

    #[test]
    fn test_preserve_if_omitted_keeps_remote_value() {
        let schema = schema_for(EntityKind::Organization);
        let declared = fields(&[("name", "Acme")]);
        let read = fields(&[("name", "Acme"), ("code", "org_1"), ("handle", "acme"), ("theme_code", "light")]);

        let merged = merge_observed(schema, &declared, &read, None);
        assert_eq!(merged.get("handle"), Some(&FieldValue::from("acme")));
        assert_eq!(merged.get("theme_code"), Some(&FieldValue::from("light")));
        assert_eq!(merged.get("code"), Some(&FieldValue::from("org_1")));
    }

    #[test]
    fn test_server_value_wins_for_echoed_fields() {
        let schema = schema_for(EntityKind::Permission);
        let declared = fields(&[("name", "read"), ("key", "read")]);
        let read = fields(&[("name", "Read"), ("key", "read")]);

        let merged = merge_observed(schema, &declared, &read, None);
        assert_eq!(merged.get("name"), Some(&FieldValue::from("Read")));
    }

    #[test]
    fn test_remote_clear_is_not_masked() {
        let schema = schema_for(EntityKind::Permission);
        let prior = fields(&[("name", "read"), ("key", "read"), ("description", "can read")]);
        let read = fields(&[("name", "read"), ("key", "read")]);

        let merged = merge_observed(schema, &prior, &read, Some(&prior));
        assert_eq!(merged.get("description"), None);
    }

    #[test]
    fn test_post_create_falls_back_to_previous() {
        let schema = schema_for(EntityKind::Application);
        let prior = fields(&[("name", "Web"), ("type", "reg"), ("login_uri", "https://x/login")]);
        let read = fields(&[("name", "Web"), ("type", "reg")]);

        let merged = merge_observed(schema, &FieldSet::new(), &read, Some(&prior));
        assert_eq!(merged.get("login_uri"), Some(&FieldValue::from("https://x/login")));
    }
}
