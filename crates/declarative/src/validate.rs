//! Local validation of declared configuration
//!
//! Runs before any remote call. A violation is never retried.

use crate::model::{AssociationKind, FieldSet, MemberBlock};
use crate::schema::{KindSchema, association_spec};
use std::collections::BTreeMap;
use thiserror::Error;

/// A declared value that breaks a schema invariant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Violation(pub String);

/// Check declared fields against the kind's table.
///
/// `prior` is the last observed state and is needed for non-clearable fields.
pub fn validate_fields(
    schema: &KindSchema,
    declared: &FieldSet,
    prior: Option<&FieldSet>,
) -> Result<(), Violation> {
    for name in declared.keys() {
        match schema.field(name) {
            None => {
                return Err(Violation(format!(
                    "unknown field '{name}' for {}",
                    schema.kind
                )));
            }
            Some(spec) if spec.computed => {
                return Err(Violation(format!(
                    "'{name}' is computed by the remote service and cannot be declared"
                )));
            }
            Some(_) => {}
        }
    }

    for spec in schema.fields {
        let value = declared.get(spec.name).filter(|v| !v.is_empty());

        if spec.required && value.is_none() {
            return Err(Violation(format!("'{}' is required", spec.name)));
        }

        if spec.non_clearable && value.is_none() {
            let was_set = prior
                .and_then(|p| p.get(spec.name))
                .is_some_and(|v| !v.is_empty());
            if was_set {
                return Err(Violation(format!(
                    "'{}' cannot be removed or emptied once set",
                    spec.name
                )));
            }
        }
    }

    for (a, b) in schema.paired_fields {
        if declared.contains_key(*a) != declared.contains_key(*b) {
            return Err(Violation(format!("'{a}' and '{b}' must be set together")));
        }
    }

    Ok(())
}

/// Check declared association blocks of an entity.
///
/// `creating` is true when the entity does not exist yet; a kind that needs a
/// privileged member cannot be created with its block absent.
pub fn validate_members(
    schema: &KindSchema,
    blocks: &BTreeMap<AssociationKind, MemberBlock>,
    creating: bool,
) -> Result<(), Violation> {
    for (kind, block) in blocks {
        if !schema.associations.contains(kind) {
            return Err(Violation(format!(
                "{} has no '{}' association",
                schema.kind,
                association_spec(*kind).block
            )));
        }
        if let Some(members) = block.members()
            && members.iter().any(|m| m.trim().is_empty())
        {
            return Err(Violation(format!(
                "'{}' contains an empty member",
                association_spec(*kind).block
            )));
        }
    }

    for kind in schema.associations {
        let spec = association_spec(*kind);
        let Some(prefix) = spec.required_member_prefix else {
            continue;
        };

        let satisfied = match blocks.get(kind).and_then(MemberBlock::members) {
            Some(members) => members.iter().any(|m| m.starts_with(prefix)),
            None => !creating,
        };

        if !satisfied {
            return Err(Violation(format!(
                "'{}' must contain at least one '{prefix}' member",
                spec.block
            )));
        }
    }

    Ok(())
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
    fn test_role_description_required() {
        let schema = schema_for(EntityKind::Role);
        let declared = fields(&[("name", "Svc"), ("key", "svc")]);

        let err = validate_fields(schema, &declared, None).unwrap_err();
        assert!(err.0.contains("description"));
    }

    #[test]
    fn test_unknown_and_computed_fields_rejected() {
        let schema = schema_for(EntityKind::Organization);

        let unknown = fields(&[("name", "Acme"), ("colour", "red")]);
        assert!(validate_fields(schema, &unknown, None).is_err());

        let computed = fields(&[("name", "Acme"), ("theme_code", "dark")]);
        assert!(validate_fields(schema, &computed, None).is_err());
    }

    #[test]
    fn test_non_clearable_after_set() {
        let schema = schema_for(EntityKind::User);
        let prior = fields(&[("first_name", "Ada")]);

        assert!(validate_fields(schema, &FieldSet::new(), None).is_ok());
        assert!(validate_fields(schema, &FieldSet::new(), Some(&prior)).is_err());
        assert!(validate_fields(schema, &fields(&[("first_name", "")]), Some(&prior)).is_err());
        assert!(validate_fields(schema, &fields(&[("first_name", "Bo")]), Some(&prior)).is_ok());
    }

    #[test]
    fn test_paired_fields() {
        let schema = schema_for(EntityKind::Connection);
        let base = [("name", "gh"), ("display_name", "GitHub"), ("strategy", "oauth2:github")];

        let mut one = fields(&base);
        one.insert("client_id".into(), "id".into());
        assert!(validate_fields(schema, &one, None).is_err());

        one.insert("client_secret".into(), "secret".into());
        assert!(validate_fields(schema, &one, None).is_ok());
    }

    #[test]
    fn test_user_requires_email_identity() {
        let schema = schema_for(EntityKind::User);
        let mut blocks = BTreeMap::new();

        assert!(validate_members(schema, &blocks, true).is_err());
        assert!(validate_members(schema, &blocks, false).is_ok());

        blocks.insert(
            AssociationKind::UserIdentities,
            MemberBlock::declared(["oauth2:google:u@x.com"]),
        );
        assert!(validate_members(schema, &blocks, false).is_err());

        blocks.insert(
            AssociationKind::UserIdentities,
            MemberBlock::declared(["email:u@x.com"]),
        );
        assert!(validate_members(schema, &blocks, true).is_ok());
    }

    #[test]
    fn test_foreign_association_block_rejected() {
        let schema = schema_for(EntityKind::Role);
        let mut blocks = BTreeMap::new();
        blocks.insert(
            AssociationKind::OrganizationMembers,
            MemberBlock::declared(["kp_1"]),
        );
        assert!(validate_members(schema, &blocks, true).is_err());
    }
}
