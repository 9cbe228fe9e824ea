//! Diff computation for entities and association sets

use crate::model::{EntityKind, FieldSet, FieldValue, MemberBlock};
use crate::schema::{KindSchema, ReplaceSupport, UpdateSupport, schema_for};
use crate::validate::{Violation, validate_fields};
use std::collections::BTreeSet;
use std::fmt;

/// What must happen to an entity to converge it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    NoOp,
    Create,
    /// Partial update; only `changed` fields are sent
    Update { changed: BTreeSet<String> },
    /// Delete then create
    Replace { changed: BTreeSet<String> },
}

impl Operation {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoOp => "○",
            Self::Create => "+",
            Self::Update { .. } => "~",
            Self::Replace { .. } => "±",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
        match self {
            Self::NoOp => f.write_str("no changes"),
            Self::Create => f.write_str("create"),
            Self::Update { changed } => write!(f, "update ({})", join(changed)),
            Self::Replace { changed } => write!(f, "replace ({})", join(changed)),
        }
    }
}

/// Decide the operation that converges `prior` to `declared`.
///
/// Fails when the declaration is invalid for the kind, including a change
/// that would need a replace on a kind that cannot be replaced.
pub fn plan_entity(
    kind: EntityKind,
    declared: &FieldSet,
    prior: Option<&FieldSet>,
) -> Result<Operation, Violation> {
    let schema = schema_for(kind);
    validate_fields(schema, declared, prior)?;

    let Some(observed) = prior else {
        return Ok(Operation::Create);
    };

    let changed = changed_fields(schema, declared, observed);
    if changed.is_empty() {
        return Ok(Operation::NoOp);
    }

    let create_only: Vec<&str> = changed
        .iter()
        .filter(|name| schema.field(name).is_some_and(|f| f.create_only))
        .map(String::as_str)
        .collect();

    if create_only.is_empty() && schema.update == UpdateSupport::InPlace {
        return Ok(Operation::Update { changed });
    }

    if schema.replace == ReplaceSupport::Forbidden {
        return Err(Violation(format!(
            "{} cannot change after create and a {kind} cannot be replaced",
            create_only.join(", ")
        )));
    }

    Ok(Operation::Replace { changed })
}

fn effective(value: Option<&FieldValue>) -> Option<&FieldValue> {
    value.filter(|v| !v.is_empty())
}

/// Names of fields whose declared value differs from the observed one.
///
/// Absent and empty compare equal. Computed fields never differ, write-only
/// fields only when declared non-empty, preserve-if-omitted fields only when
/// declared at all.
pub fn changed_fields(
    schema: &KindSchema,
    declared: &FieldSet,
    observed: &FieldSet,
) -> BTreeSet<String> {
    schema
        .fields
        .iter()
        .filter(|spec| !spec.computed)
        .filter(|spec| {
            let want = effective(declared.get(spec.name));
            if spec.write_only && want.is_none() {
                return false;
            }
            if spec.preserve_if_omitted && !declared.contains_key(spec.name) {
                return false;
            }
            want != effective(observed.get(spec.name))
        })
        .map(|spec| spec.name.to_string())
        .collect()
}

/// Split declared fields into the create payload and the follow-up update payload
pub fn create_payload(schema: &KindSchema, declared: &FieldSet) -> (FieldSet, FieldSet) {
    declared
        .iter()
        .filter(|(name, _)| schema.field(name).is_some_and(|f| !f.computed))
        .map(|(name, value)| (name.clone(), value.clone()))
        .partition(|(name, _)| !schema.field(name).is_some_and(|f| f.post_create))
}

/// Fields to send for an update. A changed field that is no longer declared is cleared.
pub fn update_payload(
    declared: &FieldSet,
    observed: &FieldSet,
    changed: &BTreeSet<String>,
) -> FieldSet {
    changed
        .iter()
        .filter_map(|name| {
            let value = declared
                .get(name)
                .cloned()
                .or_else(|| observed.get(name).map(FieldValue::cleared))?;
            Some((name.clone(), value))
        })
        .collect()
}

/// Members to add and remove for one association set, each in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationDelta {
    pub parent_id: String,
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl AssociationDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Compute the member delta of one association set.
///
/// An absent block yields an empty delta. Members for which `is_foreign`
/// holds are never removed.
pub fn plan_associations<F>(
    parent_id: &str,
    declared: &MemberBlock,
    prior: &BTreeSet<String>,
    is_foreign: F,
) -> AssociationDelta
where
    F: Fn(&str) -> bool,
{
    let Some(members) = declared.members() else {
        return AssociationDelta {
            parent_id: parent_id.to_string(),
            ..Default::default()
        };
    };

    AssociationDelta {
        parent_id: parent_id.to_string(),
        to_add: members.difference(prior).cloned().collect(),
        to_remove: prior
            .difference(members)
            .filter(|m| !is_foreign(m))
            .cloned()
            .collect(),
    }
}

/// Plan summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub creates: usize,
    pub updates: usize,
    pub replaces: usize,
    pub member_additions: usize,
    pub member_removals: usize,
}

impl DiffSummary {
    pub fn add_operation(&mut self, operation: &Operation) {
        match operation {
            Operation::NoOp => {}
            Operation::Create => self.creates += 1,
            Operation::Update { .. } => self.updates += 1,
            Operation::Replace { .. } => self.replaces += 1,
        }
    }

    pub fn add_delta(&mut self, delta: &AssociationDelta) {
        self.member_additions += delta.to_add.len();
        self.member_removals += delta.to_remove.len();
    }

    pub fn total_changes(&self) -> usize {
        self.creates + self.updates + self.replaces + self.member_additions + self.member_removals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FieldSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), FieldValue::from(*v)))
            .collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn role() -> FieldSet {
        fields(&[("name", "Svc"), ("key", "svc"), ("description", "x")])
    }

    #[test]
    fn test_no_prior_is_create() {
        assert_eq!(
            plan_entity(EntityKind::Role, &role(), None),
            Ok(Operation::Create)
        );
    }

    #[test]
    fn test_plan_is_idempotent_once_observed() {
        let declared = role();
        assert_eq!(
            plan_entity(EntityKind::Role, &declared, Some(&declared)),
            Ok(Operation::NoOp)
        );
    }

    #[test]
    fn test_changed_field_is_update() {
        let observed = role();
        let mut declared = role();
        declared.insert("description".into(), "y".into());

        assert_eq!(
            plan_entity(EntityKind::Role, &declared, Some(&observed)),
            Ok(Operation::Update {
                changed: set(&["description"])
            })
        );
    }

    #[test]
    fn test_create_only_change_is_replace() {
        let observed = fields(&[("name", "Web"), ("type", "reg")]);
        let declared = fields(&[("name", "Web"), ("type", "spa")]);

        assert_eq!(
            plan_entity(EntityKind::Application, &declared, Some(&observed)),
            Ok(Operation::Replace {
                changed: set(&["type"])
            })
        );
    }

    #[test]
    fn test_create_only_change_alongside_update_is_replace() {
        let observed = fields(&[("name", "Web"), ("type", "reg")]);
        let declared = fields(&[("name", "Web 2"), ("type", "spa")]);

        let op = plan_entity(EntityKind::Application, &declared, Some(&observed));
        assert_eq!(
            op,
            Ok(Operation::Replace {
                changed: set(&["name", "type"])
            })
        );
    }

    #[test]
    fn test_kind_without_update_always_replaces() {
        let observed = fields(&[("name", "Billing"), ("audience", "https://a")]);
        let declared = fields(&[("name", "Billing"), ("audience", "https://b")]);

        let op = plan_entity(EntityKind::Api, &declared, Some(&observed));
        assert!(matches!(op, Ok(Operation::Replace { .. })));
    }

    #[test]
    fn test_identity_bearing_kind_cannot_replace() {
        let observed = fields(&[("organization_code", "org_a")]);
        let declared = fields(&[("organization_code", "org_b")]);

        let err = plan_entity(EntityKind::User, &declared, Some(&observed)).unwrap_err();
        assert!(err.0.contains("organization_code"));
    }

    #[test]
    fn test_computed_fields_ignored() {
        let mut observed = fields(&[("name", "Web"), ("type", "reg")]);
        observed.insert("client_id".into(), "cid_1".into());
        let declared = fields(&[("name", "Web"), ("type", "reg")]);

        assert_eq!(
            plan_entity(EntityKind::Application, &declared, Some(&observed)),
            Ok(Operation::NoOp)
        );
    }

    #[test]
    fn test_write_only_absent_is_never_a_change() {
        let declared = fields(&[("name", "gh"), ("display_name", "GitHub"), ("strategy", "oauth2:github")]);
        let observed = declared.clone();

        for _ in 0..3 {
            assert_eq!(
                plan_entity(EntityKind::Connection, &declared, Some(&observed)),
                Ok(Operation::NoOp)
            );
        }
    }

    #[test]
    fn test_write_only_declared_differs_from_preserved() {
        let mut observed = fields(&[("name", "gh"), ("display_name", "GitHub"), ("strategy", "oauth2:github")]);
        observed.insert("client_id".into(), "id".into());
        observed.insert("client_secret".into(), "old".into());
        let mut declared = observed.clone();
        declared.insert("client_secret".into(), "new".into());

        assert_eq!(
            plan_entity(EntityKind::Connection, &declared, Some(&observed)),
            Ok(Operation::Update {
                changed: set(&["client_secret"])
            })
        );
    }

    #[test]
    fn test_preserve_if_omitted_absent_is_skipped() {
        let observed = fields(&[("name", "Acme"), ("handle", "acme")]);
        let declared = fields(&[("name", "Acme")]);

        assert_eq!(
            plan_entity(EntityKind::Organization, &declared, Some(&observed)),
            Ok(Operation::NoOp)
        );
    }

    #[test]
    fn test_absent_and_empty_compare_equal() {
        let mut observed = fields(&[("name", "read"), ("key", "read")]);
        observed.insert("description".into(), "".into());
        let declared = fields(&[("name", "read"), ("key", "read")]);

        assert_eq!(
            plan_entity(EntityKind::Permission, &declared, Some(&observed)),
            Ok(Operation::NoOp)
        );
    }

    #[test]
    fn test_create_payload_splits_post_create_fields() {
        let schema = schema_for(EntityKind::Application);
        let declared = fields(&[("name", "Web"), ("type", "reg"), ("login_uri", "https://x/login")]);

        let (create, post) = create_payload(schema, &declared);
        assert_eq!(create, fields(&[("name", "Web"), ("type", "reg")]));
        assert_eq!(post, fields(&[("login_uri", "https://x/login")]));
    }

    #[test]
    fn test_update_payload_clears_removed_fields() {
        let observed = fields(&[("name", "read"), ("key", "read"), ("description", "old")]);
        let declared = fields(&[("name", "Read"), ("key", "read")]);
        let changed = set(&["description", "name"]);

        assert_eq!(
            update_payload(&declared, &observed, &changed),
            fields(&[("description", ""), ("name", "Read")])
        );
    }

    #[test]
    fn test_association_delta() {
        let declared = MemberBlock::declared(["p1", "p3"]);
        let prior = set(&["p1", "p2"]);

        let delta = plan_associations("role_1", &declared, &prior, |_| false);
        assert_eq!(delta.to_add, vec!["p3"]);
        assert_eq!(delta.to_remove, vec!["p2"]);
    }

    #[test]
    fn test_association_delta_absent_block_is_empty() {
        let prior = set(&["p1", "p2"]);
        let delta = plan_associations("role_1", &MemberBlock::Absent, &prior, |_| false);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_association_delta_declared_empty_removes_all_non_foreign() {
        let prior = set(&["email:a@x.com", "oauth2:google:a@x.com"]);
        let declared = MemberBlock::declared(Vec::<String>::new());

        let delta = plan_associations("kp_1", &declared, &prior, |m| m.starts_with("oauth2:"));
        assert!(delta.to_add.is_empty());
        assert_eq!(delta.to_remove, vec!["email:a@x.com"]);
    }

    #[test]
    fn test_association_delta_is_sorted_and_disjoint() {
        let declared = MemberBlock::declared(["z", "b", "m", "a"]);
        let prior = set(&["y", "a", "c", "x"]);

        let first = plan_associations("p", &declared, &prior, |_| false);
        let second = plan_associations("p", &declared, &prior, |_| false);

        assert_eq!(first, second);
        assert_eq!(first.to_add, vec!["b", "m", "z"]);
        assert_eq!(first.to_remove, vec!["c", "x", "y"]);
        assert!(first.to_add.iter().all(|m| !first.to_remove.contains(m)));
    }

    #[test]
    fn test_foreign_member_never_removed() {
        let prior = set(&["email:u@x.com", "oauth2:google:u@x.com"]);
        for declared in [
            MemberBlock::declared(["email:u@x.com"]),
            MemberBlock::declared(["email:other@x.com"]),
            MemberBlock::exclusive(Vec::<String>::new()),
        ] {
            let delta = plan_associations("kp_1", &declared, &prior, |m| m.starts_with("oauth2:"));
            assert!(!delta.to_remove.contains(&"oauth2:google:u@x.com".to_string()));
        }
    }

    #[test]
    fn test_diff_summary() {
        let mut summary = DiffSummary::default();
        summary.add_operation(&Operation::Create);
        summary.add_operation(&Operation::NoOp);
        summary.add_delta(&AssociationDelta {
            parent_id: "r".into(),
            to_add: vec!["a".into()],
            to_remove: vec!["b".into(), "c".into()],
        });
        assert_eq!(summary.total_changes(), 4);
    }
}
