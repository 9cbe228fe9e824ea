//! Dependency stages, target filtering and reference resolution

use anyhow::Result;
use declarative::{
    DesiredAssociation, DesiredEntity, DiffSummary, EntityKind, Error, FieldValue, MemberBlock,
    RecordStore, Reconciler, ResourceAddress, ResourcePlan, Subject,
};
use std::collections::BTreeMap;

use crate::schema::{Declaration, StandaloneBlock, reference};

/// Entity kinds in dependency order; standalone associations follow the last stage
pub const ENTITY_STAGES: [&[EntityKind]; 4] = [
    &[EntityKind::Permission, EntityKind::Api, EntityKind::Connection],
    &[EntityKind::Application, EntityKind::Role],
    &[EntityKind::User],
    &[EntityKind::Organization],
];

/// Stage index of a record's subject
pub fn stage_of(subject: Subject) -> usize {
    match subject {
        Subject::Entity(kind) => ENTITY_STAGES
            .iter()
            .position(|stage| stage.contains(&kind))
            .unwrap_or(ENTITY_STAGES.len()),
        Subject::Association(_) => ENTITY_STAGES.len(),
    }
}

// ============================================================================
// Targets
// ============================================================================

/// Parse a target string like "role.reader" into (kind, name)
pub fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        Some((kind, name)) => (Some(kind.to_string()), Some(name.to_string())),
        None => (Some(target.to_string()), None),
    }
}

/// Resources selected by `--target`; everything when unset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    kind: Option<String>,
    name: Option<String>,
}

impl Target {
    pub fn parse(target: Option<&str>) -> Self {
        let (kind, name) = target.map(parse_target).unwrap_or_default();
        Self { kind, name }
    }

    pub fn matches(&self, address: &ResourceAddress) -> bool {
        let (kind, name) = address.parts();
        if let Some(k) = &self.kind
            && k != kind
        {
            return false;
        }
        if let Some(n) = &self.name
            && n != name
        {
            return false;
        }
        true
    }
}

// ============================================================================
// Stages
// ============================================================================

/// One declared resource scheduled for reconciliation
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Entity(&'a DesiredEntity),
    Association(&'a StandaloneBlock),
}

impl Item<'_> {
    pub fn address(&self) -> &ResourceAddress {
        match self {
            Self::Entity(entity) => &entity.address,
            Self::Association(block) => &block.address,
        }
    }
}

/// Declared resources matching `target`, grouped by dependency stage.
///
/// Resources within a stage share no association set and may run in parallel.
pub fn stages<'a>(declaration: &'a Declaration, target: &Target) -> Vec<Vec<Item<'a>>> {
    let mut stages: Vec<Vec<Item<'a>>> = ENTITY_STAGES
        .iter()
        .map(|kinds| {
            declaration
                .entities
                .iter()
                .filter(|e| kinds.contains(&e.kind) && target.matches(&e.address))
                .map(Item::Entity)
                .collect()
        })
        .collect();

    stages.push(
        declaration
            .associations
            .iter()
            .filter(|a| target.matches(&a.address))
            .map(Item::Association)
            .collect(),
    );

    stages.retain(|stage| !stage.is_empty());
    stages
}

// ============================================================================
// References
// ============================================================================

/// Remote ids of recorded entities, for resolving `@kind.name` references.
///
/// With placeholders, an unresolved reference is kept as written so a plan
/// can show it; otherwise it names the resource still waiting for an id.
pub struct Ids {
    ids: BTreeMap<ResourceAddress, String>,
    placeholders: bool,
}

impl Ids {
    pub fn snapshot(store: &dyn RecordStore, placeholders: bool) -> Result<Self> {
        let ids = store
            .list()?
            .into_iter()
            .filter(|r| matches!(r.subject, Subject::Entity(_)))
            .filter_map(|r| r.id.map(|id| (r.address, id)))
            .collect();
        Ok(Self { ids, placeholders })
    }

    pub fn resolve(&self, value: &str) -> std::result::Result<String, ResourceAddress> {
        let Some(address) = reference(value) else {
            return Ok(value.to_string());
        };
        match self.ids.get(&address) {
            Some(id) => Ok(id.clone()),
            None if self.placeholders => Ok(value.to_string()),
            None => Err(address),
        }
    }

    fn resolve_all<'a>(
        &self,
        values: impl IntoIterator<Item = &'a String>,
    ) -> std::result::Result<Vec<String>, ResourceAddress> {
        values.into_iter().map(|v| self.resolve(v)).collect()
    }

    fn resolve_block(
        &self,
        block: &MemberBlock,
    ) -> std::result::Result<MemberBlock, ResourceAddress> {
        Ok(match block {
            MemberBlock::Absent => MemberBlock::Absent,
            MemberBlock::Declared { members, exclusive } => MemberBlock::Declared {
                members: self.resolve_all(members)?.into_iter().collect(),
                exclusive: *exclusive,
            },
        })
    }

    pub fn entity(
        &self,
        entity: &DesiredEntity,
    ) -> std::result::Result<DesiredEntity, ResourceAddress> {
        let mut resolved = entity.clone();
        for value in resolved.fields.values_mut() {
            match value {
                FieldValue::Text(text) => *text = self.resolve(text)?,
                FieldValue::List(items) => *items = self.resolve_all(items.iter())?,
                FieldValue::Bool(_) => {}
            }
        }
        for block in resolved.associations.values_mut() {
            *block = self.resolve_block(block)?;
        }
        Ok(resolved)
    }

    pub fn association(
        &self,
        standalone: &StandaloneBlock,
    ) -> std::result::Result<DesiredAssociation, ResourceAddress> {
        let parent = self.resolve_all(&standalone.parent)?.join(":");
        let (_, name) = standalone.address.parts();
        Ok(DesiredAssociation::new(standalone.kind, name, parent)
            .with_block(self.resolve_block(&standalone.block)?))
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Plans of every selected resource, and the ones that failed validation
#[derive(Debug, Default)]
pub struct PlanReport {
    pub plans: Vec<ResourcePlan>,
    pub invalid: Vec<(ResourceAddress, String)>,
}

impl PlanReport {
    pub fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }

    pub fn changes(&self) -> impl Iterator<Item = &ResourcePlan> {
        self.plans.iter().filter(|p| p.is_change())
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for plan in &self.plans {
            summary.add_operation(&plan.operation);
            for (_, delta) in &plan.members {
                summary.add_delta(delta);
            }
        }
        summary
    }
}

/// Plan every selected resource against recorded state. Makes no remote call.
pub fn plan(
    declaration: &Declaration,
    target: &Target,
    reconciler: &Reconciler<'_>,
    store: &dyn RecordStore,
) -> Result<PlanReport> {
    let ids = Ids::snapshot(store, true)?;
    let mut report = PlanReport::default();

    for item in stages(declaration, target).into_iter().flatten() {
        let planned = match item {
            Item::Entity(entity) => ids.entity(entity).map(|e| reconciler.plan(&e)),
            Item::Association(block) => ids
                .association(block)
                .map(|a| reconciler.plan_association(&a)),
        };
        match planned {
            Ok(Ok(plan)) => report.plans.push(plan),
            Ok(Err(err @ Error::Store { .. })) => return Err(err.into()),
            Ok(Err(err)) => report.invalid.push((item.address().clone(), err.to_string())),
            Err(waiting) => report
                .invalid
                .push((item.address().clone(), format!("{waiting} has no remote id"))),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{AssociationKind, MemoryStore, ReconciliationRecord};

    const DECLARATION: &str = r#"
[permission.read]
name = "Read"
key = "read"

[role.reader]
name = "Reader"
key = "reader"
description = "Read-only access"
permissions = ["@permission.read", "perm_legacy"]

[user.alice]
identities = ["email:alice@example.com"]

[organization.acme]
name = "Acme"
members = ["@user.alice"]

[organization_user_roles.alice-at-acme]
organization = "@organization.acme"
user = "@user.alice"
roles = ["@role.reader"]
"#;

    fn recorded(address: &str, kind: EntityKind, id: &str) -> ReconciliationRecord {
        let mut record =
            ReconciliationRecord::new(ResourceAddress::from(address), Subject::Entity(kind));
        record.id = Some(id.to_string());
        record
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("role"), (Some("role".to_string()), None));
        assert_eq!(
            parse_target("role.reader"),
            (Some("role".to_string()), Some("reader".to_string()))
        );
    }

    #[test]
    fn test_target_matches() {
        let address = ResourceAddress::from("role.reader");
        assert!(Target::parse(None).matches(&address));
        assert!(Target::parse(Some("role")).matches(&address));
        assert!(Target::parse(Some("role.reader")).matches(&address));
        assert!(!Target::parse(Some("role.admin")).matches(&address));
        assert!(!Target::parse(Some("user")).matches(&address));
    }

    #[test]
    fn test_stages_follow_dependencies() {
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let stages = stages(&declaration, &Target::default());
        let addresses: Vec<Vec<&str>> = stages
            .iter()
            .map(|stage| stage.iter().map(|i| i.address().as_str()).collect())
            .collect();
        assert_eq!(
            addresses,
            vec![
                vec!["permission.read"],
                vec!["role.reader"],
                vec!["user.alice"],
                vec!["organization.acme"],
                vec!["organization_user_roles.alice-at-acme"],
            ]
        );

        let only_roles = super::stages(&declaration, &Target::parse(Some("role")));
        assert_eq!(only_roles.len(), 1);
    }

    #[test]
    fn test_stage_of_subject() {
        assert_eq!(stage_of(Subject::Entity(EntityKind::Api)), 0);
        assert_eq!(stage_of(Subject::Entity(EntityKind::Role)), 1);
        assert_eq!(stage_of(Subject::Entity(EntityKind::Organization)), 3);
        assert_eq!(
            stage_of(Subject::Association(AssociationKind::OrganizationUserRoles)),
            4
        );
    }

    #[test]
    fn test_resolve_references() {
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let store = MemoryStore::from_records([
            recorded("permission.read", EntityKind::Permission, "perm_0001"),
            recorded("user.alice", EntityKind::User, "kp_0002"),
        ]);

        let strict = Ids::snapshot(&store, false).unwrap();
        let role = strict
            .entity(declaration.entity(&ResourceAddress::from("role.reader")).unwrap())
            .unwrap();
        let members = role.block(AssociationKind::RolePermissions).members().unwrap();
        assert!(members.contains("perm_0001"));
        assert!(members.contains("perm_legacy"));

        let standalone = &declaration.associations[0];
        assert_eq!(
            strict.association(standalone).unwrap_err(),
            ResourceAddress::from("organization.acme")
        );

        let lenient = Ids::snapshot(&store, true).unwrap();
        let association = lenient.association(standalone).unwrap();
        assert_eq!(association.parent_id, "@organization.acme:kp_0002");
    }

    #[test]
    fn test_plan_reports_creates_without_remote_calls() {
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let store = MemoryStore::new();
        let gateway = gatewaykit::MemoryGateway::new();
        let reconciler = Reconciler::new(&gateway, &store);

        let report = plan(&declaration, &Target::default(), &reconciler, &store).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.summary().creates, 4);
        assert_eq!(report.changes().count(), 5);
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn test_plan_collects_invalid_resources() {
        let declaration = Declaration::parse(
            r#"
[user.bob]
identities = ["phone:+15550100"]
"#,
        )
        .unwrap();
        let store = MemoryStore::new();
        let gateway = gatewaykit::MemoryGateway::new();
        let reconciler = Reconciler::new(&gateway, &store);

        let report = plan(&declaration, &Target::default(), &reconciler, &store).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.invalid[0].0, ResourceAddress::from("user.bob"));
        assert!(report.plans.is_empty());
    }
}
