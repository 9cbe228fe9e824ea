//! Declared configuration front-end.
//!
//! One table per entity kind, one sub-table per resource:
//!
//! ```toml
//! [permission.read]
//! name = "Read"
//! key = "read"
//!
//! [role.reader]
//! name = "Reader"
//! key = "reader"
//! description = "Read-only access"
//! permissions = ["@permission.read"]
//! exclusive = ["permissions"]
//!
//! [organization_user_roles.alice-at-acme]
//! organization = "@organization.acme"
//! user = "@user.alice"
//! roles = ["@role.reader"]
//! ```
//!
//! Keys are field names, or association block names holding a member list.
//! A key that is not written is absent, which is not the same as empty.
//! `@kind.name` stands for the remote id of another declared resource.

use anyhow::{Context, Result, bail};
use declarative::{
    AssociationKind, DesiredEntity, EntityKind, FieldValue, MemberBlock, ResourceAddress,
    association_spec, schema_for,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

const EXCLUSIVE: &str = "exclusive";

// ============================================================================
// Declaration
// ============================================================================

/// Everything a declared configuration asks for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declaration {
    pub entities: Vec<DesiredEntity>,
    pub associations: Vec<StandaloneBlock>,
}

/// An association set declared on its own, outside any owning entity
#[derive(Debug, Clone, PartialEq)]
pub struct StandaloneBlock {
    pub address: ResourceAddress,
    pub kind: AssociationKind,
    /// Parent id parts in order, possibly references; joined with ':'
    pub parent: Vec<String>,
    pub block: MemberBlock,
}

impl Declaration {
    /// Load a declaration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read declaration: {}", path.display()))?;
        let declaration = Self::parse(&content)
            .with_context(|| format!("Invalid declaration in {}", path.display()))?;
        log::debug!(
            "Loaded {} entities and {} association blocks from {}",
            declaration.entities.len(),
            declaration.associations.len(),
            path.display()
        );
        Ok(declaration)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let document: toml::Table = toml::from_str(content).context("Invalid TOML format")?;
        let mut declaration = Self::default();

        for (section, value) in &document {
            let resources = value
                .as_table()
                .with_context(|| format!("'{section}' must be a table of resources"))?;

            if let Ok(kind) = section.parse::<EntityKind>() {
                for (name, body) in resources {
                    let entity = parse_entity(kind, name, as_table(body, section, name)?)
                        .with_context(|| format!("Invalid {kind} '{name}'"))?;
                    declaration.entities.push(entity);
                }
            } else if let Ok(kind) = section.parse::<AssociationKind>() {
                if association_spec(kind).owner.is_some() {
                    bail!(
                        "'{section}' is declared inside its owning entity, not as a section"
                    );
                }
                for (name, body) in resources {
                    let block = parse_standalone(kind, name, as_table(body, section, name)?)
                        .with_context(|| format!("Invalid {kind} '{name}'"))?;
                    declaration.associations.push(block);
                }
            } else {
                bail!("Unknown section '{section}'");
            }
        }

        declaration.validate()?;
        Ok(declaration)
    }

    /// Check references and standalone parents.
    ///
    /// Schema rules are checked by the reconciler when planning.
    pub fn validate(&self) -> Result<()> {
        let declared: BTreeSet<&ResourceAddress> =
            self.entities.iter().map(|e| &e.address).collect();

        for entity in &self.entities {
            for reference in entity_values(entity).filter_map(reference) {
                if !declared.contains(&reference) {
                    bail!(
                        "{} references undeclared resource '@{reference}'",
                        entity.address
                    );
                }
            }
        }

        let mut parents: BTreeMap<(AssociationKind, String), &ResourceAddress> = BTreeMap::new();
        for standalone in &self.associations {
            let values = standalone
                .parent
                .iter()
                .chain(standalone.block.members().into_iter().flatten());
            for reference in values.filter_map(|v| reference(v)) {
                if !declared.contains(&reference) {
                    bail!(
                        "{} references undeclared resource '@{reference}'",
                        standalone.address
                    );
                }
            }

            let key = (standalone.kind, standalone.parent.join(":"));
            if let Some(first) = parents.insert(key, &standalone.address) {
                bail!(
                    "{} and {} manage the same {} set",
                    first,
                    standalone.address,
                    standalone.kind
                );
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn entity(&self, address: &ResourceAddress) -> Option<&DesiredEntity> {
        self.entities.iter().find(|e| &e.address == address)
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.entities.len() + self.associations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The address a `@kind.name` value refers to
pub fn reference(value: &str) -> Option<ResourceAddress> {
    let target = value.strip_prefix('@')?;
    let (kind, name) = target.split_once('.')?;
    if name.is_empty() || kind.parse::<EntityKind>().is_err() {
        return None;
    }
    Some(ResourceAddress::from(target))
}

/// Parent keys of a standalone association kind, in id order
pub fn parent_keys(kind: AssociationKind) -> &'static [&'static str] {
    match kind {
        AssociationKind::OrganizationUserRoles => &["organization", "user"],
        _ => &[],
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn as_table<'a>(value: &'a toml::Value, section: &str, name: &str) -> Result<&'a toml::Table> {
    value
        .as_table()
        .with_context(|| format!("'{section}.{name}' must be a table"))
}

fn parse_entity(kind: EntityKind, name: &str, table: &toml::Table) -> Result<DesiredEntity> {
    let schema = schema_for(kind);
    let exclusive = exclusive_blocks(table)?;
    let mut entity = DesiredEntity::new(kind, name);

    for (key, value) in table {
        if key == EXCLUSIVE {
            continue;
        }
        let association = schema
            .associations
            .iter()
            .find(|a| association_spec(**a).block == key.as_str());

        match association {
            Some(association) => {
                let members = string_list(key, value)?;
                let block = if exclusive.contains(key.as_str()) {
                    MemberBlock::exclusive(members)
                } else {
                    MemberBlock::declared(members)
                };
                entity.associations.insert(*association, block);
            }
            // unknown fields are rejected by the reconciler with the rest of the schema rules
            None => {
                entity.fields.insert(key.clone(), field_value(key, value)?);
            }
        }
    }

    for block in &exclusive {
        let known = schema
            .associations
            .iter()
            .any(|a| association_spec(*a).block == block.as_str());
        if !known || !table.contains_key(block.as_str()) {
            bail!("'exclusive' names '{block}', which is not a declared member block");
        }
    }
    Ok(entity)
}

fn parse_standalone(
    kind: AssociationKind,
    name: &str,
    table: &toml::Table,
) -> Result<StandaloneBlock> {
    let spec = association_spec(kind);
    let keys = parent_keys(kind);
    let exclusive = exclusive_blocks(table)?;

    let parent = keys
        .iter()
        .map(|key| {
            table
                .get(*key)
                .and_then(toml::Value::as_str)
                .map(str::to_string)
                .with_context(|| format!("'{key}' is required"))
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(unknown) = table
        .keys()
        .find(|k| !keys.contains(&k.as_str()) && *k != spec.block && *k != EXCLUSIVE)
    {
        bail!("Unknown key '{unknown}'");
    }

    let block = match table.get(spec.block) {
        None => MemberBlock::Absent,
        Some(value) if exclusive.contains(spec.block) => {
            MemberBlock::exclusive(string_list(spec.block, value)?)
        }
        Some(value) => MemberBlock::declared(string_list(spec.block, value)?),
    };

    Ok(StandaloneBlock {
        address: ResourceAddress::new(kind, name),
        kind,
        parent,
        block,
    })
}

fn exclusive_blocks(table: &toml::Table) -> Result<BTreeSet<String>> {
    match table.get(EXCLUSIVE) {
        Some(value) => Ok(string_list(EXCLUSIVE, value)?.into_iter().collect()),
        None => Ok(BTreeSet::new()),
    }
}

fn string_list(key: &str, value: &toml::Value) -> Result<Vec<String>> {
    let items = value
        .as_array()
        .with_context(|| format!("'{key}' must be a list of strings"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .with_context(|| format!("'{key}' must be a list of strings"))
        })
        .collect()
}

fn field_value(key: &str, value: &toml::Value) -> Result<FieldValue> {
    match value {
        toml::Value::String(s) => Ok(FieldValue::Text(s.clone())),
        toml::Value::Boolean(b) => Ok(FieldValue::Bool(*b)),
        toml::Value::Array(_) => Ok(FieldValue::List(string_list(key, value)?)),
        _ => bail!("'{key}' must be a string, a boolean or a list of strings"),
    }
}

/// Every text value of an entity that could hold a reference
fn entity_values(entity: &DesiredEntity) -> impl Iterator<Item = &str> {
    let fields = entity.fields.values().flat_map(|value| match value {
        FieldValue::Text(s) => vec![s.as_str()],
        FieldValue::List(items) => items.iter().map(String::as_str).collect(),
        FieldValue::Bool(_) => Vec::new(),
    });
    let members = entity
        .associations
        .values()
        .filter_map(MemberBlock::members)
        .flatten()
        .map(String::as_str);
    fields.chain(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
[permission.read]
name = "Read"
key = "read"

[role.reader]
name = "Reader"
key = "reader"
description = "Read-only access"
permissions = ["@permission.read"]
exclusive = ["permissions"]

[user.alice]
first_name = "Alice"
is_suspended = false
identities = ["email:alice@example.com"]

[organization.acme]
name = "Acme"
code = "org_acme"
members = ["@user.alice"]

[application.portal]
name = "Portal"
type = "reg"
redirect_uris = ["https://portal.example/callback"]

[organization_user_roles.alice-at-acme]
organization = "@organization.acme"
user = "@user.alice"
roles = ["@role.reader"]
"#;

    #[test]
    fn test_parse_example_declaration() {
        let declaration = Declaration::parse(EXAMPLE).unwrap();
        assert_eq!(declaration.entities.len(), 5);
        assert_eq!(declaration.associations.len(), 1);

        let role = declaration
            .entity(&ResourceAddress::from("role.reader"))
            .unwrap();
        assert!(
            role.block(AssociationKind::RolePermissions)
                .is_exclusive()
        );

        let user = declaration
            .entity(&ResourceAddress::from("user.alice"))
            .unwrap();
        assert_eq!(user.fields.get("is_suspended"), Some(&FieldValue::Bool(false)));
        assert!(!user.fields.contains_key("last_name"));

        let app = declaration
            .entity(&ResourceAddress::from("application.portal"))
            .unwrap();
        assert!(app.block(AssociationKind::ApplicationConnections).is_absent());
        assert!(matches!(
            app.fields.get("redirect_uris"),
            Some(FieldValue::List(uris)) if uris.len() == 1
        ));

        let standalone = &declaration.associations[0];
        assert_eq!(
            standalone.parent,
            vec!["@organization.acme".to_string(), "@user.alice".to_string()]
        );
        assert!(!standalone.block.is_exclusive());
    }

    #[test]
    fn test_empty_block_is_not_absent() {
        let declaration = Declaration::parse(
            r#"
[role.empty]
name = "Empty"
key = "empty"
description = "No permissions"
permissions = []
"#,
        )
        .unwrap();
        let block = declaration.entities[0].block(AssociationKind::RolePermissions);
        assert!(!block.is_absent());
        assert!(block.members().unwrap().is_empty());
    }

    #[test]
    fn test_reference_parsing() {
        assert_eq!(
            reference("@role.admin"),
            Some(ResourceAddress::from("role.admin"))
        );
        assert_eq!(reference("role.admin"), None);
        assert_eq!(reference("@widget.admin"), None);
        assert_eq!(reference("@role."), None);
        assert_eq!(reference("email:a@x.com"), None);
    }

    #[test]
    fn test_undeclared_reference_is_rejected() {
        let err = Declaration::parse(
            r#"
[role.reader]
name = "Reader"
key = "reader"
description = "x"
permissions = ["@permission.missing"]
"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("permission.missing"));
    }

    #[test]
    fn test_duplicate_standalone_parent_is_rejected() {
        let err = Declaration::parse(
            r#"
[user.alice]
identities = ["email:alice@example.com"]

[organization.acme]
name = "Acme"

[organization_user_roles.one]
organization = "@organization.acme"
user = "@user.alice"
roles = []

[organization_user_roles.two]
organization = "@organization.acme"
user = "@user.alice"
roles = []
"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("manage the same"));
    }

    #[test]
    fn test_invalid_sections_and_values() {
        assert!(Declaration::parse("[widget.a]\nname = \"x\"\n").is_err());
        assert!(Declaration::parse("[role_permissions.a]\nroles = []\n").is_err());
        assert!(Declaration::parse("[role.a]\nname = 3\n").is_err());
        assert!(Declaration::parse("[role.a]\npermissions = [1]\n").is_err());
        assert!(Declaration::parse("[role.a]\nexclusive = [\"permissions\"]\n").is_err());
        assert!(
            Declaration::parse(
                "[organization_user_roles.a]\norganization = \"org_a\"\nroles = []\n"
            )
            .is_err()
        );
    }
}
