//! Core types for declared identity resources

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kind of a manageable remote entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Api,
    Application,
    Connection,
    Organization,
    Permission,
    Role,
    User,
}

impl EntityKind {
    pub const ALL: [Self; 7] = [
        Self::Api,
        Self::Application,
        Self::Connection,
        Self::Organization,
        Self::Permission,
        Self::Role,
        Self::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Application => "application",
            Self::Connection => "connection",
            Self::Organization => "organization",
            Self::Permission => "permission",
            Self::Role => "role",
            Self::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind '{s}'"))
    }
}

/// Kind of a many-to-many membership scoped to a parent entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Permissions granted to a role
    RolePermissions,
    /// Login identities of a user (`email:...`, `oauth2:...`)
    UserIdentities,
    /// Connections enabled for an application
    ApplicationConnections,
    /// Users belonging to an organization
    OrganizationMembers,
    /// Roles of a user within an organization (parent is `org_code:user_id`)
    OrganizationUserRoles,
}

impl AssociationKind {
    pub const ALL: [Self; 5] = [
        Self::RolePermissions,
        Self::UserIdentities,
        Self::ApplicationConnections,
        Self::OrganizationMembers,
        Self::OrganizationUserRoles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RolePermissions => "role_permissions",
            Self::UserIdentities => "user_identities",
            Self::ApplicationConnections => "application_connections",
            Self::OrganizationMembers => "organization_members",
            Self::OrganizationUserRoles => "organization_user_roles",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssociationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown association kind '{s}'"))
    }
}

/// A single field value as exchanged with the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Empty text and empty lists carry no value. Booleans are never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bool(_) => false,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }

    /// The value that clears a field currently holding `self`
    pub fn cleared(&self) -> Self {
        match self {
            Self::Bool(_) => Self::Bool(false),
            Self::Text(_) => Self::Text(String::new()),
            Self::List(_) => Self::List(Vec::new()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Field name to value. A key that is missing is a field that is absent.
pub type FieldSet = BTreeMap<String, FieldValue>;

/// Declared membership of one association block.
///
/// `Absent` means the operator did not configure the block at all, so the
/// membership is left unmanaged. `Declared` with an empty set means the
/// operator wants zero managed members.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemberBlock {
    #[default]
    Absent,
    Declared {
        members: BTreeSet<String>,
        /// Authoritative block: members this system never added are removed too
        exclusive: bool,
    },
}

impl MemberBlock {
    pub fn declared<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Declared {
            members: members.into_iter().map(Into::into).collect(),
            exclusive: false,
        }
    }

    pub fn exclusive<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Declared {
            members: members.into_iter().map(Into::into).collect(),
            exclusive: true,
        }
    }

    pub fn members(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Absent => None,
            Self::Declared { members, .. } => Some(members),
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Declared { exclusive: true, .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Stable key of a managed resource, e.g. `role.svc-role`.
///
/// Unlike the remote id, the address survives a replace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceAddress(String);

impl ResourceAddress {
    pub fn new(prefix: impl fmt::Display, name: &str) -> Self {
        Self(format!("{prefix}.{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(prefix, name)`
    pub fn parts(&self) -> (&str, &str) {
        self.0.split_once('.').unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Declared configuration of one entity for one reconciliation cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntity {
    pub address: ResourceAddress,
    pub kind: EntityKind,
    pub fields: FieldSet,
    /// Embedded association blocks. A kind missing from the map is `Absent`.
    pub associations: BTreeMap<AssociationKind, MemberBlock>,
}

impl DesiredEntity {
    pub fn new(kind: EntityKind, name: &str) -> Self {
        Self {
            address: ResourceAddress::new(kind, name),
            kind,
            fields: FieldSet::new(),
            associations: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_members(mut self, association: AssociationKind, block: MemberBlock) -> Self {
        self.associations.insert(association, block);
        self
    }

    pub fn block(&self, association: AssociationKind) -> &MemberBlock {
        static ABSENT: MemberBlock = MemberBlock::Absent;
        self.associations.get(&association).unwrap_or(&ABSENT)
    }
}

/// Declared membership that is not owned by any single entity block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredAssociation {
    pub address: ResourceAddress,
    pub kind: AssociationKind,
    pub parent_id: String,
    pub block: MemberBlock,
}

impl DesiredAssociation {
    pub fn new(kind: AssociationKind, name: &str, parent_id: impl Into<String>) -> Self {
        Self {
            address: ResourceAddress::new(kind, name),
            kind,
            parent_id: parent_id.into(),
            block: MemberBlock::Absent,
        }
    }

    pub fn with_block(mut self, block: MemberBlock) -> Self {
        self.block = block;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
        assert!("tenant".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_field_value_emptiness() {
        assert!(FieldValue::from("").is_empty());
        assert!(FieldValue::List(Vec::new()).is_empty());
        assert!(!FieldValue::Bool(false).is_empty());
        assert_eq!(FieldValue::from("x").cleared(), FieldValue::from(""));
    }

    #[test]
    fn test_member_block_absent_differs_from_empty() {
        let absent = MemberBlock::Absent;
        let empty = MemberBlock::declared(Vec::<String>::new());

        assert!(absent.members().is_none());
        assert_eq!(empty.members().map(BTreeSet::len), Some(0));
        assert_ne!(absent, empty);
    }

    #[test]
    fn test_resource_address_parts() {
        let address = ResourceAddress::new(EntityKind::Role, "svc-role");
        assert_eq!(address.as_str(), "role.svc-role");
        assert_eq!(address.parts(), ("role", "svc-role"));
    }

    #[test]
    fn test_desired_entity_missing_block_is_absent() {
        let role = DesiredEntity::new(EntityKind::Role, "admin").with_field("name", "Admin");
        assert!(role.block(AssociationKind::RolePermissions).is_absent());
    }
}
