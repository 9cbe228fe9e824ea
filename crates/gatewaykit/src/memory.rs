//! In-memory tenant gateway.
//!
//! Behaves like the remote identity service, asymmetries included:
//! - create echoes only the new id
//! - write-only and post-create fields are never returned on read
//! - server-computed fields are generated on create
//! - create-only fields are rejected on update
//! - a user cannot be created without an `email:` identity
//!
//! Every call is logged as a short line (`"get role role_0001"`) so tests can
//! assert exact call sequences. The tenant can be saved to and loaded from a
//! JSON snapshot, which is how the CLI runs against a local sandbox.

use crate::error::{Error, Result};
use crate::types::Fault;
use chrono::Utc;
use declarative::{
    AssociationKind, EntityKind, FieldSet, FieldValue, Gateway, GatewayCall, GatewayError,
    GatewayResult, InlineMembers, RemoteEntity, UpdateSupport, schema_for,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Stored state of a tenant.
///
/// Entities are keyed by kind then id; association sets by association
/// kind then parent id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    entities: BTreeMap<String, BTreeMap<String, FieldSet>>,
    #[serde(default)]
    members: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl Tenant {
    fn entity(&self, kind: EntityKind, id: &str) -> Option<&FieldSet> {
        self.entities.get(kind.as_str())?.get(id)
    }

    fn entity_mut(&mut self, kind: EntityKind, id: &str) -> Option<&mut FieldSet> {
        self.entities.get_mut(kind.as_str())?.get_mut(id)
    }

    fn exists(&self, kind: EntityKind, id: &str) -> bool {
        self.entity(kind, id).is_some()
    }

    fn set(&self, association: AssociationKind, parent: &str) -> Option<&BTreeSet<String>> {
        self.members.get(association.as_str())?.get(parent)
    }

    fn set_mut(&mut self, association: AssociationKind, parent: &str) -> &mut BTreeSet<String> {
        self.members
            .entry(association.as_str().to_string())
            .or_default()
            .entry(parent.to_string())
            .or_default()
    }

    fn next_id(&mut self, kind: EntityKind) -> String {
        self.next_id += 1;
        format!("{}_{:04}", id_prefix(kind), self.next_id)
    }

    fn key_taken(&self, kind: EntityKind, field: &str, value: &FieldValue) -> bool {
        self.entities
            .get(kind.as_str())
            .is_some_and(|all| all.values().any(|e| e.get(field) == Some(value)))
    }

    /// Remove an entity and every membership it takes part in
    fn remove_entity(&mut self, kind: EntityKind, id: &str) -> bool {
        let removed = self
            .entities
            .get_mut(kind.as_str())
            .and_then(|all| all.remove(id))
            .is_some();
        if !removed {
            return false;
        }

        let scoped = format!("{id}:");
        let user_scoped = format!(":{id}");
        for (association, parents) in &mut self.members {
            parents.retain(|parent, _| parent != id && !parent.starts_with(&scoped));
            let holds = association
                .parse::<AssociationKind>()
                .ok()
                .and_then(member_kind);
            if holds == Some(kind) {
                for set in parents.values_mut() {
                    set.remove(id);
                }
            }
        }

        // a user leaving the tenant also loses its organization-scoped roles
        if kind == EntityKind::User
            && let Some(parents) = self
                .members
                .get_mut(AssociationKind::OrganizationUserRoles.as_str())
        {
            parents.retain(|parent, _| !parent.ends_with(&user_scoped));
        }
        true
    }
}

/// Gateway backed by an in-memory tenant
#[derive(Debug, Default)]
pub struct MemoryGateway {
    tenant: Mutex<Tenant>,
    calls: Mutex<Vec<String>>,
    faults: Mutex<Vec<Fault>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tenant(tenant: Tenant) -> Self {
        Self {
            tenant: Mutex::new(tenant),
            ..Self::default()
        }
    }

    /// Load a tenant snapshot; a missing file is an empty tenant
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No sandbox at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tenant: Tenant = serde_json::from_str(&content).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded sandbox from {}", path.display());
        Ok(Self::from_tenant(tenant))
    }

    /// Write the tenant snapshot, replacing the file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let io = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };
        let content =
            serde_json::to_string_pretty(&self.tenant()).map_err(|source| Error::Json {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io)?;
        }
        let staged = path.with_extension("json.tmp");
        fs::write(&staged, content).map_err(io)?;
        fs::rename(&staged, path).map_err(io)?;

        log::debug!("Saved sandbox to {}", path.display());
        Ok(())
    }

    /// Copy of the current tenant state
    pub fn tenant(&self) -> Tenant {
        lock(&self.tenant).clone()
    }

    // ========================================================================
    // Out-of-band access (not logged, never faulted)
    // ========================================================================

    /// Stored fields of an entity, write-only ones included
    pub fn entity(&self, kind: EntityKind, id: &str) -> Option<FieldSet> {
        lock(&self.tenant).entity(kind, id).cloned()
    }

    /// Ids of all entities of a kind
    pub fn ids(&self, kind: EntityKind) -> Vec<String> {
        lock(&self.tenant)
            .entities
            .get(kind.as_str())
            .map(|all| all.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn members(&self, association: AssociationKind, parent: &str) -> BTreeSet<String> {
        lock(&self.tenant)
            .set(association, parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Add a member as some other actor would
    pub fn insert_member(&self, association: AssociationKind, parent: &str, member: &str) {
        lock(&self.tenant)
            .set_mut(association, parent)
            .insert(member.to_string());
    }

    /// Delete an entity as some other actor would
    pub fn remove_entity(&self, kind: EntityKind, id: &str) -> bool {
        lock(&self.tenant).remove_entity(kind, id)
    }

    /// Change a stored field as some other actor would
    pub fn set_field(&self, kind: EntityKind, id: &str, name: &str, value: impl Into<FieldValue>) {
        if let Some(fields) = lock(&self.tenant).entity_mut(kind, id) {
            fields.insert(name.to_string(), value.into());
        }
    }

    pub fn inject(&self, fault: Fault) {
        lock(&self.faults).push(fault);
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Calls made so far, clearing the log
    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.calls))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn record(&self, call: GatewayCall, line: String, subjects: &[&str]) -> GatewayResult<()> {
        log::debug!("sandbox: {line}");
        lock(&self.calls).push(line);

        let mut faults = lock(&self.faults);
        if let Some(fault) = faults.iter_mut().find(|f| f.matches(call, subjects)) {
            fault.remaining -= 1;
            return Err(fault.error.clone());
        }
        Ok(())
    }

    /// Resolve the parent of an association set, checking it exists
    fn check_parent(
        tenant: &Tenant,
        association: AssociationKind,
        parent: &str,
    ) -> GatewayResult<()> {
        if association == AssociationKind::OrganizationUserRoles {
            let Some((org, user)) = parent.split_once(':') else {
                return Err(GatewayError::fatal(format!(
                    "invalid organization user '{parent}', expected org_code:user_id"
                )));
            };
            if !tenant.exists(EntityKind::Organization, org) {
                return Err(GatewayError::not_found(format!("organization {org}")));
            }
            if !tenant.exists(EntityKind::User, user) {
                return Err(GatewayError::not_found(format!("user {user}")));
            }
            let in_org = tenant
                .set(AssociationKind::OrganizationMembers, org)
                .is_some_and(|m| m.contains(user));
            if !in_org {
                return Err(GatewayError::fatal("user_not_in_organization"));
            }
            return Ok(());
        }

        let kind = parent_kind(association);
        if tenant.exists(kind, parent) {
            Ok(())
        } else {
            Err(GatewayError::not_found(format!("{kind} {parent}")))
        }
    }
}

impl Gateway for MemoryGateway {
    fn create(
        &self,
        kind: EntityKind,
        fields: &FieldSet,
        members: &InlineMembers,
    ) -> GatewayResult<RemoteEntity> {
        self.record(GatewayCall::Create, format!("create {kind}"), &[kind.as_str()])?;
        let schema = schema_for(kind);

        for (name, value) in fields {
            let Some(spec) = schema.field(name) else {
                return Err(GatewayError::fatal(format!("{kind} has no field '{name}'")));
            };
            if spec.computed {
                return Err(GatewayError::fatal(format!("'{name}' is read-only")));
            }
            if spec.post_create {
                return Err(GatewayError::fatal(format!(
                    "'{name}' cannot be set when creating a {kind}"
                )));
            }
            if value.is_empty() && spec.required {
                return Err(GatewayError::fatal(format!("'{name}' must not be empty")));
            }
        }
        if let Some(missing) = schema
            .fields
            .iter()
            .find(|f| f.required && !fields.contains_key(f.name))
        {
            return Err(GatewayError::fatal(format!("'{}' is required", missing.name)));
        }

        for (association, set) in members {
            if !schema.associations.contains(association) {
                return Err(GatewayError::fatal(format!(
                    "{association} cannot be sent when creating a {kind}"
                )));
            }
            if *association == AssociationKind::UserIdentities {
                set.iter().try_for_each(|m| check_identity(m))?;
            }
        }
        if kind == EntityKind::User {
            let has_email = members.iter().any(|(association, set)| {
                *association == AssociationKind::UserIdentities
                    && set.iter().any(|m| m.starts_with("email:"))
            });
            if !has_email {
                return Err(GatewayError::fatal("a user requires an email identity"));
            }
        }

        let mut tenant = lock(&self.tenant);
        if matches!(kind, EntityKind::Role | EntityKind::Permission)
            && let Some(key) = fields.get("key")
            && tenant.key_taken(kind, "key", key)
        {
            return Err(GatewayError::fatal(format!("{kind} key {key} already exists")));
        }

        let mut stored: FieldSet = fields
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let id = match (kind, stored.get("code").and_then(FieldValue::as_text)) {
            (EntityKind::Organization, Some(code)) => {
                if tenant.exists(kind, code) {
                    return Err(GatewayError::fatal(format!(
                        "organization code {code} already exists"
                    )));
                }
                code.to_string()
            }
            _ => tenant.next_id(kind),
        };
        let serial = tenant.next_id;
        generate_computed(kind, &id, serial, &mut stored);

        tenant
            .entities
            .entry(kind.as_str().to_string())
            .or_default()
            .insert(id.clone(), stored);
        for (association, set) in members {
            tenant.set_mut(*association, &id).extend(set.iter().cloned());
        }

        Ok(RemoteEntity {
            id,
            fields: FieldSet::new(),
        })
    }

    fn get(&self, kind: EntityKind, id: &str) -> GatewayResult<FieldSet> {
        self.record(
            GatewayCall::Get,
            format!("get {kind} {id}"),
            &[kind.as_str(), id],
        )?;
        lock(&self.tenant)
            .entity(kind, id)
            .map(|stored| visible(kind, stored))
            .ok_or_else(|| GatewayError::not_found(format!("{kind} {id}")))
    }

    fn update(&self, kind: EntityKind, id: &str, changed: &FieldSet) -> GatewayResult<FieldSet> {
        let names: Vec<&str> = changed.keys().map(String::as_str).collect();
        self.record(
            GatewayCall::Update,
            format!("update {kind} {id} [{}]", names.join(", ")),
            &[kind.as_str(), id],
        )?;
        let schema = schema_for(kind);

        let mut tenant = lock(&self.tenant);
        let Some(stored) = tenant.entity_mut(kind, id) else {
            return Err(GatewayError::not_found(format!("{kind} {id}")));
        };
        if schema.update == UpdateSupport::None {
            return Err(GatewayError::fatal(format!("{kind} cannot be updated")));
        }

        for (name, value) in changed {
            let Some(spec) = schema.field(name) else {
                return Err(GatewayError::fatal(format!("{kind} has no field '{name}'")));
            };
            if spec.computed {
                return Err(GatewayError::fatal(format!("'{name}' is read-only")));
            }
            if spec.create_only && stored.get(name) != Some(value) {
                return Err(GatewayError::fatal(format!(
                    "'{name}' cannot be changed after create"
                )));
            }
        }

        for (name, value) in changed {
            if value.is_empty() {
                stored.remove(name);
            } else {
                stored.insert(name.clone(), value.clone());
            }
        }
        if stored.contains_key("updated_on") {
            stored.insert("updated_on".into(), Utc::now().to_rfc3339().into());
        }
        Ok(visible(kind, stored))
    }

    fn delete(&self, kind: EntityKind, id: &str) -> GatewayResult<()> {
        self.record(
            GatewayCall::Delete,
            format!("delete {kind} {id}"),
            &[kind.as_str(), id],
        )?;
        if lock(&self.tenant).remove_entity(kind, id) {
            Ok(())
        } else {
            Err(GatewayError::not_found(format!("{kind} {id}")))
        }
    }

    fn list(&self, kind: EntityKind, filter: &FieldSet) -> GatewayResult<Vec<RemoteEntity>> {
        self.record(GatewayCall::List, format!("list {kind}"), &[kind.as_str()])?;
        let tenant = lock(&self.tenant);
        let Some(all) = tenant.entities.get(kind.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(all
            .iter()
            .map(|(id, stored)| RemoteEntity {
                id: id.clone(),
                fields: visible(kind, stored),
            })
            .filter(|entity| {
                filter
                    .iter()
                    .all(|(name, value)| entity.fields.get(name) == Some(value))
            })
            .collect())
    }

    fn add_association(
        &self,
        association: AssociationKind,
        parent_id: &str,
        member_id: &str,
    ) -> GatewayResult<()> {
        self.record(
            GatewayCall::AddMember,
            format!("add {association} {parent_id} {member_id}"),
            &[association.as_str(), parent_id, member_id],
        )?;
        let mut tenant = lock(&self.tenant);
        Self::check_parent(&tenant, association, parent_id)?;
        match member_kind(association) {
            Some(kind) if !tenant.exists(kind, member_id) => {
                return Err(GatewayError::not_found(format!("{kind} {member_id}")));
            }
            Some(_) => {}
            None => check_identity(member_id)?,
        }
        tenant
            .set_mut(association, parent_id)
            .insert(member_id.to_string());
        Ok(())
    }

    fn remove_association(
        &self,
        association: AssociationKind,
        parent_id: &str,
        member_id: &str,
    ) -> GatewayResult<()> {
        self.record(
            GatewayCall::RemoveMember,
            format!("remove {association} {parent_id} {member_id}"),
            &[association.as_str(), parent_id, member_id],
        )?;
        let mut tenant = lock(&self.tenant);
        Self::check_parent(&tenant, association, parent_id)?;
        if tenant.set_mut(association, parent_id).remove(member_id) {
            Ok(())
        } else {
            Err(GatewayError::not_found(format!(
                "{member_id} is not in {association} of {parent_id}"
            )))
        }
    }

    fn list_members(
        &self,
        association: AssociationKind,
        parent_id: &str,
    ) -> GatewayResult<BTreeSet<String>> {
        self.record(
            GatewayCall::ListMembers,
            format!("members {association} {parent_id}"),
            &[association.as_str(), parent_id],
        )?;
        let tenant = lock(&self.tenant);
        Self::check_parent(&tenant, association, parent_id)?;
        Ok(tenant
            .set(association, parent_id)
            .cloned()
            .unwrap_or_default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn id_prefix(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Api => "api",
        EntityKind::Application => "app",
        EntityKind::Connection => "conn",
        EntityKind::Organization => "org",
        EntityKind::Permission => "perm",
        EntityKind::Role => "role",
        EntityKind::User => "kp",
    }
}

fn parent_kind(association: AssociationKind) -> EntityKind {
    match association {
        AssociationKind::RolePermissions => EntityKind::Role,
        AssociationKind::UserIdentities => EntityKind::User,
        AssociationKind::ApplicationConnections => EntityKind::Application,
        AssociationKind::OrganizationMembers | AssociationKind::OrganizationUserRoles => {
            EntityKind::Organization
        }
    }
}

/// Entity kind of the members, `None` for identities
fn member_kind(association: AssociationKind) -> Option<EntityKind> {
    match association {
        AssociationKind::RolePermissions => Some(EntityKind::Permission),
        AssociationKind::UserIdentities => None,
        AssociationKind::ApplicationConnections => Some(EntityKind::Connection),
        AssociationKind::OrganizationMembers => Some(EntityKind::User),
        AssociationKind::OrganizationUserRoles => Some(EntityKind::Role),
    }
}

fn check_identity(member: &str) -> GatewayResult<()> {
    match member.split_once(':') {
        Some((kind, value)) if !kind.is_empty() && !value.is_empty() => Ok(()),
        _ => Err(GatewayError::fatal(format!(
            "invalid identity '{member}', expected type:value"
        ))),
    }
}

fn generate_computed(kind: EntityKind, id: &str, serial: u64, stored: &mut FieldSet) {
    let now = Utc::now().to_rfc3339();
    match kind {
        EntityKind::Application => {
            stored.insert("client_id".into(), format!("{id}_client").into());
            stored.insert("client_secret".into(), format!("secret_{serial:08x}").into());
        }
        EntityKind::Organization => {
            stored.insert("code".into(), id.into());
            stored.insert("theme_code".into(), "light".into());
            stored.insert("created_on".into(), now.into());
        }
        EntityKind::User => {
            stored.insert("created_on".into(), now.clone().into());
            stored.insert("updated_on".into(), now.into());
        }
        _ => {}
    }
}

/// What a read returns: no write-only fields, no post-create fields
fn visible(kind: EntityKind, stored: &FieldSet) -> FieldSet {
    let schema = schema_for(kind);
    stored
        .iter()
        .filter(|(name, _)| {
            schema
                .field(name)
                .is_none_or(|f| !f.write_only && !f.post_create)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(key: &str) -> FieldSet {
        let mut fields = FieldSet::new();
        fields.insert("name".into(), key.into());
        fields.insert("key".into(), key.into());
        fields.insert("description".into(), format!("{key} role").into());
        fields
    }

    #[test]
    fn test_create_echoes_only_id() {
        let gateway = MemoryGateway::new();
        let created = gateway
            .create(EntityKind::Role, &role("admin"), &Vec::new())
            .unwrap();

        assert_eq!(created.id, "role_0001");
        assert!(created.fields.is_empty());
        assert_eq!(
            gateway.get(EntityKind::Role, &created.id).unwrap(),
            role("admin")
        );
    }

    #[test]
    fn test_create_rejects_duplicate_key_and_missing_required() {
        let gateway = MemoryGateway::new();
        gateway
            .create(EntityKind::Role, &role("admin"), &Vec::new())
            .unwrap();

        let err = gateway
            .create(EntityKind::Role, &role("admin"), &Vec::new())
            .unwrap_err();
        assert_eq!(err.category(), declarative::ErrorCategory::Fatal);

        let mut partial = role("ops");
        partial.remove("description");
        assert!(
            gateway
                .create(EntityKind::Role, &partial, &Vec::new())
                .is_err()
        );
    }

    #[test]
    fn test_write_only_fields_hidden_on_read() {
        let gateway = MemoryGateway::new();
        let mut fields = FieldSet::new();
        fields.insert("name".into(), "github".into());
        fields.insert("display_name".into(), "GitHub".into());
        fields.insert("strategy".into(), "oauth2:github".into());
        fields.insert("client_secret".into(), "s3cret".into());
        fields.insert("client_id".into(), "abc".into());

        let id = gateway
            .create(EntityKind::Connection, &fields, &Vec::new())
            .unwrap()
            .id;

        let read = gateway.get(EntityKind::Connection, &id).unwrap();
        assert!(!read.contains_key("client_secret"));
        assert!(
            gateway
                .entity(EntityKind::Connection, &id)
                .unwrap()
                .contains_key("client_secret")
        );
    }

    #[test]
    fn test_update_rejects_create_only_change() {
        let gateway = MemoryGateway::new();
        let id = gateway
            .create(EntityKind::Role, &role("admin"), &Vec::new())
            .unwrap()
            .id;

        let mut changed = FieldSet::new();
        changed.insert("key".into(), "root".into());
        assert!(gateway.update(EntityKind::Role, &id, &changed).is_err());

        changed.clear();
        changed.insert("name".into(), "Root".into());
        let read = gateway.update(EntityKind::Role, &id, &changed).unwrap();
        assert_eq!(read.get("name"), Some(&FieldValue::from("Root")));
    }

    #[test]
    fn test_user_requires_email_identity() {
        let gateway = MemoryGateway::new();
        let no_email: InlineMembers = vec![(
            AssociationKind::UserIdentities,
            BTreeSet::from(["oauth2:github|1".to_string()]),
        )];
        assert!(
            gateway
                .create(EntityKind::User, &FieldSet::new(), &no_email)
                .is_err()
        );

        let with_email: InlineMembers = vec![(
            AssociationKind::UserIdentities,
            BTreeSet::from(["email:a@x.com".to_string()]),
        )];
        let user = gateway
            .create(EntityKind::User, &FieldSet::new(), &with_email)
            .unwrap();
        assert!(user.id.starts_with("kp_"));
        assert_eq!(
            gateway.members(AssociationKind::UserIdentities, &user.id),
            BTreeSet::from(["email:a@x.com".to_string()])
        );
    }

    #[test]
    fn test_organization_user_roles_require_membership() {
        let gateway = MemoryGateway::new();
        let mut org = FieldSet::new();
        org.insert("name".into(), "Acme".into());
        org.insert("code".into(), "org_acme".into());
        gateway
            .create(EntityKind::Organization, &org, &Vec::new())
            .unwrap();
        let identities: InlineMembers = vec![(
            AssociationKind::UserIdentities,
            BTreeSet::from(["email:a@x.com".to_string()]),
        )];
        let user = gateway
            .create(EntityKind::User, &FieldSet::new(), &identities)
            .unwrap()
            .id;
        let role_id = gateway
            .create(EntityKind::Role, &role("admin"), &Vec::new())
            .unwrap()
            .id;
        let parent = format!("org_acme:{user}");

        let err = gateway
            .add_association(AssociationKind::OrganizationUserRoles, &parent, &role_id)
            .unwrap_err();
        assert_eq!(err, GatewayError::fatal("user_not_in_organization"));

        gateway
            .add_association(AssociationKind::OrganizationMembers, "org_acme", &user)
            .unwrap();
        gateway
            .add_association(AssociationKind::OrganizationUserRoles, &parent, &role_id)
            .unwrap();
        assert_eq!(
            gateway
                .list_members(AssociationKind::OrganizationUserRoles, &parent)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_delete_cascades_memberships() {
        let gateway = MemoryGateway::new();
        let role_id = gateway
            .create(EntityKind::Role, &role("admin"), &Vec::new())
            .unwrap()
            .id;
        let mut perm = FieldSet::new();
        perm.insert("name".into(), "Read".into());
        perm.insert("key".into(), "read".into());
        let perm_id = gateway
            .create(EntityKind::Permission, &perm, &Vec::new())
            .unwrap()
            .id;
        gateway
            .add_association(AssociationKind::RolePermissions, &role_id, &perm_id)
            .unwrap();

        gateway.delete(EntityKind::Permission, &perm_id).unwrap();
        assert!(
            gateway
                .members(AssociationKind::RolePermissions, &role_id)
                .is_empty()
        );
        assert!(
            gateway
                .delete(EntityKind::Permission, &perm_id)
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_call_log_and_faults() {
        let gateway = MemoryGateway::new();
        gateway.inject(Fault::new(GatewayCall::Get, GatewayError::transient("503")).on("role_0001"));
        let id = gateway
            .create(EntityKind::Role, &role("admin"), &Vec::new())
            .unwrap()
            .id;

        assert!(gateway.get(EntityKind::Role, &id).unwrap_err().is_retryable());
        assert!(gateway.get(EntityKind::Role, &id).is_ok());
        assert_eq!(
            gateway.take_calls(),
            vec![
                "create role".to_string(),
                "get role role_0001".to_string(),
                "get role role_0001".to_string(),
            ]
        );
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenant.json");

        let gateway = MemoryGateway::new();
        gateway
            .create(EntityKind::Role, &role("admin"), &Vec::new())
            .unwrap();
        gateway.save(&path).unwrap();

        let loaded = MemoryGateway::load(&path).unwrap();
        assert_eq!(loaded.tenant(), gateway.tenant());
        assert!(MemoryGateway::load(&dir.path().join("missing.json")).is_ok());
    }
}
