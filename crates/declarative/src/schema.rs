//! Per-kind field classification table
//!
//! Every difference between entity kinds that the diff engine and the
//! reconciler care about is expressed here as data. There is no per-kind
//! reconciliation code.

use crate::model::{AssociationKind, EntityKind};

/// Classification of one field of an entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Must be declared with a non-empty value
    pub required: bool,
    /// Immutable after create; a change forces a replace
    pub create_only: bool,
    /// Accepted on write, never returned on read
    pub write_only: bool,
    /// Set by the remote service; never a diff input
    pub computed: bool,
    /// Declared absent keeps the current remote value
    pub preserve_if_omitted: bool,
    /// Once set, the remote service refuses to clear it
    pub non_clearable: bool,
    /// Rejected by create; sent by a follow-up update in the same apply
    pub post_create: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            create_only: false,
            write_only: false,
            computed: false,
            preserve_if_omitted: false,
            non_clearable: false,
            post_create: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }

    pub const fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub const fn preserve_if_omitted(mut self) -> Self {
        self.preserve_if_omitted = true;
        self
    }

    pub const fn non_clearable(mut self) -> Self {
        self.non_clearable = true;
        self
    }

    pub const fn post_create(mut self) -> Self {
        self.post_create = true;
        self
    }
}

/// Whether the remote service can change an entity in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSupport {
    InPlace,
    /// No update endpoint: any change is a replace
    None,
}

/// Whether an entity may be destroyed and recreated to apply a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceSupport {
    Allowed,
    /// Identity-bearing kinds: a change that needs a replace is rejected
    Forbidden,
}

/// Rules for one association kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationSpec {
    pub kind: AssociationKind,
    /// Name of the block inside the owning entity's configuration
    pub block: &'static str,
    /// Kind owning the block, `None` for standalone associations
    pub owner: Option<EntityKind>,
    /// Members starting with this prefix are managed elsewhere and never removed
    pub foreign_marker: Option<&'static str>,
    /// At least one declared member must start with this prefix
    pub required_member_prefix: Option<&'static str>,
    /// Declared members are sent with the owner's create call
    pub inline_on_create: bool,
}

impl AssociationSpec {
    const fn new(kind: AssociationKind, block: &'static str, owner: Option<EntityKind>) -> Self {
        Self {
            kind,
            block,
            owner,
            foreign_marker: None,
            required_member_prefix: None,
            inline_on_create: false,
        }
    }

    /// Whether the member carries the externally-managed marker
    pub fn is_marked_foreign(&self, member: &str) -> bool {
        self.foreign_marker
            .is_some_and(|marker| member.starts_with(marker))
    }
}

/// Schema of one entity kind
#[derive(Debug, Clone, Copy)]
pub struct KindSchema {
    pub kind: EntityKind,
    pub fields: &'static [FieldSpec],
    pub update: UpdateSupport,
    pub replace: ReplaceSupport,
    /// Fields that must be declared together or not at all
    pub paired_fields: &'static [(&'static str, &'static str)],
    pub associations: &'static [AssociationKind],
}

impl KindSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ============================================================================
// Tables
// ============================================================================

const API_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name").required().create_only(),
    FieldSpec::new("audience").required().create_only(),
];

const APPLICATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name").required(),
    FieldSpec::new("type").required().create_only(),
    FieldSpec::new("client_id").computed(),
    FieldSpec::new("client_secret").computed(),
    FieldSpec::new("login_uri").post_create(),
    FieldSpec::new("homepage_uri").post_create(),
    FieldSpec::new("language_key").post_create(),
    FieldSpec::new("logout_uris").post_create(),
    FieldSpec::new("redirect_uris").post_create(),
];

const CONNECTION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name").required(),
    FieldSpec::new("display_name").required(),
    FieldSpec::new("strategy").required().create_only(),
    FieldSpec::new("client_id").write_only(),
    FieldSpec::new("client_secret").write_only(),
];

const ORGANIZATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("code").create_only().preserve_if_omitted(),
    FieldSpec::new("name").required(),
    FieldSpec::new("external_id").preserve_if_omitted(),
    FieldSpec::new("background_color").preserve_if_omitted(),
    FieldSpec::new("button_color").preserve_if_omitted(),
    FieldSpec::new("button_text_color").preserve_if_omitted(),
    FieldSpec::new("link_color").preserve_if_omitted(),
    FieldSpec::new("handle").preserve_if_omitted(),
    FieldSpec::new("theme_code").computed(),
    FieldSpec::new("created_on").computed(),
];

const PERMISSION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name").required(),
    FieldSpec::new("key").required(),
    FieldSpec::new("description"),
];

const ROLE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name").required(),
    FieldSpec::new("key").required().create_only(),
    FieldSpec::new("description").required().non_clearable(),
];

const USER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("first_name")
        .preserve_if_omitted()
        .non_clearable(),
    FieldSpec::new("last_name")
        .preserve_if_omitted()
        .non_clearable(),
    FieldSpec::new("is_suspended")
        .preserve_if_omitted()
        .post_create(),
    FieldSpec::new("organization_code").create_only(),
    FieldSpec::new("created_on").computed(),
    FieldSpec::new("updated_on").computed(),
];

const API: KindSchema = KindSchema {
    kind: EntityKind::Api,
    fields: API_FIELDS,
    update: UpdateSupport::None,
    replace: ReplaceSupport::Allowed,
    paired_fields: &[],
    associations: &[],
};

const APPLICATION: KindSchema = KindSchema {
    kind: EntityKind::Application,
    fields: APPLICATION_FIELDS,
    update: UpdateSupport::InPlace,
    replace: ReplaceSupport::Allowed,
    paired_fields: &[],
    associations: &[AssociationKind::ApplicationConnections],
};

const CONNECTION: KindSchema = KindSchema {
    kind: EntityKind::Connection,
    fields: CONNECTION_FIELDS,
    update: UpdateSupport::InPlace,
    replace: ReplaceSupport::Allowed,
    paired_fields: &[("client_id", "client_secret")],
    associations: &[],
};

const ORGANIZATION: KindSchema = KindSchema {
    kind: EntityKind::Organization,
    fields: ORGANIZATION_FIELDS,
    update: UpdateSupport::InPlace,
    replace: ReplaceSupport::Allowed,
    paired_fields: &[],
    associations: &[AssociationKind::OrganizationMembers],
};

const PERMISSION: KindSchema = KindSchema {
    kind: EntityKind::Permission,
    fields: PERMISSION_FIELDS,
    update: UpdateSupport::InPlace,
    replace: ReplaceSupport::Allowed,
    paired_fields: &[],
    associations: &[],
};

const ROLE: KindSchema = KindSchema {
    kind: EntityKind::Role,
    fields: ROLE_FIELDS,
    update: UpdateSupport::InPlace,
    replace: ReplaceSupport::Allowed,
    paired_fields: &[],
    associations: &[AssociationKind::RolePermissions],
};

const USER: KindSchema = KindSchema {
    kind: EntityKind::User,
    fields: USER_FIELDS,
    update: UpdateSupport::InPlace,
    replace: ReplaceSupport::Forbidden,
    paired_fields: &[],
    associations: &[AssociationKind::UserIdentities],
};

const ROLE_PERMISSIONS: AssociationSpec = AssociationSpec::new(
    AssociationKind::RolePermissions,
    "permissions",
    Some(EntityKind::Role),
);

const USER_IDENTITIES: AssociationSpec = AssociationSpec {
    foreign_marker: Some("oauth2:"),
    required_member_prefix: Some("email:"),
    inline_on_create: true,
    ..AssociationSpec::new(
        AssociationKind::UserIdentities,
        "identities",
        Some(EntityKind::User),
    )
};

const APPLICATION_CONNECTIONS: AssociationSpec = AssociationSpec::new(
    AssociationKind::ApplicationConnections,
    "connections",
    Some(EntityKind::Application),
);

const ORGANIZATION_MEMBERS: AssociationSpec = AssociationSpec::new(
    AssociationKind::OrganizationMembers,
    "members",
    Some(EntityKind::Organization),
);

const ORGANIZATION_USER_ROLES: AssociationSpec =
    AssociationSpec::new(AssociationKind::OrganizationUserRoles, "roles", None);

/// Schema of an entity kind
pub fn schema_for(kind: EntityKind) -> &'static KindSchema {
    match kind {
        EntityKind::Api => &API,
        EntityKind::Application => &APPLICATION,
        EntityKind::Connection => &CONNECTION,
        EntityKind::Organization => &ORGANIZATION,
        EntityKind::Permission => &PERMISSION,
        EntityKind::Role => &ROLE,
        EntityKind::User => &USER,
    }
}

/// Rules of an association kind
pub fn association_spec(kind: AssociationKind) -> &'static AssociationSpec {
    match kind {
        AssociationKind::RolePermissions => &ROLE_PERMISSIONS,
        AssociationKind::UserIdentities => &USER_IDENTITIES,
        AssociationKind::ApplicationConnections => &APPLICATION_CONNECTIONS,
        AssociationKind::OrganizationMembers => &ORGANIZATION_MEMBERS,
        AssociationKind::OrganizationUserRoles => &ORGANIZATION_USER_ROLES,
    }
}
