//! # Declarative
//!
//! Reconciliation core for declared identity-service configuration.
//!
//! Given a declared desired state and the previously observed state, this
//! crate decides the minimal set of remote operations that converge the
//! two, against a remote API that does not echo every field it accepts.
//!
//! ## Core Concepts
//!
//! - **Schema**: Per-kind field classification (create-only, write-only, computed, ...)
//! - **Operation**: NoOp, Create, Update or Replace, computed by [`plan_entity`]
//! - **AssociationDelta**: Members to add and remove, computed by [`plan_associations`]
//! - **ReconciliationRecord**: Observed state persisted between cycles
//! - **Reconciler**: Drives one resource through plan, apply and verify
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     AssociationKind, DesiredEntity, EntityKind, MemberBlock, MemoryStore, Reconciler,
//! };
//!
//! let role = DesiredEntity::new(EntityKind::Role, "svc-role")
//!     .with_field("name", "Service")
//!     .with_field("key", "svc")
//!     .with_field("description", "Service accounts")
//!     .with_members(
//!         AssociationKind::RolePermissions,
//!         MemberBlock::declared(["perm_read", "perm_write"]),
//!     );
//!
//! let store = MemoryStore::new();
//! let reconciler = Reconciler::new(&gateway, &store);
//!
//! let plan = reconciler.plan(&role)?;
//! println!("{}: {}", plan.address, plan.operation);
//!
//! let outcome = reconciler.apply(&role)?;
//! assert!(outcome.converged);
//! ```
//!
//! ## Seams
//!
//! - [`Gateway`]: The remote capability set (create, get, update, delete, list, members)
//! - [`RecordStore`]: Where reconciliation records live
//! - [`CancelToken`]: Checked before every remote call
//!
//! The core spawns no threads. It is safe to run passes for different
//! resources concurrently, provided no two passes touch the same
//! (association kind, parent id) at once.

pub mod association;
pub mod cancel;
pub mod diff;
pub mod error;
pub mod gateway;
pub mod merge;
pub mod model;
pub mod reconciler;
pub mod record;
pub mod schema;
pub mod types;
pub mod validate;

// Re-export main types at crate root
pub use association::{AssociationReport, MemberAction, MemberOutcome, MemberResult};
pub use cancel::CancelToken;
pub use diff::{AssociationDelta, DiffSummary, Operation, plan_associations, plan_entity};
pub use error::{Error, Result};
pub use gateway::{
    ErrorCategory, Gateway, GatewayCall, GatewayError, GatewayResult, InlineMembers, RemoteEntity,
};
pub use model::{
    AssociationKind, DesiredAssociation, DesiredEntity, EntityKind, FieldSet, FieldValue,
    MemberBlock, ResourceAddress,
};
pub use reconciler::Reconciler;
pub use record::{Lifecycle, MemberState, MemoryStore, ReconciliationRecord, RecordStore, Subject};
pub use schema::{
    AssociationSpec, FieldSpec, KindSchema, ReplaceSupport, UpdateSupport, association_spec,
    schema_for,
};
pub use types::{ApplyOutcome, ApplyResult, ExecuteSummary, RefreshOutcome, ResourcePlan};
pub use validate::Violation;
