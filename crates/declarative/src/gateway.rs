//! Remote gateway capability set
//!
//! The reconciler depends only on this trait. Implementations own the
//! transport, authentication and any retry policy.

use crate::model::{AssociationKind, EntityKind, FieldSet};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Categories of gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Target entity or member does not exist remotely
    NotFound,
    /// Timeouts, rate limits, unavailability; worth retrying
    Transient,
    /// Rejected request; surfaced verbatim
    Fatal,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Remote entity not found",
            Self::Transient => "Temporary remote failure",
            Self::Fatal => "Remote service rejected the request",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Run a refresh, then plan again to recreate it",
            Self::Transient => "Apply again; converged resources are left untouched",
            Self::Fatal => "Check the declared configuration against the remote error",
        }
    }
}

/// Errors returned by a [`Gateway`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("{message}")]
    Fatal { message: String },
}

impl GatewayError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Fatal { .. } => ErrorCategory::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The remote call being attempted, for error context and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayCall {
    Create,
    Get,
    Update,
    Delete,
    List,
    AddMember,
    RemoveMember,
    ListMembers,
}

impl fmt::Display for GatewayCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::AddMember => "add member",
            Self::RemoveMember => "remove member",
            Self::ListMembers => "list members",
        };
        f.write_str(name)
    }
}

/// An entity as returned by the remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    pub id: String,
    pub fields: FieldSet,
}

/// Members sent together with a create call
pub type InlineMembers = Vec<(AssociationKind, BTreeSet<String>)>;

/// Capability set of the remote identity service.
///
/// Implementations must be safe to share across threads; the orchestrator
/// reconciles independent entities concurrently through one gateway.
pub trait Gateway: Send + Sync {
    /// Create an entity. The returned fields may be a subset of what was written.
    fn create(
        &self,
        kind: EntityKind,
        fields: &FieldSet,
        members: &InlineMembers,
    ) -> GatewayResult<RemoteEntity>;

    fn get(&self, kind: EntityKind, id: &str) -> GatewayResult<FieldSet>;

    /// Send only the changed fields. An empty value clears a field.
    fn update(&self, kind: EntityKind, id: &str, changed: &FieldSet) -> GatewayResult<FieldSet>;

    fn delete(&self, kind: EntityKind, id: &str) -> GatewayResult<()>;

    /// List entities whose fields equal every entry of `filter`
    fn list(&self, kind: EntityKind, filter: &FieldSet) -> GatewayResult<Vec<RemoteEntity>>;

    fn add_association(
        &self,
        association: AssociationKind,
        parent_id: &str,
        member_id: &str,
    ) -> GatewayResult<()>;

    fn remove_association(
        &self,
        association: AssociationKind,
        parent_id: &str,
        member_id: &str,
    ) -> GatewayResult<()>;

    /// Current members of an association set
    fn list_members(
        &self,
        association: AssociationKind,
        parent_id: &str,
    ) -> GatewayResult<BTreeSet<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Fatal.is_retryable());
    }

    #[test]
    fn test_gateway_error_category() {
        assert!(GatewayError::not_found("role r1").is_not_found());
        assert!(GatewayError::transient("429").is_retryable());
        assert_eq!(
            GatewayError::fatal("bad request").category(),
            ErrorCategory::Fatal
        );
        assert_eq!(GatewayError::fatal("bad request").to_string(), "bad request");
    }
}
