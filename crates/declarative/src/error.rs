//! Error types for reconciliation.
//!
//! Every error carries the resource address and, where one was attempted,
//! the remote call and the entity id, so the orchestrator can render a
//! precise message without re-deriving context.

use crate::association::AssociationReport;
use crate::gateway::{ErrorCategory, GatewayCall, GatewayError};
use thiserror::Error;

/// Errors that can occur while planning or applying a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// Declared configuration violates a schema invariant. Raised before any remote call.
    #[error("invalid {address}: {message}")]
    Validation {
        /// Address of the offending resource
        address: String,
        /// What is wrong with the declaration
        message: String,
    },

    /// A remote call failed
    #[error("{call} {subject} '{address}'{} failed: {source}", fmt_id(.id))]
    Remote {
        /// Entity or association kind
        subject: String,
        /// Address of the resource being reconciled
        address: String,
        /// Remote id, when known
        id: Option<String>,
        /// The call that failed
        call: GatewayCall,
        /// Gateway failure
        source: GatewayError,
    },

    /// Some member operations of an association set failed
    #[error("{address}: {report}")]
    PartialAssociation {
        /// Address of the resource owning the association set
        address: String,
        /// Outcome of every member operation in the cycle
        report: AssociationReport,
    },

    /// Cancellation was observed before a remote call
    #[error("reconciliation of '{address}' cancelled before {before}")]
    Cancelled {
        /// Address of the resource being reconciled
        address: String,
        /// The call that was not started
        before: GatewayCall,
    },

    /// The record store failed to load or save
    #[error("record store failed for '{address}': {cause:#}")]
    Store {
        /// Address of the record
        address: String,
        /// Underlying storage error
        cause: anyhow::Error,
    },
}

fn fmt_id(id: &Option<String>) -> String {
    id.as_ref().map(|id| format!(" (id {id})")).unwrap_or_default()
}

impl Error {
    pub fn validation(address: impl ToString, message: impl Into<String>) -> Self {
        Self::Validation {
            address: address.to_string(),
            message: message.into(),
        }
    }

    pub fn store(address: impl ToString, cause: anyhow::Error) -> Self {
        Self::Store {
            address: address.to_string(),
            cause,
        }
    }

    /// Category of the underlying gateway failure, if any
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Remote { source, .. } => Some(source.category()),
            _ => None,
        }
    }

    /// Whether applying again may succeed without changing the declaration
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.is_retryable(),
            Self::PartialAssociation { .. } | Self::Cancelled { .. } => true,
            Self::Validation { .. } | Self::Store { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == Some(ErrorCategory::NotFound)
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
