//! # gatewaykit
//!
//! Gateway implementations for the `declarative` reconciliation core.
//!
//! This crate provides:
//! - [`MemoryGateway`], an in-memory tenant that reproduces the remote
//!   service's asymmetries, logs every call and accepts injected faults
//! - [`RetryingGateway`], a decorator retrying transient failures with
//!   exponential backoff
//!
//! ## Example
//!
//! ```no_run
//! use declarative::{DesiredEntity, EntityKind, MemoryStore, Reconciler};
//! use gatewaykit::{MemoryGateway, RetryConfig, RetryingGateway};
//! use std::path::Path;
//!
//! let tenant = MemoryGateway::load(Path::new("sandbox.json")).expect("Failed to load sandbox");
//! let gateway = RetryingGateway::new(tenant, RetryConfig::default());
//! let store = MemoryStore::new();
//!
//! let role = DesiredEntity::new(EntityKind::Role, "admin")
//!     .with_field("name", "Admin")
//!     .with_field("key", "admin")
//!     .with_field("description", "Administrators");
//! Reconciler::new(&gateway, &store).apply(&role).expect("Apply failed");
//!
//! gateway.inner().save(Path::new("sandbox.json")).expect("Failed to save sandbox");
//! ```
//!
//! ## Retry Logic
//!
//! Every call except create is retried on `Transient` errors. Create is
//! not idempotent, so a failed create surfaces immediately and the next
//! apply decides what to do.

pub mod error;
pub mod memory;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
pub use memory::{MemoryGateway, Tenant};
pub use retry::{LogCallback, NoCallback, RetryCallback, RetryingGateway, with_retry};
pub use types::{Fault, RetryConfig};
