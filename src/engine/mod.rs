//! Execution engine for idsync
//!
//! The engine orchestrates:
//! 1. Planning - Resolve references and plan every declared resource offline
//! 2. Diffing - Show what would change, grouped by kind
//! 3. Executing - Apply dependency stages in order, resources of a stage in parallel

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ExecuteOptions, apply, destroy, refresh};
pub use planner::{Target, plan};
