//! State module for tracking harvest progress
//!
//! This module provides link-state management across runs.
//!
//! # Components
//!
//! - `LinkSet`: insertion-ordered set of links, persisted as a JSON array
//! - `LinkState`: per-link lifecycle (pending, failed, scraped, exhausted)
//! - `LinkStateReconciler`: merges persisted sets into the run's `WorkQueue`

mod link_set;
mod link_state;
mod reconciler;

// Re-export main types
pub use link_set::LinkSet;
pub use link_state::{AttemptLedger, LinkState};
pub use reconciler::{LinkStateReconciler, ReconcileReport, WorkQueue};
