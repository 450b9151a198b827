//! Storage module for persisting harvest state
//!
//! This module handles every file the harvester reads or writes:
//! - Pending, failed and exhausted link sets (JSON arrays)
//! - Per-link attempt counts (JSON object)
//! - The append-only observation log (one JSON object per line)
//!
//! Whole-file writes are atomic (temp file + rename). Reads never fail on bad
//! content: they return a tagged outcome and callers degrade to empty/skip.

mod files;
mod link_sets;
mod observations;
mod traits;

pub use files::{read_json, write_atomic, write_json};
pub use link_sets::LinkSetStore;
pub use observations::{
    parse_line, scan_observations, AppendOutcome, ObservationRecord, ObservationScan,
    ObservationStore,
};
pub use traits::{LineOutcome, LinkStateStore, LoadOutcome, StorageError, StorageResult};

#[cfg(test)]
pub(crate) use observations::sample_record;
