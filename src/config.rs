// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event-builder configuration -- Single Source of Truth
//!
//! This module is the only place sizing constants (source counts, expected
//! fragment counts, pool size) are read from. It does not parse any file
//! format itself: the embedding application loads its own XML/YAML/CLI
//! configuration and fills in a [`Config`] value.

/// Trigger level a source contributes fragments at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Synchronous hardware trigger stage.
    L0,
    /// Farm-side secondary trigger stage.
    L1,
}

/// One row of the detector source-ID registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTableEntry {
    /// Wire-level detector identifier carried in the MEP header.
    pub source_id: u8,
    /// Trigger level this source reports fragments at.
    pub level: Level,
    /// Number of distinct `sourceSubID` boards expected from this source.
    pub expected_fragments: u8,
}

/// Recognized runtime configuration for the event-building core.
///
/// Mirrors `spec.md` §6's "Environment" list exactly; no option beyond these
/// is read by this crate.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of distinct L0 sources (`NUM_L0_SOURCES`).
    pub num_l0_sources: usize,
    /// Number of distinct L1 sources (`NUM_L1_SOURCES`).
    pub num_l1_sources: usize,
    /// Total L0 fragments expected before an event is L0-complete.
    pub expected_l0_packets_per_event: u32,
    /// Total L1 fragments expected before an event is L1-complete.
    pub expected_l1_packets_per_event: u32,
    /// Detector name -> sourceID -> sourceNum -> expected-fragments registry.
    pub source_id_table: Vec<SourceTableEntry>,
    /// Whether the L0TP source is present and should be decoded.
    pub l0tp_active: bool,
    /// L0TP's dense `sourceNum` within the L0 table, when `l0tp_active`.
    pub l0tp_source_num: usize,
    /// Number of preallocated `Event` slots in the `EventPool`.
    pub event_pool_size: usize,
    /// Diagnostic: log every source ID an event completes with.
    pub print_completed_source_ids: bool,
}

impl Config {
    /// Validate internal consistency.
    ///
    /// Does not check that `source_id_table` entries are individually
    /// well-formed beyond uniqueness -- `SourceIdManager::new` performs the
    /// per-entry validation since it owns the dense numbering scheme.
    pub fn validate(&self) -> crate::Result<()> {
        if self.event_pool_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "event_pool_size must be non-zero".into(),
            ));
        }
        if self.expected_l0_packets_per_event == 0 {
            return Err(crate::Error::InvalidConfig(
                "expected_l0_packets_per_event must be non-zero".into(),
            ));
        }
        if self.l0tp_active && self.l0tp_source_num >= self.num_l0_sources {
            return Err(crate::Error::InvalidConfig(format!(
                "l0tp_source_num {} out of range for {} L0 sources",
                self.l0tp_source_num, self.num_l0_sources
            )));
        }
        Ok(())
    }
}
