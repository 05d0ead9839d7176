// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Static registry mapping detector `sourceID` <-> dense `sourceNum`.
//!
//! Built once at startup from [`Config::source_id_table`](crate::config::Config)
//! and passed by reference (or inside an `Arc`) to every ingest call -- there
//! is no process-wide singleton here, per the "mutable global state" design
//! note.

use std::collections::HashMap;

use crate::config::{Config, Level, SourceTableEntry};
use crate::{Error, Result};

/// Dense per-level source registry.
#[derive(Debug)]
pub struct SourceIdManager {
    l0: LevelTable,
    l1: LevelTable,
}

#[derive(Debug, Default)]
struct LevelTable {
    id_to_num: HashMap<u8, usize>,
    num_to_id: Vec<u8>,
    expected_fragments: Vec<u8>,
}

impl LevelTable {
    fn push(&mut self, entry: &SourceTableEntry) -> Result<()> {
        if self.id_to_num.contains_key(&entry.source_id) {
            return Err(Error::InvalidConfig(format!(
                "duplicate sourceID 0x{:02x} for this level",
                entry.source_id
            )));
        }
        if entry.expected_fragments == 0 {
            return Err(Error::InvalidConfig(format!(
                "sourceID 0x{:02x} has zero expected_fragments",
                entry.source_id
            )));
        }
        let num = self.num_to_id.len();
        self.id_to_num.insert(entry.source_id, num);
        self.num_to_id.push(entry.source_id);
        self.expected_fragments.push(entry.expected_fragments);
        Ok(())
    }
}

impl SourceIdManager {
    /// Build the registry from `config.source_id_table`.
    pub fn new(config: &Config) -> Result<Self> {
        let mut l0 = LevelTable::default();
        let mut l1 = LevelTable::default();

        for entry in &config.source_id_table {
            match entry.level {
                Level::L0 => l0.push(entry)?,
                Level::L1 => l1.push(entry)?,
            }
        }

        if l0.num_to_id.len() != config.num_l0_sources {
            return Err(Error::InvalidConfig(format!(
                "source_id_table has {} L0 entries, config declares {}",
                l0.num_to_id.len(),
                config.num_l0_sources
            )));
        }
        if l1.num_to_id.len() != config.num_l1_sources {
            return Err(Error::InvalidConfig(format!(
                "source_id_table has {} L1 entries, config declares {}",
                l1.num_to_id.len(),
                config.num_l1_sources
            )));
        }

        Ok(Self { l0, l1 })
    }

    /// Map a wire-level `sourceID` to its dense `sourceNum` at the given level.
    pub fn source_id_to_num(&self, level: Level, source_id: u8) -> Result<usize> {
        let table = self.table(level);
        table.id_to_num.get(&source_id).copied().ok_or_else(|| {
            log::warn!(
                "[source_id] unregistered sourceID 0x{source_id:02x} at level {level:?}"
            );
            Error::UnknownSource(source_id)
        })
    }

    /// Map a dense `sourceNum` back to its wire-level `sourceID`.
    #[must_use]
    pub fn num_to_source_id(&self, level: Level, source_num: usize) -> Option<u8> {
        self.table(level).num_to_id.get(source_num).copied()
    }

    /// Expected fragment count for a `sourceNum` at the given level.
    #[must_use]
    pub fn expected_fragments_for(&self, level: Level, source_num: usize) -> Option<u8> {
        self.table(level)
            .expected_fragments
            .get(source_num)
            .copied()
    }

    /// Number of distinct sources registered at the given level.
    #[must_use]
    pub fn num_sources(&self, level: Level) -> usize {
        self.table(level).num_to_id.len()
    }

    fn table(&self, level: Level) -> &LevelTable {
        match level {
            Level::L0 => &self.l0,
            Level::L1 => &self.l1,
        }
    }
}
