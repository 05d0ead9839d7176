// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scenario tests for the Event/EventPool state machine, driven through
//! the public API rather than `event`'s internal test helpers.

use std::sync::Arc;

use na62_event_builder::config::{Config, Level, SourceTableEntry};
use na62_event_builder::counters::Counters;
use na62_event_builder::event_pool::EventPool;
use na62_event_builder::source_id::SourceIdManager;
use na62_event_builder::MepFragment;

fn config() -> Config {
    Config {
        num_l0_sources: 2,
        num_l1_sources: 1,
        expected_l0_packets_per_event: 3,
        expected_l1_packets_per_event: 1,
        source_id_table: vec![
            SourceTableEntry {
                source_id: 0x10,
                level: Level::L0,
                expected_fragments: 2,
            },
            SourceTableEntry {
                source_id: 0x20,
                level: Level::L0,
                expected_fragments: 1,
            },
            SourceTableEntry {
                source_id: 0x30,
                level: Level::L1,
                expected_fragments: 1,
            },
        ],
        l0tp_active: false,
        l0tp_source_num: 0,
        event_pool_size: 8,
        print_completed_source_ids: false,
    }
}

fn l0_fragment(source_num: usize, source_sub_id: u8, event_number: u32) -> MepFragment {
    MepFragment::new(
        Arc::new(vec![0xAB; 4]),
        0,
        4,
        event_number,
        0,
        source_sub_id,
        source_num,
        Level::L0,
        false,
    )
}

fn l1_fragment(source_num: usize, source_sub_id: u8, event_number: u32) -> MepFragment {
    MepFragment::new(
        Arc::new(vec![0xCD; 4]),
        0,
        4,
        event_number,
        0,
        source_sub_id,
        source_num,
        Level::L1,
        false,
    )
}

#[test]
fn l0_then_l1_full_event_lifecycle() {
    let cfg = config();
    let source_ids = SourceIdManager::new(&cfg).unwrap();
    let pool = EventPool::new(&cfg, &source_ids).unwrap();
    let counters = Counters::new(2, 1);

    let event = pool.get_event(42);
    assert!(!event.add_l0_fragment(l0_fragment(0, 0, 42), 1));
    assert!(!event.add_l0_fragment(l0_fragment(1, 0, 42), 1));
    assert!(event.add_l0_fragment(l0_fragment(0, 1, 42), 1));

    // L1 fragments are gated until the trigger layer calls set_l1_processed.
    assert!(!event.add_l1_fragment(l1_fragment(0, 0, 42), &counters));
    assert_eq!(counters.spurious_l1_frames(), 1);

    event.set_l1_processed();
    assert!(event.add_l1_fragment(l1_fragment(0, 0, 42), &counters));

    pool.free_event(event);
    assert_eq!(event.number_of_l0_fragments(), 0);
    assert!(!event.l1_processed());
}

#[test]
fn unfinished_events_collector_reclaims_stale_bursts() {
    let cfg = config();
    let source_ids = SourceIdManager::new(&cfg).unwrap();
    let pool = EventPool::new(&cfg, &source_ids).unwrap();
    let counters = Counters::new(2, 1);
    let collector = na62_event_builder::collector::UnfinishedEventsCollector::new();

    let event = pool.get_event(7);
    event.add_l0_fragment(l0_fragment(0, 0, 7), 3);
    assert!(event.is_unfinished());

    collector.sweep(&pool, 4, &counters);

    assert!(!pool.get_event(7).is_unfinished());
    assert_eq!(counters.missing_l0_for(0), 1);
    assert_eq!(counters.missing_l0_for(1), 1);
}

#[test]
fn non_zero_suppressed_path_completes_and_handles_duplicates() {
    let cfg = config();
    let source_ids = SourceIdManager::new(&cfg).unwrap();
    let pool = EventPool::new(&cfg, &source_ids).unwrap();
    let counters = Counters::new(2, 1);

    let event = pool.get_event(100);
    event.set_l1_processed();
    event.request_non_zs_data(2);

    assert!(!event.add_l1_fragment(l1_fragment(0, 0x01, 100), &counters));
    assert!(event.add_l1_fragment(l1_fragment(0, 0x02, 100), &counters));

    // Repeating the first crate/cream ID now frees the whole event.
    assert!(!event.add_l1_fragment(l1_fragment(0, 0x01, 100), &counters));
    assert_eq!(counters.spurious_l1_frames(), 1);
    assert!(!event.l1_processed());
}
