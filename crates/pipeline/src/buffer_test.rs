//! Buffer set tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use cdcflow_protocol::{SinkRow, parse, project};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::buffer::TableBufferSet;

fn row(table: &str, id: u64) -> SinkRow {
    let body = format!(r#"{{"after":{{"id":{id}}},"source":{{"table":"{table}"}},"op":"c"}}"#);
    project(&parse(body.as_bytes()).unwrap(), Utc::now())
}

#[test]
fn test_append_creates_buffers_lazily() {
    let start = Instant::now();
    let mut set = TableBufferSet::new(start);
    assert_eq!(set.table_count(), 0);

    assert_eq!(set.append_at("orders", row("orders", 1), start), 1);
    assert_eq!(set.append_at("users", row("users", 2), start), 2);
    assert_eq!(set.append_at("orders", row("orders", 3), start), 3);

    assert_eq!(set.table_count(), 2);
    assert_eq!(set.total_buffered(), 3);
    assert_eq!(set.table("orders").unwrap().len(), 2);
    assert_eq!(set.table("users").unwrap().len(), 1);
}

#[test]
fn test_snapshot_takes_everything_and_resets() {
    let start = Instant::now();
    let mut set = TableBufferSet::new(start);
    set.append_at("users", row("users", 1), start);
    set.append_at("orders", row("orders", 2), start);
    set.append_at("orders", row("orders", 3), start);

    let later = start + Duration::from_secs(3);
    let snapshot = set.snapshot_and_clear(later);

    assert_eq!(snapshot.total_rows(), 3);
    let tables: Vec<_> = snapshot.batches.iter().map(|b| b.table.as_str()).collect();
    assert_eq!(tables, vec!["orders", "users"]);
    assert_eq!(snapshot.batches[0].rows[0].column("id"), Some(Some("2")));
    assert_eq!(snapshot.batches[0].rows[1].column("id"), Some(Some("3")));

    assert!(set.is_empty());
    assert_eq!(set.total_buffered(), 0);
    assert_eq!(set.last_flush(), later);
    assert_eq!(set.since_last_flush(later), Duration::ZERO);
    // Buffers are cleared, not dropped
    assert_eq!(set.table_count(), 2);
    assert_eq!(set.table("orders").unwrap().created_at(), later);
}

#[test]
fn test_snapshot_of_empty_set() {
    let start = Instant::now();
    let mut set = TableBufferSet::new(start);
    let snapshot = set.snapshot_and_clear(start + Duration::from_secs(1));
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.total_rows(), 0);
}

#[test]
fn test_cleared_tables_are_left_out_of_snapshots() {
    let start = Instant::now();
    let mut set = TableBufferSet::new(start);
    set.append_at("orders", row("orders", 1), start);
    set.snapshot_and_clear(start);

    set.append_at("users", row("users", 2), start);
    let snapshot = set.snapshot_and_clear(start);
    assert_eq!(snapshot.batches.len(), 1);
    assert_eq!(snapshot.batches[0].table, "users");
}

#[test]
fn test_oldest_buffer_age() {
    let start = Instant::now();
    let mut set = TableBufferSet::new(start);
    assert_eq!(set.oldest_buffer_age(start), None);

    set.append_at("orders", row("orders", 1), start);
    set.append_at("users", row("users", 2), start + Duration::from_secs(2));

    let now = start + Duration::from_secs(5);
    assert_eq!(set.oldest_buffer_age(now), Some(Duration::from_secs(5)));
    assert_eq!(set.since_last_flush(now), Duration::from_secs(5));
}

#[test]
fn test_concurrent_appends_and_snapshots_lose_nothing() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 500;

    let set = Arc::new(Mutex::new(TableBufferSet::new(Instant::now())));
    let taken = Arc::new(Mutex::new(Vec::new()));

    let writers: Vec<_> = (0..THREADS)
        .map(|t| {
            let set = Arc::clone(&set);
            std::thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let table = if i % 2 == 0 { "orders" } else { "users" };
                    set.lock().append(table, row(table, t * PER_THREAD + i));
                }
            })
        })
        .collect();

    let snapshotter = {
        let set = Arc::clone(&set);
        let taken = Arc::clone(&taken);
        std::thread::spawn(move || {
            for _ in 0..200 {
                let snapshot = set.lock().snapshot_and_clear(Instant::now());
                taken.lock().push(snapshot);
                std::thread::yield_now();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    snapshotter.join().unwrap();
    let rest = set.lock().snapshot_and_clear(Instant::now());
    taken.lock().push(rest);

    let mut seen = HashSet::new();
    for snapshot in taken.lock().iter() {
        for batch in &snapshot.batches {
            for row in &batch.rows {
                assert_eq!(row.cdc_table, batch.table);
                let id = row.column("id").flatten().unwrap().to_string();
                assert!(seen.insert(id), "row appeared in two snapshots");
            }
        }
    }
    assert_eq!(seen.len() as u64, THREADS * PER_THREAD);
}
