//! In-memory warehouse
//!
//! Records every accepted insert with the (tokio) instant it happened,
//! and can be told to fail or reject rows. Used by tests and for dry
//! runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cdcflow_protocol::SinkRow;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::SinkError;
use crate::schema::TableSpec;
use crate::warehouse::{InsertOutcome, RowError, Warehouse};

type RejectFn = Box<dyn Fn(&SinkRow) -> Option<String> + Send + Sync>;

/// One accepted insert
#[derive(Debug, Clone)]
pub struct WriteRecord {
    /// Source table
    pub table: String,
    /// Rows stored (rejected rows excluded)
    pub rows: Vec<SinkRow>,
    /// When the insert completed
    pub at: Instant,
}

/// Warehouse that keeps rows in memory
#[derive(Default)]
pub struct MemoryWarehouse {
    writes: Mutex<Vec<WriteRecord>>,
    created: Mutex<Vec<String>>,
    create_calls: AtomicU64,
    insert_calls: AtomicU64,
    failures_pending: AtomicU64,
    unavailable: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
    reject: Mutex<Option<RejectFn>>,
}

impl MemoryWarehouse {
    /// Create an empty warehouse
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` inserts with a 503
    pub fn fail_next_inserts(&self, n: u64) {
        self.failures_pending.store(n, Ordering::Relaxed);
    }

    /// Fail every call until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Sleep this long inside every insert
    pub fn set_insert_delay(&self, delay: Duration) {
        *self.insert_delay.lock() = Some(delay);
    }

    /// Reject rows for which `f` returns a reason
    pub fn reject_rows<F>(&self, f: F)
    where
        F: Fn(&SinkRow) -> Option<String> + Send + Sync + 'static,
    {
        *self.reject.lock() = Some(Box::new(f));
    }

    /// Every accepted insert, in order
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    /// Stored rows for a source table, in insertion order
    pub fn rows_for(&self, table: &str) -> Vec<SinkRow> {
        self.writes
            .lock()
            .iter()
            .filter(|w| w.table == table)
            .flat_map(|w| w.rows.iter().cloned())
            .collect()
    }

    /// Stored rows across all tables
    pub fn total_rows(&self) -> usize {
        self.writes.lock().iter().map(|w| w.rows.len()).sum()
    }

    /// Destination tables created, in order
    pub fn created_tables(&self) -> Vec<String> {
        self.created.lock().clone()
    }

    /// Number of `create_table` calls
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::Relaxed)
    }

    /// Number of `insert_rows` calls, including failed ones
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls.load(Ordering::Relaxed)
    }

    fn unavailable_error() -> SinkError {
        SinkError::Status {
            status: 503,
            body: "warehouse unavailable".to_string(),
        }
    }

    fn take_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), SinkError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(Self::unavailable_error());
        }
        let mut created = self.created.lock();
        if !created.iter().any(|t| t == spec.table_id()) {
            created.push(spec.table_id().to_string());
        }
        Ok(())
    }

    async fn insert_rows(&self, spec: &TableSpec, rows: &[SinkRow]) -> Result<InsertOutcome, SinkError> {
        self.insert_calls.fetch_add(1, Ordering::Relaxed);
        let delay = *self.insert_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::Relaxed) || self.take_failure() {
            return Err(Self::unavailable_error());
        }

        let mut stored = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        {
            let reject = self.reject.lock();
            for (index, row) in rows.iter().enumerate() {
                match reject.as_ref().and_then(|f| f(row)) {
                    Some(reason) => rejected.push(RowError::new(index, reason)),
                    None => stored.push(row.clone()),
                }
            }
        }

        self.writes.lock().push(WriteRecord {
            table: spec.source_table().to_string(),
            rows: stored,
            at: Instant::now(),
        });
        Ok(InsertOutcome { rejected })
    }
}

impl std::fmt::Debug for MemoryWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWarehouse")
            .field("writes", &self.writes.lock().len())
            .field("created", &*self.created.lock())
            .finish()
    }
}
