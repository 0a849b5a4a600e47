//! Per-table row buffers
//!
//! [`TableBufferSet`] holds the rows waiting for the warehouse, one
//! [`TableBuffer`] per source table. It is not synchronized itself; the
//! engine keeps it behind a single mutex so that appends and snapshots
//! never interleave. Callers pass `now` explicitly, which keeps every
//! time-dependent decision testable.

use std::collections::BTreeMap;
use std::time::Duration;

use cdcflow_protocol::SinkRow;
use tokio::time::Instant;

/// Rows for one table since its last flush
#[derive(Debug)]
pub struct TableBuffer {
    rows: Vec<SinkRow>,
    created_at: Instant,
}

impl TableBuffer {
    fn new(now: Instant) -> Self {
        Self {
            rows: Vec::new(),
            created_at: now,
        }
    }

    /// Buffered rows in arrival order
    pub fn rows(&self) -> &[SinkRow] {
        &self.rows
    }

    /// Number of buffered rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the buffer holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// When this buffer was created or last cleared
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

/// Rows taken from one table by a snapshot
#[derive(Debug, Clone)]
pub struct TableBatch {
    /// Source table name
    pub table: String,
    /// Rows in arrival order
    pub rows: Vec<SinkRow>,
}

/// Everything that was buffered at the moment of a snapshot
#[derive(Debug, Default)]
pub struct BufferSnapshot {
    /// Non-empty tables, ordered by name
    pub batches: Vec<TableBatch>,
}

impl BufferSnapshot {
    /// Rows across all tables
    pub fn total_rows(&self) -> usize {
        self.batches.iter().map(|b| b.rows.len()).sum()
    }

    /// Whether the snapshot carries no rows
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Mapping from table name to its buffer, plus flush bookkeeping
#[derive(Debug)]
pub struct TableBufferSet {
    tables: BTreeMap<String, TableBuffer>,
    total: usize,
    last_flush: Instant,
}

impl TableBufferSet {
    /// Empty set; `now` counts as the previous flush
    pub fn new(now: Instant) -> Self {
        Self {
            tables: BTreeMap::new(),
            total: 0,
            last_flush: now,
        }
    }

    /// Add a row to its table's buffer, creating the buffer on first use
    ///
    /// Returns the total number of buffered rows after the append.
    pub fn append(&mut self, table: &str, row: SinkRow) -> usize {
        self.append_at(table, row, Instant::now())
    }

    /// [`append`](Self::append) with an explicit clock
    pub fn append_at(&mut self, table: &str, row: SinkRow, now: Instant) -> usize {
        match self.tables.get_mut(table) {
            Some(buffer) => buffer.rows.push(row),
            None => {
                let mut buffer = TableBuffer::new(now);
                buffer.rows.push(row);
                self.tables.insert(table.to_string(), buffer);
            }
        }
        self.total += 1;
        self.total
    }

    /// Take every non-empty table's rows and clear the buffers
    ///
    /// Buffers are kept for reuse with `created_at` reset to `now`, and
    /// `now` becomes the last flush time. No row appended before this call
    /// is missed and no row appears in two snapshots.
    pub fn snapshot_and_clear(&mut self, now: Instant) -> BufferSnapshot {
        let mut batches = Vec::new();
        for (table, buffer) in &mut self.tables {
            if !buffer.rows.is_empty() {
                batches.push(TableBatch {
                    table: table.clone(),
                    rows: std::mem::take(&mut buffer.rows),
                });
            }
            buffer.created_at = now;
        }
        self.total = 0;
        self.last_flush = now;
        BufferSnapshot { batches }
    }

    /// Rows across all tables
    pub fn total_buffered(&self) -> usize {
        self.total
    }

    /// Whether no rows are buffered
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of tables seen so far, including cleared ones
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Buffer for `table`, if it has ever received a row
    pub fn table(&self, table: &str) -> Option<&TableBuffer> {
        self.tables.get(table)
    }

    /// Age of the oldest non-empty buffer
    pub fn oldest_buffer_age(&self, now: Instant) -> Option<Duration> {
        self.tables
            .values()
            .filter(|b| !b.rows.is_empty())
            .map(|b| now.saturating_duration_since(b.created_at))
            .max()
    }

    /// When the previous snapshot was taken
    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    /// Time elapsed since the previous snapshot
    pub fn since_last_flush(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_flush)
    }
}
