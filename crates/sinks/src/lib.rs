//! cdcflow - Sinks
//!
//! Warehouse backends and the writer that lands per-table batches in them.
//!
//! # Architecture
//!
//! The engine hands each table's snapshot to [`SinkWriter`], which
//! resolves `cdc_<table>`, provisions it once, and calls the configured
//! [`Warehouse`].
//!
//! ```text
//! [Engine flush] --(table, rows)--> [SinkWriter] --> [Warehouse] --> [Destination]
//! ```
//!
//! # Available Warehouses
//!
//! | Warehouse | Purpose | Partial failures |
//! |-----------|---------|------------------|
//! | `bigquery` | Streaming inserts | Yes (`insertErrors`) |
//! | `clickhouse` | Analytics database | No (all-or-nothing) |
//! | `stdout` | Debug output | No |
//! | `memory` | Tests and dry runs | Injectable |
//!
//! # Example
//!
//! ```ignore
//! let warehouse = cdcflow_sinks::from_config(&config.pipeline, &config.warehouse)?;
//! let writer = SinkWriter::new(warehouse, &config.pipeline.dataset_id);
//! let outcome = writer.write_batch("orders", &rows).await?;
//! ```

/// BigQuery streaming inserts
pub mod bigquery;

/// ClickHouse over HTTP
pub mod clickhouse;

/// In-memory warehouse for tests
pub mod memory;

/// JSON lines on stdout
pub mod stdout;

mod error;
mod metrics;
mod retry;
mod schema;
mod warehouse;
mod writer;

use std::sync::Arc;

use cdcflow_config::{PipelineConfig, WarehouseConfig};

pub use error::SinkError;
pub use metrics::{SinkWriterMetrics, SinkWriterMetricsHandle};
pub use retry::{RETRY_BASE_DELAY, retry_delay};
pub use schema::{
    AUDIT_COLUMNS, CLUSTER_COLUMNS, Column, ColumnType, PARTITION_COLUMN, TABLE_PREFIX, TableSpec,
};
pub use warehouse::{InsertOutcome, RowError, Warehouse};
pub use writer::{BatchOutcome, SinkWriter};

/// Build the warehouse described by the configuration
pub fn from_config(
    pipeline: &PipelineConfig,
    warehouse: &WarehouseConfig,
) -> Result<Arc<dyn Warehouse>, SinkError> {
    Ok(match warehouse {
        WarehouseConfig::Bigquery(config) => {
            Arc::new(bigquery::BigQueryWarehouse::new(config, &pipeline.project_id)?)
        }
        WarehouseConfig::Clickhouse(config) => Arc::new(clickhouse::ClickHouseWarehouse::new(config)),
        WarehouseConfig::Stdout(config) => Arc::new(stdout::StdoutWarehouse::new(config)),
    })
}

#[cfg(test)]
mod writer_test;
