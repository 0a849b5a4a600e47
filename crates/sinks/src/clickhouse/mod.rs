//! ClickHouse warehouse
//!
//! Provisions `cdc_<table>` as a MergeTree table partitioned by day and
//! ordered by operation then commit time. Flattened `col_*` values are
//! stored in a single `Map(String, Nullable(String))` column, since the
//! set of source columns is open-ended. Inserts are all-or-nothing, so a
//! ClickHouse batch never reports per-row rejections.
//!
//! # Table
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS raw.cdc_orders (
//!     cdc_table LowCardinality(String),
//!     cdc_operation LowCardinality(String),
//!     cdc_timestamp DateTime64(3, 'UTC'),
//!     before_data Nullable(String),
//!     after_data Nullable(String),
//!     raw_payload Nullable(String),
//!     ingested_at DateTime64(3, 'UTC'),
//!     columns Map(String, Nullable(String))
//! ) ENGINE = MergeTree
//! PARTITION BY toYYYYMMDD(cdc_timestamp)
//! ORDER BY (cdc_operation, cdc_timestamp)
//! ```

mod ddl;
mod row;

use async_trait::async_trait;
use cdcflow_config::ClickHouseConfig;
use cdcflow_protocol::SinkRow;
use clickhouse::Client;
use clickhouse::insert::Insert;

use crate::error::SinkError;
use crate::retry::with_retry;
use crate::schema::TableSpec;
use crate::warehouse::{InsertOutcome, Warehouse};

pub use ddl::create_table_sql;
pub use row::ChangeRow;

/// ClickHouse backend over the HTTP interface
pub struct ClickHouseWarehouse {
    client: Client,
    retry_attempts: u32,
}

impl ClickHouseWarehouse {
    /// Create a backend; the database is taken from each [`TableSpec`]
    pub fn new(config: &ClickHouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_user(&config.username);

        if !config.password.is_empty() {
            client = client.with_password(&config.password);
        }

        Self {
            client,
            retry_attempts: config.retry_attempts,
        }
    }

    async fn create_once(&self, sql: &str) -> Result<(), SinkError> {
        self.client.query(sql).execute().await?;
        Ok(())
    }

    async fn insert_once(&self, table: &str, rows: &[ChangeRow]) -> Result<(), SinkError> {
        let mut insert: Insert<ChangeRow> = self.client.insert(table).await?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await?;
        Ok(())
    }
}

#[async_trait]
impl Warehouse for ClickHouseWarehouse {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), SinkError> {
        let sql = create_table_sql(spec);
        let sql = sql.as_str();
        with_retry("create table", self.retry_attempts, move || self.create_once(sql))
            .await
            .map_err(|e| match e {
                SinkError::ClickHouse(e) => SinkError::provision(spec.qualified_name(), e.to_string()),
                other => other,
            })
    }

    async fn insert_rows(&self, spec: &TableSpec, rows: &[SinkRow]) -> Result<InsertOutcome, SinkError> {
        let converted: Vec<ChangeRow> = rows.iter().map(ChangeRow::from).collect();
        let converted = converted.as_slice();
        let table = spec.qualified_name();
        let table = table.as_str();

        with_retry("insert", self.retry_attempts, move || {
            self.insert_once(table, converted)
        })
        .await?;
        Ok(InsertOutcome::all_written())
    }
}

impl std::fmt::Debug for ClickHouseWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseWarehouse")
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}
