//! Stdout warehouse - rows as JSON lines for local debugging
//!
//! Each row is printed as the destination table followed by the row's
//! JSON form. Not intended for production use.
//!
//! # Example Output
//!
//! ```text
//! raw.cdc_orders {"cdc_table":"orders","cdc_operation":"INSERT","cdc_timestamp":"2023-11-14T22:13:20.000Z",...}
//! raw.cdc_orders {"cdc_table":"orders","cdc_operation":"DELETE","cdc_timestamp":"2023-11-14T22:13:21.000Z",...}
//! ```

use std::io::{self, Write};

use async_trait::async_trait;
use cdcflow_config::StdoutConfig;
use cdcflow_protocol::SinkRow;
use owo_colors::{OwoColorize, Style};
use parking_lot::Mutex;

use crate::error::SinkError;
use crate::schema::TableSpec;
use crate::warehouse::{InsertOutcome, Warehouse};

/// Color styles for terminal output
struct Styles {
    table: Style,
    delete: Style,
}

impl Styles {
    fn new(enabled: bool) -> Self {
        if enabled {
            Self {
                table: Style::new().cyan(),
                delete: Style::new().red(),
            }
        } else {
            Self {
                table: Style::new(),
                delete: Style::new(),
            }
        }
    }
}

/// Warehouse that prints rows instead of storing them
pub struct StdoutWarehouse {
    out: Mutex<Box<dyn Write + Send>>,
    styles: Styles,
}

impl StdoutWarehouse {
    /// Print to stdout
    pub fn new(config: &StdoutConfig) -> Self {
        Self::with_writer(config, Box::new(io::stdout()))
    }

    /// Print to any writer
    pub fn with_writer(config: &StdoutConfig, out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            styles: Styles::new(config.color),
        }
    }
}

#[async_trait]
impl Warehouse for StdoutWarehouse {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn create_table(&self, _spec: &TableSpec) -> Result<(), SinkError> {
        Ok(())
    }

    async fn insert_rows(&self, spec: &TableSpec, rows: &[SinkRow]) -> Result<InsertOutcome, SinkError> {
        let table = spec.qualified_name();
        let mut buf = Vec::with_capacity(rows.len() * 256);
        for row in rows {
            let style = if row.cdc_operation == "DELETE" {
                self.styles.delete
            } else {
                self.styles.table
            };
            write!(buf, "{} ", table.style(style))?;
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }

        let mut out = self.out.lock();
        out.write_all(&buf)?;
        out.flush()?;
        Ok(InsertOutcome::all_written())
    }
}

impl std::fmt::Debug for StdoutWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdoutWarehouse").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcflow_protocol::{parse, project};
    use chrono::Utc;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn row(body: &[u8]) -> SinkRow {
        project(&parse(body).unwrap(), Utc::now())
    }

    #[tokio::test]
    async fn test_prints_one_line_per_row() {
        let buf = SharedBuf::default();
        let warehouse = StdoutWarehouse::with_writer(&StdoutConfig::default(), Box::new(buf.clone()));
        let spec = TableSpec::new("raw", "orders").unwrap();
        let rows = [
            row(br#"{"op":"c","source":{"table":"orders"},"after":{"id":1}}"#),
            row(br#"{"op":"d","source":{"table":"orders"},"before":{"id":1}}"#),
        ];

        let outcome = warehouse.insert_rows(&spec, &rows).await.unwrap();
        assert!(outcome.rejected.is_empty());

        let output = String::from_utf8(buf.0.lock().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let (table, json) = line.split_once(' ').unwrap();
            assert_eq!(table, "raw.cdc_orders");
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            assert_eq!(value["cdc_table"], "orders");
        }
        assert!(lines[1].contains(r#""cdc_operation":"DELETE""#));
    }

    #[tokio::test]
    async fn test_color_wraps_table_prefix() {
        let buf = SharedBuf::default();
        let config = StdoutConfig { color: true };
        let warehouse = StdoutWarehouse::with_writer(&config, Box::new(buf.clone()));
        let spec = TableSpec::new("raw", "orders").unwrap();
        let rows = [row(br#"{"op":"c","after":{"id":1}}"#)];

        warehouse.insert_rows(&spec, &rows).await.unwrap();
        let output = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert!(output.starts_with('\u{1b}'));
        assert!(output.contains("raw.cdc_orders"));
    }
}
