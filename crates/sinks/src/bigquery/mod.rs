//! BigQuery warehouse
//!
//! Uses the REST API directly: `tables.insert` to provision a
//! destination (409 means it already exists) and `tabledata.insertAll`
//! for streaming inserts. Rows are sent as their JSON form, so flattened
//! `col_*` values travel as ordinary fields and are dropped by BigQuery
//! when the table does not define them and `ignore_unknown_values` is set.
//!
//! # Example
//!
//! ```ignore
//! let warehouse = BigQueryWarehouse::new(&bigquery_config, "my-project")?;
//! let writer = SinkWriter::new(Arc::new(warehouse), "raw");
//! ```

use async_trait::async_trait;
use cdcflow_config::BigQueryConfig;
use cdcflow_protocol::SinkRow;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SinkError;
use crate::retry::with_retry;
use crate::schema::{CLUSTER_COLUMNS, ColumnType, PARTITION_COLUMN, TableSpec};
use crate::warehouse::{InsertOutcome, RowError, Warehouse};

const MAX_ERROR_BODY: usize = 512;

/// Streaming-insert backend for one project
#[derive(Debug)]
pub struct BigQueryWarehouse {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    token: Option<String>,
    skip_invalid_rows: bool,
    ignore_unknown_values: bool,
    retry_attempts: u32,
}

impl BigQueryWarehouse {
    /// Create a backend writing into `project_id`
    pub fn new(config: &BigQueryConfig, project_id: &str) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            token: config.access_token.clone(),
            skip_invalid_rows: config.skip_invalid_rows,
            ignore_unknown_values: config.ignore_unknown_values,
            retry_attempts: config.retry_attempts,
        })
    }

    fn tables_url(&self, spec: &TableSpec) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables",
            self.base_url,
            self.project_id,
            spec.dataset()
        )
    }

    async fn post<T: Serialize>(&self, url: String, body: &T) -> Result<reqwest::Response, SinkError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    async fn create_once(&self, spec: &TableSpec) -> Result<(), SinkError> {
        let body = table_resource(&self.project_id, spec);
        let response = self.post(self.tables_url(spec), &body).await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn insert_once(&self, spec: &TableSpec, rows: &[Value]) -> Result<InsertOutcome, SinkError> {
        let url = format!("{}/{}/insertAll", self.tables_url(spec), spec.table_id());
        let body = InsertAllRequest {
            skip_invalid_rows: self.skip_invalid_rows,
            ignore_unknown_values: self.ignore_unknown_values,
            rows: rows.iter().map(|json| InsertRow { json }).collect(),
        };
        let response = check(self.post(url, &body).await?).await?;
        let parsed: InsertAllResponse = response.json().await?;
        Ok(InsertOutcome {
            rejected: parsed.insert_errors.into_iter().map(InsertError::into_row_error).collect(),
        })
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), SinkError> {
        with_retry("tables.insert", self.retry_attempts, move || self.create_once(spec))
            .await
            .map_err(|e| match e {
                SinkError::Status { status, body } => {
                    SinkError::provision(spec.qualified_name(), format!("{status}: {body}"))
                }
                other => other,
            })
    }

    async fn insert_rows(&self, spec: &TableSpec, rows: &[SinkRow]) -> Result<InsertOutcome, SinkError> {
        let encoded = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let encoded = encoded.as_slice();
        with_retry("insertAll", self.retry_attempts, move || {
            self.insert_once(spec, encoded)
        })
        .await
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    Err(SinkError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Table resource for `tables.insert`
pub(crate) fn table_resource(project_id: &str, spec: &TableSpec) -> Value {
    let fields: Vec<Value> = spec
        .columns()
        .iter()
        .map(|column| {
            serde_json::json!({
                "name": column.name,
                "type": match column.kind {
                    ColumnType::String => "STRING",
                    ColumnType::Timestamp => "TIMESTAMP",
                },
                "mode": if column.nullable { "NULLABLE" } else { "REQUIRED" },
            })
        })
        .collect();

    serde_json::json!({
        "tableReference": {
            "projectId": project_id,
            "datasetId": spec.dataset(),
            "tableId": spec.table_id(),
        },
        "schema": { "fields": fields },
        "timePartitioning": { "type": "DAY", "field": PARTITION_COLUMN },
        "clustering": { "fields": CLUSTER_COLUMNS },
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    skip_invalid_rows: bool,
    ignore_unknown_values: bool,
    rows: Vec<InsertRow<'a>>,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    json: &'a Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertError>,
}

#[derive(Debug, Deserialize)]
struct InsertError {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    message: String,
}

impl InsertError {
    fn into_row_error(self) -> RowError {
        let reason = self
            .errors
            .iter()
            .map(|e| {
                if e.location.is_empty() {
                    format!("{}: {}", e.reason, e.message)
                } else {
                    format!("{} ({}): {}", e.reason, e.location, e.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        RowError::new(self.index, reason)
    }
}

#[cfg(test)]
#[path = "bigquery_test.rs"]
mod bigquery_test;
