//! Analytics engine for the committee dashboard.
//!
//! Submissions are projected from Sled into an Arrow RecordBatch and registered as
//! the `submissions` table in a DataFusion session; each breakdown is a GROUP BY
//! count ordered by its grouping key.

use arrow::array::{Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use datafusion::error::DataFusionError;
use datafusion::execution::context::SessionContext;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::{Storage, StorageError};

const SEVERITY_SQL: &str = "SELECT severity, COUNT(*) AS total FROM submissions \
     GROUP BY severity ORDER BY severity";
const TRENDS_SQL: &str = "SELECT created_year, created_month, severity, COUNT(*) AS total FROM submissions \
     GROUP BY created_year, created_month, severity \
     ORDER BY created_year, created_month, severity";
const UNIT_SQL: &str = "SELECT unit_id, severity, COUNT(*) AS total FROM submissions \
     GROUP BY unit_id, severity ORDER BY unit_id, severity";
const QUARTER_SQL: &str = "SELECT report_year, report_quarter, severity, COUNT(*) AS total FROM submissions \
     GROUP BY report_year, report_quarter, severity \
     ORDER BY report_year, report_quarter, severity";

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("datafusion error: {0}")]
    DataFusion(#[from] DataFusionError),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("unexpected result column {0}")]
    Column(usize),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct SeverityCount {
    #[serde(rename = "_id")]
    pub severity: String,
    pub count: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct TrendKey {
    pub year: i64,
    pub month: i64,
    pub severity: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct TrendCount {
    #[serde(rename = "_id")]
    pub key: TrendKey,
    pub count: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct UnitKey {
    pub unit: String,
    pub severity: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct UnitCount {
    #[serde(rename = "_id")]
    pub key: UnitKey,
    pub count: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct QuarterKey {
    pub year: String,
    pub quarter: String,
    pub severity: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct QuarterCount {
    #[serde(rename = "_id")]
    pub key: QuarterKey,
    pub count: i64,
}

/// Wraps a DataFusion SessionContext over a snapshot of the submissions.
pub struct QueryEngine {
    ctx: SessionContext,
}

impl QueryEngine {
    /// Snapshot the submissions into Arrow and register them as a table.
    pub async fn new(storage: &Storage) -> Result<Self, AnalyticsError> {
        let ctx = SessionContext::new();
        let batch = storage.project_submissions_to_arrow()?;
        ctx.register_batch("submissions", batch)?;
        Ok(Self { ctx })
    }

    async fn execute_sql(&self, sql: &str) -> Result<Vec<RecordBatch>, AnalyticsError> {
        tracing::debug!(sql, "running analytics query");
        let df = self.ctx.sql(sql).await?;
        Ok(df.collect().await?)
    }

    pub async fn severity_distribution(&self) -> Result<Vec<SeverityCount>, AnalyticsError> {
        let mut out = vec![];
        for batch in self.execute_sql(SEVERITY_SQL).await? {
            let severity = strings(&batch, 0)?;
            let count = ints(&batch, 1)?;
            out.extend(
                severity
                    .into_iter()
                    .zip(count)
                    .map(|(severity, count)| SeverityCount { severity, count }),
            );
        }
        Ok(out)
    }

    /// Counts per (created year, created month, severity).
    pub async fn risk_trends(&self) -> Result<Vec<TrendCount>, AnalyticsError> {
        let mut out = vec![];
        for batch in self.execute_sql(TRENDS_SQL).await? {
            let years = ints(&batch, 0)?;
            let months = ints(&batch, 1)?;
            let severity = strings(&batch, 2)?;
            let count = ints(&batch, 3)?;
            for i in 0..batch.num_rows() {
                out.push(TrendCount {
                    key: TrendKey {
                        year: years[i],
                        month: months[i],
                        severity: severity[i].clone(),
                    },
                    count: count[i],
                });
            }
        }
        Ok(out)
    }

    pub async fn unit_breakdown(&self) -> Result<Vec<UnitCount>, AnalyticsError> {
        let mut out = vec![];
        for batch in self.execute_sql(UNIT_SQL).await? {
            let units = strings(&batch, 0)?;
            let severity = strings(&batch, 1)?;
            let count = ints(&batch, 2)?;
            for i in 0..batch.num_rows() {
                out.push(UnitCount {
                    key: UnitKey {
                        unit: units[i].clone(),
                        severity: severity[i].clone(),
                    },
                    count: count[i],
                });
            }
        }
        Ok(out)
    }

    /// Counts per (report year, quarter, severity).
    pub async fn quarterly_breakdown(&self) -> Result<Vec<QuarterCount>, AnalyticsError> {
        let mut out = vec![];
        for batch in self.execute_sql(QUARTER_SQL).await? {
            let years = strings(&batch, 0)?;
            let quarters = strings(&batch, 1)?;
            let severity = strings(&batch, 2)?;
            let count = ints(&batch, 3)?;
            for i in 0..batch.num_rows() {
                out.push(QuarterCount {
                    key: QuarterKey {
                        year: years[i].clone(),
                        quarter: quarters[i].clone(),
                        severity: severity[i].clone(),
                    },
                    count: count[i],
                });
            }
        }
        Ok(out)
    }
}

fn strings(batch: &RecordBatch, idx: usize) -> Result<Vec<String>, AnalyticsError> {
    let column = cast(batch.column(idx).as_ref(), &DataType::Utf8)?;
    let values = column
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or(AnalyticsError::Column(idx))?;
    Ok((0..values.len()).map(|i| values.value(i).to_string()).collect())
}

fn ints(batch: &RecordBatch, idx: usize) -> Result<Vec<i64>, AnalyticsError> {
    let column = cast(batch.column(idx).as_ref(), &DataType::Int64)?;
    let values = column
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or(AnalyticsError::Column(idx))?;
    Ok((0..values.len()).map(|i| values.value(i)).collect())
}
