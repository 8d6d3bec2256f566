mod bigquery;
mod job;
mod rows;
mod upload;

use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::error::{BqPipeError, Result};
use crate::schema::Schema;
use crate::storage::StorageFile;

pub use bigquery::{BigQueryTable, BigQueryWarehouse};
pub use job::{Job, JobMetadata, JobNotifier, JobOutcome, JobReference, JobStatus};
pub use rows::{decode_row, decode_rows};
pub use upload::UploadChannel;

/// Free-form job parameters, merged over an operation's defaults.
pub type JobParams = Map<String, Value>;

/// A lazily produced sequence of structured records.
pub type RecordStream = BoxStream<'static, Result<Value>>;

/// Raw bytes read from an object.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "projectId": self.project_id,
            "datasetId": self.dataset_id,
            "tableId": self.table_id,
        })
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    #[default]
    WriteTruncate,
    WriteAppend,
    WriteEmpty,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::WriteTruncate => "WRITE_TRUNCATE",
            WriteDisposition::WriteAppend => "WRITE_APPEND",
            WriteDisposition::WriteEmpty => "WRITE_EMPTY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    #[default]
    NewlineDelimitedJson,
    Csv,
    Avro,
    Parquet,
}

/// Load job settings shared by file imports and write streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    pub schema: Schema,
    pub source_format: SourceFormat,
    pub write_disposition: WriteDisposition,
}

impl LoadOptions {
    pub fn truncate(schema: Schema, source_format: SourceFormat) -> Self {
        Self {
            schema,
            source_format,
            write_disposition: WriteDisposition::WriteTruncate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Export encoding. Also decides how an exported file is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    pub format: ExportFormat,
    pub gzip: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Json,
            gzip: true,
        }
    }
}

impl FormatOptions {
    pub fn json(gzip: bool) -> Self {
        Self { format: ExportFormat::Json, gzip }
    }

    pub fn csv(gzip: bool) -> Self {
        Self { format: ExportFormat::Csv, gzip }
    }

    /// The older string form: `JSON` means gzipped JSON, `CSV` means plain CSV.
    pub fn from_format_str(format: &str) -> Result<Self> {
        match format {
            "JSON" => Ok(Self::json(true)),
            "CSV" => Ok(Self::csv(false)),
            other => Err(BqPipeError::InvalidFormat(format!(
                "unsupported export format '{}', expected JSON or CSV",
                other
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match (self.format, self.gzip) {
            (ExportFormat::Json, true) => ".json.gz",
            (ExportFormat::Json, false) => ".json",
            (ExportFormat::Csv, true) => ".csv.gz",
            (ExportFormat::Csv, false) => ".csv",
        }
    }

    pub fn destination_format(&self) -> &'static str {
        match self.format {
            ExportFormat::Json => "NEWLINE_DELIMITED_JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn compression(&self) -> &'static str {
        if self.gzip { "GZIP" } else { "NONE" }
    }
}

/// The immediate result of starting a job: the handle to wait on plus the
/// metadata the API returned with it.
#[derive(Debug)]
pub struct Submission {
    pub job: Job,
    pub metadata: JobMetadata,
}

impl Submission {
    pub fn new(job: Job, metadata: JobMetadata) -> Self {
        Self { job, metadata }
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    fn project_id(&self) -> &str;

    fn table(&self, dataset: &str, table_id: &str) -> Arc<dyn Table>;

    /// Runs a query and returns the raw response once it has finished.
    async fn query(&self, request: JobParams) -> Result<Value>;

    async fn start_query(&self, request: JobParams) -> Result<Submission>;

    /// Creates a table (or view) described by `options`. Completes synchronously.
    async fn create_table(
        &self,
        dataset: &str,
        table_id: &str,
        options: Value,
    ) -> Result<Arc<dyn Table>>;

    async fn create_query_stream(&self, request: JobParams) -> Result<RecordStream>;
}

#[async_trait]
pub trait Table: Send + Sync {
    fn reference(&self) -> &TableReference;

    async fn exists(&self) -> Result<bool>;

    async fn create(&self, schema: &Schema) -> Result<()>;

    async fn delete(&self) -> Result<()>;

    async fn import(&self, file: &dyn StorageFile, options: &LoadOptions) -> Result<Submission>;

    async fn export(&self, file: &dyn StorageFile, options: &FormatOptions) -> Result<Submission>;

    async fn create_write_stream(&self, options: &LoadOptions) -> Result<Box<dyn WriteChannel>>;
}

/// A continuous upload into a table. Dropping it without calling
/// [`WriteChannel::finish`] abandons the upload.
#[async_trait]
pub trait WriteChannel: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Closes the channel and returns the job that the upload created.
    async fn finish(self: Box<Self>) -> Result<JobMetadata>;
}
