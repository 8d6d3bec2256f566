use std::sync::Arc;
use tracing::debug;
use crate::error::{BqPipeError, Result};
use crate::executor::BigQuery;
use crate::storage::ObjectStore;
use crate::transform::ndjson_records;
use crate::warehouse::{ExportFormat, JobParams, RecordStream};
use super::query_to_file::QueryToFile;

/// Runs a [`QueryToFile`] and reads the exported file back as a lazy,
/// forward-only sequence of records.
pub struct QueryToFileToStream {
    query_to_file: QueryToFile,
}

impl QueryToFileToStream {
    pub fn create(client: BigQuery, store: Arc<dyn ObjectStore>, base_name: &str) -> Self {
        Self::new(QueryToFile::create(client, store, base_name))
    }

    pub fn new(query_to_file: QueryToFile) -> Self {
        Self { query_to_file }
    }

    pub fn query_to_file(&self) -> &QueryToFile {
        &self.query_to_file
    }

    /// Any failure, before or during streaming, ends the sequence with a
    /// single error.
    pub async fn create_query_stream(&self, query: &str, params: JobParams) -> Result<RecordStream> {
        let format = self.query_to_file.format();
        if format.format != ExportFormat::Json {
            return Err(BqPipeError::InvalidFormat(
                "only JSON exports can be read back as records".into(),
            ));
        }

        let file = self.query_to_file.run(query, params).await?;
        debug!(file = %file.uri(), gzip = format.gzip, "Streaming records from export");

        let bytes = file.open_read().await?;
        Ok(ndjson_records(bytes, format.gzip))
    }
}
