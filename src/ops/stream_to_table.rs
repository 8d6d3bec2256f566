use std::sync::Arc;
use futures::{pin_mut, Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, info};
use crate::error::Result;
use crate::executor::BigQuery;
use crate::schema::Schema;
use crate::transform::to_ndjson_line;
use crate::warehouse::{JobMetadata, LoadOptions, SourceFormat, Table};

/// Pipes records into a table through the table's write channel: records →
/// NDJSON lines → upload. The table's previous contents are replaced.
pub struct StreamToTable {
    table: Arc<dyn Table>,
    schema: Schema,
}

impl StreamToTable {
    pub fn create(client: &BigQuery, table_name: &str, schema: Schema) -> Self {
        Self::create_with(client.table(table_name), schema)
    }

    pub fn create_with(table: Arc<dyn Table>, schema: Schema) -> Self {
        Self { table, schema }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::truncate(self.schema.clone(), SourceFormat::NewlineDelimitedJson)
    }

    /// Resolves with the write channel's completion payload once every record
    /// has been written. The first failure from the source, from serializing a
    /// record, or from the channel abandons the upload and is returned as is.
    pub async fn save_stream<S, T>(&self, records: S) -> Result<JobMetadata>
    where
        S: Stream<Item = Result<T>> + Send,
        T: Serialize,
    {
        let mut channel = self.table.create_write_stream(&self.load_options()).await?;

        let lines = records.map(|record| record.and_then(|r| to_ndjson_line(&r)));
        pin_mut!(lines);

        let mut written = 0usize;
        while let Some(line) = lines.next().await {
            channel.write(line?).await?;
            written += 1;
        }

        debug!(table = %self.table.reference(), rows = written, "Closing write channel");
        let job = channel.finish().await?;

        info!(table = %self.table.reference(), rows = written, "Stream saved");
        Ok(job)
    }
}
