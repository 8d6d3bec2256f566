use std::sync::Arc;
use tracing::info;
use crate::error::Result;
use crate::executor::{BigQuery, JobRunner};
use crate::schema::Schema;
use crate::storage::StorageFile;
use crate::warehouse::{JobMetadata, LoadOptions, SourceFormat, Table};

/// Loads a storage object into a table, replacing its contents.
pub struct FileToTable {
    file: Arc<dyn StorageFile>,
    table: Arc<dyn Table>,
    schema: Schema,
    source_format: SourceFormat,
}

impl FileToTable {
    /// Resolves `table_name` against the client's dataset.
    pub fn create(client: &BigQuery, file: Arc<dyn StorageFile>, table_name: &str, schema: Schema) -> Self {
        Self::create_with(file, client.table(table_name), schema)
    }

    pub fn create_with(file: Arc<dyn StorageFile>, table: Arc<dyn Table>, schema: Schema) -> Self {
        Self {
            file,
            table,
            schema,
            source_format: SourceFormat::default(),
        }
    }

    pub fn with_source_format(mut self, source_format: SourceFormat) -> Self {
        self.source_format = source_format;
        self
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::truncate(self.schema.clone(), self.source_format)
    }

    pub async fn run(&self) -> Result<JobMetadata> {
        info!(file = %self.file.uri(), table = %self.table.reference(), "Importing file");
        let options = self.load_options();
        JobRunner::run(self.table.import(self.file.as_ref(), &options)).await
    }
}
