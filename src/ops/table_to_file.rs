use std::sync::Arc;
use tracing::info;
use crate::error::Result;
use crate::executor::{BigQuery, JobRunner};
use crate::storage::StorageFile;
use crate::warehouse::{FormatOptions, JobMetadata, Table};

/// Exports a whole table into one storage object.
pub struct TableToFile {
    table: Arc<dyn Table>,
    file: Arc<dyn StorageFile>,
    options: FormatOptions,
}

impl TableToFile {
    pub fn create(client: &BigQuery, table_name: &str, file: Arc<dyn StorageFile>) -> Self {
        Self::create_with(client.table(table_name), file)
    }

    pub fn create_with(table: Arc<dyn Table>, file: Arc<dyn StorageFile>) -> Self {
        Self {
            table,
            file,
            options: FormatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = options;
        self
    }

    /// `JSON` or `CSV`; see [`FormatOptions::from_format_str`].
    pub fn with_format_str(self, format: &str) -> Result<Self> {
        let options = FormatOptions::from_format_str(format)?;
        Ok(self.with_options(options))
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    pub async fn run(&self) -> Result<JobMetadata> {
        info!(table = %self.table.reference(), file = %self.file.uri(), "Exporting table");
        JobRunner::run(self.table.export(self.file.as_ref(), &self.options)).await
    }
}
