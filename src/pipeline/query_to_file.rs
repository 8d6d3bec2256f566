use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use crate::error::Result;
use crate::executor::BigQuery;
use crate::ops::{QueryToTable, TableToFile};
use crate::storage::{ObjectStore, StorageFile};
use crate::warehouse::{FormatOptions, JobParams};

/// `tmp_<base>_<epoch millis>`.
pub fn temp_table_name(base_name: &str, at: DateTime<Utc>) -> String {
    format!("tmp_{}_{}", base_name, at.timestamp_millis())
}

/// Query → temporary table → exported file → temporary table dropped.
///
/// The temporary table is only dropped after a successful export. If the
/// query or the export fails, the error is returned as is and the table is
/// left behind.
pub struct QueryToFile {
    client: BigQuery,
    store: Arc<dyn ObjectStore>,
    table_name: String,
    format: FormatOptions,
    filename: Option<String>,
}

impl QueryToFile {
    pub fn create(client: BigQuery, store: Arc<dyn ObjectStore>, base_name: &str) -> Self {
        Self::create_at(client, store, base_name, Utc::now())
    }

    /// Like [`QueryToFile::create`] with the temporary table named after `at`.
    pub fn create_at(
        client: BigQuery,
        store: Arc<dyn ObjectStore>,
        base_name: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            store,
            table_name: temp_table_name(base_name, at),
            format: FormatOptions::default(),
            filename: None,
        }
    }

    pub fn with_format(mut self, format: FormatOptions) -> Self {
        self.format = format;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn format(&self) -> FormatOptions {
        self.format
    }

    pub fn file_name(&self) -> String {
        match &self.filename {
            Some(name) => name.clone(),
            None => format!(
                "{}/{}{}",
                self.client.config().temp_prefix,
                self.table_name,
                self.format.extension()
            ),
        }
    }

    pub async fn run(&self, query: &str, params: JobParams) -> Result<Arc<dyn StorageFile>> {
        let file = self.store.file(&self.file_name());

        QueryToTable::new(self.client.clone(), &self.table_name)
            .run(query, params)
            .await
            .map_err(|e| {
                warn!(table = %self.table_name, "Query failed, temporary table may be left behind");
                e
            })?;
        info!(table = %self.table_name, "Query landed in temporary table");

        TableToFile::create(&self.client, &self.table_name, file.clone())
            .with_options(self.format)
            .run()
            .await
            .map_err(|e| {
                warn!(table = %self.table_name, "Export failed, temporary table left behind");
                e
            })?;
        info!(table = %self.table_name, file = %file.uri(), "Temporary table exported");

        self.client.table(&self.table_name).delete().await?;
        info!(table = %self.table_name, "Temporary table dropped");

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_temp_table_name() {
        let at = Utc.with_ymd_and_hms(2016, 12, 8, 0, 0, 0).unwrap();
        assert_eq!(temp_table_name("base_name", at), "tmp_base_name_1481155200000");
    }
}
