use serde_json::Value;
use tracing::info;
use crate::error::Result;
use crate::executor::{BigQuery, JobRunner};
use crate::warehouse::{JobMetadata, JobParams, TableReference, WriteDisposition};

/// Runs a query and writes its result into a destination table, replacing
/// whatever the table held.
pub struct QueryToTable {
    client: BigQuery,
    destination: TableReference,
}

impl QueryToTable {
    pub fn new(client: BigQuery, table_name: &str) -> Self {
        let destination = client.table_reference(table_name);
        Self { client, destination }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.destination.dataset_id = dataset.into();
        self
    }

    pub fn destination(&self) -> &TableReference {
        &self.destination
    }

    /// The job request: defaults first, then every caller parameter on top,
    /// so `params` can replace any field including the query text.
    pub fn request(&self, query: &str, params: JobParams) -> JobParams {
        let mut request = JobParams::new();
        request.insert("query".into(), Value::from(query));
        request.insert("useLegacySql".into(), Value::Bool(false));
        request.insert("destinationTable".into(), self.destination.to_value());
        request.insert(
            "writeDisposition".into(),
            Value::from(WriteDisposition::WriteTruncate.as_str()),
        );
        if let Some(tier) = self.client.config().maximum_billing_tier {
            request.insert("maximumBillingTier".into(), Value::from(tier));
        }

        request.extend(params);
        request
    }

    pub async fn run(&self, query: &str, params: JobParams) -> Result<JobMetadata> {
        info!(destination = %self.destination, "Running query into table");
        JobRunner::run(self.client.start_query(self.request(query, params))).await
    }
}
