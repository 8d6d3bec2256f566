use std::sync::Arc;
use serde_json::Value;
use tracing::{debug, info};
use crate::config::WarehouseConfig;
use crate::error::Result;
use crate::schema::Schema;
use crate::warehouse::{
    BigQueryWarehouse, JobParams, RecordStream, Submission, Table, TableReference, Warehouse,
};

/// A warehouse handle bound to one dataset. Every operation resolves table
/// names against this dataset unless told otherwise.
#[derive(Clone)]
pub struct BigQuery {
    warehouse: Arc<dyn Warehouse>,
    config: Arc<WarehouseConfig>,
    dataset: String,
}

impl BigQuery {
    /// Binds to the config's default dataset.
    pub fn new(warehouse: Arc<dyn Warehouse>, config: WarehouseConfig) -> Self {
        let dataset = config.dataset.clone();
        Self {
            warehouse,
            config: Arc::new(config),
            dataset,
        }
    }

    pub async fn connect(config: WarehouseConfig) -> Result<Self> {
        config.validate()?;
        let warehouse = BigQueryWarehouse::connect(&config).await?;
        Ok(Self::new(Arc::new(warehouse), config))
    }

    /// Same warehouse, different dataset. `None` keeps the current one.
    pub fn with_dataset(mut self, dataset: Option<&str>) -> Self {
        if let Some(dataset) = dataset {
            self.dataset = dataset.to_string();
        }
        self
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset
    }

    pub fn project_id(&self) -> &str {
        self.warehouse.project_id()
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    pub fn table(&self, table_name: &str) -> Arc<dyn Table> {
        self.warehouse.table(&self.dataset, table_name)
    }

    pub fn table_reference(&self, table_name: &str) -> TableReference {
        TableReference::new(self.project_id(), &self.dataset, table_name)
    }

    pub async fn query(&self, request: JobParams) -> Result<Value> {
        self.warehouse.query(request).await
    }

    pub async fn start_query(&self, request: JobParams) -> Result<Submission> {
        self.warehouse.start_query(request).await
    }

    pub async fn create_query_stream(&self, request: JobParams) -> Result<RecordStream> {
        self.warehouse.create_query_stream(request).await
    }

    pub async fn create_table_if_not_exists(&self, table: &dyn Table, schema: &Schema) -> Result<()> {
        if table.exists().await? {
            debug!(table = %table.reference(), "Table already exists");
            return Ok(());
        }

        info!(table = %table.reference(), "Creating table");
        table.create(schema).await
    }

    pub async fn drop_table_if_exists(&self, table: &dyn Table) -> Result<()> {
        if !table.exists().await? {
            debug!(table = %table.reference(), "Table does not exist, nothing to drop");
            return Ok(());
        }

        info!(table = %table.reference(), "Dropping table");
        table.delete().await
    }

    pub async fn create_table(&self, table_name: &str, options: Value) -> Result<Arc<dyn Table>> {
        self.warehouse
            .create_table(&self.dataset, table_name, options)
            .await
    }
}
