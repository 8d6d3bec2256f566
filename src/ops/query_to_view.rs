use std::sync::Arc;
use serde_json::{json, Value};
use tracing::info;
use crate::error::Result;
use crate::executor::BigQuery;
use crate::warehouse::{Table, TableReference};

/// Saves a query as a logical view. Creating a view is not a job, so there is
/// nothing to wait on: the call returns once the view exists.
pub struct QueryToView {
    client: BigQuery,
    view_name: String,
    destination: TableReference,
}

impl QueryToView {
    pub fn new(client: BigQuery, view_name: &str) -> Self {
        let destination = client.table_reference(view_name);
        Self {
            client,
            view_name: view_name.to_string(),
            destination,
        }
    }

    pub fn options(&self, query: &str) -> Value {
        view_options(&self.destination, query)
    }

    pub async fn run(&self, query: &str) -> Result<Arc<dyn Table>> {
        info!(view = %self.destination, "Creating view");
        self.client.create_table(&self.view_name, self.options(query)).await
    }
}

/// Table resource for a standard-SQL view over `query`.
pub(crate) fn view_options(destination: &TableReference, query: &str) -> Value {
    json!({
        "id": destination.table_id,
        "kind": "bigquery#table",
        "tableReference": destination.to_value(),
        "view": {
            "query": query,
            "useLegacySql": false,
        },
    })
}
