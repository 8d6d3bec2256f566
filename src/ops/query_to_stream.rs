use serde_json::Value;
use crate::error::Result;
use crate::executor::BigQuery;
use crate::warehouse::{JobParams, RecordStream};

/// Streams query results straight from the API, without a job or an export.
pub struct QueryToStream {
    client: BigQuery,
}

impl QueryToStream {
    pub fn new(client: BigQuery) -> Self {
        Self { client }
    }

    /// Standard SQL unless the caller says otherwise; the query text always wins.
    pub fn request(&self, query: &str, params: JobParams) -> JobParams {
        let mut request = JobParams::new();
        request.insert("useLegacySql".into(), Value::Bool(false));
        request.extend(params);
        request.insert("query".into(), Value::from(query));
        request
    }

    pub async fn create_read_stream(&self, query: &str, params: JobParams) -> Result<RecordStream> {
        self.client.create_query_stream(self.request(query, params)).await
    }
}
