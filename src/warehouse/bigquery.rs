use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::job::Job as ApiJob;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::table::Table as ApiTable;
use gcp_bigquery_client::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use crate::auth::GoogleAuth;
use crate::config::WarehouseConfig;
use crate::error::{is_not_found, transport_error, BqPipeError, ErrorContext, Result};
use crate::executor::JobRunner;
use crate::schema::{Field, Schema};
use crate::storage::StorageFile;
use super::{
    decode_rows, FormatOptions, Job, JobMetadata, JobNotifier, JobParams, LoadOptions,
    RecordStream, Submission, Table, TableReference, Warehouse, WriteChannel,
};
use super::upload::UploadChannel;

struct Shared {
    client: Client,
    http: reqwest::Client,
    auth: GoogleAuth,
    project_id: String,
    poll_interval: Duration,
    stream_buffer: usize,
}

/// BigQuery over its REST API. Job control, tables and query results go
/// through `gcp_bigquery_client`; media uploads use raw HTTP.
#[derive(Clone)]
pub struct BigQueryWarehouse {
    shared: Arc<Shared>,
}

impl BigQueryWarehouse {
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        let client = Client::from_application_default_credentials()
            .await
            .map_err(|e| transport_error(e, ErrorContext::new().with_operation("client_init")))?;
        let auth = GoogleAuth::detect().await?;

        info!(project = %config.project_id, "Connected to BigQuery");

        Ok(Self {
            shared: Arc::new(Shared {
                client,
                http: reqwest::Client::new(),
                auth,
                project_id: config.project_id.clone(),
                poll_interval: config.job_poll_interval(),
                stream_buffer: config.stream_buffer,
            }),
        })
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    fn project_id(&self) -> &str {
        &self.shared.project_id
    }

    fn table(&self, dataset: &str, table_id: &str) -> Arc<dyn Table> {
        Arc::new(BigQueryTable {
            shared: self.shared.clone(),
            reference: TableReference::new(&self.shared.project_id, dataset, table_id),
        })
    }

    async fn query(&self, request: JobParams) -> Result<Value> {
        let ctx = query_context("query", &request);
        let request: QueryRequest = from_json(Value::Object(request))?;

        let response = self
            .shared
            .client
            .job()
            .query(&self.shared.project_id, request)
            .await
            .map_err(|e| transport_error(e, ctx))?;

        to_json(&response)
    }

    async fn start_query(&self, request: JobParams) -> Result<Submission> {
        let ctx = query_context("start_query", &request);
        let configuration = json!({ "query": Value::Object(request) });
        self.shared.insert_job(configuration, ctx).await
    }

    async fn create_table(
        &self,
        dataset: &str,
        table_id: &str,
        options: Value,
    ) -> Result<Arc<dyn Table>> {
        let table = self.table(dataset, table_id);
        let reference = table.reference();
        let ctx = ErrorContext::new()
            .with_operation("create_table")
            .with_table(&reference.project_id, &reference.dataset_id, &reference.table_id);

        self.shared
            .client
            .table()
            .create(table_resource(reference, options)?)
            .await
            .map_err(|e| transport_error(e, ctx))?;

        info!(table = %reference, "Table created");
        Ok(table)
    }

    async fn create_query_stream(&self, request: JobParams) -> Result<RecordStream> {
        let job = JobRunner::run(self.start_query(request)).await?;
        let reference = job
            .job_reference
            .ok_or_else(|| BqPipeError::transport("query_stream", "query job has no reference"))?;

        debug!(job_id = %reference.job_id, "Paging query results");

        let pages = ResultPages {
            shared: self.shared.clone(),
            job_id: reference.job_id,
            location: reference.location,
            page_token: None,
            fields: None,
            finished: false,
        };

        Ok(stream::try_unfold(pages, next_page)
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok)))
            .try_flatten()
            .boxed())
    }
}

impl Shared {
    async fn insert_job(&self, configuration: Value, ctx: ErrorContext) -> Result<Submission> {
        let job_id = new_job_id();
        let body = json!({
            "jobReference": {
                "projectId": self.project_id,
                "jobId": job_id,
            },
            "configuration": configuration,
        });

        let inserted = self
            .client
            .job()
            .insert(&self.project_id, from_json::<ApiJob>(body)?)
            .await
            .map_err(|e| transport_error(e, ctx))?;

        let metadata: JobMetadata = from_json(to_json(&inserted)?)?;
        let location = metadata
            .job_reference
            .as_ref()
            .and_then(|r| r.location.clone());

        debug!(job_id = %job_id, state = metadata.state().unwrap_or("UNKNOWN"), "Job submitted");

        if metadata.is_done() {
            return Ok(Submission::new(Job::completed(job_id, metadata.clone()), metadata));
        }

        let (job, notifier) = Job::pending(&job_id);
        tokio::spawn(poll_job(
            self.client.clone(),
            self.project_id.clone(),
            location,
            self.poll_interval,
            notifier,
        ));

        Ok(Submission::new(job, metadata))
    }
}

/// Polls a job until it reaches `DONE`, then resolves its notifier. Stops
/// early once nobody is waiting on the job any more.
async fn poll_job(
    client: Client,
    project_id: String,
    location: Option<String>,
    every: Duration,
    notifier: JobNotifier,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        interval.tick().await;

        if notifier.is_abandoned() {
            debug!(job_id = notifier.id(), "Job abandoned, polling stopped");
            return;
        }

        let polled = client
            .job()
            .get_job(&project_id, notifier.id(), location.as_deref())
            .await;

        let job = match polled {
            Ok(job) => job,
            Err(e) => {
                let ctx = ErrorContext::new().with_operation("get_job");
                notifier.fail(transport_error(e, ctx).to_string());
                return;
            }
        };

        match to_json(&job).and_then(from_json::<JobMetadata>) {
            Ok(metadata) if metadata.is_done() => {
                debug!(job_id = notifier.id(), "Job done");
                notifier.complete(metadata);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                notifier.fail(e.to_string());
                return;
            }
        }
    }
}

struct ResultPages {
    shared: Arc<Shared>,
    job_id: String,
    location: Option<String>,
    page_token: Option<String>,
    fields: Option<Vec<Field>>,
    finished: bool,
}

async fn next_page(mut pages: ResultPages) -> Result<Option<(Vec<Value>, ResultPages)>> {
    if pages.finished {
        return Ok(None);
    }

    let mut parameters = Map::new();
    if let Some(location) = &pages.location {
        parameters.insert("location".into(), Value::String(location.clone()));
    }
    if let Some(token) = &pages.page_token {
        parameters.insert("pageToken".into(), Value::String(token.clone()));
    }
    let parameters: GetQueryResultsParameters = from_json(Value::Object(parameters))?;

    let response = pages
        .shared
        .client
        .job()
        .get_query_results(&pages.shared.project_id, &pages.job_id, parameters)
        .await
        .map_err(|e| transport_error(e, ErrorContext::new().with_operation("get_query_results")))?;
    let response = to_json(&response)?;

    if pages.fields.is_none() {
        let schema: Schema = match response.get("schema") {
            Some(schema) => from_json(schema.clone())?,
            None => Schema::new(),
        };
        pages.fields = Some(schema.fields);
    }

    let rows = response
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| decode_rows(pages.fields.as_deref().unwrap_or(&[]), rows))
        .unwrap_or_default();

    pages.page_token = response
        .get("pageToken")
        .and_then(Value::as_str)
        .map(str::to_string);
    pages.finished = pages.page_token.is_none();

    Ok(Some((rows, pages)))
}

/// Table handle. Holds no state of its own beyond the reference.
pub struct BigQueryTable {
    shared: Arc<Shared>,
    reference: TableReference,
}

impl BigQueryTable {
    fn context(&self, operation: &str) -> ErrorContext {
        ErrorContext::new().with_operation(operation).with_table(
            &self.reference.project_id,
            &self.reference.dataset_id,
            &self.reference.table_id,
        )
    }
}

#[async_trait]
impl Table for BigQueryTable {
    fn reference(&self) -> &TableReference {
        &self.reference
    }

    async fn exists(&self) -> Result<bool> {
        let r = &self.reference;
        match self
            .shared
            .client
            .table()
            .get(&r.project_id, &r.dataset_id, &r.table_id, None)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(transport_error(e, self.context("table_exists"))),
        }
    }

    async fn create(&self, schema: &Schema) -> Result<()> {
        let body = json!({
            "tableReference": self.reference.to_value(),
            "schema": to_json(schema)?,
        });

        self.shared
            .client
            .table()
            .create(from_json::<ApiTable>(body)?)
            .await
            .map_err(|e| transport_error(e, self.context("create_table")))?;

        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let r = &self.reference;
        self.shared
            .client
            .table()
            .delete(&r.project_id, &r.dataset_id, &r.table_id)
            .await
            .map_err(|e| transport_error(e, self.context("delete_table")))
    }

    async fn import(&self, file: &dyn StorageFile, options: &LoadOptions) -> Result<Submission> {
        let configuration = json!({ "load": load_configuration(&self.reference, options, Some(file.uri()))? });
        self.shared.insert_job(configuration, self.context("import")).await
    }

    async fn export(&self, file: &dyn StorageFile, options: &FormatOptions) -> Result<Submission> {
        let configuration = json!({
            "extract": {
                "sourceTable": self.reference.to_value(),
                "destinationUris": [file.uri()],
                "destinationFormat": options.destination_format(),
                "compression": options.compression(),
            }
        });
        self.shared.insert_job(configuration, self.context("export")).await
    }

    async fn create_write_stream(&self, options: &LoadOptions) -> Result<Box<dyn WriteChannel>> {
        let configuration = json!({ "load": load_configuration(&self.reference, options, None)? });
        let token = self.shared.auth.bearer_token(crate::auth::BIGQUERY_SCOPE).await?;

        let channel = UploadChannel::start(
            self.shared.http.clone(),
            token,
            &self.shared.project_id,
            json!({
                "jobReference": {
                    "projectId": self.shared.project_id,
                    "jobId": new_job_id(),
                },
                "configuration": configuration,
            }),
            self.shared.stream_buffer,
        )?;

        debug!(table = %self.reference, "Write stream opened");
        Ok(Box::new(channel))
    }
}

fn load_configuration(
    destination: &TableReference,
    options: &LoadOptions,
    source_uri: Option<String>,
) -> Result<Value> {
    let mut load = match to_json(options)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    load.insert("destinationTable".into(), destination.to_value());
    if let Some(uri) = source_uri {
        load.insert("sourceUris".into(), json!([uri]));
    }
    Ok(Value::Object(load))
}

/// Table resource for `tables.insert`. Views carry no schema of their own,
/// so an empty one is filled in when the options leave it out.
fn table_resource(reference: &TableReference, options: Value) -> Result<ApiTable> {
    let mut body = match options {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert("tableReference".into(), reference.to_value());
    body.entry("schema").or_insert_with(|| json!({}));
    from_json(Value::Object(body))
}

fn query_context(operation: &str, request: &JobParams) -> ErrorContext {
    let ctx = ErrorContext::new().with_operation(operation);
    match request.get("query").and_then(Value::as_str) {
        Some(sql) => ctx.with_sql(sql),
        None => ctx,
    }
}

fn new_job_id() -> String {
    format!("bqpipe_{}", uuid::Uuid::new_v4().simple())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map(strip_nulls)
        .map_err(BqPipeError::Serialize)
}

fn from_json<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        warn!("Unexpected API payload: {}", e);
        BqPipeError::Json(e)
    })
}

/// API models serialize unset optionals as `null`; drop them so the local
/// types fall back to their defaults.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}
