#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::{stream, StreamExt};
use serde_json::Value;
use tokio::sync::Semaphore;

use bqpipe::error::{BqPipeError, ErrorResult, Result};
use bqpipe::schema::Schema;
use bqpipe::storage::{ObjectStore, StorageFile};
use bqpipe::warehouse::{
    ByteStream, FormatOptions, Job, JobMetadata, JobParams, JobReference, LoadOptions,
    RecordStream, Submission, Table, TableReference, Warehouse, WriteChannel,
};
use bqpipe::{BigQuery, WarehouseConfig};

pub const PROJECT: &str = "main_project";
pub const DATASET: &str = "main_dataset";

/// Everything the fake warehouse was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    StartQuery(JobParams),
    Query(JobParams),
    QueryStream(JobParams),
    CreateTable { table: String, options: Value },
    Exists(String),
    Create { table: String, schema: Schema },
    Delete { dataset: String, table: String },
    Import { dataset: String, table: String, uri: String, options: LoadOptions },
    Export { dataset: String, table: String, uri: String, options: FormatOptions },
    OpenWrite { table: String, options: LoadOptions },
    Write { table: String, line: String },
    Finish(String),
}

/// How a scripted job behaves.
#[derive(Debug, Clone)]
pub enum Outcome {
    Complete(JobMetadata),
    Fail(String),
    Rejected(ErrorResult),
    Transport(String),
}

impl Default for Outcome {
    fn default() -> Self {
        Outcome::Complete(done())
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    existing: HashSet<String>,
    query: Outcome,
    import: Outcome,
    export: Outcome,
    delete_error: Option<String>,
    create_table_error: Option<String>,
    fail_write_at: Option<usize>,
    write_gate: Option<Arc<Semaphore>>,
    stream_records: Vec<Value>,
}

#[derive(Clone, Default)]
pub struct FakeWarehouse {
    state: Arc<Mutex<State>>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> BigQuery {
        let config = WarehouseConfig::new(PROJECT, DATASET)
            .with_maximum_billing_tier(3)
            .with_bucket("bucket");
        BigQuery::new(Arc::new(self.clone()), config)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn with_existing(self, table: &str) -> Self {
        self.state.lock().unwrap().existing.insert(table.to_string());
        self
    }

    pub fn with_query(self, outcome: Outcome) -> Self {
        self.state.lock().unwrap().query = outcome;
        self
    }

    pub fn with_import(self, outcome: Outcome) -> Self {
        self.state.lock().unwrap().import = outcome;
        self
    }

    pub fn with_export(self, outcome: Outcome) -> Self {
        self.state.lock().unwrap().export = outcome;
        self
    }

    pub fn with_delete_error(self, message: &str) -> Self {
        self.state.lock().unwrap().delete_error = Some(message.to_string());
        self
    }

    pub fn with_create_table_error(self, message: &str) -> Self {
        self.state.lock().unwrap().create_table_error = Some(message.to_string());
        self
    }

    pub fn with_failing_write(self, index: usize) -> Self {
        self.state.lock().unwrap().fail_write_at = Some(index);
        self
    }

    /// Each write waits for a permit from `gate` before it is accepted.
    pub fn with_write_gate(self, gate: Arc<Semaphore>) -> Self {
        self.state.lock().unwrap().write_gate = Some(gate);
        self
    }

    pub fn with_stream_records(self, records: Vec<Value>) -> Self {
        self.state.lock().unwrap().stream_records = records;
        self
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn fake_table(&self, dataset: &str, table_id: &str) -> FakeTable {
        FakeTable {
            warehouse: self.clone(),
            reference: TableReference::new(PROJECT, dataset, table_id),
        }
    }
}

fn submit(id: &str, outcome: Outcome) -> Result<Submission> {
    match outcome {
        Outcome::Complete(terminal) => Ok(Submission::new(Job::completed(id, terminal), running())),
        Outcome::Fail(message) => Ok(Submission::new(Job::failed(id, message), running())),
        Outcome::Rejected(error) => Ok(Submission::new(
            Job::failed(id, "waited on a rejected job"),
            running().with_error_result(error),
        )),
        Outcome::Transport(message) => Err(BqPipeError::transport("submit", message)),
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    fn project_id(&self) -> &str {
        PROJECT
    }

    fn table(&self, dataset: &str, table_id: &str) -> Arc<dyn Table> {
        Arc::new(self.fake_table(dataset, table_id))
    }

    async fn query(&self, request: JobParams) -> Result<Value> {
        self.record(Call::Query(request));
        Ok(Value::Object(Default::default()))
    }

    async fn start_query(&self, request: JobParams) -> Result<Submission> {
        self.record(Call::StartQuery(request));
        let outcome = self.state.lock().unwrap().query.clone();
        submit("query_job", outcome)
    }

    async fn create_table(
        &self,
        dataset: &str,
        table_id: &str,
        options: Value,
    ) -> Result<Arc<dyn Table>> {
        self.record(Call::CreateTable {
            table: table_id.to_string(),
            options,
        });
        if let Some(message) = self.state.lock().unwrap().create_table_error.clone() {
            return Err(BqPipeError::transport("create_table", message));
        }
        Ok(Arc::new(self.fake_table(dataset, table_id)))
    }

    async fn create_query_stream(&self, request: JobParams) -> Result<RecordStream> {
        self.record(Call::QueryStream(request));
        let records = self.state.lock().unwrap().stream_records.clone();
        Ok(stream::iter(records.into_iter().map(Ok)).boxed())
    }
}

pub struct FakeTable {
    warehouse: FakeWarehouse,
    reference: TableReference,
}

impl FakeTable {
    fn name(&self) -> String {
        self.reference.table_id.clone()
    }

    fn dataset(&self) -> String {
        self.reference.dataset_id.clone()
    }
}

#[async_trait]
impl Table for FakeTable {
    fn reference(&self) -> &TableReference {
        &self.reference
    }

    async fn exists(&self) -> Result<bool> {
        self.warehouse.record(Call::Exists(self.name()));
        Ok(self.warehouse.state.lock().unwrap().existing.contains(&self.reference.table_id))
    }

    async fn create(&self, schema: &Schema) -> Result<()> {
        self.warehouse.record(Call::Create {
            table: self.name(),
            schema: schema.clone(),
        });
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.warehouse.record(Call::Delete {
            dataset: self.dataset(),
            table: self.name(),
        });
        match self.warehouse.state.lock().unwrap().delete_error.clone() {
            Some(message) => Err(BqPipeError::transport("delete_table", message)),
            None => Ok(()),
        }
    }

    async fn import(&self, file: &dyn StorageFile, options: &LoadOptions) -> Result<Submission> {
        self.warehouse.record(Call::Import {
            dataset: self.dataset(),
            table: self.name(),
            uri: file.uri(),
            options: options.clone(),
        });
        let outcome = self.warehouse.state.lock().unwrap().import.clone();
        submit("import_job", outcome)
    }

    async fn export(&self, file: &dyn StorageFile, options: &FormatOptions) -> Result<Submission> {
        self.warehouse.record(Call::Export {
            dataset: self.dataset(),
            table: self.name(),
            uri: file.uri(),
            options: *options,
        });
        let outcome = self.warehouse.state.lock().unwrap().export.clone();
        submit("export_job", outcome)
    }

    async fn create_write_stream(&self, options: &LoadOptions) -> Result<Box<dyn WriteChannel>> {
        self.warehouse.record(Call::OpenWrite {
            table: self.name(),
            options: options.clone(),
        });
        Ok(Box::new(FakeChannel {
            warehouse: self.warehouse.clone(),
            table: self.name(),
            written: 0,
        }))
    }
}

struct FakeChannel {
    warehouse: FakeWarehouse,
    table: String,
    written: usize,
}

#[async_trait]
impl WriteChannel for FakeChannel {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        let gate = self.warehouse.state.lock().unwrap().write_gate.clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.warehouse.state.lock().unwrap().fail_write_at == Some(self.written) {
            return Err(BqPipeError::transport("upload", "connection reset"));
        }

        self.warehouse.record(Call::Write {
            table: self.table.clone(),
            line: String::from_utf8_lossy(&chunk).into_owned(),
        });
        self.written += 1;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<JobMetadata> {
        self.warehouse.record(Call::Finish(self.table.clone()));
        Ok(done().with_reference(JobReference {
            project_id: PROJECT.to_string(),
            job_id: "upload_job".to_string(),
            location: None,
        }))
    }
}

/// In-memory bucket. Reads come back in small chunks so stream stages see
/// records split across chunk boundaries.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    served: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: &str, content: Vec<u8>) {
        self.objects.lock().unwrap().insert(name.to_string(), content);
    }

    /// Chunks handed out by every reader so far.
    pub fn chunks_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

impl ObjectStore for MemoryStore {
    fn file(&self, name: &str) -> Arc<dyn StorageFile> {
        Arc::new(MemoryFile {
            name: name.to_string(),
            objects: self.objects.clone(),
            served: self.served.clone(),
        })
    }
}

pub struct MemoryFile {
    name: String,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    served: Arc<AtomicUsize>,
}

#[async_trait]
impl StorageFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> String {
        format!("gs://bucket/{}", self.name)
    }

    async fn open_read(&self) -> Result<ByteStream> {
        let content = self
            .objects
            .lock()
            .unwrap()
            .get(&self.name)
            .cloned()
            .ok_or_else(|| BqPipeError::transport("open_read", format!("No such object: {}", self.name)))?;

        let chunks: Vec<Result<Bytes>> = content
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let served = self.served.clone();
        Ok(stream::iter(chunks)
            .inspect(move |_| {
                served.fetch_add(1, Ordering::SeqCst);
            })
            .boxed())
    }
}

pub fn running() -> JobMetadata {
    JobMetadata::with_state("RUNNING")
}

pub fn done() -> JobMetadata {
    JobMetadata::with_state("DONE")
}

pub fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

pub fn params(value: Value) -> JobParams {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}
