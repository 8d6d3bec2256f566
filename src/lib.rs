pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod ops;
pub mod pipeline;
pub mod schema;
pub mod storage;
pub mod transform;
pub mod warehouse;

pub use config::WarehouseConfig;
pub use error::{BqPipeError, ErrorResult, FailurePhase, Result};
pub use executor::{BigQuery, JobRunner};
pub use ops::{FileToTable, QueryToStream, QueryToTable, QueryToView, StreamToTable, TableToFile};
pub use pipeline::{QueryToFile, QueryToFileToStream};
pub use schema::{BqType, Field, FieldMode, Schema};
pub use storage::{GcsStore, ObjectStore, StorageFile};
pub use warehouse::{
    ExportFormat, FormatOptions, Job, JobMetadata, JobOutcome, JobParams, LoadOptions,
    RecordStream, SourceFormat, Submission, Table, TableReference, Warehouse, WriteChannel,
};
