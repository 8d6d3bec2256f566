use clap::{Parser, Subcommand, ValueEnum};
use futures::{StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bqpipe::storage::GcsStore;
use bqpipe::transform::{parse_records, split_lines};
use bqpipe::warehouse::ByteStream;
use bqpipe::{
    BigQuery, BqPipeError, FileToTable, FormatOptions, JobParams, ObjectStore, QueryToFile,
    QueryToFileToStream, QueryToStream, QueryToTable, QueryToView, RecordStream, Schema,
    StreamToTable, TableToFile, WarehouseConfig,
};

#[derive(Parser)]
#[command(name = "bqpipe")]
#[command(about = "BigQuery job orchestration: queries, tables, exports and streams")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a YAML config file
    #[arg(short, long, env = "BQPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// GCP project ID
    #[arg(short, long, env = "GCP_PROJECT_ID")]
    project: Option<String>,

    /// Default dataset
    #[arg(short, long, env = "BQPIPE_DATASET")]
    dataset: Option<String>,

    /// Bucket used for exports and imports
    #[arg(short, long, env = "BQPIPE_BUCKET")]
    bucket: Option<String>,

    /// Billing tier cap applied to query jobs
    #[arg(long, env = "BQPIPE_MAX_BILLING_TIER")]
    max_billing_tier: Option<u32>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(clap::Args)]
struct QueryArgs {
    /// SQL text
    #[arg(long, conflicts_with = "sql_file")]
    sql: Option<String>,

    /// File containing the SQL
    #[arg(long)]
    sql_file: Option<PathBuf>,

    /// Extra job parameters as a JSON object, merged over the defaults
    #[arg(long)]
    params: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query into a table, replacing its contents
    QueryToTable {
        #[command(flatten)]
        query: QueryArgs,

        /// Destination table
        #[arg(short, long)]
        table: String,
    },

    /// Run a query and export the result to a file in the bucket
    QueryToFile {
        #[command(flatten)]
        query: QueryArgs,

        /// Base name for the temporary table
        #[arg(short, long)]
        name: String,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Write the export uncompressed
        #[arg(long)]
        no_gzip: bool,

        /// Object name, instead of one derived from the temporary table
        #[arg(long)]
        filename: Option<String>,
    },

    /// Create a view from a query
    QueryToView {
        #[command(flatten)]
        query: QueryArgs,

        /// View name
        #[arg(long)]
        view: String,
    },

    /// Export a table to a file in the bucket
    TableToFile {
        #[arg(short, long)]
        table: String,

        /// Object name in the bucket
        #[arg(short, long)]
        file: String,

        /// JSON (gzipped) or CSV
        #[arg(long, default_value = "JSON")]
        format: String,
    },

    /// Load a file from the bucket into a table, replacing its contents
    FileToTable {
        /// Object name in the bucket
        #[arg(short, long)]
        file: String,

        #[arg(short, long)]
        table: String,

        /// Path to the table schema (YAML)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Upload newline-delimited JSON from stdin into a table
    StreamToTable {
        #[arg(short, long)]
        table: String,

        /// Path to the table schema (YAML)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Run a query through a temporary export and print each record
    Query {
        #[command(flatten)]
        query: QueryArgs,

        /// Base name for the temporary table
        #[arg(short, long, default_value = "query")]
        name: String,
    },

    /// Run a query and print each record straight from the result pages
    QueryStream {
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("bqpipe=debug,info")
    } else {
        EnvFilter::new("bqpipe=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: &BqPipeError) {
    eprintln!("\x1b[31m✗ Error:\x1b[0m {}", err);
    if let Some(result) = err.error_result() {
        if let Some(reason) = &result.reason {
            eprintln!("  reason: {} ({:?} phase)", reason, err.phase());
        }
    }
}

async fn run(cli: Cli) -> Result<(), BqPipeError> {
    let config = build_config(&cli)?;
    let client = BigQuery::connect(config.clone()).await?;

    match cli.command {
        Commands::QueryToTable { query, table } => {
            let (sql, params) = query.resolve()?;
            let job = QueryToTable::new(client, &table).run(&sql, params).await?;
            println!("✓ Query written to {} (job {})", table, job.job_id().unwrap_or("-"));
        }

        Commands::QueryToFile { query, name, format, no_gzip, filename } => {
            let (sql, params) = query.resolve()?;
            let options = match format {
                OutputFormat::Json => FormatOptions::json(!no_gzip),
                OutputFormat::Csv => FormatOptions::csv(!no_gzip),
            };

            let mut op = QueryToFile::create(client, store(&config).await?, &name).with_format(options);
            if let Some(filename) = filename {
                op = op.with_filename(filename);
            }

            let file = op.run(&sql, params).await?;
            println!("✓ Exported to {}", file.uri());
        }

        Commands::QueryToView { query, view } => {
            let (sql, _) = query.resolve()?;
            let table = QueryToView::new(client, &view).run(&sql).await?;
            println!("✓ View {} created", table.reference());
        }

        Commands::TableToFile { table, file, format } => {
            let file = store(&config).await?.file(&file);
            TableToFile::create(&client, &table, file.clone())
                .with_format_str(&format)?
                .run()
                .await?;
            println!("✓ Exported {} to {}", table, file.uri());
        }

        Commands::FileToTable { file, table, schema } => {
            let schema = Schema::load(&schema)?;
            let file = store(&config).await?.file(&file);
            FileToTable::create(&client, file.clone(), &table, schema).run().await?;
            println!("✓ Loaded {} into {}", file.uri(), table);
        }

        Commands::StreamToTable { table, schema } => {
            let schema = Schema::load(&schema)?;
            let records = parse_records(split_lines(stdin_bytes()));
            let job = StreamToTable::create(&client, &table, schema)
                .save_stream(records)
                .await?;
            println!("✓ Streamed into {} (job {})", table, job.job_id().unwrap_or("-"));
        }

        Commands::Query { query, name } => {
            let (sql, params) = query.resolve()?;
            let op = QueryToFileToStream::create(client, store(&config).await?, &name);
            let records = op.create_query_stream(&sql, params).await?;
            print_records(records).await?;
        }

        Commands::QueryStream { query } => {
            let (sql, params) = query.resolve()?;
            let records = QueryToStream::new(client).create_read_stream(&sql, params).await?;
            print_records(records).await?;
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<WarehouseConfig, BqPipeError> {
    let mut config = match &cli.config {
        Some(path) => WarehouseConfig::load(path)?,
        None => {
            let project = cli.project.clone().ok_or_else(|| {
                BqPipeError::Config("--project or GCP_PROJECT_ID is required".into())
            })?;
            let dataset = cli.dataset.clone().ok_or_else(|| {
                BqPipeError::Config("--dataset or BQPIPE_DATASET is required".into())
            })?;
            WarehouseConfig::new(project, dataset)
        }
    };

    if let Some(project) = &cli.project {
        config.project_id = project.clone();
    }
    if let Some(dataset) = &cli.dataset {
        config.dataset = dataset.clone();
    }
    if let Some(bucket) = &cli.bucket {
        config = config.with_bucket(bucket.clone());
    }
    if let Some(tier) = cli.max_billing_tier {
        config = config.with_maximum_billing_tier(tier);
    }

    config.validate()?;
    Ok(config)
}

async fn store(config: &WarehouseConfig) -> Result<Arc<dyn ObjectStore>, BqPipeError> {
    let bucket = config.require_bucket()?;
    info!(bucket = %bucket, "Using bucket");
    Ok(Arc::new(GcsStore::connect(bucket).await?))
}

impl QueryArgs {
    fn resolve(self) -> Result<(String, JobParams), BqPipeError> {
        let sql = match (self.sql, self.sql_file) {
            (Some(sql), _) => sql,
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(BqPipeError::Config("either --sql or --sql-file is required".into()))
            }
        };

        let params = match self.params {
            Some(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => return Err(BqPipeError::Config("--params must be a JSON object".into())),
            },
            None => Map::new(),
        };

        Ok((sql, params))
    }
}

fn stdin_bytes() -> ByteStream {
    ReaderStream::new(tokio::io::stdin())
        .map_err(BqPipeError::Io)
        .boxed()
}

async fn print_records(mut records: RecordStream) -> Result<(), BqPipeError> {
    let mut stdout = tokio::io::stdout();

    let mut count = 0usize;
    while let Some(record) = records.next().await {
        let mut line = serde_json::to_vec(&record?)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        count += 1;
    }
    stdout.flush().await?;

    info!(records = count, "Done");
    Ok(())
}
