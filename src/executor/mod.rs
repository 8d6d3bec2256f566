mod client;
mod runner;

pub use client::BigQuery;
pub use runner::JobRunner;
