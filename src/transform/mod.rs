//! Streaming stages between a stored export and live records.
//!
//! Every stage is a pull-based stream adapter over the one before it, so each
//! chunk flows through the whole chain only when the consumer asks for the
//! next record, and a slow consumer throttles decompression and the download.

mod gunzip;
mod lines;
mod ndjson;

pub use gunzip::gunzip;
pub use lines::{split_lines, Line, LineStream};
pub use ndjson::{ndjson_records, parse_records, to_ndjson_line};
