use bytes::Bytes;
use futures::future;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use crate::error::{BqPipeError, Result};
use crate::warehouse::{ByteStream, RecordStream};
use super::gunzip::gunzip;
use super::lines::{split_lines, LineStream};

/// Parses each non-blank line as one JSON record. A malformed line ends the
/// stream with [`BqPipeError::Parse`] carrying its line number.
pub fn parse_records(lines: LineStream) -> RecordStream {
    lines
        .try_filter(|line| future::ready(!line.is_blank()))
        .and_then(|line| {
            future::ready(
                serde_json::from_slice::<Value>(&line.bytes).map_err(|source| BqPipeError::Parse {
                    line: line.number,
                    source,
                }),
            )
        })
        .scan(false, |failed, record| {
            if *failed {
                return future::ready(None);
            }
            *failed = record.is_err();
            future::ready(Some(record))
        })
        .boxed()
}

/// Decompress (when `gzip`) → split lines → parse records.
pub fn ndjson_records(input: ByteStream, gzip: bool) -> RecordStream {
    let bytes = if gzip { gunzip(input) } else { input };
    parse_records(split_lines(bytes))
}

/// Serializes one record as a newline-terminated JSON line.
pub fn to_ndjson_line<T: Serialize + ?Sized>(record: &T) -> Result<Bytes> {
    let mut line = serde_json::to_vec(record).map_err(BqPipeError::Serialize)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
