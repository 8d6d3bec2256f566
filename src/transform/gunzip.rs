use std::io::Write;
use bytes::Bytes;
use flate2::write::MultiGzDecoder;
use futures::{stream, StreamExt};
use tracing::debug;
use crate::error::{BqPipeError, Result};
use crate::warehouse::ByteStream;

struct GunzipState {
    input: ByteStream,
    decoder: Option<MultiGzDecoder<Vec<u8>>>,
    seen_input: bool,
}

/// Decompresses a gzip byte stream chunk by chunk. Concatenated members are
/// decoded in sequence. Corrupt or truncated input ends the stream with
/// [`BqPipeError::Decompress`]. A zero-length input is treated as an empty
/// object and yields nothing.
pub fn gunzip(input: ByteStream) -> ByteStream {
    let state = GunzipState {
        input,
        decoder: Some(MultiGzDecoder::new(Vec::new())),
        seen_input: false,
    };

    stream::try_unfold(state, next_chunk).boxed()
}

async fn next_chunk(mut state: GunzipState) -> Result<Option<(Bytes, GunzipState)>> {
    loop {
        if state.decoder.is_none() {
            return Ok(None);
        }

        match state.input.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                if chunk.is_empty() {
                    continue;
                }
                state.seen_input = true;

                let out = match state.decoder.as_mut() {
                    Some(decoder) => {
                        decoder.write_all(&chunk).map_err(BqPipeError::Decompress)?;
                        decoder.flush().map_err(BqPipeError::Decompress)?;
                        std::mem::take(decoder.get_mut())
                    }
                    None => return Ok(None),
                };

                if !out.is_empty() {
                    return Ok(Some((Bytes::from(out), state)));
                }
            }
            None => {
                let decoder = match state.decoder.take() {
                    Some(decoder) => decoder,
                    None => return Ok(None),
                };
                if !state.seen_input {
                    debug!("Compressed object is empty, nothing to decompress");
                    return Ok(None);
                }

                let rest = decoder.finish().map_err(BqPipeError::Decompress)?;
                if rest.is_empty() {
                    return Ok(None);
                }
                return Ok(Some((Bytes::from(rest), state)));
            }
        }
    }
}
