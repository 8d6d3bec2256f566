use std::io;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::io::StreamReader;
use crate::error::{BqPipeError, Result};
use crate::warehouse::ByteStream;

/// One line of input without its terminator. `number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub bytes: Bytes,
}

impl Line {
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(u8::is_ascii_whitespace)
    }
}

pub type LineStream = BoxStream<'static, Result<Line>>;

/// Splits a byte stream on `\n` (stripping a trailing `\r`). A final line
/// without a terminator is still emitted; an empty tail is not.
pub fn split_lines(input: ByteStream) -> LineStream {
    let reader = StreamReader::new(input.map_err(io::Error::other));
    let codec = AnyDelimiterCodec::new(b"\n".to_vec(), Vec::new());

    FramedRead::new(reader, codec)
        .map_err(codec_error)
        .enumerate()
        .map(|(index, frame)| {
            frame.map(|bytes| Line {
                number: index + 1,
                bytes: without_carriage_return(bytes),
            })
        })
        .boxed()
}

fn without_carriage_return(bytes: Bytes) -> Bytes {
    match bytes.last() {
        Some(b'\r') => bytes.slice(..bytes.len() - 1),
        _ => bytes,
    }
}

/// Unwraps errors raised upstream of the reader back into their own type.
fn codec_error(err: AnyDelimiterCodecError) -> BqPipeError {
    let err = match err {
        AnyDelimiterCodecError::Io(err) => err,
        other => return BqPipeError::Io(io::Error::new(io::ErrorKind::InvalidData, other)),
    };

    let kind = err.kind();
    match err.into_inner() {
        Some(inner) => match inner.downcast::<BqPipeError>() {
            Ok(upstream) => *upstream,
            Err(other) => BqPipeError::Io(io::Error::new(kind, other)),
        },
        None => BqPipeError::Io(kind.into()),
    }
}
