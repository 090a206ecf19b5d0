//! Chunked body streams over immutable audio.
//!
//! Audio is held in full (`Bytes`) before a response starts, so streaming
//! only bounds the size of each write. Chunks are zero-copy slices of the
//! shared buffer.

use std::convert::Infallible;

use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream;

/// Default chunk size for audio responses.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Split `bytes` into consecutive chunks of at most `chunk_size` bytes.
///
/// An empty buffer yields no chunks.
pub fn chunked(
    bytes: Bytes,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let chunk_size = chunk_size.max(1);
    let len = bytes.len();
    stream::iter(
        (0..len)
            .step_by(chunk_size)
            .map(move |start| Ok(bytes.slice(start..(start + chunk_size).min(len)))),
    )
}
