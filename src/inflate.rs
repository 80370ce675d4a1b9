//! Streaming zlib decompression for gateway frames.
//!
//! The gateway compresses the whole connection as one zlib stream and flushes
//! it at message boundaries, each flush ending with [`ZLIB_SUFFIX`]. An
//! [`Inflater`] owns the decompression context for one connection attempt and
//! must be [`reset`](Inflater::reset) before the next one.

use flate2::{Decompress, DecompressError, FlushDecompress, Status};
use log::debug;
use thiserror::Error;

use crate::protocol::ZLIB_SUFFIX;

/// Largest number of bytes buffered while waiting for a flush marker (16 MiB).
pub const MAX_BUFFERED_BYTES: usize = 16 * 1024 * 1024;

/// Errors raised while inflating a frame.
#[derive(Debug, Error)]
pub enum DecompressionError {
    /// The zlib stream is corrupt.
    #[error("zlib stream error: {0}")]
    Zlib(#[from] DecompressError),
    /// Buffered partial frames exceeded [`MAX_BUFFERED_BYTES`].
    #[error("buffered frame data exceeds {max} bytes")]
    Overflow {
        /// Configured buffer limit.
        max: usize,
    },
}

/// How frames that do not end in the flush marker are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameAssembly {
    /// Accumulate bytes across frames until the marker arrives.
    #[default]
    Buffer,
    /// Drop any frame that does not itself end with the marker.
    Discard,
}

/// Returns true if `frame` is at least four bytes long and ends with the
/// zlib flush marker.
///
/// # Examples
///
/// ```
/// use shardwire::inflate::ends_with_flush;
///
/// assert!(ends_with_flush(&[0x78, 0x9c, 0x00, 0x00, 0xff, 0xff]));
/// assert!(!ends_with_flush(&[0x00, 0xff, 0xff]));
/// ```
#[must_use]
pub fn ends_with_flush(frame: &[u8]) -> bool { frame.len() >= 4 && frame.ends_with(&ZLIB_SUFFIX) }

/// Decompression context for one connection attempt.
pub struct Inflater {
    context: Decompress,
    assembly: FrameAssembly,
    buffer: Vec<u8>,
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflater")
            .field("assembly", &self.assembly)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl Default for Inflater {
    fn default() -> Self { Self::new(FrameAssembly::default()) }
}

impl Inflater {
    /// Create a fresh context using `assembly` for partial frames.
    #[must_use]
    pub fn new(assembly: FrameAssembly) -> Self {
        Self {
            context: Decompress::new(true),
            assembly,
            buffer: Vec::new(),
        }
    }

    /// Discard all stream state so the next connection starts a new stream.
    pub fn reset(&mut self) {
        self.context = Decompress::new(true);
        self.buffer.clear();
    }

    /// Number of bytes waiting for a flush marker.
    #[must_use]
    pub fn buffered(&self) -> usize { self.buffer.len() }

    /// Feed one binary frame.
    ///
    /// Returns `Ok(None)` while no complete message is available: the frame
    /// was either buffered or discarded, depending on [`FrameAssembly`].
    /// Frames shorter than the flush marker are dropped in both modes unless
    /// they continue an already buffered message.
    ///
    /// # Errors
    ///
    /// Returns [`DecompressionError`] if the stream is corrupt or buffered
    /// data grows past [`MAX_BUFFERED_BYTES`].
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>, DecompressionError> {
        match self.assembly {
            FrameAssembly::Discard => {
                if !ends_with_flush(frame) {
                    debug!("discarding frame without flush marker: len={}", frame.len());
                    return Ok(None);
                }
                self.inflate(frame).map(Some)
            }
            FrameAssembly::Buffer => {
                if self.buffer.is_empty() {
                    if ends_with_flush(frame) {
                        return self.inflate(frame).map(Some);
                    }
                    if frame.len() < ZLIB_SUFFIX.len() {
                        debug!("ignoring short frame: len={}", frame.len());
                        return Ok(None);
                    }
                }
                if self.buffer.len() + frame.len() > MAX_BUFFERED_BYTES {
                    self.buffer.clear();
                    return Err(DecompressionError::Overflow {
                        max: MAX_BUFFERED_BYTES,
                    });
                }
                self.buffer.extend_from_slice(frame);
                if !ends_with_flush(&self.buffer) {
                    debug!("buffering partial frame: buffered={}", self.buffer.len());
                    return Ok(None);
                }
                let buffered = std::mem::take(&mut self.buffer);
                self.inflate(&buffered).map(Some)
            }
        }
    }

    fn inflate(&mut self, input: &[u8]) -> Result<Vec<u8>, DecompressionError> {
        let mut out = Vec::with_capacity(input.len().saturating_mul(4).max(256));
        let mut offset = 0;
        loop {
            if out.len() == out.capacity() {
                out.reserve(out.capacity());
            }
            let before_in = self.context.total_in();
            let before_out = out.len();
            let status =
                self.context
                    .decompress_vec(&input[offset..], &mut out, FlushDecompress::Sync)?;
            let consumed = self.context.total_in() - before_in;
            offset += usize::try_from(consumed).unwrap_or(usize::MAX);
            let progressed = consumed > 0 || out.len() > before_out;
            let drained = offset >= input.len() && out.len() < out.capacity();
            if matches!(status, Status::StreamEnd) || drained || !progressed {
                break;
            }
        }
        Ok(out)
    }
}
