//! Line framing for captured workload output.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::errors::HarnessError;

/// Maximum accepted output line length in bytes.
///
/// Workload output is line-oriented; a line longer than this indicates a
/// runaway stream and aborts capture rather than buffering unbounded.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited UTF-8 decoder over a workload output stream.
///
/// Thin wrapper over [`LinesCodec`] that owns the max-length policy and
/// converts codec failures into [`HarnessError`].
#[derive(Debug)]
pub struct OutputCodec {
    inner: LinesCodec,
}

impl OutputCodec {
    /// Codec with the default maximum line length.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }

    /// Codec with an explicit maximum line length (tests).
    #[must_use]
    pub fn with_max_length(max_bytes: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_bytes),
        }
    }
}

impl Default for OutputCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputCodec {
    type Item = String;
    type Error = HarnessError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, HarnessError> {
        self.inner.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, HarnessError> {
        self.inner.decode_eof(src).map_err(map_codec_error)
    }
}

fn map_codec_error(err: LinesCodecError) -> HarnessError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            HarnessError::Io("workload output line exceeds maximum length".to_owned())
        }
        LinesCodecError::Io(io) => HarnessError::Io(io.to_string()),
    }
}
