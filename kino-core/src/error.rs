//! Error types for the Kino decoder stack.
//!
//! Fallible constructors and I/O-facing factories return [`Result`]. The hot
//! decode paths never raise: bit shortfall and malformed data surface as a
//! `None`/`false` result on the decoder APIs, and callers retry once more
//! bytes have arrived.

use thiserror::Error;

/// Main error type shared across the Kino crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Bit buffer errors.
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Container (demuxing) errors.
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Codec (decoding) errors.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O errors from file-backed sources.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameter provided by the caller.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// End of stream reached.
    #[error("End of stream")]
    EndOfStream,
}

/// Bit buffer errors.
#[derive(Error, Debug)]
pub enum BufferError {
    /// Writing into a fixed-memory buffer.
    #[error("Buffer is backed by fixed memory and cannot be written to")]
    FixedMemory,
}

/// Container (program stream) errors.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Pack or system header missing or malformed.
    #[error("Invalid or missing {0} header")]
    InvalidHeader(&'static str),

    /// Requested stream does not exist.
    #[error("Stream {index} not found")]
    StreamNotFound {
        /// Index of the requested stream.
        index: usize,
    },

    /// Seek could not locate a usable packet.
    #[error("Seek failed: {0}")]
    SeekFailed(String),
}

/// Codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Unsupported stream flavor (version, layer, picture type, ...).
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Header field out of its legal range.
    #[error("Invalid {field}: {value}")]
    InvalidField {
        /// Name of the offending header field.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },
}

/// Result type alias using the shared [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Check if this is an end-of-stream error.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}
