//! Error tiers.
//!
//! Configuration errors (`EncodeError`) are reported synchronously and leave the
//! encoder untouched. Scan errors (`FrameError`, `ScanError`) are soft: the
//! receiving loop reports them and keeps scanning.

use thiserror::Error;

/// Encoder configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("cannot encode empty payload")]
    EmptyPayload,

    #[error("invalid chunk length {0}: must be positive")]
    InvalidLength(i64),

    #[error("invalid redundancy factor {0}: must be at least 1.0")]
    InvalidFactor(f64),

    #[error("payload of {size} bytes in chunks of {chunk_length} exceeds the transmission limit")]
    PayloadTooLarge { size: usize, chunk_length: usize },

    #[error("no payload has been encoded yet")]
    NoPayload,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl EncodeError {
    /// Stable code surfaced at the bridge boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPayload => "EMPTY_PAYLOAD",
            Self::InvalidLength(_) => "INVALID_LENGTH",
            Self::InvalidFactor(_) => "INVALID_FACTOR",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::NoPayload => "NO_PAYLOAD",
            Self::Frame(err) => err.code(),
        }
    }
}

/// A frame value that could not be turned into a `Packet`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: {reason}")]
    Malformed { reason: String },

    #[error("checksum mismatch: frame carries {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl FrameError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "MALFORMED",
            Self::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
        }
    }
}

/// Soft failures from `Decoder::decode`. The decoder state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The frame belongs to a different transmission than the one in progress.
    #[error(
        "frame mismatch: expected {expected_chunks} chunks / {expected_length} bytes / \
         chunk length {expected_chunk_length}, got {got_chunks} / {got_length} / {got_chunk_length}"
    )]
    FrameMismatch {
        expected_chunks: u32,
        expected_length: u64,
        expected_chunk_length: u32,
        got_chunks: u32,
        got_length: u64,
        got_chunk_length: u32,
    },
}

impl ScanError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Frame(err) => err.code(),
            Self::FrameMismatch { .. } => "FRAME_MISMATCH",
        }
    }
}

/// Reading the reconstructed payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("transfer incomplete: {resolved} of {total} chunks resolved")]
    Incomplete { resolved: usize, total: usize },

    #[error("payload is not valid UTF-8")]
    NotUtf8,
}

impl DataError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Incomplete { .. } => "INCOMPLETE",
            Self::NotUtf8 => "NOT_UTF8",
        }
    }
}

/// Crate-level error used by the binary and anywhere tiers meet.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("config: {var}: {reason}")]
    Config { var: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        Self::Scan(ScanError::Frame(err))
    }
}
