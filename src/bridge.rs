//! Calling convention for the host bridge.
//!
//! Host runtimes pass plain integers and strings and cannot catch Rust errors.
//! Scan failures come back as `Some(message)` from `SharedDecoder::decode`
//! instead of an error, so a scan loop keeps going. Configuration failures are
//! still returned as `BridgeError`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::error::{DataError, EncodeError};
use crate::recv::Decoder;
use crate::send::Encoder;

/// Error surfaced to the host as `CODE: message`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct BridgeError {
    pub code: &'static str,
    pub message: String,
}

impl From<EncodeError> for BridgeError {
    fn from(err: EncodeError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<DataError> for BridgeError {
    fn from(err: DataError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

// region:    --- Encoder

#[derive(Debug, Clone)]
pub struct BridgeEncoder {
    inner: Encoder,
}

impl BridgeEncoder {
    pub fn new(chunk_length: i64) -> Result<Self, BridgeError> {
        Ok(Self {
            inner: Encoder::new(to_chunk_length(chunk_length)?)?,
        })
    }

    /// Accepts text or bytes.
    pub fn encode(&mut self, data: impl AsRef<[u8]>) -> Result<(), BridgeError> {
        Ok(self.inner.encode(data)?)
    }

    pub fn chunk_count(&self) -> i64 {
        self.inner.chunk_count() as i64
    }

    pub fn frame_count(&self) -> i64 {
        self.inner.frame_count() as i64
    }

    /// Empty string for a negative index or before anything was encoded.
    pub fn get_chunk(&self, frame_index: i64) -> String {
        u64::try_from(frame_index)
            .ok()
            .and_then(|index| self.inner.get_chunk(index).ok())
            .unwrap_or_default()
    }

    pub fn set_chunk_length(&mut self, chunk_length: i64) -> Result<(), BridgeError> {
        Ok(self.inner.set_chunk_length(to_chunk_length(chunk_length)?)?)
    }

    pub fn set_redundancy_factor(&mut self, redundancy_factor: f64) -> Result<(), BridgeError> {
        Ok(self.inner.set_redundancy_factor(redundancy_factor)?)
    }
}

fn to_chunk_length(chunk_length: i64) -> Result<usize, EncodeError> {
    match usize::try_from(chunk_length) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(EncodeError::InvalidLength(chunk_length)),
    }
}

// endregion: --- Encoder

// region:    --- Decoder

/// Decoder handle that can be cloned across threads.
///
/// One mutex guards the whole decoder: `decode` excludes itself and every
/// accessor, accessors run freely between decode calls.
#[derive(Debug, Clone, Default)]
pub struct SharedDecoder {
    inner: Arc<Mutex<Decoder>>,
}

impl SharedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Decoder> {
        // -- every decode call leaves the state consistent, a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` when the frame was taken, `Some(CODE: message)` on a soft failure.
    pub fn decode(&self, frame: &str) -> Option<String> {
        self.lock()
            .decode(frame)
            .err()
            .map(|err| format!("{}: {err}", err.code()))
    }

    pub fn decode_bytes(&self, frame: &[u8]) -> Option<String> {
        self.lock()
            .decode_bytes(frame)
            .err()
            .map(|err| format!("{}: {err}", err.code()))
    }

    pub fn is_completed(&self) -> bool {
        self.lock().is_completed()
    }

    /// Payload text, empty until complete. Binary payloads are decoded lossily.
    pub fn data(&self) -> String {
        self.lock()
            .data_bytes()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    /// Payload bytes, empty until complete.
    pub fn data_bytes(&self) -> Vec<u8> {
        self.lock()
            .data_bytes()
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    /// Strict variant of `data_bytes` for callers that need the reason.
    pub fn try_data_bytes(&self) -> Result<Vec<u8>, BridgeError> {
        Ok(self.lock().data_bytes()?.to_vec())
    }

    /// Whole percent, truncated.
    pub fn progress(&self) -> i64 {
        i64::from(self.lock().progress())
    }

    /// Chunks per second.
    pub fn speed(&self) -> f64 {
        self.lock().speed()
    }

    pub fn total_time_ms(&self) -> i64 {
        self.lock().total_time().as_millis() as i64
    }

    pub fn read_interval_ms(&self) -> i64 {
        self.lock().read_interval().as_millis() as i64
    }

    pub fn total_size(&self) -> i64 {
        self.lock().total_size() as i64
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    /// Runs `f` with the decoder locked, for reads the flat API does not cover.
    pub fn with<R>(&self, f: impl FnOnce(&Decoder) -> R) -> R {
        f(&self.lock())
    }
}

// endregion: --- Decoder

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_lengths_are_invalid() {
        assert_eq!(BridgeEncoder::new(-4).unwrap_err().code, "INVALID_LENGTH");
        assert_eq!(BridgeEncoder::new(0).unwrap_err().code, "INVALID_LENGTH");
        let mut encoder = BridgeEncoder::new(4).unwrap();
        let err = encoder.set_chunk_length(-1).unwrap_err();
        assert_eq!(err.to_string(), "INVALID_LENGTH: invalid chunk length -1: must be positive");
    }

    #[test]
    fn get_chunk_out_of_range_is_empty() {
        let mut encoder = BridgeEncoder::new(4).unwrap();
        assert_eq!(encoder.get_chunk(0), "");
        encoder.encode("HELLO WORLD").unwrap();
        assert_eq!(encoder.get_chunk(-1), "");
        assert!(!encoder.get_chunk(0).is_empty());
        assert_eq!(encoder.chunk_count(), 3);
        assert_eq!(encoder.frame_count(), 6);
    }

    #[test]
    fn soft_errors_are_values() {
        let decoder = SharedDecoder::new();
        let message = decoder.decode("definitely not a frame").unwrap();
        assert!(message.starts_with("MALFORMED: "), "{message}");
        assert_eq!(decoder.data(), "");
        assert!(decoder.data_bytes().is_empty());
        assert_eq!(decoder.try_data_bytes().unwrap_err().code, "INCOMPLETE");
    }
}
