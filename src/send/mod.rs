// region:    --- Modules

pub mod scheduler;

use tracing::{debug, info};

use crate::error::EncodeError;
use crate::frame::{within_limits, xor_into, Packet, Preamble};
use scheduler::Scheduler;

// endregion: --- Modules

/// Redundancy factor a fresh encoder starts with.
pub const DEFAULT_REDUNDANCY_FACTOR: f64 = 2.0;

/// Splits a payload into fixed size chunks and serves frames for any index.
///
/// Frames are computed on demand from the chunk array and the scheduler, so
/// asking for the same index twice gives byte-identical text.
#[derive(Debug, Clone)]
pub struct Encoder {
    chunk_length: usize,
    redundancy_factor: f64,
    payload: Vec<u8>,
    chunks: Vec<Vec<u8>>,
    scheduler: Scheduler,
}

impl Encoder {
    /// # Errors
    ///
    /// `EncodeError::InvalidLength` when `chunk_length` is zero or does not fit a frame header.
    pub fn new(chunk_length: usize) -> Result<Self, EncodeError> {
        check_chunk_length(chunk_length)?;
        Ok(Self {
            chunk_length,
            redundancy_factor: DEFAULT_REDUNDANCY_FACTOR,
            payload: Vec::new(),
            chunks: Vec::new(),
            scheduler: Scheduler::new(0, DEFAULT_REDUNDANCY_FACTOR),
        })
    }

    /// Takes a new payload and restarts frame generation at index 0.
    ///
    /// On error the previously encoded payload is kept.
    pub fn encode(&mut self, payload: impl AsRef<[u8]>) -> Result<(), EncodeError> {
        let payload = payload.as_ref();
        if payload.is_empty() {
            return Err(EncodeError::EmptyPayload);
        }
        let chunks = split_into_chunks(payload, self.chunk_length)?;
        self.payload = payload.to_vec();
        self.install(chunks);
        info!(
            payload_length = self.payload.len(),
            chunk_length = self.chunk_length,
            chunk_count = self.chunks.len(),
            "payload encoded"
        );
        Ok(())
    }

    /// Number of plain chunks, 0 before any payload.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Frames in one display cycle, `ceil(redundancy_factor * chunk_count)`.
    pub fn frame_count(&self) -> usize {
        self.scheduler.frame_count()
    }

    pub fn chunk_length(&self) -> usize {
        self.chunk_length
    }

    pub fn redundancy_factor(&self) -> f64 {
        self.redundancy_factor
    }

    pub fn payload_length(&self) -> usize {
        self.payload.len()
    }

    /// Text form of frame `frame_index`. Valid for any index once a payload is encoded.
    pub fn get_chunk(&self, frame_index: u64) -> Result<String, EncodeError> {
        Ok(self.packet(frame_index)?.serialize()?)
    }

    /// The frame for `frame_index` before serialisation.
    pub fn packet(&self, frame_index: u64) -> Result<Packet, EncodeError> {
        if self.chunks.is_empty() {
            return Err(EncodeError::NoPayload);
        }
        let indices = self.scheduler.indices(frame_index);

        // -- Body is the XOR of every referenced chunk
        let mut data = vec![0u8; self.chunk_length];
        for &index in &indices {
            xor_into(&mut data, &self.chunks[index]);
        }

        // -- Lengths were bounded by split_into_chunks / check_chunk_length
        let preamble = Preamble {
            total_chunks: self.chunks.len() as u32,
            frame_index,
            payload_length: self.payload.len() as u64,
            chunk_length: self.chunk_length as u32,
            encoded_indices: indices.iter().map(|&i| i as u32).collect(),
        };
        Ok(Packet::new(preamble, data))
    }

    /// Frames of one display cycle, repeated forever. Empty before any payload.
    pub fn frames(&self) -> impl Iterator<Item = Result<String, EncodeError>> + '_ {
        (0..self.frame_count() as u64)
            .cycle()
            .map(move |frame_index| self.get_chunk(frame_index))
    }

    /// Re-chunks the held payload. On error the current chunking is kept.
    pub fn set_chunk_length(&mut self, chunk_length: usize) -> Result<(), EncodeError> {
        check_chunk_length(chunk_length)?;
        if !self.payload.is_empty() {
            let chunks = split_into_chunks(&self.payload, chunk_length)?;
            self.chunk_length = chunk_length;
            self.install(chunks);
        } else {
            self.chunk_length = chunk_length;
        }
        info!(chunk_length, chunk_count = self.chunks.len(), "chunk length changed");
        Ok(())
    }

    /// Only the parity frames beyond `chunk_count()` are affected.
    pub fn set_redundancy_factor(&mut self, redundancy_factor: f64) -> Result<(), EncodeError> {
        if !redundancy_factor.is_finite() || redundancy_factor < 1.0 {
            return Err(EncodeError::InvalidFactor(redundancy_factor));
        }
        self.redundancy_factor = redundancy_factor;
        self.scheduler = Scheduler::new(self.chunks.len(), redundancy_factor);
        info!(redundancy_factor, frame_count = self.frame_count(), "redundancy factor changed");
        Ok(())
    }

    fn install(&mut self, chunks: Vec<Vec<u8>>) {
        self.scheduler = Scheduler::new(chunks.len(), self.redundancy_factor);
        self.chunks = chunks;
        debug!(frame_count = self.frame_count(), "scheduler rebuilt");
    }
}

fn check_chunk_length(chunk_length: usize) -> Result<(), EncodeError> {
    if chunk_length == 0 || u32::try_from(chunk_length).is_err() {
        return Err(EncodeError::InvalidLength(
            i64::try_from(chunk_length).unwrap_or(i64::MAX),
        ));
    }
    Ok(())
}

/// Fixed size chunks, the last one zero padded.
fn split_into_chunks(payload: &[u8], chunk_length: usize) -> Result<Vec<Vec<u8>>, EncodeError> {
    let count = payload.len().div_ceil(chunk_length);
    let fits = match (u32::try_from(count), u32::try_from(chunk_length)) {
        (Ok(count), Ok(chunk_length)) => within_limits(count, chunk_length),
        _ => false,
    };
    if !fits {
        return Err(EncodeError::PayloadTooLarge {
            size: payload.len(),
            chunk_length,
        });
    }
    Ok(payload
        .chunks(chunk_length)
        .map(|chunk| {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_length, 0);
            padded
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_world_splits_into_three_chunks() {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        assert_eq!(encoder.chunk_count(), 3);
        assert_eq!(encoder.chunks[0], b"HELL");
        assert_eq!(encoder.chunks[1], b"O WO");
        assert_eq!(encoder.chunks[2], b"RLD\0");
        assert_eq!(encoder.frame_count(), 6);
    }

    #[test]
    fn plain_frame_carries_its_chunk() {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        let packet = encoder.packet(1).unwrap();
        assert_eq!(packet.preamble.encoded_indices, vec![1]);
        assert_eq!(packet.preamble.total_chunks, 3);
        assert_eq!(packet.preamble.payload_length, 11);
        assert_eq!(packet.data, b"O WO");
    }

    #[test]
    fn parity_frame_is_xor_of_its_chunks() {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        for frame_index in 3..50 {
            let packet = encoder.packet(frame_index).unwrap();
            let mut expected = vec![0u8; 4];
            for &i in &packet.preamble.encoded_indices {
                xor_into(&mut expected, &encoder.chunks[i as usize]);
            }
            assert_eq!(packet.data, expected);
        }
    }

    #[test]
    fn get_chunk_is_idempotent() {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        for frame_index in [0, 2, 3, 10, 1_000_000] {
            assert_eq!(
                encoder.get_chunk(frame_index).unwrap(),
                encoder.get_chunk(frame_index).unwrap()
            );
        }
    }

    #[test]
    fn empty_payload_is_rejected_and_keeps_state() {
        let mut encoder = Encoder::new(4).unwrap();
        assert_eq!(encoder.encode(""), Err(EncodeError::EmptyPayload));
        encoder.encode("HELLO").unwrap();
        assert_eq!(encoder.encode(Vec::<u8>::new()), Err(EncodeError::EmptyPayload));
        assert_eq!(encoder.chunk_count(), 2);
        assert_eq!(encoder.payload_length(), 5);
    }

    #[test]
    fn no_payload_no_frames() {
        let encoder = Encoder::new(4).unwrap();
        assert_eq!(encoder.chunk_count(), 0);
        assert_eq!(encoder.get_chunk(0), Err(EncodeError::NoPayload));
        assert_eq!(encoder.frames().count(), 0);
    }

    #[test]
    fn zero_chunk_length_is_invalid() {
        assert_eq!(Encoder::new(0).unwrap_err(), EncodeError::InvalidLength(0));
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        assert_eq!(
            encoder.set_chunk_length(0).unwrap_err().code(),
            "INVALID_LENGTH"
        );
        assert_eq!(encoder.chunk_length(), 4);
        assert_eq!(encoder.chunk_count(), 3);
    }

    #[test]
    fn set_chunk_length_rechunks_payload() {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        encoder.set_chunk_length(5).unwrap();
        assert_eq!(encoder.chunk_count(), 3);
        encoder.set_chunk_length(11).unwrap();
        assert_eq!(encoder.chunk_count(), 1);
        assert_eq!(encoder.packet(0).unwrap().data, b"HELLO WORLD");
        encoder.set_chunk_length(100).unwrap();
        assert_eq!(encoder.chunk_count(), 1);
        assert_eq!(encoder.packet(0).unwrap().data.len(), 100);
    }

    #[test]
    fn redundancy_factor_below_one_is_invalid() {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        let err = encoder.set_redundancy_factor(0.5).unwrap_err();
        assert_eq!(err, EncodeError::InvalidFactor(0.5));
        assert_eq!(err.code(), "INVALID_FACTOR");
        assert!(encoder.set_redundancy_factor(f64::NAN).is_err());
        assert!(encoder.set_redundancy_factor(f64::INFINITY).is_err());
        assert_eq!(encoder.redundancy_factor(), DEFAULT_REDUNDANCY_FACTOR);
        assert_eq!(encoder.frame_count(), 6);
    }

    #[test]
    fn redundancy_factor_only_changes_cycle_length() {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        let before: Vec<String> = (0..10).map(|i| encoder.get_chunk(i).unwrap()).collect();
        encoder.set_redundancy_factor(3.0).unwrap();
        assert_eq!(encoder.frame_count(), 9);
        let after: Vec<String> = (0..10).map(|i| encoder.get_chunk(i).unwrap()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn frames_cycle_through_frame_count() {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        encoder.set_redundancy_factor(1.0).unwrap();
        let frames: Vec<String> = encoder.frames().take(7).map(Result::unwrap).collect();
        assert_eq!(frames[0], frames[3]);
        assert_eq!(frames[1], frames[4]);
        assert_eq!(frames[0], frames[6]);
        assert_ne!(frames[0], frames[1]);
    }

    #[test]
    fn oversized_payload_is_rejected_and_previous_kept() {
        let mut encoder = Encoder::new(1).unwrap();
        encoder.encode("HELLO").unwrap();
        let too_many_chunks = vec![0u8; crate::frame::MAX_CHUNK_COUNT as usize + 1];
        let err = encoder.encode(&too_many_chunks).unwrap_err();
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");
        assert_eq!(encoder.chunk_count(), 5);
        assert_eq!(encoder.payload_length(), 5);
    }
}
