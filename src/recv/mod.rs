// region:    --- Modules

pub mod models;
mod peeling;

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{DataError, ScanError};
use crate::frame::Packet;
pub use models::{FrameOutcome, ScanStats};
use peeling::{Absorbed, Transmission};

// endregion: --- Modules

/// Reassembles a payload from frames scanned in any order.
///
/// `Empty` until the first valid frame, `Accumulating` while chunks are
/// missing, `Completed` once all are resolved. Only `reset` goes back to `Empty`.
#[derive(Debug, Default)]
pub struct Decoder {
    transmission: Option<Transmission>,
    payload: Option<Vec<u8>>,
    stats: ScanStats,
    // -- first accepted frame, not decoder creation
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
    last_scan: Option<Instant>,
    read_interval: Duration,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one scanned frame.
    ///
    /// Errors are soft: the frame is dropped and nothing already resolved changes.
    /// Frames arriving after completion are ignored without being parsed.
    pub fn decode(&mut self, frame: &str) -> Result<FrameOutcome, ScanError> {
        if self.is_completed() {
            return Ok(FrameOutcome::AlreadyCompleted);
        }
        let now = self.mark_scan();
        let packet = Packet::parse(frame).map_err(|err| self.reject(err.into()))?;
        self.accept(packet, now)
    }

    /// Like `decode`, for raw scanner bytes.
    pub fn decode_bytes(&mut self, frame: &[u8]) -> Result<FrameOutcome, ScanError> {
        if self.is_completed() {
            return Ok(FrameOutcome::AlreadyCompleted);
        }
        let now = self.mark_scan();
        let packet = Packet::parse_bytes(frame).map_err(|err| self.reject(err.into()))?;
        self.accept(packet, now)
    }

    fn mark_scan(&mut self) -> Instant {
        let now = Instant::now();
        self.stats.frames_received += 1;
        if let Some(last) = self.last_scan {
            self.read_interval = now.duration_since(last);
        }
        self.last_scan = Some(now);
        now
    }

    fn reject(&mut self, err: ScanError) -> ScanError {
        self.stats.rejected += 1;
        warn!(code = err.code(), "frame rejected: {err}");
        err
    }

    fn accept(&mut self, packet: Packet, now: Instant) -> Result<FrameOutcome, ScanError> {
        // -- Frames of another transmission must not touch this one
        if let Some(transmission) = &self.transmission {
            if !transmission.matches(&packet.preamble) {
                let err = ScanError::FrameMismatch {
                    expected_chunks: transmission.total_chunks,
                    expected_length: transmission.payload_length,
                    expected_chunk_length: transmission.chunk_length,
                    got_chunks: packet.preamble.total_chunks,
                    got_length: packet.preamble.payload_length,
                    got_chunk_length: packet.preamble.chunk_length,
                };
                return Err(self.reject(err));
            }
        }

        if self.transmission.is_none() {
            info!(
                total_chunks = packet.preamble.total_chunks,
                payload_length = packet.preamble.payload_length,
                "transmission started"
            );
        }
        let transmission = self
            .transmission
            .get_or_insert_with(|| Transmission::new(&packet.preamble));
        self.started_at.get_or_insert(now);
        self.stats.frames_accepted += 1;

        let frame_index = packet.preamble.frame_index;
        let plain = packet.preamble.is_plain();
        let outcome = match transmission.absorb(packet) {
            Absorbed::Duplicate => {
                self.stats.duplicates += 1;
                FrameOutcome::Duplicate
            }
            Absorbed::Pending => {
                self.stats.frames_useful += 1;
                FrameOutcome::Pending
            }
            Absorbed::Resolved(new_chunks) => {
                self.stats.frames_useful += 1;
                FrameOutcome::Resolved { new_chunks }
            }
        };
        self.stats.pending_equations = transmission.pending();
        debug!(
            frame_index,
            plain,
            resolved = transmission.resolved(),
            total = transmission.total(),
            pending = transmission.pending(),
            ?outcome,
            "frame accepted"
        );

        if let Some(payload) = transmission.assemble() {
            self.payload = Some(payload);
            self.completed_at = Some(now);
            info!(
                frames_received = self.stats.frames_received,
                total_time_ms = self.total_time().as_millis() as u64,
                "transmission completed"
            );
            return Ok(FrameOutcome::Completed);
        }
        Ok(outcome)
    }

    pub fn is_completed(&self) -> bool {
        self.payload.is_some()
    }

    /// The reconstructed payload.
    ///
    /// # Errors
    ///
    /// `DataError::Incomplete` until every chunk is resolved.
    pub fn data_bytes(&self) -> Result<&[u8], DataError> {
        self.payload.as_deref().ok_or_else(|| DataError::Incomplete {
            resolved: self.resolved_chunks(),
            total: self.chunk_count(),
        })
    }

    /// The reconstructed payload as text.
    ///
    /// # Errors
    ///
    /// `DataError::Incomplete` until complete, `DataError::NotUtf8` for binary payloads.
    pub fn data(&self) -> Result<String, DataError> {
        let bytes = self.data_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DataError::NotUtf8)
    }

    /// Chunks in the transmission, 0 while empty.
    pub fn chunk_count(&self) -> usize {
        self.transmission.as_ref().map_or(0, Transmission::total)
    }

    pub fn resolved_chunks(&self) -> usize {
        self.transmission.as_ref().map_or(0, Transmission::resolved)
    }

    /// Whole percent of distinct chunks resolved, truncated.
    pub fn progress(&self) -> u8 {
        match self.chunk_count() {
            0 => 0,
            total => (self.resolved_chunks() * 100 / total) as u8,
        }
    }

    pub fn progress_fraction(&self) -> f64 {
        match self.chunk_count() {
            0 => 0.0,
            total => self.resolved_chunks() as f64 / total as f64,
        }
    }

    /// Chunks resolved per second since the first accepted frame, frozen at completion.
    pub fn speed(&self) -> f64 {
        per_second(self.resolved_chunks() as f64, self.active_time())
    }

    /// Payload bytes per second, same clock as `speed`.
    pub fn byte_rate(&self) -> f64 {
        let bytes = self.transmission.as_ref().map_or(0, |t| {
            (t.resolved() as u64 * u64::from(t.chunk_length)).min(t.payload_length)
        });
        per_second(bytes as f64, self.active_time())
    }

    /// First accepted frame to completion, zero until completed.
    pub fn total_time(&self) -> Duration {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Time between the two most recent scans.
    pub fn read_interval(&self) -> Duration {
        self.read_interval
    }

    /// Payload length announced by the frames, 0 while empty.
    pub fn total_size(&self) -> u64 {
        self.transmission.as_ref().map_or(0, |t| t.payload_length)
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Drops everything and goes back to `Empty`.
    pub fn reset(&mut self) {
        if self.transmission.is_some() {
            debug!(progress = self.progress(), "decoder reset");
        }
        *self = Self::default();
    }

    fn active_time(&self) -> Duration {
        match self.started_at {
            Some(start) => self
                .completed_at
                .unwrap_or_else(Instant::now)
                .duration_since(start),
            None => Duration::ZERO,
        }
    }
}

fn per_second(amount: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        amount / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Preamble;
    use crate::send::Encoder;
    use tracing_test::traced_test;

    fn hello_encoder() -> Encoder {
        let mut encoder = Encoder::new(4).unwrap();
        encoder.encode("HELLO WORLD").unwrap();
        encoder
    }

    #[test]
    fn starts_empty() {
        let decoder = Decoder::new();
        assert!(!decoder.is_completed());
        assert_eq!(decoder.progress(), 0);
        assert_eq!(decoder.chunk_count(), 0);
        assert_eq!(decoder.speed(), 0.0);
        assert_eq!(decoder.total_time(), Duration::ZERO);
        assert_eq!(
            decoder.data_bytes(),
            Err(DataError::Incomplete {
                resolved: 0,
                total: 0
            })
        );
    }

    #[test]
    fn outcomes_follow_the_state_machine() {
        let encoder = hello_encoder();
        let mut decoder = Decoder::new();
        assert_eq!(
            decoder.decode(&encoder.get_chunk(0).unwrap()),
            Ok(FrameOutcome::Resolved { new_chunks: 1 })
        );
        assert_eq!(
            decoder.decode(&encoder.get_chunk(0).unwrap()),
            Ok(FrameOutcome::Duplicate)
        );
        assert_eq!(
            decoder.decode(&encoder.get_chunk(1).unwrap()),
            Ok(FrameOutcome::Resolved { new_chunks: 1 })
        );
        assert_eq!(
            decoder.decode(&encoder.get_chunk(2).unwrap()),
            Ok(FrameOutcome::Completed)
        );
        assert_eq!(decoder.decode("garbage"), Ok(FrameOutcome::AlreadyCompleted));
        assert_eq!(decoder.data().unwrap(), "HELLO WORLD");
    }

    #[test]
    fn progress_is_truncated_percent() {
        let encoder = hello_encoder();
        let mut decoder = Decoder::new();
        decoder.decode(&encoder.get_chunk(0).unwrap()).unwrap();
        assert_eq!(decoder.progress(), 33);
        decoder.decode(&encoder.get_chunk(2).unwrap()).unwrap();
        assert_eq!(decoder.progress(), 66);
        decoder.decode(&encoder.get_chunk(1).unwrap()).unwrap();
        assert_eq!(decoder.progress(), 100);
        assert_eq!(decoder.progress_fraction(), 1.0);
    }

    #[test]
    fn soft_errors_leave_state_untouched() {
        let encoder = hello_encoder();
        let mut decoder = Decoder::new();
        decoder.decode(&encoder.get_chunk(0).unwrap()).unwrap();

        let mut corrupted = encoder.get_chunk(1).unwrap();
        corrupted.replace_range(20..21, if &corrupted[20..21] == "A" { "B" } else { "A" });
        assert!(decoder.decode(&corrupted).is_err());
        assert_eq!(decoder.decode("???").unwrap_err().code(), "MALFORMED");

        assert_eq!(decoder.resolved_chunks(), 1);
        assert_eq!(decoder.stats().rejected, 2);
        assert_eq!(decoder.stats().frames_accepted, 1);
        assert_eq!(decoder.stats().frames_received, 3);
    }

    #[test]
    #[traced_test]
    fn foreign_transmission_is_a_frame_mismatch() {
        let encoder = hello_encoder();
        let mut other = Encoder::new(4).unwrap();
        other.encode("A DIFFERENT, LONGER MESSAGE").unwrap();

        let mut decoder = Decoder::new();
        decoder.decode(&encoder.get_chunk(0).unwrap()).unwrap();
        let err = decoder.decode(&other.get_chunk(1).unwrap()).unwrap_err();
        assert_eq!(err.code(), "FRAME_MISMATCH");
        assert!(logs_contain("FRAME_MISMATCH"));
        assert_eq!(decoder.chunk_count(), 3);
        assert_eq!(decoder.resolved_chunks(), 1);

        decoder.decode(&encoder.get_chunk(1).unwrap()).unwrap();
        decoder.decode(&encoder.get_chunk(2).unwrap()).unwrap();
        assert_eq!(decoder.data_bytes().unwrap(), b"HELLO WORLD");
    }

    #[test]
    fn binary_payload_is_not_text() {
        let mut encoder = Encoder::new(2).unwrap();
        encoder.encode([0xffu8, 0xfe, 0x00]).unwrap();
        let mut decoder = Decoder::new();
        for i in 0..encoder.chunk_count() as u64 {
            decoder.decode(&encoder.get_chunk(i).unwrap()).unwrap();
        }
        assert_eq!(decoder.data_bytes().unwrap(), &[0xffu8, 0xfe, 0x00][..]);
        assert_eq!(decoder.data(), Err(DataError::NotUtf8));
    }

    #[test]
    fn timing_starts_at_first_accepted_frame() {
        let encoder = hello_encoder();
        let mut decoder = Decoder::new();
        let _ = decoder.decode("not a frame");
        assert_eq!(decoder.speed(), 0.0);

        decoder.decode(&encoder.get_chunk(0).unwrap()).unwrap();
        decoder.decode(&encoder.get_chunk(1).unwrap()).unwrap();
        assert_eq!(decoder.total_time(), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        decoder.decode(&encoder.get_chunk(2).unwrap()).unwrap();

        let total = decoder.total_time();
        assert!(total >= Duration::from_millis(5));
        assert!(decoder.read_interval() >= Duration::from_millis(5));
        let speed = decoder.speed();
        assert!(speed > 0.0);
        // -- frozen after completion
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(decoder.speed(), speed);
        assert_eq!(decoder.total_time(), total);
        assert!(decoder.byte_rate() > 0.0);
        assert_eq!(decoder.total_size(), 11);
    }

    #[test]
    fn reset_returns_to_empty() {
        let encoder = hello_encoder();
        let mut decoder = Decoder::new();
        for i in 0..3 {
            decoder.decode(&encoder.get_chunk(i).unwrap()).unwrap();
        }
        assert!(decoder.is_completed());
        decoder.reset();
        assert!(!decoder.is_completed());
        assert_eq!(decoder.progress(), 0);
        assert_eq!(decoder.stats(), ScanStats::default());
        assert_eq!(decoder.total_time(), Duration::ZERO);
        assert!(decoder.data_bytes().is_err());
    }

    #[test]
    fn oversized_header_is_a_soft_error() {
        let huge = Preamble {
            total_chunks: u32::MAX,
            frame_index: 0,
            payload_length: u64::from(u32::MAX),
            chunk_length: 1,
            encoded_indices: vec![0],
        };
        let frame = Packet::new(huge, vec![b'x']).serialize().unwrap();

        let mut decoder = Decoder::new();
        assert_eq!(decoder.decode(&frame).unwrap_err().code(), "MALFORMED");
        assert_eq!(decoder.chunk_count(), 0);
        assert_eq!(decoder.stats().rejected, 1);

        let encoder = hello_encoder();
        for i in 0..3 {
            decoder.decode(&encoder.get_chunk(i).unwrap()).unwrap();
        }
        assert_eq!(decoder.data().unwrap(), "HELLO WORLD");
    }

    #[test]
    fn raw_bytes_decode_like_text() {
        let encoder = hello_encoder();
        let mut decoder = Decoder::new();
        assert_eq!(
            decoder.decode_bytes(&[0xff, 0xfe, 0xfd]).unwrap_err().code(),
            "MALFORMED"
        );
        for i in [2, 0, 1] {
            let frame = encoder.get_chunk(i).unwrap();
            decoder.decode_bytes(frame.as_bytes()).unwrap();
        }
        assert!(decoder.is_completed());
        assert_eq!(decoder.data_bytes().unwrap(), b"HELLO WORLD");
        assert_eq!(decoder.stats().rejected, 1);
        assert_eq!(
            decoder.decode_bytes(b"anything"),
            Ok(FrameOutcome::AlreadyCompleted)
        );
    }
}
