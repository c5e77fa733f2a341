// region:    --- Modules

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use crc::{Crc, CRC_32_ISO_HDLC};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

// endregion: --- Modules

/*
Frame structure (bincode, then URL-safe base64 without padding):
    0xAA | total_chunks | frame_index | payload_length | chunk_length | encoded_indices | data | checksum

    - encoded_indices: sorted, distinct chunk indices XORed into `data`
    - data: exactly `chunk_length` bytes, the last chunk is zero padded
    - checksum: CRC-32 over everything before it
*/

/// Leading marker byte of every frame.
pub const FRAME_MAGIC: u8 = 0xAA;

/// Largest transmission a frame may announce, counting the padded last chunk.
pub const MAX_TRANSMISSION_SIZE: u64 = 64 * 1024 * 1024;

/// Most chunks a frame may announce. The decoder keeps per-chunk state for each.
pub const MAX_CHUNK_COUNT: u32 = 1 << 20;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

// -- Header shared by every frame of one transmission (except frame_index / encoded_indices)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Preamble {
    pub total_chunks: u32,
    pub frame_index: u64,
    pub payload_length: u64,
    pub chunk_length: u32,
    pub encoded_indices: Vec<u32>,
}

impl Preamble {
    /// A frame carrying exactly one chunk.
    pub fn is_plain(&self) -> bool {
        self.encoded_indices.len() == 1
    }
}

// -- One scannable frame
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Packet {
    pub pre_padding: u8,
    pub preamble: Preamble,
    pub data: Vec<u8>,
    pub checksum: u32,
}

impl Packet {
    /// Builds a frame and stamps its checksum.
    pub fn new(preamble: Preamble, data: Vec<u8>) -> Self {
        let checksum = compute_checksum(FRAME_MAGIC, &preamble, &data);
        Self {
            pre_padding: FRAME_MAGIC,
            preamble,
            data,
            checksum,
        }
    }

    /// Text form handed to the visual-code renderer.
    pub fn serialize(&self) -> Result<String, FrameError> {
        let bytes = bincode::serialize(self)
            .map_err(|err| FrameError::malformed(format!("cannot serialise frame: {err}")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parses the text form of a frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|err| FrameError::malformed(format!("not base64: {err}")))?;
        Self::from_wire(&bytes)
    }

    /// Parses raw scanner output, which must be the UTF-8 text form.
    pub fn parse_bytes(raw: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(raw).map_err(|_| FrameError::malformed("not UTF-8"))?;
        Self::parse(text)
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, FrameError> {
        let packet: Packet = bincode::deserialize(bytes)
            .map_err(|err| FrameError::malformed(format!("cannot deserialise frame: {err}")))?;

        // -- bincode tolerates trailing bytes, frames must not carry any
        let consumed = bincode::serialized_size(&packet)
            .map_err(|err| FrameError::malformed(err.to_string()))?;
        if consumed != bytes.len() as u64 {
            return Err(FrameError::malformed(format!(
                "{} trailing bytes",
                bytes.len() as u64 - consumed.min(bytes.len() as u64)
            )));
        }
        if packet.pre_padding != FRAME_MAGIC {
            return Err(FrameError::malformed(format!(
                "bad marker byte {:#04x}",
                packet.pre_padding
            )));
        }

        let actual = compute_checksum(packet.pre_padding, &packet.preamble, &packet.data);
        if actual != packet.checksum {
            return Err(FrameError::ChecksumMismatch {
                expected: packet.checksum,
                actual,
            });
        }

        packet.validate()?;
        Ok(packet)
    }

    /// Structural checks that the checksum alone cannot catch (a buggy sender).
    fn validate(&self) -> Result<(), FrameError> {
        let p = &self.preamble;
        if p.total_chunks == 0 || p.chunk_length == 0 || p.payload_length == 0 {
            return Err(FrameError::malformed("zero sized transmission"));
        }
        if !within_limits(p.total_chunks, p.chunk_length) {
            return Err(FrameError::malformed(format!(
                "{} chunks of {} bytes exceed the transmission limit",
                p.total_chunks, p.chunk_length
            )));
        }
        let expected_chunks = p.payload_length.div_ceil(u64::from(p.chunk_length));
        if expected_chunks != u64::from(p.total_chunks) {
            return Err(FrameError::malformed(format!(
                "{} bytes in chunks of {} cannot make {} chunks",
                p.payload_length, p.chunk_length, p.total_chunks
            )));
        }
        if self.data.len() != p.chunk_length as usize {
            return Err(FrameError::malformed(format!(
                "body is {} bytes, chunk length is {}",
                self.data.len(),
                p.chunk_length
            )));
        }
        if p.encoded_indices.is_empty() {
            return Err(FrameError::malformed("frame references no chunk"));
        }
        if p.encoded_indices.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(FrameError::malformed("chunk indices not strictly increasing"));
        }
        if let Some(&last) = p.encoded_indices.last() {
            if last >= p.total_chunks {
                return Err(FrameError::malformed(format!(
                    "chunk index {last} out of range for {} chunks",
                    p.total_chunks
                )));
            }
        }
        Ok(())
    }
}

/// Whether a transmission of these dimensions fits `MAX_CHUNK_COUNT` and `MAX_TRANSMISSION_SIZE`.
pub fn within_limits(total_chunks: u32, chunk_length: u32) -> bool {
    total_chunks <= MAX_CHUNK_COUNT
        && u64::from(total_chunks) * u64::from(chunk_length) <= MAX_TRANSMISSION_SIZE
}

fn compute_checksum(marker: u8, preamble: &Preamble, data: &[u8]) -> u32 {
    let mut digest = CRC32.digest();
    digest.update(&[marker]);
    digest.update(&preamble.total_chunks.to_le_bytes());
    digest.update(&preamble.frame_index.to_le_bytes());
    digest.update(&preamble.payload_length.to_le_bytes());
    digest.update(&preamble.chunk_length.to_le_bytes());
    digest.update(&(preamble.encoded_indices.len() as u64).to_le_bytes());
    for index in &preamble.encoded_indices {
        digest.update(&index.to_le_bytes());
    }
    digest.update(&(data.len() as u64).to_le_bytes());
    digest.update(data);
    digest.finalize()
}

/// `dst ^= src` over the common prefix.
pub(crate) fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}
