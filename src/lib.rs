//! One-way transfer of a byte payload over a lossy channel that carries one
//! frame at a time, such as a cycling QR code scanned by a camera.
//!
//! The [`send::Encoder`] splits the payload into chunks and serves an unbounded,
//! deterministic sequence of plain and XOR parity frames. The [`recv::Decoder`]
//! accepts frames in any order, with losses and duplicates, and peels parity
//! frames until every chunk is known.

// region:    --- Modules

pub mod bridge;
pub mod config;
pub mod error;
pub mod frame;
pub mod recv;
pub mod send;

pub use error::{DataError, EncodeError, Error, FrameError, ScanError};
pub use frame::{Packet, Preamble};
pub use recv::{Decoder, FrameOutcome, ScanStats};
pub use send::Encoder;

pub type Result<T> = core::result::Result<T, Error>;

// endregion: --- Modules
