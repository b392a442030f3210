//! Single-slot video frame framing over a shared-memory region.
//!
//! The region holds exactly one frame:
//! - A 12-byte header: width, height, payload size (three native-endian `i32`)
//! - The payload: dense row-major RGB8 pixels, no row padding
//!
//! The producer overwrites the slot at its own pace and the consumer polls it
//! at its own pace. There is no readiness flag, so a read may observe a torn
//! frame; [`FrameReader::read`] classifies what it saw instead of failing.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    region_capacity, Frame, FrameConfig, FrameHeader, InvalidFrame, BYTES_PER_PIXEL,
    DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::{FrameRead, FrameReader, ReadStats};
pub use writer::FrameWriter;
