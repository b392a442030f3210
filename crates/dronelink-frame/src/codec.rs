use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: width (4) + height (4) + payload size (4) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Bytes per pixel of the payload (interleaved RGB8).
pub const BYTES_PER_PIXEL: usize = 3;

/// Default largest frame the region is sized for.
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;

/// Region size needed to hold a header plus a `max_width x max_height` frame,
/// or `None` if it overflows `usize`.
pub fn region_capacity(max_width: u32, max_height: u32) -> Option<usize> {
    expected_payload(max_width, max_height)?.checked_add(HEADER_SIZE)
}

/// Payload length of a dense `width x height` RGB8 image, if it fits in `usize`.
pub fn expected_payload(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// A decoded video frame: dense row-major RGB8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl Frame {
    /// Create a frame, checking that `pixels` is exactly `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, pixels: impl Into<Bytes>) -> Result<Self> {
        let pixels = pixels.into();
        match expected_payload(width, height) {
            Some(expected) if expected == pixels.len() => Ok(Self {
                width,
                height,
                pixels,
            }),
            expected => Err(FrameError::DimensionMismatch {
                width,
                height,
                expected: expected.unwrap_or(usize::MAX),
                actual: pixels.len(),
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw interleaved RGB8 bytes.
    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_ref()
    }

    /// Payload size in bytes (header excluded).
    pub fn payload_size(&self) -> usize {
        self.pixels.len()
    }
}

/// The fixed header at offset 0 of the region.
///
/// Wire format (native-endian, as agreed by both processes on one host):
/// ```text
/// ┌─────────────┬─────────────┬──────────────────┬──────────────────────┐
/// │ Width (4B)  │ Height (4B) │ Payload size (4B)│ Payload (size bytes) │
/// │ i32         │ i32         │ i32              │ RGB8, row-major      │
/// └─────────────┴─────────────┴──────────────────┴──────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub width: i32,
    pub height: i32,
    pub payload_size: i32,
}

impl FrameHeader {
    /// Build the header describing `frame`.
    pub fn for_frame(frame: &Frame) -> Result<Self> {
        let out_of_range = || FrameError::DimensionsOutOfRange {
            width: frame.width,
            height: frame.height,
        };
        Ok(Self {
            width: i32::try_from(frame.width).map_err(|_| out_of_range())?,
            height: i32::try_from(frame.height).map_err(|_| out_of_range())?,
            payload_size: i32::try_from(frame.payload_size()).map_err(|_| {
                FrameError::PayloadTooLarge {
                    size: frame.payload_size(),
                    max: i32::MAX as usize,
                }
            })?,
        })
    }

    /// Append the 12 header bytes to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_i32_ne(self.width);
        dst.put_i32_ne(self.height);
        dst.put_i32_ne(self.payload_size);
    }

    /// Decode a header from exactly 12 bytes.
    pub fn decode(src: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &src[..];
        Self {
            width: buf.get_i32_ne(),
            height: buf.get_i32_ne(),
            payload_size: buf.get_i32_ne(),
        }
    }

    /// A zero payload size marks a slot that has never been written.
    pub fn is_empty(&self) -> bool {
        self.payload_size == 0
    }

    /// Validate the header against a region whose payload area is `max_payload`
    /// bytes, returning the payload length to copy.
    ///
    /// Accepts only `0 < payload_size <= max_payload` with positive dimensions
    /// and `width * height * 3 == payload_size`.
    pub fn payload_len(&self, max_payload: usize) -> std::result::Result<usize, InvalidFrame> {
        let size = match usize::try_from(self.payload_size) {
            Ok(size) if size > 0 && size <= max_payload => size,
            _ => {
                return Err(InvalidFrame::PayloadOutOfBounds {
                    size: self.payload_size,
                    max: max_payload,
                })
            }
        };

        let mismatch = InvalidFrame::DimensionMismatch {
            width: self.width,
            height: self.height,
            size: self.payload_size,
        };
        if self.width <= 0 || self.height <= 0 {
            return Err(mismatch);
        }
        let expected = i64::from(self.width)
            .checked_mul(i64::from(self.height))
            .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL as i64));
        if expected != Some(i64::from(self.payload_size)) {
            return Err(mismatch);
        }

        Ok(size)
    }
}

/// Why a read produced no frame even though the slot was not empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFrame {
    /// `payload_size` is negative or larger than the region's payload area.
    PayloadOutOfBounds { size: i32, max: usize },
    /// Dimensions and payload size disagree (typically a torn read).
    DimensionMismatch { width: i32, height: i32, size: i32 },
    /// The reader is no longer attached to a region.
    Detached,
}

impl fmt::Display for InvalidFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadOutOfBounds { size, max } => {
                write!(f, "payload size {size} outside 1..={max}")
            }
            Self::DimensionMismatch {
                width,
                height,
                size,
            } => write!(f, "{width}x{height} does not match payload size {size}"),
            Self::Detached => write!(f, "reader is detached"),
        }
    }
}

/// Sizing for the shared region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Widest frame the region must hold. Default: 1920.
    pub max_width: u32,
    /// Tallest frame the region must hold. Default: 1080.
    pub max_height: u32,
}

impl FrameConfig {
    /// Total region size: header plus the largest payload.
    ///
    /// Fails for a zero limit or one whose size overflows `usize`.
    pub fn capacity(&self) -> Result<usize> {
        let invalid = FrameError::InvalidLimits {
            max_width: self.max_width,
            max_height: self.max_height,
        };
        if self.max_width == 0 || self.max_height == 0 {
            return Err(invalid);
        }
        region_capacity(self.max_width, self.max_height).ok_or(invalid)
    }

    /// Largest payload the region can hold.
    pub fn max_payload(&self) -> Result<usize> {
        Ok(self.capacity()? - HEADER_SIZE)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
        }
    }
}
