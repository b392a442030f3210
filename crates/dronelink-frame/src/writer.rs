use bytes::BytesMut;
use dronelink_shm::SharedRegion;
use tracing::trace;

use crate::codec::{Frame, FrameConfig, FrameHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Publishes frames into a shared region it owns.
///
/// Each [`write`](Self::write) overwrites the previous frame. Nothing waits
/// for, or is told about, the reader.
#[derive(Debug)]
pub struct FrameWriter {
    region: SharedRegion,
    buf: BytesMut,
    frames_written: u64,
}

impl FrameWriter {
    /// Create (or recreate) the named region sized for `config` and own it.
    pub fn create(name: &str, config: FrameConfig) -> Result<Self> {
        let region = SharedRegion::create(name, config.capacity()?)?;
        Self::from_region(region)
    }

    /// Wrap an already-created writable region.
    ///
    /// The header is zeroed so readers see an empty slot until the first write.
    pub fn from_region(mut region: SharedRegion) -> Result<Self> {
        if region.capacity() < HEADER_SIZE {
            return Err(FrameError::RegionTooSmall {
                capacity: region.capacity(),
            });
        }
        region.write_at(0, &[0u8; HEADER_SIZE])?;
        Ok(Self {
            region,
            buf: BytesMut::with_capacity(HEADER_SIZE),
            frames_written: 0,
        })
    }

    /// Write the header, then the payload, into the region.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        let max = self.max_payload();
        if frame.payload_size() > max {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload_size(),
                max,
            });
        }
        let header = FrameHeader::for_frame(frame)?;

        self.buf.clear();
        header.encode(&mut self.buf);

        // Header before payload, with no readiness flag in between.
        self.region.write_at(0, &self.buf)?;
        self.region.write_at(HEADER_SIZE, frame.pixels())?;

        self.frames_written = self.frames_written.saturating_add(1);
        trace!(
            width = frame.width(),
            height = frame.height(),
            size = frame.payload_size(),
            "frame published"
        );
        Ok(())
    }

    /// Mark the slot empty.
    pub fn clear(&mut self) -> Result<()> {
        self.region.write_at(0, &[0u8; HEADER_SIZE])?;
        Ok(())
    }

    /// Largest payload this region accepts.
    pub fn max_payload(&self) -> usize {
        self.region.capacity() - HEADER_SIZE
    }

    /// Number of frames successfully written.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Borrow the underlying region.
    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    /// Consume the writer and return the region (still owned, still linked).
    pub fn into_region(self) -> SharedRegion {
        self.region
    }
}
