use bytes::BytesMut;
use dronelink_shm::SharedRegion;
use tracing::{debug, trace};

use crate::codec::{Frame, FrameHeader, InvalidFrame, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Outcome of one best-effort read of the frame slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// A frame whose header and payload are mutually consistent.
    Frame(Frame),
    /// Nothing has been published yet (payload size 0).
    Empty,
    /// The slot held something unusable this time; try again next tick.
    Invalid(InvalidFrame),
}

impl FrameRead {
    /// The frame, if this read produced one.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Self::Frame(frame) => Some(frame),
            Self::Empty | Self::Invalid(_) => None,
        }
    }
}

/// Counters for the reads a [`FrameReader`] has performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub frames: u64,
    pub empty: u64,
    pub invalid: u64,
}

/// Reads the latest frame from a region owned by another process.
///
/// Reads never fail: every problem a concurrent writer (or a vanished one)
/// can cause is reported as [`FrameRead::Empty`] or [`FrameRead::Invalid`].
#[derive(Debug)]
pub struct FrameReader {
    region: Option<SharedRegion>,
    stats: ReadStats,
}

impl FrameReader {
    /// Attach read-only to the named region.
    ///
    /// Fails with `FrameError::Shm(ShmError::NotFound)` if the producer has
    /// not created it yet.
    pub fn attach(name: &str) -> Result<Self> {
        Self::from_region(SharedRegion::attach(name)?)
    }

    /// Wrap an already-attached region.
    pub fn from_region(region: SharedRegion) -> Result<Self> {
        if region.capacity() < HEADER_SIZE {
            return Err(FrameError::RegionTooSmall {
                capacity: region.capacity(),
            });
        }
        Ok(Self {
            region: Some(region),
            stats: ReadStats::default(),
        })
    }

    /// Read the current frame, if there is a usable one.
    pub fn read(&mut self) -> FrameRead {
        let result = self.read_slot();
        match &result {
            FrameRead::Frame(_) => self.stats.frames += 1,
            FrameRead::Empty => self.stats.empty += 1,
            FrameRead::Invalid(reason) => {
                self.stats.invalid += 1;
                trace!(%reason, "discarding unusable frame");
            }
        }
        result
    }

    fn read_slot(&self) -> FrameRead {
        let Some(region) = &self.region else {
            return FrameRead::Invalid(InvalidFrame::Detached);
        };
        let Some(header) = read_header(region) else {
            return FrameRead::Invalid(InvalidFrame::Detached);
        };
        if header.is_empty() {
            return FrameRead::Empty;
        }

        let len = match header.payload_len(region.capacity() - HEADER_SIZE) {
            Ok(len) => len,
            Err(reason) => return FrameRead::Invalid(reason),
        };

        let mut pixels = BytesMut::zeroed(len);
        if region.read_at(HEADER_SIZE, &mut pixels).is_err() {
            return FrameRead::Invalid(InvalidFrame::PayloadOutOfBounds {
                size: header.payload_size,
                max: region.capacity() - HEADER_SIZE,
            });
        }

        // payload_len guarantees positive dimensions that multiply out to `len`.
        match Frame::new(header.width as u32, header.height as u32, pixels.freeze()) {
            Ok(frame) => FrameRead::Frame(frame),
            Err(_) => FrameRead::Invalid(InvalidFrame::DimensionMismatch {
                width: header.width,
                height: header.height,
                size: header.payload_size,
            }),
        }
    }

    /// Peek at the raw header without validating it.
    pub fn header(&self) -> Option<FrameHeader> {
        self.region.as_ref().and_then(read_header)
    }

    /// Release the region handle. Later reads report `Invalid(Detached)`.
    ///
    /// Returns whether a region was attached.
    pub fn detach(&mut self) -> bool {
        match self.region.take() {
            Some(region) => {
                debug!(name = region.name(), "detached from shared memory region");
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.region.is_some()
    }

    /// Name of the attached region.
    pub fn name(&self) -> Option<&str> {
        self.region.as_ref().map(SharedRegion::name)
    }

    /// Mapped region size, or 0 once detached.
    pub fn capacity(&self) -> usize {
        self.region.as_ref().map_or(0, SharedRegion::capacity)
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }
}

fn read_header(region: &SharedRegion) -> Option<FrameHeader> {
    let mut raw = [0u8; HEADER_SIZE];
    region.read_at(0, &mut raw).ok()?;
    Some(FrameHeader::decode(&raw))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    use bytes::BytesMut;
    use dronelink_shm::ShmError;

    use super::*;
    use crate::codec::FrameConfig;
    use crate::writer::FrameWriter;

    static NEXT: AtomicU32 = AtomicU32::new(0);

    fn unique_name(tag: &str) -> String {
        format!(
            "/dlr-{tag}-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        )
    }

    fn patterned(width: u32, height: u32, seed: u8) -> Frame {
        let len = (width * height * 3) as usize;
        let pixels: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_add(seed)).collect();
        Frame::new(width, height, pixels).unwrap()
    }

    fn write_raw_header(region: &mut SharedRegion, header: FrameHeader) {
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        region.write_at(0, &buf).unwrap();
    }

    #[test]
    fn vga_frame_roundtrip_in_full_hd_region() {
        let name = unique_name("vga");
        let mut writer = FrameWriter::create(&name, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::attach(&name).unwrap();

        let frame = patterned(640, 480, 42);
        writer.write(&frame).unwrap();

        let read = reader.read().into_frame().expect("frame should be readable");
        assert_eq!(read.width(), 640);
        assert_eq!(read.height(), 480);
        assert_eq!(read.payload_size(), 921_600);
        assert_eq!(read.pixels()[0], frame.pixels()[0]);
        assert_eq!(read, frame);
    }

    #[test]
    fn unwritten_region_reads_empty() {
        let name = unique_name("emp");
        let _writer = FrameWriter::create(&name, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::attach(&name).unwrap();

        assert_eq!(reader.read(), FrameRead::Empty);
        assert_eq!(reader.stats().empty, 1);
    }

    #[test]
    fn oversized_payload_size_is_invalid() {
        let name = unique_name("big");
        let mut region = SharedRegion::create(&name, 64).unwrap();
        let mut reader = FrameReader::attach(&name).unwrap();

        write_raw_header(
            &mut region,
            FrameHeader {
                width: 4,
                height: 5,
                payload_size: 60,
            },
        );
        assert!(matches!(
            reader.read(),
            FrameRead::Invalid(InvalidFrame::PayloadOutOfBounds { size: 60, .. })
        ));

        write_raw_header(
            &mut region,
            FrameHeader {
                width: 1,
                height: 1,
                payload_size: -3,
            },
        );
        assert!(matches!(
            reader.read(),
            FrameRead::Invalid(InvalidFrame::PayloadOutOfBounds { .. })
        ));
    }

    #[test]
    fn torn_header_is_discarded() {
        let name = unique_name("torn");
        let mut writer = FrameWriter::create(&name, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::attach(&name).unwrap();
        writer.write(&patterned(320, 240, 1)).unwrap();

        // Old dimensions with a new, larger payload size.
        let mut region = writer.into_region();
        write_raw_header(
            &mut region,
            FrameHeader {
                width: 320,
                height: 240,
                payload_size: 640 * 480 * 3,
            },
        );

        assert!(matches!(
            reader.read(),
            FrameRead::Invalid(InvalidFrame::DimensionMismatch { .. })
        ));
        assert_eq!(reader.stats().invalid, 1);
    }

    #[test]
    fn latest_write_wins() {
        let name = unique_name("lww");
        let mut writer = FrameWriter::create(&name, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::attach(&name).unwrap();

        writer.write(&patterned(640, 480, 1)).unwrap();
        writer.write(&patterned(160, 120, 2)).unwrap();

        let read = reader.read().into_frame().unwrap();
        assert_eq!((read.width(), read.height()), (160, 120));
        assert_eq!(read, patterned(160, 120, 2));
    }

    #[test]
    fn reads_continue_after_owner_unlinks() {
        let name = unique_name("gone");
        let mut writer = FrameWriter::create(&name, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::attach(&name).unwrap();
        writer.write(&patterned(8, 8, 3)).unwrap();

        drop(writer);
        assert!(!SharedRegion::exists(&name).unwrap());
        assert_eq!(reader.read().into_frame(), Some(patterned(8, 8, 3)));
    }

    #[test]
    fn detached_reader_reports_detached() {
        let name = unique_name("det");
        let _writer = FrameWriter::create(&name, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::attach(&name).unwrap();

        assert!(reader.detach());
        assert!(!reader.detach());
        assert!(!reader.is_attached());
        assert_eq!(reader.read(), FrameRead::Invalid(InvalidFrame::Detached));
        assert_eq!(reader.header(), None);
    }

    #[test]
    fn attach_before_create_is_not_found() {
        let err = FrameReader::attach(&unique_name("miss")).unwrap_err();
        assert!(matches!(err, FrameError::Shm(ShmError::NotFound { .. })));
    }

    #[test]
    fn concurrent_writer_never_yields_inconsistent_frame() {
        let name = unique_name("race");
        let mut writer = FrameWriter::create(&name, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::attach(&name).unwrap();
        let running = Arc::new(AtomicBool::new(true));

        let writer_thread = {
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                let small = patterned(64, 48, 1);
                let large = patterned(320, 240, 2);
                let mut i = 0u32;
                while running.load(Ordering::Relaxed) {
                    let frame = if i % 2 == 0 { &small } else { &large };
                    writer.write(frame).unwrap();
                    i = i.wrapping_add(1);
                }
            })
        };

        for _ in 0..500 {
            match reader.read() {
                FrameRead::Frame(frame) => {
                    let dims = (frame.width(), frame.height());
                    assert!(dims == (64, 48) || dims == (320, 240), "{dims:?}");
                    assert_eq!(
                        frame.payload_size(),
                        (frame.width() * frame.height() * 3) as usize
                    );
                }
                FrameRead::Empty | FrameRead::Invalid(_) => {}
            }
        }

        running.store(false, Ordering::Relaxed);
        writer_thread.join().unwrap();
    }
}
