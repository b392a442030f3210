use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dronelink_frame::{Frame, FrameWriter};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::capture::CaptureSource;
use crate::error::{Result, VideoError};

/// Producer loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    /// Target time between captures. Default: 33 ms (~30 fps).
    pub interval: Duration,
    /// Save a snapshot every N published frames; 0 disables. Default: 50.
    pub snapshot_every: u32,
    /// Snapshot file, overwritten each time. Default: `frame.jpg`.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(33),
            snapshot_every: 50,
            snapshot_path: Some(PathBuf::from("frame.jpg")),
        }
    }
}

/// What a single producer step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A frame was written to the slot.
    Published { width: u32, height: u32 },
    /// The capture source had nothing this tick.
    NoCapture,
    /// The captured bytes did not decode; the slot keeps its previous frame.
    DecodeFailed,
    /// The decoded frame did not fit the region.
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub published: u64,
    pub no_capture: u64,
    pub decode_failed: u64,
    pub rejected: u64,
    pub snapshots: u64,
}

/// Decode encoded image bytes into a dense RGB8 frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes)
        .map_err(VideoError::Decode)?
        .to_rgb8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(width, height, image.into_raw())?)
}

/// Pulls encoded frames from a capture source and publishes them.
///
/// Decode failures and oversized frames are never fatal: that tick simply
/// contributes no write.
pub struct Producer<S> {
    source: S,
    writer: FrameWriter,
    config: ProducerConfig,
    since_snapshot: u32,
    stats: ProducerStats,
}

impl<S: CaptureSource> Producer<S> {
    pub fn new(source: S, writer: FrameWriter, config: ProducerConfig) -> Self {
        Self {
            source,
            writer,
            config,
            since_snapshot: 0,
            stats: ProducerStats::default(),
        }
    }

    /// Capture, decode and publish one frame.
    pub fn step(&mut self) -> StepOutcome {
        let Some(bytes) = self.source.get_frame() else {
            self.stats.no_capture += 1;
            return StepOutcome::NoCapture;
        };

        let frame = match decode_frame(&bytes) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, size = bytes.len(), "dropping undecodable capture");
                self.stats.decode_failed += 1;
                return StepOutcome::DecodeFailed;
            }
        };

        if let Err(err) = self.writer.write(&frame) {
            warn!(
                error = %err,
                width = frame.width(),
                height = frame.height(),
                "frame rejected by region"
            );
            self.stats.rejected += 1;
            return StepOutcome::Rejected;
        }
        self.stats.published += 1;

        self.since_snapshot = self.since_snapshot.saturating_add(1);
        if self.config.snapshot_every > 0 && self.since_snapshot >= self.config.snapshot_every {
            self.since_snapshot = 0;
            self.snapshot(&frame);
        }

        StepOutcome::Published {
            width: frame.width(),
            height: frame.height(),
        }
    }

    fn snapshot(&mut self, frame: &Frame) {
        let Some(path) = &self.config.snapshot_path else {
            return;
        };
        let Some(image) = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        else {
            return;
        };
        match image.save(path) {
            Ok(()) => {
                self.stats.snapshots += 1;
                info!(
                    path = %path.display(),
                    published = self.stats.published,
                    "snapshot saved"
                );
            }
            Err(source) => {
                let err = VideoError::Write {
                    path: path.clone(),
                    source,
                };
                warn!(error = %err, "snapshot failed");
            }
        }
    }

    /// Step at the configured interval until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) -> ProducerStats {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            snapshot_every = self.config.snapshot_every,
            "producer started"
        );
        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.step();
            std::thread::sleep(self.config.interval.saturating_sub(started.elapsed()));
        }
        info!(
            published = self.stats.published,
            decode_failed = self.stats.decode_failed,
            rejected = self.stats.rejected,
            "producer stopped"
        );
        self.stats
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats
    }

    pub fn writer(&self) -> &FrameWriter {
        &self.writer
    }

    /// Consume the producer, returning the writer (which still owns the region).
    pub fn into_writer(self) -> FrameWriter {
        self.writer
    }
}
