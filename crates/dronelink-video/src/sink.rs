use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{ImageFormat, RgbImage};
use tracing::{debug, trace};

use crate::error::{Result, VideoError};

/// Where the consumer shows annotated frames.
pub trait FrameSink {
    /// Present one annotated frame with its status line.
    fn render(&mut self, image: &RgbImage, label: &str) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn render(&mut self, image: &RgbImage, label: &str) -> Result<()> {
        (**self).render(image, label)
    }
}

/// Discards frames, counting them. Used when no preview is requested.
#[derive(Debug, Default)]
pub struct NullSink {
    rendered: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl FrameSink for NullSink {
    fn render(&mut self, image: &RgbImage, label: &str) -> Result<()> {
        self.rendered += 1;
        trace!(
            width = image.width(),
            height = image.height(),
            label,
            "frame rendered"
        );
        Ok(())
    }
}

/// Writes the latest annotated frame to an image file.
///
/// The file is replaced atomically (write to a sibling, then rename) so a
/// viewer polling it never sees a half-written image. Writes closer together
/// than `min_interval` are skipped.
#[derive(Debug)]
pub struct PreviewFileSink {
    path: PathBuf,
    staging: PathBuf,
    format: ImageFormat,
    min_interval: Duration,
    last_write: Option<Instant>,
    written: u64,
}

impl PreviewFileSink {
    pub fn new(path: impl Into<PathBuf>, min_interval: Duration) -> Result<Self> {
        let path = path.into();
        let format = ImageFormat::from_path(&path).map_err(|source| VideoError::Write {
            path: path.clone(),
            source,
        })?;
        let staging = staging_path(&path);
        debug!(path = %path.display(), ?format, "preview sink ready");
        Ok(Self {
            path,
            staging,
            format,
            min_interval,
            last_write: None,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of frames actually written to disk.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for PreviewFileSink {
    fn render(&mut self, image: &RgbImage, label: &str) -> Result<()> {
        let now = Instant::now();
        if let Some(last) = self.last_write {
            if now.duration_since(last) < self.min_interval {
                return Ok(());
            }
        }

        image
            .save_with_format(&self.staging, self.format)
            .map_err(|source| VideoError::Write {
                path: self.staging.clone(),
                source,
            })?;
        std::fs::rename(&self.staging, &self.path).map_err(|source| VideoError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.last_write = Some(now);
        self.written += 1;
        trace!(path = %self.path.display(), label, "preview updated");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".partial");
    path.with_file_name(name)
}
