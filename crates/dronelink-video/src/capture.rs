use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tracing::{debug, warn};

use crate::error::{Result, VideoError};

/// Supplies encoded frames (JPEG, PNG, ...) to the producer.
///
/// `None` means "nothing this tick": the producer skips the write and the
/// slot keeps its previous frame.
pub trait CaptureSource {
    fn get_frame(&mut self) -> Option<Vec<u8>>;
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn get_frame(&mut self) -> Option<Vec<u8>> {
        (**self).get_frame()
    }
}

/// Synthetic moving test pattern, JPEG-encoded like a camera stream.
#[derive(Debug, Clone)]
pub struct PatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl PatternSource {
    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let shift = self.tick;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                (x.wrapping_add(shift.wrapping_mul(4)) % 256) as u8,
                (y.wrapping_add(shift.wrapping_mul(2)) % 256) as u8,
                (shift % 256) as u8,
            ])
        })
    }
}

impl Default for PatternSource {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WIDTH, Self::DEFAULT_HEIGHT)
    }
}

impl CaptureSource for PatternSource {
    fn get_frame(&mut self) -> Option<Vec<u8>> {
        let image = DynamicImage::ImageRgb8(self.render());
        self.tick = self.tick.wrapping_add(1);

        let mut encoded = Cursor::new(Vec::new());
        match image.write_to(&mut encoded, ImageFormat::Jpeg) {
            Ok(()) => Some(encoded.into_inner()),
            Err(err) => {
                warn!(error = %err, "failed to encode test pattern");
                None
            }
        }
    }
}

/// Cycles through the image files of a directory in name order.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    const EXTENSIONS: [&'static str; 4] = ["jpg", "jpeg", "png", "bmp"];

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| VideoError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && Self::is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(VideoError::Source(format!(
                "no image files in {}",
                dir.display()
            )));
        }
        debug!(dir = %dir.display(), count = files.len(), "opened directory source");

        Ok(Self { files, next: 0 })
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                Self::EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl CaptureSource for DirectorySource {
    fn get_frame(&mut self) -> Option<Vec<u8>> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read capture file");
                None
            }
        }
    }
}

/// Command-line description of a capture source.
///
/// `pattern`, `pattern:WxH` or `dir:PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSpec {
    Pattern { width: u32, height: u32 },
    Directory(PathBuf),
}

impl CaptureSpec {
    pub fn open(&self) -> Result<Box<dyn CaptureSource + Send>> {
        match self {
            Self::Pattern { width, height } => Ok(Box::new(PatternSource::new(*width, *height))),
            Self::Directory(dir) => Ok(Box::new(DirectorySource::open(dir)?)),
        }
    }
}

impl Default for CaptureSpec {
    fn default() -> Self {
        Self::Pattern {
            width: PatternSource::DEFAULT_WIDTH,
            height: PatternSource::DEFAULT_HEIGHT,
        }
    }
}

impl FromStr for CaptureSpec {
    type Err = String;

    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        let input = input.trim();
        if input == "pattern" {
            return Ok(Self::default());
        }
        if let Some(size) = input.strip_prefix("pattern:") {
            let (width, height) = size
                .split_once('x')
                .ok_or_else(|| format!("pattern size must be WxH, got {size:?}"))?;
            let parse = |value: &str| match value.parse::<u32>() {
                Ok(v) if v > 0 => Ok(v),
                _ => Err(format!("invalid pattern dimension {value:?}")),
            };
            return Ok(Self::Pattern {
                width: parse(width)?,
                height: parse(height)?,
            });
        }
        if let Some(dir) = input.strip_prefix("dir:") {
            if dir.is_empty() {
                return Err("dir: source needs a path".to_string());
            }
            return Ok(Self::Directory(PathBuf::from(dir)));
        }
        Err(format!(
            "unknown capture source {input:?} (expected pattern, pattern:WxH or dir:PATH)"
        ))
    }
}

impl fmt::Display for CaptureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern { width, height } => write!(f, "pattern:{width}x{height}"),
            Self::Directory(dir) => write!(f, "dir:{}", dir.display()),
        }
    }
}
