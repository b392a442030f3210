use std::path::PathBuf;

/// Errors that can occur while capturing, decoding or saving frames.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    /// The captured bytes are not a decodable image.
    #[error("failed to decode capture: {0}")]
    Decode(#[source] image::ImageError),

    /// The decoded image could not be framed or published.
    #[error("frame error: {0}")]
    Frame(#[from] dronelink_frame::FrameError),

    /// Failed to write an image file (snapshot or preview).
    #[error("failed to write image {path}: {source}")]
    Write {
        path: PathBuf,
        source: image::ImageError,
    },

    /// An overlay font file could not be parsed.
    #[error("invalid font {path}: {source}")]
    Font {
        path: PathBuf,
        source: ab_glyph::InvalidFont,
    },

    /// A capture source could not be opened.
    #[error("capture source error: {0}")]
    Source(String),

    /// An I/O error while reading capture input.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, VideoError>;
