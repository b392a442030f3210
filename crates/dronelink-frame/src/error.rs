/// Errors that can occur while publishing or attaching to frames.
///
/// Reading never produces one of these: see [`crate::FrameRead`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit in the region.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The pixel buffer length does not match `width * height * 3`.
    #[error("{width}x{height} frame needs {expected} bytes, got {actual}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// A dimension cannot be represented in the 32-bit header.
    #[error("frame dimensions {width}x{height} exceed the header range")]
    DimensionsOutOfRange { width: u32, height: u32 },

    /// The configured frame limits cannot size a region.
    #[error("frame limits {max_width}x{max_height} cannot size a region")]
    InvalidLimits { max_width: u32, max_height: u32 },

    /// The region is smaller than a header.
    #[error("region of {capacity} bytes cannot hold a frame header")]
    RegionTooSmall { capacity: usize },

    /// An error from the underlying shared-memory region.
    #[error("shared memory error: {0}")]
    Shm(#[from] dronelink_shm::ShmError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
