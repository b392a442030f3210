use std::fmt;
use std::io;

use dronelink_control::{ControlError, LinkError};
use dronelink_frame::FrameError;
use dronelink_shm::ShmError;
use dronelink_video::VideoError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const REGION_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => REGION_ERROR,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn shm_error(context: &str, err: ShmError) -> CliError {
    match err {
        ShmError::Create { ref source, .. } | ShmError::Attach { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        ShmError::InvalidName { .. } | ShmError::InvalidCapacity { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(REGION_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Shm(err) => shm_error(context, err),
        FrameError::RegionTooSmall { .. } => {
            CliError::new(REGION_ERROR, format!("{context}: {err}"))
        }
        FrameError::InvalidLimits { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn video_error(context: &str, err: VideoError) -> CliError {
    match err {
        VideoError::Frame(err) => frame_error(context, err),
        VideoError::Io { source, .. } => io_error(context, source),
        VideoError::Source(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn control_error(context: &str, err: ControlError) -> CliError {
    match err {
        ControlError::Frame(err) => frame_error(context, err),
        ControlError::Link(LinkError::Io(source)) => io_error(context, source),
        ControlError::Producer(source) => io_error(context, source),
        ControlError::Input(source) => CliError::new(FAILURE, format!("{context}: {source}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}
