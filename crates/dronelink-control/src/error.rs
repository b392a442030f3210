/// Errors reported by a flight-controller link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A command was issued before `connect` or after `close`.
    #[error("flight link is not connected")]
    NotConnected,

    /// The controller refused the command.
    #[error("{command} rejected: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },

    /// Transport-level failure talking to the controller.
    #[error("flight link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can end a pilot session.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Flight link error.
    #[error("flight link error: {0}")]
    Link(#[from] LinkError),

    /// Frame region error (typically the region could not be attached).
    #[error("frame error: {0}")]
    Frame(#[from] dronelink_frame::FrameError),

    /// Reading operator input failed.
    #[error("input error: {0}")]
    Input(#[source] std::io::Error),

    /// The producer process could not be started or stopped.
    #[error("producer error: {0}")]
    Producer(#[source] std::io::Error),

    /// The producer exited before the region appeared.
    #[error("producer exited before creating the region ({status})")]
    ProducerExited { status: String },
}

pub type Result<T> = std::result::Result<T, ControlError>;
