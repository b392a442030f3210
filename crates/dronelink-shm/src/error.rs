/// Errors that can occur in shared-memory operations.
#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    /// The region name is not a valid shared-memory object name.
    #[error("invalid region name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// No region with this name exists (the owner has not created it yet,
    /// or has already unlinked it).
    #[error("shared memory region {name} not found")]
    NotFound { name: String },

    /// Failed to create the region.
    #[error("failed to create region {name}: {source}")]
    Create {
        name: String,
        source: std::io::Error,
    },

    /// Failed to open or map an existing region.
    #[error("failed to attach region {name}: {source}")]
    Attach {
        name: String,
        source: std::io::Error,
    },

    /// A requested capacity cannot be represented by the platform.
    #[error("invalid region capacity {capacity}")]
    InvalidCapacity { capacity: usize },

    /// An access fell outside the mapped region.
    #[error("access out of bounds (offset {offset}, len {len}, capacity {capacity})")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// A write was attempted through a read-only attachment.
    #[error("region {name} is attached read-only")]
    ReadOnly { name: String },
}

impl ShmError {
    /// The region does not exist yet, or exists but its owner has not sized it.
    ///
    /// Both clear up on their own once the owner finishes creating it.
    pub fn is_not_ready(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Attach { source, .. } => source.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShmError>;
