//! Named shared-memory regions.
//!
//! This is the lowest layer of dronelink. A region is created (and later
//! unlinked) by exactly one owner and attached read-only by a peer process.
//! Access is plain bounds-checked byte copies: no locks, no fences, no
//! notifications. Anything built on top must tolerate torn reads.

pub mod error;

#[cfg(unix)]
pub mod region;

pub use error::{Result, ShmError};

#[cfg(unix)]
pub use region::{normalize_name, SharedRegion};
