//! Shared-memory video link and keyboard teleoperation for small drones.
//!
//! A producer process decodes camera frames into a single-slot shared-memory
//! region; the pilot process reads the latest frame each tick, overlays
//! telemetry, and runs a 50 Hz keyboard-to-RC-channels control loop against
//! a flight-controller link.
//!
//! # Crate Structure
//!
//! - [`shm`]: named shared-memory regions
//! - [`frame`]: the 12-byte header and single-slot frame protocol
//! - [`video`]: capture, decode, producer loop, overlay and sinks
//! - [`control`]: control loop, flight link, lifecycle and shutdown

/// Re-export shared-memory types.
pub mod shm {
    pub use dronelink_shm::*;
}

/// Re-export frame protocol types.
pub mod frame {
    pub use dronelink_frame::*;
}

/// Re-export video pipeline types.
pub mod video {
    pub use dronelink_video::*;
}

/// Re-export teleoperation types.
pub mod control {
    pub use dronelink_control::*;
}
