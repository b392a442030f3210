//! Video side of dronelink.
//!
//! - [`capture`]: where encoded frames come from
//! - [`producer`]: decode and publish into the shared frame slot, with
//!   periodic snapshots
//! - [`overlay`]: telemetry annotation on a private copy of a frame
//! - [`sink`]: where annotated frames go

pub mod capture;
pub mod error;
pub mod overlay;
pub mod producer;
pub mod sink;

pub use capture::{CaptureSource, CaptureSpec, DirectorySource, PatternSource};
pub use error::{Result, VideoError};
pub use overlay::{battery_label, Overlay, DEFAULT_FONT_PX};
pub use producer::{decode_frame, Producer, ProducerConfig, ProducerStats, StepOutcome};
pub use sink::{FrameSink, NullSink, PreviewFileSink};
