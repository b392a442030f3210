//! Teleoperation side of dronelink.
//!
//! - [`control_loop`]: the 50 Hz key-to-channels state machine
//! - [`link`]: the flight-controller collaborator and a simulated one
//! - [`lifecycle`] and [`session`]: producer supervision, region attach and
//!   the ordered shutdown
//! - [`pilot`]: the combined render/control loop

pub mod channels;
pub mod control_loop;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod link;
pub mod pilot;
pub mod session;
pub mod telemetry;

pub use channels::{ChannelLimits, ChannelVector, AUX_DEFAULT, CHANNEL_MAX, CHANNEL_MIN, NEUTRAL};
pub use control_loop::{
    ControlConfig, ControlLoop, ControlStats, FlightPhase, SequenceStage, SequenceTimings,
    TickOutcome, DEFAULT_TICK_PERIOD,
};
pub use error::{ControlError, LinkError, Result};
pub use input::{Action, InputSource, Movement, ScriptedInput, KEY_ESCAPE};
pub use lifecycle::{
    attach_with_retry, AttachRetry, ChildProducer, ExternalProducer, ProducerHandle,
    DEFAULT_TERMINATE_GRACE,
};
pub use link::{land_with_retry, FlightLink, SimulatedLink};
pub use pilot::{run_pilot, run_session, PilotStats, SessionEnd, StopReason};
pub use session::{SessionContext, ShutdownReport, ShutdownStep, StepResult};
pub use telemetry::{BatteryMonitor, DEFAULT_TELEMETRY_INTERVAL};
