use tracing::{debug, info, warn};

use crate::channels::ChannelVector;
use crate::error::LinkError;

/// Command interface to the flight controller.
///
/// Commands express intent only; the controller owns the authoritative
/// vehicle state. None of these calls are expected to block for long.
pub trait FlightLink {
    fn connect(&mut self) -> Result<(), LinkError>;
    fn close(&mut self) -> Result<(), LinkError>;
    fn arm(&mut self) -> Result<(), LinkError>;
    fn disarm(&mut self) -> Result<(), LinkError>;
    fn takeoff(&mut self) -> Result<(), LinkError>;
    fn land(&mut self) -> Result<(), LinkError>;
    fn send_channels(&mut self, channels: &ChannelVector) -> Result<(), LinkError>;
    /// Battery percentage. With `use_cached` the controller answers from the
    /// last telemetry it received instead of querying the vehicle.
    fn battery_status(&mut self, use_cached: bool) -> Option<u8>;
}

impl<L: FlightLink + ?Sized> FlightLink for Box<L> {
    fn connect(&mut self) -> Result<(), LinkError> {
        (**self).connect()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        (**self).close()
    }

    fn arm(&mut self) -> Result<(), LinkError> {
        (**self).arm()
    }

    fn disarm(&mut self) -> Result<(), LinkError> {
        (**self).disarm()
    }

    fn takeoff(&mut self) -> Result<(), LinkError> {
        (**self).takeoff()
    }

    fn land(&mut self) -> Result<(), LinkError> {
        (**self).land()
    }

    fn send_channels(&mut self, channels: &ChannelVector) -> Result<(), LinkError> {
        (**self).send_channels(channels)
    }

    fn battery_status(&mut self, use_cached: bool) -> Option<u8> {
        (**self).battery_status(use_cached)
    }
}

/// Issue `land`, retrying once if the first attempt fails.
pub fn land_with_retry(link: &mut dyn FlightLink) -> Result<(), LinkError> {
    match link.land() {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(error = %err, "land failed, retrying once");
            link.land()
        }
    }
}

/// In-process stand-in for a flight controller.
///
/// Tracks arm/airborne state with the same preconditions a real controller
/// enforces and drains a simulated battery as channel commands are sent.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    connected: bool,
    armed: bool,
    airborne: bool,
    battery: u8,
    drain_every: u64,
    channels_sent: u64,
    last_channels: Option<ChannelVector>,
}

impl SimulatedLink {
    /// 1% of battery per this many channel commands (~10 s at 50 Hz).
    pub const DEFAULT_DRAIN_EVERY: u64 = 500;

    pub fn new() -> Self {
        Self {
            connected: false,
            armed: false,
            airborne: false,
            battery: 100,
            drain_every: Self::DEFAULT_DRAIN_EVERY,
            channels_sent: 0,
            last_channels: None,
        }
    }

    pub fn with_battery(mut self, level: u8) -> Self {
        self.battery = level.min(100);
        self
    }

    /// Drain 1% every `commands` channel sends; 0 disables draining.
    pub fn with_drain_every(mut self, commands: u64) -> Self {
        self.drain_every = commands;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_airborne(&self) -> bool {
        self.airborne
    }

    pub fn channels_sent(&self) -> u64 {
        self.channels_sent
    }

    pub fn last_channels(&self) -> Option<ChannelVector> {
        self.last_channels
    }

    fn ensure_connected(&self) -> Result<(), LinkError> {
        if self.connected {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightLink for SimulatedLink {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.connected = true;
        info!(battery = self.battery, "simulated flight link connected");
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.connected = false;
        info!(
            channels_sent = self.channels_sent,
            "simulated flight link closed"
        );
        Ok(())
    }

    fn arm(&mut self) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.armed = true;
        info!("armed");
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), LinkError> {
        self.ensure_connected()?;
        if self.airborne {
            return Err(LinkError::Rejected {
                command: "disarm",
                reason: "vehicle is airborne".to_string(),
            });
        }
        self.armed = false;
        info!("disarmed");
        Ok(())
    }

    fn takeoff(&mut self) -> Result<(), LinkError> {
        self.ensure_connected()?;
        if !self.armed {
            return Err(LinkError::Rejected {
                command: "takeoff",
                reason: "vehicle is not armed".to_string(),
            });
        }
        self.airborne = true;
        info!("takeoff");
        Ok(())
    }

    fn land(&mut self) -> Result<(), LinkError> {
        self.ensure_connected()?;
        if self.airborne {
            info!("landing");
        } else {
            debug!("land requested while on the ground");
        }
        self.airborne = false;
        self.armed = false;
        Ok(())
    }

    fn send_channels(&mut self, channels: &ChannelVector) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.channels_sent += 1;
        self.last_channels = Some(*channels);
        if self.drain_every > 0 && self.channels_sent % self.drain_every == 0 {
            self.battery = self.battery.saturating_sub(1);
        }
        Ok(())
    }

    fn battery_status(&mut self, _use_cached: bool) -> Option<u8> {
        self.connected.then_some(self.battery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_require_connection() {
        let mut link = SimulatedLink::new();
        assert!(matches!(link.arm(), Err(LinkError::NotConnected)));
        assert_eq!(link.battery_status(true), None);

        link.connect().unwrap();
        link.arm().unwrap();
        assert!(link.is_armed());
        link.close().unwrap();
        assert!(matches!(
            link.send_channels(&ChannelVector::default()),
            Err(LinkError::NotConnected)
        ));
    }

    #[test]
    fn takeoff_requires_arm_and_land_disarms() {
        let mut link = SimulatedLink::new();
        link.connect().unwrap();

        assert!(matches!(
            link.takeoff(),
            Err(LinkError::Rejected {
                command: "takeoff",
                ..
            })
        ));
        link.arm().unwrap();
        link.takeoff().unwrap();
        assert!(link.is_airborne());
        assert!(link.disarm().is_err());

        link.land().unwrap();
        assert!(!link.is_airborne());
        assert!(!link.is_armed());
    }

    #[test]
    fn battery_drains_with_commands() {
        let mut link = SimulatedLink::new().with_battery(50).with_drain_every(2);
        link.connect().unwrap();
        for _ in 0..4 {
            link.send_channels(&ChannelVector::default()).unwrap();
        }
        assert_eq!(link.battery_status(true), Some(48));
        assert_eq!(link.channels_sent(), 4);
        assert_eq!(link.last_channels(), Some(ChannelVector::default()));
    }

    struct FlakyLand {
        failures_left: u32,
        attempts: u32,
    }

    impl FlightLink for FlakyLand {
        fn connect(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
        fn arm(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
        fn disarm(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
        fn takeoff(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
        fn land(&mut self) -> Result<(), LinkError> {
            self.attempts += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(LinkError::Rejected {
                    command: "land",
                    reason: "busy".to_string(),
                });
            }
            Ok(())
        }
        fn send_channels(&mut self, _: &ChannelVector) -> Result<(), LinkError> {
            Ok(())
        }
        fn battery_status(&mut self, _: bool) -> Option<u8> {
            None
        }
    }

    #[test]
    fn land_is_retried_exactly_once() {
        let mut link = FlakyLand {
            failures_left: 1,
            attempts: 0,
        };
        land_with_retry(&mut link).unwrap();
        assert_eq!(link.attempts, 2);

        let mut link = FlakyLand {
            failures_left: 5,
            attempts: 0,
        };
        assert!(land_with_retry(&mut link).is_err());
        assert_eq!(link.attempts, 2);
    }
}
