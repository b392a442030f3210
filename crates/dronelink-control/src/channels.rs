use std::fmt;

use crate::input::Movement;

/// Lowest valid channel value.
pub const CHANNEL_MIN: u16 = 1000;
/// Highest valid channel value.
pub const CHANNEL_MAX: u16 = 2000;
/// Stick centred.
pub const NEUTRAL: u16 = 1500;
/// Default value of the fixed auxiliary (mode) channel.
pub const AUX_DEFAULT: u16 = 2000;

/// The five RC channels sent on every control tick.
///
/// Channel order on the wire is `[vertical, yaw, pitch, roll, aux]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelVector {
    pub vertical: u16,
    pub yaw: u16,
    pub pitch: u16,
    pub roll: u16,
    pub aux: u16,
}

impl ChannelVector {
    /// All movement channels centred, aux at `aux`.
    pub fn neutral(aux: u16) -> Self {
        Self {
            vertical: NEUTRAL,
            yaw: NEUTRAL,
            pitch: NEUTRAL,
            roll: NEUTRAL,
            aux,
        }
    }

    /// Channel values in wire order (ch1..ch5).
    pub fn as_array(&self) -> [u16; 5] {
        [self.vertical, self.yaw, self.pitch, self.roll, self.aux]
    }

    /// Deflect the one channel `movement` drives to its configured bound.
    pub fn apply(&mut self, movement: Movement, limits: &ChannelLimits) {
        match movement {
            Movement::Forward => self.pitch = limits.translation_low,
            Movement::Back => self.pitch = limits.translation_high,
            Movement::Left => self.roll = limits.translation_low,
            Movement::Right => self.roll = limits.translation_high,
            Movement::YawLeft => self.yaw = limits.yaw_high,
            Movement::YawRight => self.yaw = limits.yaw_low,
            Movement::Up => self.vertical = limits.vertical_high,
            Movement::Down => self.vertical = limits.vertical_low,
        }
    }

    /// Centre the four movement channels; aux is left alone.
    pub fn neutralize_movement(&mut self) {
        self.vertical = NEUTRAL;
        self.yaw = NEUTRAL;
        self.pitch = NEUTRAL;
        self.roll = NEUTRAL;
    }

    pub fn is_movement_neutral(&self) -> bool {
        [self.vertical, self.yaw, self.pitch, self.roll]
            .iter()
            .all(|&v| v == NEUTRAL)
    }

    /// Number of movement channels away from neutral.
    pub fn deflected(&self) -> usize {
        [self.vertical, self.yaw, self.pitch, self.roll]
            .iter()
            .filter(|&&v| v != NEUTRAL)
            .count()
    }

    /// Clamp every channel into `[CHANNEL_MIN, CHANNEL_MAX]`.
    pub fn clamped(self) -> Self {
        let clamp = |v: u16| v.clamp(CHANNEL_MIN, CHANNEL_MAX);
        Self {
            vertical: clamp(self.vertical),
            yaw: clamp(self.yaw),
            pitch: clamp(self.pitch),
            roll: clamp(self.roll),
            aux: clamp(self.aux),
        }
    }
}

impl Default for ChannelVector {
    fn default() -> Self {
        Self::neutral(AUX_DEFAULT)
    }
}

impl fmt::Display for ChannelVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [c1, c2, c3, c4, c5] = self.as_array();
        write!(f, "[{c1} {c2} {c3} {c4} {c5}]")
    }
}

/// Deflection bounds for each stick, plus the fixed aux value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLimits {
    /// Pitch/roll low bound (forward, left). Default: 1300.
    pub translation_low: u16,
    /// Pitch/roll high bound (back, right). Default: 1700.
    pub translation_high: u16,
    /// Yaw-right value. Default: 1000.
    pub yaw_low: u16,
    /// Yaw-left value. Default: 2000.
    pub yaw_high: u16,
    /// Descend value. Default: 1000.
    pub vertical_low: u16,
    /// Climb value. Default: 2000.
    pub vertical_high: u16,
    /// Value sent on ch5 every tick. Default: 2000.
    pub aux: u16,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            translation_low: 1300,
            translation_high: 1700,
            yaw_low: CHANNEL_MIN,
            yaw_high: CHANNEL_MAX,
            vertical_low: CHANNEL_MIN,
            vertical_high: CHANNEL_MAX,
            aux: AUX_DEFAULT,
        }
    }
}
