use std::collections::VecDeque;
use std::io;

/// Escape key byte; ends the session.
pub const KEY_ESCAPE: u8 = 0x1b;

/// Binary stick deflections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Movement {
    Forward,
    Back,
    Left,
    Right,
    YawLeft,
    YawRight,
    Up,
    Down,
}

/// What one key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Arm,
    Disarm,
    Takeoff,
    Land,
    ToggleHover,
    Move(Movement),
    Exit,
}

impl Action {
    /// Map a key byte to its action.
    ///
    /// ```text
    /// 1 arm   2 disarm   3 takeoff   4 land   5 hover on/off
    /// q yaw-left   w forward   e yaw-right      i up
    /// a left       s back      d right          k down
    /// Esc exit
    /// ```
    pub fn from_key(key: u8) -> Option<Self> {
        let action = match key {
            KEY_ESCAPE => Self::Exit,
            b'1' => Self::Arm,
            b'2' => Self::Disarm,
            b'3' => Self::Takeoff,
            b'4' => Self::Land,
            b'5' => Self::ToggleHover,
            b'w' => Self::Move(Movement::Forward),
            b's' => Self::Move(Movement::Back),
            b'a' => Self::Move(Movement::Left),
            b'd' => Self::Move(Movement::Right),
            b'q' => Self::Move(Movement::YawLeft),
            b'e' => Self::Move(Movement::YawRight),
            b'i' => Self::Move(Movement::Up),
            b'k' => Self::Move(Movement::Down),
            _ => return None,
        };
        Some(action)
    }
}

/// Source of discrete key presses, polled once per control tick.
pub trait InputSource {
    /// Return the next pending key, if any, without blocking.
    fn poll_key(&mut self) -> io::Result<Option<u8>>;
}

impl<S: InputSource + ?Sized> InputSource for Box<S> {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        (**self).poll_key()
    }
}

/// Replays a fixed key sequence, one key per poll, then reports no input.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    keys: VecDeque<Option<u8>>,
}

impl ScriptedInput {
    pub fn new(keys: impl IntoIterator<Item = Option<u8>>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Script from text: each byte is a key, `.` is an idle tick.
    pub fn from_keys(script: &str) -> Self {
        Self::new(
            script
                .bytes()
                .map(|b| if b == b'.' { None } else { Some(b) }),
        )
    }

    /// Append a key (or idle tick) to the end of the script.
    pub fn push(&mut self, key: Option<u8>) {
        self.keys.push_back(key);
    }

    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        Ok(self.keys.pop_front().flatten())
    }
}
