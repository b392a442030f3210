//! Raw, non-blocking keyboard input from the controlling terminal.

use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsRawFd, RawFd};

use dronelink_control::{InputSource, KEY_ESCAPE};
use tracing::debug;

/// Reads single key presses from stdin without waiting for Enter.
///
/// Canonical mode and echo are switched off while this is alive; signal
/// generation stays on so Ctrl-C still interrupts. The previous terminal
/// settings are restored on drop.
pub struct TerminalInput {
    fd: RawFd,
    saved: libc::termios,
    pending: VecDeque<u8>,
}

impl TerminalInput {
    pub fn open() -> io::Result<Self> {
        let fd = io::stdin().as_raw_fd();
        // SAFETY: isatty only inspects the descriptor.
        if unsafe { libc::isatty(fd) } != 1 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stdin is not a terminal (use --keys to script input)",
            ));
        }

        // SAFETY: termios is plain old data; tcgetattr fills it in.
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        raw.c_cc[libc::VMIN] = 0;
        raw.c_cc[libc::VTIME] = 0;
        // SAFETY: `raw` is a valid termios derived from the current settings.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        debug!("terminal switched to raw key input");

        Ok(Self {
            fd,
            saved,
            pending: VecDeque::new(),
        })
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 64];
        // SAFETY: buf is valid for buf.len() bytes.
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(()),
                _ => Err(err),
            };
        }
        push_keys(&buf[..n as usize], &mut self.pending);
        Ok(())
    }
}

impl InputSource for TerminalInput {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        if self.pending.is_empty() {
            self.fill()?;
        }
        Ok(self.pending.pop_front())
    }
}

impl Drop for TerminalInput {
    fn drop(&mut self) {
        // SAFETY: restores the settings captured in `open`.
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved);
        }
    }
}

/// Queue the keys in one chunk of terminal input.
///
/// A lone ESC is the exit key. ESC followed by `[` or `O` starts an escape
/// sequence (arrow keys, function keys) which is dropped whole.
fn push_keys(chunk: &[u8], pending: &mut VecDeque<u8>) {
    let mut i = 0;
    while i < chunk.len() {
        let byte = chunk[i];
        i += 1;
        if byte != KEY_ESCAPE {
            pending.push_back(byte);
            continue;
        }
        match chunk.get(i) {
            Some(b'[') | Some(b'O') => {
                i += 1;
                while i < chunk.len() {
                    let final_byte = (0x40..=0x7e).contains(&chunk[i]);
                    i += 1;
                    if final_byte {
                        break;
                    }
                }
            }
            _ => pending.push_back(KEY_ESCAPE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(chunk: &[u8]) -> Vec<u8> {
        let mut pending = VecDeque::new();
        push_keys(chunk, &mut pending);
        pending.into_iter().collect()
    }

    #[test]
    fn plain_keys_queue_in_order() {
        assert_eq!(keys(b"1w5"), b"1w5");
    }

    #[test]
    fn lone_escape_is_exit() {
        assert_eq!(keys(&[b'w', KEY_ESCAPE]), vec![b'w', KEY_ESCAPE]);
    }

    #[test]
    fn arrow_and_function_sequences_are_dropped() {
        assert_eq!(keys(b"\x1b[Aw"), b"w");
        assert_eq!(keys(b"\x1b[15~s"), b"s");
        assert_eq!(keys(b"\x1bOPa"), b"a");
    }
}
