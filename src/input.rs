//! Keyboard input with a timeout: the one place the measurement loop blocks.

use crate::error::Result;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::termios::{LocalFlags, SetArg, SpecialCharacterIndices, Termios, tcgetattr, tcsetattr};
use std::fs::File;
use std::io::{IsTerminal, Read};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    /// Input closed.
    Eof,
}

pub trait KeySource {
    /// Wait up to `timeout` for a key. `None` means the time ran out.
    fn wait(&mut self, timeout: Duration) -> Result<Option<Key>>;
}

/// Sleeps through the interval; used when nobody is at the keyboard.
#[derive(Debug, Default)]
pub struct NoInput;

impl KeySource for NoInput {
    fn wait(&mut self, timeout: Duration) -> Result<Option<Key>> {
        std::thread::sleep(timeout);
        Ok(None)
    }
}

/// Single keypresses from the controlling terminal.
///
/// The terminal is switched to non-canonical, no-echo mode for the lifetime
/// of the value and restored on drop.
pub struct TerminalInput {
    tty: File,
    saved: Option<Termios>,
}

impl TerminalInput {
    pub fn new() -> Result<Self> {
        let stdin = std::io::stdin();
        let tty = File::from(stdin.as_fd().try_clone_to_owned()?);

        let saved = if stdin.is_terminal() {
            let saved = tcgetattr(tty.as_fd())?;
            let mut raw = saved.clone();
            raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
            raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
            raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
            tcsetattr(tty.as_fd(), SetArg::TCSANOW, &raw)?;
            Some(saved)
        } else {
            log::debug!("stdin is not a terminal; keys need a newline");
            None
        };

        Ok(Self { tty, saved })
    }

    fn read_key(&mut self) -> Result<Key> {
        let mut byte = [0u8; 1];
        match self.tty.read(&mut byte)? {
            0 => Ok(Key::Eof),
            _ => Ok(Key::Char(char::from(byte[0]))),
        }
    }
}

impl KeySource for TerminalInput {
    fn wait(&mut self, timeout: Duration) -> Result<Option<Key>> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(None);
            }
            // poll takes at most u16::MAX milliseconds per call
            let chunk = u16::try_from(left.as_millis()).unwrap_or(u16::MAX).max(1);
            let mut fds = [PollFd::new(self.tty.as_fd(), PollFlags::POLLIN)];
            let ready = match poll(&mut fds, PollTimeout::from(chunk)) {
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            };
            if ready == 0 {
                continue;
            }
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
                return self.read_key().map(Some);
            }
        }
    }
}

impl Drop for TerminalInput {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved
            && let Err(e) = tcsetattr(self.tty.as_fd(), SetArg::TCSANOW, saved)
        {
            log::warn!("failed to restore terminal: {}", e);
        }
    }
}
