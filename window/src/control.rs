// This file is part of fpga_window, a library for driving FPGA accelerators through memory-mapped windows.
//
// Copyright 2025 The fpga_window Developers
//
// SPDX-License-Identifier: GPL-3.0-only
//
// fpga_window is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// fpga_window is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Start/done handshake over the accelerator's control register.
//!
//! The accelerator exposes no interrupt to the host, only a control word inside the window:
//!
//! ```text
//!  bit  31 ........................ 2    1      0
//!      +------------------------------+------+-------+
//!      |     accelerator defined      | done | start |
//!      +------------------------------+------+-------+
//! ```
//!
//! [`ControlChannel::start`] sets the start bit with a read/modify/write that leaves every
//! other bit alone. [`ControlChannel::wait_done`] then polls until the done bit reads back
//! set, bounded by a [`WaitPolicy`] and a [`CancelToken`].
//!
//! ```text
//!  Idle --start()--> Starting --write start bit--> Running --done bit--> Done
//!    ^                                                 |
//!    +-------------- deadline / poll limit / cancel ---+
//! ```

use crate::error::{WaitAbort, WindowError};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Bit 0 of the control word: launch the accelerator.
pub const START_MASK: u32 = 0b01;
/// Bit 1 of the control word: the accelerator finished.
pub const DONE_MASK: u32 = 0b10;

/// Single 32-bit register access at a byte offset in the window.
pub trait RegisterIo {
    fn read_register(&mut self, byte_offset: usize) -> Result<u32, WindowError>;
    fn write_register(&mut self, byte_offset: usize, value: u32) -> Result<(), WindowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Starting,
    Running,
    Done,
}

/// How long and how often [`ControlChannel::wait_done`] polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Pause between polls. Zero spins with [`std::hint::spin_loop`].
    pub poll_interval: Duration,
    /// Give up once this much time has passed since the wait began.
    pub timeout: Option<Duration>,
    /// Give up after this many reads of the control word. The first read counts, so the
    /// smallest useful budget is 1.
    pub max_polls: Option<u64>,
}

impl WaitPolicy {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Spin until the done bit shows up, however long that takes.
    pub fn unbounded() -> Self {
        WaitPolicy {
            poll_interval: Duration::ZERO,
            timeout: None,
            max_polls: None,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy {
            poll_interval: Duration::ZERO,
            timeout: Some(Self::DEFAULT_TIMEOUT),
            max_polls: None,
        }
    }
}

/// Shared flag that aborts a pending wait when set. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of a wait that saw the done bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Control word in which the done bit was observed.
    pub control_word: u32,
    /// Reads of the control word made while waiting.
    pub polls: u64,
    pub elapsed: Duration,
}

/// Longest single sleep between cancellation checks.
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(5);

/// Wait out one poll interval, cut short by the deadline or by `cancel`.
fn pause(policy: &WaitPolicy, began: Instant, cancel: &CancelToken) {
    if policy.poll_interval.is_zero() {
        std::hint::spin_loop();
        return;
    }
    let mut remaining = match policy.timeout {
        Some(timeout) => policy
            .poll_interval
            .min(timeout.saturating_sub(began.elapsed())),
        None => policy.poll_interval,
    };
    while !remaining.is_zero() && !cancel.is_cancelled() {
        let slice = remaining.min(CANCEL_CHECK_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}

/// Drives one start/done handshake through a [`RegisterIo`].
pub struct ControlChannel<'a, R: RegisterIo + ?Sized> {
    io: &'a mut R,
    offset: usize,
    state: HandshakeState,
}

impl<'a, R: RegisterIo + ?Sized> ControlChannel<'a, R> {
    /// Channel over the control word at byte `offset`.
    pub fn new(io: &'a mut R, offset: usize) -> Self {
        ControlChannel {
            io,
            offset,
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Set the start bit, preserving every other bit of the control word.
    ///
    /// # Returns: `Result<(), WindowError>`
    /// * `Ok(())` - the start bit was written; the channel is `Running`
    /// * `Err(WindowError::Argument)` - a handshake is already in flight
    /// * `Err(_)` - the register access failed; the channel is back to `Idle`
    pub fn start(&mut self) -> Result<(), WindowError> {
        if matches!(self.state, HandshakeState::Starting | HandshakeState::Running) {
            return Err(WindowError::Argument(format!(
                "Cannot start the accelerator while the handshake is {:?}",
                self.state
            )));
        }
        self.state = HandshakeState::Starting;
        let result = self
            .io
            .read_register(self.offset)
            .and_then(|control| {
                trace!("control word before start: {control:#x}");
                self.io.write_register(self.offset, control | START_MASK)
            });
        match result {
            Ok(()) => {
                debug!("Start bit set at {:#x}", self.offset);
                self.state = HandshakeState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = HandshakeState::Idle;
                Err(e)
            }
        }
    }

    /// Poll the control word until the done bit is set.
    ///
    /// # Returns: `Result<Completion, WindowError>`
    /// * `Ok(Completion)` - the done bit was observed; the channel is `Done`
    /// * `Err(WindowError::HandshakeTimeout)` - the policy ran out or `cancel` was signalled;
    ///   the channel is back to `Idle`
    /// * `Err(WindowError::Argument)` - no handshake was started
    pub fn wait_done(
        &mut self,
        policy: &WaitPolicy,
        cancel: &CancelToken,
    ) -> Result<Completion, WindowError> {
        if self.state != HandshakeState::Running {
            return Err(WindowError::Argument(format!(
                "Cannot wait for completion while the handshake is {:?}",
                self.state
            )));
        }
        let began = Instant::now();
        let mut polls: u64 = 0;
        loop {
            let control = match self.io.read_register(self.offset) {
                Ok(control) => control,
                Err(e) => {
                    self.state = HandshakeState::Idle;
                    return Err(e);
                }
            };
            polls += 1;
            if control & DONE_MASK != 0 {
                let elapsed = began.elapsed();
                debug!("Done bit observed after {polls} polls in {elapsed:?}");
                self.state = HandshakeState::Done;
                return Ok(Completion {
                    control_word: control,
                    polls,
                    elapsed,
                });
            }

            let cause = if cancel.is_cancelled() {
                Some(WaitAbort::Cancelled)
            } else if policy.timeout.is_some_and(|t| began.elapsed() >= t) {
                Some(WaitAbort::Deadline)
            } else if policy.max_polls.is_some_and(|max| polls >= max) {
                Some(WaitAbort::PollLimit)
            } else {
                None
            };
            if let Some(cause) = cause {
                let waited = began.elapsed();
                warn!("Gave up waiting for the done bit: {cause} after {polls} polls");
                self.state = HandshakeState::Idle;
                return Err(WindowError::HandshakeTimeout {
                    cause,
                    polls,
                    waited,
                });
            }

            pause(policy, began, cancel);
        }
    }

    /// [`start`](Self::start) followed by [`wait_done`](Self::wait_done).
    pub fn run(&mut self, policy: &WaitPolicy, cancel: &CancelToken) -> Result<Completion, WindowError> {
        self.start()?;
        self.wait_done(policy, cancel)
    }
}
