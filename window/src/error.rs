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

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Why a handshake wait gave up before observing the done bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitAbort {
    /// The configured timeout elapsed.
    Deadline,
    /// The configured poll budget was used up.
    PollLimit,
    /// The caller signalled the cancel token.
    Cancelled,
}

impl fmt::Display for WaitAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitAbort::Deadline => write!(f, "deadline elapsed"),
            WaitAbort::PollLimit => write!(f, "poll limit reached"),
            WaitAbort::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("WindowError::Configuration: {0}")]
    Configuration(String),
    #[error("WindowError::HardwareInit: Hardware initialization failed: {0}")]
    HardwareInit(String),
    #[error(
        "WindowError::HandshakeTimeout: done bit not observed ({cause}) after {polls} polls in {waited:?}"
    )]
    HandshakeTimeout {
        cause: WaitAbort,
        polls: u64,
        waited: Duration,
    },
    #[error("WindowError::FPGAState: FPGA state is not as expected: {0}")]
    FPGAState(String),
    #[error("WindowError::Flag: Failed to read flags: {0}")]
    Flag(String),
    #[error("WindowError::Argument: {0}")]
    Argument(String),
    #[error("WindowError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("WindowError::IOWrite: An IO error occurred when writing {data:?} to {file:?}: {e}")]
    IOWrite {
        data: String,
        file: PathBuf,
        e: std::io::Error,
    },
    #[error("WindowError::IOMap: Failed to map {len} bytes at {offset:#x} from {file:?}: {e}")]
    IOMap {
        file: PathBuf,
        offset: u64,
        len: usize,
        e: std::io::Error,
    },
    #[error("WindowError::ConfigParse: Failed to parse {file:?}: {e}")]
    ConfigParse { file: PathBuf, e: toml::de::Error },
}
