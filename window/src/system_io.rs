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

//! Error wrapping sysfs I/O helpers.
//!
//! Thin wrappers around [`OpenOptions`] used by the bitstream loader and the clock
//! controller. Every failure is converted to a [`WindowError`] carrying the path that was
//! being accessed, and every access is trace logged.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use fpga_window::system_io::{fs_read, fs_write};
//! # use std::path::Path;
//! # fn example() -> Result<(), fpga_window::error::WindowError> {
//! let state = fs_read(Path::new("/sys/class/fpga_manager/fpga0/state"))?;
//! fs_write(Path::new("/sys/class/fpga_manager/fpga0/flags"), false, "0")?;
//! # Ok(())
//! # }
//! ```

use crate::error::WindowError;
use log::trace;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, WindowError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(WindowError::IORead)` - If the file cannot be opened or read
pub fn fs_read(file_path: &Path) -> Result<String, WindowError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(WindowError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Write a string value to a file.
///
/// Sysfs attributes must already exist, so callers pass `create = false` for them. The file
/// is truncated first, the same way a shell redirect would.
///
/// # Returns: `Result<(), WindowError>`
/// * `Ok(())` - Write succeeded
/// * `Err(WindowError::IOWrite)` - If the file cannot be opened or written
pub fn fs_write(file_path: &Path, create: bool, value: impl AsRef<str>) -> Result<(), WindowError> {
    trace!(
        "Attempting to write {:?} to {:?}",
        value.as_ref(),
        file_path
    );
    let result = OpenOptions::new()
        .create(create)
        .read(false)
        .write(true)
        .truncate(true)
        .open(file_path)
        .and_then(|mut f| write!(f, "{}", value.as_ref()));
    match result {
        Ok(_) => {
            trace!("Write done.");
            Ok(())
        }
        Err(e) => Err(WindowError::IOWrite {
            data: value.as_ref().to_owned(),
            file: file_path.into(),
            e,
        }),
    }
}

/// Read a sysfs attribute with its trailing newline removed.
pub fn fs_read_trimmed(file_path: &Path) -> Result<String, WindowError> {
    fs_read(file_path).map(|s| s.trim_end_matches('\n').to_string())
}
