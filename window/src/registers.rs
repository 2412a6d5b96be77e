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

//! Named register offsets of the accelerator's slave interface.

use crate::address_space::AddressSpace;
use crate::error::WindowError;
use serde::Deserialize;

/// Byte offsets, inside the window, of the registers the host writes before a launch.
///
/// Buffer pointers are 64-bit registers: low word at the offset, high word 4 bytes above.
/// Work-group id and global offset fields are 32-bit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegisterMap {
    pub control: usize,
    pub group_id: [usize; 3],
    pub global_offset: [usize; 3],
    pub input_buffer: usize,
    pub output_buffer: usize,
    pub aux_buffer: usize,
}

impl Default for RegisterMap {
    fn default() -> Self {
        RegisterMap {
            control: 0x00,
            group_id: [0x10, 0x18, 0x20],
            global_offset: [0x28, 0x30, 0x38],
            input_buffer: 0x40,
            output_buffer: 0x48,
            aux_buffer: 0x50,
        }
    }
}

impl RegisterMap {
    /// `(name, offset, width in bytes)` for every register.
    pub fn fields(&self) -> Vec<(&'static str, usize, usize)> {
        vec![
            ("control", self.control, 4),
            ("group_id[0]", self.group_id[0], 4),
            ("group_id[1]", self.group_id[1], 4),
            ("group_id[2]", self.group_id[2], 4),
            ("global_offset[0]", self.global_offset[0], 4),
            ("global_offset[1]", self.global_offset[1], 4),
            ("global_offset[2]", self.global_offset[2], 4),
            ("input_buffer", self.input_buffer, 8),
            ("output_buffer", self.output_buffer, 8),
            ("aux_buffer", self.aux_buffer, 8),
        ]
    }

    /// Check that every register is 32-bit aligned, lies inside `space` and does not overlap
    /// another one.
    pub fn validate(&self, space: &AddressSpace) -> Result<(), WindowError> {
        let fields = self.fields();
        for &(name, offset, width) in &fields {
            if offset % 4 != 0 {
                return Err(WindowError::Configuration(format!(
                    "Register {name} at {offset:#x} is not 32-bit aligned"
                )));
            }
            if offset + width > space.total_size() {
                return Err(WindowError::Configuration(format!(
                    "Register {name} at {offset:#x} lies outside the {:#x} byte window",
                    space.total_size()
                )));
            }
        }
        for (i, &(name, offset, width)) in fields.iter().enumerate() {
            for &(other, other_offset, other_width) in &fields[i + 1..] {
                if offset < other_offset + other_width && other_offset < offset + width {
                    return Err(WindowError::Configuration(format!(
                        "Register {name} at {offset:#x} overlaps {other} at {other_offset:#x}"
                    )));
                }
            }
        }
        Ok(())
    }
}
