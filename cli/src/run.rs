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

//! Run command: set up the launch registers, start the accelerator and wait for done.

use crate::access::parse_number;
use clap::Args;
use fpga_window::WindowError;
use fpga_window::accelerator::{BufferAddresses, WorkGroup};
use fpga_window::config::DeploymentConfig;
use fpga_window::control::CancelToken;
use fpga_window::session::HardwareSession;
use log::info;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunOptions {
    /// Physical address of the input buffer
    #[arg(long, value_parser = parse_number)]
    input: Option<u64>,
    /// Physical address of the output buffer
    #[arg(long, value_parser = parse_number)]
    output: Option<u64>,
    /// Physical address of the auxiliary buffer (e.g. filter coefficients)
    #[arg(long, value_parser = parse_number)]
    aux: Option<u64>,
    /// Work-group id, one value per dimension
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
    group_id: Option<Vec<u32>>,
    /// Give up after this many milliseconds; 0 waits forever
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Give up after this many reads of the control word
    #[arg(long)]
    max_polls: Option<u64>,
    /// Load the configured bitstream and clocks before launching
    #[arg(long)]
    program: bool,
}

impl RunOptions {
    fn apply(&self, config: &mut DeploymentConfig) {
        if let Some(timeout_ms) = self.timeout_ms {
            config.wait.timeout = (timeout_ms != 0).then(|| Duration::from_millis(timeout_ms));
        }
        if self.max_polls.is_some() {
            config.wait.max_polls = self.max_polls;
        }
    }

    fn buffers(&self) -> Option<BufferAddresses> {
        if self.input.is_none() && self.output.is_none() && self.aux.is_none() {
            return None;
        }
        Some(BufferAddresses {
            input: self.input.unwrap_or_default(),
            output: self.output.unwrap_or_default(),
            aux: self.aux.unwrap_or_default(),
        })
    }

    fn work_group(&self) -> WorkGroup {
        let mut group = WorkGroup::default();
        if let Some(ids) = &self.group_id {
            for (slot, id) in group.id.iter_mut().zip(ids) {
                *slot = *id;
            }
        }
        group
    }
}

/// Launches the accelerator once and reports how the wait went.
pub fn run_handler(mut config: DeploymentConfig, options: &RunOptions) -> Result<String, WindowError> {
    options.apply(&mut config);
    let mut session = if options.program {
        HardwareSession::open(config)?
    } else {
        HardwareSession::attach(config)?
    };

    let mut accelerator = session.accelerator();
    if let Some(buffers) = options.buffers() {
        accelerator.set_buffer_addresses(buffers)?;
    }
    accelerator.set_work_group(options.work_group())?;
    let completion = accelerator.launch(&CancelToken::new())?;
    info!("control word after completion: {:#010x}", completion.control_word);
    session.close()?;
    Ok(format!(
        "done after {} polls in {:?} (control {:#010x})",
        completion.polls, completion.elapsed, completion.control_word
    ))
}
