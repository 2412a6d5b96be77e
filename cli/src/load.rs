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

//! Load command: bring the fabric up without mapping the window.

use fpga_window::WindowError;
use fpga_window::config::DeploymentConfig;
use fpga_window::session::bitstream::{BitstreamLoader, FpgaManagerLoader};
use fpga_window::session::clocks::{ClockController, FclkController};
use std::path::Path;

/// Program `bitstream`, or the configured one, then apply the configured clock rates.
pub fn load_handler(
    config: &DeploymentConfig,
    bitstream: Option<&Path>,
) -> Result<String, WindowError> {
    let bitstream = bitstream
        .or(config.session.bitstream.as_deref())
        .ok_or(WindowError::Argument(
            "No bitstream given and none configured under [session]".to_string(),
        ))?;
    let loader = FpgaManagerLoader::new(&config.session, &config.paths);
    loader.load(bitstream)?;
    FclkController::new(&config.paths.devcfg_dir).configure(&config.session.clocks_mhz)?;
    Ok(format!(
        "{} loaded onto {}",
        bitstream.display(),
        config.session.device_handle
    ))
}
