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

//! Status command: FPGA manager state, fabric clocks and the accelerator's control word.

use fpga_window::WindowError;
use fpga_window::config::DeploymentConfig;
use fpga_window::control::{DONE_MASK, START_MASK};
use fpga_window::session::HardwareSession;
use fpga_window::session::bitstream::FpgaManagerLoader;
use fpga_window::session::clocks::FclkController;

fn describe_control(control: u32) -> &'static str {
    match (control & START_MASK != 0, control & DONE_MASK != 0) {
        (_, true) => "done",
        (true, false) => "running",
        (false, false) => "idle",
    }
}

/// Builds an ascii table describing the device, its clocks and the control word.
///
/// Unreadable entries are reported in the table rather than failing the whole command.
pub fn status_handler(config: &DeploymentConfig) -> Result<String, WindowError> {
    let loader = FpgaManagerLoader::new(&config.session, &config.paths);
    let state = loader.state().unwrap_or_else(|e| format!("unavailable ({e})"));
    let flags = loader
        .flags()
        .map(|f| format!("0x{f:X}"))
        .unwrap_or_else(|_| "unavailable".to_string());
    let mut ret_string = format!(
        "---- DEVICE ----\n\
        | dev | state | flags |\n\
        | {} | {state} | {flags} |\n",
        config.session.device_handle
    );

    ret_string += "\n---- CLOCKS ----\n\
                   | clock | requested | actual |\n";
    let clocks = FclkController::new(&config.paths.devcfg_dir);
    for (index, mhz) in config.session.clocks_mhz.iter().enumerate() {
        let actual = clocks
            .rate_hz(index)
            .map(|hz| format!("{hz} Hz"))
            .unwrap_or_else(|_| "unavailable".to_string());
        ret_string.push_str(&format!("| fclk{index} | {mhz} MHz | {actual} |\n"));
    }

    ret_string += "\n---- ACCELERATOR ----\n";
    let control = HardwareSession::attach(config.clone())
        .and_then(|mut session| session.accelerator().control_status());
    match control {
        Ok(control) => ret_string.push_str(&format!(
            "| control | {control:#010x} | {} |\n",
            describe_control(control)
        )),
        Err(e) => ret_string.push_str(&format!("| control | unavailable ({e}) |\n")),
    }
    Ok(ret_string)
}

#[cfg(test)]
mod test_describe_control {
    use crate::status::describe_control;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::idle(0b00, "idle")]
    #[case::running(0b01, "running")]
    #[case::done(0b11, "done")]
    #[case::done_after_start_dropped(0b10, "done")]
    #[case::other_bits_ignored(0xffff_fff0, "idle")]
    fn control_words_are_described(#[case] control: u32, #[case] expected: &str) {
        assert_that!(describe_control(control), eq(expected));
    }
}
