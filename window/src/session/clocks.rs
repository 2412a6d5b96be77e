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

//! Fabric clock configuration.
//!
//! Zynq-7000 kernels expose the four PL clocks through the devcfg node:
//!
//! ```text
//! /sys/devices/soc0/amba/f8007000.devcfg
//! ├── fclk_export          <- write "fclkN" to create fclk/fclkN
//! └── fclk
//!     └── fclk0
//!         ├── enable       <- 1 / 0
//!         ├── round_rate
//!         └── set_rate     <- rate in Hz
//! ```

use crate::error::WindowError;
use crate::system_io::{fs_read_trimmed, fs_write};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Number of fabric clocks a Zynq-7000 provides to the programmable logic.
pub const NUM_FPGA_CLOCKS: usize = 4;

/// Something that can put the fabric clocks at the requested rates.
pub trait ClockController {
    /// Apply `clocks_mhz[n]` to clock `n`. Zero disables a clock.
    fn configure(&self, clocks_mhz: &[f64]) -> Result<(), WindowError>;
}

/// Reject clock lists the hardware cannot take.
pub fn validate_clocks(clocks_mhz: &[f64]) -> Result<(), WindowError> {
    if clocks_mhz.len() > NUM_FPGA_CLOCKS {
        return Err(WindowError::Configuration(format!(
            "{} clock rates given, the fabric has at most {NUM_FPGA_CLOCKS}",
            clocks_mhz.len()
        )));
    }
    if let Some((index, mhz)) = clocks_mhz
        .iter()
        .enumerate()
        .find(|(_, mhz)| !mhz.is_finite() || **mhz < 0.0)
    {
        return Err(WindowError::Configuration(format!(
            "fclk{index} rate {mhz} MHz is not a non-negative number"
        )));
    }
    Ok(())
}

/// Clock controller over the devcfg `fclk` sysfs interface.
#[derive(Debug, Clone)]
pub struct FclkController {
    devcfg_dir: PathBuf,
}

impl FclkController {
    pub fn new(devcfg_dir: &Path) -> Self {
        FclkController {
            devcfg_dir: devcfg_dir.to_path_buf(),
        }
    }

    fn clock_dir(&self, index: usize) -> PathBuf {
        self.devcfg_dir.join("fclk").join(format!("fclk{index}"))
    }

    /// Current rate of clock `index` in Hz.
    pub fn rate_hz(&self, index: usize) -> Result<u64, WindowError> {
        let rate_path = self.clock_dir(index).join("set_rate");
        let contents = fs_read_trimmed(&rate_path)?;
        contents.trim().parse::<u64>().map_err(|e| {
            WindowError::HardwareInit(format!("Cannot parse {contents:?} from {rate_path:?}: {e}"))
        })
    }

    fn export(&self, index: usize) -> Result<(), WindowError> {
        let name = format!("fclk{index}");
        debug!("Exporting {name}");
        fs_write(&self.devcfg_dir.join("fclk_export"), false, &name)?;
        if !self.clock_dir(index).exists() {
            return Err(WindowError::HardwareInit(format!(
                "{name} did not appear under {:?} after export",
                self.devcfg_dir.join("fclk")
            )));
        }
        Ok(())
    }
}

impl ClockController for FclkController {
    fn configure(&self, clocks_mhz: &[f64]) -> Result<(), WindowError> {
        validate_clocks(clocks_mhz)?;
        for (index, &mhz) in clocks_mhz.iter().enumerate() {
            let clock_dir = self.clock_dir(index);
            if mhz == 0.0 {
                if clock_dir.exists() {
                    debug!("Disabling fclk{index}");
                    fs_write(&clock_dir.join("enable"), false, "0")?;
                }
                continue;
            }
            if !clock_dir.exists() {
                self.export(index)?;
            }
            let requested = (mhz * 1_000_000.0).round() as u64;
            fs_write(&clock_dir.join("set_rate"), false, requested.to_string())?;
            fs_write(&clock_dir.join("enable"), false, "1")?;

            let actual = self.rate_hz(index)?;
            if actual != requested {
                warn!("fclk{index} runs at {actual} Hz, {requested} Hz was requested");
            } else {
                info!("fclk{index} set to {mhz} MHz");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_fclk_controller {
    use crate::session::clocks::{ClockController, FclkController, validate_clocks};
    use crate::test_support::scratch_dir;
    use googletest::prelude::*;
    use rstest::*;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn devcfg_tree(name: &str, clocks: &[usize]) -> PathBuf {
        let root = scratch_dir(name);
        fs::write(root.join("fclk_export"), "").unwrap();
        for clock in clocks {
            let dir = root.join("fclk").join(format!("fclk{clock}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("enable"), "0\n").unwrap();
            fs::write(dir.join("set_rate"), "50000000\n").unwrap();
        }
        root
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[gtest]
    fn sets_rate_and_enables() {
        let root = devcfg_tree("fclk-set", &[0, 1]);
        let controller = FclkController::new(&root);
        controller.configure(&[100.0, 0.0, 0.0, 0.0]).unwrap();

        let fclk0 = root.join("fclk/fclk0");
        expect_that!(read(&fclk0.join("set_rate")), eq("100000000"));
        expect_that!(read(&fclk0.join("enable")), eq("1"));
        expect_that!(controller.rate_hz(0), ok(eq(&100_000_000)));
        expect_that!(read(&root.join("fclk/fclk1/enable")), eq("0"));
        expect_that!(read(&root.join("fclk_export")), eq(""));
    }

    #[gtest]
    fn fractional_rates_round_to_hz() {
        let root = devcfg_tree("fclk-round", &[0]);
        FclkController::new(&root).configure(&[142.857_142_9]).unwrap();
        expect_that!(read(&root.join("fclk/fclk0/set_rate")), eq("142857143"));
    }

    #[gtest]
    fn missing_clock_is_exported() {
        let root = devcfg_tree("fclk-export", &[]);
        let result = FclkController::new(&root).configure(&[0.0, 25.0]);
        expect_that!(read(&root.join("fclk_export")), eq("fclk1"));
        assert_that!(
            result,
            err(displays_as(contains_substring("fclk1 did not appear")))
        );
    }

    #[gtest]
    #[rstest]
    #[case::five_clocks(vec![1.0; 5], "at most 4")]
    #[case::negative(vec![100.0, -1.0], "fclk1 rate -1 MHz")]
    #[case::nan(vec![f64::NAN], "fclk0 rate NaN MHz")]
    fn rejects_bad_rates(#[case] clocks: Vec<f64>, #[case] message: &str) {
        assert_that!(
            validate_clocks(&clocks),
            err(displays_as(contains_substring(message)))
        );
    }
}
