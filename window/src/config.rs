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

//! Deployment configuration.
//!
//! Everything that differs between boards and bitstreams lives in a TOML file, by default
//! [`DEFAULT_CONFIG_PATH`]. Every section and every field is optional; anything missing falls
//! back to the hardcoded values below, which describe a ZedBoard running a single HLS kernel.
//!
//! ```toml
//! [window]
//! base_address = 0x43c00000
//! total_size = 0x100000
//! page_size = 0x1000
//!
//! [registers]
//! control = 0x00
//! group_id = [0x10, 0x18, 0x20]
//! global_offset = [0x28, 0x30, 0x38]
//! input_buffer = 0x40
//! output_buffer = 0x48
//! aux_buffer = 0x50
//!
//! [handshake]
//! poll_interval_us = 0
//! timeout_ms = 10000     # 0 waits forever
//!
//! [session]
//! device_handle = "fpga0"
//! bitstream = "/lib/firmware/conv.bit.bin"
//! clocks_mhz = [100.0, 0.0, 0.0, 0.0]
//! ```

use crate::address_space::{AddressSpace, WindowGeometry};
use crate::control::WaitPolicy;
use crate::error::WindowError;
use crate::registers::RegisterMap;
use crate::session::clocks::validate_clocks;
use crate::system_io::fs_read;
use log::{trace, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The driver-decided location of fpga_manager objects. Typically `/sys/class/fpga_manager/`.
pub static FPGA_MANAGERS_DIR: &str = "/sys/class/fpga_manager/";

/// The path of the file which can be written to in order to add an additional firmware search path
/// to the system. Typically `/sys/module/firmware_class/parameters/path`.
/// See
/// [https://docs.kernel.org/driver-api/firmware/fw_search_path.html](https://docs.kernel.org/driver-api/firmware/fw_search_path.html)
/// for more information
pub static FIRMWARE_LOC_CONTROL_PATH: &str = "/sys/module/firmware_class/parameters/path";

/// Zynq-7000 device configuration node, parent of `fclk_export` and `fclk/fclkN/`.
pub static DEVCFG_DIR: &str = "/sys/devices/soc0/amba/f8007000.devcfg/";

/// Physical memory device the window pages are mapped from.
pub static MEM_DEVICE_PATH: &str = "/dev/mem";

pub static DEFAULT_CONFIG_PATH: &str = "/etc/fpga_window/config.toml";

/// Start of the general purpose AXI master window on Zynq-7000.
pub const AXI_MMAP_ADDR: u64 = 0x43c0_0000;

/// Size in bytes of the memory-mapped window.
pub const MEM_INT_ADDR_SPACE: usize = 1 << 20;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

pub static DEFAULT_DEVICE_HANDLE: &str = "fpga0";

pub const DEFAULT_CLOCKS_MHZ: [f64; 4] = [100.0, 0.0, 0.0, 0.0];

/// Where the session finds sysfs and device nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    pub fpga_managers_dir: PathBuf,
    pub firmware_search_path_control: PathBuf,
    pub devcfg_dir: PathBuf,
    pub mem_device: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        SystemPaths {
            fpga_managers_dir: FPGA_MANAGERS_DIR.into(),
            firmware_search_path_control: FIRMWARE_LOC_CONTROL_PATH.into(),
            devcfg_dir: DEVCFG_DIR.into(),
            mem_device: MEM_DEVICE_PATH.into(),
        }
    }
}

/// How a session brings the fabric up before the window is mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub device_handle: String,
    /// Bitstream to program. `None` leaves the fabric as it is.
    pub bitstream: Option<PathBuf>,
    /// Directory handed to the firmware loader. Empty uses the bitstream's own directory.
    pub firmware_lookup_path: PathBuf,
    /// FPGA manager flags written before programming.
    pub flags: Option<u32>,
    /// Fabric clock rates in MHz, one per `fclkN`. Zero disables a clock.
    pub clocks_mhz: Vec<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            device_handle: DEFAULT_DEVICE_HANDLE.to_string(),
            bitstream: None,
            firmware_lookup_path: PathBuf::new(),
            flags: None,
            clocks_mhz: DEFAULT_CLOCKS_MHZ.to_vec(),
        }
    }
}

/// Complete per-deployment configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentConfig {
    pub window: WindowGeometry,
    pub registers: RegisterMap,
    pub wait: WaitPolicy,
    pub session: SessionConfig,
    pub paths: SystemPaths,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        DeploymentConfig {
            window: WindowToml::default().into(),
            registers: RegisterMap::default(),
            wait: WaitPolicy::default(),
            session: SessionConfig::default(),
            paths: SystemPaths::default(),
        }
    }
}

/// This is the top level struct which holds all sections
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    window: Option<WindowToml>,
    registers: Option<RegisterMap>,
    handshake: Option<HandshakeToml>,
    session: Option<SessionToml>,
    paths: Option<PathsToml>,
}

#[derive(Debug, Default, Deserialize)]
struct WindowToml {
    base_address: Option<u64>,
    total_size: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct HandshakeToml {
    poll_interval_us: Option<u64>,
    timeout_ms: Option<u64>,
    max_polls: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionToml {
    device_handle: Option<String>,
    bitstream: Option<PathBuf>,
    firmware_lookup_path: Option<PathBuf>,
    flags: Option<u32>,
    clocks_mhz: Option<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsToml {
    fpga_managers_dir: Option<PathBuf>,
    firmware_search_path_control: Option<PathBuf>,
    devcfg_dir: Option<PathBuf>,
    mem_device: Option<PathBuf>,
}

impl From<WindowToml> for WindowGeometry {
    fn from(value: WindowToml) -> Self {
        WindowGeometry {
            base_address: value.base_address.unwrap_or_else(|| {
                trace!("No base_address provided. Using hardcoded value.");
                AXI_MMAP_ADDR
            }),
            total_size: value.total_size.unwrap_or_else(|| {
                trace!("No total_size provided. Using hardcoded value.");
                MEM_INT_ADDR_SPACE
            }),
            page_size: value.page_size.unwrap_or_else(|| {
                trace!("No page_size provided. Using hardcoded value.");
                DEFAULT_PAGE_SIZE
            }),
        }
    }
}

impl From<HandshakeToml> for WaitPolicy {
    fn from(value: HandshakeToml) -> Self {
        let default = WaitPolicy::default();
        WaitPolicy {
            poll_interval: value
                .poll_interval_us
                .map_or(default.poll_interval, Duration::from_micros),
            timeout: match value.timeout_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => {
                    trace!("No timeout_ms provided. Using hardcoded value.");
                    default.timeout
                }
            },
            max_polls: value.max_polls,
        }
    }
}

impl From<SessionToml> for SessionConfig {
    fn from(value: SessionToml) -> Self {
        trace!("User provided session config: {value:?}");
        SessionConfig {
            device_handle: value.device_handle.unwrap_or_else(|| {
                trace!("No device_handle provided. Using hardcoded value.");
                DEFAULT_DEVICE_HANDLE.to_string()
            }),
            bitstream: value.bitstream,
            firmware_lookup_path: value.firmware_lookup_path.unwrap_or_default(),
            flags: value.flags,
            clocks_mhz: value.clocks_mhz.unwrap_or_else(|| {
                trace!("No clocks_mhz provided. Using hardcoded value.");
                DEFAULT_CLOCKS_MHZ.to_vec()
            }),
        }
    }
}

impl From<PathsToml> for SystemPaths {
    fn from(value: PathsToml) -> Self {
        let default = SystemPaths::default();
        SystemPaths {
            fpga_managers_dir: value
                .fpga_managers_dir
                .unwrap_or(default.fpga_managers_dir),
            firmware_search_path_control: value
                .firmware_search_path_control
                .unwrap_or(default.firmware_search_path_control),
            devcfg_dir: value.devcfg_dir.unwrap_or(default.devcfg_dir),
            mem_device: value.mem_device.unwrap_or(default.mem_device),
        }
    }
}

impl From<TomlConfig> for DeploymentConfig {
    fn from(value: TomlConfig) -> Self {
        DeploymentConfig {
            window: value.window.unwrap_or_default().into(),
            registers: value.registers.unwrap_or_default(),
            wait: value.handshake.unwrap_or_default().into(),
            session: value.session.unwrap_or_default().into(),
            paths: value.paths.unwrap_or_default().into(),
        }
    }
}

impl DeploymentConfig {
    /// Parse a deployment file. `file` is only used for error reporting.
    pub fn from_toml_str(toml_string: &str, file: &Path) -> Result<Self, WindowError> {
        let config: TomlConfig = toml::from_str(toml_string).map_err(|e| WindowError::ConfigParse {
            file: file.to_path_buf(),
            e,
        })?;
        Ok(config.into())
    }

    /// Read and parse a deployment file that must exist.
    pub fn from_file(config_path: &Path) -> Result<Self, WindowError> {
        let toml_string = fs_read(config_path)?;
        let config = Self::from_toml_str(&toml_string, config_path)?;
        trace!("Successfully loaded config: {config:?}");
        Ok(config)
    }

    /// Load `explicit` if given. Otherwise try [`DEFAULT_CONFIG_PATH`] and fall back to the
    /// hardcoded defaults when it is absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, WindowError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if !default_path.is_file() {
            warn!("Config file not found in {default_path:?}. Using hardcoded defaults");
            return Ok(Self::default());
        }
        Self::from_file(default_path)
    }

    /// Check the whole configuration and return the window's address space.
    ///
    /// # Returns: `Result<AddressSpace, WindowError>`
    /// * `Ok(AddressSpace)` - geometry, register map and clocks are consistent
    /// * `Err(WindowError::Configuration)` - the first inconsistency found, including a zero
    ///   `max_polls`
    pub fn validate(&self) -> Result<AddressSpace, WindowError> {
        let space = self.window.address_space()?;
        self.registers.validate(&space)?;
        validate_clocks(&self.session.clocks_mhz)?;
        if self.wait.max_polls == Some(0) {
            return Err(WindowError::Configuration(
                "max_polls must be at least 1; the first read of the control word counts".to_string(),
            ));
        }
        if self.session.device_handle.is_empty() || !self.session.device_handle.is_ascii() {
            return Err(WindowError::Configuration(format!(
                "{:?} is an invalid name for an fpga device",
                self.session.device_handle
            )));
        }
        Ok(space)
    }
}
