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

//! Bitstream loading through the Linux FPGA manager.
//!
//! Below is an example sysfs layout for an FPGA device managed by the standard Linux FPGA
//! subsystem:
//! ```text
//! /sys/class/fpga_manager/fpga0
//! ├── firmware
//! ├── flags
//! ├── name
//! ├── state
//! └── status
//! ```
//! Of these files, only `state`, `flags` and `firmware` are used here. The kernel resolves the
//! name written to `firmware` against its firmware search path, so the bitstream's directory
//! is written to the firmware-class `path` parameter first.

use crate::config::{SessionConfig, SystemPaths};
use crate::error::WindowError;
use crate::system_io::{fs_read, fs_read_trimmed, fs_write};
use log::{error, info, trace, warn};
use std::path::{Component, Path, PathBuf};

/// Something that can program the fabric with a bitstream file.
pub trait BitstreamLoader {
    fn load(&self, bitstream: &Path) -> Result<(), WindowError>;
}

/// Split a path into its parent directory and file name.
pub fn extract_path_and_filename(path: &Path) -> Result<(PathBuf, PathBuf), WindowError> {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or(WindowError::Argument(format!(
            "Provided bitstream path {path:?} is not a file or a valid directory."
        )))?;

    let base_path = path
        .parent()
        .and_then(|p| p.to_str())
        .ok_or(WindowError::Argument(format!(
            "Provided bitstream path {path:?} is missing a parent dir."
        )))?;

    Ok((base_path.into(), filename.into()))
}

/// Split `source_path` into a firmware lookup directory and the path relative to it.
///
/// With an empty `firmware_path` the lookup directory is the file's parent.
///
/// # Examples
///
/// ```
/// # use fpga_window::session::bitstream::make_firmware_pair;
/// # use std::path::{Path, PathBuf};
/// let (prefix, suffix) = make_firmware_pair(
///     Path::new("/lib/firmware/xilinx/conv.bit.bin"),
///     Path::new("/lib/firmware/"),
/// )
/// .unwrap();
/// assert_eq!(prefix, PathBuf::from("/lib/firmware/"));
/// assert_eq!(suffix, PathBuf::from("xilinx/conv.bit.bin"));
/// ```
pub fn make_firmware_pair(
    source_path: &Path,
    firmware_path: &Path,
) -> Result<(PathBuf, PathBuf), WindowError> {
    if firmware_path.as_os_str().is_empty() {
        return extract_path_and_filename(source_path);
    }
    if let Ok(suffix) = source_path.strip_prefix(firmware_path) {
        let cleaned_suffix_path = suffix
            .components()
            .skip_while(|c| matches!(c, Component::RootDir))
            .collect::<PathBuf>();
        if cleaned_suffix_path.as_os_str().is_empty() {
            return Err(WindowError::Argument(format!(
                "The resulting filename from stripping {firmware_path:?} from {source_path:?} \
                was empty. Cannot write empty string to fpga."
            )));
        }
        Ok((firmware_path.to_path_buf(), cleaned_suffix_path))
    } else {
        Err(WindowError::Argument(format!(
            "Could not find {source_path:?} inside {firmware_path:?}"
        )))
    }
}

/// Loads bitstreams through `/sys/class/fpga_manager/<device>/`.
#[derive(Debug, Clone)]
pub struct FpgaManagerLoader {
    device_handle: String,
    managers_dir: PathBuf,
    firmware_search_path_control: PathBuf,
    firmware_lookup_path: PathBuf,
    flags: Option<u32>,
}

impl FpgaManagerLoader {
    pub fn new(session: &SessionConfig, paths: &SystemPaths) -> Self {
        FpgaManagerLoader {
            device_handle: session.device_handle.clone(),
            managers_dir: paths.fpga_managers_dir.clone(),
            firmware_search_path_control: paths.firmware_search_path_control.clone(),
            firmware_lookup_path: session.firmware_lookup_path.clone(),
            flags: session.flags,
        }
    }

    fn device_dir(&self) -> PathBuf {
        self.managers_dir.join(&self.device_handle)
    }

    fn validate_device_handle(&self) -> Result<(), WindowError> {
        if !self.device_dir().exists() {
            return Err(WindowError::Argument(format!(
                "Device {} not found in {:?}.",
                self.device_handle, self.managers_dir
            )));
        }
        Ok(())
    }

    /// Current manager state, e.g. `operating` or `write error`.
    pub fn state(&self) -> Result<String, WindowError> {
        let state_path = self.device_dir().join("state");
        trace!("reading {state_path:?}");
        fs_read_trimmed(&state_path)
    }

    /// Programming flags, parsed from hex with or without a `0x` prefix.
    pub fn flags(&self) -> Result<u32, WindowError> {
        let contents = fs_read(&self.device_dir().join("flags"))?;
        let trimmed = contents.trim().trim_start_matches("0x");
        u32::from_str_radix(trimmed, 16)
            .map_err(|_| WindowError::Flag(format!("Parsing flags {contents:?} failed")))
    }

    /// Write programming flags and verify them by reading back.
    pub fn set_flags(&self, flags: u32) -> Result<(), WindowError> {
        let flag_path = self.device_dir().join("flags");
        trace!("Writing 0x'{flags:X}' to '{flag_path:?}");
        if let Err(e) = fs_write(&flag_path, false, format!("0x{flags:X}")) {
            error!("Failed to write flags.");
            return Err(e);
        }
        match self.flags() {
            Ok(returned_flags) if returned_flags == flags => Ok(()),
            Ok(returned_flags) => Err(WindowError::Flag(format!(
                "Setting {}'s flags to '{}' failed. Resulting flag was '{}'",
                self.device_handle, flags, returned_flags
            ))),
            Err(e) => Err(WindowError::Flag(format!(
                "Failed to read {}'s flags after setting to '{}': {}",
                self.device_handle, flags, e
            ))),
        }
    }

    fn assert_state(&self) -> Result<(), WindowError> {
        let state = self.state()?;
        match state.as_str() {
            "operating" => {
                info!("{}'s state is 'operating'", self.device_handle);
                Ok(())
            }
            _ => Err(WindowError::FPGAState(format!(
                "After loading bitstream, {}'s state should be 'operating' but it is '{}'",
                self.device_handle, state
            ))),
        }
    }

    fn write_firmware_source_dir(&self, new_path: &Path) -> Result<(), WindowError> {
        trace!(
            "Writing fw prefix {new_path:?} to {:?}",
            self.firmware_search_path_control
        );
        fs_write(
            &self.firmware_search_path_control,
            false,
            new_path.to_string_lossy(),
        )
    }
}

impl BitstreamLoader for FpgaManagerLoader {
    fn load(&self, bitstream: &Path) -> Result<(), WindowError> {
        info!("Loading {bitstream:?} onto {}", self.device_handle);
        self.validate_device_handle()?;
        if !bitstream.exists() || bitstream.is_dir() {
            return Err(WindowError::Argument(format!(
                "{bitstream:?} is not a valid path to a bitstream file."
            )));
        }
        if let Some(flags) = self.flags {
            self.set_flags(flags)?;
        }
        let (prefix, suffix) = make_firmware_pair(bitstream, &self.firmware_lookup_path)?;
        self.write_firmware_source_dir(&prefix)?;
        let firmware_path = self.device_dir().join("firmware");
        fs_write(&firmware_path, false, suffix.to_string_lossy())?;
        if let Err(e) = self.assert_state() {
            warn!("Bitstream {bitstream:?} did not leave {} operating", self.device_handle);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_make_firmware_pair {
    use crate::error::WindowError;
    use crate::session::bitstream::make_firmware_pair;
    use googletest::prelude::*;
    use rstest::*;
    use std::path::PathBuf;

    #[gtest]
    #[rstest]
    #[case::all_good(
        "/lib/firmware/conv.bit.bin",
        "/lib/firmware/",
        "/lib/firmware/",
        "conv.bit.bin"
    )]
    #[case::nested("/lib/firmware/xilinx/conv.bin", "/lib/firmware", "/lib/firmware", "xilinx/conv.bin")]
    #[case::no_fw_path("/lib/firmware/conv.bit.bin", "", "/lib/firmware", "conv.bit.bin")]
    fn should_pass(
        #[case] source: &str,
        #[case] fw_path: &str,
        #[case] exp_prefix: &str,
        #[case] exp_suffix: &str,
    ) {
        let result = make_firmware_pair(&PathBuf::from(source), &PathBuf::from(fw_path));
        assert_that!(
            result,
            ok(eq(&(PathBuf::from(exp_prefix), PathBuf::from(exp_suffix))))
        );
    }

    #[gtest]
    #[rstest]
    #[case::no_file(
        "/lib/firmware/",
        "/lib/firmware/",
        err(displays_as(contains_substring("The resulting filename from stripping")))
    )]
    #[case::not_in_dir(
        "/lib/firmware/conv.bit.bin",
        "/opt/bitstreams/",
        err(displays_as(contains_substring("Could not find")))
    )]
    fn should_fail<M: for<'a> Matcher<&'a std::result::Result<(PathBuf, PathBuf), WindowError>>>(
        #[case] source: &str,
        #[case] fw_path: &str,
        #[case] condition: M,
    ) {
        let result = make_firmware_pair(&PathBuf::from(source), &PathBuf::from(fw_path));
        assert_that!(&result, condition);
    }
}

#[cfg(test)]
mod test_fpga_manager_loader {
    use crate::config::{SessionConfig, SystemPaths};
    use crate::session::bitstream::{BitstreamLoader, FpgaManagerLoader};
    use crate::test_support::scratch_dir;
    use googletest::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};

    struct Tree {
        paths: SystemPaths,
        bitstream: PathBuf,
    }

    fn sysfs_tree(name: &str, state: &str) -> Tree {
        let root = scratch_dir(name);
        let device = root.join("fpga_manager/fpga0");
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("state"), format!("{state}\n")).unwrap();
        fs::write(device.join("flags"), "0x0\n").unwrap();
        fs::write(device.join("firmware"), "").unwrap();
        fs::write(root.join("fw_search_path"), "").unwrap();

        let firmware_dir = root.join("lib/firmware");
        fs::create_dir_all(&firmware_dir).unwrap();
        let bitstream = firmware_dir.join("conv.bit.bin");
        fs::write(&bitstream, [0u8; 16]).unwrap();

        Tree {
            paths: SystemPaths {
                fpga_managers_dir: root.join("fpga_manager"),
                firmware_search_path_control: root.join("fw_search_path"),
                devcfg_dir: root.join("devcfg"),
                mem_device: root.join("mem"),
            },
            bitstream,
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[gtest]
    fn writes_search_path_then_firmware_name() {
        let tree = sysfs_tree("loader-ok", "operating");
        let loader = FpgaManagerLoader::new(&SessionConfig::default(), &tree.paths);
        loader.load(&tree.bitstream).unwrap();

        let device = tree.paths.fpga_managers_dir.join("fpga0");
        let lookup_dir = tree.bitstream.parent().unwrap().to_str().unwrap();
        expect_that!(read(&device.join("firmware")), eq("conv.bit.bin"));
        expect_that!(read(&tree.paths.firmware_search_path_control), eq(lookup_dir));
    }

    #[gtest]
    fn flags_are_written_and_verified() {
        let tree = sysfs_tree("loader-flags", "operating");
        let session = SessionConfig {
            flags: Some(0x20),
            ..SessionConfig::default()
        };
        let loader = FpgaManagerLoader::new(&session, &tree.paths);
        loader.load(&tree.bitstream).unwrap();
        expect_that!(loader.flags(), ok(eq(&0x20)));
    }

    #[gtest]
    fn non_operating_state_is_rejected() {
        let tree = sysfs_tree("loader-state", "write error");
        let loader = FpgaManagerLoader::new(&SessionConfig::default(), &tree.paths);
        assert_that!(
            loader.load(&tree.bitstream),
            err(displays_as(all!(
                starts_with("WindowError::FPGAState"),
                contains_substring("it is 'write error'")
            )))
        );
    }

    #[gtest]
    fn unknown_device_is_rejected() {
        let tree = sysfs_tree("loader-device", "operating");
        let session = SessionConfig {
            device_handle: "fpga7".into(),
            ..SessionConfig::default()
        };
        let loader = FpgaManagerLoader::new(&session, &tree.paths);
        assert_that!(
            loader.load(&tree.bitstream),
            err(displays_as(contains_substring("Device fpga7 not found")))
        );
    }

    #[gtest]
    fn missing_bitstream_is_rejected() {
        let tree = sysfs_tree("loader-missing", "operating");
        let loader = FpgaManagerLoader::new(&SessionConfig::default(), &tree.paths);
        let missing = tree.bitstream.with_file_name("other.bit.bin");
        assert_that!(
            loader.load(&missing),
            err(displays_as(contains_substring("is not a valid path to a bitstream file")))
        );
    }
}
