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

//! Bringing the fabric up and mapping the window for one deployment.
//!
//! [`HardwareSession::open`] programs the bitstream through the FPGA manager, sets the fabric
//! clocks and maps the window out of `/dev/mem`, in that order. [`HardwareSession::attach`]
//! only maps the window, for fabric that is already programmed and clocked.

pub mod bitstream;
pub mod clocks;

use crate::accelerator::Accelerator;
use crate::config::DeploymentConfig;
use crate::devmem::DevMemPageSource;
use crate::error::WindowError;
use crate::page::PageSource;
use crate::session::bitstream::{BitstreamLoader, FpgaManagerLoader};
use crate::session::clocks::{ClockController, FclkController};
use crate::window::PagedWindow;
use log::{info, trace};

/// A mapped window together with the configuration it was opened with.
///
/// Pages go back to the source on [`close`](Self::close). A session that is dropped instead
/// drops its pages, which for [`DevMemPageSource`] unmaps them.
pub struct HardwareSession<S: PageSource> {
    config: DeploymentConfig,
    source: S,
    window: PagedWindow<S::Page>,
}

impl HardwareSession<DevMemPageSource> {
    /// Program the fabric, configure its clocks and map the window.
    pub fn open(config: DeploymentConfig) -> Result<Self, WindowError> {
        let loader = FpgaManagerLoader::new(&config.session, &config.paths);
        let clocks = FclkController::new(&config.paths.devcfg_dir);
        let source = DevMemPageSource::with_device(&config.paths.mem_device)?;
        Self::open_with(config, &loader, &clocks, source)
    }

    /// Map the window of fabric that is already running.
    pub fn attach(config: DeploymentConfig) -> Result<Self, WindowError> {
        let source = DevMemPageSource::with_device(&config.paths.mem_device)?;
        Self::attach_with(config, source)
    }
}

impl<S: PageSource> HardwareSession<S> {
    /// # Returns: `Result<HardwareSession<S>, WindowError>`
    /// * `Ok(HardwareSession)` - the window is mapped and ready
    /// * `Err(WindowError::Configuration)` - `config` is inconsistent; nothing was touched
    /// * `Err(WindowError::HardwareInit)` - programming the bitstream or the clocks failed
    /// * `Err(_)` - mapping a page failed
    pub fn open_with(
        config: DeploymentConfig,
        loader: &dyn BitstreamLoader,
        clocks: &dyn ClockController,
        source: S,
    ) -> Result<Self, WindowError> {
        config.validate()?;
        match &config.session.bitstream {
            Some(bitstream) => loader.load(bitstream).map_err(|e| {
                WindowError::HardwareInit(format!("Loading bitstream {bitstream:?} failed: {e}"))
            })?,
            None => info!("No bitstream configured; leaving the fabric as it is"),
        }
        clocks
            .configure(&config.session.clocks_mhz)
            .map_err(|e| WindowError::HardwareInit(format!("Configuring fabric clocks failed: {e}")))?;
        Self::attach_with(config, source)
    }

    pub fn attach_with(config: DeploymentConfig, mut source: S) -> Result<Self, WindowError> {
        let space = config.validate()?;
        let window = PagedWindow::open(space, &mut source)?;
        info!(
            "Window mapped at {:#x} ({:#x} bytes)",
            window.space().base_address(),
            window.space().total_size()
        );
        Ok(HardwareSession {
            config,
            source,
            window,
        })
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn window(&mut self) -> &mut PagedWindow<S::Page> {
        &mut self.window
    }

    /// Named-register view of the window using this session's register map and wait policy.
    pub fn accelerator(&mut self) -> Accelerator<'_, S::Page> {
        Accelerator::new(&mut self.window, &self.config.registers, &self.config.wait)
    }

    /// Release every page and hand the page source back.
    pub fn close(self) -> Result<S, WindowError> {
        let HardwareSession {
            mut source, window, ..
        } = self;
        trace!("Closing session");
        window.close(&mut source)?;
        info!("Window released");
        Ok(source)
    }
}

#[cfg(test)]
mod test_hardware_session {
    use crate::config::DeploymentConfig;
    use crate::error::WindowError;
    use crate::page::HeapPageSource;
    use crate::session::HardwareSession;
    use crate::session::bitstream::BitstreamLoader;
    use crate::session::clocks::ClockController;
    use googletest::prelude::*;
    use rstest::*;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
        fail_load: bool,
    }

    impl BitstreamLoader for Recorder {
        fn load(&self, bitstream: &Path) -> std::result::Result<(), WindowError> {
            self.calls.borrow_mut().push(format!("load {}", bitstream.display()));
            if self.fail_load {
                return Err(WindowError::FPGAState("write error".into()));
            }
            Ok(())
        }
    }

    impl ClockController for Recorder {
        fn configure(&self, clocks_mhz: &[f64]) -> std::result::Result<(), WindowError> {
            self.calls.borrow_mut().push(format!("clocks {clocks_mhz:?}"));
            Ok(())
        }
    }

    fn small_config() -> DeploymentConfig {
        let mut config = DeploymentConfig::default();
        config.window.total_size = 4 * 4096;
        config.session.bitstream = Some(PathBuf::from("/lib/firmware/conv.bit.bin"));
        config
    }

    #[gtest]
    fn open_programs_then_clocks_then_maps() {
        let recorder = Recorder::default();
        let session =
            HardwareSession::open_with(small_config(), &recorder, &recorder, HeapPageSource::new())
                .unwrap();
        expect_that!(
            recorder.calls.borrow().clone(),
            elements_are![
                eq("load /lib/firmware/conv.bit.bin"),
                eq("clocks [100.0, 0.0, 0.0, 0.0]")
            ]
        );

        let source = session.close().unwrap();
        expect_that!(source.outstanding(), eq(0));
    }

    #[gtest]
    fn open_without_bitstream_skips_loading() {
        let recorder = Recorder::default();
        let mut config = small_config();
        config.session.bitstream = None;
        let mut session =
            HardwareSession::open_with(config, &recorder, &recorder, HeapPageSource::new()).unwrap();
        expect_that!(recorder.calls.borrow().len(), eq(1));
        expect_that!(session.window().space().num_pages(), eq(4));
    }

    #[gtest]
    fn load_failure_is_a_hardware_init_error() {
        let recorder = Recorder {
            fail_load: true,
            ..Recorder::default()
        };
        let result =
            HardwareSession::open_with(small_config(), &recorder, &recorder, HeapPageSource::new());
        assert_that!(
            result.err(),
            some(displays_as(all!(
                starts_with("WindowError::HardwareInit"),
                contains_substring("write error")
            )))
        );
        expect_that!(recorder.calls.borrow().len(), eq(1));
    }

    #[gtest]
    #[rstest]
    #[case::bad_geometry(|c: &mut DeploymentConfig| c.window.total_size = 4096 + 1)]
    #[case::bad_registers(|c: &mut DeploymentConfig| c.registers.control = 0x3)]
    #[case::too_many_clocks(|c: &mut DeploymentConfig| c.session.clocks_mhz = vec![50.0; 5])]
    fn invalid_config_touches_nothing(#[case] corrupt: fn(&mut DeploymentConfig)) {
        let recorder = Recorder::default();
        let mut config = small_config();
        corrupt(&mut config);
        let result = HardwareSession::open_with(config, &recorder, &recorder, HeapPageSource::new());
        assert_that!(
            result.err(),
            some(displays_as(starts_with("WindowError::Configuration")))
        );
        expect_that!(recorder.calls.borrow().len(), eq(0));
    }

    #[gtest]
    fn accelerator_uses_the_configured_register_map() {
        let mut config = small_config();
        config.registers.input_buffer = 0x100;
        let mut session = HardwareSession::attach_with(config, HeapPageSource::new()).unwrap();
        session
            .accelerator()
            .set_buffer_addresses(crate::accelerator::BufferAddresses {
                input: 0x1234,
                ..Default::default()
            })
            .unwrap();
        expect_that!(session.window().read_word::<u32>(0x100 / 4), ok(eq(&0x1234)));
    }
}
