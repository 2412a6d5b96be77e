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

//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use fpga_window::address_space::AddressSpace;
use fpga_window::control::{DONE_MASK, START_MASK};
use fpga_window::page::{HeapPage, Page, PageSource};
use fpga_window::transfer::Element;
use fpga_window::WindowError;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Fresh, empty directory under the system temp dir, unique to this test process.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("fpga_window_it")
        .join(format!("{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Window page of a simulated accelerator. The page at index 0 holds the control word at
/// byte 0: once the start bit is written, the done bit shows up after `latency` further
/// reads of the control word and the start bit drops.
pub struct SimulatedPage {
    memory: RefCell<HeapPage>,
    holds_control: bool,
    latency: u32,
    countdown: Cell<Option<u32>>,
    launches: Rc<Cell<u32>>,
}

impl SimulatedPage {
    fn control_word(&self) -> u32 {
        let mut word = [0u32];
        self.memory.borrow().load(0, &mut word);
        word[0]
    }
}

impl Page for SimulatedPage {
    fn size(&self) -> usize {
        self.memory.borrow().size()
    }

    fn load<T: Element>(&self, byte_offset: usize, dst: &mut [T]) {
        if self.holds_control && byte_offset == 0 {
            match self.countdown.get() {
                Some(0) => {
                    let finished = (self.control_word() & !START_MASK) | DONE_MASK;
                    self.memory.borrow_mut().store(0, &[finished]);
                    self.countdown.set(None);
                }
                Some(n) => self.countdown.set(Some(n - 1)),
                None => {}
            }
        }
        self.memory.borrow().load(byte_offset, dst);
    }

    fn store<T: Element>(&mut self, byte_offset: usize, src: &[T]) {
        self.memory.get_mut().store(byte_offset, src);
        if self.holds_control && byte_offset == 0 {
            let control = self.control_word();
            if control & START_MASK != 0 && self.countdown.get().is_none() {
                self.launches.set(self.launches.get() + 1);
                self.countdown.set(Some(self.latency));
            }
        }
    }
}

/// Page source standing in for `/dev/mem` in front of a simulated accelerator.
pub struct SimulatedAccelerator {
    latency: u32,
    launches: Rc<Cell<u32>>,
    outstanding: usize,
}

impl SimulatedAccelerator {
    pub fn new(latency: u32) -> Self {
        SimulatedAccelerator {
            latency,
            launches: Rc::new(Cell::new(0)),
            outstanding: 0,
        }
    }

    /// Number of times the start bit was raised.
    pub fn launches(&self) -> u32 {
        self.launches.get()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl PageSource for SimulatedAccelerator {
    type Page = SimulatedPage;

    fn acquire_page(
        &mut self,
        space: &AddressSpace,
        index: usize,
    ) -> Result<SimulatedPage, WindowError> {
        self.outstanding += 1;
        Ok(SimulatedPage {
            memory: RefCell::new(HeapPage::zeroed(space.page_size())),
            holds_control: index == 0,
            latency: self.latency,
            countdown: Cell::new(None),
            launches: Rc::clone(&self.launches),
        })
    }

    fn release_page(&mut self, _index: usize, _page: SimulatedPage) -> Result<(), WindowError> {
        self.outstanding -= 1;
        Ok(())
    }
}

/// Scratch copy of the sysfs nodes a session touches, with a bitstream under
/// `<root>/lib/firmware`.
pub struct FakeSystem {
    pub root: PathBuf,
    pub bitstream: PathBuf,
}

impl FakeSystem {
    pub fn new(name: &str) -> Self {
        let root = scratch_dir(name);
        let device = root.join("fpga_manager/fpga0");
        write(&device.join("state"), "operating\n");
        write(&device.join("flags"), "0x0\n");
        write(&device.join("firmware"), "");
        write(&root.join("fw_search_path"), "");
        write(&root.join("devcfg/fclk_export"), "");
        write(&root.join("devcfg/fclk/fclk0/set_rate"), "50000000\n");
        write(&root.join("devcfg/fclk/fclk0/enable"), "0\n");
        let bitstream = root.join("lib/firmware/conv.bit.bin");
        write(&bitstream, "bitstream");
        FakeSystem { root, bitstream }
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root.join(relative)).unwrap()
    }

    /// Deployment file pointing every system path into the scratch tree.
    pub fn config_file(&self, extra: &str) -> PathBuf {
        let root = self.root.display();
        let contents = format!(
            r#"
[window]
base_address = 0x43c00000
total_size = 0x4000
page_size = 0x1000

[handshake]
poll_interval_us = 0
timeout_ms = 2000

[session]
device_handle = "fpga0"
bitstream = "{root}/lib/firmware/conv.bit.bin"
firmware_lookup_path = "{root}/lib/firmware"
clocks_mhz = [100.0]

[paths]
fpga_managers_dir = "{root}/fpga_manager"
firmware_search_path_control = "{root}/fw_search_path"
devcfg_dir = "{root}/devcfg"
mem_device = "{root}/mem"
{extra}
"#
        );
        let path = self.root.join("config.toml");
        write(&path, &contents);
        path
    }
}
