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

//! fpga_window - Host-side access to accelerators living in FPGA fabric.
//!
//! The fabric exposes an AXI-Lite slave window into the host's physical address space, e.g.
//! 1 MiB at `0x43c0_0000` on a ZedBoard. This crate maps that window page by page and moves
//! typed data through it, then drives the accelerator's start/done handshake:
//!
//! - [`window::PagedWindow`] splits every read and write into per-page copies against pages
//!   handed out by a [`page::PageSource`] ([`devmem::DevMemPageSource`] on hardware,
//!   [`page::HeapPageSource`] in simulation).
//! - [`control::ControlChannel`] sets the start bit and polls for the done bit under a
//!   [`control::WaitPolicy`], abortable through a [`control::CancelToken`].
//! - [`accelerator::Accelerator`] writes buffer pointers and work-group fields by name,
//!   following a [`registers::RegisterMap`].
//! - [`session::HardwareSession`] loads the bitstream, sets the fabric clocks and maps the
//!   window as described by a [`config::DeploymentConfig`].
//!
//! # Environment Variables
//!
//! The library logs through the `log` facade and installs no logger itself. Binaries built
//! on it (such as `fpga_window_cli`) honour `RUST_LOG`.

pub mod accelerator;
pub mod address_space;
pub mod config;
pub mod control;
pub mod devmem;
pub mod error;
pub mod page;
pub mod registers;
pub mod session;
pub mod system_io;
pub mod transfer;
pub mod window;

pub use crate::error::WindowError;
