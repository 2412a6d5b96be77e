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

//! Pages and the layer that hands them out.
//!
//! A [`Page`] is one fixed-size block of memory standing for a `page_size` slice of the
//! hardware window. A [`PageSource`] acquires pages when a window opens and takes them back
//! when it closes. The `/dev/mem` backed source lives in [`crate::devmem`]. [`HeapPageSource`]
//! backs pages with plain host memory, for dry runs and tests.

use crate::address_space::AddressSpace;
use crate::error::WindowError;
use crate::transfer::Element;
use log::trace;

/// One block of window memory.
///
/// `load` and `store` are only called with ranges that lie inside the page and with
/// `byte_offset` a multiple of `T::SIZE`. Implementations panic otherwise.
pub trait Page {
    /// Size of the page in bytes.
    fn size(&self) -> usize;

    /// Copy `dst.len()` elements starting at `byte_offset` out of the page.
    fn load<T: Element>(&self, byte_offset: usize, dst: &mut [T]);

    /// Copy `src` into the page starting at `byte_offset`.
    fn store<T: Element>(&mut self, byte_offset: usize, src: &[T]);
}

/// Acquisition layer for window pages.
pub trait PageSource {
    type Page: Page;

    /// Obtain the page standing for `space.page_address(index)`.
    fn acquire_page(&mut self, space: &AddressSpace, index: usize) -> Result<Self::Page, WindowError>;

    /// Give a page back. Called once per acquired page when the window closes.
    fn release_page(&mut self, index: usize, page: Self::Page) -> Result<(), WindowError>;
}

pub(crate) fn check_page_range<T: Element>(page_size: usize, byte_offset: usize, len: usize) {
    let end = len
        .checked_mul(T::SIZE)
        .and_then(|bytes| bytes.checked_add(byte_offset));
    assert!(
        matches!(end, Some(end) if end <= page_size),
        "{len} elements of {} bytes at {byte_offset:#x} do not fit a {page_size:#x} byte page",
        T::SIZE
    );
    assert!(
        byte_offset % T::SIZE == 0,
        "offset {byte_offset:#x} is not aligned to {} bytes",
        T::SIZE
    );
}

/// Page backed by host memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapPage {
    bytes: Vec<u8>,
}

impl HeapPage {
    pub fn zeroed(size: usize) -> Self {
        HeapPage {
            bytes: vec![0; size],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Page for HeapPage {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn load<T: Element>(&self, byte_offset: usize, dst: &mut [T]) {
        check_page_range::<T>(self.bytes.len(), byte_offset, dst.len());
        let src = &self.bytes[byte_offset..byte_offset + dst.len() * T::SIZE];
        for (value, raw) in dst.iter_mut().zip(src.chunks_exact(T::SIZE)) {
            *value = T::read_ne_bytes(raw);
        }
    }

    fn store<T: Element>(&mut self, byte_offset: usize, src: &[T]) {
        check_page_range::<T>(self.bytes.len(), byte_offset, src.len());
        let dst = &mut self.bytes[byte_offset..byte_offset + src.len() * T::SIZE];
        for (value, raw) in src.iter().zip(dst.chunks_exact_mut(T::SIZE)) {
            value.write_ne_bytes(raw);
        }
    }
}

/// Hands out zeroed [`HeapPage`]s. Keeps a count of outstanding pages.
#[derive(Debug, Default)]
pub struct HeapPageSource {
    outstanding: usize,
}

impl HeapPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl PageSource for HeapPageSource {
    type Page = HeapPage;

    fn acquire_page(&mut self, space: &AddressSpace, index: usize) -> Result<HeapPage, WindowError> {
        trace!(
            "Allocating heap page {index} for {:#x}",
            space.page_address(index)
        );
        self.outstanding += 1;
        Ok(HeapPage::zeroed(space.page_size()))
    }

    fn release_page(&mut self, index: usize, _page: HeapPage) -> Result<(), WindowError> {
        trace!("Releasing heap page {index}");
        self.outstanding = self.outstanding.saturating_sub(1);
        Ok(())
    }
}
