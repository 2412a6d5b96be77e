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

//! The paged window: one contiguous logical address space over independently mapped pages.

use crate::address_space::AddressSpace;
use crate::control::RegisterIo;
use crate::error::WindowError;
use crate::page::{Page, PageSource};
use crate::transfer::{Direction, Element, TransferRequest};
use log::{debug, error, trace};

/// Typed access to the accelerator's address space.
///
/// Owns one page per `page_size` slice of the window, indexed by page number. Addresses
/// passed to [`PagedWindow::read`] and [`PagedWindow::write`] are word addresses in units of
/// the element type being moved, so `write::<u32>(0x10, ..)` starts at byte `0x40`.
///
/// # Examples
///
/// ```rust
/// # use fpga_window::address_space::AddressSpace;
/// # use fpga_window::page::HeapPageSource;
/// # use fpga_window::window::PagedWindow;
/// # fn example() -> Result<(), fpga_window::error::WindowError> {
/// let space = AddressSpace::new(0x43c0_0000, 1 << 20, 4096)?;
/// let mut source = HeapPageSource::new();
/// let mut window = PagedWindow::open(space, &mut source)?;
///
/// window.write(1023, &[1.0f32, 2.0, 3.0])?;
/// let mut back = [0.0f32; 3];
/// window.read(1023, &mut back)?;
/// assert_eq!(back, [1.0, 2.0, 3.0]);
///
/// window.close(&mut source)?;
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug)]
pub struct PagedWindow<P: Page> {
    space: AddressSpace,
    pages: Vec<P>,
}

impl<P: Page> PagedWindow<P> {
    /// Wrap already acquired pages. There must be exactly `num_pages` of them, each
    /// `page_size` bytes long.
    pub fn new(space: AddressSpace, pages: Vec<P>) -> Result<Self, WindowError> {
        if pages.len() != space.num_pages() {
            return Err(WindowError::Configuration(format!(
                "Window needs {} pages but {} were provided",
                space.num_pages(),
                pages.len()
            )));
        }
        if let Some((index, page)) = pages
            .iter()
            .enumerate()
            .find(|(_, p)| p.size() != space.page_size())
        {
            return Err(WindowError::Configuration(format!(
                "Page {index} is {:#x} bytes, expected {:#x}",
                page.size(),
                space.page_size()
            )));
        }
        Ok(PagedWindow { space, pages })
    }

    /// Acquire every page of `space` from `source`.
    ///
    /// If acquiring a page fails, the pages obtained so far are handed back before the error
    /// is returned.
    pub fn open<S>(space: AddressSpace, source: &mut S) -> Result<Self, WindowError>
    where
        S: PageSource<Page = P>,
    {
        debug!(
            "Opening window at {:#x}: {} pages of {:#x} bytes",
            space.base_address(),
            space.num_pages(),
            space.page_size()
        );
        let mut pages = Vec::with_capacity(space.num_pages());
        for index in 0..space.num_pages() {
            match source.acquire_page(&space, index) {
                Ok(page) => pages.push(page),
                Err(e) => {
                    for (acquired, page) in pages.into_iter().enumerate().rev() {
                        if let Err(release_err) = source.release_page(acquired, page) {
                            error!("Failed to release page {acquired}: {release_err}");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Self::new(space, pages)
    }

    /// Hand every page back to `source`, in index order. The first release error is returned
    /// after all pages have been offered back.
    pub fn close<S>(self, source: &mut S) -> Result<(), WindowError>
    where
        S: PageSource<Page = P>,
    {
        debug!("Closing window at {:#x}", self.space.base_address());
        let mut first_err = None;
        for (index, page) in self.pages.into_iter().enumerate() {
            if let Err(e) = source.release_page(index, page) {
                error!("Failed to release page {index}: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    /// Copy `src` into the window starting at `word_address`.
    ///
    /// # Returns: `Result<(), WindowError>`
    /// * `Ok(())` - every element was stored
    /// * `Err(WindowError::Configuration)` - the range leaves the window; nothing was written
    pub fn write<T: Element>(&mut self, word_address: usize, src: &[T]) -> Result<(), WindowError> {
        let request = TransferRequest::of::<T>(Direction::Write, word_address, src.len());
        for op in request.page_ops(&self.space)? {
            trace!(
                "write page {} at {:#x}: {} bytes",
                op.page,
                op.byte_offset,
                op.byte_len(T::SIZE)
            );
            let chunk = &src[op.buffer_offset..op.buffer_offset + op.word_count];
            self.pages[op.page].store(op.byte_offset, chunk);
        }
        Ok(())
    }

    /// Fill `dst` from the window starting at `word_address`.
    ///
    /// # Returns: `Result<(), WindowError>`
    /// * `Ok(())` - `dst` holds the window contents
    /// * `Err(WindowError::Configuration)` - the range leaves the window; `dst` is untouched
    pub fn read<T: Element>(&self, word_address: usize, dst: &mut [T]) -> Result<(), WindowError> {
        let request = TransferRequest::of::<T>(Direction::Read, word_address, dst.len());
        for op in request.page_ops(&self.space)? {
            trace!(
                "read page {} at {:#x}: {} bytes",
                op.page,
                op.byte_offset,
                op.byte_len(T::SIZE)
            );
            let chunk = &mut dst[op.buffer_offset..op.buffer_offset + op.word_count];
            self.pages[op.page].load(op.byte_offset, chunk);
        }
        Ok(())
    }

    pub fn write_word<T: Element>(&mut self, word_address: usize, value: T) -> Result<(), WindowError> {
        self.write(word_address, &[value])
    }

    pub fn read_word<T: Element>(&self, word_address: usize) -> Result<T, WindowError> {
        let mut value = [T::default()];
        self.read(word_address, &mut value)?;
        Ok(value[0])
    }

    #[cfg(test)]
    pub(crate) fn pages(&self) -> &[P] {
        &self.pages
    }
}

fn register_word(byte_offset: usize) -> Result<usize, WindowError> {
    if byte_offset % u32::SIZE != 0 {
        return Err(WindowError::Configuration(format!(
            "Register offset {byte_offset:#x} is not 32-bit aligned"
        )));
    }
    Ok(byte_offset / u32::SIZE)
}

impl<P: Page> RegisterIo for PagedWindow<P> {
    fn read_register(&mut self, byte_offset: usize) -> Result<u32, WindowError> {
        self.read_word(register_word(byte_offset)?)
    }

    fn write_register(&mut self, byte_offset: usize, value: u32) -> Result<(), WindowError> {
        self.write_word(register_word(byte_offset)?, value)
    }
}
