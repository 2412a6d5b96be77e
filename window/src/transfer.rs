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

//! Typed transfer requests and their decomposition into page operations.
//!
//! A logical `(direction, element size, word address, word count)` request is turned into an
//! ordered list of [`PageOp`]s, one per page touched. Only the first and last operation can be
//! shorter than a full page. The whole request is checked against the [`AddressSpace`] before
//! any operation is produced, so a rejected request never touches a page.
//!
//! ```text
//!  word_address = 1023, word_count = 3, u32, page_size = 4096
//!
//!  page 0                          page 1
//!  +--------------------------+---+---+---+------------------------+
//!  |            ...           |w0 |w1 |w2 |          ...           |
//!  +--------------------------+---+---+---+------------------------+
//!                           0xFFC 0x000
//!  PageOp { page: 0, byte_offset: 0xFFC, buffer_offset: 0, word_count: 1 }
//!  PageOp { page: 1, byte_offset: 0x000, buffer_offset: 1, word_count: 2 }
//! ```

use crate::address_space::AddressSpace;
use crate::error::WindowError;
use log::trace;
use std::mem::size_of;

mod sealed {
    pub trait Sealed {}
}

/// Fixed-size plain-data word that can be moved between a caller buffer and a page.
///
/// Every bit pattern is a valid value of an `Element`, which is what makes reading hardware
/// memory into one sound. The trait is sealed to the primitive integer and float types.
pub trait Element: sealed::Sealed + Copy + Default + 'static {
    /// Size of one element in bytes.
    const SIZE: usize;

    /// Encode into exactly [`Element::SIZE`] bytes in native order.
    fn write_ne_bytes(self, out: &mut [u8]);

    /// Decode from exactly [`Element::SIZE`] bytes in native order.
    fn read_ne_bytes(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($t:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}

            impl Element for $t {
                const SIZE: usize = size_of::<$t>();

                fn write_ne_bytes(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }

                fn read_ne_bytes(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_element!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One contiguous copy between the caller buffer and a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOp {
    /// Index of the page in the window.
    pub page: usize,
    /// Byte offset of the first element inside the page.
    pub byte_offset: usize,
    /// Index of the first element inside the caller buffer.
    pub buffer_offset: usize,
    /// Number of elements copied.
    pub word_count: usize,
}

impl PageOp {
    pub fn byte_len(&self, element_size: usize) -> usize {
        self.word_count * element_size
    }
}

/// A logical transfer against the window. Built per call and consumed by the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub direction: Direction,
    pub element_size: usize,
    pub word_address: usize,
    pub word_count: usize,
}

impl TransferRequest {
    pub fn new(direction: Direction, element_size: usize, word_address: usize, word_count: usize) -> Self {
        TransferRequest {
            direction,
            element_size,
            word_address,
            word_count,
        }
    }

    /// Request for `word_count` elements of type `T`.
    pub fn of<T: Element>(direction: Direction, word_address: usize, word_count: usize) -> Self {
        Self::new(direction, T::SIZE, word_address, word_count)
    }

    /// Byte address of the first element, or `None` on overflow.
    pub fn byte_address(&self) -> Option<usize> {
        self.word_address.checked_mul(self.element_size)
    }

    /// Page holding the first element.
    pub fn start_page(&self, space: &AddressSpace) -> Option<usize> {
        self.byte_address().map(|b| b / space.page_size())
    }

    /// Byte offset of the first element within its page.
    pub fn start_offset(&self, space: &AddressSpace) -> Option<usize> {
        self.byte_address().map(|b| b % space.page_size())
    }

    /// Decompose the request into page operations.
    ///
    /// # Returns: `Result<Vec<PageOp>, WindowError>`
    /// * `Ok(Vec<PageOp>)` - one operation per page touched, in page order; empty for a
    ///   zero-length request
    /// * `Err(WindowError::Configuration)` - the element size does not divide the page size,
    ///   the address arithmetic overflows, or a page index at or past `num_pages` would be
    ///   touched
    pub fn page_ops(&self, space: &AddressSpace) -> Result<Vec<PageOp>, WindowError> {
        let page_size = space.page_size();
        if self.element_size == 0 || page_size % self.element_size != 0 {
            return Err(WindowError::Configuration(format!(
                "Element size {} does not divide the page size {page_size:#x}",
                self.element_size
            )));
        }
        if self.word_count == 0 {
            return Ok(Vec::new());
        }
        let (Some(start_page), Some(start_offset)) = (self.start_page(space), self.start_offset(space))
        else {
            return Err(WindowError::Configuration(format!(
                "Word address {:#x} overflows with element size {}",
                self.word_address, self.element_size
            )));
        };

        let words_per_page = page_size / self.element_size;
        let mut page = start_page;
        let mut offset_words = start_offset / self.element_size;
        let mut cursor = 0;
        let mut remaining = self.word_count;
        let mut ops = Vec::new();

        while remaining > 0 {
            if page >= space.num_pages() {
                return Err(WindowError::Configuration(format!(
                    "{:?} of {} words at word address {:#x} reaches page {page}, outside [0, {})",
                    self.direction,
                    self.word_count,
                    self.word_address,
                    space.num_pages()
                )));
            }
            let word_count = (words_per_page - offset_words).min(remaining);
            ops.push(PageOp {
                page,
                byte_offset: offset_words * self.element_size,
                buffer_offset: cursor,
                word_count,
            });
            cursor += word_count;
            remaining -= word_count;
            offset_words = 0;
            page += 1;
        }
        trace!("{self:?} split into {} page operations", ops.len());
        Ok(ops)
    }
}
