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

//! Geometry of the accelerator's memory window.

use crate::error::WindowError;
use serde::Deserialize;

/// Immutable description of the hardware address window: where it starts, how large it is and
/// how it is cut into equally sized pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    base_address: u64,
    total_size: usize,
    page_size: usize,
    num_pages: usize,
}

impl AddressSpace {
    /// Build an address space, rejecting geometries the paged window cannot cover exactly.
    ///
    /// # Returns: `Result<AddressSpace, WindowError>`
    /// * `Ok(AddressSpace)` - `num_pages = total_size / page_size`
    /// * `Err(WindowError::Configuration)` - zero sizes, or `total_size` not a multiple of
    ///   `page_size`
    pub fn new(base_address: u64, total_size: usize, page_size: usize) -> Result<Self, WindowError> {
        if page_size == 0 || total_size == 0 {
            return Err(WindowError::Configuration(format!(
                "Window size ({total_size:#x}) and page size ({page_size:#x}) must be non-zero"
            )));
        }
        if total_size % page_size != 0 {
            return Err(WindowError::Configuration(format!(
                "Window size {total_size:#x} is not a multiple of the page size {page_size:#x}"
            )));
        }
        Ok(AddressSpace {
            base_address,
            total_size,
            page_size,
            num_pages: total_size / page_size,
        })
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    /// Physical address of the first byte of page `index`.
    pub fn page_address(&self, index: usize) -> u64 {
        self.base_address + (index * self.page_size) as u64
    }
}

/// The `[window]` section of a deployment file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WindowGeometry {
    pub base_address: u64,
    pub total_size: usize,
    pub page_size: usize,
}

impl WindowGeometry {
    pub fn address_space(&self) -> Result<AddressSpace, WindowError> {
        AddressSpace::new(self.base_address, self.total_size, self.page_size)
    }
}

#[cfg(test)]
mod test_address_space {
    use crate::address_space::AddressSpace;
    use crate::error::WindowError;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::zedboard(0x43c0_0000, 1 << 20, 4096, 256)]
    #[case::single_page(0x4000_0000, 4096, 4096, 1)]
    #[case::large_pages(0x0, 1 << 16, 1 << 14, 4)]
    fn should_pass(
        #[case] base: u64,
        #[case] total: usize,
        #[case] page: usize,
        #[case] pages: usize,
    ) {
        let space = AddressSpace::new(base, total, page);
        assert_that!(space.map(|s| s.num_pages()), ok(eq(&pages)));
    }

    #[gtest]
    #[rstest]
    #[case::not_a_multiple(
        (1 << 20) + 16,
        4096,
        err(displays_as(contains_substring("is not a multiple of the page size")))
    )]
    #[case::zero_page(4096, 0, err(displays_as(contains_substring("must be non-zero"))))]
    #[case::zero_window(0, 4096, err(displays_as(contains_substring("must be non-zero"))))]
    fn should_fail<M: for<'a> Matcher<&'a std::result::Result<AddressSpace, WindowError>>>(
        #[case] total: usize,
        #[case] page: usize,
        #[case] condition: M,
    ) {
        let space = AddressSpace::new(0x43c0_0000, total, page);
        assert_that!(&space, condition);
    }

    #[gtest]
    fn page_address_steps_by_page_size() {
        let space = AddressSpace::new(0x43c0_0000, 1 << 20, 4096).unwrap();
        expect_that!(space.page_address(0), eq(0x43c0_0000));
        expect_that!(space.page_address(3), eq(0x43c0_3000));
    }
}
