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

//! `/dev/mem` backed window pages.
//!
//! Each page of the window is mapped separately with `mmap(MAP_SHARED)` at
//! `base_address + index * page_size`. All accesses go through volatile reads and writes at
//! element width, so a `u32` transfer issues 32-bit bus transactions.

use crate::address_space::AddressSpace;
use crate::error::WindowError;
use crate::page::{Page, PageSource, check_page_range};
use crate::transfer::Element;
use log::{debug, trace};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Size of a page of host virtual memory.
pub fn system_page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

/// One mapped page of the hardware window. Unmapped on drop.
#[derive(Debug)]
pub struct MappedPage {
    ptr: NonNull<u8>,
    size: usize,
}

// SAFETY: the mapping is owned exclusively by this value and may move between threads.
// It is not Sync: shared access from several threads would race on device memory.
unsafe impl Send for MappedPage {}

impl Page for MappedPage {
    fn size(&self) -> usize {
        self.size
    }

    fn load<T: Element>(&self, byte_offset: usize, dst: &mut [T]) {
        check_page_range::<T>(self.size, byte_offset, dst.len());
        // SAFETY: the range was checked to lie inside the mapping and to be aligned for T,
        // and every bit pattern is a valid Element.
        unsafe {
            let base = self.ptr.as_ptr().add(byte_offset).cast::<T>();
            for (i, value) in dst.iter_mut().enumerate() {
                *value = base.add(i).read_volatile();
            }
        }
    }

    fn store<T: Element>(&mut self, byte_offset: usize, src: &[T]) {
        check_page_range::<T>(self.size, byte_offset, src.len());
        // SAFETY: as in `load`; `&mut self` gives exclusive access to the mapping.
        unsafe {
            let base = self.ptr.as_ptr().add(byte_offset).cast::<T>();
            for (i, value) in src.iter().enumerate() {
                base.add(i).write_volatile(*value);
            }
        }
    }
}

impl Drop for MappedPage {
    fn drop(&mut self) {
        // SAFETY: ptr and size are exactly what mmap returned and was asked for.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.size);
        }
    }
}

/// Maps window pages out of a physical memory device, `/dev/mem` by default.
#[derive(Debug)]
pub struct DevMemPageSource {
    path: PathBuf,
    file: File,
}

impl DevMemPageSource {
    /// Open the memory device at `path`, `/dev/mem` or e.g. a UIO node.
    pub fn with_device(path: &Path) -> Result<Self, WindowError> {
        debug!("Opening {path:?} for window mapping");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| WindowError::IORead {
                file: path.into(),
                e,
            })?;
        Ok(DevMemPageSource {
            path: path.into(),
            file,
        })
    }
}

impl PageSource for DevMemPageSource {
    type Page = MappedPage;

    fn acquire_page(&mut self, space: &AddressSpace, index: usize) -> Result<MappedPage, WindowError> {
        let host_page = system_page_size();
        if space.page_size() % host_page != 0 || space.base_address() % host_page as u64 != 0 {
            return Err(WindowError::Configuration(format!(
                "Window base {:#x} and page size {:#x} must both be multiples of the system page size {host_page:#x}",
                space.base_address(),
                space.page_size()
            )));
        }
        let offset = space.page_address(index);
        let map_offset = libc::off_t::try_from(offset).map_err(|_| {
            WindowError::Configuration(format!("Page address {offset:#x} does not fit off_t"))
        })?;
        trace!("Mapping page {index} at {offset:#x} from {:?}", self.path);
        // SAFETY: a fresh shared mapping is requested; the kernel picks the address.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                space.page_size(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                map_offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(WindowError::IOMap {
                file: self.path.clone(),
                offset,
                len: space.page_size(),
                e: std::io::Error::last_os_error(),
            });
        }
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| WindowError::IOMap {
            file: self.path.clone(),
            offset,
            len: space.page_size(),
            e: std::io::Error::other("mmap returned a null mapping"),
        })?;
        Ok(MappedPage {
            ptr,
            size: space.page_size(),
        })
    }

    fn release_page(&mut self, index: usize, page: MappedPage) -> Result<(), WindowError> {
        trace!("Unmapping page {index} from {:?}", self.path);
        drop(page);
        Ok(())
    }
}

#[cfg(test)]
mod test_devmem {
    use crate::address_space::AddressSpace;
    use crate::devmem::{DevMemPageSource, system_page_size};
    use crate::page::{Page, PageSource};
    use crate::test_support::scratch_dir;
    use googletest::prelude::*;
    use std::fs::File;

    #[gtest]
    fn maps_pages_of_a_backing_file() {
        let host_page = system_page_size();
        let backing = scratch_dir("devmem-backing").join("mem");
        File::create(&backing)
            .and_then(|f| f.set_len(2 * host_page as u64))
            .unwrap();

        let space = AddressSpace::new(0, 2 * host_page, host_page).unwrap();
        let mut source = DevMemPageSource::with_device(&backing).unwrap();
        let mut page = source.acquire_page(&space, 1).unwrap();
        page.store(4, &[0xCAFE_F00Du32]);
        let mut out = [0u32; 1];
        page.load(4, &mut out);
        expect_that!(out[0], eq(0xCAFE_F00D));
        source.release_page(1, page).unwrap();

        let contents = std::fs::read(&backing).unwrap();
        let word: [u8; 4] = contents[host_page + 4..host_page + 8].try_into().unwrap();
        assert_that!(word, eq(0xCAFE_F00Du32.to_ne_bytes()));
    }

    #[gtest]
    fn rejects_unaligned_page_size() {
        let backing = scratch_dir("devmem-unaligned").join("mem");
        File::create(&backing).unwrap();
        let space = AddressSpace::new(0, 256, 128).unwrap();
        let mut source = DevMemPageSource::with_device(&backing).unwrap();
        let result = source.acquire_page(&space, 0).map(|p| p.size());
        assert_that!(
            result,
            err(displays_as(contains_substring("multiples of the system page size")))
        );
    }

    #[gtest]
    fn missing_device_is_read_error() {
        let result = DevMemPageSource::with_device(&scratch_dir("devmem-missing").join("nope"))
            .map(|_| ());
        assert_that!(result, err(displays_as(starts_with("WindowError::IORead"))));
    }
}
