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

//! Named-register access to an accelerator behind a [`PagedWindow`].

use crate::control::{CancelToken, Completion, ControlChannel, RegisterIo, WaitPolicy};
use crate::error::WindowError;
use crate::page::Page;
use crate::registers::RegisterMap;
use crate::window::PagedWindow;
use log::{debug, info};

/// Physical addresses of the buffers the accelerator works on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferAddresses {
    pub input: u64,
    pub output: u64,
    pub aux: u64,
}

/// Work-group id and global offset, one value per dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkGroup {
    pub id: [u32; 3],
    pub global_offset: [u32; 3],
}

/// Borrowed view of a window with the register layout and wait policy of one deployment.
pub struct Accelerator<'a, P: Page> {
    window: &'a mut PagedWindow<P>,
    registers: &'a RegisterMap,
    wait: &'a WaitPolicy,
}

impl<'a, P: Page> Accelerator<'a, P> {
    pub fn new(
        window: &'a mut PagedWindow<P>,
        registers: &'a RegisterMap,
        wait: &'a WaitPolicy,
    ) -> Self {
        Accelerator {
            window,
            registers,
            wait,
        }
    }

    /// The underlying window, for moving input and output data.
    pub fn window(&mut self) -> &mut PagedWindow<P> {
        self.window
    }

    fn write_pointer(&mut self, offset: usize, address: u64) -> Result<(), WindowError> {
        self.window.write_register(offset, address as u32)?;
        self.window.write_register(offset + 4, (address >> 32) as u32)
    }

    pub fn set_buffer_addresses(&mut self, buffers: BufferAddresses) -> Result<(), WindowError> {
        debug!(
            "Buffers: input {:#x}, output {:#x}, aux {:#x}",
            buffers.input, buffers.output, buffers.aux
        );
        self.write_pointer(self.registers.input_buffer, buffers.input)?;
        self.write_pointer(self.registers.output_buffer, buffers.output)?;
        self.write_pointer(self.registers.aux_buffer, buffers.aux)
    }

    pub fn buffer_addresses(&mut self) -> Result<BufferAddresses, WindowError> {
        let mut read_pointer = |offset: usize| -> Result<u64, WindowError> {
            let low = self.window.read_register(offset)?;
            let high = self.window.read_register(offset + 4)?;
            Ok(u64::from(high) << 32 | u64::from(low))
        };
        Ok(BufferAddresses {
            input: read_pointer(self.registers.input_buffer)?,
            output: read_pointer(self.registers.output_buffer)?,
            aux: read_pointer(self.registers.aux_buffer)?,
        })
    }

    pub fn set_work_group(&mut self, group: WorkGroup) -> Result<(), WindowError> {
        for (offset, value) in self.registers.group_id.iter().zip(group.id) {
            self.window.write_register(*offset, value)?;
        }
        for (offset, value) in self.registers.global_offset.iter().zip(group.global_offset) {
            self.window.write_register(*offset, value)?;
        }
        Ok(())
    }

    /// Zero the work-group id and global offset fields.
    pub fn clear_work_group(&mut self) -> Result<(), WindowError> {
        self.set_work_group(WorkGroup::default())
    }

    pub fn work_group(&mut self) -> Result<WorkGroup, WindowError> {
        let mut group = WorkGroup::default();
        for (slot, offset) in group.id.iter_mut().zip(self.registers.group_id) {
            *slot = self.window.read_register(offset)?;
        }
        for (slot, offset) in group.global_offset.iter_mut().zip(self.registers.global_offset) {
            *slot = self.window.read_register(offset)?;
        }
        Ok(group)
    }

    /// Current control word.
    pub fn control_status(&mut self) -> Result<u32, WindowError> {
        self.window.read_register(self.registers.control)
    }

    /// Set the start bit and wait for the done bit under the deployment's wait policy.
    pub fn launch(&mut self, cancel: &CancelToken) -> Result<Completion, WindowError> {
        info!("Launching accelerator");
        let completion =
            ControlChannel::new(&mut *self.window, self.registers.control).run(self.wait, cancel)?;
        info!(
            "Accelerator done after {} polls in {:?}",
            completion.polls, completion.elapsed
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod test_accelerator {
    use crate::accelerator::{Accelerator, BufferAddresses, WorkGroup};
    use crate::address_space::AddressSpace;
    use crate::control::{CancelToken, DONE_MASK, RegisterIo, START_MASK, WaitPolicy};
    use crate::error::{WaitAbort, WindowError};
    use crate::page::{HeapPage, HeapPageSource};
    use crate::registers::RegisterMap;
    use crate::window::PagedWindow;
    use googletest::prelude::*;
    use rstest::*;

    #[fixture]
    fn window() -> PagedWindow<HeapPage> {
        let space = AddressSpace::new(0x43c0_0000, 2 * 4096, 4096).unwrap();
        PagedWindow::open(space, &mut HeapPageSource::new()).unwrap()
    }

    #[gtest]
    #[rstest]
    fn buffer_pointers_are_split_into_words(mut window: PagedWindow<HeapPage>) {
        let registers = RegisterMap::default();
        let wait = WaitPolicy::default();
        let buffers = BufferAddresses {
            input: 0x1_2000_0000,
            output: 0x1f00_0000,
            aux: 0xdead_beef_0000_1000,
        };
        let mut accelerator = Accelerator::new(&mut window, &registers, &wait);
        accelerator.set_buffer_addresses(buffers).unwrap();
        expect_that!(accelerator.buffer_addresses(), ok(eq(&buffers)));

        expect_that!(window.read_register(0x40), ok(eq(&0x2000_0000)));
        expect_that!(window.read_register(0x44), ok(eq(&0x1)));
        expect_that!(window.read_register(0x54), ok(eq(&0xdead_beef)));
    }

    #[gtest]
    #[rstest]
    fn clearing_the_work_group_zeroes_every_field(mut window: PagedWindow<HeapPage>) {
        let registers = RegisterMap::default();
        let wait = WaitPolicy::default();
        let mut accelerator = Accelerator::new(&mut window, &registers, &wait);
        let group = WorkGroup {
            id: [1, 2, 3],
            global_offset: [4, 5, 6],
        };
        accelerator.set_work_group(group).unwrap();
        expect_that!(accelerator.work_group(), ok(eq(&group)));

        accelerator.clear_work_group().unwrap();
        expect_that!(accelerator.work_group(), ok(eq(&WorkGroup::default())));
    }

    #[gtest]
    #[rstest]
    fn launch_returns_when_done_is_already_set(mut window: PagedWindow<HeapPage>) {
        window.write_register(0, DONE_MASK | 0x100).unwrap();
        let registers = RegisterMap::default();
        let wait = WaitPolicy::default();
        let mut accelerator = Accelerator::new(&mut window, &registers, &wait);

        let completion = accelerator.launch(&CancelToken::new()).unwrap();
        expect_that!(completion.control_word, eq(DONE_MASK | START_MASK | 0x100));
        expect_that!(completion.polls, eq(1));
    }

    #[gtest]
    #[rstest]
    fn launch_without_done_hits_the_poll_limit(mut window: PagedWindow<HeapPage>) {
        let registers = RegisterMap::default();
        let wait = WaitPolicy {
            max_polls: Some(3),
            ..WaitPolicy::unbounded()
        };
        let mut accelerator = Accelerator::new(&mut window, &registers, &wait);

        let result = accelerator.launch(&CancelToken::new());
        assert_that!(
            &result,
            err(displays_as(contains_substring("poll limit reached")))
        );
        let failure = result.unwrap_err();
        assert!(matches!(
            failure,
            WindowError::HandshakeTimeout {
                cause: WaitAbort::PollLimit,
                polls: 3,
                ..
            }
        ));
        expect_that!(accelerator.control_status(), ok(eq(&START_MASK)));
    }
}
