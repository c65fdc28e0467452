// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Register file model used by the unit tests.
//!
//! Emulates the pieces of the MUSB register file the driver relies on:
//! the INDEX selected endpoint window, the flat endpoint windows, FIFO
//! registers as byte queues and read-to-clear interrupt status.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::vec::Vec;

use crate::bus::Bus;
use crate::registers::{INDEX, INTRRX, INTRTX, INTRUSB};

const EP_WINDOW: usize = 0x10;
const FIFO_START: usize = 0x20;
const FIFO_END: usize = 0x60;
const FLAT_START: usize = 0x100;
const FLAT_END: usize = 0x200;

pub struct FakeBus {
    regs: RefCell<[u8; 0x200]>,
    ep_regs: RefCell<[[u8; 16]; 16]>,
    fifos: RefCell<Vec<VecDeque<u8>>>,
    writes: RefCell<Vec<(usize, usize, u32)>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            regs: RefCell::new([0; 0x200]),
            ep_regs: RefCell::new([[0; 16]; 16]),
            fifos: RefCell::new((0..16).map(|_| VecDeque::new()).collect()),
            writes: RefCell::new(Vec::new()),
        }
    }

    /// Preload a common register without logging a write.
    pub fn set8(&self, offset: usize, val: u8) {
        self.regs.borrow_mut()[offset] = val;
    }

    pub fn set16(&self, offset: usize, val: u16) {
        let mut regs = self.regs.borrow_mut();
        regs[offset..offset + 2].copy_from_slice(&val.to_le_bytes());
    }

    pub fn get8(&self, offset: usize) -> u8 {
        self.regs.borrow()[offset]
    }

    pub fn set_ep8(&self, ep: u8, reg: usize, val: u8) {
        self.ep_regs.borrow_mut()[ep as usize][reg] = val;
    }

    pub fn ep16(&self, ep: u8, reg: usize) -> u16 {
        let regs = self.ep_regs.borrow();
        u16::from_le_bytes([regs[ep as usize][reg], regs[ep as usize][reg + 1]])
    }

    /// Bytes currently queued in endpoint `ep`'s FIFO.
    pub fn fifo(&self, ep: u8) -> Vec<u8> {
        self.fifos.borrow()[ep as usize].iter().copied().collect()
    }

    /// Every value written to `offset`, oldest first.
    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.writes
            .borrow()
            .iter()
            .filter(|(o, _, _)| *o == offset)
            .map(|(_, _, v)| *v)
            .collect()
    }

    /// Width in bytes of every write to `offset`, oldest first.
    pub fn write_widths(&self, offset: usize) -> Vec<usize> {
        self.writes
            .borrow()
            .iter()
            .filter(|(o, _, _)| *o == offset)
            .map(|(_, w, _)| *w)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    fn fifo_index(offset: usize) -> Option<usize> {
        if (FIFO_START..FIFO_END).contains(&offset) {
            Some((offset - FIFO_START) / 4)
        } else {
            None
        }
    }

    fn read_byte(&self, offset: usize) -> u8 {
        if (EP_WINDOW..FIFO_START).contains(&offset) {
            let ep = self.regs.borrow()[INDEX] as usize & 0xf;
            self.ep_regs.borrow()[ep][offset - EP_WINDOW]
        } else if (FLAT_START..FLAT_END).contains(&offset) {
            let rel = offset - FLAT_START;
            self.ep_regs.borrow()[rel / 16][rel % 16]
        } else {
            self.regs.borrow()[offset]
        }
    }

    fn write_byte(&self, offset: usize, val: u8) {
        if (EP_WINDOW..FIFO_START).contains(&offset) {
            let ep = self.regs.borrow()[INDEX] as usize & 0xf;
            self.ep_regs.borrow_mut()[ep][offset - EP_WINDOW] = val;
        } else if (FLAT_START..FLAT_END).contains(&offset) {
            let rel = offset - FLAT_START;
            self.ep_regs.borrow_mut()[rel / 16][rel % 16] = val;
        } else {
            self.regs.borrow_mut()[offset] = val;
        }
    }

    fn read(&self, offset: usize, width: usize) -> u32 {
        if let Some(ep) = Self::fifo_index(offset) {
            let fifo = &mut self.fifos.borrow_mut()[ep];
            let mut bytes = [0u8; 4];
            for b in bytes.iter_mut().take(width) {
                *b = fifo.pop_front().unwrap_or(0);
            }
            return u32::from_le_bytes(bytes);
        }
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().take(width).enumerate() {
            *b = self.read_byte(offset + i);
        }
        if offset == INTRUSB || offset == INTRTX || offset == INTRRX {
            for i in 0..width {
                self.regs.borrow_mut()[offset + i] = 0;
            }
        }
        u32::from_le_bytes(bytes)
    }

    fn write(&self, offset: usize, width: usize, val: u32) {
        self.writes.borrow_mut().push((offset, width, val));
        let bytes = val.to_le_bytes();
        if let Some(ep) = Self::fifo_index(offset) {
            self.fifos.borrow_mut()[ep].extend(&bytes[..width]);
            return;
        }
        for (i, b) in bytes.iter().take(width).enumerate() {
            self.write_byte(offset + i, *b);
        }
    }
}

impl Bus for FakeBus {
    fn read8(&self, offset: usize) -> u8 {
        self.read(offset, 1) as u8
    }
    fn read16(&self, offset: usize) -> u16 {
        self.read(offset, 2) as u16
    }
    fn read32(&self, offset: usize) -> u32 {
        self.read(offset, 4)
    }
    fn write8(&self, offset: usize, val: u8) {
        self.write(offset, 1, val as u32)
    }
    fn write16(&self, offset: usize, val: u16) {
        self.write(offset, 2, val as u32)
    }
    fn write32(&self, offset: usize, val: u32) {
        self.write(offset, 4, val)
    }
}
