// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Chip model for the unit tests: a flat little-endian register space with
//! a write log and scripted read values, seen through base-offset windows.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::vec::Vec;

use musb::bus::Bus;
use musb::ErrorCode;

use crate::time::{Freq1KHz, Time, Timer, TimerClient};

pub const CTRL_BASE: usize = 0x0000;
pub const CORE_BASE: usize = 0x1000;
const SIZE: usize = 0x2000;

pub struct FakeChip {
    mem: RefCell<Vec<u8>>,
    writes: RefCell<Vec<(usize, usize, u32)>>,
    scripted: RefCell<BTreeMap<usize, VecDeque<u32>>>,
}

impl FakeChip {
    pub fn new() -> Self {
        Self {
            mem: RefCell::new(vec![0; SIZE]),
            writes: RefCell::new(Vec::new()),
            scripted: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn ctrl(&self) -> Window<'_> {
        Window {
            chip: self,
            base: CTRL_BASE,
        }
    }

    pub fn core(&self) -> Window<'_> {
        Window {
            chip: self,
            base: CORE_BASE,
        }
    }

    /// Preload a bridge register without logging a write.
    pub fn set_ctrl(&self, offset: usize, val: u32) {
        let at = CTRL_BASE + offset;
        self.mem.borrow_mut()[at..at + 4].copy_from_slice(&val.to_le_bytes());
    }

    /// Values returned by successive 32-bit reads of a bridge register,
    /// ahead of its stored contents.
    pub fn script_ctrl(&self, offset: usize, values: &[u32]) {
        self.script(CTRL_BASE + offset, values);
    }

    pub fn script_core(&self, offset: usize, values: &[u32]) {
        self.script(CORE_BASE + offset, values);
    }

    fn script(&self, at: usize, values: &[u32]) {
        self.scripted
            .borrow_mut()
            .entry(at)
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn ctrl_writes(&self, offset: usize) -> Vec<u32> {
        self.writes_at(CTRL_BASE + offset)
    }

    pub fn core_writes(&self, offset: usize) -> Vec<u32> {
        self.writes_at(CORE_BASE + offset)
    }

    /// Width in bytes of every write to a core register.
    pub fn core_write_widths(&self, offset: usize) -> Vec<usize> {
        self.writes
            .borrow()
            .iter()
            .filter(|(at, _, _)| *at == CORE_BASE + offset)
            .map(|(_, width, _)| *width)
            .collect()
    }

    fn writes_at(&self, at: usize) -> Vec<u32> {
        self.writes
            .borrow()
            .iter()
            .filter(|(a, _, _)| *a == at)
            .map(|(_, _, v)| *v)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    fn read(&self, at: usize, width: usize) -> u32 {
        if let Some(val) = self
            .scripted
            .borrow_mut()
            .get_mut(&at)
            .and_then(|q| q.pop_front())
        {
            return val;
        }
        let mem = self.mem.borrow();
        let mut bytes = [0u8; 4];
        bytes[..width].copy_from_slice(&mem[at..at + width]);
        u32::from_le_bytes(bytes)
    }

    fn write(&self, at: usize, width: usize, val: u32) {
        self.writes.borrow_mut().push((at, width, val));
        self.mem.borrow_mut()[at..at + width].copy_from_slice(&val.to_le_bytes()[..width]);
    }
}

#[derive(Clone, Copy)]
pub struct Window<'a> {
    chip: &'a FakeChip,
    base: usize,
}

impl Bus for Window<'_> {
    fn read8(&self, offset: usize) -> u8 {
        self.chip.read(self.base + offset, 1) as u8
    }
    fn read16(&self, offset: usize) -> u16 {
        self.chip.read(self.base + offset, 2) as u16
    }
    fn read32(&self, offset: usize) -> u32 {
        self.chip.read(self.base + offset, 4)
    }
    fn write8(&self, offset: usize, val: u8) {
        self.chip.write(self.base + offset, 1, val as u32)
    }
    fn write16(&self, offset: usize, val: u16) {
        self.chip.write(self.base + offset, 2, val as u32)
    }
    fn write32(&self, offset: usize, val: u32) {
        self.chip.write(self.base + offset, 4, val)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerOp {
    Oneshot(u32),
    Cancel,
}

#[derive(Default)]
pub struct FakeTimer {
    pub ops: RefCell<Vec<TimerOp>>,
    pub armed: Cell<bool>,
}

impl FakeTimer {
    pub fn take(&self) -> Vec<TimerOp> {
        self.ops.take()
    }
}

impl Time for FakeTimer {
    type Frequency = Freq1KHz;

    fn now(&self) -> u32 {
        0
    }
}

impl<'a> Timer<'a> for FakeTimer {
    fn set_client(&self, _client: &'a dyn TimerClient) {}

    fn oneshot(&self, interval: u32) {
        self.armed.set(true);
        self.ops.borrow_mut().push(TimerOp::Oneshot(interval));
    }

    fn cancel(&self) -> Result<(), ErrorCode> {
        self.armed.set(false);
        self.ops.borrow_mut().push(TimerOp::Cancel);
        Ok(())
    }
}
