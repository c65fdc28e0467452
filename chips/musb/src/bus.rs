// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Register bus access.
//!
//! The controller core never dereferences register addresses itself. All
//! accesses go through a [`Bus`], which is either the CPU's memory bus
//! ([`MmioBus`]) or whatever an external bridge chip puts in between.
//! Implementations must not block and must tolerate being called with the
//! controller lock held.

use core::ptr::{read_volatile, write_volatile};

/// Byte-offset addressed register window.
pub trait Bus {
    fn read8(&self, offset: usize) -> u8;
    fn read16(&self, offset: usize) -> u16;
    fn read32(&self, offset: usize) -> u32;
    fn write8(&self, offset: usize, val: u8);
    fn write16(&self, offset: usize, val: u16);
    fn write32(&self, offset: usize, val: u32);
}

impl<T: Bus + ?Sized> Bus for &T {
    fn read8(&self, offset: usize) -> u8 {
        (**self).read8(offset)
    }
    fn read16(&self, offset: usize) -> u16 {
        (**self).read16(offset)
    }
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }
    fn write8(&self, offset: usize, val: u8) {
        (**self).write8(offset, val)
    }
    fn write16(&self, offset: usize, val: u16) {
        (**self).write16(offset, val)
    }
    fn write32(&self, offset: usize, val: u32) {
        (**self).write32(offset, val)
    }
}

/// Directly mapped register window with volatile accesses.
#[derive(Clone, Copy)]
pub struct MmioBus {
    base: usize,
}

impl MmioBus {
    /// # Safety
    ///
    /// `base` must be the start of a mapped, device-memory register window
    /// large enough for every offset the driver uses, and nothing else may
    /// access it without going through the controller lock.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl Bus for MmioBus {
    #[inline]
    fn read8(&self, offset: usize) -> u8 {
        // SAFETY: the window was validated in `new`.
        unsafe { read_volatile((self.base + offset) as *const u8) }
    }

    #[inline]
    fn read16(&self, offset: usize) -> u16 {
        // SAFETY: the window was validated in `new`.
        unsafe { read_volatile((self.base + offset) as *const u16) }
    }

    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: the window was validated in `new`.
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write8(&self, offset: usize, val: u8) {
        // SAFETY: the window was validated in `new`.
        unsafe { write_volatile((self.base + offset) as *mut u8, val) }
    }

    #[inline]
    fn write16(&self, offset: usize, val: u16) {
        // SAFETY: the window was validated in `new`.
        unsafe { write_volatile((self.base + offset) as *mut u16, val) }
    }

    #[inline]
    fn write32(&self, offset: usize, val: u32) {
        // SAFETY: the window was validated in `new`.
        unsafe { write_volatile((self.base + offset) as *mut u32, val) }
    }
}
