// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Endpoint FIFO data path.
//!
//! The core asks a [`FifoEngine`] to move packet data. Directly mapped
//! controllers use [`PioFifo`]. Bridged parts that cannot issue byte or
//! halfword cycles provide their own engine.

use crate::bus::Bus;
use crate::endpoint::HwEndpoint;

/// Loads and unloads endpoint FIFOs.
///
/// Callers guarantee the slice length does not exceed the endpoint's max
/// packet size in that direction. Exactly `data.len()` / `buf.len()` bytes
/// move. A badly aligned buffer only costs transfer width, never fails.
pub trait FifoEngine<B: Bus> {
    fn write_fifo(&self, bus: &B, ep: &HwEndpoint, data: &[u8]);
    fn read_fifo(&self, bus: &B, ep: &HwEndpoint, buf: &mut [u8]);

    /// Fill in engine specific endpoint addressing after the FIFO layout
    /// is final.
    fn annotate(&self, _ep: &mut HwEndpoint) {}
}

/// Programmed I/O through the endpoint FIFO register, using the widest
/// access the buffer's alignment allows.
#[derive(Clone, Copy, Default)]
pub struct PioFifo;

impl<B: Bus> FifoEngine<B> for PioFifo {
    fn write_fifo(&self, bus: &B, ep: &HwEndpoint, data: &[u8]) {
        let fifo = ep.fifo;
        let addr = data.as_ptr() as usize;

        let mut rest = data;
        if addr & 0x3 == 0 {
            let mut words = rest.chunks_exact(4);
            for w in &mut words {
                bus.write32(fifo, u32::from_ne_bytes([w[0], w[1], w[2], w[3]]));
            }
            rest = words.remainder();
        }
        if addr & 0x1 == 0 {
            let mut halves = rest.chunks_exact(2);
            for h in &mut halves {
                bus.write16(fifo, u16::from_ne_bytes([h[0], h[1]]));
            }
            rest = halves.remainder();
        }
        for b in rest {
            bus.write8(fifo, *b);
        }
    }

    fn read_fifo(&self, bus: &B, ep: &HwEndpoint, buf: &mut [u8]) {
        let fifo = ep.fifo;
        let addr = buf.as_ptr() as usize;

        let mut rest = buf;
        if addr & 0x3 == 0 {
            let mut words = core::mem::take(&mut rest).chunks_exact_mut(4);
            for w in &mut words {
                w.copy_from_slice(&bus.read32(fifo).to_ne_bytes());
            }
            rest = words.into_remainder();
        }
        if addr & 0x1 == 0 {
            let mut halves = core::mem::take(&mut rest).chunks_exact_mut(2);
            for h in &mut halves {
                h.copy_from_slice(&bus.read16(fifo).to_ne_bytes());
            }
            rest = halves.into_remainder();
        }
        for b in rest {
            *b = bus.read8(fifo);
        }
    }
}
