// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! FIFO data path through the bridge.
//!
//! The bridge bus has no byte or halfword cycles. Every FIFO access is a
//! full 32-bit word, and the bridge learns the real byte count from a per
//! endpoint transfer size register that must be written first.

use log::trace;
use tock_registers::LocalRegisterCopy;

use musb::bus::Bus;
use musb::endpoint::{BridgeWindows, HwEndpoint};
use musb::fifo::FifoEngine;
use musb::registers::fifo_offset;

use crate::registers::{ep_conf, Ep0Conf, EpConf, DMA_FIFO_WINDOW, EP_RX_OFFSET};

/// Physical addresses of the bridge's DMA ports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DmaPorts {
    pub async_base: usize,
    pub sync_base: usize,
}

pub struct BridgeFifo<C: Bus> {
    ctrl: C,
    dma: DmaPorts,
}

impl<C: Bus> BridgeFifo<C> {
    /// `ctrl` is the bridge control window, where the transfer size
    /// registers live.
    pub const fn new(ctrl: C, dma: DmaPorts) -> Self {
        Self { ctrl, dma }
    }

    fn conf(ep: &HwEndpoint) -> usize {
        ep.bridge.map_or(ep_conf(ep.num), |w| w.conf)
    }

    fn set_transfer_size(&self, ep: &HwEndpoint, len: usize, transmit: bool) {
        let conf = Self::conf(ep);
        if ep.num == 0 {
            let mut reg = LocalRegisterCopy::<u32, Ep0Conf::Register>::new(0);
            reg.write(Ep0Conf::XFR_SIZE.val(len as u32));
            if transmit {
                reg.modify(Ep0Conf::DIR_TX::SET);
            }
            self.ctrl.write32(conf, reg.get());
        } else {
            let mut reg = LocalRegisterCopy::<u32, EpConf::Register>::new(0);
            reg.write(EpConf::XFR_SIZE.val(len as u32));
            let offset = if transmit { conf } else { conf + EP_RX_OFFSET };
            self.ctrl.write32(offset, reg.get());
        }
    }
}

impl<B: Bus, C: Bus> FifoEngine<B> for BridgeFifo<C> {
    fn write_fifo(&self, bus: &B, ep: &HwEndpoint, data: &[u8]) {
        trace!("tusb: TX ep{} count {}", ep.num, data.len());
        self.set_transfer_size(ep, data.len(), true);

        let mut words = data.chunks_exact(4);
        for w in &mut words {
            bus.write32(ep.fifo, u32::from_ne_bytes([w[0], w[1], w[2], w[3]]));
        }
        let rest = words.remainder();
        if !rest.is_empty() {
            let mut word = [0u8; 4];
            word[..rest.len()].copy_from_slice(rest);
            bus.write32(ep.fifo, u32::from_ne_bytes(word));
        }
    }

    fn read_fifo(&self, bus: &B, ep: &HwEndpoint, buf: &mut [u8]) {
        trace!("tusb: RX ep{} count {}", ep.num, buf.len());
        self.set_transfer_size(ep, buf.len(), false);

        let mut words = buf.chunks_exact_mut(4);
        for w in &mut words {
            w.copy_from_slice(&bus.read32(ep.fifo).to_ne_bytes());
        }
        let rest = words.into_remainder();
        if !rest.is_empty() {
            let word = bus.read32(ep.fifo).to_ne_bytes();
            let n = rest.len();
            rest.copy_from_slice(&word[..n]);
        }
    }

    fn annotate(&self, ep: &mut HwEndpoint) {
        let fifo = DMA_FIFO_WINDOW + fifo_offset(ep.num);
        ep.bridge = Some(BridgeWindows {
            fifo_async: self.dma.async_base + fifo,
            fifo_sync: self.dma.sync_base + fifo,
            conf: ep_conf(ep.num),
        });
    }
}
