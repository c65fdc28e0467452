// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Hardware endpoints and FIFO RAM layout.
//!
//! Endpoint 0 is always the 64 byte control endpoint at FIFO offset 0.
//! The remaining endpoints are laid out once at init, either from one of
//! the [`FifoMode`] tables (cores with dynamic FIFO sizing) or by reading
//! the sizes the silicon was synthesized with. The layout never changes
//! afterwards.

use log::{debug, info};

use crate::bus::Bus;
use crate::errorcode::ErrorCode;
use crate::registers::{value_of, FifoSize, FifoSz, Registers};

pub const MAX_ENDPOINTS: usize = 16;

/// Control endpoint FIFO size, both directions.
pub const EP0_FIFO_SIZE: u16 = 64;

/// Smallest FIFO the core can address.
const MIN_FIFO_SIZE: u16 = 8;

/// Both halves of the bulk endpoint must hold a full high speed packet.
const BULK_MIN_PACKET: u16 = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FifoStyle {
    /// One FIFO shared by both directions
    RxTx,
    Tx,
    Rx,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufMode {
    Single,
    Double,
}

/// One entry of a FIFO layout table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FifoCfg {
    pub ep: u8,
    pub style: FifoStyle,
    pub mode: BufMode,
    pub maxpacket: u16,
}

impl FifoCfg {
    const fn single(ep: u8, style: FifoStyle, maxpacket: u16) -> Self {
        Self {
            ep,
            style,
            mode: BufMode::Single,
            maxpacket,
        }
    }

    const fn double(ep: u8, style: FifoStyle, maxpacket: u16) -> Self {
        Self {
            ep,
            style,
            mode: BufMode::Double,
            maxpacket,
        }
    }
}

const EP0_CFG: FifoCfg = FifoCfg::single(0, FifoStyle::RxTx, EP0_FIFO_SIZE);

/// Uses 2112 bytes, endpoint 0 included.
pub static MODE_0: [FifoCfg; 5] = [
    FifoCfg::single(1, FifoStyle::Tx, 512),
    FifoCfg::single(1, FifoStyle::Rx, 512),
    FifoCfg::single(2, FifoStyle::RxTx, 512),
    FifoCfg::single(3, FifoStyle::RxTx, 256),
    FifoCfg::single(4, FifoStyle::RxTx, 256),
];

/// Fits in 4 KiB.
pub static MODE_1: [FifoCfg; 5] = [
    FifoCfg::double(1, FifoStyle::Tx, 512),
    FifoCfg::double(1, FifoStyle::Rx, 512),
    FifoCfg::double(2, FifoStyle::RxTx, 512),
    FifoCfg::single(3, FifoStyle::RxTx, 256),
    FifoCfg::single(4, FifoStyle::RxTx, 256),
];

/// Fits in 4 KiB.
pub static MODE_2: [FifoCfg; 6] = [
    FifoCfg::single(1, FifoStyle::Tx, 512),
    FifoCfg::single(1, FifoStyle::Rx, 512),
    FifoCfg::single(2, FifoStyle::Tx, 512),
    FifoCfg::single(2, FifoStyle::Rx, 512),
    FifoCfg::single(3, FifoStyle::RxTx, 256),
    FifoCfg::single(4, FifoStyle::RxTx, 256),
];

/// Fits in 4 KiB.
pub static MODE_3: [FifoCfg; 6] = [
    FifoCfg::double(1, FifoStyle::Tx, 512),
    FifoCfg::double(1, FifoStyle::Rx, 512),
    FifoCfg::single(2, FifoStyle::Tx, 512),
    FifoCfg::single(2, FifoStyle::Rx, 512),
    FifoCfg::single(3, FifoStyle::RxTx, 256),
    FifoCfg::single(4, FifoStyle::RxTx, 256),
];

/// Predefined FIFO layouts for cores with dynamic FIFO sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FifoMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

impl FifoMode {
    /// Map a numeric board option to a layout. Unknown values fall back to
    /// mode 0, the smallest layout.
    pub fn from_option(option: u8) -> Self {
        match option {
            1 => FifoMode::Mode1,
            2 => FifoMode::Mode2,
            3 => FifoMode::Mode3,
            _ => FifoMode::Mode0,
        }
    }

    pub fn table(self) -> &'static [FifoCfg] {
        match self {
            FifoMode::Mode0 => &MODE_0,
            FifoMode::Mode1 => &MODE_1,
            FifoMode::Mode2 => &MODE_2,
            FifoMode::Mode3 => &MODE_3,
        }
    }
}

/// A byte range of FIFO RAM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FifoRange {
    pub start: u16,
    pub len: u16,
}

impl FifoRange {
    pub fn end(&self) -> usize {
        self.start as usize + self.len as usize
    }

    pub fn overlaps(&self, other: &FifoRange) -> bool {
        (self.start as usize) < other.end() && (other.start as usize) < self.end()
    }
}

/// Extra addressing of an endpoint behind a bus bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeWindows {
    /// DMA address of the asynchronous FIFO window
    pub fifo_async: usize,
    /// DMA address of the synchronous FIFO window
    pub fifo_sync: usize,
    /// Offset of the transfer size register(s) in the bridge register file
    pub conf: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwEndpoint {
    pub num: u8,
    pub max_packet_tx: u16,
    pub max_packet_rx: u16,
    pub shared_fifo: bool,
    pub tx_double_buffered: bool,
    pub rx_double_buffered: bool,
    /// FIFO RAM assignment, known only for table driven layouts.
    pub tx_fifo: Option<FifoRange>,
    pub rx_fifo: Option<FifoRange>,
    /// Offset of the data FIFO register.
    pub fifo: usize,
    /// Offset of the control/status register window.
    pub regs: usize,
    pub bridge: Option<BridgeWindows>,
}

impl HwEndpoint {
    pub const fn new(num: u8) -> Self {
        Self {
            num,
            max_packet_tx: 0,
            max_packet_rx: 0,
            shared_fifo: false,
            tx_double_buffered: false,
            rx_double_buffered: false,
            tx_fifo: None,
            rx_fifo: None,
            fifo: 0,
            regs: 0,
            bridge: None,
        }
    }

    fn is_bulk_capable(&self) -> bool {
        self.max_packet_tx >= BULK_MIN_PACKET && self.max_packet_rx >= BULK_MIN_PACKET
    }
}

/// The controller's endpoint table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointTable {
    endpoints: [HwEndpoint; MAX_ENDPOINTS],
    count: u8,
    mask: u16,
    bulk: Option<u8>,
}

impl EndpointTable {
    pub const fn new() -> Self {
        let mut endpoints = [HwEndpoint::new(0); MAX_ENDPOINTS];
        let mut i = 0;
        while i < MAX_ENDPOINTS {
            endpoints[i].num = i as u8;
            i += 1;
        }
        endpoints[0].max_packet_tx = EP0_FIFO_SIZE;
        endpoints[0].max_packet_rx = EP0_FIFO_SIZE;
        Self {
            endpoints,
            count: 1,
            mask: 1,
            bulk: None,
        }
    }

    /// Forget any previous layout. Only endpoint 0 remains.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Number of endpoints, endpoint 0 included.
    pub fn count(&self) -> u8 {
        self.count
    }

    /// One bit per configured endpoint.
    pub fn mask(&self) -> u16 {
        self.mask
    }

    pub fn bulk(&self) -> Option<u8> {
        self.bulk
    }

    pub fn get(&self, ep: u8) -> Option<&HwEndpoint> {
        if ep < self.count {
            self.endpoints.get(ep as usize)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, ep: u8) -> Option<&mut HwEndpoint> {
        if ep < self.count {
            self.endpoints.get_mut(ep as usize)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &HwEndpoint> {
        self.endpoints[..self.count as usize].iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut HwEndpoint> {
        self.endpoints[..self.count as usize].iter_mut()
    }

    /// Lay out FIFO RAM from `table`, endpoint 0 first. Returns the number
    /// of bytes used.
    pub fn configure_from_table<B: Bus>(
        &mut self,
        regs: &Registers<B>,
        table: &[FifoCfg],
        ram_size: usize,
        num_endpoints: u8,
    ) -> Result<usize, ErrorCode> {
        let mut offset = self.fifo_setup(regs, &EP0_CFG, 0, ram_size)?;

        for cfg in table {
            if cfg.ep >= num_endpoints || cfg.ep as usize >= MAX_ENDPOINTS {
                debug!("musb: invalid ep {}", cfg.ep);
                return Err(ErrorCode::NOMEM);
            }
            offset = self.fifo_setup(regs, cfg, offset, ram_size).map_err(|e| {
                debug!("musb: mem overrun, ep {}", cfg.ep);
                e
            })?;
            self.count = self.count.max(cfg.ep + 1);
        }

        info!(
            "musb: {}/{} max ep, {}/{} memory",
            self.count,
            num_endpoints as usize * 2 - 1,
            offset,
            ram_size
        );
        Ok(offset)
    }

    /// Place one table entry at `offset`, returning the next free offset.
    fn fifo_setup<B: Bus>(
        &mut self,
        regs: &Registers<B>,
        cfg: &FifoCfg,
        offset: usize,
        ram_size: usize,
    ) -> Result<usize, ErrorCode> {
        let maxpacket = cfg
            .maxpacket
            .max(MIN_FIFO_SIZE)
            .checked_next_power_of_two()
            .ok_or(ErrorCode::NOMEM)?;
        let double = cfg.mode == BufMode::Double;
        let footprint = if double {
            (maxpacket as usize) << 1
        } else {
            maxpacket as usize
        };
        if offset + footprint > ram_size {
            return Err(ErrorCode::NOMEM);
        }

        let mut size = FifoSz::SZ.val((maxpacket.trailing_zeros() - 3) as u8);
        if double {
            size += FifoSz::DPB::SET;
        }
        let c_size = value_of(size);
        let range = FifoRange {
            start: offset as u16,
            len: footprint as u16,
        };

        let hw_ep = &mut self.endpoints[cfg.ep as usize];
        match cfg.style {
            FifoStyle::Tx => {
                regs.program_fifo(cfg.ep, Some((c_size, range.start)), None);
                hw_ep.tx_double_buffered = double;
                hw_ep.max_packet_tx = maxpacket;
                hw_ep.tx_fifo = Some(range);
            }
            FifoStyle::Rx => {
                regs.program_fifo(cfg.ep, None, Some((c_size, range.start)));
                hw_ep.rx_double_buffered = double;
                hw_ep.max_packet_rx = maxpacket;
                hw_ep.rx_fifo = Some(range);
            }
            FifoStyle::RxTx => {
                regs.program_fifo(
                    cfg.ep,
                    Some((c_size, range.start)),
                    Some((c_size, range.start)),
                );
                hw_ep.tx_double_buffered = double;
                hw_ep.rx_double_buffered = double;
                hw_ep.max_packet_tx = maxpacket;
                hw_ep.max_packet_rx = maxpacket;
                hw_ep.tx_fifo = Some(range);
                hw_ep.rx_fifo = Some(range);
                hw_ep.shared_fifo = true;
            }
        }
        self.mask |= 1 << cfg.ep;

        Ok(offset + footprint)
    }

    /// Read the hard-wired FIFO sizes of endpoints 1.. until the silicon
    /// reports an absent endpoint.
    pub fn configure_from_hw<B: Bus>(&mut self, regs: &Registers<B>, num_endpoints: u8) {
        debug!("musb: static silicon ep config");

        let last = num_endpoints.min(MAX_ENDPOINTS as u8);
        for ep in 1..last {
            let reg = regs.fifo_size(ep);
            if reg.get() == 0 {
                break;
            }
            self.count += 1;
            self.mask |= 1 << ep;

            let hw_ep = &mut self.endpoints[ep as usize];
            hw_ep.max_packet_tx = 1 << reg.read(FifoSize::TX);
            if reg.read(FifoSize::RX) == 0xf {
                hw_ep.max_packet_rx = hw_ep.max_packet_tx;
                hw_ep.shared_fifo = true;
            } else {
                hw_ep.max_packet_rx = 1 << reg.read(FifoSize::RX);
                hw_ep.shared_fifo = false;
            }
        }
    }

    /// Record the first endpoint whose halves both fit a high speed bulk
    /// packet. Host capable roles cannot run without one.
    pub fn pick_bulk(&mut self, host_capable: bool) -> Result<(), ErrorCode> {
        let bulk = self
            .iter()
            .skip(1)
            .find(|ep| ep.is_bulk_capable())
            .map(|ep| ep.num);
        self.bulk = bulk;
        if self.bulk.is_none() && host_capable {
            debug!("musb: missing bulk");
            return Err(ErrorCode::NOMEM);
        }
        Ok(())
    }
}
