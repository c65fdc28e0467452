// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! MUSBHDRC register file.
//!
//! The common registers live at fixed byte offsets. Endpoint control and
//! status registers are reached either through the INDEX register and the
//! window at 0x10, or, on cores synthesized with the flat register map,
//! directly at 0x100 + 0x10 * endpoint. [`Registers`] hides that choice.

use tock_registers::fields::FieldValue;
use tock_registers::register_bitfields;
use tock_registers::LocalRegisterCopy;

use crate::bus::Bus;

// Common registers
pub const FADDR: usize = 0x00;
pub const POWER: usize = 0x01;
pub const INTRTX: usize = 0x02;
pub const INTRRX: usize = 0x04;
pub const INTRTXE: usize = 0x06;
pub const INTRRXE: usize = 0x08;
pub const INTRUSB: usize = 0x0a;
pub const INTRUSBE: usize = 0x0b;
pub const FRAME: usize = 0x0c;
pub const INDEX: usize = 0x0e;
pub const TESTMODE: usize = 0x0f;

// Endpoint registers, relative to the endpoint window
pub const TXMAXP: usize = 0x00;
pub const CSR0: usize = 0x02;
pub const TXCSR: usize = 0x02;
pub const RXMAXP: usize = 0x04;
pub const RXCSR: usize = 0x06;
pub const COUNT0: usize = 0x08;
pub const RXCOUNT: usize = 0x08;
pub const TXTYPE: usize = 0x0a;
pub const TXINTERVAL: usize = 0x0b;
pub const RXTYPE: usize = 0x0c;
pub const RXINTERVAL: usize = 0x0d;
/// CONFIGDATA when endpoint 0 is selected, FIFOSIZE otherwise.
pub const FIFOSIZE: usize = 0x0f;
pub const CONFIGDATA: usize = 0x0f;

const INDEXED_WINDOW: usize = 0x10;
const FIFO_BASE: usize = 0x20;

// Additional control registers
pub const DEVCTL: usize = 0x60;
pub const TXFIFOSZ: usize = 0x62;
pub const RXFIFOSZ: usize = 0x63;
pub const TXFIFOADD: usize = 0x64;
pub const RXFIFOADD: usize = 0x66;
pub const HWVERS: usize = 0x6c;

const FLAT_WINDOW: usize = 0x100;
const FLAT_STRIDE: usize = 0x10;

/// Global interrupts enabled by `start`: everything but SOF.
pub const INTRUSBE_DEFAULT: u8 = 0xf7;

register_bitfields![u8,
    pub Power [
        ISOUPDATE OFFSET(7) NUMBITS(1) [],
        SOFTCONN OFFSET(6) NUMBITS(1) [],
        HSENAB OFFSET(5) NUMBITS(1) [],
        HSMODE OFFSET(4) NUMBITS(1) [],
        RESET OFFSET(3) NUMBITS(1) [],
        RESUME OFFSET(2) NUMBITS(1) [],
        SUSPENDM OFFSET(1) NUMBITS(1) [],
        ENSUSPEND OFFSET(0) NUMBITS(1) []
    ],
    pub IntrUsb [
        VBUSERROR OFFSET(7) NUMBITS(1) [],
        SESSREQ OFFSET(6) NUMBITS(1) [],
        DISCONNECT OFFSET(5) NUMBITS(1) [],
        CONNECT OFFSET(4) NUMBITS(1) [],
        SOF OFFSET(3) NUMBITS(1) [],
        /// Bus reset in peripheral mode, babble in host mode.
        RESET OFFSET(2) NUMBITS(1) [],
        RESUME OFFSET(1) NUMBITS(1) [],
        SUSPEND OFFSET(0) NUMBITS(1) []
    ],
    pub DevCtl [
        BDEVICE OFFSET(7) NUMBITS(1) [],
        FSDEV OFFSET(6) NUMBITS(1) [],
        LSDEV OFFSET(5) NUMBITS(1) [],
        VBUS OFFSET(3) NUMBITS(2) [
            BelowSessionEnd = 0,
            AboveSessionEnd = 1,
            AboveAValid = 2,
            AboveVbusValid = 3
        ],
        HM OFFSET(2) NUMBITS(1) [],
        HR OFFSET(1) NUMBITS(1) [],
        SESSION OFFSET(0) NUMBITS(1) []
    ],
    pub ConfigData [
        MPRXE OFFSET(7) NUMBITS(1) [],
        MPTXE OFFSET(6) NUMBITS(1) [],
        BIGENDIAN OFFSET(5) NUMBITS(1) [],
        HBRXE OFFSET(4) NUMBITS(1) [],
        HBTXE OFFSET(3) NUMBITS(1) [],
        DYNFIFO OFFSET(2) NUMBITS(1) [],
        SOFTCONE OFFSET(1) NUMBITS(1) [],
        UTMIDW OFFSET(0) NUMBITS(1) []
    ],
    /// TXFIFOSZ / RXFIFOSZ
    pub FifoSz [
        DPB OFFSET(4) NUMBITS(1) [],
        SZ OFFSET(0) NUMBITS(4) []
    ],
    /// Per-endpoint FIFOSIZE on cores with hard-wired FIFOs.
    pub FifoSize [
        RX OFFSET(4) NUMBITS(4) [],
        TX OFFSET(0) NUMBITS(4) []
    ]
];

register_bitfields![u16,
    pub Csr0 [
        FLUSHFIFO OFFSET(8) NUMBITS(1) [],
        SVDSETUPEND OFFSET(7) NUMBITS(1) [],
        SVDRXPKTRDY OFFSET(6) NUMBITS(1) [],
        SENDSTALL OFFSET(5) NUMBITS(1) [],
        SETUPEND OFFSET(4) NUMBITS(1) [],
        DATAEND OFFSET(3) NUMBITS(1) [],
        SENTSTALL OFFSET(2) NUMBITS(1) [],
        TXPKTRDY OFFSET(1) NUMBITS(1) [],
        RXPKTRDY OFFSET(0) NUMBITS(1) []
    ],
    pub HwVers [
        RC OFFSET(15) NUMBITS(1) [],
        MAJOR OFFSET(10) NUMBITS(5) [],
        MINOR OFFSET(0) NUMBITS(10) []
    ]
];

register_bitfields![u32,
    /// Root hub port status word, wPortStatus in the low half and
    /// wPortChange in the high half.
    pub PortStatus [
        C_CONNECTION OFFSET(16) NUMBITS(1) [],
        HIGH_SPEED OFFSET(10) NUMBITS(1) [],
        LOW_SPEED OFFSET(9) NUMBITS(1) [],
        ENABLE OFFSET(1) NUMBITS(1) [],
        CONNECTION OFFSET(0) NUMBITS(1) []
    ]
];

/// Raw value of a field combination, for writes that replace a register.
pub fn value_of<T, R>(fv: FieldValue<T, R>) -> T
where
    T: tock_registers::UIntLike,
    R: tock_registers::RegisterLongName,
{
    let mut reg = LocalRegisterCopy::<T, R>::new(T::zero());
    reg.write(fv);
    reg.get()
}

/// How endpoint control/status registers are addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointMapping {
    /// Write INDEX, then access the shared window at 0x10.
    Indexed,
    /// Every endpoint has its own window at 0x100 + 0x10 * ep.
    Flat,
}

/// Offset of endpoint `ep`'s data FIFO.
pub const fn fifo_offset(ep: u8) -> usize {
    FIFO_BASE + 4 * ep as usize
}

/// Typed access to the MUSB register file on top of a [`Bus`].
pub struct Registers<B: Bus> {
    bus: B,
    mapping: EndpointMapping,
}

impl<B: Bus> Registers<B> {
    pub const fn new(bus: B, mapping: EndpointMapping) -> Self {
        Self { bus, mapping }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Offset of endpoint `ep`'s control/status window as seen by the CPU.
    pub fn endpoint_window(&self, ep: u8) -> usize {
        match self.mapping {
            EndpointMapping::Indexed => INDEXED_WINDOW,
            EndpointMapping::Flat => FLAT_WINDOW + FLAT_STRIDE * ep as usize,
        }
    }

    pub fn power(&self) -> LocalRegisterCopy<u8, Power::Register> {
        LocalRegisterCopy::new(self.bus.read8(POWER))
    }

    pub fn set_power(&self, power: LocalRegisterCopy<u8, Power::Register>) {
        self.bus.write8(POWER, power.get());
    }

    pub fn devctl(&self) -> LocalRegisterCopy<u8, DevCtl::Register> {
        LocalRegisterCopy::new(self.bus.read8(DEVCTL))
    }

    pub fn set_devctl(&self, val: u8) {
        self.bus.write8(DEVCTL, val);
    }

    pub fn hwvers(&self) -> LocalRegisterCopy<u16, HwVers::Register> {
        LocalRegisterCopy::new(self.bus.read16(HWVERS))
    }

    /// Select the endpoint the indexed window refers to.
    pub fn select_endpoint(&self, ep: u8) {
        self.bus.write8(INDEX, ep);
    }

    fn ep_offset(&self, ep: u8, reg: usize) -> usize {
        if self.mapping == EndpointMapping::Indexed {
            self.select_endpoint(ep);
        }
        self.endpoint_window(ep) + reg
    }

    pub fn ep_read8(&self, ep: u8, reg: usize) -> u8 {
        let offset = self.ep_offset(ep, reg);
        self.bus.read8(offset)
    }

    pub fn ep_read16(&self, ep: u8, reg: usize) -> u16 {
        let offset = self.ep_offset(ep, reg);
        self.bus.read16(offset)
    }

    pub fn ep_write16(&self, ep: u8, reg: usize, val: u16) {
        let offset = self.ep_offset(ep, reg);
        self.bus.write16(offset, val);
    }

    /// CONFIGDATA is only visible through the indexed window with
    /// endpoint 0 selected, whatever the mapping.
    pub fn config_data(&self) -> LocalRegisterCopy<u8, ConfigData::Register> {
        self.select_endpoint(0);
        LocalRegisterCopy::new(self.bus.read8(INDEXED_WINDOW + CONFIGDATA))
    }

    /// FIFOSIZE of endpoint `ep`, read through the indexed window.
    pub fn fifo_size(&self, ep: u8) -> LocalRegisterCopy<u8, FifoSize::Register> {
        self.select_endpoint(ep);
        LocalRegisterCopy::new(self.bus.read8(INDEXED_WINDOW + FIFOSIZE))
    }

    /// Program the dynamic FIFO size and start address of `ep`. `tx` and
    /// `rx` are (FIFOSZ value, start offset in bytes) pairs.
    pub fn program_fifo(&self, ep: u8, tx: Option<(u8, u16)>, rx: Option<(u8, u16)>) {
        self.select_endpoint(ep);
        if let Some((sz, start)) = tx {
            self.bus.write8(TXFIFOSZ, sz);
            self.bus.write16(TXFIFOADD, start >> 3);
        }
        if let Some((sz, start)) = rx {
            self.bus.write8(RXFIFOSZ, sz);
            self.bus.write16(RXFIFOADD, start >> 3);
        }
    }
}
