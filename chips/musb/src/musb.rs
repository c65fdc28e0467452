// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! The MUSB controller: init, start/stop and the interrupt state machine.
//!
//! All mutable controller state lives in one [`MusbState`] behind a spin
//! lock. Public methods on [`Musb`] take the lock for their whole
//! duration. Code that already runs under the lock (bridge interrupt
//! handlers, idle timers) works on a [`MusbGuard`] instead.
//!
//! An interrupt delivery is decided in three stages over one register
//! snapshot:
//!
//! 1. session level events (resume, session request, VBUS error,
//!    connect, reset/babble), in the order the programming guide gives;
//! 2. endpoint 0 and endpoint 1..15 FIFO events, routed to the host or
//!    peripheral side according to the role stage 1 left behind;
//! 3. disconnect and suspend, after the endpoint handlers have drained
//!    the final transfers of the old link.

use core::cell::Cell;
use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use log::{debug, error, info, warn};
use spin::{Mutex, MutexGuard};
use tock_registers::LocalRegisterCopy;

use crate::bus::Bus;
use crate::config::{BoardMode, Config, FifoSizing};
use crate::endpoint::{EndpointTable, HwEndpoint};
use crate::errorcode::ErrorCode;
use crate::fifo::FifoEngine;
use crate::hil::{Board, EndpointIo, HostClient, OtgClient, PeripheralClient};
use crate::otg::{OtgInputs, OtgState};
use crate::registers::{
    fifo_offset, value_of, ConfigData, Csr0, DevCtl, HwVers, IntrUsb, Power, PortStatus,
    Registers, COUNT0, CSR0, INTRRX, INTRRXE, INTRTX, INTRTXE, INTRUSB, INTRUSBE,
    INTRUSBE_DEFAULT, RXCOUNT, RXCSR, TESTMODE, TXCSR,
};

/// Session restarts attempted after consecutive VBUS errors.
pub const VBUSERR_RETRY_COUNT: u8 = 2;

/// USB 2.0 high speed test packet (section 7.1.20), without the SYNC,
/// DATA0 PID, CRC and EOP the controller adds.
pub const TEST_PACKET: [u8; 53] = [
    // JKJKJKJK x9
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // JJKKJJKK x8
    0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    // JJJJKKKK x8
    0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee, 0xee,
    // JJJJJJJKKKKKKK x8
    0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    // JJJJJJJK x8
    0x7f, 0xbf, 0xdf, 0xef, 0xf7, 0xfb, 0xfd,
    // JKKKKKKK x10, JK
    0xfc, 0x7e, 0xbf, 0xdf, 0xef, 0xf7, 0xfb, 0xfd, 0x7e,
];

/// Which side currently drives the port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Peripheral,
}

/// Control transfer progress on endpoint 0, advanced by the upper layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ep0Stage {
    /// Expecting a SETUP packet
    Start,
    Setup,
    TxData,
    RxData,
    StatusIn,
    StatusOut,
}

/// Whether an interrupt delivery matched anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Ignored,
    Handled,
}

impl BitOr for Dispatch {
    type Output = Dispatch;

    fn bitor(self, rhs: Dispatch) -> Dispatch {
        if self == Dispatch::Handled || rhs == Dispatch::Handled {
            Dispatch::Handled
        } else {
            Dispatch::Ignored
        }
    }
}

impl BitOrAssign for Dispatch {
    fn bitor_assign(&mut self, rhs: Dispatch) {
        *self = *self | rhs;
    }
}

/// Latched interrupt status for one delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IrqStatus {
    /// INTRUSB
    pub usb: u8,
    /// INTRTX, one bit per endpoint
    pub tx: u16,
    /// INTRRX, one bit per endpoint
    pub rx: u16,
}

/// Cable state as reported to the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CableState {
    Connected,
    Disconnected,
    A,
    B,
    MiniA,
    MiniB,
}

impl fmt::Display for CableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CableState::Connected => "connected",
            CableState::Disconnected => "disconnected",
            CableState::A => "A",
            CableState::B => "B",
            CableState::MiniA => "Mini-A",
            CableState::MiniB => "Mini-B",
        };
        f.write_str(s)
    }
}

/// Everything the controller lock protects.
pub struct MusbState {
    role: Role,
    otg_state: OtgState,
    endpoints: EndpointTable,
    is_active: bool,
    vbuserr_retry: u8,
    ignore_disconnect: bool,
    port_status: LocalRegisterCopy<u32, PortStatus::Register>,
    ep0_stage: Ep0Stage,
}

impl MusbState {
    const fn new() -> Self {
        Self {
            role: Role::Peripheral,
            otg_state: OtgState::BIdle,
            endpoints: EndpointTable::new(),
            is_active: false,
            vbuserr_retry: VBUSERR_RETRY_COUNT,
            ignore_disconnect: false,
            port_status: LocalRegisterCopy::new(0),
            ep0_stage: Ep0Stage::Start,
        }
    }
}

/// Role-indexed view of the registered upper layers.
#[derive(Clone, Copy)]
enum RoleHandler<'a> {
    Host(&'a dyn HostClient),
    Peripheral(&'a dyn PeripheralClient),
}

impl RoleHandler<'_> {
    fn endpoint0_irq(self, io: &dyn EndpointIo) {
        match self {
            RoleHandler::Host(h) => h.endpoint0_irq(io),
            RoleHandler::Peripheral(p) => p.endpoint0_irq(io),
        }
    }

    fn endpoint_rx_irq(self, io: &dyn EndpointIo, ep: u8) {
        match self {
            RoleHandler::Host(h) => h.endpoint_rx_irq(io, ep),
            RoleHandler::Peripheral(p) => p.endpoint_rx_irq(io, ep),
        }
    }

    fn endpoint_tx_irq(self, io: &dyn EndpointIo, ep: u8) {
        match self {
            RoleHandler::Host(h) => h.endpoint_tx_irq(io, ep),
            RoleHandler::Peripheral(p) => p.endpoint_tx_irq(io, ep),
        }
    }

    fn disconnect(self) {
        match self {
            RoleHandler::Host(h) => h.disconnect(),
            RoleHandler::Peripheral(p) => p.disconnect(),
        }
    }
}

pub struct Musb<'a, B: Bus, F: FifoEngine<B>> {
    regs: Registers<B>,
    fifo: F,
    config: Config,
    board: &'a dyn Board,
    state: Mutex<MusbState>,
    peripheral: Cell<Option<&'a dyn PeripheralClient>>,
    host: Cell<Option<&'a dyn HostClient>>,
    otg: Cell<Option<&'a dyn OtgClient>>,
}

impl<'a, B: Bus, F: FifoEngine<B>> Musb<'a, B, F> {
    pub const fn new(bus: B, fifo: F, config: Config, board: &'a dyn Board) -> Self {
        let mapping = config.mapping;
        Self {
            regs: Registers::new(bus, mapping),
            fifo,
            config,
            board,
            state: Mutex::new(MusbState::new()),
            peripheral: Cell::new(None),
            host: Cell::new(None),
            otg: Cell::new(None),
        }
    }

    pub fn set_peripheral_client(&self, client: &'a dyn PeripheralClient) {
        self.peripheral.set(Some(client));
    }

    pub fn set_host_client(&self, client: &'a dyn HostClient) {
        self.host.set(Some(client));
    }

    pub fn set_otg_client(&self, client: &'a dyn OtgClient) {
        self.otg.set(Some(client));
    }

    /// Take the controller lock.
    pub fn lock(&self) -> MusbGuard<'_, 'a, B, F> {
        MusbGuard {
            musb: self,
            state: self.state.lock(),
        }
    }

    pub fn registers(&self) -> &Registers<B> {
        &self.regs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bring the controller up: chip glue, endpoint layout and IRQ.
    ///
    /// Anything acquired before a failure is released again, in reverse
    /// order.
    pub fn init(&self) -> Result<(), ErrorCode> {
        if !self.config.mode_supported() {
            error!("musb: {:?} role is not supported by this build", self.config.mode);
            return Err(ErrorCode::NOSUPPORT);
        }

        self.board.init()?;

        {
            let mut musb = self.lock();
            // Interrupts stay off until the handler is in place.
            self.board.disable();
            if let Err(e) = musb.core_init() {
                drop(musb);
                self.board.exit();
                return Err(e);
            }
        }

        if let Err(e) = self.board.request_irq() {
            error!("musb: request_irq failed: {}", e);
            self.board.exit();
            return Err(ErrorCode::BUSY);
        }

        let mut musb = self.lock();
        match self.config.mode {
            BoardMode::Host => {
                musb.state.role = Role::Host;
                musb.state.otg_state = OtgState::AIdle;
            }
            BoardMode::Peripheral | BoardMode::Otg => {
                musb.state.role = Role::Peripheral;
                musb.state.otg_state = OtgState::BIdle;
            }
        }
        info!(
            "musb: USB {:?} mode controller, {} endpoints",
            self.config.mode,
            musb.state.endpoints.count()
        );
        Ok(())
    }

    /// Detach: stop everything and release what `init` acquired.
    pub fn remove(&self) {
        self.shutdown();
        self.board.free_irq();
        self.board.exit();
    }

    pub fn start(&self) {
        self.lock().start();
    }

    pub fn stop(&self) {
        self.lock().stop();
    }

    /// Stop the controller for good. Later interrupts are ignored.
    pub fn shutdown(&self) {
        self.lock().shutdown();
    }

    /// Read the core's interrupt status and run the state machine.
    pub fn handle_interrupt(&self) -> Dispatch {
        let mut musb = self.lock();
        let bus = self.regs.bus();
        let status = IrqStatus {
            usb: bus.read8(INTRUSB),
            tx: bus.read16(INTRTX),
            rx: bus.read16(INTRRX),
        };
        if status == IrqStatus::default() {
            debug!("musb: spurious interrupt");
            return Dispatch::Ignored;
        }
        musb.interrupt(status)
    }

    pub fn try_idle(&self) {
        self.lock().try_idle();
    }

    pub fn mode(&self) -> BoardMode {
        self.lock().mode()
    }

    pub fn otg_state(&self) -> OtgState {
        self.lock().otg_state()
    }

    pub fn port_status(&self) -> u32 {
        self.lock().port_status()
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_active()
    }

    pub fn bulk_endpoint(&self) -> Option<u8> {
        self.lock().endpoints().bulk()
    }

    pub fn endpoint(&self, ep: u8) -> Option<HwEndpoint> {
        self.lock().endpoints().get(ep).copied()
    }

    pub fn cable_state(&self) -> CableState {
        self.lock().cable_state()
    }

    /// Gate the functional clock for system suspend.
    pub fn suspend(&self) {
        let musb = self.lock();
        match musb.state.role {
            Role::Peripheral => debug!("musb: suspend as peripheral"),
            Role::Host => debug!("musb: suspend as host"),
        }
        self.board.set_clock(false);
    }

    /// Ungate the functional clock. Register contents survive the gate.
    pub fn resume(&self) {
        let _musb = self.lock();
        self.board.set_clock(true);
    }

    fn handler(&self, role: Role) -> Option<RoleHandler<'a>> {
        match role {
            Role::Host => self.host.get().map(RoleHandler::Host),
            Role::Peripheral => self.peripheral.get().map(RoleHandler::Peripheral),
        }
    }
}

/// The controller with its lock held.
pub struct MusbGuard<'g, 'a, B: Bus, F: FifoEngine<B>> {
    musb: &'g Musb<'a, B, F>,
    state: MutexGuard<'g, MusbState>,
}

impl<B: Bus, F: FifoEngine<B>> MusbGuard<'_, '_, B, F> {
    pub fn mode(&self) -> BoardMode {
        self.musb.config.mode
    }

    pub fn role(&self) -> Role {
        self.state.role
    }

    pub fn otg_state(&self) -> OtgState {
        self.state.otg_state
    }

    pub fn set_otg_state(&mut self, state: OtgState) {
        self.state.otg_state = state;
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn set_active(&mut self, active: bool) {
        self.state.is_active = active;
    }

    /// Suppress disconnect handling, for transitions known to produce a
    /// spurious disconnect.
    pub fn set_ignore_disconnect(&mut self, ignore: bool) {
        self.state.ignore_disconnect = ignore;
    }

    pub fn ep0_stage(&self) -> Ep0Stage {
        self.state.ep0_stage
    }

    pub fn set_ep0_stage(&mut self, stage: Ep0Stage) {
        self.state.ep0_stage = stage;
    }

    pub fn port_status(&self) -> u32 {
        self.state.port_status.get()
    }

    pub fn endpoints(&self) -> &EndpointTable {
        &self.state.endpoints
    }

    pub fn vbus_error_retries(&self) -> u8 {
        self.state.vbuserr_retry
    }

    /// A peripheral stack is bound to the controller.
    pub fn peripheral_bound(&self) -> bool {
        self.musb.peripheral.get().is_some()
    }

    /// Probe the core, then lay out the endpoints.
    fn core_init(&mut self) -> Result<(), ErrorCode> {
        let regs = &self.musb.regs;
        let config = &self.musb.config;

        let cfg = regs.config_data();
        info!(
            "musb: ConfigData={:#04x} ({}{}{}{}{}{}{})",
            cfg.get(),
            if cfg.is_set(ConfigData::UTMIDW) { "UTMI-16" } else { "UTMI-8" },
            if cfg.is_set(ConfigData::DYNFIFO) { ", dyn FIFOs" } else { "" },
            if cfg.is_set(ConfigData::MPRXE) { ", bulk combine (X)" } else { "" },
            if cfg.is_set(ConfigData::MPTXE) { ", bulk split (X)" } else { "" },
            if cfg.is_set(ConfigData::HBRXE) { ", HB-ISO Rx (X)" } else { "" },
            if cfg.is_set(ConfigData::HBTXE) { ", HB-ISO Tx (X)" } else { "" },
            if cfg.is_set(ConfigData::SOFTCONE) { ", SoftConn" } else { "" },
        );

        match (cfg.is_set(ConfigData::DYNFIFO), config.fifo) {
            (true, FifoSizing::Static) => {
                error!("musb: reconfigure software for dynamic FIFOs");
                return Err(ErrorCode::NOSUPPORT);
            }
            (false, FifoSizing::Dynamic { .. }) => {
                error!("musb: reconfigure software for static FIFOs");
                return Err(ErrorCode::NOSUPPORT);
            }
            _ => {}
        }

        if !config.multipoint && config.mode.is_host_capable() {
            warn!("musb: external hubs are not supported");
        }

        let vers = regs.hwvers();
        info!(
            "musb: {}HDRC RTL version {}.{}{}",
            if config.multipoint { "M" } else { "" },
            vers.read(HwVers::MAJOR),
            vers.read(HwVers::MINOR),
            if vers.is_set(HwVers::RC) { "RC" } else { "" },
        );

        self.configure()
    }

    /// Lay out the endpoint FIFOs. Running it again reproduces the same
    /// layout.
    pub fn configure(&mut self) -> Result<(), ErrorCode> {
        let musb = self.musb;
        let config = &musb.config;
        let endpoints = &mut self.state.endpoints;

        endpoints.reset();
        match config.fifo {
            FifoSizing::Dynamic { mode, ram_bits } => {
                debug!("musb: setup fifo {:?}", mode);
                let ram_size = 1usize << (ram_bits as usize + 2);
                endpoints.configure_from_table(
                    &musb.regs,
                    mode.table(),
                    ram_size,
                    config.num_endpoints,
                )?;
            }
            FifoSizing::Static => endpoints.configure_from_hw(&musb.regs, config.num_endpoints),
        }
        endpoints.pick_bulk(config.mode.is_host_capable())?;

        for ep in endpoints.iter_mut() {
            ep.fifo = fifo_offset(ep.num);
            ep.regs = musb.regs.endpoint_window(ep.num);
            musb.fifo.annotate(ep);

            if ep.max_packet_tx != 0 {
                debug!(
                    "musb: hw_ep {}{}, {}max {}",
                    ep.num,
                    if ep.shared_fifo { "shared" } else { "tx" },
                    if ep.tx_double_buffered { "doublebuffer, " } else { "" },
                    ep.max_packet_tx
                );
            }
            if ep.max_packet_rx != 0 && !ep.shared_fifo {
                debug!(
                    "musb: hw_ep {}rx, {}max {}",
                    ep.num,
                    if ep.rx_double_buffered { "doublebuffer, " } else { "" },
                    ep.max_packet_rx
                );
            }
            if ep.max_packet_tx == 0 && ep.max_packet_rx == 0 {
                debug!("musb: hw_ep {} not configured", ep.num);
            }
        }
        Ok(())
    }

    /// Enable interrupts and the port.
    pub fn start(&mut self) {
        let regs = &self.musb.regs;
        let bus = regs.bus();
        let mask = self.state.endpoints.mask();
        debug!("musb: start, endpoints {:#06x}", mask);

        bus.write16(INTRTXE, mask);
        bus.write16(INTRRXE, mask & 0xfffe);
        bus.write8(INTRUSBE, INTRUSBE_DEFAULT);

        self.musb.board.enable();

        bus.write8(TESTMODE, 0);

        let mut power = LocalRegisterCopy::new(0);
        power.write(Power::SOFTCONN::SET + Power::HSENAB::SET);
        regs.set_power(power);

        match self.musb.config.mode {
            BoardMode::Host | BoardMode::Otg => {
                regs.set_devctl(value_of(DevCtl::SESSION::SET));
            }
            BoardMode::Peripheral => {
                // No session until a peripheral stack asks to connect.
                let mut devctl = regs.devctl();
                devctl.modify(DevCtl::SESSION::CLEAR);
                regs.set_devctl(devctl.get());
            }
        }
    }

    fn generic_disable(&mut self) {
        let regs = &self.musb.regs;
        let bus = regs.bus();

        bus.write8(INTRUSBE, 0);
        bus.write16(INTRTXE, 0);
        bus.write16(INTRRXE, 0);

        regs.set_devctl(0);

        // Drop whatever latched meanwhile, so nothing fires after teardown.
        let _ = bus.read8(INTRUSB);
        let _ = bus.read16(INTRTX);
        let _ = bus.read16(INTRRX);
    }

    /// Undo `start`.
    pub fn stop(&mut self) {
        self.musb.board.disable();
        self.generic_disable();
        debug!("musb: disabled");

        if self.musb.config.mode == BoardMode::Otg {
            if let Some(otg) = self.musb.otg.get() {
                otg.teardown();
            }
        }

        if self.musb.config.mode.is_host_capable() {
            warn!("musb: stop, root hub still active");
        }
    }

    pub fn shutdown(&mut self) {
        self.musb.board.disable();
        self.generic_disable();
        self.state.otg_state = OtgState::Error;
    }

    /// Let the glue decide whether the chip may idle.
    pub fn try_idle(&self) {
        self.musb
            .board
            .try_idle(self.state.is_active, self.state.role == Role::Host);
    }

    pub fn cable_state(&self) -> CableState {
        let cable = match self.musb.board.vbus_status() {
            Some(true) => CableState::Connected,
            Some(false) => CableState::Disconnected,
            None => {
                let devctl = self.musb.regs.devctl();
                // VBUS above A-valid
                if devctl.read(DevCtl::VBUS) & 0b10 != 0 {
                    match self.musb.config.mode {
                        BoardMode::Host => CableState::A,
                        BoardMode::Peripheral => CableState::B,
                        BoardMode::Otg => {
                            if devctl.is_set(DevCtl::BDEVICE) {
                                CableState::MiniA
                            } else {
                                CableState::MiniB
                            }
                        }
                    }
                } else {
                    CableState::Disconnected
                }
            }
        };
        self.try_idle();
        cable
    }

    /// Queue the high speed test packet on endpoint 0.
    pub fn load_test_packet(&self) {
        self.musb.regs.select_endpoint(0);
        self.write_fifo(0, &TEST_PACKET);
        self.musb
            .regs
            .ep_write16(0, CSR0, value_of(Csr0::TXPKTRDY::SET));
    }

    /// A DMA channel finished on `ep`.
    pub fn dma_completion(&self, ep: u8, transmit: bool) {
        let handler = match self.musb.handler(self.state.role) {
            Some(handler) => handler,
            None => return,
        };
        if ep == 0 {
            handler.endpoint0_irq(self);
        } else if transmit {
            handler.endpoint_tx_irq(self, ep);
        } else {
            handler.endpoint_rx_irq(self, ep);
        }
    }

    /// Run the state machine on latched status.
    pub fn interrupt(&mut self, status: IrqStatus) -> Dispatch {
        let regs = &self.musb.regs;
        let snap = Snapshot {
            usb: LocalRegisterCopy::new(status.usb),
            tx: status.tx,
            rx: status.rx,
            devctl: regs.devctl(),
            power: regs.power(),
        };

        debug!(
            "musb: irq {} usb {:02x} tx {:04x} rx {:04x}",
            if snap.devctl.is_set(DevCtl::HM) { "host" } else { "peripheral" },
            status.usb,
            status.tx,
            status.rx
        );

        if self.state.otg_state == OtgState::Error {
            warn!("musb: irq in error");
            self.musb.board.disable();
            return Dispatch::Ignored;
        }

        let mut handled = Dispatch::Ignored;

        let stage0 = [
            IntrUsb::RESUME,
            IntrUsb::SESSREQ,
            IntrUsb::VBUSERROR,
            IntrUsb::CONNECT,
            IntrUsb::RESET,
        ]
        .iter()
        .any(|f| snap.usb.is_set(*f));
        if stage0 {
            handled |= self.stage0(&snap);
        } else {
            self.state.vbuserr_retry = VBUSERR_RETRY_COUNT;
        }

        handled |= self.stage1(&snap);

        if snap.usb.get() != 0 {
            handled |= self.stage2(&snap);
        }

        if handled == Dispatch::Ignored {
            debug!("musb: spurious interrupt, usb {:02x}", status.usb);
        }
        handled
    }

    fn stage0(&mut self, snap: &Snapshot) -> Dispatch {
        let regs = &self.musb.regs;
        let mode = self.musb.config.mode;
        let mut handled = Dispatch::Ignored;

        if snap.usb.is_set(IntrUsb::RESUME) {
            handled = Dispatch::Handled;
            debug!("musb: resume");
            self.state.is_active = true;

            if snap.devctl.is_set(DevCtl::HM) {
                if mode.is_host_capable() {
                    self.state.role = Role::Host;
                    // The host stack ends resume signaling after 20 ms.
                    let mut power = snap.power;
                    power.modify(Power::SUSPENDM::CLEAR + Power::RESUME::SET);
                    regs.set_power(power);
                    self.state.otg_state = OtgState::AHost;
                }
            } else if mode.is_peripheral_capable() {
                self.state.role = Role::Peripheral;
                if let Some(p) = self.musb.peripheral.get() {
                    p.resume();
                }
            }
        }

        if mode.is_host_capable() {
            if snap.usb.is_set(IntrUsb::SESSREQ) {
                debug!("musb: session request ({})", self.state.otg_state);
                // VBUS must come up now: the rise and B-connect timeouts
                // already run in hardware.
                regs.set_devctl(value_of(DevCtl::SESSION::SET));
                self.state.ep0_stage = Ep0Stage::Start;
                self.state.otg_state = OtgState::AIdle;
                self.state.role = Role::Host;
                handled = Dispatch::Handled;
                self.otg_inputs(OtgInputs::session_request());
            }

            if snap.usb.is_set(IntrUsb::VBUSERROR) {
                handled = Dispatch::Handled;
                debug!("musb: vbus error, devctl {:02x}", snap.devctl.get());

                // Only back-to-back VBUS errors use up the retries.
                if snap.usb.get() & !value_of(IntrUsb::VBUSERROR::SET) != 0 {
                    self.state.vbuserr_retry = VBUSERR_RETRY_COUNT;
                }
                self.state.otg_state = OtgState::AIdle;
                if self.state.vbuserr_retry > 0 {
                    self.state.vbuserr_retry -= 1;
                    regs.set_devctl(value_of(DevCtl::SESSION::SET));
                } else {
                    warn!("musb: vbus error, session stays off");
                }
            } else {
                self.state.vbuserr_retry = VBUSERR_RETRY_COUNT;
            }

            if snap.usb.is_set(IntrUsb::CONNECT) {
                handled = Dispatch::Handled;
                self.state.is_active = true;
                self.state.ep0_stage = Ep0Stage::Start;

                let port = &mut self.state.port_status;
                port.modify(
                    PortStatus::LOW_SPEED::CLEAR
                        + PortStatus::HIGH_SPEED::CLEAR
                        + PortStatus::ENABLE::CLEAR,
                );
                port.modify(PortStatus::CONNECTION::SET + PortStatus::C_CONNECTION::SET);
                // Only a guess until the port is reset.
                if snap.devctl.is_set(DevCtl::LSDEV) {
                    port.modify(PortStatus::LOW_SPEED::SET);
                }
                if let Some(h) = self.musb.host.get() {
                    h.root_port_status_changed();
                }

                self.state.role = Role::Host;
                self.state.otg_state = match self.state.otg_state {
                    OtgState::BWaitAcon => OtgState::BHost,
                    OtgState::AWaitBcon | OtgState::AWaitVrise => OtgState::AHost,
                    other => {
                        debug!("musb: connect in state {}", other);
                        OtgState::AHost
                    }
                };
                debug!("musb: connect (host state {})", self.state.otg_state);
                self.otg_inputs(OtgInputs::from_devctl(snap.devctl, false, true, false));
            }
        }

        // Reset and babble share a bit. As host it can only be babble.
        if snap.usb.is_set(IntrUsb::RESET) {
            handled = Dispatch::Handled;
            if snap.devctl.is_set(DevCtl::HM) {
                // Babbling devices also fault their endpoint I/O, and that
                // path recovers on its own.
                warn!("musb: babble");
            } else if mode.is_peripheral_capable() {
                debug!("musb: bus reset");
                self.state.role = Role::Peripheral;
                if let Some(p) = self.musb.peripheral.get() {
                    p.reset();
                }
                self.otg_inputs(OtgInputs::from_devctl(
                    snap.devctl,
                    true,
                    false,
                    snap.power.is_set(Power::SUSPENDM),
                ));
            }
        }

        handled
    }

    fn stage1(&mut self, snap: &Snapshot) -> Dispatch {
        let mut handled = Dispatch::Ignored;
        let handler = self.musb.handler(self.state.role);

        if snap.tx & 1 != 0 {
            handled = Dispatch::Handled;
            if let Some(handler) = handler {
                handler.endpoint0_irq(&*self);
            }
        }

        let mut bits = snap.rx >> 1;
        let mut ep = 1;
        while bits != 0 {
            if bits & 1 != 0 {
                handled = Dispatch::Handled;
                if let Some(handler) = handler {
                    handler.endpoint_rx_irq(&*self, ep);
                }
            }
            bits >>= 1;
            ep += 1;
        }

        let mut bits = snap.tx >> 1;
        let mut ep = 1;
        while bits != 0 {
            if bits & 1 != 0 {
                handled = Dispatch::Handled;
                if let Some(handler) = handler {
                    handler.endpoint_tx_irq(&*self, ep);
                }
            }
            bits >>= 1;
            ep += 1;
        }

        handled
    }

    fn stage2(&mut self, snap: &Snapshot) -> Dispatch {
        let mut handled = Dispatch::Ignored;

        if snap.usb.is_set(IntrUsb::DISCONNECT) && !self.state.ignore_disconnect {
            debug!(
                "musb: disconnect as {:?}, devctl {:02x}",
                self.state.role,
                snap.devctl.get()
            );
            handled = Dispatch::Handled;
            self.state.is_active = false;

            // DEVCTL already shows ID low here, trust the role instead.
            if let Some(handler) = self.musb.handler(self.state.role) {
                handler.disconnect();
            }
            self.otg_sample(false, false);
        }

        if snap.usb.is_set(IntrUsb::SUSPEND) {
            debug!("musb: suspend, devctl {:02x}", snap.devctl.get());
            handled = Dispatch::Handled;

            if !snap.devctl.is_set(DevCtl::HM) {
                // A suspended peripheral stays active while HNP may follow.
                let peripheral = self.musb.peripheral.get();
                if let Some(p) = peripheral {
                    p.suspend();
                }
                self.state.is_active = self.musb.config.mode == BoardMode::Otg
                    && peripheral.is_some_and(|p| p.hnp_enabled());
                self.otg_inputs(OtgInputs::from_devctl(snap.devctl, false, false, true));
            } else {
                self.state.is_active = false;
            }
        }

        handled
    }

    fn otg_inputs(&self, inputs: OtgInputs) {
        if self.musb.config.mode != BoardMode::Otg {
            return;
        }
        if let Some(otg) = self.musb.otg.get() {
            otg.inputs_changed(inputs);
        }
    }

    /// Report inputs from a fresh look at DEVCTL and POWER.
    fn otg_sample(&self, vbus_error: bool, connection: bool) {
        if self.musb.config.mode != BoardMode::Otg {
            return;
        }
        let regs = &self.musb.regs;
        let (devctl, power) = (regs.devctl(), regs.power());
        debug!(
            "musb: power {:02x}, devctl {:02x}{}{}",
            power.get(),
            devctl.get(),
            if connection { ", bcon" } else { "" },
            if vbus_error { ", vbus_error" } else { "" }
        );
        self.otg_inputs(OtgInputs::sample(devctl, power, vbus_error, connection));
    }
}

impl<B: Bus, F: FifoEngine<B>> EndpointIo for MusbGuard<'_, '_, B, F> {
    fn write_fifo(&self, ep: u8, data: &[u8]) {
        if let Some(hw_ep) = self.state.endpoints.get(ep) {
            debug_assert!(data.len() <= hw_ep.max_packet_tx as usize);
            self.musb.fifo.write_fifo(self.musb.regs.bus(), hw_ep, data);
        }
    }

    fn read_fifo(&self, ep: u8, buf: &mut [u8]) {
        if let Some(hw_ep) = self.state.endpoints.get(ep) {
            debug_assert!(buf.len() <= hw_ep.max_packet_rx as usize);
            self.musb.fifo.read_fifo(self.musb.regs.bus(), hw_ep, buf);
        }
    }

    fn rx_count(&self, ep: u8) -> u16 {
        let regs = &self.musb.regs;
        if ep == 0 {
            regs.ep_read8(0, COUNT0) as u16
        } else {
            regs.ep_read16(ep, RXCOUNT)
        }
    }

    fn tx_csr(&self, ep: u8) -> u16 {
        self.musb.regs.ep_read16(ep, TXCSR)
    }

    fn set_tx_csr(&self, ep: u8, csr: u16) {
        self.musb.regs.ep_write16(ep, TXCSR, csr);
    }

    fn rx_csr(&self, ep: u8) -> u16 {
        let reg = if ep == 0 { CSR0 } else { RXCSR };
        self.musb.regs.ep_read16(ep, reg)
    }

    fn set_rx_csr(&self, ep: u8, csr: u16) {
        let reg = if ep == 0 { CSR0 } else { RXCSR };
        self.musb.regs.ep_write16(ep, reg, csr);
    }

    fn endpoint(&self, ep: u8) -> Option<HwEndpoint> {
        self.state.endpoints.get(ep).copied()
    }
}

/// Register state captured once per interrupt delivery.
struct Snapshot {
    usb: LocalRegisterCopy<u8, IntrUsb::Register>,
    tx: u16,
    rx: u16,
    devctl: LocalRegisterCopy<u8, DevCtl::Register>,
    power: LocalRegisterCopy<u8, Power::Register>,
}
