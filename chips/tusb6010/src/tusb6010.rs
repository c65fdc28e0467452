// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! TUSB6010 board glue: bring-up, interrupt demultiplexing and idling.
//!
//! The chip drops into a low power state whenever the link allows it and
//! is woken again by link events or by any access on its CPU bus. Every
//! path that touches the chip therefore ends in `try_idle`, which rearms
//! the idle timer.
//!
//! Usage
//! -----
//!
//! ```rust,ignore
//! let tusb = static_init!(
//!     Tusb6010<'static, MmioBus, VirtualTimer<'static>>,
//!     Tusb6010::new(ctrl_bus, &idle_timer)
//! );
//! idle_timer.set_client(tusb);
//! tusb.set_power_control(&board_power);
//! let musb = static_init!(
//!     TusbMusb<'static, MmioBus>,
//!     Musb::new(core_bus, BridgeFifo::new(ctrl_bus, dma_ports), config, tusb)
//! );
//! tusb.set_controller(musb);
//! musb.init()?;
//! ```

use core::cell::Cell;

use log::{debug, error, info, trace, warn};
use tock_registers::fields::FieldValue;
use tock_registers::{LocalRegisterCopy, RegisterLongName};

use musb::bus::Bus;
use musb::config::BoardMode;
use musb::hil::{Board, BoardPower};
use musb::musb::{Dispatch, IrqStatus};
use musb::otg::OtgState;
use musb::{ErrorCode, Musb, MusbGuard};

use crate::fifo::BridgeFifo;
use crate::registers::*;
use crate::time::{Time, Timer, TimerClient};

/// A MUSB core whose FIFOs sit behind the bridge.
pub type TusbMusb<'a, B> = Musb<'a, B, BridgeFifo<B>>;

/// Idle delay while a peripheral may still be pulling up D+ after SE0,
/// so that its full speed J does not count as a wake-up.
const IDLE_DELAY_MS: u32 = 3;

/// Attempts at reading back the scratch pad after a wake-up.
const WAKEUP_PROBES: u32 = 1000;
const WAKEUP_PROBE_START: u32 = 0xf7f7f7;

/// Lowest interrupt controller revision that works.
const MIN_INT_CTRL_MAJOR: u32 = 2;

fn value<R: RegisterLongName>(fv: FieldValue<u32, R>) -> u32 {
    musb::registers::value_of(fv)
}

pub struct Tusb6010<'a, B: Bus, T: Timer<'a>> {
    ctrl: B,
    timer: &'a T,
    power: Cell<Option<&'a dyn BoardPower>>,
    controller: Cell<Option<&'a TusbMusb<'a, B>>>,
    default_a: Cell<bool>,
}

impl<'a, B: Bus, T: Timer<'a>> Tusb6010<'a, B, T> {
    pub const fn new(ctrl: B, timer: &'a T) -> Self {
        Self {
            ctrl,
            timer,
            power: Cell::new(None),
            controller: Cell::new(None),
            default_a: Cell::new(false),
        }
    }

    pub fn set_power_control(&self, power: &'a dyn BoardPower) {
        self.power.set(Some(power));
    }

    pub fn set_controller(&self, controller: &'a TusbMusb<'a, B>) {
        self.controller.set(Some(controller));
    }

    fn read(&self, offset: usize) -> u32 {
        self.ctrl.read32(offset)
    }

    fn write(&self, offset: usize, val: u32) {
        self.ctrl.write32(offset, val)
    }

    fn prcm_mngmt(&self) -> LocalRegisterCopy<u32, PrcmMngmt::Register> {
        LocalRegisterCopy::new(self.read(PRCM_MNGMT))
    }

    fn otg_stat(&self) -> LocalRegisterCopy<u32, OtgStat::Register> {
        LocalRegisterCopy::new(self.read(DEV_OTG_STAT))
    }

    fn revision(&self, offset: usize) -> (u32, u32) {
        let rev = LocalRegisterCopy::<u32, Revision::Register>::new(self.read(offset));
        (rev.read(Revision::MAJOR), rev.read(Revision::MINOR))
    }

    fn set_board_power(&self, on: bool) -> Result<(), ErrorCode> {
        match self.power.get() {
            Some(power) => power.set_power(on),
            None => Err(ErrorCode::FAIL),
        }
    }

    /// Clock switch to run while the chip idles. Mode 0 is the idle clock,
    /// mode 1 the PHY's free running 60 MHz.
    fn set_clock_source(&self, mode: u32) {
        let mut conf = LocalRegisterCopy::<u32, PrcmConf::Register>::new(self.read(PRCM_CONF));
        conf.modify(PrcmConf::SYS_CLKSEL.val(mode & 0x3));
        self.write(PRCM_CONF, conf.get());
    }

    /// Power the chip, check it is there and set up clocks and the CPU
    /// interface.
    fn start(&self) -> Result<(), ErrorCode> {
        if let Err(e) = self.set_board_power(true) {
            error!("tusb: cannot enable TUSB6010: {}", e);
            let _ = self.set_board_power(false);
            return Err(ErrorCode::NODEVICE);
        }
        self.bring_up().inspect_err(|_| {
            let _ = self.set_board_power(false);
        })
    }

    fn bring_up(&self) -> Result<(), ErrorCode> {
        if self.read(PROD_TEST_RESET) != PROD_TEST_RESET_VAL {
            error!("tusb: unable to detect TUSB6010");
            return Err(ErrorCode::NODEVICE);
        }

        let (prcm, prcm_minor) = self.revision(PRCM_REV);
        let (int, int_minor) = self.revision(INT_CTRL_REV);
        let (gpio, gpio_minor) = self.revision(GPIO_REV);
        let (dma, dma_minor) = self.revision(DMA_CTRL_REV);
        info!(
            "tusb: revisions: prcm{}.{} int{}.{} gpio{}.{} dma{}.{}",
            prcm, prcm_minor, int, int_minor, gpio, gpio_minor, dma, dma_minor
        );
        if int < MIN_INT_CTRL_MAJOR {
            error!("tusb: unsupported TUSB6010 revision {}", int);
            return Err(ErrorCode::NODEVICE);
        }

        // USB non-PDR interrupt enable, required on the NOR interface.
        self.write(VLYNQ_CTRL, 8);

        self.write(
            PRCM_CONF,
            value(PrcmConf::SFW_CPEN::SET + PrcmConf::SYS_CLKSEL.val(1)),
        );

        self.write(
            PRCM_MNGMT,
            value(
                PrcmMngmt::VBUS_VALID_TIMER.val(0xa)
                    + PrcmMngmt::VBUS_VALID_FLT_EN::SET
                    + PrcmMngmt::DFT_CLK_DIS::SET
                    + PrcmMngmt::VLYNQ_CLK_DIS::SET
                    + PrcmMngmt::OTG_SESS_END_EN::SET
                    + PrcmMngmt::OTG_VBUS_DET_EN::SET
                    + PrcmMngmt::OTG_ID_PULLUP::SET,
            ),
        );

        self.setup_cpu_interface();
        Ok(())
    }

    fn setup_cpu_interface(&self) {
        // GPIO[7:0] drive DMA requests, no pullups there or on the NOR
        // interface.
        self.write(PULLUP_1_CTRL, 0x0000_00ff);
        self.write(PULLUP_2_CTRL, 0x01ff_ffff);

        self.write(GPIO_CONF, value(GpioConf::DMAREQ.val(0x3f)));

        // 16x16 bit bursts, all six requests, 2 clock de-assertion.
        self.write(
            DMA_REQ_CONF,
            value(
                DmaReqConf::BURST_SIZE.val(2)
                    + DmaReqConf::DMA_REQ_EN.val(0x3f)
                    + DmaReqConf::DMA_REQ_ASSER.val(2),
            ),
        );

        self.write(WAIT_COUNT, 1);
    }

    /// VBUS as the chip sees it. Detection is switched on for the read if
    /// idling turned it off.
    pub fn vbus_present(&self) -> bool {
        let mut otg_stat = self.otg_stat();
        let mngmt = self.prcm_mngmt();

        if !mngmt.is_set(PrcmMngmt::OTG_VBUS_DET_EN) {
            let mut enabled = mngmt;
            enabled.modify(PrcmMngmt::OTG_VBUS_DET_EN::SET);
            self.write(PRCM_MNGMT, enabled.get());
            otg_stat = self.otg_stat();
            self.write(PRCM_MNGMT, mngmt.get());
        }

        otg_stat.is_set(OtgStat::VBUS_SENSE)
    }

    /// Let the chip idle until one of `wakeups` or a bus access.
    fn allow_idle(&self, wakeups: u32) {
        self.set_clock_source(0);

        let wakeups = wakeups | value(Wakeup::WNORCS::SET);
        self.write(PRCM_WAKEUP_MASK, !wakeups);

        let mut mngmt = self.prcm_mngmt();
        mngmt.modify(
            PrcmMngmt::OTG_VBUS_DET_EN::CLEAR
                + PrcmMngmt::SW_EN_15::CLEAR
                + PrcmMngmt::SW_EN_33::CLEAR
                + PrcmMngmt::OTG_SESS_END_EN::SET
                + PrcmMngmt::PM_IDLE::SET
                + PrcmMngmt::DEV_IDLE::SET,
        );
        self.write(PRCM_MNGMT, mngmt.get());

        debug!("tusb: idle, wake on {:02x}", wakeups);
    }

    /// Wake-up events worth leaving idle for.
    fn wakeup_sources(musb: &MusbGuard<'_, 'a, B, BridgeFifo<B>>) -> u32 {
        let mode = musb.mode();
        if mode == BoardMode::Host {
            return value(Wakeup::WHOSTDISCON::SET + Wakeup::WBUS::SET);
        }
        if !musb.peripheral_bound() {
            return 0;
        }
        let mut wakeups = Wakeup::WHOSTDISCON::SET + Wakeup::WBUS::SET + Wakeup::WVBUS::SET;
        if mode == BoardMode::Otg {
            wakeups += Wakeup::WLD::SET;
        }
        value(wakeups)
    }

    /// Bridge interrupt handler.
    pub fn handle_interrupt(&self) -> Dispatch {
        let controller = match self.controller.get() {
            Some(controller) => controller,
            None => {
                warn!("tusb: interrupt before controller bound");
                return Dispatch::Ignored;
            }
        };
        let mut musb = controller.lock();

        let int_src = self.read(INT_SRC) & !INT_SRC_RESERVED_BITS;
        let src = LocalRegisterCopy::<u32, IntSrc::Register>::new(int_src);
        let dma_src = if src.is_set(IntSrc::TXRX_DMA_DONE) {
            self.read(DMA_INT_SRC)
        } else {
            0
        };
        trace!("tusb: interrupt dma {:08x} int {:08x}", dma_src, int_src);

        if src.is_set(IntSrc::DEV_WAKEUP) {
            self.wakeup(&mut musb);
        }

        if [
            IntSrc::VBUS_SENSE_CHNG,
            IntSrc::OTG_TIMEOUT,
            IntSrc::ID_STATUS_CHNG,
        ]
        .iter()
        .any(|f| src.is_set(*f))
        {
            self.otg_ints(&mut musb, src);
        }

        // Only transmit DMA completions are reported here.
        if src.is_set(IntSrc::TXRX_DMA_DONE) && dma_src != 0 {
            let real = !self.read(DMA_INT_MASK) & dma_src;
            let tx = real & 0xffff;
            for ep in 1..=15u8 {
                if tx & (1 << ep) != 0 {
                    debug!("tusb: completing ep{} tx", ep);
                    musb.dma_completion(ep, true);
                }
            }
            self.write(DMA_INT_CLEAR, dma_src);
        }

        let (rx, tx) = if src.is_set(IntSrc::USB_IP_TX) || src.is_set(IntSrc::USB_IP_RX) {
            let usbip = self.read(USBIP_INT_SRC);
            self.write(USBIP_INT_CLEAR, usbip);
            ((((usbip >> 16) & 0xffff) << 1) as u16, (usbip & 0xffff) as u16)
        } else {
            (0, 0)
        };

        let mut handled = if int_src != 0 {
            Dispatch::Handled
        } else {
            Dispatch::Ignored
        };
        if int_src & value(IntSrc::USB_IP_TX::SET + IntSrc::USB_IP_RX::SET + IntSrc::USB_IP.val(0xff))
            != 0
        {
            handled |= musb.interrupt(IrqStatus {
                usb: src.read(IntSrc::USB_IP) as u8,
                tx,
                rx,
            });
        }

        self.write(INT_SRC_CLEAR, int_src & !INT_MASK_RESERVED_BITS);

        musb.try_idle();
        handled
    }

    fn wakeup(&self, musb: &mut MusbGuard<'_, 'a, B, BridgeFifo<B>>) {
        // The NOR interface may need a while after the PLL relocks.
        let ready = (0..WAKEUP_PROBES).any(|n| {
            let probe = WAKEUP_PROBE_START - n;
            self.write(SCRATCH_PAD, 0);
            self.write(SCRATCH_PAD, probe);
            if self.read(SCRATCH_PAD) == probe {
                true
            } else {
                debug!("tusb: NOR not ready");
                false
            }
        });
        if !ready {
            warn!("tusb: NOR interface still not ready after wake-up");
        }

        self.set_clock_source(1);

        let source = self.read(PRCM_WAKEUP_SOURCE);
        self.write(PRCM_WAKEUP_CLEAR, source);
        if source & !value(Wakeup::WNORCS::SET) != 0 {
            musb.set_active(true);
        }
        debug!(
            "tusb: wake {}active {:02x}",
            if musb.is_active() { "" } else { "in" },
            source
        );
    }

    /// OTG events the core does not report itself.
    fn otg_ints(
        &self,
        musb: &mut MusbGuard<'_, 'a, B, BridgeFifo<B>>,
        src: LocalRegisterCopy<u32, IntSrc::Register>,
    ) {
        let otg_stat = self.otg_stat();
        let host_capable = musb.mode().is_host_capable();

        if src.is_set(IntSrc::ID_STATUS_CHNG) {
            let default_a = host_capable && otg_stat.is_set(OtgStat::ID_STATUS);
            if default_a != self.default_a.get() {
                self.default_a.set(default_a);
                musb.set_otg_state(if default_a {
                    OtgState::AIdle
                } else {
                    OtgState::BIdle
                });
                debug!("tusb: default-{}", if default_a { 'A' } else { 'B' });
                musb.set_active(true);
            }
        }

        // No VBUS is as good as a disconnect on the B side.
        if src.is_set(IntSrc::VBUS_SENSE_CHNG) && (!host_capable || !self.default_a.get()) {
            if otg_stat.is_set(OtgStat::VBUS_SENSE) {
                musb.set_otg_state(OtgState::BPeripheral);
                musb.set_active(true);
            } else {
                musb.set_otg_state(OtgState::BIdle);
                musb.set_active(false);
            }
            debug!("tusb: {}", musb.otg_state());
        }

        if src.is_set(IntSrc::OTG_TIMEOUT) {
            debug!("tusb: OTG timer expired");
            let mut timer = LocalRegisterCopy::<u32, OtgTimer::Register>::new(
                self.read(DEV_OTG_TIMER),
            );
            timer.modify(OtgTimer::ENABLE::SET);
            self.write(DEV_OTG_TIMER, timer.get());
        }
    }
}

impl<'a, B: Bus, T: Timer<'a>> Board for Tusb6010<'a, B, T> {
    fn init(&self) -> Result<(), ErrorCode> {
        self.start().inspect_err(|e| error!("tusb: could not start TUSB6010: {}", e))
    }

    fn exit(&self) {
        let _ = self.set_board_power(false);
    }

    fn enable(&self) {
        // Everything but SOF.
        self.write(INT_MASK, INT_SRC_USB_IP_SOF);

        self.write(USBIP_INT_MASK, 0);
        self.write(DMA_INT_MASK, 0x7fff_ffff);
        self.write(GPIO_INT_MASK, 0x1ff);

        self.write(USBIP_INT_CLEAR, 0x7fff_ffff);
        self.write(DMA_INT_CLEAR, 0x7fff_ffff);
        self.write(GPIO_INT_CLEAR, 0x1ff);

        self.write(INT_SRC_CLEAR, !INT_MASK_RESERVED_BITS);

        // Zero cycle de-assertion, active low.
        self.write(INT_CTRL_CONF, value(IntCtrlConf::INT_RELCYC.val(0)));
    }

    fn disable(&self) {
        debug!("tusb: disable");
    }

    fn try_idle(&self, is_active: bool, host_active: bool) {
        if is_active {
            let _ = self.timer.cancel();
        } else {
            let delay = if host_active { 0 } else { IDLE_DELAY_MS };
            self.timer.oneshot(self.timer.ms_to_tics(delay));
        }
    }

    fn vbus_status(&self) -> Option<bool> {
        Some(self.vbus_present())
    }
}

impl<'a, B: Bus, T: Timer<'a>> TimerClient for Tusb6010<'a, B, T> {
    fn fired(&self) {
        let controller = match self.controller.get() {
            Some(controller) => controller,
            None => return,
        };
        let musb = controller.lock();
        if !musb.is_active() {
            self.allow_idle(Self::wakeup_sources(&musb));
        }
    }
}
