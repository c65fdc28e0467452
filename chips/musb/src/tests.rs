// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Controller level tests: lifecycle, interrupt staging and queries,
//! driven through [`FakeBus`] with recording upper layers.

use std::cell::{Cell, RefCell};
use std::format;
use std::vec::Vec;

use crate::config::{BoardMode, Config, FifoSizing};
use crate::errorcode::ErrorCode;
use crate::fake::FakeBus;
use crate::fifo::PioFifo;
use crate::hil::{Board, EndpointIo, HostClient, OtgClient, PeripheralClient};
use crate::musb::{CableState, Dispatch, Ep0Stage, IrqStatus, Musb, Role, TEST_PACKET};
use crate::otg::{OtgInputs, OtgState};
use crate::registers::{
    value_of, ConfigData, DevCtl, IntrUsb, Power, CONFIGDATA, COUNT0, CSR0, DEVCTL, INTRRXE,
    INTRTXE, INTRUSB, INTRUSBE, POWER, RXCOUNT, RXCSR, TXCSR,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    BoardInit,
    BoardExit,
    Enable,
    Disable,
    RequestIrq,
    FreeIrq,
    Clock(bool),
    Idle { active: bool, host: bool },
    GadgetReset,
    GadgetSuspend,
    GadgetResume,
    GadgetDisconnect,
    GadgetEp0,
    GadgetRx(u8),
    GadgetTx(u8),
    HcdEp0,
    HcdRx(u8),
    HcdTx(u8),
    HcdPortChanged,
    HcdDisconnect,
    Otg(OtgInputs),
    OtgTeardown,
}

#[derive(Default)]
struct Events(RefCell<Vec<Event>>);

impl Events {
    fn push(&self, e: Event) {
        self.0.borrow_mut().push(e);
    }

    fn take(&self) -> Vec<Event> {
        self.0.take()
    }
}

struct FakeBoard<'a> {
    events: &'a Events,
    init_result: Cell<Result<(), ErrorCode>>,
    irq_result: Cell<Result<(), ErrorCode>>,
    vbus: Cell<Option<bool>>,
}

impl<'a> FakeBoard<'a> {
    fn new(events: &'a Events) -> Self {
        Self {
            events,
            init_result: Cell::new(Ok(())),
            irq_result: Cell::new(Ok(())),
            vbus: Cell::new(None),
        }
    }
}

impl Board for FakeBoard<'_> {
    fn init(&self) -> Result<(), ErrorCode> {
        self.events.push(Event::BoardInit);
        self.init_result.get()
    }
    fn exit(&self) {
        self.events.push(Event::BoardExit);
    }
    fn enable(&self) {
        self.events.push(Event::Enable);
    }
    fn disable(&self) {
        self.events.push(Event::Disable);
    }
    fn request_irq(&self) -> Result<(), ErrorCode> {
        self.events.push(Event::RequestIrq);
        self.irq_result.get()
    }
    fn free_irq(&self) {
        self.events.push(Event::FreeIrq);
    }
    fn set_clock(&self, on: bool) {
        self.events.push(Event::Clock(on));
    }
    fn try_idle(&self, is_active: bool, host_active: bool) {
        self.events.push(Event::Idle {
            active: is_active,
            host: host_active,
        });
    }
    fn vbus_status(&self) -> Option<bool> {
        self.vbus.get()
    }
}

struct Gadget<'a> {
    events: &'a Events,
    hnp: Cell<bool>,
}

impl PeripheralClient for Gadget<'_> {
    fn reset(&self) {
        self.events.push(Event::GadgetReset);
    }
    fn suspend(&self) {
        self.events.push(Event::GadgetSuspend);
    }
    fn resume(&self) {
        self.events.push(Event::GadgetResume);
    }
    fn disconnect(&self) {
        self.events.push(Event::GadgetDisconnect);
    }
    fn endpoint0_irq(&self, _io: &dyn EndpointIo) {
        self.events.push(Event::GadgetEp0);
    }
    fn endpoint_rx_irq(&self, _io: &dyn EndpointIo, ep: u8) {
        self.events.push(Event::GadgetRx(ep));
    }
    fn endpoint_tx_irq(&self, _io: &dyn EndpointIo, ep: u8) {
        self.events.push(Event::GadgetTx(ep));
    }
    fn hnp_enabled(&self) -> bool {
        self.hnp.get()
    }
}

struct Hcd<'a> {
    events: &'a Events,
}

impl HostClient for Hcd<'_> {
    fn endpoint0_irq(&self, _io: &dyn EndpointIo) {
        self.events.push(Event::HcdEp0);
    }
    fn endpoint_rx_irq(&self, _io: &dyn EndpointIo, ep: u8) {
        self.events.push(Event::HcdRx(ep));
    }
    fn endpoint_tx_irq(&self, _io: &dyn EndpointIo, ep: u8) {
        self.events.push(Event::HcdTx(ep));
    }
    fn root_port_status_changed(&self) {
        self.events.push(Event::HcdPortChanged);
    }
    fn disconnect(&self) {
        self.events.push(Event::HcdDisconnect);
    }
}

struct Otg<'a> {
    events: &'a Events,
}

impl OtgClient for Otg<'_> {
    fn inputs_changed(&self, inputs: OtgInputs) {
        self.events.push(Event::Otg(inputs));
    }
    fn teardown(&self) {
        self.events.push(Event::OtgTeardown);
    }
}

fn dynfifo(bus: &FakeBus) {
    bus.set_ep8(0, CONFIGDATA, value_of(ConfigData::DYNFIFO::SET));
}

fn usb(status: u8) -> IrqStatus {
    IrqStatus {
        usb: status,
        ..IrqStatus::default()
    }
}

/// Build a controller with every upper layer bound, run `init` and hand
/// the pieces to `f` with the event log and write log cleared.
fn with_controller<F>(mode: BoardMode, f: F)
where
    F: FnOnce(&Musb<&FakeBus, PioFifo>, &FakeBus, &Events, &FakeBoard, &Gadget),
{
    let events = Events::default();
    let bus = FakeBus::new();
    dynfifo(&bus);
    let board = FakeBoard::new(&events);
    let gadget = Gadget {
        events: &events,
        hnp: Cell::new(false),
    };
    let hcd = Hcd { events: &events };
    let otg = Otg { events: &events };

    let musb = Musb::new(&bus, PioFifo, Config::new(mode), &board);
    musb.set_peripheral_client(&gadget);
    musb.set_host_client(&hcd);
    musb.set_otg_client(&otg);
    assert_eq!(musb.init(), Ok(()));

    events.take();
    bus.clear_writes();
    f(&musb, &bus, &events, &board, &gadget);
}

#[test]
fn init_sets_initial_role() {
    let events = Events::default();
    let bus = FakeBus::new();
    dynfifo(&bus);
    let board = FakeBoard::new(&events);

    let musb = Musb::new(&bus, PioFifo, Config::new(BoardMode::Host), &board);
    assert_eq!(musb.init(), Ok(()));
    assert_eq!(
        events.take(),
        [Event::BoardInit, Event::Disable, Event::RequestIrq]
    );
    assert_eq!(musb.lock().role(), Role::Host);
    assert_eq!(musb.otg_state(), OtgState::AIdle);
    assert_eq!(musb.bulk_endpoint(), Some(1));
    assert!(musb.endpoint(1).is_some());

    let musb = Musb::new(&bus, PioFifo, Config::new(BoardMode::Otg), &board);
    assert_eq!(musb.init(), Ok(()));
    assert_eq!(musb.lock().role(), Role::Peripheral);
    assert_eq!(musb.otg_state(), OtgState::BIdle);
}

#[test]
fn init_rejects_role_not_built() {
    let events = Events::default();
    let bus = FakeBus::new();
    dynfifo(&bus);
    let board = FakeBoard::new(&events);

    let mut config = Config::new(BoardMode::Otg);
    config.host_support = false;
    let musb = Musb::new(&bus, PioFifo, config, &board);
    assert_eq!(musb.init(), Err(ErrorCode::NOSUPPORT));
    assert!(events.take().is_empty());
}

#[test]
fn init_rejects_fifo_sizing_mismatch() {
    let events = Events::default();
    let bus = FakeBus::new();
    let board = FakeBoard::new(&events);

    // Silicon with static FIFOs, software built for dynamic ones.
    let musb = Musb::new(&bus, PioFifo, Config::new(BoardMode::Host), &board);
    assert_eq!(musb.init(), Err(ErrorCode::NOSUPPORT));
    assert_eq!(
        events.take(),
        [Event::BoardInit, Event::Disable, Event::BoardExit]
    );

    dynfifo(&bus);
    let mut config = Config::new(BoardMode::Host);
    config.fifo = FifoSizing::Static;
    let musb = Musb::new(&bus, PioFifo, config, &board);
    assert_eq!(musb.init(), Err(ErrorCode::NOSUPPORT));
}

#[test]
fn init_failures_release_the_board() {
    let events = Events::default();
    let bus = FakeBus::new();
    dynfifo(&bus);
    let board = FakeBoard::new(&events);
    let musb = Musb::new(&bus, PioFifo, Config::new(BoardMode::Peripheral), &board);

    board.irq_result.set(Err(ErrorCode::FAIL));
    assert_eq!(musb.init(), Err(ErrorCode::BUSY));
    assert_eq!(
        events.take(),
        [
            Event::BoardInit,
            Event::Disable,
            Event::RequestIrq,
            Event::BoardExit
        ]
    );

    board.init_result.set(Err(ErrorCode::NODEVICE));
    assert_eq!(musb.init(), Err(ErrorCode::NODEVICE));
    assert_eq!(events.take(), [Event::BoardInit]);
}

#[test]
fn start_requests_session_only_for_host_roles() {
    with_controller(BoardMode::Otg, |musb, bus, events, _, _| {
        musb.start();
        let mask = musb.lock().endpoints().mask() as u32;
        assert_eq!(bus.writes_to(INTRTXE), [mask]);
        assert_eq!(bus.writes_to(INTRRXE), [mask & 0xfffe]);
        assert_eq!(bus.writes_to(INTRUSBE), [0xf7]);
        assert_eq!(
            bus.writes_to(POWER),
            [value_of(Power::SOFTCONN::SET + Power::HSENAB::SET) as u32]
        );
        assert_eq!(bus.writes_to(DEVCTL), [1]);
        assert_eq!(events.take(), [Event::Enable]);
    });

    with_controller(BoardMode::Peripheral, |musb, bus, _, _, _| {
        bus.set8(DEVCTL, 0x81);
        musb.start();
        assert_eq!(bus.writes_to(DEVCTL), [0x80]);
    });
}

#[test]
fn stop_drains_latched_status() {
    with_controller(BoardMode::Otg, |musb, bus, events, _, _| {
        musb.start();
        events.take();
        bus.set8(INTRUSB, value_of(IntrUsb::CONNECT::SET));

        musb.stop();
        assert_eq!(bus.get8(INTRUSB), 0);
        assert_eq!(bus.writes_to(INTRUSBE).last(), Some(&0));
        assert_eq!(bus.writes_to(INTRTXE).last(), Some(&0));
        assert_eq!(bus.writes_to(INTRRXE).last(), Some(&0));
        assert_eq!(events.take(), [Event::Disable, Event::OtgTeardown]);

        // Nothing pending once stopped.
        assert_eq!(musb.handle_interrupt(), Dispatch::Ignored);
    });
}

#[test]
fn shutdown_ignores_later_interrupts() {
    with_controller(BoardMode::Host, |musb, _, events, _, _| {
        musb.shutdown();
        assert_eq!(musb.otg_state(), OtgState::Error);
        events.take();

        let status = IrqStatus {
            usb: value_of(IntrUsb::CONNECT::SET),
            tx: 1,
            rx: 0,
        };
        assert_eq!(musb.lock().interrupt(status), Dispatch::Ignored);
        assert_eq!(events.take(), [Event::Disable]);
    });
}

#[test]
fn remove_releases_in_reverse() {
    with_controller(BoardMode::Host, |musb, _, events, _, _| {
        musb.remove();
        assert_eq!(
            events.take(),
            [Event::Disable, Event::FreeIrq, Event::BoardExit]
        );
    });
}

#[test]
fn handle_interrupt_reads_and_clears_status() {
    with_controller(BoardMode::Host, |musb, bus, events, _, _| {
        bus.set8(INTRUSB, value_of(IntrUsb::CONNECT::SET));
        assert_eq!(musb.handle_interrupt(), Dispatch::Handled);
        assert_eq!(bus.get8(INTRUSB), 0);
        assert_eq!(events.take(), [Event::HcdPortChanged]);

        assert_eq!(musb.handle_interrupt(), Dispatch::Ignored);
    });
}

#[test]
fn vbus_error_retries_are_limited() {
    with_controller(BoardMode::Host, |musb, bus, _, _, _| {
        let vbus_error = usb(value_of(IntrUsb::VBUSERROR::SET));

        assert_eq!(musb.lock().interrupt(vbus_error), Dispatch::Handled);
        assert_eq!(musb.lock().interrupt(vbus_error), Dispatch::Handled);
        assert_eq!(bus.writes_to(DEVCTL), [1, 1]);
        assert_eq!(musb.lock().vbus_error_retries(), 0);

        // Out of retries, the session stays off.
        assert_eq!(musb.lock().interrupt(vbus_error), Dispatch::Handled);
        assert_eq!(bus.writes_to(DEVCTL), [1, 1]);
        assert_eq!(musb.otg_state(), OtgState::AIdle);

        // A delivery without session events restores the budget.
        musb.lock().interrupt(usb(value_of(IntrUsb::SOF::SET)));
        assert_eq!(musb.lock().vbus_error_retries(), 2);

        // So the next error restarts the session again.
        assert_eq!(musb.lock().interrupt(vbus_error), Dispatch::Handled);
        assert_eq!(bus.writes_to(DEVCTL), [1, 1, 1]);
        assert_eq!(musb.lock().vbus_error_retries(), 1);
    });
}

#[test]
fn vbus_error_with_other_events_is_not_consecutive() {
    with_controller(BoardMode::Host, |musb, bus, _, _, _| {
        let vbus_error = usb(value_of(IntrUsb::VBUSERROR::SET));
        musb.lock().interrupt(vbus_error);
        musb.lock().interrupt(vbus_error);
        assert_eq!(musb.lock().vbus_error_retries(), 0);
        bus.clear_writes();

        let mixed = usb(value_of(IntrUsb::VBUSERROR::SET + IntrUsb::CONNECT::SET));
        musb.lock().interrupt(mixed);
        assert_eq!(musb.lock().vbus_error_retries(), 1);
        assert_eq!(bus.writes_to(DEVCTL), [1]);
        // Connect is still evaluated in the same delivery.
        assert!(musb.is_active());
        assert_eq!(musb.otg_state(), OtgState::AHost);
    });
}

#[test]
fn connect_runs_before_endpoint_zero() {
    with_controller(BoardMode::Otg, |musb, bus, events, _, _| {
        bus.set8(
            DEVCTL,
            value_of(DevCtl::SESSION::SET + DevCtl::HM::SET + DevCtl::LSDEV::SET),
        );
        musb.lock().set_otg_state(OtgState::AWaitBcon);
        musb.lock().set_ep0_stage(Ep0Stage::StatusIn);

        let status = IrqStatus {
            usb: value_of(IntrUsb::CONNECT::SET),
            tx: 1,
            rx: 0,
        };
        assert_eq!(musb.lock().interrupt(status), Dispatch::Handled);

        let devctl = tock_registers::LocalRegisterCopy::new(bus.get8(DEVCTL));
        assert_eq!(
            events.take(),
            [
                Event::HcdPortChanged,
                Event::Otg(OtgInputs::from_devctl(devctl, false, true, false)),
                Event::HcdEp0,
            ]
        );
        let guard = musb.lock();
        assert_eq!(guard.role(), Role::Host);
        assert_eq!(guard.otg_state(), OtgState::AHost);
        assert_eq!(guard.ep0_stage(), Ep0Stage::Start);
        // CONNECTION, C_CONNECTION, LOW_SPEED
        assert_eq!(guard.port_status(), 0x0001_0201);
    });
}

#[test]
fn connect_while_waiting_for_a_device() {
    with_controller(BoardMode::Otg, |musb, _, _, _, _| {
        musb.lock().set_otg_state(OtgState::BWaitAcon);
        musb.lock().interrupt(usb(value_of(IntrUsb::CONNECT::SET)));
        assert_eq!(musb.otg_state(), OtgState::BHost);
        assert_eq!(musb.port_status(), 0x0001_0001);
    });
}

#[test]
fn bus_reset_selects_peripheral_side() {
    with_controller(BoardMode::Otg, |musb, bus, events, _, _| {
        bus.set8(POWER, value_of(Power::SUSPENDM::SET));
        musb.lock().interrupt(usb(value_of(IntrUsb::RESET::SET)));
        assert_eq!(musb.lock().role(), Role::Peripheral);

        let devctl = tock_registers::LocalRegisterCopy::new(bus.get8(DEVCTL));
        assert_eq!(
            events.take(),
            [
                Event::GadgetReset,
                Event::Otg(OtgInputs::from_devctl(devctl, true, false, true)),
            ]
        );

        let status = IrqStatus {
            usb: 0,
            tx: 0b0101,
            rx: 0b1010,
        };
        assert_eq!(musb.lock().interrupt(status), Dispatch::Handled);
        assert_eq!(
            events.take(),
            [
                Event::GadgetEp0,
                Event::GadgetRx(1),
                Event::GadgetRx(3),
                Event::GadgetTx(2),
            ]
        );
    });
}

#[test]
fn babble_is_only_logged() {
    with_controller(BoardMode::Host, |musb, bus, events, _, _| {
        bus.set8(DEVCTL, value_of(DevCtl::HM::SET + DevCtl::SESSION::SET));
        let handled = musb.lock().interrupt(usb(value_of(IntrUsb::RESET::SET)));
        assert_eq!(handled, Dispatch::Handled);
        assert!(events.take().is_empty());
        assert_eq!(musb.lock().role(), Role::Host);
        assert!(bus.writes_to(DEVCTL).is_empty());
    });
}

#[test]
fn disconnect_can_be_suppressed() {
    with_controller(BoardMode::Host, |musb, _, events, _, _| {
        musb.lock().set_active(true);
        musb.lock().set_ignore_disconnect(true);
        let disconnect = usb(value_of(IntrUsb::DISCONNECT::SET));

        assert_eq!(musb.lock().interrupt(disconnect), Dispatch::Ignored);
        assert!(events.take().is_empty());
        assert!(musb.is_active());

        musb.lock().set_ignore_disconnect(false);
        assert_eq!(musb.lock().interrupt(disconnect), Dispatch::Handled);
        assert_eq!(events.take(), [Event::HcdDisconnect]);
        assert!(!musb.is_active());
    });
}

#[test]
fn disconnect_follows_endpoint_traffic() {
    with_controller(BoardMode::Peripheral, |musb, _, events, _, _| {
        let status = IrqStatus {
            usb: value_of(IntrUsb::DISCONNECT::SET),
            tx: 0b10,
            rx: 0,
        };
        musb.lock().interrupt(status);
        assert_eq!(
            events.take(),
            [Event::GadgetTx(1), Event::GadgetDisconnect]
        );
    });
}

#[test]
fn suspend_keeps_hnp_capable_peripheral_active() {
    with_controller(BoardMode::Otg, |musb, _, events, _, gadget| {
        gadget.hnp.set(true);
        musb.lock().set_active(true);
        musb.lock().interrupt(usb(value_of(IntrUsb::SUSPEND::SET)));
        assert!(musb.is_active());
        assert_eq!(events.take()[0], Event::GadgetSuspend);

        gadget.hnp.set(false);
        musb.lock().interrupt(usb(value_of(IntrUsb::SUSPEND::SET)));
        assert!(!musb.is_active());
    });

    with_controller(BoardMode::Host, |musb, bus, events, _, _| {
        bus.set8(DEVCTL, value_of(DevCtl::HM::SET));
        musb.lock().set_active(true);
        musb.lock().interrupt(usb(value_of(IntrUsb::SUSPEND::SET)));
        assert!(!musb.is_active());
        assert!(events.take().is_empty());
    });
}

#[test]
fn otg_sees_disconnect_and_suspend() {
    with_controller(BoardMode::Otg, |musb, bus, events, _, _| {
        bus.set8(DEVCTL, value_of(DevCtl::SESSION::SET + DevCtl::BDEVICE::SET));
        bus.set8(POWER, value_of(Power::SUSPENDM::SET));
        musb.lock().set_active(true);

        musb.lock().interrupt(usb(value_of(IntrUsb::DISCONNECT::SET)));
        assert_eq!(
            events.take(),
            [
                Event::GadgetDisconnect,
                Event::Otg(OtgInputs {
                    session: true,
                    connector_id_b: true,
                    reset: false,
                    suspend: true,
                    connection: false,
                    vbus_error: false,
                }),
            ]
        );

        // Suspend is reported from the interrupt, not from POWER.
        bus.set8(POWER, 0);
        musb.lock().interrupt(usb(value_of(IntrUsb::SUSPEND::SET)));
        assert_eq!(
            events.take(),
            [
                Event::GadgetSuspend,
                Event::Otg(OtgInputs {
                    session: true,
                    connector_id_b: true,
                    reset: false,
                    suspend: true,
                    connection: false,
                    vbus_error: false,
                }),
            ]
        );
    });

    // Only OTG boards have a negotiation layer to feed.
    with_controller(BoardMode::Peripheral, |musb, _, events, _, _| {
        musb.lock().interrupt(usb(value_of(
            IntrUsb::DISCONNECT::SET + IntrUsb::SUSPEND::SET,
        )));
        assert_eq!(
            events.take(),
            [Event::GadgetDisconnect, Event::GadgetSuspend]
        );
    });
}

#[test]
fn host_resume_drives_resume_signaling() {
    with_controller(BoardMode::Host, |musb, bus, _, _, _| {
        bus.set8(DEVCTL, value_of(DevCtl::HM::SET + DevCtl::SESSION::SET));
        bus.set8(POWER, value_of(Power::HSENAB::SET + Power::SUSPENDM::SET));

        musb.lock().interrupt(usb(value_of(IntrUsb::RESUME::SET)));
        assert_eq!(
            bus.writes_to(POWER),
            [value_of(Power::HSENAB::SET + Power::RESUME::SET) as u32]
        );
        assert_eq!(musb.otg_state(), OtgState::AHost);
        assert!(musb.is_active());
    });
}

#[test]
fn peripheral_resume_notifies_gadget() {
    with_controller(BoardMode::Peripheral, |musb, bus, events, _, _| {
        musb.lock().interrupt(usb(value_of(IntrUsb::RESUME::SET)));
        assert_eq!(events.take(), [Event::GadgetResume]);
        assert!(bus.writes_to(POWER).is_empty());
        assert!(musb.is_active());
    });
}

#[test]
fn session_request_powers_vbus() {
    with_controller(BoardMode::Otg, |musb, bus, events, _, _| {
        musb.lock().set_ep0_stage(Ep0Stage::TxData);
        musb.lock().interrupt(usb(value_of(IntrUsb::SESSREQ::SET)));

        assert_eq!(bus.writes_to(DEVCTL), [1]);
        assert_eq!(events.take(), [Event::Otg(OtgInputs::session_request())]);
        let guard = musb.lock();
        assert_eq!(guard.role(), Role::Host);
        assert_eq!(guard.otg_state(), OtgState::AIdle);
        assert_eq!(guard.ep0_stage(), Ep0Stage::Start);
    });
}

#[test]
fn peripheral_board_ignores_host_events() {
    with_controller(BoardMode::Peripheral, |musb, bus, events, _, _| {
        let status = usb(value_of(IntrUsb::SESSREQ::SET + IntrUsb::CONNECT::SET));
        assert_eq!(musb.lock().interrupt(status), Dispatch::Ignored);
        assert!(bus.writes_to(DEVCTL).is_empty());
        assert!(events.take().is_empty());
        assert_eq!(musb.lock().role(), Role::Peripheral);
    });
}

#[test]
fn dma_completion_routes_by_role() {
    with_controller(BoardMode::Otg, |musb, _, events, _, _| {
        {
            let guard = musb.lock();
            guard.dma_completion(0, true);
            guard.dma_completion(2, true);
            guard.dma_completion(3, false);
        }
        assert_eq!(
            events.take(),
            [Event::GadgetEp0, Event::GadgetTx(2), Event::GadgetRx(3)]
        );

        musb.lock().interrupt(usb(value_of(IntrUsb::CONNECT::SET)));
        events.take();
        musb.lock().dma_completion(1, false);
        assert_eq!(events.take(), [Event::HcdRx(1)]);
    });
}

#[test]
fn cable_state_reports() {
    with_controller(BoardMode::Host, |musb, bus, events, board, _| {
        board.vbus.set(Some(true));
        assert_eq!(musb.cable_state(), CableState::Connected);
        assert_eq!(
            events.take(),
            [Event::Idle {
                active: false,
                host: true
            }]
        );
        board.vbus.set(Some(false));
        assert_eq!(musb.cable_state(), CableState::Disconnected);

        board.vbus.set(None);
        bus.set8(DEVCTL, value_of(DevCtl::VBUS::AboveVbusValid));
        assert_eq!(format!("{}", musb.cable_state()), "A");
        bus.set8(DEVCTL, 0);
        assert_eq!(format!("{}", musb.cable_state()), "disconnected");
    });

    with_controller(BoardMode::Otg, |musb, bus, _, _, _| {
        bus.set8(
            DEVCTL,
            value_of(DevCtl::VBUS::AboveVbusValid + DevCtl::BDEVICE::SET),
        );
        assert_eq!(format!("{}", musb.cable_state()), "Mini-A");
        bus.set8(DEVCTL, value_of(DevCtl::VBUS::AboveVbusValid));
        assert_eq!(format!("{}", musb.cable_state()), "Mini-B");
    });

    with_controller(BoardMode::Peripheral, |musb, bus, _, _, _| {
        bus.set8(DEVCTL, value_of(DevCtl::VBUS::AboveVbusValid));
        assert_eq!(musb.cable_state(), CableState::B);
    });
}

#[test]
fn test_packet_goes_to_endpoint_zero() {
    with_controller(BoardMode::Peripheral, |musb, bus, _, _, _| {
        musb.lock().load_test_packet();
        assert_eq!(bus.fifo(0), TEST_PACKET);
        assert_eq!(bus.ep16(0, CSR0), 0x0002);
    });
}

#[test]
fn endpoint_io_moves_packets() {
    with_controller(BoardMode::Peripheral, |musb, bus, _, _, _| {
        let guard = musb.lock();
        guard.write_fifo(1, &[1, 2, 3, 4, 5]);
        assert_eq!(bus.fifo(1), [1, 2, 3, 4, 5]);

        let mut buf = [0u8; 5];
        guard.read_fifo(1, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert!(bus.fifo(1).is_empty());

        let ep = guard.endpoint(1).map(|ep| ep.fifo);
        assert_eq!(ep, Some(0x24));
    });
}

#[test]
fn endpoint_io_reaches_counts_and_csrs() {
    with_controller(BoardMode::Peripheral, |musb, bus, _, _, _| {
        bus.set_ep8(0, COUNT0, 8);
        bus.set_ep8(1, RXCOUNT, 5);
        bus.set_ep8(1, RXCSR, 0x01);

        let guard = musb.lock();
        assert_eq!(guard.rx_count(0), 8);
        assert_eq!(guard.rx_count(1), 5);
        assert_eq!(guard.rx_csr(1), 0x01);

        // RXPKTRDY cleared once the packet is unloaded.
        guard.set_rx_csr(1, 0);
        assert_eq!(bus.ep16(1, RXCSR), 0);

        guard.set_tx_csr(2, 0x0001);
        assert_eq!(bus.ep16(2, TXCSR), 0x0001);
        assert_eq!(guard.tx_csr(2), 0x0001);

        // Both directions share CSR0 on endpoint 0.
        guard.set_rx_csr(0, 0x0040);
        assert_eq!(bus.ep16(0, CSR0), 0x0040);
        assert_eq!(guard.tx_csr(0), 0x0040);
    });
}

#[test]
fn configure_is_repeatable() {
    with_controller(BoardMode::Otg, |musb, _, _, _, _| {
        let mut guard = musb.lock();
        let before = guard.endpoints().clone();
        assert_eq!(guard.configure(), Ok(()));
        assert_eq!(guard.endpoints(), &before);
    });
}

#[test]
fn suspend_and_resume_gate_the_clock() {
    with_controller(BoardMode::Peripheral, |musb, _, events, _, _| {
        musb.suspend();
        musb.resume();
        assert_eq!(events.take(), [Event::Clock(false), Event::Clock(true)]);
    });
}

#[test]
fn dispatch_combines() {
    assert_eq!(Dispatch::Ignored | Dispatch::Ignored, Dispatch::Ignored);
    assert_eq!(Dispatch::Ignored | Dispatch::Handled, Dispatch::Handled);
    let mut d = Dispatch::Handled;
    d |= Dispatch::Ignored;
    assert_eq!(d, Dispatch::Handled);
}
