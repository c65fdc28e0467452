// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! OTG link states and the inputs fed to an external OTG state machine.
//!
//! The core does not run the OTG negotiation itself. It tracks the
//! transceiver state it is directly responsible for and reports signal
//! changes to an [`OtgClient`](crate::hil::OtgClient).

use core::fmt;

use tock_registers::LocalRegisterCopy;

use crate::registers::{DevCtl, Power};

/// Transceiver state, named after the OTG supplement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtgState {
    AIdle,
    AWaitVrise,
    AWaitBcon,
    AHost,
    ASuspend,
    BIdle,
    BPeripheral,
    BHost,
    BWaitAcon,
    /// The controller was shut down and ignores interrupts.
    Error,
}

impl fmt::Display for OtgState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OtgState::AIdle => "a_idle",
            OtgState::AWaitVrise => "a_wait_vrise",
            OtgState::AWaitBcon => "a_wait_bcon",
            OtgState::AHost => "a_host",
            OtgState::ASuspend => "a_suspend",
            OtgState::BIdle => "b_idle",
            OtgState::BPeripheral => "b_peripheral",
            OtgState::BHost => "b_host",
            OtgState::BWaitAcon => "b_wait_acon",
            OtgState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Signal levels an OTG state machine consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OtgInputs {
    /// Session valid (DEVCTL.SESSION)
    pub session: bool,
    /// Connector ID reads B-device (DEVCTL.BDEVICE)
    pub connector_id_b: bool,
    pub reset: bool,
    pub suspend: bool,
    pub connection: bool,
    pub vbus_error: bool,
}

impl OtgInputs {
    /// Inputs when the caller already knows reset, connection and suspend.
    /// POWER is not consulted: its suspend state is unreliable during an
    /// interrupt.
    pub fn from_devctl(
        devctl: LocalRegisterCopy<u8, DevCtl::Register>,
        reset: bool,
        connection: bool,
        suspend: bool,
    ) -> Self {
        Self {
            session: devctl.is_set(DevCtl::SESSION),
            connector_id_b: devctl.is_set(DevCtl::BDEVICE),
            reset,
            suspend,
            connection,
            vbus_error: false,
        }
    }

    /// Inputs from freshly read DEVCTL and POWER, plus the connect and
    /// VBUS error events the caller observed.
    pub fn sample(
        devctl: LocalRegisterCopy<u8, DevCtl::Register>,
        power: LocalRegisterCopy<u8, Power::Register>,
        vbus_error: bool,
        connection: bool,
    ) -> Self {
        Self {
            session: devctl.is_set(DevCtl::SESSION),
            connector_id_b: devctl.is_set(DevCtl::BDEVICE),
            reset: power.is_set(Power::RESET),
            suspend: power.is_set(Power::SUSPENDM),
            connection,
            vbus_error,
        }
    }

    /// A session request: only the session input is raised.
    pub fn session_request() -> Self {
        Self {
            session: true,
            ..Self::default()
        }
    }
}
