// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Interfaces between the MUSB core and the code around it.
//!
//! Upper layers (the peripheral stack, the host stack, an OTG state
//! machine) implement the client traits and register with the
//! controller. Chip and board glue implements [`Board`]. Every callback
//! runs with the controller lock held and must not call back into the
//! public [`Musb`](crate::Musb) API.

use crate::endpoint::HwEndpoint;
use crate::errorcode::ErrorCode;
use crate::otg::OtgInputs;

/// Endpoint access for endpoint interrupt handlers.
///
/// Endpoint 0 has a single control/status register, CSR0. Both the tx and
/// rx accessors reach it when `ep` is 0.
pub trait EndpointIo {
    /// Load `data` into the transmit FIFO of `ep`.
    fn write_fifo(&self, ep: u8, data: &[u8]);

    /// Unload `buf.len()` bytes from the receive FIFO of `ep`.
    fn read_fifo(&self, ep: u8, buf: &mut [u8]);

    /// Bytes of the packet waiting in the receive FIFO of `ep`.
    fn rx_count(&self, ep: u8) -> u16;

    fn tx_csr(&self, ep: u8) -> u16;
    fn set_tx_csr(&self, ep: u8, csr: u16);
    fn rx_csr(&self, ep: u8) -> u16;
    fn set_rx_csr(&self, ep: u8, csr: u16);

    fn endpoint(&self, ep: u8) -> Option<HwEndpoint>;
}

/// Peripheral ("gadget") side of the controller.
pub trait PeripheralClient {
    /// Bus reset: all endpoint state is gone.
    fn reset(&self);
    fn suspend(&self);
    fn resume(&self);
    fn disconnect(&self);
    fn endpoint0_irq(&self, io: &dyn EndpointIo);
    fn endpoint_rx_irq(&self, io: &dyn EndpointIo, ep: u8);
    fn endpoint_tx_irq(&self, io: &dyn EndpointIo, ep: u8);

    /// The host granted HNP, so a suspend may precede a role switch.
    fn hnp_enabled(&self) -> bool {
        false
    }
}

/// Host side of the controller, including the root hub.
pub trait HostClient {
    fn endpoint0_irq(&self, io: &dyn EndpointIo);
    fn endpoint_rx_irq(&self, io: &dyn EndpointIo, ep: u8);
    fn endpoint_tx_irq(&self, io: &dyn EndpointIo, ep: u8);
    /// The root port status word changed and should be polled.
    fn root_port_status_changed(&self);
    fn disconnect(&self);
}

/// External OTG state machine.
pub trait OtgClient {
    fn inputs_changed(&self, inputs: OtgInputs);

    /// The controller stopped; drop any negotiation state.
    fn teardown(&self) {}
}

/// Chip and board glue around the core.
pub trait Board {
    /// Chip bring-up, before the core touches its registers.
    fn init(&self) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// Undo `init`.
    fn exit(&self) {}

    /// Unmask interrupts outside the core.
    fn enable(&self);

    /// Mask interrupts outside the core.
    fn disable(&self);

    fn request_irq(&self) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn free_irq(&self) {}

    /// Gate the controller's functional clock.
    fn set_clock(&self, _on: bool) {}

    /// Called after every burst of register activity. `is_active` is the
    /// link activity flag, `host_active` whether the host role drives the
    /// port.
    fn try_idle(&self, _is_active: bool, _host_active: bool) {}

    /// VBUS level, when the glue can sense it independently of DEVCTL.
    fn vbus_status(&self) -> Option<bool> {
        None
    }
}

/// Board controlled power to the controller.
pub trait BoardPower {
    fn set_power(&self, on: bool) -> Result<(), ErrorCode>;
}
