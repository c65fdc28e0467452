// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Driver core for the Mentor Graphics Inventra MUSB dual-role USB
//! controller (MUSBHDRC).
//!
//! The core owns endpoint and FIFO configuration, the interrupt-driven
//! link state machine and the FIFO data path. Everything chip or board
//! specific is reached through the traits in [`hil`] and the [`bus::Bus`]
//! register accessor, so the same core drives directly mapped silicon and
//! bus-bridged parts such as the TUSB6010.

#![crate_name = "musb"]
#![crate_type = "rlib"]
#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod config;
pub mod endpoint;
pub mod errorcode;
pub mod fifo;
pub mod hil;
pub mod musb;
pub mod otg;
pub mod registers;

#[cfg(test)]
mod fake;
#[cfg(test)]
mod tests;

pub use crate::errorcode::ErrorCode;
pub use crate::musb::{Musb, MusbGuard};
