// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Glue for the TI TUSB6010, a MUSB core behind a NOR flash style bus
//! interface.
//!
//! The bridge provides the board hooks for the `musb` core, a FIFO engine
//! that only issues 32-bit cycles, its own interrupt demultiplexer and an
//! idle timer that parks the chip in its low power state whenever the link
//! allows it.

#![crate_name = "tusb6010"]
#![crate_type = "rlib"]
#![cfg_attr(not(test), no_std)]

pub mod fifo;
pub mod registers;
pub mod time;
pub mod tusb6010;

#[cfg(test)]
mod fake;

pub use crate::fifo::BridgeFifo;
pub use crate::tusb6010::{Tusb6010, TusbMusb};
