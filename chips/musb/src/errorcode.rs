// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Error codes returned by controller operations.

/// Errors reported by the MUSB core and its platform glue.
///
/// Link faults (VBUS errors, babble) and spurious interrupts are not
/// errors: the state machine absorbs them and only logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// Generic failure, e.g. the board power switch did not respond
    FAIL,
    /// A resource the controller needs (IRQ line, register window) is
    /// already claimed
    BUSY,
    /// FIFO RAM or endpoints exhausted while laying out endpoints
    NOMEM,
    /// The requested role or FIFO strategy is not supported by this build
    /// or this silicon
    NOSUPPORT,
    /// The controller was not found behind its bus
    NODEVICE,
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ErrorCode::FAIL => "FAIL",
            ErrorCode::BUSY => "BUSY",
            ErrorCode::NOMEM => "NOMEM",
            ErrorCode::NOSUPPORT => "NOSUPPORT",
            ErrorCode::NODEVICE => "NODEVICE",
        };
        f.write_str(s)
    }
}
