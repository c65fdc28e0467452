// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Interface to the one-shot timer that drives bridge idling.

use musb::ErrorCode;

/// Trait to represent clock frequency in Hz
pub trait Frequency {
    /// Returns frequency in Hz.
    fn frequency() -> u32;
}

/// 1KHz `Frequency`
#[derive(Debug)]
pub struct Freq1KHz;
impl Frequency for Freq1KHz {
    fn frequency() -> u32 {
        1000
    }
}

pub trait Time {
    type Frequency: Frequency;

    /// Returns the current time in hardware clock units.
    fn now(&self) -> u32;

    /// Converts milliseconds to clock tics, rounding up.
    fn ms_to_tics(&self, ms: u32) -> u32 {
        let hz = Self::Frequency::frequency() as u64;
        ((ms as u64 * hz).div_ceil(1000)) as u32
    }
}

/// The `Timer` trait models a timer that can notify when a particular interval
/// has elapsed.
pub trait Timer<'a>: Time {
    /// Set the client for interrupt events.
    fn set_client(&self, client: &'a dyn TimerClient);

    /// Sets a one-shot timer to fire in `interval` clock-tics.
    ///
    /// Calling this method will override any pending oneshot.
    fn oneshot(&self, interval: u32);

    /// Cancels an outstanding timer.
    ///
    /// The implementation will _always_ cancel the timer, however, it may be
    /// possible for a timer to have already expired but not delivered to the
    /// client. In this case, the implementation must return `FAIL` letting
    /// the caller know that an event for the timer will still be delivered.
    fn cancel(&self) -> Result<(), ErrorCode>;
}

/// A client of an implementer of the [`Timer`](trait.Timer.html) trait.
pub trait TimerClient {
    /// Callback signaled when the timer's clock reaches the specified interval.
    fn fired(&self);
}
