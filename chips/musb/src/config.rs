// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Board-level configuration of a controller instance.
//!
//! Boards describe their controller with a `const` [`Config`]. All code
//! paths stay type checked whichever roles a board enables, and the
//! compiler folds away the disabled ones.

use crate::endpoint::FifoMode;
use crate::registers::EndpointMapping;

/// Role the board wires the port for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardMode {
    Host,
    Peripheral,
    Otg,
}

impl BoardMode {
    pub fn is_host_capable(self) -> bool {
        matches!(self, BoardMode::Host | BoardMode::Otg)
    }

    pub fn is_peripheral_capable(self) -> bool {
        matches!(self, BoardMode::Peripheral | BoardMode::Otg)
    }
}

/// How endpoint FIFOs get their sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FifoSizing {
    /// The core was synthesized with dynamic FIFO sizing. `ram_bits` is the
    /// FIFO RAM address width, giving `1 << (ram_bits + 2)` bytes.
    Dynamic { mode: FifoMode, ram_bits: u8 },
    /// FIFO sizes are hard-wired in silicon and read back from FIFOSIZE.
    Static,
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Role the board supports.
    pub mode: BoardMode,
    /// Whether host side support (root hub, host endpoint handlers) is
    /// built for this board.
    pub host_support: bool,
    /// Whether peripheral side support is built for this board.
    pub peripheral_support: bool,
    pub fifo: FifoSizing,
    /// Number of endpoints the silicon implements, endpoint 0 included.
    pub num_endpoints: u8,
    /// The core supports multiple devices behind a hub.
    pub multipoint: bool,
    pub mapping: EndpointMapping,
}

impl Config {
    /// Settings for the common 16 endpoint, 16 KiB FIFO synthesis.
    pub const fn new(mode: BoardMode) -> Self {
        Self {
            mode,
            host_support: true,
            peripheral_support: true,
            fifo: FifoSizing::Dynamic {
                mode: FifoMode::Mode2,
                ram_bits: 12,
            },
            num_endpoints: 16,
            multipoint: true,
            mapping: EndpointMapping::Indexed,
        }
    }

    /// The board mode only names roles that were built in.
    pub fn mode_supported(&self) -> bool {
        match self.mode {
            BoardMode::Host => self.host_support,
            BoardMode::Peripheral => self.peripheral_support,
            BoardMode::Otg => self.host_support && self.peripheral_support,
        }
    }
}
