// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! TUSB6010 bridge register file.
//!
//! Offsets are relative to the bridge control window. All registers are
//! 32 bits wide and must be accessed as such.

use tock_registers::register_bitfields;

const SYS_REG_BASE: usize = 0x400;

pub const VLYNQ_CTRL: usize = 0x004;

pub const DEV_CONF: usize = SYS_REG_BASE;
pub const PHY_OTG_CTRL_ENABLE: usize = SYS_REG_BASE + 0x004;
pub const PHY_OTG_CTRL: usize = SYS_REG_BASE + 0x008;
pub const DEV_OTG_STAT: usize = SYS_REG_BASE + 0x00c;
pub const DEV_OTG_TIMER: usize = SYS_REG_BASE + 0x010;
pub const PRCM_REV: usize = SYS_REG_BASE + 0x014;
pub const PRCM_CONF: usize = SYS_REG_BASE + 0x018;
pub const PRCM_MNGMT: usize = SYS_REG_BASE + 0x01c;
pub const PRCM_WAKEUP_SOURCE: usize = SYS_REG_BASE + 0x020;
pub const PRCM_WAKEUP_MASK: usize = SYS_REG_BASE + 0x024;
pub const PRCM_WAKEUP_CLEAR: usize = SYS_REG_BASE + 0x028;
pub const PULLUP_1_CTRL: usize = SYS_REG_BASE + 0x02c;
pub const PULLUP_2_CTRL: usize = SYS_REG_BASE + 0x030;
pub const INT_CTRL_REV: usize = SYS_REG_BASE + 0x034;
pub const INT_CTRL_CONF: usize = SYS_REG_BASE + 0x038;
pub const USBIP_INT_SRC: usize = SYS_REG_BASE + 0x03c;
pub const USBIP_INT_CLEAR: usize = SYS_REG_BASE + 0x044;
pub const USBIP_INT_MASK: usize = SYS_REG_BASE + 0x048;
pub const DMA_INT_SRC: usize = SYS_REG_BASE + 0x04c;
pub const DMA_INT_CLEAR: usize = SYS_REG_BASE + 0x054;
pub const DMA_INT_MASK: usize = SYS_REG_BASE + 0x058;
pub const GPIO_INT_SRC: usize = SYS_REG_BASE + 0x05c;
pub const GPIO_INT_CLEAR: usize = SYS_REG_BASE + 0x064;
pub const GPIO_INT_MASK: usize = SYS_REG_BASE + 0x068;
pub const INT_SRC: usize = SYS_REG_BASE + 0x070;
pub const INT_SRC_CLEAR: usize = SYS_REG_BASE + 0x078;
pub const INT_MASK: usize = SYS_REG_BASE + 0x07c;
pub const INT_MASK_SET: usize = SYS_REG_BASE + 0x080;
pub const INT_MASK_CLEAR: usize = SYS_REG_BASE + 0x084;
pub const GPIO_REV: usize = SYS_REG_BASE + 0x088;
pub const GPIO_CONF: usize = SYS_REG_BASE + 0x08c;
pub const DMA_CTRL_REV: usize = SYS_REG_BASE + 0x100;
pub const DMA_REQ_CONF: usize = SYS_REG_BASE + 0x104;
pub const EP0_CONF: usize = SYS_REG_BASE + 0x108;
/// Transmit transfer size of endpoints 1..15, one word each.
pub const EP_IN_SIZE: usize = SYS_REG_BASE + 0x10c;
pub const DMA_EP_MAP: usize = SYS_REG_BASE + 0x148;
/// Receive transfer size of endpoints 1..15, one word each.
pub const EP_OUT_SIZE: usize = SYS_REG_BASE + 0x14c;
pub const EP_MAX_PACKET_SIZE: usize = SYS_REG_BASE + 0x188;
pub const SCRATCH_PAD: usize = SYS_REG_BASE + 0x1c4;
pub const WAIT_COUNT: usize = SYS_REG_BASE + 0x1c8;
pub const PROD_TEST_RESET: usize = SYS_REG_BASE + 0x1d8;

/// PROD_TEST_RESET reads this on a live chip.
pub const PROD_TEST_RESET_VAL: u32 = 0xa596;

/// INT_SRC bits that read as garbage.
pub const INT_SRC_RESERVED_BITS: u32 = (0x1f << 26) | (0x3f << 18) | (0x03 << 10);
/// INT_MASK / INT_SRC_CLEAR bits that must be written as zero.
pub const INT_MASK_RESERVED_BITS: u32 = (0x3fff << 17) | (0x7 << 13) | (0x7f << 8);

/// Start of the core's FIFO window as seen through the DMA ports.
pub const DMA_FIFO_WINDOW: usize = 0x400;

/// Transfer size register of endpoint `ep`, transmit side. Endpoint 0 has
/// a single register for both directions.
pub const fn ep_conf(ep: u8) -> usize {
    if ep == 0 {
        EP0_CONF
    } else {
        EP_IN_SIZE + (((ep as usize - 1) & 0xf) << 2)
    }
}

/// Distance from an endpoint's transmit size register to its receive one.
pub const EP_RX_OFFSET: usize = EP_OUT_SIZE - EP_IN_SIZE;

register_bitfields![u32,
    pub OtgStat [
        PWR_CLK_GOOD OFFSET(8) NUMBITS(1) [],
        SESS_END OFFSET(7) NUMBITS(1) [],
        SESS_VALID OFFSET(6) NUMBITS(1) [],
        VBUS_VALID OFFSET(5) NUMBITS(1) [],
        VBUS_SENSE OFFSET(4) NUMBITS(1) [],
        ID_STATUS OFFSET(3) NUMBITS(1) [],
        HOST_DISCON OFFSET(2) NUMBITS(1) [],
        LINE_STATE OFFSET(0) NUMBITS(2) []
    ],
    pub OtgTimer [
        ENABLE OFFSET(31) NUMBITS(1) [],
        VAL OFFSET(0) NUMBITS(27) []
    ],
    pub PrcmConf [
        SFW_CPEN OFFSET(24) NUMBITS(1) [],
        SYS_CLKSEL OFFSET(16) NUMBITS(2) []
    ],
    pub PrcmMngmt [
        SRP_FIX_TIMER OFFSET(25) NUMBITS(4) [],
        SRP_FIX_EN OFFSET(24) NUMBITS(1) [],
        VBUS_VALID_TIMER OFFSET(20) NUMBITS(4) [],
        VBUS_VALID_FLT_EN OFFSET(19) NUMBITS(1) [],
        DFT_CLK_DIS OFFSET(18) NUMBITS(1) [],
        VLYNQ_CLK_DIS OFFSET(17) NUMBITS(1) [],
        OTG_SESS_END_EN OFFSET(10) NUMBITS(1) [],
        OTG_VBUS_DET_EN OFFSET(9) NUMBITS(1) [],
        OTG_ID_PULLUP OFFSET(8) NUMBITS(1) [],
        SW_EN_15 OFFSET(4) NUMBITS(1) [],
        SW_EN_33 OFFSET(3) NUMBITS(1) [],
        CPEN_5V OFFSET(2) NUMBITS(1) [],
        PM_IDLE OFFSET(1) NUMBITS(1) [],
        DEV_IDLE OFFSET(0) NUMBITS(1) []
    ],
    /// PRCM_WAKEUP_SOURCE, _MASK and _CLEAR
    pub Wakeup [
        WNORCS OFFSET(7) NUMBITS(1) [],
        WBUS OFFSET(6) NUMBITS(1) [],
        WLD OFFSET(5) NUMBITS(1) [],
        WVBUS OFFSET(4) NUMBITS(1) [],
        WHOSTDISCON OFFSET(3) NUMBITS(1) [],
        WID OFFSET(2) NUMBITS(1) []
    ],
    pub IntSrc [
        TXRX_DMA_DONE OFFSET(24) NUMBITS(1) [],
        USB_IP_CORE OFFSET(17) NUMBITS(1) [],
        OTG_TIMEOUT OFFSET(16) NUMBITS(1) [],
        VBUS_SENSE_CHNG OFFSET(15) NUMBITS(1) [],
        ID_STATUS_CHNG OFFSET(14) NUMBITS(1) [],
        DEV_WAKEUP OFFSET(13) NUMBITS(1) [],
        DEV_READY OFFSET(12) NUMBITS(1) [],
        USB_IP_TX OFFSET(9) NUMBITS(1) [],
        USB_IP_RX OFFSET(8) NUMBITS(1) [],
        /// Mirror of the core's INTRUSB
        USB_IP OFFSET(0) NUMBITS(8) []
    ],
    pub IntCtrlConf [
        INT_RELCYC OFFSET(18) NUMBITS(3) [],
        INT_POLARITY OFFSET(17) NUMBITS(1) [],
        INT_MODE OFFSET(16) NUMBITS(1) []
    ],
    pub GpioConf [
        DMAREQ OFFSET(24) NUMBITS(6) []
    ],
    pub DmaReqConf [
        BURST_SIZE OFFSET(26) NUMBITS(2) [],
        DMA_REQ_EN OFFSET(20) NUMBITS(6) [],
        DMA_REQ_ASSER OFFSET(0) NUMBITS(4) []
    ],
    pub Ep0Conf [
        DIR_TX OFFSET(7) NUMBITS(1) [],
        XFR_SIZE OFFSET(0) NUMBITS(7) []
    ],
    pub EpConf [
        XFR_SIZE OFFSET(0) NUMBITS(31) []
    ],
    /// Layout of every *_REV register
    pub Revision [
        MAJOR OFFSET(4) NUMBITS(4) [],
        MINOR OFFSET(0) NUMBITS(4) []
    ]
];

/// INTRUSB SOF bit as mirrored in INT_SRC and INT_MASK.
pub const INT_SRC_USB_IP_SOF: u32 = 1 << 3;
