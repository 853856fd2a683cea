//! The USB controller's register file as a typed window over its MMIO
//! aperture. The RP2040 maps every peripheral three extra times for atomic
//! bit operations; `set`/`clear` write masks through those alias windows, so
//! the driver never does a read-modify-write a hardware update could race.

use bitflags::bitflags;

pub const USBCTRL_REGS_BASE: usize = 0x5011_0000;
pub const USBCTRL_DPRAM_BASE: usize = 0x5010_0000;
pub const RESETS_BASE: usize = 0x4000_c000;

/// The controller's interrupt line number in the NVIC.
pub const USBCTRL_IRQ: u16 = 5;

const SET_ALIAS: usize = 0x2000;
const CLEAR_ALIAS: usize = 0x3000;

#[derive(Clone, Copy)]
#[repr(u32)]
pub enum Register {
    AddrEndp = 0x00,
    MainCtrl = 0x40,
    SieCtrl = 0x4c,
    SieStatus = 0x50,
    BuffStatus = 0x58,
    EpStallArm = 0x68,
    UsbMuxing = 0x74,
    UsbPwr = 0x78,
    IntRaw = 0x8c,
    InterruptEnable = 0x90,
    InterruptStatus = 0x98,
}

#[derive(Clone, Copy)]
pub struct Registers {
    base: usize,
}

impl Registers {
    /// # Safety
    /// `base` must be the controller's register aperture (or a test double
    /// covering the same extent, alias windows included), with nothing else
    /// driving it.
    pub const unsafe fn new(base: usize) -> Registers {
        Registers { base }
    }

    pub fn read(&self, register: Register) -> u32 {
        unsafe { ((self.base + register as usize) as *const u32).read_volatile() }
    }

    pub fn write(&self, register: Register, value: u32) {
        unsafe { ((self.base + register as usize) as *mut u32).write_volatile(value) }
    }

    /// Sets the bits in `mask` through the atomic set alias.
    pub fn set(&self, register: Register, mask: u32) {
        unsafe { ((self.base + SET_ALIAS + register as usize) as *mut u32).write_volatile(mask) }
    }

    /// Clears the bits in `mask` through the atomic clear alias.
    pub fn clear(&self, register: Register, mask: u32) {
        unsafe { ((self.base + CLEAR_ALIAS + register as usize) as *mut u32).write_volatile(mask) }
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct MainCtrl: u32 {
        const CONTROLLER_EN = 1 << 0;
        /// Set selects host mode; leaving it clear makes the controller a
        /// device.
        const HOST_NDEVICE = 1 << 1;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct SieCtrl: u32 {
        const PULLUP_EN = 1 << 16;
        /// Interrupt on every EP0 buffer rather than every second one.
        const EP0_INT_1BUF = 1 << 29;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct SieStatus: u32 {
        const SETUP_REC = 1 << 17;
        const BUS_RESET = 1 << 19;
    }
}

bitflags! {
    /// Layout shared by the raw/enable/force/status interrupt registers.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Ints: u32 {
        const BUFF_STATUS = 1 << 4;
        const BUS_RESET = 1 << 12;
        const SETUP_REQ = 1 << 16;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct UsbMuxing: u32 {
        const TO_PHY = 1 << 0;
        const SOFTCON = 1 << 3;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct UsbPwr: u32 {
        const VBUS_DETECT = 1 << 2;
        const VBUS_DETECT_OVERRIDE_EN = 1 << 3;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct EpStallArm: u32 {
        const EP0_IN = 1 << 0;
        const EP0_OUT = 1 << 1;
    }
}

bitflags! {
    /// Lines in the subsystem reset controller this firmware touches.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ResetLines: u32 {
        const IO_BANK0 = 1 << 5;
        const PADS_BANK0 = 1 << 8;
        const PLL_SYS = 1 << 12;
        const PLL_USB = 1 << 13;
        const UART0 = 1 << 22;
        const USBCTRL = 1 << 24;
    }
}

/// The subsystem reset controller. Peripherals come out of power-on held in
/// reset and must be released, and the release acknowledged, before their
/// registers decode.
#[derive(Clone, Copy)]
pub struct Resets {
    base: usize,
}

impl Resets {
    const RESET: usize = 0x0;
    const RESET_DONE: usize = 0x8;

    /// # Safety
    /// `base` must be the reset controller's aperture, alias windows
    /// included.
    pub const unsafe fn new(base: usize) -> Resets {
        Resets { base }
    }

    /// Puts the given lines into reset, releases them, and waits for the
    /// hardware to report them back.
    pub fn cycle(&self, lines: ResetLines) {
        unsafe {
            ((self.base + SET_ALIAS + Self::RESET) as *mut u32).write_volatile(lines.bits());
        }
        self.release(lines);
    }

    /// Releases lines from reset without asserting them first.
    pub fn release(&self, lines: ResetLines) {
        unsafe {
            ((self.base + CLEAR_ALIAS + Self::RESET) as *mut u32).write_volatile(lines.bits());
        }
        loop {
            let done = unsafe { ((self.base + Self::RESET_DONE) as *const u32).read_volatile() };
            if done & lines.bits() == lines.bits() {
                break;
            }
        }
    }
}
