//! The flashable firmware image: board bring-up (clocks, UART logging, the
//! LED), the USB interrupt plumbing, and the main loop that pumps the data
//! bridge. Everything board-specific lives here; the logic is all in the
//! library, where the host can build and test it.

#![no_std]
#![no_main]

use core::fmt;
use core::fmt::Write;
use cortex_m::peripheral::NVIC;
use cortex_m_rt::{entry, exception};
use log::{info, Level, LevelFilter, Metadata, Record};
use picomodem::{
    bridge::{self, Loopback},
    control,
    device::UsbDevice,
    reg::{ResetLines, Resets, RESETS_BASE, USBCTRL_IRQ},
};
use sync::{IrqLock, StateHolder};

/// The second-stage bootloader the mask ROM runs out of the first flash
/// sector. This one drives the W25Q-series flash found on the Pico and the
/// W5500-EVB-Pico.
#[link_section = ".boot2"]
#[no_mangle]
#[used]
pub static BOOT2_FIRMWARE: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

const XOSC_BASE: usize = 0x4002_4000;
const PLL_SYS_BASE: usize = 0x4002_8000;
const PLL_USB_BASE: usize = 0x4002_c000;
const CLOCKS_BASE: usize = 0x4000_8000;
const IO_BANK0_BASE: usize = 0x4001_4000;
const UART0_BASE: usize = 0x4003_4000;
const SIO_BASE: usize = 0xd000_0000;

const LED_PIN: u32 = 25;

fn write_reg(base: usize, offset: usize, value: u32) {
    unsafe { ((base + offset) as *mut u32).write_volatile(value) }
}

fn read_reg(base: usize, offset: usize) -> u32 {
    unsafe { ((base + offset) as *const u32).read_volatile() }
}

/// Takes the chip from the ROM-default ring oscillator to crystal-derived
/// clocks: 125MHz for the system and peripherals, 48MHz for the USB
/// controller.
fn init_clocks(resets: &Resets) {
    // Start the crystal oscillator (enable magic in the top field, the
    // 1-15MHz range code in the low) and wait for it to stabilise.
    write_reg(XOSC_BASE, 0x00, (0xfab << 12) | 0xaa0);
    while read_reg(XOSC_BASE, 0x04) & (1 << 31) == 0 {}

    // Move the reference clock onto it through the glitchless mux.
    write_reg(CLOCKS_BASE, 0x30, 0x2);
    while read_reg(CLOCKS_BASE, 0x38) != 1 << 2 {}

    // System PLL: 12MHz reference up to a 1500MHz VCO, divided by 6 and 2.
    resets.release(ResetLines::PLL_SYS);
    init_pll(PLL_SYS_BASE, 125, 6, 2);
    // clk_sys onto the PLL: aux source first, then the glitchless switch.
    write_reg(CLOCKS_BASE, 0x3c, 0 << 5);
    write_reg(CLOCKS_BASE, 0x3c, (0 << 5) | 1);
    while read_reg(CLOCKS_BASE, 0x44) != 1 << 1 {}

    // The peripheral clock runs straight off clk_sys, for the UART.
    write_reg(CLOCKS_BASE, 0x48, (1 << 11) | (0 << 5));

    // USB PLL: 1200MHz VCO divided by 5 twice gives the 48MHz the
    // controller requires.
    resets.release(ResetLines::PLL_USB);
    init_pll(PLL_USB_BASE, 100, 5, 5);
    write_reg(CLOCKS_BASE, 0x54, (1 << 11) | (0 << 5));
}

fn init_pll(base: usize, fbdiv: u32, postdiv1: u32, postdiv2: u32) {
    write_reg(base, 0x00, 1); // REFDIV = 1
    write_reg(base, 0x08, fbdiv);
    // Power up the VCO, post-dividers still down, and wait for lock.
    write_reg(base, 0x04, (1 << 3) | (1 << 2));
    while read_reg(base, 0x00) & (1 << 31) == 0 {}
    write_reg(base, 0x0c, (postdiv1 << 16) | (postdiv2 << 12));
    write_reg(base, 0x04, 1 << 2);
}

/// UART0 TX/RX on GPIO 0/1, the LED on its SIO pin.
fn init_pins() {
    write_reg(IO_BANK0_BASE, 4, 2);
    write_reg(IO_BANK0_BASE, 8 + 4, 2);
    write_reg(IO_BANK0_BASE, LED_PIN as usize * 8 + 4, 5);
    write_reg(SIO_BASE, 0x24, 1 << LED_PIN); // output enable
}

fn set_led(on: bool) {
    let offset = if on { 0x14 } else { 0x18 }; // GPIO_OUT set / clear
    write_reg(SIO_BASE, offset, 1 << LED_PIN);
}

struct Uart {
    base: usize,
}

impl Uart {
    const DR: usize = 0x000;
    const FR: usize = 0x018;
    const IBRD: usize = 0x024;
    const FBRD: usize = 0x028;
    const LCR_H: usize = 0x02c;
    const CR: usize = 0x030;

    /// 8N1 at 115200 baud from the 125MHz peripheral clock. The divisor
    /// only latches on the LCR_H write, so order matters.
    fn init(base: usize) -> Uart {
        write_reg(base, Self::IBRD, 67);
        write_reg(base, Self::FBRD, 52);
        write_reg(base, Self::LCR_H, (0b11 << 5) | (1 << 4)); // 8 bits, FIFOs on
        write_reg(base, Self::CR, (1 << 9) | (1 << 8) | 1); // RX, TX, enable
        Uart { base }
    }

    fn write_byte(&self, byte: u8) {
        while read_reg(self.base, Self::FR) & (1 << 5) != 0 {} // TX FIFO full
        write_reg(self.base, Self::DR, byte as u32);
    }
}

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

static LOGGER: LockedLogger = LockedLogger(IrqLock::new(Logger { uart: None }));

struct Logger {
    uart: Option<Uart>,
}

/// The USB interrupt handler logs too, so the logger lock masks interrupts
/// rather than spinning.
struct LockedLogger(IrqLock<Logger>);

impl log::Log for LockedLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let color = match record.metadata().level() {
            Level::Trace => "\x1b[36m",
            Level::Debug => "\x1b[34m",
            Level::Info => "\x1b[32m",
            Level::Warn => "\x1b[33m",
            Level::Error => "\x1b[31m",
        };
        let mut logger = self.0.lock();
        if let Some(uart) = logger.uart.as_mut() {
            let _ = writeln!(
                uart,
                "[{}{:5}\x1b[0m] {}: {}",
                color,
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

fn init_logging(uart: Uart) {
    LOGGER.0.lock().uart = Some(uart);
    // Called once, before interrupts are unmasked. The checked setter
    // needs compare-and-swap, which this core does not have.
    unsafe { log::set_logger_racy(&LOGGER) }
        .map(|_| log::set_max_level(LevelFilter::Debug))
        .unwrap();
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    // The logger's lock may be held by whatever panicked, so write through
    // a fresh handle to the already-initialised UART.
    let mut uart = Uart { base: UART0_BASE };
    if let Some(location) = info.location() {
        let _ = writeln!(
            uart,
            "Panic message: {} ({} - {}:{})",
            info.message(),
            location.file(),
            location.line(),
            location.column()
        );
    } else {
        let _ = writeln!(uart, "Panic message: {} (no location info)", info.message());
    }
    loop {}
}

#[derive(Clone, Copy)]
struct UsbCtrlIrq;

unsafe impl cortex_m::interrupt::InterruptNumber for UsbCtrlIrq {
    fn number(self) -> u16 {
        USBCTRL_IRQ
    }
}

/// Without a vendored peripheral access crate every device interrupt lands
/// here; the controller's is the only one unmasked.
#[exception]
fn DefaultHandler(irqn: i16) {
    if irqn == USBCTRL_IRQ as i16 {
        if let Some(device) = UsbDevice::instance() {
            device.interrupt();
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LinkState {
    /// Unplugged, or still enumerating. Nothing armed, nothing moving.
    Waiting,
    /// The host has configured the device and the bridge is live.
    Up,
}

static LINK: StateHolder<LinkState> = StateHolder::new(LinkState::Waiting);

#[entry]
fn main() -> ! {
    let resets = unsafe { Resets::new(RESETS_BASE) };
    init_clocks(&resets);
    resets.release(ResetLines::IO_BANK0 | ResetLines::PADS_BANK0 | ResetLines::UART0);
    init_pins();
    init_logging(Uart::init(UART0_BASE));
    info!("modem emulator starting");

    let device = match UsbDevice::init() {
        Ok(device) => device,
        Err(error) => panic!("USB controller failed to come up: {:?}", error),
    };
    device.set_setup_handler(control::handle_setup);
    unsafe { NVIC::unmask(UsbCtrlIrq) };

    let mut transport = Loopback::new();
    loop {
        if device.is_configured() {
            // The first observation of the configured flag is what arms
            // the first bulk OUT receive; after that the completions keep
            // the endpoint armed themselves.
            if LINK.transition(LinkState::Waiting, LinkState::Up) {
                info!("link up");
                set_led(true);
                device.with(|device| bridge::arm_receive(device));
            }
        } else if LINK.transition(LinkState::Up, LinkState::Waiting) {
            info!("link down");
            set_led(false);
            bridge::reset();
        }

        if LINK.is(LinkState::Up) {
            bridge::pump(device, &mut transport);
        }
        cortex_m::asm::wfi();
    }
}
