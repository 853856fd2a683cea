//! Driver for the RP2040's USB controller in device mode.
//!
//! The controller raises one interrupt line; everything the driver mutates
//! in response lives in a single [`DeviceState`] behind an interrupt-masking
//! lock, so main-context calls and the interrupt handler see the same
//! consistent picture. Work against a locked device goes through a
//! [`DeviceHandle`], which the completion callbacks also receive so they can
//! re-arm endpoints without taking the lock twice.
//!
//! Control transfers get the treatment the protocol demands: each setup
//! packet restarts the EP0 IN toggle at DATA1, `SET_ADDRESS` is held back
//! until its status stage has gone out on the old address, and a request
//! nobody claims stalls whichever side of EP0 the host is waiting on.

use crate::{
    dpram::{BufferControl, Dpram, EndpointControl, BUFFER_SIZE},
    fmt::HexDump,
    reg::{
        EpStallArm, Ints, MainCtrl, Register, Registers, ResetLines, Resets, SieCtrl, SieStatus,
        UsbMuxing, UsbPwr, RESETS_BASE, USBCTRL_DPRAM_BASE, USBCTRL_REGS_BASE,
    },
};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{debug, info, trace};
use sync::IrqLock;
use usb::{
    descriptor::EndpointDescriptor,
    setup::{Request, SetupPacket},
    Dir, EndpointAddress, EndpointIndex,
};

/// Largest packet either direction moves in one transfer; also the size of
/// every hardware buffer the driver hands out.
pub const MAX_PACKET_SIZE: usize = BUFFER_SIZE;

/// Called when a transfer on a non-control endpoint completes, with the
/// device still locked. For OUT endpoints `data` is what the host sent; for
/// IN endpoints it is the packet that just went out.
pub type TransferCallback = fn(&mut DeviceHandle<'_>, data: &[u8]);

/// Called for each setup packet the built-in handling does not consume.
/// Returning `false` stalls the request.
pub type SetupHandler = fn(&mut DeviceHandle<'_>, setup: &SetupPacket) -> bool;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Pid {
    Data0,
    Data1,
}

impl Pid {
    fn buffer_flag(self) -> BufferControl {
        match self {
            Pid::Data0 => BufferControl::empty(),
            Pid::Data1 => BufferControl::DATA1_PID,
        }
    }

    fn next(self) -> Pid {
        match self {
            Pid::Data0 => Pid::Data1,
            Pid::Data1 => Pid::Data0,
        }
    }
}

struct DeviceState {
    /// Completion callbacks by endpoint index. The control endpoints have
    /// none; their completion handling is built in.
    callbacks: [Option<TransferCallback>; EndpointIndex::COUNT],
    next_pid: [Pid; EndpointIndex::COUNT],
    last_setup: Option<SetupPacket>,
    setup_handler: Option<SetupHandler>,
    configured: bool,
}

impl DeviceState {
    const fn new() -> DeviceState {
        DeviceState {
            callbacks: [None; EndpointIndex::COUNT],
            next_pid: [Pid::Data0; EndpointIndex::COUNT],
            last_setup: None,
            setup_handler: None,
            configured: false,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InitError {
    /// `init` has already been called. There is only one controller.
    AlreadyInitialized,
}

pub struct UsbDevice {
    regs: Registers,
    dpram_base: usize,
    resets_base: usize,
    state: IrqLock<DeviceState>,
}

static DEVICE: UsbDevice =
    unsafe { UsbDevice::new_at(USBCTRL_REGS_BASE, USBCTRL_DPRAM_BASE, RESETS_BASE) };
static INITIALIZED: AtomicBool = AtomicBool::new(false);

impl UsbDevice {
    /// Brings the controller out of reset, presents the pull-up to the
    /// host, and hands back the device. Fails on the second call.
    pub fn init() -> Result<&'static UsbDevice, InitError> {
        {
            let _state = DEVICE.state.lock();
            if INITIALIZED.load(Ordering::Acquire) {
                return Err(InitError::AlreadyInitialized);
            }
            INITIALIZED.store(true, Ordering::Release);
        }
        DEVICE.start_controller();
        info!("USB controller up, pull-up presented");
        Ok(&DEVICE)
    }

    /// The device `init` produced, if it has run. This is how the interrupt
    /// handler finds the driver.
    pub fn instance() -> Option<&'static UsbDevice> {
        if INITIALIZED.load(Ordering::Acquire) {
            Some(&DEVICE)
        } else {
            None
        }
    }

    /// Makes a device over the given register, DPRAM, and reset-controller
    /// base addresses without touching the hardware.
    ///
    /// # Safety
    /// Each base must cover the real peripheral's extent (alias windows
    /// included) and be driven by nothing else.
    pub const unsafe fn new_at(regs_base: usize, dpram_base: usize, resets_base: usize) -> UsbDevice {
        UsbDevice {
            regs: Registers::new(regs_base),
            dpram_base,
            resets_base,
            state: IrqLock::new(DeviceState::new()),
        }
    }

    /// Runs `f` with the device locked. Interrupts stay masked for the
    /// duration, so keep it short.
    pub fn with<R>(&self, f: impl FnOnce(&mut DeviceHandle<'_>) -> R) -> R {
        let mut state = self.state.lock();
        let mut device = DeviceHandle { regs: self.regs, dpram: self.dpram(), state: &mut state };
        f(&mut device)
    }

    /// Entry point for the controller's interrupt.
    pub fn interrupt(&self) {
        self.with(|device| device.service_interrupt());
    }

    pub fn set_setup_handler(&self, handler: SetupHandler) {
        self.with(|device| device.state.setup_handler = Some(handler));
    }

    pub fn is_configured(&self) -> bool {
        self.with(|device| device.is_configured())
    }

    pub fn send(&self, ep: EndpointAddress, data: &[u8]) {
        self.with(|device| device.send(ep, data));
    }

    pub fn receive(&self, ep: EndpointAddress, max_len: usize) {
        self.with(|device| device.receive(ep, max_len));
    }

    pub fn is_send_pending(&self, ep: EndpointAddress) -> bool {
        self.with(|device| device.is_send_pending(ep))
    }

    fn dpram(&self) -> &Dpram {
        unsafe { Dpram::from_base(self.dpram_base) }
    }

    fn start_controller(&self) {
        let resets = unsafe { Resets::new(self.resets_base) };
        resets.cycle(ResetLines::USBCTRL);

        self.dpram().zero();

        self.regs.write(Register::UsbMuxing, (UsbMuxing::TO_PHY | UsbMuxing::SOFTCON).bits());
        self.regs
            .write(Register::UsbPwr, (UsbPwr::VBUS_DETECT | UsbPwr::VBUS_DETECT_OVERRIDE_EN).bits());
        self.regs.write(Register::MainCtrl, MainCtrl::CONTROLLER_EN.bits());
        self.regs.write(Register::SieCtrl, SieCtrl::EP0_INT_1BUF.bits());
        self.regs.write(
            Register::InterruptEnable,
            (Ints::BUFF_STATUS | Ints::BUS_RESET | Ints::SETUP_REQ).bits(),
        );

        // Presenting the pull-up is what starts enumeration, so it goes
        // last.
        self.regs.set(Register::SieCtrl, SieCtrl::PULLUP_EN.bits());
    }
}

/// A locked view of the device. All actual driving of the hardware happens
/// through one of these.
pub struct DeviceHandle<'a> {
    regs: Registers,
    dpram: &'a Dpram,
    state: &'a mut DeviceState,
}

impl DeviceHandle<'_> {
    /// Loads `data` into an IN endpoint's buffer and hands the buffer to
    /// the hardware. The caller checks `is_send_pending` first; a send
    /// while the previous packet is still in flight overwrites it.
    pub fn send(&mut self, ep: EndpointAddress, data: &[u8]) {
        debug_assert!(ep.dir() == Dir::In);
        debug_assert!(data.len() <= BUFFER_SIZE);
        trace!("{:?} sending {} bytes\n{}", ep, data.len(), HexDump(data));

        let buffer = self.dpram.transfer_buffer(ep);
        for (slot, &byte) in buffer.iter().zip(data) {
            slot.write(byte);
        }

        let pid = self.take_pid(ep);
        let control = BufferControl::AVAILABLE
            | BufferControl::FULL
            | pid.buffer_flag()
            | BufferControl::with_length(data.len());
        self.dpram.buffer_control(ep).write(control.bits());
    }

    /// Hands an OUT endpoint's buffer to the hardware for up to `max_len`
    /// bytes from the host. Until this is called (again), the hardware
    /// NAKs the host's writes to the endpoint.
    pub fn receive(&mut self, ep: EndpointAddress, max_len: usize) {
        debug_assert!(ep.dir() == Dir::Out);
        debug_assert!(max_len <= BUFFER_SIZE);

        let pid = self.take_pid(ep);
        let control =
            BufferControl::AVAILABLE | pid.buffer_flag() | BufferControl::with_length(max_len);
        self.dpram.buffer_control(ep).write(control.bits());
    }

    /// Whether an IN endpoint still holds a packet the host has not taken.
    pub fn is_send_pending(&self, ep: EndpointAddress) -> bool {
        debug_assert!(ep.dir() == Dir::In);
        let control = BufferControl::from_bits_retain(self.dpram.buffer_control(ep).read());
        control.contains(BufferControl::FULL)
    }

    pub fn control_send(&mut self, data: &[u8]) {
        self.send(EndpointAddress::CONTROL_IN, data);
    }

    pub fn control_receive(&mut self, max_len: usize) {
        self.receive(EndpointAddress::CONTROL_OUT, max_len);
    }

    /// Enables a non-control endpoint, pointing it at its buffer and
    /// resetting its data toggle, and registers the completion callback.
    pub fn configure_endpoint(&mut self, descriptor: &EndpointDescriptor, callback: TransferCallback) {
        let ep = descriptor.address();
        debug_assert!(!ep.is_control());

        let control = EndpointControl::ENABLE
            | EndpointControl::INTERRUPT_PER_BUFFER
            | EndpointControl::with_transfer_type(descriptor.transfer_type())
            | EndpointControl::with_buffer_address(self.dpram.buffer_offset(ep));
        self.dpram.endpoint_control(ep).write(control.bits());

        self.state.callbacks[ep.index().as_usize()] = Some(callback);
        self.state.next_pid[ep.index().as_usize()] = Pid::Data0;
        debug!("configured {:?}", ep);
    }

    pub fn set_configured(&mut self, configured: bool) {
        self.state.configured = configured;
    }

    pub fn is_configured(&self) -> bool {
        self.state.configured
    }

    /// Stalls the control endpoint the host is currently waiting on: the
    /// IN side for device-to-host requests, the OUT side for host-to-device
    /// ones. Only meaningful while a request is on record; with none, the
    /// IN side is the only sensible fallback.
    pub fn stall_control(&mut self) {
        debug_assert!(self.state.last_setup.is_some());
        let dir = match self.state.last_setup {
            Some(setup) => setup.direction(),
            None => Dir::In,
        };
        let (ep, arm) = match dir {
            Dir::In => (EndpointAddress::CONTROL_IN, EpStallArm::EP0_IN),
            Dir::Out => (EndpointAddress::CONTROL_OUT, EpStallArm::EP0_OUT),
        };
        self.regs.set(Register::EpStallArm, arm.bits());
        let control = self.dpram.buffer_control(ep);
        control.write(control.read() | BufferControl::STALL.bits());
    }

    fn take_pid(&mut self, ep: EndpointAddress) -> Pid {
        let slot = &mut self.state.next_pid[ep.index().as_usize()];
        let pid = *slot;
        *slot = pid.next();
        pid
    }

    fn service_interrupt(&mut self) {
        let status = Ints::from_bits_retain(self.regs.read(Register::InterruptStatus));

        if status.contains(Ints::BUS_RESET) {
            self.regs.clear(Register::SieStatus, SieStatus::BUS_RESET.bits());
            self.bus_reset();
        }

        if status.contains(Ints::SETUP_REQ) {
            self.regs.clear(Register::SieStatus, SieStatus::SETUP_REC.bits());
            let setup = SetupPacket::from_le_bytes(self.dpram.setup_packet());
            self.handle_setup(&setup);
        }

        if status.contains(Ints::BUFF_STATUS) {
            self.handle_buffer_completions();
        }
    }

    fn bus_reset(&mut self) {
        debug!("bus reset");
        self.regs.write(Register::AddrEndp, 0);
        self.state.configured = false;
        self.state.last_setup = None;
    }

    fn handle_setup(&mut self, setup: &SetupPacket) {
        trace!("setup packet: {:?}", setup);
        self.state.last_setup = Some(*setup);
        // A control transfer's first IN packet is always DATA1.
        self.state.next_pid[EndpointAddress::CONTROL_IN.index().as_usize()] = Pid::Data1;

        if setup.standard_request() == Some(Request::SetAddress) {
            // The new address only takes effect once its status stage has
            // gone out on the old one, so just arm the response here; the
            // completion handler programs the register.
            self.control_send(&[]);
            return;
        }

        let handled = match self.state.setup_handler {
            Some(handler) => handler(self, setup),
            None => false,
        };
        if !handled {
            debug!("stalling unhandled request {:?}", setup);
            self.stall_control();
        }
    }

    /// A packet has left EP0 IN. Either it was the status stage of a
    /// `SET_ADDRESS` and the address can change now, or the host is about
    /// to follow up on EP0 OUT and a buffer must be waiting there.
    fn control_in_complete(&mut self) {
        if let Some(setup) = self.state.last_setup {
            if setup.standard_request() == Some(Request::SetAddress) {
                let address = (setup.value & 0x7f) as u32;
                debug!("assigned address {}", address);
                self.regs.write(Register::AddrEndp, address);
                return;
            }
        }
        self.control_receive(MAX_PACKET_SIZE);
    }

    fn handle_buffer_completions(&mut self) {
        let status = self.regs.read(Register::BuffStatus);

        for raw in 0..EndpointIndex::COUNT {
            if status & (1 << raw) == 0 {
                continue;
            }
            let index = EndpointIndex::new(raw as u8);
            let ep = index.address();

            let control = BufferControl::from_bits_retain(self.dpram.buffer_control(ep).read());
            let len = control.length().min(BUFFER_SIZE);
            let mut data = [0; BUFFER_SIZE];
            let buffer = self.dpram.transfer_buffer(ep);
            for (slot, byte) in data[..len].iter_mut().zip(buffer) {
                *slot = byte.read();
            }

            // Acknowledged before dispatch: a completion raised by a
            // callback re-arming the endpoint must survive this one.
            self.regs.clear(Register::BuffStatus, 1 << raw);

            if ep.dir() == Dir::Out {
                trace!("{:?} took {} bytes from the host\n{}", ep, len, HexDump(&data[..len]));
            }

            if ep == EndpointAddress::CONTROL_IN {
                self.control_in_complete();
                continue;
            }
            if let Some(callback) = self.state.callbacks[index.as_usize()] {
                callback(self, &data[..len]);
            }
        }
    }
}
