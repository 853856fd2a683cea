//! Layout of the controller's 4KiB of dual-port RAM, shared between the CPU
//! and the USB serial interface engine. The first 0x100 bytes are control
//! structures at fixed offsets (the received setup packet, the endpoint
//! control and buffer control registers); the rest is transfer buffer space
//! handed out per endpoint.

use bit_field::BitField;
use bitflags::bitflags;
use usb::{Dir, EndpointAddress};
use volatile::{ReadOnly, Volatile};

/// Size of every transfer buffer in the layout below. Full-speed control
/// and bulk packets fit exactly.
pub const BUFFER_SIZE: usize = 64;

#[repr(C)]
pub struct Dpram {
    setup_packet: [Volatile<u8, ReadOnly>; 8],
    /// Endpoint control for EP1..=15. EP0 has none: it is always enabled,
    /// with its buffer at a fixed offset.
    ep_ctrl: [DirectionPair; 15],
    ep_buf_ctrl: [DirectionPair; 16],
    ep0_buf_a: [Volatile<u8>; BUFFER_SIZE],
    _ep0_buf_b: [Volatile<u8>; BUFFER_SIZE],
    epx_data: [Volatile<u8>; 0x1000 - 0x180],
}

/// An IN/OUT register pair, in the hardware's order (IN first).
#[repr(C)]
pub struct DirectionPair {
    registers: [Volatile<u32>; 2],
}

impl DirectionPair {
    fn get(&self, dir: Dir) -> &Volatile<u32> {
        match dir {
            Dir::In => &self.registers[0],
            Dir::Out => &self.registers[1],
        }
    }
}

impl Dpram {
    /// # Safety
    /// `base` must be the controller's DPRAM aperture (or a writable test
    /// double of the same size), accessed only through references produced
    /// here.
    pub unsafe fn from_base<'a>(base: usize) -> &'a Dpram {
        &*(base as *const Dpram)
    }

    /// Zeroes the whole region, as the controller expects at start-up.
    pub fn zero(&self) {
        let words = (self as *const Dpram).cast::<u32>() as *mut u32;
        for offset in 0..core::mem::size_of::<Dpram>() / 4 {
            unsafe { words.add(offset).write_volatile(0) };
        }
    }

    /// Snapshot of the last setup packet the hardware wrote.
    pub fn setup_packet(&self) -> [u8; 8] {
        core::array::from_fn(|i| self.setup_packet[i].read())
    }

    pub fn endpoint_control(&self, ep: EndpointAddress) -> &Volatile<u32> {
        debug_assert!(!ep.is_control());
        self.ep_ctrl[ep.number() as usize - 1].get(ep.dir())
    }

    pub fn buffer_control(&self, ep: EndpointAddress) -> &Volatile<u32> {
        self.ep_buf_ctrl[ep.number() as usize].get(ep.dir())
    }

    /// The transfer buffer backing an endpoint. EP0 owns the dedicated
    /// buffer below the shared space; every other endpoint gets the
    /// 64-byte slot its index selects.
    pub fn transfer_buffer(&self, ep: EndpointAddress) -> &[Volatile<u8>] {
        if ep.is_control() {
            &self.ep0_buf_a
        } else {
            let start = (ep.index().as_usize() - 2) * BUFFER_SIZE;
            &self.epx_data[start..(start + BUFFER_SIZE)]
        }
    }

    /// Offset of an endpoint's transfer buffer from the start of the
    /// region, in the form the endpoint control register's buffer address
    /// field expects.
    pub fn buffer_offset(&self, ep: EndpointAddress) -> u32 {
        let base = self as *const Dpram as usize;
        let buffer = self.transfer_buffer(ep).as_ptr() as usize;
        (buffer - base) as u32
    }
}

bitflags! {
    /// The single-buffered half of a buffer control register. This driver
    /// never double-buffers, so the upper half of each register stays zero.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct BufferControl: u32 {
        const AVAILABLE = 1 << 10;
        const STALL = 1 << 11;
        const RESET_BUFFER_SELECT = 1 << 12;
        const DATA1_PID = 1 << 13;
        const LAST = 1 << 14;
        const FULL = 1 << 15;

        /*
         * The transfer length lives in the low ten bits; marking them
         * known keeps the `bitflags`-generated operations from truncating
         * a combined value.
         */
        const _ = 0x3ff;
    }
}

impl BufferControl {
    pub fn with_length(length: usize) -> BufferControl {
        debug_assert!(length <= 0x3ff);
        BufferControl::from_bits_retain(length as u32)
    }

    /// For completed transfers this is the number of bytes the hardware
    /// put in (OUT) or took from (IN) the buffer.
    pub fn length(self) -> usize {
        self.bits().get_bits(0..10) as usize
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct EndpointControl: u32 {
        const ENABLE = 1 << 31;
        const DOUBLE_BUFFERED = 1 << 30;
        const INTERRUPT_PER_BUFFER = 1 << 29;
        const INTERRUPT_PER_DOUBLE_BUFFER = 1 << 28;

        /*
         * Transfer type in bits 26..28, buffer address (as a DPRAM offset)
         * in the low sixteen.
         */
        const _ = (0b11 << 26) | 0xffff;
    }
}

impl EndpointControl {
    /// `transfer_type` uses the descriptor encoding (bulk is `0b10`).
    pub fn with_transfer_type(transfer_type: u8) -> EndpointControl {
        let mut value = 0;
        value.set_bits(26..28, transfer_type as u32);
        EndpointControl::from_bits_retain(value)
    }

    pub fn with_buffer_address(offset: u32) -> EndpointControl {
        debug_assert!(offset <= 0xffff);
        EndpointControl::from_bits_retain(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    #[test]
    fn layout_matches_the_hardware_map() {
        assert_eq!(core::mem::size_of::<Dpram>(), 0x1000);
        assert_eq!(core::mem::offset_of!(Dpram, ep_ctrl), 0x08);
        assert_eq!(core::mem::offset_of!(Dpram, ep_buf_ctrl), 0x80);
        assert_eq!(core::mem::offset_of!(Dpram, ep0_buf_a), 0x100);
        assert_eq!(core::mem::offset_of!(Dpram, _ep0_buf_b), 0x140);
        assert_eq!(core::mem::offset_of!(Dpram, epx_data), 0x180);
    }

    #[test]
    fn buffer_offsets_follow_the_endpoint_index() {
        let mut image = Box::new([0u32; 0x400]);
        let dpram = unsafe { Dpram::from_base(image.as_mut_ptr() as usize) };

        assert_eq!(dpram.buffer_offset(EndpointAddress::CONTROL_IN), 0x100);
        assert_eq!(dpram.buffer_offset(EndpointAddress::CONTROL_OUT), 0x100);
        // EP2 IN and OUT are indices 4 and 5, so they get the third and
        // fourth shared slots.
        assert_eq!(dpram.buffer_offset(EndpointAddress::new(2, Dir::In)), 0x180 + 2 * 64);
        assert_eq!(dpram.buffer_offset(EndpointAddress::new(2, Dir::Out)), 0x180 + 3 * 64);
    }

    #[test]
    fn zero_clears_the_whole_region() {
        let mut image = Box::new([0xa5a5_a5a5u32; 0x400]);
        let dpram = unsafe { Dpram::from_base(image.as_mut_ptr() as usize) };
        dpram.zero();
        assert!(image.iter().all(|&word| word == 0));
    }

    #[test]
    fn buffer_control_packs_flags_and_length() {
        let control = BufferControl::AVAILABLE
            | BufferControl::FULL
            | BufferControl::DATA1_PID
            | BufferControl::with_length(64);
        assert_eq!(control.bits(), (1 << 10) | (1 << 15) | (1 << 13) | 64);
        assert_eq!(control.length(), 64);
    }

    #[test]
    fn endpoint_control_places_type_and_address() {
        let control = EndpointControl::ENABLE
            | EndpointControl::INTERRUPT_PER_BUFFER
            | EndpointControl::with_transfer_type(0b10)
            | EndpointControl::with_buffer_address(0x200);
        assert_eq!(control.bits(), (1 << 31) | (1 << 29) | (0b10 << 26) | 0x200);
    }
}
