//! Device-side USB protocol types: endpoint addressing, setup packets, and
//! descriptor layouts. Everything here is hardware-independent; the device
//! controller crate layers the register-level work on top of these.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod descriptor;
pub mod setup;

/// Direction of an endpoint or transfer, named from the host's point of
/// view as the USB spec does: IN carries data to the host, OUT to the
/// device.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Dir {
    Out,
    In,
}

/// An endpoint address as it appears on the bus and in descriptors: the
/// endpoint number in the low nibble, the direction in bit 7 (set = IN).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EndpointAddress(u8);

impl EndpointAddress {
    pub const CONTROL_IN: EndpointAddress = EndpointAddress::new(0, Dir::In);
    pub const CONTROL_OUT: EndpointAddress = EndpointAddress::new(0, Dir::Out);

    pub const fn new(number: u8, dir: Dir) -> EndpointAddress {
        assert!(number < 16, "endpoint numbers are 4 bits");
        let dir_bit = match dir {
            Dir::In => 0x80,
            Dir::Out => 0x00,
        };
        EndpointAddress(dir_bit | number)
    }

    /// Decodes an address byte from bus traffic or a descriptor, ignoring
    /// the reserved bits 4..=6.
    pub const fn from_bits(bits: u8) -> EndpointAddress {
        EndpointAddress(bits & 0x8f)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn number(self) -> u8 {
        self.0 & 0x0f
    }

    pub const fn dir(self) -> Dir {
        if self.0 & 0x80 != 0 {
            Dir::In
        } else {
            Dir::Out
        }
    }

    pub const fn is_control(self) -> bool {
        self.number() == 0
    }

    /// The bookkeeping index for this endpoint: IN endpoints take the even
    /// indices and OUT endpoints the odd ones, so `EP0 IN` is index 0. This
    /// matches the bit order of the RP2040's buffer-status register, which
    /// is what makes index-keyed tables line up with interrupt status bits.
    pub const fn index(self) -> EndpointIndex {
        let dir_bit = match self.dir() {
            Dir::Out => 1,
            Dir::In => 0,
        };
        EndpointIndex((self.number() << 1) | dir_bit)
    }
}

impl core::fmt::Debug for EndpointAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let dir = match self.dir() {
            Dir::In => "IN",
            Dir::Out => "OUT",
        };
        write!(f, "EP{} {}", self.number(), dir)
    }
}

/// A value in `0..32` keying the per-endpoint bookkeeping tables (data
/// toggles, completion callbacks) and the buffer-status bit positions.
/// Invertible back to an [`EndpointAddress`]; keeping the two as distinct
/// types is what stops an address byte from being used as a table index by
/// accident.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EndpointIndex(u8);

impl EndpointIndex {
    pub const COUNT: usize = 32;

    pub const fn new(index: u8) -> EndpointIndex {
        assert!(index < EndpointIndex::COUNT as u8);
        EndpointIndex(index)
    }

    pub const fn address(self) -> EndpointAddress {
        let dir = if self.0 & 1 == 1 { Dir::Out } else { Dir::In };
        EndpointAddress::new(self.0 >> 1, dir)
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_packs_number_and_direction() {
        let bulk_in = EndpointAddress::new(2, Dir::In);
        assert_eq!(bulk_in.bits(), 0x82);
        assert_eq!(bulk_in.number(), 2);
        assert_eq!(bulk_in.dir(), Dir::In);
        assert!(!bulk_in.is_control());

        let bulk_out = EndpointAddress::from_bits(0x02);
        assert_eq!(bulk_out.dir(), Dir::Out);
        assert_eq!(bulk_out.number(), 2);
    }

    #[test]
    fn from_bits_drops_reserved_bits() {
        assert_eq!(EndpointAddress::from_bits(0xf2).bits(), 0x82);
    }

    #[test]
    fn control_endpoints_share_number_zero() {
        assert!(EndpointAddress::CONTROL_IN.is_control());
        assert!(EndpointAddress::CONTROL_OUT.is_control());
        assert_eq!(EndpointAddress::CONTROL_IN.index().as_usize(), 0);
        assert_eq!(EndpointAddress::CONTROL_OUT.index().as_usize(), 1);
    }

    #[test]
    fn index_and_address_are_a_bijection() {
        for raw in 0..EndpointIndex::COUNT as u8 {
            let index = EndpointIndex::new(raw);
            let roundtrip = index.address().index();
            assert_eq!(roundtrip, index);
        }

        // And in the other direction, every address maps to a distinct index.
        let mut seen = [false; EndpointIndex::COUNT];
        for number in 0..16 {
            for dir in [Dir::In, Dir::Out] {
                let index = EndpointAddress::new(number, dir).index().as_usize();
                assert!(!seen[index], "index {index} produced twice");
                seen[index] = true;
            }
        }
        assert!(seen.iter().all(|&hit| hit));
    }
}
