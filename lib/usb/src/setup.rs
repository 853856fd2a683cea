use crate::Dir;

/// The 8-byte packet that opens every control transfer, snapshotted out of
/// the controller's shared memory the moment it is handled (the hardware
/// region it arrives in is overwritten by the next setup packet). Decoding
/// is total: every byte pattern the bus can deliver produces a value, and
/// requests this device does not recognize are rejected later by stalling,
/// never by panicking in the interrupt handler.
#[derive(Clone, Copy, Debug)]
pub struct SetupPacket {
    pub typ: RequestType,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn from_le_bytes(bytes: [u8; 8]) -> SetupPacket {
        SetupPacket {
            typ: RequestType::from_bits(bytes[0]),
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Direction of the transfer's data stage (for a zero-length request,
    /// the direction the status stage runs opposite to).
    pub fn direction(&self) -> Dir {
        match self.typ.get(RequestType::DIRECTION) {
            Direction::HostToDevice => Dir::Out,
            Direction::DeviceToHost => Dir::In,
        }
    }

    pub fn is_standard(&self) -> bool {
        self.typ.get(RequestType::TYP) == RequestTypeType::Standard
    }

    /// `Some` iff this is a standard request with a code this library knows.
    pub fn standard_request(&self) -> Option<Request> {
        if !self.is_standard() {
            return None;
        }
        Request::from_code(self.request)
    }
}

mycelium_bitfield::bitfield! {
    pub struct RequestType<u8> {
        /// Request recipient (device/interface/endpoint/other). Left as raw
        /// bits: the codes 5..=31 are reserved and a device-side decoder has
        /// to carry them through without choking.
        pub const RECIPIENT = 5;
        pub const TYP: RequestTypeType;
        pub const DIRECTION: Direction;
    }
}

mycelium_bitfield::enum_from_bits! {
    #[derive(PartialEq, Eq, Debug)]
    pub enum RequestTypeType<u8> {
        Standard = 0b00,
        Class = 0b01,
        Vendor = 0b10,
        Reserved = 0b11,
    }
}

mycelium_bitfield::enum_from_bits! {
    #[derive(PartialEq, Eq, Debug)]
    pub enum Direction<u8> {
        HostToDevice = 0b0,
        DeviceToHost = 0b1,
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Request {
    GetStatus = 0,
    ClearFeature = 1,
    SetFeature = 3,
    SetAddress = 5,
    GetDescriptor = 6,
    SetDescriptor = 7,
    GetConfiguration = 8,
    SetConfiguration = 9,
    GetInterface = 10,
    SetInterface = 11,
    SynchFrame = 12,
}

impl Request {
    pub fn from_code(code: u8) -> Option<Request> {
        match code {
            0 => Some(Request::GetStatus),
            1 => Some(Request::ClearFeature),
            3 => Some(Request::SetFeature),
            5 => Some(Request::SetAddress),
            6 => Some(Request::GetDescriptor),
            7 => Some(Request::SetDescriptor),
            8 => Some(Request::GetConfiguration),
            9 => Some(Request::SetConfiguration),
            10 => Some(Request::GetInterface),
            11 => Some(Request::SetInterface),
            12 => Some(Request::SynchFrame),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_request_type() {
        assert_eq!(
            RequestType::new()
                .with(RequestType::TYP, RequestTypeType::Vendor)
                .with(RequestType::DIRECTION, Direction::DeviceToHost)
                .with(RequestType::RECIPIENT, 0b00010)
                .bits(),
            0b1_10_00010
        );
    }

    #[test]
    fn decodes_set_address() {
        let packet = SetupPacket::from_le_bytes([0x00, 0x05, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(packet.standard_request(), Some(Request::SetAddress));
        assert_eq!(packet.value, 5);
        assert_eq!(packet.direction(), Dir::Out);
    }

    #[test]
    fn decodes_get_descriptor() {
        // The first request every host makes: device descriptor, 64 bytes.
        let packet = SetupPacket::from_le_bytes([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]);
        assert_eq!(packet.standard_request(), Some(Request::GetDescriptor));
        assert_eq!(packet.direction(), Dir::In);
        assert_eq!(packet.value, 0x0100);
        assert_eq!(packet.length, 64);
    }

    #[test]
    fn tolerates_any_request_type_byte() {
        for byte in 0..=0xffu8 {
            let packet = SetupPacket::from_le_bytes([byte, 0xff, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
            // Must decode without panicking; garbage is simply not standard.
            let _ = packet.direction();
            assert_eq!(packet.standard_request(), None);
        }
    }

    #[test]
    fn vendor_requests_are_not_standard() {
        let packet = SetupPacket::from_le_bytes([0x40, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(!packet.is_standard());
        assert_eq!(packet.standard_request(), None);
        assert_eq!(packet.direction(), Dir::Out);
    }
}
