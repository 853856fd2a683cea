//! Descriptor tables for the device this firmware claims to be: an Omron
//! ME56PS2 modem. Byte-for-byte what the real unit reports, quirks
//! included, so host-side software written against the real modem accepts
//! this one.

use usb::{
    descriptor::{
        ConfigurationDescriptor, DescriptorType, DeviceDescriptor, EndpointDescriptor,
        InterfaceDescriptor, TRANSFER_TYPE_BULK,
    },
    Dir, EndpointAddress,
};
use zerocopy::AsBytes;

pub const VENDOR_ID: u16 = 0x0590; // Omron
pub const PRODUCT_ID: u16 = 0x001a; // ME56PS2

/// The endpoint number both bulk endpoints share.
pub const BULK_ENDPOINT: u8 = 2;

pub static DEVICE: DeviceDescriptor = DeviceDescriptor {
    length: core::mem::size_of::<DeviceDescriptor>() as u8,
    typ: DescriptorType::Device as u8,
    bcd_usb: 0x0110,
    class: 0,
    sub_class: 0,
    protocol: 0,
    max_control_packet_size: 64,
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    bcd_device: 0x0101,
    manufacturer_index: 1,
    product_index: 2,
    serial_number_index: 3,
    num_configurations: 1,
};

/// The configuration descriptor is served with its interface and endpoint
/// descriptors appended, as one response; `total_length` covers all four.
#[derive(Clone, Copy, AsBytes)]
#[repr(C, packed)]
pub struct ConfigurationBundle {
    pub configuration: ConfigurationDescriptor,
    pub interface: InterfaceDescriptor,
    pub bulk_in: EndpointDescriptor,
    pub bulk_out: EndpointDescriptor,
}

pub static CONFIGURATION: ConfigurationBundle = ConfigurationBundle {
    configuration: ConfigurationDescriptor {
        length: core::mem::size_of::<ConfigurationDescriptor>() as u8,
        typ: DescriptorType::Configuration as u8,
        total_length: core::mem::size_of::<ConfigurationBundle>() as u16,
        num_interfaces: 1,
        configuration_value: 1,
        configuration_index: 2,
        // Remote wakeup and nothing else. The real modem leaves the
        // always-one bit clear, so this does too.
        attributes: 0x20,
        max_power: 0x1e, // 60mA
    },
    interface: InterfaceDescriptor {
        length: core::mem::size_of::<InterfaceDescriptor>() as u8,
        typ: DescriptorType::Interface as u8,
        interface_number: 0,
        alternate_setting: 0,
        num_endpoints: 2,
        class: 0xff, // vendor specific
        sub_class: 0xff,
        protocol: 0xff,
        interface_index: 2,
    },
    bulk_in: EndpointDescriptor {
        length: core::mem::size_of::<EndpointDescriptor>() as u8,
        typ: DescriptorType::Endpoint as u8,
        endpoint_address: EndpointAddress::new(BULK_ENDPOINT, Dir::In).bits(),
        attributes: TRANSFER_TYPE_BULK,
        max_packet_size: 64,
        interval: 0,
    },
    bulk_out: EndpointDescriptor {
        length: core::mem::size_of::<EndpointDescriptor>() as u8,
        typ: DescriptorType::Endpoint as u8,
        endpoint_address: EndpointAddress::new(BULK_ENDPOINT, Dir::Out).bits(),
        attributes: TRANSFER_TYPE_BULK,
        max_packet_size: 64,
        interval: 0,
    },
};

/// String descriptor 0, the language table: US English only.
pub static STRING_LANGUAGES: [u8; 4] = [4, DescriptorType::String as u8, 0x09, 0x04];

/// The real modem reports its manufacturer and serial number as "N/A".
pub static STRING_MANUFACTURER: [u8; 8] =
    [8, DescriptorType::String as u8, b'N', 0, b'/', 0, b'A', 0];

pub static STRING_PRODUCT: [u8; 30] = [
    30,
    DescriptorType::String as u8,
    b'M', 0, b'o', 0, b'd', 0, b'e', 0, b'm', 0, b' ', 0, b'e', 0, b'm', 0, b'u', 0, b'l', 0,
    b'a', 0, b't', 0, b'o', 0, b'r', 0,
];

pub static STRING_SERIAL: [u8; 8] = [8, DescriptorType::String as u8, b'N', 0, b'/', 0, b'A', 0];

/// Looks up a string descriptor by the index a `GET_DESCRIPTOR` request
/// carries.
pub fn string(index: u8) -> Option<&'static [u8]> {
    match index {
        0 => Some(&STRING_LANGUAGES),
        1 => Some(&STRING_MANUFACTURER),
        2 => Some(&STRING_PRODUCT),
        3 => Some(&STRING_SERIAL),
        _ => None,
    }
}
