//! Descriptor layouts, exactly as they cross the bus: little-endian, packed,
//! no padding. `AsBytes` gives each one its wire image for control-transfer
//! responses; the byte-level tests below pin the layout.

use crate::EndpointAddress;
use zerocopy::AsBytes;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum DescriptorType {
    Device = 1,
    Configuration = 2,
    String = 3,
    Interface = 4,
    Endpoint = 5,
}

impl DescriptorType {
    /// Decodes the high byte of a `GET_DESCRIPTOR` request's value field.
    pub fn from_code(code: u8) -> Option<DescriptorType> {
        match code {
            1 => Some(DescriptorType::Device),
            2 => Some(DescriptorType::Configuration),
            3 => Some(DescriptorType::String),
            4 => Some(DescriptorType::Interface),
            5 => Some(DescriptorType::Endpoint),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, AsBytes)]
#[repr(C, packed)]
pub struct DeviceDescriptor {
    pub length: u8,
    pub typ: u8,
    /// Binary-Coded Decimal representation of the USB Spec version the device supports.
    /// E.g. `1.10` is represented by `0x110`.
    pub bcd_usb: u16,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    /// Maximum packet size for endpoint 0 (only 8, 16, 32, and 64 are valid values)
    pub max_control_packet_size: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    /// Index of string descriptor describing the device's manufacturer.
    pub manufacturer_index: u8,
    pub product_index: u8,
    pub serial_number_index: u8,
    pub num_configurations: u8,
}

#[derive(Clone, Copy, AsBytes)]
#[repr(C, packed)]
pub struct ConfigurationDescriptor {
    pub length: u8,
    pub typ: u8,
    /// Total length of this descriptor plus every interface and endpoint
    /// descriptor served with it in one bundle.
    pub total_length: u16,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub configuration_index: u8,
    pub attributes: u8,
    /// In units of 2 mA.
    pub max_power: u8,
}

#[derive(Clone, Copy, AsBytes)]
#[repr(C, packed)]
pub struct InterfaceDescriptor {
    pub length: u8,
    pub typ: u8,
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub interface_index: u8,
}

#[derive(Clone, Copy, AsBytes)]
#[repr(C, packed)]
pub struct EndpointDescriptor {
    pub length: u8,
    pub typ: u8,
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

/// Transfer-type codes carried in the low two bits of an endpoint
/// descriptor's attributes (and written into the controller's endpoint
/// control register).
pub const TRANSFER_TYPE_CONTROL: u8 = 0b00;
pub const TRANSFER_TYPE_ISOCHRONOUS: u8 = 0b01;
pub const TRANSFER_TYPE_BULK: u8 = 0b10;
pub const TRANSFER_TYPE_INTERRUPT: u8 = 0b11;

impl EndpointDescriptor {
    pub fn address(&self) -> EndpointAddress {
        EndpointAddress::from_bits(self.endpoint_address)
    }

    pub fn transfer_type(&self) -> u8 {
        self.attributes & 0b11
    }
}
