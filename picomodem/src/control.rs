//! Standard-request handling for the modem's enumeration, installed as the
//! driver's setup handler. Requests it does not recognize follow the rule
//! the hardware's reference code uses: host-to-device requests get an empty
//! status stage anyway (NAKing them forever wedges some hosts), and
//! device-to-host requests are left for the driver to stall.

use crate::{
    bridge,
    descriptors,
    device::{DeviceHandle, MAX_PACKET_SIZE},
};
use log::{debug, info};
use usb::{
    descriptor::DescriptorType,
    setup::{Request, SetupPacket},
    Dir,
};
use zerocopy::AsBytes;

pub fn handle_setup(device: &mut DeviceHandle<'_>, setup: &SetupPacket) -> bool {
    match setup.standard_request() {
        Some(Request::GetDescriptor) => get_descriptor(device, setup),
        Some(Request::SetConfiguration) => set_configuration(device, setup),
        Some(Request::GetConfiguration) => {
            let value = if device.is_configured() { 1 } else { 0 };
            device.control_send(&[value]);
            true
        }
        Some(Request::GetStatus) => {
            // Bus powered, no remote wakeup pending.
            device.control_send(&[0, 0]);
            true
        }
        Some(Request::SetInterface) => {
            // One interface with one alternate setting; accepting is all
            // there is to do.
            device.control_send(&[]);
            true
        }
        _ => {
            if setup.direction() == Dir::Out {
                debug!("acknowledging unhandled OUT request {:#04x}", setup.request);
                device.control_send(&[]);
                true
            } else {
                false
            }
        }
    }
}

fn get_descriptor(device: &mut DeviceHandle<'_>, setup: &SetupPacket) -> bool {
    let descriptor: &[u8] = match DescriptorType::from_code((setup.value >> 8) as u8) {
        Some(DescriptorType::Device) => descriptors::DEVICE.as_bytes(),
        Some(DescriptorType::Configuration) => descriptors::CONFIGURATION.as_bytes(),
        Some(DescriptorType::String) => match descriptors::string(setup.value as u8) {
            Some(descriptor) => descriptor,
            None => return false,
        },
        _ => return false,
    };

    // Answer with at most what was asked for; the host follows up if it
    // wants the rest.
    let length = descriptor.len().min(setup.length as usize).min(MAX_PACKET_SIZE);
    device.control_send(&descriptor[..length]);
    true
}

fn set_configuration(device: &mut DeviceHandle<'_>, setup: &SetupPacket) -> bool {
    let value = setup.value as u8;
    if value != 0 {
        device.configure_endpoint(&descriptors::CONFIGURATION.bulk_in, bridge::bulk_in_complete);
        device.configure_endpoint(&descriptors::CONFIGURATION.bulk_out, bridge::bulk_out_complete);
    }
    device.set_configured(value != 0);
    info!("host selected configuration {}", value);
    device.control_send(&[]);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::testing::FakeController,
        dpram::BufferControl,
        reg::{EpStallArm, Ints, Register},
    };
    use usb::EndpointAddress;

    fn sent_bytes(fake: &FakeController) -> std::vec::Vec<u8> {
        let control =
            BufferControl::from_bits_retain(fake.buffer_control_word(EndpointAddress::CONTROL_IN));
        assert!(control.contains(BufferControl::AVAILABLE | BufferControl::FULL));
        fake.buffer_bytes(EndpointAddress::CONTROL_IN, control.length())
    }

    fn run_setup(fake: &mut FakeController, device: &crate::device::UsbDevice, bytes: [u8; 8]) {
        fake.poke_setup(bytes);
        fake.raise(Ints::SETUP_REQ);
        device.interrupt();
    }

    #[test]
    fn serves_the_device_descriptor() {
        let mut fake = FakeController::new();
        let device = fake.device();
        device.set_setup_handler(handle_setup);

        run_setup(&mut fake, &device, [0x80, 0x06, 0x00, 0x01, 0, 0, 18, 0]);
        assert_eq!(sent_bytes(&fake), descriptors::DEVICE.as_bytes());
    }

    #[test]
    fn clamps_descriptor_responses_to_the_requested_length() {
        let mut fake = FakeController::new();
        let device = fake.device();
        device.set_setup_handler(handle_setup);

        // Hosts open with the first nine bytes of the configuration to
        // learn wTotalLength, then come back for the whole bundle.
        run_setup(&mut fake, &device, [0x80, 0x06, 0x00, 0x02, 0, 0, 9, 0]);
        assert_eq!(sent_bytes(&fake), &descriptors::CONFIGURATION.as_bytes()[..9]);

        run_setup(&mut fake, &device, [0x80, 0x06, 0x00, 0x02, 0, 0, 0xff, 0]);
        assert_eq!(sent_bytes(&fake), descriptors::CONFIGURATION.as_bytes());

        run_setup(&mut fake, &device, [0x80, 0x06, 0x02, 0x03, 0, 0, 4, 0]);
        assert_eq!(sent_bytes(&fake), &descriptors::STRING_PRODUCT[..4]);
    }

    #[test]
    fn unknown_string_indices_are_stalled() {
        let mut fake = FakeController::new();
        let device = fake.device();
        device.set_setup_handler(handle_setup);

        run_setup(&mut fake, &device, [0x80, 0x06, 0x07, 0x03, 0, 0, 0xff, 0]);
        assert_eq!(fake.set_alias(Register::EpStallArm), EpStallArm::EP0_IN.bits());
    }

    #[test]
    fn set_configuration_brings_the_bulk_endpoints_up() {
        let mut fake = FakeController::new();
        let device = fake.device();
        device.set_setup_handler(handle_setup);

        assert!(!device.is_configured());
        run_setup(&mut fake, &device, [0x00, 0x09, 1, 0, 0, 0, 0, 0]);

        assert!(device.is_configured());
        assert_ne!(fake.endpoint_control_word(descriptors::CONFIGURATION.bulk_in.address()), 0);
        assert_ne!(fake.endpoint_control_word(descriptors::CONFIGURATION.bulk_out.address()), 0);
        // Acknowledged with an empty status stage.
        assert_eq!(sent_bytes(&fake), &[]);

        run_setup(&mut fake, &device, [0x80, 0x08, 0, 0, 0, 0, 1, 0]);
        assert_eq!(sent_bytes(&fake), &[1]);

        // Value zero returns to the unconfigured state.
        run_setup(&mut fake, &device, [0x00, 0x09, 0, 0, 0, 0, 0, 0]);
        assert!(!device.is_configured());
        run_setup(&mut fake, &device, [0x80, 0x08, 0, 0, 0, 0, 1, 0]);
        assert_eq!(sent_bytes(&fake), &[0]);
    }

    #[test]
    fn get_status_reports_bus_powered_idle() {
        let mut fake = FakeController::new();
        let device = fake.device();
        device.set_setup_handler(handle_setup);

        run_setup(&mut fake, &device, [0x80, 0x00, 0, 0, 0, 0, 2, 0]);
        assert_eq!(sent_bytes(&fake), &[0, 0]);
    }

    #[test]
    fn unknown_out_requests_are_acknowledged_not_stalled() {
        let mut fake = FakeController::new();
        let device = fake.device();
        device.set_setup_handler(handle_setup);

        run_setup(&mut fake, &device, [0x40, 0x99, 0, 0, 0, 0, 0, 0]);
        assert_eq!(fake.set_alias(Register::EpStallArm), 0);
        assert_eq!(sent_bytes(&fake), &[]);
    }

    #[test]
    fn unknown_in_requests_are_stalled() {
        let mut fake = FakeController::new();
        let device = fake.device();
        device.set_setup_handler(handle_setup);

        run_setup(&mut fake, &device, [0xc0, 0x99, 0, 0, 0, 0, 8, 0]);
        assert_eq!(fake.set_alias(Register::EpStallArm), EpStallArm::EP0_IN.bits());
    }
}
