//! The modem's data plane. Bytes move between the bulk endpoints and a byte
//! transport through two rings: the interrupt side feeds one end of each,
//! the main loop drains the other.
//!
//! Flow control is built into the arming rules rather than signalled: the
//! bulk OUT endpoint is only re-armed while the inbound ring can take a
//! whole packet (un-armed, the hardware NAKs the host until the main loop
//! has drained), and a bulk IN transmit only starts once the previous
//! packet has left the buffer. No byte is dropped on either path.

use crate::{
    descriptors::BULK_ENDPOINT,
    device::{DeviceHandle, UsbDevice, MAX_PACKET_SIZE},
};
use core::sync::atomic::{AtomicBool, Ordering};
use log::trace;
use sync::RingBuffer;
use usb::{Dir, EndpointAddress};

/// Ring capacity per direction, sized for a few dozen full packets.
const RING_BYTES: usize = 2048;

static TO_HOST: RingBuffer<u8, RING_BYTES> = RingBuffer::new();
static FROM_HOST: RingBuffer<u8, RING_BYTES> = RingBuffer::new();

/// Set when a bulk OUT completion found the inbound ring too full to
/// re-arm. The pump re-arms once the ring has drained.
static RECEIVE_HELD: AtomicBool = AtomicBool::new(false);

const BULK_IN: EndpointAddress = EndpointAddress::new(BULK_ENDPOINT, Dir::In);
const BULK_OUT: EndpointAddress = EndpointAddress::new(BULK_ENDPOINT, Dir::Out);

/// Completion callback for the bulk IN endpoint: the previous packet has
/// gone out, so start the next one if bytes are waiting.
pub fn bulk_in_complete(device: &mut DeviceHandle<'_>, _sent: &[u8]) {
    start_transmit(device);
}

/// Completion callback for the bulk OUT endpoint: queue what arrived and
/// re-arm while there is room for another full packet.
pub fn bulk_out_complete(device: &mut DeviceHandle<'_>, data: &[u8]) {
    let queued = FROM_HOST.enqueue(data);
    debug_assert_eq!(queued, data.len());
    arm_receive(device);
}

/// Arms the bulk OUT endpoint if the inbound ring can absorb a full packet,
/// and otherwise leaves it un-armed with a note for the pump. The arming
/// rule is what makes `bulk_out_complete`'s enqueue lossless.
pub fn arm_receive(device: &mut DeviceHandle<'_>) {
    if FROM_HOST.free_count() >= MAX_PACKET_SIZE {
        device.receive(BULK_OUT, MAX_PACKET_SIZE);
    } else {
        trace!("inbound ring full, holding bulk OUT");
        RECEIVE_HELD.store(true, Ordering::Relaxed);
    }
}

fn start_transmit(device: &mut DeviceHandle<'_>) {
    if device.is_send_pending(BULK_IN) {
        return;
    }
    let mut packet = [0; MAX_PACKET_SIZE];
    let len = TO_HOST.dequeue(&mut packet);
    if len > 0 {
        device.send(BULK_IN, &packet[..len]);
    }
}

/// Drops all buffered bytes and any held re-arm. Called when the link goes
/// away.
pub fn reset() {
    TO_HOST.clear();
    FROM_HOST.clear();
    RECEIVE_HELD.store(false, Ordering::Relaxed);
}

/// One side of the connection the modem bridges to.
pub trait Transport {
    /// How many bytes `send` would currently accept.
    fn writable(&self) -> usize;
    fn send(&mut self, data: &[u8]) -> usize;
    fn receive(&mut self, out: &mut [u8]) -> usize;
}

/// A transport that hands every byte straight back: the zero-hardware
/// stand-in until a real socket is wired up, and the test double.
pub struct Loopback {
    queue: RingBuffer<u8, RING_BYTES>,
}

impl Loopback {
    pub const fn new() -> Loopback {
        Loopback { queue: RingBuffer::new() }
    }
}

impl Transport for Loopback {
    fn writable(&self) -> usize {
        self.queue.free_count()
    }

    fn send(&mut self, data: &[u8]) -> usize {
        self.queue.enqueue(data)
    }

    fn receive(&mut self, out: &mut [u8]) -> usize {
        self.queue.dequeue(out)
    }
}

/// Moves bytes between the rings and the transport and keeps the endpoints
/// armed. Called repeatedly from the main loop, never from interrupt
/// context.
pub fn pump(device: &UsbDevice, transport: &mut impl Transport) {
    let mut chunk = [0; MAX_PACKET_SIZE];

    // Host to transport.
    loop {
        let want = transport.writable().min(chunk.len());
        if want == 0 {
            break;
        }
        let len = FROM_HOST.dequeue(&mut chunk[..want]);
        if len == 0 {
            break;
        }
        let sent = transport.send(&chunk[..len]);
        debug_assert_eq!(sent, len);
    }

    // Transport to host.
    loop {
        let space = TO_HOST.free_count().min(chunk.len());
        if space == 0 {
            break;
        }
        let len = transport.receive(&mut chunk[..space]);
        if len == 0 {
            break;
        }
        let queued = TO_HOST.enqueue(&chunk[..len]);
        debug_assert_eq!(queued, len);
    }

    device.with(|device| {
        if !device.is_configured() {
            return;
        }
        if RECEIVE_HELD.load(Ordering::Relaxed) && FROM_HOST.free_count() >= MAX_PACKET_SIZE {
            RECEIVE_HELD.store(false, Ordering::Relaxed);
            device.receive(BULK_OUT, MAX_PACKET_SIZE);
        }
        start_transmit(device);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::testing::FakeController, dpram::BufferControl};

    fn armed(fake: &FakeController, ep: EndpointAddress) -> bool {
        BufferControl::from_bits_retain(fake.buffer_control_word(ep))
            .contains(BufferControl::AVAILABLE)
    }

    // The rings are shared statics, so the whole path runs as one
    // sequential scenario.
    #[test]
    fn bytes_flow_host_to_transport_and_back_with_backpressure() {
        let mut fake = FakeController::new();
        let device = fake.device();
        device.with(|device| {
            device.configure_endpoint(&crate::descriptors::CONFIGURATION.bulk_in, bulk_in_complete);
            device
                .configure_endpoint(&crate::descriptors::CONFIGURATION.bulk_out, bulk_out_complete);
            device.set_configured(true);
            arm_receive(device);
        });
        assert!(armed(&fake, BULK_OUT));

        // The host sends a dial command on bulk OUT.
        fake.poke_buffer(BULK_OUT, b"ATDT5551234");
        fake.poke_buffer_control(BULK_OUT, BufferControl::with_length(11).bits());
        fake.raise_buffers(1 << BULK_OUT.index().as_usize());
        device.interrupt();

        // The completion queued the bytes and re-armed the endpoint.
        assert_eq!(FROM_HOST.occupied_count(), 11);
        assert!(armed(&fake, BULK_OUT));

        // The pump walks them through the loopback and back out on bulk IN.
        let mut transport = Loopback::new();
        pump(&device, &mut transport);
        assert_eq!(FROM_HOST.occupied_count(), 0);
        assert!(device.is_send_pending(BULK_IN));
        assert_eq!(fake.buffer_bytes(BULK_IN, 11), b"ATDT5551234");

        // Completing that transmit with nothing queued arms no other.
        fake.poke_buffer_control(BULK_IN, 0);
        fake.raise_buffers(1 << BULK_IN.index().as_usize());
        device.interrupt();
        assert!(!device.is_send_pending(BULK_IN));

        // Fill the inbound ring until a packet no longer fits; the next
        // completion must leave the endpoint un-armed (the hardware then
        // NAKs the host) rather than lose bytes.
        let silence = [0; MAX_PACKET_SIZE];
        while FROM_HOST.free_count() >= MAX_PACKET_SIZE {
            FROM_HOST.enqueue(&silence);
        }
        fake.poke_buffer(BULK_OUT, b"more");
        fake.poke_buffer_control(BULK_OUT, BufferControl::with_length(4).bits());
        fake.raise_buffers(1 << BULK_OUT.index().as_usize());
        device.interrupt();
        assert!(!armed(&fake, BULK_OUT));

        // Draining through the pump re-arms it.
        pump(&device, &mut transport);
        assert!(armed(&fake, BULK_OUT));

        reset();
        assert_eq!(FROM_HOST.occupied_count(), 0);
        assert_eq!(TO_HOST.occupied_count(), 0);
    }

    #[test]
    fn loopback_echoes_in_order() {
        let mut transport = Loopback::new();
        assert_eq!(transport.send(b"AT"), 2);
        let mut out = [0; 4];
        assert_eq!(transport.receive(&mut out), 2);
        assert_eq!(&out[..2], b"AT");
        assert_eq!(transport.receive(&mut out), 0);
    }
}
