use crate::protocol::{self, CommandHeader, COMMAND_RECV_SIZE};
use crate::{Result, SuearError};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reply to a command request.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub header: CommandHeader,
    pub payload: Vec<u8>,
}

impl CommandResponse {
    /// Fail with [`SuearError::DeviceError`] unless the device reported success.
    pub fn check(self) -> Result<Self> {
        match self.header.err_code {
            0 => Ok(self),
            code => Err(SuearError::DeviceError(code)),
        }
    }
}

/// Wrapping 16-bit request id shared by every channel talking to one camera.
///
/// The camera expects ids to keep increasing across sockets, so channels
/// draw from one counter instead of each starting over.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU16);

impl SequenceCounter {
    pub const fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    /// Counter whose next id is `last + 1`.
    pub const fn starting_after(last: u16) -> Self {
        Self(AtomicU16::new(last))
    }

    /// Most recently issued id, 0 before the first request.
    pub fn last(&self) -> u16 {
        self.0.load(Ordering::Acquire)
    }

    pub fn next(&self) -> u16 {
        self.0.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }
}

/// Request/response transport over a connected UDP socket.
///
/// One request is in flight at a time and replies are matched positionally;
/// each request carries a wrapping 16-bit sequence id the device echoes back.
pub struct CommandChannel {
    socket: UdpSocket,
    counter: Arc<SequenceCounter>,
    seq: u16,
}

impl CommandChannel {
    /// Bind an ephemeral local port and connect it to `device`, with a
    /// sequence counter of its own.
    pub fn connect(device: SocketAddr, timeout: Duration) -> Result<Self> {
        Self::connect_with(device, timeout, Arc::new(SequenceCounter::new()))
    }

    /// Like [`connect`](Self::connect), but ids come from a shared `counter`.
    ///
    /// The connected socket only accepts datagrams from `device`, and every
    /// receive gives up after `timeout`.
    pub fn connect_with(
        device: SocketAddr,
        timeout: Duration,
        counter: Arc<SequenceCounter>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(device)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(Self {
            socket,
            counter,
            seq: 0,
        })
    }

    /// Sequence id used by this channel's most recent request.
    pub fn seq(&self) -> u16 {
        self.seq
    }

    fn next_seq(&mut self) -> u16 {
        self.seq = self.counter.next();
        self.seq
    }

    /// Send one request and wait for its reply.
    ///
    /// 1. Builds `[header, payload]` with the next sequence id
    /// 2. Sends it to the connected device
    /// 3. Receives a single datagram (bounded by the read timeout)
    /// 4. Validates magic and declared payload length, with no leftover bytes
    pub fn request(&mut self, msg_type: u16, payload: &[u8]) -> Result<CommandResponse> {
        let seq = self.next_seq();
        let send_buf = protocol::build_command(seq, msg_type, payload)?;
        self.socket.send(&send_buf)?;

        let mut recv_buf = [0u8; COMMAND_RECV_SIZE];
        let len = self.socket.recv(&mut recv_buf).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => SuearError::Timeout,
            _ => SuearError::Io(e),
        })?;

        let (header, body) = protocol::parse_response(&recv_buf[..len])?;
        if header.seq != seq {
            log::debug!(
                "Response sequence {} does not echo request {} (type 0x{:02x})",
                header.seq,
                seq,
                msg_type
            );
        }

        Ok(CommandResponse {
            header,
            payload: body.to_vec(),
        })
    }

    /// Ask the device to start pushing video to this host.
    pub fn start_video(&mut self) -> Result<()> {
        self.request(protocol::MSG_START_VIDEO, &[])?.check()?;
        Ok(())
    }

    /// Fetch the raw device-info record.
    ///
    /// Also serves as the reachability probe behind `/status`.
    pub fn device_info(&mut self) -> Result<Vec<u8>> {
        Ok(self.request(protocol::MSG_DEVICE_INFO, &[])?.check()?.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;

    #[test]
    fn test_request_roundtrip_increments_sequence() {
        let device = FakeDevice::spawn(0, b"info".to_vec());
        let mut channel = CommandChannel::connect(device.addr(), Duration::from_secs(1)).unwrap();

        assert_eq!(channel.device_info().unwrap(), b"info");
        assert_eq!(channel.seq(), 1);
        channel.start_video().unwrap();
        assert_eq!(channel.seq(), 2);

        let seen = device.requests();
        assert_eq!(seen[0].msg_type, protocol::MSG_DEVICE_INFO);
        assert_eq!(seen[1].msg_type, protocol::MSG_START_VIDEO);
        assert_eq!(seen[1].seq, 2);
    }

    #[test]
    fn test_sequence_wraps_at_16_bits() {
        let device = FakeDevice::spawn(0, Vec::new());
        let counter = Arc::new(SequenceCounter::starting_after(u16::MAX));
        let mut channel =
            CommandChannel::connect_with(device.addr(), Duration::from_secs(1), counter).unwrap();
        channel.start_video().unwrap();
        assert_eq!(channel.seq(), 0);
        channel.start_video().unwrap();
        assert_eq!(channel.seq(), 1);
    }

    #[test]
    fn test_shared_counter_spans_channels() {
        let device = FakeDevice::spawn(0, Vec::new());
        let counter = Arc::new(SequenceCounter::new());
        for _ in 0..3 {
            let mut channel =
                CommandChannel::connect_with(device.addr(), Duration::from_secs(1), counter.clone())
                    .unwrap();
            channel.start_video().unwrap();
        }
        let seqs: Vec<u16> = device.requests().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(counter.last(), 3);
    }

    #[test]
    fn test_nonzero_error_code_is_device_error() {
        let device = FakeDevice::spawn(3, Vec::new());
        let mut channel = CommandChannel::connect(device.addr(), Duration::from_secs(1)).unwrap();
        assert!(matches!(
            channel.start_video(),
            Err(SuearError::DeviceError(3))
        ));
    }

    #[test]
    fn test_silent_device_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut channel =
            CommandChannel::connect(silent.local_addr().unwrap(), Duration::from_millis(50))
                .unwrap();
        assert!(matches!(channel.start_video(), Err(SuearError::Timeout)));
    }
}
