//! Loopback stand-ins for the camera, shared by unit tests.

use crate::config::BridgeConfig;
use crate::protocol::{self, ChunkHeader, CommandHeader, CHUNK_SIZE};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Answers command requests on a loopback UDP port from a helper thread.
pub struct FakeDevice {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CommandHeader>>>,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl FakeDevice {
    /// Reply to every request with `err_code` and `payload`.
    pub fn spawn(err_code: u8, payload: Vec<u8>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let seen = requests.clone();
        let stop_clone = stop.clone();
        let thread = std::thread::spawn(move || {
            let mut buf = [0u8; protocol::COMMAND_RECV_SIZE];
            while !stop_clone.load(Ordering::Relaxed) {
                let (len, from) = match socket.recv_from(&mut buf) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let Ok(request) = CommandHeader::parse(&buf[..len]) else {
                    continue;
                };
                seen.lock().unwrap().push(request);

                let mut reply = CommandHeader {
                    seq: request.seq,
                    msg_type: request.msg_type,
                    direction: 2,
                    err_code,
                    length: payload.len() as u16,
                }
                .to_bytes()
                .to_vec();
                reply.extend_from_slice(&payload);
                let _ = socket.send_to(&reply, from);
            }
        });

        Self {
            addr,
            requests,
            stop,
            thread: Some(thread),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn requests(&self) -> Vec<CommandHeader> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, msg_type: u16) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.msg_type == msg_type)
            .count()
    }

    /// Bridge configuration pointing every command port at this device.
    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            device: Ipv4Addr::LOCALHOST,
            command_port: self.addr.port(),
            stream_init_port: self.addr.port(),
            recv_ports: vec![0],
            http_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            command_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(2),
            bind_retry_delay: Duration::from_millis(10),
            settle_delay: Duration::from_millis(10),
            reader_poll: Duration::from_millis(10),
            ..BridgeConfig::default()
        }
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Chunk `jpeg` the way the camera does and return one datagram per chunk.
pub fn frame_datagrams(frame_id: u32, jpeg: &[u8]) -> Vec<Vec<u8>> {
    let pieces: Vec<&[u8]> = jpeg.chunks(CHUNK_SIZE).collect();
    let total = pieces.len() as u16;
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let header = ChunkHeader {
                frame_id,
                chunk_id: i as u8,
                width: 640,
                height: 480,
                total_chunks: if i + 1 == pieces.len() { total } else { 0 },
                position: None,
            };
            let mut datagram = header.to_bytes().to_vec();
            datagram.extend_from_slice(piece);
            datagram
        })
        .collect()
}

/// Send a whole frame to the bridge's video port on loopback.
pub fn send_frame(port: u16, frame_id: u32, jpeg: &[u8]) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    for datagram in frame_datagrams(frame_id, jpeg) {
        socket.send_to(&datagram, (Ipv4Addr::LOCALHOST, port)).unwrap();
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// A fake JPEG of `len` bytes with SOI/EOI markers.
pub fn jpeg(len: usize, fill: u8) -> Vec<u8> {
    let mut data = vec![fill; len.max(4)];
    data[0] = 0xFF;
    data[1] = 0xD8;
    let n = data.len();
    data[n - 2] = 0xFF;
    data[n - 1] = 0xD9;
    data
}
