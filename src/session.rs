use crate::command::{CommandChannel, SequenceCounter};
use crate::config::BridgeConfig;
use crate::pool::FrameSlotPool;
use crate::reader::ChunkReader;
use crate::types::{JpegFrame, SessionState};
use crate::{Result, SuearError};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Single-slot cell holding the newest complete frame.
///
/// The reader thread is the only writer. Frames are swapped in whole, so a
/// viewer sees either the previous frame or the new one, never a partial
/// write. The lock is only held long enough to clone or replace an `Arc`.
pub struct LatestFrame {
    slot: RwLock<Option<Arc<JpegFrame>>>,
}

impl LatestFrame {
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub fn publish(&self, frame: JpegFrame) {
        let frame = Arc::new(frame);
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    pub fn get(&self) -> Option<Arc<JpegFrame>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Default for LatestFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the start/stop transitions touch. Only modified while the
/// lifecycle lock is held.
struct Lifecycle {
    clients: usize,
    reader: Option<ChunkReader>,
    /// Pool handed back by the last reader, reused by the next one.
    pool: Option<FrameSlotPool>,
    /// Receive port that worked last time, tried first on restart.
    recv_port: Option<u16>,
}

/// The one video session shared by every HTTP viewer of a camera.
///
/// The first [`attach`](StreamSession::attach) starts the camera stream and
/// the reader thread; dropping the last [`Viewer`] tears both down again.
/// Attach and detach are serialized by a single lock held across the whole
/// transition, so concurrent viewers never start the stream twice and a new
/// viewer arriving mid-teardown waits for the session to reach `Idle` first.
pub struct StreamSession {
    config: BridgeConfig,
    lifecycle: Mutex<Lifecycle>,
    state: Mutex<SessionState>,
    latest: Arc<LatestFrame>,
    streaming: Arc<AtomicBool>,
    clients: AtomicUsize,
    /// Request ids for every command sent on behalf of this camera.
    commands: Arc<SequenceCounter>,
}

impl StreamSession {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            lifecycle: Mutex::new(Lifecycle {
                clients: 0,
                reader: None,
                pool: None,
                recv_port: None,
            }),
            state: Mutex::new(SessionState::Idle),
            latest: Arc::new(LatestFrame::new()),
            streaming: Arc::new(AtomicBool::new(false)),
            clients: AtomicUsize::new(0),
            commands: Arc::new(SequenceCounter::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Fresh command socket to `addr` whose ids continue this session's
    /// request sequence.
    pub fn command_channel(&self, addr: SocketAddr) -> Result<CommandChannel> {
        CommandChannel::connect_with(addr, self.config.command_timeout, self.commands.clone())
    }

    /// Query the camera's device info over the command port.
    ///
    /// Also the reachability check behind `/status`.
    pub fn device_info(&self) -> Result<Vec<u8>> {
        self.command_channel(self.config.command_addr())?
            .device_info()
    }

    /// Join the session, starting the camera stream if this is the first
    /// viewer. The returned guard detaches when dropped.
    ///
    /// On failure the session stays `Idle` with no viewers counted.
    pub fn attach(&self) -> Result<Viewer<'_>> {
        let mut lc = self.lock_lifecycle();

        if lc.clients == 0 {
            self.set_state(SessionState::Starting);
            if let Err(e) = self.start(&mut lc) {
                log::warn!("Video stream unavailable: {}", e);
                self.streaming.store(false, Ordering::Release);
                self.set_state(SessionState::Idle);
                return Err(e);
            }
            self.set_state(SessionState::Streaming);
        }

        lc.clients += 1;
        self.clients.store(lc.clients, Ordering::Release);
        log::info!("Stream client connected ({} total)", lc.clients);
        Ok(Viewer { session: self })
    }

    /// Leave the session; the last viewer out stops the stream.
    pub(crate) fn detach(&self) {
        let mut lc = self.lock_lifecycle();

        if lc.clients == 0 {
            log::warn!("Detach with no attached viewers");
            return;
        }
        lc.clients -= 1;
        self.clients.store(lc.clients, Ordering::Release);
        log::info!("Stream client left ({} remaining)", lc.clients);

        if lc.clients == 0 {
            self.stop(&mut lc);
        }
    }

    /// Replace the newest frame. Never waits on viewers for longer than an
    /// `Arc` clone.
    pub fn publish(&self, frame: JpegFrame) {
        self.latest.publish(frame);
    }

    /// Newest complete frame, if any arrived since the stream started.
    pub fn latest(&self) -> Option<Arc<JpegFrame>> {
        self.latest.get()
    }

    /// Number of attached viewers. Lock-free, for status endpoints.
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False once the session stops or the reader loses its socket.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Video receive port remembered from the last successful bind.
    pub fn recv_port(&self) -> Option<u16> {
        self.lock_lifecycle().recv_port
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Idle -> Streaming: ask the camera for video, bind, start the reader.
    fn start(&self, lc: &mut Lifecycle) -> Result<()> {
        log::info!("Starting video stream from camera...");

        if let Some(reader) = lc.reader.take() {
            // Left over from a reader that lost its socket.
            lc.pool = reader.stop(self.config.join_timeout);
        }

        self.command_channel(self.config.stream_init_addr())?
            .start_video()?;

        let socket = self.bind_stream_socket(lc)?;
        let port = lc.recv_port.unwrap_or(0);

        let mut pool = lc.pool.take().unwrap_or_else(|| {
            FrameSlotPool::new(self.config.pool_capacity, self.config.frame_capacity)
        });
        pool.clear();

        self.streaming.store(true, Ordering::Release);
        let reader = ChunkReader::start(
            socket,
            pool,
            self.latest.clone(),
            self.streaming.clone(),
            self.config.reader_poll,
        )?;
        lc.reader = Some(reader);

        log::info!("Video stream started on port {}", port);
        Ok(())
    }

    /// Bind the video socket: sticky port (or the candidate list) first,
    /// then one more pass over the full candidate list after a short pause.
    fn bind_stream_socket(&self, lc: &mut Lifecycle) -> Result<UdpSocket> {
        let first_pass = match lc.recv_port {
            Some(port) => vec![port],
            None => self.config.recv_ports.clone(),
        };
        if let Some(socket) = try_bind(&first_pass, lc) {
            return Ok(socket);
        }

        log::warn!(
            "Failed to bind stream socket on {:?}; retrying in {:?}",
            first_pass,
            self.config.bind_retry_delay
        );
        std::thread::sleep(self.config.bind_retry_delay);

        try_bind(&self.config.recv_ports, lc)
            .ok_or_else(|| SuearError::BindFailed(self.config.recv_ports.clone()))
    }

    /// Streaming -> Idle. The recv port stays sticky for the next start.
    fn stop(&self, lc: &mut Lifecycle) {
        self.set_state(SessionState::Stopping);
        log::info!("All clients disconnected, stopping video stream...");

        self.streaming.store(false, Ordering::Release);
        if let Some(reader) = lc.reader.take() {
            match reader.stop(self.config.join_timeout) {
                Some(mut pool) => {
                    pool.clear();
                    lc.pool = Some(pool);
                }
                None => log::warn!("Abandoning video reader; next session gets a fresh pool"),
            }
        }
        self.latest.clear();

        // Give the OS time to release the UDP port.
        std::thread::sleep(self.config.settle_delay);
        self.set_state(SessionState::Idle);
        log::info!("Video stream stopped and cleaned up");
    }
}

fn try_bind(ports: &[u16], lc: &mut Lifecycle) -> Option<UdpSocket> {
    for &port in ports {
        log::info!("Attempting to bind stream socket on port {}...", port);
        match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(socket) => {
                let bound = socket.local_addr().map(|a| a.port()).unwrap_or(port);
                lc.recv_port = Some(bound);
                return Some(socket);
            }
            Err(e) => log::warn!("Failed to bind to port {}: {}", port, e),
        }
    }
    None
}

/// Proof of attachment to a [`StreamSession`]; detaches on drop.
pub struct Viewer<'a> {
    session: &'a StreamSession,
}

impl<'a> Viewer<'a> {
    pub fn session(&self) -> &'a StreamSession {
        self.session
    }
}

impl Drop for Viewer<'_> {
    fn drop(&mut self) {
        self.session.detach();
    }
}
