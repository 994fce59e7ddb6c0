use crate::pool::FrameSlotPool;
use crate::protocol::{Chunks, UDP_READ_SIZE};
use crate::session::LatestFrame;
use crate::{Result, SuearError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handle to the background thread reassembling video for one session.
///
/// The thread owns the video socket and the frame pool for as long as it
/// runs. On exit it drops (closes) the socket and hands the pool back so the
/// next session can reuse its buffers.
pub struct ChunkReader {
    running: Arc<AtomicBool>,
    done: Receiver<FrameSlotPool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ChunkReader {
    /// Start reading `socket` on a new thread.
    ///
    /// `streaming` is the session-wide flag viewers watch; the reader clears
    /// it if the socket fails so viewers wind down and the session can be
    /// restarted by the next attach.
    pub(crate) fn start(
        socket: UdpSocket,
        pool: FrameSlotPool,
        latest: Arc<LatestFrame>,
        streaming: Arc<AtomicBool>,
        poll: Duration,
    ) -> Result<ChunkReader> {
        // A finite read timeout lets the loop notice the stop flag.
        socket.set_read_timeout(Some(poll))?;

        let (sender, done) = crossbeam_channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread = std::thread::Builder::new()
            .name("suear-video".into())
            .spawn(move || {
                let pool = reader_loop(socket, pool, &latest, &running_clone, &streaming);
                let _ = sender.send(pool);
            })
            .map_err(|e| SuearError::ThreadSpawn(format!("video reader: {}", e)))?;

        Ok(ChunkReader {
            running,
            done,
            thread: Some(thread),
        })
    }

    /// Check if the reader thread is still receiving.
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the reader and wait up to `timeout` for it to finish.
    ///
    /// Returns the frame pool, or `None` if the thread missed the deadline;
    /// such a thread is left detached and will exit on its next wakeup.
    pub fn stop(mut self, timeout: Duration) -> Option<FrameSlotPool> {
        self.running.store(false, Ordering::Release);
        let thread = self.thread.take();
        match self.done.recv_timeout(timeout) {
            Ok(pool) => {
                if let Some(thread) = thread {
                    let _ = thread.join();
                }
                Some(pool)
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Video reader did not stop within {:?}", timeout);
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("Video reader exited without returning its frame pool");
                if let Some(thread) = thread {
                    let _ = thread.join();
                }
                None
            }
        }
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// The reader loop runs in a dedicated thread until told to stop or the
/// socket fails. Receive errors are never retried here.
fn reader_loop(
    socket: UdpSocket,
    mut pool: FrameSlotPool,
    latest: &LatestFrame,
    running: &AtomicBool,
    streaming: &AtomicBool,
) -> FrameSlotPool {
    let mut buf = vec![0u8; UDP_READ_SIZE];
    let mut published: u64 = 0;

    match socket.local_addr() {
        Ok(addr) => log::info!("Video reader started on port {}", addr.port()),
        Err(_) => log::info!("Video reader started"),
    }

    while running.load(Ordering::Acquire) {
        let len = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                log::warn!("Video socket receive failed: {}", e);
                if running.swap(false, Ordering::AcqRel) {
                    streaming.store(false, Ordering::Release);
                }
                break;
            }
        };

        if !running.load(Ordering::Acquire) {
            break;
        }
        published += handle_datagram(&mut pool, &buf[..len], latest) as u64;
    }

    running.store(false, Ordering::Release);
    log::info!("Video reader stopped after {} frames", published);
    pool
}

/// Route every chunk packed in `datagram` to its frame and publish any frame
/// that completes. Returns the number of frames published.
pub(crate) fn handle_datagram(
    pool: &mut FrameSlotPool,
    datagram: &[u8],
    latest: &LatestFrame,
) -> usize {
    let mut published = 0;
    let mut chunks = Chunks::new(datagram);

    for (header, payload) in chunks.by_ref() {
        let slot = pool.acquire(&header);
        let result = pool
            .frame_mut(slot)
            .add_chunk(header.chunk_id, payload, header.total_chunks);

        match result {
            Ok(()) => {}
            Err(e @ SuearError::ChunkSizeMismatch { .. }) => {
                log::warn!("Abandoning frame {}: {}", header.frame_id, e);
                pool.discard(header.frame_id);
                continue;
            }
            Err(e) if e.is_protocol() => {
                log::warn!(
                    "Dropping chunk {} of frame {}: {}",
                    header.chunk_id,
                    header.frame_id,
                    e
                );
                continue;
            }
            Err(e) => {
                log::trace!(
                    "Ignoring chunk {} of frame {}: {}",
                    header.chunk_id,
                    header.frame_id,
                    e
                );
                continue;
            }
        }

        if let Some(frame) = pool.publish_if_complete(slot) {
            log::trace!("Reassembled frame {} ({} bytes)", frame.index, frame.data.len());
            latest.publish(frame);
            published += 1;
        }
    }

    if chunks.remainder() > 0 {
        log::warn!(
            "Discarding {} trailing bytes shorter than a chunk header",
            chunks.remainder()
        );
    }
    published
}
