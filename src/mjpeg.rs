//! Motion JPEG over HTTP.
//!
//! A stream response is `multipart/x-mixed-replace`: browsers showing it in an
//! `<img>` tag replace the picture with every part that arrives. Each viewer
//! gets its own [`StreamHandler`] polling the session's newest frame.

use crate::session::{StreamSession, Viewer};
use crate::types::JpegFrame;
use crate::Result;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// Multipart boundary token.
pub const BOUNDARY: &str = "SP-LaputanMachine";

/// Headers sent once at the start of every stream response.
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    (
        "Cache-Control",
        "no-store, no-cache, must-revalidate, pre-check=0, post-check=0, max-age=0",
    ),
    ("Pragma", "no-cache"),
    ("Access-Control-Allow-Origin", "*"),
];

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace;boundary={}", BOUNDARY)
}

/// Status line and headers for a stream response written straight to the
/// connection.
pub fn response_head() -> String {
    let mut head = String::from("HTTP/1.1 200 OK\r\n");
    for (name, value) in STREAM_HEADERS {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!("Content-Type: {}\r\n", content_type()));
    head.push_str("Connection: close\r\n\r\n");
    head
}

/// Write one multipart section carrying `frame`.
pub fn write_part<W: Write + ?Sized>(out: &mut W, frame: &JpegFrame) -> io::Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    write!(
        out,
        "--{}\r\nX-Timestamp: {:.6}\r\nContent-Length: {}\r\nContent-Type: image/jpeg\r\n\r\n",
        BOUNDARY,
        timestamp,
        frame.data.len()
    )?;
    out.write_all(&frame.data)?;
    out.write_all(b"\r\n")?;
    out.flush()
}

/// Feeds one HTTP viewer from a [`StreamSession`].
///
/// Holding a handler keeps the viewer attached; dropping it detaches, however
/// the stream ended.
pub struct StreamHandler<'a> {
    viewer: Viewer<'a>,
    last_index: Option<u32>,
    sent: u64,
}

impl<'a> StreamHandler<'a> {
    /// Attach a new viewer, starting the camera stream if needed.
    pub fn attach(session: &'a StreamSession) -> Result<Self> {
        Ok(Self {
            viewer: session.attach()?,
            last_index: None,
            sent: 0,
        })
    }

    /// Frames written to this viewer so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Write the newest frame unless this viewer already has it.
    ///
    /// Returns whether a part was written.
    pub fn poll_once<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<bool> {
        let Some(frame) = self.viewer.session().latest() else {
            return Ok(false);
        };
        if self.last_index == Some(frame.index) {
            return Ok(false);
        }
        write_part(out, &frame)?;
        self.last_index = Some(frame.index);
        self.sent += 1;
        Ok(true)
    }

    /// Stream until the session stops or the viewer goes away, then detach.
    pub fn serve<W: Write + ?Sized>(mut self, out: &mut W) {
        let session = self.viewer.session();
        let poll = session.config().poll_interval;

        if let Err(e) = out
            .write_all(response_head().as_bytes())
            .and_then(|()| out.flush())
        {
            log::info!("Stream client disconnected before headers: {}", e);
            return;
        }

        while session.is_streaming() {
            match self.poll_once(out) {
                Ok(true) => {}
                Ok(false) => std::thread::sleep(poll),
                Err(e) => {
                    log::info!("Stream client disconnected: {}", e);
                    break;
                }
            }
        }
        log::debug!("Stream handler finished after {} frames", self.sent);
    }
}
