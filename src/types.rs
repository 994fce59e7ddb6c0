use std::fmt;

/// Camera pose reported alongside a frame by models with motion sensing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A fully reassembled JPEG image, as handed to HTTP viewers.
///
/// Published frames are immutable copies taken from a pool slot at the moment
/// the slot completed, so a viewer never observes a buffer the reader is
/// still writing into.
#[derive(Clone, PartialEq, Eq)]
pub struct JpegFrame {
    /// Frame sequence number assigned by the device.
    pub index: u32,
    pub width: u16,
    pub height: u16,
    pub position: Option<Position>,
    pub data: Vec<u8>,
}

impl fmt::Debug for JpegFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JpegFrame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("position", &self.position)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Lifecycle of the shared video session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No viewers, no socket, no reader thread.
    Idle,
    /// First viewer attached; asking the device to start sending video.
    Starting,
    /// Reader thread running and publishing frames.
    Streaming,
    /// Last viewer left; tearing down the reader and socket.
    Stopping,
}

bitflags::bitflags! {
    /// Flags byte carried in every video chunk header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChunkFlags: u8 {
        /// Bytes [12..24] of the header hold a valid x/y/z position.
        const HAS_POSITION = 1 << 0;
    }
}
