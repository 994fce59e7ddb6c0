/// Errors that can occur while talking to the camera or serving its stream.
#[derive(Debug, thiserror::Error)]
pub enum SuearError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for device response")]
    Timeout,

    #[error("Device returned error code {0}")]
    DeviceError(u8),

    #[error("Invalid message magic: 0x{0:08x}")]
    InvalidMagic(u32),

    #[error("Message truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("Command payload of {0} bytes exceeds the 16-bit length field")]
    PayloadTooLarge(usize),

    #[error("{0} extraneous bytes after declared payload")]
    TrailingBytes(usize),

    #[error("Could not bind stream socket on any of ports {0:?}")]
    BindFailed(Vec<u16>),

    #[error("Chunk added to an already complete frame")]
    FrameComplete,

    #[error("Frame data requested before all chunks arrived")]
    FrameIncomplete,

    #[error("Chunk exceeds frame buffer: end {end} > capacity {capacity}")]
    ChunkOutOfBounds { end: usize, capacity: usize },

    #[error("Chunk size mismatch: frame uses {expected} bytes, got {actual}")]
    ChunkSizeMismatch { expected: usize, actual: usize },

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    #[error("HTTP server error: {0}")]
    Http(String),
}

impl SuearError {
    /// True for errors that come from a malformed message rather than the
    /// transport itself. These are dropped and logged, never retried.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            SuearError::InvalidMagic(_)
                | SuearError::Truncated { .. }
                | SuearError::TrailingBytes(_)
                | SuearError::ChunkOutOfBounds { .. }
                | SuearError::ChunkSizeMismatch { .. }
        )
    }
}
