use crate::protocol::ChunkHeader;
use crate::types::{JpegFrame, Position};
use crate::{Result, SuearError};

/// Reassembly buffer for one JPEG frame.
///
/// The buffer is allocated once and reused for every frame that passes
/// through this slot; [`Frame::init`] only resets the bookkeeping.
pub struct Frame {
    buf: Box<[u8]>,
    index: u32,
    width: u16,
    height: u16,
    position: Option<Position>,
    first_chunk_id: u8,
    chunk_size: Option<usize>,
    total_chunks: Option<u16>,
    acquired: usize,
    complete: bool,
}

impl Frame {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            index: 0,
            width: 0,
            height: 0,
            position: None,
            first_chunk_id: 0,
            chunk_size: None,
            total_chunks: None,
            acquired: 0,
            complete: false,
        }
    }

    /// Start assembling a new frame, taking identity from its first chunk.
    pub fn init(&mut self, header: &ChunkHeader) {
        self.index = header.frame_id;
        self.width = header.width;
        self.height = header.height;
        self.position = header.position;
        self.first_chunk_id = header.chunk_id;
        self.chunk_size = None;
        self.total_chunks = None;
        self.acquired = 0;
        self.complete = false;
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn acquired(&self) -> usize {
        self.acquired
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Write one chunk's payload into place.
    ///
    /// `final_total` is 0 for ordinary chunks and the frame's chunk count on
    /// the last one. Chunk ids are 8 bits and wrap inside a frame, so an id
    /// below the first one seen is taken to be 256 further along.
    ///
    /// Rejected chunks leave the frame untouched.
    pub fn add_chunk(&mut self, chunk_id: u8, payload: &[u8], final_total: u16) -> Result<()> {
        if self.complete {
            return Err(SuearError::FrameComplete);
        }

        let chunk_size = match (self.chunk_size, final_total) {
            (Some(expected), 0) if expected != payload.len() => {
                return Err(SuearError::ChunkSizeMismatch {
                    expected,
                    actual: payload.len(),
                });
            }
            (Some(expected), _) => expected,
            // The final chunk arrived before any other; its length is the
            // best guess available.
            (None, _) => payload.len(),
        };

        let mut id = chunk_id as usize;
        if chunk_id < self.first_chunk_id {
            id += 256;
        }
        let start = chunk_size * (id - self.first_chunk_id as usize);
        let end = start + payload.len();
        if end > self.buf.len() {
            return Err(SuearError::ChunkOutOfBounds {
                end,
                capacity: self.buf.len(),
            });
        }

        self.buf[start..end].copy_from_slice(payload);
        self.chunk_size = Some(chunk_size);
        self.acquired += payload.len();
        if final_total != 0 {
            self.total_chunks = Some(final_total);
        }
        if let Some(total) = self.total_chunks {
            // A final chunk is never longer than chunk_size, so anything past
            // the first total-1 chunks means every chunk is in.
            self.complete = self.acquired > chunk_size * (total as usize - 1);
        }
        Ok(())
    }

    /// Assembled JPEG bytes. Only available once the frame is complete.
    pub fn data(&self) -> Result<&[u8]> {
        if !self.complete {
            return Err(SuearError::FrameIncomplete);
        }
        Ok(&self.buf[..self.acquired])
    }

    /// Copy the completed frame out of the slot for publication.
    pub fn snapshot(&self) -> Result<JpegFrame> {
        Ok(JpegFrame {
            index: self.index,
            width: self.width,
            height: self.height,
            position: self.position,
            data: self.data()?.to_vec(),
        })
    }
}
