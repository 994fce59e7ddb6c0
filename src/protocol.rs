use crate::types::{ChunkFlags, Position};
use crate::{Result, SuearError};

// -- UDP ports --
pub const COMMAND_PORT: u16 = 10005;
pub const STREAM_INIT_PORT: u16 = 10006;
/// Video is pushed to one of these, depending on camera model.
pub const STREAM_RECV_PORTS: [u16; 2] = [22789, 22785];

// -- Command message geometry --
/// Little-endian 0xFFEEFFEE, i.e. `EE FF EE FF` on the wire.
pub const MAGIC: u32 = 0xFFEE_FFEE;
pub const COMMAND_HEADER_SIZE: usize = 12;
pub const DIRECTION_REQUEST: u8 = 1;
/// Largest command response we accept in one datagram.
pub const COMMAND_RECV_SIZE: usize = 0x1000;

// -- Command message types --
pub const MSG_DEVICE_INFO: u16 = 0x01;
pub const MSG_LICENSE: u16 = 0x02;
pub const MSG_START_VIDEO: u16 = 0x04;
pub const MSG_CAMERA_CONFIG: u16 = 0x0C;

// -- Video chunk geometry --
pub const CHUNK_HEADER_SIZE: usize = 24;
/// Payload size of every chunk except possibly the last one of a frame.
pub const CHUNK_SIZE: usize = 1456;
/// Capacity of one reassembly buffer; larger frames are dropped.
pub const FRAME_BUFFER_SIZE: usize = 128 * 1024;
/// Scratch buffer for one video datagram.
pub const UDP_READ_SIZE: usize = 8192;

/// Fixed header in front of every command request and response.
///
/// Layout (little-endian):
/// - `[0..4]`: magic `0xFFEEFFEE`
/// - `[4..6]`: sequence id, echoed by the device
/// - `[6..8]`: message type
/// - `[8]`: direction (1 = host request)
/// - `[9]`: error code (0 = success)
/// - `[10..12]`: length of the payload that follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub seq: u16,
    pub msg_type: u16,
    pub direction: u8,
    pub err_code: u8,
    pub length: u16,
}

impl CommandHeader {
    pub fn request(seq: u16, msg_type: u16, length: u16) -> Self {
        Self {
            seq,
            msg_type,
            direction: DIRECTION_REQUEST,
            err_code: 0,
            length,
        }
    }

    pub fn to_bytes(&self) -> [u8; COMMAND_HEADER_SIZE] {
        let mut buf = [0u8; COMMAND_HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&self.seq.to_le_bytes());
        buf[6..8].copy_from_slice(&self.msg_type.to_le_bytes());
        buf[8] = self.direction;
        buf[9] = self.err_code;
        buf[10..12].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < COMMAND_HEADER_SIZE {
            return Err(SuearError::Truncated {
                needed: COMMAND_HEADER_SIZE,
                got: data.len(),
            });
        }
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != MAGIC {
            return Err(SuearError::InvalidMagic(magic));
        }
        Ok(Self {
            seq: u16::from_le_bytes([data[4], data[5]]),
            msg_type: u16::from_le_bytes([data[6], data[7]]),
            direction: data[8],
            err_code: data[9],
            length: u16::from_le_bytes([data[10], data[11]]),
        })
    }
}

/// Build a complete request datagram: header followed by `payload`.
///
/// Fails if the payload length does not fit the header's 16-bit field.
pub fn build_command(seq: u16, msg_type: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let length =
        u16::try_from(payload.len()).map_err(|_| SuearError::PayloadTooLarge(payload.len()))?;
    let header = CommandHeader::request(seq, msg_type, length);
    let mut buf = Vec::with_capacity(COMMAND_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Split a response datagram into its header and payload.
///
/// The payload must be exactly as long as the header declares; any leftover
/// bytes make the whole exchange a protocol violation.
pub fn parse_response(data: &[u8]) -> Result<(CommandHeader, &[u8])> {
    let header = CommandHeader::parse(data)?;
    let body = &data[COMMAND_HEADER_SIZE..];
    let len = header.length as usize;
    if body.len() < len {
        return Err(SuearError::Truncated {
            needed: COMMAND_HEADER_SIZE + len,
            got: data.len(),
        });
    }
    if body.len() > len {
        return Err(SuearError::TrailingBytes(body.len() - len));
    }
    Ok((header, body))
}

/// Header in front of every video chunk.
///
/// Layout (little-endian):
/// - `[0..4]`: frame id
/// - `[4]`: chunk id (wraps 255 -> 0 inside a frame)
/// - `[5]`: [`ChunkFlags`]
/// - `[6..8]`, `[8..10]`: width, height
/// - `[10..12]`: total chunk count, non-zero only on a frame's final chunk
/// - `[12..24]`: x/y/z as i32, valid with `HAS_POSITION`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub frame_id: u32,
    pub chunk_id: u8,
    pub width: u16,
    pub height: u16,
    pub total_chunks: u16,
    pub position: Option<Position>,
}

impl ChunkHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < CHUNK_HEADER_SIZE {
            return None;
        }
        let flags = ChunkFlags::from_bits_truncate(data[5]);
        let position = flags.contains(ChunkFlags::HAS_POSITION).then(|| Position {
            x: i32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            y: i32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            z: i32::from_le_bytes([data[20], data[21], data[22], data[23]]),
        });

        Some(Self {
            frame_id: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            chunk_id: data[4],
            width: u16::from_le_bytes([data[6], data[7]]),
            height: u16::from_le_bytes([data[8], data[9]]),
            total_chunks: u16::from_le_bytes([data[10], data[11]]),
            position,
        })
    }

    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[4] = self.chunk_id;
        buf[6..8].copy_from_slice(&self.width.to_le_bytes());
        buf[8..10].copy_from_slice(&self.height.to_le_bytes());
        buf[10..12].copy_from_slice(&self.total_chunks.to_le_bytes());
        if let Some(p) = self.position {
            buf[5] = ChunkFlags::HAS_POSITION.bits();
            buf[12..16].copy_from_slice(&p.x.to_le_bytes());
            buf[16..20].copy_from_slice(&p.y.to_le_bytes());
            buf[20..24].copy_from_slice(&p.z.to_le_bytes());
        }
        buf
    }

    /// True on the last chunk of a frame, the only one carrying a total.
    pub fn is_final(&self) -> bool {
        self.total_chunks != 0
    }
}

/// Iterator over the header/payload pairs packed back to back in one video
/// datagram.
///
/// Stops once fewer than [`CHUNK_HEADER_SIZE`] bytes remain; those bytes are
/// reported by [`Chunks::remainder`] and never carried into the next datagram.
pub struct Chunks<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Chunks<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Bytes left unparsed at the end of the datagram.
    pub fn remainder(&self) -> usize {
        self.buf.len() - self.offset
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = (ChunkHeader, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.offset..];
        let header = ChunkHeader::parse(rest)?;
        let payload_len = (rest.len() - CHUNK_HEADER_SIZE).min(CHUNK_SIZE);
        let payload = &rest[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + payload_len];
        self.offset += CHUNK_HEADER_SIZE + payload_len;
        Some((header, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_video_request_bytes() {
        let buf = build_command(0, MSG_START_VIDEO, &[]).unwrap();
        assert_eq!(
            buf,
            [0xEE, 0xFF, 0xEE, 0xFF, 0x00, 0x00, 0x04, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; u16::MAX as usize + 1];
        assert!(matches!(
            build_command(1, MSG_CAMERA_CONFIG, &payload),
            Err(SuearError::PayloadTooLarge(65536))
        ));
        let max = vec![0u8; u16::MAX as usize];
        let buf = build_command(1, MSG_CAMERA_CONFIG, &max).unwrap();
        assert_eq!(&buf[10..12], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_parse_response_with_payload() {
        let mut resp = CommandHeader {
            seq: 7,
            msg_type: MSG_DEVICE_INFO,
            direction: 2,
            err_code: 0,
            length: 3,
        }
        .to_bytes()
        .to_vec();
        resp.extend_from_slice(b"abc");

        let (header, payload) = parse_response(&resp).unwrap();
        assert_eq!(header.seq, 7);
        assert_eq!(header.err_code, 0);
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn test_parse_response_rejects_leftover_bytes() {
        let mut resp = CommandHeader::request(1, MSG_START_VIDEO, 0).to_bytes().to_vec();
        resp.push(0xAA);
        assert!(matches!(
            parse_response(&resp),
            Err(SuearError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_parse_response_rejects_short_payload() {
        let mut resp = CommandHeader::request(1, MSG_DEVICE_INFO, 10).to_bytes().to_vec();
        resp.extend_from_slice(&[0; 4]);
        assert!(matches!(
            parse_response(&resp),
            Err(SuearError::Truncated { needed: 22, got: 16 })
        ));
    }

    #[test]
    fn test_parse_response_rejects_bad_magic() {
        let mut resp = CommandHeader::request(1, MSG_DEVICE_INFO, 0).to_bytes();
        resp[0] = 0x00;
        assert!(matches!(
            parse_response(&resp),
            Err(SuearError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_chunk_header_position_flag() {
        let header = ChunkHeader {
            frame_id: 0x0102_0304,
            chunk_id: 255,
            width: 640,
            height: 480,
            total_chunks: 0,
            position: Some(Position { x: -1, y: 2, z: 300 }),
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[5], ChunkFlags::HAS_POSITION.bits());
        assert_eq!(ChunkHeader::parse(&bytes), Some(header));

        let mut plain = bytes;
        plain[5] = 0;
        assert_eq!(ChunkHeader::parse(&plain).unwrap().position, None);
    }

    #[test]
    fn test_chunks_splits_packed_datagram() {
        let first = ChunkHeader {
            frame_id: 9,
            chunk_id: 0,
            width: 640,
            height: 480,
            total_chunks: 0,
            position: None,
        };
        let last = ChunkHeader {
            chunk_id: 1,
            total_chunks: 2,
            ..first
        };

        let mut datagram = first.to_bytes().to_vec();
        datagram.extend_from_slice(&[0x11; CHUNK_SIZE]);
        datagram.extend_from_slice(&last.to_bytes());
        datagram.extend_from_slice(&[0x22; 100]);

        let mut chunks = Chunks::new(&datagram);
        let (h, p) = chunks.next().unwrap();
        assert_eq!(h, first);
        assert_eq!(p.len(), CHUNK_SIZE);
        let (h, p) = chunks.next().unwrap();
        assert!(h.is_final());
        assert_eq!(p, &[0x22; 100][..]);
        assert!(chunks.next().is_none());
        assert_eq!(chunks.remainder(), 0);
    }

    #[test]
    fn test_chunks_discards_partial_trailing_header() {
        let header = ChunkHeader {
            frame_id: 1,
            chunk_id: 0,
            width: 1,
            height: 1,
            total_chunks: 1,
            position: None,
        };
        let mut datagram = header.to_bytes().to_vec();
        datagram.extend_from_slice(&[0u8; CHUNK_SIZE]);
        datagram.extend_from_slice(&[0u8; 10]);

        let mut chunks = Chunks::new(&datagram);
        assert!(chunks.next().is_some());
        assert!(chunks.next().is_none());
        assert_eq!(chunks.remainder(), 10);
    }
}
