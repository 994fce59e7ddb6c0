use crate::frame::Frame;
use crate::protocol::ChunkHeader;
use crate::types::JpegFrame;
use std::collections::{HashMap, VecDeque};

/// Fixed set of reassembly slots shared by all in-flight frames.
///
/// Slots are addressed by index and only ever touched by the reader thread.
/// Each slot is owned by at most one frame id at a time; `in_flight` and
/// `owners` always agree, and `order` lists the same ids oldest first.
pub struct FrameSlotPool {
    slots: Vec<Frame>,
    owners: Vec<Option<u32>>,
    in_flight: HashMap<u32, usize>,
    order: VecDeque<u32>,
    next: usize,
}

impl FrameSlotPool {
    pub fn new(capacity: usize, frame_capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| Frame::new(frame_capacity)).collect(),
            owners: vec![None; capacity],
            in_flight: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn contains(&self, frame_id: u32) -> bool {
        self.in_flight.contains_key(&frame_id)
    }

    /// Slot assembling `header.frame_id`, claiming a fresh one if needed.
    ///
    /// When every slot is busy the oldest unfinished frame is discarded to
    /// make room. New frames take slots round-robin, skipping any slot whose
    /// frame is still in flight.
    pub fn acquire(&mut self, header: &ChunkHeader) -> usize {
        if let Some(&slot) = self.in_flight.get(&header.frame_id) {
            return slot;
        }

        while self.in_flight.len() >= self.slots.len() {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(slot) = self.in_flight.remove(&oldest) {
                self.owners[slot] = None;
                log::debug!("Discarding unfinished frame {}", oldest);
            }
        }

        let len = self.slots.len();
        let slot = (0..len)
            .map(|i| (self.next + i) % len)
            .find(|&s| self.owners[s].is_none())
            .unwrap_or(self.next);
        self.next = (slot + 1) % len;

        self.slots[slot].init(header);
        self.owners[slot] = Some(header.frame_id);
        self.in_flight.insert(header.frame_id, slot);
        self.order.push_back(header.frame_id);
        slot
    }

    pub fn frame_mut(&mut self, slot: usize) -> &mut Frame {
        &mut self.slots[slot]
    }

    /// If `slot` just completed, retire it and everything queued before it,
    /// and return a copy ready for publication.
    ///
    /// Older frames still in flight are assumed lost: their chunks would have
    /// arrived before those of a newer, already complete frame.
    pub fn publish_if_complete(&mut self, slot: usize) -> Option<JpegFrame> {
        let frame = &self.slots[slot];
        if !frame.is_complete() {
            return None;
        }
        let done = frame.index();
        let snapshot = match frame.snapshot() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Completed frame {} unreadable: {}", done, e);
                return None;
            }
        };

        while let Some(id) = self.order.pop_front() {
            if let Some(s) = self.in_flight.remove(&id) {
                self.owners[s] = None;
            }
            if id == done {
                break;
            }
            log::trace!("Dropping frame {} behind completed frame {}", id, done);
        }
        Some(snapshot)
    }

    /// Drop a frame that can no longer be assembled.
    pub fn discard(&mut self, frame_id: u32) {
        if let Some(slot) = self.in_flight.remove(&frame_id) {
            self.owners[slot] = None;
            self.order.retain(|&id| id != frame_id);
        }
    }

    /// Forget every in-flight frame. Buffers stay allocated for reuse.
    pub fn clear(&mut self) {
        self.in_flight.clear();
        self.order.clear();
        self.owners.iter_mut().for_each(|o| *o = None);
        self.next = 0;
    }
}
