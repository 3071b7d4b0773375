//! Bounded ring of pre-decoded frames.
//!
//! The queue decouples decode rate from display rate: the decode role fills
//! slots obtained via [`request_empty`](FrameQueue::request_empty), the
//! consume role peeks and pops in strict population order. A full queue is
//! the back-pressure signal that stalls decoding for the tick.
//!
//! Slot handshake: the producer only ever writes the slot it was handed and
//! the consumer only ever reads the oldest populated one, so at most one
//! writer and one reader touch a given slot at a time. The ring indices sit
//! behind one small mutex; pixel buffers behind per-slot mutexes that are
//! never contended in that pattern.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};

struct FrameBuf {
    pixels: Vec<u8>,
    /// Presentation time in seconds; meaningful only while populated.
    time: f64,
}

struct RingState {
    /// Index of the oldest populated slot.
    head: usize,
    /// Number of populated slots.
    used: usize,
    /// True while a producer holds an unsubmitted empty slot.
    reserved: bool,
}

/// Fixed-capacity circular collection of frame slots.
pub struct FrameQueue {
    slots: Vec<Mutex<FrameBuf>>,
    state: Mutex<RingState>,
    /// Packed 0xAARRGGBB fill colour for the pad region of the texture.
    back_colour: AtomicU32,
}

impl FrameQueue {
    /// Creates a queue of `capacity` slots, each owning a `frame_bytes`
    /// pixel buffer.
    pub fn new(capacity: usize, frame_bytes: usize) -> Self {
        assert!(capacity > 0, "frame queue needs at least one slot");
        Self {
            slots: (0..capacity)
                .map(|_| {
                    Mutex::new(FrameBuf {
                        pixels: vec![0; frame_bytes],
                        time: 0.0,
                    })
                })
                .collect(),
            state: Mutex::new(RingState {
                head: 0,
                used: 0,
                reserved: false,
            }),
            back_colour: AtomicU32::new(0xFF00_0000),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of populated slots.
    pub fn used_count(&self) -> usize {
        self.state.lock().used
    }

    /// Hands the producer a free slot, or `None` when every slot is
    /// populated (or an earlier empty slot is still outstanding).
    pub fn request_empty(&self) -> Option<EmptyFrame<'_>> {
        let index = {
            let mut state = self.state.lock();
            if state.reserved || state.used == self.slots.len() {
                return None;
            }
            state.reserved = true;
            (state.head + state.used) % self.slots.len()
        };
        Some(EmptyFrame {
            queue: self,
            index,
            buf: Some(self.slots[index].lock()),
        })
    }

    /// Peeks the oldest populated slot without removing it.
    pub fn first_available(&self) -> Option<ReadyFrame<'_>> {
        let index = {
            let state = self.state.lock();
            if state.used == 0 {
                return None;
            }
            state.head
        };
        Some(ReadyFrame {
            buf: self.slots[index].lock(),
        })
    }

    /// Marks the oldest populated slot free again.
    pub fn pop(&self) {
        let mut state = self.state.lock();
        if state.used > 0 {
            state.head = (state.head + 1) % self.slots.len();
            state.used -= 1;
        }
    }

    /// Marks every slot free. Used on seek; outstanding empty slots become
    /// stale and their submission is discarded.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.used;
        state.head = 0;
        state.used = 0;
        if dropped > 0 {
            tracing::debug!("frame queue cleared, dropped {} frames", dropped);
        }
    }

    /// Sets the pad-region fill colour for subsequently populated frames.
    pub fn fill_back_colour(&self, colour: u32) {
        self.back_colour.store(colour, Ordering::Relaxed);
    }

    pub fn back_colour(&self) -> u32 {
        self.back_colour.load(Ordering::Relaxed)
    }
}

/// Exclusive producer access to a free slot.
///
/// Dropping the guard without [`submit`](EmptyFrame::submit) leaves the slot
/// free, so an abandoned decode tick costs nothing.
pub struct EmptyFrame<'a> {
    queue: &'a FrameQueue,
    index: usize,
    buf: Option<MutexGuard<'a, FrameBuf>>,
}

impl EmptyFrame<'_> {
    /// The slot's pixel buffer.
    pub fn data(&mut self) -> &mut [u8] {
        &mut self.buf.as_mut().expect("buffer taken").pixels
    }

    /// Marks the slot populated with the given presentation time.
    ///
    /// If the queue was cleared while this slot was held, the frame is
    /// stale and silently discarded.
    pub fn submit(mut self, time: f64) {
        {
            let mut guard = self.buf.take().expect("buffer taken");
            guard.time = time;
        }
        let mut state = self.queue.state.lock();
        state.reserved = false;
        let expected = (state.head + state.used) % self.queue.slots.len();
        if expected == self.index {
            state.used += 1;
        } else {
            tracing::trace!("discarding stale frame submitted across a clear");
        }
    }
}

impl Drop for EmptyFrame<'_> {
    fn drop(&mut self) {
        if self.buf.take().is_some() {
            // Abandoned without submit; release the reservation.
            self.queue.state.lock().reserved = false;
        }
    }
}

/// Read access to the oldest populated slot.
pub struct ReadyFrame<'a> {
    buf: MutexGuard<'a, FrameBuf>,
}

impl ReadyFrame<'_> {
    pub fn time(&self) -> f64 {
        self.buf.time
    }

    pub fn data(&self) -> &[u8] {
        &self.buf.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(queue: &FrameQueue, time: f64) -> bool {
        match queue.request_empty() {
            Some(mut slot) => {
                slot.data()[0] = (time * 100.0) as u8;
                slot.submit(time);
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_capacity_bound() {
        let queue = FrameQueue::new(3, 16);
        assert!(populate(&queue, 0.0));
        assert!(populate(&queue, 0.1));
        assert!(populate(&queue, 0.2));
        assert!(queue.request_empty().is_none());
        assert_eq!(queue.used_count(), 3);
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new(2, 16);
        populate(&queue, 0.0);
        populate(&queue, 0.5);

        assert_eq!(queue.first_available().unwrap().time(), 0.0);
        queue.pop();
        assert_eq!(queue.first_available().unwrap().time(), 0.5);
        queue.pop();
        assert!(queue.first_available().is_none());
    }

    #[test]
    fn test_pop_frees_slot_for_producer() {
        let queue = FrameQueue::new(2, 16);
        populate(&queue, 0.0);
        populate(&queue, 0.1);
        assert!(queue.request_empty().is_none());
        queue.pop();
        assert!(populate(&queue, 0.2));
        assert_eq!(queue.first_available().unwrap().time(), 0.1);
    }

    #[test]
    fn test_clear_empties_queue() {
        let queue = FrameQueue::new(3, 16);
        populate(&queue, 0.0);
        populate(&queue, 0.1);
        queue.clear();
        assert!(queue.first_available().is_none());
        assert_eq!(queue.used_count(), 0);
        assert!(populate(&queue, 5.0));
        assert_eq!(queue.first_available().unwrap().time(), 5.0);
    }

    #[test]
    fn test_abandoned_slot_released() {
        let queue = FrameQueue::new(1, 16);
        {
            let _slot = queue.request_empty().expect("free slot");
            assert!(queue.request_empty().is_none());
        }
        assert!(queue.request_empty().is_some());
        assert_eq!(queue.used_count(), 0);
    }

    #[test]
    fn test_stale_submit_after_clear_discarded() {
        let queue = FrameQueue::new(2, 16);
        populate(&queue, 0.0);
        let slot = queue.request_empty().expect("free slot");
        queue.clear();
        slot.submit(1.0);
        // The stale frame must not appear as populated.
        assert_eq!(queue.used_count(), 0);
    }
}
