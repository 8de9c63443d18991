use bytes::Bytes;
use rdt_abstract::BlockSink;
use std::io;
use std::time::Duration;

use crate::seq::{BlockIndex, slot};
use crate::timer::Timer;

/// Bitmap over the M sequence slots tracking which blocks of the current
/// window have completed.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    filled: Vec<bool>,
    base: BlockIndex,
    size: usize,
}

impl SlidingWindow {
    pub fn new(size: usize, modulus: usize) -> Self {
        debug_assert!(size > 0 && size < modulus);
        Self {
            filled: vec![false; modulus],
            base: 0,
            size,
        }
    }

    pub fn base(&self) -> BlockIndex {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn modulus(&self) -> usize {
        self.filled.len()
    }

    pub fn is_filled(&self, num: u8) -> bool {
        self.filled.get(num as usize).copied().unwrap_or(false)
    }

    /// Whether `num` names an unfilled slot inside `[base, base + size)`.
    pub fn can_submit(&self, num: u8) -> bool {
        let num = num as usize;
        let modulus = self.modulus();
        if num >= modulus || self.filled[num] {
            return false;
        }
        let offset = (num + modulus - slot(self.base, modulus)) % modulus;
        offset < self.size
    }

    pub fn submit(&mut self, num: u8) -> bool {
        if !self.can_submit(num) {
            return false;
        }
        self.filled[num as usize] = true;
        true
    }

    /// Advance the base past the filled run starting at it. Returns the
    /// number of slots released.
    pub fn spin(&mut self) -> usize {
        let mut advanced = 0;
        while self.take_base() {
            advanced += 1;
        }
        advanced
    }

    pub fn clear(&mut self) {
        self.filled.fill(false);
        self.base = 0;
    }

    /// Release the base slot if it is filled.
    fn take_base(&mut self) -> bool {
        let i = slot(self.base, self.modulus());
        if !self.filled[i] {
            return false;
        }
        self.filled[i] = false;
        self.base += 1;
        true
    }
}

/// Receiver window that buffers out-of-order payload until it can be
/// delivered in order.
#[derive(Debug, Clone)]
pub struct ReceiveCache {
    window: SlidingWindow,
    slots: Vec<Option<Bytes>>,
}

impl ReceiveCache {
    pub fn new(size: usize, modulus: usize) -> Self {
        Self {
            window: SlidingWindow::new(size, modulus),
            slots: vec![None; modulus],
        }
    }

    pub fn base(&self) -> BlockIndex {
        self.window.base()
    }

    pub fn size(&self) -> usize {
        self.window.size()
    }

    pub fn is_filled(&self, num: u8) -> bool {
        self.window.is_filled(num)
    }

    pub fn submit(&mut self, num: u8, payload: Bytes) -> bool {
        if !self.window.submit(num) {
            return false;
        }
        self.slots[num as usize] = Some(payload);
        true
    }

    /// Flush the in-order prefix into `sink`. Returns the blocks delivered.
    /// On a sink error the failing block stays cached.
    pub fn spin<S: BlockSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<usize> {
        let modulus = self.window.modulus();
        let mut delivered = 0;
        loop {
            let i = slot(self.window.base(), modulus);
            if !self.window.filled[i] {
                break;
            }
            if let Some(payload) = &self.slots[i] {
                sink.append(payload)?;
            }
            self.slots[i] = None;
            self.window.take_base();
            delivered += 1;
        }
        Ok(delivered)
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.slots.fill(None);
    }
}

/// Sender window with one retransmission timer per slot.
#[derive(Debug, Clone)]
pub struct RetransmissionTimerSet {
    window: SlidingWindow,
    timers: Vec<Timer>,
}

impl RetransmissionTimerSet {
    pub fn new(size: usize, modulus: usize) -> Self {
        Self {
            window: SlidingWindow::new(size, modulus),
            timers: vec![Timer::new(); modulus],
        }
    }

    pub fn base(&self) -> BlockIndex {
        self.window.base()
    }

    pub fn size(&self) -> usize {
        self.window.size()
    }

    pub fn is_filled(&self, num: u8) -> bool {
        self.window.is_filled(num)
    }

    /// Mark `num` acknowledged and stop its timer.
    pub fn submit(&mut self, num: u8) -> bool {
        if !self.window.submit(num) {
            return false;
        }
        self.timers[num as usize].stop();
        true
    }

    pub fn spin(&mut self) -> usize {
        let modulus = self.window.modulus();
        let mut advanced = 0;
        loop {
            let i = slot(self.window.base(), modulus);
            if !self.window.take_base() {
                break;
            }
            self.timers[i].stop();
            advanced += 1;
        }
        advanced
    }

    pub fn set_timeout(&mut self, num: u8, after: Duration) {
        if let Some(timer) = self.timers.get_mut(num as usize) {
            timer.set_timeout(after);
        }
    }

    pub fn is_timeout(&self, num: u8) -> bool {
        self.timers.get(num as usize).is_some_and(Timer::is_timeout)
    }

    pub fn stop(&mut self, num: u8) {
        if let Some(timer) = self.timers.get_mut(num as usize) {
            timer.stop();
        }
    }

    pub fn stop_all(&mut self) {
        self.timers.iter_mut().for_each(Timer::stop);
    }

    /// Some slot whose timer has expired. No ordering between slots.
    pub fn which_is_timeout(&self) -> Option<u8> {
        self.timers
            .iter()
            .position(Timer::is_timeout)
            .map(|i| i as u8)
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.stop_all();
    }
}
