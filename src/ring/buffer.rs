//! Lock-free multi-producer / single-consumer packet buffer.
//!
//! The arena is `N` 32-bit words.  Each record starts with one header word
//! followed by its payload words:
//!
//! ```text
//!  31            16 15          5 4   3   2   1   0
//! ┌────────────────┬─────────────┬───┬───┬───┬───┬───┐
//! │  lap (pos / N) │ len (words) │ E │ F │ P │ B │ V │
//! └────────────────┴─────────────┴───┴───┴───┴───┴───┘
//!   V = valid (committed)   B = busy (claimed)   P = padding
//!   F = freed               E = being evicted
//! ```
//!
//! A header word of zero means "nothing written here yet"; every word is
//! zeroed again before its space is handed back to producers.  Positions
//! are free-running counters; the arena index is `pos % N`, which is why
//! `N` must be a power of two.  The lap field makes a header from an older
//! pass over the same index distinguishable from a fresh one.
//!
//! Producers reserve space with a CAS on `head`, write the header, fill
//! the payload and publish it with a release store of the valid bit.  The
//! single consumer walks records in arena order from `claim`, and `tail`
//! advances over freed (consumer) or evicted (producer, overwrite mode)
//! records.  No operation blocks.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use log::debug;

const VALID: u32 = 1 << 0;
const BUSY: u32 = 1 << 1;
const PAD: u32 = 1 << 2;
const FREED: u32 = 1 << 3;
const EVICTING: u32 = 1 << 4;

const LEN_SHIFT: u32 = 5;
const LEN_MASK: u32 = 0x7ff;
const LAP_SHIFT: u32 = 16;
const LAP_MASK: u32 = 0xffff;

/// Times the consumer re-reads a header that a producer is evicting
/// before reporting nothing ready.
const EVICT_SPINS: u32 = 64;

/// Largest supported arena, bounded by the header's length field.
pub const MAX_ARENA_WORDS: usize = 1024;

/// Decoded view of a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub busy: bool,
    pub valid: bool,
    /// Record length in words, header included.
    pub length: u32,
}

/// Producer-side handle for a reserved, not yet committed record.
///
/// Dropping it without [`PacketBuffer::commit`] turns the record into
/// padding so the consumer steps over it.
#[must_use = "an allocated record must be committed"]
pub struct RecordHandle<'a, const N: usize> {
    buf: &'a PacketBuffer<N>,
    pos: usize,
    len: usize,
    committed: bool,
}

impl<const N: usize> RecordHandle<'_, N> {
    /// Number of payload words (header excluded).
    pub fn payload_words(&self) -> usize {
        self.len - 1
    }

    /// Write `words` into the payload starting at `offset`.
    pub fn write_words(&mut self, offset: usize, words: &[u32]) {
        assert!(offset + words.len() <= self.payload_words(), "record payload overflow");
        let base = self.pos % N + 1;
        for (i, w) in words.iter().enumerate() {
            self.buf.words[base + offset + i].store(*w, Ordering::Relaxed);
        }
    }
}

impl<const N: usize> Drop for RecordHandle<'_, N> {
    fn drop(&mut self) {
        if !self.committed {
            let hdr = header(self.len, lap_of::<N>(self.pos), VALID | PAD);
            self.buf.words[self.pos % N].store(hdr, Ordering::Release);
        }
    }
}

/// Consumer-side handle for a claimed record.  Freed when dropped.
pub struct ClaimedRecord<'a, const N: usize> {
    buf: &'a PacketBuffer<N>,
    pos: usize,
    len: usize,
}

impl<const N: usize> ClaimedRecord<'_, N> {
    pub fn payload_words(&self) -> usize {
        self.len - 1
    }

    /// Copy the payload into `out`, returning the number of words copied.
    pub fn copy_payload(&self, out: &mut [u32]) -> usize {
        let n = self.payload_words().min(out.len());
        let base = self.pos % N + 1;
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            *slot = self.buf.words[base + i].load(Ordering::Relaxed);
        }
        n
    }

    pub fn header(&self) -> RecordHeader {
        decode_header(self.buf.words[self.pos % N].load(Ordering::Acquire))
    }
}

impl<const N: usize> Drop for ClaimedRecord<'_, N> {
    fn drop(&mut self) {
        self.buf.release(self.pos);
    }
}

/// The packet buffer arena.  See the module docs for the layout.
pub struct PacketBuffer<const N: usize> {
    words: [AtomicU32; N],
    /// Reservation frontier (producers, CAS).
    head: AtomicUsize,
    /// Oldest word not yet returned to the arena.
    tail: AtomicUsize,
    /// Next record the consumer will look at.
    claim: AtomicUsize,
    overwrite: bool,
    dropped: AtomicU32,
}

impl<const N: usize> PacketBuffer<N> {
    /// Create an empty arena.  With `overwrite` set, an allocation that
    /// does not fit evicts the oldest committed, unclaimed records.
    pub fn new(overwrite: bool) -> Self {
        const {
            assert!(N.is_power_of_two() && N >= 2 && N <= MAX_ARENA_WORDS);
        }
        Self {
            words: core::array::from_fn(|_| AtomicU32::new(0)),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            claim: AtomicUsize::new(0),
            overwrite,
            dropped: AtomicU32::new(0),
        }
    }

    /// Reserve `word_count` contiguous payload words.
    ///
    /// Never blocks; returns `None` when no contiguous run is free (after
    /// eviction, in overwrite mode).
    pub fn allocate(&self, word_count: usize) -> Option<RecordHandle<'_, N>> {
        let len = word_count.checked_add(1)?;
        if len > N {
            return None;
        }

        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);
            let used = head.wrapping_sub(tail);
            if used > N {
                // Stale snapshot.
                continue;
            }

            let offset = head % N;
            let to_end = N - offset;
            let pad = if len > to_end { to_end } else { 0 };
            let need = pad + len;

            if used + need > N {
                if self.overwrite && (self.evict_oldest(tail) || self.tail.load(Ordering::Acquire) != tail) {
                    continue;
                }
                return None;
            }

            if self
                .head
                .compare_exchange_weak(head, head.wrapping_add(need), Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            if pad > 0 {
                self.words[offset].store(header(pad, lap_of::<N>(head), VALID | PAD), Ordering::Release);
            }
            let pos = head.wrapping_add(pad);
            self.words[pos % N].store(header(len, lap_of::<N>(pos), 0), Ordering::Release);

            return Some(RecordHandle {
                buf: self,
                pos,
                len,
                committed: false,
            });
        }
    }

    /// Publish a fully written record to the consumer.
    pub fn commit(&self, mut handle: RecordHandle<'_, N>) {
        debug_assert!(core::ptr::eq(handle.buf, self), "record belongs to another buffer");
        let hdr = header(handle.len, lap_of::<N>(handle.pos), VALID);
        self.words[handle.pos % N].store(hdr, Ordering::Release);
        handle.committed = true;
    }

    /// Take exclusive read access to the oldest committed record.
    ///
    /// Records are handed out in arena order; if the oldest one is still
    /// being written, this returns `None` even when later records are
    /// ready.  Single consumer only.
    pub fn claim(&self) -> Option<ClaimedRecord<'_, N>> {
        loop {
            let (pos, hdr) = self.peek()?;
            let idx = pos % N;
            let len = header_len(hdr);

            if hdr & PAD != 0 {
                let freed = (hdr & !VALID) | FREED;
                if self.words[idx]
                    .compare_exchange(hdr, freed, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    self.claim.store(pos.wrapping_add(len), Ordering::Relaxed);
                    self.release_tail();
                }
                continue;
            }

            if self.words[idx]
                .compare_exchange(hdr, hdr | BUSY, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                // Lost the record to an evicting producer.
                continue;
            }
            self.claim.store(pos.wrapping_add(len), Ordering::Relaxed);
            return Some(ClaimedRecord { buf: self, pos, len });
        }
    }

    /// Return a claimed record's space to the arena.
    pub fn free(&self, record: ClaimedRecord<'_, N>) {
        debug_assert!(core::ptr::eq(record.buf, self), "record belongs to another buffer");
        drop(record);
    }

    /// Whether a committed record (or padding) is waiting at the claim
    /// position.
    pub fn has_pending(&self) -> bool {
        self.peek().is_some()
    }

    /// Records evicted by overwrite-mode allocations.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Words currently reserved, committed, claimed or awaiting release.
    pub fn used_words(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(N)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }

    // ── Internal ──────────────────────────────────────────────

    /// Claim position and its committed header, skipping past records
    /// that producers evicted.
    fn peek(&self) -> Option<(usize, u32)> {
        let mut spins = 0;
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let mut pos = self.claim.load(Ordering::Relaxed);
            if pos.wrapping_sub(tail) > N {
                pos = tail;
                self.claim.store(pos, Ordering::Relaxed);
            }
            if pos == self.head.load(Ordering::Acquire) {
                return None;
            }

            let hdr = self.words[pos % N].load(Ordering::Acquire);
            let current = header_lap(hdr) == lap_of::<N>(pos);
            if current && hdr & VALID != 0 {
                return Some((pos, hdr));
            }
            if self.tail.load(Ordering::Acquire) != tail {
                continue;
            }
            // The evicting producer advances `tail` shortly; it may also be
            // preempted, so the wait is bounded.
            if current && hdr & EVICTING != 0 && spins < EVICT_SPINS {
                spins += 1;
                core::hint::spin_loop();
                continue;
            }
            return None;
        }
    }

    /// Evict the record at `tail` if it is committed and unclaimed.
    /// Returns `true` when space was reclaimed or the race is worth retrying.
    fn evict_oldest(&self, tail: usize) -> bool {
        let idx = tail % N;
        let hdr = self.words[idx].load(Ordering::Acquire);
        if hdr & VALID == 0
            || hdr & (BUSY | FREED | EVICTING) != 0
            || header_lap(hdr) != lap_of::<N>(tail)
        {
            return false;
        }

        let evicting = (hdr & !VALID) | EVICTING;
        if self.words[idx]
            .compare_exchange(hdr, evicting, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return true;
        }

        let len = header_len(hdr);
        self.zero(tail, len);
        self.tail.store(tail.wrapping_add(len), Ordering::Release);

        if hdr & PAD == 0 {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Ring: evicted {}-word record (dropped={})", len, total);
        }
        true
    }

    /// Mark the record at `pos` freed and advance the tail.
    fn release(&self, pos: usize) {
        let idx = pos % N;
        let hdr = self.words[idx].load(Ordering::Relaxed);
        self.words[idx].store((hdr & !(VALID | BUSY)) | FREED, Ordering::Release);
        self.release_tail();
    }

    /// Consumer side: hand every freed record at the tail back to the arena.
    fn release_tail(&self) {
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            if tail == self.head.load(Ordering::Acquire) {
                return;
            }
            let hdr = self.words[tail % N].load(Ordering::Acquire);
            if hdr & FREED == 0 || header_lap(hdr) != lap_of::<N>(tail) {
                return;
            }
            let len = header_len(hdr);
            self.zero(tail, len);
            self.tail.store(tail.wrapping_add(len), Ordering::Release);
        }
    }

    /// Zero a record, payload first and header last.
    fn zero(&self, pos: usize, len: usize) {
        let idx = pos % N;
        for w in &self.words[idx + 1..idx + len] {
            w.store(0, Ordering::Relaxed);
        }
        self.words[idx].store(0, Ordering::Relaxed);
    }
}

fn header(len: usize, lap: u32, flags: u32) -> u32 {
    ((lap & LAP_MASK) << LAP_SHIFT) | (((len as u32) & LEN_MASK) << LEN_SHIFT) | flags
}

fn header_len(hdr: u32) -> usize {
    ((hdr >> LEN_SHIFT) & LEN_MASK) as usize
}

fn header_lap(hdr: u32) -> u32 {
    (hdr >> LAP_SHIFT) & LAP_MASK
}

fn lap_of<const N: usize>(pos: usize) -> u32 {
    ((pos / N) as u32) & LAP_MASK
}

fn decode_header(hdr: u32) -> RecordHeader {
    RecordHeader {
        busy: hdr & BUSY != 0,
        valid: hdr & VALID != 0,
        length: header_len(hdr) as u32,
    }
}
