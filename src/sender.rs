//! Selective-repeat send-side state machine.
//!
//! [`Sender`] maintains a sliding window of up to [`WINDOW_SIZE`] in-flight
//! frames and retransmits each one individually, never the whole window.
//!
//! # Protocol contract
//!
//! - At most `WINDOW_SIZE` frames may be in flight at once.
//! - ACKs are **cumulative**: `ack = K` means the receiver has delivered
//!   every sequence number up to and including `K`.
//! - NAKs are **selective**: `ack = K` requests an immediate retransmission
//!   of the single frame `K`.
//! - Each in-flight frame has exactly one pending entry in the timer queue;
//!   on expiry only that frame is retransmitted.
//! - Sequence numbers are `u8` and wrap; see [`crate::seq`].
//!
//! This module only manages state; frames leave through the
//! [`SenderHost`] the caller supplies with every event.
//!
//! # Buffering
//!
//! Outbound bytes live in a 256-slot ring indexed by sequence number, which
//! makes the by-seq lookup for selective retransmission O(1).  The ring
//! admits new bytes three ways: a fresh slot at `next_seq`, compaction into
//! the last assigned slot while that slot is still beyond the sliding
//! window, or — when the ring itself is full — an unbounded FIFO of payload
//! chunks that drains back into the ring as ACKs free slots.

use std::collections::VecDeque;

use crate::host::SenderHost;
use crate::packet::{flags, Frame, PAYLOAD_MAX};
use crate::seq::{self, Seq, SEQ_SPACE};
use crate::timer::TimerQueue;

/// Maximum number of frames in flight (N).
pub const WINDOW_SIZE: Seq = 8;

/// Seconds an in-flight frame waits for a cumulative ACK before
/// retransmission.
pub const SENDER_TIMEOUT: f64 = 1.0;

/// Seconds a NAK-retransmitted frame waits before being retransmitted
/// again.  Shorter than [`SENDER_TIMEOUT`]: the receiver already told us
/// the frame is missing.
pub const NAK_TIMEOUT: f64 = 0.3;

// A window larger than half the sequence space could not tell "ahead"
// from "behind" after a wrap.
const _: () = assert!(WINDOW_SIZE.is_power_of_two());
const _: () = assert!((WINDOW_SIZE as usize) <= SEQ_SPACE / 2);
const _: () = assert!(NAK_TIMEOUT < SENDER_TIMEOUT);

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Which timeout semantics are pending for a live slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStatus {
    /// Buffered but not transmitted, or already released.
    Idle,
    /// Transmitted; a [`SENDER_TIMEOUT`] entry is pending.
    WaitingAck,
    /// Selectively retransmitted after a NAK; a [`NAK_TIMEOUT`] entry is
    /// pending.  Further NAKs for this frame are absorbed until a
    /// cumulative ACK releases the slot.
    WaitingNakResend,
}

/// One ring entry.  Live iff its sequence number lies in
/// `[window_start, next_seq)`.
#[derive(Debug, Clone, Copy)]
struct Slot {
    frame: Frame,
    status: SlotStatus,
}

impl Slot {
    fn empty() -> Self {
        Slot {
            frame: Frame::empty(),
            status: SlotStatus::Idle,
        }
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Selective-repeat send-side state for one endpoint.
///
/// # Sequence-number layout
///
/// ```text
///  window_start      to_send        next_seq
///      │                │               │
///  ────┼────────────────┼───────────────┼──────────▶ seq space (mod 256)
///      │ <─ in flight ─▶│ <─ buffered ─▶│
///      │ <───────── live ring slots ───▶│   (overflow FIFO beyond that)
/// ```
pub struct Sender {
    /// Ring of frame slots indexed by sequence number.
    out_buf: Box<[Slot]>,

    /// Smallest unacknowledged sequence number (left window edge).
    window_start: Seq,

    /// Next sequence number to assign to fresh payload bytes.
    next_seq: Seq,

    /// Next sequence number awaiting its first transmission.
    to_send: Seq,

    /// Payload chunks (≤ [`PAYLOAD_MAX`] each) waiting for a ring slot.
    /// Non-empty only while the ring is full; drains in FIFO order.
    overflow: VecDeque<Vec<u8>>,

    /// Pending retransmission deadlines, one per in-flight frame.
    timers: TimerQueue,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

impl Sender {
    pub fn new() -> Self {
        Sender {
            out_buf: vec![Slot::empty(); SEQ_SPACE].into_boxed_slice(),
            window_start: 0,
            next_seq: 0,
            to_send: 0,
            overflow: VecDeque::new(),
            timers: TimerQueue::new(),
        }
    }

    /// Number of frames transmitted and not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        seq::minus(self.to_send, self.window_start) as usize
    }

    /// Number of live ring slots (in flight plus buffered behind the
    /// window).
    pub fn buffered(&self) -> usize {
        seq::minus(self.next_seq, self.window_start) as usize
    }

    /// Number of payload chunks waiting in the overflow FIFO.
    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    /// Number of pending retransmission timers.
    pub fn timers_pending(&self) -> usize {
        self.timers.len()
    }

    /// `true` when nothing is buffered, in flight, or timed.
    pub fn is_quiescent(&self) -> bool {
        self.buffered() == 0 && self.overflow.is_empty() && self.timers.is_empty()
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// Accept a message from the upper layer: frame its bytes into ring
    /// slots (or the overflow FIFO) and transmit whatever the window
    /// allows.
    pub fn from_upper_layer<H: SenderHost>(&mut self, host: &mut H, msg: &[u8]) {
        if msg.is_empty() {
            return;
        }
        log::debug!("[sender] message of {} bytes from upper layer", msg.len());
        let mut rest = msg;
        while !rest.is_empty() {
            rest = self.buffer_bytes(rest);
        }
        self.send_ready(host);
        self.debug_check();
    }

    /// Process a verified control frame from the lower layer.
    pub fn from_lower_layer<H: SenderHost>(&mut self, host: &mut H, pkt: &Frame) {
        if !pkt.check() {
            log::debug!("[sender] dropping corrupt control frame");
            return;
        }
        match pkt.flags {
            flags::NAK => self.on_nak(host, pkt.ack),
            _ => self.on_ack(host, pkt.ack),
        }
        self.debug_check();
    }

    /// Handle a host timer expiry: retransmit every frame whose deadline
    /// passed and re-schedule it.
    pub fn on_timer<H: SenderHost>(&mut self, host: &mut H) {
        for id in self.timers.on_expiry(host) {
            self.on_timeout(host, id);
        }
        self.debug_check();
    }

    // -----------------------------------------------------------------------
    // Framing
    // -----------------------------------------------------------------------

    /// Buffer a prefix of `data` through one admission step; returns the
    /// unconsumed suffix.
    fn buffer_bytes<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        // Ring full: bytes wait in the overflow FIFO with no sequence
        // number assigned yet.
        if seq::add(self.next_seq, 1) == self.window_start {
            return self.spill_overflow(data);
        }

        // Compact into the last assigned slot while it still sits beyond
        // the sliding window; bytes from many small messages share a frame.
        if self.next_seq != self.window_start {
            let prev = seq::minus(self.next_seq, 1);
            let window_end = seq::add(self.window_start, WINDOW_SIZE);
            let beyond_window = !seq::between(self.window_start, prev, window_end);
            let used = self.out_buf[prev as usize].frame.len as usize;
            if beyond_window && used < PAYLOAD_MAX {
                let take = data.len().min(PAYLOAD_MAX - used);
                let slot = &mut self.out_buf[prev as usize];
                slot.frame.payload[used..used + take].copy_from_slice(&data[..take]);
                slot.frame.len += take as u8;
                return &data[take..];
            }
        }

        // Claim a fresh slot at next_seq.
        let take = data.len().min(PAYLOAD_MAX);
        let slot = &mut self.out_buf[self.next_seq as usize];
        slot.frame = Frame::empty();
        slot.frame.seq = self.next_seq;
        slot.frame.len = take as u8;
        slot.frame.payload[..take].copy_from_slice(&data[..take]);
        slot.status = SlotStatus::Idle;
        seq::inc(&mut self.next_seq);
        &data[take..]
    }

    fn spill_overflow<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        match self.overflow.back_mut() {
            Some(tail) if tail.len() < PAYLOAD_MAX => {
                let take = data.len().min(PAYLOAD_MAX - tail.len());
                tail.extend_from_slice(&data[..take]);
                &data[take..]
            }
            _ => {
                let take = data.len().min(PAYLOAD_MAX);
                self.overflow.push_back(data[..take].to_vec());
                &data[take..]
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transmission
    // -----------------------------------------------------------------------

    /// Transmit every buffered frame the window currently admits.
    fn send_ready<H: SenderHost>(&mut self, host: &mut H) {
        let window_end = if seq::minus(self.next_seq, self.window_start) < WINDOW_SIZE {
            self.next_seq
        } else {
            seq::add(self.window_start, WINDOW_SIZE)
        };
        while seq::between(self.window_start, self.to_send, window_end) {
            let slot = &mut self.out_buf[self.to_send as usize];
            slot.frame.ack = 0;
            slot.frame.flags = flags::ACK;
            slot.frame.fill_checksum();
            slot.status = SlotStatus::WaitingAck;
            let frame = slot.frame;
            self.timers.add(host, self.to_send, SENDER_TIMEOUT);
            log::debug!("[sender] → DATA seq={} len={}", frame.seq, frame.len);
            host.send_to_lower(frame);
            seq::inc(&mut self.to_send);
        }
    }

    // -----------------------------------------------------------------------
    // Control-frame handling
    // -----------------------------------------------------------------------

    /// Cumulative ACK: release every slot up to and including `ack`, then
    /// fill the opened window.
    fn on_ack<H: SenderHost>(&mut self, host: &mut H, ack: Seq) {
        log::debug!(
            "[sender] ← ACK ack={ack} (window starts at {})",
            self.window_start
        );
        while seq::lte(self.window_start, ack) {
            self.timers.cancel(host, self.window_start);
            self.advance_window();
        }
        self.send_ready(host);
    }

    /// Selective NAK: retransmit the named frame immediately, once per
    /// NAK burst.
    fn on_nak<H: SenderHost>(&mut self, host: &mut H, naked: Seq) {
        if seq::lt(naked, self.window_start) {
            log::debug!(
                "[sender] ← stale NAK seq={naked} (window starts at {})",
                self.window_start
            );
            return;
        }
        if self.out_buf[naked as usize].status == SlotStatus::WaitingNakResend {
            log::debug!("[sender] ← duplicate NAK seq={naked} absorbed");
            return;
        }
        log::debug!("[sender] ← NAK seq={naked}; fast retransmit");
        self.timers.cancel(host, naked);
        let frame = self.out_buf[naked as usize].frame;
        host.send_to_lower(frame);
        self.timers.add(host, naked, NAK_TIMEOUT);
        self.out_buf[naked as usize].status = SlotStatus::WaitingNakResend;
    }

    /// Slide the window by one slot, admitting an overflow chunk into the
    /// freed capacity when one is waiting.
    fn advance_window(&mut self) {
        if let Some(chunk) = self.overflow.pop_front() {
            let slot = &mut self.out_buf[self.next_seq as usize];
            slot.frame = Frame::empty();
            slot.frame.seq = self.next_seq;
            slot.frame.len = chunk.len() as u8;
            slot.frame.payload[..chunk.len()].copy_from_slice(&chunk);
            slot.status = SlotStatus::Idle;
            seq::inc(&mut self.next_seq);
        } else {
            self.out_buf[self.window_start as usize].frame.len = 0;
        }
        self.out_buf[self.window_start as usize].status = SlotStatus::Idle;
        seq::inc(&mut self.window_start);
    }

    // -----------------------------------------------------------------------
    // Timeouts
    // -----------------------------------------------------------------------

    fn on_timeout<H: SenderHost>(&mut self, host: &mut H, id: Seq) {
        debug_assert!(
            seq::between(self.window_start, id, self.to_send),
            "timeout for seq {id} outside the in-flight range"
        );
        let slot = &self.out_buf[id as usize];
        let frame = slot.frame;
        let timeout = match slot.status {
            SlotStatus::WaitingNakResend => NAK_TIMEOUT,
            _ => SENDER_TIMEOUT,
        };
        log::debug!("[sender] timeout seq={id}; retransmitting");
        host.send_to_lower(frame);
        self.timers.add(host, id, timeout);
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    fn debug_check(&self) {
        let in_flight = seq::minus(self.to_send, self.window_start);
        let live = seq::minus(self.next_seq, self.window_start);
        debug_assert!(in_flight <= WINDOW_SIZE);
        debug_assert!(in_flight <= live);
        debug_assert!(self.timers.len() <= WINDOW_SIZE as usize);
        // Overflow chunks exist only while the ring is full.
        debug_assert!(
            self.overflow.is_empty() || seq::add(self.next_seq, 1) == self.window_start
        );
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
