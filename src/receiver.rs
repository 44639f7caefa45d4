//! Selective-repeat receive-side state machine.
//!
//! [`Receiver`] implements the receive side of the protocol:
//!
//! - Frames are verified and **buffered by sequence number**, in or out of
//!   order; duplicates overwrite their own slot and are never delivered
//!   twice.
//! - Contiguous frames at the window edge are delivered upward immediately
//!   and in order.
//! - When a gap is observed (a later frame has arrived but the next
//!   expected one has not), the receiver answers with a **NAK** naming the
//!   missing sequence number instead of an ACK.
//! - Otherwise every arrival is answered with a **cumulative ACK** carrying
//!   the highest in-order sequence number delivered so far — duplicates
//!   included, so a lost ACK cannot stall the sender.
//!
//! The receiver has no timer.  A NAK is sent on every gap-observing
//! arrival: it cannot time out a missing NAK, and the sender absorbs the
//! repeats, so repetition is the cheap way to survive NAK loss.  If every
//! NAK is lost, the sender's own timeout still recovers.

use crate::host::ReceiverHost;
use crate::packet::{flags, Frame};
use crate::seq::{self, Seq, SEQ_SPACE};

/// One reassembly slot.  `received` marks a buffered, not yet delivered
/// frame.
#[derive(Debug, Clone, Copy)]
struct RecvSlot {
    frame: Frame,
    received: bool,
}

/// Receive-side state for one endpoint.
pub struct Receiver {
    /// Reassembly ring indexed by sequence number.
    in_buf: Box<[RecvSlot]>,

    /// Smallest sequence number not yet delivered upward.
    window_start: Seq,

    /// Highest sequence number ever observed (wrap-aware).  A gap exists
    /// while `window_start` trails it.
    received_last: Seq,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    pub fn new() -> Self {
        Receiver {
            in_buf: vec![
                RecvSlot {
                    frame: Frame::empty(),
                    received: false,
                };
                SEQ_SPACE
            ]
            .into_boxed_slice(),
            window_start: 0,
            received_last: 0,
        }
    }

    /// Sequence number of the next frame the upper layer is waiting for.
    pub fn next_expected(&self) -> Seq {
        self.window_start
    }

    /// Number of frames buffered ahead of the delivery edge.
    pub fn pending(&self) -> usize {
        self.in_buf.iter().filter(|s| s.received).count()
    }

    /// Process one frame from the lower layer.
    pub fn from_lower_layer<H: ReceiverHost>(&mut self, host: &mut H, pkt: &Frame) {
        if !pkt.check() {
            log::debug!(
                "[receiver] dropping corrupt frame (claimed seq={})",
                pkt.seq
            );
            return;
        }

        let s = pkt.seq;
        if seq::lt(s, self.window_start) {
            // Already delivered.  The first ACK for it may have been lost;
            // answer again so the sender can advance.
            log::debug!("[receiver] duplicate seq={s}; re-acking");
            self.send_ack(host);
            return;
        }

        let slot = &mut self.in_buf[s as usize];
        slot.frame = *pkt;
        slot.received = true;
        if seq::lt(self.received_last, s) {
            self.received_last = s;
        }
        log::debug!("[receiver] ← DATA seq={s} len={}", pkt.len);

        self.deliver_ready(host);

        if seq::lt(self.window_start, self.received_last) {
            // A later frame arrived but window_start is still missing: ask
            // for it.  The NAK names the window edge, so no ACK is needed
            // on top.
            self.send_nak(host);
            return;
        }
        self.send_ack(host);
    }

    /// Deliver every contiguous frame at the window edge upward.
    fn deliver_ready<H: ReceiverHost>(&mut self, host: &mut H) {
        while self.in_buf[self.window_start as usize].received {
            let slot = &mut self.in_buf[self.window_start as usize];
            host.deliver_to_upper(slot.frame.payload());
            slot.received = false;
            seq::inc(&mut self.window_start);
        }
    }

    fn send_ack<H: ReceiverHost>(&mut self, host: &mut H) {
        let ack = seq::minus(self.window_start, 1);
        log::debug!("[receiver] → ACK ack={ack}");
        host.send_to_lower(Frame::control(flags::ACK, ack));
    }

    fn send_nak<H: ReceiverHost>(&mut self, host: &mut H) {
        log::debug!("[receiver] → NAK seq={}", self.window_start);
        host.send_to_lower(Frame::control(flags::NAK, self.window_start));
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
