//! Retransmission timer queue.
//!
//! The host supplies exactly one one-shot timer, but the sender needs one
//! logical deadline per in-flight frame.  [`TimerQueue`] multiplexes the
//! two: it keeps pending `(id, deadline)` entries sorted by deadline
//! (insertion order breaks ties) and keeps the host timer armed for the
//! head entry.  Invariant: the host timer's deadline equals the head
//! entry's deadline, and the host timer is disarmed iff the queue is empty.
//!
//! Ids are sequence numbers; the sender cancels before re-adding so each
//! frame has at most one pending entry.

use std::collections::VecDeque;

use crate::host::SenderHost;
use crate::seq::Seq;

/// Slop absorbed when draining expired entries (5 ms).  The host clock is
/// floating point; an entry due "now" may show a deadline marginally ahead.
pub const EXPIRY_EPSILON: f64 = 5e-3;

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    id: Seq,
    deadline: f64,
}

/// Time-ordered pending deadlines backing the host's one-shot timer.
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: VecDeque<TimerEntry>,
}

impl TimerQueue {
    pub fn new() -> Self {
        TimerQueue {
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Schedule `id` to expire `timeout` seconds from now.
    ///
    /// If the new entry becomes the earliest, the host timer is re-armed
    /// for it.
    pub fn add<H: SenderHost>(&mut self, host: &mut H, id: Seq, timeout: f64) {
        debug_assert!(
            self.entries.iter().all(|e| e.id != id),
            "second pending timer for seq {id}"
        );
        let deadline = host.now() + timeout;
        let pos = self
            .entries
            .iter()
            .position(|e| deadline < e.deadline)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, TimerEntry { id, deadline });
        if pos == 0 {
            if host.timer_is_set() {
                host.timer_stop();
            }
            host.timer_start(timeout);
        }
    }

    /// Remove the pending entry for `id`, re-arming the host timer if the
    /// head changed.  Cancelling an absent id is a soft error.
    pub fn cancel<H: SenderHost>(&mut self, host: &mut H, id: Seq) {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            log::warn!("[timer] cancel: seq {id} not in queue");
            return;
        };
        self.entries.remove(pos);
        if pos == 0 {
            if host.timer_is_set() {
                host.timer_stop();
            }
            if let Some(head) = self.entries.front() {
                host.timer_start((head.deadline - host.now()).max(0.0));
            }
        }
    }

    /// Handle a host timer expiry: pop every entry due within
    /// [`EXPIRY_EPSILON`] of now, in ascending-deadline order, and return
    /// their ids.  Re-arms the host timer for the new head if one remains.
    pub fn on_expiry<H: SenderHost>(&mut self, host: &mut H) -> Vec<Seq> {
        if self.entries.is_empty() {
            log::warn!("[timer] expiry with an empty queue");
            return Vec::new();
        }
        let now = host.now();
        let mut due = Vec::new();
        while let Some(&TimerEntry { id, deadline }) = self.entries.front() {
            if deadline > now + EXPIRY_EPSILON {
                break;
            }
            self.entries.pop_front();
            due.push(id);
        }
        if due.is_empty() {
            if let Some(head) = self.entries.front() {
                log::warn!(
                    "[timer] fired early: now = {now:.3}s, head due at {:.3}s",
                    head.deadline
                );
            }
        }
        if let Some(head) = self.entries.front() {
            host.timer_start((head.deadline - now).max(0.0));
        }
        due
    }
}
