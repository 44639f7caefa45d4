//! The seam between the protocol core and its host environment.
//!
//! The sender and receiver are pure event-driven state machines: every
//! externally visible effect (transmitting a frame, arming the one-shot
//! timer, delivering bytes upward) goes through one of these traits, and
//! every input arrives as a handler call.  The discrete-event simulator in
//! [`crate::simulator`] is the production implementation; unit tests pass
//! the same mailbox types directly.

use crate::packet::Frame;

/// Host services available to the sender.
pub trait SenderHost {
    /// Hand a frame to the lower layer.  Fire-and-forget: the channel may
    /// drop, corrupt, delay, or reorder it.
    fn send_to_lower(&mut self, frame: Frame);

    /// Arm the single one-shot timer to fire `timeout` seconds from now.
    /// The timer must not already be set.
    fn timer_start(&mut self, timeout: f64);

    /// Disarm the one-shot timer.
    fn timer_stop(&mut self);

    /// `true` while the one-shot timer is armed.
    fn timer_is_set(&self) -> bool;

    /// Monotonic simulation time in seconds.
    fn now(&self) -> f64;
}

/// Host services available to the receiver.
///
/// The receiver has no timer; its only outputs are control frames and
/// in-order upward deliveries.
pub trait ReceiverHost {
    /// Hand a control frame to the lower layer.
    fn send_to_lower(&mut self, frame: Frame);

    /// Deliver a reassembled message to the upper layer.
    fn deliver_to_upper(&mut self, payload: &[u8]);

    /// Monotonic simulation time in seconds.
    fn now(&self) -> f64;
}
