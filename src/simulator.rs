//! Discrete-event network simulator hosting one sender/receiver pair.
//!
//! Real channels drop, reorder, corrupt, and delay packets.  To exercise
//! the reliability mechanisms without depending on actual network
//! conditions, this module drives the protocol under a virtual clock and a
//! configurable fault model:
//!
//! | Fault        | Description                                          |
//! |--------------|------------------------------------------------------|
//! | Packet loss  | Drop a frame with probability `loss_rate`.           |
//! | Corruption   | Flip a random bit with probability `corrupt_rate`.   |
//! | Duplication  | Deliver a frame twice with probability `duplicate_rate`. |
//! | Reordering   | `latency` plus uniform `jitter`; overlapping jitter lets later frames overtake earlier ones. |
//! | Scripted     | Drop / corrupt / delay the nth frame of a direction, for deterministic tests. |
//!
//! Every random decision comes from a single seeded [`StdRng`], so a
//! failing run is reproducible from its seed alone.
//!
//! The simulator owns both endpoints and plays host to them: protocol
//! outputs land in per-endpoint mailboxes ([`SenderIo`], [`ReceiverIo`])
//! which the event loop drains after each handler call.  The sender's
//! one-shot timer is an absolute deadline in its mailbox; the loop fires
//! whichever comes first, that deadline or the earliest queued event.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::host::{ReceiverHost, SenderHost};
use crate::packet::{Frame, PKT_SIZE};
use crate::receiver::Receiver;
use crate::sender::Sender;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fault model for one direction of the channel.
///
/// All probabilities are in `[0.0, 1.0]`; scripted fault indices are
/// 1-based counts of frames entering this direction.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Probability that a frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a frame has one random bit flipped.
    pub corrupt_rate: f64,
    /// Probability that a frame is delivered twice.
    pub duplicate_rate: f64,
    /// Base one-way delay in seconds.
    pub latency: f64,
    /// Extra uniform random delay in seconds.
    pub jitter: f64,
    /// Drop the nth frame (once each).
    pub drop_nth: Vec<u64>,
    /// Corrupt the nth frame (a covered header bit, so detection is certain).
    pub corrupt_nth: Vec<u64>,
    /// Add a fixed extra delay to the nth frame.
    pub delay_nth: Vec<(u64, f64)>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        // Fault-free pass-through with a tenth of a second of latency.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            latency: 0.1,
            jitter: 0.0,
            drop_nth: Vec::new(),
            corrupt_nth: Vec::new(),
            delay_nth: Vec::new(),
        }
    }
}

/// Full simulation configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// RNG seed; identical seeds reproduce identical runs.
    pub seed: u64,
    /// Fault model for the data direction (sender → receiver).
    pub forward: ChannelConfig,
    /// Fault model for the control direction (receiver → sender).
    pub reverse: ChannelConfig,
    /// Virtual-time horizon; the run stops here even if not quiescent.
    pub max_time: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            forward: ChannelConfig::default(),
            reverse: ChannelConfig::default(),
            max_time: 600.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Host mailboxes
// ---------------------------------------------------------------------------

/// Sender-side host: collects outputs of one handler call and models the
/// single one-shot timer as an absolute deadline.
#[derive(Debug, Default)]
pub struct SenderIo {
    /// Current virtual time, kept up to date by the event loop.
    pub clock: f64,
    /// Frames handed to the lower layer since the last drain.
    pub outbox: Vec<Frame>,
    /// Absolute deadline of the one-shot timer, if armed.
    pub timer_deadline: Option<f64>,
}

impl SenderHost for SenderIo {
    fn send_to_lower(&mut self, frame: Frame) {
        self.outbox.push(frame);
    }

    fn timer_start(&mut self, timeout: f64) {
        debug_assert!(
            self.timer_deadline.is_none(),
            "one-shot timer armed while already set"
        );
        self.timer_deadline = Some(self.clock + timeout);
    }

    fn timer_stop(&mut self) {
        self.timer_deadline = None;
    }

    fn timer_is_set(&self) -> bool {
        self.timer_deadline.is_some()
    }

    fn now(&self) -> f64 {
        self.clock
    }
}

/// Receiver-side host: collects control frames and upward deliveries.
#[derive(Debug, Default)]
pub struct ReceiverIo {
    /// Current virtual time, kept up to date by the event loop.
    pub clock: f64,
    /// Control frames handed to the lower layer since the last drain.
    pub outbox: Vec<Frame>,
    /// Concatenation of everything delivered to the upper layer.
    pub delivered: Vec<u8>,
    /// Number of upward deliveries.
    pub messages: usize,
    /// Virtual time of the most recent upward delivery.
    pub last_delivery_at: f64,
}

impl ReceiverHost for ReceiverIo {
    fn send_to_lower(&mut self, frame: Frame) {
        self.outbox.push(frame);
    }

    fn deliver_to_upper(&mut self, payload: &[u8]) {
        self.delivered.extend_from_slice(payload);
        self.messages += 1;
        self.last_delivery_at = self.clock;
    }

    fn now(&self) -> f64 {
        self.clock
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// One direction of the lossy channel.
struct Channel {
    label: &'static str,
    config: ChannelConfig,
    crossed: u64,
}

impl Channel {
    fn new(label: &'static str, config: ChannelConfig) -> Self {
        Channel {
            label,
            config,
            crossed: 0,
        }
    }

    /// Decide the fate of one frame.  Returns the delivery delays: empty
    /// means dropped, two entries mean duplicated.  `bytes` is mutated in
    /// place on corruption.
    fn transit(&mut self, rng: &mut StdRng, bytes: &mut [u8; PKT_SIZE]) -> Vec<f64> {
        self.crossed += 1;
        let n = self.crossed;

        if self.config.drop_nth.contains(&n) || rng.random::<f64>() < self.config.loss_rate {
            log::debug!("[channel:{}] frame #{n} lost", self.label);
            return Vec::new();
        }

        if self.config.corrupt_nth.contains(&n) {
            bytes[0] ^= 0x01;
            log::debug!("[channel:{}] frame #{n} corrupted (scripted)", self.label);
        } else if rng.random::<f64>() < self.config.corrupt_rate {
            let bit = rng.random_range(0..PKT_SIZE * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);
            log::debug!("[channel:{}] frame #{n} corrupted (bit {bit})", self.label);
        }

        let mut delay = self.config.latency + self.sample_jitter(rng);
        if let Some(&(_, extra)) = self.config.delay_nth.iter().find(|&&(i, _)| i == n) {
            delay += extra;
        }

        let mut deliveries = vec![delay];
        if rng.random::<f64>() < self.config.duplicate_rate {
            deliveries.push(self.config.latency + self.sample_jitter(rng));
            log::debug!("[channel:{}] frame #{n} duplicated", self.label);
        }
        deliveries
    }

    fn sample_jitter(&self, rng: &mut StdRng) -> f64 {
        if self.config.jitter > 0.0 {
            rng.random_range(0.0..self.config.jitter)
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Event queue
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum EventKind {
    /// The upper layer hands a message to the sender.
    UpperMessage(Vec<u8>),
    /// A datagram reaches the receiver's lower layer.
    ToReceiver([u8; PKT_SIZE]),
    /// A datagram reaches the sender's lower layer.
    ToSender([u8; PKT_SIZE]),
}

#[derive(Debug)]
struct Event {
    at: f64,
    /// Insertion counter; breaks timestamp ties first-scheduled-first.
    seq_no: u64,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then_with(|| self.seq_no.cmp(&other.seq_no))
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone)]
pub struct SimStats {
    /// Data frames the sender handed to the channel, retransmissions
    /// included (counted before faults apply).
    pub data_frames_sent: u64,
    /// Control frames the receiver handed to the channel.
    pub control_frames_sent: u64,
    /// Highest number of chunks ever waiting in the sender's overflow FIFO.
    pub overflow_peak: usize,
    /// Virtual time when the run ended.
    pub finished_at: f64,
}

/// A complete simulated run: both endpoints, both channel directions, a
/// virtual clock, and an event heap.
pub struct Simulation {
    clock: f64,
    max_time: f64,
    events: BinaryHeap<Reverse<Event>>,
    next_event_no: u64,
    rng: StdRng,
    sender: Sender,
    receiver: Receiver,
    sender_io: SenderIo,
    receiver_io: ReceiverIo,
    forward: Channel,
    reverse: Channel,
    stats: SimStats,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        log::info!("[sim] seed={}", config.seed);
        Simulation {
            clock: 0.0,
            max_time: config.max_time,
            events: BinaryHeap::new(),
            next_event_no: 0,
            rng: StdRng::seed_from_u64(config.seed),
            sender: Sender::new(),
            receiver: Receiver::new(),
            sender_io: SenderIo::default(),
            receiver_io: ReceiverIo::default(),
            forward: Channel::new("data", config.forward),
            reverse: Channel::new("ctrl", config.reverse),
            stats: SimStats::default(),
        }
    }

    /// Schedule an upper-layer message for the sender at virtual time `at`.
    pub fn submit_message(&mut self, at: f64, data: Vec<u8>) {
        self.schedule(at, EventKind::UpperMessage(data));
    }

    /// Run until quiescence (no queued events, timer disarmed) or until
    /// the virtual-time horizon.
    pub fn run(&mut self) {
        loop {
            let event_at = self.events.peek().map(|Reverse(e)| e.at);
            let timer_at = self.sender_io.timer_deadline;
            let (at, fire_timer) = match (event_at, timer_at) {
                (None, None) => break,
                (Some(e), None) => (e, false),
                (None, Some(t)) => (t, true),
                // Ties go to the event: the timer only preempts when it is
                // strictly earlier.
                (Some(e), Some(t)) => {
                    if t < e {
                        (t, true)
                    } else {
                        (e, false)
                    }
                }
            };
            if at > self.max_time {
                log::warn!("[sim] horizon {}s reached before quiescence", self.max_time);
                break;
            }
            self.clock = at;
            self.sender_io.clock = at;
            self.receiver_io.clock = at;

            if fire_timer {
                self.sender_io.timer_deadline = None;
                self.sender.on_timer(&mut self.sender_io);
                self.flush_sender();
                continue;
            }

            let Some(Reverse(event)) = self.events.pop() else {
                break;
            };
            match event.kind {
                EventKind::UpperMessage(data) => {
                    self.sender.from_upper_layer(&mut self.sender_io, &data);
                    self.flush_sender();
                }
                EventKind::ToReceiver(bytes) => {
                    match Frame::decode(&bytes) {
                        Ok(frame) => self.receiver.from_lower_layer(&mut self.receiver_io, &frame),
                        Err(e) => log::warn!("[sim] undecodable datagram: {e}"),
                    }
                    self.flush_receiver();
                }
                EventKind::ToSender(bytes) => {
                    match Frame::decode(&bytes) {
                        Ok(frame) => self.sender.from_lower_layer(&mut self.sender_io, &frame),
                        Err(e) => log::warn!("[sim] undecodable datagram: {e}"),
                    }
                    self.flush_sender();
                }
            }
        }
        self.stats.finished_at = self.clock;
        log::info!(
            "[sim] finished at {:.3}s: {} data frames, {} control frames, {} bytes delivered",
            self.clock,
            self.stats.data_frames_sent,
            self.stats.control_frames_sent,
            self.receiver_io.delivered.len()
        );
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    /// Everything the receiver delivered upward, concatenated.
    pub fn delivered(&self) -> &[u8] {
        &self.receiver_io.delivered
    }

    /// Number of upward deliveries at the receiver.
    pub fn message_count(&self) -> usize {
        self.receiver_io.messages
    }

    /// Virtual time of the last upward delivery.
    pub fn last_delivery_at(&self) -> f64 {
        self.receiver_io.last_delivery_at
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn schedule(&mut self, at: f64, kind: EventKind) {
        let seq_no = self.next_event_no;
        self.next_event_no += 1;
        self.events.push(Reverse(Event { at, seq_no, kind }));
    }

    /// Move the sender's freshly emitted frames through the data channel.
    fn flush_sender(&mut self) {
        let frames: Vec<Frame> = self.sender_io.outbox.drain(..).collect();
        for frame in frames {
            self.stats.data_frames_sent += 1;
            let mut bytes = frame.encode();
            for delay in self.forward.transit(&mut self.rng, &mut bytes) {
                self.schedule(self.clock + delay, EventKind::ToReceiver(bytes));
            }
        }
        self.stats.overflow_peak = self.stats.overflow_peak.max(self.sender.overflow_len());
    }

    /// Move the receiver's control frames through the reverse channel.
    fn flush_receiver(&mut self) {
        let frames: Vec<Frame> = self.receiver_io.outbox.drain(..).collect();
        for frame in frames {
            self.stats.control_frames_sent += 1;
            let mut bytes = frame.encode();
            for delay in self.reverse.transit(&mut self.rng, &mut bytes) {
                self.schedule(self.clock + delay, EventKind::ToSender(bytes));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lossless_single_frame() {
        let mut sim = Simulation::new(SimConfig::default());
        sim.submit_message(0.0, b"hello, world".to_vec());
        sim.run();

        assert_eq!(sim.delivered(), b"hello, world");
        assert_eq!(sim.stats().data_frames_sent, 1);
        assert!(sim.sender().is_quiescent());
    }

    #[test]
    fn same_seed_same_run() {
        let config = SimConfig {
            seed: 7,
            forward: ChannelConfig {
                loss_rate: 0.1,
                corrupt_rate: 0.05,
                jitter: 0.02,
                ..ChannelConfig::default()
            },
            reverse: ChannelConfig {
                loss_rate: 0.1,
                ..ChannelConfig::default()
            },
            ..SimConfig::default()
        };
        let payload = vec![0xA5u8; 2000];

        let mut first = Simulation::new(config.clone());
        first.submit_message(0.0, payload.clone());
        first.run();

        let mut second = Simulation::new(config);
        second.submit_message(0.0, payload.clone());
        second.run();

        assert_eq!(first.delivered(), payload);
        assert_eq!(second.delivered(), payload);
        assert_eq!(
            first.stats().data_frames_sent,
            second.stats().data_frames_sent
        );
        assert_eq!(first.stats().finished_at, second.stats().finished_at);
    }

    #[test]
    fn duplicated_frames_deliver_exactly_once() {
        let mut sim = Simulation::new(SimConfig {
            forward: ChannelConfig {
                duplicate_rate: 1.0,
                ..ChannelConfig::default()
            },
            ..SimConfig::default()
        });
        sim.submit_message(0.0, vec![0x11u8; 600]);
        sim.run();

        assert_eq!(sim.delivered(), vec![0x11u8; 600]);
        assert_eq!(sim.message_count(), 5);
    }
}
