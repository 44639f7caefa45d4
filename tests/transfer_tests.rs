//! End-to-end transfer tests through the discrete-event simulator.
//!
//! Each test streams bytes from the sender's upper layer to the receiver's
//! upper layer under a scripted or probabilistic fault model and checks the
//! delivered stream, the frame counts, and the recovery behavior.  All
//! runs are deterministic: every random decision comes from the seed in
//! the configuration.

use rdt_over_datagram::sender::{SENDER_TIMEOUT, WINDOW_SIZE};
use rdt_over_datagram::simulator::{ChannelConfig, SimConfig, Simulation};

/// A recognisable, deterministic byte pattern.
fn patterned(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i * 31 % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Test 1: lossless transfer uses the minimum number of frames
// ---------------------------------------------------------------------------

#[test]
fn lossless_1000_bytes_in_nine_frames() {
    let mut sim = Simulation::new(SimConfig::default());
    let input = patterned(1000);

    sim.submit_message(0.0, input.clone());
    sim.run();

    // 8 full frames of 122 bytes plus one 24-byte tail.
    assert_eq!(sim.delivered(), input);
    assert_eq!(sim.message_count(), 9);
    assert_eq!(sim.stats().data_frames_sent, 9);

    // Nothing left over: no retransmissions pending, no timers armed.
    assert!(sim.sender().is_quiescent());
    assert_eq!(sim.sender().timers_pending(), 0);
}

// ---------------------------------------------------------------------------
// Test 2: a single dropped data frame costs exactly one retransmission
// ---------------------------------------------------------------------------

#[test]
fn single_drop_recovers_with_one_retransmission() {
    let mut sim = Simulation::new(SimConfig {
        forward: ChannelConfig {
            drop_nth: vec![2],
            ..ChannelConfig::default()
        },
        ..SimConfig::default()
    });
    let input = patterned(1000);

    sim.submit_message(0.0, input.clone());
    sim.run();

    assert_eq!(sim.delivered(), input);
    // 9 distinct frames plus the one retransmission of the dropped frame.
    assert_eq!(sim.stats().data_frames_sent, 10);
    assert!(sim.sender().is_quiescent());
}

// ---------------------------------------------------------------------------
// Test 3: corruption is detected and recovered via NAK fast retransmit
// ---------------------------------------------------------------------------

#[test]
fn corruption_triggers_fast_recovery() {
    let mut sim = Simulation::new(SimConfig {
        forward: ChannelConfig {
            corrupt_nth: vec![3],
            ..ChannelConfig::default()
        },
        ..SimConfig::default()
    });
    let input = patterned(1000);

    sim.submit_message(0.0, input.clone());
    sim.run();

    assert_eq!(sim.delivered(), input);
    assert_eq!(sim.stats().data_frames_sent, 10);

    // The NAK path beat the retransmission timer: the receiver asked for
    // the frame as soon as a later arrival revealed the gap.
    assert!(
        sim.last_delivery_at() < SENDER_TIMEOUT,
        "recovery took {:.3}s, expected fast-retransmit latency",
        sim.last_delivery_at()
    );
}

// ---------------------------------------------------------------------------
// Test 4: reordering is absorbed by the receive buffer
// ---------------------------------------------------------------------------

#[test]
fn reordered_frames_deliver_in_order_exactly_once() {
    let mut sim = Simulation::new(SimConfig {
        forward: ChannelConfig {
            // Hold back the second frame just long enough for the third to
            // overtake it: arrival order 1, 3, 2, 4.
            delay_nth: vec![(2, 0.0015)],
            ..ChannelConfig::default()
        },
        ..SimConfig::default()
    });

    let messages: [&[u8]; 4] = [b"alpha", b"bravo", b"charlie", b"delta"];
    for (i, msg) in messages.iter().enumerate() {
        sim.submit_message(i as f64 * 0.001, msg.to_vec());
    }
    sim.run();

    assert_eq!(sim.delivered(), b"alphabravocharliedelta");
    assert_eq!(sim.message_count(), 4);
    // The buffered recovery never needed the retransmission timer.
    assert!(sim.stats().finished_at < SENDER_TIMEOUT);
}

// ---------------------------------------------------------------------------
// Test 5: a burst larger than the ring spills into the overflow FIFO
// ---------------------------------------------------------------------------

#[test]
fn burst_beyond_ring_drains_overflow_in_order() {
    let mut sim = Simulation::new(SimConfig::default());
    // 255 slots fill the ring; 45 more frames' worth must wait in the
    // overflow FIFO until ACKs free slots.
    let input = patterned(300 * 122);

    sim.submit_message(0.0, input.clone());
    sim.run();

    assert_eq!(sim.delivered(), input);
    assert_eq!(sim.stats().data_frames_sent, 300);
    assert!(
        sim.stats().overflow_peak > 0,
        "burst never reached the overflow FIFO"
    );
    assert!(sim.sender().is_quiescent());
}

// ---------------------------------------------------------------------------
// Test 6: repeated NAKs for one missing frame collapse to one retransmit
// ---------------------------------------------------------------------------

#[test]
fn nak_burst_is_absorbed_to_a_single_retransmission() {
    let mut sim = Simulation::new(SimConfig {
        forward: ChannelConfig {
            drop_nth: vec![2],
            ..ChannelConfig::default()
        },
        ..SimConfig::default()
    });

    // Five messages, five frames; dropping the second means the three
    // later arrivals each observe the same gap and each emit a NAK —
    // all three inside one NAK_TIMEOUT window.
    for i in 0..5u8 {
        sim.submit_message(i as f64 * 0.001, vec![i; 100]);
    }
    sim.run();

    let expected: Vec<u8> = (0..5u8).flat_map(|i| vec![i; 100]).collect();
    assert_eq!(sim.delivered(), expected);
    assert_eq!(sim.message_count(), 5);

    // 5 distinct frames + exactly 1 fast retransmission; the duplicate
    // NAKs were absorbed while the short resend timer was pending.
    assert_eq!(sim.stats().data_frames_sent, 6);
}

// ---------------------------------------------------------------------------
// Test 7: the stream survives a hostile channel in both directions
// ---------------------------------------------------------------------------

#[test]
fn hostile_channel_still_delivers_in_order() {
    let faults = ChannelConfig {
        loss_rate: 0.2,
        corrupt_rate: 0.1,
        duplicate_rate: 0.05,
        jitter: 0.03,
        ..ChannelConfig::default()
    };
    let mut sim = Simulation::new(SimConfig {
        seed: 1337,
        forward: faults.clone(),
        reverse: faults,
        ..SimConfig::default()
    });

    let input = patterned(5000);
    for (i, chunk) in input.chunks(100).enumerate() {
        sim.submit_message(i as f64 * 0.01, chunk.to_vec());
    }
    sim.run();

    assert_eq!(sim.delivered(), input);
    assert!(sim.sender().is_quiescent());
    // Losses forced retransmissions beyond the distinct-frame minimum.
    assert!(sim.stats().data_frames_sent > input.len().div_ceil(122) as u64);
}

// ---------------------------------------------------------------------------
// Test 8: window never exceeds its bound, even under pressure
// ---------------------------------------------------------------------------

#[test]
fn in_flight_frames_never_exceed_window() {
    // Reverse-channel loss delays ACKs, keeping the window full for long
    // stretches.
    let mut sim = Simulation::new(SimConfig {
        reverse: ChannelConfig {
            loss_rate: 0.5,
            ..ChannelConfig::default()
        },
        ..SimConfig::default()
    });

    let input = patterned(4000);
    sim.submit_message(0.0, input.clone());
    sim.run();

    assert_eq!(sim.delivered(), input);
    assert!(sim.sender().in_flight() <= WINDOW_SIZE as usize);
    assert!(sim.sender().is_quiescent());
}
