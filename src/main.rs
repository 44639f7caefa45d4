//! Entry point for `rdt-over-datagram`.
//!
//! Parses CLI arguments, runs one simulated transfer under the requested
//! fault model, verifies the delivered stream against the input, and prints
//! a short report.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, argument parsing).

use anyhow::{ensure, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rdt_over_datagram::simulator::{ChannelConfig, SimConfig, Simulation};

/// Reliable byte stream over a simulated lossy datagram channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Total payload bytes to stream through the protocol.
    #[arg(long, default_value_t = 10_000)]
    bytes: usize,

    /// Size of each upper-layer message.
    #[arg(long, default_value_t = 500)]
    message_size: usize,

    /// Seconds between consecutive upper-layer messages.
    #[arg(long, default_value_t = 0.01)]
    message_interval: f64,

    /// Probability that a frame is dropped in transit.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,

    /// Probability that a frame has a random bit flipped.
    #[arg(long, default_value_t = 0.05)]
    corrupt: f64,

    /// Probability that a frame is delivered twice.
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,

    /// Base one-way latency in seconds.
    #[arg(long, default_value_t = 0.1)]
    latency: f64,

    /// Extra uniform random delay in seconds (overlap causes reordering).
    #[arg(long, default_value_t = 0.02)]
    jitter: f64,

    /// RNG seed; identical seeds reproduce identical runs.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    ensure!(cli.bytes > 0, "--bytes must be positive");
    ensure!(cli.message_size > 0, "--message-size must be positive");
    for (name, rate) in [
        ("--loss", cli.loss),
        ("--corrupt", cli.corrupt),
        ("--duplicate", cli.duplicate),
    ] {
        ensure!((0.0..1.0).contains(&rate), "{name} must be in [0, 1)");
    }
    ensure!(cli.latency >= 0.0, "--latency must be non-negative");
    ensure!(cli.jitter >= 0.0, "--jitter must be non-negative");

    let faults = ChannelConfig {
        loss_rate: cli.loss,
        corrupt_rate: cli.corrupt,
        duplicate_rate: cli.duplicate,
        latency: cli.latency,
        jitter: cli.jitter,
        ..ChannelConfig::default()
    };
    let mut sim = Simulation::new(SimConfig {
        seed: cli.seed,
        forward: faults.clone(),
        reverse: faults,
        ..SimConfig::default()
    });

    // A deterministic pseudo-random input stream, reproducible from the seed.
    let mut payload_rng = StdRng::seed_from_u64(cli.seed ^ 0x5EED);
    let input: Vec<u8> = (0..cli.bytes).map(|_| payload_rng.random()).collect();

    log::info!(
        "streaming {} bytes as {}-byte messages (loss={}, corrupt={}, seed={})",
        cli.bytes,
        cli.message_size,
        cli.loss,
        cli.corrupt,
        cli.seed
    );
    for (i, chunk) in input.chunks(cli.message_size).enumerate() {
        sim.submit_message(i as f64 * cli.message_interval, chunk.to_vec());
    }
    sim.run();

    ensure!(
        sim.delivered() == &input[..],
        "delivered stream diverges from input ({} of {} bytes arrived)",
        sim.delivered().len(),
        input.len()
    );

    let stats = sim.stats();
    let frames_needed = input.len().div_ceil(rdt_over_datagram::packet::PAYLOAD_MAX) as u64;
    println!("delivered    : {} bytes, in order, exactly once", input.len());
    println!(
        "data frames  : {} sent ({} minimum, {} retransmitted or re-sent)",
        stats.data_frames_sent,
        frames_needed,
        stats.data_frames_sent.saturating_sub(frames_needed)
    );
    println!("control      : {} ACK/NAK frames", stats.control_frames_sent);
    println!("virtual time : {:.3}s", stats.finished_at);
    Ok(())
}
