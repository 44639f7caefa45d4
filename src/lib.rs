//! `rdt-over-datagram` — a reliable, ordered byte stream over a lossy
//! simulated datagram channel.
//!
//! # Architecture
//!
//! ```text
//!  upper layer                                      upper layer
//!      │ messages                                 ▲ in-order bytes
//!      ▼                                          │
//!  ┌──────────┐      data frames       ┌──────────┴┐
//!  │  Sender  │──────────────────────▶ │  Receiver │
//!  └────┬─────┘                        └─────┬─────┘
//!       │             ACK / NAK              │
//!       │◀───────────────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────────────────┐
//!  │                  Simulator                    │
//!  │  (virtual clock, one-shot timer, fault-       │
//!  │   injecting channel in both directions)       │
//!  └───────────────────────────────────────────────┘
//! ```
//!
//! The protocol is unidirectional at the payload level: one endpoint
//! streams, the other reassembles and delivers exactly once, in order,
//! surviving loss, corruption, duplication, and reordering.  Recovery is
//! selective repeat — a per-frame retransmission timer at the sender plus
//! NAK-driven fast retransmission requested by the receiver.
//!
//! Each module has a single responsibility:
//! - [`packet`]    — wire format and CRC-16 integrity checksum
//! - [`seq`]       — sequence-number arithmetic on the 8-bit modular ring
//! - [`timer`]     — many logical deadlines over one host one-shot timer
//! - [`sender`]    — sliding-window framing, buffering, retransmission
//! - [`receiver`]  — out-of-order reassembly and ACK/NAK generation
//! - [`host`]      — the traits the endpoints drive their host through
//! - [`simulator`] — discrete-event harness with a configurable fault model

pub mod host;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod timer;
