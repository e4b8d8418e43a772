//! Forwarding dataplane core for µDCN.
//!
//! This crate owns the per-worker hot path: the combined PIT/CS table
//! (`pcct`), the two-stage LPM FIB (`fib`), the forwarder state machine
//! (`forwarder`), the hashed-wheel timer (`timer`), the NDNLPv2
//! reassembler (`reassembler`), the per-face CoDel queue (`queue`), the
//! strategy ABI (`strategy`) and the face/locator layer (`face`).
//!
//! Concrete transport adapters (QUIC, XDP/eBPF) live in their own
//! crates and talk to this one only through the `Face`/`Strategy`
//! contracts defined here.

pub mod config;
pub mod error;
pub mod face;
pub mod fib;
pub mod forwarder;
pub mod pcct;
pub mod queue;
pub mod reassembler;
pub mod strategy;
pub mod timer;

pub use error::{FwdError, Result};
pub use fib::Fib;
pub use forwarder::WorkerFwd;
