//! Forwarder configuration.
//!
//! Mirrors `rust_udcn_quic::config`'s plain-struct-with-`Default` style:
//! a serde-derived struct with sensible defaults, loadable from a TOML
//! file and environment overrides via the `config` crate. The core
//! (`Fib`, `Pcct`, `WorkerFwd`, ...) never reads this itself — it is
//! constructed once by the CLI/daemon entry point and the resulting
//! values are passed into the constructors explicitly.

use serde::{Deserialize, Serialize};

/// Tunables for one forwarder worker's owned state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Number of worker threads, each with its own `Pcct`/`MinSched`/FIB
    /// read handle.
    pub worker_count: usize,

    /// Maximum number of live PCCT entries (PIT + CS combined) per worker.
    pub pcct_capacity: usize,

    /// Maximum number of Content Store entries held within the PCCT
    /// capacity above; the remainder is available to the PIT.
    pub cs_capacity: usize,

    /// `log2` of the timer wheel's slot count.
    pub timer_wheel_bits: usize,

    /// Timer wheel tick interval, in milliseconds.
    pub timer_tick_ms: u64,

    /// CoDel target sojourn time, in milliseconds, before a face queue
    /// starts dropping.
    pub queue_target_ms: u64,

    /// CoDel control interval, in milliseconds.
    pub queue_interval_ms: u64,

    /// Per-face queue capacity (packets).
    pub queue_capacity: usize,

    /// Maximum number of partially-reassembled NDNLPv2 messages held at
    /// once, per face.
    pub reassembler_capacity: usize,

    /// Name of the strategy registered as the FIB default (`multicast`
    /// or `round-robin`).
    pub default_strategy: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            pcct_capacity: 65536,
            cs_capacity: 16384,
            timer_wheel_bits: 12,
            timer_tick_ms: 10,
            queue_target_ms: 5,
            queue_interval_ms: 100,
            queue_capacity: 1024,
            reassembler_capacity: 256,
            default_strategy: "multicast".to_string(),
        }
    }
}

impl ForwarderConfig {
    /// Loads configuration from an optional TOML file layered under
    /// environment variables prefixed `UDCN_` (e.g. `UDCN_WORKER_COUNT`),
    /// following the same `config`-crate layering the CLI already uses
    /// for QUIC options.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("UDCN").separator("_"));
        let settings = builder.build()?;
        Ok(settings.try_deserialize().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = ForwarderConfig::default();
        assert!(cfg.cs_capacity <= cfg.pcct_capacity);
        assert!(cfg.worker_count >= 1);
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let cfg = ForwarderConfig::load(None).unwrap();
        assert_eq!(cfg.worker_count, ForwarderConfig::default().worker_count);
    }
}
