//! `udcn` — the forwarding daemon entry point.
//!
//! Loads a [`rust_udcn_fwd::config::ForwarderConfig`], builds the shared
//! FIB and one [`rust_udcn_fwd::forwarder::WorkerFwd`] per configured
//! worker, and (when certificate/key paths are configured) brings up a
//! QUIC listener so remote faces can attach. This binary is deliberately
//! thin: `rust-udcn-cli` remains the place an operator issues one-shot
//! commands (publish, fetch, benchmark); this one just keeps the
//! dataplane running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use rust_udcn_fwd::config::ForwarderConfig;
use rust_udcn_fwd::fib::Fib;
use rust_udcn_fwd::forwarder::WorkerFwd;

#[derive(Parser)]
#[clap(name = "udcn", about = "µDCN forwarding daemon")]
struct Args {
    /// Path to a TOML config file (`UDCN_*` environment variables always
    /// override it).
    #[clap(short, long)]
    config: Option<String>,

    /// QUIC listen address, overriding the config file.
    #[clap(long)]
    listen: Option<String>,

    /// TLS certificate path for the QUIC listener.
    #[clap(long)]
    cert: Option<String>,

    /// TLS private key path for the QUIC listener.
    #[clap(long)]
    key: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cfg = ForwarderConfig::load(args.config.as_deref())?;
    info!(
        "starting {} worker(s), pcct_capacity={}, cs_capacity={}",
        cfg.worker_count, cfg.pcct_capacity, cfg.cs_capacity
    );

    let fib = Arc::new(Fib::new());

    let mut handles = Vec::with_capacity(cfg.worker_count);
    for worker_id in 0..cfg.worker_count as u16 {
        let fib = Arc::clone(&fib);
        let pcct_capacity = cfg.pcct_capacity;
        let cs_capacity = cfg.cs_capacity;
        let tick = Duration::from_millis(cfg.timer_tick_ms.max(1));

        handles.push(std::thread::spawn(move || {
            let mut worker = WorkerFwd::new(worker_id, fib, pcct_capacity, cs_capacity);
            info!("worker {worker_id} started");
            loop {
                let expired = worker.poll_timers(Instant::now());
                if expired > 0 {
                    log::trace!("worker {worker_id} reaped {expired} expired PIT entr(y/ies)");
                }
                std::thread::sleep(tick);
            }
        }));
    }

    if let (Some(cert), Some(key)) = (args.cert, args.key) {
        let listen = args.listen.unwrap_or_else(|| "0.0.0.0:6367".to_string());
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(run_quic_listener(listen, cert, key))?;
    } else {
        warn!("no --cert/--key configured; running dataplane workers only, no QUIC listener");
        for handle in handles {
            let _ = handle.join();
        }
    }

    Ok(())
}

async fn run_quic_listener(listen: String, cert: String, key: String) -> Result<()> {
    use rust_udcn_quic::{NdnQuicServer, ServerOptions};

    let options = ServerOptions {
        listen_addr: listen,
        cert_path: cert.into(),
        key_path: key.into(),
        ..Default::default()
    };
    let server = NdnQuicServer::new(options).await?;
    info!("QUIC listener up on {}", server.address());
    server.run().await?;

    // Keep the process alive; `run` spawns its own accept loop.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
