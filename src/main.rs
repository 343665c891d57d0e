//! crowdsim — agent-based market simulator.
//!
//! Thread layout:
//!
//! ```text
//! ┌──────────────┐   ops / state lock   ┌──────────────┐
//! │ HTTP surface │ ◄──────────────────► │ engine loop  │
//! │  (tokio)     │                      │  (thread)    │
//! └──────────────┘                      └──────┬───────┘
//!                                              │ record pulls
//!                                       ┌──────▼───────┐     UDP
//!                                       │ subscriber   │ ───────────►
//!                                       │ manager      │  endpoints
//!                                       └──────────────┘
//! ```
//!
//! SIGINT/SIGTERM run the graceful path: stop the HTTP listener, shut the
//! engine and the manager down, join both threads.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing::{error, info};

use engine::{Market, MarketConfig};
use server::AppState;
use subscribers::SubscriberSet;

use config::Cli;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install SIGINT handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter())),
        )
        .init();

    let subscribers = Arc::new(SubscriberSet::new(cli.subscriber_max_records));
    subscribers.set_poll_interval(cli.subscriber_poll_interval);

    let market = Arc::new(Market::new(Arc::clone(&subscribers)));
    market.configure(MarketConfig {
        iter_block: Some(cli.iter_block),
    });

    let engine_thread = match market.launch() {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to launch engine");
            return std::process::ExitCode::FAILURE;
        }
    };

    let manager_thread = {
        let subscribers = Arc::clone(&subscribers);
        thread::Builder::new()
            .name("subscriber-manager".to_string())
            .spawn(move || subscribers.run_manager())
            .expect("spawning the subscriber manager thread")
    };

    let addr = SocketAddr::new(cli.interface_address, cli.interface_port);
    let state = AppState::new(Arc::clone(&market));
    if let Err(e) = server::serve(addr, state, shutdown_signal()).await {
        error!(error = %e, "control surface failed");
        market.shutdown();
        subscribers.shutdown();
        return std::process::ExitCode::FAILURE;
    }

    info!("shutting down");
    market.shutdown();
    subscribers.shutdown();

    if engine_thread.join().is_err() {
        error!("engine thread panicked");
    }
    if manager_thread.join().is_err() {
        error!("subscriber manager thread panicked");
    }

    info!("goodbye");
    std::process::ExitCode::SUCCESS
}
