use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patchset_relay::app::{build_event_router, open_backend};
use patchset_relay::config::RelayArgs;
use patchset_relay::pipeline::DryRunPipeline;
use patchset_relay::server::{self, AppState};
use patchset_relay::worker::{
    DispatchContext, EVENT_CHANNEL_BUFFER, forward_events, run_dispatch_loop,
};

/// Reads review events as JSON lines on stdin until end of input or ctrl-c.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patchset_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match RelayArgs::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let backend = match open_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "Failed to open backend");
            return ExitCode::FAILURE;
        }
    };

    let router = Arc::new(build_event_router(&config));
    if router.is_empty() {
        warn!("No handlers enabled; events will be read and ignored");
    }
    info!(?router, "Router ready");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, shutting down");
                    shutdown.cancel();
                }
                Err(e) => warn!(error = %e, "Cannot listen for ctrl-c"),
            }
        }
    });

    let health = config.health_addr.map(|addr| {
        let state = AppState::new(Arc::clone(&router));
        tokio::spawn(server::serve(addr, state, shutdown.clone()))
    });

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
    let context = DispatchContext {
        router,
        pipeline: Arc::new(DryRunPipeline::new()),
        backend,
    };
    let dispatcher = tokio::spawn(run_dispatch_loop(rx, context, shutdown.clone()));

    // Dropping the sender at end of input lets the loop drain and stop. A
    // pending stdin read can hold up exit after ctrl-c until a line arrives.
    let mut exit = ExitCode::SUCCESS;
    match forward_events(BufReader::new(tokio::io::stdin()), tx, shutdown.clone()).await {
        Ok(stats) => info!(
            forwarded = stats.forwarded,
            skipped = stats.skipped,
            "Event stream finished"
        ),
        Err(e) => {
            error!(error = %e, "Event stream failed");
            exit = ExitCode::FAILURE;
        }
    }

    if let Err(e) = dispatcher.await {
        error!(error = %e, "Dispatch loop failed");
        exit = ExitCode::FAILURE;
    }

    shutdown.cancel();
    if let Some(health) = health {
        match health.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Health endpoint failed");
                exit = ExitCode::FAILURE;
            }
            Err(e) => error!(error = %e, "Health endpoint task failed"),
        }
    }

    exit
}
