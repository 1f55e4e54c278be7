//! The dispatch loop: events in, handlers run.
//!
//! An event source (see [`forward_events`]) feeds decoded events into a
//! bounded channel. [`run_dispatch_loop`] takes them one at a time and hands
//! each to the frozen router on tokio's blocking pool, because the ports and
//! git are synchronous. The next event is not taken until the current
//! dispatch has finished, so events from one channel are handled in order.

mod source;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backend::Backend;
use crate::pipeline::BuildPipeline;
use crate::router::EventRouter;
use crate::types::Event;

pub use source::{ForwardStats, SourceError, forward_events};

/// Capacity of the channel between an event source and the dispatch loop.
/// A full channel blocks the source.
pub const EVENT_CHANNEL_BUFFER: usize = 16;

/// Everything a dispatch needs, shared with the blocking pool.
#[derive(Clone)]
pub struct DispatchContext {
    pub router: Arc<EventRouter>,
    pub pipeline: Arc<dyn BuildPipeline>,
    pub backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Counters from one run of the dispatch loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events taken off the channel.
    pub events: u64,

    /// Handler failures across all events.
    pub handler_failures: u64,

    /// Dispatches that panicked.
    pub panicked: u64,
}

/// Dispatches events until the channel closes or `shutdown` fires.
///
/// A dispatch already in progress when `shutdown` fires runs to completion.
pub async fn run_dispatch_loop(
    mut rx: mpsc::Receiver<Event>,
    context: DispatchContext,
    shutdown: CancellationToken,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    info!("Dispatch loop started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Shutdown signal received, stopping dispatch loop");
                break;
            }

            event = rx.recv() => {
                let Some(event) = event else {
                    info!("Event channel closed");
                    break;
                };
                stats.events += 1;
                debug!(event_type = %event.kind, "Dispatching event");

                let ctx = context.clone();
                let dispatched = tokio::task::spawn_blocking(move || {
                    ctx.router
                        .dispatch(&event, ctx.pipeline.as_ref(), ctx.backend.as_ref())
                })
                .await;

                match dispatched {
                    Ok(report) => stats.handler_failures += report.failures.len() as u64,
                    Err(e) => {
                        error!(error = %e, "Dispatch task failed");
                        stats.panicked += 1;
                    }
                }
            }
        }
    }

    info!(
        events = stats.events,
        handler_failures = stats.handler_failures,
        "Dispatch loop stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::register_build_handlers;
    use crate::router::{HandlerError, RouterBuilder};
    use crate::test_utils::{MockBackend, MockPipeline, comment_added, patchset_created};
    use crate::types::{BuildNumber, kind};

    fn build_router() -> Arc<EventRouter> {
        let mut builder = RouterBuilder::new();
        register_build_handlers(&mut builder);
        Arc::new(builder.build())
    }

    fn context(
        router: Arc<EventRouter>,
        pipeline: &Arc<MockPipeline>,
        backend: &Arc<MockBackend>,
    ) -> DispatchContext {
        DispatchContext {
            router,
            pipeline: pipeline.clone(),
            backend: backend.clone(),
        }
    }

    #[tokio::test]
    async fn dispatches_in_order_until_channel_closes() {
        let pipeline = Arc::new(MockPipeline::new());
        let backend = Arc::new(MockBackend::new());
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);

        tx.send(patchset_created(42, 1)).await.unwrap();
        tx.send(patchset_created(42, 2)).await.unwrap();
        tx.send(comment_added(42, 2, "looks good")).await.unwrap();
        drop(tx);

        let stats = run_dispatch_loop(
            rx,
            context(build_router(), &pipeline, &backend),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(stats.events, 3);
        assert_eq!(stats.handler_failures, 0);
        assert_eq!(pipeline.create_calls(), 2);
        // Patchset 2 was dispatched after patchset 1 was recorded.
        assert_eq!(pipeline.cancelled(), vec![BuildNumber(1)]);
    }

    #[tokio::test]
    async fn counts_handler_failures() {
        let pipeline = Arc::new(MockPipeline::new().failing_create());
        let backend = Arc::new(MockBackend::new());
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);

        tx.send(patchset_created(1, 1)).await.unwrap();
        tx.send(comment_added(1, 1, "retest")).await.unwrap();
        drop(tx);

        let stats = run_dispatch_loop(
            rx,
            context(build_router(), &pipeline, &backend),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(stats.events, 2);
        assert_eq!(stats.handler_failures, 2);
        assert_eq!(backend.save_calls(), 0);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let pipeline = Arc::new(MockPipeline::new());
        let backend = Arc::new(MockBackend::new());
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run_dispatch_loop(
            rx,
            context(build_router(), &pipeline, &backend),
            shutdown.clone(),
        ));
        shutdown.cancel();

        // The sender is still open; the loop stops because of the token.
        let stats = handle.await.unwrap();
        assert_eq!(stats.events, 0);
        assert_eq!(pipeline.create_calls(), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_the_loop() {
        let mut builder = RouterBuilder::new();
        builder.register(kind::COMMENT_ADDED, "panics", |_, _, _| -> Result<(), HandlerError> {
            panic!("handler bug")
        });
        let pipeline = Arc::new(MockPipeline::new());
        let backend = Arc::new(MockBackend::new());
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);

        tx.send(comment_added(1, 1, "x")).await.unwrap();
        tx.send(comment_added(1, 1, "y")).await.unwrap();
        drop(tx);

        let stats = run_dispatch_loop(
            rx,
            context(Arc::new(builder.build()), &pipeline, &backend),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(stats.events, 2);
        assert_eq!(stats.panicked, 2);
    }
}
