//! Event router: which handlers run for which event type.
//!
//! The router has an explicit two-phase lifecycle. At startup a
//! [`RouterBuilder`] collects handlers per event type; [`RouterBuilder::build`]
//! freezes it into an [`EventRouter`], which has no mutating methods and can
//! be shared by dispatch workers without locking.
//!
//! # Dispatch
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | No handlers for the type | no-op, empty report |
//! | Handlers registered | each runs in registration order, synchronously |
//! | A handler fails | failure is logged and recorded; later handlers still run |

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, error, instrument, trace};

use crate::backend::{Backend, BackendError};
use crate::pipeline::{BuildPipeline, PipelineError};
use crate::replication::ReplicationError;
use crate::types::{BuildNumber, Event, Patch};

/// Errors a handler can return.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A pipeline call failed.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A backend call failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The build was created upstream but could not be recorded. The build
    /// is orphaned: the backend does not know about it.
    #[error("build {build} created for patch {patch} but not recorded: {source}")]
    Unrecorded {
        build: BuildNumber,
        patch: Patch,
        #[source]
        source: BackendError,
    },

    /// Replication to the mirror failed.
    #[error("replication error: {0}")]
    Replication(#[from] ReplicationError),

    /// The event lacks data the handler needs.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Signature shared by every handler.
pub type HandlerFn =
    dyn Fn(&Event, &dyn BuildPipeline, &dyn Backend) -> Result<(), HandlerError> + Send + Sync;

/// A handler with the name it is logged under.
struct Registered {
    name: String,
    handler: Box<HandlerFn>,
}

/// Collects handlers before dispatch starts.
#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<String, Vec<Registered>>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler for `event_type`.
    ///
    /// Registration never replaces or deduplicates: registering the same
    /// handler twice makes it run twice.
    pub fn register<F>(
        &mut self,
        event_type: impl Into<String>,
        name: impl Into<String>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(&Event, &dyn BuildPipeline, &dyn Backend) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        let event_type = event_type.into();
        let name = name.into();
        debug!(event_type = %event_type, handler = %name, "Registering handler");

        self.routes.entry(event_type).or_default().push(Registered {
            name,
            handler: Box::new(handler),
        });
        self
    }

    /// Number of handlers registered so far for `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.routes.get(event_type).map_or(0, Vec::len)
    }

    /// Freezes the routing table.
    pub fn build(self) -> EventRouter {
        EventRouter {
            routes: self.routes,
        }
    }
}

/// A handler failure recorded during one dispatch.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: HandlerError,
}

/// Outcome of dispatching one event.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Number of handlers that ran.
    pub invoked: usize,

    /// Handlers that returned an error, in the order they ran.
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// Returns true if every handler that ran succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A frozen routing table.
pub struct EventRouter {
    routes: HashMap<String, Vec<Registered>>,
}

impl EventRouter {
    /// Number of handlers registered for `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.routes.get(event_type).map_or(0, Vec::len)
    }

    /// Names of the handlers for `event_type`, in dispatch order.
    pub fn handler_names(&self, event_type: &str) -> Vec<&str> {
        self.routes
            .get(event_type)
            .map(|handlers| handlers.iter().map(|h| h.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Total number of handlers across all event types.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Returns true if no handler is registered for any event type.
    pub fn is_empty(&self) -> bool {
        self.routes.values().all(Vec::is_empty)
    }

    /// Runs every handler registered for `event.kind`.
    #[instrument(
        skip_all,
        fields(
            event_type = %event.kind,
            change = %event.change.number,
            patchset = %event.patch_set.number,
        )
    )]
    pub fn dispatch(
        &self,
        event: &Event,
        pipeline: &dyn BuildPipeline,
        backend: &dyn Backend,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let Some(handlers) = self.routes.get(&event.kind) else {
            trace!("No handlers registered, ignoring event");
            return report;
        };

        for registered in handlers {
            report.invoked += 1;
            match (registered.handler)(event, pipeline, backend) {
                Ok(()) => {
                    trace!(handler = %registered.name, "Handler succeeded");
                }
                Err(e) => {
                    error!(handler = %registered.name, error = %e, "Handler failed");
                    report.failures.push(HandlerFailure {
                        handler: registered.name.clone(),
                        error: e,
                    });
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<(&str, Vec<&str>)> = self
            .routes
            .keys()
            .map(|k| (k.as_str(), self.handler_names(k)))
            .collect();
        routes.sort();
        f.debug_struct("EventRouter").field("routes", &routes).finish()
    }
}
