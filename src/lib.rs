//! Patchset relay - bridges code-review change events to a CI pipeline and
//! mirrors patchsets to a second git repository.
//!
//! Events flow from a source ([`worker::forward_events`]) through the
//! dispatch loop ([`worker::run_dispatch_loop`]) into a frozen
//! [`router::EventRouter`], whose handlers talk to the outside world only
//! through the [`pipeline::BuildPipeline`] and [`backend::Backend`] ports and
//! the [`replication::ChangeReplicator`].

pub mod app;
pub mod backend;
pub mod config;
pub mod orchestrator;
pub mod pipeline;
pub mod replication;
pub mod router;
pub mod server;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_utils;
