//! Assembling the relay from its configuration.

use std::sync::Arc;

use tracing::info;

use crate::backend::{Backend, BackendError, FileBackend, MemoryBackend};
use crate::config::RelayConfig;
use crate::orchestrator::register_build_handlers;
use crate::replication::{REPLICATION_HANDLER, SshReplicator, replication_handler};
use crate::router::{EventRouter, RouterBuilder};
use crate::types::kind;

/// Registers the handlers `config` enables and freezes the router.
pub fn build_event_router(config: &RelayConfig) -> EventRouter {
    let mut builder = RouterBuilder::new();

    if config.enable_builds {
        register_build_handlers(&mut builder);
    }

    if let Some(settings) = &config.replication {
        info!(
            source = %settings.source,
            destination = %settings.destination,
            "Replication enabled"
        );
        let replicator = SshReplicator::new(
            settings.source.clone(),
            settings.destination.clone(),
            settings.replicator.clone(),
        );
        builder.register(
            kind::PATCHSET_CREATED,
            REPLICATION_HANDLER,
            replication_handler(Arc::new(replicator)),
        );
    }

    builder.build()
}

/// Opens the file backend if one is configured, else an in-memory one.
pub fn open_backend(config: &RelayConfig) -> Result<Arc<dyn Backend>, BackendError> {
    match &config.backend_log {
        Some(path) => {
            let backend = FileBackend::open(path)?;
            info!(path = %path.display(), records = backend.len(), "Using build log");
            Ok(Arc::new(backend))
        }
        None => {
            info!("Using in-memory backend; builds are forgotten on exit");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}
