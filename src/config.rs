//! Runtime configuration from command-line flags, each backed by an
//! environment variable.
//!
//! | Flag | Variable | Default |
//! |------|----------|---------|
//! | `--enable-builds` | `RELAY_ENABLE_BUILDS` | `false` |
//! | `--enable-replication` | `RELAY_ENABLE_REPLICATION` | `false` |
//! | `--source-url` | `RELAY_SOURCE_URL` | required with replication |
//! | `--source-ssh-key` | `RELAY_SOURCE_SSH_KEY` | none |
//! | `--replication-url` | `RELAY_REPLICATION_URL` | required with replication |
//! | `--replication-ssh-key` | `RELAY_REPLICATION_SSH_KEY` | none |
//! | `--replication-clone-path` | `RELAY_REPLICATION_CLONE_PATH` | temporary clone per call |
//! | `--reuse-existing-clone` | `RELAY_REUSE_EXISTING_CLONE` | `true` |
//! | `--backend-log` | `RELAY_BACKEND_LOG` | in-memory backend |
//! | `--health-addr` | `RELAY_HEALTH_ADDR` | no health endpoint |
//!
//! Boolean variables accept `1`/`0`, `true`/`false`, `yes`/`no` and
//! `on`/`off` in any case.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, builder::BoolishValueParser};
use thiserror::Error;

use crate::replication::{CloneLocation, GitSshRemote, ReplicatorConfig};

pub const ENABLE_BUILDS: &str = "RELAY_ENABLE_BUILDS";
pub const ENABLE_REPLICATION: &str = "RELAY_ENABLE_REPLICATION";
pub const SOURCE_URL: &str = "RELAY_SOURCE_URL";
pub const SOURCE_SSH_KEY: &str = "RELAY_SOURCE_SSH_KEY";
pub const REPLICATION_URL: &str = "RELAY_REPLICATION_URL";
pub const REPLICATION_SSH_KEY: &str = "RELAY_REPLICATION_SSH_KEY";
pub const REPLICATION_CLONE_PATH: &str = "RELAY_REPLICATION_CLONE_PATH";
pub const REUSE_EXISTING_CLONE: &str = "RELAY_REUSE_EXISTING_CLONE";
pub const BACKEND_LOG: &str = "RELAY_BACKEND_LOG";
pub const HEALTH_ADDR: &str = "RELAY_HEALTH_ADDR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be set when {required_by} is enabled")]
    Missing {
        var: &'static str,
        required_by: &'static str,
    },

    #[error(transparent)]
    Cli(#[from] clap::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Relays review events to CI and mirrors patchsets to a second repository.
///
/// Events are read from stdin as JSON lines.
#[derive(Debug, Clone, Parser)]
#[command(name = "patchset-relay", version)]
pub struct RelayArgs {
    /// Register the build handlers
    #[arg(long, env = ENABLE_BUILDS, value_parser = BoolishValueParser::new())]
    pub enable_builds: bool,

    /// Mirror every new patchset to the replication remote
    #[arg(long, env = ENABLE_REPLICATION, value_parser = BoolishValueParser::new())]
    pub enable_replication: bool,

    /// Git URL of the review server
    #[arg(long, env = SOURCE_URL)]
    pub source_url: Option<String>,

    /// SSH key for the review server
    #[arg(long, env = SOURCE_SSH_KEY)]
    pub source_ssh_key: Option<PathBuf>,

    /// Git URL patchsets are pushed to
    #[arg(long, env = REPLICATION_URL)]
    pub replication_url: Option<String>,

    /// SSH key for the replication remote
    #[arg(long, env = REPLICATION_SSH_KEY)]
    pub replication_ssh_key: Option<PathBuf>,

    /// Keep the working clone here instead of a new temporary directory per
    /// patchset
    #[arg(long, env = REPLICATION_CLONE_PATH)]
    pub replication_clone_path: Option<PathBuf>,

    /// Reuse a non-empty clone path instead of failing
    #[arg(
        long,
        env = REUSE_EXISTING_CLONE,
        action = ArgAction::Set,
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    pub reuse_existing_clone: bool,

    /// Persist builds to this JSON Lines file
    #[arg(long, env = BACKEND_LOG)]
    pub backend_log: Option<PathBuf>,

    /// Serve GET /health on this address
    #[arg(long, env = HEALTH_ADDR)]
    pub health_addr: Option<SocketAddr>,
}

impl RelayArgs {
    /// Checks the settings that depend on each other.
    pub fn into_config(self) -> Result<RelayConfig> {
        let replication = if self.enable_replication {
            let required = |value: Option<String>, var: &'static str| {
                value.ok_or(ConfigError::Missing {
                    var,
                    required_by: ENABLE_REPLICATION,
                })
            };

            let mut source = GitSshRemote::new(required(self.source_url, SOURCE_URL)?);
            if let Some(key) = self.source_ssh_key {
                source = source.with_ssh_key(key);
            }
            let mut destination =
                GitSshRemote::new(required(self.replication_url, REPLICATION_URL)?);
            if let Some(key) = self.replication_ssh_key {
                destination = destination.with_ssh_key(key);
            }

            let clone_location = self
                .replication_clone_path
                .map(CloneLocation::Persistent)
                .unwrap_or_default();

            Some(ReplicationSettings {
                source,
                destination,
                replicator: ReplicatorConfig {
                    clone_location,
                    reuse_existing_clone: self.reuse_existing_clone,
                },
            })
        } else {
            None
        };

        Ok(RelayConfig {
            enable_builds: self.enable_builds,
            replication,
            backend_log: self.backend_log,
            health_addr: self.health_addr,
        })
    }
}

/// Everything the replicator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationSettings {
    pub source: GitSshRemote,
    pub destination: GitSshRemote,
    pub replicator: ReplicatorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelayConfig {
    /// Register the build handlers.
    pub enable_builds: bool,

    /// Present when replication is enabled.
    pub replication: Option<ReplicationSettings>,

    /// JSON Lines build log; `None` keeps builds in memory.
    pub backend_log: Option<PathBuf>,

    pub health_addr: Option<SocketAddr>,
}

impl RelayConfig {
    /// Parses `args` (program name first) and the `RELAY_*` environment.
    pub fn try_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        RelayArgs::try_parse_from(args)?.into_config()
    }
}
