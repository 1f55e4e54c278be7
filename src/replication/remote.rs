//! Git remotes reached over SSH.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One side of a replication: a git URL plus how to authenticate to it.
///
/// Purely descriptive; no connection is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSshRemote {
    /// Git URL, e.g. `ssh://relay@review.example.com:29418/project` or
    /// `git@mirror.example.com:org/project.git`. Local paths and `file://`
    /// URLs work too; the SSH settings are then unused.
    pub url: String,

    /// Private key passed to ssh with `-i`.
    pub ssh_key_path: Option<PathBuf>,

    /// Extra ssh options, each passed as `-o key=value`.
    pub ssh_options: BTreeMap<String, String>,
}

impl GitSshRemote {
    pub fn new(url: impl Into<String>) -> Self {
        GitSshRemote {
            url: url.into(),
            ssh_key_path: None,
            ssh_options: BTreeMap::new(),
        }
    }

    pub fn with_ssh_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_key_path = Some(path.into());
        self
    }

    pub fn with_ssh_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ssh_options.insert(key.into(), value.into());
        self
    }

    /// Disables host key verification. Only for test fixtures and throwaway
    /// hosts.
    pub fn without_host_key_checking(self) -> Self {
        self.with_ssh_option("StrictHostKeyChecking", "no")
            .with_ssh_option("UserKnownHostsFile", "/dev/null")
    }

    /// The login user embedded in the URL, if any.
    ///
    /// Handles both `scheme://user@host/...` and scp-like `user@host:path`.
    pub fn username(&self) -> Option<&str> {
        let authority = match self.url.split_once("://") {
            Some((_, rest)) => rest.split('/').next().unwrap_or(""),
            None => {
                // A local path has a `/` before any `:`.
                let (host_part, _) = self.url.split_once(':')?;
                if host_part.contains('/') {
                    return None;
                }
                host_part
            }
        };

        let (userinfo, _) = authority.rsplit_once('@')?;
        let user = userinfo.split(':').next().unwrap_or(userinfo);
        (!user.is_empty()).then_some(user)
    }

    /// The `GIT_SSH_COMMAND` value for this remote.
    ///
    /// `ssh`, then `-i <key>` if a key is set, `-l <user>` if the URL has a
    /// user, and `-o key=value` per option in key order.
    pub fn ssh_command(&self) -> String {
        let mut parts = vec!["ssh".to_string()];

        if let Some(key) = &self.ssh_key_path {
            parts.push("-i".to_string());
            parts.push(shell_quote(&key.to_string_lossy()));
        }
        if let Some(user) = self.username() {
            parts.push("-l".to_string());
            parts.push(shell_quote(user));
        }
        for (key, value) in &self.ssh_options {
            parts.push("-o".to_string());
            parts.push(shell_quote(&format!("{}={}", key, value)));
        }

        parts.join(" ")
    }
}

impl fmt::Display for GitSshRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Quotes `s` for the shell git runs `GIT_SSH_COMMAND` through.
fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:@%+,".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
