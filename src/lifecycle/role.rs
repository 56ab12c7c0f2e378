//! Process role selection.

use std::ffi::OsStr;
use std::fmt;

/// Environment marker added to every spawned worker's environment.
pub const WORKER_ENV: &str = "PREFORK_WORKER";

/// Which half of the prefork model this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Binds the socket, spawns and reaps workers.
    Manager,
    /// Inherits the socket and serves connections.
    Worker,
}

impl Role {
    /// Decide the role from the current process environment.
    ///
    /// Call this once at startup and pass the value along.
    pub fn detect() -> Self {
        Self::from_marker(std::env::var_os(WORKER_ENV).as_deref())
    }

    /// Decide the role from the value of the worker marker, if present.
    ///
    /// An empty value counts as absent.
    pub fn from_marker(value: Option<&OsStr>) -> Self {
        match value {
            Some(v) if !v.is_empty() => Role::Worker,
            _ => Role::Manager,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Worker => "worker",
        }
    }

    /// Span tagging all output of this process with its role and pid.
    pub fn span(&self) -> tracing::Span {
        let pid = std::process::id();
        match self {
            Role::Manager => tracing::info_span!("manager", pid),
            Role::Worker => tracing::info_span!("worker", pid),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
