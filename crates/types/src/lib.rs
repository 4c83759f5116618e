#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Shared value types for the crossforge orchestrator

pub mod prefix;
mod spec;

pub use prefix::Prefix;
pub use spec::PackageSpec;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compiler families a build may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compiler {
    C,
    Rust,
    Go,
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::C => "c",
            Self::Rust => "rust",
            Self::Go => "go",
        };
        write!(f, "{s}")
    }
}

/// Sandbox runner flavours the orchestrator knows about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runner {
    /// Pick whatever the host supports
    #[default]
    Auto,
    UserNs,
    Privileged,
    Docker,
}

impl Runner {
    /// Parse the `RUNNER` environment value. Unrecognised values return
    /// `None` so the caller can warn and fall back to [`Runner::Auto`].
    #[must_use]
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value {
            "" => Some(Self::Auto),
            "userns" => Some(Self::UserNs),
            "privileged" => Some(Self::Privileged),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }
}
