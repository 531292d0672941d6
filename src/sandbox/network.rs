//! Network policy definitions for container sandboxes.
//!
//! Local sandboxes do not isolate the network; this only shapes the container.

use serde::{Deserialize, Serialize};

/// Network access policy for sandbox containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPolicy {
    /// Default bridge network
    #[default]
    AllowAll,
    /// No network access (`network_mode = "none"`)
    Deny,
}

impl std::fmt::Display for NetworkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllowAll => write!(f, "allow-all"),
            Self::Deny => write!(f, "deny"),
        }
    }
}
