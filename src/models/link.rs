// Link record types shared between the repository seam and the lifecycle
// services. The storage engine itself lives behind the LinkRepository trait.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A stored short link as the repository reports it.
///
/// `remaining_lifetime` is zero for permanent links; `is_permanent` is the
/// authoritative flag (a subscriber-only feature).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRecord {
    pub short_code: String,
    pub full_url: String,
    pub remaining_lifetime: Duration,
    pub is_permanent: bool,
    pub is_custom: bool,
}

/// Per-category link counts for one user, as reported by the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounts {
    pub all: usize,
    pub permanent: usize,
    pub custom: usize,
}

/// Lifetime requested at link creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedLifetime {
    /// Never expires (subscriber-only).
    Permanent,
    /// No lifetime given; the service applies its configured default.
    Default,
    Finite(Duration),
}

/// Parameters for creating a new short link.
///
/// `custom_alias: None` lets the service generate a random code.
#[derive(Debug, Clone)]
pub struct CreateLinkRequest {
    pub full_url: String,
    pub custom_alias: Option<String>,
    pub lifetime: RequestedLifetime,
}
