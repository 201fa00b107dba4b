//! Per-role device-token registry.
//!
//! Registered push tokens are partitioned by [`Role`] and held in memory.
//! The registry is ephemeral — lost on relay restart, which is accepted:
//! clients re-register their token on every app launch.
//!
//! Handlers depend on the [`TokenStore`] trait rather than the concrete
//! store, so a persistent backing can be swapped in without touching
//! handler logic.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// A fixed client category used to partition registered push tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// A dog walker looking for walk requests.
    Walker,
    /// A dog owner requesting walks.
    Owner,
}

impl Role {
    /// Lowercase name used in logs and response bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Walker => "walker",
            Self::Owner => "owner",
        }
    }

    /// Message returned when a notification targets an empty role set.
    #[must_use]
    pub const fn no_recipients_message(self) -> &'static str {
        match self {
            Self::Walker => "No walkers registered",
            Self::Owner => "No owners registered",
        }
    }

    /// Default notification title when the caller omits one.
    #[must_use]
    pub const fn default_title(self) -> &'static str {
        match self {
            Self::Walker => "New Walk Request",
            Self::Owner => "Walk Update",
        }
    }

    /// Default notification body when the caller omits one.
    #[must_use]
    pub const fn default_body(self) -> &'static str {
        match self {
            Self::Walker => "Someone is looking for a walker!",
            Self::Owner => "Your walk request has been updated!",
        }
    }
}

/// Capability interface for the per-role token registry.
///
/// `add` is idempotent at the data-structure level: registering the same
/// token twice for a role leaves the role's set unchanged.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Adds a token to the role's set. Returns `false` if it was already
    /// present.
    async fn add(&self, role: Role, token: &str) -> bool;

    /// Returns a snapshot of all tokens registered for the role.
    async fn list(&self, role: Role) -> Vec<String>;

    /// Returns the number of tokens registered for the role.
    async fn count(&self, role: Role) -> usize;
}

/// In-memory [`TokenStore`] backed by per-role hash sets.
///
/// Thread-safe via [`RwLock`]. Unbounded and without expiry — additions
/// are the only mutation, so no coordination beyond the lock is needed.
#[derive(Default)]
pub struct MemoryTokenStore {
    sets: RwLock<HashMap<Role, HashSet<String>>>,
}

impl MemoryTokenStore {
    /// Creates a new, empty token store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn add(&self, role: Role, token: &str) -> bool {
        let mut sets = self.sets.write().await;
        sets.entry(role).or_default().insert(token.to_string())
    }

    async fn list(&self, role: Role) -> Vec<String> {
        let sets = self.sets.read().await;
        sets.get(&role)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn count(&self, role: Role) -> usize {
        let sets = self.sets.read().await;
        sets.get(&role).map_or(0, HashSet::len)
    }
}
