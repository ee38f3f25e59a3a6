//! Display name registry
//!
//! Single source of truth for name uniqueness. Owned by the ChatHub actor,
//! so every claim/release is serialized with the broadcasts it triggers.

use std::collections::HashMap;

use crate::types::ConnectionId;

/// Registry of claimed display names
///
/// Maintains both directions of the association: name -> connection for
/// conflict checks, connection -> name for release on disconnect.
/// Comparison is exact-match and case-sensitive; trimming and empty-name
/// rejection happen before a name reaches the registry.
#[derive(Debug, Default)]
pub struct NameRegistry {
    /// Claimed name -> owning connection
    claimed: HashMap<String, ConnectionId>,
    /// Connection -> its claimed name
    by_connection: HashMap<ConnectionId, String>,
}

impl NameRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check and reserve `name` for `connection`
    ///
    /// Returns false without mutating if the name is held by a different
    /// live connection. Re-claiming the same name from the same connection
    /// is accepted (idempotent), though the hub only joins once per session.
    pub fn try_claim(&mut self, connection: ConnectionId, name: &str) -> bool {
        match self.claimed.get(name) {
            Some(owner) if *owner != connection => false,
            _ => {
                self.claimed.insert(name.to_string(), connection);
                self.by_connection.insert(connection, name.to_string());
                true
            }
        }
    }

    /// Release `connection`'s claim, if any, freeing the name for reuse
    ///
    /// Returns the released name so the caller can announce the departure.
    /// No-op returning None if the connection never claimed a name, which
    /// also makes duplicate release harmless.
    pub fn release(&mut self, connection: ConnectionId) -> Option<String> {
        let name = self.by_connection.remove(&connection)?;
        self.claimed.remove(&name);
        Some(name)
    }

    /// The name claimed by `connection`, if it has joined
    pub fn name_of(&self, connection: ConnectionId) -> Option<&str> {
        self.by_connection.get(&connection).map(String::as_str)
    }

    /// Snapshot of all claimed names, sorted for deterministic presence lists
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.claimed.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of claimed names
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    /// True if no names are claimed
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}
