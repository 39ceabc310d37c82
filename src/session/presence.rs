//! Presence registry: who is connected to this process
//!
//! The registry only knows about connections terminated by this process.
//! It is not replicated across instances.

use serde::{Deserialize, Serialize};

use super::identity::{ConnectionIdentity, CursorColor};

/// Public view of one connected user, as sent in `presence:update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub id: String,
    pub color: CursorColor,
    pub name: String,
}

impl From<&ConnectionIdentity> for PresenceEntry {
    fn from(identity: &ConnectionIdentity) -> Self {
        Self {
            id: identity.id.clone(),
            color: identity.color,
            name: identity.name.clone(),
        }
    }
}

/// Connection id -> identity, in join order
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: Vec<ConnectionIdentity>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity; an existing entry with the same id is replaced in place
    pub fn add(&mut self, id: &str, identity: ConnectionIdentity) {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(existing) => *existing = identity,
            None => self.entries.push(identity),
        }
    }

    /// Remove an identity, returning it if it was present
    pub fn remove(&mut self, id: &str) -> Option<ConnectionIdentity> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<&ConnectionIdentity> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Ordered public view of every registered connection
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.entries.iter().map(PresenceEntry::from).collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }
}
