//! Real-time session state
//!
//! - [`identity`] - identity allocation (id, cursor color, display name)
//! - [`presence`] - who is connected to this process
//! - [`document`] - the process-local copy of the shared document
//! - [`hub`] - connection lifecycle and event routing
//!
//! Presence and cursors are process-local. Only document content crosses
//! process boundaries, through [`crate::fanout`].

pub mod document;
pub mod hub;
pub mod identity;
pub mod presence;

pub use document::DocumentStore;
pub use hub::{Connection, SessionHub};
pub use identity::{ConnectionIdentity, CursorColor, IdentityAllocator};
pub use presence::{PresenceEntry, PresenceRegistry};
