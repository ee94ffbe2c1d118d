//! Authoritative pull sync.
//!
//! The remote store always wins. Each round replaces every local entity kind
//! with the fetched snapshot; there is no merge and no local write path.

pub mod clock;
pub mod events;
pub mod guard;
pub mod models;
pub mod ports;
pub mod replace;
pub mod service;

pub use clock::SyncClock;
pub use events::{BroadcastEventSink, SyncEvent};
pub use replace::{DomainSettingsStore, KeyedStore};
pub use service::{SyncDependencies, SyncNeed, SyncService, SyncStores};
