//! Session store: maps application session ids to remote threads.
//!
//! Entries live for a sliding TTL and the store holds at most `capacity`
//! of them. Creation is serialized through one store-wide lock so a
//! session is never bound to two threads; cache hits only take the
//! read side of the map. Each entry also carries a per-session turn lock
//! that the orchestrator holds for the duration of a turn.

mod store;
mod types;


pub use store::SessionStore;
pub use types::{SessionEntry, SessionLease};
