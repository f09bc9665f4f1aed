//! Multi-room line-oriented TCP chat relay
//!
//! Clients connect over TCP, pick a display name and a room, and exchange
//! line-oriented messages with the other occupants of the same room. Each
//! room keeps a bounded FIFO history that is replayed to joining sessions.
//! One tokio task runs per connection; everything the tasks share lives in
//! the lock-guarded room registry.

pub mod config;
pub mod emoticons;
pub mod error;
pub mod protocol;
pub mod server;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use server::registry::{RoomId, RoomRegistry, SessionId};
pub use server::RelayServer;
