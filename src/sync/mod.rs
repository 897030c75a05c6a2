//! The pieces that keep one client consistent with the server: the live
//! channel, the polling fallback, per-conversation timelines, the match
//! tracker and the background refresh loop. `engine` wires them together.

pub mod backoff;
pub mod connection;
pub mod matches;
pub mod polling;
pub mod scheduler;
pub mod source;
pub mod timeline;

pub use connection::{ConnectionManager, ConnectionState, Connector, WsConnector};
pub use matches::{MatchTracker, Notifier};
pub use polling::PollingFallback;
pub use scheduler::BackgroundRefresh;
pub use source::{ServerSource, SyncSource};
pub use timeline::ConversationSync;
