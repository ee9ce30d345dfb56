//! Broadcast bus: cross-process publish/subscribe for UI notifications.
//!
//! Not a transactional queue. Messages are fire-and-forget; a subscriber
//! that lags simply misses updates and re-reads current state from the
//! store.

pub mod bus;
pub mod relay;

pub use bus::{BroadcastBus, BroadcastMessage, MessageKind};
pub use relay::PgRelay;
