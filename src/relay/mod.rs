mod broadcast;
mod router;

pub use broadcast::{BroadcastStats, BroadcastStatsSnapshot, Broadcaster, DeliveryReport};
pub use router::{ClientSession, EventRouter, SessionState};
