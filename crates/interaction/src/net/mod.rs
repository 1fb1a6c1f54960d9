mod loopback;
mod message;

pub use loopback::{LoopbackNetwork, NetStats, TransportError, MAX_PUMP_ROUNDS};
pub use message::{Envelope, NetMessage, NetMessageKind, Origin, Outbox, Recipient};
