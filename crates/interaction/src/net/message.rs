use serde::{Deserialize, Serialize};

use crate::world::{EntityId, InteractiveState, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetMessage {
    /// Client to server, reliable: run the agent's interaction on the authority.
    ServerInteract { agent: EntityId },
    /// Server to the owning client only.
    ShowInteractionWidget { agent: EntityId, target: EntityId },
    /// Server to the owning client only.
    HideInteractionWidget { agent: EntityId },
    /// Server to every client observing the target.
    TargetStateChanged {
        target: EntityId,
        state: InteractiveState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetMessageKind {
    ServerInteract,
    ShowInteractionWidget,
    HideInteractionWidget,
    TargetStateChanged,
}

impl NetMessage {
    pub fn kind(self) -> NetMessageKind {
        match self {
            Self::ServerInteract { .. } => NetMessageKind::ServerInteract,
            Self::ShowInteractionWidget { .. } => NetMessageKind::ShowInteractionWidget,
            Self::HideInteractionWidget { .. } => NetMessageKind::HideInteractionWidget,
            Self::TargetStateChanged { .. } => NetMessageKind::TargetStateChanged,
        }
    }

    pub fn is_client_bound(self) -> bool {
        !matches!(self, Self::ServerInteract { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Server,
    Client(PeerId),
    AllClients,
}

/// Where a delivered message came from, as seen by the receiving world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Server,
    Client(PeerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub recipient: Recipient,
    pub message: NetMessage,
}

impl Envelope {
    pub fn to_server(message: NetMessage) -> Self {
        Self {
            recipient: Recipient::Server,
            message,
        }
    }

    pub fn to_client(peer: PeerId, message: NetMessage) -> Self {
        Self {
            recipient: Recipient::Client(peer),
            message,
        }
    }

    pub fn to_all_clients(message: NetMessage) -> Self {
        Self {
            recipient: Recipient::AllClients,
            message,
        }
    }
}

/// Messages a world produced this tick, in send order.
#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    pub fn push(&mut self, envelope: Envelope) {
        self.envelopes.push(envelope);
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.envelopes)
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> std::slice::Iter<'_, Envelope> {
        self.envelopes.iter()
    }
}
