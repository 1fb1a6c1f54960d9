use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use super::message::{Envelope, NetMessageKind, Origin, Recipient};
use crate::world::{InteractionWorld, NetRole, PeerId};

pub const MAX_PUMP_ROUNDS: usize = 64;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("server world must have authority, got {0:?}")]
    NotAuthority(NetRole),
    #[error("world with role {0:?} cannot connect as a client")]
    NotAClient(NetRole),
    #[error("peer {0:?} is already connected")]
    DuplicatePeer(PeerId),
    #[error("network did not quiesce after {rounds} rounds")]
    NotQuiescent { rounds: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    pub frames_delivered: u32,
    pub bytes_delivered: u64,
    pub server_interact: u32,
    pub show_widget: u32,
    pub hide_widget: u32,
    pub state_changed: u32,
    pub dropped_unknown_peer: u32,
    pub dropped_misrouted: u32,
}

impl NetStats {
    fn record_delivery(&mut self, kind: NetMessageKind, bytes: usize) {
        self.frames_delivered = self.frames_delivered.saturating_add(1);
        self.bytes_delivered = self.bytes_delivered.saturating_add(bytes as u64);
        match kind {
            NetMessageKind::ServerInteract => {
                self.server_interact = self.server_interact.saturating_add(1)
            }
            NetMessageKind::ShowInteractionWidget => {
                self.show_widget = self.show_widget.saturating_add(1)
            }
            NetMessageKind::HideInteractionWidget => {
                self.hide_widget = self.hide_widget.saturating_add(1)
            }
            NetMessageKind::TargetStateChanged => {
                self.state_changed = self.state_changed.saturating_add(1)
            }
        }
    }
}

/// In-process stand-in for the reliable ordered transport between one authoritative
/// world and its clients. Every envelope goes through a JSON frame on the way.
pub struct LoopbackNetwork {
    server: InteractionWorld,
    clients: BTreeMap<PeerId, InteractionWorld>,
    stats: NetStats,
}

impl LoopbackNetwork {
    pub fn new(server: InteractionWorld) -> Result<Self, TransportError> {
        if !server.has_authority() {
            return Err(TransportError::NotAuthority(server.role()));
        }
        Ok(Self {
            server,
            clients: BTreeMap::new(),
            stats: NetStats::default(),
        })
    }

    pub fn connect(&mut self, client: InteractionWorld) -> Result<PeerId, TransportError> {
        let Some(peer) = client.role().peer() else {
            return Err(TransportError::NotAClient(client.role()));
        };
        if self.clients.contains_key(&peer) {
            return Err(TransportError::DuplicatePeer(peer));
        }
        self.clients.insert(peer, client);
        debug!(peer = peer.0, "client_connected");
        Ok(peer)
    }

    pub fn disconnect(&mut self, peer: PeerId) -> Option<InteractionWorld> {
        let client = self.clients.remove(&peer);
        if client.is_some() {
            debug!(peer = peer.0, "client_disconnected");
        }
        client
    }

    pub fn server(&self) -> &InteractionWorld {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut InteractionWorld {
        &mut self.server
    }

    pub fn client(&self, peer: PeerId) -> Option<&InteractionWorld> {
        self.clients.get(&peer)
    }

    pub fn client_mut(&mut self, peer: PeerId) -> Option<&mut InteractionWorld> {
        self.clients.get_mut(&peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.clients.keys().copied()
    }

    /// Every connected world, server first.
    pub fn worlds_mut(&mut self) -> impl Iterator<Item = &mut InteractionWorld> + '_ {
        std::iter::once(&mut self.server).chain(self.clients.values_mut())
    }

    pub fn stats(&self) -> NetStats {
        self.stats
    }

    /// Delivers queued messages until no world has anything left to send.
    /// Returns the number of frames delivered.
    pub fn pump(&mut self) -> Result<usize, TransportError> {
        let mut delivered = 0usize;
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut routed = 0usize;

            for envelope in self.server.drain_outbox() {
                routed += 1;
                let frame = encode_frame(&envelope)?;
                match envelope.recipient {
                    Recipient::Client(peer) => match self.clients.get_mut(&peer) {
                        Some(client) => {
                            deliver_frame(client, Origin::Server, &frame, &mut self.stats)?;
                            delivered += 1;
                        }
                        None => {
                            debug!(peer = peer.0, kind = ?envelope.message.kind(), "dropped_unknown_peer");
                            self.stats.dropped_unknown_peer =
                                self.stats.dropped_unknown_peer.saturating_add(1);
                        }
                    },
                    Recipient::AllClients => {
                        for client in self.clients.values_mut() {
                            deliver_frame(client, Origin::Server, &frame, &mut self.stats)?;
                            delivered += 1;
                        }
                    }
                    Recipient::Server => {
                        warn!(kind = ?envelope.message.kind(), "server_addressed_itself");
                        self.stats.dropped_misrouted =
                            self.stats.dropped_misrouted.saturating_add(1);
                    }
                }
            }

            for (peer, client) in self.clients.iter_mut() {
                for envelope in client.drain_outbox() {
                    routed += 1;
                    if envelope.recipient != Recipient::Server {
                        warn!(peer = peer.0, recipient = ?envelope.recipient, "client_addressed_peer");
                        self.stats.dropped_misrouted =
                            self.stats.dropped_misrouted.saturating_add(1);
                        continue;
                    }
                    let frame = encode_frame(&envelope)?;
                    deliver_frame(
                        &mut self.server,
                        Origin::Client(*peer),
                        &frame,
                        &mut self.stats,
                    )?;
                    delivered += 1;
                }
            }

            if routed == 0 {
                return Ok(delivered);
            }
        }

        Err(TransportError::NotQuiescent {
            rounds: MAX_PUMP_ROUNDS,
        })
    }
}

fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(envelope).map_err(TransportError::Encode)
}

fn deliver_frame(
    world: &mut InteractionWorld,
    origin: Origin,
    frame: &[u8],
    stats: &mut NetStats,
) -> Result<(), TransportError> {
    let envelope: Envelope = serde_json::from_slice(frame).map_err(TransportError::Decode)?;
    stats.record_delivery(envelope.message.kind(), frame.len());
    world.receive(origin, envelope.message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::NetMessage;
    use crate::world::{
        EntityId, InteractiveTarget, InteractorAgent, InteractorConfig, ProbeHit, ProbeQuery,
        TargetConfig, Transform,
    };

    fn client_world(peer: u32) -> InteractionWorld {
        InteractionWorld::new(NetRole::Client(PeerId(peer)))
    }

    #[test]
    fn server_must_have_authority() {
        let result = LoopbackNetwork::new(client_world(1));
        assert!(matches!(result, Err(TransportError::NotAuthority(_))));
    }

    #[test]
    fn connect_rejects_authority_and_duplicate_peers() {
        let mut net = LoopbackNetwork::new(InteractionWorld::new(NetRole::Authority))
            .expect("network");

        assert_eq!(net.connect(client_world(1)).expect("first"), PeerId(1));
        assert!(matches!(
            net.connect(client_world(1)),
            Err(TransportError::DuplicatePeer(PeerId(1)))
        ));
        assert!(matches!(
            net.connect(InteractionWorld::new(NetRole::Authority)),
            Err(TransportError::NotAClient(NetRole::Authority))
        ));
    }

    #[test]
    fn pump_on_idle_network_delivers_nothing() {
        let mut net = LoopbackNetwork::new(InteractionWorld::new(NetRole::Authority))
            .expect("network");
        net.connect(client_world(1)).expect("connect");

        assert_eq!(net.pump().expect("pump"), 0);
        assert_eq!(net.stats(), NetStats::default());
    }

    fn server_with_lever(owner: PeerId) -> (InteractionWorld, EntityId, EntityId) {
        let mut server = InteractionWorld::new(NetRole::Authority);
        let pawn = server.spawn_entity(Transform::default(), "pawn");
        let lever = server.spawn_entity(Transform::default(), "lever");
        server
            .attach_agent(
                pawn,
                InteractorAgent::new(owner, InteractorConfig::default())
                    .with_probe(|_query: &ProbeQuery| Vec::<ProbeHit>::new()),
            )
            .expect("agent");
        server
            .attach_target(lever, Box::new(InteractiveTarget::plain(TargetConfig::default())))
            .expect("target");
        (server, pawn, lever)
    }

    #[test]
    fn messages_after_disconnect_are_dropped() {
        let (server, pawn, lever) = server_with_lever(PeerId(4));
        let mut net = LoopbackNetwork::new(server).expect("network");
        net.connect(client_world(1)).expect("connect spectator");
        net.connect(client_world(4)).expect("connect owner");

        let owner_world = net.disconnect(PeerId(4)).expect("owner was connected");
        assert_eq!(owner_world.role(), NetRole::Client(PeerId(4)));
        assert!(net.disconnect(PeerId(4)).is_none());
        assert_eq!(net.peers().collect::<Vec<_>>(), vec![PeerId(1)]);

        net.server_mut().register_agent_in_range(lever, pawn);
        net.server_mut().interact(pawn);

        assert_eq!(net.pump().expect("pump"), 1);
        assert_eq!(net.stats().dropped_unknown_peer, 2);
        assert_eq!(net.stats().state_changed, 1);
        assert!(net.client(PeerId(4)).is_none());
    }

    #[test]
    fn messages_to_never_connected_peer_are_dropped() {
        let mut server = InteractionWorld::new(NetRole::Authority);
        let pawn = server.spawn_entity(Transform::default(), "pawn");
        let lever = server.spawn_entity(Transform::default(), "lever");
        server
            .attach_agent(
                pawn,
                InteractorAgent::new(PeerId(4), InteractorConfig::default())
                    .with_probe(|_query: &ProbeQuery| Vec::<ProbeHit>::new()),
            )
            .expect("agent");
        server
            .attach_target(lever, Box::new(InteractiveTarget::plain(TargetConfig::default())))
            .expect("target");
        let mut net = LoopbackNetwork::new(server).expect("network");
        net.connect(client_world(1)).expect("connect");

        net.server_mut().register_agent_in_range(lever, pawn);

        assert_eq!(net.pump().expect("pump"), 0);
        assert_eq!(net.stats().dropped_unknown_peer, 2);
        assert_eq!(net.stats().frames_delivered, 0);
    }

    #[test]
    fn stats_count_deliveries_by_kind() {
        let mut stats = NetStats::default();
        stats.record_delivery(NetMessageKind::ShowInteractionWidget, 40);
        stats.record_delivery(NetMessageKind::HideInteractionWidget, 30);
        stats.record_delivery(NetMessageKind::HideInteractionWidget, 30);

        assert_eq!(stats.frames_delivered, 3);
        assert_eq!(stats.bytes_delivered, 100);
        assert_eq!(stats.show_widget, 1);
        assert_eq!(stats.hide_widget, 2);
    }

    #[test]
    fn frames_round_trip_through_json() {
        let envelope = Envelope::to_server(NetMessage::ServerInteract { agent: EntityId(3) });
        let frame = encode_frame(&envelope).expect("encode");
        let decoded: Envelope = serde_json::from_slice(&frame).expect("decode");
        assert_eq!(decoded, envelope);
    }
}
