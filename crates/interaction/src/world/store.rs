use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use super::agent::{
    AgentContext, DirectionalProbe, InteractorAgent, TargetLookup, WidgetFactory,
};
use super::intents::{InteractionIntent, InteractionIntentQueue, IntentApplyStats};
use super::target::{Interactive, InteractiveState, TargetContext};
use super::types::{EntityId, EntityIdAllocator, NetRole, PeerId, Transform, Vec2};
use crate::net::{Envelope, NetMessage, Origin, Outbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("entity {0:?} does not exist")]
    MissingEntity(EntityId),
    #[error("entity {0:?} already has an interactive target")]
    TargetAlreadyAttached(EntityId),
    #[error("entity {0:?} already has an interactor agent")]
    AgentAlreadyAttached(EntityId),
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub transform: Transform,
    pub debug_name: String,
}

/// One machine's view of the interaction subsystem.
///
/// Owns every entity, target and agent on that machine. Targets and agents refer to
/// each other only by [`EntityId`]; every cross-entity call is routed through here.
pub struct InteractionWorld {
    role: NetRole,
    allocator: EntityIdAllocator,
    entities: Vec<Entity>,
    targets: BTreeMap<EntityId, Box<dyn Interactive>>,
    agents: BTreeMap<EntityId, InteractorAgent>,
    intents: InteractionIntentQueue,
    last_apply_stats: IntentApplyStats,
    outbox: Outbox,
}

struct TargetView<'a> {
    targets: &'a BTreeMap<EntityId, Box<dyn Interactive>>,
    entities: &'a [Entity],
}

impl TargetLookup for TargetView<'_> {
    fn contains(&self, target: EntityId) -> bool {
        self.targets.contains_key(&target)
    }

    fn can_be_interacted(&self, target: EntityId, instigator: EntityId) -> bool {
        self.targets
            .get(&target)
            .is_some_and(|interactive| interactive.can_be_interacted(instigator))
    }

    fn location(&self, target: EntityId) -> Option<Vec2> {
        let interactive = self.targets.get(&target)?;
        let entity = self.entities.iter().find(|entity| entity.id == target)?;
        Some(interactive.interactive_location(&entity.transform))
    }
}

fn entity_transform(entities: &[Entity], id: EntityId) -> Transform {
    entities
        .iter()
        .find(|entity| entity.id == id)
        .map(|entity| entity.transform)
        .unwrap_or_default()
}

impl InteractionWorld {
    pub fn new(role: NetRole) -> Self {
        Self {
            role,
            allocator: EntityIdAllocator::default(),
            entities: Vec::new(),
            targets: BTreeMap::new(),
            agents: BTreeMap::new(),
            intents: InteractionIntentQueue::default(),
            last_apply_stats: IntentApplyStats::default(),
            outbox: Outbox::default(),
        }
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn has_authority(&self) -> bool {
        self.role.has_authority()
    }

    pub fn spawn_entity(&mut self, transform: Transform, debug_name: impl Into<String>) -> EntityId {
        let id = self.allocator.allocate();
        self.entities.push(Entity {
            id,
            transform,
            debug_name: debug_name.into(),
        });
        id
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn set_position(&mut self, id: EntityId, position: Vec2) -> bool {
        match self.entities.iter_mut().find(|entity| entity.id == id) {
            Some(entity) => {
                entity.transform.position = position;
                true
            }
            None => false,
        }
    }

    pub fn set_facing(&mut self, id: EntityId, rotation_radians: f32) -> bool {
        match self.entities.iter_mut().find(|entity| entity.id == id) {
            Some(entity) => {
                entity.transform.rotation_radians = Some(rotation_radians);
                true
            }
            None => false,
        }
    }

    /// Removes an entity and every reference other entities hold to it.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        let Some(index) = self.entities.iter().position(|entity| entity.id == id) else {
            return false;
        };

        if let Some(mut agent) = self.agents.remove(&id) {
            agent.hide_widget();
            let holding_targets = self
                .targets
                .iter()
                .filter(|(_, target)| target.registered_agents().contains(&id))
                .map(|(target_id, _)| *target_id)
                .collect::<Vec<_>>();
            for target_id in holding_targets {
                self.unregister_agent_in_range(target_id, id);
            }
        }

        if self.targets.remove(&id).is_some() {
            let agent_ids = self.agents.keys().copied().collect::<Vec<_>>();
            for agent_id in agent_ids {
                let holds_target = self
                    .agents
                    .get(&agent_id)
                    .is_some_and(|agent| agent.candidate_targets().contains(&id));
                if holds_target {
                    self.dispatch_remove_candidate(agent_id, id);
                }
            }
        }

        self.entities.remove(index);
        debug!(entity = id.0, "entity_despawned");
        true
    }

    pub fn attach_target(
        &mut self,
        entity: EntityId,
        target: Box<dyn Interactive>,
    ) -> Result<(), WorldError> {
        if self.find_entity(entity).is_none() {
            return Err(WorldError::MissingEntity(entity));
        }
        if self.targets.contains_key(&entity) {
            return Err(WorldError::TargetAlreadyAttached(entity));
        }
        self.targets.insert(entity, target);
        Ok(())
    }

    pub fn attach_agent(
        &mut self,
        entity: EntityId,
        agent: InteractorAgent,
    ) -> Result<(), WorldError> {
        if self.find_entity(entity).is_none() {
            return Err(WorldError::MissingEntity(entity));
        }
        if self.agents.contains_key(&entity) {
            return Err(WorldError::AgentAlreadyAttached(entity));
        }
        self.agents.insert(entity, agent);
        Ok(())
    }

    pub fn set_probe(&mut self, agent: EntityId, probe: impl DirectionalProbe + 'static) -> bool {
        match self.agents.get_mut(&agent) {
            Some(agent) => {
                agent.set_probe(Box::new(probe));
                true
            }
            None => false,
        }
    }

    pub fn set_widget_factory(
        &mut self,
        agent: EntityId,
        factory: impl WidgetFactory + 'static,
    ) -> bool {
        match self.agents.get_mut(&agent) {
            Some(agent) => {
                agent.set_widget_factory(Box::new(factory));
                true
            }
            None => false,
        }
    }

    pub fn agent(&self, id: EntityId) -> Option<&InteractorAgent> {
        self.agents.get(&id)
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.agents.keys().copied()
    }

    pub fn target(&self, id: EntityId) -> Option<&dyn Interactive> {
        self.targets.get(&id).map(|target| target.as_ref())
    }

    pub fn target_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.targets.keys().copied()
    }

    pub fn target_state(&self, id: EntityId) -> Option<InteractiveState> {
        self.targets.get(&id)?.replicated_state()
    }

    pub fn can_be_interacted(&self, target: EntityId, instigator: EntityId) -> bool {
        self.targets
            .get(&target)
            .is_some_and(|interactive| interactive.can_be_interacted(instigator))
    }

    pub fn registered_agents(&self, target: EntityId) -> &[EntityId] {
        self.targets
            .get(&target)
            .map(|interactive| interactive.registered_agents())
            .unwrap_or(&[])
    }

    pub fn interaction_description(&self, target: EntityId) -> Option<&str> {
        self.targets
            .get(&target)
            .map(|interactive| interactive.interaction_description())
    }

    pub fn interactive_location(&self, target: EntityId) -> Option<Vec2> {
        TargetView {
            targets: &self.targets,
            entities: &self.entities,
        }
        .location(target)
    }

    pub fn last_apply_stats(&self) -> IntentApplyStats {
        self.last_apply_stats
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        self.outbox.drain()
    }

    /// Proximity enter notification for `agent` reaching `target`.
    pub fn register_agent_in_range(&mut self, target: EntityId, agent: EntityId) {
        let Some(interactive) = self.targets.get_mut(&target) else {
            debug!(target_id = target.0, agent = agent.0, "register_unknown_target");
            return;
        };
        let mut ctx = TargetContext::new(target, self.role, &mut self.intents);
        interactive.register_agent_in_range(agent, &mut ctx);
        self.apply_intents();
    }

    /// Proximity exit notification for `agent` leaving `target`.
    pub fn unregister_agent_in_range(&mut self, target: EntityId, agent: EntityId) {
        let Some(interactive) = self.targets.get_mut(&target) else {
            debug!(target_id = target.0, agent = agent.0, "unregister_unknown_target");
            return;
        };
        let mut ctx = TargetContext::new(target, self.role, &mut self.intents);
        interactive.unregister_agent_in_range(agent, &mut ctx);
        self.apply_intents();
    }

    /// Interact command for a local agent.
    ///
    /// Without authority the request is forwarded to the server and nothing changes
    /// locally; the result arrives later as replicated state.
    pub fn interact(&mut self, agent: EntityId) {
        let Some(interactor) = self.agents.get(&agent) else {
            debug!(agent = agent.0, "interact_unknown_agent");
            return;
        };

        if !self.role.has_authority() {
            self.outbox
                .push(Envelope::to_server(NetMessage::ServerInteract { agent }));
            return;
        }

        let Some(target) = interactor.most_relevant_target() else {
            return;
        };
        let Some(interactive) = self.targets.get_mut(&target) else {
            return;
        };
        let mut ctx = TargetContext::new(target, self.role, &mut self.intents);
        interactive.interact(agent, &mut ctx);
        self.apply_intents();
    }

    pub fn recompute_relevancy(&mut self, agent: EntityId) {
        let Some(interactor) = self.agents.get_mut(&agent) else {
            return;
        };
        let targets = TargetView {
            targets: &self.targets,
            entities: &self.entities,
        };
        let mut ctx = AgentContext {
            owner: agent,
            role: self.role,
            owner_transform: entity_transform(&self.entities, agent),
            targets: &targets,
            outbox: &mut self.outbox,
        };
        interactor.recompute_relevancy(&mut ctx);
    }

    /// Periodic re-evaluation for hosts whose owners move or turn between proximity events.
    pub fn recompute_all_relevancy(&mut self) {
        let agent_ids = self.agents.keys().copied().collect::<Vec<_>>();
        for agent in agent_ids {
            self.recompute_relevancy(agent);
        }
    }

    pub fn receive(&mut self, origin: Origin, message: NetMessage) {
        match (self.role, origin) {
            (NetRole::Authority, Origin::Client(peer)) => self.receive_from_client(peer, message),
            (NetRole::Client(_), Origin::Server) => self.receive_from_server(message),
            (role, origin) => {
                warn!(?role, ?origin, kind = ?message.kind(), "message_wrong_direction");
            }
        }
    }

    fn receive_from_client(&mut self, peer: PeerId, message: NetMessage) {
        match message {
            NetMessage::ServerInteract { agent } => {
                let owned_by_sender = self
                    .agents
                    .get(&agent)
                    .is_some_and(|interactor| interactor.owning_peer() == peer);
                if !owned_by_sender {
                    warn!(peer = peer.0, agent = agent.0, "server_interact_not_owner");
                    return;
                }
                self.interact(agent);
            }
            other => {
                warn!(peer = peer.0, kind = ?other.kind(), "client_sent_client_bound_message");
            }
        }
    }

    fn receive_from_server(&mut self, message: NetMessage) {
        match message {
            NetMessage::ShowInteractionWidget { agent, target } => {
                let Some(interactor) = self.agents.get_mut(&agent) else {
                    debug!(agent = agent.0, "show_widget_unknown_agent");
                    return;
                };
                let Some(interactive) = self.targets.get(&target) else {
                    debug!(agent = agent.0, target_id = target.0, "show_widget_unknown_target");
                    return;
                };
                interactor.show_widget(agent, target, interactive.interaction_description());
            }
            NetMessage::HideInteractionWidget { agent } => {
                if let Some(interactor) = self.agents.get_mut(&agent) {
                    interactor.hide_widget();
                }
            }
            NetMessage::TargetStateChanged { target, state } => {
                let Some(interactive) = self.targets.get_mut(&target) else {
                    debug!(target_id = target.0, "state_update_unknown_target");
                    return;
                };
                let mut ctx = TargetContext::new(target, self.role, &mut self.intents);
                interactive.on_state_replicated(state, &mut ctx);
                self.apply_intents();
            }
            NetMessage::ServerInteract { agent } => {
                warn!(agent = agent.0, "server_sent_server_bound_message");
            }
        }
    }

    fn apply_intents(&mut self) {
        let mut stats = IntentApplyStats::default();
        while let Some(intent) = self.intents.pop_next() {
            stats.record_intent(intent.kind());
            match intent {
                InteractionIntent::AddCandidate { agent, target } => {
                    if !self.dispatch_add_candidate(agent, target) {
                        stats.record_missing_agent();
                    }
                }
                InteractionIntent::RemoveCandidate { agent, target } => {
                    if !self.dispatch_remove_candidate(agent, target) {
                        stats.record_missing_agent();
                    }
                }
                InteractionIntent::ReplicateState { target, state } => {
                    if self.role.has_authority() {
                        self.outbox.push(Envelope::to_all_clients(
                            NetMessage::TargetStateChanged { target, state },
                        ));
                    }
                }
            }
        }
        if stats.total > 0 {
            self.last_apply_stats = stats;
        }
    }

    fn dispatch_add_candidate(&mut self, agent: EntityId, target: EntityId) -> bool {
        let Some(interactor) = self.agents.get_mut(&agent) else {
            return false;
        };
        let targets = TargetView {
            targets: &self.targets,
            entities: &self.entities,
        };
        let mut ctx = AgentContext {
            owner: agent,
            role: self.role,
            owner_transform: entity_transform(&self.entities, agent),
            targets: &targets,
            outbox: &mut self.outbox,
        };
        interactor.add_candidate(target, &mut ctx);
        true
    }

    fn dispatch_remove_candidate(&mut self, agent: EntityId, target: EntityId) -> bool {
        let Some(interactor) = self.agents.get_mut(&agent) else {
            return false;
        };
        let targets = TargetView {
            targets: &self.targets,
            entities: &self.entities,
        };
        let mut ctx = AgentContext {
            owner: agent,
            role: self.role,
            owner_transform: entity_transform(&self.entities, agent),
            targets: &targets,
            outbox: &mut self.outbox,
        };
        interactor.remove_candidate(target, &mut ctx);
        true
    }
}
