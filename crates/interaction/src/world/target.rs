use serde::{Deserialize, Serialize};
use tracing::debug;

use super::intents::{InteractionIntent, InteractionIntentQueue};
use super::types::{EntityId, NetRole, Transform, Vec2};

pub const DEFAULT_INTERACTION_DESCRIPTION: &str = "Interact";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractiveState {
    #[default]
    Ready,
    Interacted,
}

impl InteractiveState {
    pub fn toggled(self) -> Self {
        match self {
            Self::Ready => Self::Interacted,
            Self::Interacted => Self::Ready,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Repeatable targets toggle between states; single-use targets lock on `Interacted`.
    pub repeatable: bool,
    pub description: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            repeatable: true,
            description: DEFAULT_INTERACTION_DESCRIPTION.to_string(),
        }
    }
}

/// Handle a target uses to reach the rest of the world during a call.
///
/// Calls into agents are queued and run by the world once the target call returns,
/// in the order they were requested.
pub struct TargetContext<'a> {
    target: EntityId,
    role: NetRole,
    intents: &'a mut InteractionIntentQueue,
}

impl<'a> TargetContext<'a> {
    pub(crate) fn new(
        target: EntityId,
        role: NetRole,
        intents: &'a mut InteractionIntentQueue,
    ) -> Self {
        Self {
            target,
            role,
            intents,
        }
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn has_authority(&self) -> bool {
        self.role.has_authority()
    }

    pub fn add_candidate(&mut self, agent: EntityId) {
        self.intents.enqueue(InteractionIntent::AddCandidate {
            agent,
            target: self.target,
        });
    }

    pub fn remove_candidate(&mut self, agent: EntityId) {
        self.intents.enqueue(InteractionIntent::RemoveCandidate {
            agent,
            target: self.target,
        });
    }

    /// Broadcasts a new state to every observer. Ignored on non-authoritative instances.
    pub fn replicate_state(&mut self, state: InteractiveState) {
        if !self.has_authority() {
            return;
        }
        self.intents.enqueue(InteractionIntent::ReplicateState {
            target: self.target,
            state,
        });
    }
}

/// Capability set an entity needs to be picked and used by an interactor.
pub trait Interactive {
    fn interact(&mut self, instigator: EntityId, ctx: &mut TargetContext<'_>);

    fn can_be_interacted(&self, instigator: EntityId) -> bool;

    fn interactive_location(&self, transform: &Transform) -> Vec2 {
        transform.position
    }

    fn interaction_description(&self) -> &str;

    fn register_agent_in_range(&mut self, agent: EntityId, ctx: &mut TargetContext<'_>) {
        if self.can_be_interacted(agent) {
            ctx.add_candidate(agent);
        }
    }

    fn unregister_agent_in_range(&mut self, agent: EntityId, ctx: &mut TargetContext<'_>) {
        ctx.remove_candidate(agent);
    }

    /// Runs on observers when a replicated state update for this target arrives.
    fn on_state_replicated(&mut self, _state: InteractiveState, _ctx: &mut TargetContext<'_>) {}

    fn replicated_state(&self) -> Option<InteractiveState> {
        None
    }

    /// Agents currently registered as being in range of this target.
    fn registered_agents(&self) -> &[EntityId] {
        &[]
    }
}

pub trait InteractionBehavior {
    /// Domain effect. Runs once per successful interaction, on the authority only.
    fn apply_effect(&mut self, _target: EntityId, _instigator: EntityId) {}

    /// Presentation feedback. Runs on every machine that observes the new state.
    fn play_feedback(&mut self, _target: EntityId, _state: InteractiveState) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBehavior;

impl InteractionBehavior for NoBehavior {}

#[derive(Debug)]
pub struct InteractiveTarget<B = NoBehavior> {
    config: TargetConfig,
    state: InteractiveState,
    candidate_agents: Vec<EntityId>,
    behavior: B,
}

impl InteractiveTarget<NoBehavior> {
    pub fn plain(config: TargetConfig) -> Self {
        Self::new(config, NoBehavior)
    }
}

impl<B: InteractionBehavior> InteractiveTarget<B> {
    pub fn new(config: TargetConfig, behavior: B) -> Self {
        Self {
            config,
            state: InteractiveState::Ready,
            candidate_agents: Vec::new(),
            behavior,
        }
    }

    pub fn state(&self) -> InteractiveState {
        self.state
    }

    pub fn candidate_agents(&self) -> &[EntityId] {
        &self.candidate_agents
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    fn on_state_changed(&mut self, ctx: &mut TargetContext<'_>) {
        if self.state != InteractiveState::Interacted && !self.config.repeatable {
            return;
        }

        if !self.config.repeatable {
            for agent in self.candidate_agents.drain(..) {
                ctx.remove_candidate(agent);
            }
        }

        self.behavior.play_feedback(ctx.target(), self.state);
    }
}

impl<B: InteractionBehavior> Interactive for InteractiveTarget<B> {
    fn interact(&mut self, instigator: EntityId, ctx: &mut TargetContext<'_>) {
        if !ctx.has_authority() {
            debug!(
                target_id = ctx.target().0,
                instigator = instigator.0,
                "interact_ignored_without_authority"
            );
            return;
        }
        if !self.can_be_interacted(instigator) {
            debug!(
                target_id = ctx.target().0,
                instigator = instigator.0,
                "interact_ignored_not_interactable"
            );
            return;
        }

        self.behavior.apply_effect(ctx.target(), instigator);

        self.state = if self.config.repeatable {
            self.state.toggled()
        } else {
            InteractiveState::Interacted
        };
        debug!(
            target_id = ctx.target().0,
            instigator = instigator.0,
            state = ?self.state,
            "target_interacted"
        );

        ctx.replicate_state(self.state);
        // The authority never receives its own replication callback.
        self.on_state_changed(ctx);
    }

    fn can_be_interacted(&self, _instigator: EntityId) -> bool {
        self.config.repeatable || self.state == InteractiveState::Ready
    }

    fn interaction_description(&self) -> &str {
        &self.config.description
    }

    fn register_agent_in_range(&mut self, agent: EntityId, ctx: &mut TargetContext<'_>) {
        if !self.can_be_interacted(agent) || self.candidate_agents.contains(&agent) {
            return;
        }
        self.candidate_agents.push(agent);
        ctx.add_candidate(agent);
    }

    fn unregister_agent_in_range(&mut self, agent: EntityId, ctx: &mut TargetContext<'_>) {
        self.candidate_agents.retain(|candidate| *candidate != agent);
        ctx.remove_candidate(agent);
    }

    fn on_state_replicated(&mut self, state: InteractiveState, ctx: &mut TargetContext<'_>) {
        if state == self.state {
            return;
        }
        self.state = state;
        self.on_state_changed(ctx);
    }

    fn replicated_state(&self) -> Option<InteractiveState> {
        Some(self.state)
    }

    fn registered_agents(&self) -> &[EntityId] {
        &self.candidate_agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::types::PeerId;

    #[derive(Debug, Default)]
    struct RecordingBehavior {
        effects: Vec<EntityId>,
        feedback: Vec<InteractiveState>,
    }

    impl InteractionBehavior for RecordingBehavior {
        fn apply_effect(&mut self, _target: EntityId, instigator: EntityId) {
            self.effects.push(instigator);
        }

        fn play_feedback(&mut self, _target: EntityId, state: InteractiveState) {
            self.feedback.push(state);
        }
    }

    const TARGET: EntityId = EntityId(10);
    const AGENT_A: EntityId = EntityId(1);
    const AGENT_B: EntityId = EntityId(2);

    fn single_use() -> InteractiveTarget<RecordingBehavior> {
        InteractiveTarget::new(
            TargetConfig {
                repeatable: false,
                description: "Open chest".to_string(),
            },
            RecordingBehavior::default(),
        )
    }

    fn repeatable() -> InteractiveTarget<RecordingBehavior> {
        InteractiveTarget::new(TargetConfig::default(), RecordingBehavior::default())
    }

    fn interact_as(
        target: &mut InteractiveTarget<RecordingBehavior>,
        role: NetRole,
        instigator: EntityId,
    ) -> Vec<InteractionIntent> {
        let mut queue = InteractionIntentQueue::default();
        let mut ctx = TargetContext::new(TARGET, role, &mut queue);
        target.interact(instigator, &mut ctx);
        queue.drain_all()
    }

    fn register(
        target: &mut InteractiveTarget<RecordingBehavior>,
        agent: EntityId,
    ) -> Vec<InteractionIntent> {
        let mut queue = InteractionIntentQueue::default();
        let mut ctx = TargetContext::new(TARGET, NetRole::Authority, &mut queue);
        target.register_agent_in_range(agent, &mut ctx);
        queue.drain_all()
    }

    #[test]
    fn default_config_matches_plugin_defaults() {
        let config = TargetConfig::default();
        assert!(config.repeatable);
        assert_eq!(config.description, "Interact");
    }

    #[test]
    fn repeatable_target_is_always_interactable() {
        let mut target = repeatable();
        assert!(target.can_be_interacted(AGENT_A));
        interact_as(&mut target, NetRole::Authority, AGENT_A);
        assert_eq!(target.state(), InteractiveState::Interacted);
        assert!(target.can_be_interacted(AGENT_A));
    }

    #[test]
    fn repeatable_target_toggles_back_after_two_interactions() {
        let mut target = repeatable();
        for round in 1..=5 {
            interact_as(&mut target, NetRole::Authority, AGENT_A);
            let expected = if round % 2 == 0 {
                InteractiveState::Ready
            } else {
                InteractiveState::Interacted
            };
            assert_eq!(target.state(), expected, "round {round}");
        }
        assert_eq!(target.behavior().effects.len(), 5);
        assert_eq!(target.behavior().feedback.len(), 5);
    }

    #[test]
    fn single_use_target_locks_after_first_interaction() {
        let mut target = single_use();
        register(&mut target, AGENT_A);
        register(&mut target, AGENT_B);

        let intents = interact_as(&mut target, NetRole::Authority, AGENT_A);

        assert_eq!(target.state(), InteractiveState::Interacted);
        assert!(!target.can_be_interacted(AGENT_A));
        assert!(!target.can_be_interacted(AGENT_B));
        assert!(target.candidate_agents().is_empty());
        assert_eq!(
            intents,
            vec![
                InteractionIntent::ReplicateState {
                    target: TARGET,
                    state: InteractiveState::Interacted,
                },
                InteractionIntent::RemoveCandidate {
                    agent: AGENT_A,
                    target: TARGET,
                },
                InteractionIntent::RemoveCandidate {
                    agent: AGENT_B,
                    target: TARGET,
                },
            ]
        );

        let second = interact_as(&mut target, NetRole::Authority, AGENT_B);
        assert!(second.is_empty());
        assert_eq!(target.behavior().effects, vec![AGENT_A]);
    }

    #[test]
    fn single_use_target_refuses_new_agents_once_used() {
        let mut target = single_use();
        interact_as(&mut target, NetRole::Authority, AGENT_A);

        let intents = register(&mut target, AGENT_B);

        assert!(intents.is_empty());
        assert!(target.candidate_agents().is_empty());
    }

    #[test]
    fn interact_without_authority_changes_nothing() {
        let mut target = single_use();
        let intents = interact_as(&mut target, NetRole::Client(PeerId(1)), AGENT_A);

        assert!(intents.is_empty());
        assert_eq!(target.state(), InteractiveState::Ready);
        assert!(target.behavior().effects.is_empty());
        assert!(target.behavior().feedback.is_empty());
    }

    #[test]
    fn register_twice_adds_candidate_once() {
        let mut target = repeatable();
        let first = register(&mut target, AGENT_A);
        let second = register(&mut target, AGENT_A);

        assert_eq!(
            first,
            vec![InteractionIntent::AddCandidate {
                agent: AGENT_A,
                target: TARGET,
            }]
        );
        assert!(second.is_empty());
        assert_eq!(target.candidate_agents(), &[AGENT_A]);
    }

    #[test]
    fn unregister_is_idempotent_and_always_notifies_agent() {
        let mut target = repeatable();
        register(&mut target, AGENT_A);

        for _ in 0..2 {
            let mut queue = InteractionIntentQueue::default();
            let mut ctx = TargetContext::new(TARGET, NetRole::Authority, &mut queue);
            target.unregister_agent_in_range(AGENT_A, &mut ctx);
            assert_eq!(
                queue.drain_all(),
                vec![InteractionIntent::RemoveCandidate {
                    agent: AGENT_A,
                    target: TARGET,
                }]
            );
        }
        assert!(target.candidate_agents().is_empty());
    }

    #[test]
    fn replicated_state_runs_feedback_and_evicts_on_observers() {
        let mut target = single_use();
        register(&mut target, AGENT_A);

        let mut queue = InteractionIntentQueue::default();
        let mut ctx = TargetContext::new(TARGET, NetRole::Client(PeerId(1)), &mut queue);
        target.on_state_replicated(InteractiveState::Interacted, &mut ctx);

        assert_eq!(target.state(), InteractiveState::Interacted);
        assert_eq!(
            target.behavior().feedback,
            vec![InteractiveState::Interacted]
        );
        assert_eq!(
            queue.drain_all(),
            vec![InteractionIntent::RemoveCandidate {
                agent: AGENT_A,
                target: TARGET,
            }]
        );
    }

    #[test]
    fn replicated_state_equal_to_current_is_ignored() {
        let mut target = repeatable();
        let mut queue = InteractionIntentQueue::default();
        let mut ctx = TargetContext::new(TARGET, NetRole::Client(PeerId(1)), &mut queue);
        target.on_state_replicated(InteractiveState::Ready, &mut ctx);

        assert!(target.behavior().feedback.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn repeatable_target_plays_feedback_when_returning_to_ready() {
        let mut target = repeatable();
        let mut queue = InteractionIntentQueue::default();
        let mut ctx = TargetContext::new(TARGET, NetRole::Client(PeerId(1)), &mut queue);
        target.on_state_replicated(InteractiveState::Interacted, &mut ctx);
        target.on_state_replicated(InteractiveState::Ready, &mut ctx);

        assert_eq!(
            target.behavior().feedback,
            vec![InteractiveState::Interacted, InteractiveState::Ready]
        );
    }

    #[test]
    fn client_context_never_queues_replication() {
        let mut queue = InteractionIntentQueue::default();
        let mut ctx = TargetContext::new(TARGET, NetRole::Client(PeerId(2)), &mut queue);
        ctx.replicate_state(InteractiveState::Interacted);
        assert!(queue.drain_all().is_empty());
    }
}
