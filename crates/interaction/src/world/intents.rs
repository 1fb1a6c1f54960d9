use std::collections::VecDeque;

use super::target::InteractiveState;
use super::types::EntityId;

/// Cross-entity call queued by a target while it is borrowed, applied by the world
/// right after the target call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InteractionIntent {
    AddCandidate {
        agent: EntityId,
        target: EntityId,
    },
    RemoveCandidate {
        agent: EntityId,
        target: EntityId,
    },
    ReplicateState {
        target: EntityId,
        state: InteractiveState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InteractionIntentKind {
    AddCandidate,
    RemoveCandidate,
    ReplicateState,
}

impl InteractionIntent {
    pub(crate) fn kind(self) -> InteractionIntentKind {
        match self {
            Self::AddCandidate { .. } => InteractionIntentKind::AddCandidate,
            Self::RemoveCandidate { .. } => InteractionIntentKind::RemoveCandidate,
            Self::ReplicateState { .. } => InteractionIntentKind::ReplicateState,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentApplyStats {
    pub total: u32,
    pub add_candidate: u32,
    pub remove_candidate: u32,
    pub replicate_state: u32,
    pub missing_agent: u32,
}

impl IntentApplyStats {
    pub(crate) fn record_intent(&mut self, kind: InteractionIntentKind) {
        self.total = self.total.saturating_add(1);
        match kind {
            InteractionIntentKind::AddCandidate => {
                self.add_candidate = self.add_candidate.saturating_add(1)
            }
            InteractionIntentKind::RemoveCandidate => {
                self.remove_candidate = self.remove_candidate.saturating_add(1)
            }
            InteractionIntentKind::ReplicateState => {
                self.replicate_state = self.replicate_state.saturating_add(1)
            }
        }
    }

    pub(crate) fn record_missing_agent(&mut self) {
        self.missing_agent = self.missing_agent.saturating_add(1);
    }
}

#[derive(Debug, Default)]
pub(crate) struct InteractionIntentQueue {
    intents: VecDeque<InteractionIntent>,
}

impl InteractionIntentQueue {
    pub(crate) fn enqueue(&mut self, intent: InteractionIntent) {
        self.intents.push_back(intent);
    }

    pub(crate) fn pop_next(&mut self) -> Option<InteractionIntent> {
        self.intents.pop_front()
    }

    #[cfg(test)]
    pub(crate) fn drain_all(&mut self) -> Vec<InteractionIntent> {
        self.intents.drain(..).collect()
    }
}
