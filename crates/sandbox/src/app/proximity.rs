use std::collections::BTreeSet;

use interaction::{EntityId, InteractionWorld};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TriggerVolume {
    pub(crate) target: EntityId,
    pub(crate) radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProximityEvent {
    Enter { target: EntityId, agent: EntityId },
    Exit { target: EntityId, agent: EntityId },
}

/// Radius triggers around targets. Tracks which local agents are inside which volume and
/// turns the difference since the last update into register/unregister calls.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProximityTracker {
    volumes: Vec<TriggerVolume>,
    inside: BTreeSet<(EntityId, EntityId)>,
}

impl ProximityTracker {
    pub(crate) fn new(volumes: Vec<TriggerVolume>) -> Self {
        Self {
            volumes,
            inside: BTreeSet::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn overlaps(&self) -> usize {
        self.inside.len()
    }

    /// Exits are reported before enters.
    pub(crate) fn detect(&self, world: &InteractionWorld) -> Vec<ProximityEvent> {
        let mut now_inside = BTreeSet::new();
        for agent in world.agent_ids() {
            let Some(agent_entity) = world.find_entity(agent) else {
                continue;
            };
            let agent_position = agent_entity.transform.position;
            for volume in &self.volumes {
                let Some(target_entity) = world.find_entity(volume.target) else {
                    continue;
                };
                let distance_squared =
                    agent_position.distance_squared(target_entity.transform.position);
                if distance_squared <= volume.radius * volume.radius {
                    now_inside.insert((volume.target, agent));
                }
            }
        }

        let exits = self
            .inside
            .difference(&now_inside)
            .map(|&(target, agent)| ProximityEvent::Exit { target, agent });
        let enters = now_inside
            .difference(&self.inside)
            .map(|&(target, agent)| ProximityEvent::Enter { target, agent });
        exits.chain(enters).collect()
    }

    pub(crate) fn update(&mut self, world: &mut InteractionWorld) -> usize {
        let events = self.detect(world);
        for event in &events {
            match *event {
                ProximityEvent::Enter { target, agent } => {
                    debug!(target_id = target.0, agent = agent.0, "trigger_enter");
                    self.inside.insert((target, agent));
                    world.register_agent_in_range(target, agent);
                }
                ProximityEvent::Exit { target, agent } => {
                    debug!(target_id = target.0, agent = agent.0, "trigger_exit");
                    self.inside.remove(&(target, agent));
                    world.unregister_agent_in_range(target, agent);
                }
            }
        }
        events.len()
    }
}
