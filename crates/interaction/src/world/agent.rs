use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::types::{EntityId, NetRole, PeerId, Transform, Vec2};
use crate::net::{Envelope, NetMessage, Outbox};

pub const DEFAULT_PROBE_RANGE: f32 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeChannel {
    #[default]
    Visibility,
    Camera,
    Interaction,
    Custom(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractorConfig {
    pub probe_range: f32,
    pub probe_channel: ProbeChannel,
}

impl Default for InteractorConfig {
    fn default() -> Self {
        Self {
            probe_range: DEFAULT_PROBE_RANGE,
            probe_channel: ProbeChannel::Visibility,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeQuery {
    pub origin: Transform,
    pub range: f32,
    pub channel: ProbeChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeHit {
    pub entity: Option<EntityId>,
    pub interactive: bool,
    pub distance: f32,
}

impl ProbeHit {
    pub fn interactive(entity: EntityId, distance: f32) -> Self {
        Self {
            entity: Some(entity),
            interactive: true,
            distance,
        }
    }

    pub fn obstruction(entity: EntityId, distance: f32) -> Self {
        Self {
            entity: Some(entity),
            interactive: false,
            distance,
        }
    }

    pub fn geometry(distance: f32) -> Self {
        Self {
            entity: None,
            interactive: false,
            distance,
        }
    }

    fn interactive_entity(&self) -> Option<EntityId> {
        if self.interactive {
            self.entity
        } else {
            None
        }
    }
}

/// Directional query along the owner's aim. Hits must come back nearest first.
pub trait DirectionalProbe {
    fn probe(&self, query: &ProbeQuery) -> Vec<ProbeHit>;
}

impl<F> DirectionalProbe for F
where
    F: Fn(&ProbeQuery) -> Vec<ProbeHit>,
{
    fn probe(&self, query: &ProbeQuery) -> Vec<ProbeHit> {
        self(query)
    }
}

pub trait InteractionWidget {
    fn add_to_viewport(&mut self);
    fn remove_from_parent(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetRequest<'a> {
    pub agent: EntityId,
    pub target: EntityId,
    pub description: &'a str,
}

pub trait WidgetFactory {
    fn create_widget(&mut self, request: &WidgetRequest<'_>)
        -> Option<Box<dyn InteractionWidget>>;
}

impl<F> WidgetFactory for F
where
    F: FnMut(&WidgetRequest<'_>) -> Option<Box<dyn InteractionWidget>>,
{
    fn create_widget(
        &mut self,
        request: &WidgetRequest<'_>,
    ) -> Option<Box<dyn InteractionWidget>> {
        self(request)
    }
}

/// Read access to the targets of the world an agent lives in.
pub(crate) trait TargetLookup {
    fn contains(&self, target: EntityId) -> bool;
    fn can_be_interacted(&self, target: EntityId, instigator: EntityId) -> bool;
    fn location(&self, target: EntityId) -> Option<Vec2>;
}

pub(crate) struct AgentContext<'a> {
    pub(crate) owner: EntityId,
    pub(crate) role: NetRole,
    pub(crate) owner_transform: Transform,
    pub(crate) targets: &'a dyn TargetLookup,
    pub(crate) outbox: &'a mut Outbox,
}

pub struct InteractorAgent {
    owning_peer: PeerId,
    config: InteractorConfig,
    candidate_targets: Vec<EntityId>,
    most_relevant_target: Option<EntityId>,
    probe: Option<Box<dyn DirectionalProbe>>,
    probe_missing_reported: bool,
    widget_factory: Option<Box<dyn WidgetFactory>>,
    active_widget: Option<Box<dyn InteractionWidget>>,
}

impl fmt::Debug for InteractorAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractorAgent")
            .field("owning_peer", &self.owning_peer)
            .field("config", &self.config)
            .field("candidate_targets", &self.candidate_targets)
            .field("most_relevant_target", &self.most_relevant_target)
            .field("probe_bound", &self.probe.is_some())
            .field("widget_factory_bound", &self.widget_factory.is_some())
            .field("has_active_widget", &self.active_widget.is_some())
            .finish()
    }
}

impl InteractorAgent {
    pub fn new(owning_peer: PeerId, config: InteractorConfig) -> Self {
        Self {
            owning_peer,
            config,
            candidate_targets: Vec::new(),
            most_relevant_target: None,
            probe: None,
            probe_missing_reported: false,
            widget_factory: None,
            active_widget: None,
        }
    }

    pub fn with_probe(mut self, probe: impl DirectionalProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn with_widget_factory(mut self, factory: impl WidgetFactory + 'static) -> Self {
        self.widget_factory = Some(Box::new(factory));
        self
    }

    pub fn owning_peer(&self) -> PeerId {
        self.owning_peer
    }

    pub fn candidate_targets(&self) -> &[EntityId] {
        &self.candidate_targets
    }

    pub fn most_relevant_target(&self) -> Option<EntityId> {
        self.most_relevant_target
    }

    pub fn has_active_widget(&self) -> bool {
        self.active_widget.is_some()
    }

    pub(crate) fn set_probe(&mut self, probe: Box<dyn DirectionalProbe>) {
        self.probe = Some(probe);
    }

    pub(crate) fn set_widget_factory(&mut self, factory: Box<dyn WidgetFactory>) {
        self.widget_factory = Some(factory);
    }

    pub(crate) fn add_candidate(&mut self, target: EntityId, ctx: &mut AgentContext<'_>) {
        if !ctx.targets.contains(target) {
            return;
        }
        if !ctx.targets.can_be_interacted(target, ctx.owner) {
            return;
        }
        if self.candidate_targets.contains(&target) {
            return;
        }

        self.candidate_targets.push(target);
        self.recompute_relevancy(ctx);
    }

    pub(crate) fn remove_candidate(&mut self, target: EntityId, ctx: &mut AgentContext<'_>) {
        self.candidate_targets.retain(|candidate| *candidate != target);
        self.recompute_relevancy(ctx);
    }

    pub(crate) fn recompute_relevancy(&mut self, ctx: &mut AgentContext<'_>) {
        let Some(probe) = self.probe.as_ref() else {
            if !self.probe_missing_reported {
                self.probe_missing_reported = true;
                error!(
                    agent = ctx.owner.0,
                    "interaction probe is not bound; did you forget to call set_probe?"
                );
            }
            self.drop_stale_selection(ctx);
            return;
        };

        let previous = self.most_relevant_target;

        self.candidate_targets
            .retain(|candidate| ctx.targets.contains(*candidate));
        let owner_position = ctx.owner_transform.position;
        let targets = ctx.targets;
        self.candidate_targets.sort_by(|a, b| {
            let da = squared_distance_to(targets, owner_position, *a);
            let db = squared_distance_to(targets, owner_position, *b);
            da.total_cmp(&db)
        });

        self.most_relevant_target = self.candidate_targets.first().copied();

        let hits = probe.probe(&ProbeQuery {
            origin: ctx.owner_transform,
            range: self.config.probe_range,
            channel: self.config.probe_channel,
        });
        // Hits without an entity are skipped. The nearest entity hit decides: anything
        // that is not a registered interactive candidate leaves the distance default.
        let first_entity_hit = hits.iter().find(|hit| hit.entity.is_some());
        if let Some(aimed) = first_entity_hit.and_then(ProbeHit::interactive_entity) {
            if self.candidate_targets.contains(&aimed) {
                self.most_relevant_target = Some(aimed);
            }
        }

        if self.most_relevant_target == previous {
            return;
        }
        debug!(
            agent = ctx.owner.0,
            previous = ?previous.map(|id| id.0),
            current = ?self.most_relevant_target.map(|id| id.0),
            "relevancy_changed"
        );

        if ctx.role.has_authority() {
            ctx.outbox.push(Envelope::to_client(
                self.owning_peer,
                NetMessage::HideInteractionWidget { agent: ctx.owner },
            ));
            if let Some(target) = self.most_relevant_target {
                ctx.outbox.push(Envelope::to_client(
                    self.owning_peer,
                    NetMessage::ShowInteractionWidget {
                        agent: ctx.owner,
                        target,
                    },
                ));
            }
        }
    }

    /// Without a probe the selection is only cleared once it leaves the candidate set.
    fn drop_stale_selection(&mut self, ctx: &mut AgentContext<'_>) {
        let Some(selected) = self.most_relevant_target else {
            return;
        };
        if self.candidate_targets.contains(&selected) {
            return;
        }
        self.most_relevant_target = None;
        debug!(agent = ctx.owner.0, previous = selected.0, "stale_selection_cleared");
        if ctx.role.has_authority() {
            ctx.outbox.push(Envelope::to_client(
                self.owning_peer,
                NetMessage::HideInteractionWidget { agent: ctx.owner },
            ));
        }
    }

    pub(crate) fn show_widget(&mut self, agent: EntityId, target: EntityId, description: &str) {
        if self.active_widget.is_some() {
            warn!(
                agent = agent.0,
                target_id = target.0,
                "stale interaction widget released before show"
            );
            self.hide_widget();
        }

        let Some(factory) = self.widget_factory.as_mut() else {
            return;
        };
        let request = WidgetRequest {
            agent,
            target,
            description,
        };
        if let Some(mut widget) = factory.create_widget(&request) {
            widget.add_to_viewport();
            self.active_widget = Some(widget);
        }
    }

    pub(crate) fn hide_widget(&mut self) {
        if let Some(mut widget) = self.active_widget.take() {
            widget.remove_from_parent();
        }
    }
}

fn squared_distance_to(targets: &dyn TargetLookup, origin: Vec2, target: EntityId) -> f32 {
    targets
        .location(target)
        .map(|location| origin.distance_squared(location))
        .unwrap_or(f32::MAX)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct FakeTargets {
        locations: BTreeMap<EntityId, Vec2>,
        locked: Vec<EntityId>,
    }

    impl FakeTargets {
        fn with(mut self, id: u64, x: f32) -> Self {
            self.locations.insert(EntityId(id), Vec2::new(x, 0.0));
            self
        }
    }

    impl TargetLookup for FakeTargets {
        fn contains(&self, target: EntityId) -> bool {
            self.locations.contains_key(&target)
        }

        fn can_be_interacted(&self, target: EntityId, _instigator: EntityId) -> bool {
            !self.locked.contains(&target)
        }

        fn location(&self, target: EntityId) -> Option<Vec2> {
            self.locations.get(&target).copied()
        }
    }

    fn agent_with_hits(hits: Rc<RefCell<Vec<ProbeHit>>>) -> InteractorAgent {
        InteractorAgent::new(PeerId(1), InteractorConfig::default())
            .with_probe(move |_query: &ProbeQuery| hits.borrow().clone())
    }

    fn run<R>(
        targets: &FakeTargets,
        role: NetRole,
        outbox: &mut Outbox,
        f: impl FnOnce(&mut AgentContext<'_>) -> R,
    ) -> R {
        let mut ctx = AgentContext {
            owner: EntityId(0),
            role,
            owner_transform: Transform::at(Vec2::ZERO),
            targets,
            outbox,
        };
        f(&mut ctx)
    }

    #[test]
    fn default_config_matches_plugin_defaults() {
        let config = InteractorConfig::default();
        assert_eq!(config.probe_range, 100.0);
        assert_eq!(config.probe_channel, ProbeChannel::Visibility);
    }

    #[test]
    fn candidates_stay_sorted_by_distance() {
        let targets = FakeTargets::default().with(1, 5.0).with(2, 1.0).with(3, 3.0);
        let mut agent = agent_with_hits(Rc::default());
        let mut outbox = Outbox::default();

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.add_candidate(EntityId(1), ctx);
            agent.add_candidate(EntityId(2), ctx);
            agent.add_candidate(EntityId(3), ctx);
            agent.add_candidate(EntityId(2), ctx);
        });

        assert_eq!(
            agent.candidate_targets(),
            &[EntityId(2), EntityId(3), EntityId(1)]
        );
        assert_eq!(agent.most_relevant_target(), Some(EntityId(2)));
    }

    #[test]
    fn add_ignores_unknown_and_locked_targets() {
        let mut targets = FakeTargets::default().with(1, 1.0);
        targets.locked.push(EntityId(1));
        let mut agent = agent_with_hits(Rc::default());
        let mut outbox = Outbox::default();

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.add_candidate(EntityId(1), ctx);
            agent.add_candidate(EntityId(99), ctx);
        });

        assert!(agent.candidate_targets().is_empty());
        assert!(outbox.is_empty());
    }

    #[test]
    fn aimed_candidate_overrides_distance_default() {
        let targets = FakeTargets::default().with(1, 1.0).with(2, 2.0);
        let hits = Rc::new(RefCell::new(vec![ProbeHit::interactive(EntityId(2), 2.0)]));
        let mut agent = agent_with_hits(hits);
        let mut outbox = Outbox::default();

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.add_candidate(EntityId(1), ctx);
            agent.add_candidate(EntityId(2), ctx);
        });

        assert_eq!(agent.most_relevant_target(), Some(EntityId(2)));
    }

    #[test]
    fn only_first_hit_is_considered() {
        let targets = FakeTargets::default().with(1, 1.0).with(2, 2.0);
        let hits = Rc::new(RefCell::new(vec![
            ProbeHit::interactive(EntityId(7), 0.5),
            ProbeHit::interactive(EntityId(2), 2.0),
        ]));
        let mut agent = agent_with_hits(hits);
        let mut outbox = Outbox::default();

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.add_candidate(EntityId(1), ctx);
            agent.add_candidate(EntityId(2), ctx);
        });

        assert_eq!(agent.most_relevant_target(), Some(EntityId(1)));
    }

    #[test]
    fn entityless_hits_are_skipped_before_the_first_entity_hit() {
        let targets = FakeTargets::default().with(1, 1.0).with(2, 4.0);
        let hits = Rc::new(RefCell::new(vec![
            ProbeHit::geometry(0.5),
            ProbeHit::interactive(EntityId(2), 4.0),
        ]));
        let mut agent = agent_with_hits(Rc::clone(&hits));
        let mut outbox = Outbox::default();

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.add_candidate(EntityId(1), ctx);
            agent.add_candidate(EntityId(2), ctx);
        });
        assert_eq!(agent.most_relevant_target(), Some(EntityId(2)));

        *hits.borrow_mut() = vec![
            ProbeHit::geometry(0.5),
            ProbeHit::obstruction(EntityId(9), 1.0),
            ProbeHit::interactive(EntityId(2), 4.0),
        ];
        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.recompute_relevancy(ctx);
        });
        assert_eq!(agent.most_relevant_target(), Some(EntityId(1)));
    }

    #[test]
    fn missing_probe_leaves_relevancy_untouched() {
        let targets = FakeTargets::default().with(1, 1.0);
        let mut agent = InteractorAgent::new(PeerId(1), InteractorConfig::default());
        let mut outbox = Outbox::default();

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.add_candidate(EntityId(1), ctx);
        });

        assert_eq!(agent.candidate_targets(), &[EntityId(1)]);
        assert_eq!(agent.most_relevant_target(), None);
        assert!(outbox.is_empty());
        assert!(agent.probe_missing_reported);

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.recompute_relevancy(ctx);
            agent.recompute_relevancy(ctx);
        });
        assert!(agent.probe_missing_reported);
    }

    #[test]
    fn removing_selected_candidate_clears_selection_without_probe() {
        let targets = FakeTargets::default().with(1, 1.0).with(2, 2.0);
        let mut agent = agent_with_hits(Rc::default());
        let mut outbox = Outbox::default();

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.add_candidate(EntityId(1), ctx);
            agent.add_candidate(EntityId(2), ctx);
        });
        assert_eq!(agent.most_relevant_target(), Some(EntityId(1)));
        outbox.drain();

        agent.probe = None;
        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.remove_candidate(EntityId(2), ctx);
        });
        assert_eq!(agent.most_relevant_target(), Some(EntityId(1)));
        assert!(outbox.is_empty());

        run(&targets, NetRole::Authority, &mut outbox, |ctx| {
            agent.remove_candidate(EntityId(1), ctx);
        });
        assert!(agent.candidate_targets().is_empty());
        assert_eq!(agent.most_relevant_target(), None);
        assert_eq!(
            outbox.drain(),
            vec![Envelope::to_client(
                PeerId(1),
                NetMessage::HideInteractionWidget { agent: EntityId(0) },
            )]
        );
    }

    #[test]
    fn client_instance_never_sends_widget_notifications() {
        let targets = FakeTargets::default().with(1, 1.0);
        let mut agent = agent_with_hits(Rc::default());
        let mut outbox = Outbox::default();

        run(&targets, NetRole::Client(PeerId(1)), &mut outbox, |ctx| {
            agent.add_candidate(EntityId(1), ctx);
        });

        assert_eq!(agent.most_relevant_target(), Some(EntityId(1)));
        assert!(outbox.is_empty());
    }

    struct CountingWidget {
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl InteractionWidget for CountingWidget {
        fn add_to_viewport(&mut self) {
            self.log.borrow_mut().push("add");
        }

        fn remove_from_parent(&mut self) {
            self.log.borrow_mut().push("remove");
        }
    }

    #[test]
    fn show_then_hide_releases_widget() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let factory_log = Rc::clone(&log);
        let mut agent = InteractorAgent::new(PeerId(1), InteractorConfig::default())
            .with_widget_factory(move |_request: &WidgetRequest<'_>| {
                Some(Box::new(CountingWidget {
                    log: Rc::clone(&factory_log),
                }) as Box<dyn InteractionWidget>)
            });

        agent.show_widget(EntityId(1), EntityId(4), "Open");
        assert!(agent.has_active_widget());
        agent.hide_widget();
        agent.hide_widget();

        assert!(!agent.has_active_widget());
        assert_eq!(*log.borrow(), vec!["add", "remove"]);
    }

    #[test]
    fn show_without_factory_is_silent() {
        let mut agent = InteractorAgent::new(PeerId(1), InteractorConfig::default());
        agent.show_widget(EntityId(1), EntityId(4), "Open");
        assert!(!agent.has_active_widget());
    }
}
