mod agent;
mod intents;
mod store;
mod target;
mod types;

pub use agent::{
    DirectionalProbe, InteractionWidget, InteractorAgent, InteractorConfig, ProbeChannel,
    ProbeHit, ProbeQuery, WidgetFactory, WidgetRequest, DEFAULT_PROBE_RANGE,
};
pub use intents::IntentApplyStats;
pub use store::{Entity, InteractionWorld, WorldError};
pub use target::{
    InteractionBehavior, Interactive, InteractiveState, InteractiveTarget, NoBehavior,
    TargetConfig, TargetContext, DEFAULT_INTERACTION_DESCRIPTION,
};
pub use types::{EntityId, EntityIdAllocator, NetRole, PeerId, Transform, Vec2};
