pub mod net;
pub mod world;

pub use net::{
    Envelope, LoopbackNetwork, NetMessage, NetMessageKind, NetStats, Origin, Outbox, Recipient,
    TransportError,
};
pub use world::{
    DirectionalProbe, Entity, EntityId, InteractionBehavior, InteractionWidget, InteractionWorld,
    Interactive, InteractiveState, InteractiveTarget, InteractorAgent, InteractorConfig,
    NetRole, NoBehavior, PeerId, ProbeChannel, ProbeHit, ProbeQuery, TargetConfig, TargetContext,
    Transform, Vec2, WidgetFactory, WidgetRequest, WorldError,
};
