use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use interaction::{
    EntityId, InteractionWorld, InteractiveState, InteractiveTarget, InteractorAgent,
    LoopbackNetwork, NetRole, NetStats, PeerId, Transform, TransportError, WorldError,
};
use thiserror::Error;
use tracing::{debug, info};

use super::probe::{Collider, RayProbe};
use super::props::{HudWidgetFactory, PropBehavior, PropLedger, SharedHud, SharedLedger};
use super::proximity::{ProximityTracker, TriggerVolume};
use super::scenario::{Scenario, Step};

pub(crate) const SERVER_MACHINE: &str = "server";

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("build world: {0}")]
    World(#[from] WorldError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("entity ids diverged between server and {machine}")]
    DivergedIds { machine: String },
    #[error("unknown player '{0}'")]
    UnknownPlayer(String),
}

#[derive(Debug, Clone)]
struct PlayerHandle {
    name: String,
    peer: PeerId,
    pawn: EntityId,
    hud: SharedHud,
}

/// Entity ids of everything a scenario spawns, identical on every machine.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    targets: Vec<(String, EntityId)>,
    pawns: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TargetSummary {
    pub(crate) name: String,
    pub(crate) server_state: Option<InteractiveState>,
    pub(crate) client_states: Vec<(PeerId, Option<InteractiveState>)>,
}

impl TargetSummary {
    pub(crate) fn replicas_agree(&self) -> bool {
        self.client_states
            .iter()
            .all(|(_, state)| *state == self.server_state)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlayerSummary {
    pub(crate) name: String,
    pub(crate) peer: PeerId,
    pub(crate) selected: Option<String>,
    pub(crate) prompt: Option<String>,
    pub(crate) history: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionSummary {
    pub(crate) ticks: u64,
    pub(crate) targets: Vec<TargetSummary>,
    pub(crate) players: Vec<PlayerSummary>,
    pub(crate) total_effects: u32,
    pub(crate) net: NetStats,
}

/// One authoritative world plus one client world per player, wired over the loopback
/// network and driven by scenario steps.
pub(crate) struct Session {
    net: LoopbackNetwork,
    players: Vec<PlayerHandle>,
    targets: Vec<(String, EntityId)>,
    server_proximity: ProximityTracker,
    client_proximity: BTreeMap<PeerId, ProximityTracker>,
    ledger: SharedLedger,
    ticks: u64,
}

impl Session {
    pub(crate) fn build(scenario: &Scenario) -> Result<Self, SessionError> {
        let ledger: SharedLedger = Rc::new(RefCell::new(PropLedger::default()));
        let huds = scenario
            .players
            .iter()
            .map(|_| SharedHud::default())
            .collect::<Vec<_>>();

        let mut server = InteractionWorld::new(NetRole::Authority);
        let layout = populate_world(&mut server, scenario, SERVER_MACHINE, &ledger, &huds)?;
        let mut net = LoopbackNetwork::new(server)?;

        for player in &scenario.players {
            let peer = PeerId(player.peer);
            let machine = format!("peer-{}", peer.0);
            let mut client = InteractionWorld::new(NetRole::Client(peer));
            let client_layout = populate_world(&mut client, scenario, &machine, &ledger, &huds)?;
            if client_layout != layout {
                return Err(SessionError::DivergedIds { machine });
            }
            net.connect(client)?;
        }

        let volumes = scenario
            .targets
            .iter()
            .zip(&layout.targets)
            .map(|(spec, (_, id))| TriggerVolume {
                target: *id,
                radius: spec.trigger_radius,
            })
            .collect::<Vec<_>>();
        let server_proximity = ProximityTracker::new(volumes);
        let client_proximity = net
            .peers()
            .map(|peer| (peer, server_proximity.clone()))
            .collect();

        let players = scenario
            .players
            .iter()
            .zip(&layout.pawns)
            .zip(huds)
            .map(|((spec, pawn), hud)| PlayerHandle {
                name: spec.name.clone(),
                peer: PeerId(spec.peer),
                pawn: *pawn,
                hud,
            })
            .collect::<Vec<_>>();

        info!(
            targets = layout.targets.len(),
            players = players.len(),
            "session_built"
        );
        Ok(Self {
            net,
            players,
            targets: layout.targets,
            server_proximity,
            client_proximity,
            ledger,
            ticks: 0,
        })
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks
    }

    #[cfg(test)]
    pub(crate) fn network(&self) -> &LoopbackNetwork {
        &self.net
    }

    pub(crate) fn ledger(&self) -> SharedLedger {
        Rc::clone(&self.ledger)
    }

    #[cfg(test)]
    pub(crate) fn target_id(&self, name: &str) -> Option<EntityId> {
        self.targets
            .iter()
            .find(|(target_name, _)| target_name == name)
            .map(|(_, id)| *id)
    }

    fn player(&self, name: &str) -> Result<&PlayerHandle, SessionError> {
        self.players
            .iter()
            .find(|player| player.name == name)
            .ok_or_else(|| SessionError::UnknownPlayer(name.to_string()))
    }

    /// Runs `step` and then one tick, or `ticks` ticks for a wait.
    pub(crate) fn execute(&mut self, step: &Step) -> Result<(), SessionError> {
        debug!(step = ?step, "step_begin");
        match step {
            Step::Move { player, to } => {
                let pawn = self.player(player)?.pawn;
                for world in self.net.worlds_mut() {
                    world.set_position(pawn, *to);
                }
                self.tick()
            }
            Step::Face { player, degrees } => {
                let pawn = self.player(player)?.pawn;
                let radians = degrees.to_radians();
                for world in self.net.worlds_mut() {
                    world.set_facing(pawn, radians);
                }
                self.tick()
            }
            Step::Interact { player } => {
                let (peer, pawn) = {
                    let handle = self.player(player)?;
                    (handle.peer, handle.pawn)
                };
                if let Some(client) = self.net.client_mut(peer) {
                    client.interact(pawn);
                }
                self.tick()
            }
            Step::Wait { ticks } => {
                for _ in 0..*ticks {
                    self.tick()?;
                }
                Ok(())
            }
        }
    }

    /// Proximity on every machine, relevancy refresh on every machine, then delivery.
    pub(crate) fn tick(&mut self) -> Result<(), SessionError> {
        self.ticks += 1;

        let mut triggers = self.server_proximity.update(self.net.server_mut());
        for (peer, tracker) in self.client_proximity.iter_mut() {
            if let Some(client) = self.net.client_mut(*peer) {
                triggers += tracker.update(client);
            }
        }

        for world in self.net.worlds_mut() {
            world.recompute_all_relevancy();
        }

        let frames = self.net.pump()?;
        debug!(tick = self.ticks, triggers, frames, "tick_complete");
        Ok(())
    }

    pub(crate) fn summary(&self) -> SessionSummary {
        let server = self.net.server();
        let targets = self
            .targets
            .iter()
            .map(|(name, id)| TargetSummary {
                name: name.clone(),
                server_state: server.target_state(*id),
                client_states: self
                    .net
                    .peers()
                    .map(|peer| {
                        let state = self
                            .net
                            .client(peer)
                            .and_then(|client| client.target_state(*id));
                        (peer, state)
                    })
                    .collect(),
            })
            .collect();

        let players = self
            .players
            .iter()
            .map(|player| {
                let selected = server
                    .agent(player.pawn)
                    .and_then(|agent| agent.most_relevant_target())
                    .and_then(|target| self.target_name(target));
                let hud = player.hud.borrow();
                PlayerSummary {
                    name: player.name.clone(),
                    peer: player.peer,
                    selected,
                    prompt: hud.visible.clone(),
                    history: hud.history.clone(),
                }
            })
            .collect();

        SessionSummary {
            ticks: self.ticks,
            targets,
            players,
            total_effects: self.ledger.borrow().total_effects(),
            net: self.net.stats(),
        }
    }

    fn target_name(&self, id: EntityId) -> Option<String> {
        self.targets
            .iter()
            .find(|(_, target)| *target == id)
            .map(|(name, _)| name.clone())
    }
}

/// Spawns walls, targets and player pawns in scenario order so ids match across machines.
/// Every machine gets agents for the pawns it controls: all of them on the server, only
/// its own on a client.
fn populate_world(
    world: &mut InteractionWorld,
    scenario: &Scenario,
    machine: &str,
    ledger: &SharedLedger,
    huds: &[SharedHud],
) -> Result<Layout, SessionError> {
    let mut colliders = Vec::with_capacity(scenario.walls.len() + scenario.targets.len());

    for wall in &scenario.walls {
        let id = world.spawn_entity(Transform::at(wall.position), wall.name.clone());
        colliders.push(Collider {
            entity: id,
            center: wall.position,
            radius: wall.radius,
            interactive: false,
        });
    }

    let mut targets = Vec::with_capacity(scenario.targets.len());
    for spec in &scenario.targets {
        let id = world.spawn_entity(Transform::at(spec.position), spec.name.clone());
        let behavior =
            PropBehavior::new(spec.kind, spec.name.clone(), machine, Rc::clone(ledger));
        world.attach_target(
            id,
            Box::new(InteractiveTarget::new(spec.target_config(), behavior)),
        )?;
        colliders.push(Collider {
            entity: id,
            center: spec.position,
            radius: spec.collider_radius,
            interactive: true,
        });
        targets.push((spec.name.clone(), id));
    }

    let colliders: Rc<[Collider]> = Rc::from(colliders);
    let mut pawns = Vec::with_capacity(scenario.players.len());
    for (spec, hud) in scenario.players.iter().zip(huds) {
        let transform = Transform {
            position: spec.position,
            rotation_radians: Some(spec.facing_degrees.to_radians()),
        };
        let pawn = world.spawn_entity(transform, spec.name.clone());
        pawns.push(pawn);

        let peer = PeerId(spec.peer);
        let controls_pawn = match world.role() {
            NetRole::Authority => true,
            NetRole::Client(local) => local == peer,
        };
        if !controls_pawn {
            continue;
        }
        let mut agent = InteractorAgent::new(peer, spec.interactor)
            .with_probe(RayProbe::new(pawn, Rc::clone(&colliders)));
        if !world.has_authority() {
            let factory = HudWidgetFactory::new(spec.name.clone(), Rc::clone(hud));
            agent = agent.with_widget_factory(factory);
        }
        world.attach_agent(pawn, agent)?;
    }

    Ok(Layout { targets, pawns })
}
