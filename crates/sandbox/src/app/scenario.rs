use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use interaction::{InteractorConfig, TargetConfig, Vec2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TRIGGER_RADIUS: f32 = 2.0;
const DEFAULT_COLLIDER_RADIUS: f32 = 0.5;

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("read scenario '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse scenario json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {path}: {message}")]
    Invalid { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub(crate) walls: Vec<WallSpec>,
    #[serde(default)]
    pub(crate) targets: Vec<TargetSpec>,
    pub(crate) players: Vec<PlayerSpec>,
    #[serde(default)]
    pub(crate) steps: Vec<Step>,
}

/// Static geometry that blocks the aim probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WallSpec {
    pub(crate) name: String,
    pub(crate) position: Vec2,
    #[serde(default = "default_collider_radius")]
    pub(crate) radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PropKind {
    Door,
    Lever,
    Chest,
}

impl PropKind {
    pub(crate) fn default_config(self) -> TargetConfig {
        let (repeatable, description) = match self {
            Self::Door => (true, "Open door"),
            Self::Lever => (true, "Pull lever"),
            Self::Chest => (false, "Open chest"),
        };
        TargetConfig {
            repeatable,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TargetSpec {
    pub(crate) name: String,
    pub(crate) kind: PropKind,
    pub(crate) position: Vec2,
    #[serde(default = "default_trigger_radius")]
    pub(crate) trigger_radius: f32,
    #[serde(default = "default_collider_radius")]
    pub(crate) collider_radius: f32,
    /// Overrides the per-kind defaults when present.
    #[serde(default)]
    pub(crate) config: Option<TargetConfig>,
}

impl TargetSpec {
    pub(crate) fn target_config(&self) -> TargetConfig {
        self.config
            .clone()
            .unwrap_or_else(|| self.kind.default_config())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlayerSpec {
    pub(crate) name: String,
    pub(crate) peer: u32,
    pub(crate) position: Vec2,
    #[serde(default)]
    pub(crate) facing_degrees: f32,
    #[serde(default)]
    pub(crate) interactor: InteractorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum Step {
    Move { player: String, to: Vec2 },
    Face { player: String, degrees: f32 },
    Interact { player: String },
    Wait { ticks: u32 },
}

impl Step {
    pub(crate) fn player(&self) -> Option<&str> {
        match self {
            Self::Move { player, .. } | Self::Face { player, .. } | Self::Interact { player } => {
                Some(player.as_str())
            }
            Self::Wait { .. } => None,
        }
    }
}

fn default_trigger_radius() -> f32 {
    DEFAULT_TRIGGER_RADIUS
}

fn default_collider_radius() -> f32 {
    DEFAULT_COLLIDER_RADIUS
}

pub(crate) fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let scenario = parse_scenario_json(&raw)?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

pub(crate) fn builtin_scenario() -> Result<Scenario, ScenarioError> {
    let scenario = parse_scenario_json(BUILTIN_SCENARIO)?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

pub(crate) fn parse_scenario_json(raw: &str) -> Result<Scenario, ScenarioError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let source = error.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        ScenarioError::Parse { path, source }
    })
}

fn validation_err(path: impl Into<String>, message: impl Into<String>) -> ScenarioError {
    ScenarioError::Invalid {
        path: path.into(),
        message: message.into(),
    }
}

fn expected_actual(
    path: impl Into<String>,
    expected: impl Display,
    actual: impl Display,
) -> ScenarioError {
    validation_err(path, format!("expected {expected}, got {actual}"))
}

fn check_position(path: String, position: Vec2) -> Result<(), ScenarioError> {
    if !position.is_finite() {
        return Err(expected_actual(
            path,
            "finite position",
            format!("({}, {})", position.x, position.y),
        ));
    }
    Ok(())
}

fn check_radius(path: String, radius: f32) -> Result<(), ScenarioError> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(expected_actual(path, "positive radius", radius));
    }
    Ok(())
}

fn claim_name<'a>(
    names: &mut BTreeSet<&'a str>,
    path: String,
    name: &'a str,
) -> Result<(), ScenarioError> {
    if name.trim().is_empty() {
        return Err(validation_err(path, "name must not be empty"));
    }
    if !names.insert(name) {
        return Err(validation_err(path, format!("duplicate name '{name}'")));
    }
    Ok(())
}

pub(crate) fn validate_scenario(scenario: &Scenario) -> Result<(), ScenarioError> {
    let mut names = BTreeSet::new();

    for (index, wall) in scenario.walls.iter().enumerate() {
        claim_name(&mut names, format!("walls[{index}].name"), &wall.name)?;
        check_position(format!("walls[{index}].position"), wall.position)?;
        check_radius(format!("walls[{index}].radius"), wall.radius)?;
    }

    for (index, target) in scenario.targets.iter().enumerate() {
        claim_name(&mut names, format!("targets[{index}].name"), &target.name)?;
        check_position(format!("targets[{index}].position"), target.position)?;
        check_radius(
            format!("targets[{index}].trigger_radius"),
            target.trigger_radius,
        )?;
        check_radius(
            format!("targets[{index}].collider_radius"),
            target.collider_radius,
        )?;
    }

    if scenario.players.is_empty() {
        return Err(validation_err("players", "at least one player is required"));
    }
    let mut peers = BTreeSet::new();
    for (index, player) in scenario.players.iter().enumerate() {
        claim_name(&mut names, format!("players[{index}].name"), &player.name)?;
        if !peers.insert(player.peer) {
            return Err(validation_err(
                format!("players[{index}].peer"),
                format!("peer {} is already taken", player.peer),
            ));
        }
        check_position(format!("players[{index}].position"), player.position)?;
        if !player.facing_degrees.is_finite() {
            return Err(expected_actual(
                format!("players[{index}].facing_degrees"),
                "finite angle",
                player.facing_degrees,
            ));
        }
        check_radius(
            format!("players[{index}].interactor.probe_range"),
            player.interactor.probe_range,
        )?;
    }

    for (index, step) in scenario.steps.iter().enumerate() {
        if let Some(name) = step.player() {
            if !scenario.players.iter().any(|player| player.name == name) {
                return Err(validation_err(
                    format!("steps[{index}].player"),
                    format!("unknown player '{name}'"),
                ));
            }
        }
        match step {
            Step::Move { to, .. } => check_position(format!("steps[{index}].to"), *to)?,
            Step::Face { degrees, .. } if !degrees.is_finite() => {
                return Err(expected_actual(
                    format!("steps[{index}].degrees"),
                    "finite angle",
                    degrees,
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

const BUILTIN_SCENARIO: &str = r#"{
  "walls": [
    { "name": "pillar", "position": { "x": 3.0, "y": 2.0 }, "radius": 0.5 }
  ],
  "targets": [
    { "name": "front_door", "kind": "door", "position": { "x": 4.0, "y": 0.0 }, "trigger_radius": 2.5 },
    { "name": "gate_lever", "kind": "lever", "position": { "x": 0.0, "y": 3.0 }, "trigger_radius": 2.5 },
    { "name": "supply_chest", "kind": "chest", "position": { "x": -3.0, "y": 0.0 } }
  ],
  "players": [
    { "name": "alice", "peer": 1, "position": { "x": 0.0, "y": 0.0 } },
    { "name": "bob", "peer": 2, "position": { "x": 10.0, "y": 10.0 }, "facing_degrees": 180.0 }
  ],
  "steps": [
    { "action": "move", "player": "alice", "to": { "x": 2.0, "y": 0.0 } },
    { "action": "interact", "player": "alice" },
    { "action": "move", "player": "alice", "to": { "x": 1.0, "y": 2.0 } },
    { "action": "interact", "player": "alice" },
    { "action": "interact", "player": "alice" },
    { "action": "move", "player": "alice", "to": { "x": -1.5, "y": 0.0 } },
    { "action": "face", "player": "alice", "degrees": 180.0 },
    { "action": "interact", "player": "alice" },
    { "action": "interact", "player": "alice" },
    { "action": "move", "player": "bob", "to": { "x": -2.0, "y": -1.0 } },
    { "action": "interact", "player": "bob" },
    { "action": "wait", "ticks": 2 }
  ]
}"#;
