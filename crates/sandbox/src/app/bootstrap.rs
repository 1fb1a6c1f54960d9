use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::scenario::{builtin_scenario, load_scenario, Scenario, ScenarioError};

const SCENARIO_ENV_VAR: &str = "SANDBOX_SCENARIO";
const MAX_STEPS_ENV_VAR: &str = "SANDBOX_MAX_STEPS";

pub(crate) struct AppWiring {
    pub(crate) scenario: Scenario,
    pub(crate) source: String,
    pub(crate) max_steps: Option<usize>,
}

pub(crate) fn build_app() -> Result<AppWiring, ScenarioError> {
    init_tracing();
    info!("=== Interaction Sandbox Startup ===");

    let scenario_path = parse_scenario_path(std::env::var(SCENARIO_ENV_VAR).ok().as_deref());
    let (scenario, source) = match scenario_path {
        Some(path) => {
            let scenario = load_scenario(&path)?;
            (scenario, path.display().to_string())
        }
        None => (builtin_scenario()?, "builtin".to_string()),
    };
    let max_steps = parse_max_steps(std::env::var(MAX_STEPS_ENV_VAR).ok().as_deref());

    info!(
        source = %source,
        walls = scenario.walls.len(),
        targets = scenario.targets.len(),
        players = scenario.players.len(),
        steps = scenario.steps.len(),
        max_steps = ?max_steps,
        "scenario_loaded"
    );

    Ok(AppWiring {
        scenario,
        source,
        max_steps,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_scenario_path(raw: Option<&str>) -> Option<PathBuf> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn parse_max_steps(raw: Option<&str>) -> Option<usize> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
    match raw.parse::<usize>() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(
                env = MAX_STEPS_ENV_VAR,
                value = raw,
                error = %error,
                "ignoring_invalid_max_steps"
            );
            None
        }
    }
}
