use std::process::ExitCode;

use tracing::{error, info, warn};

use super::bootstrap::AppWiring;
use super::session::{Session, SessionSummary, SERVER_MACHINE};

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let mut session = match Session::build(&app.scenario) {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, source = %app.source, "session_build_failed");
            return ExitCode::FAILURE;
        }
    };

    let limit = app.max_steps.unwrap_or(app.scenario.steps.len());
    let mut executed = 0usize;
    for step in app.scenario.steps.iter().take(limit) {
        if let Err(err) = session.execute(step) {
            error!(error = %err, step = executed, "step_failed");
            return ExitCode::FAILURE;
        }
        executed += 1;
    }
    if executed < app.scenario.steps.len() {
        info!(
            executed,
            skipped = app.scenario.steps.len() - executed,
            "step_limit_reached"
        );
    }

    let summary = session.summary();
    log_summary(&session, &summary);

    if summary.targets.iter().all(|target| target.replicas_agree()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn log_summary(session: &Session, summary: &SessionSummary) {
    info!("=== Interaction Sandbox Summary ===");
    let ledger = session.ledger();
    let ledger = ledger.borrow();

    for target in &summary.targets {
        info!(
            target_name = %target.name,
            server = ?target.server_state,
            clients = ?target.client_states,
            effects = ledger.effects(&target.name),
            server_feedback = ledger.feedback(SERVER_MACHINE, &target.name),
            "target_final_state"
        );
        if !target.replicas_agree() {
            warn!(target_name = %target.name, "replica_state_diverged");
        }
    }

    for player in &summary.players {
        info!(
            player = %player.name,
            peer = player.peer.0,
            selected = ?player.selected,
            prompt = ?player.prompt,
            history = ?player.history,
            "player_final_state"
        );
    }

    info!(
        ticks = summary.ticks,
        effects = summary.total_effects,
        frames = summary.net.frames_delivered,
        bytes = summary.net.bytes_delivered,
        server_interact = summary.net.server_interact,
        show_widget = summary.net.show_widget,
        hide_widget = summary.net.hide_widget,
        state_changed = summary.net.state_changed,
        dropped_unknown_peer = summary.net.dropped_unknown_peer,
        dropped_misrouted = summary.net.dropped_misrouted,
        "network_summary"
    );
}
