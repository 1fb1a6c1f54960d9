use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use interaction::{
    EntityId, InteractionBehavior, InteractionWidget, InteractiveState, WidgetFactory,
    WidgetRequest,
};
use tracing::info;

use super::scenario::PropKind;

/// Effect and feedback counts per prop, shared by every machine in a session.
#[derive(Debug, Default)]
pub(crate) struct PropLedger {
    effects: BTreeMap<String, u32>,
    feedback: BTreeMap<(String, String), u32>,
}

pub(crate) type SharedLedger = Rc<RefCell<PropLedger>>;

impl PropLedger {
    pub(crate) fn effects(&self, prop: &str) -> u32 {
        self.effects.get(prop).copied().unwrap_or(0)
    }

    pub(crate) fn feedback(&self, machine: &str, prop: &str) -> u32 {
        self.feedback
            .get(&(machine.to_string(), prop.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_effects(&self) -> u32 {
        self.effects.values().sum()
    }

    fn record_effect(&mut self, prop: &str) {
        let count = self.effects.entry(prop.to_string()).or_default();
        *count = count.saturating_add(1);
    }

    fn record_feedback(&mut self, machine: &str, prop: &str) {
        let count = self
            .feedback
            .entry((machine.to_string(), prop.to_string()))
            .or_default();
        *count = count.saturating_add(1);
    }
}

pub(crate) struct PropBehavior {
    kind: PropKind,
    name: String,
    machine: String,
    ledger: SharedLedger,
}

impl PropBehavior {
    pub(crate) fn new(
        kind: PropKind,
        name: impl Into<String>,
        machine: impl Into<String>,
        ledger: SharedLedger,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            machine: machine.into(),
            ledger,
        }
    }
}

impl InteractionBehavior for PropBehavior {
    fn apply_effect(&mut self, target: EntityId, instigator: EntityId) {
        self.ledger.borrow_mut().record_effect(&self.name);
        let event = match self.kind {
            PropKind::Door => "door_latch_toggled",
            PropKind::Lever => "lever_thrown",
            PropKind::Chest => "chest_loot_granted",
        };
        info!(
            machine = %self.machine,
            prop = %self.name,
            target_id = target.0,
            instigator = instigator.0,
            "{event}"
        );
    }

    fn play_feedback(&mut self, target: EntityId, state: InteractiveState) {
        self.ledger
            .borrow_mut()
            .record_feedback(&self.machine, &self.name);
        let event = match (self.kind, state) {
            (PropKind::Door, InteractiveState::Interacted) => "door_swings_open",
            (PropKind::Door, InteractiveState::Ready) => "door_swings_shut",
            (PropKind::Lever, InteractiveState::Interacted) => "lever_down",
            (PropKind::Lever, InteractiveState::Ready) => "lever_up",
            (PropKind::Chest, InteractiveState::Interacted) => "chest_lid_opens",
            (PropKind::Chest, InteractiveState::Ready) => "chest_lid_closes",
        };
        info!(
            machine = %self.machine,
            prop = %self.name,
            target_id = target.0,
            "{event}"
        );
    }
}

/// What one player's screen currently shows, plus everything it has shown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Hud {
    pub(crate) visible: Option<String>,
    pub(crate) history: Vec<String>,
}

pub(crate) type SharedHud = Rc<RefCell<Hud>>;

struct PromptWidget {
    player: String,
    target: EntityId,
    description: String,
    hud: SharedHud,
}

impl InteractionWidget for PromptWidget {
    fn add_to_viewport(&mut self) {
        let mut hud = self.hud.borrow_mut();
        hud.visible = Some(self.description.clone());
        hud.history.push(format!("show {}", self.description));
        info!(
            player = %self.player,
            target_id = self.target.0,
            prompt = %self.description,
            "hud_prompt_shown"
        );
    }

    fn remove_from_parent(&mut self) {
        let mut hud = self.hud.borrow_mut();
        hud.visible = None;
        hud.history.push(format!("hide {}", self.description));
        info!(
            player = %self.player,
            target_id = self.target.0,
            "hud_prompt_hidden"
        );
    }
}

pub(crate) struct HudWidgetFactory {
    player: String,
    hud: SharedHud,
}

impl HudWidgetFactory {
    pub(crate) fn new(player: impl Into<String>, hud: SharedHud) -> Self {
        Self {
            player: player.into(),
            hud,
        }
    }
}

impl WidgetFactory for HudWidgetFactory {
    fn create_widget(
        &mut self,
        request: &WidgetRequest<'_>,
    ) -> Option<Box<dyn InteractionWidget>> {
        Some(Box::new(PromptWidget {
            player: self.player.clone(),
            target: request.target,
            description: request.description.to_string(),
            hud: Rc::clone(&self.hud),
        }))
    }
}
