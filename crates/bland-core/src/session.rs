//! The single authoritative view of the session.
//!
//! [`SessionState`] is owned by the [`PhaseStateMachine`](crate::phase::PhaseStateMachine);
//! everything else reads it through shared references. Mutators are
//! crate-private so that only the machine and the resync handler can change it.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::protocol::{GameOverInfo, GamePhase, PlayerView, ShowdownInfo, TurnOutcome};

/// Alliance data as last reported by `allianceInfo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllianceSnapshot {
    pub player_alliances: Value,
    pub all_alliances: Value,
}

/// Contains everything the client knows about the running session.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: GamePhase,
    round_number: u32,
    local_codename: Option<String>,
    is_host: bool,
    /// codename -> view, replaced wholesale on every server update.
    players: BTreeMap<String, PlayerView>,
    /// Text of the banner awaiting a believe/ignore decision.
    banner_prompt: Option<String>,
    showdown: Option<ShowdownInfo>,
    last_results: Vec<TurnOutcome>,
    outcome: Option<GameOverInfo>,
    master_plan: Option<Map<String, Value>>,
    alliances: Option<AllianceSnapshot>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::Lobby,
            round_number: 0,
            local_codename: None,
            is_host: false,
            players: BTreeMap::new(),
            banner_prompt: None,
            showdown: None,
            last_results: Vec::new(),
            outcome: None,
            master_plan: None,
            alliances: None,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn local_codename(&self) -> Option<&str> {
        self.local_codename.as_deref()
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn players(&self) -> &BTreeMap<String, PlayerView> {
        &self.players
    }

    pub fn player(&self, codename: &str) -> Option<&PlayerView> {
        self.players.get(codename)
    }

    pub fn local_player(&self) -> Option<&PlayerView> {
        self.local_codename
            .as_deref()
            .and_then(|codename| self.players.get(codename))
    }

    /// Influence points the local agent may spend this round.
    ///
    /// Zero until the server has reported the local agent in the mapping.
    pub fn local_balance(&self) -> u32 {
        self.local_player().map(|p| p.influence).unwrap_or(0)
    }

    /// Whether `codename` names a live agent other than ourselves.
    pub fn is_valid_target(&self, codename: &str) -> bool {
        self.local_codename.as_deref() != Some(codename)
            && self
                .players
                .get(codename)
                .is_some_and(|p| p.status.is_live())
    }

    /// Codenames the local agent may target, in codename order.
    pub fn available_targets(&self) -> Vec<String> {
        self.players
            .keys()
            .filter(|codename| self.is_valid_target(codename))
            .cloned()
            .collect()
    }

    pub fn banner_prompt(&self) -> Option<&str> {
        self.banner_prompt.as_deref()
    }

    pub fn showdown(&self) -> Option<&ShowdownInfo> {
        self.showdown.as_ref()
    }

    pub fn last_results(&self) -> &[TurnOutcome] {
        &self.last_results
    }

    pub fn outcome(&self) -> Option<&GameOverInfo> {
        self.outcome.as_ref()
    }

    pub fn master_plan(&self) -> Option<&Map<String, Value>> {
        self.master_plan.as_ref()
    }

    pub fn alliances(&self) -> Option<&AllianceSnapshot> {
        self.alliances.as_ref()
    }

    // -- crate-private mutation ---------------------------------------------

    pub(crate) fn set_phase(&mut self, phase: GamePhase) {
        self.phase = phase;
    }

    /// Record the local identity. Returns `false` if one was already set.
    pub(crate) fn set_identity(&mut self, codename: &str, is_host: bool) -> bool {
        if self.local_codename.is_some() {
            return false;
        }
        self.local_codename = Some(codename.to_string());
        self.is_host = is_host;
        true
    }

    /// Replace the player mapping with `players`. Never merges.
    ///
    /// Returns `true` if the mapping differs from the previous one.
    pub(crate) fn replace_players(&mut self, players: &[PlayerView]) -> bool {
        let mut next = BTreeMap::new();
        for view in players {
            if next.insert(view.codename.clone(), view.clone()).is_some() {
                tracing::warn!(codename = %view.codename, "duplicate codename in player list");
            }
        }
        let changed = next != self.players;
        self.players = next;
        changed
    }

    /// Raise the round number, never lowering it.
    pub(crate) fn raise_round(&mut self, round: u32) -> bool {
        if round > self.round_number {
            self.round_number = round;
            true
        } else {
            false
        }
    }

    /// Overwrite the round number. Only snapshots may lower it.
    pub(crate) fn replace_round(&mut self, round: u32) {
        self.round_number = round;
    }

    pub(crate) fn set_banner_prompt(&mut self, prompt: Option<String>) {
        self.banner_prompt = prompt;
    }

    pub(crate) fn set_showdown(&mut self, showdown: Option<ShowdownInfo>) {
        self.showdown = showdown;
    }

    pub(crate) fn set_last_results(&mut self, results: Vec<TurnOutcome>) {
        self.last_results = results;
    }

    pub(crate) fn set_outcome(&mut self, outcome: Option<GameOverInfo>) {
        self.outcome = outcome;
    }

    pub(crate) fn set_master_plan(&mut self, plan: Map<String, Value>) {
        self.master_plan = Some(plan);
    }

    pub(crate) fn set_alliances(&mut self, alliances: AllianceSnapshot) {
        self.alliances = Some(alliances);
    }
}
