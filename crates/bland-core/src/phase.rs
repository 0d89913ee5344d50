//! Phase state machine.
//!
//! [`PhaseStateMachine`] owns the [`SessionState`], the countdown and the
//! planning draft. Inbound server messages go through [`PhaseStateMachine::apply`],
//! local actions through the dedicated methods. Every call either applies in
//! full or not at all.

use crate::error::{ProtocolError, RejectReason, SessionError, ValidationError};
use crate::protocol::{BannerResponse, GamePhase, GameSnapshot, ServerMessage};
use crate::session::{AllianceSnapshot, SessionState};
use crate::timer::{Tick, TimerController};
use crate::turn::{PendingTurn, TurnDraft};

/// Default planning countdown in seconds.
pub const PLANNING_SECS: u32 = 90;

/// Countdown for answering an enemy banner.
pub const BANNER_CHOICE_SECS: u32 = 10;

/// Showdown countdown when the server does not send a time limit.
pub const SHOWDOWN_DEFAULT_SECS: u32 = 30;

/// Banner answer used when the countdown runs out.
pub const DEFAULT_BANNER_RESPONSE: BannerResponse = BannerResponse::Ignore;

/// Showdown action recorded when the countdown runs out.
pub const DEFAULT_SHOWDOWN_ACTION: &str = "assassination";

/// Describes which parts of the session were modified by a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateChanged {
    /// The phase changed, or planning was re-entered.
    pub phase: bool,
    /// The player mapping differs from before.
    pub players: bool,
    /// A countdown was started, resynced or stopped.
    pub timer: bool,
    /// The local identity was assigned.
    pub identity: bool,
    pub round: bool,
}

impl StateChanged {
    /// Returns `true` if any flag is set.
    pub fn any(self) -> bool {
        self.phase || self.players || self.timer || self.identity || self.round
    }
}

/// What the owner of the machine has to do because a countdown ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Planning ran out; submit the fallback turn through the guard.
    AutoSubmitTurn,
    /// Send [`DEFAULT_BANNER_RESPONSE`].
    DefaultBannerChoice,
    /// Record the default showdown action.
    DefaultShowdownAction,
    /// The countdown had no consequence in this phase.
    Nothing,
}

/// Result of [`PhaseStateMachine::on_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Ticked { remaining: u32 },
    Expired { phase: GamePhase, expiry: Expiry },
}

/// How entering a phase treats the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Countdown {
    /// Start the phase's protocol default.
    Default,
    /// Start a fresh countdown of the given length.
    Start(u32),
    /// Overwrite the running countdown, keeping its tick alignment.
    Resync(u32),
    /// Leave a running countdown alone.
    Keep,
}

/// Single source of truth for the session phase.
#[derive(Debug, Clone)]
pub struct PhaseStateMachine {
    state: SessionState,
    timer: TimerController,
    draft: PendingTurn,
    /// Incremented on every entry into planning; binds the submission guard
    /// and the draft to one planning phase.
    planning_epoch: u64,
    /// Round reported by the latest `turnResult`.
    resolved_round: u32,
    showdown_action: Option<String>,
    /// The link dropped since the last snapshot; the next snapshot may not
    /// assume that anything sent before was received.
    link_lost: bool,
}

impl Default for PhaseStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseStateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::new(),
            timer: TimerController::new(),
            draft: PendingTurn::new(),
            planning_epoch: 0,
            resolved_round: 0,
            showdown_action: None,
            link_lost: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase()
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn draft(&self) -> &PendingTurn {
        &self.draft
    }

    pub fn planning_epoch(&self) -> u64 {
        self.planning_epoch
    }

    pub fn showdown_action(&self) -> Option<&str> {
        self.showdown_action.as_deref()
    }

    /// Apply one inbound server message.
    ///
    /// Events that are not legal in the current phase are refused with
    /// [`ProtocolError::IllegalTransition`] and leave the session untouched.
    pub fn apply(&mut self, msg: &ServerMessage) -> Result<StateChanged, ProtocolError> {
        let phase = self.phase();
        let illegal = || ProtocolError::IllegalTransition {
            phase,
            event: msg.event_name(),
        };
        let mut changed = StateChanged::default();

        match msg {
            ServerMessage::LobbyJoined {
                success: true,
                codename: Some(codename),
                is_host,
                ..
            } => {
                if self.state.set_identity(codename, *is_host) {
                    changed.identity = true;
                } else if self.state.local_codename() != Some(codename.as_str()) {
                    tracing::warn!(%codename, "ignoring second identity");
                }
            }
            ServerMessage::LobbyJoined { .. } => {}
            ServerMessage::LobbyUpdate { players, .. } => {
                if phase != GamePhase::Lobby {
                    return Err(illegal());
                }
                changed.players = self.state.replace_players(players);
            }
            ServerMessage::GameStarted {
                players,
                round_number,
            } => {
                if phase != GamePhase::Lobby {
                    return Err(illegal());
                }
                changed.players = self.state.replace_players(players);
                self.state.replace_round(*round_number);
                changed.round = true;
                changed = merge(changed, self.enter(GamePhase::Planning, Countdown::Default));
            }
            ServerMessage::TurnResult {
                players,
                round,
                results,
            } => {
                if !matches!(
                    phase,
                    GamePhase::Planning | GamePhase::BannerChoice | GamePhase::WaitingForResolution
                ) {
                    return Err(illegal());
                }
                changed.players = self.state.replace_players(players);
                changed.round = self.state.raise_round(*round);
                self.state.set_last_results(results.clone());
                changed = merge(changed, self.enter(GamePhase::Resolution, Countdown::Default));
            }
            ServerMessage::GameStateSnapshot(snapshot) => {
                changed = self.force_snapshot(snapshot);
            }
            ServerMessage::GameOver(info) => {
                if !matches!(
                    phase,
                    GamePhase::Planning
                        | GamePhase::Resolution
                        | GamePhase::WaitingForResolution
                        | GamePhase::FinalShowdown
                ) {
                    return Err(illegal());
                }
                self.state.set_outcome(Some(info.clone()));
                changed = self.enter(GamePhase::GameOver, Countdown::Default);
            }
            ServerMessage::BannerChoice { message, .. } => {
                if !phase.is_in_game() {
                    return Err(illegal());
                }
                self.state.set_banner_prompt(Some(message.clone()));
                changed = self.enter(GamePhase::BannerChoice, Countdown::Default);
            }
            ServerMessage::FinalShowdownStarted { showdown } => {
                if phase == GamePhase::GameOver {
                    return Err(illegal());
                }
                self.state.set_showdown(Some(showdown.clone()));
                self.showdown_action = None;
                changed = self.enter(
                    GamePhase::FinalShowdown,
                    Countdown::Start(showdown.time_limit),
                );
            }
            ServerMessage::NextRound { round_number } => {
                if !phase.is_in_game() {
                    return Err(illegal());
                }
                changed.round = self.state.raise_round(*round_number);
            }
            ServerMessage::MasterPlanInfo { plan } => {
                self.state.set_master_plan(plan.clone());
            }
            ServerMessage::AllianceInfo {
                player_alliances,
                all_alliances,
            } => {
                self.state.set_alliances(AllianceSnapshot {
                    player_alliances: player_alliances.clone(),
                    all_alliances: all_alliances.clone(),
                });
            }
            ServerMessage::Error { .. }
            | ServerMessage::ActionSubmitted { .. }
            | ServerMessage::PlayerSubmitted { .. }
            | ServerMessage::BannerResponseRecorded { .. }
            | ServerMessage::ShowdownActionSubmitted { .. }
            | ServerMessage::AllianceCreated { .. }
            | ServerMessage::HostTransferred { .. } => {}
        }

        Ok(changed)
    }

    /// Replace the session with the server's snapshot and force its phase.
    ///
    /// Bypasses the transition table. Fields absent from the snapshot keep
    /// their last known values; present fields replace them wholesale.
    pub fn force_snapshot(&mut self, snapshot: &GameSnapshot) -> StateChanged {
        let mut changed = StateChanged::default();

        if let Some(codename) = snapshot
            .user_state
            .as_ref()
            .and_then(|user| user.codename.as_deref())
            && self.state.local_codename().is_none()
        {
            changed.identity = self.state.set_identity(codename, false);
        }
        let link_lost = std::mem::take(&mut self.link_lost);
        let same_round = snapshot
            .round
            .is_none_or(|round| round == self.state.round_number());
        if let Some(players) = &snapshot.players {
            changed.players = self.state.replace_players(players);
        }
        if let Some(round) = snapshot.round
            && round != self.state.round_number()
        {
            self.state.replace_round(round);
            changed.round = true;
        }

        let same_phase = snapshot.phase == self.phase();
        let countdown = match snapshot.time_remaining {
            Some(remaining) if same_phase && self.timer.is_running() => Countdown::Resync(remaining),
            Some(remaining) => Countdown::Start(remaining),
            None if same_phase => Countdown::Keep,
            None => Countdown::Default,
        };
        tracing::info!(
            from = %self.phase(),
            to = %snapshot.phase,
            round = self.state.round_number(),
            time_remaining = ?snapshot.time_remaining,
            "applying snapshot"
        );

        // same planning round on an unbroken link: guard and draft stand
        if same_phase && same_round && !link_lost && snapshot.phase == GamePhase::Planning {
            self.run_countdown(Some(PLANNING_SECS), countdown);
            changed.timer = true;
            return changed;
        }
        merge(changed, self.enter(snapshot.phase, countdown))
    }

    /// Resolution -> Planning once the user has read the round's results.
    pub fn continue_round(&mut self) -> Result<StateChanged, RejectReason> {
        let phase = self.phase();
        if phase != GamePhase::Resolution {
            return Err(RejectReason::WrongPhase {
                phase,
                action: "continue",
            });
        }
        let mut changed = StateChanged {
            round: self.state.raise_round(self.resolved_round + 1),
            ..StateChanged::default()
        };
        changed = merge(changed, self.enter(GamePhase::Planning, Countdown::Default));
        Ok(changed)
    }

    /// Answer the banner prompt. The first answer wins; the phase moves on
    /// immediately so any later answer is refused.
    pub fn choose_banner(&mut self, choice: BannerResponse) -> Result<StateChanged, RejectReason> {
        let phase = self.phase();
        if phase != GamePhase::BannerChoice {
            return Err(RejectReason::WrongPhase {
                phase,
                action: "bannerChoice",
            });
        }
        tracing::info!(%choice, "banner answered");
        Ok(self.enter(GamePhase::WaitingForResolution, Countdown::Default))
    }

    /// Record the showdown move, or the default one when `action` is `None`.
    ///
    /// Returns the action to send. Stops the showdown countdown.
    pub fn record_showdown_action(
        &mut self,
        action: Option<&str>,
    ) -> Result<String, SessionError> {
        let phase = self.phase();
        if phase != GamePhase::FinalShowdown {
            return Err(RejectReason::WrongPhase {
                phase,
                action: "submitShowdownAction",
            }
            .into());
        }
        if self.showdown_action.is_some() {
            return Err(RejectReason::AlreadyRecorded.into());
        }

        let available = self
            .state
            .showdown()
            .map(|s| s.available_actions.as_slice())
            .unwrap_or(&[]);
        let action = match action {
            Some(action) => {
                let action = action.trim();
                if !available.is_empty() && !available.iter().any(|a| a == action) {
                    return Err(ValidationError::UnknownShowdownAction {
                        action: action.to_string(),
                    }
                    .into());
                }
                action.to_string()
            }
            None => {
                if available.is_empty() || available.iter().any(|a| a == DEFAULT_SHOWDOWN_ACTION) {
                    DEFAULT_SHOWDOWN_ACTION.to_string()
                } else {
                    available[0].clone()
                }
            }
        };

        self.showdown_action = Some(action.clone());
        self.timer.cancel();
        tracing::info!(%action, "showdown action recorded");
        Ok(action)
    }

    /// Edit the planning draft.
    pub fn edit_draft(&mut self, f: impl FnOnce(&mut TurnDraft)) -> Result<(), RejectReason> {
        let phase = self.phase();
        if phase != GamePhase::Planning {
            return Err(RejectReason::WrongPhase {
                phase,
                action: "editDraft",
            });
        }
        self.draft.edit(f)
    }

    pub(crate) fn freeze_draft(&mut self) {
        self.draft.freeze();
    }

    /// Messages may have been lost; the next snapshot re-arms planning.
    pub(crate) fn mark_link_lost(&mut self) {
        self.link_lost = true;
    }

    /// Advance the countdown by one second.
    pub fn on_tick(&mut self) -> TickOutcome {
        match self.timer.tick() {
            Tick::Idle => TickOutcome::Idle,
            Tick::Running { remaining } => TickOutcome::Ticked { remaining },
            Tick::Expired => {
                let phase = self.phase();
                let expiry = match phase {
                    GamePhase::Planning => Expiry::AutoSubmitTurn,
                    GamePhase::BannerChoice => Expiry::DefaultBannerChoice,
                    GamePhase::FinalShowdown if self.showdown_action.is_none() => {
                        Expiry::DefaultShowdownAction
                    }
                    _ => Expiry::Nothing,
                };
                tracing::debug!(%phase, ?expiry, "countdown expired");
                TickOutcome::Expired { phase, expiry }
            }
        }
    }

    fn enter(&mut self, to: GamePhase, countdown: Countdown) -> StateChanged {
        let from = self.phase();
        let reentry = from == to;
        self.state.set_phase(to);

        if to != GamePhase::Planning {
            self.draft.freeze();
        }
        if to != GamePhase::BannerChoice {
            self.state.set_banner_prompt(None);
        }

        let default_secs = match to {
            GamePhase::Planning => {
                self.planning_epoch += 1;
                self.draft = PendingTurn::new();
                Some(PLANNING_SECS)
            }
            GamePhase::BannerChoice => Some(BANNER_CHOICE_SECS),
            GamePhase::FinalShowdown => Some(
                self.state
                    .showdown()
                    .map(|s| s.time_limit)
                    .unwrap_or(SHOWDOWN_DEFAULT_SECS),
            ),
            GamePhase::Resolution => {
                self.resolved_round = self.state.round_number();
                None
            }
            GamePhase::Lobby | GamePhase::WaitingForResolution | GamePhase::GameOver => None,
        };

        if to == GamePhase::GameOver {
            self.timer.clear();
        } else {
            self.run_countdown(default_secs, countdown);
        }

        if !reentry {
            tracing::info!(%from, %to, round = self.state.round_number(), "phase changed");
        }
        StateChanged {
            phase: !reentry || to == GamePhase::Planning,
            timer: true,
            ..StateChanged::default()
        }
    }

    /// Apply `countdown` to a phase whose own countdown is `default_secs`.
    ///
    /// Explicit server times win in every phase; without one, a phase with
    /// no countdown of its own shows none.
    fn run_countdown(&mut self, default_secs: Option<u32>, countdown: Countdown) {
        match (countdown, default_secs) {
            (Countdown::Start(secs), _) => self.timer.start(secs),
            (Countdown::Resync(secs), _) => self.timer.resync(secs),
            (Countdown::Keep, _) if self.timer.is_running() => {}
            (Countdown::Default | Countdown::Keep, Some(secs)) => self.timer.start(secs),
            (Countdown::Default | Countdown::Keep, None) => self.timer.clear(),
        }
    }
}

fn merge(a: StateChanged, b: StateChanged) -> StateChanged {
    StateChanged {
        phase: a.phase || b.phase,
        players: a.players || b.players,
        timer: a.timer || b.timer,
        identity: a.identity || b.identity,
        round: a.round || b.round,
    }
}
