//! Session orchestration: link lifecycle, reconnection and snapshot resync.
//!
//! [`SessionResyncHandler`] is the single mutation gateway of the core. Every
//! inbound event (open, close, frame, tick, wake-up) and every local action
//! goes through one `&mut self` method, which applies it in full and only then
//! reports to the [`SessionObserver`].

use crate::error::{ProtocolError, RejectReason, SessionError, TransportError, ValidationError};
use crate::link::{Delivery, TransportLink};
use crate::observer::{ConnectionStatus, SessionNotice, SessionObserver, TurnOptions};
use crate::phase::{DEFAULT_BANNER_RESPONSE, Expiry, PhaseStateMachine, StateChanged, TickOutcome};
use crate::protocol::{
    BannerResponse, ClientMessage, GamePhase, GameSnapshot, ServerMessage, decode_server_frame,
    validate_codename,
};
use crate::reconnect::{ReconnectAttemptState, ReconnectDecision, ReconnectionPolicy};
use crate::schedule::{Scheduler, TimerHandle, TimerToken};
use crate::session::SessionState;
use crate::timer::TimerController;
use crate::turn::{SubmitSource, TurnDraft, TurnSubmissionTracker};

/// Minimum roster size for `startGame`.
pub const MIN_PLAYERS: usize = 2;

/// Seconds to wait for a snapshot before asking again.
pub const RESYNC_RETRY_SECS: u32 = 5;

/// Unanswered snapshot requests before the resync is given up.
pub const MAX_RESYNC_REQUESTS: u32 = 3;

/// Orchestrates the session over an unreliable link.
pub struct SessionResyncHandler<L, S, O> {
    machine: PhaseStateMachine,
    tracker: TurnSubmissionTracker,
    policy: ReconnectionPolicy,
    attempts: ReconnectAttemptState,
    status: ConnectionStatus,
    /// Set while the local view may have missed messages; cleared by the
    /// next applied snapshot.
    stale: bool,
    /// Pending reconnect wake-up.
    retry: Option<TimerHandle>,
    /// Snapshot requests sent on the current link, and ticks since the last.
    resync_requests: u32,
    resync_wait: u32,
    turn_options: TurnOptions,
    link: L,
    scheduler: S,
    observer: O,
}

impl<L, S, O> SessionResyncHandler<L, S, O>
where
    L: TransportLink,
    S: Scheduler,
    O: SessionObserver,
{
    pub fn new(link: L, scheduler: S, observer: O, policy: ReconnectionPolicy) -> Self {
        Self {
            machine: PhaseStateMachine::new(),
            tracker: TurnSubmissionTracker::new(),
            policy,
            attempts: ReconnectAttemptState::new(policy.max_attempts()),
            status: ConnectionStatus::Disconnected,
            stale: false,
            retry: None,
            resync_requests: 0,
            resync_wait: 0,
            turn_options: TurnOptions::default(),
            link,
            scheduler,
            observer,
        }
    }

    // -- accessors ------------------------------------------------------------

    pub fn machine(&self) -> &PhaseStateMachine {
        &self.machine
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn timer(&self) -> &TimerController {
        self.machine.timer()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.count()
    }

    pub fn has_submitted(&self) -> bool {
        self.tracker.has_submitted(&self.machine)
    }

    pub fn turn_options(&self) -> &TurnOptions {
        &self.turn_options
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    // -- link lifecycle -------------------------------------------------------

    /// Open the link for the first time.
    pub fn connect(&mut self) {
        if matches!(
            self.status,
            ConnectionStatus::Connected | ConnectionStatus::Resyncing
        ) {
            return;
        }
        self.set_status(ConnectionStatus::Connecting);
        self.link.connect();
    }

    /// The link opened.
    pub fn on_open(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.cancel();
        }
        self.attempts.reset();

        if self.stale {
            tracing::info!(phase = %self.machine.phase(), "reconnected, requesting snapshot");
            self.begin_resync();
        } else {
            tracing::info!("connected");
            self.set_status(ConnectionStatus::Connected);
        }
    }

    /// The link closed, or an attempt to open it failed.
    pub fn on_close(&mut self, reason: &str) {
        if self.status == ConnectionStatus::Abandoned {
            return;
        }
        let cause = SessionError::from(TransportError::Closed {
            reason: reason.to_string(),
        });
        if self.retry.as_ref().is_some_and(|r| !r.is_cancelled()) {
            tracing::debug!(%cause, "close while a reconnect is already pending");
            return;
        }
        if self.machine.state().local_codename().is_some() {
            self.stale = true;
            self.machine.mark_link_lost();
        }

        match self.policy.decide(self.attempts.count()) {
            ReconnectDecision::Retry { delay } => {
                let attempt = self.attempts.record_attempt();
                tracing::warn!(
                    %cause,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "connection lost, scheduling reconnect"
                );
                self.retry = Some(self.scheduler.schedule(delay));
                self.set_status(ConnectionStatus::Reconnecting { attempt, delay });
            }
            ReconnectDecision::GiveUp => {
                let error = SessionError::ConnectionAbandoned {
                    attempts: self.attempts.count(),
                };
                tracing::error!(%cause, %error, "giving up on the connection");
                self.set_status(ConnectionStatus::Abandoned);
                self.observer.fatal_connection_lost(&error);
            }
        }
    }

    /// A scheduled wake-up fired.
    pub fn on_wake(&mut self, token: TimerToken) {
        if !self.retry.as_ref().is_some_and(|retry| retry.matches(token)) {
            tracing::debug!(?token, "ignoring stale wake-up");
            return;
        }
        self.retry = None;
        tracing::info!(attempt = self.attempts.count(), "reconnecting");
        self.set_status(ConnectionStatus::Connecting);
        self.link.connect();
    }

    /// Start over after the connection or the resync was abandoned.
    pub fn restart_connection(&mut self) {
        if self.status == ConnectionStatus::Abandoned && self.stale && self.link.is_open() {
            tracing::info!("retrying resync");
            self.begin_resync();
            return;
        }
        if !matches!(
            self.status,
            ConnectionStatus::Abandoned | ConnectionStatus::Disconnected
        ) {
            tracing::debug!(status = self.status.label(), "connection is still managed");
            return;
        }
        if let Some(retry) = self.retry.take() {
            retry.cancel();
        }
        self.attempts.reset();
        tracing::info!("restarting connection");
        self.set_status(ConnectionStatus::Connecting);
        self.link.connect();
    }

    // -- inbound --------------------------------------------------------------

    /// Decode and apply one text frame. Malformed frames are dropped.
    pub fn on_frame(&mut self, frame: &str) {
        match decode_server_frame(frame) {
            Ok(msg) => self.on_message(msg),
            Err(error) => tracing::warn!(%error, "dropping frame"),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: GameSnapshot) {
        self.on_message(ServerMessage::GameStateSnapshot(snapshot));
    }

    /// Apply one decoded server message.
    pub fn on_message(&mut self, msg: ServerMessage) {
        tracing::debug!(event = msg.event_name(), "received");

        match &msg {
            ServerMessage::Error { message } => {
                let error = ProtocolError::Server {
                    message: message.clone(),
                };
                tracing::warn!(%error, "server error");
                self.observer.server_error(message);
                return;
            }
            ServerMessage::LobbyJoined {
                success: false,
                message,
                ..
            } => {
                let message = message.as_deref().unwrap_or("join refused");
                tracing::warn!(reason = message, "join failed");
                self.observer.join_failed(message);
                return;
            }
            _ => {}
        }

        let prev = self.machine.phase();
        let changed = match self.machine.apply(&msg) {
            Ok(changed) => changed,
            Err(error) => {
                tracing::warn!(%error, "dropping event, requesting snapshot");
                self.send(&ClientMessage::RequestGameState);
                return;
            }
        };

        if let ServerMessage::GameStateSnapshot(_) = msg {
            self.stale = false;
            let waiting = match self.status {
                ConnectionStatus::Resyncing => true,
                ConnectionStatus::Abandoned => self.link.is_open(),
                _ => false,
            };
            if waiting {
                self.set_status(ConnectionStatus::Connected);
            }
            tracing::info!(phase = %self.machine.phase(), "session resynchronized");
        }

        self.notify(prev, changed);

        match msg {
            ServerMessage::LobbyJoined {
                codename: Some(codename),
                is_host,
                ..
            } if changed.identity => {
                tracing::info!(%codename, is_host, "joined lobby");
                self.observer.identity_assigned(&codename, is_host);
            }
            ServerMessage::GameStarted { .. } => {
                self.send(&ClientMessage::GetMasterPlan);
                self.send(&ClientMessage::GetAlliances);
            }
            ServerMessage::GameStateSnapshot(_) => {
                let phase = self.machine.phase();
                self.observer.resync_completed(phase);
            }
            ServerMessage::TurnResult { round, results, .. } => {
                self.observer
                    .notice(&SessionNotice::TurnResolved { round, results });
            }
            ServerMessage::BannerChoice { message, caster } => {
                self.observer
                    .notice(&SessionNotice::BannerRequested { message, caster });
            }
            ServerMessage::FinalShowdownStarted { showdown } => {
                self.observer.notice(&SessionNotice::ShowdownStarted(showdown));
            }
            ServerMessage::GameOver(info) => {
                tracing::info!(winner = ?info.winner, "game over");
                self.observer.notice(&SessionNotice::GameOver(info));
            }
            ServerMessage::ActionSubmitted { success } => {
                if success {
                    self.observer.notice(&SessionNotice::ActionAcknowledged);
                } else {
                    tracing::warn!("server did not record our turn");
                }
            }
            ServerMessage::BannerResponseRecorded { .. } => {
                self.observer.notice(&SessionNotice::BannerAcknowledged);
            }
            ServerMessage::ShowdownActionSubmitted { .. } => {
                self.observer.notice(&SessionNotice::ShowdownAcknowledged);
            }
            ServerMessage::PlayerSubmitted { codename, .. } => {
                self.observer
                    .notice(&SessionNotice::PlayerSubmitted { codename });
            }
            ServerMessage::AllianceCreated { members, .. } => {
                self.observer
                    .notice(&SessionNotice::AllianceFormed { members });
                self.send(&ClientMessage::GetAlliances);
            }
            ServerMessage::HostTransferred { .. } => {
                self.observer.notice(&SessionNotice::HostTransferred);
            }
            ServerMessage::MasterPlanInfo { .. } => {
                self.observer.notice(&SessionNotice::MasterPlanUpdated);
            }
            ServerMessage::AllianceInfo { .. } => {
                self.observer.notice(&SessionNotice::AlliancesUpdated);
            }
            _ => {}
        }
    }

    /// One second of wall clock passed.
    pub fn on_tick(&mut self) {
        if self.status == ConnectionStatus::Resyncing {
            self.await_snapshot();
        }
        match self.machine.on_tick() {
            TickOutcome::Idle => {}
            TickOutcome::Ticked { remaining } => self.observer.timer_tick(remaining),
            TickOutcome::Expired { phase, expiry } => {
                self.observer.timer_tick(0);
                self.observer.timer_expired(phase);
                match expiry {
                    Expiry::AutoSubmitTurn => {
                        let _ = self.submit(SubmitSource::Expiry);
                    }
                    Expiry::DefaultBannerChoice => {
                        let _ = self.choose_banner(DEFAULT_BANNER_RESPONSE);
                    }
                    Expiry::DefaultShowdownAction => {
                        let _ = self.record_showdown(None);
                    }
                    Expiry::Nothing => {}
                }
            }
        }
    }

    // -- local actions --------------------------------------------------------

    pub fn join_lobby(&mut self, codename: &str) -> Result<(), SessionError> {
        if let Some(current) = self.machine.state().local_codename() {
            return Err(RejectReason::AlreadyJoined {
                codename: current.to_string(),
            }
            .into());
        }
        let codename = validate_codename(codename)?;
        self.ensure_open()?;
        self.send(&ClientMessage::JoinLobby { codename });
        Ok(())
    }

    /// Host only, from the lobby, with enough players.
    pub fn start_game(&mut self) -> Result<(), SessionError> {
        let state = self.machine.state();
        if state.phase() != GamePhase::Lobby {
            return Err(RejectReason::WrongPhase {
                phase: state.phase(),
                action: "startGame",
            }
            .into());
        }
        if !state.is_host() {
            return Err(RejectReason::NotHost.into());
        }
        let count = state.players().len();
        if count < MIN_PLAYERS {
            return Err(RejectReason::NotEnoughPlayers { count }.into());
        }
        self.ensure_open()?;
        self.send(&ClientMessage::StartGame);
        Ok(())
    }

    /// Edit the planning draft.
    pub fn update_draft(&mut self, f: impl FnOnce(&mut TurnDraft)) -> Result<(), SessionError> {
        self.machine.edit_draft(f).map_err(SessionError::from)
    }

    /// Submit the current draft.
    pub fn submit_turn(&mut self) -> Result<(), SessionError> {
        self.submit(SubmitSource::Manual)
    }

    /// Replace the draft with `draft` and submit it.
    pub fn submit_turn_with(&mut self, draft: TurnDraft) -> Result<(), SessionError> {
        if let Err(error) = self.update_draft(|d| *d = draft) {
            self.observer.submission_rejected(&error);
            return Err(error);
        }
        self.submit(SubmitSource::Manual)
    }

    /// Resolution -> Planning. Purely local.
    pub fn continue_round(&mut self) -> Result<(), SessionError> {
        let prev = self.machine.phase();
        let changed = self.machine.continue_round()?;
        self.notify(prev, changed);
        Ok(())
    }

    pub fn choose_banner(&mut self, choice: BannerResponse) -> Result<(), SessionError> {
        let prev = self.machine.phase();
        let result = self
            .ensure_online()
            .and_then(|()| self.machine.choose_banner(choice).map_err(SessionError::from));
        match result {
            Ok(changed) => {
                self.send(&ClientMessage::BannerChoice { choice });
                self.notify(prev, changed);
                Ok(())
            }
            Err(error) => Err(self.rejected(error)),
        }
    }

    pub fn submit_showdown_action(&mut self, action: &str) -> Result<(), SessionError> {
        self.record_showdown(Some(action))
    }

    pub fn request_master_plan(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.send(&ClientMessage::GetMasterPlan);
        Ok(())
    }

    pub fn request_alliances(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.send(&ClientMessage::GetAlliances);
        Ok(())
    }

    pub fn create_alliance(&mut self, target: &str) -> Result<(), SessionError> {
        let target = target.trim();
        if !self.machine.state().is_valid_target(target) {
            return Err(ValidationError::InvalidTarget {
                target: target.to_string(),
            }
            .into());
        }
        self.ensure_online()?;
        self.send(&ClientMessage::CreateAlliance {
            target: target.to_string(),
        });
        Ok(())
    }

    // -- internals ------------------------------------------------------------

    fn submit(&mut self, source: SubmitSource) -> Result<(), SessionError> {
        let result = self
            .ensure_online()
            .and_then(|()| self.tracker.submit(&mut self.machine, source));
        match result {
            Ok(msg) => {
                self.send(&msg);
                self.observer
                    .submission_accepted(self.machine.state().round_number());
                Ok(())
            }
            Err(SessionError::Rejected(RejectReason::AlreadySubmitted { round }))
                if source == SubmitSource::Expiry =>
            {
                tracing::debug!(round, "countdown expired after submission");
                Err(RejectReason::AlreadySubmitted { round }.into())
            }
            Err(error) => Err(self.rejected(error)),
        }
    }

    fn record_showdown(&mut self, action: Option<&str>) -> Result<(), SessionError> {
        let result = self
            .ensure_online()
            .and_then(|()| self.machine.record_showdown_action(action));
        match result {
            Ok(action) => {
                self.send(&ClientMessage::SubmitShowdownAction { action });
                self.observer.timer_tick(self.machine.timer().remaining());
                Ok(())
            }
            Err(error) => Err(self.rejected(error)),
        }
    }

    fn begin_resync(&mut self) {
        self.resync_requests = 0;
        self.set_status(ConnectionStatus::Resyncing);
        self.request_snapshot();
    }

    fn request_snapshot(&mut self) {
        self.resync_requests += 1;
        self.resync_wait = 0;
        self.send(&ClientMessage::RequestGameState);
    }

    fn await_snapshot(&mut self) {
        self.resync_wait += 1;
        if self.resync_wait < RESYNC_RETRY_SECS {
            return;
        }
        if self.resync_requests < MAX_RESYNC_REQUESTS {
            tracing::info!(requests = self.resync_requests, "no snapshot yet, asking again");
            self.request_snapshot();
            return;
        }
        let error = SessionError::ResyncTimedOut {
            requests: self.resync_requests,
        };
        tracing::error!(%error, "giving up on the resync");
        self.set_status(ConnectionStatus::Abandoned);
        self.observer.fatal_connection_lost(&error);
    }

    fn rejected(&mut self, error: SessionError) -> SessionError {
        tracing::warn!(%error, "action rejected");
        self.observer.submission_rejected(&error);
        error
    }

    /// Outbound game actions need an open link and a synchronized session.
    fn ensure_online(&self) -> Result<(), SessionError> {
        if self.stale {
            return Err(RejectReason::Stale.into());
        }
        if self.status != ConnectionStatus::Connected || !self.link.is_open() {
            return Err(RejectReason::Disconnected.into());
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.link.is_open() {
            Ok(())
        } else {
            Err(RejectReason::Disconnected.into())
        }
    }

    fn send(&mut self, msg: &ClientMessage) {
        match self.link.send(msg) {
            Delivery::Sent => tracing::debug!(event = msg.event_name(), "sent"),
            Delivery::Dropped => tracing::warn!(event = msg.event_name(), "link closed, dropped"),
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            self.observer.connection_status_changed(status);
        }
    }

    fn notify(&mut self, prev: GamePhase, changed: StateChanged) {
        if !changed.any() {
            return;
        }
        let phase = self.machine.phase();
        if changed.phase {
            self.observer.phase_changed(prev, phase);
        }
        if changed.players {
            self.observer.players_changed(self.machine.state().players());
        }
        if changed.timer && self.machine.timer().is_running() {
            self.observer.timer_tick(self.machine.timer().remaining());
        }
        if changed.players || changed.phase {
            self.refresh_turn_options();
        }
    }

    fn refresh_turn_options(&mut self) {
        let state = self.machine.state();
        let options = TurnOptions {
            targets: state.available_targets(),
            max_spend: state.local_balance(),
        };
        if options != self.turn_options {
            self.turn_options = options;
            self.observer.turn_options_changed(&self.turn_options);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PLANNING_SECS;
    use crate::protocol::{INFORMATION_WARFARE, PlayerView, ShowdownInfo};
    use crate::reconnect::MAX_RECONNECT_ATTEMPTS;
    use crate::testing::{ManualScheduler, RecordingLink, RecordingObserver, Seen};

    type Handler = SessionResyncHandler<RecordingLink, ManualScheduler, RecordingObserver>;

    fn handler() -> Handler {
        SessionResyncHandler::new(
            RecordingLink::default(),
            ManualScheduler::default(),
            RecordingObserver::default(),
            ReconnectionPolicy::default(),
        )
    }

    fn open(h: &mut Handler) {
        h.link_mut().open = true;
        h.on_open();
    }

    fn close(h: &mut Handler, reason: &str) {
        h.link_mut().open = false;
        h.on_close(reason);
    }

    fn wake(h: &mut Handler) {
        let token = h.scheduler.last_token().unwrap();
        h.on_wake(token);
    }

    fn joined(h: &mut Handler, codename: &str, is_host: bool) {
        h.on_message(ServerMessage::LobbyJoined {
            success: true,
            codename: Some(codename.to_string()),
            is_host,
            message: None,
        });
    }

    fn roster(balance: u32) -> Vec<PlayerView> {
        vec![
            PlayerView::new("Zed", balance),
            PlayerView::new("Jaws", 3),
            PlayerView::new("Mayday", 4),
        ]
    }

    fn planning(balance: u32) -> Handler {
        let mut h = handler();
        h.connect();
        open(&mut h);
        h.join_lobby("Zed").unwrap();
        joined(&mut h, "Zed", false);
        h.on_message(ServerMessage::GameStarted {
            players: roster(balance),
            round_number: 1,
        });
        h
    }

    fn turn(offense: &str, defense: &str) -> TurnDraft {
        TurnDraft {
            offense: offense.to_string(),
            defense: defense.to_string(),
            ..TurnDraft::default()
        }
    }

    #[test]
    fn non_host_cannot_start_game() {
        let mut h = handler();
        h.connect();
        open(&mut h);
        h.join_lobby("  Zed ").unwrap();
        assert_eq!(
            h.link().last(),
            Some(&ClientMessage::JoinLobby {
                codename: "Zed".to_string()
            })
        );
        joined(&mut h, "Zed", false);
        h.on_message(ServerMessage::LobbyUpdate {
            players: roster(0),
            host: None,
        });

        assert!(h.observer().saw(&Seen::Identity("Zed".to_string(), false)));
        assert_eq!(h.start_game(), Err(RejectReason::NotHost.into()));
        assert_eq!(h.link().count("startGame"), 0);
        assert!(matches!(
            h.join_lobby("Other"),
            Err(SessionError::Rejected(RejectReason::AlreadyJoined { .. }))
        ));
    }

    #[test]
    fn host_needs_two_players() {
        let mut h = handler();
        h.connect();
        open(&mut h);
        joined(&mut h, "Zed", true);
        h.on_message(ServerMessage::LobbyUpdate {
            players: vec![PlayerView::new("Zed", 0)],
            host: None,
        });
        assert_eq!(
            h.start_game(),
            Err(RejectReason::NotEnoughPlayers { count: 1 }.into())
        );
        h.on_message(ServerMessage::LobbyUpdate {
            players: roster(0),
            host: None,
        });
        h.start_game().unwrap();
        assert_eq!(h.link().count("startGame"), 1);
    }

    #[test]
    fn invalid_codenames_never_reach_the_link() {
        let mut h = handler();
        h.connect();
        open(&mut h);
        assert!(h.join_lobby("   ").is_err());
        assert!(h.join_lobby("seventeen chars!!").is_err());
        assert!(h.link().sent.is_empty());
    }

    #[test]
    fn game_start_requests_plan_and_alliances() {
        let h = planning(5);
        assert_eq!(h.state().phase(), GamePhase::Planning);
        assert_eq!(h.link().count("getMasterPlan"), 1);
        assert_eq!(h.link().count("getAlliances"), 1);
        assert_eq!(
            h.turn_options(),
            &TurnOptions {
                targets: vec!["Jaws".to_string(), "Mayday".to_string()],
                max_spend: 5,
            }
        );
        assert_eq!(h.observer().last_tick(), Some(PLANNING_SECS));
    }

    #[test]
    fn overspend_is_rejected_without_send() {
        let mut h = planning(5);
        let err = h
            .submit_turn_with(TurnDraft {
                ip_spend: 7,
                ..turn("sabotage", "underground")
            })
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::SpendExceedsBalance {
                spend: 7,
                balance: 5
            }
            .into()
        );
        assert!(!h.has_submitted());
        assert_eq!(h.link().count("submitAction"), 0);
        assert_eq!(h.observer().rejections(), vec![&err]);
    }

    #[test]
    fn banner_text_bounds() {
        let mut h = planning(5);
        let banner = |text: &str| TurnDraft {
            banner_message: Some(text.to_string()),
            ..turn("exposure", INFORMATION_WARFARE)
        };

        assert!(h.submit_turn_with(banner("")).is_err());
        assert!(h.submit_turn_with(banner(&"b".repeat(51))).is_err());
        assert_eq!(h.link().count("submitAction"), 0);
        h.submit_turn_with(banner(&"b".repeat(50))).unwrap();
        assert_eq!(h.link().count("submitAction"), 1);
    }

    #[test]
    fn double_click_and_expiry_race_send_once() {
        let mut h = planning(5);
        h.update_draft(|d| *d = turn("sabotage", "underground"))
            .unwrap();
        h.submit_turn().unwrap();
        assert!(h.submit_turn().is_err());
        assert!(h.update_draft(|d| d.ip_spend = 1).is_err());

        for _ in 0..PLANNING_SECS {
            h.on_tick();
        }
        assert!(h.observer().saw(&Seen::Expired(GamePhase::Planning)));
        assert_eq!(h.link().count("submitAction"), 1);
        assert!(h.observer().saw(&Seen::Accepted(1)));
    }

    #[test]
    fn expiry_auto_submits_fallback_turn() {
        let mut h = planning(5);
        for _ in 0..PLANNING_SECS {
            h.on_tick();
        }
        assert_eq!(
            h.link().last(),
            Some(&ClientMessage::SubmitAction {
                offense: "surveillance".to_string(),
                defense: "safeHouse".to_string(),
                target: None,
                ip_spend: 0,
                banner_message: String::new(),
            })
        );
        assert!(h.submit_turn().is_err());
        assert_eq!(h.link().count("submitAction"), 1);
    }

    #[test]
    fn guard_resets_on_next_planning() {
        let mut h = planning(5);
        h.submit_turn_with(turn("sabotage", "underground")).unwrap();
        h.on_message(ServerMessage::TurnResult {
            players: roster(6),
            round: 1,
            results: Vec::new(),
        });
        assert!(h.submit_turn().is_err());
        h.continue_round().unwrap();
        assert_eq!(h.state().round_number(), 2);
        assert!(!h.has_submitted());
        h.submit_turn_with(turn("sabotage", "underground")).unwrap();
        assert_eq!(h.link().count("submitAction"), 2);
    }

    #[test]
    fn reconnect_resyncs_timer_and_holds_submissions_until_snapshot() {
        let mut h = planning(5);
        for _ in 0..48 {
            h.on_tick();
        }
        assert_eq!(h.timer().remaining(), 42);

        close(&mut h, "network reset");
        assert!(h.is_stale());
        assert_eq!(
            h.submit_turn_with(turn("sabotage", "underground")),
            Err(RejectReason::Stale.into())
        );

        // two failed attempts, the third opens
        for _ in 0..2 {
            wake(&mut h);
            h.on_close("connection refused");
        }
        wake(&mut h);
        assert_eq!(h.attempts(), 3);
        open(&mut h);
        assert_eq!(h.attempts(), 0);
        assert_eq!(h.connection_status(), ConnectionStatus::Resyncing);
        assert_eq!(h.link().count("requestGameState"), 1);

        assert_eq!(
            h.submit_turn_with(turn("sabotage", "underground")),
            Err(RejectReason::Stale.into())
        );
        assert_eq!(h.link().count("submitAction"), 0);

        h.on_frame(r#"{"type":"gameStateSnapshot","phase":"planning","timeRemaining":11,"round":1}"#);
        assert!(!h.is_stale());
        assert_eq!(h.connection_status(), ConnectionStatus::Connected);
        assert_eq!(h.timer().remaining(), 11);
        assert_eq!(h.observer().last_tick(), Some(11));
        assert!(h.observer().saw(&Seen::Resynced(GamePhase::Planning)));

        h.submit_turn_with(turn("sabotage", "underground")).unwrap();
        assert_eq!(h.link().count("submitAction"), 1);
    }

    #[test]
    fn attempts_are_capped_before_fatal_signal() {
        let mut h = planning(5);
        close(&mut h, "gone");
        for _ in 0..MAX_RECONNECT_ATTEMPTS {
            assert!(h.attempts() <= MAX_RECONNECT_ATTEMPTS);
            wake(&mut h);
            h.on_close("refused");
        }

        assert_eq!(h.attempts(), MAX_RECONNECT_ATTEMPTS);
        assert_eq!(h.connection_status(), ConnectionStatus::Abandoned);
        assert_eq!(
            h.scheduler.delays_ms(),
            vec![1_000, 2_000, 4_000, 8_000, 10_000]
        );
        assert!(h.observer().saw(&Seen::Fatal(SessionError::ConnectionAbandoned {
            attempts: MAX_RECONNECT_ATTEMPTS
        })));
        let connects = h.link().connects;

        // no more retries after the fatal signal
        h.on_close("again");
        assert_eq!(h.scheduler.scheduled.len(), MAX_RECONNECT_ATTEMPTS as usize);

        h.restart_connection();
        assert_eq!(h.attempts(), 0);
        assert_eq!(h.link().connects, connects + 1);
        open(&mut h);
        assert_eq!(h.connection_status(), ConnectionStatus::Resyncing);
    }

    #[test]
    fn open_cancels_pending_retry() {
        let mut h = planning(5);
        close(&mut h, "blip");
        let token = h.scheduler.last_token().unwrap();
        open(&mut h);
        assert!(h.scheduler.scheduled[0].1.is_cancelled());

        let connects = h.link().connects;
        h.on_wake(token);
        assert_eq!(h.link().connects, connects);
    }

    #[test]
    fn duplicate_close_does_not_double_count() {
        let mut h = planning(5);
        close(&mut h, "first");
        h.on_close("second");
        assert_eq!(h.attempts(), 1);
        assert_eq!(h.scheduler.scheduled.len(), 1);
    }

    #[test]
    fn snapshot_overrides_every_phase() {
        for to in GamePhase::ALL {
            let mut h = planning(5);
            let mut snapshot = GameSnapshot::new(to);
            snapshot.players = Some(vec![PlayerView::new("Zed", 1), PlayerView::new("Jaws", 1)]);
            h.apply_snapshot(snapshot);
            assert_eq!(h.state().phase(), to);
            assert_eq!(h.state().players().len(), 2);
            assert_eq!(h.turn_options().max_spend, 1);
        }
    }

    #[test]
    fn illegal_event_requests_snapshot() {
        let mut h = planning(5);
        h.on_message(ServerMessage::GameStarted {
            players: Vec::new(),
            round_number: 7,
        });
        assert_eq!(h.state().phase(), GamePhase::Planning);
        assert_eq!(h.state().round_number(), 1);
        assert_eq!(h.link().count("requestGameState"), 1);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mut h = planning(5);
        h.on_frame(r#"{"type":"turnResult","round":"soon"}"#);
        h.on_frame("not json");
        assert_eq!(h.state().phase(), GamePhase::Planning);
        assert_eq!(h.link().count("requestGameState"), 0);
    }

    #[test]
    fn server_error_is_transient() {
        let mut h = planning(5);
        h.on_frame(r#"{"type":"error","message":"Not in planning phase"}"#);
        assert_eq!(h.state().phase(), GamePhase::Planning);
        assert!(
            h.observer()
                .saw(&Seen::ServerError("Not in planning phase".to_string()))
        );
    }

    #[test]
    fn join_failure_is_reported() {
        let mut h = handler();
        h.connect();
        open(&mut h);
        h.on_frame(r#"{"type":"lobbyJoined","success":false,"message":"Codename taken"}"#);
        assert_eq!(h.state().local_codename(), None);
        assert!(h.observer().saw(&Seen::JoinFailed("Codename taken".to_string())));
    }

    #[test]
    fn banner_timeout_sends_ignore_once() {
        let mut h = planning(5);
        h.on_message(ServerMessage::BannerChoice {
            message: "The vault is empty".to_string(),
            caster: Some("Jaws".to_string()),
        });
        for _ in 0..10 {
            h.on_tick();
        }
        assert_eq!(h.state().phase(), GamePhase::WaitingForResolution);
        assert_eq!(
            h.link().last(),
            Some(&ClientMessage::BannerChoice {
                choice: BannerResponse::Ignore
            })
        );
        assert!(h.choose_banner(BannerResponse::Believe).is_err());
        assert_eq!(h.link().count("bannerChoice"), 1);
    }

    #[test]
    fn manual_banner_choice_cancels_timeout() {
        let mut h = planning(5);
        h.on_message(ServerMessage::BannerChoice {
            message: "The vault is empty".to_string(),
            caster: None,
        });
        h.choose_banner(BannerResponse::Believe).unwrap();
        for _ in 0..15 {
            h.on_tick();
        }
        assert_eq!(h.link().count("bannerChoice"), 1);
    }

    #[test]
    fn showdown_defaults_on_expiry() {
        let mut h = planning(5);
        h.on_message(ServerMessage::FinalShowdownStarted {
            showdown: ShowdownInfo {
                participants: vec!["Zed".to_string(), "Jaws".to_string()],
                rules: "last agent standing".to_string(),
                ip_bonus: 2,
                time_limit: 3,
                available_actions: vec!["assassination".to_string(), "sabotage".to_string()],
            },
        });
        for _ in 0..3 {
            h.on_tick();
        }
        assert_eq!(
            h.link().last(),
            Some(&ClientMessage::SubmitShowdownAction {
                action: "assassination".to_string()
            })
        );
        assert!(h.submit_showdown_action("sabotage").is_err());
        assert_eq!(h.link().count("submitShowdownAction"), 1);
    }

    #[test]
    fn alliance_created_refreshes_alliances() {
        let mut h = planning(5);
        h.create_alliance("Jaws").unwrap();
        assert!(h.create_alliance("Zed").is_err());
        h.on_frame(
            r#"{"type":"allianceCreated","allianceId":1,"members":["Zed","Jaws"],"round":1}"#,
        );
        assert_eq!(h.link().count("createAlliance"), 1);
        assert_eq!(h.link().count("getAlliances"), 2);
        assert!(h.observer().saw(&Seen::Notice(SessionNotice::AllianceFormed {
            members: vec!["Zed".to_string(), "Jaws".to_string()]
        })));
    }

    #[test]
    fn game_over_rejects_submissions() {
        let mut h = planning(5);
        h.on_frame(r#"{"type":"gameOver","winner":"Jaws","victoryType":"influence"}"#);
        assert_eq!(h.state().phase(), GamePhase::GameOver);
        assert!(!h.timer().is_running());
        assert!(matches!(
            h.submit_turn(),
            Err(SessionError::Rejected(RejectReason::WrongPhase { .. }))
        ));
    }

    fn options(targets: &[&str], max_spend: u32) -> Seen {
        Seen::Options(TurnOptions {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            max_spend,
        })
    }

    #[test]
    fn snapshot_after_late_event_keeps_the_round_guard() {
        let mut h = planning(5);
        h.submit_turn_with(turn("sabotage", "underground")).unwrap();

        h.on_message(ServerMessage::GameStarted {
            players: roster(5),
            round_number: 1,
        });
        assert_eq!(h.link().count("requestGameState"), 1);
        h.on_frame(r#"{"type":"gameStateSnapshot","phase":"planning","roundNumber":1}"#);

        assert!(!h.is_stale());
        assert!(h.has_submitted());
        assert_eq!(
            h.submit_turn(),
            Err(RejectReason::AlreadySubmitted { round: 1 }.into())
        );
        assert_eq!(h.link().count("submitAction"), 1);
    }

    #[test]
    fn game_start_reports_phase_players_then_options() {
        let mut h = handler();
        h.connect();
        open(&mut h);
        joined(&mut h, "Zed", false);
        h.observer_mut().seen.clear();

        h.on_message(ServerMessage::GameStarted {
            players: roster(5),
            round_number: 1,
        });
        assert_eq!(
            h.observer().seen,
            vec![
                Seen::Phase(GamePhase::Lobby, GamePhase::Planning),
                Seen::Players(3),
                Seen::Tick(PLANNING_SECS),
                options(&["Jaws", "Mayday"], 5),
            ]
        );
    }

    #[test]
    fn turn_result_reports_resolution_before_the_outcome() {
        let mut h = planning(5);
        h.submit_turn_with(turn("sabotage", "underground")).unwrap();
        h.observer_mut().seen.clear();

        h.on_message(ServerMessage::TurnResult {
            players: roster(6),
            round: 1,
            results: Vec::new(),
        });
        assert_eq!(
            h.observer().seen,
            vec![
                Seen::Phase(GamePhase::Planning, GamePhase::Resolution),
                Seen::Players(3),
                options(&["Jaws", "Mayday"], 6),
                Seen::Notice(SessionNotice::TurnResolved {
                    round: 1,
                    results: Vec::new(),
                }),
            ]
        );
    }

    #[test]
    fn cross_phase_snapshot_reports_one_phase_change() {
        let mut h = planning(5);
        h.observer_mut().seen.clear();

        let mut snapshot = GameSnapshot::new(GamePhase::Resolution);
        snapshot.players = Some(vec![PlayerView::new("Zed", 2), PlayerView::new("Jaws", 4)]);
        h.apply_snapshot(snapshot);

        assert_eq!(
            h.observer().seen,
            vec![
                Seen::Phase(GamePhase::Planning, GamePhase::Resolution),
                Seen::Players(2),
                options(&["Jaws"], 2),
                Seen::Resynced(GamePhase::Resolution),
            ]
        );
    }

    #[test]
    fn unanswered_resync_is_retried_then_given_up() {
        let mut h = planning(5);
        close(&mut h, "network reset");
        wake(&mut h);
        open(&mut h);
        assert_eq!(h.link().count("requestGameState"), 1);

        for requests in 2..=MAX_RESYNC_REQUESTS as usize {
            for _ in 0..RESYNC_RETRY_SECS {
                h.on_tick();
            }
            assert_eq!(h.link().count("requestGameState"), requests);
        }
        for _ in 0..RESYNC_RETRY_SECS {
            h.on_tick();
        }
        assert_eq!(h.connection_status(), ConnectionStatus::Abandoned);
        assert!(h.observer().saw(&Seen::Fatal(SessionError::ResyncTimedOut {
            requests: MAX_RESYNC_REQUESTS
        })));
        assert_eq!(
            h.submit_turn_with(turn("sabotage", "underground")),
            Err(RejectReason::Stale.into())
        );

        // the link is still up, so a restart only asks again
        let connects = h.link().connects;
        h.restart_connection();
        assert_eq!(h.link().connects, connects);
        assert_eq!(
            h.link().count("requestGameState"),
            MAX_RESYNC_REQUESTS as usize + 1
        );
        h.on_frame(r#"{"type":"gameStateSnapshot","phase":"planning","roundNumber":1}"#);

        assert_eq!(
            h.observer().statuses(),
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Reconnecting {
                    attempt: 1,
                    delay: std::time::Duration::from_millis(1_000),
                },
                ConnectionStatus::Connecting,
                ConnectionStatus::Resyncing,
                ConnectionStatus::Abandoned,
                ConnectionStatus::Resyncing,
                ConnectionStatus::Connected,
            ]
        );
        assert!(!h.is_stale());
        h.submit_turn_with(turn("sabotage", "underground")).unwrap();
    }
}
