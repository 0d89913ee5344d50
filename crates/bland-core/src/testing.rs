//! Recording fakes for the session seams.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SessionError;
use crate::link::{Delivery, TransportLink};
use crate::observer::{ConnectionStatus, SessionNotice, SessionObserver, TurnOptions};
use crate::protocol::{ClientMessage, GamePhase, PlayerView};
use crate::schedule::{Scheduler, TimerHandle, TimerToken};

/// Link whose open state is flipped by the test.
#[derive(Debug, Default)]
pub(crate) struct RecordingLink {
    pub open: bool,
    pub connects: u32,
    pub sent: Vec<ClientMessage>,
}

impl RecordingLink {
    pub fn count(&self, event: &str) -> usize {
        self.sent.iter().filter(|m| m.event_name() == event).count()
    }

    pub fn last(&self) -> Option<&ClientMessage> {
        self.sent.last()
    }
}

impl TransportLink for RecordingLink {
    fn connect(&mut self) {
        self.connects += 1;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, msg: &ClientMessage) -> Delivery {
        if !self.open {
            return Delivery::Dropped;
        }
        self.sent.push(msg.clone());
        Delivery::Sent
    }
}

/// Scheduler that only remembers what was asked of it.
#[derive(Debug, Default)]
pub(crate) struct ManualScheduler {
    next: u64,
    pub scheduled: Vec<(Duration, TimerHandle)>,
}

impl ManualScheduler {
    pub fn last_token(&self) -> Option<TimerToken> {
        self.scheduled.last().map(|(_, handle)| handle.token())
    }

    pub fn delays_ms(&self) -> Vec<u64> {
        self.scheduled
            .iter()
            .map(|(delay, _)| delay.as_millis() as u64)
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle::new(TimerToken(self.next));
        self.scheduled.push((delay, handle.clone()));
        handle
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Seen {
    Phase(GamePhase, GamePhase),
    Tick(u32),
    Expired(GamePhase),
    Players(usize),
    Accepted(u32),
    Rejected(SessionError),
    Status(ConnectionStatus),
    Resynced(GamePhase),
    Fatal(SessionError),
    Identity(String, bool),
    JoinFailed(String),
    ServerError(String),
    Options(TurnOptions),
    Notice(SessionNotice),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    pub seen: Vec<Seen>,
}

impl RecordingObserver {
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.seen
            .iter()
            .filter_map(|s| match s {
                Seen::Status(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn rejections(&self) -> Vec<&SessionError> {
        self.seen
            .iter()
            .filter_map(|s| match s {
                Seen::Rejected(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.seen.iter().rev().find_map(|s| match s {
            Seen::Tick(remaining) => Some(*remaining),
            _ => None,
        })
    }

    pub fn saw(&self, seen: &Seen) -> bool {
        self.seen.contains(seen)
    }
}

impl SessionObserver for RecordingObserver {
    fn phase_changed(&mut self, from: GamePhase, to: GamePhase) {
        self.seen.push(Seen::Phase(from, to));
    }

    fn timer_tick(&mut self, remaining: u32) {
        self.seen.push(Seen::Tick(remaining));
    }

    fn timer_expired(&mut self, phase: GamePhase) {
        self.seen.push(Seen::Expired(phase));
    }

    fn players_changed(&mut self, players: &BTreeMap<String, PlayerView>) {
        self.seen.push(Seen::Players(players.len()));
    }

    fn submission_accepted(&mut self, round: u32) {
        self.seen.push(Seen::Accepted(round));
    }

    fn submission_rejected(&mut self, reason: &SessionError) {
        self.seen.push(Seen::Rejected(reason.clone()));
    }

    fn connection_status_changed(&mut self, status: ConnectionStatus) {
        self.seen.push(Seen::Status(status));
    }

    fn resync_completed(&mut self, phase: GamePhase) {
        self.seen.push(Seen::Resynced(phase));
    }

    fn fatal_connection_lost(&mut self, error: &SessionError) {
        self.seen.push(Seen::Fatal(error.clone()));
    }

    fn identity_assigned(&mut self, codename: &str, is_host: bool) {
        self.seen.push(Seen::Identity(codename.to_string(), is_host));
    }

    fn join_failed(&mut self, message: &str) {
        self.seen.push(Seen::JoinFailed(message.to_string()));
    }

    fn server_error(&mut self, message: &str) {
        self.seen.push(Seen::ServerError(message.to_string()));
    }

    fn turn_options_changed(&mut self, options: &TurnOptions) {
        self.seen.push(Seen::Options(options.clone()));
    }

    fn notice(&mut self, notice: &SessionNotice) {
        self.seen.push(Seen::Notice(notice.clone()));
    }
}
