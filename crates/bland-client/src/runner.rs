//! The session event loop.
//!
//! One task owns the [`SessionResyncHandler`] and feeds it, one event at a
//! time, from four sources: link events, reconnect wake-ups, the countdown
//! tick and user commands. Nothing else touches the session, so every event
//! is applied in full before the next one is looked at.

use std::time::Duration;

use bland_core::observer::SessionObserver;
use bland_core::protocol::BannerResponse;
use bland_core::resync::SessionResyncHandler;
use bland_core::schedule::TimerToken;
use bland_core::turn::TurnDraft;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ClientConfig;
use crate::link::{LinkEvent, WsLink};
use crate::scheduler::TokioScheduler;
use crate::transport::Connector;

/// Sends [`UserCommand`]s into a running [`SessionRunner`].
pub type CommandSender = mpsc::UnboundedSender<UserCommand>;

pub type RunnerHandler<C, O> = SessionResyncHandler<WsLink<C>, TokioScheduler, O>;

/// A change to one field of the planning draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEdit {
    Offense(String),
    Defense(String),
    Target(Option<String>),
    Spend(u32),
    Banner(Option<String>),
}

impl TurnEdit {
    pub fn apply(self, draft: &mut TurnDraft) {
        match self {
            TurnEdit::Offense(offense) => draft.offense = offense,
            TurnEdit::Defense(defense) => draft.defense = defense,
            TurnEdit::Target(target) => draft.target = target,
            TurnEdit::Spend(spend) => draft.ip_spend = spend,
            TurnEdit::Banner(banner) => draft.banner_message = banner,
        }
    }
}

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Join(String),
    StartGame,
    Edit(TurnEdit),
    Submit,
    Continue,
    Banner(BannerResponse),
    Showdown(String),
    MasterPlan,
    Alliances,
    Ally(String),
    /// Start over after the connection was abandoned.
    Reconnect,
    Quit,
}

impl UserCommand {
    pub fn name(&self) -> &'static str {
        match self {
            UserCommand::Join(_) => "join",
            UserCommand::StartGame => "start",
            UserCommand::Edit(_) => "edit",
            UserCommand::Submit => "submit",
            UserCommand::Continue => "continue",
            UserCommand::Banner(_) => "banner",
            UserCommand::Showdown(_) => "showdown",
            UserCommand::MasterPlan => "plan",
            UserCommand::Alliances => "alliances",
            UserCommand::Ally(_) => "ally",
            UserCommand::Reconnect => "reconnect",
            UserCommand::Quit => "quit",
        }
    }
}

/// Owns the session and drives it from its event sources.
pub struct SessionRunner<C: Connector, O: SessionObserver> {
    handler: RunnerHandler<C, O>,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    wakes: mpsc::UnboundedReceiver<TimerToken>,
    commands: mpsc::UnboundedReceiver<UserCommand>,
    tick_period: Duration,
    auto_join: Option<String>,
}

impl<C: Connector, O: SessionObserver> SessionRunner<C, O> {
    pub fn new(config: &ClientConfig, connector: C, observer: O) -> (Self, CommandSender) {
        let (link_tx, link_events) = mpsc::unbounded_channel();
        let (wake_tx, wakes) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::unbounded_channel();

        let link = WsLink::new(connector, link_tx, config.connect_timeout);
        let scheduler = TokioScheduler::new(wake_tx);
        let handler = SessionResyncHandler::new(link, scheduler, observer, config.policy);
        let auto_join = config.codename.clone().filter(|_| config.auto_join);

        let runner = Self {
            handler,
            link_events,
            wakes,
            commands,
            tick_period: config.tick_period,
            auto_join,
        };
        (runner, command_tx)
    }

    pub fn handler(&self) -> &RunnerHandler<C, O> {
        &self.handler
    }

    /// Connect and process events until [`UserCommand::Quit`] arrives or
    /// every command sender is dropped.
    pub async fn run(&mut self) {
        self.handler.connect();

        let mut ticker = tokio::time::interval_at(Instant::now() + self.tick_period, self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut epoch = self.handler.timer().epoch();

        loop {
            tokio::select! {
                Some(event) = self.link_events.recv() => self.on_link_event(event),
                Some(token) = self.wakes.recv() => self.handler.on_wake(token),
                _ = ticker.tick() => self.handler.on_tick(),
                command = self.commands.recv() => match command {
                    None | Some(UserCommand::Quit) => break,
                    Some(command) => self.on_command(command),
                },
            }

            // a fresh countdown gets a full first second
            let current = self.handler.timer().epoch();
            if current != epoch {
                epoch = current;
                ticker.reset();
            }
        }
        tracing::info!("session loop stopped");
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened { generation, sender } => {
                if self.handler.link_mut().attach(generation, sender) {
                    self.handler.on_open();
                    self.join_if_requested();
                }
            }
            LinkEvent::Message { generation, msg } => {
                if self.handler.link().is_current(generation) {
                    self.handler.on_message(msg);
                }
            }
            LinkEvent::Malformed { generation, error } => {
                if self.handler.link().is_current(generation) {
                    tracing::warn!(%error, "dropping frame");
                }
            }
            LinkEvent::Closed { generation, reason } => {
                if self.handler.link_mut().detach(generation) {
                    self.handler.on_close(&reason);
                }
            }
        }
    }

    fn join_if_requested(&mut self) {
        if self.handler.state().local_codename().is_some() {
            return;
        }
        if let Some(codename) = self.auto_join.take()
            && let Err(error) = self.handler.join_lobby(&codename)
        {
            tracing::warn!(%error, %codename, "auto-join failed");
        }
    }

    fn on_command(&mut self, command: UserCommand) {
        let name = command.name();
        let result = match command {
            UserCommand::Join(codename) => self.handler.join_lobby(&codename),
            UserCommand::StartGame => self.handler.start_game(),
            UserCommand::Edit(edit) => self.handler.update_draft(|draft| edit.apply(draft)),
            UserCommand::Submit => self.handler.submit_turn(),
            UserCommand::Continue => self.handler.continue_round(),
            UserCommand::Banner(choice) => self.handler.choose_banner(choice),
            UserCommand::Showdown(action) => self.handler.submit_showdown_action(&action),
            UserCommand::MasterPlan => self.handler.request_master_plan(),
            UserCommand::Alliances => self.handler.request_alliances(),
            UserCommand::Ally(target) => self.handler.create_alliance(&target),
            UserCommand::Reconnect => {
                self.handler.restart_connection();
                Ok(())
            }
            UserCommand::Quit => Ok(()),
        };
        if let Err(error) = result {
            tracing::warn!(command = name, %error, "command refused");
        }
    }
}
