//! Plain-text rendering of session updates.

use std::collections::BTreeMap;

use bland_core::error::SessionError;
use bland_core::observer::{ConnectionStatus, SessionNotice, SessionObserver, TurnOptions};
use bland_core::protocol::{GamePhase, PlayerView};

/// Countdown seconds printed unconditionally before expiry.
const FINAL_SECONDS: u32 = 5;

/// Prints every update on its own line.
#[derive(Debug, Default)]
pub struct LogObserver {
    codename: Option<String>,
}

impl LogObserver {
    fn is_me(&self, codename: &str) -> bool {
        self.codename.as_deref() == Some(codename)
    }
}

/// Countdown lines are thinned to every ten seconds until the last few.
fn should_print_tick(remaining: u32) -> bool {
    remaining <= FINAL_SECONDS || remaining % 10 == 0
}

impl SessionObserver for LogObserver {
    fn phase_changed(&mut self, from: GamePhase, to: GamePhase) {
        if from == to {
            println!("== {to} ==");
        } else {
            println!("== {to} (was {from}) ==");
        }
    }

    fn timer_tick(&mut self, remaining: u32) {
        if remaining > 0 && should_print_tick(remaining) {
            println!("  {remaining}s left");
        }
    }

    fn timer_expired(&mut self, phase: GamePhase) {
        println!("  time is up ({phase})");
    }

    fn players_changed(&mut self, players: &BTreeMap<String, PlayerView>) {
        for player in players.values() {
            let marker = if self.is_me(&player.codename) { "*" } else { " " };
            let away = if player.disconnected { " (offline)" } else { "" };
            println!(
                " {marker} {:<16} {:>3} IP  {:?}{away}",
                player.codename, player.influence, player.status
            );
        }
    }

    fn submission_accepted(&mut self, round: u32) {
        println!("Turn for round {round} sent.");
    }

    fn submission_rejected(&mut self, reason: &SessionError) {
        println!("Not sent: {reason}");
    }

    fn connection_status_changed(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Reconnecting { attempt, delay } => println!(
                "[{}] attempt {attempt} in {:.1}s",
                status.label(),
                delay.as_secs_f32()
            ),
            _ => println!("[{}]", status.label()),
        }
    }

    fn resync_completed(&mut self, phase: GamePhase) {
        println!("Back in sync ({phase}).");
    }

    fn fatal_connection_lost(&mut self, error: &SessionError) {
        println!("{error}. Type 'reconnect' to try again.");
    }

    fn identity_assigned(&mut self, codename: &str, is_host: bool) {
        self.codename = Some(codename.to_string());
        if is_host {
            println!("You are {codename}, host. Type 'start' when everyone is in.");
        } else {
            println!("You are {codename}.");
        }
    }

    fn join_failed(&mut self, message: &str) {
        println!("Could not join: {message}");
    }

    fn server_error(&mut self, message: &str) {
        println!("Server: {message}");
    }

    fn turn_options_changed(&mut self, options: &TurnOptions) {
        let targets = if options.targets.is_empty() {
            "none".to_string()
        } else {
            options.targets.join(", ")
        };
        println!("Targets: {targets}. Spend up to {} IP.", options.max_spend);
    }

    fn notice(&mut self, notice: &SessionNotice) {
        match notice {
            SessionNotice::TurnResolved { round, results } => {
                println!("Round {round} resolved:");
                for outcome in results {
                    let verdict = if outcome.success { "hit" } else { "missed" };
                    println!(
                        "  {} -> {} ({}): {verdict}. {}",
                        outcome.attacker, outcome.defender, outcome.offense, outcome.description
                    );
                }
                println!("Type 'continue' for the next round.");
            }
            SessionNotice::BannerRequested { message, caster } => {
                let from = caster.as_deref().unwrap_or("someone");
                println!("Banner from {from}: \"{message}\". 'believe' or 'ignore'?");
            }
            SessionNotice::ShowdownStarted(info) => {
                println!(
                    "FINAL SHOWDOWN: {} ({}s). Actions: {}",
                    info.participants.join(" vs "),
                    info.time_limit,
                    info.available_actions.join(", ")
                );
                if !info.rules.is_empty() {
                    println!("  {}", info.rules);
                }
            }
            SessionNotice::GameOver(info) => {
                let winners = match (&info.winner, info.winners.is_empty()) {
                    (Some(winner), _) => winner.clone(),
                    (None, false) => info.winners.join(", "),
                    (None, true) => "nobody".to_string(),
                };
                println!("GAME OVER. Winner: {winners}");
                if let Some(description) = &info.description {
                    println!("  {description}");
                }
            }
            SessionNotice::ActionAcknowledged => println!("Server has your turn."),
            SessionNotice::BannerAcknowledged => println!("Banner answer recorded."),
            SessionNotice::ShowdownAcknowledged => println!("Showdown move recorded."),
            SessionNotice::PlayerSubmitted { codename } if !self.is_me(codename) => {
                println!("{codename} is ready.");
            }
            SessionNotice::PlayerSubmitted { .. } => {}
            SessionNotice::AllianceFormed { members } => {
                println!("Alliance formed: {}", members.join(" + "));
            }
            SessionNotice::HostTransferred => println!("The host changed."),
            SessionNotice::MasterPlanUpdated => println!("Master plan updated."),
            SessionNotice::AlliancesUpdated => println!("Alliances updated."),
        }
    }
}
