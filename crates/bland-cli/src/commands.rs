//! Line-oriented command parsing.

use bland_client::runner::{TurnEdit, UserCommand};
use bland_core::protocol::BannerResponse;
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  join [codename]      join the lobby
  start                start the game (host only)
  offense <id>         set the offensive operation
  defense <id>         set the defensive measure
  target <codename>    set the target ('none' to clear)
  spend <ip>           set influence points to spend
  banner <text>        banner message for information warfare
  submit               submit the turn
  continue             go on to the next round
  believe | ignore     answer an enemy banner
  showdown <action>    final showdown move
  plan                 show the master plan
  alliances            show alliances
  ally <codename>      propose an alliance
  reconnect            reconnect after the connection was lost
  quit                 leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(UserCommand),
    Help,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("'{0}' is not a whole number")]
    InvalidNumber(String),
}

/// Parse one input line. `codename` is the fallback for a bare `join`.
pub fn parse(line: &str, codename: Option<&str>) -> Result<Input, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then_some(rest);

    let command = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(Input::Help),
        "join" => {
            let codename = arg.or(codename).ok_or(CommandError::MissingArgument {
                command: "join",
                argument: "a codename",
            })?;
            UserCommand::Join(codename.to_string())
        }
        "start" => UserCommand::StartGame,
        "offense" => UserCommand::Edit(TurnEdit::Offense(required(arg, "offense", "an operation")?)),
        "defense" => UserCommand::Edit(TurnEdit::Defense(required(arg, "defense", "a measure")?)),
        "target" => {
            let target = arg
                .filter(|t| !t.eq_ignore_ascii_case("none"))
                .map(str::to_string);
            UserCommand::Edit(TurnEdit::Target(target))
        }
        "spend" => {
            let amount = required(arg, "spend", "an amount")?;
            let spend = amount
                .parse()
                .map_err(|_| CommandError::InvalidNumber(amount.clone()))?;
            UserCommand::Edit(TurnEdit::Spend(spend))
        }
        "banner" => UserCommand::Edit(TurnEdit::Banner(arg.map(str::to_string))),
        "submit" => UserCommand::Submit,
        "continue" | "next" => UserCommand::Continue,
        "believe" => UserCommand::Banner(BannerResponse::Believe),
        "ignore" => UserCommand::Banner(BannerResponse::Ignore),
        "showdown" => UserCommand::Showdown(required(arg, "showdown", "an action")?),
        "plan" => UserCommand::MasterPlan,
        "alliances" => UserCommand::Alliances,
        "ally" => UserCommand::Ally(required(arg, "ally", "a codename")?),
        "reconnect" => UserCommand::Reconnect,
        "quit" | "exit" => UserCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Input::Command(command))
}

fn required(
    arg: Option<&str>,
    command: &'static str,
    argument: &'static str,
) -> Result<String, CommandError> {
    arg.map(str::to_string)
        .ok_or(CommandError::MissingArgument { command, argument })
}
