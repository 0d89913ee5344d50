use bland_client::config::{ClientConfig, DEFAULT_SERVER_URL};
use bland_client::runner::{CommandSender, SessionRunner, UserCommand};
use bland_client::ws_transport::WsConnector;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod commands;
mod observer;

use commands::Input;
use observer::LogObserver;

#[derive(Parser)]
#[command(name = "bland")]
#[command(about = "Play James Bland from the terminal", long_about = None)]
struct Cli {
    /// Game server URL
    #[arg(short, long, env = "BLAND_SERVER", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Codename to play under
    #[arg(short, long)]
    codename: Option<String>,

    /// Join the lobby as soon as the connection opens
    #[arg(short, long, requires = "codename")]
    auto_join: bool,
}

#[tokio::main]
async fn main() {
    // Respects RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::new(cli.server);
    config.codename = cli.codename;
    config.auto_join = cli.auto_join;

    let ws_url = config.ws_url();
    println!("Connecting to {ws_url}... (type 'help' for commands)");

    let connector = WsConnector::new(ws_url);
    let (mut runner, sender) = SessionRunner::new(&config, connector, LogObserver::default());
    tokio::spawn(read_commands(sender, config.codename.clone()));
    runner.run().await;
}

/// Forward stdin lines to the session until `quit` or end of input.
async fn read_commands(sender: CommandSender, codename: Option<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read stdin");
                break;
            }
        };
        match commands::parse(&line, codename.as_deref()) {
            Ok(Input::Command(command)) => {
                let quit = command == UserCommand::Quit;
                if sender.send(command).is_err() || quit {
                    return;
                }
            }
            Ok(Input::Help) => println!("{}", commands::HELP),
            Ok(Input::Empty) => {}
            Err(e) => eprintln!("{e} (type 'help')"),
        }
    }
    let _ = sender.send(UserCommand::Quit);
}
