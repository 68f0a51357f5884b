mod input;
mod terminal;

use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

use chato::transport::ws::WsConnector;
use chato::{ChannelId, ChatClient, ChatError, ClientConfig, Command, ExponentialBackoff, NoReconnect, ReconnectPolicy};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::input::{Input, USAGE, parse_line};
use crate::terminal::TerminalSink;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("--reconnect-max-ms ({max}) is below --reconnect-ms ({initial})")]
    ReconnectRange { initial: u64, max: u64 },
}

#[derive(Parser, Debug)]
#[command(name = "chato", about = "Terminal client for a chato chat server")]
struct Cli {
    #[arg(long, env = "CHATO_ENDPOINT", default_value = chato::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    #[arg(long, env = "CHATO_REALM", default_value = chato::config::DEFAULT_REALM)]
    realm: String,

    #[arg(long, env = "CHATO_CHANNEL", default_value = chato::config::DEFAULT_CHANNEL)]
    channel: String,

    /// Nickname; a random preset when omitted.
    #[arg(long, env = "CHATO_NICK")]
    nick: Option<String>,

    /// Delay before the first reconnect attempt.
    #[arg(long, default_value_t = 1000)]
    reconnect_ms: u64,

    /// Upper bound for the doubling reconnect delay.
    #[arg(long, default_value_t = 30_000)]
    reconnect_max_ms: u64,

    /// Give up after this many consecutive failed attempts.
    #[arg(long)]
    reconnect_attempts: Option<u32>,

    /// Exit instead of reconnecting when the connection drops.
    #[arg(long)]
    no_reconnect: bool,

    #[arg(long)]
    no_color: bool,
}

impl Cli {
    fn reconnect_policy(&self) -> Result<Box<dyn ReconnectPolicy>, CliError> {
        if self.no_reconnect {
            return Ok(Box::new(NoReconnect));
        }
        if self.reconnect_max_ms < self.reconnect_ms {
            return Err(CliError::ReconnectRange { initial: self.reconnect_ms, max: self.reconnect_max_ms });
        }
        Ok(Box::new(ExponentialBackoff {
            initial: Duration::from_millis(self.reconnect_ms),
            max: Duration::from_millis(self.reconnect_max_ms),
            max_failures: self.reconnect_attempts,
        }))
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            realm: self.realm.clone(),
            channel: ChannelId::new(self.channel.clone()),
            ..ClientConfig::default()
        }
    }
}

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Command>) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin: read failed");
                    break;
                }
            };
            match parse_line(&line) {
                None => {}
                Some(Input::Command(command)) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Some(Input::Help) => println!("{USAGE}"),
                Some(Input::Invalid(reason)) => println!("{reason} (try /help)"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let policy = cli.reconnect_policy()?;
    let sink = TerminalSink::new(io::stdout(), !cli.no_color);

    let mut client = ChatClient::new(cli.client_config(), Arc::new(WsConnector::new()), Box::new(sink))
        .with_reconnect_policy(policy);
    if let Some(nick) = cli.nick.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        client = client.with_nickname(nick);
    }
    println!("connecting to {} as {}", cli.endpoint, client.nickname());

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_stdin_reader(tx);

    client.run(rx).await?;
    Ok(())
}
