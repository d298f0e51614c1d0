use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use streamchat::net::connection::AUTH_ERROR_MESSAGE;
use streamchat::state::room::RoomUpdate;
use streamchat::state::window::MessageWindow;
use streamchat::storage::FileStorage;
use streamchat::ui::{NoticeLevel, UiEvent, UiEvents};
use streamchat::{App, ChatMessage, ChatPane, ClientConfig, ClientError};
use tokio::sync::mpsc;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

/// How long `send` waits for the server to echo the message back.
const ECHO_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("not logged in; run `streamchat login` first")]
    NotLoggedIn,
    #[error("timed out waiting for the chat room after {0:?}")]
    Timeout(Duration),
    #[error("chat channel closed")]
    ChannelClosed,
}

#[derive(Parser, Debug)]
#[command(name = "streamchat", about = "Livestream chat client")]
struct Cli {
    /// Backend origin.
    #[arg(long, env = "STREAMCHAT_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "STREAMCHAT_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "STREAMCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    Whoami,
    /// Print a stream's chat history over REST.
    History { stream_id: String },
    /// Follow a stream's chat live. Works without logging in.
    Tail {
        stream_id: String,
        /// Older pages to load before printing.
        #[arg(long, default_value_t = 0)]
        backfill: usize,
    },
    Send { stream_id: String, message: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli, |key| std::env::var(key).ok())?;
    let storage = Arc::new(FileStorage::new(config.session_file.clone()));
    let (ui, ui_rx) = UiEvents::channel();
    let _notices = tokio::spawn(print_ui_events(ui_rx));
    let app = App::new(config, storage, ui)?;

    match cli.command {
        Command::Login { username, password } => {
            let user = app.login(&username, &password).await?;
            println!("logged in as {}", user.label());
            Ok(())
        }
        Command::Logout => {
            if !app.auth().is_authenticated() {
                return Err(CliError::NotLoggedIn);
            }
            app.logout().await?;
            Ok(())
        }
        Command::Whoami => {
            let user = app.start().await.ok_or(CliError::NotLoggedIn)?;
            println!("{} (id {})", user.label(), user.id);
            Ok(())
        }
        Command::History { stream_id } => run_history(&app, &stream_id).await,
        Command::Tail { stream_id, backfill } => run_tail(&app, &stream_id, backfill).await,
        Command::Send { stream_id, message } => run_send(&app, &stream_id, &message).await,
    }
}

/// Flags win over the environment; everything else comes from `lookup`.
fn load_config<F>(cli: &Cli, lookup: F) -> Result<ClientConfig, ClientError>
where
    F: Fn(&str) -> Option<String>,
{
    ClientConfig::from_lookup(|key| match key {
        "STREAMCHAT_API_URL" if cli.api_url.is_some() => cli.api_url.clone(),
        "STREAMCHAT_SESSION_FILE" if cli.session_file.is_some() => {
            cli.session_file.as_ref().map(|p| p.display().to_string())
        }
        _ => lookup(key),
    })
}

fn format_message(msg: &ChatMessage) -> String {
    let at = msg.created_at;
    format!("[{:02}:{:02}:{:02}] {}: {}", at.hour(), at.minute(), at.second(), msg.author_name, msg.body)
}

async fn print_ui_events(mut rx: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            UiEvent::Notice(notice) => match notice.level() {
                NoticeLevel::Info => eprintln!("{}", notice.text()),
                NoticeLevel::Error => eprintln!("error: {}", notice.text()),
            },
            UiEvent::RedirectToLogin => eprintln!("run `streamchat login` to sign in again"),
        }
    }
}

async fn run_history(app: &App, stream_id: &str) -> Result<(), CliError> {
    let mut window = MessageWindow::default();
    window.replace(app.api().fetch_stream_messages(stream_id).await?);
    for msg in window.iter() {
        println!("{}", format_message(msg));
    }
    Ok(())
}

/// Prints each message once across reconnects and history reloads.
#[derive(Default)]
struct Printer {
    printed: HashSet<String>,
}

impl Printer {
    fn print_window(&mut self, window: &MessageWindow) {
        for msg in window.iter() {
            self.print(msg);
        }
    }

    fn print(&mut self, msg: &ChatMessage) {
        if self.printed.insert(msg.id.clone()) {
            println!("{}", format_message(msg));
        }
    }
}

/// Verifies any stored session first so the channel opens with a live
/// token. Without one the room is watched anonymously.
async fn open_pane(app: &App, stream_id: &str, require_login: bool) -> Result<ChatPane, CliError> {
    if app.start().await.is_none() {
        if require_login {
            return Err(CliError::NotLoggedIn);
        }
        tracing::info!(stream_id, "watching anonymously");
    }
    Ok(app.open_chat(stream_id)?)
}

async fn next_update(pane: &mut ChatPane) -> Result<RoomUpdate, CliError> {
    match pane.next_update().await {
        Ok(RoomUpdate::ConnectRejected { message }) if message == AUTH_ERROR_MESSAGE => {
            Err(ClientError::SocketAuth.into())
        }
        Ok(update) => Ok(update),
        Err(ClientError::NotConnected) => Err(CliError::ChannelClosed),
        Err(e) => Err(e.into()),
    }
}

async fn run_tail(app: &App, stream_id: &str, backfill: usize) -> Result<(), CliError> {
    let mut pane = open_pane(app, stream_id, false).await?;
    let mut printer = Printer::default();
    let mut pages_left = backfill;

    loop {
        let update = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = next_update(&mut pane) => update?,
        };
        match update {
            RoomUpdate::HistoryLoaded { .. } => {
                if pages_left == 0 || !pane.load_older()? {
                    printer.print_window(pane.room().window());
                }
            }
            RoomUpdate::Prepended { .. } | RoomUpdate::OlderExhausted | RoomUpdate::OlderFailed => {
                pages_left = pages_left.saturating_sub(1);
                if pages_left == 0 || !pane.load_older()? {
                    printer.print_window(pane.room().window());
                }
            }
            RoomUpdate::Appended(msg) => {
                if !pane.room().is_loading_older() {
                    printer.print(&msg);
                }
            }
            RoomUpdate::ViewerCount(count) => eprintln!("viewers: {count}"),
            RoomUpdate::ConnectionLost { reason } => eprintln!("connection lost ({reason}); reconnecting"),
            RoomUpdate::ConnectRejected { message } => eprintln!("chat server error: {message}"),
            RoomUpdate::Connected
            | RoomUpdate::Duplicate
            | RoomUpdate::Notification(_)
            | RoomUpdate::Ignored => {}
        }
    }

    pane.close();
    Ok(())
}

async fn run_send(app: &App, stream_id: &str, message: &str) -> Result<(), CliError> {
    let mut pane = open_pane(app, stream_id, true).await?;
    let join_wait = app.config().request_timeout;

    tokio::time::timeout(join_wait, async {
        while !pane.room().is_joined() {
            next_update(&mut pane).await?;
        }
        Ok::<_, CliError>(())
    })
    .await
    .map_err(|_| CliError::Timeout(join_wait))??;

    if !pane.send(message)? {
        return Ok(());
    }

    let body = message.trim();
    let echoed = tokio::time::timeout(ECHO_WAIT, async {
        loop {
            if let RoomUpdate::Appended(msg) = next_update(&mut pane).await?
                && msg.body == body
            {
                return Ok::<_, CliError>(msg);
            }
        }
    })
    .await;
    match echoed {
        Ok(Ok(msg)) => println!("{}", format_message(&msg)),
        Ok(Err(e)) => return Err(e),
        Err(_) => tracing::warn!("message sent but no echo arrived"),
    }

    pane.close();
    Ok(())
}
