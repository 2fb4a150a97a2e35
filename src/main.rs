use std::error::Error;
use std::sync::Arc;

use chrono::DateTime;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};

use game_chat::chat::{ChatSession, MessageStoreClient};
use game_chat::common::{ChatEvent, IdentityProvider, Message};
use game_chat::config;
use game_chat::preferences::UserRecords;
use game_chat::profile::fetch_profile;
use game_chat::theme::{self, CHAT_THEMES, ChatTheme, Color, ThemePreferences};

#[derive(Parser)]
#[command(name = "game-chat", version, about = "Per-game chat for the game portal")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join a game's chat; lines typed on stdin are sent
    Chat { session: String },
    /// Print the stored history of a game's chat
    History { session: String },
    /// Delete messages older than the retention window
    Cleanup,
    /// Show the signed-in user's profile
    Profile,
    /// List the available chat themes
    Themes,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config).apply_env();
    let store = app_config.open_store()?;
    let identity: Arc<dyn IdentityProvider> = Arc::new(app_config.identity());
    let client = Arc::new(MessageStoreClient::with_retention(
        store.clone(),
        app_config.retention_ms,
    ));
    log::info!("Using {:?} backend", app_config.backend);

    match cli.command {
        Command::Chat { session } => {
            let records = UserRecords::new(store);
            let themes = ThemePreferences::new(Arc::new(records), identity.clone());
            run_chat(&session, client, identity, themes).await?;
        }
        Command::History { session } => {
            let viewer = identity.author_name();
            for message in client.fetch_all(&session).await? {
                print_message(&message, &viewer, theme::default_theme());
            }
        }
        Command::Cleanup => {
            let deleted = client.cleanup().await?;
            println!("Deleted {deleted} stale messages");
        }
        Command::Profile => {
            match fetch_profile(&*identity, &UserRecords::new(store)).await? {
                Some(profile) => {
                    println!("uid:   {}", profile.uid);
                    println!("name:  {}", profile.name);
                    println!("email: {}", profile.email);
                    if let Some(photo) = profile.photo_url.filter(|url| !url.is_empty()) {
                        println!("photo: {photo}");
                    }
                }
                None => println!("No user signed in"),
            }
        }
        Command::Themes => {
            for theme in CHAT_THEMES.iter() {
                println!(
                    "{:<12} background {} text {}",
                    theme.name,
                    theme.background_color.to_hex_rgb(),
                    theme.text_color.to_hex_rgb()
                );
            }
        }
    }

    Ok(())
}

async fn run_chat(
    session_id: &str,
    client: Arc<MessageStoreClient>,
    identity: Arc<dyn IdentityProvider>,
    themes: ThemePreferences,
) -> Result<(), Box<dyn Error>> {
    let viewer = identity.author_name();
    let (mut chat, mut events) = ChatSession::new(client, identity, Some(themes));
    chat.open(session_id).await;
    println!("Joined {} as {viewer}. /theme <name> to restyle, /quit to leave.", chat.session_id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => print_event(&event, &viewer, chat.current_theme()),
                    None => break,
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_input(&mut chat, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    chat.close();
    Ok(())
}

/// Returns `false` once the user asks to leave.
async fn handle_input(chat: &mut ChatSession, line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed == "/quit" {
        return false;
    }
    if let Some(name) = trimmed.strip_prefix("/theme ") {
        match chat.save_theme(name.trim()).await {
            Ok(theme) => println!("Theme: {}", theme.name),
            Err(err) => log::warn!("Failed to save theme: {err}"),
        }
        return true;
    }
    if let Err(err) = chat.send(line).await {
        log::debug!("Message not delivered: {err}");
    }
    true
}

fn print_event(event: &ChatEvent, viewer: &str, theme: &ChatTheme) {
    match event {
        ChatEvent::ThemeLoaded(loaded) => log::info!("Chat theme: {}", loaded.name),
        ChatEvent::HistoryLoaded(history) => {
            for message in history {
                print_message(message, viewer, theme);
            }
        }
        ChatEvent::MessageReceived(message) => print_message(message, viewer, theme),
    }
}

/// One line per message, painted with the theme's bubble colours.
fn print_message(message: &Message, viewer: &str, theme: &ChatTheme) {
    let time = DateTime::from_timestamp_millis(message.timestamp)
        .map(|instant| instant.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    let own = message.is_own(viewer);
    let author = if own {
        "you"
    } else {
        message.author_name.as_str()
    };
    let (fill, text) = theme.bubble_colors(own);
    println!(
        "\x1b[48;2;{}m\x1b[38;2;{}m[{time}] {author}: {}\x1b[0m",
        ansi_rgb(fill),
        ansi_rgb(text),
        message.text
    );
}

fn ansi_rgb(color: Color) -> String {
    let [_, r, g, b] = color.0.to_be_bytes();
    format!("{r};{g};{b}")
}
