use super::*;
use std::collections::HashMap;
use streamchat::storage::MemoryStorage;
use time::OffsetDateTime;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn tail_defaults_to_no_backfill() {
    let cli = parse(&["streamchat", "tail", "42"]);
    assert_eq!(cli.command, Command::Tail { stream_id: "42".to_owned(), backfill: 0 });
}

#[test]
fn send_takes_stream_and_message() {
    let cli = parse(&["streamchat", "--api-url", "http://chat.test", "send", "7", "hello there"]);
    assert_eq!(cli.api_url.as_deref(), Some("http://chat.test"));
    assert_eq!(
        cli.command,
        Command::Send { stream_id: "7".to_owned(), message: "hello there".to_owned() }
    );
}

#[test]
fn login_requires_username() {
    assert!(Cli::try_parse_from(["streamchat", "login", "--password", "pw"]).is_err());
}

#[test]
fn flags_override_lookup() {
    let cli = parse(&["streamchat", "--api-url", "https://chat.test/", "--session-file", "/tmp/s.json", "whoami"]);
    let env: HashMap<&str, &str> = HashMap::from([
        ("STREAMCHAT_API_URL", "http://ignored.test"),
        ("STREAMCHAT_HISTORY_PAGE_SIZE", "25"),
    ]);
    let config = load_config(&cli, |key| env.get(key).map(|v| (*v).to_owned())).unwrap();
    assert_eq!(config.api_url, "https://chat.test");
    assert_eq!(config.session_file, PathBuf::from("/tmp/s.json"));
    assert_eq!(config.history_page_size, 25);
}

#[test]
fn message_line_format() {
    let msg = ChatMessage {
        id: "1".to_owned(),
        author_name: "ann".to_owned(),
        body: "first!".to_owned(),
        created_at: OffsetDateTime::from_unix_timestamp(3_600 * 14 + 60 * 5 + 9).unwrap(),
    };
    assert_eq!(format_message(&msg), "[14:05:09] ann: first!");
}

fn anonymous_app() -> App {
    let (ui, _rx) = UiEvents::channel();
    App::new(ClientConfig::for_origin("http://127.0.0.1:9"), Arc::new(MemoryStorage::default()), ui).unwrap()
}

#[tokio::test]
async fn tail_opens_without_a_session() {
    let app = anonymous_app();
    let pane = open_pane(&app, "42", false).await.unwrap();
    assert_eq!(pane.room().stream_id(), "42");
    assert_eq!(app.connection().token(), None);
}

#[tokio::test]
async fn send_requires_a_session() {
    let app = anonymous_app();
    assert!(matches!(open_pane(&app, "42", true).await, Err(CliError::NotLoggedIn)));
}
