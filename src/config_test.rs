use super::*;
use std::collections::HashMap;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn from_lookup_uses_defaults() {
    let cfg = ClientConfig::from_lookup(lookup(&[("HOME", "/home/ann")])).unwrap();
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.api_prefix, "/api");
    assert_eq!(cfg.socket_path, "/app/ws");
    assert_eq!(cfg.history_page_size, 50);
    assert_eq!(cfg.older_page_timeout, Duration::from_millis(DEFAULT_OLDER_PAGE_TIMEOUT_MS));
    assert_eq!(cfg.reconnect, ReconnectPolicy::default());
    assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    assert_eq!(cfg.session_file, PathBuf::from("/home/ann/.streamchat/session.json"));
}

#[test]
fn from_lookup_parses_overrides() {
    let cfg = ClientConfig::from_lookup(lookup(&[
        ("STREAMCHAT_API_URL", "https://live.example.test/"),
        ("STREAMCHAT_API_PREFIX", "v2/"),
        ("STREAMCHAT_SOCKET_PATH", "/rt"),
        ("STREAMCHAT_HISTORY_PAGE_SIZE", "20"),
        ("STREAMCHAT_OLDER_PAGE_TIMEOUT_MS", "250"),
        ("STREAMCHAT_RECONNECT_INITIAL_MS", "100"),
        ("STREAMCHAT_RECONNECT_MAX_MS", "800"),
        ("STREAMCHAT_REQUEST_TIMEOUT_SECS", "5"),
        ("STREAMCHAT_SESSION_FILE", "/tmp/s.json"),
    ]))
    .unwrap();
    assert_eq!(cfg.api_url, "https://live.example.test");
    assert_eq!(cfg.api_prefix, "/v2");
    assert_eq!(cfg.history_page_size, 20);
    assert_eq!(cfg.older_page_timeout, Duration::from_millis(250));
    assert_eq!(cfg.reconnect.initial, Duration::from_millis(100));
    assert_eq!(cfg.reconnect.max, Duration::from_millis(800));
    assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    assert_eq!(cfg.session_file, PathBuf::from("/tmp/s.json"));
    assert_eq!(cfg.socket_url().unwrap(), "wss://live.example.test/rt");
    assert_eq!(cfg.api_endpoint("/users/me"), "https://live.example.test/v2/users/me");
}

#[test]
fn from_lookup_rejects_non_http_origin() {
    let err = ClientConfig::from_lookup(lookup(&[("STREAMCHAT_API_URL", "ftp://x")])).unwrap_err();
    assert!(matches!(err, ClientError::InvalidBaseUrl(url) if url == "ftp://x"));
}

#[test]
fn from_lookup_rejects_bad_numbers() {
    let err = ClientConfig::from_lookup(lookup(&[("STREAMCHAT_HISTORY_PAGE_SIZE", "lots")])).unwrap_err();
    assert!(matches!(err, ClientError::InvalidConfig { key: "STREAMCHAT_HISTORY_PAGE_SIZE", .. }));

    let err = ClientConfig::from_lookup(lookup(&[("STREAMCHAT_HISTORY_PAGE_SIZE", "0")])).unwrap_err();
    assert!(matches!(err, ClientError::InvalidConfig { .. }));
}

#[test]
fn socket_url_swaps_scheme() {
    let cfg = ClientConfig::for_origin("http://127.0.0.1:9000/");
    assert_eq!(cfg.socket_url().unwrap(), "ws://127.0.0.1:9000/app/ws");
    assert_eq!(cfg.api_endpoint("/chat/42/messages"), "http://127.0.0.1:9000/api/chat/42/messages");
}
