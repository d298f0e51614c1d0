use super::*;
use crate::config::ReconnectPolicy;
use crate::net::types::User;
use crate::storage::{MemoryStorage, PersistedSession};
use crate::ui::UiEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Accept,
    Reject401,
    DropFirst,
}

struct FakeSocket {
    origin: String,
    accepts: Arc<AtomicUsize>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: broadcast::Sender<String>,
}

impl FakeSocket {
    async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let accepts = Arc::new(AtomicUsize::new(0));
        let auth_headers = Arc::new(Mutex::new(Vec::new()));
        let (from_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, _) = broadcast::channel::<String>(64);

        let server_accepts = accepts.clone();
        let server_headers = auth_headers.clone();
        let server_to_client = to_client.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                let n = server_accepts.fetch_add(1, Ordering::SeqCst);
                let headers = server_headers.clone();
                let from_tx = from_tx.clone();
                let mut outgoing = server_to_client.subscribe();
                tokio::spawn(async move {
                    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        let auth = req
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        let accepted = mode != Mode::Reject401 && matches!(auth.as_deref(), None | Some("Bearer good"));
                        headers.lock().unwrap().push(auth);
                        if accepted {
                            return Ok(resp);
                        }
                        let mut err = ErrorResponse::new(Some("unauthorized".to_owned()));
                        *err.status_mut() = StatusCode::UNAUTHORIZED;
                        Err(err)
                    };
                    let Ok(ws) = accept_hdr_async(stream, callback).await else { return };
                    if mode == Mode::DropFirst && n == 0 {
                        drop(ws);
                        return;
                    }
                    let (mut sink, mut stream) = ws.split();
                    loop {
                        tokio::select! {
                            msg = stream.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = from_tx.send(text.to_string());
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            out = outgoing.recv() => match out {
                                Ok(text) => {
                                    if sink.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            },
                        }
                    }
                });
            }
        });

        Self { origin, accepts, auth_headers, from_client, to_client }
    }

    fn push(&self, text: &str) {
        self.to_client.send(text.to_owned()).unwrap();
    }

    async fn next_from_client(&mut self) -> serde_json::Value {
        let text = timeout(WAIT, self.from_client.recv()).await.unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

fn session(token: &str) -> Arc<AuthStore> {
    let user = User { id: "9".to_owned(), username: "viewer".to_owned(), display_name: None, role: None };
    let storage = MemoryStorage::with_session(PersistedSession { token: token.to_owned(), user: Some(user) });
    Arc::new(AuthStore::hydrate(Arc::new(storage)))
}

fn anonymous() -> Arc<AuthStore> {
    Arc::new(AuthStore::hydrate(Arc::new(MemoryStorage::default())))
}

fn handle_for(socket: &FakeSocket, auth: Arc<AuthStore>) -> (ConnectionHandle, mpsc::UnboundedReceiver<UiEvent>) {
    let mut config = ClientConfig::for_origin(&socket.origin);
    config.reconnect = ReconnectPolicy {
        initial: Duration::from_millis(10),
        max: Duration::from_millis(40),
        jitter: 0.0,
    };
    let (ui, rx) = UiEvents::channel();
    let handle = ConnectionHandle::new(Arc::new(config), auth, ui);
    (handle, rx)
}

async fn next_event(rx: &mut broadcast::Receiver<InboundEvent>) -> InboundEvent {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn wait_for_status(handle: &ConnectionHandle, want: ConnectionStatus) {
    let mut changes = handle.status_changes();
    timeout(WAIT, changes.wait_for(|s| *s == want)).await.unwrap().unwrap();
}

#[tokio::test]
async fn anonymous_viewer_reads_a_public_room() {
    let mut socket = FakeSocket::start(Mode::Accept).await;
    let (handle, _ui) = handle_for(&socket, anonymous());
    assert_eq!(handle.token(), None);
    let mut events = handle.subscribe();

    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);
    assert_eq!(socket.auth_headers.lock().unwrap().as_slice(), &[None]);

    // No user id, so the first frame is the room join, not a notification join.
    handle.emit(OutboundEvent::JoinStreamRoom { stream_id: "42".to_owned() }).unwrap();
    let join = socket.next_from_client().await;
    assert_eq!(join["event"], "join_stream_room");

    socket.push(
        r#"{"event":"new_message","data":{"message":{"id":5,"authorName":"bo","body":"hey","createdAt":"2026-01-01T10:00:00Z"}}}"#,
    );
    let InboundEvent::NewMessage { message } = next_event(&mut events).await else {
        panic!("expected new_message");
    };
    assert_eq!(message.id, "5");
    assert_eq!(message.body, "hey");
}

#[tokio::test]
async fn emit_before_connect_is_refused() {
    let socket = FakeSocket::start(Mode::Accept).await;
    let (handle, _ui) = handle_for(&socket, session("good"));

    assert_eq!(handle.status(), ConnectionStatus::Disconnected);
    assert!(!handle.is_connected());
    let err = handle.emit(OutboundEvent::JoinStreamRoom { stream_id: "1".to_owned() }).unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
    assert_eq!(socket.accepts(), 0);
}

#[tokio::test]
async fn connect_sends_bearer_and_joins_notification_room() {
    let mut socket = FakeSocket::start(Mode::Accept).await;
    let (handle, _ui) = handle_for(&socket, session("good"));
    let mut events = handle.subscribe();

    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);
    assert!(handle.is_connected());

    let join = socket.next_from_client().await;
    assert_eq!(join["event"], "join_notification_room");
    assert_eq!(join["data"]["userId"], "9");
    assert_eq!(socket.auth_headers.lock().unwrap().as_slice(), &[Some("Bearer good".to_owned())]);
}

#[tokio::test]
async fn connect_is_idempotent() {
    let socket = FakeSocket::start(Mode::Accept).await;
    let (handle, _ui) = handle_for(&socket, session("good"));
    let mut events = handle.subscribe();

    handle.connect();
    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);
    handle.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(socket.accepts(), 1);
}

#[tokio::test]
async fn emit_and_receive_round_trip_through_server() {
    let mut socket = FakeSocket::start(Mode::Accept).await;
    let (handle, _ui) = handle_for(&socket, session("good"));
    let mut events = handle.subscribe();
    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);
    let _notification_join = socket.next_from_client().await;

    handle.emit(OutboundEvent::JoinStreamRoom { stream_id: "42".to_owned() }).unwrap();
    let join = socket.next_from_client().await;
    assert_eq!(join["event"], "join_stream_room");
    assert_eq!(join["data"]["streamId"], "42");

    socket.push("not json at all");
    socket.push(r#"{"event":"viewer_count_updated","data":{"streamId":42,"count":17}}"#);
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::ViewerCountUpdated { stream_id: "42".to_owned(), count: 17 }
    );
    assert!(handle.is_connected());
}

#[tokio::test]
async fn server_notification_becomes_notice() {
    let socket = FakeSocket::start(Mode::Accept).await;
    let (handle, mut ui) = handle_for(&socket, session("good"));
    let mut events = handle.subscribe();
    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);

    socket.push(r#"{"event":"new_notification","data":{"message":"stream is live"}}"#);
    let _ = next_event(&mut events).await;
    assert_eq!(
        timeout(WAIT, ui.recv()).await.unwrap().unwrap(),
        UiEvent::Notice(Notice::Notification("stream is live".to_owned()))
    );
}

#[tokio::test]
async fn handshake_401_expires_session_and_stops() {
    let socket = FakeSocket::start(Mode::Reject401).await;
    let auth = session("good");
    let (handle, mut ui) = handle_for(&socket, auth.clone());
    let mut events = handle.subscribe();

    handle.connect();
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::ConnectError { message: AUTH_ERROR_MESSAGE.to_owned() }
    );
    assert!(!auth.is_authenticated());
    assert_eq!(timeout(WAIT, ui.recv()).await.unwrap().unwrap(), UiEvent::Notice(Notice::SocketAuthFailed));
    assert_eq!(timeout(WAIT, ui.recv()).await.unwrap().unwrap(), UiEvent::RedirectToLogin);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(socket.accepts(), 1);
    assert_eq!(handle.status(), ConnectionStatus::Disconnected);

    handle.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(socket.accepts(), 1);
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let socket = FakeSocket::start(Mode::Accept).await;
    let auth = session("stale");
    let (handle, _ui) = handle_for(&socket, auth.clone());
    let mut events = handle.subscribe();

    handle.connect();
    assert!(matches!(next_event(&mut events).await, InboundEvent::ConnectError { .. }));
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn server_auth_error_event_expires_session() {
    let socket = FakeSocket::start(Mode::Accept).await;
    let auth = session("good");
    let (handle, mut ui) = handle_for(&socket, auth.clone());
    let mut events = handle.subscribe();
    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);

    socket.push(r#"{"event":"connect_error","data":{"message":"Authentication error"}}"#);
    assert!(matches!(next_event(&mut events).await, InboundEvent::ConnectError { .. }));
    wait_for_status(&handle, ConnectionStatus::Disconnected).await;
    assert!(!auth.is_authenticated());
    assert_eq!(timeout(WAIT, ui.recv()).await.unwrap().unwrap(), UiEvent::Notice(Notice::SocketAuthFailed));
}

#[tokio::test]
async fn dropped_connection_reconnects() {
    let socket = FakeSocket::start(Mode::DropFirst).await;
    let (handle, _ui) = handle_for(&socket, session("good"));
    let mut events = handle.subscribe();

    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);
    assert!(matches!(next_event(&mut events).await, InboundEvent::Disconnect { .. }));
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);
    assert_eq!(socket.accepts(), 2);
    assert!(handle.is_connected());
}

#[tokio::test]
async fn disconnect_stops_the_loop() {
    let socket = FakeSocket::start(Mode::Accept).await;
    let (handle, _ui) = handle_for(&socket, session("good"));
    let mut events = handle.subscribe();
    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);

    handle.disconnect();
    assert_eq!(handle.status(), ConnectionStatus::Disconnected);
    assert!(matches!(
        handle.emit(OutboundEvent::LeaveStreamRoom { stream_id: "1".to_owned() }),
        Err(ClientError::NotConnected)
    ));
    assert!(handle.is_closed());
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::Disconnect { reason: "client disconnect".to_owned() }
    );

    handle.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(socket.accepts(), 1);
    assert_eq!(handle.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn dropping_last_handle_cancels() {
    let socket = FakeSocket::start(Mode::Accept).await;
    let (handle, _ui) = handle_for(&socket, session("good"));
    let mut status = handle.status_changes();
    let mut events = handle.subscribe();
    handle.connect();
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);

    drop(handle);
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Disconnected))
        .await
        .unwrap()
        .unwrap();
}
