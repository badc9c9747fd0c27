//! Integration tests for the session client against an in-process server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use mapepire_client::{Client, ClientConfig, ErrorKind, OperationResult, PingResult};

const CONNECT_OK: &str = r#"{"id":"connecting","success":true}"#;

/// What the server does with a request.
enum Reply {
    Send(String),
    Silent,
    Close,
}

type ReplyFn = dyn Fn(&Value) -> Reply + Send + Sync;

struct Shared {
    reply: Box<ReplyFn>,
    reject_handshake: bool,
    delay: Duration,
    authorization: std::sync::Mutex<Option<String>>,
    frames: mpsc::UnboundedSender<String>,
}

/// A WebSocket server that answers each text frame through a reply function.
struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    frames: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MockServer {
    async fn start<F>(reply: F) -> Self
    where
        F: Fn(&Value) -> Reply + Send + Sync + 'static,
    {
        Self::start_with(reply, false, Duration::ZERO).await
    }

    async fn start_with<F>(reply: F, reject_handshake: bool, delay: Duration) -> Self
    where
        F: Fn(&Value) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            reply: Box::new(reply),
            reject_handshake,
            delay,
            authorization: std::sync::Mutex::new(None),
            frames: tx,
        });

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, accept_shared.clone()));
            }
        });

        Self {
            addr,
            shared,
            frames: Mutex::new(rx),
        }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", "u", "p")
            .with_port(self.addr.port())
            .with_secure(false)
            .with_request_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(5))
    }

    async fn next_frame(&self) -> String {
        let mut frames = self.frames.lock().await;
        tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .expect("no frame received")
            .expect("server stopped")
    }

    fn authorization(&self) -> Option<String> {
        self.shared.authorization.lock().unwrap().clone()
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let callback_shared = shared.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *callback_shared.authorization.lock().unwrap() = header;

        if callback_shared.reject_handshake {
            let mut rejection = ErrorResponse::new(Some("unauthorized".to_string()));
            *rejection.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(rejection);
        }
        Ok(response)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        let request: Value = serde_json::from_str(text.trim_end()).unwrap_or(Value::Null);
        let _ = shared.frames.send(text);

        if !shared.delay.is_zero() {
            tokio::time::sleep(shared.delay).await;
        }

        match (shared.reply)(&request) {
            Reply::Send(body) => {
                if ws.send(Message::Text(body)).await.is_err() {
                    break;
                }
            }
            Reply::Silent => {}
            Reply::Close => {
                let _ = ws.close(None).await;
                break;
            }
        }
    }
}

/// Accept the connect request, answer everything else with `body`.
fn connect_then(body: &'static str) -> impl Fn(&Value) -> Reply + Send + Sync + 'static {
    move |request: &Value| {
        if request["type"] == "connect" {
            Reply::Send(CONNECT_OK.to_string())
        } else {
            Reply::Send(body.to_string())
        }
    }
}

/// Echo the request id back with success.
fn echo_ids(request: &Value) -> Reply {
    Reply::Send(json!({"id": request["id"], "success": true}).to_string())
}

#[tokio::test]
async fn test_connect_success() {
    let server = MockServer::start(|_| Reply::Send(r#"{"success":true}"#.to_string())).await;
    let client = Client::new();

    assert!(client.connect(server.config()).await);
    assert!(client.is_connected());
    assert_eq!(client.last_error(), "");
    assert_eq!(client.last_error_kind(), None);
    assert_eq!(client.connect_results(), r#"{"success":true}"#);
    assert_eq!(
        client.connection_url(),
        format!("ws://127.0.0.1:{}/db", server.addr.port())
    );

    let frame = server.next_frame().await;
    assert_eq!(frame, "{\"id\":\"connecting\",\"type\":\"connect\",\"technique\":\"tcp\"}\n");
    assert_eq!(server.authorization().as_deref(), Some("Basic dTpw"));
}

#[tokio::test]
async fn test_connect_when_already_connected() {
    let server = MockServer::start(echo_ids).await;
    let client = Client::new();

    assert!(client.connect(server.config()).await);
    assert!(client.connect(server.config()).await);
    assert!(client.is_connected());
    assert_eq!(client.last_error_kind(), Some(ErrorKind::AlreadyConnected));
    assert!(client.last_error().contains("already connected"));
    // The existing session keeps its handshake result.
    assert_eq!(
        client.connect_results(),
        r#"{"id":"connecting","success":true}"#
    );
}

#[tokio::test]
async fn test_handshake_rejected() {
    let server = MockServer::start_with(echo_ids, true, Duration::ZERO).await;
    let client = Client::new();

    assert!(!client.connect(server.config()).await);
    assert!(!client.is_connected());
    assert_eq!(client.last_error_kind(), Some(ErrorKind::Transport));
    assert!(!client.last_error().is_empty());
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::new();
    let config = ClientConfig::new("127.0.0.1", "u", "p")
        .with_port(port)
        .with_secure(false);

    assert!(!client.connect(config).await);
    assert!(!client.is_connected());
    assert_eq!(client.last_error_kind(), Some(ErrorKind::Transport));
    assert_eq!(client.connection_url(), format!("ws://127.0.0.1:{}/db", port));
}

#[tokio::test]
async fn test_connect_refused_by_server() {
    let body = r#"{"id":"connecting","success":false,"error":"invalid credentials"}"#;
    let server = MockServer::start(move |_| Reply::Send(body.to_string())).await;
    let client = Client::new();

    assert!(!client.connect(server.config()).await);
    assert!(!client.is_connected());
    assert_eq!(client.last_error_kind(), Some(ErrorKind::ServerReported));
    assert!(client.last_error().contains("invalid credentials"));
    assert_eq!(client.connect_results(), body);
}

#[tokio::test]
async fn test_connect_reply_malformed() {
    let server = MockServer::start(|_| Reply::Send("not json".to_string())).await;
    let client = Client::new();

    assert!(!client.connect(server.config()).await);
    assert!(!client.is_connected());
    assert_eq!(client.last_error_kind(), Some(ErrorKind::MalformedResponse));
    assert_eq!(client.connect_results(), "not json");

    // The rejected socket was closed; the next operation finds no session.
    assert!(!client.ping().await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::NotConnected));
}

#[tokio::test]
async fn test_secure_connect_to_plain_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        // Drop every socket before any TLS bytes are answered.
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let client = Client::new();
    let config = ClientConfig::new("127.0.0.1", "u", "p")
        .with_port(port)
        .with_connect_timeout(Duration::from_secs(5));
    assert!(config.secure);

    assert!(!client.connect(config).await);
    assert!(!client.is_connected());
    assert_eq!(client.last_error_kind(), Some(ErrorKind::Transport));
    assert_eq!(client.connection_url(), format!("wss://127.0.0.1:{}/db", port));
}

#[tokio::test]
async fn test_cancel_during_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        // Hold sockets open without ever answering the upgrade request.
        while let Ok((stream, _)) = listener.accept().await {
            let _ = accepted_tx.send(stream);
        }
    });

    let client = Arc::new(Client::new());
    let config = ClientConfig::new("127.0.0.1", "u", "p")
        .with_port(port)
        .with_secure(false)
        .with_connect_timeout(Duration::from_secs(30));

    let task = tokio::spawn({
        let client = client.clone();
        async move { client.connect(config).await }
    });

    let _held = accepted_rx.recv().await.unwrap();
    client.cancel();

    let connected = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("connect did not observe cancellation")
        .unwrap();
    assert!(!connected);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::Cancelled));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_run_query() {
    let body = r#"{"id":"Q1","success":true,"data":[{"00001":1}]}"#;
    let server = MockServer::start(connect_then(body)).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(client.run_query("SELECT 1 FROM SYSIBM.SYSDUMMY1").await);
    assert!(client.query_success());
    assert_eq!(client.query_results(), body);
    assert_eq!(client.last_error(), "");

    server.next_frame().await;
    let frame = server.next_frame().await;
    assert_eq!(
        frame,
        "{\"id\":\"Q1\",\"type\":\"sql\",\"sql\":\"SELECT 1 FROM SYSIBM.SYSDUMMY1\"}\n"
    );
}

#[tokio::test]
async fn test_run_query_with_custom_id() {
    let server = MockServer::start(echo_ids).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(client.run_query_with_id("VALUES 1", "tables-7").await);
    assert_eq!(client.query_results(), r#"{"id":"tables-7","success":true}"#);
}

#[tokio::test]
async fn test_run_command_failure() {
    let body = r#"{"success":false,"error":"not authorized"}"#;
    let server = MockServer::start(connect_then(body)).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(!client.run_command("CRTLIB MYLIB").await);
    assert!(!client.command_success());
    assert_eq!(client.command_results(), body);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::ServerReported));
    assert_eq!(client.last_error(), "server reported failure: not authorized");
    // A server-side failure leaves the session usable.
    assert!(client.is_connected());

    server.next_frame().await;
    let frame: Value = serde_json::from_str(&server.next_frame().await).unwrap();
    assert_eq!(frame, json!({"id": "cmd1", "type": "cl", "cmd": "CRTLIB MYLIB"}));
}

#[tokio::test]
async fn test_ping() {
    let body = r#"{"success":true,"alive":true,"db_alive":false}"#;
    let server = MockServer::start(connect_then(body)).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(client.ping().await);
    assert!(client.ping_success());
    assert!(client.ping_alive());
    assert!(!client.ping_db_alive());
    assert_eq!(client.ping_results(), body);

    server.next_frame().await;
    assert_eq!(server.next_frame().await, "{\"id\":\"ping1\",\"type\":\"ping\"}\n");
}

#[tokio::test]
async fn test_ping_flags_without_success() {
    let body = r#"{"success":false,"alive":true,"db_alive":true}"#;
    let server = MockServer::start(connect_then(body)).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(!client.ping().await);
    assert_eq!(
        client.last_ping(),
        PingResult {
            body: body.to_string(),
            success: false,
            alive: true,
            db_alive: true,
        }
    );
}

#[tokio::test]
async fn test_disconnect_clears_results() {
    let server = MockServer::start(|request| {
        let mut body = json!({"id": request["id"], "success": true});
        if request["type"] == "ping" {
            body["alive"] = json!(true);
            body["db_alive"] = json!(true);
        }
        Reply::Send(body.to_string())
    })
    .await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(client.run_query("VALUES 1").await);
    assert!(client.run_command("DSPLIBL").await);
    assert!(client.ping().await);
    assert!(client.ping_alive());

    assert!(client.disconnect().await);
    assert!(!client.is_connected());
    assert_eq!(client.last_error(), "");
    assert_eq!(client.connect_results(), "");
    assert_eq!(client.last_query(), OperationResult::default());
    assert_eq!(client.last_command(), OperationResult::default());
    assert_eq!(client.last_ping(), PingResult::default());

    // A second disconnect fails and leaves the state alone.
    assert!(!client.disconnect().await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::NotConnected));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_operations_after_disconnect() {
    let server = MockServer::start(echo_ids).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);
    assert!(client.disconnect().await);

    assert!(!client.run_query("VALUES 1").await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::NotConnected));
    assert_eq!(client.query_results(), "");
    assert!(!client.query_success());

    assert!(!client.run_command("DSPLIBL").await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::NotConnected));
    assert_eq!(client.command_results(), "");
}

#[tokio::test]
async fn test_results_do_not_cross_epochs() {
    let server = MockServer::start(echo_ids).await;
    let client = Client::new();

    assert!(client.connect(server.config()).await);
    assert!(client.run_query("VALUES 1").await);
    assert!(client.disconnect().await);

    assert!(client.connect(server.config()).await);
    assert_eq!(client.query_results(), "");
    assert!(!client.query_success());
    assert_eq!(
        client.connect_results(),
        r#"{"id":"connecting","success":true}"#
    );
}

#[tokio::test]
async fn test_malformed_response() {
    let server = MockServer::start(connect_then("this is not json")).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(!client.run_query("VALUES 1").await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::MalformedResponse));
    assert!(!client.query_success());
    // The raw body stays available for diagnostics.
    assert_eq!(client.query_results(), "this is not json");
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_id_mismatch_ends_session() {
    let server = MockServer::start(connect_then(r#"{"id":"other","success":true}"#)).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(!client.run_query("VALUES 1").await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::Protocol));
    assert!(client.last_error().contains("mismatch"));
    assert!(!client.is_connected());
    assert_eq!(client.query_results(), "");
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start(|request| {
        if request["type"] == "connect" {
            Reply::Send(CONNECT_OK.to_string())
        } else {
            Reply::Silent
        }
    })
    .await;
    let client = Client::new();
    let config = server
        .config()
        .with_request_timeout(Duration::from_millis(200));
    assert!(client.connect(config).await);

    assert!(!client.run_query("VALUES 1").await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::Timeout));
    assert!(!client.is_connected());
    assert_eq!(client.connect_results(), "");
}

#[tokio::test]
async fn test_cancel_pending_request() {
    let server = MockServer::start(|request| {
        if request["type"] == "connect" {
            Reply::Send(CONNECT_OK.to_string())
        } else {
            Reply::Silent
        }
    })
    .await;
    let client = Arc::new(Client::new());
    assert!(client.connect(server.config()).await);
    server.next_frame().await;

    let task = tokio::spawn({
        let client = client.clone();
        async move { client.run_query("SELECT * FROM QSYS2.SYSTABLES").await }
    });

    // Once the server holds the frame, the client is waiting for the reply.
    server.next_frame().await;
    client.cancel();

    assert!(!task.await.unwrap());
    assert_eq!(client.last_error_kind(), Some(ErrorKind::Cancelled));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_abandoned_request_ends_session() {
    let server = MockServer::start(|request| {
        if request["type"] == "connect" {
            Reply::Send(CONNECT_OK.to_string())
        } else {
            Reply::Silent
        }
    })
    .await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    let pending = tokio::time::timeout(Duration::from_millis(200), client.run_query("VALUES 1"));
    assert!(pending.await.is_err());

    assert!(!client.is_connected());
    assert_eq!(client.query_results(), "");
    assert_eq!(client.connect_results(), "");

    // Connect replaces the abandoned connection instead of reusing it.
    assert!(client.connect(server.config()).await);
    assert!(client.is_connected());
    assert_eq!(client.last_error_kind(), None);
}

#[tokio::test]
async fn test_last_error_follows_latest_operation() {
    let server = MockServer::start_with(
        |request| {
            let body = match request["type"].as_str() {
                Some("connect") => CONNECT_OK.to_string(),
                Some("ping") => json!({
                    "id": request["id"],
                    "success": true,
                    "alive": true,
                    "db_alive": true,
                })
                .to_string(),
                _ => json!({"id": request["id"], "success": false, "error": "boom"}).to_string(),
            };
            Reply::Send(body)
        },
        false,
        Duration::from_millis(300),
    )
    .await;
    let client = Arc::new(Client::new());
    assert!(client.connect(server.config()).await);
    server.next_frame().await;

    let query = tokio::spawn({
        let client = client.clone();
        async move { client.run_query("SELECT * FROM QSYS2.SYSTABLES").await }
    });
    // The query is in flight; the ping queues behind it.
    server.next_frame().await;

    let ping = tokio::spawn({
        let client = client.clone();
        async move { client.ping().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!query.await.unwrap());
    assert!(ping.await.unwrap());

    assert_eq!(client.last_error(), "");
    assert_eq!(client.last_error_kind(), None);
    assert!(client.ping_alive());
    // The failed query keeps its own cached body.
    assert!(!client.query_success());
    assert!(client.query_results().contains("boom"));
}

#[tokio::test]
async fn test_cancel_without_pending_request() {
    let server = MockServer::start(echo_ids).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    client.cancel();
    assert!(client.ping().await);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_server_closes_connection() {
    let server = MockServer::start(|request| {
        if request["type"] == "connect" {
            Reply::Send(CONNECT_OK.to_string())
        } else {
            Reply::Close
        }
    })
    .await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);

    assert!(!client.run_command("PWRDWNSYS").await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::Transport));
    assert!(!client.is_connected());

    // A fresh connect starts a new session.
    assert!(client.connect(server.config()).await);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_oversized_response_is_truncated() {
    let body = json!({
        "id": "Q1",
        "success": true,
        "data": [{"NAME": "x".repeat(200)}],
    })
    .to_string();
    let reply_body = body.clone();
    let server = MockServer::start(move |request| {
        if request["type"] == "connect" {
            Reply::Send(CONNECT_OK.to_string())
        } else {
            Reply::Send(reply_body.clone())
        }
    })
    .await;
    let client = Client::new();
    assert!(client.connect(server.config().with_max_frame_size(64)).await);

    assert!(!client.run_query("SELECT NAME FROM T").await);
    assert_eq!(client.last_error_kind(), Some(ErrorKind::MalformedResponse));
    assert_eq!(client.query_results(), &body[..64]);
}

#[tokio::test]
async fn test_payload_is_escaped() {
    let server = MockServer::start(echo_ids).await;
    let client = Client::new();
    assert!(client.connect(server.config()).await);
    server.next_frame().await;

    let sql = "SELECT * FROM T WHERE NAME = \"O'Neil\"\n AND X = '\\'";
    assert!(client.run_query(sql).await);

    let frame: Value = serde_json::from_str(&server.next_frame().await).unwrap();
    assert_eq!(frame["sql"], sql);
    assert_eq!(frame["type"], "sql");
}

#[tokio::test]
async fn test_concurrent_operations_are_serialized() {
    let server = MockServer::start_with(echo_ids, false, Duration::from_millis(20)).await;
    let client = Arc::new(Client::new());
    assert!(client.connect(server.config()).await);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                client.run_query_with_id("VALUES 1", &format!("Q{}", i)).await
            } else {
                client.ping_with_id(&format!("ping{}", i)).await
            }
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert!(client.is_connected());
}
