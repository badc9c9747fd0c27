//! Mapepire session client.
//!
//! This module provides the [`Client`] struct: the operation API
//! (connect, disconnect, query, command, ping) plus the state observed by
//! the most recent call of each kind.

use parking_lot::Mutex as StateLock;
use tokio::sync::{Mutex, Notify};

use mapepire_proto::framing::encode_frame;
use mapepire_proto::{
    OperationKind, Request, Response, DEFAULT_COMMAND_ID, DEFAULT_PING_ID, DEFAULT_QUERY_ID,
};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{Error, ErrorKind};

/// Cached outcome of the last query or command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationResult {
    /// Raw response body.
    pub body: String,
    /// Whether the server reported success.
    pub success: bool,
}

/// Cached outcome of the last ping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingResult {
    /// Raw response body.
    pub body: String,
    /// Whether the server reported success.
    pub success: bool,
    /// The server process is responsive.
    pub alive: bool,
    /// The server's database connection is responsive.
    pub db_alive: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    connection_url: String,
    last_error: String,
    last_error_kind: Option<ErrorKind>,
    connect: String,
    query: OperationResult,
    command: OperationResult,
    ping: PingResult,
}

impl SessionState {
    /// Forget everything observed during the current session epoch.
    fn clear_results(&mut self) {
        self.connect.clear();
        self.query = OperationResult::default();
        self.command = OperationResult::default();
        self.ping = PingResult::default();
    }

    fn begin(&mut self) {
        self.last_error.clear();
        self.last_error_kind = None;
    }

    fn record_error(&mut self, error: &Error) {
        self.last_error = error.to_string();
        self.last_error_kind = Some(error.kind());
    }
}

/// A client for a Mapepire database server.
///
/// Every operation reports its outcome as a `bool`; the reason for a
/// `false` is available from [`last_error`](Self::last_error) and
/// [`last_error_kind`](Self::last_error_kind) until the next call.
///
/// Operations may be issued from several tasks at once. They are served one
/// at a time: the connection carries a single request at any moment.
///
/// # Example
///
/// ```ignore
/// use mapepire_client::{Client, ClientConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let client = Client::new();
///
///     let config = ClientConfig::new("ibmi.example.com", "QUSER", "secret");
///     if !client.connect(config).await {
///         eprintln!("connect failed: {}", client.last_error());
///         return;
///     }
///
///     if client.run_query("SELECT * FROM SYSIBM.SYSDUMMY1").await {
///         println!("{}", client.query_results());
///     }
///
///     client.disconnect().await;
/// }
/// ```
pub struct Client {
    connection: Mutex<Option<Connection>>,
    state: StateLock<SessionState>,
    cancel: Notify,
}

impl Client {
    /// Create a disconnected client.
    pub fn new() -> Self {
        Self {
            connection: Mutex::new(None),
            state: StateLock::new(SessionState::default()),
            cancel: Notify::new(),
        }
    }

    /// Connect to a server and open the database session.
    ///
    /// Calling this on a connected client keeps the existing session,
    /// records a note in [`last_error`](Self::last_error), and returns `true`.
    pub async fn connect(&self, config: ClientConfig) -> bool {
        let mut guard = self.connection.lock().await;

        if let Some(connection) = guard.as_ref() {
            if !connection.is_poisoned() {
                let mut state = self.state.lock();
                state.record_error(&Error::AlreadyConnected);
                tracing::warn!(url = %state.connection_url, "connect called on an open session");
                return true;
            }
            tracing::warn!("discarding connection with an abandoned request");
            *guard = None;
        }

        let url = config.connection_url();
        {
            let mut state = self.state.lock();
            state.begin();
            state.clear_results();
            state.connected = false;
            state.connection_url = url.clone();
        }

        tracing::info!(url = %url, user = %config.credentials.user, "connecting");

        match self.open_session(&config).await {
            Ok(connection) => {
                *guard = Some(connection);
                self.state.lock().connected = true;
                tracing::info!(url = %url, "connected");
                true
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "connect failed");
                self.state.lock().record_error(&e);
                false
            }
        }
    }

    /// Close the session.
    ///
    /// Fails with [`ErrorKind::NotConnected`] when no session is open.
    pub async fn disconnect(&self) -> bool {
        let mut guard = self.connection.lock().await;
        self.state.lock().begin();

        let Some(mut connection) = guard.take() else {
            self.state.lock().record_error(&Error::NotConnected);
            return false;
        };

        let closed = connection.close().await;

        let mut state = self.state.lock();
        state.connected = false;
        state.clear_results();

        match closed {
            Ok(()) => {
                tracing::info!(url = %connection.url(), "disconnected");
                true
            }
            Err(e) => {
                tracing::warn!(url = %connection.url(), error = %e, "close handshake failed");
                state.record_error(&e);
                false
            }
        }
    }

    /// Run an SQL statement with the default identifier.
    pub async fn run_query(&self, sql: &str) -> bool {
        self.run_query_with_id(sql, DEFAULT_QUERY_ID).await
    }

    /// Run an SQL statement.
    pub async fn run_query_with_id(&self, sql: &str, id: &str) -> bool {
        self.run_operation(
            Request::sql(id, sql),
            |state| state.query = OperationResult::default(),
            |state, body| state.query.body = body.to_string(),
            |state, outcome| {
                if let Ok(response) = outcome {
                    state.query.success = true;
                    state.query.body = response.raw;
                }
            },
        )
        .await
    }

    /// Run a CL command with the default identifier.
    pub async fn run_command(&self, cmd: &str) -> bool {
        self.run_command_with_id(cmd, DEFAULT_COMMAND_ID).await
    }

    /// Run a CL command.
    pub async fn run_command_with_id(&self, cmd: &str, id: &str) -> bool {
        self.run_operation(
            Request::cl(id, cmd),
            |state| state.command = OperationResult::default(),
            |state, body| state.command.body = body.to_string(),
            |state, outcome| {
                if let Ok(response) = outcome {
                    state.command.success = true;
                    state.command.body = response.raw;
                }
            },
        )
        .await
    }

    /// Ping the server with the default identifier.
    pub async fn ping(&self) -> bool {
        self.ping_with_id(DEFAULT_PING_ID).await
    }

    /// Ping the server.
    ///
    /// Requires an open session, like queries and commands.
    pub async fn ping_with_id(&self, id: &str) -> bool {
        self.run_operation(
            Request::ping(id),
            |state| state.ping = PingResult::default(),
            |state, body| state.ping.body = body.to_string(),
            |state, outcome| match outcome {
                Ok(response) => {
                    state.ping = PingResult {
                        body: response.raw,
                        success: true,
                        alive: response.alive,
                        db_alive: response.db_alive,
                    };
                }
                // Liveness flags are reported even when success is false.
                Err(Some(response)) => {
                    state.ping.alive = response.alive;
                    state.ping.db_alive = response.db_alive;
                }
                Err(None) => {}
            },
        )
        .await
    }

    /// Abort the exchange currently waiting for a response, if any.
    ///
    /// The aborted operation returns `false` with
    /// [`ErrorKind::Cancelled`] and the session is closed, since its
    /// response may still arrive later.
    pub fn cancel(&self) {
        self.cancel.notify_waiters();
    }

    /// Check if a session is open.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// URL used by the last connect attempt.
    pub fn connection_url(&self) -> String {
        self.state.lock().connection_url.clone()
    }

    /// Message describing the outcome of the last operation; empty on success.
    pub fn last_error(&self) -> String {
        self.state.lock().last_error.clone()
    }

    /// Classification of the last operation's failure.
    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        self.state.lock().last_error_kind
    }

    /// Raw body of the connect response.
    pub fn connect_results(&self) -> String {
        self.state.lock().connect.clone()
    }

    /// Raw body of the last query response.
    pub fn query_results(&self) -> String {
        self.state.lock().query.body.clone()
    }

    /// Whether the last query succeeded.
    pub fn query_success(&self) -> bool {
        self.state.lock().query.success
    }

    /// Raw body of the last command response.
    pub fn command_results(&self) -> String {
        self.state.lock().command.body.clone()
    }

    /// Whether the last command succeeded.
    pub fn command_success(&self) -> bool {
        self.state.lock().command.success
    }

    /// Raw body of the last ping response.
    pub fn ping_results(&self) -> String {
        self.state.lock().ping.body.clone()
    }

    /// Whether the last ping succeeded.
    pub fn ping_success(&self) -> bool {
        self.state.lock().ping.success
    }

    /// Whether the last ping reported the server alive.
    pub fn ping_alive(&self) -> bool {
        self.state.lock().ping.alive
    }

    /// Whether the last ping reported the database connection alive.
    pub fn ping_db_alive(&self) -> bool {
        self.state.lock().ping.db_alive
    }

    /// Snapshot of the last query outcome.
    pub fn last_query(&self) -> OperationResult {
        self.state.lock().query.clone()
    }

    /// Snapshot of the last command outcome.
    pub fn last_command(&self) -> OperationResult {
        self.state.lock().command.clone()
    }

    /// Snapshot of the last ping outcome.
    pub fn last_ping(&self) -> PingResult {
        self.state.lock().ping.clone()
    }

    /// Open a connection and send the connect request.
    async fn open_session(&self, config: &ClientConfig) -> Result<Connection, Error> {
        let mut connection = Connection::open(config, &self.cancel).await?;

        let request = Request::connect();
        let raw = self.exchange(&mut connection, &request).await?;
        self.state.lock().connect = raw.clone();

        let checked = Response::decode(&raw, OperationKind::Connect)
            .map_err(Error::from)
            .and_then(|response| {
                response.check_correlation(&request.id)?;
                if response.success {
                    Ok(())
                } else {
                    Err(Error::ServerReported(response.failure_message()))
                }
            });

        if let Err(e) = checked {
            if let Err(close_error) = connection.close().await {
                tracing::debug!(error = %close_error, "close after rejected connect failed");
            }
            return Err(e);
        }

        Ok(connection)
    }

    /// Encode, send, and receive one request on an open connection.
    async fn exchange(&self, connection: &mut Connection, request: &Request) -> Result<String, Error> {
        let frame = encode_frame(request)?;
        tracing::debug!(id = %request.id, kind = %request.kind(), "sending request");
        connection.request(frame, &self.cancel).await
    }

    /// Run a query, command, or ping through the request gate.
    ///
    /// Everything that touches the session state happens while the gate is
    /// held, so the state always reflects the most recent operation to run.
    /// `reset` clears the operation's cached result, `store` caches the raw
    /// body as soon as it arrives (a malformed or failed response stays
    /// available for inspection), and `finish` records the outcome, with the
    /// decoded response of a server-reported failure when there is one.
    async fn run_operation<R, S, F>(&self, request: Request, reset: R, store: S, finish: F) -> bool
    where
        R: FnOnce(&mut SessionState),
        S: FnOnce(&mut SessionState, &str),
        F: FnOnce(&mut SessionState, Result<Response, Option<Response>>),
    {
        let mut guard = self.connection.lock().await;

        {
            let mut state = self.state.lock();
            state.begin();
            reset(&mut state);
        }

        let outcome = self.checked_exchange(&mut guard, &request, store).await;

        let mut state = self.state.lock();
        match outcome {
            Ok(response) => {
                finish(&mut state, Ok(response));
                true
            }
            Err(Failure { error, response }) => {
                state.record_error(&error);
                finish(&mut state, Err(response));
                false
            }
        }
    }

    /// Exchange `request` on the open connection and validate the response.
    async fn checked_exchange<S>(
        &self,
        slot: &mut Option<Connection>,
        request: &Request,
        store: S,
    ) -> Result<Response, Failure>
    where
        S: FnOnce(&mut SessionState, &str),
    {
        let Some(connection) = slot.as_mut() else {
            return Err(Error::NotConnected.into());
        };

        let exchanged = if connection.is_poisoned() {
            Err(Error::Transport(
                "previous request was abandoned before its response arrived".to_string(),
            ))
        } else {
            let mut abandoned = AbandonGuard::new(&self.state);
            let exchanged = self.exchange(connection, request).await;
            abandoned.disarm();
            exchanged
        };

        let raw = match exchanged {
            Ok(raw) => raw,
            Err(e) => {
                self.end_session_on(slot, &e);
                return Err(e.into());
            }
        };

        store(&mut self.state.lock(), &raw);

        let response = Response::decode(&raw, request.kind())?;

        if let Err(e) = response.check_correlation(&request.id) {
            let e = Error::from(e);
            self.end_session_on(slot, &e);
            return Err(e.into());
        }

        if !response.success {
            return Err(Failure {
                error: Error::ServerReported(response.failure_message()),
                response: Some(response),
            });
        }

        Ok(response)
    }

    /// Drop the connection when `error` leaves it unusable.
    fn end_session_on(&self, connection: &mut Option<Connection>, error: &Error) {
        if !error.ends_session() {
            return;
        }

        if let Some(dropped) = connection.take() {
            tracing::warn!(url = %dropped.url(), error = %error, "session ended by failure");
        }

        let mut state = self.state.lock();
        state.connected = false;
        state.clear_results();
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Client")
            .field("connected", &state.connected)
            .field("connection_url", &state.connection_url)
            .field("last_error", &state.last_error)
            .finish()
    }
}

/// Ends the session if dropped while an exchange is still pending.
///
/// The connection itself stays poisoned until the next operation or
/// connect replaces it; this only keeps the observable state honest.
struct AbandonGuard<'a> {
    state: &'a StateLock<SessionState>,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(state: &'a StateLock<SessionState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("request abandoned before its response arrived");
            let mut state = self.state.lock();
            state.connected = false;
            state.clear_results();
        }
    }
}

/// A failed operation, with the decoded response when one arrived.
struct Failure {
    error: Error,
    response: Option<Response>,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            response: None,
        }
    }
}

impl From<mapepire_proto::Error> for Failure {
    fn from(error: mapepire_proto::Error) -> Self {
        Error::from(error).into()
    }
}
