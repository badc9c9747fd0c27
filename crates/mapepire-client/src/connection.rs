//! WebSocket connection to a Mapepire server.
//!
//! A [`Connection`] owns one socket and moves whole text frames over it.
//! It has no notion of operations or cached results; that lives in
//! [`Client`](crate::Client).

use std::borrow::Cow;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use mapepire_proto::framing::truncate_frame;

use crate::config::ClientConfig;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake completed, frames can be exchanged.
    Open,
    /// Connection closed.
    Closed,
}

/// A WebSocket connection to a Mapepire server.
pub struct Connection {
    stream: Option<WsStream>,
    url: String,
    request_timeout: Duration,
    max_frame_size: usize,
    in_flight: bool,
}

impl Connection {
    /// Open a connection and perform the authenticated WebSocket handshake.
    ///
    /// The handshake is bounded by the connect timeout and ends early when
    /// `cancel` is notified.
    pub async fn open(config: &ClientConfig, cancel: &Notify) -> Result<Self, Error> {
        let url = config.connection_url();

        if config.secure {
            install_crypto_provider();
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Transport(format!("invalid connection url {}: {}", url, e)))?;
        let authorization = HeaderValue::from_str(&config.credentials.authorization_header())
            .map_err(|e| Error::Transport(format!("invalid authorization header: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, authorization);

        let cancelled = cancel.notified();
        tokio::pin!(cancelled);

        let handshake = tokio::select! {
            result = tokio::time::timeout(config.connect_timeout, connect_async(request)) => {
                result.map_err(|_| Error::Timeout)?
            }
            _ = &mut cancelled => return Err(Error::Cancelled),
        };
        let (stream, response) = handshake
            .map_err(|e| Error::Transport(format!("failed to connect to {}: {}", url, e)))?;

        tracing::debug!(url = %url, status = %response.status(), "websocket handshake complete");

        Ok(Self {
            stream: Some(stream),
            url,
            request_timeout: config.request_timeout,
            max_frame_size: config.max_frame_size,
            in_flight: false,
        })
    }

    /// Write one complete text frame.
    pub async fn send_frame(&mut self, frame: String) -> Result<(), Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        tracing::debug!(bytes = frame.len(), "sending frame");
        stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::Transport(format!("failed to send frame: {}", e)))
    }

    /// Wait for one complete data frame.
    ///
    /// Control frames are skipped. The body is cut to the receive capacity.
    pub async fn receive_frame(&mut self) -> Result<String, Error> {
        let max_frame_size = self.max_frame_size;
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        loop {
            let text = match stream.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(Error::Transport(format!(
                        "connection closed by server: {}",
                        reason
                    )));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(Error::Transport(format!("failed to receive frame: {}", e)))
                }
                None => return Err(Error::Transport("connection closed".to_string())),
            };

            let (kept, truncated) = truncate_frame(&text, max_frame_size);
            if truncated {
                tracing::warn!(
                    received = text.len(),
                    kept = kept.len(),
                    "response exceeds receive capacity, truncated"
                );
                return Ok(kept.to_string());
            }
            tracing::debug!(bytes = text.len(), "received frame");
            return Ok(text);
        }
    }

    /// Send a frame and wait for its response.
    ///
    /// The wait is bounded by the request timeout and ends early when
    /// `cancel` is notified. The connection is marked in flight until the
    /// response arrives, so an exchange whose future is dropped midway
    /// leaves the connection [poisoned](Self::is_poisoned).
    pub async fn request(&mut self, frame: String, cancel: &Notify) -> Result<String, Error> {
        if self.in_flight {
            return Err(Error::Transport(
                "previous request was abandoned before its response arrived".to_string(),
            ));
        }

        let cancelled = cancel.notified();
        tokio::pin!(cancelled);

        let timeout = self.request_timeout;
        self.in_flight = true;

        let exchange = async {
            self.send_frame(frame).await?;
            self.receive_frame().await
        };

        let result = tokio::select! {
            result = tokio::time::timeout(timeout, exchange) => {
                result.unwrap_or(Err(Error::Timeout))
            }
            _ = &mut cancelled => Err(Error::Cancelled),
        };

        if result.is_ok() {
            self.in_flight = false;
        }
        result
    }

    /// Send a normal-closure frame and release the socket.
    pub async fn close(&mut self) -> Result<(), Error> {
        let mut stream = self.stream.take().ok_or(Error::NotConnected)?;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed("Done"),
        };
        stream
            .close(Some(frame))
            .await
            .map_err(|e| Error::Transport(format!("failed to close connection: {}", e)))
    }

    /// Whether an earlier exchange was abandoned before its response arrived.
    pub fn is_poisoned(&self) -> bool {
        self.in_flight
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.stream.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Get the connection URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Make `ring` the process-wide rustls provider unless one is already set.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        // Err means another provider was installed first.
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("request_timeout", &self.request_timeout)
            .field("max_frame_size", &self.max_frame_size)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
