//! Client configuration.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub use mapepire_proto::framing::DEFAULT_MAX_FRAME_SIZE;
pub use mapepire_proto::DEFAULT_PORT;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect (handshake) timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Username and password sent with the WebSocket handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User profile.
    pub user: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Value of the `Authorization` header: `Basic base64(user:password)`.
    ///
    /// The encoding only makes the pair header-safe; secrecy comes from the
    /// transport when a secure connection is used.
    pub fn authorization_header(&self) -> String {
        let pair = format!("{}:{}", self.user, self.password);
        format!("Basic {}", STANDARD.encode(pair.as_bytes()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Use `wss://` (true) or `ws://` (false).
    pub secure: bool,

    /// Credentials for the handshake.
    pub credentials: Credentials,

    /// Time allowed for a response to arrive.
    pub request_timeout: Duration,

    /// Time allowed for the WebSocket handshake.
    pub connect_timeout: Duration,

    /// Receive capacity in bytes; longer responses are truncated.
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Create a new configuration for the given server and user.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            secure: true,
            credentials: Credentials::new(user, password),
            request_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Choose between `wss://` and `ws://`.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the receive capacity.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Build the connection URL.
    pub fn connection_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}{}",
            scheme,
            self.host,
            self.port,
            mapepire_proto::ENDPOINT_PATH
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::new("ibmi.example.com", "QUSER", "secret");
        assert_eq!(config.port, 8076);
        assert!(config.secure);
        assert_eq!(config.request_timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.max_frame_size, 512 * 1024);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("10.0.0.5", "u", "p")
            .with_port(9000)
            .with_secure(false)
            .with_request_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(2))
            .with_max_frame_size(1024);

        assert_eq!(config.port, 9000);
        assert!(!config.secure);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.max_frame_size, 1024);
    }

    #[test]
    fn test_connection_url() {
        let config = ClientConfig::new("x", "u", "p");
        assert_eq!(config.connection_url(), "wss://x:8076/db");

        let config = config.with_secure(false).with_port(8080);
        assert_eq!(config.connection_url(), "ws://x:8080/db");
    }

    #[test]
    fn test_authorization_header() {
        let credentials = Credentials::new("u", "p");
        assert_eq!(credentials.authorization_header(), "Basic dTpw");

        let credentials = Credentials::new("QSECOFR", "pass:word");
        assert_eq!(
            credentials.authorization_header(),
            "Basic UVNFQ09GUjpwYXNzOndvcmQ="
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ClientConfig::new("x", "u", "hunter2");
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }
}
