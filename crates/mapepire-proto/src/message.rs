//! Request message types.

use serde::{Deserialize, Serialize};

/// Identifier used by the connect request.
pub const CONNECT_ID: &str = "connecting";

/// Default identifier for SQL requests.
pub const DEFAULT_QUERY_ID: &str = "Q1";

/// Default identifier for CL command requests.
pub const DEFAULT_COMMAND_ID: &str = "cmd1";

/// Default identifier for ping requests.
pub const DEFAULT_PING_ID: &str = "ping1";

/// A request from client to server.
///
/// Serializes to a flat JSON object, e.g.
/// `{"id":"Q1","type":"sql","sql":"SELECT 1 FROM SYSIBM.SYSDUMMY1"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Identifier echoed back by the server for correlation.
    pub id: String,
    /// The operation to perform.
    #[serde(flatten)]
    pub operation: Operation,
}

/// Operations that can be requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    /// Open the database side of the session.
    Connect {
        /// How the server reaches the database.
        technique: Technique,
    },
    /// Execute an SQL statement.
    Sql {
        /// Statement text.
        sql: String,
    },
    /// Execute a CL command.
    Cl {
        /// Command text.
        cmd: String,
    },
    /// Liveness probe.
    Ping,
}

/// Database connection technique requested at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technique {
    /// Direct TCP connection from the server to the database.
    Tcp,
}

/// Operation kind, used to select how a response is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Connect,
    Sql,
    Cl,
    Ping,
}

impl OperationKind {
    /// Wire name of the kind (the `type` field).
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Connect => "connect",
            OperationKind::Sql => "sql",
            OperationKind::Cl => "cl",
            OperationKind::Ping => "ping",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    /// Get the kind of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Connect { .. } => OperationKind::Connect,
            Operation::Sql { .. } => OperationKind::Sql,
            Operation::Cl { .. } => OperationKind::Cl,
            Operation::Ping => OperationKind::Ping,
        }
    }
}

impl Request {
    /// Create the fixed connect request.
    pub fn connect() -> Self {
        Self {
            id: CONNECT_ID.to_string(),
            operation: Operation::Connect {
                technique: Technique::Tcp,
            },
        }
    }

    /// Create an SQL request.
    pub fn sql(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation: Operation::Sql { sql: sql.into() },
        }
    }

    /// Create a CL command request.
    pub fn cl(id: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation: Operation::Cl { cmd: cmd.into() },
        }
    }

    /// Create a ping request.
    pub fn ping(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation: Operation::Ping,
        }
    }

    /// Get the kind of this request.
    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }
}
