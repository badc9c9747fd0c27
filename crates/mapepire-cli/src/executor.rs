//! Statement execution.

use crate::formatter::Formatter;
use mapepire_client::{Client, ClientConfig, ErrorKind};
use thiserror::Error;

/// Prefix marking a script or REPL line as a CL command.
const CL_PREFIX: &str = "CL:";

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The connect operation failed.
    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    /// Not connected to server.
    #[error("not connected to server")]
    NotConnected,

    /// The operation failed; carries the client's last error.
    #[error("{0}")]
    Operation(String),
}

/// A unit of work sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// SQL statement.
    Sql(String),
    /// CL command.
    Cl(String),
    /// Liveness probe.
    Ping,
}

impl Statement {
    /// Parse one input line.
    ///
    /// Returns `None` for blank lines and `--` or `#` comments. Lines
    /// starting with `CL:` are commands; anything else is SQL with a
    /// trailing semicolon removed.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") || line.starts_with('#') {
            return None;
        }

        let is_cl = line
            .get(..CL_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CL_PREFIX));
        if is_cl {
            let cmd = line[CL_PREFIX.len()..].trim();
            return (!cmd.is_empty()).then(|| Statement::Cl(cmd.to_string()));
        }

        let sql = line.trim_end_matches(';').trim_end();
        (!sql.is_empty()).then(|| Statement::Sql(sql.to_string()))
    }
}

/// Open the session described by `config`.
pub async fn connect(client: &Client, config: &ClientConfig) -> Result<(), ExecuteError> {
    if client.connect(config.clone()).await {
        tracing::info!(url = %client.connection_url(), "connected");
        Ok(())
    } else {
        Err(ExecuteError::Connect {
            url: config.connection_url(),
            message: client.last_error(),
        })
    }
}

/// Execute a statement and return formatted output.
pub async fn execute(
    client: &Client,
    statement: &Statement,
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    match statement {
        Statement::Sql(sql) => {
            if client.run_query(sql).await {
                Ok(formatter.format_query(&client.query_results()))
            } else {
                Err(failure(client))
            }
        }
        Statement::Cl(cmd) => {
            if client.run_command(cmd).await {
                Ok(formatter.format_command(&client.command_results()))
            } else {
                Err(failure(client))
            }
        }
        Statement::Ping => {
            if client.ping().await {
                Ok(formatter.format_ping(&client.last_ping()))
            } else {
                Err(failure(client))
            }
        }
    }
}

/// Execute a statement, cancelling the pending request on Ctrl-C.
pub async fn execute_interruptible(
    client: &Client,
    statement: &Statement,
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    let execution = execute(client, statement, formatter);
    tokio::pin!(execution);

    tokio::select! {
        result = &mut execution => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, cancelling request");
            client.cancel();
            execution.await
        }
    }
}

fn failure(client: &Client) -> ExecuteError {
    match client.last_error_kind() {
        Some(ErrorKind::NotConnected) => ExecuteError::NotConnected,
        _ => ExecuteError::Operation(client.last_error()),
    }
}
