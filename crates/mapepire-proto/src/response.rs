//! Response decoding.
//!
//! Responses are JSON objects that carry at least a boolean `success` field.
//! Ping responses add `alive` and `db_alive`; SQL responses add result rows
//! and metadata; failures usually add `error`, `sql_state` and `sql_rc`.

use serde::Deserialize;
use serde_json::Value;

use crate::message::OperationKind;
use crate::Error;

/// A decoded server response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Identifier echoed by the server, if any.
    pub id: Option<String>,
    /// Whether the server reports the operation as successful.
    pub success: bool,
    /// Ping only: the server process is responsive.
    pub alive: bool,
    /// Ping only: the server's database connection is responsive.
    pub db_alive: bool,
    /// Server-supplied error message.
    pub error: Option<String>,
    /// SQLSTATE reported with a failed statement.
    pub sql_state: Option<String>,
    /// SQL return code reported with a failed statement.
    pub sql_rc: Option<i64>,
    /// Rows affected by an update statement.
    pub update_count: Option<i64>,
    /// Whether all rows of the result set were returned.
    pub is_done: Option<bool>,
    /// Whether the statement produced a result set.
    pub has_results: Option<bool>,
    /// Result rows.
    pub data: Option<Vec<Value>>,
    /// Result set metadata.
    pub metadata: Option<Metadata>,
    /// Body exactly as received.
    pub raw: String,
}

/// Result set metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Metadata {
    /// Number of columns.
    #[serde(default)]
    pub column_count: Option<u32>,
    /// Column descriptions, in select-list order.
    #[serde(default)]
    pub columns: Vec<Column>,
}

/// A result set column description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Database type name.
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    /// Display size.
    #[serde(default)]
    pub display_size: Option<u32>,
    /// Column label.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Deserialize)]
struct Body {
    #[serde(default)]
    id: Option<String>,
    success: bool,
    #[serde(default)]
    alive: bool,
    #[serde(default)]
    db_alive: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    sql_state: Option<String>,
    #[serde(default)]
    sql_rc: Option<i64>,
    #[serde(default)]
    update_count: Option<i64>,
    #[serde(default)]
    is_done: Option<bool>,
    #[serde(default)]
    has_results: Option<bool>,
    #[serde(default)]
    data: Option<Vec<Value>>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl Response {
    /// Decode a response body for an operation of the given kind.
    ///
    /// Fails with [`Error::MalformedResponse`] when the body is not a JSON
    /// object or lacks a boolean `success` field. The liveness flags are
    /// only read for ping responses and default to `false` when absent.
    pub fn decode(raw: &str, kind: OperationKind) -> Result<Self, Error> {
        let body: Body = serde_json::from_str(raw)
            .map_err(|e| Error::MalformedResponse(format!("{} response: {}", kind, e)))?;

        let is_ping = kind == OperationKind::Ping;

        Ok(Self {
            id: body.id,
            success: body.success,
            alive: is_ping && body.alive,
            db_alive: is_ping && body.db_alive,
            error: body.error,
            sql_state: body.sql_state,
            sql_rc: body.sql_rc,
            update_count: body.update_count,
            is_done: body.is_done,
            has_results: body.has_results,
            data: body.data,
            metadata: body.metadata,
            raw: raw.to_string(),
        })
    }

    /// Verify the echoed identifier, if present, matches the request.
    pub fn check_correlation(&self, expected: &str) -> Result<(), Error> {
        match &self.id {
            Some(actual) if actual != expected => Err(Error::IdMismatch {
                expected: expected.to_string(),
                actual: actual.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Describe a failed response for display.
    pub fn failure_message(&self) -> String {
        let mut message = self
            .error
            .clone()
            .unwrap_or_else(|| "server reported failure".to_string());
        if let Some(state) = &self.sql_state {
            message.push_str(&format!(" (SQLSTATE {}", state));
            if let Some(rc) = self.sql_rc {
                message.push_str(&format!(", RC {}", rc));
            }
            message.push(')');
        }
        message
    }

    /// Column names, from metadata when present, otherwise from the first row.
    pub fn column_names(&self) -> Vec<String> {
        if let Some(metadata) = &self.metadata {
            if !metadata.columns.is_empty() {
                return metadata.columns.iter().map(|c| c.name.clone()).collect();
            }
        }

        match self.data.as_ref().and_then(|rows| rows.first()) {
            Some(Value::Object(row)) => row.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}
