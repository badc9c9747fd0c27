//! REPL dot-command handling.

use crate::executor::Statement;
use crate::formatter::OutputFormat;
use mapepire_client::Client;

/// Result of executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Exit the REPL.
    Exit,
    /// Output to display.
    Output(String),
    /// Change the output format.
    SetFormat(OutputFormat),
    /// Reconnect, optionally to a different host.
    Connect(Option<String>),
    /// Disconnect from server.
    Disconnect,
    /// Send a statement to the server.
    Execute(Statement),
    /// Show history.
    ShowHistory,
    /// Clear screen.
    Clear,
}

/// Parse and execute a dot-command.
pub fn handle_command(line: &str, client: &Client, format: OutputFormat) -> CommandResult {
    let line = line.trim();
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command.to_lowercase(), Some(rest.trim())),
        None => (line.to_lowercase(), None),
    };
    let arg = arg.filter(|a| !a.is_empty());

    match command.as_str() {
        ".exit" | ".quit" | ".q" => CommandResult::Exit,

        ".help" | ".h" | ".?" => CommandResult::Output(get_help()),

        ".clear" | ".cls" => CommandResult::Clear,

        ".status" => CommandResult::Output(status(client)),

        ".connect" => CommandResult::Connect(arg.map(str::to_string)),

        ".disconnect" => CommandResult::Disconnect,

        ".ping" => CommandResult::Execute(Statement::Ping),

        ".cl" => match arg {
            Some(cmd) => CommandResult::Execute(Statement::Cl(cmd.to_string())),
            None => CommandResult::Output("Usage: .cl <command>".to_string()),
        },

        ".format" => match arg {
            Some(fmt) => match fmt.parse() {
                Ok(format) => CommandResult::SetFormat(format),
                Err(message) => CommandResult::Output(message),
            },
            None => CommandResult::Output(format!("Current format: {}", format)),
        },

        ".history" => CommandResult::ShowHistory,

        _ => CommandResult::Output(format!("Unknown command: {}", command)),
    }
}

/// Check if a line is a dot-command.
pub fn is_command(line: &str) -> bool {
    line.trim().starts_with('.')
}

fn status(client: &Client) -> String {
    let mut status = if client.is_connected() {
        format!("Connected to {}", client.connection_url())
    } else {
        "Not connected".to_string()
    };

    let last_error = client.last_error();
    if !last_error.is_empty() {
        status.push_str(&format!("\nLast error: {}", last_error));
    }
    status
}

/// Get help text for REPL commands.
fn get_help() -> String {
    r#"REPL Commands
=============

.connect [host]       Reconnect, optionally to another host
.disconnect           Disconnect from the current server
.status               Show connection status and the last error
.ping                 Check server and database liveness
.cl <command>         Run a CL command
.format [type]        Get or set output format (table, json, raw)
.history              Show statement history
.clear                Clear the screen
.help                 Show this help message
.exit / .quit         Exit the REPL

Any other input is sent to the server as SQL. Lines starting with CL:
are sent as CL commands.

Examples:
  SELECT * FROM QSYS2.SYSTABLES FETCH FIRST 5 ROWS ONLY
  CL: CRTLIB MYLIB
"#
    .to_string()
}
