//! Tab completion for the REPL.

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;

/// Mapepire REPL helper with completion support.
#[derive(Default)]
pub struct MapepireHelper;

impl MapepireHelper {
    pub fn new() -> Self {
        Self
    }
}

/// Dot-commands for completion.
const DOT_COMMANDS: &[&str] = &[
    ".connect",
    ".disconnect",
    ".status",
    ".ping",
    ".cl",
    ".format",
    ".history",
    ".clear",
    ".help",
    ".exit",
    ".quit",
];

/// Output formats accepted by `.format`.
const FORMATS: &[&str] = &["table", "json", "raw"];

/// SQL keywords.
const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "ORDER", "HAVING", "FETCH", "FIRST", "ROWS",
    "ONLY", "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE", "CREATE", "TABLE", "VIEW",
    "DROP", "ALTER", "JOIN", "LEFT", "INNER", "OUTER", "ON", "AND", "OR", "NOT", "NULL",
    "DISTINCT", "AS", "LIKE", "IN", "IS", "BETWEEN", "CALL", "WITH", "UNION", "LIMIT",
];

impl Completer for MapepireHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_cursor = &line[..pos];
        let trimmed = line_to_cursor.trim_start();

        // Dot commands at start of line
        if trimmed.starts_with('.') {
            if let Some(arg) = trimmed.strip_prefix(".format ") {
                let arg = arg.trim_start();
                return Ok((pos - arg.len(), candidates(FORMATS, arg, false)));
            }
            if !trimmed.contains(char::is_whitespace) {
                let start = line_to_cursor.len() - trimmed.len();
                return Ok((start, candidates(DOT_COMMANDS, trimmed, false)));
            }
            return Ok((pos, Vec::new()));
        }

        let word_start = line_to_cursor
            .rfind(|c: char| c.is_whitespace() || c == '(' || c == ',')
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = &line_to_cursor[word_start..];

        if word.is_empty() {
            return Ok((pos, Vec::new()));
        }

        Ok((word_start, candidates(SQL_KEYWORDS, word, true)))
    }
}

/// Candidates starting with `prefix`, matched case-insensitively for keywords.
fn candidates(words: &[&str], prefix: &str, keep_case: bool) -> Vec<Pair> {
    let lower = prefix.to_lowercase();
    let lowercase_input = keep_case && prefix.chars().all(|c| !c.is_uppercase());

    words
        .iter()
        .filter(|word| word.to_lowercase().starts_with(&lower))
        .map(|word| {
            let replacement = if lowercase_input {
                word.to_lowercase()
            } else {
                word.to_string()
            };
            Pair {
                display: word.to_string(),
                replacement,
            }
        })
        .collect()
}

impl Hinter for MapepireHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for MapepireHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Borrowed(line)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: rustyline::highlight::CmdKind) -> bool {
        false
    }
}

impl Validator for MapepireHelper {}

impl Helper for MapepireHelper {}
