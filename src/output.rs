//! Output formatting for delivered messages
//!
//! Three encodings, selected once at startup with `-o`. Each message is
//! rendered to a single buffer and written to stdout in one call, so a
//! message's output is never interleaved or torn by termination.

use std::io::{self, Write};

use serde_json::Value;

/// Output format name registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Recursive human-readable rendering (default)
    StructuredDump,
    /// Indented JSON
    PrettyJson,
    /// Single-line JSON, no extraneous whitespace
    CompactJson,
}

impl Format {
    /// Parse a `-o` value. Unknown names are a startup error, not a
    /// fallback.
    pub fn parse(name: &str) -> Option<Format> {
        match name {
            "structured-dump" => Some(Format::StructuredDump),
            "pretty-json" => Some(Format::PrettyJson),
            "compact-json" => Some(Format::CompactJson),
            _ => None,
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::StructuredDump
    }
}

/// Writes delivered messages to stdout in the selected format.
#[derive(Debug)]
pub struct Formatter {
    format: Format,
}

impl Formatter {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    /// Render a message to its final text, without the trailing newline.
    pub fn render(&self, msg: &Value) -> serde_json::Result<String> {
        Ok(match self.format {
            Format::StructuredDump => dump(msg),
            Format::PrettyJson => serde_json::to_string_pretty(msg)?,
            Format::CompactJson => serde_json::to_string(msg)?,
        })
    }

    /// Print one message to stdout as a single atomic write. A write error
    /// (closed pipe, full disk) is returned so the session can stop
    /// consuming instead of spinning against a dead output.
    pub fn print(&self, msg: &Value) -> io::Result<()> {
        let mut out = io::stdout().lock();
        self.print_to(msg, &mut out)
    }

    fn print_to<W: Write>(&self, msg: &Value, out: &mut W) -> io::Result<()> {
        let mut text = match self.render(msg) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize message");
                return Ok(());
            }
        };
        text.push('\n');
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

/// Recursive single-line dump: unquoted identifier-like keys, single-quoted
/// strings, arbitrary nesting depth.
fn dump(value: &Value) -> String {
    let mut out = String::new();
    dump_into(value, &mut out);
    out
}

fn dump_into(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => push_quoted(s, out),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[ ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                dump_into(item, out);
            }
            out.push_str(" ]");
        }
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            for (i, (key, val)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if is_plain_key(key) {
                    out.push_str(key);
                } else {
                    push_quoted(key, out);
                }
                out.push_str(": ");
                dump_into(val, out);
            }
            out.push_str(" }");
        }
    }
}

fn push_quoted(s: &str, out: &mut String) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
}

/// Keys that read as identifiers are printed bare.
fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[path = "output_test.rs"]
mod output_test;
