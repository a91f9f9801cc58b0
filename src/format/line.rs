//! Line codec: renders a tag, payload and encryption flag into one
//! self-delimiting log line, and parses it back.
//!
//! Layout (columns separated by `|`):
//!
//! ```text
//! <rfc3339 utc millis>|<tag>|<flag 0/1>|<kind s/l>|<body>
//! ```
//!
//! For a list payload (`kind = l`) the body joins fields with `,`. Every
//! column and field is escaped so neither separator nor a line break can
//! appear raw: `\` → `\\`, `|` → `\p`, `,` → `\c`, LF → `\n`, CR → `\r`.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::core::errors::{DlgError, Result};

/// Column separator.
pub const COLUMN_SEPARATOR: char = '|';
/// Separator between the fields of a list payload.
pub const FIELD_SEPARATOR: char = ',';

const KIND_SINGLE: &str = "s";
const KIND_LIST: &str = "l";

/// Payload of one log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Single(String),
    Fields(Vec<String>),
}

impl Payload {
    /// An empty message or a list with no fields carries nothing to record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(msg) => msg.is_empty(),
            Self::Fields(fields) => fields.is_empty(),
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for Payload {
    fn from(value: Vec<String>) -> Self {
        Self::Fields(value)
    }
}

/// A line parsed back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub timestamp: DateTime<Utc>,
    pub tag: String,
    pub payload: Payload,
    pub encrypted: bool,
}

/// Clock used to stamp lines.
pub type Clock = fn() -> DateTime<Utc>;

/// Pure line renderer. The only input besides the arguments is the clock.
#[derive(Debug, Clone, Copy)]
pub struct LogFormatter {
    clock: Clock,
}

impl Default for LogFormatter {
    fn default() -> Self {
        Self { clock: Utc::now }
    }
}

impl LogFormatter {
    /// Formatter stamping lines with a caller-supplied clock.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    /// Render one line (without trailing newline).
    ///
    /// Callers reject empty tags and payloads before formatting.
    #[must_use]
    pub fn format(&self, tag: &str, payload: &Payload, encrypt: bool) -> String {
        let ts = (self.clock)().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut line = String::with_capacity(ts.len() + tag.len() + 32);
        line.push_str(&ts);
        line.push(COLUMN_SEPARATOR);
        escape_into(&mut line, tag);
        line.push(COLUMN_SEPARATOR);
        line.push(if encrypt { '1' } else { '0' });
        line.push(COLUMN_SEPARATOR);
        match payload {
            Payload::Single(msg) => {
                line.push_str(KIND_SINGLE);
                line.push(COLUMN_SEPARATOR);
                escape_into(&mut line, msg);
            }
            Payload::Fields(fields) => {
                line.push_str(KIND_LIST);
                line.push(COLUMN_SEPARATOR);
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        line.push(FIELD_SEPARATOR);
                    }
                    escape_into(&mut line, field);
                }
            }
        }
        line
    }
}

/// Parse a line produced by [`LogFormatter::format`].
pub fn parse_line(line: &str) -> Result<ParsedLine> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut columns = line.splitn(5, COLUMN_SEPARATOR);
    let (Some(ts), Some(tag), Some(flag), Some(kind), Some(body)) = (
        columns.next(),
        columns.next(),
        columns.next(),
        columns.next(),
        columns.next(),
    ) else {
        return Err(malformed("expected 5 columns", line));
    };

    let timestamp = DateTime::parse_from_rfc3339(ts)
        .map_err(|e| malformed(&format!("bad timestamp: {e}"), line))?
        .with_timezone(&Utc);
    let encrypted = match flag {
        "0" => false,
        "1" => true,
        _ => return Err(malformed("bad encryption flag", line)),
    };
    let payload = match kind {
        KIND_SINGLE => Payload::Single(unescape(body)?),
        KIND_LIST => Payload::Fields(
            body.split(FIELD_SEPARATOR)
                .map(unescape)
                .collect::<Result<Vec<_>>>()?,
        ),
        _ => return Err(malformed("bad payload kind", line)),
    };

    Ok(ParsedLine {
        timestamp,
        tag: unescape(tag)?,
        payload,
        encrypted,
    })
}

fn malformed(reason: &str, line: &str) -> DlgError {
    DlgError::Serialization {
        context: "log line",
        details: format!("{reason}: {line:?}"),
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            COLUMN_SEPARATOR => out.push_str("\\p"),
            FIELD_SEPARATOR => out.push_str("\\c"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

fn unescape(escaped: &str) -> Result<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('p') => out.push(COLUMN_SEPARATOR),
            Some('c') => out.push(FIELD_SEPARATOR),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            other => {
                return Err(DlgError::Serialization {
                    context: "log line",
                    details: format!("invalid escape \\{other:?} in {escaped:?}"),
                });
            }
        }
    }
    Ok(out)
}
