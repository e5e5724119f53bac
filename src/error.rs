//! Error types for zero-pq.

use thiserror::Error;

/// Result type for zero-pq operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error/notice field codes from the PostgreSQL protocol.
pub mod field_code {
    /// Severity (localized)
    pub const SEVERITY: u8 = b'S';
    /// Severity (non-localized, PostgreSQL 9.6+)
    pub const SEVERITY_NON_LOCALIZED: u8 = b'V';
    /// SQLSTATE code
    pub const SQLSTATE: u8 = b'C';
    /// Primary message
    pub const MESSAGE: u8 = b'M';
    /// Detail
    pub const DETAIL: u8 = b'D';
    /// Hint
    pub const HINT: u8 = b'H';
    /// Position in query (1-based, in characters)
    pub const POSITION: u8 = b'P';
    /// Internal position
    pub const INTERNAL_POSITION: u8 = b'p';
    /// Internal query
    pub const INTERNAL_QUERY: u8 = b'q';
    /// Where (context)
    pub const CONTEXT: u8 = b'W';
    /// Source file name
    pub const FILE: u8 = b'F';
    /// Source line number
    pub const LINE: u8 = b'L';
    /// Source routine name
    pub const ROUTINE: u8 = b'R';
}

/// How much of an error/notice is rendered into the composed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Severity, primary message and position only.
    Terse,
    /// Adds DETAIL, HINT and CONTEXT lines.
    #[default]
    Default,
    /// Adds the SQLSTATE code and a LOCATION line.
    Verbose,
}

/// A parsed ErrorResponse/NoticeResponse, or a locally synthesized error.
///
/// Fields are kept in arrival order, keyed by their one-byte code. The
/// composed human-readable message is built once, at parse time, with the
/// connection's verbosity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorRecord {
    fields: Vec<(u8, String)>,
    message: String,
}

impl ErrorRecord {
    /// Create a record from raw fields. The composed message is left empty.
    pub fn from_fields(fields: Vec<(u8, String)>) -> Self {
        Self {
            fields,
            message: String::new(),
        }
    }

    /// Create a record that carries only a composed message, with no server fields.
    ///
    /// Used for errors detected by the client itself.
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            fields: Vec::new(),
            message: message.into(),
        }
    }

    /// Look up a field by its one-byte code.
    ///
    /// If the server sent the same code twice, the last value wins.
    pub fn field(&self, code: u8) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    /// All fields in arrival order.
    pub fn fields(&self) -> &[(u8, String)] {
        &self.fields
    }

    /// Composed message (see [`format_error_message`]).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Replace the composed message.
    pub fn set_message(&mut self, message: String) {
        self.message = message;
    }

    /// Append to the composed message.
    pub fn append_message(&mut self, more: &str) {
        self.message.push_str(more);
    }

    /// Severity, preferring the non-localized form.
    pub fn severity(&self) -> Option<&str> {
        self.field(field_code::SEVERITY_NON_LOCALIZED)
            .or_else(|| self.field(field_code::SEVERITY))
    }

    /// SQLSTATE code.
    pub fn sqlstate(&self) -> Option<&str> {
        self.field(field_code::SQLSTATE)
    }

    /// Primary message as sent by the server.
    pub fn primary_message(&self) -> Option<&str> {
        self.field(field_code::MESSAGE)
    }

    /// Detail.
    pub fn detail(&self) -> Option<&str> {
        self.field(field_code::DETAIL)
    }

    /// Hint.
    pub fn hint(&self) -> Option<&str> {
        self.field(field_code::HINT)
    }

    /// Cursor position in the query string.
    pub fn position(&self) -> Option<u32> {
        self.field(field_code::POSITION)?.parse().ok()
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message.trim_end_matches('\n'))
    }
}

/// Build the human-readable message for an error or notice.
///
/// ```text
/// SEVERITY:  [SQLSTATE: ]message[ at character N]
/// DETAIL:  ...
/// HINT:  ...
/// CONTEXT:  ...
/// LOCATION:  routine, file:line
/// ```
///
/// The SQLSTATE prefix and LOCATION line only appear with
/// [`Verbosity::Verbose`]; DETAIL/HINT/CONTEXT are dropped with
/// [`Verbosity::Terse`].
pub fn format_error_message(record: &ErrorRecord, verbosity: Verbosity) -> String {
    let mut out = String::new();

    if let Some(severity) = record.field(field_code::SEVERITY) {
        out.push_str(severity);
        out.push_str(":  ");
    }
    if verbosity == Verbosity::Verbose
        && let Some(code) = record.field(field_code::SQLSTATE)
    {
        out.push_str(code);
        out.push_str(": ");
    }
    if let Some(message) = record.field(field_code::MESSAGE) {
        out.push_str(message);
    }
    if let Some(position) = record.field(field_code::POSITION) {
        out.push_str(" at character ");
        out.push_str(position);
    }
    out.push('\n');

    if verbosity != Verbosity::Terse {
        for (code, label) in [
            (field_code::DETAIL, "DETAIL:  "),
            (field_code::HINT, "HINT:  "),
            (field_code::CONTEXT, "CONTEXT:  "),
        ] {
            if let Some(value) = record.field(code) {
                out.push_str(label);
                out.push_str(value);
                out.push('\n');
            }
        }
    }

    if verbosity == Verbosity::Verbose {
        let routine = record.field(field_code::ROUTINE);
        let file = record.field(field_code::FILE);
        let line = record.field(field_code::LINE);
        if routine.is_some() || file.is_some() || line.is_some() {
            out.push_str("LOCATION:  ");
            if let Some(routine) = routine {
                out.push_str(routine);
                out.push_str(", ");
            }
            if let (Some(file), Some(line)) = (file, line) {
                out.push_str(file);
                out.push(':');
                out.push_str(line);
            }
            out.push('\n');
        }
    }

    out
}

/// Error type for zero-pq.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ErrorRecord),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Invalid usage (e.g., sending a query while another is in progress)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Allocation failed while buffering data from the server
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
}

impl From<core::convert::Infallible> for Error {
    fn from(e: core::convert::Infallible) -> Self {
        match e {}
    }
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionBroken => true,
            Error::Server(record) => {
                // FATAL and PANIC errors indicate connection is broken
                matches!(record.severity(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(record) => record.sqlstate(),
            _ => None,
        }
    }
}
