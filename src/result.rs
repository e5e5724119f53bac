//! Query results.
//!
//! A [`QueryResult`] is built incrementally by the dispatcher and handed to
//! the caller once complete. Exactly one result is in flight per connection.

use crate::error::{Error, ErrorRecord, Result};
use crate::protocol::backend::query::{inserted_oid, rows_affected};
use crate::protocol::types::{FormatCode, Oid};

/// Status of a [`QueryResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// The query string was empty
    EmptyQuery,
    /// A command that returns no rows completed
    CommandOk,
    /// A query that returns rows completed
    TuplesOk,
    /// COPY FROM STDIN started
    CopyIn,
    /// COPY TO STDOUT started
    CopyOut,
    /// Non-fatal diagnostic (a notice)
    NonfatalError,
    /// The command failed
    FatalError,
}

/// Column descriptor from a RowDescription message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDesc {
    /// Column name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_attnum: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_len: i16,
    /// Type modifier
    pub atttypmod: i32,
    /// Format code
    pub format: FormatCode,
}

/// One column value of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// SQL NULL (wire length -1)
    Null,
    /// A value, possibly empty
    Value(Vec<u8>),
}

impl Field {
    /// Value bytes, `None` for NULL.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Field::Null => None,
            Field::Value(v) => Some(v),
        }
    }

    /// Whether this is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }
}

/// One data row. Always has exactly as many fields as the result has columns.
pub type Row = Vec<Field>;

/// Value returned by a fast-path function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionValue {
    /// The function returned NULL
    Null,
    /// Integer result (when requested as an integer)
    Int(i32),
    /// Raw binary result
    Bytes(Vec<u8>),
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    status: ResultStatus,
    pub(crate) attributes: Vec<AttrDesc>,
    pub(crate) rows: Vec<Row>,
    pub(crate) command_tag: String,
    pub(crate) error: Option<ErrorRecord>,
    pub(crate) binary: bool,
    pub(crate) copy_formats: Vec<FormatCode>,
    pub(crate) function_value: Option<FunctionValue>,
}

impl QueryResult {
    /// Create an empty result with the given status.
    pub fn new(status: ResultStatus) -> Self {
        Self {
            status,
            attributes: Vec::new(),
            rows: Vec::new(),
            command_tag: String::new(),
            error: None,
            binary: false,
            copy_formats: Vec::new(),
            function_value: None,
        }
    }

    /// Create a failed result.
    pub fn error(record: ErrorRecord) -> Self {
        let mut result = Self::new(ResultStatus::FatalError);
        result.error = Some(record);
        result
    }

    /// Create a row-returning result from column descriptors.
    pub(crate) fn tuples(attributes: Vec<AttrDesc>, binary: bool) -> Self {
        let mut result = Self::new(ResultStatus::TuplesOk);
        result.attributes = attributes;
        result.binary = binary;
        result
    }

    /// Result status.
    pub fn status(&self) -> ResultStatus {
        self.status
    }

    /// Whether the status is [`ResultStatus::FatalError`].
    pub fn is_error(&self) -> bool {
        self.status == ResultStatus::FatalError
    }

    /// Error details, if the command failed.
    pub fn error_record(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    /// Composed error message, empty if the command did not fail.
    pub fn error_message(&self) -> &str {
        self.error.as_ref().map_or("", |e| e.message())
    }

    /// Look up an error field by code.
    pub fn error_field(&self, code: u8) -> Option<&str> {
        self.error.as_ref()?.field(code)
    }

    /// Convert a failed result into `Err(Error::Server)`.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            ResultStatus::FatalError => Err(Error::Server(self.error.unwrap_or_default())),
            _ => Ok(self),
        }
    }

    /// Column descriptors.
    pub fn attributes(&self) -> &[AttrDesc] {
        &self.attributes
    }

    /// All rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn ntuples(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn nfields(&self) -> usize {
        self.attributes.len()
    }

    /// True only if every column is in binary format.
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Column name.
    pub fn fname(&self, column: usize) -> Option<&str> {
        self.attributes.get(column).map(|a| a.name.as_str())
    }

    /// Column number for a name.
    ///
    /// Unquoted names are compared case-insensitively; a double-quoted name
    /// is compared exactly.
    pub fn fnumber(&self, name: &str) -> Option<usize> {
        match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
            Some(quoted) => self.attributes.iter().position(|a| a.name == quoted),
            None => self
                .attributes
                .iter()
                .position(|a| a.name.eq_ignore_ascii_case(name)),
        }
    }

    /// Data type OID of a column.
    pub fn ftype(&self, column: usize) -> Option<Oid> {
        self.attributes.get(column).map(|a| a.type_oid)
    }

    /// Format code of a column.
    pub fn fformat(&self, column: usize) -> Option<FormatCode> {
        self.attributes.get(column).map(|a| a.format)
    }

    /// Table OID of a column.
    pub fn ftable(&self, column: usize) -> Option<Oid> {
        self.attributes.get(column).map(|a| a.table_oid)
    }

    /// Field value, `None` for NULL or out-of-range indices.
    pub fn get_value(&self, row: usize, column: usize) -> Option<&[u8]> {
        self.field(row, column)?.as_bytes()
    }

    /// Field, `None` for out-of-range indices.
    pub fn field(&self, row: usize, column: usize) -> Option<&Field> {
        self.rows.get(row)?.get(column)
    }

    /// Whether a field is NULL. Out-of-range indices count as NULL.
    pub fn get_is_null(&self, row: usize, column: usize) -> bool {
        self.field(row, column).is_none_or(Field::is_null)
    }

    /// Field length in bytes; 0 for NULL.
    pub fn get_length(&self, row: usize, column: usize) -> usize {
        self.get_value(row, column).map_or(0, <[u8]>::len)
    }

    /// Command tag from CommandComplete.
    pub fn command_tag(&self) -> &str {
        &self.command_tag
    }

    /// Rows affected by the command, when the tag reports it.
    pub fn rows_affected(&self) -> Option<u64> {
        rows_affected(&self.command_tag)
    }

    /// OID of the inserted row for single-row `INSERT`.
    pub fn oid_value(&self) -> Option<Oid> {
        inserted_oid(&self.command_tag)
    }

    /// Column formats announced by CopyIn/CopyOut.
    pub fn copy_formats(&self) -> &[FormatCode] {
        &self.copy_formats
    }

    /// Value returned by a fast-path function call.
    pub fn function_value(&self) -> Option<&FunctionValue> {
        self.function_value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str) -> AttrDesc {
        AttrDesc {
            name: name.into(),
            table_oid: 0,
            column_attnum: 0,
            type_oid: 25,
            type_len: -1,
            atttypmod: -1,
            format: FormatCode::Text,
        }
    }

    #[test]
    fn null_and_empty_are_distinct() {
        let mut r = QueryResult::tuples(vec![attr("a"), attr("b")], false);
        r.rows.push(vec![Field::Null, Field::Value(Vec::new())]);

        assert!(r.get_is_null(0, 0));
        assert!(!r.get_is_null(0, 1));
        assert_eq!(r.get_value(0, 0), None);
        assert_eq!(r.get_value(0, 1), Some(&b""[..]));
        assert_eq!(r.get_length(0, 0), 0);
        assert_eq!(r.get_length(0, 1), 0);
        assert_ne!(r.field(0, 0), r.field(0, 1));
    }

    #[test]
    fn fnumber_quoting() {
        let r = QueryResult::tuples(vec![attr("id"), attr("Name")], false);
        assert_eq!(r.fnumber("ID"), Some(0));
        assert_eq!(r.fnumber("name"), Some(1));
        assert_eq!(r.fnumber("\"name\""), None);
        assert_eq!(r.fnumber("\"Name\""), Some(1));
    }

    #[test]
    fn failed_result_into_error() {
        let r = QueryResult::error(ErrorRecord::local("boom\n"));
        assert!(r.is_error());
        assert_eq!(r.error_message(), "boom\n");
        assert!(matches!(r.into_result(), Err(Error::Server(_))));
        assert!(QueryResult::new(ResultStatus::CommandOk).into_result().is_ok());
    }
}
