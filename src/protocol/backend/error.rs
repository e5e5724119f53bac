//! Error and notice response messages.

use crate::error::{ErrorRecord, Verbosity, format_error_message};
use crate::protocol::codec::{ReadResult, Reader};

/// Parse `(code, cstring)` pairs up to the terminating zero code.
fn parse_fields(reader: &mut Reader<'_>) -> ReadResult<Vec<(u8, String)>> {
    let mut fields = Vec::new();
    loop {
        let code = reader.read_u8()?;
        if code == 0 {
            break;
        }
        let value = reader.read_string()?;
        if !code.is_ascii_graphic() {
            tracing::debug!("Unusual error field code: 0x{:02x}", code);
        }
        fields.push((code, value));
    }
    Ok(fields)
}

/// ErrorResponse message - error reported by the server.
#[derive(Debug, Clone)]
pub struct ErrorResponse(pub ErrorRecord);

impl ErrorResponse {
    /// Parse an ErrorResponse body and compose its message.
    pub fn parse(reader: &mut Reader<'_>, verbosity: Verbosity) -> ReadResult<Self> {
        let mut record = ErrorRecord::from_fields(parse_fields(reader)?);
        let message = format_error_message(&record, verbosity);
        record.set_message(message);
        Ok(Self(record))
    }

    /// Unwrap the record.
    pub fn into_record(self) -> ErrorRecord {
        self.0
    }
}

/// NoticeResponse message - non-fatal warning/info from server.
#[derive(Debug, Clone)]
pub struct NoticeResponse(pub ErrorRecord);

impl NoticeResponse {
    /// Parse a NoticeResponse body and compose its message.
    pub fn parse(reader: &mut Reader<'_>, verbosity: Verbosity) -> ReadResult<Self> {
        ErrorResponse::parse(reader, verbosity).map(|e| Self(e.0))
    }

    /// Unwrap the record.
    pub fn into_record(self) -> ErrorRecord {
        self.0
    }
}
