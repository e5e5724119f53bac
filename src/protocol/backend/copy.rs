//! COPY protocol backend messages.

use crate::protocol::codec::{ReadResult, Reader};
use crate::protocol::types::FormatCode;

/// CopyInResponse / CopyOutResponse body.
///
/// Both messages share the same layout: overall format byte, column count,
/// then one format code per column.
#[derive(Debug, Clone)]
pub struct CopyResponse {
    /// Overall format (0=text, 1=binary)
    pub format: FormatCode,
    /// Per-column format codes
    pub column_formats: Vec<FormatCode>,
}

impl CopyResponse {
    /// Parse a CopyInResponse or CopyOutResponse body.
    pub fn parse(reader: &mut Reader<'_>) -> ReadResult<Self> {
        let format = FormatCode::from_i16(i16::from(reader.read_u8()?));

        let num_columns = usize::try_from(reader.read_i16()?).unwrap_or(0);
        let mut column_formats = Vec::with_capacity(num_columns.min(reader.remaining() / 2));
        for _ in 0..num_columns {
            column_formats.push(FormatCode::from_i16(reader.read_i16()?));
        }

        Ok(Self {
            format,
            column_formats,
        })
    }

    /// Check if binary format is used.
    pub fn is_binary(&self) -> bool {
        matches!(self.format, FormatCode::Binary)
    }
}
