//! Query-related backend messages.

use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::protocol::codec::{ReadResult, Reader, decode_text};
use crate::protocol::types::{FormatCode, I16BE, I32BE, U32BE};
use crate::result::AttrDesc;

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    /// Table OID (0 if not a table column)
    pub table_oid: U32BE,
    /// Column attribute number (0 if not a table column)
    pub column_id: I16BE,
    /// Data type OID
    pub type_oid: U32BE,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: I16BE,
    /// Type modifier (type-specific)
    pub type_modifier: I32BE,
    /// Format code (0=text, 1=binary)
    pub format: I16BE,
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug, Clone, Default)]
pub struct RowDescription {
    /// Column descriptors in column order
    pub attributes: Vec<AttrDesc>,
    /// True only if there is at least one column and every column is binary
    pub binary: bool,
}

impl RowDescription {
    /// Parse a RowDescription body.
    ///
    /// Nothing is kept on failure; the caller re-parses from scratch.
    pub fn parse(reader: &mut Reader<'_>) -> ReadResult<Self> {
        let num_fields = reader.read_i16()?;
        let num_fields = usize::try_from(num_fields).unwrap_or(0);
        // The count comes from the wire; never trust it for preallocation
        // beyond what the body could possibly hold.
        let mut attributes = Vec::with_capacity(num_fields.min(reader.remaining() / 19));

        for _ in 0..num_fields {
            let name = reader.read_cstring()?;
            let tail: FieldDescriptionTail = reader.read_struct()?;
            attributes.push(AttrDesc {
                name: decode_text(name),
                table_oid: tail.table_oid.get(),
                column_attnum: tail.column_id.get(),
                type_oid: tail.type_oid.get(),
                type_len: tail.type_size.get(),
                atttypmod: tail.type_modifier.get(),
                format: FormatCode::from_i16(tail.format.get()),
            });
        }

        let binary = !attributes.is_empty()
            && attributes.iter().all(|a| a.format == FormatCode::Binary);
        Ok(Self { attributes, binary })
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// CommandComplete message - indicates successful completion of a command.
#[derive(Debug, Clone)]
pub struct CommandComplete {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: String,
}

impl CommandComplete {
    /// Parse a CommandComplete body.
    pub fn parse(reader: &mut Reader<'_>) -> ReadResult<Self> {
        Ok(Self {
            tag: reader.read_string()?,
        })
    }
}

/// Parse the number of rows affected from a command tag.
///
/// Returns `Some(count)` for commands like SELECT, INSERT, UPDATE, DELETE.
/// Returns `None` for other commands or parse failures.
pub fn rows_affected(tag: &str) -> Option<u64> {
    let parts: Vec<&str> = tag.split_whitespace().collect();

    match parts.as_slice() {
        ["SELECT", count] => count.parse().ok(),
        ["INSERT", _oid, count] => count.parse().ok(),
        ["UPDATE", count] => count.parse().ok(),
        ["DELETE", count] => count.parse().ok(),
        ["COPY", count] => count.parse().ok(),
        ["MOVE", count] => count.parse().ok(),
        ["FETCH", count] => count.parse().ok(),
        _ => None,
    }
}

/// OID of the inserted row, for single-row `INSERT` tags.
pub fn inserted_oid(tag: &str) -> Option<u32> {
    match tag.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["INSERT", oid, _count] => oid.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::Incomplete;

    fn field(out: &mut Vec<u8>, name: &str, type_oid: u32, format: i16) {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&16384_u32.to_be_bytes());
        out.extend_from_slice(&1_i16.to_be_bytes());
        out.extend_from_slice(&type_oid.to_be_bytes());
        out.extend_from_slice(&(-1_i16).to_be_bytes());
        out.extend_from_slice(&(-1_i32).to_be_bytes());
        out.extend_from_slice(&format.to_be_bytes());
    }

    #[test]
    fn parse_row_description() {
        let mut body = 2_i16.to_be_bytes().to_vec();
        field(&mut body, "id", 23, 0);
        field(&mut body, "name", 25, 1);
        let mut reader = Reader::new(&body);
        let desc = RowDescription::parse(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert_eq!(desc.len(), 2);
        assert_eq!(desc.attributes[0].name, "id");
        assert_eq!(desc.attributes[0].type_oid, 23);
        assert_eq!(desc.attributes[0].table_oid, 16384);
        assert_eq!(desc.attributes[1].format, FormatCode::Binary);
        assert!(!desc.binary);
    }

    #[test]
    fn binary_only_when_all_columns_binary() {
        let mut body = 1_i16.to_be_bytes().to_vec();
        field(&mut body, "b", 17, 1);
        assert!(RowDescription::parse(&mut Reader::new(&body)).unwrap().binary);

        let body = 0_i16.to_be_bytes();
        assert!(!RowDescription::parse(&mut Reader::new(&body)).unwrap().binary);
    }

    #[test]
    fn truncated_row_description() {
        let mut body = 2_i16.to_be_bytes().to_vec();
        field(&mut body, "id", 23, 0);
        body.extend_from_slice(b"na");
        assert!(matches!(
            RowDescription::parse(&mut Reader::new(&body)),
            Err(Incomplete)
        ));
    }

    #[test]
    fn command_tags() {
        assert_eq!(rows_affected("SELECT 5"), Some(5));
        assert_eq!(rows_affected("INSERT 0 1"), Some(1));
        assert_eq!(rows_affected("CREATE TABLE"), None);
        assert_eq!(inserted_oid("INSERT 17001 1"), Some(17001));
        assert_eq!(inserted_oid("UPDATE 3"), None);
    }
}
