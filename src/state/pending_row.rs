//! Incremental DataRow decoding.
//!
//! A DataRow may straddle several reads. Fields are staged as soon as they
//! are complete, so a resumed parse starts at the first unread field and
//! never re-reads or re-allocates the ones already captured. Progress is
//! kept as an offset into the message body.

use crate::protocol::codec::Reader;
use crate::result::{Field, Row};

/// Result of staging fields from a (possibly partial) DataRow body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Every field has been captured
    Complete,
    /// The body ended before the row did
    Incomplete,
    /// The row's field count differs from the row description
    FieldCountMismatch,
    /// A value could not be allocated
    OutOfMemory,
}

/// A row being assembled across buffer refills.
#[derive(Debug, Default)]
pub struct PendingRow {
    fields: Vec<Field>,
    counted: bool,
    body_offset: usize,
}

impl PendingRow {
    /// Create an empty staging row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next field to read.
    pub fn next_field(&self) -> usize {
        self.fields.len()
    }

    /// Body offset where parsing resumes.
    pub fn body_offset(&self) -> usize {
        self.body_offset
    }

    /// Capture as many fields as `reader` holds.
    ///
    /// `reader` must start at the beginning of the DataRow body; bytes up to
    /// [`body_offset`](Self::body_offset) were handled by earlier calls.
    pub fn stage(&mut self, reader: &mut Reader<'_>, nfields: usize) -> StageOutcome {
        if reader.skip(self.body_offset).is_err() {
            return StageOutcome::Incomplete;
        }

        if !self.counted {
            let Ok(count) = reader.read_i16() else {
                return StageOutcome::Incomplete;
            };
            if usize::try_from(count).ok() != Some(nfields) {
                return StageOutcome::FieldCountMismatch;
            }
            if self.fields.try_reserve_exact(nfields).is_err() {
                return StageOutcome::OutOfMemory;
            }
            self.counted = true;
            self.body_offset = reader.position();
        }

        while self.fields.len() < nfields {
            let Ok(len) = reader.read_i32() else {
                return StageOutcome::Incomplete;
            };
            let field = if len == -1 {
                Field::Null
            } else {
                let len = usize::try_from(len).unwrap_or(0);
                let Ok(bytes) = reader.read_bytes(len) else {
                    return StageOutcome::Incomplete;
                };
                let mut value = Vec::new();
                if value.try_reserve_exact(len).is_err() {
                    return StageOutcome::OutOfMemory;
                }
                value.extend_from_slice(bytes);
                Field::Value(value)
            };
            self.fields.push(field);
            self.body_offset = reader.position();
        }

        StageOutcome::Complete
    }

    /// Take the finished row.
    pub fn into_row(self) -> Row {
        self.fields
    }
}

/// Staging state for the DataRow at the head of the input.
#[derive(Debug)]
pub enum RowStaging {
    /// Fields are being collected
    Filling(PendingRow),
    /// The row was rejected; the message is skipped once complete
    Discarding,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_row(fields: &[Option<&[u8]>]) -> Vec<u8> {
        let mut body = (fields.len() as i16).to_be_bytes().to_vec();
        for field in fields {
            match field {
                None => body.extend_from_slice(&(-1_i32).to_be_bytes()),
                Some(v) => {
                    body.extend_from_slice(&(v.len() as i32).to_be_bytes());
                    body.extend_from_slice(v);
                }
            }
        }
        body
    }

    #[test]
    fn resumes_after_every_split() {
        let body = data_row(&[Some(b"1"), None, Some(b""), Some(b"alice")]);
        for split in 0..body.len() {
            let mut pending = PendingRow::new();
            let outcome = pending.stage(&mut Reader::new(&body[..split]), 4);
            assert_eq!(outcome, StageOutcome::Incomplete, "split at {split}");
            let captured = pending.next_field();

            let mut reader = Reader::new(&body);
            assert_eq!(pending.stage(&mut reader, 4), StageOutcome::Complete);
            assert_eq!(reader.remaining(), 0);
            assert!(pending.next_field() >= captured);
            assert_eq!(
                pending.into_row(),
                vec![
                    Field::Value(b"1".to_vec()),
                    Field::Null,
                    Field::Value(Vec::new()),
                    Field::Value(b"alice".to_vec()),
                ]
            );
        }
    }

    #[test]
    fn captured_fields_are_kept() {
        let body = data_row(&[Some(b"abc"), Some(b"defg")]);
        let mut pending = PendingRow::new();
        assert_eq!(
            pending.stage(&mut Reader::new(&body[..10]), 2),
            StageOutcome::Incomplete
        );
        assert_eq!(pending.next_field(), 1);
        assert_eq!(pending.body_offset(), 9);
    }

    #[test]
    fn field_count_mismatch() {
        let body = data_row(&[Some(b"x")]);
        let mut pending = PendingRow::new();
        assert_eq!(
            pending.stage(&mut Reader::new(&body), 2),
            StageOutcome::FieldCountMismatch
        );
    }

    #[test]
    fn negative_length_other_than_null_is_empty() {
        let mut body = 1_i16.to_be_bytes().to_vec();
        body.extend_from_slice(&(-3_i32).to_be_bytes());
        let mut pending = PendingRow::new();
        assert_eq!(
            pending.stage(&mut Reader::new(&body), 1),
            StageOutcome::Complete
        );
        assert_eq!(pending.into_row(), vec![Field::Value(Vec::new())]);
    }
}
