//! PostgreSQL backend (server → client) messages.

pub mod copy;
pub mod error;
pub mod query;
pub mod status;

use zerocopy::{FromBytes, Immutable, KnownLayout};

use super::types::I32BE;

pub use copy::CopyResponse;
pub use error::{ErrorResponse, NoticeResponse};
pub use query::{CommandComplete, RowDescription};
pub use status::{
    AuthenticationRequest, BackendKeyData, FunctionCallResponse, NotificationResponse,
    ParameterStatus, ReadyForQuery,
};

/// Backend message type bytes.
pub mod msg_type {
    /// Authentication message
    pub const AUTHENTICATION: u8 = b'R';
    /// BackendKeyData
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// NotificationResponse
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    /// ParseComplete
    pub const PARSE_COMPLETE: u8 = b'1';
    /// BindComplete
    pub const BIND_COMPLETE: u8 = b'2';
    /// CloseComplete
    pub const CLOSE_COMPLETE: u8 = b'3';
    /// NoData
    pub const NO_DATA: u8 = b'n';
    /// CopyInResponse
    pub const COPY_IN_RESPONSE: u8 = b'G';
    /// CopyOutResponse
    pub const COPY_OUT_RESPONSE: u8 = b'H';
    /// CopyData
    pub const COPY_DATA: u8 = b'd';
    /// CopyDone
    pub const COPY_DONE: u8 = b'c';
    /// FunctionCallResponse
    pub const FUNCTION_CALL_RESPONSE: u8 = b'V';
}

/// Backend message tags understood by the dispatcher.
///
/// Unknown tag bytes decode to `None` and are reported as an unexpected
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTag {
    Authentication,
    BackendKeyData,
    ParameterStatus,
    ReadyForQuery,
    RowDescription,
    DataRow,
    CommandComplete,
    EmptyQueryResponse,
    ErrorResponse,
    NoticeResponse,
    NotificationResponse,
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    CopyInResponse,
    CopyOutResponse,
    CopyData,
    CopyDone,
    FunctionCallResponse,
}

impl BackendTag {
    /// Decode a tag byte.
    pub fn from_byte(tag: u8) -> Option<Self> {
        Some(match tag {
            msg_type::AUTHENTICATION => Self::Authentication,
            msg_type::BACKEND_KEY_DATA => Self::BackendKeyData,
            msg_type::PARAMETER_STATUS => Self::ParameterStatus,
            msg_type::READY_FOR_QUERY => Self::ReadyForQuery,
            msg_type::ROW_DESCRIPTION => Self::RowDescription,
            msg_type::DATA_ROW => Self::DataRow,
            msg_type::COMMAND_COMPLETE => Self::CommandComplete,
            msg_type::EMPTY_QUERY_RESPONSE => Self::EmptyQueryResponse,
            msg_type::ERROR_RESPONSE => Self::ErrorResponse,
            msg_type::NOTICE_RESPONSE => Self::NoticeResponse,
            msg_type::NOTIFICATION_RESPONSE => Self::NotificationResponse,
            msg_type::PARSE_COMPLETE => Self::ParseComplete,
            msg_type::BIND_COMPLETE => Self::BindComplete,
            msg_type::CLOSE_COMPLETE => Self::CloseComplete,
            msg_type::NO_DATA => Self::NoData,
            msg_type::COPY_IN_RESPONSE => Self::CopyInResponse,
            msg_type::COPY_OUT_RESPONSE => Self::CopyOutResponse,
            msg_type::COPY_DATA => Self::CopyData,
            msg_type::COPY_DONE => Self::CopyDone,
            msg_type::FUNCTION_CALL_RESPONSE => Self::FunctionCallResponse,
            _ => return None,
        })
    }
}

/// Size of the message header (tag + length).
pub const HEADER_LEN: usize = 5;

/// Largest length believed for message types that are never bulky.
pub const MAX_UNTRUSTED_LENGTH: i32 = 30000;

/// Tags whose length is never sanity-checked against [`MAX_UNTRUSTED_LENGTH`]
/// in ordinary dispatch.
pub const BULK_TAGS: &[u8] = &[msg_type::ROW_DESCRIPTION, msg_type::DATA_ROW, msg_type::COPY_DATA];

/// Bulk tags inside the function-call loop, which also accepts large results.
pub const FUNCTION_CALL_BULK_TAGS: &[u8] = &[
    msg_type::ROW_DESCRIPTION,
    msg_type::DATA_ROW,
    msg_type::COPY_DATA,
    msg_type::FUNCTION_CALL_RESPONSE,
];

/// Message header as it appears on the wire.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct MessageHeader {
    /// Message type byte
    pub tag: u8,
    /// Length including itself but not the tag
    pub length: I32BE,
}

impl MessageHeader {
    /// Peek a header from the front of `data` without consuming anything.
    pub fn peek(data: &[u8]) -> Option<Self> {
        Self::read_from_prefix(data).ok().map(|(header, _)| header)
    }

    /// Declared length.
    pub fn length(&self) -> i32 {
        self.length.get()
    }

    /// Validate the declared length and return the body length.
    ///
    /// Returns `None` when the length cannot be trusted: it is shorter than
    /// the length field itself, or it is larger than
    /// [`MAX_UNTRUSTED_LENGTH`] for a tag outside `bulk_tags`.
    pub fn body_len(&self, bulk_tags: &[u8]) -> Option<usize> {
        let length = self.length();
        if length < 4 {
            return None;
        }
        if length > MAX_UNTRUSTED_LENGTH && !bulk_tags.contains(&self.tag) {
            return None;
        }
        usize::try_from(length - 4).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(tag: u8, length: i32) -> MessageHeader {
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&length.to_be_bytes());
        MessageHeader::peek(&bytes).unwrap()
    }

    #[test]
    fn peek_needs_five_bytes() {
        assert!(MessageHeader::peek(&[b'Z', 0, 0, 0]).is_none());
        let h = header(b'Z', 5);
        assert_eq!(h.tag, b'Z');
        assert_eq!(h.length(), 5);
    }

    #[test]
    fn length_validation() {
        assert_eq!(header(b'C', 3).body_len(BULK_TAGS), None);
        assert_eq!(header(b'C', -1).body_len(BULK_TAGS), None);
        assert_eq!(header(b'C', 4).body_len(BULK_TAGS), Some(0));
        assert_eq!(header(b'C', 30000).body_len(BULK_TAGS), Some(29996));
        assert_eq!(header(b'C', 30001).body_len(BULK_TAGS), None);
        assert_eq!(header(b'D', 1_000_000).body_len(BULK_TAGS), Some(999_996));
        assert_eq!(header(b'V', 40000).body_len(BULK_TAGS), None);
        assert_eq!(
            header(b'V', 40000).body_len(FUNCTION_CALL_BULK_TAGS),
            Some(39996)
        );
    }

    #[test]
    fn tag_decoding() {
        assert_eq!(BackendTag::from_byte(b'D'), Some(BackendTag::DataRow));
        assert_eq!(BackendTag::from_byte(b'V'), Some(BackendTag::FunctionCallResponse));
        assert_eq!(BackendTag::from_byte(b'?'), None);
    }
}
