//! COPY sub-protocol.
//!
//! COPY OUT data can be pulled three ways, all non-blocking:
//!
//! - [`get_line_async`](ConnectionStateMachine::get_line_async) copies into
//!   a caller buffer, remembering how much of an oversized message was
//!   already returned;
//! - [`get_copy_data`](ConnectionStateMachine::get_copy_data) returns one
//!   whole CopyData message;
//! - [`get_line`](ConnectionStateMachine::get_line) returns one text line.
//!
//! Any message other than CopyData ends COPY OUT and is left in the buffer
//! for ordinary dispatch. Notices, notifications and parameter changes that
//! arrive in between are handled on the spot.

use crate::error::{Error, Result};
use crate::protocol::backend::{BULK_TAGS, CopyResponse, HEADER_LEN, MessageHeader, msg_type};
use crate::protocol::codec::Reader;
use crate::protocol::frontend::{write_copy_data, write_copy_end};
use crate::protocol::types::FormatCode;
use crate::result::ResultStatus;

use super::connection::ConnectionStateMachine;
use super::session::{AsyncStatus, ConnStatus};

/// Chunk size used by [`ConnectionStateMachine::get_line`].
const LINE_CHUNK: usize = 8192;

/// Old-style end-of-copy marker returned by [`ConnectionStateMachine::get_line`].
pub const END_OF_COPY_MARKER: &[u8] = b"\\.";

/// Data direction of a COPY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// COPY FROM STDIN
    In,
    /// COPY TO STDOUT
    Out,
}

/// State of the COPY in progress.
#[derive(Debug, Clone)]
pub struct CopyState {
    /// Data direction
    pub direction: CopyDirection,
    /// Overall binary format
    pub is_binary: bool,
    /// Per-column formats
    pub column_formats: Vec<FormatCode>,
    /// Bytes of the head CopyData message already returned by a chunk read
    pub partial_offset: usize,
    /// Text read by [`ConnectionStateMachine::get_line`] that has no newline yet
    pub line_buffer: Vec<u8>,
    /// Copy ended after an unterminated last line; the marker is still owed
    pub terminator_pending: bool,
}

impl CopyState {
    /// Create the state announced by a CopyInResponse/CopyOutResponse.
    pub fn new(direction: CopyDirection, response: CopyResponse) -> Self {
        Self {
            direction,
            is_binary: response.is_binary(),
            column_formats: response.column_formats,
            partial_offset: 0,
            line_buffer: Vec::new(),
            terminator_pending: false,
        }
    }
}

/// Outcome of [`ConnectionStateMachine::get_line_async`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyChunk {
    /// `n` bytes were copied into the caller's buffer
    Data(usize),
    /// The next message is not complete yet
    Pending,
    /// COPY OUT is over; collect the command's result with `get_result`
    EndOfCopy,
}

/// Outcome of [`ConnectionStateMachine::get_copy_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyData {
    /// One CopyData message
    Row(Vec<u8>),
    /// The next message is not complete yet
    Pending,
    /// COPY OUT is over; collect the command's result with `get_result`
    Done,
}

/// Outcome of [`ConnectionStateMachine::get_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyLine {
    /// One line without its newline; [`END_OF_COPY_MARKER`] at the end
    Line(Vec<u8>),
    /// No complete line is buffered yet
    Pending,
}

/// Head message as seen by the COPY readers.
enum Head {
    /// Not complete yet
    Pending,
    /// A complete CopyData message with this body length
    CopyData(usize),
    /// A side-channel message was consumed
    Handled,
    /// Anything else
    Other,
    /// The connection failed while framing
    Failed,
}

impl ConnectionStateMachine {
    fn check_copy(&self, wanted: AsyncStatus) -> Result<()> {
        if self.session.conn_status == ConnStatus::Bad {
            return Err(Error::ConnectionBroken);
        }
        if self.session.async_status != wanted {
            return Err(Error::InvalidUsage("no COPY in progress".into()));
        }
        Ok(())
    }

    /// Inspect the head of the input for a COPY OUT reader.
    fn copy_head(&mut self) -> Head {
        let Some(header) = MessageHeader::peek(self.buffers.input.available()) else {
            return Head::Pending;
        };
        let Some(body_len) = header.body_len(BULK_TAGS) else {
            self.sync_loss(header.tag, header.length());
            return Head::Failed;
        };
        let total = HEADER_LEN + body_len;
        if self.buffers.input.len() < total {
            if self.buffers.input.reserve(total).is_err() {
                self.sync_loss(header.tag, header.length());
                return Head::Failed;
            }
            return Head::Pending;
        }

        let tag = header.tag;
        if !matches!(
            tag,
            msg_type::NOTICE_RESPONSE
                | msg_type::NOTIFICATION_RESPONSE
                | msg_type::PARAMETER_STATUS
        ) {
            return match tag {
                msg_type::COPY_DATA => Head::CopyData(body_len),
                _ => Head::Other,
            };
        }

        let Self {
            buffers, session, ..
        } = self;
        let body = buffers
            .input
            .available()
            .get(HEADER_LEN..total)
            .unwrap_or_default();
        let mut reader = Reader::new(body);
        let handled = match tag {
            msg_type::NOTICE_RESPONSE => session.handle_notice(&mut reader),
            msg_type::NOTIFICATION_RESPONSE => session.handle_notification(&mut reader),
            _ => session.handle_parameter_status(&mut reader),
        };
        if handled.is_err() || reader.remaining() != 0 {
            self.length_mismatch(tag);
            return Head::Failed;
        }
        buffers.input.consume(total);
        Head::Handled
    }

    /// Leave COPY mode for Busy. An uncollected copy result is dropped so
    /// the command's own result can take its place.
    fn leave_copy(&mut self) {
        let session = &mut self.session;
        session.async_status = AsyncStatus::Busy;
        if session
            .result
            .as_ref()
            .is_some_and(|r| matches!(r.status(), ResultStatus::CopyIn | ResultStatus::CopyOut))
        {
            session.result = None;
        }
        if let Some(copy) = &mut session.copy {
            copy.partial_offset = 0;
        }
    }

    /// Copy the next piece of COPY OUT data into `buf`.
    ///
    /// A message larger than `buf` is returned over several calls.
    pub fn get_line_async(&mut self, buf: &mut [u8]) -> Result<CopyChunk> {
        if self.session.async_status != AsyncStatus::CopyOut {
            return Ok(CopyChunk::EndOfCopy);
        }
        loop {
            let body_len = match self.copy_head() {
                Head::Pending => return Ok(CopyChunk::Pending),
                Head::Handled => continue,
                Head::Failed => return Err(Error::ConnectionBroken),
                Head::Other => {
                    self.leave_copy();
                    return Ok(CopyChunk::EndOfCopy);
                }
                Head::CopyData(len) => len,
            };

            let Self {
                buffers, session, ..
            } = self;
            let done = session.copy.as_ref().map_or(0, |c| c.partial_offset);
            let body = buffers
                .input
                .available()
                .get(HEADER_LEN + done..HEADER_LEN + body_len)
                .unwrap_or_default();

            let n = body.len().min(buf.len());
            if let (Some(dst), Some(src)) = (buf.get_mut(..n), body.get(..n)) {
                dst.copy_from_slice(src);
            }
            if n == body.len() {
                buffers.input.consume(HEADER_LEN + body_len);
                if let Some(copy) = &mut session.copy {
                    copy.partial_offset = 0;
                }
            } else if let Some(copy) = &mut session.copy {
                copy.partial_offset += n;
            }
            return Ok(CopyChunk::Data(n));
        }
    }

    /// Take the next whole CopyData message. Empty messages are skipped.
    pub fn get_copy_data(&mut self) -> Result<CopyData> {
        self.check_copy(AsyncStatus::CopyOut)?;
        loop {
            let body_len = match self.copy_head() {
                Head::Pending => return Ok(CopyData::Pending),
                Head::Handled => continue,
                Head::Failed => return Err(Error::ConnectionBroken),
                Head::Other => {
                    self.leave_copy();
                    return Ok(CopyData::Done);
                }
                Head::CopyData(len) => len,
            };

            let Self {
                buffers, session, ..
            } = self;
            let done = session
                .copy
                .as_mut()
                .map_or(0, |c| core::mem::take(&mut c.partial_offset));
            let body = buffers
                .input
                .available()
                .get(HEADER_LEN + done..HEADER_LEN + body_len)
                .unwrap_or_default();
            if body.is_empty() {
                buffers.input.consume(HEADER_LEN + body_len);
                continue;
            }

            let mut row = Vec::new();
            row.try_reserve_exact(body.len())
                .map_err(|e| Error::OutOfMemory(e.to_string()))?;
            row.extend_from_slice(body);
            buffers.input.consume(HEADER_LEN + body_len);
            return Ok(CopyData::Row(row));
        }
    }

    /// Read one line of text COPY OUT data, without its newline.
    ///
    /// When the copy ends, [`END_OF_COPY_MARKER`] is returned once.
    pub fn get_line(&mut self) -> Result<CopyLine> {
        if self.session.conn_status == ConnStatus::Bad {
            return Err(Error::ConnectionBroken);
        }
        let copy_out = self.session.async_status == AsyncStatus::CopyOut;
        let Some(copy) = self.session.copy.as_mut() else {
            return Err(Error::InvalidUsage("not doing text COPY OUT".into()));
        };
        if copy.terminator_pending {
            self.session.copy = None;
            return Ok(CopyLine::Line(END_OF_COPY_MARKER.to_vec()));
        }
        if !copy_out || copy.is_binary {
            return Err(Error::InvalidUsage("not doing text COPY OUT".into()));
        }

        let mut chunk = [0; LINE_CHUNK];
        loop {
            if let Some(copy) = self.session.copy.as_mut()
                && let Some(newline) = memchr::memchr(b'\n', &copy.line_buffer)
            {
                let mut line: Vec<u8> = copy.line_buffer.drain(..=newline).collect();
                line.pop();
                return Ok(CopyLine::Line(line));
            }

            match self.get_line_async(&mut chunk)? {
                CopyChunk::Data(n) => {
                    if let Some(copy) = self.session.copy.as_mut() {
                        copy.line_buffer
                            .extend_from_slice(chunk.get(..n).unwrap_or_default());
                    }
                }
                CopyChunk::Pending => return Ok(CopyLine::Pending),
                CopyChunk::EndOfCopy => {
                    let rest = self
                        .session
                        .copy
                        .as_mut()
                        .map(|c| core::mem::take(&mut c.line_buffer))
                        .unwrap_or_default();
                    if rest.is_empty() {
                        self.session.copy = None;
                        return Ok(CopyLine::Line(END_OF_COPY_MARKER.to_vec()));
                    }
                    if let Some(copy) = self.session.copy.as_mut() {
                        copy.terminator_pending = true;
                    }
                    return Ok(CopyLine::Line(rest));
                }
            }
        }
    }

    /// Queue COPY IN data.
    pub fn put_copy_data(&mut self, data: &[u8]) -> Result<()> {
        self.check_copy(AsyncStatus::CopyIn)?;
        write_copy_data(self.buffers.output.buf_mut(), data);
        Ok(())
    }

    /// Finish COPY IN: CopyDone, or CopyFail with `error_message`.
    ///
    /// The command's result is then collected with `get_result`.
    pub fn put_copy_end(&mut self, error_message: Option<&str>) -> Result<()> {
        self.check_copy(AsyncStatus::CopyIn)?;
        write_copy_end(self.buffers.output.buf_mut(), error_message);
        self.leave_copy();
        Ok(())
    }

    /// Leave COPY mode in either direction.
    ///
    /// COPY IN is completed with CopyDone. Leaving COPY OUT early makes the
    /// remaining CopyData messages be discarded.
    pub fn end_copy(&mut self) -> Result<()> {
        match self.session.async_status {
            AsyncStatus::CopyIn => self.put_copy_end(None),
            AsyncStatus::CopyOut => {
                self.leave_copy();
                Ok(())
            }
            _ if self.session.conn_status == ConnStatus::Bad => Err(Error::ConnectionBroken),
            _ => Err(Error::InvalidUsage("no COPY in progress".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend::msg_type::{COPY_IN_RESPONSE, COPY_OUT_RESPONSE};
    use crate::state::connection::NextResult;
    use crate::state::testing::*;

    fn copy_out_engine(binary: bool, messages: &[Vec<u8>]) -> ConnectionStateMachine {
        let mut conn = busy_engine();
        conn.feed(&copy_response(COPY_OUT_RESPONSE, binary, 1)).unwrap();
        for message in messages {
            conn.feed(message).unwrap();
        }
        let NextResult::Ready(result) = conn.get_result() else {
            panic!("expected the copy result");
        };
        assert_eq!(result.status(), ResultStatus::CopyOut);
        conn
    }

    fn command_tail() -> Vec<Vec<u8>> {
        vec![copy_done(), command_complete("COPY 2"), ready_for_query(b'I')]
    }

    #[test]
    fn whole_messages_then_command_result() {
        let mut messages = vec![copy_data(b"a\n"), copy_data(b""), copy_data(b"b\n")];
        messages.extend(command_tail());
        let mut conn = copy_out_engine(false, &messages);

        assert_eq!(conn.get_copy_data().unwrap(), CopyData::Row(b"a\n".to_vec()));
        assert_eq!(conn.get_copy_data().unwrap(), CopyData::Row(b"b\n".to_vec()));
        assert_eq!(conn.get_copy_data().unwrap(), CopyData::Done);
        assert_eq!(conn.async_status(), AsyncStatus::Busy);

        let NextResult::Ready(result) = conn.get_result() else {
            panic!("expected the command result");
        };
        assert_eq!(result.status(), ResultStatus::CommandOk);
        assert_eq!(result.command_tag(), "COPY 2");
        assert!(matches!(conn.get_result(), NextResult::Done));
    }

    #[test]
    fn chunked_reads_resume_inside_a_message() {
        let mut conn = copy_out_engine(false, &[copy_data(b"0123456789")]);
        let mut buf = [0u8; 4];

        assert_eq!(conn.get_line_async(&mut buf).unwrap(), CopyChunk::Data(4));
        assert_eq!(&buf, b"0123");
        assert_eq!(conn.get_line_async(&mut buf).unwrap(), CopyChunk::Data(4));
        assert_eq!(&buf, b"4567");
        // A whole-message read picks up where the chunks stopped.
        assert_eq!(conn.get_copy_data().unwrap(), CopyData::Row(b"89".to_vec()));
        assert_eq!(conn.get_line_async(&mut buf).unwrap(), CopyChunk::Pending);

        conn.feed(&copy_done()).unwrap();
        assert_eq!(conn.get_line_async(&mut buf).unwrap(), CopyChunk::EndOfCopy);
        assert_eq!(conn.get_line_async(&mut buf).unwrap(), CopyChunk::EndOfCopy);
    }

    #[test]
    fn incomplete_message_is_pending() {
        let data = copy_data(b"row\n");
        let mut conn = copy_out_engine(false, &[data[..6].to_vec()]);
        assert_eq!(conn.get_copy_data().unwrap(), CopyData::Pending);
        conn.feed(&data[6..]).unwrap();
        assert_eq!(conn.get_copy_data().unwrap(), CopyData::Row(b"row\n".to_vec()));
    }

    #[test]
    fn lines_are_split_and_terminated() {
        let mut messages = vec![copy_data(b"ab"), copy_data(b"c\nd")];
        messages.extend(command_tail());
        let mut conn = copy_out_engine(false, &messages);

        assert_eq!(conn.get_line().unwrap(), CopyLine::Line(b"abc".to_vec()));
        assert_eq!(conn.get_line().unwrap(), CopyLine::Line(b"d".to_vec()));
        assert_eq!(
            conn.get_line().unwrap(),
            CopyLine::Line(END_OF_COPY_MARKER.to_vec())
        );
        assert!(matches!(conn.get_result(), NextResult::Ready(_)));
    }

    #[test]
    fn line_reads_reject_binary_copy() {
        let mut conn = copy_out_engine(true, &[]);
        assert!(matches!(conn.get_line(), Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn side_channel_messages_inside_copy_out() {
        let mut conn = copy_out_engine(
            false,
            &[
                copy_data(b"x\n"),
                notification(7, "chan", ""),
                parameter_status("application_name", "loader"),
                copy_data(b"y\n"),
            ],
        );
        assert_eq!(conn.get_copy_data().unwrap(), CopyData::Row(b"x\n".to_vec()));
        assert_eq!(conn.get_copy_data().unwrap(), CopyData::Row(b"y\n".to_vec()));
        assert_eq!(conn.next_notification().map(|n| n.backend_pid), Some(7));
        assert_eq!(conn.parameter_status("application_name"), Some("loader"));
    }

    #[test]
    fn early_end_discards_remaining_data() {
        let mut messages = vec![copy_data(b"a\n"), copy_data(b"b\n")];
        messages.extend(command_tail());
        let mut conn = copy_out_engine(false, &messages);

        conn.end_copy().unwrap();
        let NextResult::Ready(result) = conn.get_result() else {
            panic!("expected the command result");
        };
        assert_eq!(result.command_tag(), "COPY 2");
        assert!(matches!(conn.get_result(), NextResult::Done));
    }

    #[test]
    fn copy_in_round_trip() {
        let mut conn = busy_engine();
        conn.feed(&copy_response(COPY_IN_RESPONSE, false, 2)).unwrap();
        let NextResult::Ready(result) = conn.get_result() else {
            panic!("expected the copy result");
        };
        assert_eq!(result.status(), ResultStatus::CopyIn);
        assert_eq!(result.copy_formats().len(), 2);
        assert!(matches!(conn.get_result(), NextResult::Ready(_)));

        conn.put_copy_data(b"1\tone\n").unwrap();
        conn.put_copy_end(None).unwrap();
        assert_eq!(conn.async_status(), AsyncStatus::Busy);
        let mut expected = vec![b'd', 0, 0, 0, 10];
        expected.extend_from_slice(b"1\tone\n");
        expected.extend_from_slice(&[b'c', 0, 0, 0, 4]);
        assert_eq!(conn.pending_output(), expected);
        assert!(matches!(conn.put_copy_data(b"late"), Err(Error::InvalidUsage(_))));

        conn.feed(&command_complete("COPY 1")).unwrap();
        conn.feed(&ready_for_query(b'I')).unwrap();
        let NextResult::Ready(result) = conn.get_result() else {
            panic!("expected the command result");
        };
        assert_eq!(result.rows_affected(), Some(1));
        assert!(matches!(conn.get_result(), NextResult::Done));
    }

    #[test]
    fn copy_fail_carries_the_reason() {
        let mut conn = busy_engine();
        conn.feed(&copy_response(COPY_IN_RESPONSE, false, 1)).unwrap();
        assert!(matches!(conn.get_result(), NextResult::Ready(_)));

        conn.put_copy_end(Some("bad input")).unwrap();
        assert_eq!(conn.pending_output()[0], b'f');
        assert!(conn.pending_output().ends_with(b"bad input\0"));
    }
}
