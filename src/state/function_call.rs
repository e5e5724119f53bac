//! Fast-path function calls.
//!
//! A call is one FunctionCall message answered by an optional
//! FunctionCallResponse, an optional ErrorResponse, and a closing
//! ReadyForQuery. The response loop shares the framer's length rules, except
//! that FunctionCallResponse may be arbitrarily large.

use crate::error::{Error, Result};
use crate::protocol::backend::{
    BackendTag, ErrorResponse, FUNCTION_CALL_BULK_TAGS, FunctionCallResponse, HEADER_LEN,
    MessageHeader, ReadyForQuery,
};
use crate::protocol::codec::{ReadResult, Reader};
use crate::protocol::frontend::{FunctionArg, write_function_call};
use crate::protocol::types::Oid;
use crate::result::{FunctionValue, QueryResult, ResultStatus};

use super::connection::ConnectionStateMachine;
use super::session::{AsyncStatus, ConnStatus, Session};

/// A function call waiting for its response.
#[derive(Debug, Clone)]
pub struct FunctionCallState {
    /// Decode 1/2/4-byte results as integers
    pub result_is_int: bool,
    /// Value received so far
    pub value: Option<FunctionValue>,
}

/// Whether the response loop should keep going.
enum CallStep {
    Continue,
    Finished,
}

impl ConnectionStateMachine {
    /// Queue a fast-path call of the function with OID `fn_oid`.
    ///
    /// Poll for the outcome with [`poll_function_call`](Self::poll_function_call).
    pub fn send_function_call(
        &mut self,
        fn_oid: Oid,
        args: &[FunctionArg<'_>],
        result_is_int: bool,
    ) -> Result<()> {
        if self.session.conn_status == ConnStatus::Bad {
            return Err(Error::ConnectionBroken);
        }
        if self.session.async_status != AsyncStatus::Idle || self.session.function_call.is_some() {
            return Err(Error::InvalidUsage(
                "another command is already in progress".into(),
            ));
        }
        write_function_call(self.buffers.output.buf_mut(), fn_oid, args)?;
        self.session.reset_command();
        self.session.function_call = Some(FunctionCallState {
            result_is_int,
            value: None,
        });
        self.session.async_status = AsyncStatus::Busy;
        Ok(())
    }

    /// Process the call's response messages.
    ///
    /// Returns `None` until the closing ReadyForQuery has arrived.
    pub fn poll_function_call(&mut self) -> Result<Option<QueryResult>> {
        let Some(result_is_int) = self.session.function_call.as_ref().map(|c| c.result_is_int)
        else {
            return Err(Error::InvalidUsage("no function call in progress".into()));
        };

        loop {
            if self.session.conn_status == ConnStatus::Bad {
                return Ok(Some(self.finish_function_call()));
            }
            let Some(header) = MessageHeader::peek(self.buffers.input.available()) else {
                return Ok(None);
            };
            let tag = header.tag;
            let Some(body_len) = header.body_len(FUNCTION_CALL_BULK_TAGS) else {
                self.sync_loss(tag, header.length());
                continue;
            };
            let total = HEADER_LEN + body_len;
            if self.buffers.input.len() < total {
                if self.buffers.input.reserve(total).is_err() {
                    self.sync_loss(tag, header.length());
                    continue;
                }
                return Ok(None);
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
            match session.handle_function_message(tag, &mut reader, result_is_int) {
                Ok(step) if reader.remaining() == 0 => {
                    buffers.input.consume(total);
                    if let CallStep::Finished = step {
                        return Ok(Some(self.finish_function_call()));
                    }
                }
                _ => self.length_mismatch(tag),
            }
        }
    }

    fn finish_function_call(&mut self) -> QueryResult {
        let session = &mut self.session;
        let value = session.function_call.take().and_then(|c| c.value);
        session.async_status = AsyncStatus::Idle;
        session.result.take().unwrap_or_else(|| {
            let mut result = QueryResult::new(ResultStatus::CommandOk);
            result.function_value = value;
            result
        })
    }
}

impl Session {
    fn handle_function_message(
        &mut self,
        tag: u8,
        reader: &mut Reader<'_>,
        result_is_int: bool,
    ) -> ReadResult<CallStep> {
        match BackendTag::from_byte(tag) {
            Some(BackendTag::FunctionCallResponse) => {
                let response = FunctionCallResponse::parse(reader, result_is_int)?;
                if let Some(call) = &mut self.function_call {
                    call.value = Some(response.value);
                }
            }
            Some(BackendTag::ErrorResponse) => {
                let error = ErrorResponse::parse(reader, self.verbosity)?;
                self.result = Some(QueryResult::error(error.into_record()));
            }
            Some(BackendTag::NotificationResponse) => self.handle_notification(reader)?,
            Some(BackendTag::NoticeResponse) => self.handle_notice(reader)?,
            Some(BackendTag::ParameterStatus) => self.handle_parameter_status(reader)?,
            Some(BackendTag::ReadyForQuery) => {
                let ready = ReadyForQuery::parse(reader)?;
                self.transaction_status = ready.transaction_status();
                return Ok(CallStep::Finished);
            }
            _ => {
                self.save_error_result(&format!("protocol error: id=0x{:x}\n", tag));
                reader.skip_rest();
                return Ok(CallStep::Finished);
            }
        }
        Ok(CallStep::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::*;

    #[test]
    fn integer_result() {
        let mut conn = engine();
        conn.send_function_call(1598, &[FunctionArg::Int4(5)], true)
            .unwrap();
        assert_eq!(conn.pending_output()[0], b'F');
        assert!(matches!(conn.send_query("SELECT 1"), Err(Error::InvalidUsage(_))));

        let mut bytes = function_call_response(Some(&7i32.to_be_bytes()));
        bytes.extend(ready_for_query(b'I'));
        let (head, tail) = bytes.split_at(6);

        conn.feed(head).unwrap();
        assert!(conn.poll_function_call().unwrap().is_none());
        conn.feed(tail).unwrap();

        let result = conn.poll_function_call().unwrap().unwrap();
        assert_eq!(result.status(), ResultStatus::CommandOk);
        assert_eq!(result.function_value(), Some(&FunctionValue::Int(7)));
        assert_eq!(conn.async_status(), AsyncStatus::Idle);
        assert!(matches!(
            conn.poll_function_call(),
            Err(Error::InvalidUsage(_))
        ));
    }

    #[test]
    fn byte_and_null_results() {
        let mut conn = engine();
        conn.send_function_call(1, &[FunctionArg::Bytes(b"abc")], false)
            .unwrap();
        let mut bytes = function_call_response(Some(b"\x00\x01"));
        bytes.extend(ready_for_query(b'I'));
        conn.feed(&bytes).unwrap();
        let result = conn.poll_function_call().unwrap().unwrap();
        assert_eq!(
            result.function_value(),
            Some(&FunctionValue::Bytes(vec![0, 1]))
        );

        conn.send_function_call(1, &[FunctionArg::Null], true).unwrap();
        let mut bytes = function_call_response(None);
        bytes.extend(ready_for_query(b'I'));
        conn.feed(&bytes).unwrap();
        let result = conn.poll_function_call().unwrap().unwrap();
        assert_eq!(result.function_value(), Some(&FunctionValue::Null));
    }

    #[test]
    fn error_wins_over_value() {
        let mut conn = engine();
        conn.send_function_call(1, &[], true).unwrap();
        let mut bytes = notice_response("hello");
        bytes.extend(error_response("function does not exist"));
        bytes.extend(ready_for_query(b'I'));
        conn.feed(&bytes).unwrap();

        let result = conn.poll_function_call().unwrap().unwrap();
        assert_eq!(result.status(), ResultStatus::FatalError);
        assert_eq!(result.error_message(), "ERROR:  function does not exist\n");
    }

    #[test]
    fn unexpected_message_ends_the_call() {
        let mut conn = engine();
        conn.send_function_call(1, &[], true).unwrap();
        let mut bytes = command_complete("SELECT 1");
        bytes.extend(ready_for_query(b'I'));
        conn.feed(&bytes).unwrap();

        let result = conn.poll_function_call().unwrap().unwrap();
        assert_eq!(result.error_message(), "protocol error: id=0x43\n");
        assert_eq!(conn.async_status(), AsyncStatus::Idle);
    }

    #[test]
    fn broken_connection_ends_the_call() {
        let mut conn = engine();
        conn.send_function_call(1, &[], true).unwrap();
        conn.mark_broken(crate::state::SERVER_CLOSED);

        let result = conn.poll_function_call().unwrap().unwrap();
        assert!(result.is_error());
        assert!(matches!(
            conn.send_function_call(1, &[], true),
            Err(Error::ConnectionBroken)
        ));
    }
}
