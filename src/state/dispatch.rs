//! Message framing and dispatch.
//!
//! [`ConnectionStateMachine::try_parse_one`] looks at the head of the input
//! buffer and either consumes exactly one complete message or leaves the
//! buffer untouched. Which handler runs depends on [`AsyncStatus`].

use crate::protocol::backend::{
    AuthenticationRequest, BULK_TAGS, BackendKeyData, BackendTag, CommandComplete, CopyResponse,
    ErrorResponse, HEADER_LEN, MessageHeader, ReadyForQuery, RowDescription, msg_type,
};
use crate::protocol::codec::{Incomplete, ReadResult, Reader};
use crate::result::{QueryResult, ResultStatus};

use super::connection::ConnectionStateMachine;
use super::copy::{CopyDirection, CopyState};
use super::pending_row::{PendingRow, RowStaging, StageOutcome};
use super::session::{AsyncStatus, ConnStatus, Session};

/// Outcome of one framing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The head message is not complete; nothing was consumed
    NeedMoreData,
    /// One message was consumed
    Consumed,
    /// A complete message is waiting until the caller collects the current
    /// result or leaves COPY mode
    Held,
}

/// What a handler did with a complete message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The message was handled; commit past it
    Continue,
    /// Leave the message in the buffer
    Hold,
}

/// Error text for a message whose length field cannot be trusted.
pub(crate) fn sync_loss_message(tag: u8, length: i32) -> String {
    format!(
        "lost synchronization with server: got message type \"{}\", length {}\n",
        char::from(tag),
        length
    )
}

impl ConnectionStateMachine {
    /// Process every complete message that the current state allows.
    pub(crate) fn parse_input(&mut self) {
        if self.session.function_call.is_some() {
            return;
        }
        while self.try_parse_one() == Progress::Consumed {}
    }

    /// Frame and dispatch the message at the head of the input.
    pub(crate) fn try_parse_one(&mut self) -> Progress {
        if self.session.conn_status == ConnStatus::Bad {
            return Progress::NeedMoreData;
        }
        let Some(header) = MessageHeader::peek(self.buffers.input.available()) else {
            return Progress::NeedMoreData;
        };
        let tag = header.tag;
        let Some(body_len) = header.body_len(BULK_TAGS) else {
            self.sync_loss(tag, header.length());
            return Progress::Held;
        };
        let total = HEADER_LEN + body_len;

        if self.buffers.input.len() < total {
            if self.buffers.input.reserve(total).is_err() {
                self.sync_loss(tag, header.length());
                return Progress::Held;
            }
            if tag == msg_type::DATA_ROW {
                self.stage_partial_row();
            }
            return Progress::NeedMoreData;
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
        tracing::trace!(tag = %char::from(tag), len = body_len, "message");

        match session.dispatch(tag, &mut reader) {
            Ok(Step::Hold) => Progress::Held,
            Ok(Step::Continue) if reader.remaining() == 0 => {
                buffers.input.consume(total);
                session.staging = None;
                Progress::Consumed
            }
            _ => {
                self.length_mismatch(tag);
                Progress::Held
            }
        }
    }

    /// Stage the fields of an incomplete DataRow that are already buffered.
    fn stage_partial_row(&mut self) {
        let Self {
            buffers, session, ..
        } = self;
        if session.async_status != AsyncStatus::Busy {
            return;
        }
        let nfields = match &session.result {
            Some(result) if result.status() == ResultStatus::TuplesOk => result.nfields(),
            _ => return,
        };
        let body = buffers
            .input
            .available()
            .get(HEADER_LEN..)
            .unwrap_or_default();

        let mut pending = match session.staging.take() {
            Some(RowStaging::Filling(pending)) => pending,
            Some(RowStaging::Discarding) => {
                session.staging = Some(RowStaging::Discarding);
                return;
            }
            None => PendingRow::new(),
        };
        match pending.stage(&mut Reader::new(body), nfields) {
            StageOutcome::Complete | StageOutcome::Incomplete => {
                session.staging = Some(RowStaging::Filling(pending));
            }
            StageOutcome::FieldCountMismatch => {
                session.save_error_result("unexpected field count in D message\n");
                session.staging = Some(RowStaging::Discarding);
            }
            StageOutcome::OutOfMemory => {
                session.result = None;
                session.save_error_result("out of memory for query result\n");
                session.staging = Some(RowStaging::Discarding);
            }
        }
    }

    /// Handle a message whose declared length is not believable.
    pub(crate) fn sync_loss(&mut self, tag: u8, length: i32) {
        let message = sync_loss_message(tag, length);
        tracing::warn!("{}", message.trim_end());
        self.fail(&message);
    }

    /// Handle a message whose contents disagree with its declared length.
    pub(crate) fn length_mismatch(&mut self, tag: u8) {
        let message = format!(
            "message contents do not agree with length in message type \"{}\"\n",
            char::from(tag)
        );
        tracing::warn!("{}", message.trim_end());
        self.fail(&message);
    }
}

impl Session {
    /// Route one complete message according to the dispatch state.
    fn dispatch(&mut self, tag: u8, reader: &mut Reader<'_>) -> ReadResult<Step> {
        match tag {
            msg_type::NOTIFICATION_RESPONSE => self.handle_notification(reader)?,
            msg_type::NOTICE_RESPONSE => self.handle_notice(reader)?,
            _ => match self.async_status {
                AsyncStatus::Busy => return self.handle_busy(tag, reader),
                AsyncStatus::Idle => self.handle_idle(tag, reader)?,
                AsyncStatus::Ready | AsyncStatus::CopyIn | AsyncStatus::CopyOut => {
                    return Ok(Step::Hold);
                }
            },
        }
        Ok(Step::Continue)
    }

    /// Messages outside of any command.
    ///
    /// An ErrorResponse here usually explains why the server is about to
    /// close the connection, so it is reported as a notice.
    fn handle_idle(&mut self, tag: u8, reader: &mut Reader<'_>) -> ReadResult<()> {
        match tag {
            msg_type::ERROR_RESPONSE => {
                let error = ErrorResponse::parse(reader, self.verbosity)?;
                self.emit_notice(&error.0);
            }
            msg_type::PARAMETER_STATUS => self.handle_parameter_status(reader)?,
            _ => {
                tracing::warn!(tag, "message arrived from server while idle");
                self.internal_notice(format!(
                    "message type 0x{:02x} arrived from server while idle",
                    tag
                ));
                reader.skip_rest();
            }
        }
        Ok(())
    }

    /// Messages while a command is in progress.
    fn handle_busy(&mut self, tag: u8, reader: &mut Reader<'_>) -> ReadResult<Step> {
        let Some(known) = BackendTag::from_byte(tag) else {
            self.unexpected_response(tag, reader);
            return Ok(Step::Continue);
        };

        match known {
            BackendTag::CommandComplete => {
                let complete = CommandComplete::parse(reader)?;
                self.result
                    .get_or_insert_with(|| QueryResult::new(ResultStatus::CommandOk))
                    .command_tag = complete.tag;
                self.async_status = AsyncStatus::Ready;
            }
            BackendTag::ErrorResponse => {
                let error = ErrorResponse::parse(reader, self.verbosity)?;
                self.result = Some(QueryResult::error(error.into_record()));
                self.async_status = AsyncStatus::Ready;
            }
            BackendTag::ReadyForQuery => {
                let ready = ReadyForQuery::parse(reader)?;
                self.transaction_status = ready.transaction_status();
                self.async_status = AsyncStatus::Idle;
            }
            BackendTag::EmptyQueryResponse => {
                self.result
                    .get_or_insert_with(|| QueryResult::new(ResultStatus::EmptyQuery));
                self.async_status = AsyncStatus::Ready;
            }
            BackendTag::ParseComplete | BackendTag::BindComplete | BackendTag::CloseComplete => {}
            BackendTag::ParameterStatus => self.handle_parameter_status(reader)?,
            BackendTag::BackendKeyData => {
                self.backend_key = Some(BackendKeyData::parse(reader)?);
            }
            BackendTag::Authentication => {
                let auth = AuthenticationRequest::parse(reader)?;
                if !auth.is_ok() {
                    self.save_error_result(&format!(
                        "authentication method {} not supported\n",
                        auth.code
                    ));
                    self.async_status = AsyncStatus::Ready;
                    self.conn_status = ConnStatus::Bad;
                }
            }
            BackendTag::RowDescription => {
                if self.result.is_some() {
                    // Another result set starts; hand over the current one first.
                    self.async_status = AsyncStatus::Ready;
                    return Ok(Step::Hold);
                }
                let desc = RowDescription::parse(reader)?;
                self.result = Some(QueryResult::tuples(desc.attributes, desc.binary));
            }
            BackendTag::NoData => {
                self.result
                    .get_or_insert_with(|| QueryResult::new(ResultStatus::CommandOk));
            }
            BackendTag::DataRow => self.handle_data_row(reader)?,
            BackendTag::CopyInResponse => self.handle_copy_start(CopyDirection::In, reader)?,
            BackendTag::CopyOutResponse => self.handle_copy_start(CopyDirection::Out, reader)?,
            BackendTag::CopyData => {
                tracing::debug!("discarding CopyData outside of COPY");
                reader.skip_rest();
            }
            BackendTag::CopyDone => {}
            BackendTag::NoticeResponse => self.handle_notice(reader)?,
            BackendTag::NotificationResponse => self.handle_notification(reader)?,
            BackendTag::FunctionCallResponse => self.unexpected_response(tag, reader),
        }
        Ok(Step::Continue)
    }

    fn unexpected_response(&mut self, tag: u8, reader: &mut Reader<'_>) {
        self.save_error_result(&format!(
            "unexpected response from server; first received character was \"{}\"\n",
            char::from(tag)
        ));
        self.async_status = AsyncStatus::Ready;
        reader.skip_rest();
    }

    /// Complete DataRow. Rows for a failed command are dropped silently.
    ///
    /// A body that ends before the last field is a framing error.
    fn handle_data_row(&mut self, reader: &mut Reader<'_>) -> ReadResult<()> {
        let nfields = match &self.result {
            Some(result) if result.status() == ResultStatus::TuplesOk => result.nfields(),
            Some(result) if result.status() == ResultStatus::FatalError => {
                reader.skip_rest();
                return Ok(());
            }
            _ => {
                self.save_error_result(
                    "server sent data (\"D\" message) without prior row description (\"T\" message)\n",
                );
                reader.skip_rest();
                return Ok(());
            }
        };

        let mut pending = match self.staging.take() {
            Some(RowStaging::Filling(pending)) => pending,
            Some(RowStaging::Discarding) => {
                reader.skip_rest();
                return Ok(());
            }
            None => PendingRow::new(),
        };

        match pending.stage(reader, nfields) {
            StageOutcome::Complete => {
                let stored = match self.result.as_mut() {
                    Some(result) => {
                        let room = result.rows.try_reserve(1).is_ok();
                        if room {
                            result.rows.push(pending.into_row());
                        }
                        room
                    }
                    None => false,
                };
                if !stored {
                    self.out_of_memory(reader);
                }
            }
            StageOutcome::Incomplete => return Err(Incomplete),
            StageOutcome::FieldCountMismatch => {
                self.save_error_result("unexpected field count in D message\n");
                reader.skip_rest();
            }
            StageOutcome::OutOfMemory => self.out_of_memory(reader),
        }
        Ok(())
    }

    fn out_of_memory(&mut self, reader: &mut Reader<'_>) {
        self.result = None;
        self.save_error_result("out of memory for query result\n");
        reader.skip_rest();
    }

    fn handle_copy_start(
        &mut self,
        direction: CopyDirection,
        reader: &mut Reader<'_>,
    ) -> ReadResult<()> {
        let response = CopyResponse::parse(reader)?;
        let (status, async_status) = match direction {
            CopyDirection::In => (ResultStatus::CopyIn, AsyncStatus::CopyIn),
            CopyDirection::Out => (ResultStatus::CopyOut, AsyncStatus::CopyOut),
        };
        let mut result = QueryResult::new(status);
        result.binary = response.is_binary();
        result.copy_formats = response.column_formats.clone();
        self.result = Some(result);
        self.copy = Some(CopyState::new(direction, response));
        self.async_status = async_status;
        Ok(())
    }
}
