//! Per-connection protocol state shared by the dispatcher, the COPY channel
//! and the function-call engine.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{ErrorRecord, Verbosity, field_code, format_error_message};
use crate::handler::{LogNoticeHandler, NoticeHandler};
use crate::protocol::backend::{
    BackendKeyData, NoticeResponse, NotificationResponse, ParameterStatus,
};
use crate::protocol::codec::{ReadResult, Reader};
use crate::protocol::types::TransactionStatus;
use crate::result::{QueryResult, ResultStatus};

use super::copy::CopyState;
use super::function_call::FunctionCallState;
use super::pending_row::RowStaging;

/// Which handlers may run on the next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
    /// No command in progress
    Idle,
    /// A command is in progress; every message is processed
    Busy,
    /// A result is waiting to be collected
    Ready,
    /// COPY FROM STDIN in progress
    CopyIn,
    /// COPY TO STDOUT in progress
    CopyOut,
}

/// Whether the connection can still be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    /// Usable
    Ok,
    /// Broken; nothing more will be sent or parsed
    Bad,
}

/// Asynchronous notification from LISTEN/NOTIFY.
pub type Notification = NotificationResponse;

/// Protocol state of one connection.
pub struct Session {
    pub(crate) async_status: AsyncStatus,
    pub(crate) conn_status: ConnStatus,
    pub(crate) result: Option<QueryResult>,
    pub(crate) staging: Option<RowStaging>,
    pub(crate) copy: Option<CopyState>,
    pub(crate) function_call: Option<FunctionCallState>,
    pub(crate) notifications: VecDeque<Notification>,
    pub(crate) parameters: BTreeMap<String, String>,
    pub(crate) transaction_status: TransactionStatus,
    pub(crate) backend_key: Option<BackendKeyData>,
    pub(crate) notice_handler: Box<dyn NoticeHandler + Send>,
    pub(crate) verbosity: Verbosity,
}

impl Session {
    /// Create the state of a connection that has not started up yet.
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            async_status: AsyncStatus::Idle,
            conn_status: ConnStatus::Ok,
            result: None,
            staging: None,
            copy: None,
            function_call: None,
            notifications: VecDeque::new(),
            parameters: BTreeMap::new(),
            transaction_status: TransactionStatus::Idle,
            backend_key: None,
            notice_handler: Box::new(LogNoticeHandler),
            verbosity,
        }
    }

    /// Record a locally detected error as the current result.
    ///
    /// An in-flight failed result is extended rather than replaced, so the
    /// first error the caller sees is the one that caused the failure.
    pub(crate) fn save_error_result(&mut self, message: &str) {
        match &mut self.result {
            Some(result) if result.status() == ResultStatus::FatalError => match &mut result.error {
                Some(record) => record.append_message(message),
                None => result.error = Some(ErrorRecord::local(message)),
            },
            _ => self.result = Some(QueryResult::error(ErrorRecord::local(message))),
        }
    }

    /// Drop everything tied to the current command.
    pub(crate) fn reset_command(&mut self) {
        self.result = None;
        self.staging = None;
        self.copy = None;
    }

    /// Pass a notice to the handler.
    pub(crate) fn emit_notice(&mut self, notice: &ErrorRecord) {
        self.notice_handler.notice(notice);
    }

    /// Report a client-side notice through the handler.
    pub(crate) fn internal_notice(&mut self, message: String) {
        let mut record = ErrorRecord::from_fields(vec![
            (field_code::SEVERITY, "NOTICE".to_string()),
            (field_code::MESSAGE, message),
        ]);
        let composed = format_error_message(&record, self.verbosity);
        record.set_message(composed);
        self.emit_notice(&record);
    }

    /// Handle a NoticeResponse body.
    pub(crate) fn handle_notice(&mut self, reader: &mut Reader<'_>) -> ReadResult<()> {
        let notice = NoticeResponse::parse(reader, self.verbosity)?;
        self.emit_notice(&notice.0);
        Ok(())
    }

    /// Handle a NotificationResponse body.
    pub(crate) fn handle_notification(&mut self, reader: &mut Reader<'_>) -> ReadResult<()> {
        let notification = NotificationResponse::parse(reader)?;
        tracing::debug!(channel = %notification.channel, "notification received");
        self.notifications.push_back(notification);
        Ok(())
    }

    /// Handle a ParameterStatus body.
    pub(crate) fn handle_parameter_status(&mut self, reader: &mut Reader<'_>) -> ReadResult<()> {
        let ParameterStatus { name, value } = ParameterStatus::parse(reader)?;
        self.parameters.insert(name, value);
        Ok(())
    }
}
