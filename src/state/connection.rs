//! Sans-I/O connection engine.
//!
//! The engine owns the input and output buffers and never blocks. A driver
//! moves bytes between the transport and the buffers:
//!
//! ```text
//! loop {
//!     write engine.pending_output(), then engine.consume_output(n)
//!     match engine.get_result() {
//!         NextResult::Ready(r) => ...,
//!         NextResult::Done => break,
//!         NextResult::NeedMoreData => read into engine.read_buf(..), engine.advance_read(n)
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result, Verbosity};
use crate::handler::NoticeHandler;
use crate::opts::Opts;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::{StartupParams, write_query, write_startup_message, write_terminate};
use crate::protocol::types::TransactionStatus;
use crate::result::{QueryResult, ResultStatus};

use super::session::{AsyncStatus, ConnStatus, Notification, Session};

/// Message sent when the transport reaches end of file.
pub const SERVER_CLOSED: &str = "server closed the connection unexpectedly\n\
    \tThis probably means the server terminated abnormally\n\
    \tbefore or while processing the request.\n";

/// Outcome of [`ConnectionStateMachine::get_result`].
#[derive(Debug)]
pub enum NextResult {
    /// A completed result
    Ready(QueryResult),
    /// The current command needs more input before anything can be returned
    NeedMoreData,
    /// No command is in progress
    Done,
}

/// Protocol engine for one connection.
pub struct ConnectionStateMachine {
    pub(crate) buffers: BufferSet,
    pub(crate) session: Session,
    startup: StartupParams,
}

impl ConnectionStateMachine {
    /// Create an engine for the given options.
    ///
    /// Environment-derived startup parameters are read here, once.
    pub fn new(opts: &Opts) -> Self {
        Self::with_startup(opts, StartupParams::from_opts(opts))
    }

    /// Create an engine with explicitly resolved startup parameters.
    pub fn with_startup(opts: &Opts, startup: StartupParams) -> Self {
        Self {
            buffers: BufferSet::new(opts.max_message_len),
            session: Session::new(opts.verbosity),
            startup,
        }
    }

    // === Input ===

    /// Room for the transport to read at least `min` bytes into.
    pub fn read_buf(&mut self, min: usize) -> Result<&mut [u8]> {
        self.buffers.input.read_buf(min)
    }

    /// Mark `n` bytes of [`read_buf`](Self::read_buf) as received.
    pub fn advance_read(&mut self, n: usize) {
        self.buffers.input.advance_read(n);
    }

    /// Append received bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffers.input.extend(bytes)
    }

    // === Output ===

    /// Bytes waiting to be written to the server.
    pub fn pending_output(&self) -> &[u8] {
        self.buffers.output.pending()
    }

    /// Record that the transport wrote `n` bytes of [`pending_output`](Self::pending_output).
    pub fn consume_output(&mut self, n: usize) {
        self.buffers.output.consume(n);
    }

    // === Commands ===

    fn check_can_send(&self) -> Result<()> {
        if self.session.conn_status == ConnStatus::Bad {
            return Err(Error::ConnectionBroken);
        }
        if self.session.async_status != AsyncStatus::Idle || self.session.function_call.is_some() {
            return Err(Error::InvalidUsage(
                "another command is already in progress".into(),
            ));
        }
        Ok(())
    }

    /// Queue the startup packet. Results are then collected with
    /// [`get_result`](Self::get_result) until it reports `Done`.
    pub fn send_startup(&mut self) -> Result<()> {
        self.check_can_send()?;
        write_startup_message(self.buffers.output.buf_mut(), &self.startup)?;
        self.session.reset_command();
        self.session.async_status = AsyncStatus::Busy;
        Ok(())
    }

    /// Queue a simple query.
    pub fn send_query(&mut self, sql: &str) -> Result<()> {
        self.check_can_send()?;
        write_query(self.buffers.output.buf_mut(), sql);
        self.session.reset_command();
        self.session.async_status = AsyncStatus::Busy;
        tracing::trace!(sql, "query queued");
        Ok(())
    }

    /// Next result of the current command.
    ///
    /// After a fatal protocol error the diagnostic result is returned once;
    /// every later call reports [`NextResult::Done`].
    pub fn get_result(&mut self) -> NextResult {
        self.parse_input();

        let session = &mut self.session;
        match session.async_status {
            AsyncStatus::Idle => NextResult::Done,
            AsyncStatus::Busy => NextResult::NeedMoreData,
            AsyncStatus::Ready => {
                let result = session
                    .result
                    .take()
                    .unwrap_or_else(|| QueryResult::new(ResultStatus::CommandOk));
                session.async_status = match session.conn_status {
                    ConnStatus::Ok => AsyncStatus::Busy,
                    ConnStatus::Bad => AsyncStatus::Idle,
                };
                NextResult::Ready(result)
            }
            AsyncStatus::CopyIn | AsyncStatus::CopyOut => {
                let status = if session.async_status == AsyncStatus::CopyIn {
                    ResultStatus::CopyIn
                } else {
                    ResultStatus::CopyOut
                };
                let result = match session.result.take() {
                    Some(result) if result.status() == status => result,
                    _ => {
                        let mut result = QueryResult::new(status);
                        if let Some(copy) = &session.copy {
                            result.binary = copy.is_binary;
                            result.copy_formats = copy.column_formats.clone();
                        }
                        result
                    }
                };
                NextResult::Ready(result)
            }
        }
    }

    /// Whether [`get_result`](Self::get_result) would need more input.
    pub fn is_busy(&mut self) -> bool {
        self.parse_input();
        self.session.async_status == AsyncStatus::Busy
    }

    /// Queue a Terminate message. The connection is unusable afterwards.
    pub fn close(&mut self) {
        if self.session.conn_status == ConnStatus::Ok {
            write_terminate(self.buffers.output.buf_mut());
        }
        self.session.reset_command();
        self.session.function_call = None;
        self.session.conn_status = ConnStatus::Bad;
        self.session.async_status = AsyncStatus::Idle;
    }

    /// Report a transport failure.
    ///
    /// The next [`get_result`](Self::get_result) returns a failed result
    /// carrying `reason`, whether or not a command was in progress.
    pub fn mark_broken(&mut self, reason: &str) {
        if self.session.conn_status == ConnStatus::Bad {
            return;
        }
        tracing::warn!("connection lost: {}", reason.trim_end());
        self.fail(reason);
    }

    /// Poison the connection: record `message` as an error result, stop
    /// parsing and drop both buffers.
    pub(crate) fn fail(&mut self, message: &str) {
        let session = &mut self.session;
        session.save_error_result(message);
        session.async_status = AsyncStatus::Ready;
        session.staging = None;
        session.copy = None;
        session.conn_status = ConnStatus::Bad;
        self.buffers.input.clear();
        self.buffers.output.clear();
    }

    // === Side channels ===

    /// Next queued notification.
    pub fn next_notification(&mut self) -> Option<Notification> {
        self.parse_input();
        self.session.notifications.pop_front()
    }

    /// Current value of a server parameter.
    pub fn parameter_status(&self, name: &str) -> Option<&str> {
        self.session.parameters.get(name).map(String::as_str)
    }

    /// All server parameters reported so far.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.session.parameters
    }

    /// Transaction status as of the last ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        if self.session.conn_status == ConnStatus::Bad {
            TransactionStatus::Unknown
        } else if self.session.async_status != AsyncStatus::Idle
            || self.session.function_call.is_some()
        {
            TransactionStatus::Active
        } else {
            self.session.transaction_status
        }
    }

    /// Backend process ID and cancel key.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.session.backend_key
    }

    /// Connection status.
    pub fn status(&self) -> ConnStatus {
        self.session.conn_status
    }

    /// Dispatch state.
    pub fn async_status(&self) -> AsyncStatus {
        self.session.async_status
    }

    /// Replace the notice handler, returning the previous one.
    pub fn set_notice_handler(
        &mut self,
        handler: Box<dyn NoticeHandler + Send>,
    ) -> Box<dyn NoticeHandler + Send> {
        core::mem::replace(&mut self.session.notice_handler, handler)
    }

    /// Set the verbosity of composed error messages, returning the previous one.
    pub fn set_verbosity(&mut self, verbosity: Verbosity) -> Verbosity {
        core::mem::replace(&mut self.session.verbosity, verbosity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ConnectionStateMachine {
        ConnectionStateMachine::with_startup(&Opts::default(), StartupParams::default())
    }

    #[test]
    fn query_requires_idle() {
        let mut conn = engine();
        conn.send_query("SELECT 1").unwrap();
        assert!(matches!(
            conn.send_query("SELECT 2"),
            Err(Error::InvalidUsage(_))
        ));
        assert_eq!(conn.transaction_status(), TransactionStatus::Active);
        assert_eq!(conn.pending_output()[0], b'Q');
    }

    #[test]
    fn broken_connection_delivers_one_error() {
        let mut conn = engine();
        conn.send_query("SELECT 1").unwrap();
        conn.mark_broken(SERVER_CLOSED);

        let NextResult::Ready(result) = conn.get_result() else {
            panic!("expected an error result");
        };
        assert!(result.error_message().starts_with("server closed the connection"));
        assert!(matches!(conn.get_result(), NextResult::Done));
        assert!(matches!(conn.send_query("SELECT 1"), Err(Error::ConnectionBroken)));
        assert_eq!(conn.transaction_status(), TransactionStatus::Unknown);
        assert!(conn.pending_output().is_empty());
    }

    #[test]
    fn close_queues_terminate() {
        let mut conn = engine();
        conn.close();
        assert_eq!(conn.pending_output(), [b'X', 0, 0, 0, 4]);
        assert_eq!(conn.status(), ConnStatus::Bad);
    }

    #[test]
    fn idle_engine_is_done() {
        let mut conn = engine();
        assert!(matches!(conn.get_result(), NextResult::Done));
        assert!(!conn.is_busy());
    }
}
