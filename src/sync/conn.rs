//! Synchronous PostgreSQL connection.

use std::io::{ErrorKind, Read, Write};

use crate::error::{Error, Result};
use crate::handler::NoticeHandler;
use crate::opts::Opts;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::{FunctionArg, write_cancel_request};
use crate::protocol::types::{Oid, TransactionStatus};
use crate::result::{QueryResult, ResultStatus};
use crate::state::{
    AsyncStatus, ConnStatus, ConnectionStateMachine, CopyData, CopyLine, NextResult, Notification,
    SERVER_CLOSED,
};

use super::stream::Stream;

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 8192;

/// Blocking connection driving a [`ConnectionStateMachine`] over `S`.
pub struct Conn<S = Stream> {
    stream: S,
    engine: ConnectionStateMachine,
    opts: Opts,
}

impl Conn<Stream> {
    /// Connect to the server described by `opts` and run the startup
    /// exchange.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let stream = Stream::connect(&opts)?;
        Self::new_with_stream(stream, opts)
    }

    /// Ask the server to cancel the command running on this connection.
    ///
    /// Opens a separate connection; the outcome, if any, shows up as an
    /// error result of the cancelled command.
    pub fn cancel(&self) -> Result<()> {
        let key = self
            .engine
            .backend_key()
            .ok_or_else(|| Error::InvalidUsage("no backend key received".into()))?;
        let mut stream = Stream::connect(&self.opts)?;
        let mut packet = Vec::new();
        write_cancel_request(&mut packet, key.pid, key.secret_key);
        stream.write_all(&packet)?;
        stream.flush()?;
        // The server closes the connection without replying. Waiting for
        // that close is best effort; the request has already been sent.
        let mut sink = [0u8; 1];
        if let Err(e) = stream.read(&mut sink) {
            tracing::debug!("cancel connection read failed: {}", e);
        }
        if let Err(e) = stream.shutdown() {
            tracing::debug!("cancel connection shutdown failed: {}", e);
        }
        Ok(())
    }
}

impl<S: Read + Write> Conn<S> {
    /// Run the startup exchange over an already open transport.
    pub fn new_with_stream(stream: S, opts: Opts) -> Result<Self> {
        let mut conn = Self::new_unstarted(stream, opts);
        conn.startup()?;
        Ok(conn)
    }

    /// Wrap a transport without sending anything.
    pub fn new_unstarted(stream: S, opts: Opts) -> Self {
        let engine = ConnectionStateMachine::new(&opts);
        Self {
            stream,
            engine,
            opts,
        }
    }

    /// Send the startup packet and wait for the server to become ready.
    ///
    /// The first failed result is returned as [`Error::Server`].
    pub fn startup(&mut self) -> Result<()> {
        self.engine.send_startup()?;
        let mut first_error = None;
        while let Some(result) = self.get_result() {
            if let Err(e) = result.into_result() {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if self.engine.status() == ConnStatus::Bad {
            return Err(Error::ConnectionBroken);
        }
        tracing::debug!(
            backend_pid = self.engine.backend_key().map_or(0, |k| k.pid),
            "startup complete"
        );
        Ok(())
    }

    // === Transport ===

    /// Write every queued byte.
    ///
    /// A write failure breaks the connection.
    pub fn flush(&mut self) -> Result<()> {
        while !self.engine.pending_output().is_empty() {
            match self.stream.write(self.engine.pending_output()) {
                Ok(0) => {
                    self.engine.mark_broken(SERVER_CLOSED);
                    return Err(Error::ConnectionBroken);
                }
                Ok(n) => self.engine.consume_output(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.engine
                        .mark_broken(&format!("could not send data to server: {}\n", e));
                    return Err(e.into());
                }
            }
        }
        self.stream.flush()?;
        Ok(())
    }

    /// Block until some bytes arrive. End of file or a read failure breaks
    /// the connection, which the engine reports through its results.
    fn fill(&mut self) {
        let buf = match self.engine.read_buf(READ_CHUNK) {
            Ok(buf) => buf,
            Err(e) => {
                self.engine.mark_broken(&format!("{}\n", e));
                return;
            }
        };
        match self.stream.read(buf) {
            Ok(0) => self.engine.mark_broken(SERVER_CLOSED),
            Ok(n) => self.engine.advance_read(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => self
                .engine
                .mark_broken(&format!("could not receive data from server: {}\n", e)),
        }
    }

    // === Queries ===

    /// Block for the next result of the current command.
    ///
    /// `None` once the command is complete. During COPY the copy result is
    /// returned until the copy is finished.
    pub fn get_result(&mut self) -> Option<QueryResult> {
        // A failed write is recorded by the engine and surfaces as a result.
        let _ = self.flush();
        loop {
            match self.engine.get_result() {
                NextResult::Ready(result) => return Some(result),
                NextResult::Done => return None,
                NextResult::NeedMoreData => self.fill(),
            }
        }
    }

    /// Send a query and return its results in order.
    ///
    /// Collection stops at a COPY result; continue with the copy operations.
    pub fn query(&mut self, sql: &str) -> Result<Vec<QueryResult>> {
        self.engine.send_query(sql)?;
        let mut results = Vec::new();
        while let Some(result) = self.get_result() {
            let copy = matches!(
                result.status(),
                ResultStatus::CopyIn | ResultStatus::CopyOut
            );
            results.push(result);
            if copy {
                break;
            }
        }
        Ok(results)
    }

    /// Send a query and return its last result.
    ///
    /// The first failed result is kept over anything that follows it.
    pub fn exec(&mut self, sql: &str) -> Result<QueryResult> {
        let mut last: Option<QueryResult> = None;
        for result in self.query(sql)? {
            if last.as_ref().is_some_and(QueryResult::is_error) {
                continue;
            }
            last = Some(result);
        }
        Ok(last.unwrap_or_else(|| QueryResult::new(ResultStatus::EmptyQuery)))
    }

    // === COPY ===

    /// Block for the next COPY OUT message; `None` when the copy is over.
    pub fn get_copy_data(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.engine.get_copy_data()? {
                CopyData::Row(row) => return Ok(Some(row)),
                CopyData::Done => return Ok(None),
                CopyData::Pending => self.fill(),
            }
        }
    }

    /// Block for the next text COPY OUT line, without its newline.
    ///
    /// The end of the copy is reported as `\.`.
    pub fn get_line(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.engine.get_line()? {
                CopyLine::Line(line) => return Ok(line),
                CopyLine::Pending => self.fill(),
            }
        }
    }

    /// Send COPY IN data.
    pub fn put_copy_data(&mut self, data: &[u8]) -> Result<()> {
        self.engine.put_copy_data(data)?;
        self.flush()
    }

    /// End COPY IN with CopyDone, or with CopyFail when `error_message` is
    /// given.
    pub fn put_copy_end(&mut self, error_message: Option<&str>) -> Result<()> {
        self.engine.put_copy_end(error_message)?;
        self.flush()
    }

    /// Leave COPY mode and wait for the command to finish.
    ///
    /// Returns the command's result, or its error as [`Error::Server`].
    pub fn end_copy(&mut self) -> Result<QueryResult> {
        if matches!(
            self.engine.async_status(),
            AsyncStatus::CopyIn | AsyncStatus::CopyOut
        ) {
            self.engine.end_copy()?;
        }
        let mut first = None;
        while let Some(result) = self.get_result() {
            first.get_or_insert(result);
        }
        first
            .ok_or_else(|| Error::InvalidUsage("no COPY in progress".into()))?
            .into_result()
    }

    // === Function calls ===

    /// Call the function with OID `fn_oid` through the fast-path interface.
    ///
    /// With `result_is_int`, a 1-, 2- or 4-byte result is decoded as an
    /// integer.
    pub fn fn_call(
        &mut self,
        fn_oid: Oid,
        args: &[FunctionArg<'_>],
        result_is_int: bool,
    ) -> Result<QueryResult> {
        self.engine.send_function_call(fn_oid, args, result_is_int)?;
        let _ = self.flush();
        loop {
            if let Some(result) = self.engine.poll_function_call()? {
                return Ok(result);
            }
            self.fill();
        }
    }

    // === Notifications ===

    /// Next notification that has already arrived.
    pub fn next_notification(&mut self) -> Option<Notification> {
        self.engine.next_notification()
    }

    /// Block until a notification arrives.
    pub fn wait_for_notification(&mut self) -> Result<Notification> {
        loop {
            if let Some(notification) = self.engine.next_notification() {
                return Ok(notification);
            }
            if self.engine.status() == ConnStatus::Bad {
                return Err(Error::ConnectionBroken);
            }
            self.fill();
        }
    }

    // === Connection state ===

    /// Current value of a server parameter.
    pub fn parameter_status(&self, name: &str) -> Option<&str> {
        self.engine.parameter_status(name)
    }

    /// Get the current transaction status.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.engine.transaction_status()
    }

    /// Get the backend key data for query cancellation.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.engine.backend_key()
    }

    /// Check if the connection is broken.
    pub fn is_broken(&self) -> bool {
        self.engine.status() == ConnStatus::Bad
    }

    /// Replace the notice handler, returning the previous one.
    pub fn set_notice_handler(
        &mut self,
        handler: Box<dyn NoticeHandler + Send>,
    ) -> Box<dyn NoticeHandler + Send> {
        self.engine.set_notice_handler(handler)
    }

    /// The underlying protocol engine.
    pub fn engine(&mut self) -> &mut ConnectionStateMachine {
        &mut self.engine
    }

    /// Close the connection gracefully.
    pub fn close(mut self) -> Result<()> {
        self.engine.close();
        self.flush()
    }
}
