//! Asynchronous PostgreSQL connection.

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

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

const READ_CHUNK: usize = 8192;

/// Asynchronous connection driving a [`ConnectionStateMachine`] over `S`.
pub struct Conn<S = Stream> {
    stream: S,
    engine: ConnectionStateMachine,
    opts: Opts,
}

impl Conn<Stream> {
    /// Connect to a PostgreSQL server.
    pub async fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let stream = Stream::connect(&opts).await?;
        Self::new_with_stream(stream, opts).await
    }

    /// Ask the server to cancel the command running on this connection.
    pub async fn cancel(&self) -> Result<()> {
        let key = self
            .engine
            .backend_key()
            .ok_or_else(|| Error::InvalidUsage("no backend key received".into()))?;
        let mut stream = Stream::connect(&self.opts).await?;
        let mut packet = Vec::new();
        write_cancel_request(&mut packet, key.pid, key.secret_key);
        stream.write_all(&packet).await?;
        stream.flush().await?;
        // The server closes the connection without replying. Waiting for
        // that close is best effort; the request has already been sent.
        let mut sink = [0u8; 1];
        if let Err(e) = stream.read(&mut sink).await {
            tracing::debug!("cancel connection read failed: {}", e);
        }
        if let Err(e) = stream.shutdown().await {
            tracing::debug!("cancel connection shutdown failed: {}", e);
        }
        Ok(())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Conn<S> {
    /// Connect using an existing stream.
    pub async fn new_with_stream(stream: S, opts: Opts) -> Result<Self> {
        let mut conn = Self {
            engine: ConnectionStateMachine::new(&opts),
            stream,
            opts,
        };
        conn.startup().await?;
        Ok(conn)
    }

    async fn startup(&mut self) -> Result<()> {
        self.engine.send_startup()?;
        let mut first_error = None;
        while let Some(result) = self.get_result().await {
            if let Err(e) = result.into_result() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None if self.engine.status() == ConnStatus::Bad => Err(Error::ConnectionBroken),
            None => Ok(()),
        }
    }

    /// Write every queued byte.
    pub async fn flush(&mut self) -> Result<()> {
        while !self.engine.pending_output().is_empty() {
            match self.stream.write(self.engine.pending_output()).await {
                Ok(0) => {
                    self.engine.mark_broken(SERVER_CLOSED);
                    return Err(Error::ConnectionBroken);
                }
                Ok(n) => self.engine.consume_output(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.engine
                        .mark_broken(&format!("could not send data to server: {}\n", e));
                    let _ = self.stream.shutdown().await;
                    return Err(e.into());
                }
            }
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn fill(&mut self) {
        let buf = match self.engine.read_buf(READ_CHUNK) {
            Ok(buf) => buf,
            Err(e) => {
                self.engine.mark_broken(&format!("{}\n", e));
                let _ = self.stream.shutdown().await;
                return;
            }
        };
        match self.stream.read(buf).await {
            Ok(0) => self.engine.mark_broken(SERVER_CLOSED),
            Ok(n) => self.engine.advance_read(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => self
                .engine
                .mark_broken(&format!("could not receive data from server: {}\n", e)),
        }
    }

    /// Shut the transport down once the engine has given up on it.
    async fn shutdown_if_broken(&mut self) {
        if self.engine.status() == ConnStatus::Bad {
            let _ = self.stream.shutdown().await;
        }
    }

    /// Wait for the next result of the current command.
    pub async fn get_result(&mut self) -> Option<QueryResult> {
        let _ = self.flush().await;
        loop {
            match self.engine.get_result() {
                NextResult::Ready(result) => {
                    self.shutdown_if_broken().await;
                    return Some(result);
                }
                NextResult::Done => return None,
                NextResult::NeedMoreData => self.fill().await,
            }
        }
    }

    /// Send a query and return its results in order, stopping at a COPY
    /// result.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<QueryResult>> {
        self.engine.send_query(sql)?;
        let mut results = Vec::new();
        while let Some(result) = self.get_result().await {
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

    /// Send a query and return its last result, or its first failed one.
    pub async fn exec(&mut self, sql: &str) -> Result<QueryResult> {
        let mut last: Option<QueryResult> = None;
        for result in self.query(sql).await? {
            if last.as_ref().is_some_and(QueryResult::is_error) {
                continue;
            }
            last = Some(result);
        }
        Ok(last.unwrap_or_else(|| QueryResult::new(ResultStatus::EmptyQuery)))
    }

    /// Wait for the next COPY OUT message; `None` when the copy is over.
    pub async fn get_copy_data(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.engine.get_copy_data()? {
                CopyData::Row(row) => return Ok(Some(row)),
                CopyData::Done => return Ok(None),
                CopyData::Pending => self.fill().await,
            }
        }
    }

    /// Wait for the next text COPY OUT line; `\.` marks the end.
    pub async fn get_line(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.engine.get_line()? {
                CopyLine::Line(line) => return Ok(line),
                CopyLine::Pending => self.fill().await,
            }
        }
    }

    /// Send COPY IN data.
    pub async fn put_copy_data(&mut self, data: &[u8]) -> Result<()> {
        self.engine.put_copy_data(data)?;
        self.flush().await
    }

    /// End COPY IN with CopyDone, or CopyFail carrying `error_message`.
    pub async fn put_copy_end(&mut self, error_message: Option<&str>) -> Result<()> {
        self.engine.put_copy_end(error_message)?;
        self.flush().await
    }

    /// Leave COPY mode and wait for the command's result.
    pub async fn end_copy(&mut self) -> Result<QueryResult> {
        if matches!(
            self.engine.async_status(),
            AsyncStatus::CopyIn | AsyncStatus::CopyOut
        ) {
            self.engine.end_copy()?;
        }
        let mut first = None;
        while let Some(result) = self.get_result().await {
            first.get_or_insert(result);
        }
        first
            .ok_or_else(|| Error::InvalidUsage("no COPY in progress".into()))?
            .into_result()
    }

    /// Fast-path function call.
    pub async fn fn_call(
        &mut self,
        fn_oid: Oid,
        args: &[FunctionArg<'_>],
        result_is_int: bool,
    ) -> Result<QueryResult> {
        self.engine.send_function_call(fn_oid, args, result_is_int)?;
        let _ = self.flush().await;
        loop {
            if let Some(result) = self.engine.poll_function_call()? {
                self.shutdown_if_broken().await;
                return Ok(result);
            }
            self.fill().await;
        }
    }

    /// Next notification that has already arrived.
    pub fn next_notification(&mut self) -> Option<Notification> {
        self.engine.next_notification()
    }

    /// Wait until a notification arrives.
    pub async fn wait_for_notification(&mut self) -> Result<Notification> {
        loop {
            if let Some(notification) = self.engine.next_notification() {
                return Ok(notification);
            }
            if self.engine.status() == ConnStatus::Bad {
                return Err(Error::ConnectionBroken);
            }
            self.fill().await;
        }
    }

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
    pub async fn close(mut self) -> Result<()> {
        self.engine.close();
        self.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}
