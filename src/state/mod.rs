//! Sans-I/O protocol engine.
//!
//! [`ConnectionStateMachine`] turns bytes received from the server into
//! results, notices, notifications and COPY data, and queues the bytes to
//! send back. It performs no I/O and never blocks: every operation either
//! makes progress on what is buffered or reports that more input is needed.

pub mod connection;
pub mod copy;
pub mod dispatch;
pub mod function_call;
pub mod pending_row;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionStateMachine, NextResult, SERVER_CLOSED};
pub use copy::{CopyChunk, CopyData, CopyDirection, CopyLine, CopyState, END_OF_COPY_MARKER};
pub use dispatch::Progress;
pub use function_call::FunctionCallState;
pub use pending_row::{PendingRow, RowStaging, StageOutcome};
pub use session::{AsyncStatus, ConnStatus, Notification};
