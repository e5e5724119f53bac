//! PostgreSQL frontend (client → server) messages.

pub mod function;
pub mod query;
pub mod startup;

pub use function::{FunctionArg, write_function_call};
pub use query::{write_copy_data, write_copy_end, write_query};
pub use startup::{
    StartupParams, build_startup_packet, write_cancel_request, write_startup_message,
    write_terminate,
};

/// Frontend message type bytes.
pub mod msg_type {
    /// Query (simple query protocol)
    pub const QUERY: u8 = b'Q';
    /// Function call
    pub const FUNCTION_CALL: u8 = b'F';
    /// CopyData
    pub const COPY_DATA: u8 = b'd';
    /// CopyDone
    pub const COPY_DONE: u8 = b'c';
    /// CopyFail
    pub const COPY_FAIL: u8 = b'f';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}
