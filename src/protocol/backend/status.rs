//! Session-level backend messages: authentication, key data, parameter
//! status, ready-for-query, notifications and function-call results.

use crate::protocol::codec::{ReadResult, Reader};
use crate::protocol::types::TransactionStatus;
use crate::result::FunctionValue;

/// Authentication request codes.
pub mod auth_type {
    pub const OK: i32 = 0;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const SASL: i32 = 10;
}

/// Authentication message from the server.
///
/// Only the request code is decoded; anything other than
/// [`auth_type::OK`] is reported as unsupported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticationRequest {
    /// Request code
    pub code: i32,
}

impl AuthenticationRequest {
    /// Parse an Authentication body. Method-specific payload is skipped.
    pub fn parse(reader: &mut Reader<'_>) -> ReadResult<Self> {
        let code = reader.read_i32()?;
        reader.skip_rest();
        Ok(Self { code })
    }

    /// Whether authentication has completed.
    pub fn is_ok(&self) -> bool {
        self.code == auth_type::OK
    }
}

/// BackendKeyData message - contains process ID and secret key for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// Process ID of the backend
    pub pid: i32,
    /// Secret key for cancellation
    pub secret_key: i32,
}

impl BackendKeyData {
    /// Parse a BackendKeyData body.
    pub fn parse(reader: &mut Reader<'_>) -> ReadResult<Self> {
        Ok(Self {
            pid: reader.read_i32()?,
            secret_key: reader.read_i32()?,
        })
    }
}

/// ParameterStatus message - server parameter name and value.
#[derive(Debug, Clone)]
pub struct ParameterStatus {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: String,
}

impl ParameterStatus {
    /// Parse a ParameterStatus body.
    pub fn parse(reader: &mut Reader<'_>) -> ReadResult<Self> {
        let name = reader.read_string()?;
        let value = reader.read_string()?;
        Ok(Self { name, value })
    }
}

/// ReadyForQuery message - indicates server is ready for a new query.
#[derive(Debug, Clone, Copy)]
pub struct ReadyForQuery {
    /// Transaction status byte
    pub status: u8,
}

impl ReadyForQuery {
    /// Parse a ReadyForQuery body.
    pub fn parse(reader: &mut Reader<'_>) -> ReadResult<Self> {
        Ok(Self {
            status: reader.read_u8()?,
        })
    }

    /// Get the transaction status.
    pub fn transaction_status(&self) -> TransactionStatus {
        TransactionStatus::from_byte(self.status)
    }
}

/// NotificationResponse message - asynchronous notification from LISTEN/NOTIFY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    /// PID of the notifying backend
    pub backend_pid: i32,
    /// Channel name
    pub channel: String,
    /// Notification payload
    pub payload: String,
}

impl NotificationResponse {
    /// Parse a NotificationResponse body.
    pub fn parse(reader: &mut Reader<'_>) -> ReadResult<Self> {
        let backend_pid = reader.read_i32()?;
        let channel = reader.read_string()?;
        let payload = reader.read_string()?;
        Ok(Self {
            backend_pid,
            channel,
            payload,
        })
    }
}

/// FunctionCallResponse message - the value returned by a fast-path call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCallResponse {
    /// Returned value
    pub value: FunctionValue,
}

impl FunctionCallResponse {
    /// Parse a FunctionCallResponse body.
    ///
    /// With `result_is_int`, a 1-, 2- or 4-byte value is decoded as a
    /// big-endian integer; any other width is kept as raw bytes.
    pub fn parse(reader: &mut Reader<'_>, result_is_int: bool) -> ReadResult<Self> {
        let len = reader.read_i32()?;
        let value = match len {
            -1 => FunctionValue::Null,
            1 if result_is_int => FunctionValue::Int(i32::from(reader.read_u8()?)),
            2 if result_is_int => FunctionValue::Int(i32::from(reader.read_i16()?)),
            4 if result_is_int => FunctionValue::Int(reader.read_i32()?),
            _ => {
                let len = usize::try_from(len).unwrap_or(0);
                FunctionValue::Bytes(reader.read_bytes(len)?.to_vec())
            }
        };
        Ok(Self { value })
    }
}
