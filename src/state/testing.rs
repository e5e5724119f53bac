//! Backend message encoders for engine tests.

use crate::opts::Opts;
use crate::protocol::backend::msg_type;
use crate::protocol::codec::MessageBuilder;
use crate::protocol::frontend::StartupParams;

use super::connection::ConnectionStateMachine;

pub(crate) fn engine() -> ConnectionStateMachine {
    ConnectionStateMachine::with_startup(&Opts::default(), StartupParams::default())
}

/// Engine with a query in flight and its output discarded.
pub(crate) fn busy_engine() -> ConnectionStateMachine {
    let mut conn = engine();
    conn.send_query("SELECT").unwrap();
    let n = conn.pending_output().len();
    conn.consume_output(n);
    conn
}

pub(crate) fn row_description(names: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::ROW_DESCRIPTION);
    msg.write_i16(names.len() as i16);
    for name in names {
        msg.write_cstr(name);
        msg.write_u32(0);
        msg.write_i16(0);
        msg.write_u32(25);
        msg.write_i16(-1);
        msg.write_i32(-1);
        msg.write_i16(0);
    }
    msg.finish();
    buf
}

pub(crate) fn data_row(values: &[Option<&[u8]>]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::DATA_ROW);
    msg.write_i16(values.len() as i16);
    for value in values {
        match value {
            Some(v) => {
                msg.write_i32(v.len() as i32);
                msg.write_bytes(v);
            }
            None => msg.write_i32(-1),
        }
    }
    msg.finish();
    buf
}

pub(crate) fn command_complete(tag: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::COMMAND_COMPLETE);
    msg.write_cstr(tag);
    msg.finish();
    buf
}

pub(crate) fn ready_for_query(status: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::READY_FOR_QUERY);
    msg.write_u8(status);
    msg.finish();
    buf
}

pub(crate) fn error_response(message: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::ERROR_RESPONSE);
    for (code, value) in [(b'S', "ERROR"), (b'C', "42601"), (b'M', message)] {
        msg.write_u8(code);
        msg.write_cstr(value);
    }
    msg.write_u8(0);
    msg.finish();
    buf
}

pub(crate) fn notice_response(message: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::NOTICE_RESPONSE);
    for (code, value) in [(b'S', "NOTICE"), (b'M', message)] {
        msg.write_u8(code);
        msg.write_cstr(value);
    }
    msg.write_u8(0);
    msg.finish();
    buf
}

pub(crate) fn notification(pid: i32, channel: &str, payload: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::NOTIFICATION_RESPONSE);
    msg.write_i32(pid);
    msg.write_cstr(channel);
    msg.write_cstr(payload);
    msg.finish();
    buf
}

pub(crate) fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::PARAMETER_STATUS);
    msg.write_cstr(name);
    msg.write_cstr(value);
    msg.finish();
    buf
}

pub(crate) fn copy_response(tag: u8, binary: bool, columns: i16) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, tag);
    msg.write_u8(u8::from(binary));
    msg.write_i16(columns);
    for _ in 0..columns {
        msg.write_i16(i16::from(binary));
    }
    msg.finish();
    buf
}

pub(crate) fn copy_data(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::COPY_DATA);
    msg.write_bytes(data);
    msg.finish();
    buf
}

pub(crate) fn copy_done() -> Vec<u8> {
    vec![msg_type::COPY_DONE, 0, 0, 0, 4]
}

pub(crate) fn function_call_response(value: Option<&[u8]>) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::FUNCTION_CALL_RESPONSE);
    match value {
        Some(v) => {
            msg.write_i32(v.len() as i32);
            msg.write_bytes(v);
        }
        None => msg.write_i32(-1),
    }
    msg.finish();
    buf
}
