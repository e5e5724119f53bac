//! Scripted backend for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::rc::Rc;

use zero_pq::Opts;
use zero_pq::protocol::backend::msg_type;
use zero_pq::protocol::codec::MessageBuilder;

pub fn opts() -> Opts {
    Opts {
        user: "postgres".into(),
        database: Some("app".into()),
        env_options: Vec::new(),
        ..Default::default()
    }
}

/// In-memory transport. Each segment is one server reply; reads return at
/// most `chunk` bytes and never cross into the next segment. Writes are
/// recorded.
pub struct ScriptedStream {
    segments: VecDeque<Vec<u8>>,
    current: VecDeque<u8>,
    chunk: usize,
    written: Rc<RefCell<Vec<u8>>>,
}

impl ScriptedStream {
    pub fn new(segments: Vec<Vec<u8>>, chunk: usize) -> (Self, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::default();
        let stream = Self {
            segments: segments.into(),
            current: VecDeque::new(),
            chunk,
            written: Rc::clone(&written),
        };
        (stream, written)
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.current.is_empty() {
            match self.segments.pop_front() {
                Some(segment) => self.current = segment.into(),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk).min(self.current.len());
        for (slot, byte) in buf.iter_mut().zip(self.current.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Tags of the frontend messages in `bytes`, skipping the leading startup
/// packet when `startup` is set.
pub fn frontend_tags(bytes: &[u8], startup: bool) -> Vec<u8> {
    let mut rest = bytes;
    if startup {
        let len = i32::from_be_bytes(rest[..4].try_into().unwrap()) as usize;
        rest = &rest[len..];
    }
    let mut tags = Vec::new();
    while rest.len() >= 5 {
        tags.push(rest[0]);
        let len = i32::from_be_bytes(rest[1..5].try_into().unwrap()) as usize;
        rest = &rest[1 + len..];
    }
    tags
}

pub fn startup_response() -> Vec<u8> {
    let mut bytes = authentication_ok();
    bytes.extend(parameter_status("server_version", "16.2"));
    bytes.extend(parameter_status("client_encoding", "UTF8"));
    bytes.extend(backend_key_data(4242, 0x1234_5678));
    bytes.extend(ready_for_query(b'I'));
    bytes
}

pub fn authentication_ok() -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::AUTHENTICATION);
    msg.write_i32(0);
    msg.finish();
    buf
}

pub fn backend_key_data(pid: i32, secret: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::BACKEND_KEY_DATA);
    msg.write_i32(pid);
    msg.write_i32(secret);
    msg.finish();
    buf
}

pub fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::PARAMETER_STATUS);
    msg.write_cstr(name);
    msg.write_cstr(value);
    msg.finish();
    buf
}

pub fn row_description(names: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::ROW_DESCRIPTION);
    msg.write_i16(names.len() as i16);
    for name in names {
        msg.write_cstr(name);
        msg.write_u32(16384);
        msg.write_i16(1);
        msg.write_u32(25);
        msg.write_i16(-1);
        msg.write_i32(-1);
        msg.write_i16(0);
    }
    msg.finish();
    buf
}

pub fn data_row(values: &[Option<&[u8]>]) -> Vec<u8> {
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

pub fn command_complete(tag: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::COMMAND_COMPLETE);
    msg.write_cstr(tag);
    msg.finish();
    buf
}

pub fn ready_for_query(status: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::READY_FOR_QUERY);
    msg.write_u8(status);
    msg.finish();
    buf
}

pub fn error_response(severity: &str, code: &str, message: &str) -> Vec<u8> {
    fields_message(
        msg_type::ERROR_RESPONSE,
        &[(b'S', severity), (b'C', code), (b'M', message)],
    )
}

pub fn notice_response(message: &str) -> Vec<u8> {
    fields_message(
        msg_type::NOTICE_RESPONSE,
        &[(b'S', "NOTICE"), (b'C', "00000"), (b'M', message)],
    )
}

fn fields_message(tag: u8, fields: &[(u8, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, tag);
    for (code, value) in fields {
        msg.write_u8(*code);
        msg.write_cstr(value);
    }
    msg.write_u8(0);
    msg.finish();
    buf
}

pub fn notification(pid: i32, channel: &str, payload: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::NOTIFICATION_RESPONSE);
    msg.write_i32(pid);
    msg.write_cstr(channel);
    msg.write_cstr(payload);
    msg.finish();
    buf
}

pub fn copy_response(tag: u8, columns: i16) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, tag);
    msg.write_u8(0);
    msg.write_i16(columns);
    for _ in 0..columns {
        msg.write_i16(0);
    }
    msg.finish();
    buf
}

pub fn copy_data(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::COPY_DATA);
    msg.write_bytes(data);
    msg.finish();
    buf
}

pub fn copy_done() -> Vec<u8> {
    vec![msg_type::COPY_DONE, 0, 0, 0, 4]
}

pub fn function_call_response(value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut msg = MessageBuilder::new(&mut buf, msg_type::FUNCTION_CALL_RESPONSE);
    msg.write_i32(value.len() as i32);
    msg.write_bytes(value);
    msg.finish();
    buf
}
