//! Startup, cancel and termination messages.
//!
//! The startup payload is produced by a single field-enumeration function
//! run twice: once against [`Measure`] to learn the exact size, then against
//! [`Fill`] writing into a buffer of exactly that size. Both passes see the
//! same [`StartupParams`], which resolves environment variables up front.

use crate::error::{Error, Result};
use crate::opts::{EnvOption, Opts};
use crate::protocol::codec::MessageBuilder;

/// Protocol version 3.0 (0x00030000)
pub const PROTOCOL_VERSION_3_0: i32 = 196608;

/// Cancel request code
pub const CANCEL_REQUEST_CODE: i32 = 80877102;

/// Destination of the startup field enumeration.
pub trait PacketSink {
    /// Append a big-endian i32.
    fn put_i32(&mut self, value: i32);

    /// Append raw bytes.
    fn put_bytes(&mut self, bytes: &[u8]);

    /// Append a null-terminated string.
    fn put_cstr(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
        self.put_bytes(&[0]);
    }
}

/// First pass: counts bytes.
#[derive(Debug, Default)]
pub struct Measure {
    len: usize,
}

impl Measure {
    /// Bytes counted so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing was counted.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PacketSink for Measure {
    fn put_i32(&mut self, _value: i32) {
        self.len += 4;
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

/// Second pass: writes into a buffer sized by [`Measure`].
#[derive(Debug)]
pub struct Fill<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflow: bool,
}

impl<'a> Fill<'a> {
    /// Write into `buf` from its start.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflow: false,
        }
    }

    /// Whether the buffer was filled exactly.
    pub fn is_exact(&self) -> bool {
        !self.overflow && self.pos == self.buf.len()
    }
}

impl PacketSink for Fill<'_> {
    fn put_i32(&mut self, value: i32) {
        self.put_bytes(&value.to_be_bytes());
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        match self.buf.get_mut(self.pos..self.pos + bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                self.pos += bytes.len();
            }
            None => self.overflow = true,
        }
    }
}

/// Everything the startup packet carries, with environment values already read.
#[derive(Debug, Clone, Default)]
pub struct StartupParams {
    /// `user`
    pub user: Option<String>,
    /// `database`
    pub database: Option<String>,
    /// `options`
    pub options: Option<String>,
    /// Parameters taken from the environment, in mapping order
    pub env: Vec<(&'static str, String)>,
    /// Extra parameters from the connection options
    pub extra: Vec<(String, String)>,
}

impl StartupParams {
    /// Resolve the parameters for `opts` from the process environment.
    pub fn from_opts(opts: &Opts) -> Self {
        Self::with_env(opts, |var| std::env::var(var).ok())
    }

    /// Resolve the parameters for `opts`, reading variables through `lookup`.
    pub fn with_env(opts: &Opts, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            user: non_empty(&opts.user),
            database: opts.database.as_deref().and_then(non_empty),
            options: opts.options.as_deref().and_then(non_empty),
            env: resolve_env(&opts.env_options, lookup),
            extra: opts.params.clone(),
        }
    }
}

/// Read each mapped variable once; unset and `default` values are skipped.
fn resolve_env(
    mapping: &[EnvOption],
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(&'static str, String)> {
    mapping
        .iter()
        .filter_map(|opt| {
            let value = lookup(opt.env_var)?;
            (!value.eq_ignore_ascii_case("default")).then_some((opt.param, value))
        })
        .collect()
}

/// Enumerate the startup payload (everything after the length word).
fn put_startup_fields<S: PacketSink>(sink: &mut S, params: &StartupParams) {
    sink.put_i32(PROTOCOL_VERSION_3_0);

    for (name, value) in [
        ("user", &params.user),
        ("database", &params.database),
        ("options", &params.options),
    ] {
        if let Some(value) = value {
            sink.put_cstr(name);
            sink.put_cstr(value);
        }
    }
    for (name, value) in &params.env {
        sink.put_cstr(name);
        sink.put_cstr(value);
    }
    for (name, value) in &params.extra {
        sink.put_cstr(name);
        sink.put_cstr(value);
    }

    sink.put_bytes(&[0]);
}

/// Build the startup payload: protocol version, name/value pairs, terminator.
pub fn build_startup_packet(params: &StartupParams) -> Result<Vec<u8>> {
    let mut measure = Measure::default();
    put_startup_fields(&mut measure, params);

    let mut packet = vec![0; measure.len()];
    let mut fill = Fill::new(&mut packet);
    put_startup_fields(&mut fill, params);
    if !fill.is_exact() {
        return Err(Error::Protocol(format!(
            "startup packet size changed between passes (measured {} bytes)",
            measure.len()
        )));
    }
    Ok(packet)
}

/// Write a length-prefixed StartupMessage.
pub fn write_startup_message(buf: &mut Vec<u8>, params: &StartupParams) -> Result<()> {
    let packet = build_startup_packet(params)?;
    let mut msg = MessageBuilder::new_startup(buf);
    msg.write_bytes(&packet);
    msg.finish();
    Ok(())
}

/// Write a CancelRequest message.
///
/// This is sent on a NEW connection to cancel a query running on another connection.
/// The server closes the connection immediately with no response.
pub fn write_cancel_request(buf: &mut Vec<u8>, pid: i32, secret_key: i32) {
    let mut msg = MessageBuilder::new_startup(buf);
    msg.write_i32(CANCEL_REQUEST_CODE);
    msg.write_i32(pid);
    msg.write_i32(secret_key);
    msg.finish();
}

/// Write a Terminate message.
pub fn write_terminate(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, super::msg_type::TERMINATE).finish();
}
