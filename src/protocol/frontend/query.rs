//! Simple query and COPY messages.

use crate::protocol::codec::MessageBuilder;

use super::msg_type;

/// Write a Query message.
///
/// The query string may contain multiple SQL statements separated by semicolons.
pub fn write_query(buf: &mut Vec<u8>, query: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::QUERY);
    msg.write_cstr(query);
    msg.finish();
}

/// Write a CopyData message.
pub fn write_copy_data(buf: &mut Vec<u8>, data: &[u8]) {
    let mut msg = MessageBuilder::new(buf, msg_type::COPY_DATA);
    msg.write_bytes(data);
    msg.finish();
}

/// Write CopyDone, or CopyFail when `error_message` is given.
pub fn write_copy_end(buf: &mut Vec<u8>, error_message: Option<&str>) {
    match error_message {
        None => MessageBuilder::new(buf, msg_type::COPY_DONE).finish(),
        Some(reason) => {
            let mut msg = MessageBuilder::new(buf, msg_type::COPY_FAIL);
            msg.write_cstr(reason);
            msg.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_message() {
        let mut buf = Vec::new();
        write_query(&mut buf, "SELECT 1");
        assert_eq!(buf[0], b'Q');
        assert_eq!(&buf[1..5], &13_i32.to_be_bytes());
        assert_eq!(&buf[5..], b"SELECT 1\0");
    }

    #[test]
    fn copy_messages() {
        let mut buf = Vec::new();
        write_copy_data(&mut buf, b"1\tx\n");
        write_copy_end(&mut buf, None);
        write_copy_end(&mut buf, Some("bad"));
        assert_eq!(
            buf,
            [
                &b"d\0\0\0\x081\tx\n"[..],
                b"c\0\0\0\x04",
                b"f\0\0\0\x08bad\0",
            ]
            .concat()
        );
    }
}
