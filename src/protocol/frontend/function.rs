//! Fast-path function call message.

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, Oid};

/// One argument of a fast-path call. Arguments are always sent in binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionArg<'a> {
    /// SQL NULL
    Null,
    /// `int2`
    Int2(i16),
    /// `int4`
    Int4(i32),
    /// Any other binary-encoded value
    Bytes(&'a [u8]),
}

/// Write a FunctionCall message requesting a binary result.
///
/// Nothing is written when the argument count or an argument's length does
/// not fit the wire format.
pub fn write_function_call(buf: &mut Vec<u8>, fn_oid: Oid, args: &[FunctionArg<'_>]) -> Result<()> {
    let nargs = i16::try_from(args.len())
        .map_err(|_| Error::InvalidUsage(format!("too many function arguments: {}", args.len())))?;
    let lengths = args
        .iter()
        .map(|arg| match *arg {
            FunctionArg::Bytes(data) => i32::try_from(data.len()).map_err(|_| {
                Error::InvalidUsage(format!("function argument too long: {} bytes", data.len()))
            }),
            _ => Ok(0),
        })
        .collect::<Result<Vec<i32>>>()?;

    let mut msg = MessageBuilder::new(buf, super::msg_type::FUNCTION_CALL);
    msg.write_u32(fn_oid);
    msg.write_i16(1);
    msg.write_i16(FormatCode::Binary.as_i16());
    msg.write_i16(nargs);
    for (arg, len) in args.iter().zip(lengths) {
        match *arg {
            FunctionArg::Null => msg.write_i32(-1),
            FunctionArg::Int2(v) => {
                msg.write_i32(2);
                msg.write_i16(v);
            }
            FunctionArg::Int4(v) => {
                msg.write_i32(4);
                msg.write_i32(v);
            }
            FunctionArg::Bytes(data) => {
                msg.write_i32(len);
                msg.write_bytes(data);
            }
        }
    }
    msg.write_i16(FormatCode::Binary.as_i16());
    msg.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_call_layout() {
        let mut buf = Vec::new();
        write_function_call(
            &mut buf,
            1598,
            &[FunctionArg::Int4(7), FunctionArg::Null, FunctionArg::Bytes(b"ab")],
        )
        .unwrap();

        let mut expected = vec![b'F'];
        let body: Vec<u8> = [
            &1598_u32.to_be_bytes()[..],
            &1_i16.to_be_bytes(),
            &1_i16.to_be_bytes(),
            &3_i16.to_be_bytes(),
            &4_i32.to_be_bytes(),
            &7_i32.to_be_bytes(),
            &(-1_i32).to_be_bytes(),
            &2_i32.to_be_bytes(),
            b"ab",
            &1_i16.to_be_bytes(),
        ]
        .concat();
        expected.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        expected.extend_from_slice(&body);
        assert_eq!(buf, expected);
    }

    #[test]
    fn too_many_arguments_are_rejected() {
        let args = vec![FunctionArg::Null; usize::from(u16::MAX)];
        let mut buf = Vec::new();
        assert!(matches!(
            write_function_call(&mut buf, 1598, &args),
            Err(Error::InvalidUsage(_))
        ));
        assert!(buf.is_empty());
    }
}
