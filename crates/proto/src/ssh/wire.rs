//! Field encoding helpers for SSH message payloads (RFC 4251 Section 5).
//!
//! Payloads handed to these functions never include the message type byte;
//! offsets start at the first field.

use bytes::{BufMut, BytesMut};
use mirage_platform::{MirageError, MirageResult};

pub(crate) fn write_string(buf: &mut BytesMut, s: &str) {
    write_bytes(buf, s.as_bytes());
}

pub(crate) fn write_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Reads a `string` field as raw bytes.
pub(crate) fn read_bytes<'a>(data: &'a [u8], offset: &mut usize) -> MirageResult<&'a [u8]> {
    let length = read_u32(data, offset)? as usize;
    let start = *offset;
    let end = start
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            MirageError::MalformedPayload(format!(
                "string of {} bytes at offset {} exceeds payload of {} bytes",
                length,
                start,
                data.len()
            ))
        })?;
    *offset = end;
    Ok(&data[start..end])
}

/// Reads a `string` field, replacing invalid UTF-8.
///
/// Names and commands are only ever logged or compared against ASCII
/// literals, so a lossy decode never changes mock behaviour.
pub(crate) fn read_string(data: &[u8], offset: &mut usize) -> MirageResult<String> {
    read_bytes(data, offset).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

pub(crate) fn read_u32(data: &[u8], offset: &mut usize) -> MirageResult<u32> {
    let start = *offset;
    let bytes = data.get(start..start + 4).ok_or_else(|| {
        MirageError::MalformedPayload(format!(
            "cannot read uint32 at offset {} of {}-byte payload",
            start,
            data.len()
        ))
    })?;
    *offset += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_bool(data: &[u8], offset: &mut usize) -> MirageResult<bool> {
    let value = data.get(*offset).ok_or_else(|| {
        MirageError::MalformedPayload(format!(
            "cannot read boolean at offset {} of {}-byte payload",
            offset,
            data.len()
        ))
    })?;
    *offset += 1;
    Ok(*value != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "ssh-userauth");
        write_bool(&mut buf, true);
        buf.put_u32(7);

        let mut offset = 0;
        assert_eq!(read_string(&buf, &mut offset).unwrap(), "ssh-userauth");
        assert!(read_bool(&buf, &mut offset).unwrap());
        assert_eq!(read_u32(&buf, &mut offset).unwrap(), 7);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_string_length_overrun() {
        // claims 10 bytes, carries 2
        let data = [0, 0, 0, 10, b'h', b'i'];
        let mut offset = 0;
        let err = read_bytes(&data, &mut offset).unwrap_err();
        assert!(matches!(err, MirageError::MalformedPayload(_)));
    }

    #[test]
    fn test_huge_length_does_not_overflow() {
        let data = [0xff, 0xff, 0xff, 0xff];
        let mut offset = 0;
        assert!(read_bytes(&data, &mut offset).is_err());
    }

    #[test]
    fn test_truncated_u32_and_bool() {
        let mut offset = 0;
        assert!(read_u32(&[0, 1, 2], &mut offset).is_err());
        assert_eq!(offset, 0);
        assert!(read_bool(&[], &mut offset).is_err());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let data = [0, 0, 0, 2, 0xff, b'a'];
        let mut offset = 0;
        assert_eq!(read_string(&data, &mut offset).unwrap(), "\u{fffd}a");
    }
}
