//! OPC UA binary encoding for the primitives the handshake needs.
//!
//! All integers are little-endian. Strings are an `i32` byte length followed
//! by UTF-8 bytes; a length of `-1` encodes a null string.

use bytes::{Buf, BufMut};

use crate::errors::{ProtocolError, Result};

/// Types with an OPC UA binary encoding.
pub trait Encode {
    /// Number of bytes [`Encode::encode`] will write.
    fn encoded_len(&self) -> usize;

    /// Append the encoding to `dst`.
    fn encode(&self, dst: &mut impl BufMut);

    /// Encode into a fresh buffer.
    fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }
}

/// Types that can be decoded from OPC UA binary.
pub trait Decode: Sized {
    /// Decode one value, advancing `src` past the consumed bytes.
    fn decode(src: &mut impl Buf) -> Result<Self>;
}

/// Decode a value from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_from<T: Decode>(bytes: &[u8]) -> Result<(T, usize)> {
    let mut src = bytes;
    let value = T::decode(&mut src)?;
    Ok((value, bytes.len() - src.len()))
}

fn ensure(src: &impl Buf, needed: usize, what: &'static str) -> Result<()> {
    if src.remaining() < needed {
        return Err(ProtocolError::BufferTooShort { what, needed, available: src.remaining() });
    }
    Ok(())
}

impl Encode for u32 {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(*self);
    }
}

impl Decode for u32 {
    fn decode(src: &mut impl Buf) -> Result<Self> {
        ensure(src, 4, "UInt32")?;
        Ok(src.get_u32_le())
    }
}

impl Encode for i32 {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(*self);
    }
}

impl Decode for i32 {
    fn decode(src: &mut impl Buf) -> Result<Self> {
        ensure(src, 4, "Int32")?;
        Ok(src.get_i32_le())
    }
}

/// Length prefix marking a null string.
const NULL_LENGTH: i32 = -1;

impl Encode for str {
    fn encoded_len(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, dst: &mut impl BufMut) {
        // Handshake strings are capped far below i32::MAX by the message layer
        dst.put_i32_le(self.len() as i32);
        dst.put_slice(self.as_bytes());
    }
}

impl Encode for String {
    fn encoded_len(&self) -> usize {
        self.as_str().encoded_len()
    }

    fn encode(&self, dst: &mut impl BufMut) {
        self.as_str().encode(dst);
    }
}

impl Encode for Option<String> {
    fn encoded_len(&self) -> usize {
        self.as_deref().map_or(4, |s| s.encoded_len())
    }

    fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Some(s) => s.encode(dst),
            None => dst.put_i32_le(NULL_LENGTH),
        }
    }
}

impl Decode for Option<String> {
    fn decode(src: &mut impl Buf) -> Result<Self> {
        let len = i32::decode(src)?;
        if len == NULL_LENGTH {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| ProtocolError::InvalidStringLength(len))?;
        ensure(src, len, "String")?;

        let mut bytes = vec![0u8; len];
        src.copy_to_slice(&mut bytes);
        String::from_utf8(bytes).map(Some).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

/// Null strings decode as empty.
impl Decode for String {
    fn decode(src: &mut impl Buf) -> Result<Self> {
        Ok(Option::<String>::decode(src)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn string_layout() {
        assert_eq!("opc".to_vec(), hex!("03000000 6f7063"));
        assert_eq!(None::<String>.to_vec(), hex!("ffffffff"));
        assert_eq!(String::new().to_vec(), hex!("00000000"));
    }

    #[test]
    fn null_string_decodes_as_none_or_empty() {
        let bytes = hex!("ffffffff");
        assert_eq!(decode_from::<Option<String>>(&bytes).unwrap(), (None, 4));
        assert_eq!(decode_from::<String>(&bytes).unwrap(), (String::new(), 4));
    }

    #[test]
    fn decode_reports_bytes_consumed() {
        let bytes = hex!("02000000 6869 aa");
        let (value, consumed) = decode_from::<String>(&bytes).unwrap();
        assert_eq!(value, "hi");
        assert_eq!(consumed, 6);
    }

    #[test]
    fn string_length_is_bounded_by_input() {
        let bytes = hex!("ffffff7f 41");
        assert_eq!(
            decode_from::<String>(&bytes),
            Err(ProtocolError::BufferTooShort { what: "String", needed: 0x7fff_ffff, available: 1 })
        );
    }

    #[test]
    fn negative_length_other_than_null_is_rejected() {
        let bytes = hex!("feffffff");
        assert_eq!(decode_from::<String>(&bytes), Err(ProtocolError::InvalidStringLength(-2)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let bytes = hex!("02000000 c328");
        assert_eq!(decode_from::<String>(&bytes), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn short_integer_is_rejected() {
        assert_eq!(
            decode_from::<u32>(&[1, 2, 3]),
            Err(ProtocolError::BufferTooShort { what: "UInt32", needed: 4, available: 3 })
        );
    }
}
