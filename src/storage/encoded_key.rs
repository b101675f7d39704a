use crate::catalog::types::Value;
use crate::error::KvdocError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

const TAG_NULL: u8 = 0x01;
const TAG_BOOL: u8 = 0x02;
pub(crate) const TAG_INTEGER: u8 = 0x10;
const TAG_FLOAT: u8 = 0x11;
pub(crate) const TAG_TEXT: u8 = 0x14;
const TAG_ARRAY: u8 = 0x18;
const TAG_OBJECT: u8 = 0x19;
const OBJECT_ENTRY: u8 = 0x01;
const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0xFF;
const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncodedKey {
    bytes: SmallVec<[u8; 64]>,
}

impl EncodedKey {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn from_values(values: &[Value]) -> Self {
        let mut out = Self::default();
        for value in values {
            out.push_value(value);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    pub(crate) fn push_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub(crate) fn push_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn push_text(&mut self, s: &str) {
        for byte in s.as_bytes() {
            if *byte == TERMINATOR {
                // Escape interior nulls so terminator remains unambiguous.
                self.bytes.extend_from_slice(&[TERMINATOR, ESCAPE]);
            } else {
                self.bytes.push(*byte);
            }
        }
        self.bytes.push(TERMINATOR);
    }

    pub(crate) fn push_value(&mut self, v: &Value) {
        match v {
            Value::Null => self.push_byte(TAG_NULL),
            Value::Boolean(b) => {
                self.push_byte(TAG_BOOL);
                self.push_byte(u8::from(*b));
            }
            Value::Integer(i) => {
                self.push_byte(TAG_INTEGER);
                self.push_u64((*i as u64) ^ SIGN_BIT);
            }
            Value::Float(f) => {
                self.push_byte(TAG_FLOAT);
                let bits = f.to_bits();
                let mapped = if (bits >> 63) == 1 {
                    !bits
                } else {
                    bits ^ SIGN_BIT
                };
                self.push_u64(mapped);
            }
            Value::Text(s) => {
                self.push_byte(TAG_TEXT);
                self.push_text(s);
            }
            Value::Array(items) => {
                self.push_byte(TAG_ARRAY);
                for item in items {
                    self.push_value(item);
                }
                self.push_byte(TERMINATOR);
            }
            Value::Object(map) => {
                self.push_byte(TAG_OBJECT);
                for (k, item) in map {
                    self.push_byte(OBJECT_ENTRY);
                    self.push_text(k);
                    self.push_value(item);
                }
                self.push_byte(TERMINATOR);
            }
        }
    }
}

impl fmt::Debug for EncodedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedKey({})", hex::encode(&self.bytes))
    }
}

impl fmt::Display for EncodedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.bytes))
    }
}

/// Smallest key greater than every key starting with `prefix`.
pub fn prefix_successor(prefix: &EncodedKey) -> Option<EncodedKey> {
    let mut next = prefix.bytes.clone();
    for i in (0..next.len()).rev() {
        if next[i] != 0xFF {
            next[i] += 1;
            next.truncate(i + 1);
            return Some(EncodedKey { bytes: next });
        }
    }
    None
}

/// Cursor over an encoded key; every failure is a malformed key.
pub(crate) struct KeyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, KvdocError> {
        let byte = *self.bytes.get(self.pos).ok_or_else(|| {
            KvdocError::malformed_key(format!("unexpected end of key at offset {}", self.pos))
        })?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn expect_byte(&mut self, expected: u8, what: &str) -> Result<(), KvdocError> {
        let offset = self.pos;
        let found = self.read_byte()?;
        if found != expected {
            return Err(KvdocError::malformed_key(format!(
                "expected {what} marker 0x{expected:02x} at offset {offset}, found 0x{found:02x}"
            )));
        }
        Ok(())
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, KvdocError> {
        let end = self.pos + 8;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            KvdocError::malformed_key(format!("truncated integer at offset {}", self.pos))
        })?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(slice);
        self.pos = end;
        Ok(u64::from_be_bytes(buf))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, KvdocError> {
        Ok((self.read_u64()? ^ SIGN_BIT) as i64)
    }

    pub(crate) fn read_text(&mut self) -> Result<String, KvdocError> {
        let start = self.pos;
        let mut out = Vec::new();
        loop {
            let byte = self.read_byte().map_err(|_| {
                KvdocError::malformed_key(format!("unterminated text starting at offset {start}"))
            })?;
            if byte != TERMINATOR {
                out.push(byte);
                continue;
            }
            if self.bytes.get(self.pos) == Some(&ESCAPE) {
                self.pos += 1;
                out.push(TERMINATOR);
                continue;
            }
            break;
        }
        String::from_utf8(out).map_err(|_| {
            KvdocError::malformed_key(format!("invalid utf-8 text at offset {start}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{EncodedKey, KeyReader, prefix_successor};
    use crate::catalog::types::Value;

    #[test]
    fn integer_order_is_preserved() {
        let a = EncodedKey::from_values(&[Value::Integer(-1)]);
        let b = EncodedKey::from_values(&[Value::Integer(0)]);
        let c = EncodedKey::from_values(&[Value::Integer(42)]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn composite_order_is_lexicographic() {
        let a = EncodedKey::from_values(&[Value::Integer(1), Value::from("a")]);
        let b = EncodedKey::from_values(&[Value::Integer(1), Value::from("b")]);
        let c = EncodedKey::from_values(&[Value::Integer(2), Value::from("a")]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn shorter_arrays_sort_first() {
        let short = EncodedKey::from_values(&[Value::Array(vec![Value::Integer(1)])]);
        let long = EncodedKey::from_values(&[Value::Array(vec![
            Value::Integer(1),
            Value::Null,
        ])]);
        assert!(short < long);
    }

    #[test]
    fn text_with_interior_nulls_roundtrips() {
        let mut key = EncodedKey::default();
        key.push_text("a\0b");
        key.push_text("");
        let mut reader = KeyReader::new(key.as_slice());
        assert_eq!(reader.read_text().expect("first"), "a\0b");
        assert_eq!(reader.read_text().expect("second"), "");
        assert!(reader.is_exhausted());
    }

    #[test]
    fn prefix_successor_works() {
        let key = EncodedKey::from_bytes(vec![0x10, 0xAA, 0x00]);
        let next = prefix_successor(&key).expect("next");
        assert_eq!(next.as_slice(), &[0x10, 0xAA, 0x01]);
        assert!(prefix_successor(&EncodedKey::from_bytes(vec![0xFF, 0xFF])).is_none());
    }
}
