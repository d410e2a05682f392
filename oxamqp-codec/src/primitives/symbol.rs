use std::{
    borrow::Borrow,
    fmt,
    ops::Deref,
};

use bytes::{BufMut, BytesMut};
use serde::{de, Deserialize, Serialize};

use super::ArrayElement;
use crate::{
    __constants::SYMBOL,
    decode::{Decode, Reader},
    encode::Encode,
    format_code::EncodingCodes,
    Error,
};

/// Symbolic values from a constrained domain
///
/// Symbols are encoded as ASCII. Values longer than 255 bytes use the `sym32` constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub String);

impl Symbol {
    /// Creates a new symbol
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrows the symbol as a `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the symbol and returns the inner `String`
    pub fn into_inner(self) -> String {
        self.0
    }

    fn write_body(&self, code: EncodingCodes, buf: &mut BytesMut) {
        let bytes = self.0.as_bytes();
        match code {
            EncodingCodes::Sym8 => buf.put_u8(bytes.len() as u8),
            _ => buf.put_u32(bytes.len() as u32),
        }
        buf.put_slice(bytes);
    }

    fn read_body(code: EncodingCodes, offset: usize, reader: &mut Reader) -> Result<Self, Error> {
        match code {
            EncodingCodes::Sym8 | EncodingCodes::Sym32 => {
                let bytes = reader.read_variable(code)?;
                let start = reader.position() - bytes.len();
                if !bytes.is_ascii() {
                    return Err(Error::InvalidUtf8 {
                        offset: start,
                        expected: "symbol",
                    });
                }
                // ascii is always valid utf-8
                let s = String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8 {
                    offset: start,
                    expected: "symbol",
                })?;
                Ok(Self(s))
            }
            found => Err(Error::TypeMismatch {
                offset,
                expected: "symbol",
                found,
            }),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for Symbol {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for Symbol {
    fn from(val: String) -> Self {
        Self(val)
    }
}

impl From<&str> for Symbol {
    fn from(val: &str) -> Self {
        Self(val.to_string())
    }
}

impl From<Symbol> for String {
    fn from(val: Symbol) -> Self {
        val.0
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for Symbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(SYMBOL, &self.0)
    }
}

struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = Symbol;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("symbol")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Symbol::from(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Symbol(v))
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(SYMBOL, Visitor)
    }
}

impl Encode for Symbol {
    fn encode(&self, buf: &mut BytesMut) {
        let code = if self.0.len() <= u8::MAX as usize {
            EncodingCodes::Sym8
        } else {
            EncodingCodes::Sym32
        };
        buf.put_u8(code as u8);
        self.write_body(code, buf);
    }
}

impl Decode for Symbol {
    fn decode(reader: &mut Reader) -> Result<Self, Error> {
        let (offset, code) = reader.read_code()?;
        Self::read_body(code, offset, reader)
    }
}

impl ArrayElement for Symbol {
    fn constructor(elements: &[Self]) -> EncodingCodes {
        if elements.iter().all(|s| s.0.len() <= u8::MAX as usize) {
            EncodingCodes::Sym8
        } else {
            EncodingCodes::Sym32
        }
    }

    fn encode_element(&self, code: EncodingCodes, buf: &mut BytesMut) {
        self.write_body(code, buf)
    }

    fn decode_element(
        code: EncodingCodes,
        offset: usize,
        reader: &mut Reader,
    ) -> Result<Self, Error> {
        Self::read_body(code, offset, reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_slice, to_bytes};

    #[test]
    fn short_symbol_uses_sym8() {
        let buf = to_bytes(&Symbol::from("amqp:accepted:list")).unwrap();
        assert_eq!(buf[0], 0xa3);
        assert_eq!(buf[1] as usize, "amqp:accepted:list".len());
    }

    #[test]
    fn long_symbol_uses_sym32() {
        let long = Symbol::new("s".repeat(300));
        let buf = to_bytes(&long).unwrap();
        assert_eq!(&buf[..5], &[0xb3, 0x00, 0x00, 0x01, 0x2c]);
        assert_eq!(from_slice::<Symbol>(&buf).unwrap(), long);
    }

    #[test]
    fn non_ascii_symbol_is_rejected() {
        let buf = [0xa3, 0x02, 0xc3, 0xa9];
        let err = from_slice::<Symbol>(&buf).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidUtf8 {
                offset: 2,
                expected: "symbol"
            }
        );
    }
}
