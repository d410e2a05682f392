//! Format codes (constructors) of the AMQP 1.0 type system

use std::fmt;

use crate::Error;

/// Width of the size/count prefix or of the fixed payload that follows a constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Fixed width payload of the given number of bytes
    Fixed(usize),
    /// Variable width payload prefixed with a size field of the given number of bytes
    Variable(usize),
    /// List or map with size and count fields of the given number of bytes
    Compound(usize),
    /// Array with size and count fields of the given number of bytes
    Array(usize),
}

/// Format codes of every AMQP 1.0 primitive encoding
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncodingCodes {
    DescribedType = 0x00,

    Null = 0x40,

    Boolean = 0x56,
    BooleanTrue = 0x41,
    BooleanFalse = 0x42,

    UByte = 0x50,
    UShort = 0x60,

    UInt = 0x70,
    SmallUInt = 0x52,
    UInt0 = 0x43,

    ULong = 0x80,
    SmallULong = 0x53,
    ULong0 = 0x44,

    Byte = 0x51,
    Short = 0x61,

    Int = 0x71,
    SmallInt = 0x54,

    Long = 0x81,
    SmallLong = 0x55,

    Float = 0x72,
    Double = 0x82,

    Decimal32 = 0x74,
    Decimal64 = 0x84,
    Decimal128 = 0x94,

    Char = 0x73,
    Timestamp = 0x83,
    Uuid = 0x98,

    VBin8 = 0xa0,
    VBin32 = 0xb0,
    Str8 = 0xa1,
    Str32 = 0xb1,
    Sym8 = 0xa3,
    Sym32 = 0xb3,

    List0 = 0x45,
    List8 = 0xc0,
    List32 = 0xd0,

    Map8 = 0xc1,
    Map32 = 0xd1,

    Array8 = 0xe0,
    Array32 = 0xf0,
}

impl EncodingCodes {
    /// Layout of the bytes that follow this constructor
    pub fn category(&self) -> Category {
        use EncodingCodes::*;
        match self {
            DescribedType => Category::Fixed(0),
            Null | BooleanTrue | BooleanFalse | UInt0 | ULong0 | List0 => Category::Fixed(0),
            Boolean | UByte | Byte | SmallUInt | SmallULong | SmallInt | SmallLong => {
                Category::Fixed(1)
            }
            UShort | Short => Category::Fixed(2),
            UInt | Int | Float | Char | Decimal32 => Category::Fixed(4),
            ULong | Long | Double | Timestamp | Decimal64 => Category::Fixed(8),
            Uuid | Decimal128 => Category::Fixed(16),
            VBin8 | Str8 | Sym8 => Category::Variable(1),
            VBin32 | Str32 | Sym32 => Category::Variable(4),
            List8 | Map8 => Category::Compound(1),
            List32 | Map32 => Category::Compound(4),
            Array8 => Category::Array(1),
            Array32 => Category::Array(4),
        }
    }

    /// Name of the AMQP type encoded by this constructor
    pub fn type_name(&self) -> &'static str {
        use EncodingCodes::*;
        match self {
            DescribedType => "described",
            Null => "null",
            Boolean | BooleanTrue | BooleanFalse => "boolean",
            UByte => "ubyte",
            UShort => "ushort",
            UInt | SmallUInt | UInt0 => "uint",
            ULong | SmallULong | ULong0 => "ulong",
            Byte => "byte",
            Short => "short",
            Int | SmallInt => "int",
            Long | SmallLong => "long",
            Float => "float",
            Double => "double",
            Decimal32 => "decimal32",
            Decimal64 => "decimal64",
            Decimal128 => "decimal128",
            Char => "char",
            Timestamp => "timestamp",
            Uuid => "uuid",
            VBin8 | VBin32 => "binary",
            Str8 | Str32 => "string",
            Sym8 | Sym32 => "symbol",
            List0 | List8 | List32 => "list",
            Map8 | Map32 => "map",
            Array8 | Array32 => "array",
        }
    }
}

impl fmt::Display for EncodingCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.type_name(), *self as u8)
    }
}

impl From<EncodingCodes> for u8 {
    fn from(code: EncodingCodes) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for EncodingCodes {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use EncodingCodes::*;
        let code = match value {
            0x00 => DescribedType,
            0x40 => Null,
            0x56 => Boolean,
            0x41 => BooleanTrue,
            0x42 => BooleanFalse,
            0x50 => UByte,
            0x60 => UShort,
            0x70 => UInt,
            0x52 => SmallUInt,
            0x43 => UInt0,
            0x80 => ULong,
            0x53 => SmallULong,
            0x44 => ULong0,
            0x51 => Byte,
            0x61 => Short,
            0x71 => Int,
            0x54 => SmallInt,
            0x81 => Long,
            0x55 => SmallLong,
            0x72 => Float,
            0x82 => Double,
            0x74 => Decimal32,
            0x84 => Decimal64,
            0x94 => Decimal128,
            0x73 => Char,
            0x83 => Timestamp,
            0x98 => Uuid,
            0xa0 => VBin8,
            0xb0 => VBin32,
            0xa1 => Str8,
            0xb1 => Str32,
            0xa3 => Sym8,
            0xb3 => Sym32,
            0x45 => List0,
            0xc0 => List8,
            0xd0 => List32,
            0xc1 => Map8,
            0xd1 => Map32,
            0xe0 => Array8,
            0xf0 => Array32,
            other => return Err(other),
        };
        Ok(code)
    }
}

impl EncodingCodes {
    pub(crate) fn parse(value: u8, offset: usize) -> Result<Self, Error> {
        Self::try_from(value).map_err(|code| Error::InvalidFormatCode { offset, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_round_trips_through_u8() {
        for byte in 0..=u8::MAX {
            if let Ok(code) = EncodingCodes::try_from(byte) {
                assert_eq!(u8::from(code), byte);
            }
        }
    }

    #[test]
    fn unknown_code_reports_offset() {
        let err = EncodingCodes::parse(0x99, 7).unwrap_err();
        assert_eq!(err, Error::InvalidFormatCode { offset: 7, code: 0x99 });
    }

    #[test]
    fn categories_of_compact_forms() {
        assert_eq!(EncodingCodes::UInt0.category(), Category::Fixed(0));
        assert_eq!(EncodingCodes::SmallULong.category(), Category::Fixed(1));
        assert_eq!(EncodingCodes::List8.category(), Category::Compound(1));
        assert_eq!(EncodingCodes::Array32.category(), Category::Array(4));
    }
}
