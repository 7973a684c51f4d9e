use std::ffi::{c_int, c_long, c_void};
use std::fmt;
use std::mem::size_of;

use crate::{MarshalError, Result};

/// Widest scalar a kernel parameter slot can hold, in bytes.
pub const MAX_SCALAR_WIDTH: usize = 8;

/// Native type tag attached to each kernel argument.
///
/// Mirrors the C scalar types a kernel signature can declare, plus the
/// opaque pointer and the untyped `None` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// No scalar type: the value supplies its own address or is an enum.
    None,
    Bool,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    SizeT,
    /// 16-bit IEEE 754 half-precision float
    Half,
    /// 16-bit Brain Float
    BFloat16,
    Float,
    Double,
    /// `void*`
    VoidPtr,
}

impl ParamType {
    /// Byte width of the native type, or `None` for the untyped tag.
    pub fn width(&self) -> Option<usize> {
        match self {
            ParamType::None => None,
            ParamType::Bool | ParamType::Char | ParamType::UChar => Some(1),
            ParamType::Short | ParamType::UShort => Some(2),
            ParamType::Half | ParamType::BFloat16 => Some(2),
            ParamType::Int | ParamType::UInt => Some(size_of::<c_int>()),
            ParamType::Long | ParamType::ULong => Some(size_of::<c_long>()),
            ParamType::LongLong | ParamType::ULongLong => Some(8),
            ParamType::SizeT => Some(size_of::<usize>()),
            ParamType::Float => Some(4),
            ParamType::Double => Some(8),
            ParamType::VoidPtr => Some(size_of::<*mut c_void>()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ParamType::Char
                | ParamType::UChar
                | ParamType::Short
                | ParamType::UShort
                | ParamType::Int
                | ParamType::UInt
                | ParamType::Long
                | ParamType::ULong
                | ParamType::LongLong
                | ParamType::ULongLong
                | ParamType::SizeT
        )
    }

    /// Parse a type name. Accepts C spellings (`unsigned int`), ctypes
    /// names (`c_uint`) and Rust-style names (`u32`).
    pub fn from_name(name: &str) -> Result<Self> {
        let ty = match name.trim() {
            "None" | "none" => ParamType::None,
            "bool" | "c_bool" | "_Bool" => ParamType::Bool,
            "char" | "c_char" | "c_byte" | "signed char" | "i8" => ParamType::Char,
            "unsigned char" | "c_ubyte" | "u8" => ParamType::UChar,
            "short" | "c_short" | "c_int16" | "i16" => ParamType::Short,
            "unsigned short" | "c_ushort" | "c_uint16" | "u16" => ParamType::UShort,
            "int" | "c_int" | "c_int32" | "i32" => ParamType::Int,
            "unsigned int" | "unsigned" | "c_uint" | "c_uint32" | "u32" => ParamType::UInt,
            "long" | "c_long" => ParamType::Long,
            "unsigned long" | "c_ulong" => ParamType::ULong,
            "long long" | "c_longlong" | "c_int64" | "i64" => ParamType::LongLong,
            "unsigned long long" | "c_ulonglong" | "c_uint64" | "u64" => ParamType::ULongLong,
            "size_t" | "c_size_t" | "usize" => ParamType::SizeT,
            "half" | "__half" | "f16" => ParamType::Half,
            "bfloat16" | "__nv_bfloat16" | "bf16" => ParamType::BFloat16,
            "float" | "c_float" | "f32" => ParamType::Float,
            "double" | "c_double" | "f64" => ParamType::Double,
            "void*" | "void *" | "c_void_p" => ParamType::VoidPtr,
            other => return Err(MarshalError::UnsupportedType(other.to_string())),
        };
        Ok(ty)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::None => "None",
            ParamType::Bool => "bool",
            ParamType::Char => "char",
            ParamType::UChar => "unsigned char",
            ParamType::Short => "short",
            ParamType::UShort => "unsigned short",
            ParamType::Int => "int",
            ParamType::UInt => "unsigned int",
            ParamType::Long => "long",
            ParamType::ULong => "unsigned long",
            ParamType::LongLong => "long long",
            ParamType::ULongLong => "unsigned long long",
            ParamType::SizeT => "size_t",
            ParamType::Half => "half",
            ParamType::BFloat16 => "bfloat16",
            ParamType::Float => "float",
            ParamType::Double => "double",
            ParamType::VoidPtr => "void*",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(ParamType::Bool.width(), Some(1));
        assert_eq!(ParamType::Half.width(), Some(2));
        assert_eq!(ParamType::UInt.width(), Some(4));
        assert_eq!(ParamType::Float.width(), Some(4));
        assert_eq!(ParamType::Double.width(), Some(8));
        assert_eq!(ParamType::VoidPtr.width(), Some(size_of::<usize>()));
        assert_eq!(ParamType::None.width(), None);
    }

    #[test]
    fn test_no_width_exceeds_slot() {
        let all = [
            ParamType::Bool, ParamType::Char, ParamType::UChar, ParamType::Short,
            ParamType::UShort, ParamType::Int, ParamType::UInt, ParamType::Long,
            ParamType::ULong, ParamType::LongLong, ParamType::ULongLong, ParamType::SizeT,
            ParamType::Half, ParamType::BFloat16, ParamType::Float, ParamType::Double,
            ParamType::VoidPtr,
        ];
        for ty in all {
            assert!(ty.width().unwrap() <= MAX_SCALAR_WIDTH, "{ty} too wide");
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(ParamType::from_name("c_uint").unwrap(), ParamType::UInt);
        assert_eq!(ParamType::from_name("unsigned long long").unwrap(), ParamType::ULongLong);
        assert_eq!(ParamType::from_name("c_void_p").unwrap(), ParamType::VoidPtr);
        assert_eq!(ParamType::from_name("f16").unwrap(), ParamType::Half);
        assert_eq!(ParamType::from_name("None").unwrap(), ParamType::None);
    }

    #[test]
    fn test_unsupported_name() {
        let err = ParamType::from_name("c_wchar_p").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported type: c_wchar_p");
    }

    #[test]
    fn test_categories() {
        assert!(ParamType::SizeT.is_integer());
        assert!(ParamType::Char.is_integer());
        assert!(!ParamType::VoidPtr.is_integer());
        assert!(!ParamType::Half.is_integer());
        assert!(!ParamType::Bool.is_integer());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ParamType::ULong), "unsigned long");
        assert_eq!(format!("{}", ParamType::VoidPtr), "void*");
    }
}
