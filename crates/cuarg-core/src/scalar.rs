//! Scalar coercion: the only place a dynamic [`Value`] becomes native bytes.
//!
//! A native structure or buffer that is exactly the tag's width is copied
//! byte for byte. Everything else is coerced.
//!
//! Rules:
//! - Integer tags take `Bool`, `Int` and `Enum` ordinals; out-of-range values fail.
//! - Floats are never truncated into integer tags.
//! - `Double` widens `Float32` losslessly.
//! - Narrower float tags round to nearest. NaN and infinities pass through;
//!   a finite value that overflows to infinity fails when narrowing is strict.

use std::ffi::{c_int, c_long, c_uint, c_ulong};

use half::{bf16, f16};

use crate::buffer::BufferGuard;
use crate::param_type::ParamType;
use crate::value::Value;
use crate::{MarshalError, Result};

/// A native scalar ready to be written at its exact width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Char(i8),
    UChar(u8),
    Short(i16),
    UShort(u16),
    Int(c_int),
    UInt(c_uint),
    Long(c_long),
    ULong(c_ulong),
    LongLong(i64),
    ULongLong(u64),
    SizeT(usize),
    Half(f16),
    BFloat16(bf16),
    Float(f32),
    Double(f64),
    Ptr(usize),
}

fn int_in_range<T: TryFrom<i128>>(i: i128, ty: ParamType) -> Result<T> {
    T::try_from(i).map_err(|_| MarshalError::OutOfRange {
        value: i.to_string(),
        target: ty.to_string(),
    })
}

fn narrowed<T>(source: f64, result: T, is_inf: bool, ty: ParamType, strict: bool) -> Result<T> {
    if source.is_finite() && is_inf {
        if strict {
            return Err(MarshalError::OutOfRange {
                value: source.to_string(),
                target: ty.to_string(),
            });
        }
        tracing::warn!(value = source, target = %ty, "float narrowing saturated to infinity");
    }
    Ok(result)
}

impl Scalar {
    /// Read `ty` straight from a value already laid out natively at `ty`'s
    /// width. `None` when the value is not such a value.
    fn copy_native(ty: ParamType, value: &Value) -> Result<Option<Self>> {
        let Some(width) = ty.width() else {
            return Ok(None);
        };
        match value {
            Value::Struct(s) if s.as_bytes().len() == width => Ok(Self::read_from(ty, s.as_bytes())),
            Value::Buffer(_) => {
                let mut guard = BufferGuard::from_value(value)?;
                if guard.len() != width {
                    return Ok(None);
                }
                // The guard holds the view for the duration of the copy.
                let scalar = Self::read_from(ty, unsafe { guard.as_slice() });
                guard.release();
                Ok(scalar)
            }
            _ => Ok(None),
        }
    }

    /// Coerce `value` to the scalar type `ty`.
    ///
    /// `strict` rejects finite floats that overflow the narrower type.
    pub fn coerce(ty: ParamType, value: &Value, strict: bool) -> Result<Self> {
        if let Some(scalar) = Self::copy_native(ty, value)? {
            return Ok(scalar);
        }

        if ty.is_integer() {
            let i = match value {
                Value::Bool(b) => *b as i128,
                Value::Int(i) => *i,
                Value::Enum(e) => e.ordinal as i128,
                other => return Err(MarshalError::mismatch(ty.to_string(), other)),
            };
            return Ok(match ty {
                ParamType::Char => Scalar::Char(int_in_range(i, ty)?),
                ParamType::UChar => Scalar::UChar(int_in_range(i, ty)?),
                ParamType::Short => Scalar::Short(int_in_range(i, ty)?),
                ParamType::UShort => Scalar::UShort(int_in_range(i, ty)?),
                ParamType::Int => Scalar::Int(int_in_range(i, ty)?),
                ParamType::UInt => Scalar::UInt(int_in_range(i, ty)?),
                ParamType::Long => Scalar::Long(int_in_range(i, ty)?),
                ParamType::ULong => Scalar::ULong(int_in_range(i, ty)?),
                ParamType::LongLong => Scalar::LongLong(int_in_range(i, ty)?),
                ParamType::ULongLong => Scalar::ULongLong(int_in_range(i, ty)?),
                _ => Scalar::SizeT(int_in_range(i, ty)?),
            });
        }

        match ty {
            ParamType::Bool => match value {
                Value::Bool(b) => Ok(Scalar::Bool(*b)),
                Value::Int(i) => Ok(Scalar::Bool(*i != 0)),
                other => Err(MarshalError::mismatch("bool", other)),
            },
            ParamType::Double => match value {
                Value::Float(x) => Ok(Scalar::Double(*x)),
                Value::Float32(x) => Ok(Scalar::Double(f64::from(*x))),
                Value::Int(i) => Ok(Scalar::Double(*i as f64)),
                other => Err(MarshalError::mismatch("double", other)),
            },
            ParamType::Float | ParamType::Half | ParamType::BFloat16 => {
                let source = match value {
                    Value::Float32(x) => {
                        // Already single width: no rounding for f32 targets.
                        if ty == ParamType::Float {
                            return Ok(Scalar::Float(*x));
                        }
                        f64::from(*x)
                    }
                    Value::Float(x) => *x,
                    Value::Int(i) => *i as f64,
                    other => return Err(MarshalError::mismatch(ty.to_string(), other)),
                };
                match ty {
                    ParamType::Float => {
                        let n = source as f32;
                        narrowed(source, n, n.is_infinite(), ty, strict).map(Scalar::Float)
                    }
                    ParamType::Half => {
                        let n = f16::from_f64(source);
                        narrowed(source, n, n.is_infinite(), ty, strict).map(Scalar::Half)
                    }
                    _ => {
                        let n = bf16::from_f64(source);
                        narrowed(source, n, n.is_infinite(), ty, strict).map(Scalar::BFloat16)
                    }
                }
            }
            ParamType::VoidPtr => match value {
                Value::Int(i) => Ok(Scalar::Ptr(int_in_range(*i, ty)?)),
                Value::Pointer(p) => Ok(Scalar::Ptr(p.raw_address())),
                other => Err(MarshalError::mismatch("an address or pointer object", other)),
            },
            other => Err(MarshalError::UnsupportedType(other.to_string())),
        }
    }

    pub fn param_type(&self) -> ParamType {
        match self {
            Scalar::Bool(_) => ParamType::Bool,
            Scalar::Char(_) => ParamType::Char,
            Scalar::UChar(_) => ParamType::UChar,
            Scalar::Short(_) => ParamType::Short,
            Scalar::UShort(_) => ParamType::UShort,
            Scalar::Int(_) => ParamType::Int,
            Scalar::UInt(_) => ParamType::UInt,
            Scalar::Long(_) => ParamType::Long,
            Scalar::ULong(_) => ParamType::ULong,
            Scalar::LongLong(_) => ParamType::LongLong,
            Scalar::ULongLong(_) => ParamType::ULongLong,
            Scalar::SizeT(_) => ParamType::SizeT,
            Scalar::Half(_) => ParamType::Half,
            Scalar::BFloat16(_) => ParamType::BFloat16,
            Scalar::Float(_) => ParamType::Float,
            Scalar::Double(_) => ParamType::Double,
            Scalar::Ptr(_) => ParamType::VoidPtr,
        }
    }

    /// Exact byte width of this scalar.
    pub fn width(&self) -> usize {
        self.param_type().width().unwrap_or(0)
    }

    /// Write native-endian bytes into `dst`, which must be exactly
    /// [`Scalar::width`] long.
    pub fn write_to(&self, dst: &mut [u8]) {
        match self {
            Scalar::Bool(v) => dst.copy_from_slice(&[*v as u8]),
            Scalar::Char(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::UChar(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::Short(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::UShort(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::Int(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::UInt(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::Long(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::ULong(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::LongLong(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::ULongLong(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::SizeT(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::Half(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::BFloat16(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::Float(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::Double(v) => dst.copy_from_slice(&v.to_ne_bytes()),
            Scalar::Ptr(v) => dst.copy_from_slice(&v.to_ne_bytes()),
        }
    }

    /// Read a scalar of type `ty` from the first `width` bytes of `src`.
    ///
    /// Returns `None` for the untyped tag or if `src` is too short.
    pub fn read_from(ty: ParamType, src: &[u8]) -> Option<Self> {
        let width = ty.width()?;
        let b = src.get(..width)?;
        Some(match ty {
            ParamType::None => return None,
            ParamType::Bool => Scalar::Bool(b[0] != 0),
            ParamType::Char => Scalar::Char(i8::from_ne_bytes(b.try_into().ok()?)),
            ParamType::UChar => Scalar::UChar(b[0]),
            ParamType::Short => Scalar::Short(i16::from_ne_bytes(b.try_into().ok()?)),
            ParamType::UShort => Scalar::UShort(u16::from_ne_bytes(b.try_into().ok()?)),
            ParamType::Int => Scalar::Int(c_int::from_ne_bytes(b.try_into().ok()?)),
            ParamType::UInt => Scalar::UInt(c_uint::from_ne_bytes(b.try_into().ok()?)),
            ParamType::Long => Scalar::Long(c_long::from_ne_bytes(b.try_into().ok()?)),
            ParamType::ULong => Scalar::ULong(c_ulong::from_ne_bytes(b.try_into().ok()?)),
            ParamType::LongLong => Scalar::LongLong(i64::from_ne_bytes(b.try_into().ok()?)),
            ParamType::ULongLong => Scalar::ULongLong(u64::from_ne_bytes(b.try_into().ok()?)),
            ParamType::SizeT => Scalar::SizeT(usize::from_ne_bytes(b.try_into().ok()?)),
            ParamType::Half => Scalar::Half(f16::from_ne_bytes(b.try_into().ok()?)),
            ParamType::BFloat16 => Scalar::BFloat16(bf16::from_ne_bytes(b.try_into().ok()?)),
            ParamType::Float => Scalar::Float(f32::from_ne_bytes(b.try_into().ok()?)),
            ParamType::Double => Scalar::Double(f64::from_ne_bytes(b.try_into().ok()?)),
            ParamType::VoidPtr => Scalar::Ptr(usize::from_ne_bytes(b.try_into().ok()?)),
        })
    }

    /// The value widened to 64 bits, as it travels when a pointer slot
    /// carries the scalar itself. Signed integers sign-extend; floats keep
    /// their IEEE bit pattern in the low bits.
    pub fn to_bits(&self) -> u64 {
        match *self {
            Scalar::Bool(v) => v as u64,
            Scalar::Char(v) => v as i64 as u64,
            Scalar::UChar(v) => v as u64,
            Scalar::Short(v) => v as i64 as u64,
            Scalar::UShort(v) => v as u64,
            Scalar::Int(v) => v as i64 as u64,
            Scalar::UInt(v) => v as u64,
            Scalar::Long(v) => v as i64 as u64,
            Scalar::ULong(v) => v as u64,
            Scalar::LongLong(v) => v as u64,
            Scalar::ULongLong(v) => v,
            Scalar::SizeT(v) => v as u64,
            Scalar::Half(v) => v.to_bits() as u64,
            Scalar::BFloat16(v) => v.to_bits() as u64,
            Scalar::Float(v) => v.to_bits() as u64,
            Scalar::Double(v) => v.to_bits(),
            Scalar::Ptr(v) => v as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{DevicePtr, EnumValue};

    fn coerce(ty: ParamType, v: impl Into<Value>) -> Result<Scalar> {
        Scalar::coerce(ty, &v.into(), true)
    }

    #[test]
    fn test_integer_ranges() {
        assert_eq!(coerce(ParamType::UChar, 255u32).unwrap(), Scalar::UChar(255));
        assert!(matches!(
            coerce(ParamType::UChar, 256u32),
            Err(MarshalError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce(ParamType::UInt, -1i32),
            Err(MarshalError::OutOfRange { .. })
        ));
        assert_eq!(coerce(ParamType::ULongLong, u64::MAX).unwrap(), Scalar::ULongLong(u64::MAX));
        assert_eq!(coerce(ParamType::Int, true).unwrap(), Scalar::Int(1));
    }

    #[test]
    fn test_enum_into_integer_tag() {
        let v = Value::Enum(EnumValue::new("CUjit_target", 86));
        assert_eq!(Scalar::coerce(ParamType::Int, &v, true).unwrap(), Scalar::Int(86));
    }

    #[test]
    fn test_float_rejected_for_integer_tag() {
        let err = coerce(ParamType::Int, 1.5f64).unwrap_err();
        assert_eq!(err.to_string(), "Expected int, found float");
    }

    #[test]
    fn test_widening_is_exact() {
        let x = 0.1f32;
        assert_eq!(coerce(ParamType::Double, x).unwrap(), Scalar::Double(f64::from(x)));
    }

    #[test]
    fn test_float32_kept_as_is() {
        let x = f32::from_bits(0x7fc0_0001);
        match coerce(ParamType::Float, x).unwrap() {
            Scalar::Float(y) => assert_eq!(y.to_bits(), x.to_bits()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_narrowing_boundaries() {
        assert_eq!(coerce(ParamType::Float, f64::INFINITY).unwrap(), Scalar::Float(f32::INFINITY));
        assert_eq!(
            coerce(ParamType::Float, f64::NEG_INFINITY).unwrap(),
            Scalar::Float(f32::NEG_INFINITY)
        );
        match coerce(ParamType::Float, f64::NAN).unwrap() {
            Scalar::Float(y) => assert!(y.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            coerce(ParamType::Float, 1e300f64),
            Err(MarshalError::OutOfRange { .. })
        ));
        assert_eq!(coerce(ParamType::Float, f64::from(f32::MAX)).unwrap(), Scalar::Float(f32::MAX));
        assert!(matches!(
            coerce(ParamType::Half, 70000.0f64),
            Err(MarshalError::OutOfRange { .. })
        ));
        assert_eq!(coerce(ParamType::Half, 1.5f64).unwrap(), Scalar::Half(f16::from_f32(1.5)));
    }

    #[test]
    fn test_lenient_narrowing_saturates() {
        let s = Scalar::coerce(ParamType::Float, &Value::Float(1e300), false).unwrap();
        assert_eq!(s, Scalar::Float(f32::INFINITY));
    }

    #[test]
    fn test_void_ptr() {
        assert_eq!(coerce(ParamType::VoidPtr, 0xdead_beefu64).unwrap(), Scalar::Ptr(0xdead_beef));
        let p = DevicePtr::new(5);
        let addr = crate::value::RawAddress::raw_address(&p);
        assert_eq!(
            Scalar::coerce(ParamType::VoidPtr, &Value::pointer(p), true).unwrap(),
            Scalar::Ptr(addr)
        );
        assert!(coerce(ParamType::VoidPtr, "x").is_err());
        assert!(coerce(ParamType::VoidPtr, -4i32).is_err());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let samples = [
            Scalar::Bool(true),
            Scalar::Short(-2),
            Scalar::UInt(42),
            Scalar::LongLong(i64::MIN),
            Scalar::BFloat16(bf16::from_f32(-3.0)),
            Scalar::Double(std::f64::consts::PI),
            Scalar::Ptr(0x1234),
        ];
        for s in samples {
            let mut buf = vec![0u8; s.width()];
            s.write_to(&mut buf);
            assert_eq!(Scalar::read_from(s.param_type(), &buf), Some(s));
        }
    }

    #[test]
    fn test_to_bits() {
        assert_eq!(Scalar::UInt(7).to_bits(), 7);
        assert_eq!(Scalar::Int(-1).to_bits(), u64::MAX);
        assert_eq!(Scalar::Float(1.0).to_bits(), 1.0f32.to_bits() as u64);
    }

    struct NativeBytes(Vec<u8>);

    impl crate::value::NativeStruct for NativeBytes {
        fn type_name(&self) -> &str {
            "c_uint"
        }

        fn as_bytes(&self) -> &[u8] {
            &self.0
        }
    }

    #[test]
    fn test_native_bytes_copied_at_exact_width() {
        let v = Value::native(NativeBytes(42u32.to_ne_bytes().to_vec()));
        assert_eq!(Scalar::coerce(ParamType::UInt, &v, true).unwrap(), Scalar::UInt(42));

        // Float bits are copied, not converted.
        let v = Value::native(NativeBytes(2.5f32.to_ne_bytes().to_vec()));
        assert_eq!(Scalar::coerce(ParamType::Float, &v, true).unwrap(), Scalar::Float(2.5));
    }

    #[test]
    fn test_native_bytes_of_other_width_rejected() {
        let v = Value::native(NativeBytes(vec![0u8; 2]));
        let err = Scalar::coerce(ParamType::UInt, &v, true).unwrap_err();
        assert_eq!(err.to_string(), "Expected unsigned int, found c_uint");
    }
}
