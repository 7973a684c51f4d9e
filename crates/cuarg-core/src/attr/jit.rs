//! `CUjit_option`.
//!
//! JIT options travel as a pair of arrays: option selectors and a `void*`
//! per option. Scalar options are stored directly in the `void*` slot, so
//! [`AttributeValue::address`](super::AttributeValue::address) yields the
//! value bits for them. Log buffers, symbol names and symbol addresses are
//! real pointers.

use super::Shape;

attribute_family! {
    pub enum JitOption("JIT option", ByValue) {
        MaxRegisters = 0 => Some(Shape::UInt32),
        ThreadsPerBlock = 1 => Some(Shape::UInt32),
        WallTime = 2 => Some(Shape::Float32),
        InfoLogBuffer = 3 => Some(Shape::Bytes),
        InfoLogBufferSizeBytes = 4 => Some(Shape::UInt32),
        ErrorLogBuffer = 5 => Some(Shape::Bytes),
        ErrorLogBufferSizeBytes = 6 => Some(Shape::UInt32),
        OptimizationLevel = 7 => Some(Shape::UInt32),
        // Takes no value.
        TargetFromCucontext = 8 => None,
        Target = 9 => Some(Shape::Int32),
        FallbackStrategy = 10 => Some(Shape::Int32),
        GenerateDebugInfo = 11 => Some(Shape::Int32),
        LogVerbose = 12 => Some(Shape::Int32),
        GenerateLineInfo = 13 => Some(Shape::Int32),
        CacheMode = 14 => Some(Shape::Int32),
        NewSm3xOpt = 15 => Some(Shape::Int32),
        FastCompile = 16 => Some(Shape::Int32),
        GlobalSymbolNames = 17 => Some(Shape::StringList),
        GlobalSymbolAddresses = 18 => Some(Shape::AddressList),
        GlobalSymbolCount = 19 => Some(Shape::UInt32),
        PositionIndependentCode = 25 => Some(Shape::Int32),
        MinCtaPerSm = 26 => Some(Shape::UInt32),
        MaxThreadsPerBlock = 27 => Some(Shape::UInt32),
        OverrideDirectiveValues = 28 => Some(Shape::Int32),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;
    use std::os::raw::c_char;

    use super::*;
    use crate::attr::{AttributeData, AttributeFamily, AttributeValue};
    use crate::error::{ErrorKind, MarshalError};
    use crate::value::{DevicePtr, EnumValue, RawAddress, Value};

    #[test]
    fn test_deprecated_lto_range_is_unknown() {
        for raw in 20..=24 {
            assert!(JitOption::from_raw(raw).is_none());
        }
        assert_eq!(JitOption::from_raw(28), Some(JitOption::OverrideDirectiveValues));
    }

    #[test]
    fn test_scalar_travels_by_value() {
        let attr = AttributeValue::setter(JitOption::MaxRegisters, &Value::from(32u32)).unwrap();
        assert_eq!(attr.address(), 32);
        assert_eq!(attr.size(), 4);
    }

    #[test]
    fn test_enum_target_by_value() {
        let target = Value::Enum(EnumValue::new("CUjit_target", 86));
        let attr = AttributeValue::setter(JitOption::Target, &target).unwrap();
        assert_eq!(attr.address(), 86);
    }

    #[test]
    fn test_wall_time_carries_float_bits() {
        let attr = AttributeValue::setter(JitOption::WallTime, &Value::from(1.5f32)).unwrap();
        assert_eq!(attr.address() as u32, 1.5f32.to_bits());
    }

    #[test]
    fn test_log_buffer_from_size() {
        let attr = AttributeValue::setter(JitOption::InfoLogBuffer, &Value::from(256usize)).unwrap();
        assert_eq!(attr.size(), 256);
        assert_ne!(attr.address(), 0);
    }

    #[test]
    fn test_error_log_getter() {
        let attr = AttributeValue::getter_with_capacity(JitOption::ErrorLogBuffer, 32).unwrap();
        let msg = b"ptxas error";
        unsafe {
            std::ptr::copy_nonoverlapping(msg.as_ptr(), attr.address() as *mut u8, msg.len())
        };
        let AttributeData::Bytes(log) = attr.get() else {
            panic!("expected bytes");
        };
        assert_eq!(&log[..msg.len()], msg);
        assert_eq!(log.len(), 32);
    }

    #[test]
    fn test_scalar_getter_rejected() {
        let err = AttributeValue::getter(JitOption::OptimizationLevel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_target_from_context_is_unsupported() {
        let err = AttributeValue::setter(JitOption::TargetFromCucontext, &Value::None).unwrap_err();
        assert!(matches!(err, MarshalError::UnsupportedAttribute { .. }));
    }

    #[test]
    fn test_symbol_names() {
        let names = Value::List(vec!["alpha".into(), "beta".into()]);
        let attr = AttributeValue::setter(JitOption::GlobalSymbolNames, &names).unwrap();
        let table = attr.address() as *const *const c_char;
        let second = unsafe { CStr::from_ptr(*table.add(1)) };
        assert_eq!(second.to_str().unwrap(), "beta");
        assert_eq!(attr.size(), 2 * std::mem::size_of::<usize>());
    }

    #[test]
    fn test_symbol_addresses() {
        let dev = DevicePtr::new(0x7000);
        let cell = dev.raw_address();
        let list = Value::List(vec![Value::from(0x1000usize), Value::pointer(dev)]);
        let attr = AttributeValue::setter(JitOption::GlobalSymbolAddresses, &list).unwrap();
        let table = attr.address() as *const usize;
        assert_eq!(unsafe { *table }, 0x1000);
        assert_eq!(unsafe { *table.add(1) }, cell);
    }

    #[test]
    fn test_symbol_lists_are_set_only() {
        let err = AttributeValue::getter(JitOption::GlobalSymbolAddresses).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
