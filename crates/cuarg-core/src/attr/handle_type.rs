//! `CUmemAllocationHandleType`, keyed to the shareable handle each type
//! exports.

use super::{HandleKind, Shape};

attribute_family! {
    pub enum MemAllocationHandleType("allocation handle type", ByReference) {
        None = 0 => None,
        PosixFileDescriptor = 1 => Some(Shape::Int32),
        Win32 = 2 => Some(Shape::Address),
        Win32Kmt = 4 => Some(Shape::UInt32),
        Fabric = 8 => Some(Shape::Handle(HandleKind::Fabric)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{AttributeData, AttributeValue, FabricHandle, FABRIC_HANDLE_SIZE};
    use crate::error::{ErrorKind, MarshalError};
    use crate::value::Value;

    #[test]
    fn test_none_has_no_layout() {
        let err = AttributeValue::getter(MemAllocationHandleType::None).unwrap_err();
        assert!(matches!(err, MarshalError::UnsupportedAttribute { .. }));
    }

    #[test]
    fn test_fabric_handle_setter_copies_bytes() {
        let mut data = [0u8; FABRIC_HANDLE_SIZE];
        data[0] = 0xab;
        data[63] = 0xcd;
        let handle = FabricHandle::from_bytes(data);
        let attr =
            AttributeValue::setter(MemAllocationHandleType::Fabric, &Value::native(handle)).unwrap();
        assert_eq!(attr.size(), FABRIC_HANDLE_SIZE);
        let stored = unsafe { std::slice::from_raw_parts(attr.address() as *const u8, FABRIC_HANDLE_SIZE) };
        assert_eq!(stored, &data[..]);
    }

    #[test]
    fn test_fabric_handle_getter() {
        let attr = AttributeValue::getter(MemAllocationHandleType::Fabric).unwrap();
        unsafe { *(attr.address() as *mut u8).add(10) = 7 };
        let AttributeData::FabricHandle(handle) = attr.get() else {
            panic!("expected a fabric handle");
        };
        assert_eq!(handle.data[10], 7);
    }

    #[test]
    fn test_fd_setter_rejects_handle_struct() {
        let err = AttributeValue::setter(
            MemAllocationHandleType::PosixFileDescriptor,
            &Value::native(FabricHandle::default()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }
}
