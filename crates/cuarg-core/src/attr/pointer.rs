//! `CUpointer_attribute`.

use super::{HandleKind, Shape};

attribute_family! {
    /// Attributes queried on a device or host pointer.
    pub enum PointerAttribute("pointer attribute", ByReference) {
        Context = 1 => Some(Shape::Address),
        MemoryType = 2 => Some(Shape::UInt32),
        DevicePointer = 3 => Some(Shape::Address),
        HostPointer = 4 => Some(Shape::Address),
        P2pTokens = 5 => Some(Shape::Handle(HandleKind::P2pTokens)),
        SyncMemops = 6 => Some(Shape::Bool),
        BufferId = 7 => Some(Shape::UInt64),
        IsManaged = 8 => Some(Shape::Bool),
        DeviceOrdinal = 9 => Some(Shape::Int32),
        IsLegacyCudaIpcCapable = 10 => Some(Shape::Bool),
        RangeStartAddr = 11 => Some(Shape::Address),
        RangeSize = 12 => Some(Shape::Size),
        Mapped = 13 => Some(Shape::Bool),
        AllowedHandleTypes = 14 => Some(Shape::UInt64),
        IsGpuDirectRdmaCapable = 15 => Some(Shape::Bool),
        AccessFlags = 16 => Some(Shape::UInt32),
        MempoolHandle = 17 => Some(Shape::Address),
        MappingSize = 18 => Some(Shape::Size),
        MappingBaseAddr = 19 => Some(Shape::Address),
        MemoryBlockId = 20 => Some(Shape::UInt64),
        IsHwDecompressCapable = 21 => Some(Shape::Bool),
    }
}
