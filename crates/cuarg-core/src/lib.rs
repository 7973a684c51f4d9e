//! # cuarg-core
//!
//! Argument marshaling for GPU driver boundary calls.
//!
//! Provides:
//! - Zeroed raw block allocation with pluggable allocators
//! - Scoped zero-copy borrows of foreign buffers
//! - Kernel parameter packing into a `void**` slot array
//! - Attribute marshaling keyed by driver attribute enums
//! - Pointer arrays built from marshaled helpers

pub mod alloc;
pub mod arena;
pub mod attr;
pub mod buffer;
pub mod config;
pub mod error;
pub mod param_type;
pub mod params;
pub mod pointer_array;
pub mod scalar;
pub mod value;

pub use alloc::{RawAllocator, RawBlock, SystemAllocator};
pub use attr::{
    AttributeData, AttributeFamily, AttributeValue, CoredumpSetting, GraphMemAttribute, JitOption,
    MemAllocationHandleType, MemPoolAttribute, MemRangeAttribute, PointerAttribute, Shape,
};
pub use buffer::{BufferGuard, BufferSource, RawView};
pub use config::MarshalConfig;
pub use error::{ErrorKind, MarshalError};
pub use param_type::ParamType;
pub use params::{KernelArgs, KernelParams};
pub use pointer_array::PointerArray;
pub use scalar::Scalar;
pub use value::{DevicePtr, EnumValue, ForeignAddress, NativeStruct, RawAddress, Value};

pub type Result<T> = std::result::Result<T, MarshalError>;
