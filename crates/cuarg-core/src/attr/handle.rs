//! Fixed-layout handle structures and the cells that hold driver-written
//! values.

use std::cell::UnsafeCell;
use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::value::NativeStruct;

/// Owned storage for one `Pod` value at a fixed address the driver may
/// write through.
pub struct NativeCell<T: Pod> {
    cell: Box<UnsafeCell<T>>,
}

// Safe code only reads through `&self`; writes come from the boundary call
// through the raw address, which the caller serializes.
unsafe impl<T: Pod + Send> Send for NativeCell<T> {}
unsafe impl<T: Pod + Sync> Sync for NativeCell<T> {}

impl<T: Pod> NativeCell<T> {
    pub fn new(value: T) -> Self {
        Self { cell: Box::new(UnsafeCell::new(value)) }
    }

    pub fn zeroed() -> Self {
        Self::new(T::zeroed())
    }

    /// Copy out the current contents.
    pub fn get(&self) -> T {
        unsafe { std::ptr::read(self.cell.get()) }
    }

    pub fn address(&self) -> usize {
        self.cell.get() as usize
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for NativeCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeCell").field(&self.get()).finish()
    }
}

/// `CUDA_POINTER_ATTRIBUTE_P2P_TOKENS`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct P2pTokens {
    pub p2p_token: u64,
    pub va_space_token: u32,
    _pad: u32,
}

impl P2pTokens {
    pub fn new(p2p_token: u64, va_space_token: u32) -> Self {
        Self { p2p_token, va_space_token, _pad: 0 }
    }
}

impl NativeStruct for P2pTokens {
    fn type_name(&self) -> &str {
        "P2pTokens"
    }

    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Size of an opaque fabric handle.
pub const FABRIC_HANDLE_SIZE: usize = 64;

/// `CUmemFabricHandle`: opaque bytes exported for cross-node sharing.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FabricHandle {
    pub data: [u8; FABRIC_HANDLE_SIZE],
}

impl FabricHandle {
    pub fn from_bytes(data: [u8; FABRIC_HANDLE_SIZE]) -> Self {
        Self { data }
    }
}

impl Default for FabricHandle {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for FabricHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FabricHandle(")?;
        for b in &self.data[..8] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..)")
    }
}

impl NativeStruct for FabricHandle {
    fn type_name(&self) -> &str {
        "FabricHandle"
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
