//! Zero-initialized raw block allocation.
//!
//! Blocks are handed to driver calls by address, so they live outside the
//! usual `Vec` growth rules: the address is fixed from allocation to drop.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::{MarshalError, Result};

/// Alignment of every block. Covers all scalar parameter types.
pub const BLOCK_ALIGN: usize = 16;

/// Source of zeroed raw memory.
///
/// The default is the global allocator; tests swap in tracking or failing
/// implementations.
pub trait RawAllocator {
    /// Allocate zeroed memory for `layout`. Returns null on failure.
    fn alloc_zeroed(&self, layout: Layout) -> *mut u8;

    /// Free memory previously returned by [`RawAllocator::alloc_zeroed`].
    ///
    /// # Safety
    /// `ptr` must come from `alloc_zeroed` on this allocator with the same
    /// `layout`, and must not be freed twice.
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout);
}

/// The process-global allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl RawAllocator for SystemAllocator {
    fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        unsafe { std::alloc::alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        std::alloc::dealloc(ptr, layout)
    }
}

/// An owned, zeroed, fixed-address block of bytes.
///
/// Freed exactly once on drop. Zero-sized blocks own no memory.
pub struct RawBlock<A: RawAllocator = SystemAllocator> {
    ptr: NonNull<u8>,
    layout: Layout,
    alloc: A,
}

// The block is exclusively owned; sharing follows the allocator.
unsafe impl<A: RawAllocator + Send> Send for RawBlock<A> {}
unsafe impl<A: RawAllocator + Sync> Sync for RawBlock<A> {}

impl RawBlock {
    /// Allocate `count * element_size` zeroed bytes from the global allocator.
    pub fn allocate(count: usize, element_size: usize) -> Result<Self> {
        Self::allocate_in(count, element_size, SystemAllocator)
    }
}

impl<A: RawAllocator> RawBlock<A> {
    /// Allocate `count * element_size` zeroed bytes from `alloc`.
    pub fn allocate_in(count: usize, element_size: usize, alloc: A) -> Result<Self> {
        let nbytes = count
            .checked_mul(element_size)
            .ok_or(MarshalError::OutOfMemory { bytes: usize::MAX })?;
        let layout = Layout::from_size_align(nbytes, BLOCK_ALIGN)
            .map_err(|_| MarshalError::OutOfMemory { bytes: nbytes })?;
        if nbytes == 0 {
            return Ok(Self { ptr: NonNull::dangling(), layout, alloc });
        }
        let ptr = NonNull::new(alloc.alloc_zeroed(layout))
            .ok_or(MarshalError::OutOfMemory { bytes: nbytes })?;
        Ok(Self { ptr, layout, alloc })
    }

    /// Number of bytes in this block.
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Address of the first byte, or 0 for an empty block.
    pub fn address(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.ptr.as_ptr() as usize
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl<A: RawAllocator> Drop for RawBlock<A> {
    fn drop(&mut self) {
        if !self.is_empty() {
            unsafe { self.alloc.dealloc(self.ptr.as_ptr(), self.layout) };
        }
    }
}

impl<A: RawAllocator> std::fmt::Debug for RawBlock<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBlock")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len())
            .finish()
    }
}
