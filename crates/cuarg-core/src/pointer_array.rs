//! Arrays of raw pointers built from already-marshaled values.
//!
//! Used for `void**` arguments such as symbol-address lists and JIT option
//! value arrays. The array owns only itself, never the pointees.

use std::ffi::c_void;
use std::mem::size_of;

use crate::alloc::{RawAllocator, RawBlock, SystemAllocator};
use crate::value::RawAddress;
use crate::Result;

pub struct PointerArray<A: RawAllocator = SystemAllocator> {
    block: RawBlock<A>,
    len: usize,
}

impl PointerArray {
    /// One entry per helper, holding that helper's exposed address.
    pub fn from_helpers(helpers: &[&dyn RawAddress]) -> Result<Self> {
        Self::from_addresses_in(helpers.iter().map(|h| h.raw_address()), SystemAllocator)
    }

    pub fn from_addresses<I>(addresses: I) -> Result<Self>
    where
        I: IntoIterator<Item = usize>,
        I::IntoIter: ExactSizeIterator,
    {
        Self::from_addresses_in(addresses, SystemAllocator)
    }
}

impl<A: RawAllocator> PointerArray<A> {
    pub fn from_addresses_in<I>(addresses: I, alloc: A) -> Result<Self>
    where
        I: IntoIterator<Item = usize>,
        I::IntoIter: ExactSizeIterator,
    {
        let addresses = addresses.into_iter();
        let len = addresses.len();
        let mut block = RawBlock::allocate_in(len, size_of::<*mut c_void>(), alloc)?;
        if len > 0 {
            let table: &mut [usize] = bytemuck::cast_slice_mut(block.as_mut_slice());
            for (entry, address) in table.iter_mut().zip(addresses) {
                *entry = address;
            }
        }
        Ok(Self { block, len })
    }

    /// Address of the array, 0 when empty.
    pub fn address(&self) -> usize {
        self.block.address()
    }

    pub fn as_ptr(&self) -> *mut *mut c_void {
        self.address() as *mut *mut c_void
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<usize> {
        self.entries().get(index).copied()
    }

    pub fn entries(&self) -> &[usize] {
        if self.len == 0 {
            return &[];
        }
        bytemuck::cast_slice(self.block.as_slice())
    }
}

impl<A: RawAllocator> std::fmt::Debug for PointerArray<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerArray")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{DevicePtr, ForeignAddress};

    #[test]
    fn test_from_helpers() {
        let a = DevicePtr::new(1);
        let b = ForeignAddress::new("CUfunction", 0x4000);
        let helpers: [&dyn RawAddress; 2] = [&a, &b];
        let array = PointerArray::from_helpers(&helpers).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(0), Some(a.raw_address()));
        assert_eq!(array.get(1), Some(0x4000));
        let first = unsafe { *(array.as_ptr() as *const usize) };
        assert_eq!(first, a.raw_address());
    }

    #[test]
    fn test_empty_is_null() {
        let array = PointerArray::from_addresses(Vec::new()).unwrap();
        assert!(array.is_empty());
        assert_eq!(array.address(), 0);
        assert_eq!(array.get(0), None);
    }
}
