//! Allocator doubles shared by the integration tests.

#![allow(dead_code)]

use std::alloc::Layout;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cuarg_core::{RawAllocator, SystemAllocator};

/// Counts allocations and frees, checking every free matches a live block.
#[derive(Clone, Default)]
pub struct TrackingAllocator {
    live: Arc<Mutex<Vec<(usize, Layout)>>>,
    allocs: Arc<AtomicUsize>,
    frees: Arc<AtomicUsize>,
}

impl TrackingAllocator {
    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

impl RawAllocator for TrackingAllocator {
    fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = SystemAllocator.alloc_zeroed(layout);
        self.allocs.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().push((ptr as usize, layout));
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let mut live = self.live.lock().unwrap();
        let idx = live
            .iter()
            .position(|&(p, l)| p == ptr as usize && l == layout)
            .expect("freed a block that is not live");
        live.remove(idx);
        self.frees.fetch_add(1, Ordering::SeqCst);
        SystemAllocator.dealloc(ptr, layout);
    }
}

