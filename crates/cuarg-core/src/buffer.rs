//! Scoped, zero-copy borrows of externally owned buffers.
//!
//! A [`BufferGuard`] acquires a view when it is created and releases it
//! exactly once, either through [`BufferGuard::release`] or on drop.

use std::sync::Arc;

use crate::value::Value;
use crate::{MarshalError, Result};

/// Address and length of an acquired contiguous view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawView {
    pub address: usize,
    pub len: usize,
}

/// An object that can lend out a contiguous byte view of its memory.
pub trait BufferSource: Send + Sync {
    fn type_name(&self) -> &str {
        "buffer"
    }

    /// Lend out a view. Every successful call is paired with one
    /// [`BufferSource::release`].
    fn acquire(&self) -> Result<RawView>;

    /// Return a view obtained from [`BufferSource::acquire`].
    fn release(&self, view: RawView);
}

/// An acquired view, released exactly once.
pub struct BufferGuard {
    source: Arc<dyn BufferSource>,
    view: RawView,
    released: bool,
}

impl BufferGuard {
    pub fn acquire(source: Arc<dyn BufferSource>) -> Result<Self> {
        let view = source.acquire()?;
        tracing::trace!(
            source = source.type_name(),
            address = view.address,
            len = view.len,
            "acquired buffer view"
        );
        Ok(Self { source, view, released: false })
    }

    /// Acquire from a value, failing if it has no buffer capability.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Buffer(source) => Self::acquire(Arc::clone(source)),
            other => Err(MarshalError::NotABuffer(other.type_name())),
        }
    }

    /// Address of the view, or 0 once released.
    pub fn address(&self) -> usize {
        if self.released {
            0
        } else {
            self.view.address
        }
    }

    pub fn len(&self) -> usize {
        if self.released {
            0
        } else {
            self.view.len
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// The borrowed bytes.
    ///
    /// # Safety
    /// The source must keep the view valid and unaliased by writers while
    /// the guard is held.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.released || self.view.len == 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.view.address as *const u8, self.view.len)
    }

    /// Give the view back. Later calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release(self.view);
        }
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BufferGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferGuard")
            .field("source", &self.source.type_name())
            .field("view", &self.view)
            .field("released", &self.released)
            .finish()
    }
}
