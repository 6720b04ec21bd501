//! Shared f32 storage viewed through ranges.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, PoisonError, RwLock};

/// A view over a range of shared, contiguous f32 storage.
///
/// Several buffers may alias the same storage; writes through one are
/// visible through every other view covering the same elements. Access is
/// guarded for memory safety only: ordering between producers and consumers
/// is the job of sync points, so the guard is never contended in a correctly
/// sequenced step.
#[derive(Clone)]
pub struct Buffer {
    storage: Arc<RwLock<Vec<f32>>>,
    range: Range<usize>,
}

impl Buffer {
    /// Allocate a zero-filled buffer
    pub fn zeros(len: usize) -> Self {
        Self::from_vec(vec![0.0; len])
    }

    /// Wrap existing values in a fresh buffer
    pub fn from_vec(values: Vec<f32>) -> Self {
        let range = 0..values.len();
        Self { storage: Arc::new(RwLock::new(values)), range }
    }

    /// A sub-view of this buffer's storage, `range` relative to this view.
    ///
    /// # Panics
    ///
    /// Panics if `range` does not fit inside this view.
    pub fn view(&self, range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end && range.end <= self.numel(),
            "view {range:?} out of bounds for buffer of {} elements",
            self.numel()
        );
        Self {
            storage: Arc::clone(&self.storage),
            range: self.range.start + range.start..self.range.start + range.end,
        }
    }

    /// Number of elements in this view
    pub fn numel(&self) -> usize {
        self.range.len()
    }

    /// Size of one element in bytes
    pub fn element_size(&self) -> usize {
        std::mem::size_of::<f32>()
    }

    /// Whether the view is empty
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Range of this view inside its storage
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Whether both buffers share the same underlying storage
    pub fn aliases(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Run `f` over the elements of this view
    pub fn read<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        f(&storage[self.range.clone()])
    }

    /// Run `f` over the elements of this view, mutably
    pub fn write<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        let mut storage = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut storage[self.range.clone()])
    }

    /// Copy the elements out
    pub fn to_vec(&self) -> Vec<f32> {
        self.read(<[f32]>::to_vec)
    }

    /// Overwrite every element with `value`
    pub fn fill(&self, value: f32) {
        self.write(|data| data.fill(value));
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("range", &self.range).finish_non_exhaustive()
    }
}
