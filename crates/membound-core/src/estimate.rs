//! Size estimation interface.
//!
//! The limiter never measures memory itself; it asks an injected estimator
//! for the approximate footprint of each element. Estimators must return the
//! same value for the same element at admission and at release, otherwise
//! the accounted usage drifts.

/// Approximate byte footprint of an element.
pub trait SizeEstimator<E>: Send + Sync {
    fn estimate(&self, element: &E) -> usize;
}

impl<E, F> SizeEstimator<E> for F
where
    F: Fn(&E) -> usize + Send + Sync,
{
    fn estimate(&self, element: &E) -> usize {
        self(element)
    }
}

/// Shallow size of the value itself (`size_of_val`), ignoring heap data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowSize;

impl<E> SizeEstimator<E> for ShallowSize {
    fn estimate(&self, element: &E) -> usize {
        std::mem::size_of_val(element)
    }
}

/// Length of the byte view of the element (buffers, strings, blobs).
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteLen;

impl<E: AsRef<[u8]>> SizeEstimator<E> for ByteLen {
    fn estimate(&self, element: &E) -> usize {
        element.as_ref().len()
    }
}

/// Every element costs the same number of bytes.
#[derive(Debug, Clone, Copy)]
pub struct FixedSize(pub usize);

impl<E> SizeEstimator<E> for FixedSize {
    fn estimate(&self, _element: &E) -> usize {
        self.0
    }
}
