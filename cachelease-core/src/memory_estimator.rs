use std::sync::Arc;

/// Estimates how many bytes a cached value occupies.
///
/// A [`Cache`](crate::Cache) charges every inserted value against its memory
/// limit. The charge is the entry header plus whatever this trait reports
/// beyond the inline size of the value, so implementations should count heap
/// allocations the value owns.
///
/// The default implementation returns `size_of_val(self)`, which is exact for
/// types without heap data.
///
/// # Examples
///
/// ```
/// use cachelease_core::MemoryEstimator;
///
/// struct Document {
///     title: String,
///     body: Vec<u8>,
/// }
///
/// impl MemoryEstimator for Document {
///     fn estimate_memory(&self) -> usize {
///         std::mem::size_of::<Self>() + self.title.capacity() + self.body.capacity()
///     }
/// }
///
/// let doc = Document {
///     title: "readme".to_string(),
///     body: vec![0; 128],
/// };
/// assert!(doc.estimate_memory() >= std::mem::size_of::<Document>() + 128);
/// ```
pub trait MemoryEstimator {
    /// Total bytes attributable to this value, inline and on the heap.
    fn estimate_memory(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

macro_rules! inline_only {
    ($($ty:ty),* $(,)?) => {
        $(impl MemoryEstimator for $ty {})*
    };
}

inline_only!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
inline_only!(f32, f64, bool, char, ());
inline_only!(&'static str);

impl MemoryEstimator for String {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + self.capacity()
    }
}

impl<T: MemoryEstimator> MemoryEstimator for Vec<T> {
    fn estimate_memory(&self) -> usize {
        let spare = (self.capacity() - self.len()) * std::mem::size_of::<T>();
        std::mem::size_of::<Self>()
            + spare
            + self.iter().map(MemoryEstimator::estimate_memory).sum::<usize>()
    }
}

impl<T: MemoryEstimator> MemoryEstimator for Option<T> {
    fn estimate_memory(&self) -> usize {
        match self {
            Some(value) => {
                std::mem::size_of::<Self>() - std::mem::size_of::<T>() + value.estimate_memory()
            }
            None => std::mem::size_of::<Self>(),
        }
    }
}

impl<T: MemoryEstimator> MemoryEstimator for Box<T> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + (**self).estimate_memory()
    }
}

/// Shared values are charged in full to every cache that holds them.
impl<T: MemoryEstimator> MemoryEstimator for Arc<T> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + (**self).estimate_memory()
    }
}

impl<A: MemoryEstimator, B: MemoryEstimator> MemoryEstimator for (A, B) {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() - std::mem::size_of::<A>() - std::mem::size_of::<B>()
            + self.0.estimate_memory()
            + self.1.estimate_memory()
    }
}
