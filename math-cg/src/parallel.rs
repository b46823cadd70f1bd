//! Parallel utilities with feature-gated implementations
//!
//! Rayon-backed helpers when the `rayon` feature is enabled, with
//! sequential fallbacks of identical signature otherwise. Every helper
//! preserves index order in its output so callers can build reductions
//! with a fixed combination order on top of them.

/// Check if parallel processing is available
#[cfg(feature = "rayon")]
pub fn is_parallel_available() -> bool {
    true
}

/// Check if parallel processing is available
#[cfg(not(feature = "rayon"))]
pub fn is_parallel_available() -> bool {
    false
}

/// Number of worker threads in the current pool
#[cfg(feature = "rayon")]
pub fn current_num_threads() -> usize {
    rayon::current_num_threads()
}

/// Number of worker threads in the current pool
#[cfg(not(feature = "rayon"))]
pub fn current_num_threads() -> usize {
    1
}

/// Parallel map with index, results in index order
#[cfg(feature = "rayon")]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map(f).collect()
}

/// Sequential map with index (fallback)
#[cfg(not(feature = "rayon"))]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    (0..count).map(f).collect()
}

/// Parallel for_each over mutable elements with their index
///
/// `min_len` bounds how finely rayon may split the slice.
#[cfg(feature = "rayon")]
pub fn parallel_for_each_indexed_mut<T, F>(data: &mut [T], min_len: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    use rayon::prelude::*;
    data.par_iter_mut()
        .with_min_len(min_len.max(1))
        .enumerate()
        .for_each(|(i, v)| f(i, v));
}

/// Sequential for_each over mutable elements (fallback)
#[cfg(not(feature = "rayon"))]
pub fn parallel_for_each_indexed_mut<T, F>(data: &mut [T], _min_len: usize, f: F)
where
    F: Fn(usize, &mut T),
{
    data.iter_mut().enumerate().for_each(|(i, v)| f(i, v));
}

/// Parallel for_each over mutable chunks with the chunk index
#[cfg(feature = "rayon")]
pub fn parallel_chunks_mut<T, F>(data: &mut [T], chunk_size: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    use rayon::prelude::*;
    data.par_chunks_mut(chunk_size.max(1))
        .enumerate()
        .for_each(|(c, chunk)| f(c, chunk));
}

/// Sequential for_each over mutable chunks (fallback)
#[cfg(not(feature = "rayon"))]
pub fn parallel_chunks_mut<T, F>(data: &mut [T], chunk_size: usize, f: F)
where
    F: Fn(usize, &mut [T]),
{
    data.chunks_mut(chunk_size.max(1))
        .enumerate()
        .for_each(|(c, chunk)| f(c, chunk));
}
