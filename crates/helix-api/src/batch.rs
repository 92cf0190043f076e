//! Request batching.
//!
//! Helix accepts at most 100 `login` / `user_login` parameters per request.

/// Maximum number of logins Helix accepts in a single request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Split `items` into batches of at most `size` elements.
///
/// A `size` of zero is treated as one so the caller always makes progress.
pub fn chunked<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size.max(1))
}

/// Number of requests needed to cover `len` items.
pub fn batch_count(len: usize, size: usize) -> usize {
    len.div_ceil(size.max(1))
}
