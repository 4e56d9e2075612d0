/// Errors reported by heap allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// No size class could satisfy the remaining length, or the scatter
    /// table could not be allocated. Every run obtained so far has been
    /// returned before this is reported.
    #[error("out of memory")]
    OutOfMemory,
    /// The requested length is zero or too large to be page aligned.
    #[error("invalid buffer length")]
    InvalidLength,
}
