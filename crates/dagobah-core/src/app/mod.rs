//! App - logic shared by every backend.

pub mod id_allocator;

pub use self::id_allocator::{DEFAULT_MAX_ID_ATTEMPTS, IdAllocator};
