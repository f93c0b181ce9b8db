/// Filesystem transport for cache entry files.
pub mod fs;
