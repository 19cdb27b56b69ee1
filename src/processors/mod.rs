//! Pipeline processing stages.

pub mod convert;
pub mod dispatch;
pub mod merge;

// Re-export key operations for convenience
pub use convert::{convert_all, convert_capture, sanitize_file_name, sort_by_mtime};
pub use dispatch::{dispatch_transforms, Algorithm, DispatchError};
pub use merge::merge_tables;
