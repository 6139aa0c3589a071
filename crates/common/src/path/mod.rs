// Path handling shared by every editor.

pub mod contain;
pub mod normalize;

pub use contain::{contains, lexical_clean, ContainmentError, FileContainer};
pub use normalize::{normalize_path, PathError};
