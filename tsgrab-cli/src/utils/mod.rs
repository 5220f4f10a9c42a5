mod files;
mod headers;
pub mod progress;

// Export utility functions
pub use self::files::{create_dirs, expand_name_url, resolve_target_dir};
pub use self::headers::parse_headers;
