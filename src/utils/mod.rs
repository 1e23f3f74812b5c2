//! Utility modules.

pub mod extract;
pub mod file;
pub mod retry;
pub mod text;

pub use extract::{extract_text, extract_text_from_bytes};
pub use file::calculate_checksum;
pub use retry::{RetryPolicy, Retryable, retry};
pub use text::{clean_text, preview};
