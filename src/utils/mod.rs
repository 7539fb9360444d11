//! Utility modules: developer logging, JSON helpers, numeric conversions.
pub mod devlog;
pub mod json;
pub mod num;
