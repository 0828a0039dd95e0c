//! Utility modules: developer logging and logger configuration.
pub mod devlog;
pub mod logger;
