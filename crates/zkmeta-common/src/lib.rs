//! zkmeta Common - Shared configuration and utilities
//!
//! This crate provides the store configuration, the text encodings used to
//! turn metadata values into node payloads, and the helpers that map
//! logical keys to coordination-service paths.

pub mod config;
pub mod encoding;
pub mod path;

pub use crate::config::{ConfigError, StoreConfig, ValidatedConfig, DEFAULT_ENCODING, DEFAULT_ROOT};
pub use encoding::{EncodingError, TextEncoding};
pub use path::{child_key, child_path, normalize_root, parent_path};
