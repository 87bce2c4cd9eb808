//! Shared test utilities for the obs-inventory workspace.
//!
//! This crate provides common testing infrastructure including:
//! - `htar -tvf` listing generators
//! - Archive filename fixtures
//! - Temporary directory and database path helpers
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, htar_listing, ListingEntry};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use generators::*;
pub use paths::*;

/// Assert that an optional string field holds the expected value.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_some_str;
///
/// assert_some_str!(meta.prefix, "gdas");
/// ```
#[macro_export]
macro_rules! assert_some_str {
    ($field:expr, $expected:expr) => {{
        match $field.as_deref() {
            Some(value) => assert_eq!(value, $expected, "unexpected value for `{}`", stringify!($field)),
            None => panic!("assertion failed: `{}` is None, expected `{:?}`", stringify!($field), $expected),
        }
    }};
}
