//! # Mirage Platform
//!
//! Shared types for the Mirage mock SSH server.
//!
//! This crate provides the unified error type (`MirageError`, `MirageResult`)
//! used by every Mirage crate.
//!
//! # Examples
//!
//! ```
//! use mirage_platform::{MirageError, MirageResult};
//!
//! fn example_function() -> MirageResult<String> {
//!     Ok("Hello, Mirage!".to_string())
//! }
//!
//! # fn main() -> MirageResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, Mirage!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{MirageError, MirageResult};
