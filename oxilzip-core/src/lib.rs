//! # OxiLzip Core
//!
//! Core components for the OxiLzip compressor.
//!
//! This crate provides the building blocks shared by the codec and the
//! command-line driver:
//!
//! - [`crc`]: the CRC-32 checksum used by the `.lz` container
//! - [`error`]: error types and the exit-status convention
//!
//! ## Example
//!
//! ```rust
//! use oxilzip_core::crc::Crc32;
//!
//! let crc = Crc32::compute(b"Hello, World!");
//! assert_eq!(crc, 0xEC4AC3D0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crc;
pub mod error;

// Re-exports for convenience
pub use crc::Crc32;
pub use error::{LzipError, Result};
