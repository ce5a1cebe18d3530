//! # OxiLzip LZMA
//!
//! The codec behind the OxiLzip compressor: a simplified LZMA
//! (Lempel-Ziv-Markov chain Algorithm) stream wrapped in the `.lz`
//! container, compatible with the lzip family of tools.
//!
//! ## Format
//!
//! A `.lz` file is a sequence of members, each of them:
//!
//! 1. 6-byte header: magic `"LZIP"`, version 1, coded dictionary size
//! 2. LZMA payload (`lc=3, lp=0, pb=2`, implicit in the format)
//! 3. 20-byte trailer: CRC-32 of the data, data size, member size
//!
//! ## Usage
//!
//! ```
//! use oxilzip_lzma::{compress, decompress, CompressOptions, DecompressOptions, NoProgress};
//! use std::io::Cursor;
//!
//! let data = b"Hello, World! Hello, World!";
//! let mut packed = Vec::new();
//! compress(
//!     Cursor::new(&data[..]),
//!     &mut packed,
//!     &CompressOptions::from_level(6),
//!     &mut NoProgress,
//! )
//! .unwrap();
//!
//! let mut restored = Vec::new();
//! decompress(
//!     Cursor::new(&packed),
//!     &mut restored,
//!     &DecompressOptions::default(),
//!     &mut NoProgress,
//! )
//! .unwrap();
//! assert_eq!(restored, data);
//! ```
//!
//! The codec is single-threaded and strictly streaming: the compressor
//! never seeks and the decompressor emits output in input order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod encoder;
pub mod fast_encoder;
pub mod matchfinder;
pub mod member;
pub mod model;
pub mod range_coder;
pub mod stream;

// Re-exports
pub use decoder::LzDecoder;
pub use encoder::{LzEncoder, MemberEncoder};
pub use fast_encoder::FastEncoder;
pub use matchfinder::{FinderKind, MatchFinder};
pub use member::{Header, Trailer, HEADER_SIZE, TRAILER_SIZE};
pub use range_coder::{RangeDecoder, RangeEncoder};
pub use stream::{
    compress, decompress, test, CompressOptions, DecompressOptions, NoProgress, ProgressSink,
    Stats, TrailingPolicy, DEFAULT_MEMBER_SIZE,
};
