//! Error types for OxiLzip operations.
//!
//! A single error enum covers all failure conditions of the codec and the
//! driver: I/O failures, malformed headers, corrupt compressed streams and
//! internal consistency failures. The [`LzipError::exit_status`] method maps
//! each condition to the exit-status convention used by the lzip family of
//! tools: 0 for success, 1 for environmental problems, 2 for a corrupt or
//! invalid input file, 3 for an internal error.

use std::io;
use thiserror::Error;

/// The main error type for OxiLzip operations.
#[derive(Debug, Error)]
pub enum LzipError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Allocation failure for the dictionary or matcher buffers.
    #[error("Not enough memory ({needed} bytes needed). Try a smaller dictionary size")]
    OutOfMemory {
        /// Number of bytes that could not be allocated.
        needed: usize,
    },

    /// The bytes at a member start are not a lzip header.
    #[error("Bad magic number (file not in lzip format)")]
    BadMagic,

    /// Header carries a member format version this tool does not know.
    #[error("Version {version} member format not supported")]
    UnsupportedVersion {
        /// The version byte found in the header.
        version: u8,
    },

    /// The coded dictionary size decodes to an out-of-range value.
    #[error("Invalid dictionary size in member header")]
    BadDictionarySize,

    /// CRC of the decompressed data does not match the trailer.
    #[error("CRC mismatch; stored {stored:08X}, computed {computed:08X}")]
    CrcMismatch {
        /// CRC stored in the member trailer.
        stored: u32,
        /// CRC computed over the decompressed data.
        computed: u32,
    },

    /// Decompressed size does not match the trailer.
    #[error("Data size mismatch; stored {stored}, computed {computed}")]
    DataSizeMismatch {
        /// Size stored in the member trailer.
        stored: u64,
        /// Size computed while decompressing.
        computed: u64,
    },

    /// Member size does not match the trailer.
    #[error("Member size mismatch; stored {stored}, computed {computed}")]
    MemberSizeMismatch {
        /// Size stored in the member trailer.
        stored: u64,
        /// Size computed while decompressing.
        computed: u64,
    },

    /// A match referenced data before the beginning of the dictionary.
    #[error("Invalid distance {distance} at position {position}")]
    InvalidDistance {
        /// The out-of-range match distance.
        distance: u32,
        /// Decompressed data position where it was found.
        position: u64,
    },

    /// The compressed stream is damaged in a way the range decoder detects.
    #[error("Corrupt compressed data at position {position}: {message}")]
    CorruptStream {
        /// Member position where the corruption was detected.
        position: u64,
        /// Description of the corruption.
        message: &'static str,
    },

    /// The compressed stream ends before the member does.
    #[error("File ends unexpectedly at position {position}")]
    UnexpectedEof {
        /// Member position where the input ran out.
        position: u64,
    },

    /// Bytes after the last member that are not a member header.
    #[error("Trailing data not allowed")]
    TrailingData,

    /// An invariant was violated. Always a bug.
    #[error("Internal error: {0}")]
    Internal(&'static str),
}

/// Result type alias for OxiLzip operations.
pub type Result<T> = std::result::Result<T, LzipError>;

impl LzipError {
    /// Exit status for a process terminating with this error:
    /// 1 for environmental problems, 2 for corrupt or invalid input,
    /// 3 for an internal consistency error.
    pub fn exit_status(&self) -> i32 {
        match self {
            LzipError::Io(_) | LzipError::OutOfMemory { .. } => 1,
            LzipError::Internal(_) => 3,
            _ => 2,
        }
    }

    /// True if this error reports damaged or invalid compressed input
    /// rather than an environmental problem.
    pub fn is_corrupt(&self) -> bool {
        self.exit_status() == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        let err: LzipError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.exit_status(), 1);
        assert_eq!(LzipError::BadMagic.exit_status(), 2);
        assert_eq!(
            LzipError::UnsupportedVersion { version: 2 }.exit_status(),
            2
        );
        assert_eq!(
            LzipError::CrcMismatch {
                stored: 1,
                computed: 2
            }
            .exit_status(),
            2
        );
        assert_eq!(LzipError::TrailingData.exit_status(), 2);
        assert_eq!(LzipError::Internal("bug").exit_status(), 3);
    }

    #[test]
    fn test_error_display() {
        let err = LzipError::CrcMismatch {
            stored: 0x12345678,
            computed: 0xDEADBEEF,
        };
        assert!(err.to_string().contains("CRC mismatch"));
        assert!(err.to_string().contains("12345678"));

        let err = LzipError::UnsupportedVersion { version: 2 };
        assert!(err.to_string().contains("Version 2"));
    }

    #[test]
    fn test_is_corrupt() {
        assert!(LzipError::BadMagic.is_corrupt());
        assert!(!LzipError::OutOfMemory { needed: 1 }.is_corrupt());
        assert!(!LzipError::Internal("bug").is_corrupt());
    }
}
