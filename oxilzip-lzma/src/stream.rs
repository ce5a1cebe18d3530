//! Stream-level compression and decompression.
//!
//! A `.lz` stream is a concatenation of members. The functions here loop
//! the codec over whole streams: the compressor cuts members at the
//! configured size ceiling, the decompressor walks members until the
//! input ends and then applies the trailing-data policy.

use crate::decoder::LzDecoder;
use crate::encoder::{LzEncoder, MemberEncoder};
use crate::fast_encoder::FastEncoder;
use crate::matchfinder::FinderKind;
use crate::member::{coded_dictionary_size, Header, HEADER_SIZE};
use crate::model::{MAX_MATCH_LEN, MIN_MATCH_LEN_LIMIT};
use crate::range_coder::RangeDecoder;
use oxilzip_core::error::{LzipError, Result};
use std::io::{Read, Write};

/// Default member size ceiling: 2 PiB, effectively "one member".
pub const DEFAULT_MEMBER_SIZE: u64 = 0x0008_0000_0000_0000;

/// What to do with bytes following the last member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingPolicy {
    /// Any trailing data is an error.
    Strict,
    /// Stop silently at the first non-member byte.
    #[default]
    Ignore,
    /// Like `Ignore`, but also tolerate trailing bytes that look like a
    /// corrupt member header.
    Loose,
}

/// Compression parameters.
///
/// The level mapping reproduces the classic lzip table: each of the ten
/// levels picks a dictionary size and a match length limit.
#[derive(Debug, Clone, Copy)]
pub struct CompressOptions {
    /// Requested dictionary size; snapped to a header-codable value.
    pub dictionary_size: u32,
    /// Longest match the finder searches for, in [5, 273].
    pub match_len_limit: usize,
    /// Member size ceiling; a new member starts when reached.
    pub member_size: u64,
    /// Compression level this configuration came from (drives the choice
    /// of match-finder structure).
    pub level: u8,
}

/// Per-level (dictionary size, match length limit), as in lzip.
const OPTION_MAPPING: [(u32, usize); 10] = [
    (1 << 16, 16),  // -0
    (1 << 20, 5),   // -1
    (3 << 19, 6),   // -2
    (1 << 21, 8),   // -3
    (3 << 20, 12),  // -4
    (1 << 22, 20),  // -5
    (1 << 23, 36),  // -6
    (1 << 24, 68),  // -7
    (3 << 23, 132), // -8
    (1 << 25, 273), // -9
];

/// Hash-chain depth for the levels that use chains with the optimal
/// parser.
const CHAIN_DEPTH: [u32; 5] = [16, 4, 8, 16, 32];

impl CompressOptions {
    /// Configuration for a compression level 0-9 (default 6).
    pub fn from_level(level: u8) -> Self {
        let level = level.min(9);
        let (dictionary_size, match_len_limit) = OPTION_MAPPING[level as usize];
        Self {
            dictionary_size,
            match_len_limit,
            member_size: DEFAULT_MEMBER_SIZE,
            level,
        }
    }

    /// Override the dictionary size, snapping to a codable value.
    pub fn with_dictionary_size(mut self, size: u32) -> Self {
        self.dictionary_size = coded_dictionary_size(size);
        // an explicit dictionary size turns off the greedy level-0 path
        if self.level == 0 {
            self.level = 6;
        }
        self
    }

    /// Override the match length limit, clamped to [5, 273].
    pub fn with_match_len_limit(mut self, limit: usize) -> Self {
        self.match_len_limit = limit.clamp(MIN_MATCH_LEN_LIMIT, MAX_MATCH_LEN);
        if self.level == 0 {
            self.level = 6;
        }
        self
    }

    /// Override the member size ceiling.
    pub fn with_member_size(mut self, size: u64) -> Self {
        self.member_size = size;
        self
    }

    fn finder_kind(&self) -> FinderKind {
        if self.level <= 4 {
            FinderKind::HashChain {
                depth: CHAIN_DEPTH[self.level as usize],
            }
        } else {
            FinderKind::BinaryTree
        }
    }
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self::from_level(6)
    }
}

/// Decompression parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressOptions {
    /// Policy for bytes after the last member.
    pub trailing: TrailingPolicy,
}

/// Sizes accumulated over one stream operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Uncompressed bytes.
    pub in_size: u64,
    /// Compressed bytes.
    pub out_size: u64,
    /// Members processed.
    pub members: u32,
    /// Dictionary size of the largest member seen (decompression only).
    pub dictionary_size: u32,
}

/// Receives position updates while a stream operation runs.
///
/// The codec itself never prints; the driver decides how to render
/// progress.
pub trait ProgressSink {
    /// Called between members and after large processing steps with the
    /// uncompressed and compressed positions so far.
    fn progress(&mut self, in_pos: u64, out_pos: u64);
}

/// A [`ProgressSink`] that discards updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&mut self, _in_pos: u64, _out_pos: u64) {}
}

fn run_encoder<E: MemberEncoder>(
    mut encoder: E,
    member_size: u64,
    progress: &mut dyn ProgressSink,
) -> Result<Stats> {
    let mut stats = Stats::default();
    loop {
        encoder.encode_member(member_size)?;
        stats.in_size += encoder.data_position();
        stats.out_size += encoder.member_position();
        stats.members += 1;
        progress.progress(stats.in_size, stats.out_size);
        if encoder.data_finished() {
            break;
        }
        encoder.reset()?;
    }
    Ok(stats)
}

/// Compress a whole stream, cutting members at the configured ceiling.
pub fn compress<R: Read, W: Write>(
    reader: R,
    writer: W,
    options: &CompressOptions,
    progress: &mut dyn ProgressSink,
) -> Result<Stats> {
    if options.level == 0 {
        let encoder = FastEncoder::new(
            reader,
            writer,
            options.dictionary_size,
            options.match_len_limit,
        )?;
        run_encoder(encoder, options.member_size, progress)
    } else {
        let encoder = LzEncoder::new(
            reader,
            writer,
            options.dictionary_size,
            options.match_len_limit,
            options.finder_kind(),
        )?;
        run_encoder(encoder, options.member_size, progress)
    }
}

/// Decompress a stream of concatenated members.
pub fn decompress<R: Read, W: Write>(
    reader: R,
    mut writer: W,
    options: &DecompressOptions,
    progress: &mut dyn ProgressSink,
) -> Result<Stats> {
    let mut rdec = RangeDecoder::new(reader);
    let mut stats = Stats::default();
    let mut first_member = true;
    loop {
        rdec.reset_member_position();
        let mut buf = [0u8; HEADER_SIZE];
        let size = rdec.read_data(&mut buf)?;
        let header = Header { data: buf };
        if size < HEADER_SIZE {
            // end of input inside (or instead of) a header
            if first_member {
                return Err(LzipError::UnexpectedEof { position: size as u64 });
            }
            if header.matches_prefix(size) {
                // "LZ", "LZI"... cut short by the end of the file
                return Err(LzipError::UnexpectedEof { position: size as u64 });
            }
            if size > 0 && options.trailing == TrailingPolicy::Strict {
                return Err(LzipError::TrailingData);
            }
            break;
        }
        if !header.verify_magic() {
            if first_member {
                return Err(LzipError::BadMagic);
            }
            if options.trailing != TrailingPolicy::Loose && header.looks_corrupt() {
                return Err(LzipError::BadMagic);
            }
            if options.trailing == TrailingPolicy::Strict {
                return Err(LzipError::TrailingData);
            }
            break;
        }
        if header.version() != crate::member::VERSION {
            return Err(LzipError::UnsupportedVersion {
                version: header.version(),
            });
        }
        let dictionary_size = header.dictionary_size()?;
        let mut decoder = LzDecoder::new(dictionary_size, &mut writer)?;
        decoder.decode_member(&mut rdec)?;
        stats.in_size += decoder.data_position();
        stats.out_size += rdec.member_position();
        stats.members += 1;
        stats.dictionary_size = stats.dictionary_size.max(dictionary_size);
        progress.progress(stats.in_size, stats.out_size);
        first_member = false;
        if rdec.finished()? {
            break;
        }
    }
    writer.flush()?;
    Ok(stats)
}

/// Check stream integrity without keeping the output.
pub fn test<R: Read>(
    reader: R,
    options: &DecompressOptions,
    progress: &mut dyn ProgressSink,
) -> Result<Stats> {
    decompress(reader, std::io::sink(), options, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        let opts = CompressOptions::from_level(6);
        assert_eq!(opts.dictionary_size, 8 << 20);
        assert_eq!(opts.match_len_limit, 36);
        let opts = CompressOptions::from_level(0);
        assert_eq!(opts.dictionary_size, 64 << 10);
        assert_eq!(opts.match_len_limit, 16);
        let opts = CompressOptions::from_level(9);
        assert_eq!(opts.dictionary_size, 32 << 20);
        assert_eq!(opts.match_len_limit, 273);
        // out-of-range levels clamp
        assert_eq!(CompressOptions::from_level(42).level, 9);
    }

    #[test]
    fn test_option_overrides() {
        let opts = CompressOptions::from_level(6).with_match_len_limit(1000);
        assert_eq!(opts.match_len_limit, MAX_MATCH_LEN);
        let opts = CompressOptions::from_level(6).with_match_len_limit(1);
        assert_eq!(opts.match_len_limit, MIN_MATCH_LEN_LIMIT);
        let opts = CompressOptions::from_level(0).with_dictionary_size(1 << 20);
        assert_ne!(opts.level, 0);
        assert_eq!(opts.dictionary_size, 1 << 20);
    }

    #[test]
    fn test_finder_selection() {
        assert!(matches!(
            CompressOptions::from_level(3).finder_kind(),
            FinderKind::HashChain { .. }
        ));
        assert!(matches!(
            CompressOptions::from_level(7).finder_kind(),
            FinderKind::BinaryTree
        ));
    }
}
