//! The `--list` reporter: prints per-file compressed and uncompressed
//! sizes without decoding the payload.
//!
//! Member boundaries are found by walking the file backwards: the last
//! 20 bytes of a member are its trailer, whose `member_size` field gives
//! the offset of the member's header. Each candidate header is verified
//! before trusting the step.

use oxilzip_core::error::{LzipError, Result};
use oxilzip_lzma::{Header, HEADER_SIZE, TRAILER_SIZE};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// Summary of one member found in a file.
#[derive(Debug, Clone, Copy)]
pub struct MemberInfo {
    /// Uncompressed size from the trailer.
    pub data_size: u64,
    /// Total member size from the trailer.
    pub member_size: u64,
    /// Dictionary size from the header.
    pub dictionary_size: u32,
}

/// Locate all members of an open file, in file order.
pub fn scan_members(file: &mut File) -> Result<Vec<MemberInfo>> {
    let file_size = file.seek(SeekFrom::End(0))?;
    if file_size < (HEADER_SIZE + TRAILER_SIZE) as u64 {
        return Err(LzipError::UnexpectedEof {
            position: file_size,
        });
    }
    let mut members = Vec::new();
    let mut pos = file_size;
    while pos > 0 {
        if pos < (HEADER_SIZE + TRAILER_SIZE) as u64 {
            return Err(LzipError::BadMagic);
        }
        file.seek(SeekFrom::Start(pos - TRAILER_SIZE as u64))?;
        let mut trailer = [0u8; TRAILER_SIZE];
        file.read_exact(&mut trailer)?;
        let member_size = u64::from_le_bytes(trailer[12..20].try_into().unwrap());
        let data_size = u64::from_le_bytes(trailer[4..12].try_into().unwrap());
        if member_size < (HEADER_SIZE + TRAILER_SIZE) as u64 || member_size > pos {
            return Err(LzipError::MemberSizeMismatch {
                stored: member_size,
                computed: pos,
            });
        }
        let start = pos - member_size;
        file.seek(SeekFrom::Start(start))?;
        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header)?;
        let header = Header::parse(header)?;
        members.push(MemberInfo {
            data_size,
            member_size,
            dictionary_size: header.dictionary_size()?,
        });
        pos = start;
    }
    members.reverse();
    Ok(members)
}

/// Accumulated sizes of one listed file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListTotals {
    /// Sum of the members' uncompressed sizes.
    pub data_size: u64,
    /// File size (all members).
    pub compressed_size: u64,
    /// Number of members.
    pub members: usize,
}

/// Percentage of space saved by compression.
pub fn saved_percent(data_size: u64, compressed_size: u64) -> f64 {
    if data_size == 0 {
        0.0
    } else {
        100.0 - (100.0 * compressed_size as f64) / data_size as f64
    }
}

/// List one file, printing its row. Returns the totals for the
/// multi-file summary.
pub fn list_file(name: &str, verbose: bool) -> Result<ListTotals> {
    let mut file = File::open(name)?;
    let members = scan_members(&mut file)?;
    let totals = ListTotals {
        data_size: members.iter().map(|m| m.data_size).sum(),
        compressed_size: members.iter().map(|m| m.member_size).sum(),
        members: members.len(),
    };
    if verbose {
        let dict = members.iter().map(|m| m.dictionary_size).max().unwrap_or(0);
        println!(
            "{:>6} {:>6} {:>14} {:>14}  {:5.2}%  {}",
            format_dict(dict),
            totals.members,
            totals.data_size,
            totals.compressed_size,
            saved_percent(totals.data_size, totals.compressed_size),
            name
        );
    } else {
        println!(
            "{:>14} {:>14}  {:5.2}%  {}",
            totals.data_size,
            totals.compressed_size,
            saved_percent(totals.data_size, totals.compressed_size),
            name
        );
    }
    Ok(totals)
}

/// Print the column header row.
pub fn print_header(verbose: bool) {
    if verbose {
        println!(
            "{:>6} {:>6} {:>14} {:>14}  {:>6}  name",
            "dict", "memb", "uncompressed", "compressed", "saved"
        );
    } else {
        println!(
            "{:>14} {:>14}  {:>6}  name",
            "uncompressed", "compressed", "saved"
        );
    }
}

/// Print the totals row for a multi-file listing.
pub fn print_totals(totals: &ListTotals, verbose: bool, files: usize) {
    if verbose {
        println!(
            "{:>6} {:>6} {:>14} {:>14}  {:5.2}%  (totals for {} files)",
            "",
            totals.members,
            totals.data_size,
            totals.compressed_size,
            saved_percent(totals.data_size, totals.compressed_size),
            files
        );
    } else {
        println!(
            "{:>14} {:>14}  {:5.2}%  (totals for {} files)",
            totals.data_size,
            totals.compressed_size,
            saved_percent(totals.data_size, totals.compressed_size),
            files
        );
    }
}

/// Human-readable dictionary size with binary prefixes.
fn format_dict(size: u32) -> String {
    let mut num = size;
    let mut prefix = "";
    for p in ["Ki", "Mi", "Gi"] {
        if num < 1024 || num % 1024 != 0 {
            break;
        }
        num /= 1024;
        prefix = p;
    }
    format!("{}{}B", num, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_percent() {
        assert_eq!(saved_percent(0, 36), 0.0);
        assert_eq!(saved_percent(100, 50), 50.0);
        assert!(saved_percent(100, 110) < 0.0);
    }

    #[test]
    fn test_format_dict() {
        assert_eq!(format_dict(4096), "4KiB");
        assert_eq!(format_dict(8 << 20), "8MiB");
        assert_eq!(format_dict(320 * 1024), "320KiB");
        assert_eq!(format_dict(10240), "10KiB");
    }
}
