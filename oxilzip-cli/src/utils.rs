//! Small CLI helpers: numeric argument parsing, file-name mapping and
//! progress display.

use indicatif::{ProgressBar, ProgressStyle};
use oxilzip_lzma::ProgressSink;

/// Known compressed-name mappings: compressing appends the first
/// extension; decompressing strips it and appends the replacement.
pub const KNOWN_EXTENSIONS: [(&str, &str); 2] = [(".lz", ""), (".tlz", ".tar")];

/// Parse a number with the usual multiplier suffixes: k = 10^3,
/// Ki = 2^10, M, Mi, G, Gi, T, Ti and so on.
pub fn parse_num(arg: &str, min: u64, max: u64) -> Result<u64, String> {
    let arg = arg.trim();
    let split = arg
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(arg.len());
    let (digits, suffix) = arg.split_at(split);
    if digits.is_empty() {
        return Err(format!("bad or missing numerical argument '{}'", arg));
    }
    let mut value: u64 = digits
        .parse()
        .map_err(|_| format!("bad numerical argument '{}'", arg))?;
    if !suffix.is_empty() {
        let mut chars = suffix.chars();
        let letter = chars.next().unwrap();
        // optional "i" for binary multiples, optional trailing "B"
        let binary = match chars.clone().next() {
            Some('i') => {
                chars.next();
                true
            }
            _ => false,
        };
        match (chars.next(), chars.next()) {
            (None, _) | (Some('B'), None) => {}
            _ => {
                return Err(format!("bad multiplier in numerical argument '{}'", arg));
            }
        }
        let factor: u64 = if binary { 1024 } else { 1000 };
        let exponent = match letter {
            'k' if !binary => 1,
            'K' if binary => 1,
            'M' => 2,
            'G' => 3,
            'T' => 4,
            'P' => 5,
            'E' => 6,
            _ => {
                return Err(format!("bad multiplier in numerical argument '{}'", arg));
            }
        };
        for _ in 0..exponent {
            value = value
                .checked_mul(factor)
                .ok_or_else(|| format!("numerical argument out of limits '{}'", arg))?;
        }
    }
    if value < min || value > max {
        return Err(format!("numerical argument out of limits '{}'", arg));
    }
    Ok(value)
}

/// Parse a dictionary size: plain values 12..29 mean powers of two.
pub fn parse_dict_size(arg: &str) -> Result<u32, String> {
    if let Ok(bits) = arg.trim().parse::<u32>() {
        if (12..=29).contains(&bits) {
            return Ok(1 << bits);
        }
    }
    parse_num(arg, 1 << 12, 1 << 29).map(|v| v as u32)
}

/// Index into [`KNOWN_EXTENSIONS`] if `name` ends with a known
/// compressed extension.
pub fn extension_index(name: &str) -> Option<usize> {
    KNOWN_EXTENSIONS
        .iter()
        .position(|(from, _)| name.len() > from.len() && name.ends_with(from))
}

/// Output name when compressing `name`.
pub fn compressed_name(name: &str) -> String {
    format!("{}{}", name, KNOWN_EXTENSIONS[0].0)
}

/// Output name when decompressing `name`; `None` if the extension is
/// not recognizable (the caller appends ".out" and warns).
pub fn decompressed_name(name: &str) -> Option<String> {
    let eindex = extension_index(name)?;
    let (from, to) = KNOWN_EXTENSIONS[eindex];
    Some(format!("{}{}", &name[..name.len() - from.len()], to))
}

/// Drives an [`indicatif`] bar from codec progress callbacks.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// A byte-position bar when the input size is known, otherwise a
    /// spinner.
    pub fn new(total: Option<u64>, enabled: bool) -> Self {
        let bar = if !enabled {
            ProgressBar::hidden()
        } else if let Some(total) = total {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .expect("progress bar template is valid"),
            );
            bar
        } else {
            ProgressBar::new_spinner()
        };
        Self { bar }
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn progress(&mut self, in_pos: u64, _out_pos: u64) {
        self.bar.set_position(in_pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_num_plain() {
        assert_eq!(parse_num("12345", 0, u64::MAX).unwrap(), 12345);
        assert!(parse_num("", 0, u64::MAX).is_err());
        assert!(parse_num("abc", 0, u64::MAX).is_err());
    }

    #[test]
    fn test_parse_num_suffixes() {
        assert_eq!(parse_num("1k", 0, u64::MAX).unwrap(), 1000);
        assert_eq!(parse_num("1Ki", 0, u64::MAX).unwrap(), 1024);
        assert_eq!(parse_num("1KiB", 0, u64::MAX).unwrap(), 1024);
        assert_eq!(parse_num("2M", 0, u64::MAX).unwrap(), 2_000_000);
        assert_eq!(parse_num("2Mi", 0, u64::MAX).unwrap(), 2 << 20);
        assert_eq!(parse_num("1Gi", 0, u64::MAX).unwrap(), 1 << 30);
        assert!(parse_num("1X", 0, u64::MAX).is_err());
        assert!(parse_num("1ki", 0, u64::MAX).is_err());
    }

    #[test]
    fn test_parse_num_limits() {
        assert!(parse_num("99", 100, 1000).is_err());
        assert!(parse_num("1001", 100, 1000).is_err());
        assert_eq!(parse_num("100", 100, 1000).unwrap(), 100);
    }

    #[test]
    fn test_parse_dict_size() {
        assert_eq!(parse_dict_size("20").unwrap(), 1 << 20);
        assert_eq!(parse_dict_size("12").unwrap(), 4096);
        assert_eq!(parse_dict_size("65536").unwrap(), 65536);
        assert_eq!(parse_dict_size("8Mi").unwrap(), 8 << 20);
        assert!(parse_dict_size("11").is_err()); // 11 < 4096 as a plain value
    }

    #[test]
    fn test_name_mapping() {
        assert_eq!(compressed_name("foo"), "foo.lz");
        assert_eq!(decompressed_name("foo.lz").unwrap(), "foo");
        assert_eq!(decompressed_name("foo.tlz").unwrap(), "foo.tar");
        assert!(decompressed_name("foo.gz").is_none());
        assert!(decompressed_name(".lz").is_none());
    }
}
