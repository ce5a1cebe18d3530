//! oxilzip - a lossless data compressor for the lzip format.
//!
//! The driver is thin: it routes bytes between files (or the standard
//! streams) and the codec in `oxilzip-lzma`, maps file names, and turns
//! codec errors into the conventional exit statuses (0 ok, 1
//! environmental, 2 corrupt input, 3 internal error).

mod list;
mod utils;

use clap::Parser;
use oxilzip_core::error::{LzipError, Result};
use oxilzip_lzma::{
    compress, decompress, test, CompressOptions, DecompressOptions, TrailingPolicy,
    DEFAULT_MEMBER_SIZE,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, IsTerminal, Read};
use std::process::ExitCode;
use utils::BarProgress;

#[derive(Parser)]
#[command(
    name = "oxilzip",
    version,
    about = "Lossless data compressor for the lzip (.lz) format",
    long_about = "Oxilzip is a lossless data compressor with a user interface similar to\n\
                  the one of gzip or bzip2, fully compatible with the lzip file format.\n\
                  It uses a simplified form of the LZMA stream format, chosen to\n\
                  maximize safety and interoperability.\n\n\
                  If no file names are given, or if a file is '-', oxilzip compresses\n\
                  or decompresses from standard input to standard output.\n\
                  Numbers accept the usual multipliers: k = 10^3, Ki = 2^10, M, Mi,\n\
                  G, Gi... Dictionary sizes 12 to 29 are read as powers of two."
)]
struct Cli {
    /// Exit with error status if trailing data follows the last member
    #[arg(short = 'a', long = "trailing-error")]
    trailing_error: bool,

    /// Set member size limit in bytes
    #[arg(short = 'b', long = "member-size", value_name = "bytes")]
    member_size: Option<String>,

    /// Write to standard output, keep input files
    #[arg(short = 'c', long = "stdout")]
    to_stdout: bool,

    /// Decompress
    #[arg(short = 'd', long = "decompress")]
    decompress: bool,

    /// Overwrite existing output files
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Force re-compression of files with a compressed extension
    #[arg(short = 'F', long = "recompress")]
    recompress: bool,

    /// Keep (don't delete) input files
    #[arg(short = 'k', long = "keep")]
    keep: bool,

    /// Print (un)compressed file sizes
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Set match length limit in bytes [36]
    #[arg(short = 'm', long = "match-length", value_name = "bytes")]
    match_length: Option<String>,

    /// Write output to <file>, keep input files
    #[arg(short = 'o', long = "output", value_name = "file")]
    output: Option<String>,

    /// Suppress all messages
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Set dictionary size limit in bytes [8 MiB]
    #[arg(short = 's', long = "dictionary-size", value_name = "bytes")]
    dictionary_size: Option<String>,

    /// Test compressed file integrity
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Be verbose (a second -v gives more)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Compress faster
    #[arg(short = '0', long = "fast", action = clap::ArgAction::Count)]
    level0: u8,
    #[arg(short = '1', hide = true, action = clap::ArgAction::Count)]
    level1: u8,
    #[arg(short = '2', hide = true, action = clap::ArgAction::Count)]
    level2: u8,
    #[arg(short = '3', hide = true, action = clap::ArgAction::Count)]
    level3: u8,
    #[arg(short = '4', hide = true, action = clap::ArgAction::Count)]
    level4: u8,
    #[arg(short = '5', hide = true, action = clap::ArgAction::Count)]
    level5: u8,
    #[arg(short = '6', hide = true, action = clap::ArgAction::Count)]
    level6: u8,
    #[arg(short = '7', hide = true, action = clap::ArgAction::Count)]
    level7: u8,
    #[arg(short = '8', hide = true, action = clap::ArgAction::Count)]
    level8: u8,
    /// Compress better
    #[arg(short = '9', long = "best", action = clap::ArgAction::Count)]
    level9: u8,

    /// Allow trailing data that only resembles a corrupt header
    #[arg(long = "loose-trailing")]
    loose_trailing: bool,

    /// Files to process ('-' means standard input)
    files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Compress,
    Decompress,
    Test,
    List,
}

impl Cli {
    /// The last level flag on the command line wins, so `-9 -0` means
    /// level 0 just as in the rest of the gzip family.
    fn level(&self, matches: &clap::ArgMatches) -> u8 {
        let counts = [
            self.level0,
            self.level1,
            self.level2,
            self.level3,
            self.level4,
            self.level5,
            self.level6,
            self.level7,
            self.level8,
            self.level9,
        ];
        let mut level = 6u8;
        let mut last_index = None;
        for (digit, count) in counts.into_iter().enumerate() {
            if count == 0 {
                continue;
            }
            let id = format!("level{}", digit);
            if let Some(index) = matches.indices_of(id.as_str()).and_then(|i| i.last()) {
                if last_index.map_or(true, |last| index > last) {
                    last_index = Some(index);
                    level = digit as u8;
                }
            }
        }
        level
    }

    fn mode(&self) -> Mode {
        if self.list {
            Mode::List
        } else if self.test {
            Mode::Test
        } else if self.decompress {
            Mode::Decompress
        } else {
            Mode::Compress
        }
    }

    fn verbosity(&self) -> i8 {
        if self.quiet {
            -1
        } else {
            self.verbose as i8
        }
    }
}

fn main() -> ExitCode {
    // the derive API hides the matches, but flag order is needed to
    // resolve repeated level flags; parse in two steps
    let matches = <Cli as clap::CommandFactory>::command().get_matches();
    let cli = match <Cli as clap::FromArgMatches>::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    let level = cli.level(&matches);
    match run(&cli, level) {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            if cli.verbosity() >= 0 {
                eprintln!("oxilzip: {}", msg);
            }
            ExitCode::from(1)
        }
    }
}

/// Build the compression options from the command line; an `Err` means a
/// bad argument (environmental, status 1).
fn build_options(cli: &Cli, level: u8) -> std::result::Result<CompressOptions, String> {
    let mut options = CompressOptions::from_level(level);
    if let Some(arg) = &cli.dictionary_size {
        options = options.with_dictionary_size(utils::parse_dict_size(arg)?);
    }
    if let Some(arg) = &cli.match_length {
        let limit = utils::parse_num(arg, 5, 273)?;
        options = options.with_match_len_limit(limit as usize);
    }
    if let Some(arg) = &cli.member_size {
        options = options.with_member_size(utils::parse_num(arg, 100_000, DEFAULT_MEMBER_SIZE)?);
    }
    Ok(options)
}

fn run(cli: &Cli, level: u8) -> std::result::Result<u8, String> {
    let mode = cli.mode();
    let options = build_options(cli, level)?;
    let trailing = if cli.trailing_error {
        TrailingPolicy::Strict
    } else if cli.loose_trailing {
        TrailingPolicy::Loose
    } else {
        TrailingPolicy::Ignore
    };
    let dopts = DecompressOptions { trailing };

    let files: Vec<String> = if cli.files.is_empty() {
        vec!["-".to_string()]
    } else {
        cli.files.clone()
    };

    if cli.output.is_some() && files.len() > 1 {
        return Err("only one file can be processed when using '--output'".to_string());
    }

    if mode == Mode::List {
        return Ok(list_files(cli, &files));
    }

    let mut retval: u8 = 0;
    let mut stdin_used = false;
    let mut failed_tests = 0usize;
    for name in &files {
        if name == "-" {
            if stdin_used {
                continue;
            }
            stdin_used = true;
        }
        match process_file(cli, mode, &options, &dopts, name) {
            Ok(()) => {}
            Err(err) => {
                let status = err.exit_status().clamp(0, 255) as u8;
                retval = retval.max(status);
                if cli.verbosity() >= 0 {
                    eprintln!("oxilzip: {}: {}", display_name(name), err);
                }
                if mode == Mode::Test {
                    failed_tests += 1;
                } else {
                    // stop at the first hard failure, like the rest of
                    // the gzip family
                    return Ok(retval);
                }
            }
        }
    }
    if failed_tests > 0 && cli.verbosity() >= 1 && files.len() > 1 {
        eprintln!(
            "oxilzip: warning: {} file(s) failed the test.",
            failed_tests
        );
    }
    Ok(retval)
}

fn display_name(name: &str) -> &str {
    if name == "-" {
        "(stdin)"
    } else {
        name
    }
}

fn list_files(cli: &Cli, files: &[String]) -> u8 {
    let mut retval = 0u8;
    let mut grand = list::ListTotals::default();
    let mut listed = 0usize;
    list::print_header(cli.verbosity() >= 1);
    for name in files {
        if name == "-" {
            if cli.verbosity() >= 0 {
                eprintln!("oxilzip: can only list regular files");
            }
            retval = retval.max(1);
            continue;
        }
        match list::list_file(name, cli.verbosity() >= 1) {
            Ok(totals) => {
                grand.data_size += totals.data_size;
                grand.compressed_size += totals.compressed_size;
                grand.members += totals.members;
                listed += 1;
            }
            Err(err) => {
                retval = retval.max(err.exit_status().clamp(0, 255) as u8);
                if cli.verbosity() >= 0 {
                    eprintln!("oxilzip: {}: {}", name, err);
                }
            }
        }
    }
    if listed > 1 {
        list::print_totals(&grand, cli.verbosity() >= 1, listed);
    }
    retval
}

/// Deletes the named file on drop unless disarmed; keeps partial output
/// from surviving a failed run.
struct OutputGuard {
    path: Option<String>,
}

impl OutputGuard {
    fn new(path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
        }
    }

    fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn create_output(path: &str, force: bool) -> Result<File> {
    if force {
        Ok(File::create(path)?)
    } else {
        File::options()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    LzipError::Io(std::io::Error::new(
                        e.kind(),
                        format!("output file '{}' already exists, use --force", path),
                    ))
                } else {
                    e.into()
                }
            })
    }
}

fn open_input(name: &str) -> Result<Box<dyn Read>> {
    if name == "-" {
        Ok(Box::new(std::io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(File::open(name)?)))
    }
}

fn input_size(name: &str) -> Option<u64> {
    if name == "-" {
        return None;
    }
    std::fs::metadata(name).ok().map(|m| m.len())
}

fn process_file(
    cli: &Cli,
    mode: Mode,
    options: &CompressOptions,
    dopts: &DecompressOptions,
    name: &str,
) -> Result<()> {
    // refuse to read compressed data from a terminal
    if matches!(mode, Mode::Decompress | Mode::Test)
        && name == "-"
        && std::io::stdin().is_terminal()
    {
        return Err(LzipError::Io(std::io::Error::other(
            "I won't read compressed data from a terminal",
        )));
    }
    if mode == Mode::Compress && name != "-" && !cli.recompress {
        if let Some(eindex) = utils::extension_index(name) {
            return Err(LzipError::Io(std::io::Error::other(format!(
                "input file already has '{}' suffix",
                utils::KNOWN_EXTENSIONS[eindex].0
            ))));
        }
    }

    let reader = open_input(name)?;
    let to_stdout = cli.to_stdout || (name == "-" && cli.output.is_none());
    let out_name = if mode == Mode::Test || to_stdout {
        None
    } else if let Some(output) = &cli.output {
        Some(output.clone())
    } else {
        match mode {
            Mode::Compress => Some(utils::compressed_name(name)),
            _ => Some(utils::decompressed_name(name).unwrap_or_else(|| {
                let fallback = format!("{}.out", name);
                if cli.verbosity() >= 1 {
                    eprintln!(
                        "oxilzip: can't guess original name for '{}' -- using '{}'",
                        name, fallback
                    );
                }
                fallback
            })),
        }
    };

    // refuse to write compressed data to a terminal
    if mode == Mode::Compress && out_name.is_none() && std::io::stdout().is_terminal() {
        return Err(LzipError::Io(std::io::Error::other(
            "I won't write compressed data to a terminal",
        )));
    }

    let progress_enabled = cli.verbosity() >= 2 && std::io::stderr().is_terminal();
    let mut progress = BarProgress::new(input_size(name), progress_enabled);

    let stats = match (&out_name, mode) {
        (_, Mode::Test) => test(reader, dopts, &mut progress)?,
        (None, Mode::Compress) => {
            let stdout = std::io::stdout().lock();
            compress(reader, BufWriter::new(stdout), options, &mut progress)?
        }
        (None, _) => {
            let stdout = std::io::stdout().lock();
            decompress(reader, BufWriter::new(stdout), dopts, &mut progress)?
        }
        (Some(path), _) => {
            let file = create_output(path, cli.force)?;
            let guard = OutputGuard::new(path);
            let result = match mode {
                Mode::Compress => compress(reader, BufWriter::new(file), options, &mut progress),
                _ => decompress(reader, BufWriter::new(file), dopts, &mut progress),
            };
            match result {
                Ok(stats) => {
                    guard.disarm();
                    stats
                }
                Err(e) => return Err(e), // guard drops: partial file deleted
            }
        }
    };
    progress.finish();

    if cli.verbosity() >= 1 {
        match mode {
            Mode::Compress => {
                if stats.in_size == 0 || stats.out_size == 0 {
                    eprintln!("{}: no data compressed.", display_name(name));
                } else {
                    eprintln!(
                        "{}: {:.3}:1, {:5.2}% ratio, {:5.2}% saved, {} in, {} out.",
                        display_name(name),
                        stats.in_size as f64 / stats.out_size as f64,
                        100.0 * stats.out_size as f64 / stats.in_size as f64,
                        100.0 - 100.0 * stats.out_size as f64 / stats.in_size as f64,
                        stats.in_size,
                        stats.out_size,
                    );
                }
            }
            Mode::Decompress => eprintln!("{}: done", display_name(name)),
            Mode::Test => eprintln!("{}: ok", display_name(name)),
            Mode::List => {}
        }
    }

    // one-to-one operation consumed the input; delete it unless asked
    // not to
    let one_to_one = name != "-" && out_name.is_some() && cli.output.is_none();
    if one_to_one && !cli.keep && mode != Mode::Test {
        std::fs::remove_file(name)?;
    }
    Ok(())
}
