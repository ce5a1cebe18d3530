//! End-to-end stream tests: compress with every parser configuration,
//! decompress, and compare; plus corruption and framing checks.

use oxilzip_core::crc::Crc32;
use oxilzip_core::error::LzipError;
use oxilzip_lzma::{
    compress, decompress, CompressOptions, DecompressOptions, NoProgress, Trailer, TrailingPolicy,
    TRAILER_SIZE,
};
use std::io::Cursor;

fn pack(data: &[u8], options: &CompressOptions) -> Vec<u8> {
    let mut out = Vec::new();
    compress(Cursor::new(data), &mut out, options, &mut NoProgress).unwrap();
    out
}

fn unpack(blob: &[u8]) -> Result<Vec<u8>, LzipError> {
    let mut out = Vec::new();
    decompress(
        Cursor::new(blob),
        &mut out,
        &DecompressOptions::default(),
        &mut NoProgress,
    )?;
    Ok(out)
}

fn roundtrip(data: &[u8], options: &CompressOptions) {
    let blob = pack(data, options);
    let restored = unpack(&blob).expect("decompression failed");
    assert_eq!(restored, data, "roundtrip mismatch at level {}", options.level);
}

/// A small deterministic pseudo-random generator, so tests need no
/// external crates.
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn bytes(&mut self, len: usize, modulo: u16) -> Vec<u8> {
        (0..len).map(|_| (self.next() % modulo as u64) as u8).collect()
    }
}

#[test]
fn roundtrip_small_inputs_all_levels() {
    let samples: &[&[u8]] = &[
        b"",
        b"A",
        b"hello\n",
        b"abcabcabcabc",
        b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        b"the quick brown fox jumps over the lazy dog",
    ];
    for level in 0..=9 {
        let options = CompressOptions::from_level(level);
        for data in samples {
            roundtrip(data, &options);
        }
    }
}

#[test]
fn roundtrip_repetitive() {
    let data: Vec<u8> = b"abcd".iter().cycle().take(1 << 20).copied().collect();
    let options = CompressOptions::from_level(0);
    let blob = pack(&data, &options);
    assert!(
        blob.len() <= 2048,
        "1 MiB of repeating abcd should pack below 2 KiB, got {}",
        blob.len()
    );
    assert_eq!(unpack(&blob).unwrap(), data);
}

#[test]
fn roundtrip_random_data() {
    let mut rng = Xorshift(0x1234_5678_9ABC_DEF0);
    let data = rng.bytes(60_000, 256);
    for level in [0u8, 1, 4, 6, 9] {
        roundtrip(&data, &CompressOptions::from_level(level));
    }
}

#[test]
fn roundtrip_low_entropy() {
    let mut rng = Xorshift(42);
    let data = rng.bytes(120_000, 5);
    for level in [0u8, 2, 6, 9] {
        let options = CompressOptions::from_level(level);
        let blob = pack(&data, &options);
        if level > 0 {
            assert!(blob.len() < data.len(), "low-entropy data must shrink");
        }
        assert_eq!(unpack(&blob).unwrap(), data);
    }
}

#[test]
fn roundtrip_text() {
    let data: Vec<u8> = b"It was the best of times, it was the worst of times. "
        .iter()
        .cycle()
        .take(200_000)
        .copied()
        .collect();
    for level in [1u8, 6, 9] {
        let options = CompressOptions::from_level(level);
        let blob = pack(&data, &options);
        assert!(blob.len() * 10 < data.len(), "highly repetitive text");
        assert_eq!(unpack(&blob).unwrap(), data);
    }
}

#[test]
fn roundtrip_exceeds_dictionary() {
    // more data than the window: matches must stay inside the dictionary
    let mut rng = Xorshift(7);
    let data = rng.bytes(300_000, 17);
    let options = CompressOptions::from_level(6).with_dictionary_size(4096);
    roundtrip(&data, &options);
}

#[test]
fn roundtrip_long_match_limit() {
    let data = vec![0u8; 50_000];
    let options = CompressOptions::from_level(9); // match_len_limit = 273
    let blob = pack(&data, &options);
    assert!(blob.len() < 200);
    assert_eq!(unpack(&blob).unwrap(), data);
}

#[test]
fn trailer_fields() {
    let data = b"hello\n";
    let blob = pack(data, &CompressOptions::from_level(6));
    let trailer = Trailer::parse(blob[blob.len() - TRAILER_SIZE..].try_into().unwrap());
    assert_eq!(trailer.data_size, 6);
    assert_eq!(trailer.member_size, blob.len() as u64);
    assert_eq!(trailer.data_crc, Crc32::compute(data));
    assert_eq!(trailer.data_crc, 0x363A_3020);
}

#[test]
fn empty_input_produces_valid_member() {
    let blob = pack(b"", &CompressOptions::from_level(6));
    assert_eq!(blob.len(), 36); // 6 header + 10 payload + 20 trailer
    let trailer = Trailer::parse(blob[blob.len() - TRAILER_SIZE..].try_into().unwrap());
    assert_eq!(trailer.data_size, 0);
    assert_eq!(trailer.data_crc, 0);
    assert_eq!(unpack(&blob).unwrap(), b"");
}

#[test]
fn multimember_split_and_concat() {
    // barely compressible data, so the member-size ceiling actually cuts
    let mut rng = Xorshift(0xFEED);
    let data = rng.bytes(350_000, 256);
    let options = CompressOptions::from_level(1).with_member_size(100_000);
    let mut out = Vec::new();
    let stats = compress(
        Cursor::new(&data),
        &mut out,
        &options,
        &mut NoProgress,
    )
    .unwrap();
    assert!(stats.members >= 2, "expected several members");
    assert_eq!(stats.in_size, data.len() as u64);
    assert_eq!(stats.out_size, out.len() as u64);
    assert_eq!(unpack(&out).unwrap(), data);
}

#[test]
fn concatenated_members_decode_in_order() {
    let a = pack(b"first part ", &CompressOptions::from_level(6));
    let b = pack(b"and second", &CompressOptions::from_level(1));
    let mut blob = a;
    blob.extend_from_slice(&b);
    let mut out = Vec::new();
    let stats = decompress(
        Cursor::new(&blob),
        &mut out,
        &DecompressOptions::default(),
        &mut NoProgress,
    )
    .unwrap();
    assert_eq!(out, b"first part and second");
    assert_eq!(stats.members, 2);
}

#[test]
fn truncation_is_detected() {
    let blob = pack(b"truncate me please, somewhere", &CompressOptions::from_level(6));
    for cut in [blob.len() - 1, blob.len() - TRAILER_SIZE, 10, 3] {
        let err = unpack(&blob[..cut]).expect_err("truncated stream must fail");
        assert!(err.is_corrupt(), "cut at {}: {:?}", cut, err);
    }
}

#[test]
fn trailer_corruption_is_detected() {
    let blob = pack(b"check my trailer", &CompressOptions::from_level(6));
    for byte in blob.len() - TRAILER_SIZE..blob.len() {
        let mut bad = blob.clone();
        bad[byte] ^= 0x01;
        let err = unpack(&bad).expect_err("corrupt trailer must fail");
        assert!(err.is_corrupt(), "flip at {}: {:?}", byte, err);
    }
}

#[test]
fn header_corruption_is_detected() {
    let blob = pack(b"some data", &CompressOptions::from_level(6));

    let mut bad = blob.clone();
    bad[0] = b'X';
    assert!(matches!(unpack(&bad), Err(LzipError::BadMagic)));

    let mut bad = blob.clone();
    bad[4] = 2;
    assert!(matches!(
        unpack(&bad),
        Err(LzipError::UnsupportedVersion { version: 2 })
    ));

    let mut bad = blob;
    bad[5] = 0x0B; // base 11 is below the valid range
    assert!(matches!(unpack(&bad), Err(LzipError::BadDictionarySize)));
}

#[test]
fn trailing_data_policies() {
    let mut blob = pack(b"payload", &CompressOptions::from_level(6));
    blob.extend_from_slice(b"junk that is clearly not a header");

    let strict = DecompressOptions {
        trailing: TrailingPolicy::Strict,
    };
    let ignore = DecompressOptions::default();
    let loose = DecompressOptions {
        trailing: TrailingPolicy::Loose,
    };

    let mut out = Vec::new();
    let err = decompress(Cursor::new(&blob), &mut out, &strict, &mut NoProgress)
        .expect_err("strict mode rejects trailing data");
    assert!(matches!(err, LzipError::TrailingData));

    let mut out = Vec::new();
    decompress(Cursor::new(&blob), &mut out, &ignore, &mut NoProgress).unwrap();
    assert_eq!(out, b"payload");

    // a near-miss header is rejected unless the policy is loose
    let mut tricky = pack(b"payload", &CompressOptions::from_level(6));
    tricky.extend_from_slice(b"LZIX\x01\x0C and then some");
    let mut out = Vec::new();
    let err = decompress(Cursor::new(&tricky), &mut out, &ignore, &mut NoProgress)
        .expect_err("corrupt-looking header rejected by default");
    assert!(err.is_corrupt());
    let mut out = Vec::new();
    decompress(Cursor::new(&tricky), &mut out, &loose, &mut NoProgress).unwrap();
    assert_eq!(out, b"payload");
}

#[test]
fn payload_corruption_is_detected() {
    let mut rng = Xorshift(99);
    let data = rng.bytes(20_000, 32);
    let blob = pack(&data, &CompressOptions::from_level(6));
    // flip one bit in a spread of payload positions; every flip must
    // surface as an error by the time the trailer is checked. The last
    // few payload bytes are excluded: bits below the final range-coder
    // decision can be flipped without changing any decoded symbol
    let mut detected = 0;
    let positions: Vec<usize> = (6..blob.len() - TRAILER_SIZE - 8).step_by(211).collect();
    for &p in &positions {
        let mut bad = blob.clone();
        bad[p] ^= 0x10;
        if unpack(&bad).is_err() {
            detected += 1;
        }
    }
    assert_eq!(detected, positions.len(), "all payload flips detected");
}

#[test]
fn small_input_shrinks_coded_dictionary() {
    // a 100-byte input must not advertise the level's full dictionary
    let blob = pack(&[7u8; 100], &CompressOptions::from_level(9));
    let header_ds = blob[5];
    assert_eq!(header_ds & 0x1F, 12, "smallest dictionary for tiny input");
    assert_eq!(unpack(&blob).unwrap(), vec![7u8; 100]);
}

#[test]
fn stats_report_members_and_sizes() {
    let data = vec![1u8; 1000];
    let mut out = Vec::new();
    let stats = compress(
        Cursor::new(&data),
        &mut out,
        &CompressOptions::from_level(6),
        &mut NoProgress,
    )
    .unwrap();
    assert_eq!(stats.in_size, 1000);
    assert_eq!(stats.members, 1);
    assert_eq!(stats.out_size, out.len() as u64);

    let mut sink = Vec::new();
    let dstats = decompress(
        Cursor::new(&out),
        &mut sink,
        &DecompressOptions::default(),
        &mut NoProgress,
    )
    .unwrap();
    assert_eq!(dstats.in_size, 1000);
    assert_eq!(dstats.out_size, out.len() as u64);
    assert_eq!(dstats.dictionary_size, 4096);
}
