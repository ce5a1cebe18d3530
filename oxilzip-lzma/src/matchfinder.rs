//! Sliding-window match finder.
//!
//! The finder owns the input side of the encoder: a window buffer holding
//! the last `dictionary_size` bytes plus look-ahead, refilled by blocking
//! reads, and an index over recent positions used to enumerate candidate
//! `(length, distance)` pairs at the current position.
//!
//! Two index structures are available:
//!
//! - hash chains: per-key singly linked chains of positions, scanned up to
//!   a configured depth. Cheap to maintain; used by the fast encoder and
//!   the lower compression levels.
//! - binary tree: every position is a node in a tree keyed on the byte
//!   string starting there. Insertion walks the tree splitting it into the
//!   "smaller" and "greater" subtrees, visiting the best candidates on the
//!   way; used by the higher levels.
//!
//! Both keep 2- and 3-byte head tables so short matches at short distances
//! are found even when the main index would miss them.
//!
//! When the window position reaches `pos_limit` the buffer slides: bytes
//! older than the retained zone are dropped, every stored position is
//! rebased, and the buffer is refilled. Positions are stored as
//! `buffer index + 1` so zero means "none" and rebasing can saturate dead
//! entries to zero.

use crate::model::{MAX_MATCH_LEN, MIN_DICTIONARY_SIZE, MIN_MATCH_LEN};
use oxilzip_core::error::{LzipError, Result};
use std::io::Read;

/// Upper bound on how far the optimal parser may run ahead of the last
/// emitted packet; the window retains this much before the dictionary.
pub const MAX_NUM_TRIALS: usize = 1 << 13;

const BEFORE_SIZE: usize = MAX_NUM_TRIALS + MAX_MATCH_LEN + 1;
const AFTER_SIZE: usize = MAX_NUM_TRIALS + MAX_MATCH_LEN + 1;

/// A candidate match: `len` bytes at distance `dis` (0 = previous byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    /// Match length in bytes.
    pub len: usize,
    /// Match distance; 0 addresses the byte just before the position.
    pub dis: u32,
}

/// Index structure used to locate candidate matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderKind {
    /// Hash chains scanned up to the given depth.
    HashChain {
        /// Chain positions examined per query.
        depth: u32,
    },
    /// Binary search tree over position suffixes.
    BinaryTree,
}

fn fnv_hash(bytes: &[u8]) -> u32 {
    let mut h = 2166136261u32;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(16777619);
    }
    h
}

fn alloc_i32(len: usize) -> Result<Vec<i32>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| LzipError::OutOfMemory { needed: len * 4 })?;
    v.resize(len, 0);
    Ok(v)
}

/// The sliding-window match finder.
#[derive(Debug)]
pub struct MatchFinder<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    buffer_size: usize,
    dictionary_size: usize,
    match_len_limit: usize,
    kind: FinderKind,
    cycles: u32,

    partial_data_pos: u64,
    pos: usize,
    cyclic_pos: usize,
    stream_pos: usize,
    pos_limit: usize,
    at_stream_end: bool,

    head2: Vec<i32>,
    head3: Vec<i32>,
    head4: Vec<i32>,
    key4_mask: u32,
    /// Chain links (one slot per cyclic position) or tree children
    /// (two slots per cyclic position).
    pos_array: Vec<i32>,
}

impl<R: Read> MatchFinder<R> {
    /// Create a finder over `reader` with the given window and search
    /// configuration. If the whole input is smaller than the requested
    /// dictionary, the effective dictionary shrinks to fit it.
    pub fn new(
        reader: R,
        dictionary_size: u32,
        match_len_limit: usize,
        kind: FinderKind,
    ) -> Result<Self> {
        let requested = dictionary_size as usize;
        let cycles = match kind {
            FinderKind::HashChain { depth } => depth,
            FinderKind::BinaryTree => {
                if match_len_limit < MAX_MATCH_LEN {
                    16 + match_len_limit as u32 / 2
                } else {
                    256
                }
            }
        };
        let mut mf = Self {
            reader,
            buffer: Vec::new(),
            buffer_size: 0,
            dictionary_size: requested,
            match_len_limit,
            kind,
            cycles,
            partial_data_pos: 0,
            pos: 0,
            cyclic_pos: 0,
            stream_pos: 0,
            pos_limit: 0,
            at_stream_end: false,
            head2: Vec::new(),
            head3: Vec::new(),
            head4: Vec::new(),
            key4_mask: 0,
            pos_array: Vec::new(),
        };

        mf.buffer_size = requested.max(65536);
        mf.grow_buffer(mf.buffer_size)?;
        mf.read_block()?;
        let limit = 2 * requested + BEFORE_SIZE + AFTER_SIZE;
        if !mf.at_stream_end && mf.buffer_size < limit {
            mf.grow_buffer(limit)?;
            mf.buffer_size = limit;
            mf.read_block()?;
        }
        if mf.at_stream_end && mf.stream_pos < requested {
            mf.dictionary_size = (MIN_DICTIONARY_SIZE as usize).max(mf.stream_pos);
        }
        mf.pos_limit = mf.buffer_size;
        if !mf.at_stream_end {
            mf.pos_limit -= AFTER_SIZE;
        }

        mf.head2 = alloc_i32(1 << 16)?;
        mf.head3 = alloc_i32(1 << 16)?;
        mf.alloc_index()?;
        Ok(mf)
    }

    fn grow_buffer(&mut self, size: usize) -> Result<()> {
        self.buffer
            .try_reserve_exact(size - self.buffer.len())
            .map_err(|_| LzipError::OutOfMemory { needed: size })?;
        self.buffer.resize(size, 0);
        Ok(())
    }

    fn alloc_index(&mut self) -> Result<()> {
        let bits = 32 - (self.dictionary_size as u32 - 1).leading_zeros();
        let mut key4_bits = bits.saturating_sub(2).max(16);
        if self.dictionary_size > 1 << 26 {
            // 64 MiB
            key4_bits -= 1;
        }
        self.key4_mask = (1u32 << key4_bits) - 1;
        self.head4 = alloc_i32(1 << key4_bits)?;
        let slots = match self.kind {
            FinderKind::HashChain { .. } => 1,
            FinderKind::BinaryTree => 2,
        };
        self.pos_array = alloc_i32(slots * (self.dictionary_size + 1))?;
        Ok(())
    }

    fn read_block(&mut self) -> Result<bool> {
        if !self.at_stream_end && self.stream_pos < self.buffer_size {
            while self.stream_pos < self.buffer_size {
                match self.reader.read(&mut self.buffer[self.stream_pos..]) {
                    Ok(0) => {
                        self.at_stream_end = true;
                        self.pos_limit = self.buffer_size;
                        break;
                    }
                    Ok(n) => self.stream_pos += n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(self.pos < self.stream_pos)
    }

    fn normalize_pos(&mut self) -> Result<()> {
        if self.pos > self.stream_pos {
            return Err(LzipError::Internal("pos > stream_pos in normalize_pos"));
        }
        if !self.at_stream_end {
            let offset = self.pos - BEFORE_SIZE - self.dictionary_size;
            self.buffer.copy_within(offset..self.stream_pos, 0);
            self.partial_data_pos += offset as u64;
            self.pos -= offset;
            self.stream_pos -= offset;
            let off = offset as i32;
            for arr in [
                &mut self.head2,
                &mut self.head3,
                &mut self.head4,
                &mut self.pos_array,
            ] {
                for v in arr.iter_mut() {
                    *v = if *v > off { *v - off } else { 0 };
                }
            }
            self.read_block()?;
        }
        Ok(())
    }

    /// Rewind for the next member: unprocessed input is kept, position
    /// counters and the index start over.
    pub fn reset(&mut self) -> Result<()> {
        if self.stream_pos > self.pos {
            self.buffer.copy_within(self.pos..self.stream_pos, 0);
        }
        self.partial_data_pos = 0;
        self.stream_pos -= self.pos;
        self.pos = 0;
        self.cyclic_pos = 0;
        self.read_block()?;
        if self.at_stream_end && self.stream_pos < self.dictionary_size {
            self.dictionary_size = (MIN_DICTIONARY_SIZE as usize).max(self.stream_pos);
            self.alloc_index()?;
        }
        for arr in [
            &mut self.head2,
            &mut self.head3,
            &mut self.head4,
            &mut self.pos_array,
        ] {
            arr.iter_mut().for_each(|v| *v = 0);
        }
        Ok(())
    }

    /// Effective dictionary size (may be smaller than requested for
    /// inputs shorter than the requested dictionary).
    pub fn dictionary_size(&self) -> u32 {
        self.dictionary_size as u32
    }

    /// Configured match length limit.
    pub fn match_len_limit(&self) -> usize {
        self.match_len_limit
    }

    /// Position in the uncompressed data.
    pub fn data_position(&self) -> u64 {
        self.partial_data_pos + self.pos as u64
    }

    /// Bytes available from the current position to the end of the
    /// buffered data.
    pub fn available_bytes(&self) -> usize {
        self.stream_pos - self.pos
    }

    /// True when the input is exhausted and fully processed.
    pub fn data_finished(&self) -> bool {
        self.at_stream_end && self.pos >= self.stream_pos
    }

    /// Byte at `data_position() + delta`. The window guarantees validity
    /// for deltas within the retained zone and the read look-ahead.
    #[inline]
    pub fn byte_at_delta(&self, delta: isize) -> u8 {
        self.buffer[(self.pos as isize + delta) as usize]
    }

    /// Slice of `len` bytes starting at `data_position() + delta`.
    #[inline]
    pub fn slice_at_delta(&self, delta: isize, len: usize) -> &[u8] {
        let start = (self.pos as isize + delta) as usize;
        &self.buffer[start..start + len]
    }

    /// Buffered bytes available at `data_position() + delta`.
    #[inline]
    pub fn available_at_delta(&self, delta: isize) -> usize {
        self.stream_pos - (self.pos as isize + delta) as usize
    }

    /// Length of the match at distance `dis` from position
    /// `data_position() + delta`, up to `limit`.
    pub fn match_len_at_delta(&self, delta: isize, dis: u32, limit: usize) -> usize {
        let p = (self.pos as isize + delta) as usize;
        let back = dis as usize + 1;
        if back > p {
            return 0;
        }
        let limit = limit.min(self.stream_pos - p);
        let mut len = 0;
        while len < limit && self.buffer[p - back + len] == self.buffer[p + len] {
            len += 1;
        }
        len
    }

    fn move_pos(&mut self) -> Result<()> {
        self.cyclic_pos += 1;
        if self.cyclic_pos > self.dictionary_size {
            self.cyclic_pos = 0;
        }
        self.pos += 1;
        if self.pos >= self.pos_limit {
            self.normalize_pos()?;
        }
        Ok(())
    }

    /// Enumerate candidate matches at the current position into `pairs`
    /// (cleared first; lengths strictly increasing, the longest extended
    /// up to the true maximum), then advance one byte.
    pub fn get_match_pairs(&mut self, pairs: &mut Vec<Pair>) -> Result<()> {
        pairs.clear();
        self.walk(Some(pairs))
    }

    /// Advance `n` bytes maintaining the index without collecting matches.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.walk(None)?;
        }
        Ok(())
    }

    fn walk(&mut self, mut pairs: Option<&mut Vec<Pair>>) -> Result<()> {
        let p = self.pos;
        let avail = self.stream_pos - p;
        if avail < 2 {
            if avail > 0 {
                self.move_pos()?;
            }
            return Ok(());
        }
        let len_limit = self.match_len_limit.min(avail);
        let max_dis = self.dictionary_size.min(p);
        let mut best = MIN_MATCH_LEN - 1;

        let key2 = ((self.buffer[p] as usize) << 8) | self.buffer[p + 1] as usize;
        let key3 = if avail >= 3 {
            Some((fnv_hash(&self.buffer[p..p + 3]) & 0xFFFF) as usize)
        } else {
            None
        };
        let key4 = if avail >= 4 {
            Some((fnv_hash(&self.buffer[p..p + 4]) & self.key4_mask) as usize)
        } else {
            None
        };

        if let Some(out) = pairs.as_mut() {
            for (head, min_len) in [(&self.head2, 2usize), (&self.head3, 3)] {
                let key = match (min_len, key3) {
                    (2, _) => key2,
                    (_, Some(k3)) => k3,
                    _ => continue,
                };
                let c = head[key];
                if c > 0 && p + 1 - c as usize <= max_dis {
                    let cp = c as usize - 1;
                    let mut len = 0;
                    while len < len_limit && self.buffer[cp + len] == self.buffer[p + len] {
                        len += 1;
                    }
                    if len >= min_len && len > best {
                        out.push(Pair {
                            len,
                            dis: (p - cp - 1) as u32,
                        });
                        best = len;
                    }
                }
            }
        }
        self.head2[key2] = p as i32 + 1;
        if let Some(k3) = key3 {
            self.head3[k3] = p as i32 + 1;
        }

        let key4 = match key4 {
            Some(k4) => k4,
            None => {
                if matches!(self.kind, FinderKind::BinaryTree) {
                    self.pos_array[2 * self.cyclic_pos] = 0;
                    self.pos_array[2 * self.cyclic_pos + 1] = 0;
                }
                return self.move_pos();
            }
        };
        let mut cur = self.head4[key4];
        self.head4[key4] = p as i32 + 1;

        match self.kind {
            FinderKind::HashChain { .. } => {
                self.pos_array[self.cyclic_pos] = cur;
                if pairs.is_none() {
                    // chain insertion needs no traversal
                    return self.move_pos();
                }
                let mut count = self.cycles;
                while cur > 0 && p + 1 - cur as usize <= max_dis && count > 0 {
                    count -= 1;
                    let cp = cur as usize - 1;
                    if let Some(out) = pairs.as_mut() {
                        let mut len = 0;
                        while len < len_limit && self.buffer[cp + len] == self.buffer[p + len] {
                            len += 1;
                        }
                        if len > best {
                            let dis = (p - cp - 1) as u32;
                            if len >= len_limit {
                                len = self.extend_match(cp, p, len, avail);
                            }
                            out.push(Pair { len, dis });
                            best = len;
                            if len >= len_limit {
                                break;
                            }
                        }
                    }
                    let delta = p - cp;
                    let ci = if self.cyclic_pos >= delta {
                        self.cyclic_pos - delta
                    } else {
                        self.cyclic_pos + self.dictionary_size + 1 - delta
                    };
                    cur = self.pos_array[ci];
                }
            }
            FinderKind::BinaryTree => {
                let mut ptr0 = 2 * self.cyclic_pos; // "greater" subtree
                let mut ptr1 = ptr0 + 1; // "smaller" subtree
                let mut len0 = 0usize;
                let mut len1 = 0usize;
                let mut count = self.cycles;
                loop {
                    if cur <= 0 || p + 1 - cur as usize > max_dis || count == 0 {
                        self.pos_array[ptr0] = 0;
                        self.pos_array[ptr1] = 0;
                        break;
                    }
                    count -= 1;
                    let cp = cur as usize - 1;
                    let delta = p - cp;
                    let ci = if self.cyclic_pos >= delta {
                        self.cyclic_pos - delta
                    } else {
                        self.cyclic_pos + self.dictionary_size + 1 - delta
                    };
                    let newptr = 2 * ci;
                    let mut len = len0.min(len1);
                    while len < len_limit && self.buffer[cp + len] == self.buffer[p + len] {
                        len += 1;
                    }
                    if len > best {
                        if let Some(out) = pairs.as_mut() {
                            let dis = (p - cp - 1) as u32;
                            let full = if len >= len_limit {
                                self.extend_match(cp, p, len, avail)
                            } else {
                                len
                            };
                            out.push(Pair { len: full, dis });
                            best = full;
                        }
                    }
                    if len >= len_limit {
                        // suffix equal up to the limit: splice the node out
                        self.pos_array[ptr0] = self.pos_array[newptr];
                        self.pos_array[ptr1] = self.pos_array[newptr + 1];
                        break;
                    }
                    if self.buffer[cp + len] < self.buffer[p + len] {
                        self.pos_array[ptr1] = cur;
                        ptr1 = newptr + 1;
                        cur = self.pos_array[ptr1];
                        len1 = len;
                    } else {
                        self.pos_array[ptr0] = cur;
                        ptr0 = newptr;
                        cur = self.pos_array[ptr0];
                        len0 = len;
                    }
                }
            }
        }
        self.move_pos()
    }

    fn extend_match(&self, cp: usize, p: usize, len: usize, avail: usize) -> usize {
        let limit = avail.min(MAX_MATCH_LEN);
        let mut len = len;
        while len < limit && self.buffer[cp + len] == self.buffer[p + len] {
            len += 1;
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn drive(data: &[u8], kind: FinderKind, dict: u32, mll: usize) -> usize {
        let mut mf = MatchFinder::new(Cursor::new(data.to_vec()), dict, mll, kind).unwrap();
        let mut pairs = Vec::new();
        let mut pos = 0usize;
        let mut found = 0;
        while !mf.data_finished() {
            assert_eq!(mf.data_position(), pos as u64);
            mf.get_match_pairs(&mut pairs).unwrap();
            let mut prev = 0;
            for pair in &pairs {
                assert!(pair.len > prev, "lengths must increase");
                prev = pair.len;
                assert!(pair.len >= MIN_MATCH_LEN && pair.len <= MAX_MATCH_LEN);
                assert!((pair.dis as usize) < mf.dictionary_size() as usize);
                let d = pair.dis as usize + 1;
                assert!(d <= pos);
                assert_eq!(
                    &data[pos - d..pos - d + pair.len],
                    &data[pos..pos + pair.len],
                    "bogus match at {} dis {}",
                    pos,
                    pair.dis
                );
                found += 1;
            }
            pos += 1;
        }
        found
    }

    #[test]
    fn test_pairs_are_genuine_hc() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 7) as u8).collect();
        assert!(drive(&data, FinderKind::HashChain { depth: 16 }, 4096, 36) > 0);
    }

    #[test]
    fn test_pairs_are_genuine_bt() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i * i % 11) as u8).collect();
        assert!(drive(&data, FinderKind::BinaryTree, 4096, 36) > 0);
    }

    #[test]
    fn test_window_slide() {
        // push enough data through a small window to force several slides
        let mut data = Vec::new();
        for i in 0..200_000u32 {
            data.push((i % 251) as u8);
        }
        assert!(drive(&data, FinderKind::BinaryTree, 4096, 16) > 0);
        assert!(drive(&data, FinderKind::HashChain { depth: 8 }, 4096, 16) > 0);
    }

    #[test]
    fn test_longest_match_is_found() {
        let mut data = b"abcdefghij".to_vec();
        data.extend_from_slice(b"0123");
        data.extend_from_slice(b"abcdefghij");
        let mut mf =
            MatchFinder::new(Cursor::new(data), 1 << 16, 36, FinderKind::BinaryTree).unwrap();
        let mut pairs = Vec::new();
        for _ in 0..14 {
            mf.get_match_pairs(&mut pairs).unwrap();
        }
        mf.get_match_pairs(&mut pairs).unwrap();
        let last = pairs.last().expect("match at repeated block");
        assert_eq!(last.len, 10);
        assert_eq!(last.dis, 13);
    }

    #[test]
    fn test_small_input_shrinks_dictionary() {
        let mf = MatchFinder::new(
            Cursor::new(vec![0u8; 100]),
            1 << 25,
            36,
            FinderKind::BinaryTree,
        )
        .unwrap();
        assert_eq!(mf.dictionary_size(), MIN_DICTIONARY_SIZE);
    }

    #[test]
    fn test_accessors() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut mf = MatchFinder::new(
            Cursor::new(data),
            1 << 16,
            36,
            FinderKind::HashChain { depth: 4 },
        )
        .unwrap();
        mf.skip(10).unwrap();
        assert_eq!(mf.data_position(), 10);
        assert_eq!(mf.byte_at_delta(0), 10);
        assert_eq!(mf.byte_at_delta(-1), 9);
        assert_eq!(mf.byte_at_delta(5), 15);
        assert_eq!(mf.slice_at_delta(-10, 3), &[0, 1, 2]);
        assert_eq!(mf.available_at_delta(0), 246);
        // eight bytes back at distance 2: data is an ascending ramp, so
        // nothing matches; at distance 0 with a flat region it would
        assert_eq!(mf.match_len_at_delta(0, 2, 100), 0);
    }

    #[test]
    fn test_reset_keeps_remaining_data() {
        let data = b"aaaabbbbccccdddd".to_vec();
        let mut mf = MatchFinder::new(
            Cursor::new(data),
            1 << 16,
            36,
            FinderKind::HashChain { depth: 4 },
        )
        .unwrap();
        mf.skip(8).unwrap();
        mf.reset().unwrap();
        assert_eq!(mf.data_position(), 0);
        assert_eq!(mf.byte_at_delta(0), b'c');
        assert_eq!(mf.available_bytes(), 8);
    }
}
