//! Greedy LZMA encoder for compression level 0.
//!
//! No look-ahead: at each position the longest match wins if it pays for
//! itself, with a small bias towards rep0 because a rep packet is much
//! cheaper to code than a fresh distance. Member framing and all coding
//! primitives are shared with the optimal encoder.

use crate::encoder::{EncoderBase, MemberEncoder, MAX_MARKER_SIZE};
use crate::matchfinder::{FinderKind, MatchFinder, Pair};
use crate::member::TRAILER_SIZE;
use crate::model::{MAX_MATCH_LEN, MIN_MATCH_LEN, MODELED_DISTANCES, POS_STATE_MASK};
use oxilzip_core::error::Result;
use std::io::{Read, Write};

/// Hash-chain depth used by the greedy matcher.
const FAST_DEPTH: u32 = 16;

/// The greedy encoder.
#[derive(Debug)]
pub struct FastEncoder<R: Read, W: Write> {
    eb: EncoderBase<W>,
    mf: MatchFinder<R>,
    pairs: Vec<Pair>,
}

impl<R: Read, W: Write> FastEncoder<R, W> {
    /// Create a fast encoder over `reader`, writing members to `writer`.
    pub fn new(
        reader: R,
        writer: W,
        dictionary_size: u32,
        match_len_limit: usize,
    ) -> Result<Self> {
        let mf = MatchFinder::new(
            reader,
            dictionary_size,
            match_len_limit,
            FinderKind::HashChain { depth: FAST_DEPTH },
        )?;
        let eb = EncoderBase::new(writer, mf.dictionary_size())?;
        Ok(Self {
            eb,
            mf,
            pairs: Vec::with_capacity(MAX_MATCH_LEN),
        })
    }

    /// Consume the encoder, returning the output sink.
    pub fn into_writer(self) -> W {
        self.eb.renc.into_writer()
    }

    fn emit_literal(&mut self, pos: u64) -> Result<()> {
        let pos_state = pos as usize & POS_STATE_MASK;
        let byte = self.mf.byte_at_delta(-1);
        let prev = if pos > 0 { self.mf.byte_at_delta(-2) } else { 0 };
        let match_byte = if !self.eb.state.is_char() {
            self.mf.byte_at_delta(-1 - self.eb.reps[0] as isize - 1)
        } else {
            0
        };
        self.eb.crc.update_byte(byte);
        self.eb.encode_literal(pos_state, byte, prev, match_byte)
    }
}

impl<R: Read, W: Write> MemberEncoder for FastEncoder<R, W> {
    fn encode_member(&mut self, member_size: u64) -> Result<()> {
        let size_limit = member_size.saturating_sub(TRAILER_SIZE as u64 + MAX_MARKER_SIZE);
        while !self.mf.data_finished() {
            if self.eb.renc.member_position() >= size_limit {
                break;
            }
            let pos = self.mf.data_position();
            let avail = self.mf.available_bytes();
            let lim = avail.min(MAX_MATCH_LEN);
            let rep0_len = if (self.eb.reps[0] as u64) < pos {
                self.mf.match_len_at_delta(0, self.eb.reps[0], lim)
            } else {
                0
            };
            self.mf.get_match_pairs(&mut self.pairs)?;
            let (main_len, main_dis) = self
                .pairs
                .last()
                .map_or((0, 0), |p| (p.len, p.dis));

            // a rep0 almost as long as the best match is cheaper
            if rep0_len >= MIN_MATCH_LEN && rep0_len + 2 >= main_len {
                let pos_state = pos as usize & POS_STATE_MASK;
                self.eb.crc.update(self.mf.slice_at_delta(-1, rep0_len));
                self.eb.encode_rep(pos_state, 0, rep0_len)?;
                self.mf.skip(rep0_len - 1)?;
                continue;
            }
            // a length-2 match only pays off at short distance
            if main_len > MIN_MATCH_LEN
                || (main_len == MIN_MATCH_LEN && (main_dis as usize) < MODELED_DISTANCES)
            {
                let pos_state = pos as usize & POS_STATE_MASK;
                self.eb.crc.update(self.mf.slice_at_delta(-1, main_len));
                self.eb.encode_match(pos_state, main_dis, main_len)?;
                self.mf.skip(main_len - 1)?;
                continue;
            }
            self.emit_literal(pos)?;
        }
        self.eb.full_flush(self.mf.data_position())
    }

    fn reset(&mut self) -> Result<()> {
        self.mf.reset()?;
        self.eb.start_member(self.mf.dictionary_size())
    }

    fn data_position(&self) -> u64 {
        self.mf.data_position()
    }

    fn member_position(&self) -> u64 {
        self.eb.renc.member_position()
    }

    fn data_finished(&self) -> bool {
        self.mf.data_finished()
    }

    fn dictionary_size(&self) -> u32 {
        self.mf.dictionary_size()
    }
}
