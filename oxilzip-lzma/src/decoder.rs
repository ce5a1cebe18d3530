//! Streaming LZMA decoder for lzip members.
//!
//! The decoder consumes packets from a [`RangeDecoder`], reconstructs the
//! data in a circular dictionary buffer and flushes finished regions to
//! the output sink. Probability state is rebuilt from scratch for every
//! member and mutated exactly as the encoder mutated its copy.

use crate::member::{Trailer, TRAILER_SIZE};
use crate::model::{
    get_len_state, get_lit_state, Models, State, DIS_ALIGN_BITS, END_DIS_MODEL, MIN_MATCH_LEN,
    POS_STATE_MASK, START_DIS_MODEL,
};
use crate::range_coder::RangeDecoder;
use oxilzip_core::crc::Crc32;
use oxilzip_core::error::{LzipError, Result};
use std::io::{Read, Write};

/// LZMA decoder for one member, writing to `writer`.
#[derive(Debug)]
pub struct LzDecoder<W: Write> {
    dictionary_size: usize,
    buffer: Vec<u8>,
    /// Next write position in the dictionary.
    pos: usize,
    /// First byte not yet flushed to the writer.
    stream_pos: usize,
    partial_data_pos: u64,
    crc: Crc32,
    writer: W,
    pos_wrapped: bool,
}

impl<W: Write> LzDecoder<W> {
    /// Create a decoder with a dictionary of the header's size.
    pub fn new(dictionary_size: u32, writer: W) -> Result<Self> {
        let size = dictionary_size as usize;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| LzipError::OutOfMemory { needed: size })?;
        // zero-filled, so peek_prev() of the first byte (and peek(0) on a
        // corrupt file before anything was decoded) reads 0
        buffer.resize(size, 0);
        Ok(Self {
            dictionary_size: size,
            buffer,
            pos: 0,
            stream_pos: 0,
            partial_data_pos: 0,
            crc: Crc32::new(),
            writer,
            pos_wrapped: false,
        })
    }

    /// CRC-32 of the data decoded so far.
    pub fn crc(&self) -> u32 {
        self.crc.value()
    }

    /// Number of bytes decoded so far.
    pub fn data_position(&self) -> u64 {
        self.partial_data_pos + self.pos as u64
    }

    /// Give the output sink back.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn flush_data(&mut self) -> Result<()> {
        if self.pos > self.stream_pos {
            let chunk = &self.buffer[self.stream_pos..self.pos];
            self.crc.update(chunk);
            self.writer.write_all(chunk)?;
            if self.pos >= self.dictionary_size {
                self.partial_data_pos += self.pos as u64;
                self.pos = 0;
                self.pos_wrapped = true;
            }
            self.stream_pos = self.pos;
        }
        Ok(())
    }

    fn peek_prev(&self) -> u8 {
        let i = if self.pos > 0 {
            self.pos
        } else {
            self.dictionary_size
        };
        self.buffer[i - 1]
    }

    fn peek(&self, distance: usize) -> u8 {
        let i = if self.pos > distance {
            self.pos - distance - 1
        } else {
            self.dictionary_size + self.pos - distance - 1
        };
        self.buffer[i]
    }

    fn put_byte(&mut self, b: u8) -> Result<()> {
        self.buffer[self.pos] = b;
        self.pos += 1;
        if self.pos >= self.dictionary_size {
            self.flush_data()?;
        }
        Ok(())
    }

    fn copy_block(&mut self, distance: usize, mut len: usize) -> Result<()> {
        let mut lpos = self.pos;
        let mut i;
        let fast;
        let fast2;
        if lpos > distance {
            i = lpos - distance - 1;
            fast = len < self.dictionary_size - lpos;
            fast2 = fast && len <= lpos - i;
        } else {
            i = self.dictionary_size + lpos - distance - 1;
            fast = len < self.dictionary_size - i; // (i == pos) may happen
            fast2 = fast && len <= i - lpos;
        }
        if fast {
            self.pos += len;
            if fast2 {
                // no wrap, no overlap
                self.buffer.copy_within(i..i + len, lpos);
            } else {
                for _ in 0..len {
                    self.buffer[lpos] = self.buffer[i];
                    lpos += 1;
                    i += 1;
                }
            }
        } else {
            while len > 0 {
                len -= 1;
                self.buffer[self.pos] = self.buffer[i];
                self.pos += 1;
                if self.pos >= self.dictionary_size {
                    self.flush_data()?;
                }
                i += 1;
                if i >= self.dictionary_size {
                    i = 0;
                }
            }
        }
        Ok(())
    }

    /// Decode one member's packets until the End-Of-Stream marker, then
    /// verify the trailer. The range decoder must be positioned just
    /// after the member header.
    pub fn decode_member<R: Read>(&mut self, rdec: &mut RangeDecoder<R>) -> Result<()> {
        let mut models = Models::new();
        let mut rep0 = 0usize; // rep0-rep3: latest four distances used
        let mut rep1 = 0usize;
        let mut rep2 = 0usize;
        let mut rep3 = 0usize;
        let mut state = State::default();

        rdec.load()?;
        while !rdec.finished()? {
            let pos_state = self.data_position() as usize & POS_STATE_MASK;
            let st = state.index();
            if rdec.decode_bit(&mut models.bm_match[st][pos_state])? == 0 {
                // literal byte
                let lit_state = get_lit_state(self.peek_prev());
                let bm = &mut models.bm_literal[lit_state];
                let b = if state.is_char() {
                    rdec.decode_tree(bm, 8)? as u8
                } else {
                    let match_byte = self.peek(rep0);
                    rdec.decode_matched(bm, match_byte)?
                };
                self.put_byte(b)?;
                state.set_char();
                continue;
            }
            // match or repeated match
            let len;
            if rdec.decode_bit(&mut models.bm_rep[st])? != 0 {
                if rdec.decode_bit(&mut models.bm_rep0[st])? == 0 {
                    if rdec.decode_bit(&mut models.bm_len[st][pos_state])? == 0 {
                        state.set_short_rep();
                        let b = self.peek(rep0);
                        self.put_byte(b)?;
                        continue;
                    }
                } else {
                    let distance;
                    if rdec.decode_bit(&mut models.bm_rep1[st])? == 0 {
                        distance = rep1;
                    } else {
                        if rdec.decode_bit(&mut models.bm_rep2[st])? == 0 {
                            distance = rep2;
                        } else {
                            distance = rep3;
                            rep3 = rep2;
                        }
                        rep2 = rep1;
                    }
                    rep1 = rep0;
                    rep0 = distance;
                }
                state.set_rep();
                len = rdec.decode_len(&mut models.rep_len, pos_state)?;
            } else {
                len = rdec.decode_len(&mut models.match_len, pos_state)?;
                let slot = rdec.decode_tree(&mut models.bm_dis_slot[get_len_state(len)], 6)?;
                let mut distance = slot as u32;
                if slot >= START_DIS_MODEL {
                    let direct_bits = (slot >> 1) as u32 - 1;
                    distance = (2 | (slot as u32 & 1)) << direct_bits;
                    if slot < END_DIS_MODEL {
                        let offset = distance as usize - slot;
                        distance += rdec
                            .decode_tree_reversed(&mut models.bm_dis[offset..], direct_bits)?
                            as u32;
                    } else {
                        distance +=
                            rdec.decode(direct_bits - DIS_ALIGN_BITS)? << DIS_ALIGN_BITS;
                        distance +=
                            rdec.decode_tree_reversed(&mut models.bm_align, DIS_ALIGN_BITS)? as u32;
                        if distance == 0xFFFF_FFFF {
                            // marker found
                            rdec.normalize()?;
                            self.flush_data()?;
                            if len == MIN_MATCH_LEN {
                                // End Of Stream marker
                                return self.check_trailer(rdec);
                            }
                            if len == MIN_MATCH_LEN + 1 {
                                // Sync Flush marker
                                rdec.load()?;
                                continue;
                            }
                            return Err(LzipError::CorruptStream {
                                position: rdec.member_position(),
                                message: "unsupported marker code",
                            });
                        }
                    }
                }
                rep3 = rep2;
                rep2 = rep1;
                rep1 = rep0;
                rep0 = distance as usize;
                state.set_match();
                if rep0 >= self.dictionary_size || (rep0 >= self.pos && !self.pos_wrapped) {
                    self.flush_data()?;
                    return Err(LzipError::InvalidDistance {
                        distance: rep0 as u32,
                        position: self.data_position(),
                    });
                }
            }
            self.copy_block(rep0, len)?;
        }
        self.flush_data()?;
        Err(LzipError::UnexpectedEof {
            position: rdec.member_position(),
        })
    }

    fn check_trailer<R: Read>(&mut self, rdec: &mut RangeDecoder<R>) -> Result<()> {
        let mut buf = [0u8; TRAILER_SIZE];
        let size = rdec.read_data(&mut buf)?;
        if size < TRAILER_SIZE {
            return Err(LzipError::UnexpectedEof {
                position: rdec.member_position(),
            });
        }
        let trailer = Trailer::parse(buf);
        if trailer.data_crc != self.crc() {
            return Err(LzipError::CrcMismatch {
                stored: trailer.data_crc,
                computed: self.crc(),
            });
        }
        if trailer.data_size != self.data_position() {
            return Err(LzipError::DataSizeMismatch {
                stored: trailer.data_size,
                computed: self.data_position(),
            });
        }
        if trailer.member_size != rdec.member_position() {
            return Err(LzipError::MemberSizeMismatch {
                stored: trailer.member_size,
                computed: rdec.member_position(),
            });
        }
        self.writer.flush()?;
        Ok(())
    }
}
