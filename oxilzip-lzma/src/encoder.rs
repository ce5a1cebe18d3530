//! Optimal-parsing LZMA encoder.
//!
//! [`EncoderBase`] holds what both encoders share: the probability models,
//! the range encoder, the running CRC and the packet emission primitives.
//! [`LzEncoder`] adds the price caches and the forward dynamic program
//! that picks, over a bounded look-ahead, the cheapest sequence of
//! literal / rep / match packets before emitting it.
//!
//! Prices are fixed-point estimates of the coded size of each decision
//! under the current model state. They steer the parse only; any parse
//! emitted through the shared primitives yields a valid stream.

use crate::matchfinder::{FinderKind, MatchFinder, Pair, MAX_NUM_TRIALS};
use crate::member::{Header, Trailer, TRAILER_SIZE};
use crate::model::{
    get_len_state, get_lit_state, get_slot, price0, price1, price_bit, price_matched,
    price_symbol3, price_symbol6, price_symbol8, price_symbol_reversed, LenModel, Models, State,
    DIS_ALIGN_BITS, DIS_ALIGN_SIZE, END_DIS_MODEL, INFINITE_PRICE, LEN_LOW_SYMBOLS,
    LEN_MID_SYMBOLS, LEN_STATES, MAX_LEN_SYMBOLS, MAX_MATCH_LEN, MIN_MATCH_LEN,
    MODELED_DISTANCES, NUM_REP_DISTANCES, POS_STATES, POS_STATE_MASK, PRICE_SHIFT_BITS,
    START_DIS_MODEL,
};
use crate::range_coder::RangeEncoder;
use oxilzip_core::crc::Crc32;
use oxilzip_core::error::Result;
use std::io::{Read, Write};

/// Room reserved at the member-size ceiling for the End-Of-Stream marker.
pub(crate) const MAX_MARKER_SIZE: u64 = 16;

/// One member-producing encoder; the driver loops members through this
/// interface without caring which parser is behind it.
pub trait MemberEncoder {
    /// Encode packets until the input is exhausted or the member would
    /// exceed `member_size` bytes, then write the trailer.
    fn encode_member(&mut self, member_size: u64) -> Result<()>;
    /// Start the next member: reset all coding state, write its header.
    fn reset(&mut self) -> Result<()>;
    /// Uncompressed bytes consumed so far in this member.
    fn data_position(&self) -> u64;
    /// Compressed bytes produced so far in this member.
    fn member_position(&self) -> u64;
    /// True once the input is exhausted and fully encoded.
    fn data_finished(&self) -> bool;
    /// Effective dictionary size advertised in the member header.
    fn dictionary_size(&self) -> u32;
}

/// State shared by the fast and the optimal encoder: models, range
/// encoder, CRC, the 12-state machine and the rep-distance history.
#[derive(Debug)]
pub struct EncoderBase<W: Write> {
    pub(crate) renc: RangeEncoder<W>,
    pub(crate) models: Models,
    pub(crate) crc: Crc32,
    pub(crate) state: State,
    pub(crate) reps: [u32; NUM_REP_DISTANCES],
}

impl<W: Write> EncoderBase<W> {
    /// Create the base and write the first member's header.
    pub fn new(writer: W, dictionary_size: u32) -> Result<Self> {
        let mut eb = Self {
            renc: RangeEncoder::new(writer),
            models: Models::new(),
            crc: Crc32::new(),
            state: State::default(),
            reps: [0; NUM_REP_DISTANCES],
        };
        eb.write_header(dictionary_size)?;
        Ok(eb)
    }

    fn write_header(&mut self, dictionary_size: u32) -> Result<()> {
        let header = Header::new(dictionary_size)?;
        for b in header.data {
            self.renc.put_byte(b)?;
        }
        Ok(())
    }

    /// Reinitialize all per-member state and write the next header.
    pub fn start_member(&mut self, dictionary_size: u32) -> Result<()> {
        self.models.reset();
        self.crc.reset();
        self.state = State::default();
        self.reps = [0; NUM_REP_DISTANCES];
        self.renc.reset();
        self.write_header(dictionary_size)
    }

    /// CRC of the data encoded into the current member.
    pub fn crc(&self) -> u32 {
        self.crc.value()
    }

    /// Encode a literal. `match_byte` is only read when the state machine
    /// calls for the matched-literal coder.
    pub fn encode_literal(
        &mut self,
        pos_state: usize,
        byte: u8,
        prev_byte: u8,
        match_byte: u8,
    ) -> Result<()> {
        let st = self.state.index();
        self.renc
            .encode_bit(&mut self.models.bm_match[st][pos_state], false)?;
        let bm = &mut self.models.bm_literal[get_lit_state(prev_byte)];
        if self.state.is_char() {
            self.renc.encode_tree(bm, byte as usize, 8)?;
        } else {
            self.renc.encode_matched(bm, byte, match_byte)?;
        }
        self.state.set_char();
        Ok(())
    }

    /// Encode a new match and rotate the rep-distance history.
    pub fn encode_match(&mut self, pos_state: usize, dis: u32, len: usize) -> Result<()> {
        let st = self.state.index();
        self.renc
            .encode_bit(&mut self.models.bm_match[st][pos_state], true)?;
        self.renc.encode_bit(&mut self.models.bm_rep[st], false)?;
        self.reps = [dis, self.reps[0], self.reps[1], self.reps[2]];
        self.encode_pair(dis, len, pos_state)?;
        self.state.set_match();
        Ok(())
    }

    /// Encode a rep match (length 1 on rep0 is the short-rep packet) and
    /// rotate the used distance to the front of the history.
    pub fn encode_rep(&mut self, pos_state: usize, rep_index: usize, len: usize) -> Result<()> {
        let st = self.state.index();
        self.renc
            .encode_bit(&mut self.models.bm_match[st][pos_state], true)?;
        self.renc.encode_bit(&mut self.models.bm_rep[st], true)?;
        if rep_index == 0 {
            self.renc.encode_bit(&mut self.models.bm_rep0[st], false)?;
            if len == 1 {
                self.renc
                    .encode_bit(&mut self.models.bm_len[st][pos_state], false)?;
                self.state.set_short_rep();
                return Ok(());
            }
            self.renc
                .encode_bit(&mut self.models.bm_len[st][pos_state], true)?;
        } else {
            self.renc.encode_bit(&mut self.models.bm_rep0[st], true)?;
            if rep_index == 1 {
                self.renc.encode_bit(&mut self.models.bm_rep1[st], false)?;
            } else {
                self.renc.encode_bit(&mut self.models.bm_rep1[st], true)?;
                self.renc
                    .encode_bit(&mut self.models.bm_rep2[st], rep_index == 3)?;
            }
            let dis = self.reps[rep_index];
            for i in (1..=rep_index).rev() {
                self.reps[i] = self.reps[i - 1];
            }
            self.reps[0] = dis;
        }
        self.renc
            .encode_len(&mut self.models.rep_len, len, pos_state)?;
        self.state.set_rep();
        Ok(())
    }

    /// Encode length and distance of a new match.
    fn encode_pair(&mut self, dis: u32, len: usize, pos_state: usize) -> Result<()> {
        self.renc
            .encode_len(&mut self.models.match_len, len, pos_state)?;
        let slot = get_slot(dis);
        self.renc
            .encode_tree(&mut self.models.bm_dis_slot[get_len_state(len)], slot, 6)?;
        if slot >= START_DIS_MODEL {
            let direct_bits = (slot >> 1) as u32 - 1;
            let base = (2 | (slot as u32 & 1)) << direct_bits;
            let direct_dis = dis - base;
            if slot < END_DIS_MODEL {
                let offset = base as usize - slot;
                self.renc.encode_tree_reversed(
                    &mut self.models.bm_dis[offset..],
                    direct_dis as usize,
                    direct_bits,
                )?;
            } else {
                self.renc
                    .encode(direct_dis >> DIS_ALIGN_BITS, direct_bits - DIS_ALIGN_BITS)?;
                self.renc.encode_tree_reversed(
                    &mut self.models.bm_align,
                    (direct_dis as usize) & (DIS_ALIGN_SIZE - 1),
                    DIS_ALIGN_BITS,
                )?;
            }
        }
        Ok(())
    }

    /// Terminate the member: End-Of-Stream marker, range-coder flush and
    /// the 20-byte trailer.
    pub fn full_flush(&mut self, data_position: u64) -> Result<()> {
        let pos_state = data_position as usize & POS_STATE_MASK;
        let st = self.state.index();
        self.renc
            .encode_bit(&mut self.models.bm_match[st][pos_state], true)?;
        self.renc.encode_bit(&mut self.models.bm_rep[st], false)?;
        self.encode_pair(0xFFFF_FFFF, MIN_MATCH_LEN, pos_state)?;
        self.renc.flush()?;
        let trailer = Trailer {
            data_crc: self.crc.value(),
            data_size: data_position,
            member_size: self.renc.member_position() + TRAILER_SIZE as u64,
        };
        for b in trailer.to_bytes() {
            self.renc.put_byte(b)?;
        }
        self.renc.flush_writer()
    }
}

/// Cached per-length prices for one length model.
#[derive(Debug)]
struct LenPrices {
    prices: Box<[[u32; MAX_LEN_SYMBOLS]; POS_STATES]>,
}

impl LenPrices {
    fn new() -> Self {
        Self {
            prices: Box::new([[0; MAX_LEN_SYMBOLS]; POS_STATES]),
        }
    }

    fn update(&mut self, lm: &LenModel) {
        for ps in 0..POS_STATES {
            let choice1 = lm.choice1;
            let choice2 = lm.choice2;
            for sym in 0..LEN_LOW_SYMBOLS {
                self.prices[ps][sym] = price0(choice1) + price_symbol3(&lm.low[ps], sym);
            }
            for sym in 0..LEN_MID_SYMBOLS {
                self.prices[ps][LEN_LOW_SYMBOLS + sym] =
                    price1(choice1) + price0(choice2) + price_symbol3(&lm.mid[ps], sym);
            }
            for sym in LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS..MAX_LEN_SYMBOLS {
                self.prices[ps][sym] = price1(choice1)
                    + price1(choice2)
                    + price_symbol8(&lm.high, sym - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS);
            }
        }
    }

    #[inline]
    fn price(&self, len: usize, pos_state: usize) -> u32 {
        self.prices[pos_state][len - MIN_MATCH_LEN]
    }
}

/// One node of the parse graph: the cheapest known way to arrive at a
/// look-ahead position, with the coding state it would leave behind.
#[derive(Debug, Clone, Copy)]
struct Trial {
    price: u32,
    prev_index: u32,
    /// -1 = literal, 0..3 = rep index, >= 4 = match distance + 4.
    back: i32,
    state: State,
    reps: [u32; NUM_REP_DISTANCES],
}

impl Trial {
    const EMPTY: Trial = Trial {
        price: INFINITE_PRICE,
        prev_index: 0,
        back: -1,
        state: State::new(),
        reps: [0; NUM_REP_DISTANCES],
    };
}

/// The price-driven optimal-parsing encoder.
#[derive(Debug)]
pub struct LzEncoder<R: Read, W: Write> {
    eb: EncoderBase<W>,
    mf: MatchFinder<R>,
    pairs: Vec<Pair>,
    trials: Vec<Trial>,
    /// Packet end-points of the chosen parse, collected during backtrack.
    path: Vec<usize>,
    len_prices: LenPrices,
    rep_len_prices: LenPrices,
    dis_slot_prices: [[u32; 64]; LEN_STATES],
    dis_prices: [[u32; MODELED_DISTANCES]; LEN_STATES],
    align_prices: [u32; DIS_ALIGN_SIZE],
    len_price_counter: i32,
    dis_price_counter: i32,
    align_price_counter: i32,
}

impl<R: Read, W: Write> LzEncoder<R, W> {
    /// Create an encoder over `reader`, writing members to `writer`.
    pub fn new(
        reader: R,
        writer: W,
        dictionary_size: u32,
        match_len_limit: usize,
        kind: FinderKind,
    ) -> Result<Self> {
        let mf = MatchFinder::new(reader, dictionary_size, match_len_limit, kind)?;
        let eb = EncoderBase::new(writer, mf.dictionary_size())?;
        Ok(Self {
            eb,
            mf,
            pairs: Vec::with_capacity(MAX_MATCH_LEN),
            trials: vec![Trial::EMPTY; MAX_NUM_TRIALS],
            path: Vec::with_capacity(64),
            len_prices: LenPrices::new(),
            rep_len_prices: LenPrices::new(),
            dis_slot_prices: [[0; 64]; LEN_STATES],
            dis_prices: [[0; MODELED_DISTANCES]; LEN_STATES],
            align_prices: [0; DIS_ALIGN_SIZE],
            len_price_counter: 0,
            dis_price_counter: 0,
            align_price_counter: 0,
        })
    }

    /// Consume the encoder, returning the output sink.
    pub fn into_writer(self) -> W {
        self.eb.renc.into_writer()
    }

    fn update_prices(&mut self) {
        if self.len_price_counter <= 0 {
            self.len_price_counter = 1 << 6;
            self.len_prices.update(&self.eb.models.match_len);
            self.rep_len_prices.update(&self.eb.models.rep_len);
        }
        if self.dis_price_counter <= 0 {
            self.dis_price_counter = 1 << 7;
            self.update_distance_prices();
        }
        if self.align_price_counter <= 0 {
            self.align_price_counter = DIS_ALIGN_SIZE as i32;
            for i in 0..DIS_ALIGN_SIZE {
                self.align_prices[i] =
                    price_symbol_reversed(&self.eb.models.bm_align, i, DIS_ALIGN_BITS);
            }
        }
    }

    fn update_distance_prices(&mut self) {
        for ls in 0..LEN_STATES {
            for slot in 0..64usize {
                let mut price = price_symbol6(&self.eb.models.bm_dis_slot[ls], slot);
                if slot >= END_DIS_MODEL {
                    price += ((slot as u32 >> 1) - 1 - DIS_ALIGN_BITS) << PRICE_SHIFT_BITS;
                }
                self.dis_slot_prices[ls][slot] = price;
            }
            for dis in 0..MODELED_DISTANCES {
                let slot = get_slot(dis as u32);
                let mut price = self.dis_slot_prices[ls][slot];
                if slot >= START_DIS_MODEL {
                    let direct_bits = (slot as u32 >> 1) - 1;
                    let base = (2 | (slot & 1)) << direct_bits;
                    price += price_symbol_reversed(
                        &self.eb.models.bm_dis[base - slot..],
                        dis - base,
                        direct_bits,
                    );
                }
                self.dis_prices[ls][dis] = price;
            }
        }
    }

    /// Price of length + distance of a new match.
    fn price_pair(&self, dis: u32, len: usize, pos_state: usize) -> u32 {
        let ls = get_len_state(len);
        self.len_prices.price(len, pos_state)
            + if (dis as usize) < MODELED_DISTANCES {
                self.dis_prices[ls][dis as usize]
            } else {
                self.dis_slot_prices[ls][get_slot(dis)]
                    + self.align_prices[(dis & (DIS_ALIGN_SIZE as u32 - 1)) as usize]
            }
    }

    /// Price of selecting a rep packet with the given history index
    /// (packet-type bits only; the length is priced separately).
    fn price_rep(&self, rep_index: usize, state: State, pos_state: usize) -> u32 {
        let m = &self.eb.models;
        let st = state.index();
        let mut price = price1(m.bm_match[st][pos_state]) + price1(m.bm_rep[st]);
        if rep_index == 0 {
            price += price0(m.bm_rep0[st]);
            price += price1(m.bm_len[st][pos_state]);
        } else {
            price += price1(m.bm_rep0[st]);
            if rep_index == 1 {
                price += price0(m.bm_rep1[st]);
            } else {
                price += price1(m.bm_rep1[st]);
                price += price_bit(m.bm_rep2[st], rep_index == 3);
            }
        }
        price
    }

    fn price_short_rep(&self, state: State, pos_state: usize) -> u32 {
        let m = &self.eb.models;
        let st = state.index();
        price1(m.bm_match[st][pos_state])
            + price1(m.bm_rep[st])
            + price0(m.bm_rep0[st])
            + price0(m.bm_len[st][pos_state])
    }

    fn price_literal(&self, state: State, pos_state: usize, byte: u8, prev: u8, rep0: u32) -> u32 {
        let m = &self.eb.models;
        let bm = &m.bm_literal[get_lit_state(prev)];
        let mut price = price0(m.bm_match[state.index()][pos_state]);
        if state.is_char() {
            price += price_symbol8(bm, byte as usize);
        } else {
            let match_byte = self.mf.byte_at_delta(-1 - rep0 as isize - 1);
            price += price_matched(bm, byte, match_byte);
        }
        price
    }

    #[inline]
    fn try_update(
        &mut self,
        cur: usize,
        len: usize,
        price: u32,
        back: i32,
        state: State,
        reps: [u32; NUM_REP_DISTANCES],
    ) {
        let t = &mut self.trials[cur + len];
        if price < t.price {
            *t = Trial {
                price,
                prev_index: cur as u32,
                back,
                state,
                reps,
            };
        }
    }

    /// Run the forward DP from the current position, leaving the chosen
    /// parse in `trials[..=end]`. Returns `(end, consumed)` where `end`
    /// is the number of bytes covered and `consumed` how many positions
    /// the match finder has already advanced past.
    fn sequence_optimizer(&mut self, base_pos: u64) -> Result<(usize, usize)> {
        let horizon = MAX_NUM_TRIALS - MAX_MATCH_LEN - 1;
        let mll = self.mf.match_len_limit();
        self.trials[0] = Trial {
            price: 0,
            prev_index: 0,
            back: -1,
            state: self.eb.state,
            reps: self.eb.reps,
        };
        let mut num_trials = 1usize;
        let mut cur = 0usize;
        let consumed;
        loop {
            if cur > 0 {
                self.mf.get_match_pairs(&mut self.pairs)?;
            }
            let t = self.trials[cur];
            let pos = base_pos + cur as u64;
            let pos_state = pos as usize & POS_STATE_MASK;
            let av = self.mf.available_at_delta(-1);
            let lim = av.min(MAX_MATCH_LEN);
            let dplim = mll.min(lim);

            // literal
            let byte = self.mf.byte_at_delta(-1);
            let prev = self.mf.byte_at_delta(-2);
            let lit_price =
                t.price + self.price_literal(t.state, pos_state, byte, prev, t.reps[0]);
            let mut ns = t.state;
            ns.set_char();
            self.try_update(cur, 1, lit_price, -1, ns, t.reps);
            num_trials = num_trials.max(cur + 1);

            let mut truncated = false;
            // short rep and rep matches
            for k in 0..NUM_REP_DISTANCES {
                let dis = t.reps[k];
                if dis as u64 >= pos {
                    continue;
                }
                let rep_len = self.mf.match_len_at_delta(-1, dis, lim);
                if k == 0 && rep_len >= 1 {
                    let price = t.price + self.price_short_rep(t.state, pos_state);
                    let mut ns = t.state;
                    ns.set_short_rep();
                    self.try_update(cur, 1, price, 0, ns, t.reps);
                }
                if rep_len < MIN_MATCH_LEN {
                    continue;
                }
                let base_price = t.price + self.price_rep(k, t.state, pos_state);
                let mut nreps = t.reps;
                for i in (1..=k).rev() {
                    nreps[i] = nreps[i - 1];
                }
                nreps[0] = dis;
                let mut ns = t.state;
                ns.set_rep();
                let usable = rep_len.min(dplim);
                for len in MIN_MATCH_LEN..=usable {
                    let price = base_price + self.rep_len_prices.price(len, pos_state);
                    self.try_update(cur, len, price, k as i32, ns, nreps);
                }
                num_trials = num_trials.max(cur + usable);
                if rep_len >= dplim && dplim == mll {
                    // long enough to end the look-ahead here
                    let price = base_price + self.rep_len_prices.price(rep_len, pos_state);
                    self.try_update(cur, rep_len, price, k as i32, ns, nreps);
                    num_trials = cur + rep_len;
                    truncated = true;
                    break;
                }
            }

            // new matches
            if !truncated && !self.pairs.is_empty() {
                let st = t.state.index();
                let match_base = t.price
                    + price1(self.eb.models.bm_match[st][pos_state])
                    + price0(self.eb.models.bm_rep[st]);
                let longest = self.pairs[self.pairs.len() - 1].len;
                let usable = longest.min(dplim);
                let mut ns = t.state;
                ns.set_match();
                let mut idx = 0usize;
                for len in MIN_MATCH_LEN..=usable {
                    while self.pairs[idx].len < len {
                        idx += 1;
                    }
                    let dis = self.pairs[idx].dis;
                    let price = match_base + self.price_pair(dis, len, pos_state);
                    let nreps = [dis, t.reps[0], t.reps[1], t.reps[2]];
                    self.try_update(cur, len, price, dis as i32 + 4, ns, nreps);
                }
                num_trials = num_trials.max(cur + usable);
                if longest >= dplim && dplim == mll {
                    let dis = self.pairs[self.pairs.len() - 1].dis;
                    let price = match_base + self.price_pair(dis, longest, pos_state);
                    let nreps = [dis, t.reps[0], t.reps[1], t.reps[2]];
                    self.try_update(cur, longest, price, dis as i32 + 4, ns, nreps);
                    num_trials = cur + longest;
                    truncated = true;
                }
            }
            if truncated {
                consumed = cur + 1;
                break;
            }
            cur += 1;
            if cur >= num_trials || cur >= horizon {
                consumed = cur;
                break;
            }
        }
        Ok((num_trials, consumed))
    }

    /// Backtrack the chosen parse and emit its packets.
    fn emit_sequence(&mut self, base_pos: u64, end: usize) -> Result<()> {
        self.path.clear();
        let mut i = end;
        while i > 0 {
            self.path.push(i);
            i = self.trials[i].prev_index as usize;
        }
        let mut start = 0usize;
        for pi in (0..self.path.len()).rev() {
            let endp = self.path[pi];
            let trial = self.trials[endp];
            let len = endp - start;
            let pos_state = (base_pos + start as u64) as usize & POS_STATE_MASK;
            // the parse covers exactly `end` bytes and the finder sits at
            // base_pos + end, so every packet's bytes are behind it
            let delta = start as isize - end as isize;
            self.eb.crc.update(self.mf.slice_at_delta(delta, len));
            self.len_price_counter -= 1;
            match trial.back {
                -1 => {
                    let byte = self.mf.byte_at_delta(delta);
                    let prev = self.mf.byte_at_delta(delta - 1);
                    let match_byte = if !self.eb.state.is_char() {
                        self.mf.byte_at_delta(delta - self.eb.reps[0] as isize - 1)
                    } else {
                        0
                    };
                    self.eb.encode_literal(pos_state, byte, prev, match_byte)?;
                }
                k @ 0..=3 => {
                    self.eb.encode_rep(pos_state, k as usize, len)?;
                }
                dis4 => {
                    self.dis_price_counter -= 1;
                    let dis = (dis4 - 4) as u32;
                    if dis as usize >= MODELED_DISTANCES {
                        self.align_price_counter -= 1;
                    }
                    self.eb.encode_match(pos_state, dis, len)?;
                }
            }
            start = endp;
        }
        // reset the trial prices this batch touched
        for t in &mut self.trials[..=end] {
            t.price = INFINITE_PRICE;
        }
        Ok(())
    }

    /// Emit one packet directly, skipping look-ahead. Used for the
    /// positions where no parse decision is needed.
    fn emit_single(&mut self, pos: u64, packet: SinglePacket) -> Result<()> {
        let pos_state = pos as usize & POS_STATE_MASK;
        match packet {
            SinglePacket::Literal => {
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
            SinglePacket::Rep { index, len } => {
                self.eb.crc.update(self.mf.slice_at_delta(-1, len));
                self.len_price_counter -= 1;
                self.eb.encode_rep(pos_state, index, len)
            }
            SinglePacket::Match { dis, len } => {
                self.eb.crc.update(self.mf.slice_at_delta(-1, len));
                self.len_price_counter -= 1;
                self.dis_price_counter -= 1;
                if dis as usize >= MODELED_DISTANCES {
                    self.align_price_counter -= 1;
                }
                self.eb.encode_match(pos_state, dis, len)
            }
        }
    }
}

enum SinglePacket {
    Literal,
    Rep { index: usize, len: usize },
    Match { dis: u32, len: usize },
}

impl<R: Read, W: Write> MemberEncoder for LzEncoder<R, W> {
    fn encode_member(&mut self, member_size: u64) -> Result<()> {
        let size_limit = member_size.saturating_sub(TRAILER_SIZE as u64 + MAX_MARKER_SIZE);
        let mll = self.mf.match_len_limit();
        while !self.mf.data_finished() {
            if self.eb.renc.member_position() >= size_limit {
                break;
            }
            self.update_prices();
            let pos = self.mf.data_position();
            let avail = self.mf.available_bytes();
            if avail < MIN_MATCH_LEN || pos == 0 {
                self.mf.skip(1)?;
                self.emit_single(pos, SinglePacket::Literal)?;
                continue;
            }
            // rep lengths at this position, before the finder advances
            let lim = avail.min(MAX_MATCH_LEN);
            let mut best_rep_len = 0usize;
            let mut best_rep_index = 0usize;
            for k in 0..NUM_REP_DISTANCES {
                let dis = self.eb.reps[k];
                if (dis as u64) < pos {
                    let len = self.mf.match_len_at_delta(0, dis, lim);
                    if len > best_rep_len {
                        best_rep_len = len;
                        best_rep_index = k;
                    }
                }
            }
            self.mf.get_match_pairs(&mut self.pairs)?;
            let main_len = self.pairs.last().map_or(0, |p| p.len);
            let dplim = mll.min(lim);
            if best_rep_len >= dplim {
                // a rep this long always dominates the look-ahead
                self.emit_single(
                    pos,
                    SinglePacket::Rep {
                        index: best_rep_index,
                        len: best_rep_len,
                    },
                )?;
                self.mf.skip(best_rep_len - 1)?;
                continue;
            }
            if main_len >= dplim {
                let dis = self.pairs.last().map_or(0, |p| p.dis);
                self.emit_single(pos, SinglePacket::Match { dis, len: main_len })?;
                self.mf.skip(main_len - 1)?;
                continue;
            }
            let (end, consumed) = self.sequence_optimizer(pos)?;
            if consumed < end {
                self.mf.skip(end - consumed)?;
            }
            self.emit_sequence(pos, end)?;
        }
        self.eb.full_flush(self.mf.data_position())
    }

    fn reset(&mut self) -> Result<()> {
        self.mf.reset()?;
        self.len_price_counter = 0;
        self.dis_price_counter = 0;
        self.align_price_counter = 0;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_prices_match_model() {
        let lm = LenModel::new();
        let mut lp = LenPrices::new();
        lp.update(&lm);
        // a low length costs choice1 + 3 tree bits, all at probability 1/2
        let p = lp.price(2, 0);
        assert!((3 << PRICE_SHIFT_BITS..=5 << PRICE_SHIFT_BITS).contains(&p));
        // a high length costs two choice bits + 8 tree bits
        let p = lp.price(100, 0);
        assert!((9 << PRICE_SHIFT_BITS..=11 << PRICE_SHIFT_BITS).contains(&p));
        // longer length classes never price below shorter ones on a
        // fresh model
        assert!(lp.price(2, 0) < lp.price(10, 0));
        assert!(lp.price(10, 0) < lp.price(20, 0));
    }

    #[test]
    fn test_trial_empty() {
        let t = Trial::EMPTY;
        assert_eq!(t.price, INFINITE_PRICE);
        assert_eq!(t.back, -1);
        assert_eq!(t.state.index(), 0);
    }
}
