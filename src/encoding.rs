//! Value and level encodings.
//!
//! Data pages carry `[rep levels | def levels | values]`. Levels are
//! run-length encoded with a bit width of ⌈log₂(max_level + 1)⌉. Values are
//! either PLAIN (little-endian fixed width, length-prefixed byte arrays,
//! bit-packed booleans) or DICTIONARY (bit-packed indices into a single
//! dictionary page of PLAIN-encoded distinct values).

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::types::{ByteArray, FixedLenByteArray, Int96, PhysicalValue};
use crate::{Result, StrataError};

/// Value/level encoding tag as stored in page headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Encoding {
    Plain = 0,
    Rle = 1,
    Dictionary = 2,
}

impl Encoding {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Encoding::Plain),
            1 => Some(Encoding::Rle),
            2 => Some(Encoding::Dictionary),
            _ => None,
        }
    }
}

/// Minimum number of bits needed to store values in `0..=max`.
pub fn num_required_bits(max: u64) -> u8 {
    (64 - max.leading_zeros()) as u8
}

// ----------------------------------------------------------------------
// Bit packing (LSB first)

pub fn bit_pack_u32(values: &[u32], bit_width: u8) -> Vec<u8> {
    if bit_width == 0 {
        return Vec::new();
    }
    let w = bit_width as usize;
    let mut out = vec![0u8; (values.len() * w + 7) / 8];
    for (i, &v) in values.iter().enumerate() {
        let mut bit = i * w;
        for k in 0..w {
            if (v >> k) & 1 == 1 {
                out[bit / 8] |= 1 << (bit % 8);
            }
            bit += 1;
        }
    }
    out
}

pub fn bit_unpack_u32(data: &[u8], bit_width: u8, n: usize) -> Result<Vec<u32>> {
    if bit_width == 0 {
        return Ok(vec![0; n]);
    }
    let w = bit_width as usize;
    if data.len() * 8 < n * w {
        return Err(StrataError::CorruptPage(format!(
            "bit-packed run of {} values at width {} needs {} bytes, have {}",
            n,
            w,
            (n * w + 7) / 8,
            data.len()
        )));
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let mut v = 0u32;
        let mut bit = i * w;
        for k in 0..w {
            if (data[bit / 8] >> (bit % 8)) & 1 == 1 {
                v |= 1 << k;
            }
            bit += 1;
        }
        out.push(v);
    }
    Ok(out)
}

fn write_uleb128(buf: &mut Vec<u8>, mut v: u32) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn read_uleb128(data: &[u8], pos: &mut usize) -> Result<u32> {
    let mut v = 0u32;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| StrataError::CorruptPage("truncated varint".into()))?;
        *pos += 1;
        v |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(v);
        }
        shift += 7;
        if shift > 28 {
            return Err(StrataError::CorruptPage("varint overflow".into()));
        }
    }
}

// ----------------------------------------------------------------------
// Level RLE

fn level_value_width(max_level: i16) -> usize {
    (num_required_bits(max_level as u64) as usize + 7) / 8
}

/// RLE-encode a run of definition or repetition levels. The block is a
/// sequence of `[varint run_len][value]` runs; the value width follows the
/// column's max level.
pub fn encode_levels(levels: &[i16], max_level: i16) -> Vec<u8> {
    let width = level_value_width(max_level);
    let mut out = Vec::new();
    let mut i = 0;
    while i < levels.len() {
        let v = levels[i];
        let mut run = 1;
        while i + run < levels.len() && levels[i + run] == v {
            run += 1;
        }
        write_uleb128(&mut out, run as u32);
        out.extend_from_slice(&v.to_le_bytes()[..width]);
        i += run;
    }
    out
}

/// Streaming decoder over one level block.
pub struct LevelDecoder {
    data: Vec<u8>,
    pos: usize,
    width: usize,
    levels_remaining: usize,
    current: i16,
    run_remaining: usize,
}

impl LevelDecoder {
    pub fn new(data: Vec<u8>, max_level: i16, num_levels: usize) -> Self {
        Self {
            data,
            pos: 0,
            width: level_value_width(max_level),
            levels_remaining: num_levels,
            current: 0,
            run_remaining: 0,
        }
    }

    fn refill(&mut self) -> Result<()> {
        let run = read_uleb128(&self.data, &mut self.pos)? as usize;
        if run == 0 {
            return Err(StrataError::CorruptPage("zero-length level run".into()));
        }
        if self.pos + self.width > self.data.len() {
            return Err(StrataError::CorruptPage("truncated level run value".into()));
        }
        let mut raw = [0u8; 2];
        raw[..self.width].copy_from_slice(&self.data[self.pos..self.pos + self.width]);
        self.pos += self.width;
        self.current = i16::from_le_bytes(raw);
        self.run_remaining = run;
        Ok(())
    }

    pub fn read(&mut self, n: usize, out: &mut Vec<i16>) -> Result<usize> {
        let to_read = n.min(self.levels_remaining);
        let mut read = 0;
        while read < to_read {
            if self.run_remaining == 0 {
                self.refill()?;
            }
            let take = (to_read - read).min(self.run_remaining);
            out.extend(std::iter::repeat(self.current).take(take));
            self.run_remaining -= take;
            read += take;
        }
        self.levels_remaining -= read;
        Ok(read)
    }
}

// ----------------------------------------------------------------------
// PLAIN values

/// Accumulates PLAIN-encoded values. `bit_len` tracks the boolean bit cursor;
/// every other type appends whole bytes.
#[derive(Default)]
pub struct PlainBuf {
    pub bytes: Vec<u8>,
    bit_len: usize,
}

impl PlainBuf {
    fn push_bit(&mut self, v: bool) {
        if self.bit_len % 8 == 0 {
            self.bytes.push(0);
        }
        if v {
            let idx = self.bit_len / 8;
            self.bytes[idx] |= 1 << (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn take(&mut self) -> Vec<u8> {
        self.bit_len = 0;
        std::mem::take(&mut self.bytes)
    }
}

/// Cursor for PLAIN decoding; `bit_pos` is only advanced by booleans.
pub struct PlainCursor<'a> {
    data: &'a [u8],
    pos: usize,
    bit_pos: usize,
}

impl<'a> PlainCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_pos: 0,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(StrataError::CorruptPage(format!(
                "plain data exhausted: need {} bytes at {}, have {}",
                n,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_bit(&mut self) -> Result<bool> {
        let byte_idx = self.bit_pos / 8;
        if byte_idx >= self.data.len() {
            return Err(StrataError::CorruptPage(
                "plain boolean data exhausted".into(),
            ));
        }
        let bit = (self.data[byte_idx] >> (self.bit_pos % 8)) & 1 == 1;
        self.bit_pos += 1;
        // Keep the byte cursor past the packed region.
        self.pos = self.pos.max((self.bit_pos + 7) / 8);
        Ok(bit)
    }
}

/// PLAIN encode/decode capability, layered on [`PhysicalValue`].
pub trait PlainCodec: PhysicalValue {
    fn encode_plain(values: &[Self], buf: &mut PlainBuf);
    fn decode_plain(
        cursor: &mut PlainCursor<'_>,
        n: usize,
        type_length: usize,
        out: &mut Vec<Self>,
    ) -> Result<()>;
}

macro_rules! plain_fixed {
    ($ty:ty, $width:expr) => {
        impl PlainCodec for $ty {
            fn encode_plain(values: &[Self], buf: &mut PlainBuf) {
                for v in values {
                    v.append_value_bytes(&mut buf.bytes);
                }
            }

            fn decode_plain(
                cursor: &mut PlainCursor<'_>,
                n: usize,
                _type_length: usize,
                out: &mut Vec<Self>,
            ) -> Result<()> {
                out.reserve(n);
                for _ in 0..n {
                    let raw = cursor.take($width)?;
                    out.push(<$ty as PhysicalValue>::from_value_bytes(raw)?);
                }
                Ok(())
            }
        }
    };
}

plain_fixed!(i32, 4);
plain_fixed!(i64, 8);
plain_fixed!(Int96, 12);
plain_fixed!(f32, 4);
plain_fixed!(f64, 8);

impl PlainCodec for bool {
    fn encode_plain(values: &[Self], buf: &mut PlainBuf) {
        for &v in values {
            buf.push_bit(v);
        }
    }

    fn decode_plain(
        cursor: &mut PlainCursor<'_>,
        n: usize,
        _type_length: usize,
        out: &mut Vec<Self>,
    ) -> Result<()> {
        out.reserve(n);
        for _ in 0..n {
            out.push(cursor.take_bit()?);
        }
        Ok(())
    }
}

impl PlainCodec for ByteArray {
    fn encode_plain(values: &[Self], buf: &mut PlainBuf) {
        for v in values {
            buf.bytes
                .extend_from_slice(&(v.len() as u32).to_le_bytes());
            buf.bytes.extend_from_slice(v.as_bytes());
        }
    }

    fn decode_plain(
        cursor: &mut PlainCursor<'_>,
        n: usize,
        _type_length: usize,
        out: &mut Vec<Self>,
    ) -> Result<()> {
        out.reserve(n);
        for _ in 0..n {
            let len = u32::from_le_bytes(cursor.take(4)?.try_into().unwrap()) as usize;
            out.push(ByteArray(cursor.take(len)?.to_vec()));
        }
        Ok(())
    }
}

impl PlainCodec for FixedLenByteArray {
    fn encode_plain(values: &[Self], buf: &mut PlainBuf) {
        for v in values {
            buf.bytes.extend_from_slice(v.as_bytes());
        }
    }

    fn decode_plain(
        cursor: &mut PlainCursor<'_>,
        n: usize,
        type_length: usize,
        out: &mut Vec<Self>,
    ) -> Result<()> {
        if type_length == 0 {
            return Err(StrataError::CorruptPage(
                "FIXED_LEN_BYTE_ARRAY page with zero type length".into(),
            ));
        }
        out.reserve(n);
        for _ in 0..n {
            out.push(FixedLenByteArray(cursor.take(type_length)?.to_vec()));
        }
        Ok(())
    }
}

/// PLAIN value sink for one page.
pub struct PlainValueEncoder<T: PlainCodec> {
    buf: PlainBuf,
    _marker: std::marker::PhantomData<T>,
}

impl<T: PlainCodec> Default for PlainValueEncoder<T> {
    fn default() -> Self {
        Self {
            buf: PlainBuf::default(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: PlainCodec> PlainValueEncoder<T> {
    pub fn put(&mut self, values: &[T]) {
        T::encode_plain(values, &mut self.buf);
    }

    pub fn estimated_size(&self) -> usize {
        self.buf.len()
    }

    pub fn flush(&mut self) -> Vec<u8> {
        self.buf.take()
    }
}

// ----------------------------------------------------------------------
// Dictionary encoding

/// Dictionary value sink: interns distinct values, buffers per-page indices.
/// The data-page payload is `[bit_width: u8][bit-packed indices]`; the
/// dictionary page is the PLAIN encoding of the distinct values in
/// first-seen order.
pub struct DictEncoder<T: PlainCodec> {
    interner: AHashMap<Vec<u8>, u32>,
    uniques: Vec<T>,
    indices: Vec<u32>,
    uniques_size: usize,
}

impl<T: PlainCodec> Default for DictEncoder<T> {
    fn default() -> Self {
        Self {
            interner: AHashMap::new(),
            uniques: Vec::new(),
            indices: Vec::new(),
            uniques_size: 0,
        }
    }
}

impl<T: PlainCodec> DictEncoder<T> {
    pub fn put(&mut self, values: &[T]) {
        for v in values {
            let mut key = Vec::new();
            v.append_value_bytes(&mut key);
            let uniques = &mut self.uniques;
            let uniques_size = &mut self.uniques_size;
            let idx = *self.interner.entry(key).or_insert_with(|| {
                let next = uniques.len() as u32;
                uniques.push(v.clone());
                *uniques_size += v.encoded_size_hint();
                next
            });
            self.indices.push(idx);
        }
    }

    pub fn num_entries(&self) -> usize {
        self.uniques.len()
    }

    /// PLAIN-encoded size of the dictionary itself; drives the fallback check.
    pub fn dict_encoded_size(&self) -> usize {
        self.uniques_size
    }

    fn bit_width(&self) -> u8 {
        num_required_bits(self.uniques.len().saturating_sub(1) as u64)
    }

    /// Estimated size of the buffered (not yet flushed) indices.
    pub fn estimated_data_size(&self) -> usize {
        1 + (self.indices.len() * self.bit_width() as usize + 7) / 8
    }

    /// Drain the buffered indices into a data-page payload.
    pub fn flush_indices(&mut self) -> Vec<u8> {
        let width = self.bit_width();
        let mut out = Vec::with_capacity(1 + self.estimated_data_size());
        out.push(width);
        out.extend_from_slice(&bit_pack_u32(&self.indices, width));
        self.indices.clear();
        out
    }

    pub fn dict_payload(&self) -> Vec<u8> {
        let mut buf = PlainBuf::default();
        T::encode_plain(&self.uniques, &mut buf);
        buf.take()
    }

    pub fn has_buffered_indices(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// Decode a dictionary-encoded data-page payload back into values.
pub fn decode_dict_indices(data: &[u8], num_values: usize) -> Result<Vec<u32>> {
    let (&width, rest) = data
        .split_first()
        .ok_or_else(|| StrataError::CorruptPage("empty dictionary-encoded page".into()))?;
    if width > 32 {
        return Err(StrataError::CorruptPage(format!(
            "dictionary index bit width {width} out of range"
        )));
    }
    bit_unpack_u32(rest, width, num_values)
}
