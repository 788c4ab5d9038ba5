//! Typed column chunk reader.
//!
//! Decodes a chunk's page stream: an optional dictionary page first, then
//! data pages of `[rep levels | def levels | values]`. Pages decode eagerly
//! (they are bounded by the writer's page size); batch reads then slice the
//! decoded arrays.

use crate::encoding::{
    decode_dict_indices, Encoding, LevelDecoder, PlainCodec, PlainCursor,
};
use crate::page::{Page, PageReader, PageType};
use crate::schema::ColumnDescriptor;
use crate::types::{ByteArray, FixedLenByteArray, Int96, PhysicalType};
use crate::{Result, StrataError};

pub struct GenericColumnReader<T: PlainCodec> {
    descr: ColumnDescriptor,
    page_reader: PageReader,
    dict: Option<Vec<T>>,

    page_def: Vec<i16>,
    page_rep: Vec<i16>,
    page_values: Vec<T>,
    level_pos: usize,
    value_pos: usize,
}

impl<T: PlainCodec> GenericColumnReader<T> {
    pub fn new(descr: ColumnDescriptor, page_reader: PageReader) -> Self {
        debug_assert_eq!(descr.physical_type, T::PHYSICAL_TYPE);
        Self {
            descr,
            page_reader,
            dict: None,
            page_def: Vec::new(),
            page_rep: Vec::new(),
            page_values: Vec::new(),
            level_pos: 0,
            value_pos: 0,
        }
    }

    pub fn descr(&self) -> &ColumnDescriptor {
        &self.descr
    }

    fn levels_in_page(&self) -> usize {
        if self.descr.max_def_level() > 0 {
            self.page_def.len()
        } else {
            self.page_values.len()
        }
    }

    fn page_exhausted(&self) -> bool {
        self.level_pos >= self.levels_in_page()
    }

    /// Whether the currently decoded page has no entries left. Reading past
    /// this point would silently advance into the next physical page, so
    /// callers that must stop at a page boundary (the candidate-seek path)
    /// check it before every read.
    pub fn page_drained(&self) -> bool {
        self.page_exhausted()
    }

    /// Whether another level/value is available, advancing to the next data
    /// page when the current one is drained.
    pub fn has_next(&mut self) -> Result<bool> {
        while self.page_exhausted() {
            if !self.advance_page()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn load_dictionary(&mut self, page: &Page) -> Result<()> {
        if self.dict.is_some() {
            return Err(StrataError::CorruptPage(
                "second dictionary page in one chunk".into(),
            ));
        }
        if page.encoding != Encoding::Plain {
            return Err(StrataError::CorruptPage(format!(
                "dictionary page must be PLAIN, found {:?}",
                page.encoding
            )));
        }
        let mut cursor = PlainCursor::new(&page.payload);
        let mut dict = Vec::new();
        T::decode_plain(
            &mut cursor,
            page.num_values as usize,
            self.descr.type_length as usize,
            &mut dict,
        )?;
        self.dict = Some(dict);
        Ok(())
    }

    fn advance_page(&mut self) -> Result<bool> {
        loop {
            let Some(page) = self.page_reader.next_page()? else {
                return Ok(false);
            };
            match page.page_type {
                PageType::Dictionary => {
                    self.load_dictionary(&page)?;
                    continue;
                }
                PageType::Data => {
                    self.decode_data_page(&page)?;
                    return Ok(true);
                }
            }
        }
    }

    fn decode_data_page(&mut self, page: &Page) -> Result<()> {
        let num_levels = page.num_values as usize;
        let payload = &page.payload;
        let mut pos = 0usize;

        let read_block = |pos: &mut usize| -> Result<Vec<u8>> {
            if *pos + 4 > payload.len() {
                return Err(StrataError::CorruptPage(
                    "level block length truncated".into(),
                ));
            }
            let len =
                u32::from_le_bytes(payload[*pos..*pos + 4].try_into().unwrap()) as usize;
            *pos += 4;
            if *pos + len > payload.len() {
                return Err(StrataError::CorruptPage("level block truncated".into()));
            }
            let block = payload[*pos..*pos + len].to_vec();
            *pos += len;
            Ok(block)
        };

        self.page_rep.clear();
        if self.descr.max_rep_level() > 0 {
            let block = read_block(&mut pos)?;
            let mut decoder = LevelDecoder::new(block, self.descr.max_rep_level(), num_levels);
            decoder.read(num_levels, &mut self.page_rep)?;
        }
        self.page_def.clear();
        if self.descr.max_def_level() > 0 {
            let block = read_block(&mut pos)?;
            let mut decoder = LevelDecoder::new(block, self.descr.max_def_level(), num_levels);
            decoder.read(num_levels, &mut self.page_def)?;
        }

        let max_def = self.descr.max_def_level();
        let num_non_null = if max_def > 0 {
            self.page_def.iter().filter(|&&l| l == max_def).count()
        } else {
            num_levels
        };

        self.page_values.clear();
        let values_region = &payload[pos..];
        match page.encoding {
            Encoding::Plain => {
                let mut cursor = PlainCursor::new(values_region);
                T::decode_plain(
                    &mut cursor,
                    num_non_null,
                    self.descr.type_length as usize,
                    &mut self.page_values,
                )?;
            }
            Encoding::Dictionary => {
                let dict = self.dict.as_ref().ok_or_else(|| {
                    StrataError::CorruptPage(
                        "dictionary-encoded page before any dictionary page".into(),
                    )
                })?;
                let indices = decode_dict_indices(values_region, num_non_null)?;
                self.page_values.reserve(indices.len());
                for idx in indices {
                    let value = dict.get(idx as usize).ok_or_else(|| {
                        StrataError::CorruptPage(format!(
                            "dictionary index {} out of range ({} entries)",
                            idx,
                            dict.len()
                        ))
                    })?;
                    self.page_values.push(value.clone());
                }
            }
            Encoding::Rle => {
                return Err(StrataError::CorruptPage(
                    "RLE is a level encoding, not a value encoding".into(),
                ))
            }
        }
        self.level_pos = 0;
        self.value_pos = 0;
        Ok(())
    }

    /// Read up to `max_levels` level entries; values land in `values_out`.
    /// Returns `(levels_read, values_read)`.
    pub fn read_batch(
        &mut self,
        max_levels: usize,
        mut def_out: Option<&mut Vec<i16>>,
        mut rep_out: Option<&mut Vec<i16>>,
        values_out: &mut Vec<T>,
    ) -> Result<(usize, usize)> {
        let mut levels_read = 0;
        let mut values_read = 0;
        while levels_read < max_levels && self.has_next()? {
            let available = self.levels_in_page() - self.level_pos;
            let take = available.min(max_levels - levels_read);

            let max_def = self.descr.max_def_level();
            let value_take = if max_def > 0 {
                self.page_def[self.level_pos..self.level_pos + take]
                    .iter()
                    .filter(|&&l| l == max_def)
                    .count()
            } else {
                take
            };

            if let Some(out) = def_out.as_deref_mut() {
                if max_def > 0 {
                    out.extend_from_slice(&self.page_def[self.level_pos..self.level_pos + take]);
                } else {
                    out.extend(std::iter::repeat(0).take(take));
                }
            }
            if let Some(out) = rep_out.as_deref_mut() {
                if self.descr.max_rep_level() > 0 {
                    out.extend_from_slice(&self.page_rep[self.level_pos..self.level_pos + take]);
                } else {
                    out.extend(std::iter::repeat(0).take(take));
                }
            }
            values_out
                .extend_from_slice(&self.page_values[self.value_pos..self.value_pos + value_take]);

            self.level_pos += take;
            self.value_pos += value_take;
            levels_read += take;
            values_read += value_take;
        }
        Ok((levels_read, values_read))
    }

    /// Next single entry: `(value-or-null, repetition level)`. `None` once
    /// the chunk is drained.
    pub fn read_one(&mut self) -> Result<Option<(Option<T>, i16)>> {
        if !self.has_next()? {
            return Ok(None);
        }
        let i = self.level_pos;
        let rep = if self.descr.max_rep_level() > 0 {
            self.page_rep[i]
        } else {
            0
        };
        let max_def = self.descr.max_def_level();
        let value = if max_def == 0 || self.page_def[i] == max_def {
            let v = self.page_values[self.value_pos].clone();
            self.value_pos += 1;
            Some(v)
        } else {
            None
        };
        self.level_pos += 1;
        Ok(Some((value, rep)))
    }

    /// Skip `n` rows from the current position. Whole trailing pages are
    /// never skipped blindly: the page header's row count drives page-level
    /// skips, and the remainder is decoded and discarded.
    pub fn skip_rows(&mut self, n: i64) -> Result<i64> {
        let mut remaining = n;
        while remaining > 0 {
            if !self.has_next()? {
                break;
            }
            if self.descr.max_rep_level() == 0 {
                let available = (self.levels_in_page() - self.level_pos) as i64;
                if available <= remaining {
                    // Drop the rest of this page.
                    let max_def = self.descr.max_def_level();
                    let value_take = if max_def > 0 {
                        self.page_def[self.level_pos..]
                            .iter()
                            .filter(|&&l| l == max_def)
                            .count()
                    } else {
                        available as usize
                    };
                    self.level_pos = self.levels_in_page();
                    self.value_pos += value_take;
                    remaining -= available;
                } else {
                    for _ in 0..remaining {
                        self.read_one()?;
                    }
                    remaining = 0;
                }
            } else {
                // Row boundaries sit at rep == 0; walk entries.
                let mut first = true;
                loop {
                    if !self.has_next()? {
                        break;
                    }
                    let i = self.level_pos;
                    let rep = self.page_rep.get(i).copied().unwrap_or(0);
                    if rep == 0 && !first {
                        break;
                    }
                    first = false;
                    self.read_one()?;
                }
                remaining -= 1;
            }
        }
        Ok(n - remaining)
    }

    /// Load the dictionary page if one leads the chunk. Required before
    /// seeking straight to a candidate data page, which would otherwise jump
    /// over the dictionary.
    pub fn preload_dictionary(&mut self) -> Result<()> {
        if self.dict.is_some() {
            return Ok(());
        }
        if self.page_reader.peek_page_type()? == Some(PageType::Dictionary) {
            if let Some(page) = self.page_reader.next_page()? {
                self.load_dictionary(&page)?;
            }
        }
        Ok(())
    }

    /// Drain the chunk, returning how many rows remained.
    pub fn count_rows(&mut self) -> Result<i64> {
        let mut rows = 0;
        while let Some((_, rep)) = self.read_one()? {
            if rep == 0 {
                rows += 1;
            }
        }
        Ok(rows)
    }

    /// Reposition to a page boundary located by the OffsetIndex.
    pub fn seek_to_page(&mut self, page_file_offset: i64) -> Result<()> {
        self.page_reader.seek_to(page_file_offset)?;
        self.page_def.clear();
        self.page_rep.clear();
        self.page_values.clear();
        self.level_pos = 0;
        self.value_pos = 0;
        Ok(())
    }
}

/// Uniform dispatch over the eight typed readers.
pub enum ColumnReader {
    Boolean(GenericColumnReader<bool>),
    Int32(GenericColumnReader<i32>),
    Int64(GenericColumnReader<i64>),
    Int96(GenericColumnReader<Int96>),
    Float(GenericColumnReader<f32>),
    Double(GenericColumnReader<f64>),
    ByteArray(GenericColumnReader<ByteArray>),
    FixedLenByteArray(GenericColumnReader<FixedLenByteArray>),
}

macro_rules! dispatch_reader {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            ColumnReader::Boolean($r) => $body,
            ColumnReader::Int32($r) => $body,
            ColumnReader::Int64($r) => $body,
            ColumnReader::Int96($r) => $body,
            ColumnReader::Float($r) => $body,
            ColumnReader::Double($r) => $body,
            ColumnReader::ByteArray($r) => $body,
            ColumnReader::FixedLenByteArray($r) => $body,
        }
    };
}

impl ColumnReader {
    pub fn new(descr: ColumnDescriptor, page_reader: PageReader) -> Self {
        match descr.physical_type {
            PhysicalType::Boolean => {
                ColumnReader::Boolean(GenericColumnReader::new(descr, page_reader))
            }
            PhysicalType::Int32 => {
                ColumnReader::Int32(GenericColumnReader::new(descr, page_reader))
            }
            PhysicalType::Int64 => {
                ColumnReader::Int64(GenericColumnReader::new(descr, page_reader))
            }
            PhysicalType::Int96 => {
                ColumnReader::Int96(GenericColumnReader::new(descr, page_reader))
            }
            PhysicalType::Float => {
                ColumnReader::Float(GenericColumnReader::new(descr, page_reader))
            }
            PhysicalType::Double => {
                ColumnReader::Double(GenericColumnReader::new(descr, page_reader))
            }
            PhysicalType::ByteArray => {
                ColumnReader::ByteArray(GenericColumnReader::new(descr, page_reader))
            }
            PhysicalType::FixedLenByteArray => {
                ColumnReader::FixedLenByteArray(GenericColumnReader::new(descr, page_reader))
            }
        }
    }

    pub fn physical_type(&self) -> PhysicalType {
        dispatch_reader!(self, r => r.descr().physical_type)
    }

    pub fn has_next(&mut self) -> Result<bool> {
        dispatch_reader!(self, r => r.has_next())
    }

    pub fn skip_rows(&mut self, n: i64) -> Result<i64> {
        dispatch_reader!(self, r => r.skip_rows(n))
    }

    pub fn count_rows(&mut self) -> Result<i64> {
        dispatch_reader!(self, r => r.count_rows())
    }

    /// Downcast to the typed reader for `T`.
    pub fn typed<T: TypedReaderAccess>(&mut self) -> Result<&mut GenericColumnReader<T>> {
        let physical = self.physical_type();
        T::from_reader(self).ok_or_else(|| {
            StrataError::UnsupportedType(format!(
                "requested a {} reader but the column is {}",
                T::PHYSICAL_TYPE,
                physical
            ))
        })
    }

    pub fn into_typed<T: TypedReaderAccess>(self) -> Result<GenericColumnReader<T>> {
        let physical = self.physical_type();
        T::into_reader(self).ok_or_else(|| {
            StrataError::UnsupportedType(format!(
                "requested a {} reader but the column is {}",
                T::PHYSICAL_TYPE,
                physical
            ))
        })
    }
}

/// Glue for [`ColumnReader::typed`].
pub trait TypedReaderAccess: PlainCodec {
    fn from_reader(r: &mut ColumnReader) -> Option<&mut GenericColumnReader<Self>>;
    fn into_reader(r: ColumnReader) -> Option<GenericColumnReader<Self>>;
}

macro_rules! typed_reader_access {
    ($ty:ty, $variant:ident) => {
        impl TypedReaderAccess for $ty {
            fn from_reader(r: &mut ColumnReader) -> Option<&mut GenericColumnReader<Self>> {
                match r {
                    ColumnReader::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_reader(r: ColumnReader) -> Option<GenericColumnReader<Self>> {
                match r {
                    ColumnReader::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

typed_reader_access!(bool, Boolean);
typed_reader_access!(i32, Int32);
typed_reader_access!(i64, Int64);
typed_reader_access!(Int96, Int96);
typed_reader_access!(f32, Float);
typed_reader_access!(f64, Double);
typed_reader_access!(ByteArray, ByteArray);
typed_reader_access!(FixedLenByteArray, FixedLenByteArray);
