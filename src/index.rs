//! ColumnIndex and OffsetIndex: the per-chunk page index trailers.
//!
//! Both are parallel arrays of length = number of data pages in the chunk.
//! They are serialized with the tagged record protocol after all data pages
//! and referenced from column-chunk metadata by `(offset, length)`; a zero
//! length means the index is absent, which is a valid state.

use serde::{Deserialize, Serialize};

use crate::record::{sizes, RecordReader, RecordWriter};
use crate::types::{PhysicalType, PhysicalValue, Value};
use crate::{Result, StrataError};

/// Sortedness classification of a ColumnIndex's per-page min sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BoundaryOrder {
    Unordered = 0,
    Ascending = 1,
    Descending = 2,
}

impl BoundaryOrder {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(BoundaryOrder::Unordered),
            1 => Some(BoundaryOrder::Ascending),
            2 => Some(BoundaryOrder::Descending),
            _ => None,
        }
    }
}

/// Location of one data page inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLocation {
    pub offset: i64,
    /// Page header plus compressed payload.
    pub compressed_page_size: i32,
    pub first_row_index: i64,
}

const CI_NULL_PAGES: u8 = 1;
const CI_MIN_VALUES: u8 = 2;
const CI_MAX_VALUES: u8 = 3;
const CI_NULL_COUNTS: u8 = 4;
const CI_BOUNDARY_ORDER: u8 = 5;

/// Per-page statistics for one column chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnIndex {
    /// True iff the page is all-nulls (its min/max are unset and encoded as
    /// empty strings to keep the arrays parallel).
    pub null_pages: Vec<bool>,
    pub min_values: Vec<Vec<u8>>,
    pub max_values: Vec<Vec<u8>>,
    pub null_counts: Vec<i64>,
    /// Writer-cached sortedness hint for the min sequence.
    pub boundary_order: Option<BoundaryOrder>,
}

impl ColumnIndex {
    pub fn num_pages(&self) -> usize {
        self.null_pages.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.field_list_bool(CI_NULL_PAGES, &self.null_pages);
        w.field_list_bytes(CI_MIN_VALUES, &self.min_values);
        w.field_list_bytes(CI_MAX_VALUES, &self.max_values);
        w.field_list_i64(CI_NULL_COUNTS, &self.null_counts);
        if let Some(order) = self.boundary_order {
            w.field_u8(CI_BOUNDARY_ORDER, order as u8);
        }
        w.finish()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data);
        let mut out = ColumnIndex::default();
        loop {
            let field = r
                .next_field()
                .map_err(|e| StrataError::CorruptIndex(e.to_string()))?;
            let Some((id, wire_type)) = field else { break };
            let res = match id {
                CI_NULL_PAGES => r.read_list_bool().map(|v| out.null_pages = v),
                CI_MIN_VALUES => r.read_list_bytes().map(|v| out.min_values = v),
                CI_MAX_VALUES => r.read_list_bytes().map(|v| out.max_values = v),
                CI_NULL_COUNTS => r.read_list_i64().map(|v| out.null_counts = v),
                CI_BOUNDARY_ORDER => r.read_u8().map(|v| out.boundary_order = BoundaryOrder::from_u8(v)),
                _ => r.skip_value(wire_type),
            };
            res.map_err(|e| StrataError::CorruptIndex(e.to_string()))?;
        }
        if out.min_values.len() != out.null_pages.len()
            || out.max_values.len() != out.null_pages.len()
            || out.null_counts.len() != out.null_pages.len()
        {
            return Err(StrataError::CorruptIndex(format!(
                "parallel array lengths disagree: null_pages={}, min={}, max={}, null_counts={}",
                out.null_pages.len(),
                out.min_values.len(),
                out.max_values.len(),
                out.null_counts.len()
            )));
        }
        Ok(out)
    }
}

const OI_PAGE_LOCATIONS: u8 = 1;
const OI_PAGE_BLOOM_OFFSETS: u8 = 2;

const PL_OFFSET: u8 = 1;
const PL_COMPRESSED_SIZE: u8 = 2;
const PL_FIRST_ROW_INDEX: u8 = 3;

/// Per-page physical locations for one column chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffsetIndex {
    pub page_locations: Vec<PageLocation>,
    /// One entry per data page; 0 means that page has no bloom filter.
    pub page_bloom_filter_offsets: Vec<i64>,
}

impl OffsetIndex {
    pub fn num_pages(&self) -> usize {
        self.page_locations.len()
    }

    /// Serialized size, computable before bloom offsets are assigned: all
    /// payload widths are fixed.
    pub fn serialized_len(&self) -> usize {
        let per_location =
            sizes::field_i64() + sizes::field_i32() + sizes::field_i64() + sizes::STOP;
        sizes::FIELD_HEADER
            + sizes::LIST_HEADER
            + self.page_locations.len() * per_location
            + sizes::field_list_i64(self.page_bloom_filter_offsets.len())
            + sizes::STOP
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.field_list_records(OI_PAGE_LOCATIONS, &self.page_locations, |nested, loc| {
            nested.field_i64(PL_OFFSET, loc.offset);
            nested.field_i32(PL_COMPRESSED_SIZE, loc.compressed_page_size);
            nested.field_i64(PL_FIRST_ROW_INDEX, loc.first_row_index);
        });
        w.field_list_i64(OI_PAGE_BLOOM_OFFSETS, &self.page_bloom_filter_offsets);
        let bytes = w.finish();
        debug_assert_eq!(bytes.len(), self.serialized_len());
        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data);
        let mut out = OffsetIndex::default();
        loop {
            let field = r
                .next_field()
                .map_err(|e| StrataError::CorruptIndex(e.to_string()))?;
            let Some((id, wire_type)) = field else { break };
            let res = match id {
                OI_PAGE_LOCATIONS => r
                    .read_list_records(|nested| {
                        let mut loc = PageLocation {
                            offset: 0,
                            compressed_page_size: 0,
                            first_row_index: 0,
                        };
                        while let Some((fid, fwire)) = nested.next_field()? {
                            match fid {
                                PL_OFFSET => loc.offset = nested.read_i64()?,
                                PL_COMPRESSED_SIZE => {
                                    loc.compressed_page_size = nested.read_i32()?
                                }
                                PL_FIRST_ROW_INDEX => loc.first_row_index = nested.read_i64()?,
                                _ => nested.skip_value(fwire)?,
                            }
                        }
                        Ok(loc)
                    })
                    .map(|v| out.page_locations = v),
                OI_PAGE_BLOOM_OFFSETS => {
                    r.read_list_i64().map(|v| out.page_bloom_filter_offsets = v)
                }
                _ => r.skip_value(wire_type),
            };
            res.map_err(|e| StrataError::CorruptIndex(e.to_string()))?;
        }
        Ok(out)
    }
}

/// Check the six parallel arrays agree in length. A mismatch is fatal for the
/// page-skip path.
pub fn validate_parallel(column_index: &ColumnIndex, offset_index: &OffsetIndex) -> Result<()> {
    let n = column_index.num_pages();
    if offset_index.page_locations.len() != n {
        return Err(StrataError::CorruptIndex(format!(
            "offset index has {} page locations, column index has {} pages",
            offset_index.page_locations.len(),
            n
        )));
    }
    if !offset_index.page_bloom_filter_offsets.is_empty()
        && offset_index.page_bloom_filter_offsets.len() != n
    {
        return Err(StrataError::CorruptIndex(format!(
            "offset index has {} page bloom offsets for {} pages",
            offset_index.page_bloom_filter_offsets.len(),
            n
        )));
    }
    Ok(())
}

/// Decode a ColumnIndex bound into a typed [`Value`]: little-endian fixed
/// width for numerics, a raw byte slice for the variable-length types. No
/// pointer punning.
pub fn decode_bound(physical_type: PhysicalType, bytes: &[u8]) -> Result<Value> {
    use crate::types::{ByteArray, FixedLenByteArray, Int96};
    Ok(match physical_type {
        PhysicalType::Boolean => Value::Boolean(bool::from_value_bytes(bytes)?),
        PhysicalType::Int32 => Value::Int32(i32::from_value_bytes(bytes)?),
        PhysicalType::Int64 => Value::Int64(i64::from_value_bytes(bytes)?),
        PhysicalType::Int96 => Value::Int96(Int96::from_value_bytes(bytes)?),
        PhysicalType::Float => Value::Float(f32::from_value_bytes(bytes)?),
        PhysicalType::Double => Value::Double(f64::from_value_bytes(bytes)?),
        PhysicalType::ByteArray => Value::ByteArray(ByteArray::from_value_bytes(bytes)?),
        PhysicalType::FixedLenByteArray => {
            Value::FixedLenByteArray(FixedLenByteArray::from_value_bytes(bytes)?)
        }
    })
}

/// Scan the min sequence once and classify it. Null pages carry empty bounds
/// and do not participate.
pub fn detect_boundary_order(
    column_index: &ColumnIndex,
    physical_type: PhysicalType,
) -> Result<BoundaryOrder> {
    if physical_type == PhysicalType::Int96 {
        // No meaningful ordering; never report sortedness.
        return Ok(BoundaryOrder::Unordered);
    }
    let mut ascending = true;
    let mut descending = true;
    let mut prev: Option<Value> = None;
    for (i, min) in column_index.min_values.iter().enumerate() {
        if column_index.null_pages.get(i).copied().unwrap_or(false) {
            continue;
        }
        let current = decode_bound(physical_type, min)?;
        if let Some(p) = &prev {
            match p.compare(&current)? {
                std::cmp::Ordering::Less => descending = false,
                std::cmp::Ordering::Greater => ascending = false,
                std::cmp::Ordering::Equal => {}
            }
        }
        prev = Some(current);
    }
    Ok(if ascending {
        BoundaryOrder::Ascending
    } else if descending {
        BoundaryOrder::Descending
    } else {
        BoundaryOrder::Unordered
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_column_index() -> ColumnIndex {
        ColumnIndex {
            null_pages: vec![false, false, true],
            min_values: vec![
                1i32.to_le_bytes().to_vec(),
                100i32.to_le_bytes().to_vec(),
                Vec::new(),
            ],
            max_values: vec![
                99i32.to_le_bytes().to_vec(),
                199i32.to_le_bytes().to_vec(),
                Vec::new(),
            ],
            null_counts: vec![0, 2, 50],
            boundary_order: Some(BoundaryOrder::Ascending),
        }
    }

    #[test]
    fn column_index_round_trip() {
        let ci = sample_column_index();
        let restored = ColumnIndex::from_bytes(&ci.to_bytes()).unwrap();
        assert_eq!(restored, ci);
    }

    #[test]
    fn column_index_length_mismatch_is_corrupt() {
        let mut ci = sample_column_index();
        ci.null_counts.pop();
        let bytes = ci.to_bytes();
        assert!(matches!(
            ColumnIndex::from_bytes(&bytes),
            Err(StrataError::CorruptIndex(_))
        ));
    }

    #[test]
    fn offset_index_round_trip_and_size() {
        let oi = OffsetIndex {
            page_locations: vec![
                PageLocation {
                    offset: 4,
                    compressed_page_size: 120,
                    first_row_index: 0,
                },
                PageLocation {
                    offset: 124,
                    compressed_page_size: 130,
                    first_row_index: 1000,
                },
            ],
            page_bloom_filter_offsets: vec![0, 9000],
        };
        let bytes = oi.to_bytes();
        assert_eq!(bytes.len(), oi.serialized_len());
        assert_eq!(OffsetIndex::from_bytes(&bytes).unwrap(), oi);
    }

    #[test]
    fn boundary_detection_ignores_null_pages() {
        let ci = sample_column_index();
        assert_eq!(
            detect_boundary_order(&ci, PhysicalType::Int32).unwrap(),
            BoundaryOrder::Ascending
        );

        let mut unsorted = sample_column_index();
        unsorted.min_values[1] = 0i32.to_le_bytes().to_vec();
        assert_eq!(
            detect_boundary_order(&unsorted, PhysicalType::Int32).unwrap(),
            BoundaryOrder::Unordered
        );
    }

    #[test]
    fn decode_bound_reads_little_endian() {
        let bytes = 0x0102_0304i32.to_le_bytes();
        assert_eq!(
            decode_bound(PhysicalType::Int32, &bytes).unwrap(),
            Value::Int32(0x0102_0304)
        );
        assert!(decode_bound(PhysicalType::Int64, &bytes).is_err());
    }
}
