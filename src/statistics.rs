//! Page- and chunk-level statistics.
//!
//! The writer accumulates typed min/max/null-count per page, folds page stats
//! into chunk stats at every page emit, and appends the encoded bounds to the
//! chunk's ColumnIndex. Bounds stored in the index are truncated to at most
//! [`PAGE_INDEX_MAX_STRING_LENGTH`] bytes: the min truncates down (plain
//! prefix), the max truncates up via a right-edge increment-and-carry so the
//! truncated bound still dominates every value on the page.

use crate::record::{RecordReader, RecordWriter};
use crate::types::PhysicalValue;
use crate::{Result, StrataError};

/// Cap on min/max byte strings stored in a ColumnIndex. Must stay comfortably
/// above every fixed-width value encoding so only long byte arrays truncate.
pub const PAGE_INDEX_MAX_STRING_LENGTH: usize = 64;

const FIELD_MIN: u8 = 1;
const FIELD_MAX: u8 = 2;
const FIELD_NULL_COUNT: u8 = 3;
const FIELD_DISTINCT_COUNT: u8 = 4;

/// Type-erased statistics: bounds in the value's canonical byte encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedStatistics {
    pub min: Option<Vec<u8>>,
    pub max: Option<Vec<u8>>,
    pub null_count: i64,
    pub distinct_count: Option<i64>,
}

impl EncodedStatistics {
    /// Whether both bounds are present.
    pub fn is_set(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    /// Drop bounds that exceed `max_size` (chunk metadata must not bloat on
    /// pathological byte-array values).
    pub fn apply_size_limit(&mut self, max_size: usize) {
        if self.min.as_ref().map_or(false, |m| m.len() > max_size)
            || self.max.as_ref().map_or(false, |m| m.len() > max_size)
        {
            self.min = None;
            self.max = None;
        }
    }

    pub fn write_record(&self, w: &mut RecordWriter) {
        if let Some(min) = &self.min {
            w.field_bytes(FIELD_MIN, min);
        }
        if let Some(max) = &self.max {
            w.field_bytes(FIELD_MAX, max);
        }
        w.field_i64(FIELD_NULL_COUNT, self.null_count);
        if let Some(d) = self.distinct_count {
            w.field_i64(FIELD_DISTINCT_COUNT, d);
        }
    }

    pub fn read_record(r: &mut RecordReader<'_>) -> Result<Self> {
        let mut out = EncodedStatistics::default();
        while let Some((id, wire_type)) = r.next_field()? {
            match id {
                FIELD_MIN => out.min = Some(r.read_bytes()?),
                FIELD_MAX => out.max = Some(r.read_bytes()?),
                FIELD_NULL_COUNT => out.null_count = r.read_i64()?,
                FIELD_DISTINCT_COUNT => out.distinct_count = Some(r.read_i64()?),
                _ => r.skip_value(wire_type)?,
            }
        }
        Ok(out)
    }
}

/// Running min/max/null-count over one page or one chunk.
#[derive(Debug, Clone)]
pub struct TypedStatistics<T: PhysicalValue> {
    min: Option<T>,
    max: Option<T>,
    null_count: i64,
}

impl<T: PhysicalValue> Default for TypedStatistics<T> {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            null_count: 0,
        }
    }
}

impl<T: PhysicalValue> TypedStatistics<T> {
    pub fn update(&mut self, values: &[T], null_count: i64) {
        self.null_count += null_count;
        for v in values {
            match &self.min {
                Some(m) if v.compare(m) != std::cmp::Ordering::Less => {}
                _ => self.min = Some(v.clone()),
            }
            match &self.max {
                Some(m) if v.compare(m) != std::cmp::Ordering::Greater => {}
                _ => self.max = Some(v.clone()),
            }
        }
    }

    /// Fold another accumulator (a finished page) into this one (the chunk).
    pub fn merge(&mut self, other: &TypedStatistics<T>) {
        self.null_count += other.null_count;
        if let Some(m) = &other.min {
            self.update(std::slice::from_ref(m), 0);
        }
        if let Some(m) = &other.max {
            self.update(std::slice::from_ref(m), 0);
        }
    }

    pub fn reset(&mut self) {
        *self = TypedStatistics::default();
    }

    pub fn null_count(&self) -> i64 {
        self.null_count
    }

    pub fn has_min_max(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    pub fn encode(&self) -> EncodedStatistics {
        let to_bytes = |v: &T| {
            let mut buf = Vec::new();
            v.append_value_bytes(&mut buf);
            buf
        };
        EncodedStatistics {
            min: self.min.as_ref().map(to_bytes),
            max: self.max.as_ref().map(to_bytes),
            null_count: self.null_count,
            distinct_count: None,
        }
    }
}

/// Lower-bound truncation: a prefix can only sort ≤ the original.
pub fn truncate_down(bytes: &[u8], max_len: usize) -> Vec<u8> {
    bytes[..bytes.len().min(max_len)].to_vec()
}

/// Upper-bound truncation: take a prefix, then increment its right edge with
/// carry so the result still dominates the original. If every byte is 0xff
/// the carry escapes the string and no finite bound exists.
pub fn truncate_up(bytes: &[u8], max_len: usize) -> Result<Vec<u8>> {
    if bytes.len() <= max_len {
        return Ok(bytes.to_vec());
    }
    let mut out = bytes[..max_len].to_vec();
    let mut i = max_len;
    while i > 0 {
        i -= 1;
        if out[i] != 0xff {
            out[i] += 1;
            out.truncate(i + 1);
            return Ok(out);
        }
    }
    Err(StrataError::CapacityError(
        "upper-bound truncation overflowed the whole string".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ByteArray;

    #[test]
    fn typed_stats_track_bounds_and_nulls() {
        let mut stats = TypedStatistics::<i32>::default();
        stats.update(&[5, 3, 9], 2);
        stats.update(&[7], 1);
        let enc = stats.encode();
        assert_eq!(enc.min.as_deref(), Some(&3i32.to_le_bytes()[..]));
        assert_eq!(enc.max.as_deref(), Some(&9i32.to_le_bytes()[..]));
        assert_eq!(enc.null_count, 3);
    }

    #[test]
    fn merge_folds_page_into_chunk() {
        let mut chunk = TypedStatistics::<i64>::default();
        let mut page = TypedStatistics::<i64>::default();
        page.update(&[10, 20], 1);
        chunk.merge(&page);
        page.reset();
        page.update(&[-5], 0);
        chunk.merge(&page);
        let enc = chunk.encode();
        assert_eq!(enc.min.as_deref(), Some(&(-5i64).to_le_bytes()[..]));
        assert_eq!(enc.max.as_deref(), Some(&20i64.to_le_bytes()[..]));
        assert_eq!(enc.null_count, 1);
    }

    #[test]
    fn nan_ordering_keeps_bounds_total() {
        let mut stats = TypedStatistics::<f64>::default();
        stats.update(&[1.0, f64::NAN, -2.0], 0);
        let enc = stats.encode();
        // NaN sorts after +inf under the total order, so it becomes the max.
        assert_eq!(enc.max.as_deref(), Some(&f64::NAN.to_le_bytes()[..]));
        assert_eq!(enc.min.as_deref(), Some(&(-2.0f64).to_le_bytes()[..]));
    }

    #[test]
    fn truncate_up_carries_into_earlier_bytes() {
        let out = truncate_up(&[b'a', 0xff, 0xff, b'z'], 3).unwrap();
        assert_eq!(out, vec![b'b']);
        let long = vec![0x41u8; 100];
        let up = truncate_up(&long, 64).unwrap();
        assert_eq!(up.len(), 64);
        assert!(up.as_slice() > &long[..]);
    }

    #[test]
    fn truncate_up_overflow_is_capacity_error() {
        assert!(matches!(
            truncate_up(&[0xff; 80], 64),
            Err(StrataError::CapacityError(_))
        ));
    }

    #[test]
    fn truncated_bounds_still_bracket_the_value() {
        let value = ByteArray(vec![b'q'; 100]);
        let mut buf = Vec::new();
        use crate::types::PhysicalValue as _;
        value.append_value_bytes(&mut buf);
        let down = truncate_down(&buf, 64);
        let up = truncate_up(&buf, 64).unwrap();
        assert!(down.as_slice() <= buf.as_slice());
        assert!(up.as_slice() > buf.as_slice());
    }

    #[test]
    fn encoded_stats_record_round_trip() {
        let stats = EncodedStatistics {
            min: Some(vec![1, 2]),
            max: Some(vec![3, 4]),
            null_count: 11,
            distinct_count: Some(5),
        };
        let mut w = RecordWriter::new();
        stats.write_record(&mut w);
        let bytes = w.finish();
        let mut r = RecordReader::new(&bytes);
        assert_eq!(EncodedStatistics::read_record(&mut r).unwrap(), stats);
    }
}
