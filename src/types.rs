//! Physical types and typed values.
//!
//! Every value-bearing entity in the format is parameterized by one of the
//! eight physical types. Dispatch is uniform: monomorphic readers/writers are
//! generic over [`PhysicalValue`], and pipelines that must handle any type use
//! the tagged [`Value`] variant.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::{Result, StrataError};

const TYPE_BOOLEAN: u8 = 0;
const TYPE_INT32: u8 = 1;
const TYPE_INT64: u8 = 2;
const TYPE_INT96: u8 = 3;
const TYPE_FLOAT: u8 = 4;
const TYPE_DOUBLE: u8 = 5;
const TYPE_BYTE_ARRAY: u8 = 6;
const TYPE_FIXED_LEN_BYTE_ARRAY: u8 = 7;

/// Seed for all bloom-filter value hashes.
pub const BLOOM_HASH_SEED: u64 = 0;

/// Physical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PhysicalType {
    Boolean = TYPE_BOOLEAN,
    Int32 = TYPE_INT32,
    Int64 = TYPE_INT64,
    Int96 = TYPE_INT96,
    Float = TYPE_FLOAT,
    Double = TYPE_DOUBLE,
    ByteArray = TYPE_BYTE_ARRAY,
    FixedLenByteArray = TYPE_FIXED_LEN_BYTE_ARRAY,
}

impl PhysicalType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            TYPE_BOOLEAN => Some(PhysicalType::Boolean),
            TYPE_INT32 => Some(PhysicalType::Int32),
            TYPE_INT64 => Some(PhysicalType::Int64),
            TYPE_INT96 => Some(PhysicalType::Int96),
            TYPE_FLOAT => Some(PhysicalType::Float),
            TYPE_DOUBLE => Some(PhysicalType::Double),
            TYPE_BYTE_ARRAY => Some(PhysicalType::ByteArray),
            TYPE_FIXED_LEN_BYTE_ARRAY => Some(PhysicalType::FixedLenByteArray),
            _ => None,
        }
    }

    /// Fixed size of one encoded value in bytes (0 for variable-length types;
    /// FIXED_LEN_BYTE_ARRAY width comes from the column descriptor).
    pub fn fixed_size(&self) -> usize {
        match self {
            PhysicalType::Boolean => 1,
            PhysicalType::Int32 | PhysicalType::Float => 4,
            PhysicalType::Int64 | PhysicalType::Double => 8,
            PhysicalType::Int96 => 12,
            PhysicalType::ByteArray | PhysicalType::FixedLenByteArray => 0,
        }
    }

    pub fn is_variable_length(&self) -> bool {
        matches!(
            self,
            PhysicalType::ByteArray | PhysicalType::FixedLenByteArray
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PhysicalType::Boolean => "BOOLEAN",
            PhysicalType::Int32 => "INT32",
            PhysicalType::Int64 => "INT64",
            PhysicalType::Int96 => "INT96",
            PhysicalType::Float => "FLOAT",
            PhysicalType::Double => "DOUBLE",
            PhysicalType::ByteArray => "BYTE_ARRAY",
            PhysicalType::FixedLenByteArray => "FIXED_LEN_BYTE_ARRAY",
        }
    }
}

impl std::fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 96-bit value stored as three little-endian u32 words. Carried opaquely;
/// it has no meaningful ordering and never feeds the page-skip evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Int96 {
    pub value: [u32; 3],
}

impl Int96 {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self { value: [a, b, c] }
    }

    pub fn to_le_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        for (i, w) in self.value.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        out
    }

    pub fn from_le_bytes(bytes: &[u8; 12]) -> Self {
        let mut value = [0u32; 3];
        for (i, v) in value.iter_mut().enumerate() {
            *v = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        }
        Self { value }
    }
}

/// Variable-length byte string value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct ByteArray(pub Vec<u8>);

impl ByteArray {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ByteArray {
    fn from(s: &str) -> Self {
        ByteArray(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for ByteArray {
    fn from(v: Vec<u8>) -> Self {
        ByteArray(v)
    }
}

/// Fixed-width byte string value. The width lives in the column descriptor;
/// the value itself carries its bytes like a `ByteArray`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct FixedLenByteArray(pub Vec<u8>);

impl FixedLenByteArray {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for FixedLenByteArray {
    fn from(s: &str) -> Self {
        FixedLenByteArray(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for FixedLenByteArray {
    fn from(v: Vec<u8>) -> Self {
        FixedLenByteArray(v)
    }
}

/// Tagged value over the eight physical types. This is the heterogeneous
/// return/input shape for type-erased pipelines; the per-type read/write APIs
/// stay monomorphic.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Int96(Int96),
    Float(f32),
    Double(f64),
    ByteArray(ByteArray),
    FixedLenByteArray(FixedLenByteArray),
}

impl Value {
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            Value::Boolean(_) => PhysicalType::Boolean,
            Value::Int32(_) => PhysicalType::Int32,
            Value::Int64(_) => PhysicalType::Int64,
            Value::Int96(_) => PhysicalType::Int96,
            Value::Float(_) => PhysicalType::Float,
            Value::Double(_) => PhysicalType::Double,
            Value::ByteArray(_) => PhysicalType::ByteArray,
            Value::FixedLenByteArray(_) => PhysicalType::FixedLenByteArray,
        }
    }

    /// Canonical little-endian byte image of the value. This is the
    /// representation stored in ColumnIndex bounds and hashed into bloom
    /// filters.
    pub fn value_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Value::Boolean(v) => v.append_value_bytes(&mut buf),
            Value::Int32(v) => v.append_value_bytes(&mut buf),
            Value::Int64(v) => v.append_value_bytes(&mut buf),
            Value::Int96(v) => v.append_value_bytes(&mut buf),
            Value::Float(v) => v.append_value_bytes(&mut buf),
            Value::Double(v) => v.append_value_bytes(&mut buf),
            Value::ByteArray(v) => v.append_value_bytes(&mut buf),
            Value::FixedLenByteArray(v) => v.append_value_bytes(&mut buf),
        }
        buf
    }

    /// Natural ordering between two values of the same physical type:
    /// numeric for numbers (floats under the total order where NaN sorts
    /// after +∞), lexicographic raw bytes for byte arrays.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.compare(b)),
            (Value::Int32(a), Value::Int32(b)) => Ok(a.compare(b)),
            (Value::Int64(a), Value::Int64(b)) => Ok(a.compare(b)),
            (Value::Float(a), Value::Float(b)) => Ok(a.compare(b)),
            (Value::Double(a), Value::Double(b)) => Ok(a.compare(b)),
            (Value::ByteArray(a), Value::ByteArray(b)) => Ok(a.compare(b)),
            (Value::FixedLenByteArray(a), Value::FixedLenByteArray(b)) => Ok(a.compare(b)),
            (Value::Int96(_), Value::Int96(_)) => Err(StrataError::UnsupportedType(
                "INT96 has no defined ordering".into(),
            )),
            _ => Err(StrataError::InvalidArgument(format!(
                "cannot compare {} against {}",
                self.physical_type(),
                other.physical_type()
            ))),
        }
    }
}

/// Capability trait over the eight physical types: canonical byte image,
/// bound decode, natural ordering, and bloom hashing. Selected by
/// physical-type tag at chunk-open time.
pub trait PhysicalValue:
    Clone + std::fmt::Debug + Default + PartialEq + Send + Sync + 'static
{
    const PHYSICAL_TYPE: PhysicalType;

    /// Append the canonical little-endian byte image.
    fn append_value_bytes(&self, buf: &mut Vec<u8>);

    /// Decode a value from its canonical byte image (a ColumnIndex bound).
    fn from_value_bytes(bytes: &[u8]) -> Result<Self>;

    /// Natural ordering for this type.
    fn compare(&self, other: &Self) -> Ordering;

    fn into_value(self) -> Value;

    /// Extract a typed value from the tagged variant, if the tag matches.
    fn from_value(value: &Value) -> Option<Self>;

    /// Size contribution of one value to an encoded page, used for page-size
    /// estimation (variable-length types add their own payload).
    fn encoded_size_hint(&self) -> usize;

    /// xxhash64 of the canonical byte image, the fingerprint fed to bloom
    /// filters.
    fn bloom_hash(&self) -> u64 {
        let mut buf = Vec::with_capacity(12);
        self.append_value_bytes(&mut buf);
        xxh64(&buf, BLOOM_HASH_SEED)
    }
}

fn bound_err(t: PhysicalType, got: usize) -> StrataError {
    StrataError::CorruptIndex(format!("{} bound has unexpected length {}", t, got))
}

impl PhysicalValue for bool {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Boolean;

    fn append_value_bytes(&self, buf: &mut Vec<u8>) {
        buf.push(*self as u8);
    }

    fn from_value_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [b] => Ok(*b != 0),
            _ => Err(bound_err(Self::PHYSICAL_TYPE, bytes.len())),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn encoded_size_hint(&self) -> usize {
        1
    }
}

impl PhysicalValue for i32 {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Int32;

    fn append_value_bytes(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn from_value_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| bound_err(Self::PHYSICAL_TYPE, bytes.len()))?;
        Ok(i32::from_le_bytes(arr))
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn into_value(self) -> Value {
        Value::Int32(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int32(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn encoded_size_hint(&self) -> usize {
        4
    }
}

impl PhysicalValue for i64 {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Int64;

    fn append_value_bytes(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn from_value_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| bound_err(Self::PHYSICAL_TYPE, bytes.len()))?;
        Ok(i64::from_le_bytes(arr))
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn into_value(self) -> Value {
        Value::Int64(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int64(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn encoded_size_hint(&self) -> usize {
        8
    }
}

impl PhysicalValue for Int96 {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Int96;

    fn append_value_bytes(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn from_value_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 12] = bytes
            .try_into()
            .map_err(|_| bound_err(Self::PHYSICAL_TYPE, bytes.len()))?;
        Ok(Int96::from_le_bytes(&arr))
    }

    // Ordering over the raw words keeps writer-side statistics well-defined,
    // but predicates on INT96 are rejected before they ever compare bounds.
    fn compare(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }

    fn into_value(self) -> Value {
        Value::Int96(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int96(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn encoded_size_hint(&self) -> usize {
        12
    }
}

impl PhysicalValue for f32 {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Float;

    fn append_value_bytes(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn from_value_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| bound_err(Self::PHYSICAL_TYPE, bytes.len()))?;
        Ok(f32::from_le_bytes(arr))
    }

    // Total order: -NaN < -inf < ... < -0 < +0 < ... < +inf < NaN.
    // Equality is bitwise identity, never float `==`.
    fn compare(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn encoded_size_hint(&self) -> usize {
        4
    }
}

impl PhysicalValue for f64 {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Double;

    fn append_value_bytes(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn from_value_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| bound_err(Self::PHYSICAL_TYPE, bytes.len()))?;
        Ok(f64::from_le_bytes(arr))
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn encoded_size_hint(&self) -> usize {
        8
    }
}

impl PhysicalValue for ByteArray {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::ByteArray;

    fn append_value_bytes(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0);
    }

    fn from_value_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(ByteArray(bytes.to_vec()))
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }

    fn into_value(self) -> Value {
        Value::ByteArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::ByteArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn encoded_size_hint(&self) -> usize {
        4 + self.0.len()
    }
}

impl PhysicalValue for FixedLenByteArray {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::FixedLenByteArray;

    fn append_value_bytes(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0);
    }

    fn from_value_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(FixedLenByteArray(bytes.to_vec()))
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }

    fn into_value(self) -> Value {
        Value::FixedLenByteArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::FixedLenByteArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn encoded_size_hint(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_type_round_trips_through_u8() {
        for t in [
            PhysicalType::Boolean,
            PhysicalType::Int32,
            PhysicalType::Int64,
            PhysicalType::Int96,
            PhysicalType::Float,
            PhysicalType::Double,
            PhysicalType::ByteArray,
            PhysicalType::FixedLenByteArray,
        ] {
            assert_eq!(PhysicalType::from_u8(t as u8), Some(t));
        }
        assert_eq!(PhysicalType::from_u8(200), None);
    }

    #[test]
    fn float_total_order_puts_nan_after_infinity() {
        assert_eq!(f64::INFINITY.compare(&f64::NAN), Ordering::Less);
        assert_eq!((-0.0f64).compare(&0.0f64), Ordering::Less);
        assert_eq!(1.5f32.compare(&1.5f32), Ordering::Equal);
    }

    #[test]
    fn bounds_round_trip_via_value_bytes() {
        let v = 0x1234_5678_9abc_def0_i64;
        let mut buf = Vec::new();
        v.append_value_bytes(&mut buf);
        assert_eq!(i64::from_value_bytes(&buf).unwrap(), v);

        let ba = ByteArray::from("parquet017");
        let mut buf = Vec::new();
        ba.append_value_bytes(&mut buf);
        assert_eq!(ByteArray::from_value_bytes(&buf).unwrap(), ba);
    }

    #[test]
    fn bound_with_wrong_width_is_corrupt() {
        assert!(matches!(
            i32::from_value_bytes(&[1, 2, 3]),
            Err(StrataError::CorruptIndex(_))
        ));
    }

    #[test]
    fn bloom_hash_uses_bit_image() {
        // -0.0 and +0.0 differ bitwise, so their fingerprints differ too.
        assert_ne!((-0.0f64).bloom_hash(), 0.0f64.bloom_hash());
        assert_eq!(7i32.bloom_hash(), 7i32.bloom_hash());
    }
}
