//! Page-skipping predicate evaluation.
//!
//! Given a chunk's ColumnIndex, OffsetIndex, and bloom filters, compute the
//! candidate pages for a point or range predicate and the row offset at which
//! decoding should resume. A provable miss is the [`SkipOutcome::NonMember`]
//! sentinel, a normal result distinct from "no row matched after scan".
//!
//! Stage order: chunk-bloom prefilter (EQ), sortedness classification,
//! candidate selection (binary search on sorted chunks, interval
//! intersection otherwise), per-page bloom refinement (EQ), row resolution.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use once_cell::sync::OnceCell;
use xxhash_rust::xxh64::xxh64;

use crate::bloom::Sbbf;
use crate::file::ChunkSource;
use crate::index::{
    decode_bound, detect_boundary_order, validate_parallel, BoundaryOrder, ColumnIndex,
    OffsetIndex,
};
use crate::types::{ByteArray, FixedLenByteArray, PhysicalType, Value, BLOOM_HASH_SEED};
use crate::{Result, StrataError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Gt,
}

/// A typed predicate `column <op> value`.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub value: Value,
    pub op: CompareOp,
}

impl Predicate {
    pub fn new(value: Value, op: CompareOp) -> Result<Self> {
        if value.physical_type() == PhysicalType::Int96 {
            return Err(StrataError::UnsupportedType(
                "INT96 has no meaningful ordering; predicates are rejected".into(),
            ));
        }
        Ok(Self { value, op })
    }

    pub fn eq(value: Value) -> Result<Self> {
        Self::new(value, CompareOp::Eq)
    }
}

/// A predicate after coercion to the chunk's physical type. `suffix` is set
/// for shorter-than-width byte-array probes; bound comparisons then align on
/// the bound's tail while the padded `cmp_value` feeds the bloom hashes.
struct NormalizedPredicate {
    cmp_value: Value,
    suffix: Option<Vec<u8>>,
}

/// Per-query feature toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexToggles {
    pub use_binary_search: bool,
    pub use_chunk_bloom: bool,
    pub use_page_bloom: bool,
}

impl IndexToggles {
    pub fn all() -> Self {
        Self {
            use_binary_search: true,
            use_chunk_bloom: true,
            use_page_bloom: true,
        }
    }
}

/// Observability sink the evaluator reports into.
pub trait ScanMetrics: Send + Sync {
    fn pages_scanned(&self, _n: u64) {}
    fn candidate_pages(&self, _n: u64) {}
    fn non_member(&self) {}
    fn bloom_rejections(&self, _n: u64) {}
}

/// Sink that drops everything.
pub struct NoopMetrics;

impl ScanMetrics for NoopMetrics {}

/// Counter-based sink safe to share across queries.
#[derive(Default)]
pub struct AtomicScanMetrics {
    pub pages_scanned: AtomicU64,
    pub candidate_pages: AtomicU64,
    pub non_member_results: AtomicU64,
    pub bloom_rejections: AtomicU64,
}

impl ScanMetrics for AtomicScanMetrics {
    fn pages_scanned(&self, n: u64) {
        self.pages_scanned.fetch_add(n, AtomicOrdering::Relaxed);
    }

    fn candidate_pages(&self, n: u64) {
        self.candidate_pages.fetch_add(n, AtomicOrdering::Relaxed);
    }

    fn non_member(&self) {
        self.non_member_results.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn bloom_rejections(&self, n: u64) {
        self.bloom_rejections.fetch_add(n, AtomicOrdering::Relaxed);
    }
}

/// A surviving page and the row offset decoding resumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePage {
    pub page_index: usize,
    pub first_row_index: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipOutcome {
    /// The predicate provably matches no page in this chunk.
    NonMember,
    /// Pages that may contain a match, ordered by page index, plus the
    /// number of index entries inspected.
    Candidates {
        pages: Vec<CandidatePage>,
        scanned: i64,
    },
}

impl SkipOutcome {
    pub fn is_non_member(&self) -> bool {
        matches!(self, SkipOutcome::NonMember)
    }
}

pub struct PageSkipEvaluator<'a> {
    physical_type: PhysicalType,
    /// FIXED_LEN_BYTE_ARRAY width; 0 for every other type.
    type_length: usize,
    column_index: &'a ColumnIndex,
    offset_index: &'a OffsetIndex,
    chunk_bloom: Option<&'a Sbbf>,
    /// Source for lazily loading per-page bloom filters.
    page_bloom_source: Option<&'a dyn ChunkSource>,
    boundary_cache: &'a OnceCell<BoundaryOrder>,
    metrics: &'a dyn ScanMetrics,
}

impl<'a> PageSkipEvaluator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        physical_type: PhysicalType,
        type_length: usize,
        column_index: &'a ColumnIndex,
        offset_index: &'a OffsetIndex,
        chunk_bloom: Option<&'a Sbbf>,
        page_bloom_source: Option<&'a dyn ChunkSource>,
        boundary_cache: &'a OnceCell<BoundaryOrder>,
        metrics: &'a dyn ScanMetrics,
    ) -> Self {
        Self {
            physical_type,
            type_length,
            column_index,
            offset_index,
            chunk_bloom,
            page_bloom_source,
            boundary_cache,
            metrics,
        }
    }

    /// The stored width of this chunk's byte-array values, taken from the
    /// first non-null page's lower bound.
    fn stored_width(&self) -> usize {
        if self.type_length > 0 {
            return self.type_length;
        }
        self.column_index
            .min_values
            .iter()
            .enumerate()
            .find(|(i, _)| !self.column_index.null_pages[*i])
            .map(|(_, min)| min.len())
            .unwrap_or(0)
    }

    /// Coerce the caller's value to this chunk's physical type and apply the
    /// byte-array convention for shorter textual probes of numeric-padded
    /// stored values: strip leading `'0'`s, left-pad with `'0'` to the
    /// stored width (that padded image is what gets hashed), and remember
    /// the stripped digits for suffix-aligned bound comparison.
    fn normalize(&self, value: &Value) -> Result<NormalizedPredicate> {
        let bytes_form = |raw: &[u8]| -> NormalizedPredicate {
            let width = self.stored_width();
            let mut stripped = raw;
            while stripped.len() > 1 && stripped.first() == Some(&b'0') {
                stripped = &stripped[1..];
            }
            if width == 0 || raw.len() >= width {
                let v = if self.physical_type == PhysicalType::FixedLenByteArray {
                    Value::FixedLenByteArray(FixedLenByteArray(raw.to_vec()))
                } else {
                    Value::ByteArray(ByteArray(raw.to_vec()))
                };
                return NormalizedPredicate {
                    cmp_value: v,
                    suffix: None,
                };
            }
            let mut padded = vec![b'0'; width - stripped.len()];
            padded.extend_from_slice(stripped);
            let v = if self.physical_type == PhysicalType::FixedLenByteArray {
                Value::FixedLenByteArray(FixedLenByteArray(padded))
            } else {
                Value::ByteArray(ByteArray(padded))
            };
            NormalizedPredicate {
                cmp_value: v,
                suffix: Some(stripped.to_vec()),
            }
        };
        let normalized = match (self.physical_type, value) {
            (PhysicalType::ByteArray, Value::ByteArray(b)) => bytes_form(b.as_bytes()),
            (PhysicalType::FixedLenByteArray, Value::FixedLenByteArray(b)) => {
                bytes_form(b.as_bytes())
            }
            (PhysicalType::FixedLenByteArray, Value::ByteArray(b)) => bytes_form(b.as_bytes()),
            (expected, v) if v.physical_type() == expected => NormalizedPredicate {
                cmp_value: v.clone(),
                suffix: None,
            },
            (expected, v) => {
                return Err(StrataError::InvalidArgument(format!(
                    "predicate value is {}, column is {}",
                    v.physical_type(),
                    expected
                )))
            }
        };
        Ok(normalized)
    }

    fn boundary_order(&self) -> Result<BoundaryOrder> {
        if let Some(order) = self.column_index.boundary_order {
            return Ok(order);
        }
        self.boundary_cache
            .get_or_try_init(|| detect_boundary_order(self.column_index, self.physical_type))
            .copied()
    }

    fn cmp_bound(&self, bound: &[u8], pred: &NormalizedPredicate) -> Result<Ordering> {
        if let Some(digits) = &pred.suffix {
            // Suffix-aligned comparison: the probe's digits line up with the
            // numeric tail of the stored bound.
            let tail_start = bound.len().saturating_sub(digits.len());
            return Ok(bound[tail_start..].cmp(digits));
        }
        decode_bound(self.physical_type, bound)?.compare(&pred.cmp_value)
    }

    fn non_member(&self, scanned: i64) -> SkipOutcome {
        self.metrics.pages_scanned(scanned as u64);
        self.metrics.non_member();
        SkipOutcome::NonMember
    }

    pub fn evaluate(&self, predicate: &Predicate, toggles: IndexToggles) -> Result<SkipOutcome> {
        if self.physical_type == PhysicalType::Int96 {
            return Err(StrataError::UnsupportedType(
                "INT96 columns cannot be evaluated against predicates".into(),
            ));
        }
        validate_parallel(self.column_index, self.offset_index)?;

        let num_pages = self.column_index.num_pages();
        if num_pages == 0 {
            return Ok(self.non_member(0));
        }

        let pred = self.normalize(&predicate.value)?;
        let hash = xxh64(&pred.cmp_value.value_bytes(), BLOOM_HASH_SEED);

        // Stage 1: chunk-level bloom prefilter, equality only.
        if predicate.op == CompareOp::Eq && toggles.use_chunk_bloom {
            if let Some(bloom) = self.chunk_bloom {
                if !bloom.find_hash(hash) {
                    self.metrics.bloom_rejections(1);
                    return Ok(self.non_member(0));
                }
            }
        }

        // Stage 2: sortedness (cached after the first scan).
        let sorted = self.boundary_order()? == BoundaryOrder::Ascending;

        // All-null pages are never candidates for EQ/LT/GT.
        let view: Vec<usize> = (0..num_pages)
            .filter(|&i| !self.column_index.null_pages[i])
            .collect();
        if view.is_empty() {
            return Ok(self.non_member(0));
        }

        // Stage 3: candidate selection.
        let mut scanned: i64 = 0;
        let mut candidates: Vec<usize> = Vec::new();
        match (sorted, predicate.op) {
            (true, CompareOp::Eq) => {
                // Largest page whose min does not exceed the probe, located
                // by binary search or by an equivalent linear sweep; the two
                // strategies return identical candidate sets and differ only
                // in entries inspected.
                let found = if toggles.use_binary_search && view.len() >= 2 {
                    let mut lo = 0usize;
                    let mut hi = view.len() - 1;
                    let mut ans = None;
                    while lo <= hi {
                        let mid = (lo + hi) / 2;
                        scanned += 1;
                        let min = &self.column_index.min_values[view[mid]];
                        if self.cmp_bound(min, &pred)? != Ordering::Greater {
                            ans = Some(mid);
                            lo = mid + 1;
                        } else {
                            if mid == 0 {
                                break;
                            }
                            hi = mid - 1;
                        }
                    }
                    ans
                } else {
                    let mut ans = None;
                    for (vi, &page) in view.iter().enumerate() {
                        scanned += 1;
                        let min = &self.column_index.min_values[page];
                        if self.cmp_bound(min, &pred)? != Ordering::Greater {
                            ans = Some(vi);
                        } else {
                            break;
                        }
                    }
                    ans
                };
                if let Some(vi) = found {
                    let page = view[vi];
                    let max = &self.column_index.max_values[page];
                    if self.cmp_bound(max, &pred)? != Ordering::Less {
                        candidates.push(page);
                    }
                }
            }
            (true, CompareOp::Lt) => {
                // Ascending mins: the satisfying pages are a prefix.
                for &page in &view {
                    scanned += 1;
                    let min = &self.column_index.min_values[page];
                    if self.cmp_bound(min, &pred)? == Ordering::Less {
                        candidates.push(page);
                    } else {
                        break;
                    }
                }
            }
            (true, CompareOp::Gt) => {
                // Maxes carry no ordering guarantee even on sorted chunks.
                for &page in &view {
                    scanned += 1;
                    let max = &self.column_index.max_values[page];
                    if self.cmp_bound(max, &pred)? == Ordering::Greater {
                        candidates.push(page);
                    }
                }
            }
            (false, op) => {
                for &page in &view {
                    scanned += 1;
                    let min = &self.column_index.min_values[page];
                    let max = &self.column_index.max_values[page];
                    let keep = match op {
                        CompareOp::Eq => {
                            self.cmp_bound(min, &pred)? != Ordering::Greater
                                && self.cmp_bound(max, &pred)? != Ordering::Less
                        }
                        CompareOp::Lt => self.cmp_bound(min, &pred)? == Ordering::Less,
                        CompareOp::Gt => self.cmp_bound(max, &pred)? == Ordering::Greater,
                    };
                    if keep {
                        candidates.push(page);
                    }
                }
            }
        }

        // Stage 4: per-page bloom refinement, equality only.
        if predicate.op == CompareOp::Eq
            && toggles.use_page_bloom
            && !self.offset_index.page_bloom_filter_offsets.is_empty()
        {
            if let Some(source) = self.page_bloom_source {
                let mut surviving = Vec::with_capacity(candidates.len());
                let mut rejected = 0u64;
                for page in candidates {
                    let offset = self.offset_index.page_bloom_filter_offsets[page];
                    if offset > 0 {
                        let bloom = Sbbf::read_from(source, offset as u64)?;
                        if !bloom.find_hash(hash) {
                            rejected += 1;
                            continue;
                        }
                    }
                    surviving.push(page);
                }
                if rejected > 0 {
                    self.metrics.bloom_rejections(rejected);
                }
                candidates = surviving;
            }
        }

        // Stage 5: row resolution.
        if candidates.is_empty() {
            return Ok(self.non_member(scanned));
        }
        let pages: Vec<CandidatePage> = candidates
            .into_iter()
            .map(|page| CandidatePage {
                page_index: page,
                first_row_index: self.offset_index.page_locations[page].first_row_index,
            })
            .collect();
        self.metrics.pages_scanned(scanned as u64);
        self.metrics.candidate_pages(pages.len() as u64);
        Ok(SkipOutcome::Candidates { pages, scanned })
    }
}
