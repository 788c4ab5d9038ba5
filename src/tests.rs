//! End-to-end write/read/skip coverage over real files.

use std::path::Path;
use std::sync::atomic::Ordering as AtomicOrdering;

use tempfile::tempdir;

use crate::compression::Compression;
use crate::evaluate::{
    AtomicScanMetrics, CompareOp, IndexToggles, NoopMetrics, Predicate, SkipOutcome,
};
use crate::file::{scan_file_contents, FileReader, FileWriter};
use crate::index::{decode_bound, BoundaryOrder};
use crate::properties::WriterProperties;
use crate::schema::{ColumnDescriptor, Repetition, Schema};
use crate::types::{ByteArray, PhysicalType, PhysicalValue, Value};

fn int32_schema() -> Schema {
    Schema::new(vec![ColumnDescriptor::new(
        "c",
        PhysicalType::Int32,
        Repetition::Required,
    )])
    .unwrap()
}

fn write_int32_file(
    path: &Path,
    values: &[i32],
    props: WriterProperties,
    with_index: bool,
) {
    let mut writer = FileWriter::create(path, int32_schema(), props).unwrap();
    let mut rg = writer.append_row_group().unwrap();
    rg.column(0)
        .unwrap()
        .typed::<i32>()
        .unwrap()
        .write_batch(None, None, values, with_index)
        .unwrap();
    rg.close().unwrap();
    writer.close().unwrap();
}

#[test]
fn s1_point_query_hits_single_candidate_page() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1.strata");
    let values: Vec<i32> = (0..20).collect();
    write_int32_file(&path, &values, WriterProperties::default(), true);

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    let predicate = Predicate::eq(Value::Int32(7)).unwrap();

    let outcome = rg
        .evaluate_predicate(0, &predicate, IndexToggles::all(), &NoopMetrics)
        .unwrap()
        .unwrap();
    match &outcome {
        SkipOutcome::Candidates { pages, .. } => {
            assert_eq!(pages.len(), 1);
            assert_eq!(pages[0].first_row_index, 0);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let mut cursor = rg
        .cursor::<i32>(0, Some((&predicate, IndexToggles::all())), &NoopMetrics)
        .unwrap();
    let (row, value) = cursor.find_first(|v| *v == 7).unwrap().unwrap();
    assert_eq!((row, value), (7, 7));
}

#[test]
fn s2_absent_value_is_non_member_with_zero_pages_scanned() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s2.strata");
    let values: Vec<i32> = (0..20).collect();
    write_int32_file(&path, &values, WriterProperties::default(), true);

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    let metrics = AtomicScanMetrics::default();
    let outcome = rg
        .evaluate_predicate(
            0,
            &Predicate::eq(Value::Int32(42)).unwrap(),
            IndexToggles::all(),
            &metrics,
        )
        .unwrap()
        .unwrap();
    assert_eq!(outcome, SkipOutcome::NonMember);
    // The chunk bloom rejects before any index entry is inspected.
    assert_eq!(metrics.pages_scanned.load(AtomicOrdering::Relaxed), 0);

    let mut cursor = rg
        .cursor::<i32>(
            0,
            Some((&Predicate::eq(Value::Int32(42)).unwrap(), IndexToggles::all())),
            &NoopMetrics,
        )
        .unwrap();
    assert!(cursor.is_non_member());
    assert!(cursor.next().unwrap().is_none());
}

#[test]
fn s3_byte_array_suffix_query_matches_row_17() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s3.strata");
    let schema = Schema::new(vec![ColumnDescriptor::new(
        "ba",
        PhysicalType::ByteArray,
        Repetition::Required,
    )])
    .unwrap();
    let values: Vec<ByteArray> = (0..20)
        .map(|i| ByteArray::from(format!("parquet{i:03}").as_str()))
        .collect();
    let mut writer =
        FileWriter::create(&path, schema, WriterProperties::default()).unwrap();
    let mut rg = writer.append_row_group().unwrap();
    rg.column(0)
        .unwrap()
        .typed::<ByteArray>()
        .unwrap()
        .write_batch(None, None, &values, true)
        .unwrap();
    rg.close().unwrap();
    writer.close().unwrap();

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    let predicate = Predicate::eq(Value::ByteArray(ByteArray::from("017"))).unwrap();
    let toggles = IndexToggles {
        use_binary_search: true,
        ..Default::default()
    };
    let mut cursor = rg
        .cursor::<ByteArray>(0, Some((&predicate, toggles)), &NoopMetrics)
        .unwrap();
    // Scan convention for shorter textual probes: match on the suffix.
    let (row, value) = cursor
        .find_first(|v| v.as_bytes().ends_with(b"017"))
        .unwrap()
        .unwrap();
    assert_eq!(row, 17);
    assert_eq!(value, ByteArray::from("parquet017"));
}

#[test]
fn s4_sorted_million_row_chunk_binary_search_is_logarithmic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s4.strata");
    let values: Vec<i32> = (0..1_000_000).collect();
    let props = WriterProperties::builder()
        .data_pagesize(16 * 1024)
        .page_bloom_enabled(false)
        .build();
    write_int32_file(&path, &values, props, true);

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    let indexes = rg.page_indexes(0).unwrap().unwrap();
    let num_pages = indexes.column_index.num_pages();
    assert!(num_pages > 4, "expected many pages, got {num_pages}");
    assert_eq!(
        indexes.column_index.boundary_order,
        Some(BoundaryOrder::Ascending)
    );

    let outcome = rg
        .evaluate_predicate(
            0,
            &Predicate::eq(Value::Int32(777_777)).unwrap(),
            IndexToggles {
                use_binary_search: true,
                ..Default::default()
            },
            &NoopMetrics,
        )
        .unwrap()
        .unwrap();
    match outcome {
        SkipOutcome::Candidates { pages, scanned } => {
            assert_eq!(pages.len(), 1);
            let bound = (num_pages as f64).log2().ceil() as i64 + 1;
            assert!(
                scanned <= bound,
                "binary search touched {scanned} entries, bound {bound}"
            );
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn s5_range_query_returns_tail_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s5.strata");
    let values: Vec<i32> = (0..20).collect();
    write_int32_file(&path, &values, WriterProperties::default(), true);

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    let predicate = Predicate::new(Value::Int32(15), CompareOp::Gt).unwrap();
    let outcome = rg
        .evaluate_predicate(0, &predicate, IndexToggles::default(), &NoopMetrics)
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, SkipOutcome::Candidates { .. }));

    let mut cursor = rg
        .cursor::<i32>(0, Some((&predicate, IndexToggles::default())), &NoopMetrics)
        .unwrap();
    let mut matched = Vec::new();
    while let Some((row, value)) = cursor.next().unwrap() {
        if let Some(v) = value {
            if v > 15 {
                matched.push((row, v));
            }
        }
    }
    assert_eq!(matched, vec![(16, 16), (17, 17), (18, 18), (19, 19)]);
}

#[test]
fn s6_alternating_nulls_reflected_in_null_counts_and_bounds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s6.strata");
    let schema = Schema::new(vec![ColumnDescriptor::new(
        "c",
        PhysicalType::Int64,
        Repetition::Optional,
    )])
    .unwrap();
    let total_rows = 400usize;
    let def_levels: Vec<i16> = (0..total_rows).map(|i| (i % 2 == 0) as i16).collect();
    let values: Vec<i64> = (0..total_rows as i64).filter(|i| i % 2 == 0).collect();

    // Small pages (and a small mini-batch so the size check fires often
    // enough) so several ColumnIndex entries exist.
    let props = WriterProperties::builder()
        .data_pagesize(256)
        .write_batch_size(32)
        .build();
    let mut writer = FileWriter::create(&path, schema, props).unwrap();
    let mut rg = writer.append_row_group().unwrap();
    rg.column(0)
        .unwrap()
        .typed::<i64>()
        .unwrap()
        .write_batch(Some(&def_levels), None, &values, true)
        .unwrap();
    rg.close().unwrap();
    writer.close().unwrap();

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    let indexes = rg.page_indexes(0).unwrap().unwrap();
    let ci = &indexes.column_index;
    assert!(ci.num_pages() > 1);

    let locations = &indexes.offset_index.page_locations;
    for (i, null_count) in ci.null_counts.iter().enumerate() {
        let page_rows = locations
            .get(i + 1)
            .map(|l| l.first_row_index)
            .unwrap_or(total_rows as i64)
            - locations[i].first_row_index;
        assert!(
            (null_count - page_rows / 2).abs() <= 1,
            "page {i}: {null_count} nulls out of {page_rows} rows"
        );
        assert!(!ci.null_pages[i]);
        // Bounds only reflect non-null values, which are all even.
        let min = match decode_bound(PhysicalType::Int64, &ci.min_values[i]).unwrap() {
            Value::Int64(v) => v,
            other => panic!("unexpected bound {other:?}"),
        };
        let max = match decode_bound(PhysicalType::Int64, &ci.max_values[i]).unwrap() {
            Value::Int64(v) => v,
            other => panic!("unexpected bound {other:?}"),
        };
        assert_eq!(min % 2, 0);
        assert_eq!(max % 2, 0);
        assert!(min <= max);
    }

    // Round trip preserves null positions.
    let mut cursor = rg.cursor::<i64>(0, None, &NoopMetrics).unwrap();
    let mut seen = 0usize;
    while let Some((row, value)) = cursor.next().unwrap() {
        if row % 2 == 0 {
            assert_eq!(value, Some(row));
        } else {
            assert_eq!(value, None);
        }
        seen += 1;
    }
    assert_eq!(seen, total_rows);
}

#[test]
fn invariants_hold_across_a_multi_page_chunk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("inv.strata");
    let values: Vec<i32> = (0..5000).map(|i| i * 3).collect();
    let props = WriterProperties::builder().data_pagesize(512).build();
    write_int32_file(&path, &values, props, true);

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    let indexes = rg.page_indexes(0).unwrap().unwrap();
    let ci = &indexes.column_index;
    let oi = &indexes.offset_index;

    // I1: parallel lengths.
    let n = ci.num_pages();
    assert_eq!(ci.min_values.len(), n);
    assert_eq!(ci.max_values.len(), n);
    assert_eq!(ci.null_counts.len(), n);
    assert_eq!(oi.page_locations.len(), n);
    assert_eq!(oi.page_bloom_filter_offsets.len(), n);

    // I3: strictly monotone first_row_index starting at zero.
    assert_eq!(oi.page_locations[0].first_row_index, 0);
    for pair in oi.page_locations.windows(2) {
        assert!(pair[0].first_row_index < pair[1].first_row_index);
    }

    // I2: every value sits inside its page's bounds.
    let mut cursor = rg.cursor::<i32>(0, None, &NoopMetrics).unwrap();
    let mut page = 0usize;
    while let Some((row, value)) = cursor.next().unwrap() {
        while page + 1 < n && row >= oi.page_locations[page + 1].first_row_index {
            page += 1;
        }
        let v = value.unwrap();
        let min = i32::from_value_bytes(&ci.min_values[page]).unwrap();
        let max = i32::from_value_bytes(&ci.max_values[page]).unwrap();
        assert!(min <= v && v <= max, "row {row} value {v} outside [{min}, {max}]");
    }

    // I4: the chunk bloom has no false negatives.
    let bloom = indexes.chunk_bloom.as_ref().unwrap();
    for v in &values {
        assert!(bloom.find(v), "bloom lost {v}");
    }

    // I6: NonMember is sound against brute force; I7: binary == linear.
    for probe in [-3, 0, 1, 2, 3000, 7497, 7498, 14997, 15000, 99999] {
        let predicate = Predicate::eq(Value::Int32(probe)).unwrap();
        let binary = rg
            .evaluate_predicate(
                0,
                &predicate,
                IndexToggles {
                    use_binary_search: true,
                    ..Default::default()
                },
                &NoopMetrics,
            )
            .unwrap()
            .unwrap();
        let linear = rg
            .evaluate_predicate(0, &predicate, IndexToggles::default(), &NoopMetrics)
            .unwrap()
            .unwrap();
        let pages_of = |o: &SkipOutcome| match o {
            SkipOutcome::NonMember => Vec::new(),
            SkipOutcome::Candidates { pages, .. } => {
                pages.iter().map(|c| c.page_index).collect::<Vec<_>>()
            }
        };
        assert_eq!(pages_of(&binary), pages_of(&linear), "probe {probe}");
        if binary.is_non_member() {
            assert!(
                !values.contains(&probe),
                "NonMember for present value {probe}"
            );
        }
    }
}

#[test]
fn row_group_rollover_splits_and_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("roll.strata");
    let props = WriterProperties::builder()
        .data_pagesize(1024)
        .page_bloom_enabled(false)
        .build();
    let mut writer = FileWriter::create(&path, int32_schema(), props).unwrap();

    let target: i64 = 16 * 1024;
    let all: Vec<i32> = (0..40_000).collect();
    let mut rg = writer.append_row_group().unwrap();
    for chunk in all.chunks(500) {
        if rg.should_roll_over(target) {
            rg.close().unwrap();
            rg = writer.append_row_group().unwrap();
        }
        rg.column(0)
            .unwrap()
            .typed::<i32>()
            .unwrap()
            .write_batch(None, None, chunk, true)
            .unwrap();
    }
    rg.close().unwrap();
    let metadata = writer.close().unwrap();
    assert!(metadata.num_row_groups() > 1);
    assert_eq!(metadata.num_rows, 40_000);

    let reader = FileReader::open_file(&path, false).unwrap();
    assert_eq!(scan_file_contents(&reader, &[]).unwrap(), 40_000);

    // I5: values come back in row order across groups.
    let mut restored = Vec::with_capacity(all.len());
    for rg_index in 0..reader.num_row_groups() {
        let rg = reader.row_group(rg_index).unwrap();
        let mut cursor = rg.cursor::<i32>(0, None, &NoopMetrics).unwrap();
        while let Some((_, value)) = cursor.next().unwrap() {
            restored.push(value.unwrap());
        }
    }
    assert_eq!(restored, all);
}

#[test]
fn compressed_and_mmap_reads_round_trip() {
    for codec in [Compression::Snappy, Compression::Zstd] {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codec.strata");
        let values: Vec<i32> = (0..10_000).map(|i| i % 97).collect();
        let props = WriterProperties::builder()
            .compression(codec)
            .data_pagesize(2048)
            .build();
        write_int32_file(&path, &values, props, true);

        for memory_map in [false, true] {
            let reader = FileReader::open_file(&path, memory_map).unwrap();
            let rg = reader.row_group(0).unwrap();
            assert_eq!(
                rg.metadata().column(0).unwrap().compression,
                codec
            );
            let mut cursor = rg.cursor::<i32>(0, None, &NoopMetrics).unwrap();
            let mut restored = Vec::new();
            while let Some((_, value)) = cursor.next().unwrap() {
                restored.push(value.unwrap());
            }
            assert_eq!(restored, values, "{codec} mmap={memory_map}");
        }
    }
}

#[test]
fn dictionary_encoded_chunks_round_trip_and_skip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dict.strata");
    let schema = Schema::new(vec![ColumnDescriptor::new(
        "tag",
        PhysicalType::ByteArray,
        Repetition::Required,
    )])
    .unwrap();
    let tags = ["alpha", "beta", "gamma", "delta"];
    let values: Vec<ByteArray> = (0..4000)
        .map(|i| ByteArray::from(tags[i % tags.len()]))
        .collect();
    let props = WriterProperties::builder()
        .dictionary_enabled(true)
        .data_pagesize(1024)
        .build();
    let mut writer = FileWriter::create(&path, schema, props).unwrap();
    let mut rg = writer.append_row_group().unwrap();
    rg.column(0)
        .unwrap()
        .typed::<ByteArray>()
        .unwrap()
        .write_batch(None, None, &values, true)
        .unwrap();
    rg.close().unwrap();
    writer.close().unwrap();

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    assert!(rg.metadata().column(0).unwrap().has_dictionary_page());

    let mut cursor = rg.cursor::<ByteArray>(0, None, &NoopMetrics).unwrap();
    let mut restored = Vec::new();
    while let Some((_, value)) = cursor.next().unwrap() {
        restored.push(value.unwrap());
    }
    assert_eq!(restored, values);

    // Equality pushdown still works over dictionary pages, including the
    // candidate-seek path that jumps past the dictionary page itself.
    let predicate = Predicate::eq(Value::ByteArray(ByteArray::from("gamma"))).unwrap();
    let outcome = rg
        .evaluate_predicate(0, &predicate, IndexToggles::all(), &NoopMetrics)
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, SkipOutcome::Candidates { .. }));
    let mut cursor = rg
        .cursor::<ByteArray>(0, Some((&predicate, IndexToggles::all())), &NoopMetrics)
        .unwrap();
    let (row, value) = cursor
        .find_first(|v| v == &ByteArray::from("gamma"))
        .unwrap()
        .unwrap();
    assert_eq!(value, ByteArray::from("gamma"));
    assert_eq!(row % 4, 2);
    let absent = Predicate::eq(Value::ByteArray(ByteArray::from("omega"))).unwrap();
    let outcome = rg
        .evaluate_predicate(0, &absent, IndexToggles::all(), &NoopMetrics)
        .unwrap()
        .unwrap();
    assert_eq!(outcome, SkipOutcome::NonMember);
}

#[test]
fn page_bloom_refinement_drops_false_range_candidates() {
    // Two pages whose min/max ranges overlap a probe that neither page
    // actually stores: only the per-page filters can reject it.
    let dir = tempdir().unwrap();
    let path = dir.path().join("pageblf.strata");
    let mut values: Vec<i32> = (0..512).map(|i| i * 2).collect();
    values.extend(1024..1536);
    let props = WriterProperties::builder()
        .data_pagesize(1024)
        .write_batch_size(256)
        .bloom_enabled(true)
        .page_bloom_enabled(true)
        .bloom_fpp(0.0001)
        .build();
    write_int32_file(&path, &values, props, true);

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    // 501 is odd: inside page 0's [0, 1022] range but never written.
    let predicate = Predicate::eq(Value::Int32(501)).unwrap();
    let metrics = AtomicScanMetrics::default();
    let outcome = rg
        .evaluate_predicate(
            0,
            &predicate,
            IndexToggles {
                use_binary_search: true,
                use_chunk_bloom: false,
                use_page_bloom: true,
            },
            &metrics,
        )
        .unwrap()
        .unwrap();
    assert_eq!(outcome, SkipOutcome::NonMember);
    assert!(metrics.bloom_rejections.load(AtomicOrdering::Relaxed) >= 1);
}

#[test]
fn unindexed_files_fall_back_to_linear_scan() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.strata");
    let values: Vec<i32> = (0..100).collect();
    let props = WriterProperties::builder().bloom_enabled(false).build();
    write_int32_file(&path, &values, props, false);

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    assert!(!rg.metadata().column(0).unwrap().has_page_index());
    assert!(rg.page_indexes(0).unwrap().is_none());

    let predicate = Predicate::eq(Value::Int32(55)).unwrap();
    assert!(rg
        .evaluate_predicate(0, &predicate, IndexToggles::all(), &NoopMetrics)
        .unwrap()
        .is_none());

    let mut cursor = rg
        .cursor::<i32>(0, Some((&predicate, IndexToggles::all())), &NoopMetrics)
        .unwrap();
    let (row, value) = cursor.find_first(|v| *v == 55).unwrap().unwrap();
    assert_eq!((row, value), (55, 55));
}

#[test]
fn repeated_rows_split_across_pages_survive_candidate_seek() {
    // Seven rows of three values each, forced into four-level pages: the
    // page-size trigger has no row-boundary alignment, so pages 1, 2, and 4
    // start on a row's continuation entries and the final page holds nothing
    // but the last row's trailing value. Rows must come back identical
    // through the plain scan and through the indexed candidate-seek path.
    let dir = tempdir().unwrap();
    let path = dir.path().join("repeated.strata");
    let schema = Schema::new(vec![ColumnDescriptor::new(
        "vals",
        PhysicalType::Int64,
        Repetition::Repeated,
    )])
    .unwrap();

    let num_rows = 7usize;
    let values_per_row = 3usize;
    let expected: Vec<Vec<i64>> = (0..num_rows)
        .map(|r| (0..values_per_row).map(|j| (r * 100 + j) as i64).collect())
        .collect();
    let values: Vec<i64> = expected.iter().flatten().copied().collect();
    let def_levels = vec![1i16; values.len()];
    let rep_levels: Vec<i16> = (0..values.len())
        .map(|k| (k % values_per_row != 0) as i16)
        .collect();

    let props = WriterProperties::builder()
        .data_pagesize(1)
        .write_batch_size(4)
        .build();
    let mut writer = FileWriter::create(&path, schema, props).unwrap();
    let mut rg = writer.append_row_group().unwrap();
    rg.column(0)
        .unwrap()
        .typed::<i64>()
        .unwrap()
        .write_batch(Some(&def_levels), Some(&rep_levels), &values, true)
        .unwrap();
    rg.close().unwrap();
    writer.close().unwrap();

    let reader = FileReader::open_file(&path, false).unwrap();
    let rg = reader.row_group(0).unwrap();
    assert_eq!(rg.num_rows(), num_rows as i64);

    // Four-level pages over three-value rows: first_row_index counts rows
    // *started* before each page, so the deltas (2,1,1,2,1) expose the
    // mid-row page starts, and the last page starts none at all.
    let indexes = rg.page_indexes(0).unwrap().unwrap();
    let first_rows: Vec<i64> = indexes
        .offset_index
        .page_locations
        .iter()
        .map(|loc| loc.first_row_index)
        .collect();
    assert_eq!(first_rows, vec![0, 2, 3, 4, 6, 7]);

    // Path 1: plain page stream via column().
    let mut column_reader = rg.column(0).unwrap();
    let typed = column_reader.typed::<i64>().unwrap();
    let mut def = Vec::new();
    let mut rep = Vec::new();
    let mut vals = Vec::new();
    let (levels, read) = typed
        .read_batch(10_000, Some(&mut def), Some(&mut rep), &mut vals)
        .unwrap();
    assert_eq!((levels, read), (values.len(), values.len()));
    let mut rebuilt: Vec<Vec<i64>> = Vec::new();
    for (k, &r) in rep.iter().enumerate() {
        if r == 0 {
            rebuilt.push(Vec::new());
        }
        rebuilt.last_mut().unwrap().push(vals[k]);
    }
    assert_eq!(rebuilt, expected);

    // Path 2: full cursor scan groups values under the same row indices.
    let mut by_row: Vec<Vec<i64>> = vec![Vec::new(); num_rows];
    let mut cursor = rg.cursor::<i64>(0, None, &NoopMetrics).unwrap();
    while let Some((row, value)) = cursor.next().unwrap() {
        by_row[row as usize].push(value.unwrap());
    }
    assert_eq!(by_row, expected);

    // Path 3: candidate seek lands mid-row and must still attribute the
    // continuation entries to the row that started on the previous page.
    for (probe, want_row) in [(202i64, 2i64), (300, 3), (602, 6)] {
        let predicate = Predicate::eq(Value::Int64(probe)).unwrap();
        let mut cursor = rg
            .cursor::<i64>(0, Some((&predicate, IndexToggles::all())), &NoopMetrics)
            .unwrap();
        let (row, value) = cursor.find_first(|v| *v == probe).unwrap().unwrap();
        assert_eq!((row, value), (want_row, probe), "probe {probe}");
    }
}

#[test]
fn remaining_physical_types_round_trip() {
    use crate::types::{FixedLenByteArray, Int96};

    let dir = tempdir().unwrap();
    let path = dir.path().join("types.strata");
    let schema = Schema::new(vec![
        ColumnDescriptor::new("flag", PhysicalType::Boolean, Repetition::Required),
        ColumnDescriptor::new("f", PhysicalType::Float, Repetition::Required),
        ColumnDescriptor::new("d", PhysicalType::Double, Repetition::Required),
        ColumnDescriptor::new("ts", PhysicalType::Int96, Repetition::Required),
        ColumnDescriptor::new_fixed("flba", Repetition::Required, 10),
    ])
    .unwrap();

    let n = 50usize;
    let flags: Vec<bool> = (0..n).map(|i| i % 2 == 0).collect();
    let floats: Vec<f32> = (0..n).map(|i| i as f32 * 1.1).collect();
    let doubles: Vec<f64> = (0..n).map(|i| i as f64 * 1.111_111_1).collect();
    let stamps: Vec<Int96> = (0..n)
        .map(|i| Int96::new(i as u32, i as u32 + 1, i as u32 + 2))
        .collect();
    let fixed: Vec<FixedLenByteArray> = (0..n)
        .map(|i| FixedLenByteArray(vec![i as u8; 10]))
        .collect();

    let mut writer =
        FileWriter::create(&path, schema, WriterProperties::default()).unwrap();
    let mut rg = writer.append_row_group().unwrap();
    rg.column(0)
        .unwrap()
        .typed::<bool>()
        .unwrap()
        .write_batch(None, None, &flags, true)
        .unwrap();
    rg.column(1)
        .unwrap()
        .typed::<f32>()
        .unwrap()
        .write_batch(None, None, &floats, true)
        .unwrap();
    rg.column(2)
        .unwrap()
        .typed::<f64>()
        .unwrap()
        .write_batch(None, None, &doubles, true)
        .unwrap();
    rg.column(3)
        .unwrap()
        .typed::<Int96>()
        .unwrap()
        .write_batch(None, None, &stamps, true)
        .unwrap();
    rg.column(4)
        .unwrap()
        .typed::<FixedLenByteArray>()
        .unwrap()
        .write_batch(None, None, &fixed, true)
        .unwrap();
    rg.close().unwrap();
    writer.close().unwrap();

    let reader = FileReader::open_file(&path, false).unwrap();
    assert_eq!(scan_file_contents(&reader, &[]).unwrap(), n as i64);
    let rg = reader.row_group(0).unwrap();

    let mut restored = Vec::new();
    let mut cursor = rg.cursor::<f64>(2, None, &NoopMetrics).unwrap();
    while let Some((_, value)) = cursor.next().unwrap() {
        restored.push(value.unwrap());
    }
    assert_eq!(restored, doubles);

    let mut cursor = rg.cursor::<Int96>(3, None, &NoopMetrics).unwrap();
    let (_, first) = cursor.next().unwrap().unwrap();
    assert_eq!(first, Some(Int96::new(0, 1, 2)));

    // Float pushdown matches on bit identity.
    let exact = Predicate::eq(Value::Float(floats[22])).unwrap();
    let outcome = rg
        .evaluate_predicate(1, &exact, IndexToggles::all(), &NoopMetrics)
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, SkipOutcome::Candidates { .. }));

    // Full-width fixed-length probe.
    let probe = Predicate::eq(Value::FixedLenByteArray(FixedLenByteArray(vec![7u8; 10])))
        .unwrap();
    let mut cursor = rg
        .cursor::<FixedLenByteArray>(4, Some((&probe, IndexToggles::all())), &NoopMetrics)
        .unwrap();
    let (row, value) = cursor
        .find_first(|v| v.as_bytes() == [7u8; 10])
        .unwrap()
        .unwrap();
    assert_eq!(row, 7);
    assert_eq!(value.as_bytes(), &[7u8; 10]);

    // Predicates on the INT96 column are rejected outright.
    let int96_pred = Predicate::eq(Value::Int64(5)).unwrap();
    assert!(rg
        .evaluate_predicate(3, &int96_pred, IndexToggles::all(), &NoopMetrics)
        .is_err());
}

#[test]
fn footer_probe_handles_oversized_metadata() {
    // Many row groups inflate the metadata past a tiny probe window.
    let dir = tempdir().unwrap();
    let path = dir.path().join("bigmeta.strata");
    let props = WriterProperties::builder()
        .bloom_enabled(false)
        .page_bloom_enabled(false)
        .build();
    let mut writer = FileWriter::create(&path, int32_schema(), props).unwrap();
    for start in 0..64 {
        let mut rg = writer.append_row_group().unwrap();
        let values: Vec<i32> = (start * 10..start * 10 + 10).collect();
        rg.column(0)
            .unwrap()
            .typed::<i32>()
            .unwrap()
            .write_batch(None, None, &values, true)
            .unwrap();
        rg.close().unwrap();
    }
    writer.close().unwrap();

    let props = crate::properties::ReaderProperties {
        footer_read_size: 64,
        ..Default::default()
    };
    let reader = FileReader::open_file_with_props(&path, false, props).unwrap();
    assert_eq!(reader.metadata().num_row_groups(), 64);
    assert_eq!(scan_file_contents(&reader, &[]).unwrap(), 640);
}
