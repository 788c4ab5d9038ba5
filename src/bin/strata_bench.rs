//! Benchmark and query harness.
//!
//! Usage:
//! ```text
//! strata-bench <file>                      scan everything, print completion
//! strata-bench <file> <num_rows>           5 rounds x 1000 randomized point
//!                                          queries per column, averages per
//!                                          configuration
//! strata-bench <file> <col> <predicate>    single equality query
//! strata-bench <file> <col> <min> <max>    one GT and one LT range query
//! ```
//!
//! Exit code 0 on success, -1 on any read error. Benchmark averages are also
//! appended as JSON lines next to the input file.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::time::Instant;

use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use strata::column::reader::TypedReaderAccess;
use strata::encoding::PlainCodec;
use strata::evaluate::{AtomicScanMetrics, CompareOp, IndexToggles, Predicate};
use strata::row_group::RowGroupReader;
use strata::types::{ByteArray, FixedLenByteArray, PhysicalType, PhysicalValue, Value};
use strata::{scan_file_contents, FileReader, Result, StrataError};

#[derive(Parser, Debug)]
#[command(name = "strata-bench", version, about = "strata columnar file benchmark harness")]
struct Cli {
    /// Input file.
    file: PathBuf,

    /// `[num_rows]`, `[col predicate]`, or `[col min max]`.
    #[arg(trailing_var_arg = true)]
    rest: Vec<String>,

    /// Memory-map the file instead of buffered ranged reads.
    #[arg(long)]
    mmap: bool,
}

const NUM_QUERIES: usize = 1000;
const NUM_RUNS: usize = 5;

/// One benchmark configuration of the per-query toggles.
#[derive(Clone, Copy)]
struct Config {
    name: &'static str,
    with_index: bool,
    toggles: IndexToggles,
}

const CONFIGS: [Config; 5] = [
    Config {
        name: "no_index",
        with_index: false,
        toggles: IndexToggles {
            use_binary_search: false,
            use_chunk_bloom: false,
            use_page_bloom: false,
        },
    },
    Config {
        name: "index",
        with_index: true,
        toggles: IndexToggles {
            use_binary_search: false,
            use_chunk_bloom: false,
            use_page_bloom: false,
        },
    },
    Config {
        name: "index_binary",
        with_index: true,
        toggles: IndexToggles {
            use_binary_search: true,
            use_chunk_bloom: false,
            use_page_bloom: false,
        },
    },
    Config {
        name: "index_binary_bloom",
        with_index: true,
        toggles: IndexToggles {
            use_binary_search: true,
            use_chunk_bloom: true,
            use_page_bloom: false,
        },
    },
    Config {
        name: "index_binary_bloom_pagebloom",
        with_index: true,
        toggles: IndexToggles {
            use_binary_search: true,
            use_chunk_bloom: true,
            use_page_bloom: true,
        },
    },
];

#[derive(Serialize)]
struct ConfigResult {
    column: usize,
    physical_type: PhysicalType,
    config: &'static str,
    queries: usize,
    avg_seconds: f64,
    avg_pages_scanned: f64,
    matches: usize,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("read error: {e}");
        std::process::exit(-1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let reader = FileReader::open_file(&cli.file, cli.mmap)?;
    match cli.rest.len() {
        0 => dump(&reader),
        1 => benchmark(&reader, &cli.file, parse_i64(&cli.rest[0])?),
        2 => {
            let col = parse_col(&reader, &cli.rest[0])?;
            point_query(&reader, col, &cli.rest[1])
        }
        3 => {
            let col = parse_col(&reader, &cli.rest[0])?;
            range_query(&reader, col, &cli.rest[1], &cli.rest[2])
        }
        n => Err(StrataError::InvalidArgument(format!(
            "expected at most 4 arguments, got {}",
            n + 1
        ))),
    }
}

fn parse_i64(s: &str) -> Result<i64> {
    s.parse()
        .map_err(|e| StrataError::InvalidArgument(format!("bad number {s:?}: {e}")))
}

fn parse_col(reader: &FileReader, s: &str) -> Result<usize> {
    let col: usize = s
        .parse()
        .map_err(|e| StrataError::InvalidArgument(format!("bad column {s:?}: {e}")))?;
    reader.metadata().schema.column(col)?;
    Ok(col)
}

fn parse_value(physical_type: PhysicalType, s: &str) -> Result<Value> {
    let bad = |e: &dyn std::fmt::Display| {
        StrataError::InvalidArgument(format!("bad {physical_type} predicate {s:?}: {e}"))
    };
    Ok(match physical_type {
        PhysicalType::Boolean => Value::Boolean(s.parse().map_err(|e| bad(&e))?),
        PhysicalType::Int32 => Value::Int32(s.parse().map_err(|e| bad(&e))?),
        PhysicalType::Int64 => Value::Int64(s.parse().map_err(|e| bad(&e))?),
        PhysicalType::Float => Value::Float(s.parse().map_err(|e| bad(&e))?),
        PhysicalType::Double => Value::Double(s.parse().map_err(|e| bad(&e))?),
        PhysicalType::ByteArray => Value::ByteArray(ByteArray::from(s)),
        PhysicalType::FixedLenByteArray => {
            Value::FixedLenByteArray(FixedLenByteArray::from(s))
        }
        PhysicalType::Int96 => {
            return Err(StrataError::UnsupportedType(
                "INT96 predicates are not supported".into(),
            ))
        }
    })
}

/// Whether a stored value satisfies the predicate; shorter byte-array probes
/// use the suffix convention.
fn value_matches<T: PhysicalValue>(stored: &T, predicate: &Predicate) -> bool {
    let Some(target) = T::from_value(&predicate.value) else {
        return false;
    };
    if matches!(predicate.op, CompareOp::Eq) {
        let stored_value = stored.clone().into_value();
        let (stored_bytes, probe_bytes) = (stored_value.value_bytes(), predicate.value.value_bytes());
        if stored_value.physical_type().is_variable_length()
            && probe_bytes.len() < stored_bytes.len()
        {
            return stored_bytes.ends_with(&probe_bytes);
        }
    }
    match predicate.op {
        CompareOp::Eq => stored.compare(&target) == std::cmp::Ordering::Equal,
        CompareOp::Lt => stored.compare(&target) == std::cmp::Ordering::Less,
        CompareOp::Gt => stored.compare(&target) == std::cmp::Ordering::Greater,
    }
}

fn query_typed<T: PlainCodec + TypedReaderAccess>(
    rg: &RowGroupReader,
    col: usize,
    predicate: &Predicate,
    with_index: bool,
    toggles: IndexToggles,
    metrics: &AtomicScanMetrics,
) -> Result<Option<(i64, T)>> {
    let plan = with_index.then_some((predicate, toggles));
    let mut cursor = rg.cursor::<T>(col, plan, metrics)?;
    cursor.find_first(|v| value_matches(v, predicate))
}

macro_rules! with_column_type {
    ($pt:expr, $ty:ident => $body:expr) => {
        match $pt {
            PhysicalType::Boolean => {
                type $ty = bool;
                $body
            }
            PhysicalType::Int32 => {
                type $ty = i32;
                $body
            }
            PhysicalType::Int64 => {
                type $ty = i64;
                $body
            }
            PhysicalType::Float => {
                type $ty = f32;
                $body
            }
            PhysicalType::Double => {
                type $ty = f64;
                $body
            }
            PhysicalType::ByteArray => {
                type $ty = ByteArray;
                $body
            }
            PhysicalType::FixedLenByteArray => {
                type $ty = FixedLenByteArray;
                $body
            }
            PhysicalType::Int96 => {
                return Err(StrataError::UnsupportedType(
                    "INT96 columns cannot be queried".into(),
                ))
            }
        }
    };
}

/// Run one predicate over every row group; report the first match.
fn run_query(
    reader: &FileReader,
    col: usize,
    predicate: &Predicate,
    with_index: bool,
    toggles: IndexToggles,
    metrics: &AtomicScanMetrics,
) -> Result<Option<(usize, i64, String)>> {
    let physical_type = reader.metadata().schema.column(col)?.physical_type;
    for rg_index in 0..reader.num_row_groups() {
        let rg = reader.row_group(rg_index)?;
        let hit = with_column_type!(physical_type, T => {
            query_typed::<T>(&rg, col, predicate, with_index, toggles, metrics)?
                .map(|(row, v)| (rg_index, row, format!("{v:?}")))
        });
        if hit.is_some() {
            return Ok(hit);
        }
    }
    Ok(None)
}

fn dump(reader: &FileReader) -> Result<()> {
    let rows = scan_file_contents(reader, &[])?;
    let md = reader.metadata();
    println!(
        "{} rows, {} row groups, {} columns",
        rows,
        md.num_row_groups(),
        md.num_columns()
    );
    for (i, col) in md.schema.columns().iter().enumerate() {
        println!("  column {}: {} {}", i, col.name, col.physical_type);
    }
    println!("Reading Complete");
    Ok(())
}

fn point_query(reader: &FileReader, col: usize, raw: &str) -> Result<()> {
    let physical_type = reader.metadata().schema.column(col)?.physical_type;
    let predicate = Predicate::eq(parse_value(physical_type, raw)?)?;
    let metrics = AtomicScanMetrics::default();
    match run_query(reader, col, &predicate, true, IndexToggles::all(), &metrics)? {
        Some((rg, row, value)) => {
            println!("with predicate row group {rg} row number: {row} {value}")
        }
        None => {
            if metrics.non_member_results.load(AtomicOrdering::Relaxed)
                == reader.num_row_groups() as u64
            {
                println!("non-member query");
            } else {
                println!("no row matched");
            }
        }
    }
    Ok(())
}

fn range_query(reader: &FileReader, col: usize, min: &str, max: &str) -> Result<()> {
    let physical_type = reader.metadata().schema.column(col)?.physical_type;
    let metrics = AtomicScanMetrics::default();
    for (raw, op, label) in [
        (min, CompareOp::Gt, "greater than"),
        (max, CompareOp::Lt, "less than"),
    ] {
        let predicate = Predicate::new(parse_value(physical_type, raw)?, op)?;
        match run_query(reader, col, &predicate, true, IndexToggles::all(), &metrics)? {
            Some((rg, row, value)) => {
                println!("{label} {raw}: first match row group {rg} row {row} {value}")
            }
            None => println!("{label} {raw}: no row matched"),
        }
    }
    Ok(())
}

fn benchmark(reader: &FileReader, file: &Path, num_rows: i64) -> Result<()> {
    if num_rows <= 0 {
        return Err(StrataError::InvalidArgument(format!(
            "num_rows must be positive, got {num_rows}"
        )));
    }
    let results_path = file.with_extension("run-results.jsonl");
    let mut results_file = std::fs::File::options()
        .create(true)
        .append(true)
        .open(&results_path)?;

    let md = reader.metadata().clone();
    println!("## running point queries: {NUM_RUNS} runs x {NUM_QUERIES} queries ##");
    for (col, descr) in md.schema.columns().iter().enumerate() {
        if matches!(
            descr.physical_type,
            PhysicalType::Int96 | PhysicalType::Boolean
        ) {
            info!("skipping column {col} ({})", descr.physical_type);
            continue;
        }
        println!(
            "column {col} ({} {})",
            descr.name, descr.physical_type
        );
        for config in CONFIGS {
            let metrics = AtomicScanMetrics::default();
            let mut rng = StdRng::seed_from_u64(0x5742_1000 + col as u64);
            let mut total_seconds = 0.0f64;
            let mut matches = 0usize;
            let mut queries = 0usize;
            for _run in 0..NUM_RUNS {
                for _q in 0..NUM_QUERIES {
                    let target = rng.gen_range(0..num_rows);
                    let predicate =
                        Predicate::eq(parse_value(descr.physical_type, &target.to_string())?)?;
                    let start = Instant::now();
                    let hit = run_query(
                        reader,
                        col,
                        &predicate,
                        config.with_index,
                        config.toggles,
                        &metrics,
                    )?;
                    total_seconds += start.elapsed().as_secs_f64();
                    queries += 1;
                    if hit.is_some() {
                        matches += 1;
                    }
                }
            }
            let result = ConfigResult {
                column: col,
                physical_type: descr.physical_type,
                config: config.name,
                queries,
                avg_seconds: total_seconds / queries as f64,
                avg_pages_scanned: metrics.pages_scanned.load(AtomicOrdering::Relaxed) as f64
                    / queries as f64,
                matches,
            };
            println!(
                "  {:<32} avg {:>12.9}s  avg pages scanned {:>8.2}  matches {}",
                result.config, result.avg_seconds, result.avg_pages_scanned, result.matches
            );
            serde_json::to_writer(&mut results_file, &result)
                .map_err(|e| StrataError::InvalidArgument(format!("results serialization: {e}")))?;
            results_file.write_all(b"\n")?;
        }
    }
    println!("results appended to {}", results_path.display());
    Ok(())
}
