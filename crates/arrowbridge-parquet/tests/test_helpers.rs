use std::path::Path;
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Int64Type;
use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use arrowbridge_core::{NativeEngine, ReaderSession};
use arrowbridge_parquet::ParquetFileEngine;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use rand::Rng;

/// id / label / score, the schema most scan tests share.
pub fn scan_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("label", DataType::Utf8, true),
        Field::new("score", DataType::Float64, true),
    ]))
}

/// `rows` consecutive ids starting at `start`, with every fifth score null.
pub fn sample_batch(schema: &SchemaRef, start: i64, rows: usize) -> RecordBatch {
    let mut rng = rand::rng();
    let ids: Vec<i64> = (start..start + rows as i64).collect();
    let labels: StringArray = ids.iter().map(|id| Some(format!("row_{id}"))).collect();
    let scores: Vec<Option<f64>> = ids
        .iter()
        .map(|id| {
            if id % 5 == 0 {
                None
            } else {
                Some(rng.random_range(0.0..1.0))
            }
        })
        .collect();
    RecordBatch::try_new(
        Arc::clone(schema),
        vec![
            Arc::new(Int64Array::from(ids)) as ArrayRef,
            Arc::new(labels),
            Arc::new(Float64Array::from(scores)),
        ],
    )
    .unwrap()
}

/// Write `total_rows` rows into `path`, split into `rows_per_group`-row
/// row groups.
pub fn write_scan_file(path: &Path, schema: &SchemaRef, total_rows: usize, rows_per_group: usize) {
    let file = std::fs::File::create(path).unwrap();
    let props = WriterProperties::builder()
        .set_max_row_group_size(rows_per_group)
        .build();
    let mut writer = ArrowWriter::try_new(file, Arc::clone(schema), Some(props)).unwrap();
    let mut written = 0usize;
    while written < total_rows {
        let rows = rows_per_group.min(total_rows - written);
        writer
            .write(&sample_batch(schema, written as i64, rows))
            .unwrap();
        written += rows;
    }
    writer.close().unwrap();
}

pub fn new_engine() -> (Arc<ParquetFileEngine>, Arc<dyn NativeEngine>) {
    let engine = Arc::new(ParquetFileEngine::new());
    let dynamic: Arc<dyn NativeEngine> = engine.clone();
    (engine, dynamic)
}

/// Drain a session, returning the id column of every batch in arrival order
/// plus the per-batch row counts.
pub fn drain_ids(session: &mut ReaderSession) -> (Vec<i64>, Vec<usize>) {
    let mut ids = Vec::new();
    let mut row_counts = Vec::new();
    while let Some(batch) = session.read_next_record_batch().unwrap() {
        row_counts.push(batch.num_rows());
        ids.extend(batch.column(0).as_primitive::<Int64Type>().values().iter().copied());
    }
    (ids, row_counts)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
