//! The per-column buffer layout both sides of the boundary agree on.
//!
//! Per column, in schema order: fixed-width primitives and booleans travel
//! as `[validity, values]`, variable-length columns as `[validity, offsets,
//! values]`. An absent validity bitmap travels as an empty buffer. Both the
//! batch loader and the engine-side reassembly go through this one module,
//! so there is a single definition of what a flattened batch looks like.

use std::sync::Arc;

use arrow_array::{make_array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_buffer::{bit_util, BooleanBuffer, Buffer, NullBuffer};
use arrow_data::ArrayData;
use arrow_schema::{DataType, SchemaRef};

use crate::batch::FieldNode;
use crate::error::{BridgeError, Result};

/// Number of buffers one column of `data_type` contributes, validity
/// included.
pub fn buffers_per_column(data_type: &DataType) -> Result<usize> {
    match data_type {
        DataType::Boolean => Ok(2),
        DataType::Utf8 | DataType::Binary | DataType::LargeUtf8 | DataType::LargeBinary => Ok(3),
        dt if dt.primitive_width().is_some() => Ok(2),
        other => Err(BridgeError::unsupported(format!(
            "no boundary layout for column type {other}"
        ))),
    }
}

/// Decompose a record batch into the flat buffer sequence of the layout.
///
/// The returned buffers are reference-counted views into the batch's own
/// memory; nothing is copied.
pub fn flatten_record_batch(batch: &RecordBatch) -> Result<Vec<Buffer>> {
    let schema = batch.schema();
    let mut flat = Vec::new();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let expected = buffers_per_column(field.data_type())?;
        let data = column.to_data();
        if data.offset() != 0 {
            return Err(BridgeError::invalid_argument(format!(
                "sliced column '{}' cannot cross the boundary",
                field.name()
            )));
        }
        if !data.child_data().is_empty() {
            return Err(BridgeError::unsupported(format!(
                "nested column '{}' cannot cross the boundary",
                field.name()
            )));
        }
        let validity = match data.nulls() {
            Some(nulls) => nulls.inner().inner().clone(),
            None => Buffer::from_vec(Vec::<u8>::new()),
        };
        flat.push(validity);
        debug_assert_eq!(data.buffers().len(), expected - 1);
        flat.extend(data.buffers().iter().cloned());
    }
    Ok(flat)
}

/// Rebuild typed columns from the flat buffer sequence.
///
/// `nodes`, when given, supplies per-column null counts straight from the
/// producer; otherwise null counts are recounted from the validity bitmaps.
pub fn assemble_record_batch(
    schema: &SchemaRef,
    row_count: usize,
    buffers: Vec<Buffer>,
    nodes: Option<&[FieldNode]>,
) -> Result<RecordBatch> {
    if let Some(nodes) = nodes {
        if nodes.len() != schema.fields().len() {
            return Err(BridgeError::malformed_batch(format!(
                "{} field nodes for a {}-column schema",
                nodes.len(),
                schema.fields().len()
            )));
        }
    }

    let mut remaining = buffers.into_iter();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for (index, field) in schema.fields().iter().enumerate() {
        let expected = buffers_per_column(field.data_type())?;
        let validity = remaining
            .next()
            .ok_or_else(|| exhausted_at(field.name()))?;
        let mut data_buffers = Vec::with_capacity(expected - 1);
        for _ in 1..expected {
            data_buffers.push(remaining.next().ok_or_else(|| exhausted_at(field.name()))?);
        }

        let nulls = if validity.is_empty() {
            None
        } else {
            if validity.len() < bit_util::ceil(row_count, 8) {
                return Err(BridgeError::malformed_batch(format!(
                    "validity bitmap for column '{}' covers fewer than {row_count} rows",
                    field.name()
                )));
            }
            let bits = BooleanBuffer::new(validity, 0, row_count);
            Some(match nodes.map(|n| n[index].null_count() as usize) {
                // The producer already counted; the bitmap is not rescanned.
                Some(count) => unsafe { NullBuffer::new_unchecked(bits, count) },
                None => NullBuffer::new(bits),
            })
        };

        let mut builder = ArrayData::builder(field.data_type().clone())
            .len(row_count)
            .nulls(nulls);
        for buffer in data_buffers {
            builder = builder.add_buffer(buffer);
        }
        columns.push(make_array(builder.build()?));
    }

    if remaining.next().is_some() {
        return Err(BridgeError::malformed_batch(
            "more buffers than the schema layout consumes",
        ));
    }

    let options = RecordBatchOptions::new().with_row_count(Some(row_count));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        columns,
        &options,
    )?)
}

fn exhausted_at(field: &str) -> BridgeError {
    BridgeError::malformed_batch(format!("buffer sequence exhausted at column '{field}'"))
}
