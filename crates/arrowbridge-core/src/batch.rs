//! Batch descriptions crossing the boundary, and their materialized form.

use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;

use crate::buffer::{BufferDescriptor, NativeBuffer};
use crate::engine::NativeEngine;
use crate::error::{BridgeError, Result};
use crate::layout;

/// Per-column shape metadata: the row count covered by one column's
/// validity-and-value view, and how many of those rows are null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldNode {
    length: u64,
    null_count: u64,
}

impl FieldNode {
    pub fn new(length: u64, null_count: u64) -> Self {
        FieldNode { length, null_count }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn null_count(&self) -> u64 {
        self.null_count
    }
}

/// A record batch as the engine describes it: a row count plus ordered field
/// nodes and buffer descriptors, not yet bound to memory.
///
/// Buffer order must match the column layout the schema implies; the bridge
/// has no independent way to check it and trusts the producer.
#[derive(Debug, Clone)]
pub struct BatchDescriptor {
    /// Rows in the batch. Zero is the end-of-stream sentinel.
    pub row_count: u64,
    pub nodes: Vec<FieldNode>,
    pub buffers: Vec<BufferDescriptor>,
}

impl BatchDescriptor {
    pub fn new(row_count: u64) -> Self {
        BatchDescriptor {
            row_count,
            nodes: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// The sentinel an engine returns once a session is exhausted.
    pub fn end_of_stream() -> Self {
        BatchDescriptor::new(0)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.row_count == 0
    }

    pub fn with_node(mut self, node: FieldNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_buffer(mut self, buffer: BufferDescriptor) -> Self {
        self.buffers.push(buffer);
        self
    }
}

/// A materialized batch: native-owned buffers viewed without copying.
#[derive(Debug)]
pub struct Batch {
    row_count: usize,
    nodes: Vec<FieldNode>,
    buffers: Vec<NativeBuffer>,
}

impl Batch {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn nodes(&self) -> &[FieldNode] {
        &self.nodes
    }

    pub fn buffers(&self) -> &[NativeBuffer] {
        &self.buffers
    }

    /// Raw addresses of every buffer, in layout order.
    pub fn buffer_addresses(&self) -> Vec<u64> {
        self.buffers.iter().map(NativeBuffer::address).collect()
    }

    /// Byte sizes of every buffer, in the same order as
    /// [`Batch::buffer_addresses`].
    pub fn buffer_sizes(&self) -> Vec<u64> {
        self.buffers.iter().map(|b| b.len() as u64).collect()
    }

    /// One more owner of every buffer in the batch. Handing a batch to a
    /// second consumer without this is outside the protocol.
    pub fn retain(&self) -> Batch {
        Batch {
            row_count: self.row_count,
            nodes: self.nodes.clone(),
            buffers: self.buffers.iter().map(NativeBuffer::retain).collect(),
        }
    }

    /// Load the batch into the managed container, zero-copy.
    ///
    /// `schema` must be the session schema the batch was produced under; the
    /// buffers are interpreted through its column layout.
    pub fn to_record_batch(&self, schema: &SchemaRef) -> Result<RecordBatch> {
        let buffers = self
            .buffers
            .iter()
            .map(|b| b.retain().into_arrow())
            .collect();
        layout::assemble_record_batch(schema, self.row_count, buffers, Some(&self.nodes))
    }
}

/// Turns engine-produced descriptors into consumable batches.
pub struct BatchMaterializer {
    engine: Arc<dyn NativeEngine>,
}

impl BatchMaterializer {
    pub fn new(engine: Arc<dyn NativeEngine>) -> Self {
        BatchMaterializer { engine }
    }

    /// Bind a descriptor to memory.
    ///
    /// Returns `None` for the end-of-stream sentinel, whatever else the
    /// descriptor carries. Buffer contents are never copied, only wrapped.
    pub fn materialize(&self, descriptor: BatchDescriptor) -> Result<Option<Batch>> {
        let BatchDescriptor {
            row_count,
            nodes,
            buffers,
        } = descriptor;

        if row_count == 0 {
            // Nothing to materialize; hand any attached allocations straight
            // back to the engine.
            self.release_all(buffers);
            return Ok(None);
        }

        if buffers.len() < nodes.len() || (nodes.is_empty() && !buffers.is_empty()) {
            let message = format!(
                "{} field nodes but {} buffers",
                nodes.len(),
                buffers.len()
            );
            self.release_all(buffers);
            return Err(BridgeError::malformed_batch(message));
        }

        let buffers = buffers
            .into_iter()
            .map(|descriptor| NativeBuffer::wrap(descriptor, Arc::clone(&self.engine)))
            .collect();

        Ok(Some(Batch {
            row_count: row_count as usize,
            nodes,
            buffers,
        }))
    }

    fn release_all(&self, buffers: Vec<BufferDescriptor>) {
        for descriptor in buffers {
            drop(NativeBuffer::wrap(descriptor, Arc::clone(&self.engine)));
        }
    }
}
