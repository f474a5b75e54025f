//! Session and batch-exchange protocol between an arrow-rs managed side and
//! a native columnar file engine.
//!
//! `arrowbridge-core` defines how batches of columnar data produced by a
//! native engine are described, handed over without copying, and released
//! safely, and how read and write requests are expressed across that
//! boundary. The engine itself is a collaborator behind the
//! [`engine::NativeEngine`] trait; `arrowbridge-parquet` provides an
//! in-process reference implementation over parquet-rs.
//!
//! # Key Components
//!
//! - **Buffers**: [`buffer::BufferDescriptor`] describes one native region;
//!   [`buffer::ReferenceManager`] tracks its retain count and performs the
//!   native release exactly once; [`buffer::NativeBuffer`] is the owning
//!   view, convertible into an `arrow_buffer::Buffer` without copying.
//!
//! - **Batches**: [`batch::BatchDescriptor`] is a not-yet-materialized batch
//!   description (row count, field nodes, buffer descriptors);
//!   [`batch::BatchMaterializer`] binds it to memory, treating a zero row
//!   count as end-of-stream.
//!
//! - **Sessions**: [`reader::ReaderSession`] opens a file with a row-group
//!   or byte-range selection, serves its schema once, and pulls batches in
//!   engine order; [`writer::WriterSession`] commits a schema up front and
//!   persists batches decomposed into raw address/size pairs.
//!
//! - **Layout**: [`layout`] pins down the per-column buffer order both sides
//!   agree on, and converts record batches to and from it.
//!
//! # Concurrency
//!
//! One session is one forward-only cursor and must be driven from one thread
//! at a time. Scaling out means opening independent sessions, typically with
//! disjoint byte ranges over the same file, optionally sharing one
//! [`storage::StorageConnection`].

pub mod batch;
pub mod buffer;
pub mod engine;
pub mod error;
pub mod layout;
pub mod reader;
pub mod runtime;
pub mod schema;
mod session;
pub mod storage;
pub mod writer;

#[cfg(test)]
pub mod test_support;

pub use batch::{Batch, BatchDescriptor, BatchMaterializer, FieldNode};
pub use buffer::{BufferDescriptor, BufferOwnerId, NativeBuffer, ReferenceManager};
pub use engine::{
    NativeEngine, ReaderHandle, Selection, SelectionMode, StorageHandle, WriterHandle,
};
pub use error::{BridgeError, Result};
pub use reader::ReaderSession;
pub use storage::StorageConnection;
pub use writer::WriterSession;
