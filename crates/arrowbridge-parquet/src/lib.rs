//! In-process reference implementation of the native engine boundary.
//!
//! [`ParquetFileEngine`] does the actual Parquet file and page work on the
//! local filesystem via parquet-rs, behind the same `NativeEngine` trait an
//! out-of-process engine would sit behind. Batches it produces cross the
//! boundary as raw
//! address/size descriptors over buffers pinned in an internal ledger until
//! the bridge releases them.

pub mod engine;
pub mod ledger;

pub use engine::ParquetFileEngine;
