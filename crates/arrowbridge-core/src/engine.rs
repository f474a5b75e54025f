//! The native engine boundary.
//!
//! Everything the bridge needs from the out-of-runtime file engine is
//! expressed here as one trait, one method per native entry point. Addresses
//! and sizes crossing this boundary are raw memory offsets, valid only while
//! the corresponding reference manager holds the allocation alive.

use bytes::Bytes;

use crate::batch::BatchDescriptor;
use crate::buffer::BufferOwnerId;
use crate::error::{BridgeError, Result};

/// Native reader-session token.
///
/// Deliberately neither `Copy` nor `Clone`: closing consumes the handle, so
/// a closed session has nothing left to misuse, and a reader handle cannot
/// be passed where a writer handle is expected.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ReaderHandle(u64);

impl ReaderHandle {
    pub fn new(raw: u64) -> Self {
        ReaderHandle(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Native writer-session token. Same ownership rules as [`ReaderHandle`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct WriterHandle(u64);

impl WriterHandle {
    pub fn new(raw: u64) -> Self {
        WriterHandle(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Native storage-connection token. Same ownership rules as [`ReaderHandle`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StorageHandle(u64);

impl StorageHandle {
    pub fn new(raw: u64) -> Self {
        StorageHandle(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// How a reader session selects data out of one file.
///
/// The two shapes are mutually exclusive per session. An empty index list
/// means "everything": all row groups, or all columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Whole row groups, projected to the given columns.
    RowGroupColumns {
        row_group_indices: Vec<usize>,
        column_indices: Vec<usize>,
        batch_size: usize,
    },
    /// Row groups overlapping `[start_byte, end_byte)`, projected to the
    /// given columns. Disjoint ranges over one file give disjoint row-group
    /// sets, which is what makes parallel scans over a single file work.
    ColumnsByteRange {
        column_indices: Vec<usize>,
        start_byte: u64,
        end_byte: u64,
        batch_size: usize,
    },
}

impl Selection {
    /// Maximum rows per emitted batch.
    pub fn batch_size(&self) -> usize {
        match self {
            Selection::RowGroupColumns { batch_size, .. } => *batch_size,
            Selection::ColumnsByteRange { batch_size, .. } => *batch_size,
        }
    }

    /// The projected columns; empty means all.
    pub fn column_indices(&self) -> &[usize] {
        match self {
            Selection::RowGroupColumns { column_indices, .. } => column_indices,
            Selection::ColumnsByteRange { column_indices, .. } => column_indices,
        }
    }

    /// The request shape, without its payload.
    pub fn mode(&self) -> SelectionMode {
        match self {
            Selection::RowGroupColumns { .. } => SelectionMode::RowGroupColumns,
            Selection::ColumnsByteRange { .. } => SelectionMode::ColumnsByteRange,
        }
    }

    /// Reject selections no engine could honor.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size() == 0 {
            return Err(BridgeError::invalid_argument("batch size must be positive"));
        }
        if let Selection::ColumnsByteRange {
            start_byte,
            end_byte,
            ..
        } = self
        {
            if end_byte <= start_byte {
                return Err(BridgeError::invalid_argument(format!(
                    "empty byte range [{start_byte}, {end_byte})"
                )));
            }
        }
        Ok(())
    }
}

/// Which request shape a session was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    RowGroupColumns,
    ColumnsByteRange,
}

/// The out-of-runtime columnar file engine, at its boundary.
///
/// Handles are not internally synchronized: calls against one handle must be
/// serialized by the caller. Independent handles may be driven from separate
/// threads. Any of these calls may block on file or network IO.
pub trait NativeEngine: Send + Sync {
    /// Open a shared storage connection (one filesystem connection can serve
    /// several reader sessions).
    fn open_storage(&self, uri: &str) -> Result<StorageHandle>;

    /// Release a storage connection.
    fn close_storage(&self, storage: StorageHandle) -> Result<()>;

    /// Open a reader session over `path`, resolved against `storage` when
    /// one is given.
    fn open_reader(
        &self,
        storage: Option<&StorageHandle>,
        path: &str,
        selection: &Selection,
    ) -> Result<ReaderHandle>;

    /// Release a reader session, abandoning in-flight work best-effort.
    fn close_reader(&self, reader: ReaderHandle) -> Result<()>;

    /// The session's serialized schema message.
    fn schema_bytes(&self, reader: &ReaderHandle) -> Result<Bytes>;

    /// The next batch description. A `row_count` of zero signals exhaustion.
    fn read_next(&self, reader: &ReaderHandle) -> Result<BatchDescriptor>;

    /// Open a writer session; the schema message is fixed for its lifetime.
    fn open_writer(&self, destination: &str, schema: &[u8]) -> Result<WriterHandle>;

    /// Flush and release a writer session.
    fn close_writer(&self, writer: WriterHandle) -> Result<()>;

    /// Persist one batch, given as parallel address/size arrays in column
    /// layout order. The engine must consume the regions before returning;
    /// the caller keeps ownership of the underlying buffers.
    fn write_next(
        &self,
        writer: &WriterHandle,
        row_count: usize,
        addresses: &[u64],
        sizes: &[u64],
    ) -> Result<()>;

    /// Drop the engine-side allocation behind `owner`.
    fn release_buffer(&self, owner: BufferOwnerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_accessors() {
        let selection = Selection::RowGroupColumns {
            row_group_indices: vec![0, 2],
            column_indices: vec![1],
            batch_size: 4096,
        };
        assert_eq!(selection.batch_size(), 4096);
        assert_eq!(selection.column_indices(), &[1]);
        assert_eq!(selection.mode(), SelectionMode::RowGroupColumns);
        assert!(selection.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let selection = Selection::RowGroupColumns {
            row_group_indices: vec![],
            column_indices: vec![],
            batch_size: 0,
        };
        assert!(matches!(
            selection.validate(),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_backwards_byte_range_rejected() {
        let selection = Selection::ColumnsByteRange {
            column_indices: vec![0],
            start_byte: 100,
            end_byte: 100,
            batch_size: 1024,
        };
        assert!(matches!(
            selection.validate(),
            Err(BridgeError::InvalidArgument(_))
        ));
    }
}
