//! Schema messages crossing the boundary.
//!
//! The wire format is the Arrow IPC stream encapsulation. Sessions treat it
//! as an opaque blob: a writer serializes its schema exactly once at open,
//! a reader decodes the engine's message exactly once and caches the result.

use std::io::Cursor;

use arrow_ipc::reader::StreamReader;
use arrow_ipc::writer::StreamWriter;
use arrow_schema::{Schema, SchemaRef};

use crate::error::{BridgeError, Result};

/// Serialize a schema into its boundary message.
pub fn encode_schema(schema: &Schema) -> Result<Vec<u8>> {
    let mut message = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut message, schema)?;
        writer.finish()?;
    }
    Ok(message)
}

/// Decode a boundary message back into a schema.
pub fn decode_schema(message: &[u8]) -> Result<SchemaRef> {
    if message.is_empty() {
        return Err(BridgeError::schema(
            "unexpected end of input, missing schema message",
        ));
    }
    let reader = StreamReader::try_new(Cursor::new(message), None)
        .map_err(|e| BridgeError::schema(format!("undecodable schema message: {e}")))?;
    Ok(reader.schema())
}
