//! Arrow schema definitions for `LanceDB` tables.
//!
//! Columns used in filters are stored flat. The full record is kept as JSON
//! in `record` so rows round-trip without a column per field.

use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Table holding material records.
pub const MATERIALS_TABLE: &str = "materials";

/// Table holding chunk rows.
pub const CHUNKS_TABLE: &str = "chunks";

/// Schema for a course namespace's vector table.
#[must_use]
pub fn vectors_schema(embedding_dim: usize) -> Schema {
    Schema::new(vec![
        // Identity
        Field::new("id", DataType::Utf8, false),
        Field::new("course_id", DataType::Utf8, false),
        Field::new("material_id", DataType::Utf8, false),
        // Filterable metadata
        Field::new("category", DataType::Utf8, false),
        Field::new("week_number", DataType::UInt32, true),
        Field::new("chunk_type", DataType::Utf8, false),
        Field::new("chunk_order", DataType::UInt32, false),
        Field::new("is_code", DataType::Boolean, false),
        Field::new("language", DataType::Utf8, true),
        // Content
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        // Embedding
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                embedding_dim as i32,
            ),
            false,
        ),
    ])
}

/// Schema for the materials table.
#[must_use]
pub fn materials_schema() -> Schema {
    Schema::new(vec![
        Field::new("material_id", DataType::Utf8, false),
        Field::new("course_id", DataType::Utf8, false),
        Field::new("is_indexed", DataType::Boolean, false),
        Field::new("chunk_count", DataType::UInt32, false),
        Field::new("vector_count", DataType::UInt32, false),
        Field::new("record", DataType::Utf8, false),
    ])
}

/// Schema for the chunks table.
#[must_use]
pub fn chunks_schema() -> Schema {
    Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("material_id", DataType::Utf8, false),
        Field::new("course_id", DataType::Utf8, false),
        Field::new("chunk_order", DataType::UInt32, false),
        Field::new("chunk_type", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("record", DataType::Utf8, false),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_schema() {
        let schema = vectors_schema(1024);
        assert!(schema.field_with_name("vector").is_ok());
        assert!(schema.field_with_name("week_number").unwrap().is_nullable());

        if let DataType::FixedSizeList(_, size) = schema
            .field_with_name("vector")
            .unwrap()
            .data_type()
        {
            assert_eq!(*size, 1024);
        } else {
            panic!("Expected FixedSizeList");
        }
    }

    #[test]
    fn test_record_tables_carry_json() {
        assert!(materials_schema().field_with_name("record").is_ok());
        assert!(chunks_schema().field_with_name("record").is_ok());
        assert!(chunks_schema().field_with_name("chunk_order").is_ok());
    }
}
