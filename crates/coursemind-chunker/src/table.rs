//! Table serialization.
//!
//! A table never shares a chunk with surrounding text. Its content is the
//! JSON form `{"rows": [[...], ...]}`.

use coursemind_core::{ChunkError, ParsedTable, TableShape};
use serde_json::json;

/// Serialize a table's rows for embedding and display.
pub fn render_table(table: &ParsedTable) -> Result<String, ChunkError> {
    serde_json::to_string(&json!({ "rows": table.rows }))
        .map_err(|e| ChunkError::Failed(format!("failed to serialize table: {e}")))
}

/// Row and column counts plus location.
pub fn table_shape(table: &ParsedTable) -> TableShape {
    TableShape {
        rows: table.row_count() as u32,
        columns: table.column_count() as u32,
        bbox: table.bbox,
    }
}

/// Tables with no cells carry nothing worth retrieving.
pub fn is_empty_table(table: &ParsedTable) -> bool {
    table
        .rows
        .iter()
        .all(|row| row.iter().all(|cell| cell.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursemind_core::BoundingBox;

    fn sample() -> ParsedTable {
        ParsedTable {
            rows: vec![
                vec!["n".into(), "n^2".into(), "n^3".into()],
                vec!["2".into(), "4".into(), "8".into()],
            ],
            bbox: Some(BoundingBox {
                x: 10.0,
                y: 20.0,
                width: 300.0,
                height: 80.0,
            }),
        }
    }

    #[test]
    fn test_render_table_json() {
        let rendered = render_table(&sample()).unwrap();
        assert_eq!(rendered, r#"{"rows":[["n","n^2","n^3"],["2","4","8"]]}"#);
    }

    #[test]
    fn test_table_shape() {
        let shape = table_shape(&sample());
        assert_eq!(shape.rows, 2);
        assert_eq!(shape.columns, 3);
        assert!(shape.bbox.is_some());
    }

    #[test]
    fn test_empty_table() {
        let table = ParsedTable {
            rows: vec![vec![" ".into()], vec![]],
            bbox: None,
        };
        assert!(is_empty_table(&table));
        assert!(!is_empty_table(&sample()));
    }
}
