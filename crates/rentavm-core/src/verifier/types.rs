//! Type drift: text-valued fields that are not declared as text.

use crate::models::{Batch, ColumnKind};

/// Fields holding text values that are not in `string_fields`, in column
/// order. Read-only.
pub fn check_types(batch: &Batch, string_fields: &[String]) -> Vec<String> {
    batch
        .columns()
        .iter()
        .filter(|column| batch.column_kind(column) == ColumnKind::String)
        .filter(|column| !string_fields.contains(column))
        .cloned()
        .collect()
}
