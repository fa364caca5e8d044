//! Controlled-vocabulary reference (legend) tables.

use crate::error::Result;
use crate::table::{Cell, Table};
use serde::Serialize;
use std::cmp::Ordering;

/// One distinct (code, label, description) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceEntry {
    pub code: Cell,
    pub label: Cell,
    pub description: Cell,
}

/// Distinct (code, label, description) triples of a joined table, sorted by code.
///
/// Deduplication is on the whole triple: a code carrying two different
/// labels shows up twice, which flags inconsistent coding in the source.
pub fn reference(
    table: &Table,
    code_col: &str,
    label_col: &str,
    description_col: &str,
) -> Result<Vec<ReferenceEntry>> {
    let ci = table.require_column(code_col)?;
    let li = table.require_column(label_col)?;
    let di = table.require_column(description_col)?;

    let mut entries: Vec<ReferenceEntry> = Vec::new();
    for row in table.rows() {
        let entry = ReferenceEntry {
            code: row[ci].clone(),
            label: row[li].clone(),
            description: row[di].clone(),
        };
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }

    let numeric = entries
        .iter()
        .filter_map(|e| e.code.as_deref())
        .all(|c| c.parse::<f64>().is_ok());
    entries.sort_by(|a, b| compare_codes(a.code.as_deref(), b.code.as_deref(), numeric));
    Ok(entries)
}

/// Empty codes sort last. `numeric` is decided once for the whole column:
/// numbers only when every code parses, text otherwise.
fn compare_codes(a: Option<&str>, b: Option<&str>, numeric: bool) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) if numeric => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.total_cmp(&y),
            _ => a.cmp(b),
        },
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Reference entries as a `code,label,description` table
pub fn reference_table(name: &str, entries: &[ReferenceEntry]) -> Result<Table> {
    let columns = vec![
        "code".to_string(),
        "label".to_string(),
        "description".to_string(),
    ];
    let rows = entries
        .iter()
        .map(|e| vec![e.code.clone(), e.label.clone(), e.description.clone()])
        .collect();
    Table::from_rows(name, columns, rows)
}
