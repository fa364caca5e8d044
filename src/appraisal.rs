//! Critical-appraisal scores: anonymisation, wide-to-long reshape, score scale.
//!
//! The assessment sheet has one row per review and one score column per
//! appraisal question, optionally interleaved with free-text commentary
//! columns that share a reserved suffix.

use crate::error::{ReviewError, Result};
use crate::table::{Cell, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix of the synthetic review identifiers (`ID1`, `ID2`, ...)
pub const ID_PREFIX: &str = "ID";

/// Column names of the long-format table
pub const LONG_COLUMNS: [&str; 3] = ["id", "question", "score"];

/// Which columns of the wide table hold question scores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum QuestionColumns {
    /// Every column from `first` to `last` inclusive, in sheet order
    Span { first: String, last: String },
    /// An explicit list of columns
    Named { columns: Vec<String> },
}

/// Replace every value of `id_col` with `ID<n>`, n being the 1-based row number.
///
/// The original identifiers are not kept anywhere in the result.
pub fn anonymize(table: &Table, id_col: &str) -> Result<Table> {
    let idx = table.require_column(id_col)?;
    let rows = table
        .rows()
        .iter()
        .enumerate()
        .map(|(n, row)| {
            let mut row = row.clone();
            row[idx] = Some(format!("{}{}", ID_PREFIX, n + 1));
            row
        })
        .collect();
    Table::from_rows(table.name(), table.columns().to_vec(), rows)
}

/// Resolve the question columns to positions, dropping commentary columns.
///
/// # Errors
///
/// `ReshapeColumnRange` if a named or boundary column is missing, the span
/// is reversed, it covers the id column, or nothing is left after exclusion.
pub fn question_indices(
    wide: &Table,
    id_col: &str,
    questions: &QuestionColumns,
    excluded_suffix: &str,
) -> Result<Vec<usize>> {
    let locate = |name: &str| {
        wide.column_index(name).ok_or_else(|| {
            ReviewError::ReshapeColumnRange(format!(
                "column '{}' not found in table '{}'",
                name,
                wide.name()
            ))
        })
    };

    let candidates: Vec<usize> = match questions {
        QuestionColumns::Span { first, last } => {
            let start = locate(first)?;
            let end = locate(last)?;
            if end < start {
                return Err(ReviewError::ReshapeColumnRange(format!(
                    "'{}' comes after '{}' in table '{}'",
                    first,
                    last,
                    wide.name()
                )));
            }
            (start..=end).collect()
        }
        QuestionColumns::Named { columns } => {
            columns.iter().map(|c| locate(c)).collect::<Result<_>>()?
        }
    };

    let id_idx = wide.require_column(id_col)?;
    if candidates.contains(&id_idx) {
        return Err(ReviewError::ReshapeColumnRange(format!(
            "question columns include the id column '{}'",
            id_col
        )));
    }

    let kept: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| excluded_suffix.is_empty() || !wide.columns()[i].ends_with(excluded_suffix))
        .collect();

    if kept.is_empty() {
        return Err(ReviewError::ReshapeColumnRange(format!(
            "no question columns left in table '{}'",
            wide.name()
        )));
    }

    Ok(kept)
}

/// Reshape a wide assessment table to one `(id, question, score)` row per
/// review and question, anonymising the ids first.
pub fn to_long(
    wide: &Table,
    id_col: &str,
    questions: &QuestionColumns,
    excluded_suffix: &str,
) -> Result<Table> {
    let indices = question_indices(wide, id_col, questions, excluded_suffix)?;
    let anon = anonymize(wide, id_col)?;
    let id_idx = anon.require_column(id_col)?;

    let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(anon.len() * indices.len());
    for row in anon.rows() {
        for &q in &indices {
            rows.push(vec![
                row[id_idx].clone(),
                Some(anon.columns()[q].clone()),
                row[q].clone(),
            ]);
        }
    }

    debug!(
        table = wide.name(),
        reviews = anon.len(),
        questions = indices.len(),
        "Reshaped assessment to long format"
    );

    Table::from_rows(
        format!("{}_long", wide.name()),
        LONG_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    )
}

/// One level of the ordinal score scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLevel {
    pub label: String,
    /// `#RRGGBB`
    pub color: String,
}

/// Ordered score levels, best first, each with a fixed colour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreScale {
    pub levels: Vec<ScoreLevel>,
}

impl Default for ScoreScale {
    fn default() -> Self {
        let level = |label: &str, color: &str| ScoreLevel {
            label: label.to_string(),
            color: color.to_string(),
        };
        Self {
            levels: vec![
                level("Gold", "#D4AF37"),
                level("Green", "#4CAF50"),
                level("Amber", "#FFBF00"),
                level("Red", "#D32F2F"),
            ],
        }
    }
}

impl ScoreScale {
    /// Position of a score on the scale (trimmed, case-insensitive)
    pub fn position(&self, score: &str) -> Option<usize> {
        let score = score.trim();
        self.levels
            .iter()
            .position(|l| l.label.eq_ignore_ascii_case(score))
    }

    pub fn level(&self, score: &str) -> Option<&ScoreLevel> {
        self.position(score).map(|i| &self.levels[i])
    }

    pub fn labels(&self) -> Vec<&str> {
        self.levels.iter().map(|l| l.label.as_str()).collect()
    }
}
