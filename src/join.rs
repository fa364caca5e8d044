//! Lookup joiner: attaches controlled-vocabulary labels to coded observations.
//!
//! The join is a left join. Every observation row survives exactly once; a
//! vocabulary table whose key column repeats a code is rejected before any
//! row is produced, since it would silently multiply observations.

use crate::error::{ReviewError, Result};
use crate::table::{Cell, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// What to do with observation codes that have no vocabulary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Keep the rows with empty label fields, log at debug level
    Ignore,
    /// Keep the rows with empty label fields, log a warning
    #[default]
    Warn,
    /// Abort the join with `ReviewError::UnmatchedCodes`
    Fail,
}

/// Join parameters
#[derive(Debug, Clone, Copy)]
pub struct JoinSpec<'a> {
    /// Key column in the observation table
    pub left_key: &'a str,
    /// Key column in the vocabulary table
    pub right_key: &'a str,
    /// Prefix for the attached columns (`<prefix>_<column>`)
    pub prefix: Option<&'a str>,
    pub policy: UnmatchedPolicy,
}

impl<'a> JoinSpec<'a> {
    /// Join on a column present under the same name on both sides
    pub fn on(key: &'a str) -> Self {
        Self {
            left_key: key,
            right_key: key,
            prefix: None,
            policy: UnmatchedPolicy::default(),
        }
    }

    pub fn right_key(mut self, key: &'a str) -> Self {
        self.right_key = key;
        self
    }

    pub fn prefix(mut self, prefix: &'a str) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Left-join `observations` against `vocabulary` on a shared `key` column.
pub fn join(observations: &Table, vocabulary: &Table, key: &str) -> Result<Table> {
    join_with(observations, vocabulary, &JoinSpec::on(key))
}

/// Left-join with explicit key names, column prefix and unmatched policy.
///
/// # Errors
///
/// - `AmbiguousKey` if the vocabulary repeats a key value
/// - `MissingColumn` if either key column is absent
/// - `UnmatchedCodes` if codes are unmatched and the policy is `Fail`
pub fn join_with(observations: &Table, vocabulary: &Table, spec: &JoinSpec<'_>) -> Result<Table> {
    let left_idx = observations.require_column(spec.left_key)?;
    let right_idx = vocabulary.require_column(spec.right_key)?;
    let lookup = unique_index(vocabulary, right_idx)?;

    let attached: Vec<usize> = (0..vocabulary.columns().len())
        .filter(|&i| i != right_idx)
        .collect();

    let mut columns = observations.columns().to_vec();
    for &i in &attached {
        let base = &vocabulary.columns()[i];
        let mut name = match spec.prefix {
            Some(p) => format!("{}_{}", p, base),
            None => base.clone(),
        };
        if columns.contains(&name) {
            name = format!("{}.{}", vocabulary.name(), name);
        }
        columns.push(name);
    }

    let mut unmatched: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(observations.len());

    for row in observations.rows() {
        let mut out = row.clone();
        let hit = row[left_idx]
            .as_deref()
            .and_then(|code| lookup.get(code).map(|&r| &vocabulary.rows()[r]));

        match hit {
            Some(vocab_row) => out.extend(attached.iter().map(|&i| vocab_row[i].clone())),
            None => {
                if let Some(code) = row[left_idx].as_deref() {
                    if !unmatched.iter().any(|c| c == code) {
                        unmatched.push(code.to_string());
                    }
                }
                out.extend(attached.iter().map(|_| None));
            }
        }
        rows.push(out);
    }

    if !unmatched.is_empty() {
        match spec.policy {
            UnmatchedPolicy::Ignore => {
                debug!(table = vocabulary.name(), codes = ?unmatched, "Unmatched codes")
            }
            UnmatchedPolicy::Warn => warn!(
                table = vocabulary.name(),
                key = spec.left_key,
                codes = ?unmatched,
                "Codes without vocabulary entry; labels left empty"
            ),
            UnmatchedPolicy::Fail => {
                return Err(ReviewError::UnmatchedCodes {
                    table: vocabulary.name().to_string(),
                    key: spec.left_key.to_string(),
                    codes: unmatched,
                })
            }
        }
    }

    Table::from_rows(observations.name(), columns, rows)
}

/// Reject a table whose `key` column repeats a value.
pub fn ensure_unique_key(table: &Table, key: &str) -> Result<()> {
    let idx = table.require_column(key)?;
    unique_index(table, idx).map(|_| ())
}

/// Map each non-empty key value to its row, failing on the first repeat
fn unique_index(table: &Table, idx: usize) -> Result<HashMap<&str, usize>> {
    let mut index = HashMap::with_capacity(table.len());
    for (r, row) in table.rows().iter().enumerate() {
        let Some(code) = row[idx].as_deref() else {
            continue;
        };
        if index.insert(code, r).is_some() {
            return Err(ReviewError::AmbiguousKey {
                table: table.name().to_string(),
                key: table.columns()[idx].clone(),
                code: code.to_string(),
            });
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table_of;

    fn vocab() -> Table {
        table_of(
            "trait_codes",
            &["code", "label", "description"],
            &[&["A", "Alpha", "First"], &["B", "Beta", "Second"]],
        )
    }

    #[test]
    fn test_join_preserves_left_cardinality() -> Result<()> {
        let obs = table_of(
            "trait",
            &["review_id", "code"],
            &[&["1", "A"], &["1", "B"], &["2", "A"]],
        );
        let joined = join(&obs, &vocab(), "code")?;
        assert_eq!(joined.len(), obs.len());
        assert_eq!(
            joined.columns(),
            &["review_id", "code", "label", "description"].map(String::from)
        );
        assert_eq!(joined.get(1, "label"), Some("Beta"));
        assert_eq!(joined.get(2, "description"), Some("First"));
        Ok(())
    }

    #[test]
    fn test_duplicate_vocabulary_key_is_rejected() {
        let obs = table_of("taxon", &["code"], &[&["X"]]);
        let bad = table_of("taxon_codes", &["code", "label"], &[&["X", "One"], &["X", "Two"]]);
        match join(&obs, &bad, "code") {
            Err(ReviewError::AmbiguousKey { table, code, .. }) => {
                assert_eq!(table, "taxon_codes");
                assert_eq!(code, "X");
            }
            other => panic!("expected AmbiguousKey, got {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_code_keeps_row_with_empty_labels() -> Result<()> {
        let obs = table_of("trait", &["code"], &[&["A"], &["Z"], &[""]]);
        let joined = join(&obs, &vocab(), "code")?;
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.get(1, "code"), Some("Z"));
        assert_eq!(joined.get(1, "label"), None);
        assert_eq!(joined.get(2, "label"), None);
        Ok(())
    }

    #[test]
    fn test_fail_policy_reports_codes() {
        let obs = table_of("trait", &["code"], &[&["Z"], &["A"], &["Z"], &["Q"]]);
        let spec = JoinSpec::on("code").policy(UnmatchedPolicy::Fail);
        match join_with(&obs, &vocab(), &spec) {
            Err(ReviewError::UnmatchedCodes { codes, .. }) => assert_eq!(codes, vec!["Z", "Q"]),
            other => panic!("expected UnmatchedCodes, got {:?}", other),
        }
    }

    #[test]
    fn test_prefix_and_distinct_key_names() -> Result<()> {
        let reviews = table_of(
            "review_info",
            &["review_id", "discipline_code"],
            &[&["1", "A"], &["2", "B"]],
        );
        let spec = JoinSpec::on("discipline_code")
            .right_key("code")
            .prefix("discipline");
        let joined = join_with(&reviews, &vocab(), &spec)?;
        assert_eq!(joined.get(0, "discipline_label"), Some("Alpha"));
        assert_eq!(joined.get(1, "discipline_description"), Some("Second"));
        Ok(())
    }

    #[test]
    fn test_colliding_column_is_qualified() -> Result<()> {
        let obs = table_of("trait", &["code", "label"], &[&["A", "raw"]]);
        let joined = join(&obs, &vocab(), "code")?;
        assert_eq!(joined.get(0, "label"), Some("raw"));
        assert_eq!(joined.get(0, "trait_codes.label"), Some("Alpha"));
        Ok(())
    }

    #[test]
    fn test_ensure_unique_key_ignores_empty_codes() {
        let table = table_of("v", &["code"], &[&[""], &[""], &["A"]]);
        assert!(ensure_unique_key(&table, "code").is_ok());
    }
}
