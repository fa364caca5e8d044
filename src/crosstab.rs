//! Cross-tab aggregator: counts per category combination and percentages.
//!
//! Percentages use the grand total across every group by default, so a
//! two-dimension breakdown sums to 100 over the whole table, not within each
//! second-dimension group. [`Denominator::WithinGroup`] normalises within
//! each `dim2` value instead.

use crate::error::Result;
use crate::table::{Cell, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Percent denominator policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Denominator {
    /// Divide by the total count of all groups
    #[default]
    GrandTotal,
    /// Divide by the total count of rows sharing the same `dim2` value
    WithinGroup,
}

/// One group of a cross-tab
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTabRow {
    pub dim1: Cell,
    pub dim2: Cell,
    pub count: usize,
    pub percent: f64,
}

/// Counts and percentages over one or two categorical dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct CrossTab {
    pub dim1: String,
    pub dim2: Option<String>,
    pub denominator: Denominator,
    pub rows: Vec<CrossTabRow>,
}

/// Aggregate with the grand-total denominator.
pub fn aggregate(table: &Table, dim1: &str, dim2: Option<&str>) -> Result<CrossTab> {
    aggregate_with(table, dim1, dim2, Denominator::GrandTotal)
}

/// Group `table` by `dim1` (and `dim2`), count rows and normalise.
///
/// Rows come back by descending count; equal counts keep the order in which
/// their combination first appeared. An empty input yields an empty result.
pub fn aggregate_with(
    table: &Table,
    dim1: &str,
    dim2: Option<&str>,
    denominator: Denominator,
) -> Result<CrossTab> {
    let i1 = table.require_column(dim1)?;
    let i2 = dim2.map(|d| table.require_column(d)).transpose()?;

    let mut order: Vec<(Cell, Cell)> = Vec::new();
    let mut counts: HashMap<(Cell, Cell), usize> = HashMap::new();

    for row in table.rows() {
        let group = (row[i1].clone(), i2.and_then(|i| row[i].clone()));
        let count = counts.entry(group.clone()).or_insert(0);
        if *count == 0 {
            order.push(group);
        }
        *count += 1;
    }

    let grand_total: usize = counts.values().sum();
    let mut group_totals: HashMap<&Cell, usize> = HashMap::new();
    if denominator == Denominator::WithinGroup {
        for ((_, d2), c) in &counts {
            *group_totals.entry(d2).or_insert(0) += c;
        }
    }

    let mut rows: Vec<CrossTabRow> = order
        .iter()
        .map(|group| {
            let count = counts[group];
            let total = match denominator {
                Denominator::GrandTotal => grand_total,
                Denominator::WithinGroup => group_totals[&group.1],
            };
            CrossTabRow {
                dim1: group.0.clone(),
                dim2: group.1.clone(),
                count,
                percent: count as f64 * 100.0 / total as f64,
            }
        })
        .collect();

    // sort_by is stable
    rows.sort_by(|a, b| b.count.cmp(&a.count));

    Ok(CrossTab {
        dim1: dim1.to_string(),
        dim2: dim2.map(str::to_string),
        denominator,
        rows,
    })
}

impl CrossTab {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total number of counted rows
    pub fn total(&self) -> usize {
        self.rows.iter().map(|r| r.count).sum()
    }

    /// Total count per `dim1` value, in order of first appearance
    pub fn dim1_totals(&self) -> Vec<(Cell, usize)> {
        let mut totals: Vec<(Cell, usize)> = Vec::new();
        for row in &self.rows {
            match totals.iter_mut().find(|(v, _)| *v == row.dim1) {
                Some((_, t)) => *t += row.count,
                None => totals.push((row.dim1.clone(), row.count)),
            }
        }
        totals
    }

    /// Distinct `dim2` values in order of first appearance
    pub fn dim2_values(&self) -> Vec<Cell> {
        let mut values: Vec<Cell> = Vec::new();
        for row in &self.rows {
            if !values.contains(&row.dim2) {
                values.push(row.dim2.clone());
            }
        }
        values
    }

    /// Tabular form for CSV export: dimensions, `count`, `percent` (2 d.p.)
    pub fn to_table(&self, name: &str) -> Result<Table> {
        let mut columns = vec![self.dim1.clone()];
        if let Some(d2) = &self.dim2 {
            columns.push(d2.clone());
        }
        columns.push("count".to_string());
        columns.push("percent".to_string());

        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut out = vec![r.dim1.clone()];
                if self.dim2.is_some() {
                    out.push(r.dim2.clone());
                }
                out.push(Some(r.count.to_string()));
                out.push(Some(format!("{:.2}", r.percent)));
                out
            })
            .collect();

        Table::from_rows(name, columns, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table_of;

    const TOLERANCE: f64 = 0.001;

    #[test]
    fn test_single_dimension_example() -> Result<()> {
        let joined = table_of(
            "trait",
            &["review", "code", "label"],
            &[&["1", "A", "Alpha"], &["1", "B", "Beta"], &["2", "A", "Alpha"]],
        );
        let tab = aggregate(&joined, "label", None)?;
        assert_eq!(tab.rows.len(), 2);
        assert_eq!(tab.rows[0].dim1.as_deref(), Some("Alpha"));
        assert_eq!(tab.rows[0].count, 2);
        assert!((tab.rows[0].percent - 66.67).abs() < 0.01);
        assert_eq!(tab.rows[1].dim1.as_deref(), Some("Beta"));
        assert!((tab.rows[1].percent - 33.33).abs() < 0.01);
        Ok(())
    }

    #[test]
    fn test_two_dimensions_use_grand_total() -> Result<()> {
        let t = table_of(
            "x",
            &["type", "discipline"],
            &[
                &["Epi", "Eco"],
                &["Epi", "Med"],
                &["Epi", "Med"],
                &["Cult", "Eco"],
            ],
        );
        let tab = aggregate(&t, "type", Some("discipline"))?;
        let sum: f64 = tab.rows.iter().map(|r| r.percent).sum();
        assert!((sum - 100.0).abs() < TOLERANCE);

        let eco: f64 = tab
            .rows
            .iter()
            .filter(|r| r.dim2.as_deref() == Some("Eco"))
            .map(|r| r.percent)
            .sum();
        assert!((eco - 50.0).abs() < TOLERANCE);
        assert_eq!(tab.rows[0].dim2.as_deref(), Some("Med"));
        assert_eq!(tab.rows[0].count, 2);
        Ok(())
    }

    #[test]
    fn test_within_group_sums_to_100_per_group() -> Result<()> {
        let t = table_of(
            "x",
            &["type", "discipline"],
            &[&["Epi", "Eco"], &["Epi", "Med"], &["Cult", "Med"], &["Cult", "Eco"], &["Cult", "Eco"]],
        );
        let tab = aggregate_with(&t, "type", Some("discipline"), Denominator::WithinGroup)?;
        for group in tab.dim2_values() {
            let sum: f64 = tab
                .rows
                .iter()
                .filter(|r| r.dim2 == group)
                .map(|r| r.percent)
                .sum();
            assert!((sum - 100.0).abs() < TOLERANCE);
        }
        Ok(())
    }

    #[test]
    fn test_ties_keep_encounter_order() -> Result<()> {
        let t = table_of("x", &["c"], &[&["C"], &["A"], &["B"], &["A"], &["C"], &["B"], &["D"]]);
        let tab = aggregate(&t, "c", None)?;
        let order: Vec<_> = tab.rows.iter().map(|r| r.dim1.clone().unwrap_or_default()).collect();
        assert_eq!(order, vec!["C", "A", "B", "D"]);
        Ok(())
    }

    #[test]
    fn test_empty_input_is_empty_result() -> Result<()> {
        let t = table_of("x", &["c"], &[]);
        let tab = aggregate(&t, "c", None)?;
        assert!(tab.is_empty());
        assert_eq!(tab.total(), 0);
        Ok(())
    }

    #[test]
    fn test_missing_values_form_their_own_group() -> Result<()> {
        let t = table_of("x", &["c"], &[&["A"], &[""], &[""]]);
        let tab = aggregate(&t, "c", None)?;
        assert_eq!(tab.rows[0].dim1, None);
        assert_eq!(tab.rows[0].count, 2);
        Ok(())
    }

    #[test]
    fn test_to_table_and_totals() -> Result<()> {
        let t = table_of("x", &["a", "b"], &[&["P", "1"], &["P", "2"], &["Q", "1"]]);
        let tab = aggregate(&t, "a", Some("b"))?;
        assert_eq!(tab.dim1_totals(), vec![(Some("P".to_string()), 2), (Some("Q".to_string()), 1)]);

        let out = tab.to_table("x_summary")?;
        assert_eq!(out.columns(), &["a", "b", "count", "percent"].map(String::from));
        assert_eq!(out.get(0, "percent"), Some("33.33"));
        Ok(())
    }
}
