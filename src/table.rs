//! In-memory tables and the workbook that holds them.
//!
//! A [`Table`] is a named, column-ordered grid of optional string cells; an
//! empty spreadsheet cell is `None`. A [`Workbook`] maps sheet names to
//! tables and is passed explicitly into every pipeline step.

use crate::error::{OptionExt, ReviewError, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A single cell value; `None` for an empty or unmatched cell
pub type Cell = Option<String>;

/// Named table of string cells
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a table from prepared rows, checking every row's width
    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self> {
        let mut table = Self::new(name, columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Return the same table under a different name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Position of a column, if present
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Position of a column, or a `MissingColumn` error naming this table
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_column(&self.name, column)
    }

    /// Append a row; its width must match the header
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ReviewError::Parse(format!(
                "Row {} of table '{}' has {} cells, expected {}",
                self.rows.len() + 1,
                self.name,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Cell value by row number and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// All values of one column in row order
    pub fn column_values(&self, column: &str) -> Result<Vec<Option<&str>>> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(|r| r[idx].as_deref()).collect())
    }

    /// Rename a column in place
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        let idx = self.require_column(from)?;
        self.columns[idx] = to.to_string();
        Ok(())
    }

    /// Keep only the rows for which `keep` returns true
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Cell]) -> bool,
    {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Read a table from CSV with a header row.
    ///
    /// Header names and cells are trimmed; empty cells become `None`.
    pub fn read_csv<R: Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let mut table = Self::new(name, columns);

        for record in rdr.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                .collect();
            table.push_row(row)?;
        }

        Ok(table)
    }

    /// Read a table from a CSV file, named after the file stem
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ReviewError::Parse(format!("Invalid table file name: {:?}", path)))?
            .to_string();
        let file = std::fs::File::open(path)?;
        let table = Self::read_csv(name, file)?;
        debug!(table = table.name(), rows = table.len(), "Loaded table");
        Ok(table)
    }

    /// Write the table to a CSV file; `None` cells are written empty
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Mapping from sheet name to table
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    tables: BTreeMap<String, Table>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table under its own name, replacing any table of the same name
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name().to_string(), table);
    }

    /// Look up a table by name
    pub fn get(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_table(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Load every `*.csv` file of a directory, one table per sheet.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut workbook = Self::new();

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if is_csv {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            workbook.insert(Table::from_csv_path(&path)?);
        }

        info!(dir = %dir.display(), tables = workbook.len(), "Loaded workbook");
        Ok(workbook)
    }
}

/// Build a table from string literals; `""` becomes `None`.
#[cfg(test)]
pub(crate) fn table_of(name: &str, columns: &[&str], rows: &[&[&str]]) -> Table {
    Table {
        name: name.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: rows
            .iter()
            .map(|r| {
                r.iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect()
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_read_csv_empty_cells_are_none() -> Result<()> {
        let data = "review_id , code\n1,A\n2,\n";
        let table = Table::read_csv("trait", data.as_bytes())?;
        assert_eq!(table.columns(), &["review_id".to_string(), "code".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "code"), Some("A"));
        assert_eq!(table.get(1, "code"), None);
        Ok(())
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut table = Table::new("t", vec!["a".to_string(), "b".to_string()]);
        assert!(table.push_row(vec![Some("1".to_string())]).is_err());
    }

    #[test]
    fn test_require_column_names_table() {
        let table = table_of("taxon", &["code"], &[&["A"]]);
        let err = table.require_column("label").unwrap_err();
        assert_eq!(err.to_string(), "Missing column 'label' in table 'taxon'");
    }

    #[test]
    fn test_workbook_load_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let mut f = std::fs::File::create(dir.path().join("taxon_codes.csv"))?;
        writeln!(f, "code,label,description")?;
        writeln!(f, "M,Mammal,Mammalia")?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let workbook = Workbook::load_dir(dir.path())?;
        assert_eq!(workbook.len(), 1);
        assert_eq!(workbook.get("taxon_codes")?.get(0, "label"), Some("Mammal"));
        assert!(matches!(
            workbook.get("missing"),
            Err(ReviewError::MissingTable(_))
        ));
        Ok(())
    }

    #[test]
    fn test_workbook_load_dir_reports_unreadable_entries() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(matches!(
            Workbook::load_dir(&dir.path().join("absent")),
            Err(ReviewError::Io(_))
        ));

        std::fs::create_dir(dir.path().join("sheet.csv"))?;
        assert!(Workbook::load_dir(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_write_csv_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("out.csv");
        let table = table_of("out", &["a", "b"], &[&["1", ""], &["2", "y"]]);
        table.write_csv(&path)?;

        let loaded = Table::from_csv_path(&path)?;
        assert_eq!(loaded, table);
        Ok(())
    }
}
