//! Bibliographic export readers.
//!
//! Records are kept as a flat [`Table`] keyed by two-letter field tags
//! (`AU`, `TI`, `SO`, `PY`, `DE`, `ID`, `C1`, `AU_CO`). Multi-valued fields
//! hold `;`-separated values; [`split_field`] is the single place that splits
//! them, so every network type sees the same tokens.
//!
//! Two inputs are understood:
//! - the converted flat table (`.csv`)
//! - the Web of Science plain-text tagged export (anything else)

use crate::error::{ReviewError, Result};
use crate::table::{Cell, Table};
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

/// Separator of multi-valued fields
pub const FIELD_SEPARATOR: char = ';';

/// Authors
pub const AUTHORS: &str = "AU";
/// Author keywords
pub const AUTHOR_KEYWORDS: &str = "DE";
/// Indexing keywords (Keywords Plus)
pub const KEYWORDS_PLUS: &str = "ID";
/// Author affiliations
pub const AFFILIATIONS: &str = "C1";
/// Derived author countries
pub const COUNTRIES: &str = "AU_CO";

/// Tags whose continuation lines are separate values rather than wrapped text
const LIST_TAGS: &[&str] = &["AU", "AF", "C1", "C3", "CR", "EM", "RI", "OI"];

/// Load a bibliographic export, choosing the reader by file extension.
pub fn load(path: &Path) -> Result<Table> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let table = if is_csv {
        Table::from_csv_path(path)?
    } else {
        let text = std::fs::read_to_string(path)?;
        parse_tagged("bibliography", &text)?
    };

    info!(path = %path.display(), records = table.len(), "Loaded bibliographic records");
    Ok(table)
}

/// Parse a Web of Science plain-text export into a record table.
///
/// Each field starts with a two-character tag in column 0; continuation
/// lines start with spaces. `ER` closes a record, `FN`, `VR` and `EF` are
/// file markers. A leading byte-order mark is skipped.
pub fn parse_tagged(name: &str, text: &str) -> Result<Table> {
    let tag_line = Regex::new(r"^([A-Z][A-Z0-9])(?:\s(.*))?$")
        .map_err(|e| ReviewError::Parse(format!("Invalid tag pattern: {}", e)))?;

    let mut columns: Vec<String> = Vec::new();
    let mut records: Vec<Vec<(String, String)>> = Vec::new();
    let mut current: Vec<(String, String)> = Vec::new();
    let mut tag: Option<String> = None;

    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(' ') {
            let value = line.trim();
            let Some(t) = tag.as_deref() else {
                return Err(ReviewError::Parse(format!(
                    "Continuation line {} outside a field",
                    line_no + 1
                )));
            };
            if let Some((_, existing)) = current.iter_mut().rev().find(|(k, _)| k == t) {
                let sep = if LIST_TAGS.contains(&t) { "; " } else { " " };
                existing.push_str(sep);
                existing.push_str(value);
            }
            continue;
        }

        let Some(caps) = tag_line.captures(line) else {
            return Err(ReviewError::Parse(format!(
                "Unrecognised line {}: {}",
                line_no + 1,
                line
            )));
        };
        let t = caps[1].to_string();
        let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("").to_string();

        match t.as_str() {
            "FN" | "VR" | "EF" => tag = None,
            "ER" => {
                if !current.is_empty() {
                    records.push(std::mem::take(&mut current));
                }
                tag = None;
            }
            _ => {
                if !columns.contains(&t) {
                    columns.push(t.clone());
                }
                current.push((t.clone(), value));
                tag = Some(t);
            }
        }
    }
    if !current.is_empty() {
        records.push(current);
    }

    let rows: Vec<Vec<Cell>> = records
        .iter()
        .map(|fields| {
            columns
                .iter()
                .map(|c| {
                    fields
                        .iter()
                        .find(|(k, _)| k == c)
                        .map(|(_, v)| v.clone())
                        .filter(|v| !v.is_empty())
                })
                .collect()
        })
        .collect();

    debug!(records = rows.len(), fields = columns.len(), "Parsed tagged export");
    Table::from_rows(name, columns, rows)
}

/// Split a multi-valued field into trimmed, non-empty values
pub fn split_field(value: &str) -> Vec<String> {
    value
        .split(FIELD_SEPARATOR)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Add (or fill) the `AU_CO` column from the `C1` affiliations.
///
/// A table that already carries a populated `AU_CO` column is returned as-is.
pub fn extract_countries(records: &Table) -> Result<Table> {
    if let Some(idx) = records.column_index(COUNTRIES) {
        if records.rows().iter().any(|r| r[idx].is_some()) {
            return Ok(records.clone());
        }
    }

    let c1 = records.require_column(AFFILIATIONS)?;
    let brackets = Regex::new(r"\[[^\]]*\]")
        .map_err(|e| ReviewError::Parse(format!("Invalid bracket pattern: {}", e)))?;

    let derived: Vec<Cell> = records
        .rows()
        .iter()
        .map(|row| {
            let affiliations = row[c1].as_deref().unwrap_or("");
            let cleaned = brackets.replace_all(affiliations, "");
            let mut countries: Vec<String> = Vec::new();
            for aff in split_field(&cleaned) {
                if let Some(country) = affiliation_country(&aff) {
                    if !countries.contains(&country) {
                        countries.push(country);
                    }
                }
            }
            if countries.is_empty() {
                None
            } else {
                Some(countries.join(";"))
            }
        })
        .collect();

    let mut columns = records.columns().to_vec();
    let existing = records.column_index(COUNTRIES);
    if existing.is_none() {
        columns.push(COUNTRIES.to_string());
    }

    let rows = records
        .rows()
        .iter()
        .zip(derived)
        .map(|(row, country)| {
            let mut row = row.clone();
            match existing {
                Some(i) => row[i] = country,
                None => row.push(country),
            }
            row
        })
        .collect();

    Table::from_rows(records.name(), columns, rows)
}

/// Country of one affiliation: its last comma-separated part, normalised.
fn affiliation_country(affiliation: &str) -> Option<String> {
    let last = affiliation
        .trim()
        .trim_end_matches('.')
        .rsplit(',')
        .next()?
        .trim()
        .to_uppercase();

    if last.is_empty() {
        return None;
    }
    if last == "USA" || last.ends_with(" USA") {
        return Some("USA".to_string());
    }
    match last.as_str() {
        "ENGLAND" | "SCOTLAND" | "WALES" | "NORTH IRELAND" | "NORTHERN IRELAND" => {
            Some("UNITED KINGDOM".to_string())
        }
        "PEOPLES R CHINA" => Some("CHINA".to_string()),
        _ => Some(last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table_of;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const WOS_SAMPLE: &str = "FN Clarivate Analytics Web of Science
VR 1.0
PT J
AU Smith, J
   Lee, K
TI Transgenerational effects of
   parental diet
SO ECOLOGY LETTERS
DE epigenetics; maternal effects;
   inheritance
C1 [Smith, J; Lee, K] Univ Oxford, Dept Zool, Oxford OX1 3PS, England.
   [Lee, K] Harvard Univ, Cambridge, MA 02138 USA.
PY 2019
ER

PT J
AU Ortiz, M
TI Cultural inheritance
PY 2021
ER

EF
";

    #[test]
    fn test_parse_tagged_records() -> Result<()> {
        let table = parse_tagged("wos", WOS_SAMPLE)?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "AU"), Some("Smith, J; Lee, K"));
        assert_eq!(table.get(0, "TI"), Some("Transgenerational effects of parental diet"));
        assert_eq!(
            split_field(table.get(0, "DE").unwrap_or_default()),
            vec!["epigenetics", "maternal effects", "inheritance"]
        );
        assert_eq!(table.get(1, "SO"), None);
        assert_eq!(table.get(1, "PY"), Some("2021"));
        Ok(())
    }

    #[test]
    fn test_parse_tagged_skips_byte_order_mark() -> Result<()> {
        let text = format!("\u{FEFF}{}", WOS_SAMPLE);
        let table = parse_tagged("wos", &text)?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1, "AU"), Some("Ortiz, M"));
        Ok(())
    }

    #[test]
    fn test_parse_tagged_rejects_garbage() {
        assert!(parse_tagged("wos", "PT J\nthis is not a tag line\nER\n").is_err());
    }

    #[test]
    fn test_extract_countries_from_affiliations() -> Result<()> {
        let table = parse_tagged("wos", WOS_SAMPLE)?;
        let with_countries = extract_countries(&table)?;
        assert_eq!(with_countries.get(0, COUNTRIES), Some("UNITED KINGDOM;USA"));
        assert_eq!(with_countries.get(1, COUNTRIES), None);
        Ok(())
    }

    #[test]
    fn test_existing_country_column_is_kept() -> Result<()> {
        let table = table_of("bib", &["AU", "C1", "AU_CO"], &[&["A", "X, Chile.", "PERU"]]);
        let out = extract_countries(&table)?;
        assert_eq!(out.get(0, COUNTRIES), Some("PERU"));
        Ok(())
    }

    #[test]
    fn test_affiliation_country_normalisation() {
        assert_eq!(affiliation_country("Univ Sydney, Sydney, NSW 2006, Australia."), Some("AUSTRALIA".to_string()));
        assert_eq!(affiliation_country("Columbia Univ, New York, NY 10027 USA"), Some("USA".to_string()));
        assert_eq!(affiliation_country("Univ Edinburgh, Edinburgh, Scotland"), Some("UNITED KINGDOM".to_string()));
        assert_eq!(affiliation_country(""), None);
    }

    #[test]
    fn test_load_flat_csv() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".csv")?;
        writeln!(file, "AU,DE,PY")?;
        writeln!(file, "\"SMITH J;LEE K\",\"EPIGENETICS;DIET\",2019")?;
        let table = load(file.path())?;
        assert_eq!(table.len(), 1);
        assert_eq!(split_field(table.get(0, AUTHORS).unwrap_or_default()).len(), 2);
        Ok(())
    }
}
