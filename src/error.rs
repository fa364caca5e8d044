//! Custom error types for umbrella-review.
//!
//! Every table-building step (load, join, reshape) reports failures through
//! [`ReviewError`]. All functions return `Result<T, ReviewError>` instead of
//! using `unwrap()`.

use thiserror::Error;

/// Main error type for umbrella-review operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Vocabulary table has the same code on more than one row
    #[error("Ambiguous key in table '{table}': code '{code}' appears more than once in column '{key}'")]
    AmbiguousKey {
        table: String,
        key: String,
        code: String,
    },

    /// Coded observations reference codes missing from their vocabulary
    #[error("Unmatched codes in column '{key}' against table '{table}': {}", codes.join(", "))]
    UnmatchedCodes {
        table: String,
        key: String,
        codes: Vec<String>,
    },

    /// Question column range for the appraisal reshape does not fit the table
    #[error("Reshape column range error: {0}")]
    ReshapeColumnRange(String),

    /// Table not present in the workbook
    #[error("Missing table: {0}")]
    MissingTable(String),

    /// Column not present in a table
    #[error("Missing column '{column}' in table '{table}'")]
    MissingColumn { table: String, column: String },

    /// A data element's pipeline failed
    #[error("Element '{element}' failed: {source}")]
    Element {
        element: String,
        #[source]
        source: Box<ReviewError>,
    },

    /// Bibliographic or table parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Chart rendering error
    #[error("Render error: {0}")]
    Render(String),

    /// Network layout error
    #[error("Layout error: {0}")]
    Layout(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl ReviewError {
    /// Attach the name of the data element whose pipeline produced this error.
    pub fn in_element(self, element: &str) -> Self {
        ReviewError::Element {
            element: element.to_string(),
            source: Box::new(self),
        }
    }
}

/// Result type alias using `ReviewError`
pub type Result<T> = std::result::Result<T, ReviewError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing column error
    fn ok_or_column(self, table: &str, column: &str) -> Result<T>;

    /// Convert Option to Result with a missing table error
    fn ok_or_table(self, table: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_column(self, table: &str, column: &str) -> Result<T> {
        self.ok_or_else(|| ReviewError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    fn ok_or_table(self, table: &str) -> Result<T> {
        self.ok_or_else(|| ReviewError::MissingTable(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_message_names_element() {
        let err = ReviewError::MissingTable("trait_codes".to_string()).in_element("trait");
        assert_eq!(
            err.to_string(),
            "Element 'trait' failed: Missing table: trait_codes"
        );
    }

    #[test]
    fn test_unmatched_codes_message() {
        let err = ReviewError::UnmatchedCodes {
            table: "taxon_codes".to_string(),
            key: "code".to_string(),
            codes: vec!["X".to_string(), "Y".to_string()],
        };
        assert!(err.to_string().ends_with("X, Y"));
    }
}
