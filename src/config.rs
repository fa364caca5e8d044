//! Pipeline configuration.
//!
//! One [`PipelineConfig`] value describes every analysis: the review-level
//! attributes, the list of data elements (each a join -> aggregate -> render
//! pass), the appraisal reshape and the bibliometric networks. The default
//! encodes the umbrella review's coding sheet; a JSON file can replace it.

use crate::appraisal::{QuestionColumns, ScoreScale};
use crate::chart::{parse_hex, BarMeasure, BarOrder, PaletteKind};
use crate::crosstab::Denominator;
use crate::error::{ReviewError, Result};
use crate::join::UnmatchedPolicy;
use crate::network::{EntityField, LayoutAlgorithm, LayoutParams, Relation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

fn default_code_column() -> String {
    "code".to_string()
}

fn default_label_column() -> String {
    "label".to_string()
}

fn default_description_column() -> String {
    "description".to_string()
}

/// A review-level code resolved against its own vocabulary.
///
/// Joined columns are prefixed with `name`, e.g. `discipline_label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    /// Code column in the review table
    pub key: String,
    pub vocabulary: String,
    #[serde(default = "default_code_column")]
    pub vocabulary_key: String,
}

/// The review info table and the attributes every element can inherit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSpec {
    pub table: String,
    pub id_column: String,
    pub attributes: Vec<AttributeSpec>,
}

/// One data element: coded observations, their vocabulary and chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub name: String,
    pub title: String,
    pub observations: String,
    /// No vocabulary means the observations are aggregated as they are
    #[serde(default)]
    pub vocabulary: Option<String>,
    /// Code column in the observation table
    pub key: String,
    #[serde(default = "default_code_column")]
    pub vocabulary_key: String,
    #[serde(default = "default_label_column")]
    pub label_column: String,
    #[serde(default = "default_description_column")]
    pub description_column: String,
    pub dim1: String,
    #[serde(default)]
    pub dim2: Option<String>,
    /// Join the review attributes on the review id before aggregating
    #[serde(default)]
    pub with_review: bool,
    #[serde(default)]
    pub denominator: Denominator,
    #[serde(default)]
    pub order: BarOrder,
    #[serde(default)]
    pub measure: BarMeasure,
    #[serde(default)]
    pub palette: PaletteKind,
}

/// Critical-appraisal sheet layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppraisalSpec {
    pub table: String,
    pub id_column: String,
    pub questions: QuestionColumns,
    /// Columns ending with this suffix hold commentary and are skipped
    pub comment_suffix: String,
    pub scale: ScoreScale,
}

/// One bibliometric network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub title: String,
    pub relation: Relation,
    pub field: EntityField,
    #[serde(default)]
    pub remove_multiple: bool,
    #[serde(default)]
    pub layout: LayoutParams,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub unmatched: UnmatchedPolicy,
    pub review: ReviewSpec,
    pub elements: Vec<ElementSpec>,
    pub appraisal: Option<AppraisalSpec>,
    pub networks: Vec<NetworkSpec>,
}

impl ElementSpec {
    /// Element coded in its own table and resolved against `<name>_codes`
    fn coded(name: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            observations: name.to_string(),
            vocabulary: Some(format!("{}_codes", name)),
            key: format!("{}_code", name),
            vocabulary_key: default_code_column(),
            label_column: default_label_column(),
            description_column: default_description_column(),
            dim1: default_label_column(),
            dim2: None,
            with_review: false,
            denominator: Denominator::default(),
            order: BarOrder::default(),
            measure: BarMeasure::default(),
            palette: PaletteKind::default(),
        }
    }

    /// Review-level element stored as a column of the review table
    fn review_level(name: &str, title: &str, review_table: &str) -> Self {
        Self {
            observations: review_table.to_string(),
            ..Self::coded(name, title)
        }
    }

    /// Break the element down by review discipline
    fn by_discipline(self) -> Self {
        Self {
            dim2: Some("discipline_label".to_string()),
            with_review: true,
            measure: BarMeasure::Count,
            ..self
        }
    }
}

impl Default for ReviewSpec {
    fn default() -> Self {
        let attribute = |name: &str| AttributeSpec {
            name: name.to_string(),
            key: format!("{}_code", name),
            vocabulary: format!("{}_codes", name),
            vocabulary_key: default_code_column(),
        };
        Self {
            table: "review_info".to_string(),
            id_column: "review_id".to_string(),
            attributes: vec![attribute("discipline")],
        }
    }
}

impl Default for AppraisalSpec {
    fn default() -> Self {
        Self {
            table: "assessment".to_string(),
            id_column: "review_id".to_string(),
            questions: QuestionColumns::Span {
                first: "Q1.1".to_string(),
                last: "Q8.1".to_string(),
            },
            comment_suffix: "_comment".to_string(),
            scale: ScoreScale::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let review = ReviewSpec::default();
        let rt = review.table.clone();

        let elements = vec![
            ElementSpec::review_level("discipline", "Research discipline", &rt),
            ElementSpec::review_level("topic", "Review topic", &rt),
            ElementSpec::review_level("terminology", "Intergenerational vs transgenerational terminology", &rt)
                .by_discipline(),
            ElementSpec::review_level("mutagen", "Mutagen", &rt),
            ElementSpec::coded("transmission", "Transmission type").by_discipline(),
            ElementSpec::coded("effect_direction", "Direction of environmental effect").by_discipline(),
            ElementSpec::coded("exposure_timing", "Timing of exposure"),
            ElementSpec::coded("trait", "Descendant trait"),
            ElementSpec::coded("age", "Descendant age"),
            ElementSpec::coded("sex", "Descendant sex"),
            ElementSpec {
                order: BarOrder::Label,
                ..ElementSpec::coded("generation", "Descendant generation")
            },
            ElementSpec::coded("taxon", "Taxon").by_discipline(),
            ElementSpec {
                vocabulary: None,
                key: "year".to_string(),
                dim1: "year".to_string(),
                order: BarOrder::Label,
                measure: BarMeasure::Count,
                ..ElementSpec::coded("publication_year", "Publications per year")
            },
        ];

        let network = |name: &str, title: &str, relation, field, max_nodes| NetworkSpec {
            name: name.to_string(),
            title: title.to_string(),
            relation,
            field,
            remove_multiple: false,
            layout: LayoutParams {
                algorithm: LayoutAlgorithm::FruchtermanReingold,
                max_nodes,
                ..LayoutParams::default()
            },
        };

        Self {
            unmatched: UnmatchedPolicy::Warn,
            review,
            elements,
            appraisal: Some(AppraisalSpec::default()),
            networks: vec![
                network(
                    "keyword_cooccurrence",
                    "Keyword co-occurrence",
                    Relation::CoOccurrence,
                    EntityField::Keywords,
                    50,
                ),
                network(
                    "author_collaboration",
                    "Author collaboration",
                    Relation::Collaboration,
                    EntityField::Authors,
                    50,
                ),
                network(
                    "country_collaboration",
                    "Country collaboration",
                    Relation::Collaboration,
                    EntityField::Countries,
                    30,
                ),
            ],
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), elements = config.elements.len(), "Loaded configuration");
        Ok(config)
    }

    /// Pretty JSON form, as accepted by [`PipelineConfig::load`]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Element descriptor by name
    pub fn element(&self, name: &str) -> Result<&ElementSpec> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ReviewError::Config(format!("Unknown element '{}'", name)))
    }

    /// Check names are unique and colours parse
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in self
            .elements
            .iter()
            .map(|e| e.name.as_str())
            .chain(self.networks.iter().map(|n| n.name.as_str()))
        {
            if name.is_empty() {
                return Err(ReviewError::Config("Empty element name".to_string()));
            }
            if !seen.insert(name) {
                return Err(ReviewError::Config(format!("Duplicate element name '{}'", name)));
            }
        }

        if let Some(appraisal) = &self.appraisal {
            if appraisal.scale.levels.is_empty() {
                return Err(ReviewError::Config("Score scale has no levels".to_string()));
            }
            for level in &appraisal.scale.levels {
                parse_hex(&level.color)?;
            }
        }

        for network in &self.networks {
            if network.layout.max_nodes == 0 {
                return Err(ReviewError::Config(format!(
                    "Network '{}' must keep at least one node",
                    network.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() -> Result<()> {
        let config = PipelineConfig::default();
        config.validate()?;
        assert_eq!(config.elements.len(), 13);
        assert_eq!(config.element("taxon")?.dim2.as_deref(), Some("discipline_label"));
        assert_eq!(config.element("discipline")?.observations, "review_info");
        assert!(config.element("publication_year")?.vocabulary.is_none());
        Ok(())
    }

    #[test]
    fn test_json_round_trip() -> Result<()> {
        let config = PipelineConfig::default();
        let file = NamedTempFile::new()?;
        std::fs::write(file.path(), config.to_json()?)?;
        assert_eq!(PipelineConfig::load(file.path())?, config);
        Ok(())
    }

    #[test]
    fn test_minimal_json_fills_defaults() -> Result<()> {
        let json = r#"{
            "unmatched": "fail",
            "elements": [
                {"name": "taxon", "title": "Taxon", "observations": "taxon",
                 "vocabulary": "taxon_codes", "key": "taxon_code", "dim1": "label",
                 "denominator": "within_group"}
            ],
            "networks": []
        }"#;
        let config: PipelineConfig = serde_json::from_str(json)?;
        assert_eq!(config.unmatched, UnmatchedPolicy::Fail);
        let taxon = config.element("taxon")?;
        assert_eq!(taxon.vocabulary_key, "code");
        assert_eq!(taxon.denominator, Denominator::WithinGroup);
        assert_eq!(config.review.table, "review_info");
        Ok(())
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = PipelineConfig::default();
        let copy = config.elements[0].clone();
        config.elements.push(copy);
        assert!(matches!(config.validate(), Err(ReviewError::Config(_))));
    }

    #[test]
    fn test_unknown_element() {
        assert!(PipelineConfig::default().element("nope").is_err());
    }
}
