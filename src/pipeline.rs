//! End-to-end pipeline: one parametrised pass per data element.
//!
//! Each element runs join -> optional review join -> aggregate -> outputs,
//! where the outputs are a summary CSV, a reference (legend) CSV and a chart.
//! The appraisal and network passes follow the same shape.

use crate::appraisal::{to_long, LONG_COLUMNS};
use crate::bibliography;
use crate::chart::{self, BarMeasure, BarOrder, PaletteKind};
use crate::config::{AppraisalSpec, ElementSpec, NetworkSpec, PipelineConfig};
use crate::crosstab::{aggregate, aggregate_with, CrossTab};
use crate::error::{ReviewError, Result};
use crate::join::{ensure_unique_key, join_with, JoinSpec};
use crate::network::{build_network, layout, Adjacency};
use crate::reference::{reference, reference_table, ReferenceEntry};
use crate::table::{Table, Workbook};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of one element pass
#[derive(Debug, Clone)]
pub struct ElementOutcome {
    pub name: String,
    /// Rows that went into the aggregation
    pub rows: usize,
    pub summary: CrossTab,
    pub reference: Vec<ReferenceEntry>,
    pub chart: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppraisalOutcome {
    pub reviews: usize,
    pub long: Table,
    pub heatmap: PathBuf,
    pub scores: PathBuf,
}

#[derive(Debug, Clone)]
pub struct NetworkOutcome {
    pub name: String,
    pub nodes: usize,
    pub edges: usize,
    /// Nodes actually drawn after capping and isolate removal
    pub drawn: usize,
    pub chart: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub elements: Vec<ElementOutcome>,
    pub appraisal: Option<AppraisalOutcome>,
    pub networks: Vec<NetworkOutcome>,
}

/// Create `<base>/<YYYYmmdd_HHMMSS>` for one run
pub fn create_output_folder(base: &Path) -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let folder = base.join(timestamp);
    std::fs::create_dir_all(&folder)?;
    Ok(folder)
}

fn save_table(table: &Table, path: &Path) -> Result<()> {
    table.write_csv(path)?;
    info!(path = %path.display(), rows = table.len(), "Saved");
    Ok(())
}

/// The review table with every review-level attribute resolved.
///
/// Fails with `AmbiguousKey` when a review id appears twice.
pub fn review_context(workbook: &Workbook, config: &PipelineConfig) -> Result<Table> {
    let review = &config.review;
    let mut context = workbook.get(&review.table)?.clone();
    ensure_unique_key(&context, &review.id_column)?;

    for attr in &review.attributes {
        let vocabulary = workbook.get(&attr.vocabulary)?;
        let spec = JoinSpec::on(&attr.key)
            .right_key(&attr.vocabulary_key)
            .prefix(&attr.name)
            .policy(config.unmatched);
        context = join_with(&context, vocabulary, &spec)?;
    }
    Ok(context)
}

/// Observations of one element with vocabulary (and review) columns attached
pub fn prepare_element(
    workbook: &Workbook,
    config: &PipelineConfig,
    context: Option<&Table>,
    spec: &ElementSpec,
) -> Result<Table> {
    let observations = workbook.get(&spec.observations)?;
    let mut joined = match &spec.vocabulary {
        Some(vocab) => {
            let vocabulary = workbook.get(vocab)?;
            let join = JoinSpec::on(&spec.key)
                .right_key(&spec.vocabulary_key)
                .policy(config.unmatched);
            join_with(observations, vocabulary, &join)?
        }
        None => observations.clone(),
    };

    if spec.with_review {
        let owned;
        let context = match context {
            Some(c) => c,
            None => {
                owned = review_context(workbook, config)?;
                &owned
            }
        };
        let join = JoinSpec::on(&config.review.id_column).policy(config.unmatched);
        joined = join_with(&joined, context, &join)?;
    }

    Ok(joined.with_name(spec.name.clone()))
}

/// Reference entries of one element, without rendering anything
pub fn element_reference(
    workbook: &Workbook,
    config: &PipelineConfig,
    name: &str,
) -> Result<Vec<ReferenceEntry>> {
    let spec = config.element(name)?;
    if spec.vocabulary.is_none() {
        return Err(ReviewError::Config(format!(
            "Element '{}' has no vocabulary",
            name
        ))
        .in_element(name));
    }
    let mut with_vocab = spec.clone();
    with_vocab.with_review = false;

    prepare_element(workbook, config, None, &with_vocab)
        .and_then(|joined| {
            reference(
                &joined,
                &spec.key,
                &spec.label_column,
                &spec.description_column,
            )
        })
        .map_err(|e| e.in_element(name))
}

/// Run one element and write its outputs into `out_dir`
pub fn run_element(
    workbook: &Workbook,
    config: &PipelineConfig,
    context: Option<&Table>,
    spec: &ElementSpec,
    out_dir: &Path,
) -> Result<ElementOutcome> {
    run_element_inner(workbook, config, context, spec, out_dir).map_err(|e| e.in_element(&spec.name))
}

fn run_element_inner(
    workbook: &Workbook,
    config: &PipelineConfig,
    context: Option<&Table>,
    spec: &ElementSpec,
    out_dir: &Path,
) -> Result<ElementOutcome> {
    let joined = prepare_element(workbook, config, context, spec)?;
    if joined.is_empty() {
        warn!(element = %spec.name, "No observations; chart will be empty");
    }

    let summary = aggregate_with(&joined, &spec.dim1, spec.dim2.as_deref(), spec.denominator)?;
    save_table(
        &summary.to_table(&format!("{}_summary", spec.name))?,
        &out_dir.join(format!("{}_summary.csv", spec.name)),
    )?;

    let entries = match spec.vocabulary {
        Some(_) => {
            let entries = reference(&joined, &spec.key, &spec.label_column, &spec.description_column)?;
            let name = format!("{}_reference", spec.name);
            save_table(&reference_table(&name, &entries)?, &out_dir.join(format!("{}.csv", name)))?;
            entries
        }
        None => Vec::new(),
    };

    let chart_path = out_dir.join(format!("{}.svg", spec.name));
    let scale = config.appraisal.as_ref().map(|a| a.scale.clone()).unwrap_or_default();
    match spec.dim2 {
        Some(_) => chart::render_stacked_bar(
            &chart_path,
            &spec.title,
            &summary,
            spec.order,
            spec.measure,
            &spec.palette,
            &scale,
        )?,
        None => chart::render_ranked_bar(&chart_path, &spec.title, &summary, spec.order, spec.measure)?,
    }

    info!(element = %spec.name, rows = joined.len(), groups = summary.rows.len(), "Element done");
    Ok(ElementOutcome {
        name: spec.name.clone(),
        rows: joined.len(),
        summary,
        reference: entries,
        chart: chart_path,
    })
}

/// Reshape the assessment sheet and draw its heatmap and score bars
pub fn run_appraisal(workbook: &Workbook, spec: &AppraisalSpec, out_dir: &Path) -> Result<AppraisalOutcome> {
    let inner = || -> Result<AppraisalOutcome> {
        let wide = workbook.get(&spec.table)?;
        let long = to_long(wide, &spec.id_column, &spec.questions, &spec.comment_suffix)?;
        save_table(&long, &out_dir.join("appraisal_long.csv"))?;

        let heatmap = out_dir.join("appraisal_heatmap.svg");
        chart::render_heatmap(&heatmap, "Critical appraisal by review", &long, &spec.scale)?;

        let [_, question, score] = LONG_COLUMNS;
        let tab = aggregate(&long, question, Some(score))?;
        save_table(&tab.to_table("appraisal_scores")?, &out_dir.join("appraisal_scores_summary.csv"))?;

        let scores = out_dir.join("appraisal_scores.svg");
        chart::render_stacked_bar(
            &scores,
            "Critical appraisal scores per question",
            &tab,
            BarOrder::Label,
            BarMeasure::Count,
            &PaletteKind::Score,
            &spec.scale,
        )?;

        Ok(AppraisalOutcome {
            reviews: wide.len(),
            long,
            heatmap,
            scores,
        })
    };
    inner().map_err(|e| e.in_element("appraisal"))
}

/// Build, export and draw one bibliometric network
pub fn run_network(records: &Table, spec: &NetworkSpec, out_dir: &Path) -> Result<NetworkOutcome> {
    let inner = || -> Result<NetworkOutcome> {
        let adjacency: Adjacency = build_network(records, spec.relation, spec.field, spec.remove_multiple)?;
        let edges_name = format!("{}_edges", spec.name);
        save_table(
            &adjacency.edge_table(&edges_name)?,
            &out_dir.join(format!("{}.csv", edges_name)),
        )?;

        let positioned = layout(&adjacency, &spec.layout)?;
        let chart_path = out_dir.join(format!("{}.svg", spec.name));
        if positioned.nodes.is_empty() {
            chart::render_empty(&chart_path, &spec.title)?;
        } else {
            chart::render_network(&chart_path, &spec.title, &positioned)?;
        }

        Ok(NetworkOutcome {
            name: spec.name.clone(),
            nodes: adjacency.len(),
            edges: adjacency.edges().len(),
            drawn: positioned.nodes.len(),
            chart: chart_path,
        })
    };
    inner().map_err(|e| e.in_element(&spec.name))
}

/// Run every configured pass; stops at the first failing element.
pub fn run(
    workbook: &Workbook,
    bibliography: Option<&Path>,
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    let context = if config.elements.iter().any(|e| e.with_review) {
        Some(review_context(workbook, config).map_err(|e| e.in_element("review_info"))?)
    } else {
        None
    };

    for spec in &config.elements {
        summary
            .elements
            .push(run_element(workbook, config, context.as_ref(), spec, out_dir)?);
    }

    if let Some(appraisal) = &config.appraisal {
        summary.appraisal = Some(run_appraisal(workbook, appraisal, out_dir)?);
    }

    match bibliography {
        Some(path) => {
            let records = bibliography::load(path).map_err(|e| e.in_element("bibliography"))?;
            for spec in &config.networks {
                summary.networks.push(run_network(&records, spec, out_dir)?);
            }
        }
        None if !config.networks.is_empty() => {
            info!("No bibliography given; skipping networks");
        }
        None => {}
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appraisal::QuestionColumns;
    use crate::config::{AttributeSpec, ReviewSpec};
    use crate::crosstab::Denominator;
    use crate::join::UnmatchedPolicy;
    use crate::network::{EntityField, LayoutAlgorithm, LayoutParams, Relation};
    use crate::table::table_of;
    use tempfile::TempDir;

    fn workbook() -> Workbook {
        let mut wb = Workbook::new();
        wb.insert(table_of(
            "review_info",
            &["review_id", "discipline_code"],
            &[&["R1", "1"], &["R2", "2"], &["R3", "1"]],
        ));
        wb.insert(table_of(
            "discipline_codes",
            &["code", "label", "description"],
            &[&["1", "Biology", "Life sciences"], &["2", "Anthropology", "Human cultures"]],
        ));
        wb.insert(table_of(
            "taxon",
            &["review_id", "taxon_code"],
            &[&["R1", "M"], &["R1", "B"], &["R2", "M"], &["R3", "M"]],
        ));
        wb.insert(table_of(
            "taxon_codes",
            &["code", "label", "description"],
            &[&["M", "Mammals", ""], &["B", "Birds", ""]],
        ));
        wb.insert(table_of(
            "assessment",
            &["review_id", "Q1", "Q1_comment", "Q2"],
            &[&["R1", "Gold", "ok", "Red"], &["R2", "Green", "", "Amber"]],
        ));
        wb
    }

    fn config() -> PipelineConfig {
        let taxon = ElementSpec {
            name: "taxon".to_string(),
            title: "Taxon".to_string(),
            observations: "taxon".to_string(),
            vocabulary: Some("taxon_codes".to_string()),
            key: "taxon_code".to_string(),
            vocabulary_key: "code".to_string(),
            label_column: "label".to_string(),
            description_column: "description".to_string(),
            dim1: "label".to_string(),
            dim2: Some("discipline_label".to_string()),
            with_review: true,
            denominator: Denominator::GrandTotal,
            order: BarOrder::Count,
            measure: BarMeasure::Count,
            palette: PaletteKind::Categorical,
        };
        let discipline = ElementSpec {
            name: "discipline".to_string(),
            title: "Discipline".to_string(),
            observations: "review_info".to_string(),
            vocabulary: Some("discipline_codes".to_string()),
            key: "discipline_code".to_string(),
            dim2: None,
            with_review: false,
            measure: BarMeasure::Percent,
            ..taxon.clone()
        };

        PipelineConfig {
            unmatched: UnmatchedPolicy::Warn,
            review: ReviewSpec {
                table: "review_info".to_string(),
                id_column: "review_id".to_string(),
                attributes: vec![AttributeSpec {
                    name: "discipline".to_string(),
                    key: "discipline_code".to_string(),
                    vocabulary: "discipline_codes".to_string(),
                    vocabulary_key: "code".to_string(),
                }],
            },
            elements: vec![discipline, taxon],
            appraisal: Some(AppraisalSpec {
                table: "assessment".to_string(),
                id_column: "review_id".to_string(),
                questions: QuestionColumns::Span {
                    first: "Q1".to_string(),
                    last: "Q2".to_string(),
                },
                comment_suffix: "_comment".to_string(),
                scale: Default::default(),
            }),
            networks: vec![NetworkSpec {
                name: "keywords".to_string(),
                title: "Keywords".to_string(),
                relation: Relation::CoOccurrence,
                field: EntityField::Keywords,
                remove_multiple: false,
                layout: LayoutParams {
                    algorithm: LayoutAlgorithm::Circle,
                    ..Default::default()
                },
            }],
        }
    }

    #[test]
    fn test_review_context_resolves_attributes() -> Result<()> {
        let context = review_context(&workbook(), &config())?;
        assert_eq!(context.get(1, "discipline_label"), Some("Anthropology"));
        assert_eq!(context.get(0, "discipline_description"), Some("Life sciences"));
        Ok(())
    }

    #[test]
    fn test_duplicate_review_id_is_ambiguous() {
        let mut wb = workbook();
        wb.insert(table_of(
            "review_info",
            &["review_id", "discipline_code"],
            &[&["R1", "1"], &["R1", "2"]],
        ));
        assert!(matches!(
            review_context(&wb, &config()),
            Err(ReviewError::AmbiguousKey { .. })
        ));
    }

    #[test]
    fn test_element_with_review_breakdown() -> Result<()> {
        let dir = TempDir::new()?;
        let cfg = config();
        let outcome = run_element(&workbook(), &cfg, None, &cfg.elements[1], dir.path())?;

        assert_eq!(outcome.rows, 4);
        assert_eq!(outcome.summary.total(), 4);
        let first = &outcome.summary.rows[0];
        assert_eq!(first.dim1.as_deref(), Some("Mammals"));
        assert_eq!(first.dim2.as_deref(), Some("Biology"));
        assert_eq!(first.count, 2);
        assert!((first.percent - 50.0).abs() < 1e-9);

        let codes: Vec<_> = outcome.reference.iter().filter_map(|e| e.code.as_deref()).collect();
        assert_eq!(codes, vec!["B", "M"]);
        assert!(dir.path().join("taxon_summary.csv").exists());
        assert!(dir.path().join("taxon_reference.csv").exists());
        assert!(outcome.chart.exists());
        Ok(())
    }

    #[test]
    fn test_unmatched_code_fails_under_strict_policy() {
        let mut wb = workbook();
        wb.insert(table_of(
            "taxon",
            &["review_id", "taxon_code"],
            &[&["R1", "M"], &["R2", "Z"]],
        ));
        let mut cfg = config();
        cfg.unmatched = UnmatchedPolicy::Fail;
        let dir = TempDir::new().expect("tempdir");

        let err = run_element(&wb, &cfg, None, &cfg.elements[1], dir.path()).expect_err("unmatched");
        match err {
            ReviewError::Element { element, source } => {
                assert_eq!(element, "taxon");
                assert!(matches!(*source, ReviewError::UnmatchedCodes { ref codes, .. } if codes == &["Z"]));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_observations_render_empty_chart() -> Result<()> {
        let mut wb = workbook();
        wb.insert(table_of("taxon", &["review_id", "taxon_code"], &[]));
        let dir = TempDir::new()?;
        let cfg = config();
        let outcome = run_element(&wb, &cfg, None, &cfg.elements[1], dir.path())?;
        assert!(outcome.summary.is_empty());
        assert!(outcome.chart.exists());
        Ok(())
    }

    #[test]
    fn test_missing_vocabulary_names_element() {
        let mut cfg = config();
        cfg.elements[1].vocabulary = Some("no_such_codes".to_string());
        let dir = TempDir::new().expect("tempdir");
        let err = run_element(&workbook(), &cfg, None, &cfg.elements[1], dir.path()).expect_err("missing");
        assert!(err.to_string().contains("'taxon'"));
        assert!(err.to_string().contains("no_such_codes"));
    }

    #[test]
    fn test_element_reference_only() -> Result<()> {
        let entries = element_reference(&workbook(), &config(), "discipline")?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label.as_deref(), Some("Biology"));
        Ok(())
    }

    #[test]
    fn test_appraisal_outputs() -> Result<()> {
        let dir = TempDir::new()?;
        let cfg = config();
        let spec = cfg.appraisal.as_ref().expect("appraisal");
        let outcome = run_appraisal(&workbook(), spec, dir.path())?;
        assert_eq!(outcome.reviews, 2);
        assert_eq!(outcome.long.len(), 4);
        assert!(outcome.heatmap.exists());
        assert!(outcome.scores.exists());
        assert!(dir.path().join("appraisal_long.csv").exists());
        Ok(())
    }

    #[test]
    fn test_full_run_with_bibliography() -> Result<()> {
        let dir = TempDir::new()?;
        let bib = dir.path().join("records.csv");
        std::fs::write(&bib, "AU,DE\n\"A;B\",\"EPIGENETICS;DIET\"\n\"B;C\",\"DIET;CULTURE\"\n")?;

        let summary = run(&workbook(), Some(&bib), &config(), dir.path())?;
        assert_eq!(summary.elements.len(), 2);
        assert!(summary.appraisal.is_some());
        assert_eq!(summary.networks.len(), 1);
        assert_eq!(summary.networks[0].nodes, 3);
        assert_eq!(summary.networks[0].edges, 2);
        assert!(dir.path().join("keywords_edges.csv").exists());
        Ok(())
    }

    #[test]
    fn test_output_folder_is_created() -> Result<()> {
        let dir = TempDir::new()?;
        let folder = create_output_folder(dir.path())?;
        assert!(folder.is_dir());
        assert!(folder.starts_with(dir.path()));
        Ok(())
    }
}
