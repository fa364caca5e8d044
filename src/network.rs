//! Bibliometric networks: co-occurrence and collaboration adjacency, layout.
//!
//! Edges join every pair of distinct entities named in the same record.
//! Edge weights count the records a pair shares unless `remove_multiple`
//! collapses them to 1. Positioning is handed to `fdg` (Fruchterman-Reingold
//! over a `petgraph` graph) or a plain circle.

use crate::bibliography::{self, split_field};
use crate::error::{ReviewError, Result};
use crate::table::Table;
use fdg::fruchterman_reingold::{FruchtermanReingold, FruchtermanReingoldConfiguration};
use fdg::simple::Center;
use fdg::{init_force_graph_uniform, Force, ForceGraph};
use petgraph::stable_graph::StableGraph;
use petgraph::Directed;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Kind of relation an edge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    CoOccurrence,
    Collaboration,
}

/// Multi-valued record field the network is built over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityField {
    /// Author keywords (`DE`)
    Keywords,
    /// Keywords Plus (`ID`)
    KeywordsPlus,
    Authors,
    /// Countries derived from affiliations (`AU_CO`)
    Countries,
}

impl EntityField {
    /// Record table column holding this field
    pub fn tag(self) -> &'static str {
        match self {
            EntityField::Keywords => bibliography::AUTHOR_KEYWORDS,
            EntityField::KeywordsPlus => bibliography::KEYWORDS_PLUS,
            EntityField::Authors => bibliography::AUTHORS,
            EntityField::Countries => bibliography::COUNTRIES,
        }
    }
}

/// One undirected edge of the adjacency structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: u32,
}

/// Symmetric weighted adjacency between entities
#[derive(Debug, Clone, PartialEq)]
pub struct Adjacency {
    pub relation: Relation,
    pub field: EntityField,
    /// Entity names, in order of first appearance
    pub nodes: Vec<String>,
    /// Number of records naming each entity
    pub occurrences: Vec<usize>,
    /// Keyed by `(i, j)` with `i < j`; absent means no edge
    weights: BTreeMap<(usize, usize), u32>,
}

impl Adjacency {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n == name)
    }

    /// Edge weight between two entities (0 when unconnected)
    pub fn weight(&self, a: &str, b: &str) -> u32 {
        match (self.index_of(a), self.index_of(b)) {
            (Some(i), Some(j)) if i != j => self.weights.get(&(i.min(j), i.max(j))).copied().unwrap_or(0),
            _ => 0,
        }
    }

    /// Number of distinct neighbours of every node
    pub fn degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.nodes.len()];
        for &(i, j) in self.weights.keys() {
            degrees[i] += 1;
            degrees[j] += 1;
        }
        degrees
    }

    /// Dense symmetric matrix with a zero diagonal
    pub fn matrix(&self) -> Vec<Vec<u32>> {
        let n = self.nodes.len();
        let mut m = vec![vec![0; n]; n];
        for (&(i, j), &w) in &self.weights {
            m[i][j] = w;
            m[j][i] = w;
        }
        m
    }

    /// Edges as named pairs, `source` being the earlier-seen entity
    pub fn edges(&self) -> Vec<Edge> {
        self.weights
            .iter()
            .map(|(&(i, j), &weight)| Edge {
                source: self.nodes[i].clone(),
                target: self.nodes[j].clone(),
                weight,
            })
            .collect()
    }

    /// Tidy `source,target,weight` edge list
    pub fn edge_table(&self, name: &str) -> Result<Table> {
        let rows = self
            .edges()
            .into_iter()
            .map(|e| vec![Some(e.source), Some(e.target), Some(e.weight.to_string())])
            .collect();
        Table::from_rows(
            name,
            vec!["source".to_string(), "target".to_string(), "weight".to_string()],
            rows,
        )
    }
}

/// Build the adjacency of `field` across all records.
///
/// Entities are trimmed and upper-cased and counted once per record. For
/// [`EntityField::Countries`] the country column is derived from the
/// affiliations first when the table does not carry it.
pub fn build_network(
    records: &Table,
    relation: Relation,
    field: EntityField,
    remove_multiple: bool,
) -> Result<Adjacency> {
    let records: Cow<'_, Table> = if field == EntityField::Countries {
        Cow::Owned(bibliography::extract_countries(records)?)
    } else {
        Cow::Borrowed(records)
    };
    let idx = records.require_column(field.tag())?;

    let mut nodes: Vec<String> = Vec::new();
    let mut occurrences: Vec<usize> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut weights: BTreeMap<(usize, usize), u32> = BTreeMap::new();

    for row in records.rows() {
        let Some(value) = row[idx].as_deref() else {
            continue;
        };

        let mut members: Vec<usize> = Vec::new();
        for entity in split_field(value) {
            let entity = entity.to_uppercase();
            let id = *index.entry(entity.clone()).or_insert_with(|| {
                nodes.push(entity);
                occurrences.push(0);
                nodes.len() - 1
            });
            if !members.contains(&id) {
                members.push(id);
                occurrences[id] += 1;
            }
        }

        for (a, &i) in members.iter().enumerate() {
            for &j in &members[a + 1..] {
                let w = weights.entry((i.min(j), i.max(j))).or_insert(0);
                *w = if remove_multiple { 1 } else { *w + 1 };
            }
        }
    }

    debug!(
        field = field.tag(),
        nodes = nodes.len(),
        edges = weights.len(),
        "Built adjacency"
    );

    Ok(Adjacency {
        relation,
        field,
        nodes,
        occurrences,
        weights,
    })
}

/// Layout algorithm requested from the graph layout routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutAlgorithm {
    #[default]
    FruchtermanReingold,
    Circle,
}

/// Parameters of a layout request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    pub algorithm: LayoutAlgorithm,
    /// Keep at most this many nodes, highest degree first
    pub max_nodes: usize,
    /// Multiplier on node radius
    pub size_scale: f32,
    /// Multiplier on label font size
    pub label_scale: f32,
    /// Force simulation steps
    pub iterations: usize,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            algorithm: LayoutAlgorithm::FruchtermanReingold,
            max_nodes: 30,
            size_scale: 1.0,
            label_scale: 1.0,
            iterations: 500,
        }
    }
}

/// A positioned node; coordinates are normalised to `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedNode {
    pub label: String,
    pub x: f32,
    pub y: f32,
    /// Radius in pixels
    pub size: f32,
    /// Label font size in pixels
    pub label_size: f32,
}

/// Edge between two positioned nodes (indices into `nodes`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedEdge {
    pub source: usize,
    pub target: usize,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkLayout {
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<PositionedEdge>,
}

impl NetworkLayout {
    pub fn max_weight(&self) -> u32 {
        self.edges.iter().map(|e| e.weight).max().unwrap_or(0)
    }
}

const BASE_NODE_RADIUS: f32 = 3.0;
const NODE_RADIUS_RANGE: f32 = 12.0;
const BASE_LABEL_SIZE: f32 = 9.0;
const LABEL_SIZE_RANGE: f32 = 7.0;

/// Select the nodes to draw and request their positions.
///
/// Nodes are ranked by degree (ties keep first-appearance order), capped
/// at `max_nodes`, and nodes left without an edge among the kept ones are
/// dropped.
pub fn layout(adjacency: &Adjacency, params: &LayoutParams) -> Result<NetworkLayout> {
    let degrees = adjacency.degrees();
    let mut ranked: Vec<usize> = (0..adjacency.len()).collect();
    ranked.sort_by(|&a, &b| degrees[b].cmp(&degrees[a]));
    ranked.truncate(params.max_nodes);

    let kept_edges: Vec<(usize, usize, u32)> = adjacency
        .weights
        .iter()
        .filter(|((i, j), _)| ranked.contains(i) && ranked.contains(j))
        .map(|(&(i, j), &w)| (i, j, w))
        .collect();

    let mut selected: Vec<usize> = ranked
        .into_iter()
        .filter(|n| kept_edges.iter().any(|&(i, j, _)| i == *n || j == *n))
        .collect();
    selected.sort_unstable();

    if selected.is_empty() {
        info!(field = adjacency.field.tag(), "No connected nodes to lay out");
        return Ok(NetworkLayout::default());
    }

    let local: HashMap<usize, usize> = selected.iter().enumerate().map(|(l, &g)| (g, l)).collect();
    let edges: Vec<PositionedEdge> = kept_edges
        .iter()
        .map(|&(i, j, weight)| PositionedEdge {
            source: local[&i],
            target: local[&j],
            weight,
        })
        .collect();

    let positions = match params.algorithm {
        LayoutAlgorithm::FruchtermanReingold => {
            fruchterman_reingold(selected.len(), &edges, params.iterations)?
        }
        LayoutAlgorithm::Circle => circle(selected.len()),
    };
    let positions = normalise(&positions);

    let local_degree: Vec<usize> = (0..selected.len())
        .map(|l| edges.iter().filter(|e| e.source == l || e.target == l).count())
        .collect();
    let max_degree = local_degree.iter().copied().max().unwrap_or(1).max(1) as f32;

    let nodes = selected
        .iter()
        .enumerate()
        .map(|(l, &g)| {
            let share = local_degree[l] as f32 / max_degree;
            PositionedNode {
                label: adjacency.nodes[g].clone(),
                x: positions[l].0,
                y: positions[l].1,
                size: params.size_scale * (BASE_NODE_RADIUS + NODE_RADIUS_RANGE * share.sqrt()),
                label_size: params.label_scale * (BASE_LABEL_SIZE + LABEL_SIZE_RANGE * share),
            }
        })
        .collect();

    Ok(NetworkLayout { nodes, edges })
}

fn fruchterman_reingold(
    n: usize,
    edges: &[PositionedEdge],
    iterations: usize,
) -> Result<Vec<(f32, f32)>> {
    let mut graph: StableGraph<usize, u32, Directed> = StableGraph::default();
    let ids: Vec<_> = (0..n).map(|i| graph.add_node(i)).collect();
    for e in edges {
        graph.add_edge(ids[e.source], ids[e.target], e.weight);
    }

    let mut force_graph: ForceGraph<f32, 2, usize, u32, Directed> =
        init_force_graph_uniform(graph, 10.0);

    let mut fr_force = FruchtermanReingold {
        conf: FruchtermanReingoldConfiguration {
            dt: 0.02,
            cooloff_factor: 0.975,
            scale: 50.0,
        },
        ..Default::default()
    };
    fr_force.apply_many(&mut force_graph, iterations);
    Center::default().apply(&mut force_graph);

    let mut positions = vec![(0.0, 0.0); n];
    for (i, location) in force_graph.node_weights() {
        if !location.x.is_finite() || !location.y.is_finite() {
            return Err(ReviewError::Layout("force layout diverged".to_string()));
        }
        positions[*i] = (location.x, location.y);
    }
    Ok(positions)
}

fn circle(n: usize) -> Vec<(f32, f32)> {
    (0..n)
        .map(|i| {
            let angle = i as f32 / n as f32 * std::f32::consts::TAU;
            (angle.cos(), angle.sin())
        })
        .collect()
}

/// Rescale positions to fill `[0, 1]` on the larger axis, centred
fn normalise(positions: &[(f32, f32)]) -> Vec<(f32, f32)> {
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (f32::MAX, f32::MIN, f32::MAX, f32::MIN);
    for &(x, y) in positions {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    let span = (max_x - min_x).max(max_y - min_y);
    if span <= f32::EPSILON {
        return vec![(0.5, 0.5); positions.len()];
    }

    let off_x = (1.0 - (max_x - min_x) / span) / 2.0;
    let off_y = (1.0 - (max_y - min_y) / span) / 2.0;
    positions
        .iter()
        .map(|&(x, y)| ((x - min_x) / span + off_x, (y - min_y) / span + off_y))
        .collect()
}
