//! File-level dependency graph: resolved import edges, degree counts and
//! import cycles.

pub mod resolver;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ast::FileMetrics;
use crate::lang::profiles::profile_for;

pub use resolver::{ImportResolver, ModuleRoots};

/// Synthetic target of every import that does not resolve inside the job.
pub const EXTERNAL_SINK: &str = "<external>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    /// A job path or [`EXTERNAL_SINK`]
    pub target: String,
    pub relation: RelationKind,
    /// Raw import text that produced the edge
    pub specifier: String,
}

impl DependencyEdge {
    pub fn is_external(&self) -> bool {
        self.target == EXTERNAL_SINK
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDegree {
    pub fan_in: usize,
    pub fan_out: usize,
    pub external_fan_out: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub edges: Vec<DependencyEdge>,
    /// Keyed by path, every analyzed file has an entry
    pub degrees: BTreeMap<String, NodeDegree>,
    pub external_fan_in: usize,
    /// Strongly connected components with two or more files, sorted
    pub cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    pub fn internal_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(|edge| !edge.is_external())
    }

    pub fn degree(&self, path: &str) -> Option<&NodeDegree> {
        self.degrees.get(path)
    }
}

/// Builds a [`DependencyGraph`] from the import lists of a job.
pub struct DependencyGraphBuilder<'a> {
    resolver: ImportResolver<'a>,
}

impl<'a> DependencyGraphBuilder<'a> {
    /// `paths` is the full input path set of the job.
    pub fn new(paths: &'a BTreeSet<String>, roots: &'a ModuleRoots) -> Self {
        Self {
            resolver: ImportResolver::new(paths, roots),
        }
    }

    pub fn build(&self, files: &[FileMetrics]) -> DependencyGraph {
        let mut edges = Vec::new();
        let mut seen_internal: HashSet<(&str, String)> = HashSet::new();
        let mut seen_external: HashSet<(&str, &str)> = HashSet::new();

        for file in files {
            let Some(profile) = profile_for(file.language) else {
                continue;
            };
            for specifier in &file.imports {
                match self.resolver.resolve(&file.path, specifier, profile) {
                    Some(target) if target == file.path => {}
                    Some(target) => {
                        if seen_internal.insert((file.path.as_str(), target.clone())) {
                            edges.push(DependencyEdge {
                                source: file.path.clone(),
                                target,
                                relation: RelationKind::Import,
                                specifier: specifier.clone(),
                            });
                        }
                    }
                    None => {
                        if seen_external.insert((file.path.as_str(), specifier.as_str())) {
                            edges.push(DependencyEdge {
                                source: file.path.clone(),
                                target: EXTERNAL_SINK.to_string(),
                                relation: RelationKind::Import,
                                specifier: specifier.clone(),
                            });
                        }
                    }
                }
            }
        }
        edges.sort_by(|a, b| {
            (&a.source, &a.target, &a.specifier).cmp(&(&b.source, &b.target, &b.specifier))
        });

        let mut degrees: BTreeMap<String, NodeDegree> = files
            .iter()
            .map(|file| (file.path.clone(), NodeDegree::default()))
            .collect();
        let mut external_fan_in = 0;
        for edge in &edges {
            if edge.is_external() {
                external_fan_in += 1;
                degrees.entry(edge.source.clone()).or_default().external_fan_out += 1;
            } else {
                degrees.entry(edge.source.clone()).or_default().fan_out += 1;
                degrees.entry(edge.target.clone()).or_default().fan_in += 1;
            }
        }

        let cycles = find_cycles(&edges);
        debug!(
            "Built dependency graph: {} edges, {} cycles",
            edges.len(),
            cycles.len()
        );

        DependencyGraph {
            edges,
            degrees,
            external_fan_in,
            cycles,
        }
    }
}

fn find_cycles(edges: &[DependencyEdge]) -> Vec<Vec<String>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for edge in edges.iter().filter(|edge| !edge.is_external()) {
        let source = *nodes
            .entry(edge.source.as_str())
            .or_insert_with(|| graph.add_node(edge.source.as_str()));
        let target = *nodes
            .entry(edge.target.as_str())
            .or_insert_with(|| graph.add_node(edge.target.as_str()));
        graph.add_edge(source, target, ());
    }

    let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            let mut members: Vec<String> = component
                .into_iter()
                .filter_map(|index| graph.node_weight(index).map(|p| p.to_string()))
                .collect();
            members.sort();
            members
        })
        .collect();
    cycles.sort();
    cycles
}
