//! Clone clustering over function-body hashes.
//!
//! Exact clusters group functions whose identifier-normalized hashes match.
//! Near clusters group functions that only differ in literal values and are
//! reported when they are not already covered by a single exact cluster.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ast::FileMetrics;
use crate::core::config::DuplicatesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    Exact,
    Near,
}

impl ClusterKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Near => "near",
        }
    }
}

/// One function participating in a cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterMember {
    pub path: String,
    pub start_line: usize,
    pub function: String,
}

/// A group of two or more structurally identical functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    pub id: String,
    pub kind: ClusterKind,
    pub hash: String,
    pub members: Vec<ClusterMember>,
}

impl DuplicateCluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, path: &str, function: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.path == path && m.function == function)
    }
}

/// Groups function hashes across a job into [`DuplicateCluster`]s.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    min_nodes: usize,
    detect_near: bool,
}

impl DuplicateDetector {
    pub fn new(config: &DuplicatesConfig) -> Self {
        Self {
            min_nodes: config.min_nodes,
            detect_near: config.detect_near,
        }
    }

    /// Single pass over every function hash of the job.
    pub fn detect(&self, files: &[FileMetrics]) -> Vec<DuplicateCluster> {
        let mut exact: IndexMap<&str, Vec<ClusterMember>> = IndexMap::new();
        let mut near: IndexMap<&str, Vec<(ClusterMember, &str)>> = IndexMap::new();

        for file in files {
            for function in &file.hashes {
                if function.node_count < self.min_nodes {
                    continue;
                }
                let member = ClusterMember {
                    path: file.path.clone(),
                    start_line: function.start_line,
                    function: function.name.clone(),
                };
                if self.detect_near {
                    near.entry(function.near_hash.as_str())
                        .or_default()
                        .push((member.clone(), function.hash.as_str()));
                }
                exact.entry(function.hash.as_str()).or_default().push(member);
            }
        }

        let mut clusters: Vec<DuplicateCluster> = exact
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(hash, members)| build_cluster(ClusterKind::Exact, hash, members))
            .collect();

        for (hash, entries) in near {
            if entries.len() < 2 {
                continue;
            }
            let distinct_exact: BTreeSet<&str> = entries.iter().map(|(_, h)| *h).collect();
            if distinct_exact.len() < 2 {
                continue;
            }
            let members = entries.into_iter().map(|(member, _)| member).collect();
            clusters.push(build_cluster(ClusterKind::Near, hash, members));
        }

        clusters.sort_by(|a, b| {
            b.size()
                .cmp(&a.size())
                .then_with(|| a.hash.cmp(&b.hash))
                .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
        });

        debug!("Detected {} duplicate clusters", clusters.len());
        clusters
    }
}

fn build_cluster(kind: ClusterKind, hash: &str, mut members: Vec<ClusterMember>) -> DuplicateCluster {
    members.sort();
    DuplicateCluster {
        id: format!("{}-{}", kind.as_str(), &hash[..hash.len().min(12)]),
        kind,
        hash: hash.to_string(),
        members,
    }
}
