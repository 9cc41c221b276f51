//! Language-agnostic metric extraction over a parsed syntax tree.
//!
//! One iterative pre-order pass computes LOC, per-function cyclomatic
//! complexity and nesting, function spans and import specifiers. Function
//! bodies are hashed afterwards, one subtree at a time.

use tree_sitter::{Node, Tree};

use super::hashing::hash_function_body;
use super::imports::collect_imports;
use super::metrics::{FileMetrics, FunctionHash, FunctionSpan};
use crate::core::errors::{PulseError, Result};
use crate::core::model::FileRecord;
use crate::lang::profiles::{profile_for, LanguageProfile, BINDING_FIELDS, BINDING_PASSTHROUGH};

struct Frame<'t> {
    node: Node<'t>,
    /// Control-structure depth inside the owning function
    depth: u32,
    owner: Option<usize>,
}

struct FunctionAcc<'t> {
    node: Node<'t>,
    name: String,
    cyclomatic: u32,
    nesting: u32,
}

/// Walks one syntax tree with the profile of its language.
pub struct TreeWalker<'a> {
    profile: &'static LanguageProfile,
    source: &'a str,
}

impl<'a> TreeWalker<'a> {
    pub fn new(profile: &'static LanguageProfile, source: &'a str) -> Self {
        Self { profile, source }
    }

    /// Compute [`FileMetrics`] for `file` from its parsed `tree`.
    pub fn extract(&self, file: &FileRecord, tree: &Tree) -> FileMetrics {
        let root = tree.root_node();
        let line_count = self.source.lines().count().max(1);
        let mut code_rows = vec![false; line_count + 1];
        let mut functions: Vec<FunctionAcc<'_>> = Vec::new();
        let mut imports = Vec::new();

        let mut stack = vec![Frame {
            node: root,
            depth: 0,
            owner: None,
        }];

        while let Some(Frame { node, depth, owner }) = stack.pop() {
            let kind = node.kind();
            if self.profile.is_comment(kind) {
                continue;
            }

            if node.child_count() == 0 {
                self.mark_code_rows(node, &mut code_rows);
                continue;
            }

            collect_imports(node, self.source, self.profile.import_rules, &mut imports);

            let (owner, mut child_depth) = if self.profile.is_function(kind) {
                functions.push(FunctionAcc {
                    node,
                    name: self.function_name(node),
                    cyclomatic: 1,
                    nesting: 0,
                });
                (Some(functions.len() - 1), 0)
            } else {
                (owner, depth)
            };

            if let Some(index) = owner {
                let acc = &mut functions[index];
                if self.is_decision(node) {
                    acc.cyclomatic += 1;
                }
                if self.profile.is_nesting(kind) && !self.is_else_if(node) {
                    child_depth += 1;
                    acc.nesting = acc.nesting.max(child_depth);
                }
            }

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev().map(|child| Frame {
                node: child,
                depth: child_depth,
                owner,
            }));
        }

        let spans: Vec<FunctionSpan> = functions
            .iter()
            .map(|acc| FunctionSpan {
                name: acc.name.clone(),
                start_line: acc.node.start_position().row + 1,
                end_line: acc.node.end_position().row + 1,
                cyclomatic: acc.cyclomatic,
                nesting: acc.nesting,
            })
            .collect();

        let hashes = functions
            .iter()
            .map(|acc| {
                let body = hash_function_body(acc.node, self.source, self.profile);
                FunctionHash {
                    name: acc.name.clone(),
                    start_line: acc.node.start_position().row + 1,
                    hash: body.exact,
                    near_hash: body.near,
                    node_count: body.node_count,
                }
            })
            .collect();

        let cyclomatic = spans.iter().map(|s| s.cyclomatic).max().unwrap_or(1);
        let cyclomatic_sum = if spans.is_empty() {
            1
        } else {
            spans.iter().map(|s| s.cyclomatic).sum()
        };
        let max_nesting = spans.iter().map(|s| s.nesting).max().unwrap_or(0);

        FileMetrics {
            path: file.path.clone(),
            language: file.language,
            size_bytes: file.size_bytes,
            loc: code_rows.iter().filter(|row| **row).count(),
            cyclomatic,
            cyclomatic_sum,
            max_nesting,
            functions: spans,
            imports,
            hashes,
        }
    }

    fn mark_code_rows(&self, leaf: Node<'_>, rows: &mut [bool]) {
        if leaf.is_missing() || leaf.start_byte() == leaf.end_byte() {
            return;
        }
        let Some(text) = self.source.get(leaf.start_byte()..leaf.end_byte()) else {
            return;
        };
        let first_row = leaf.start_position().row;
        for (offset, line) in text.split('\n').enumerate() {
            if !line.trim().is_empty() {
                if let Some(row) = rows.get_mut(first_row + offset) {
                    *row = true;
                }
            }
        }
    }

    fn is_decision(&self, node: Node<'_>) -> bool {
        let kind = node.kind();
        if self.profile.decision_kinds.contains(&kind) {
            return true;
        }
        if let Some((_, field)) = self.profile.guard_fields.iter().find(|(k, _)| *k == kind) {
            return node.child_by_field_name(field).is_some();
        }
        if self.profile.logical_kinds.contains(&kind) {
            return node
                .child_by_field_name("operator")
                .map(|op| self.profile.logical_operators.contains(&op.kind()))
                .unwrap_or(false);
        }
        false
    }

    /// `else if` continuations stay at the depth of the chain's first `if`.
    fn is_else_if(&self, node: Node<'_>) -> bool {
        if !self.profile.if_kinds.contains(&node.kind()) {
            return false;
        }
        let Some(parent) = node.parent() else {
            return false;
        };
        if self.profile.else_kinds.contains(&parent.kind()) {
            return true;
        }
        self.profile.if_kinds.contains(&parent.kind())
            && parent
                .child_by_field_name("alternative")
                .map(|alt| alt.id() == node.id())
                .unwrap_or(false)
    }

    fn function_name(&self, node: Node<'_>) -> String {
        if let Some(name) = node.child_by_field_name("name") {
            return self.text(name);
        }
        self.binding_name(node)
            .unwrap_or_else(|| format!("<anonymous@{}>", node.start_position().row + 1))
    }

    /// Name bound to an anonymous function by its enclosing declaration.
    fn binding_name(&self, node: Node<'_>) -> Option<String> {
        let mut parent = node.parent()?;
        while BINDING_PASSTHROUGH.contains(&parent.kind()) {
            parent = parent.parent()?;
        }
        let (_, field) = BINDING_FIELDS
            .iter()
            .find(|(kind, _)| *kind == parent.kind())?;
        let target = parent.child_by_field_name(field)?;
        let target = if BINDING_PASSTHROUGH.contains(&target.kind()) {
            target.named_child(0)?
        } else {
            target
        };
        let name = self.text(target);
        let name = name.trim_matches(|c| c == '"' || c == '\'');
        (!name.is_empty()).then(|| name.to_string())
    }

    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.source.as_bytes())
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

/// 1-based line of the first error or missing node, if any.
pub fn first_error_line(tree: &Tree) -> Option<usize> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    Some(root.start_position().row + 1)
}

/// Compute metrics for a parsed file, looking up its language profile.
pub fn extract_file_metrics(file: &FileRecord, tree: &Tree) -> Result<FileMetrics> {
    let profile = profile_for(file.language).ok_or_else(|| {
        PulseError::unsupported(format!("No language profile for '{}'", file.language))
    })?;
    Ok(TreeWalker::new(profile, &file.text).extract(file, tree))
}
