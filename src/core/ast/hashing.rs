//! Structural hashing of function bodies for clone detection.
//!
//! The token stream is a pre-order walk of the function subtree. Each named
//! node contributes its kind and arity, identifiers are replaced by `$N` in
//! order of first occurrence and comments are skipped. The function's own
//! name is a placeholder whatever its node kind, so a renamed method hashes
//! like a renamed free function. Whitespace never
//! appears because only tokens are fed to the hasher.

use std::collections::HashMap;

use tree_sitter::Node;

use crate::lang::profiles::LanguageProfile;

/// Result of hashing one function subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyHash {
    pub exact: String,
    pub near: String,
    pub node_count: usize,
}

const LITERAL_FRAGMENTS: &[&str] = &[
    "string", "number", "integer", "float", "literal", "char", "escape", "regex",
];
const LITERAL_KINDS: &[&str] = &["true", "false", "null", "undefined", "none", "nil"];

fn is_literal_leaf(kind: &str) -> bool {
    LITERAL_KINDS.contains(&kind) || LITERAL_FRAGMENTS.iter().any(|f| kind.contains(f))
}

/// Hash the subtree rooted at `function` using `profile` for identifier and
/// comment kinds.
pub fn hash_function_body(function: Node<'_>, source: &str, profile: &LanguageProfile) -> BodyHash {
    let mut exact = blake3::Hasher::new();
    let mut near = blake3::Hasher::new();
    let mut placeholders: HashMap<&str, usize> = HashMap::new();
    let mut node_count = 0usize;
    let name_id = function.child_by_field_name("name").map(|name| name.id());

    let mut stack = vec![function];
    while let Some(node) = stack.pop() {
        let kind = node.kind();
        if profile.is_comment(kind) {
            continue;
        }

        if node.child_count() == 0 {
            let text = node.utf8_text(source.as_bytes()).unwrap_or("");
            if node.is_named() {
                node_count += 1;
            }

            if profile.is_identifier(kind) || Some(node.id()) == name_id {
                let next = placeholders.len();
                let slot = *placeholders.entry(text).or_insert(next);
                let token = format!("${slot}");
                feed(&mut exact, &token);
                feed(&mut near, &token);
            } else if node.is_named() {
                feed(&mut exact, kind);
                feed(&mut exact, text);
                feed(&mut near, kind);
                if !is_literal_leaf(kind) {
                    feed(&mut near, text);
                }
            } else {
                feed(&mut exact, kind);
                feed(&mut near, kind);
            }
            continue;
        }

        if node.is_named() {
            node_count += 1;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node
            .children(&mut cursor)
            .filter(|child| !profile.is_comment(child.kind()))
            .collect();

        let marker = format!("({}/{}", kind, children.len());
        feed(&mut exact, &marker);
        feed(&mut near, &marker);
        stack.extend(children.into_iter().rev());
    }

    BodyHash {
        exact: exact.finalize().to_hex().to_string(),
        near: near.finalize().to_hex().to_string(),
        node_count,
    }
}

fn feed(hasher: &mut blake3::Hasher, token: &str) {
    hasher.update(token.as_bytes());
    hasher.update(&[0x1f]);
}
