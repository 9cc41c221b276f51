//! Import specifier extraction driven by [`ImportRule`] tables.

use tree_sitter::Node;

use crate::lang::profiles::ImportRule;

/// Append every raw specifier `node` contributes under `rules`.
pub fn collect_imports(node: Node<'_>, source: &str, rules: &[ImportRule], out: &mut Vec<String>) {
    let kind = node.kind();
    for rule in rules {
        match *rule {
            ImportRule::StringField { kind: k, field } if k == kind => {
                if let Some(spec) = node
                    .child_by_field_name(field)
                    .and_then(|n| string_literal(n, source))
                {
                    out.push(spec);
                }
            }
            ImportRule::CallWithStringArg { kind: k, callees } if k == kind => {
                let callee = node
                    .child_by_field_name("function")
                    .map(|n| text(n, source))
                    .unwrap_or_default();
                if !callees.contains(&callee.as_str()) {
                    continue;
                }
                let first_arg = node
                    .child_by_field_name("arguments")
                    .and_then(|args| args.named_child(0));
                if let Some(spec) = first_arg.and_then(|n| string_literal(n, source)) {
                    out.push(spec);
                }
            }
            ImportRule::DottedNames { kind: k } if k == kind => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    out.push(module_name(name, source));
                }
            }
            ImportRule::FromModule { kind: k } if k == kind => {
                let Some(module) = node.child_by_field_name("module_name") else {
                    continue;
                };
                let module = text(module, source);
                if module.chars().all(|c| c == '.') {
                    let mut cursor = node.walk();
                    for name in node.children_by_field_name("name", &mut cursor) {
                        out.push(format!("{module}{}", module_name(name, source)));
                    }
                } else {
                    out.push(module);
                }
            }
            ImportRule::UsePath { kind: k } if k == kind => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    let argument = if argument.kind() == "use_as_clause" {
                        argument.child_by_field_name("path").unwrap_or(argument)
                    } else {
                        argument
                    };
                    let path: String = text(argument, source)
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect();
                    out.push(path);
                }
            }
            ImportRule::ModDeclaration { kind: k } if k == kind => {
                if node.child_by_field_name("body").is_some() {
                    continue;
                }
                if let Some(name) = node.child_by_field_name("name") {
                    out.push(format!("mod {}", text(name, source)));
                }
            }
            _ => {}
        }
    }
}

fn text(node: Node<'_>, source: &str) -> String {
    node.utf8_text(source.as_bytes())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Name of an `import` target, unwrapping `x as y` aliases.
fn module_name(node: Node<'_>, source: &str) -> String {
    if node.kind() == "aliased_import" {
        if let Some(inner) = node.child_by_field_name("name") {
            return text(inner, source);
        }
    }
    text(node, source)
}

/// Contents of a string literal node. Template strings with substitutions
/// are not static specifiers and yield `None`.
fn string_literal(node: Node<'_>, source: &str) -> Option<String> {
    let kind = node.kind();
    if !kind.contains("string") {
        return None;
    }
    if kind == "template_string" && node.named_child_count() > 0 {
        let mut cursor = node.walk();
        let dynamic = node
            .named_children(&mut cursor)
            .any(|child| child.kind() == "template_substitution");
        if dynamic {
            return None;
        }
    }
    let raw = text(node, source);
    let trimmed = raw.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
