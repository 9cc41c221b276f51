//! Per-language syntax tables consumed by the tree walker and import resolver.
//!
//! Each supported language is one [`LanguageProfile`] row. The walker and the
//! dependency resolver never branch on the language itself; they only read
//! node kinds, operator tokens and resolution hints from these tables.

use crate::lang::registry::LanguageTag;

/// How an import statement is recognized and turned into raw specifiers.
#[derive(Debug, Clone, Copy)]
pub enum ImportRule {
    /// A node of `kind` whose `field` child is a string literal specifier.
    StringField {
        kind: &'static str,
        field: &'static str,
    },
    /// A call whose callee text is one of `callees` and whose first argument
    /// is a string literal (`require("x")`, `import("x")`).
    CallWithStringArg {
        kind: &'static str,
        callees: &'static [&'static str],
    },
    /// `import a.b, c as d`: every `name` field is a dotted module path.
    DottedNames { kind: &'static str },
    /// `from .mod import x`: the `module_name` field, with bare relative
    /// imports (`from . import x`) expanded per imported name.
    FromModule { kind: &'static str },
    /// `use path::to::{Item}`: the `argument` field text.
    UsePath { kind: &'static str },
    /// `mod name;` declarations without an inline body.
    ModDeclaration { kind: &'static str },
}

/// Module-resolution convention used by the dependency graph builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStyle {
    /// Relative `./` and `../` specifiers plus bare package names.
    EcmaScript,
    /// Dotted modules with leading dots for relative imports.
    Python,
    /// `crate::`, `self::`, `super::` paths and `mod` declarations.
    Rust,
    /// Package directories under a module path from `go.mod`.
    Go,
}

/// Fixed syntax table for one language.
#[derive(Debug)]
pub struct LanguageProfile {
    pub language: LanguageTag,
    /// Function, method, closure and arrow-function definitions.
    pub function_kinds: &'static [&'static str],
    /// Nodes adding one decision point each.
    pub decision_kinds: &'static [&'static str],
    /// `(kind, field)` pairs adding a decision only when the field is
    /// present, such as a guarded match arm.
    pub guard_fields: &'static [(&'static str, &'static str)],
    /// Binary nodes that count as a decision when their operator matches.
    pub logical_kinds: &'static [&'static str],
    pub logical_operators: &'static [&'static str],
    /// Control structures that increase nesting depth.
    pub nesting_kinds: &'static [&'static str],
    /// `if` node kinds and the wrappers of their `else` branches, used to
    /// keep `else if` chains flat.
    pub if_kinds: &'static [&'static str],
    pub else_kinds: &'static [&'static str],
    pub comment_kinds: &'static [&'static str],
    /// Leaves replaced by positional placeholders when hashing.
    pub identifier_kinds: &'static [&'static str],
    pub import_rules: &'static [ImportRule],
    pub resolution: ResolutionStyle,
    /// Suffixes tried when resolving an extension-less specifier.
    pub source_extensions: &'static [&'static str],
    /// Files that stand for their directory (`index.ts`, `__init__.py`).
    pub index_files: &'static [&'static str],
}

impl LanguageProfile {
    pub fn is_function(&self, kind: &str) -> bool {
        self.function_kinds.contains(&kind)
    }

    pub fn is_comment(&self, kind: &str) -> bool {
        self.comment_kinds.contains(&kind)
    }

    pub fn is_identifier(&self, kind: &str) -> bool {
        self.identifier_kinds.contains(&kind)
    }

    pub fn is_nesting(&self, kind: &str) -> bool {
        self.nesting_kinds.contains(&kind)
    }
}

/// Parent node kinds that bind a name to an anonymous function, with the
/// field holding that name. Shared by every language.
pub const BINDING_FIELDS: &[(&str, &str)] = &[
    ("variable_declarator", "name"),
    ("pair", "key"),
    ("assignment_expression", "left"),
    ("assignment", "left"),
    ("augmented_assignment", "left"),
    ("let_declaration", "pattern"),
    ("short_var_declaration", "left"),
    ("var_spec", "name"),
    ("field_definition", "property"),
    ("public_field_definition", "name"),
    ("keyword_argument", "name"),
];

/// Wrapper kinds skipped when looking for a binding parent.
pub const BINDING_PASSTHROUGH: &[&str] = &["expression_list", "parenthesized_expression"];

const ECMASCRIPT_FUNCTIONS: &[&str] = &[
    "function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "generator_function_declaration",
    "arrow_function",
    "method_definition",
];

const ECMASCRIPT_DECISIONS: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "catch_clause",
    "ternary_expression",
];

const ECMASCRIPT_NESTING: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_statement",
    "try_statement",
];

const ECMASCRIPT_IDENTIFIERS: &[&str] = &[
    "identifier",
    "shorthand_property_identifier",
    "shorthand_property_identifier_pattern",
];

const ECMASCRIPT_IMPORTS: &[ImportRule] = &[
    ImportRule::StringField {
        kind: "import_statement",
        field: "source",
    },
    ImportRule::StringField {
        kind: "export_statement",
        field: "source",
    },
    ImportRule::StringField {
        kind: "import_require_clause",
        field: "source",
    },
    ImportRule::CallWithStringArg {
        kind: "call_expression",
        callees: &["require", "import"],
    },
];

static PYTHON: LanguageProfile = LanguageProfile {
    language: LanguageTag::Python,
    function_kinds: &["function_definition", "lambda"],
    decision_kinds: &[
        "if_statement",
        "elif_clause",
        "for_statement",
        "while_statement",
        "case_clause",
        "except_clause",
        "conditional_expression",
        "for_in_clause",
        "if_clause",
    ],
    // `case x if cond:` guards are `if_clause` nodes, counted above.
    guard_fields: &[],
    logical_kinds: &["boolean_operator"],
    logical_operators: &["and", "or"],
    nesting_kinds: &[
        "if_statement",
        "for_statement",
        "while_statement",
        "try_statement",
        "match_statement",
    ],
    if_kinds: &["if_statement"],
    else_kinds: &["else_clause"],
    comment_kinds: &["comment"],
    identifier_kinds: &["identifier"],
    import_rules: &[
        ImportRule::DottedNames {
            kind: "import_statement",
        },
        ImportRule::FromModule {
            kind: "import_from_statement",
        },
    ],
    resolution: ResolutionStyle::Python,
    source_extensions: &[".py", ".pyi"],
    index_files: &["__init__.py"],
};

static JAVASCRIPT: LanguageProfile = LanguageProfile {
    language: LanguageTag::JavaScript,
    function_kinds: ECMASCRIPT_FUNCTIONS,
    decision_kinds: ECMASCRIPT_DECISIONS,
    guard_fields: &[],
    logical_kinds: &["binary_expression"],
    logical_operators: &["&&", "||", "??"],
    nesting_kinds: ECMASCRIPT_NESTING,
    if_kinds: &["if_statement"],
    else_kinds: &["else_clause"],
    comment_kinds: &["comment"],
    identifier_kinds: ECMASCRIPT_IDENTIFIERS,
    import_rules: ECMASCRIPT_IMPORTS,
    resolution: ResolutionStyle::EcmaScript,
    source_extensions: &[".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx"],
    index_files: &["index.js", "index.jsx", "index.mjs", "index.ts", "index.tsx"],
};

static TYPESCRIPT: LanguageProfile = LanguageProfile {
    language: LanguageTag::TypeScript,
    function_kinds: ECMASCRIPT_FUNCTIONS,
    decision_kinds: ECMASCRIPT_DECISIONS,
    guard_fields: &[],
    logical_kinds: &["binary_expression"],
    logical_operators: &["&&", "||", "??"],
    nesting_kinds: ECMASCRIPT_NESTING,
    if_kinds: &["if_statement"],
    else_kinds: &["else_clause"],
    comment_kinds: &["comment"],
    identifier_kinds: ECMASCRIPT_IDENTIFIERS,
    import_rules: ECMASCRIPT_IMPORTS,
    resolution: ResolutionStyle::EcmaScript,
    source_extensions: &[".ts", ".tsx", ".d.ts", ".js", ".jsx"],
    index_files: &["index.ts", "index.tsx", "index.js"],
};

static RUST: LanguageProfile = LanguageProfile {
    language: LanguageTag::Rust,
    function_kinds: &["function_item", "closure_expression"],
    decision_kinds: &[
        "if_expression",
        "for_expression",
        "while_expression",
        "match_arm",
    ],
    guard_fields: &[("match_pattern", "condition")],
    logical_kinds: &["binary_expression"],
    logical_operators: &["&&", "||"],
    nesting_kinds: &[
        "if_expression",
        "for_expression",
        "while_expression",
        "loop_expression",
        "match_expression",
    ],
    if_kinds: &["if_expression"],
    else_kinds: &["else_clause"],
    comment_kinds: &["line_comment", "block_comment"],
    identifier_kinds: &["identifier"],
    import_rules: &[
        ImportRule::UsePath {
            kind: "use_declaration",
        },
        ImportRule::ModDeclaration { kind: "mod_item" },
    ],
    resolution: ResolutionStyle::Rust,
    source_extensions: &[".rs"],
    index_files: &["mod.rs"],
};

static GO: LanguageProfile = LanguageProfile {
    language: LanguageTag::Go,
    function_kinds: &["function_declaration", "method_declaration", "func_literal"],
    decision_kinds: &[
        "if_statement",
        "for_statement",
        "expression_case",
        "type_case",
        "communication_case",
    ],
    guard_fields: &[],
    logical_kinds: &["binary_expression"],
    logical_operators: &["&&", "||"],
    nesting_kinds: &[
        "if_statement",
        "for_statement",
        "expression_switch_statement",
        "type_switch_statement",
        "select_statement",
    ],
    if_kinds: &["if_statement"],
    else_kinds: &[],
    comment_kinds: &["comment"],
    identifier_kinds: &["identifier"],
    import_rules: &[ImportRule::StringField {
        kind: "import_spec",
        field: "path",
    }],
    resolution: ResolutionStyle::Go,
    source_extensions: &[".go"],
    index_files: &[],
};

/// Look up the profile row for a language. `Unknown` has none.
pub fn profile_for(language: LanguageTag) -> Option<&'static LanguageProfile> {
    match language {
        LanguageTag::Python => Some(&PYTHON),
        LanguageTag::JavaScript => Some(&JAVASCRIPT),
        LanguageTag::TypeScript => Some(&TYPESCRIPT),
        LanguageTag::Rust => Some(&RUST),
        LanguageTag::Go => Some(&GO),
        LanguageTag::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::registry::registered_languages;

    #[test]
    fn every_registered_language_has_a_profile() {
        for info in registered_languages() {
            let profile = profile_for(info.tag).expect("profile row");
            assert_eq!(profile.language, info.tag);
            assert!(!profile.function_kinds.is_empty());
            assert!(!profile.decision_kinds.is_empty());
            assert!(!profile.comment_kinds.is_empty());
            assert!(!profile.import_rules.is_empty());
        }
        assert!(profile_for(LanguageTag::Unknown).is_none());
    }

    #[test]
    fn nesting_kinds_include_if_kinds() {
        for info in registered_languages() {
            let profile = profile_for(info.tag).unwrap();
            for kind in profile.if_kinds {
                assert!(profile.is_nesting(kind), "{kind} should nest");
            }
        }
    }
}
