//! Language metadata, extension detection and the per-worker grammar registry.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tree_sitter::{Language, Parser, Tree};

use crate::core::errors::{Result, PulseError};

/// Language tag carried by every input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageTag {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Unknown,
}

impl LanguageTag {
    /// Canonical short key, matching configuration and CLI usage.
    pub fn key(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::JavaScript => "js",
            Self::TypeScript => "ts",
            Self::Rust => "rs",
            Self::Go => "go",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_supported(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Metadata describing one of the built-in languages.
#[derive(Debug, Clone, Copy)]
pub struct LanguageInfo {
    pub tag: LanguageTag,
    /// Human-friendly display name.
    pub name: &'static str,
    /// Supported file extensions (without leading dots).
    pub extensions: &'static [&'static str],
}

const REGISTERED_LANGUAGES: &[LanguageInfo] = &[
    LanguageInfo {
        tag: LanguageTag::Python,
        name: "Python",
        extensions: &["py", "pyi"],
    },
    LanguageInfo {
        tag: LanguageTag::TypeScript,
        name: "TypeScript",
        extensions: &["ts", "tsx", "cts", "mts"],
    },
    LanguageInfo {
        tag: LanguageTag::JavaScript,
        name: "JavaScript",
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageInfo {
        tag: LanguageTag::Rust,
        name: "Rust",
        extensions: &["rs"],
    },
    LanguageInfo {
        tag: LanguageTag::Go,
        name: "Go",
        extensions: &["go"],
    },
];

/// Return the languages that are compiled into this build.
pub fn registered_languages() -> &'static [LanguageInfo] {
    REGISTERED_LANGUAGES
}

/// Detect the language tag of a path from its extension.
pub fn detect_language_from_path(file_path: &str) -> LanguageTag {
    Path::new(file_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(find_language_by_extension)
        .map(|info| info.tag)
        .unwrap_or(LanguageTag::Unknown)
}

/// Check whether a file extension (with or without leading dot) is supported.
pub fn extension_is_supported(ext: &str) -> bool {
    find_language_by_extension(ext).is_some()
}

fn find_language_by_extension(ext: &str) -> Option<&'static LanguageInfo> {
    let target = ext.trim_start_matches('.').to_ascii_lowercase();
    registered_languages().iter().find(|info| {
        info.extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(&target))
    })
}

/// Concrete grammar selected for a file. TSX is a TypeScript dialect with
/// its own grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarKey {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
    Go,
}

impl GrammarKey {
    pub fn for_file(language: LanguageTag, path: &str) -> Option<Self> {
        match language {
            LanguageTag::Python => Some(Self::Python),
            LanguageTag::JavaScript => Some(Self::JavaScript),
            LanguageTag::TypeScript if path.to_ascii_lowercase().ends_with(".tsx") => {
                Some(Self::Tsx)
            }
            LanguageTag::TypeScript => Some(Self::TypeScript),
            LanguageTag::Rust => Some(Self::Rust),
            LanguageTag::Go => Some(Self::Go),
            LanguageTag::Unknown => None,
        }
    }

    fn tree_sitter_language(self) -> Language {
        match self {
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }
}

/// Per-worker set of tree-sitter parsers.
///
/// Parsers are created on first use for each grammar and reused for every
/// later file of that grammar, so a worker pays the grammar load once.
#[derive(Default)]
pub struct GrammarRegistry {
    parsers: HashMap<GrammarKey, Parser>,
    loads: usize,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of grammars loaded by this registry so far.
    pub fn grammars_loaded(&self) -> usize {
        self.loads
    }

    /// Parse `source` with the grammar registered for `language`.
    pub fn parse(&mut self, language: LanguageTag, path: &str, source: &str) -> Result<Tree> {
        let key = GrammarKey::for_file(language, path).ok_or_else(|| {
            PulseError::unsupported(format!("No grammar registered for language '{language}'"))
        })?;

        let parser = match self.parsers.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&key.tree_sitter_language())
                    .map_err(|e| {
                        PulseError::parse(
                            language.to_string(),
                            format!("Failed to set parser language: {e}"),
                        )
                    })?;
                self.loads += 1;
                debug!("Loaded {:?} grammar", key);
                entry.insert(parser)
            }
        };

        parser.parse(source, None).ok_or_else(|| {
            PulseError::parse_at(language.to_string(), "Parser produced no tree", path, None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language_from_path("src/main.py"), LanguageTag::Python);
        assert_eq!(detect_language_from_path("web/app.jsx"), LanguageTag::JavaScript);
        assert_eq!(detect_language_from_path("web/app.MJS"), LanguageTag::JavaScript);
        assert_eq!(detect_language_from_path("web/view.tsx"), LanguageTag::TypeScript);
        assert_eq!(detect_language_from_path("src/lib.rs"), LanguageTag::Rust);
        assert_eq!(detect_language_from_path("cmd/main.go"), LanguageTag::Go);
        assert_eq!(detect_language_from_path("Makefile"), LanguageTag::Unknown);
        assert_eq!(detect_language_from_path("Main.java"), LanguageTag::Unknown);
    }

    #[test]
    fn test_extension_support() {
        for ext in ["py", ".pyi", "JSX", "mjs", "TS", "tsx", "rs", "go"] {
            assert!(extension_is_supported(ext), "extension {ext} should be supported");
        }
        assert!(!extension_is_supported("cpp"));
    }

    #[test]
    fn test_registry_parses_every_language() {
        let mut registry = GrammarRegistry::new();
        let samples = [
            (LanguageTag::Python, "a.py", "def f():\n    return 1\n"),
            (LanguageTag::JavaScript, "a.js", "function f() { return 1; }"),
            (LanguageTag::TypeScript, "a.ts", "function f(): number { return 1; }"),
            (LanguageTag::TypeScript, "a.tsx", "const v = <div>{1}</div>;"),
            (LanguageTag::Rust, "a.rs", "fn f() -> i32 { 1 }"),
            (LanguageTag::Go, "a.go", "package main\nfunc f() int { return 1 }\n"),
        ];

        for (language, path, source) in samples {
            let tree = registry.parse(language, path, source).unwrap();
            assert!(!tree.root_node().has_error(), "{path} should parse cleanly");
        }
        assert_eq!(registry.grammars_loaded(), 6);
    }

    #[test]
    fn test_registry_reuses_loaded_grammar() {
        let mut registry = GrammarRegistry::new();
        for _ in 0..3 {
            registry
                .parse(LanguageTag::Python, "a.py", "x = 1\n")
                .unwrap();
        }
        assert_eq!(registry.grammars_loaded(), 1);
    }

    #[test]
    fn test_unknown_language_is_unsupported() {
        let mut registry = GrammarRegistry::new();
        let err = registry
            .parse(LanguageTag::Unknown, "notes.txt", "hello")
            .unwrap_err();
        assert!(matches!(err, PulseError::Unsupported { .. }));
    }
}
