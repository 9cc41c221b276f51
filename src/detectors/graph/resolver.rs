//! Resolution of raw import specifiers to in-job file paths.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::file_utils::{join_posix, normalize_posix_path, parent_dir};
use crate::core::model::FileRecord;
use crate::lang::profiles::{LanguageProfile, ResolutionStyle};

/// Directories conventionally holding importable top-level modules.
const CONVENTIONAL_ROOTS: &[&str] = &["", "src", "lib"];

/// In-repository package roots discovered from manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRoots {
    /// `package.json` names and their directories
    pub packages: Vec<(String, String)>,
    /// Cargo package names (with `-` mapped to `_`) and their directories
    pub crates: Vec<(String, String)>,
    /// `go.mod` module paths and their directories
    pub go_modules: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct PackageJson {
    name: Option<String>,
}

#[derive(Deserialize)]
struct CargoManifest {
    package: Option<CargoPackage>,
}

#[derive(Deserialize)]
struct CargoPackage {
    name: String,
}

impl ModuleRoots {
    /// Scan manifest files among the job's records.
    pub fn discover(files: &[FileRecord]) -> Self {
        let mut roots = Self::default();

        for file in files {
            let (dir, name) = match file.path.rsplit_once('/') {
                Some((dir, name)) => (dir, name),
                None => ("", file.path.as_str()),
            };
            match name {
                "package.json" => match serde_json::from_str::<PackageJson>(&file.text) {
                    Ok(PackageJson { name: Some(pkg) }) => {
                        roots.packages.push((pkg, dir.to_string()));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Ignoring unreadable manifest {}: {}", file.path, e),
                },
                "Cargo.toml" => match toml::from_str::<CargoManifest>(&file.text) {
                    Ok(CargoManifest {
                        package: Some(package),
                    }) => {
                        roots
                            .crates
                            .push((package.name.replace('-', "_"), dir.to_string()));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Ignoring unreadable manifest {}: {}", file.path, e),
                },
                "go.mod" => {
                    let module = file
                        .text
                        .lines()
                        .find_map(|line| line.trim().strip_prefix("module "))
                        .map(|m| m.trim().trim_matches('"').to_string());
                    if let Some(module) = module {
                        roots.go_modules.push((module, dir.to_string()));
                    }
                }
                _ => {}
            }
        }

        // Longest names first so nested packages win over their parents.
        for list in [&mut roots.packages, &mut roots.crates, &mut roots.go_modules] {
            list.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.cmp(b)));
        }
        debug!(
            "Discovered module roots: {} packages, {} crates, {} go modules",
            roots.packages.len(),
            roots.crates.len(),
            roots.go_modules.len()
        );
        roots
    }
}

/// Resolves specifiers against the job's path set.
pub struct ImportResolver<'a> {
    paths: &'a BTreeSet<String>,
    roots: &'a ModuleRoots,
}

impl<'a> ImportResolver<'a> {
    pub fn new(paths: &'a BTreeSet<String>, roots: &'a ModuleRoots) -> Self {
        Self { paths, roots }
    }

    /// Resolve `specifier` imported from `source`, or `None` when it points
    /// outside the job.
    pub fn resolve(
        &self,
        source: &str,
        specifier: &str,
        profile: &LanguageProfile,
    ) -> Option<String> {
        match profile.resolution {
            ResolutionStyle::EcmaScript => self.resolve_ecmascript(source, specifier, profile),
            ResolutionStyle::Python => self.resolve_python(source, specifier, profile),
            ResolutionStyle::Rust => self.resolve_rust(source, specifier),
            ResolutionStyle::Go => self.resolve_go(source, specifier),
        }
    }

    fn resolve_ecmascript(
        &self,
        source: &str,
        specifier: &str,
        profile: &LanguageProfile,
    ) -> Option<String> {
        if specifier.starts_with('.') || specifier.starts_with('/') {
            let base = if specifier.starts_with('/') {
                specifier.to_string()
            } else {
                join_posix(parent_dir(source), specifier)
            };
            return self.file_candidates(&normalize_posix_path(&base)?, profile);
        }

        for (name, dir) in &self.roots.packages {
            let rest = if specifier == name {
                ""
            } else if let Some(rest) = specifier.strip_prefix(&format!("{name}/")) {
                rest
            } else {
                continue;
            };
            let base = join_posix(dir, rest);
            if let Some(found) = self.file_candidates(&base, profile) {
                return Some(found);
            }
            if rest.is_empty() {
                if let Some(found) = self.file_candidates(&join_posix(&base, "src"), profile) {
                    return Some(found);
                }
            }
        }

        if specifier.contains('/') {
            for root in CONVENTIONAL_ROOTS {
                if let Some(found) = self.file_candidates(&join_posix(root, specifier), profile) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn resolve_python(
        &self,
        source: &str,
        specifier: &str,
        profile: &LanguageProfile,
    ) -> Option<String> {
        if specifier.is_empty() {
            return None;
        }
        let levels = specifier.chars().take_while(|&c| c == '.').count();
        let module = specifier[levels..].replace('.', "/");

        if levels > 0 {
            let mut base = parent_dir(source).to_string();
            for _ in 1..levels {
                if base.is_empty() {
                    return None;
                }
                base = parent_dir(&base).to_string();
            }
            return self.file_candidates(&join_posix(&base, &module), profile);
        }

        CONVENTIONAL_ROOTS
            .iter()
            .find_map(|root| self.file_candidates(&join_posix(root, &module), profile))
    }

    fn resolve_rust(&self, source: &str, specifier: &str) -> Option<String> {
        if let Some(name) = specifier.strip_prefix("mod ") {
            let dir = rust_module_dir(source);
            return self.rust_module_file(&join_posix(&dir, name.trim()));
        }

        let path = rust_use_path(specifier);
        let mut segments = path.split("::").filter(|s| !s.is_empty()).peekable();
        let mut base = match *segments.peek()? {
            "crate" => {
                segments.next();
                self.rust_crate_dir(source)
            }
            "self" => {
                segments.next();
                rust_module_dir(source)
            }
            "super" => {
                let mut dir = rust_module_dir(source);
                while segments.peek() == Some(&"super") {
                    segments.next();
                    if dir.is_empty() {
                        return None;
                    }
                    dir = parent_dir(&dir).to_string();
                }
                dir
            }
            first => {
                let (_, dir) = self.roots.crates.iter().find(|(name, _)| name == first)?;
                segments.next();
                join_posix(dir, "src")
            }
        };

        let base_file = self.rust_module_file(&base).or_else(|| {
            ["lib.rs", "main.rs"]
                .iter()
                .map(|root| join_posix(&base, root))
                .find(|candidate| self.paths.contains(candidate))
        });

        let mut deepest = base_file;
        for segment in segments {
            base = join_posix(&base, segment);
            match self.rust_module_file(&base) {
                Some(found) => deepest = Some(found),
                None => break,
            }
        }
        deepest
    }

    fn rust_crate_dir(&self, source: &str) -> String {
        let mut dir = parent_dir(source).to_string();
        loop {
            if ["lib.rs", "main.rs"]
                .iter()
                .any(|root| self.paths.contains(&join_posix(&dir, root)))
            {
                return dir;
            }
            if dir.is_empty() {
                return "src".to_string();
            }
            dir = parent_dir(&dir).to_string();
        }
    }

    /// `dir/name.rs` or `dir/name/mod.rs` for a module path `dir/name`.
    fn rust_module_file(&self, module: &str) -> Option<String> {
        if module.is_empty() {
            return None;
        }
        [format!("{module}.rs"), format!("{module}/mod.rs")]
            .into_iter()
            .find(|candidate| self.paths.contains(candidate))
    }

    fn resolve_go(&self, source: &str, specifier: &str) -> Option<String> {
        let package_dir = if specifier.starts_with('.') {
            normalize_posix_path(&join_posix(parent_dir(source), specifier))?
        } else {
            let (module, dir) = self.roots.go_modules.iter().find(|(module, _)| {
                specifier == module || specifier.starts_with(&format!("{module}/"))
            })?;
            let rest = specifier[module.len()..].trim_start_matches('/');
            join_posix(dir, rest)
        };

        self.paths
            .iter()
            .find(|p| p.ends_with(".go") && !p.ends_with("_test.go") && parent_dir(p) == package_dir)
            .cloned()
    }

    /// Exact path, then extension candidates, then index files.
    fn file_candidates(&self, base: &str, profile: &LanguageProfile) -> Option<String> {
        if base.is_empty() {
            return None;
        }
        if self.paths.contains(base) {
            return Some(base.to_string());
        }
        for ext in profile.source_extensions {
            let candidate = format!("{base}{ext}");
            if self.paths.contains(&candidate) {
                return Some(candidate);
            }
        }
        // `./util.js` written against a TypeScript source file
        if let Some((stem, ext)) = base.rsplit_once('.') {
            if !stem.is_empty() && !stem.ends_with('/') && !ext.contains('/') {
                for ext in profile.source_extensions {
                    let candidate = format!("{stem}{ext}");
                    if self.paths.contains(&candidate) {
                        return Some(candidate);
                    }
                }
            }
        }
        profile
            .index_files
            .iter()
            .map(|index| join_posix(base, index))
            .find(|candidate| self.paths.contains(candidate))
    }
}

/// Directory holding the submodules declared by a Rust source file.
fn rust_module_dir(source: &str) -> String {
    let dir = parent_dir(source);
    let file = source.rsplit('/').next().unwrap_or(source);
    match file {
        "lib.rs" | "main.rs" | "mod.rs" => dir.to_string(),
        other => join_posix(dir, other.trim_end_matches(".rs")),
    }
}

/// Module path of a `use` argument without brace groups or globs.
fn rust_use_path(specifier: &str) -> &str {
    let path = specifier.split("::{").next().unwrap_or(specifier);
    path.trim_end_matches("::*")
}
