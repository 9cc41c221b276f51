//! Identities and input records shared by every stage of an analysis job.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lang::registry::{detect_language_from_path, LanguageTag};

/// Identity of a repository, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryId {
    pub owner: String,
    pub name: String,
}

impl RepositoryId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Cache and durable-store key: repository identity plus commit identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub repository: RepositoryId,
    pub commit: String,
}

impl CacheKey {
    pub fn new(repository: RepositoryId, commit: impl Into<String>) -> Self {
        Self {
            repository,
            commit: commit.into(),
        }
    }

    /// Stable file-name-safe digest of the key.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.repository.owner.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.repository.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.commit.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository, self.commit)
    }
}

/// One input file of a job. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Repository-relative path using `/` separators.
    pub path: String,
    pub language: LanguageTag,
    pub text: String,
    pub size_bytes: u64,
}

impl FileRecord {
    /// Build a record, detecting the language from the path extension.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = normalize_record_path(&path.into());
        let language = detect_language_from_path(&path);
        Self::with_language(path, language, text)
    }

    /// Build a record with an explicit language tag.
    pub fn with_language(
        path: impl Into<String>,
        language: LanguageTag,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            path: normalize_record_path(&path.into()),
            language,
            size_bytes: text.len() as u64,
            text,
        }
    }
}

fn normalize_record_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    unified.trim_start_matches("./").to_string()
}
