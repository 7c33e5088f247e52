//! Named pattern storage.
//!
//! Patterns live in the generator's pattern directory, one sub-directory per
//! pattern with the prompt body in `system.md`:
//!
//! ```text
//! <dir>/summarize/system.md
//! <dir>/extract_wisdom/system.md
//! ```

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

const PATTERN_FILE: &str = "system.md";

/// A resolved pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pattern {
    pub name: String,
    pub pattern: String,
}

/// Read-only lookup of named patterns.
pub trait PatternStore: Send + Sync {
    /// Resolve a pattern by name.
    fn get(&self, name: &str) -> Result<Pattern>;

    /// List all known pattern names, sorted.
    fn names(&self) -> Result<Vec<String>>;
}

/// Pattern store backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FsPatternStore {
    root: PathBuf,
}

impl FsPatternStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Reject names that are empty or would resolve outside the pattern root.
pub fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(Error::InvalidPatternName(name.to_string())),
    }
}

impl PatternStore for FsPatternStore {
    fn get(&self, name: &str) -> Result<Pattern> {
        validate_name(name)?;
        let path = self.root.join(name).join(PATTERN_FILE);
        match std::fs::read_to_string(&path) {
            Ok(pattern) => Ok(Pattern {
                name: name.to_string(),
                pattern,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::PatternNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn names(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            tracing::debug!(root = %self.root.display(), "Pattern directory missing");
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(PATTERN_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
