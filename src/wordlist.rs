//! Sensitive term lists.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum WordlistError {
    #[error("wordlist not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read wordlist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The two term lists, lower-cased and de-duplicated.
///
/// `auto_checked` terms reject a variant when they appear anywhere in it;
/// `manual_substitute` terms are rewritten to placeholders before
/// obfuscation. Both are read once at startup and never change afterwards.
#[derive(Debug, Clone, Default)]
pub struct SensitiveTermSet {
    auto_checked: Vec<String>,
    manual_substitute: Vec<String>,
}

impl SensitiveTermSet {
    pub fn new<A, M>(auto_checked: A, manual_substitute: M) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        Self {
            auto_checked: normalize(auto_checked),
            manual_substitute: normalize(manual_substitute),
        }
    }

    pub fn load(auto_path: &Path, manual_path: &Path) -> Result<Self, WordlistError> {
        let auto_checked = read_list(auto_path)?;
        let manual_substitute = read_list(manual_path)?;
        info!(
            "Loaded {} auto-checked and {} manual terms",
            auto_checked.len(),
            manual_substitute.len()
        );
        Ok(Self {
            auto_checked,
            manual_substitute,
        })
    }

    pub fn auto_checked(&self) -> &[String] {
        &self.auto_checked
    }

    pub fn manual_substitute(&self) -> &[String] {
        &self.manual_substitute
    }
}

/// Parses a line-oriented list: trims each line, skips blanks and `#`
/// comments, lower-cases and removes duplicates.
pub fn parse_list(content: &str) -> Vec<String> {
    normalize(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#')),
    )
}

fn read_list(path: &Path) -> Result<Vec<String>, WordlistError> {
    if !path.is_file() {
        return Err(WordlistError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| WordlistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_list(&content))
}

fn normalize<I>(terms: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
