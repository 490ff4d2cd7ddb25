//! Per-iteration rewriting of manual sensitive terms into placeholders.

use std::collections::BTreeMap;

use regex::{Captures, Regex, RegexBuilder};

use crate::names::{name_space_size, NameSpaceExhausted, UniqueNameGenerator};

/// Term (lower-cased) to placeholder, valid for one iteration only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    entries: BTreeMap<String, String>,
}

impl PlaceholderMap {
    pub fn get(&self, term: &str) -> Option<&str> {
        self.entries.get(&term.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }
}

/// Replaces whole-word, case-insensitive occurrences of the manual terms.
///
/// All terms go into one alternation, longest first, so a single left to
/// right pass decides every match and placeholders are never rewritten again.
/// Each term gets its own capture group; the group that matched picks the
/// placeholder, so spellings that only match under Unicode case folding
/// (`ſecret`, `\u{212A}ey`) are replaced too.
#[derive(Debug, Clone)]
pub struct ForbiddenTermSubstitutor {
    terms: Vec<String>,
    matcher: Option<Regex>,
    prefix: String,
    min_len: usize,
    max_len: usize,
}

impl ForbiddenTermSubstitutor {
    pub fn new(
        terms: &[String],
        prefix: &str,
        min_len: usize,
        max_len: usize,
    ) -> Result<Self, regex::Error> {
        let mut terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        terms.dedup();

        let matcher = if terms.is_empty() {
            None
        } else {
            let alternation = terms
                .iter()
                .map(|t| format!("({})", regex::escape(t)))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
                    .case_insensitive(true)
                    .build()?,
            )
        };

        Ok(Self {
            terms,
            matcher,
            prefix: prefix.to_string(),
            min_len,
            max_len,
        })
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Whether the placeholder length range has room for one name per term.
    pub fn has_room_for_terms(&self) -> bool {
        name_space_size(&(self.min_len..=self.max_len)) >= self.terms.len() as u128
    }

    /// Builds a fresh map for this iteration. Placeholders are unique within
    /// the map and never collide with a word already present in `text`.
    pub fn build_map(&self, text: &str) -> Result<PlaceholderMap, NameSpaceExhausted> {
        let mut names = UniqueNameGenerator::new(self.prefix.clone(), self.min_len..=self.max_len);
        let entries = self
            .terms
            .iter()
            .map(|term| {
                let placeholder = names.next_name_avoiding(|candidate| text.contains(candidate))?;
                Ok((term.clone(), placeholder))
            })
            .collect::<Result<_, NameSpaceExhausted>>()?;
        Ok(PlaceholderMap { entries })
    }

    /// Rewrites `text` in place and returns the map that was applied.
    pub fn apply(&self, text: &mut String) -> Result<PlaceholderMap, NameSpaceExhausted> {
        let map = self.build_map(text)?;
        if let Some(matcher) = &self.matcher {
            let replaced = matcher
                .replace_all(text, |caps: &Captures| {
                    // Group i + 1 belongs to self.terms[i].
                    (1..caps.len())
                        .find(|&group| caps.get(group).is_some())
                        .and_then(|group| map.entries.get(&self.terms[group - 1]))
                        .map_or_else(|| caps[0].to_string(), String::clone)
                })
                .into_owned();
            *text = replaced;
        }
        Ok(map)
    }
}
