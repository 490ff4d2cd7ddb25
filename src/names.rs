//! Random identifier generation.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use rand::Rng;
use thiserror::Error;

/// Rolls spent on one name before the generator gives up.
const MAX_ROLLS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no unused name left for prefix {prefix:?} after {rolls} rolls ({issued} already issued)")]
pub struct NameSpaceExhausted {
    pub prefix: String,
    pub issued: usize,
    pub rolls: usize,
}

/// Returns `len` random lowercase hexadecimal characters.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    rand::rng().fill(&mut bytes[..]);
    let mut out = hex::encode(bytes);
    out.truncate(len);
    out
}

/// Number of distinct hex suffixes with a length in `lengths`, saturating at
/// `u128::MAX`.
pub fn name_space_size(lengths: &RangeInclusive<usize>) -> u128 {
    let mut total: u128 = 0;
    for len in lengths.clone() {
        let count = u32::try_from(len)
            .ok()
            .and_then(|len| 16u128.checked_pow(len))
            .unwrap_or(u128::MAX);
        total = total.saturating_add(count);
        if total == u128::MAX {
            break;
        }
    }
    total
}

/// Hands out prefixed hex identifiers, never the same one twice.
///
/// Every issued name is remembered; a candidate that was already issued, or
/// that the caller reports as taken, is thrown away and re-rolled. Once the
/// space is used up, or `MAX_ROLLS` candidates in a row are rejected, the
/// generator returns [`NameSpaceExhausted`].
#[derive(Debug, Clone)]
pub struct UniqueNameGenerator {
    prefix: String,
    lengths: RangeInclusive<usize>,
    issued: HashSet<String>,
}

impl UniqueNameGenerator {
    pub fn new(prefix: impl Into<String>, lengths: RangeInclusive<usize>) -> Self {
        assert!(
            *lengths.start() > 0 && lengths.start() <= lengths.end(),
            "empty identifier length range"
        );
        Self {
            prefix: prefix.into(),
            lengths,
            issued: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> u128 {
        name_space_size(&self.lengths)
    }

    pub fn next_name(&mut self) -> Result<String, NameSpaceExhausted> {
        self.next_name_avoiding(|_| false)
    }

    /// Like [`next_name`](Self::next_name) but also skips any candidate for
    /// which `is_taken` returns true.
    pub fn next_name_avoiding(
        &mut self,
        is_taken: impl Fn(&str) -> bool,
    ) -> Result<String, NameSpaceExhausted> {
        if self.issued.len() as u128 >= self.capacity() {
            return Err(self.exhausted(0));
        }
        let mut rng = rand::rng();
        for _ in 0..MAX_ROLLS {
            let len = rng.random_range(self.lengths.clone());
            let candidate = format!("{}{}", self.prefix, random_hex(len));
            if self.issued.contains(&candidate) || is_taken(&candidate) {
                continue;
            }
            self.issued.insert(candidate.clone());
            return Ok(candidate);
        }
        Err(self.exhausted(MAX_ROLLS))
    }

    fn exhausted(&self, rolls: usize) -> NameSpaceExhausted {
        NameSpaceExhausted {
            prefix: self.prefix.clone(),
            issued: self.issued.len(),
            rolls,
        }
    }

    pub fn issued(&self) -> &HashSet<String> {
        &self.issued
    }
}
