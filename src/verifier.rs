//! Final gate: substring scan for auto-checked terms.

use std::borrow::Cow;

use aho_corasick::AhoCorasick;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    /// The first forbidden term found. Scanning stops there.
    Flagged { term: String },
}

impl Verdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, Verdict::Clean)
    }
}

/// Case-insensitive substring matcher over the auto-checked terms.
///
/// Unlike the substitutor this does not respect word boundaries: a term
/// buried inside a longer identifier still rejects the variant.
#[derive(Debug, Clone)]
pub struct ComplianceVerifier {
    terms: Vec<String>,
    automaton: Option<AhoCorasick>,
    ascii_only: bool,
}

impl ComplianceVerifier {
    pub fn new(terms: &[String]) -> Result<Self, aho_corasick::BuildError> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let ascii_only = terms.iter().all(|t| t.is_ascii());
        let automaton = if terms.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .ascii_case_insensitive(true)
                    .build(&terms)?,
            )
        };
        Ok(Self {
            terms,
            automaton,
            ascii_only,
        })
    }

    pub fn check(&self, text: &str) -> Verdict {
        let Some(automaton) = &self.automaton else {
            return Verdict::Clean;
        };
        // Non-ASCII terms need full Unicode folding of the haystack.
        let haystack = if self.ascii_only {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.to_lowercase())
        };
        match automaton.find(haystack.as_ref()) {
            Some(m) => Verdict::Flagged {
                term: self.terms[m.pattern().as_usize()].clone(),
            },
            None => Verdict::Clean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(terms: &[&str]) -> ComplianceVerifier {
        let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        ComplianceVerifier::new(&terms).unwrap()
    }

    #[test]
    fn flags_case_insensitive_substring() {
        let v = verifier(&["secret"]);
        assert_eq!(
            v.check("var mySECRETValue = 1;"),
            Verdict::Flagged {
                term: "secret".into()
            }
        );
    }

    #[test]
    fn clean_text_passes() {
        let v = verifier(&["secret", "internal"]);
        assert!(v.check("var a = 1;").is_clean());
    }

    #[test]
    fn empty_list_accepts_everything() {
        assert!(verifier(&[]).check("secret").is_clean());
    }

    #[test]
    fn non_ascii_terms_fold_case() {
        let v = verifier(&["ÜBER"]);
        assert!(!v.check("var überFlag;").is_clean());
    }

    #[test]
    fn verification_is_idempotent() {
        let v = verifier(&["secret"]);
        let text = "var a = 'public';";
        assert_eq!(v.check(text), v.check(text));
    }
}
