//! Transcript candidate sets and phrase matching
//!
//! One recognition result carries a set of candidate transcripts ranked
//! by confidence. Rank is not used here; only token membership matters.

/// Candidate transcripts from a single recognition result event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates(Vec<String>);

impl Candidates {
    /// Create a candidate set from raw transcript strings
    pub fn new(candidates: Vec<String>) -> Self {
        Self(candidates)
    }

    /// Check if the set contains no candidates
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of candidates in the set
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether `token` appears as a whitespace-delimited word in
    /// any candidate. "please scan this" matches "scan"; "can" does not.
    pub fn contains_token(&self, token: &str) -> bool {
        self.0
            .iter()
            .any(|candidate| candidate.split_whitespace().any(|word| word == token))
    }
}

impl From<Vec<String>> for Candidates {
    fn from(candidates: Vec<String>) -> Self {
        Self::new(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(items: &[&str]) -> Candidates {
        Candidates::new(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_empty_set() {
        let set = Candidates::default();
        assert!(set.is_empty());
        assert!(!set.contains_token("scan"));
    }

    #[test]
    fn test_exact_candidate_match() {
        let set = candidates(&["scan"]);
        assert!(set.contains_token("scan"));
    }

    #[test]
    fn test_token_within_phrase() {
        let set = candidates(&["please scan this"]);
        assert!(set.contains_token("scan"));
    }

    #[test]
    fn test_near_miss_words_do_not_match() {
        let set = candidates(&["can", "fan"]);
        assert!(!set.contains_token("scan"));
    }

    #[test]
    fn test_substring_of_longer_word_does_not_match() {
        let set = candidates(&["scanner", "rescan"]);
        assert!(!set.contains_token("scan"));
    }

    #[test]
    fn test_ordering_is_irrelevant() {
        let set = candidates(&["fan", "can", "scan it"]);
        assert!(set.contains_token("scan"));
    }
}
