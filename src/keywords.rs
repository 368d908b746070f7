//! Term-frequency keyword extraction.
//!
//! Derives the salient terms of a set of retrieved chunks to drive the
//! graph lookup. Scoring is aggregate term frequency over all texts after
//! stopword filtering; ties keep first-seen vocabulary order.

use std::collections::HashMap;

/// Common English stopwords excluded from keyword scoring.
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his",
    "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me", "more", "most", "my",
    "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours",
    "out", "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the",
    "their", "theirs", "them", "then", "there", "these", "they", "this", "those", "through",
    "to", "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
];

/// Top-k lower-cased terms across `texts`, ranked by aggregate term
/// frequency, descending, ties broken by first appearance. Empty input
/// yields an empty list; callers treat that as "no graph lookup possible".
pub fn extract_keywords(texts: &[String], top_k: usize) -> Vec<String> {
    if texts.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut vocabulary: Vec<String> = Vec::new();

    for text in texts {
        for token in tokenize(text) {
            match counts.get_mut(&token) {
                Some(count) => *count += 1,
                None => {
                    counts.insert(token.clone(), 1);
                    vocabulary.push(token);
                }
            }
        }
    }

    // Stable sort keeps first-seen order for equal scores.
    vocabulary.sort_by_key(|term| std::cmp::Reverse(counts[term]));
    vocabulary.truncate(top_k);
    vocabulary
}

/// Lower-cased alphanumeric tokens of at least two characters, stopwords
/// removed.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_input_yields_empty_list() {
        assert!(extract_keywords(&[], 5).is_empty());
    }

    #[test]
    fn returns_at_most_top_k_lowercased_terms() {
        let input = texts(&["Rust Rust Rust engine engine kernel graph vector"]);
        let keywords = extract_keywords(&input, 3);
        assert_eq!(keywords.len(), 3);
        assert_eq!(keywords[0], "rust");
        assert_eq!(keywords[1], "engine");
        for kw in &keywords {
            assert_eq!(kw, &kw.to_lowercase());
        }
    }

    #[test]
    fn scores_aggregate_across_texts() {
        let input = texts(&["solar panels power", "solar inverter", "solar battery"]);
        let keywords = extract_keywords(&input, 1);
        assert_eq!(keywords, vec!["solar"]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let input = texts(&["alpha beta gamma"]);
        let keywords = extract_keywords(&input, 3);
        assert_eq!(keywords, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn stopwords_and_short_tokens_are_filtered() {
        let input = texts(&["the launch of a rocket is the start of the mission x"]);
        let keywords = extract_keywords(&input, 10);
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"of".to_string()));
        assert!(!keywords.contains(&"x".to_string()));
        assert!(keywords.contains(&"rocket".to_string()));
    }

    #[test]
    fn punctuation_splits_tokens() {
        let input = texts(&["graph-based retrieval; graph queries."]);
        let keywords = extract_keywords(&input, 2);
        assert_eq!(keywords[0], "graph");
    }
}
