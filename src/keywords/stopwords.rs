//! Minimal bilingual (EN/FR) stopword list, carried over from the original
//! pipeline's keyword extractor verbatim.

use std::collections::HashSet;
use std::sync::LazyLock;

pub static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "the", "and", "for", "with", "that", "this", "these", "those", "are", "was", "were",
        "has", "have", "had", "but", "not", "you", "your", "yours", "from", "they", "their",
        "them", "a", "an", "in", "on", "of", "to", "is", "it", "as", "be", "by", "or", "if", "we",
        "our", "us", "at", "can", "could", "should", "would", "may", "might", "will", "shall",
        "do", "does", "did", "so", "than", "then", "there", "here", "also", "into", "out", "up",
        "down",
        // French
        "le", "la", "les", "un", "une", "des", "du", "de", "d", "au", "aux", "et", "ou", "mais",
        "ne", "pas", "plus", "pour", "par", "dans", "sur", "ce", "cet", "cette", "ces", "se",
        "sa", "son", "ses", "leur", "leurs", "qui", "que", "quoi", "dont", "où", "quand",
        "comme", "ainsi", "est", "sont", "étaient", "était", "été", "être", "a", "ont", "avait",
        "avec", "sans", "entre", "vers", "chez", "sous", "après", "avant",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_both_languages() {
        assert!(is_stopword("the"));
        assert!(is_stopword("avec"));
        assert!(!is_stopword("capybara"));
    }
}
