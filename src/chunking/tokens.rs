//! Token estimation. Deliberately simple: a whitespace word count, matching
//! the original pipeline's `estimate_tokens` rather than a real tokenizer.

/// Estimates token count for `text` as its whitespace-separated word count.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_whitespace_separated_words() {
        assert_eq!(estimate_tokens("the cat sat"), 3);
        assert_eq!(estimate_tokens("  leading   and   trailing  "), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn newlines_count_as_whitespace() {
        assert_eq!(estimate_tokens("line one\nline two"), 4);
    }
}
