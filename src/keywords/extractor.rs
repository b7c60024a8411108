//! Keyphrase extraction for a chunk's text.
//!
//! The primary path approximates the candidate sources of a linguistic
//! pipeline (named entities, noun phrases, quoted/emphasis spans,
//! content-word n-grams) with regex heuristics, since no POS tagger or NER
//! model is part of this crate's dependency stack. The fallback path is a
//! direct port of the original stopword-filtered unigram frequency counter,
//! used when the primary path finds nothing worth keeping.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::keywords::stopwords::is_stopword;

/// How many keyphrases to aim for.
#[derive(Debug, Clone, Copy)]
pub struct KeywordExtractorConfig {
    pub min_keywords: usize,
    pub max_keywords: usize,
}

impl Default for KeywordExtractorConfig {
    fn default() -> Self {
        Self {
            min_keywords: 6,
            max_keywords: 8,
        }
    }
}

const WEIGHT_ENTITY: f64 = 2.0;
const WEIGHT_ENTITY_PRODUCT_BONUS: f64 = 1.0;
const WEIGHT_NOUN_PHRASE: f64 = 1.5;
const WEIGHT_QUOTED_OR_EMPHASIS: f64 = 2.5;
const WEIGHT_NGRAM: f64 = 1.0;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-zÀ-ÖØ-öø-ÿ0-9\-]+").unwrap());
static CAPITALIZED_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Za-z'\-]*(?:\s+[A-Z][A-Za-z'\-]*)*\b").unwrap());
static QUOTED_OR_EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""([^"\n]{2,})"|«\s*([^»\n]{2,})\s*»|\*\*([^*\n]{2,})\*\*|\*([^*\n]{2,})\*|__([^_\n]{2,})__|_([^_\n]{2,})_"#,
    )
    .unwrap()
});

fn tokenize_lower(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn alphabetic_len(phrase: &str) -> usize {
    phrase.chars().filter(|c| c.is_alphabetic()).count()
}

fn length_bonus(phrase: &str) -> f64 {
    let words = phrase.split_whitespace().count().max(1);
    0.25 * (words as f64 - 1.0)
}

fn add_candidate(scores: &mut HashMap<String, f64>, phrase: &str, weight: f64) {
    let key = phrase.trim().to_lowercase();
    if key.is_empty() || alphabetic_len(&key) < 3 {
        return;
    }
    *scores.entry(key).or_insert(0.0) += weight;
}

fn entity_like_candidates(text: &str, scores: &mut HashMap<String, f64>) {
    for m in CAPITALIZED_RUN_RE.find_iter(text) {
        let run = m.as_str();
        let words: Vec<&str> = run.split_whitespace().collect();
        if words.len() < 2 {
            // Single capitalized words are common sentence-initial noise;
            // only multi-word runs are trusted as entity-like here.
            continue;
        }
        let title_case = words
            .iter()
            .all(|w| w.chars().next().is_some_and(|c| c.is_uppercase()));
        let weight = if title_case {
            WEIGHT_ENTITY + WEIGHT_ENTITY_PRODUCT_BONUS
        } else {
            WEIGHT_ENTITY
        };
        add_candidate(scores, run, weight);
    }
}

fn quoted_or_emphasis_candidates(text: &str, scores: &mut HashMap<String, f64>) {
    for caps in QUOTED_OR_EMPHASIS_RE.captures_iter(text) {
        let matched = (1..=6).find_map(|i| caps.get(i)).map(|m| m.as_str());
        if let Some(phrase) = matched {
            add_candidate(scores, phrase, WEIGHT_QUOTED_OR_EMPHASIS);
        }
    }
}

/// Runs of consecutive non-stopword tokens, from which noun-phrase proxies
/// (2-3 word windows) and content n-grams (1-3 word windows) are drawn.
fn content_runs(tokens: &[String]) -> Vec<&[String]> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, tok) in tokens.iter().enumerate() {
        let keep = tok.len() >= 3 && !is_stopword(tok) && !tok.chars().all(|c| c.is_ascii_digit());
        match (keep, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(&tokens[s..i]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(&tokens[s..]);
    }
    runs
}

fn noun_phrase_and_ngram_candidates(tokens: &[String], scores: &mut HashMap<String, f64>) {
    for run in content_runs(tokens) {
        for n in 1..=3usize.min(run.len()) {
            for window in run.windows(n) {
                let phrase = window.join(" ");
                // Content-POS n-gram frequency, every window length.
                add_candidate(scores, &phrase, WEIGHT_NGRAM);
                // Noun-phrase proxy bonus for multi-word windows.
                if n >= 2 {
                    add_candidate(scores, &phrase, WEIGHT_NOUN_PHRASE);
                }
            }
        }
    }
}

fn rank_and_truncate(scores: HashMap<String, f64>, config: KeywordExtractorConfig) -> Vec<String> {
    let mut candidates: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(phrase, score)| {
            let bonus = length_bonus(&phrase);
            (phrase, score + bonus)
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap()
            .then_with(|| b.0.split_whitespace().count().cmp(&a.0.split_whitespace().count()))
            .then_with(|| a.0.cmp(&b.0))
    });
    candidates
        .into_iter()
        .take(config.max_keywords)
        .map(|(phrase, _)| phrase)
        .collect()
}

/// Heuristic approximation of the linguistic keyword pipeline.
pub fn extract_keywords(text: &str, config: KeywordExtractorConfig) -> Vec<String> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    entity_like_candidates(text, &mut scores);
    quoted_or_emphasis_candidates(text, &mut scores);
    let tokens = tokenize_lower(text);
    noun_phrase_and_ngram_candidates(&tokens, &mut scores);

    let ranked = rank_and_truncate(scores, config);
    if ranked.is_empty() {
        return extract_keywords_fallback(text, config.max_keywords);
    }
    ranked
}

/// Stopword-filtered unigram frequency count, used when no candidates
/// survive the primary path. Ported directly from the original pipeline's
/// `extract_keywords`.
pub fn extract_keywords_fallback(text: &str, top_n: usize) -> Vec<String> {
    let tokens: Vec<String> = WORD_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|t| t.len() >= 3 && !is_stopword(t) && !t.chars().all(|c| c.is_ascii_digit()))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for tok in tokens {
        if !counts.contains_key(&tok) {
            order.push(tok.clone());
        }
        *counts.entry(tok).or_insert(0) += 1;
    }

    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.into_iter().take(top_n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_counts_frequency_and_drops_stopwords() {
        let text = "the cat sat on the mat the cat slept";
        let kws = extract_keywords_fallback(text, 2);
        assert_eq!(kws, vec!["cat", "sat"]);
    }

    #[test]
    fn fallback_drops_short_and_numeric_tokens() {
        let text = "42 ab xyz123 annotation";
        let kws = extract_keywords_fallback(text, 10);
        assert!(!kws.contains(&"42".to_string()));
        assert!(!kws.contains(&"ab".to_string()));
        assert!(kws.contains(&"xyz123".to_string()));
        assert!(kws.contains(&"annotation".to_string()));
    }

    #[test]
    fn primary_path_picks_up_quoted_names() {
        let text = "The committee approved the plan known as \"Project Nightfall\" last week.";
        let kws = extract_keywords(text, KeywordExtractorConfig::default());
        assert!(kws.iter().any(|k| k.contains("project nightfall")));
    }

    #[test]
    fn primary_path_picks_up_capitalized_entity_runs() {
        let text = "Acme Corporation announced a partnership with Globex Industries today.";
        let kws = extract_keywords(text, KeywordExtractorConfig::default());
        assert!(kws.iter().any(|k| k == "acme corporation"));
    }

    #[test]
    fn results_are_deduplicated_and_capped() {
        let text = "alpha beta alpha beta alpha gamma delta epsilon zeta eta theta iota";
        let kws = extract_keywords(
            text,
            KeywordExtractorConfig {
                min_keywords: 1,
                max_keywords: 3,
            },
        );
        assert!(kws.len() <= 3);
        let mut sorted = kws.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), kws.len());
    }
}
