//! Heading-aware, list-atomic, table-aware Markdown chunker.
//!
//! Scans a Markdown document top-to-bottom as a small state machine over
//! lines, buffering blocks per heading scope and packing them greedily into
//! chunks that respect a token budget. List blocks are never split; a
//! paragraph immediately preceding a list is folded into the same chunk.

use std::sync::LazyLock;

use regex::Regex;

use crate::chunking::tokens::estimate_tokens;
use crate::types::{Chunk, HeadingMap};

/// Default token budget used when the caller doesn't pick one, matching the
/// original pipeline's default.
pub const DEFAULT_CHUNK_SIZE_TOKENS: usize = 200;

/// Tunable knobs for a chunking run.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub chunk_size_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: DEFAULT_CHUNK_SIZE_TOKENS,
        }
    }
}

/// A list block (or list-plus-paragraph merge) whose rendered text exceeded
/// the configured budget. The chunk is still emitted whole; this is
/// informational.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkWarning {
    pub chunk_index: usize,
    pub actual_tokens: usize,
    pub budget: usize,
}

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").unwrap());
static LIST_ITEM_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]\s+|\d+[.)]\s+)").unwrap());
static INDENTED_CONTINUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s{2,}\S|\t)").unwrap());
static TABLE_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)+\|?\s*$").unwrap()
});

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn parse_heading(line: &str) -> Option<(u8, String)> {
    let caps = HEADING_RE.captures(line)?;
    let level = caps[1].len() as u8;
    Some((level, caps[2].to_string()))
}

fn is_list_item_start(line: &str) -> bool {
    LIST_ITEM_START_RE.is_match(line)
}

fn is_indented_continuation(line: &str) -> bool {
    INDENTED_CONTINUATION_RE.is_match(line)
}

fn is_table_row(line: &str) -> bool {
    !is_blank(line) && line.contains('|')
}

/// A buffered, already-rendered unit of chunk content.
#[derive(Debug, Clone)]
enum Block {
    Paragraph { text: String, tokens: usize },
    List { text: String, tokens: usize },
    Table { text: String, tokens: usize },
}

impl Block {
    fn text(&self) -> &str {
        match self {
            Block::Paragraph { text, .. } | Block::List { text, .. } | Block::Table { text, .. } => text,
        }
    }

    fn tokens(&self) -> usize {
        match self {
            Block::Paragraph { tokens, .. } | Block::List { tokens, .. } | Block::Table { tokens, .. } => *tokens,
        }
    }
}

/// A chunk before its final, document-wide `chunk_id` renumbering pass.
struct PreChunk {
    text: String,
    headings: HeadingMap,
}

/// Parses a maximal contiguous list block starting at `lines[start]`.
///
/// Returns the exclusive end index and the block's rendered text (raw lines
/// joined by newline, trailing blank lines trimmed).
fn parse_list_block(lines: &[&str], start: usize) -> (usize, String) {
    let mut idx = start;
    let mut collected: Vec<&str> = Vec::new();
    while idx < lines.len() {
        let line = lines[idx];
        if is_blank(line) {
            let next_non_blank = lines[idx + 1..].iter().position(|l| !is_blank(l)).map(|p| idx + 1 + p);
            let continues = next_non_blank
                .map(|n| is_list_item_start(lines[n]) || is_indented_continuation(lines[n]))
                .unwrap_or(false);
            if continues {
                collected.push(line);
                idx += 1;
                continue;
            }
            break;
        }
        if is_list_item_start(line) || is_indented_continuation(line) {
            collected.push(line);
            idx += 1;
        } else {
            break;
        }
    }
    while matches!(collected.last(), Some(l) if is_blank(l)) {
        collected.pop();
    }
    (idx, collected.join("\n"))
}

/// If a non-blank, non-heading, non-list paragraph immediately precedes
/// `list_start` (allowing intervening blank lines), returns how many blank
/// lines separate them. Returns `None` when there is nothing to merge.
fn preceding_paragraph_gap(lines: &[&str], list_start: usize) -> Option<usize> {
    if list_start == 0 {
        return None;
    }
    let mut idx = list_start as isize - 1;
    let mut blank_count = 0usize;
    while idx >= 0 && is_blank(lines[idx as usize]) {
        blank_count += 1;
        idx -= 1;
    }
    if idx < 0 {
        return None;
    }
    let line = lines[idx as usize];
    if parse_heading(line).is_some()
        || is_list_item_start(line)
        || is_indented_continuation(line)
        || is_table_row(line)
    {
        return None;
    }
    Some(blank_count)
}

/// Parses a table starting at the header line `lines[start]` (already
/// confirmed to be followed by a separator row). Returns the exclusive end
/// index and the rendered `TABLE:\n...` text.
fn parse_table(lines: &[&str], start: usize) -> (usize, String) {
    let header_cells: Vec<String> = lines[start]
        .trim()
        .trim_matches('|')
        .split('|')
        .map(|c| c.trim().to_string())
        .collect();

    let mut idx = start + 2; // skip header + separator
    let mut rows: Vec<String> = Vec::new();
    while idx < lines.len() {
        let line = lines[idx];
        if is_blank(line) || parse_heading(line).is_some() || is_list_item_start(line) || !line.contains('|') {
            break;
        }
        let cells: Vec<String> = line
            .trim()
            .trim_matches('|')
            .split('|')
            .map(|c| c.trim().to_string())
            .collect();
        let rendered: Vec<String> = header_cells
            .iter()
            .zip(cells.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{key}: {value}"))
            .collect();
        if !rendered.is_empty() {
            rows.push(rendered.join("; "));
        }
        idx += 1;
    }

    if rows.is_empty() {
        rows.push(header_cells.join(" | "));
    }

    (idx, format!("TABLE:\n{}", rows.join("\n")))
}

/// Packs buffered blocks into one or more chunks under `budget`, greedily:
/// a block is added to the running chunk unless doing so would exceed the
/// budget and the running chunk is already non-empty, in which case the
/// running chunk is finalized first. A single oversized block always gets
/// its own chunk intact.
fn pack_blocks(blocks: &[Block], budget: usize, headings: &HeadingMap) -> (Vec<PreChunk>, Vec<usize>) {
    let mut chunks = Vec::new();
    let mut oversized_list_tokens = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    for block in blocks {
        if matches!(block, Block::List { tokens, .. } if *tokens > budget) {
            oversized_list_tokens.push(block.tokens());
        }
        if !current.is_empty() && current_tokens + block.tokens() > budget {
            chunks.push(PreChunk {
                text: current.join("\n\n"),
                headings: headings.clone(),
            });
            current.clear();
            current_tokens = 0;
        }
        current.push(block.text());
        current_tokens += block.tokens();
    }
    if !current.is_empty() {
        chunks.push(PreChunk {
            text: current.join("\n\n"),
            headings: headings.clone(),
        });
    }
    (chunks, oversized_list_tokens)
}

/// Chunks `markdown` from a document whose stem (used in `chunk_id`) is
/// `source_stem`. Never fails: malformed tables degrade to paragraph
/// handling and oversized atomic blocks are emitted whole with a warning.
pub fn chunk_markdown(source_stem: &str, markdown: &str, config: ChunkerConfig) -> (Vec<Chunk>, Vec<ChunkWarning>) {
    let budget = config.chunk_size_tokens;
    let lines: Vec<&str> = markdown.lines().collect();

    let mut headings: HeadingMap = HeadingMap::new();
    let mut buffer: Vec<Block> = Vec::new();
    let mut paragraph_lines: Vec<&str> = Vec::new();
    let mut pre_chunks: Vec<PreChunk> = Vec::new();
    let mut warnings: Vec<ChunkWarning> = Vec::new();

    macro_rules! flush_paragraph {
        () => {
            if !paragraph_lines.is_empty() {
                let text = paragraph_lines.join("\n");
                let tokens = estimate_tokens(&text);
                buffer.push(Block::Paragraph { text, tokens });
                paragraph_lines.clear();
            }
        };
    }

    macro_rules! emit_buffer {
        () => {
            if !buffer.is_empty() {
                let (chunks, oversized) = pack_blocks(&buffer, budget, &headings);
                for tokens in oversized {
                    warnings.push(ChunkWarning {
                        chunk_index: pre_chunks.len(),
                        actual_tokens: tokens,
                        budget,
                    });
                }
                pre_chunks.extend(chunks);
                buffer.clear();
            }
        };
    }

    let mut i = 0usize;
    while i < lines.len() {
        let line = lines[i];

        if is_blank(line) {
            flush_paragraph!();
            i += 1;
            continue;
        }

        if let Some((level, title)) = parse_heading(line) {
            flush_paragraph!();
            emit_buffer!();
            headings.retain(|&l, _| l < level);
            headings.insert(level, title);
            i += 1;
            continue;
        }

        if is_table_row(line) && i + 1 < lines.len() && TABLE_SEPARATOR_RE.is_match(lines[i + 1]) {
            flush_paragraph!();
            let (end, text) = parse_table(&lines, i);
            let tokens = estimate_tokens(&text);
            buffer.push(Block::Table { text, tokens });
            i = end;
            continue;
        }

        if is_list_item_start(line) {
            flush_paragraph!();
            let (end, list_text) = parse_list_block(&lines, i);
            let gap = preceding_paragraph_gap(&lines, i);
            match (gap, buffer.last()) {
                (Some(blank_count), Some(Block::Paragraph { .. })) => {
                    let Block::Paragraph { text: para_text, .. } = buffer.pop().unwrap() else {
                        unreachable!()
                    };
                    let sep = if blank_count >= 1 { "\n\n" } else { "\n" };
                    let merged = format!("{para_text}{sep}{list_text}");
                    let tokens = estimate_tokens(&merged);
                    buffer.push(Block::List { text: merged, tokens });
                }
                _ => {
                    let tokens = estimate_tokens(&list_text);
                    buffer.push(Block::List { text: list_text, tokens });
                }
            }
            i = end;
            continue;
        }

        paragraph_lines.push(line);
        i += 1;
    }

    flush_paragraph!();
    emit_buffer!();

    let chunks = pre_chunks
        .into_iter()
        .enumerate()
        .map(|(idx, pre)| {
            let approx_tokens = estimate_tokens(&pre.text).max(1);
            let heading = Chunk::deepest_heading(&pre.headings);
            let full_headings = Chunk::full_headings_path(&pre.headings);
            Chunk {
                chunk_id: format!("{source_stem}-{}", idx + 1),
                text: pre.text,
                headings: pre.headings,
                heading,
                full_headings,
                keywords: Vec::new(),
                approx_tokens,
                source: source_stem.to_string(),
            }
        })
        .collect();

    (chunks, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, budget: usize) -> (Vec<Chunk>, Vec<ChunkWarning>) {
        chunk_markdown("A", text, ChunkerConfig { chunk_size_tokens: budget })
    }

    #[test]
    fn two_paragraphs_under_one_heading_form_one_chunk() {
        let (chunks, _) = chunk("# A\n\npara1\n\npara2\n", 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "A-1");
        assert_eq!(chunks[0].headings.get(&1).map(String::as_str), Some("A"));
        assert!(chunks[0].text.contains("para1"));
        assert!(chunks[0].text.contains("para2"));
    }

    #[test]
    fn heading_break_splits_into_two_chunks() {
        let (chunks, _) = chunk("# A\n\npara1\n\n## B\n\npara2\n", 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].headings.get(&1).map(String::as_str), Some("A"));
        assert_eq!(chunks[0].headings.get(&2), None);
        assert_eq!(chunks[1].headings.get(&1).map(String::as_str), Some("A"));
        assert_eq!(chunks[1].headings.get(&2).map(String::as_str), Some("B"));
        assert!(!chunks[0].text.contains("para2"));
        assert!(!chunks[1].text.contains("para1"));
    }

    #[test]
    fn atomic_list_stays_in_one_chunk_even_over_budget() {
        let items: String = (1..=20)
            .map(|n| format!("- item number {n} with quite a lot of padding words here today\n"))
            .collect();
        let md = format!("# A\n\n{items}");
        let (chunks, warnings) = chunk(&md, 50);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].approx_tokens > 50);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn paragraph_immediately_before_list_shares_its_chunk() {
        let (chunks, _) = chunk("# A\n\nintro sentence.\n\n- item1\n- item2\n", 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("intro sentence."));
        assert!(chunks[0].text.contains("item1"));
        assert!(chunks[0].text.contains("item2"));
    }

    #[test]
    fn paragraph_not_immediately_before_list_is_not_merged() {
        let (chunks, _) = chunk("# A\n\nintro sentence.\n\nsecond paragraph.\n\n- item1\n", 1);
        // tiny budget forces separate chunks; the list must not absorb a
        // paragraph that isn't its immediate predecessor once a flush
        // already happened between them.
        assert!(chunks.iter().any(|c| c.text.contains("item1") && !c.text.contains("intro sentence")));
    }

    #[test]
    fn table_renders_as_key_value_rows() {
        let md = "# A\n\n| Name | Age |\n|---|---|\n| Alice | 30 |\n| Bob | |\n";
        let (chunks, _) = chunk(md, 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("TABLE:"));
        assert!(chunks[0].text.contains("Name: Alice; Age: 30"));
        assert!(chunks[0].text.contains("Name: Bob"));
        assert!(!chunks[0].text.contains("Age: ;"));
    }

    #[test]
    fn packing_splits_on_budget_overflow() {
        let md = "# A\n\nfirst block word word word\n\nsecond block word word word\n\nthird block word word word\n";
        let (chunks, _) = chunk(md, 5);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.approx_tokens >= 1);
        }
    }

    #[test]
    fn approx_tokens_matches_word_count() {
        let (chunks, _) = chunk("# A\n\none two three\n", 100);
        assert_eq!(chunks[0].approx_tokens, estimate_tokens(&chunks[0].text));
    }

    #[test]
    fn malformed_table_falls_back_to_paragraph() {
        let md = "# A\n\n| not | a | table\njust text with pipes\n";
        let (chunks, _) = chunk(md, 100);
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].text.contains("TABLE:"));
    }
}
