//! Recursive heading-aware markdown chunker.
//!
//! Splits a document into a [`SectionData`] tree so that every section fits
//! within a `max_tokens` budget (measured as whitespace-delimited words).
//! The storage layer indexes each section for full-text search, which has a
//! per-row size ceiling; this keeps every row under it.
//!
//! # Algorithm
//!
//! 1. If the text fits, return it as a single leaf.
//! 2. Otherwise split at the shallowest heading level present. Text before
//!    the first such heading becomes a leading intro child (heading `None`).
//! 3. Recurse into sections still over budget, splitting only at headings
//!    strictly deeper than the section's own level. A split section keeps
//!    its heading line and any text before its first sub-heading as its own
//!    `content`.
//! 4. Oversized text with no heading to split at is a [`ChunkError::Oversized`].
//!    This includes a split section whose own heading and leading text,
//!    before its first sub-heading, are already over budget. Every emitted
//!    section therefore fits `max_tokens`.
//!
//! Splitting happens on `'\n'` line boundaries and nothing is trimmed, so
//! [`reconstruct`] returns the input byte-for-byte.
//!
//! # Example
//!
//! ```rust
//! use tome_core::chunk::{chunk_markdown, reconstruct};
//!
//! let doc = "## First\n\nFirst content.\n\n## Second\n\nSecond content.";
//! let root = chunk_markdown(doc, 5).unwrap();
//! assert_eq!(root.children.len(), 2);
//! assert_eq!(reconstruct(&root), doc);
//! ```

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::headings::find_headings;
use crate::models::{Section, SectionData};

/// Default section budget. Roughly 32KB of English prose, well under the
/// full-text index row limit.
pub const DEFAULT_MAX_TOKENS: usize = 8000;

/// Content cannot be split to fit the budget.
///
/// This is a data/configuration error, not a transient one: retrying the
/// same content with the same budget fails the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error(
        "{} exceeds {max_tokens} tokens with no heading boundaries (content length: {tokens} tokens)",
        describe_scope(.heading)
    )]
    Oversized {
        /// Heading of the section that could not be split, `None` for the document.
        heading: Option<String>,
        tokens: usize,
        max_tokens: usize,
    },
}

fn describe_scope(heading: &Option<String>) -> String {
    match heading {
        Some(h) => format!("section '{}'", h),
        None => "content".to_string(),
    }
}

/// Estimate token count as the number of whitespace-delimited words.
pub fn count_tokens(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Short SHA-256 digest of document text, used for change detection.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(16);
    hex
}

/// Chunk markdown into a section tree where every section fits `max_tokens`.
///
/// Returns a leaf when the whole text fits. Otherwise returns a root with
/// `heading: None`, `level: 0`, empty `content`, and the sections as children.
pub fn chunk_markdown(content: &str, max_tokens: usize) -> Result<SectionData, ChunkError> {
    if count_tokens(content) <= max_tokens {
        return Ok(SectionData::leaf(content));
    }

    Ok(SectionData {
        heading: None,
        level: 0,
        content: String::new(),
        children: split_document(content, max_tokens)?,
    })
}

/// Split oversized document-level text into top-level sections, with a
/// leading intro leaf for any text before the first top-level heading.
fn split_document(content: &str, max_tokens: usize) -> Result<Vec<SectionData>, ChunkError> {
    let lines: Vec<&str> = content.split('\n').collect();
    let pieces = split_at_headings(content, &lines, 0);

    let first_start = match pieces.first() {
        Some((_, start)) => *start,
        None => {
            return Err(ChunkError::Oversized {
                heading: None,
                tokens: count_tokens(content),
                max_tokens,
            })
        }
    };

    let mut children = Vec::with_capacity(pieces.len() + 1);
    if first_start > 0 {
        // Kept even when empty: a blank first line still needs its newline back.
        let intro = lines[..first_start].join("\n");
        if count_tokens(&intro) <= max_tokens {
            children.push(SectionData::leaf(intro));
        } else {
            children.extend(split_document(&intro, max_tokens)?);
        }
    }

    for (section, _) in pieces {
        children.push(chunk_section(section, max_tokens)?);
    }

    Ok(children)
}

/// Recursively chunk one heading section that may still be too large.
fn chunk_section(section: SectionData, max_tokens: usize) -> Result<SectionData, ChunkError> {
    if count_tokens(&section.content) <= max_tokens {
        return Ok(section);
    }

    let lines: Vec<&str> = section.content.split('\n').collect();
    let pieces = split_at_headings(&section.content, &lines, section.level);

    let first_start = match pieces.first() {
        Some((_, start)) => *start,
        None => {
            return Err(ChunkError::Oversized {
                heading: section.heading.clone(),
                tokens: count_tokens(&section.content),
                max_tokens,
            })
        }
    };

    let intro = lines[..first_start].join("\n");
    let intro_tokens = count_tokens(&intro);
    if intro_tokens > max_tokens {
        return Err(ChunkError::Oversized {
            heading: section.heading.clone(),
            tokens: intro_tokens,
            max_tokens,
        });
    }
    let children = pieces
        .into_iter()
        .map(|(child, _)| chunk_section(child, max_tokens))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SectionData {
        heading: section.heading,
        level: section.level,
        content: intro,
        children,
    })
}

/// Split `text` at the shallowest heading level strictly deeper than
/// `deeper_than`. Each piece is paired with its start line in `lines`.
fn split_at_headings(text: &str, lines: &[&str], deeper_than: u8) -> Vec<(SectionData, usize)> {
    let headings: Vec<_> = find_headings(text)
        .into_iter()
        .filter(|h| h.level > deeper_than)
        .collect();

    let top_level = match headings.iter().map(|h| h.level).min() {
        Some(level) => level,
        None => return Vec::new(),
    };

    let tops: Vec<_> = headings.iter().filter(|h| h.level == top_level).collect();

    tops.iter()
        .enumerate()
        .map(|(i, heading)| {
            let end = tops
                .get(i + 1)
                .map(|next| next.start_line)
                .unwrap_or(lines.len());
            let section = SectionData {
                heading: Some(heading.text.clone()),
                level: heading.level,
                content: lines[heading.start_line..end].join("\n"),
                children: Vec::new(),
            };
            (section, heading.start_line)
        })
        .collect()
}

/// Rebuild the original text from a chunked tree.
///
/// A leaf yields its content; an internal node yields its own content (when
/// non-empty) followed by each child's reconstruction, joined with `'\n'`.
pub fn reconstruct(section: &SectionData) -> String {
    if section.is_leaf() {
        return section.content.clone();
    }

    let mut parts = Vec::with_capacity(section.children.len() + 1);
    if !section.content.is_empty() {
        parts.push(section.content.clone());
    }
    parts.extend(section.children.iter().map(reconstruct));
    parts.join("\n")
}

/// Flatten a chunked tree into [`Section`] rows for `document_id`.
///
/// Nodes are collected into an arena by a pre-order walk, each recording
/// its parent's arena index, so every parent gets its ID and position before
/// any child refers to it. The content-less split root is not emitted; its
/// children become top-level rows. An unsplit document yields one row.
pub fn flatten_sections(root: &SectionData, document_id: &str) -> Vec<Section> {
    let synthetic_root = !root.is_leaf() && root.heading.is_none() && root.content.is_empty();

    let mut stack: Vec<(&SectionData, Option<usize>)> = if synthetic_root {
        root.children.iter().rev().map(|c| (c, None)).collect()
    } else {
        vec![(root, None)]
    };

    let mut arena: Vec<(&SectionData, Option<usize>)> = Vec::new();
    while let Some((node, parent)) = stack.pop() {
        let index = arena.len();
        arena.push((node, parent));
        for child in node.children.iter().rev() {
            stack.push((child, Some(index)));
        }
    }

    let ids: Vec<String> = arena.iter().map(|_| Uuid::new_v4().to_string()).collect();

    arena
        .iter()
        .enumerate()
        .map(|(position, (node, parent))| Section {
            id: ids[position].clone(),
            document_id: document_id.to_string(),
            parent_section_id: parent.map(|p| ids[p].clone()),
            heading: node.heading.clone(),
            level: node.level,
            content: node.content.clone(),
            position: position as i64,
        })
        .collect()
}

/// Join position-ordered section rows back into text.
///
/// Inverse of [`flatten_sections`]: equal to [`reconstruct`] of the tree the
/// rows came from, and of any subtree when given a section plus its
/// descendants.
pub fn join_sections(sections: &[Section]) -> String {
    let parents: HashSet<&str> = sections
        .iter()
        .filter_map(|s| s.parent_section_id.as_deref())
        .collect();

    sections
        .iter()
        .filter(|s| !(s.content.is_empty() && parents.contains(s.id.as_str())))
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trips(content: &str, max_tokens: usize) {
        let root = chunk_markdown(content, max_tokens)
            .unwrap_or_else(|e| panic!("chunking failed at max_tokens={}: {}", max_tokens, e));
        assert_eq!(reconstruct(&root), content, "tree round-trip, max={}", max_tokens);
        let rows = flatten_sections(&root, "doc");
        assert_eq!(join_sections(&rows), content, "row round-trip, max={}", max_tokens);
    }

    const COMPLEX: &str = "# Document Title

Overview paragraph.

## First Section

First intro.

### First Subsection

First sub content.

### Second Subsection

Second sub content.

## Second Section

Second section content.

### Another Sub

More content here.";

    #[test]
    fn test_count_tokens() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("word"), 1);
        assert_eq!(count_tokens("one two  three"), 3);
        assert_eq!(count_tokens("one\ntwo\n\nthree\tfour"), 4);
    }

    #[test]
    fn test_content_hash_is_short_and_stable() {
        let a = content_hash("hello");
        assert_eq!(a.len(), 16);
        assert_eq!(a, content_hash("hello"));
        assert_ne!(a, content_hash("hello!"));
    }

    #[test]
    fn test_small_document_is_single_leaf() {
        let content = "# Title\n\nHello world.";
        let root = chunk_markdown(content, 1000).unwrap();
        assert_eq!(root, SectionData::leaf(content));
    }

    #[test]
    fn test_forced_split_into_two_children() {
        let content = "## First\n\nFirst content.\n\n## Second\n\nSecond content.";
        let root = chunk_markdown(content, 5).unwrap();
        assert_eq!(root.heading, None);
        assert_eq!(root.level, 0);
        assert_eq!(root.content, "");
        let headings: Vec<_> = root.children.iter().map(|c| c.heading.as_deref()).collect();
        assert_eq!(headings, vec![Some("First"), Some("Second")]);
        assert_eq!(root.children[0].content, "## First\n\nFirst content.\n");
        assert_eq!(reconstruct(&root), content);
    }

    #[test]
    fn test_no_boundary_is_oversized_error() {
        let content = "word ".repeat(10_000);
        let err = chunk_markdown(&content, 100).unwrap_err();
        assert_eq!(
            err,
            ChunkError::Oversized {
                heading: None,
                tokens: 10_000,
                max_tokens: 100
            }
        );
        assert!(err.to_string().contains("no heading boundaries"));
    }

    #[test]
    fn test_oversized_section_names_its_heading() {
        let content = format!("## Small\n\nok\n\n## Huge\n\n{}", "word ".repeat(50));
        let err = chunk_markdown(&content, 10).unwrap_err();
        match err {
            ChunkError::Oversized { heading, .. } => assert_eq!(heading.as_deref(), Some("Huge")),
        }
    }

    #[test]
    fn test_recursive_chunking_with_nested_headings() {
        let sub_one = format!("### Sub One\n\n{}", "word ".repeat(10));
        let sub_two = format!("### Sub Two\n\n{}", "word ".repeat(10));
        let content = format!("## Big Section\n\nIntro.\n\n{}\n\n{}", sub_one, sub_two);

        let root = chunk_markdown(&content, 20).unwrap();
        assert_eq!(root.children.len(), 1);
        let big = &root.children[0];
        assert_eq!(big.heading.as_deref(), Some("Big Section"));
        assert_eq!(big.level, 2);
        assert_eq!(big.content, "## Big Section\n\nIntro.\n");
        let subs: Vec<_> = big.children.iter().map(|c| c.heading.as_deref()).collect();
        assert_eq!(subs, vec![Some("Sub One"), Some("Sub Two")]);
        assert_eq!(reconstruct(&root), content);
    }

    #[test]
    fn test_recursion_never_resplits_same_level() {
        // The h2 is over budget but has no deeper heading: error, not a loop.
        let content = format!("## A\n\n{}\n\n## B\n\nshort", "word ".repeat(30));
        assert!(matches!(
            chunk_markdown(&content, 10),
            Err(ChunkError::Oversized { heading: Some(h), .. }) if h == "A"
        ));
    }

    #[test]
    fn test_position_ordering() {
        let content = "## First\n\nFirst content.\n\n## Second\n\nSecond content.\n\n## Third\n\nThird content.\n";
        let root = chunk_markdown(content, 10).unwrap();
        let headings: Vec<_> = root.children.iter().map(|c| c.heading.clone().unwrap()).collect();
        assert_eq!(headings, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_pre_heading_text_becomes_intro_child() {
        let content = "Preamble text here.\n\n## One\n\nalpha beta\n\n## Two\n\ngamma delta";
        let root = chunk_markdown(content, 5).unwrap();
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children[0], SectionData::leaf("Preamble text here.\n"));
        assert_eq!(reconstruct(&root), content);
    }

    #[test]
    fn test_oversized_intro_is_split_and_spliced() {
        let content = "Lead.\n\n### Deep A\n\naaa aaa\n\n### Deep B\n\nbbb bbb\n\n# Top\n\ntop text";
        let root = chunk_markdown(content, 6).unwrap();
        let headings: Vec<_> = root.children.iter().map(|c| c.heading.as_deref()).collect();
        assert_eq!(headings, vec![None, Some("Deep A"), Some("Deep B"), Some("Top")]);
        assert_eq!(reconstruct(&root), content);
    }

    #[test]
    fn test_mixed_setext_and_atx_split() {
        let content = "Main Title\n==========\n\nIntroduction.\n\n## ATX Section\n\nATX content.\n\nAnother Section\n---------------\n\nMore content.\n";
        let root = chunk_markdown(content, 6).unwrap();
        assert_eq!(root.children.len(), 1);
        let main = &root.children[0];
        assert_eq!(main.heading.as_deref(), Some("Main Title"));
        assert_eq!(main.level, 1);
        let subs: Vec<_> = main.children.iter().map(|c| c.heading.as_deref()).collect();
        assert_eq!(subs, vec![Some("ATX Section"), Some("Another Section")]);
        assert_eq!(reconstruct(&root), content);
    }

    #[test]
    fn test_fenced_hashes_do_not_split() {
        let content = "## Install\n\n```sh\n# comment one\n# comment two\n```\n\n## Use\n\nrun it";
        let root = chunk_markdown(content, 10).unwrap();
        let headings: Vec<_> = root.children.iter().map(|c| c.heading.as_deref()).collect();
        assert_eq!(headings, vec![Some("Install"), Some("Use")]);
    }

    #[test]
    fn test_oversized_section_intro_is_an_error() {
        let content = format!(
            "## Guide\n\n{}\n\n### Step\n\nshort\n\n## Next\n\nok",
            "word ".repeat(30)
        );
        let err = chunk_markdown(&content, 10).unwrap_err();
        match err {
            ChunkError::Oversized { heading, tokens, max_tokens } => {
                assert_eq!(heading.as_deref(), Some("Guide"));
                assert_eq!(tokens, 32);
                assert_eq!(max_tokens, 10);
            }
        }
    }

    fn markdown_line() -> impl Strategy<Value = String> {
        prop_oneof![
            (1usize..=4, "[a-z]{1,8}").prop_map(|(level, word)| format!("{} {}", "#".repeat(level), word)),
            "[a-z]{1,6}( [a-z]{1,6}){0,6}",
            Just(String::new()),
            Just("---".to_string()),
            Just("===".to_string()),
            Just("```".to_string()),
            Just("    # indented".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn test_generated_markdown_round_trips_within_budget(
            lines in prop::collection::vec(markdown_line(), 0..40),
            max_tokens in 1usize..30,
            trailing_newline in any::<bool>(),
        ) {
            let mut content = lines.join("\n");
            if trailing_newline {
                content.push('\n');
            }
            match chunk_markdown(&content, max_tokens) {
                Ok(root) => {
                    prop_assert_eq!(reconstruct(&root), content.clone());
                    let rows = flatten_sections(&root, "doc");
                    prop_assert_eq!(join_sections(&rows), content.clone());
                    for row in &rows {
                        prop_assert!(count_tokens(&row.content) <= max_tokens, "row over budget: {:?}", row.content);
                    }
                }
                Err(ChunkError::Oversized { .. }) => {}
            }
        }
    }

    #[test]
    fn test_round_trip_law() {
        let cases = [
            "",
            "\n",
            "plain text, no headings",
            "# Small Document\n\nThis is small.",
            "## First\n\nContent here.\n\n## Second\n\nMore content.",
            "\n\n## Leading blanks\n\ntext text text\n\n## Next\n\nmore more more\n\n\n",
            "\n# Single blank line first\n\nbody body\n\n# Again\n\nbody body",
            "Main Title\n==========\n\nIntroduction.\n\nSub Section\n-----------\n\nSub content.",
            "# A\r\n\r\nwindows line endings here\r\n\r\n# B\r\n\r\nmore words here\r\n",
            COMPLEX,
        ];
        for content in cases {
            for max_tokens in [3, 5, 8, 10, 20, 1000] {
                match chunk_markdown(content, max_tokens) {
                    Ok(_) => round_trips(content, max_tokens),
                    Err(ChunkError::Oversized { .. }) => {}
                }
            }
        }
    }

    #[test]
    fn test_complex_document_round_trip_at_small_budget() {
        round_trips(COMPLEX, 10);
        let root = chunk_markdown(COMPLEX, 10).unwrap();
        let title = &root.children[0];
        assert_eq!(title.heading.as_deref(), Some("Document Title"));
        assert_eq!(title.children.len(), 2);
    }

    #[test]
    fn test_flatten_unsplit_document_is_one_row() {
        let root = chunk_markdown("# Hi\n\nthere", 100).unwrap();
        let rows = flatten_sections(&root, "doc-1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_id, "doc-1");
        assert_eq!(rows[0].parent_section_id, None);
        assert_eq!(rows[0].position, 0);
        assert_eq!(rows[0].content, "# Hi\n\nthere");
    }

    #[test]
    fn test_flatten_assigns_parents_before_children() {
        let root = chunk_markdown(COMPLEX, 10).unwrap();
        let rows = flatten_sections(&root, "doc");

        let positions: Vec<i64> = rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, (0..rows.len() as i64).collect::<Vec<_>>());

        for (i, row) in rows.iter().enumerate() {
            if let Some(parent) = &row.parent_section_id {
                let parent_index = rows.iter().position(|r| &r.id == parent).unwrap();
                assert!(parent_index < i, "parent must precede child");
                assert!(rows[parent_index].level < row.level);
            }
        }

        let top: Vec<_> = rows.iter().filter(|r| r.parent_section_id.is_none()).collect();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].heading.as_deref(), Some("Document Title"));
    }

    #[test]
    fn test_join_subtree_matches_subtree_reconstruction() {
        let root = chunk_markdown(COMPLEX, 10).unwrap();
        let rows = flatten_sections(&root, "doc");
        let first = rows
            .iter()
            .position(|r| r.heading.as_deref() == Some("First Section"))
            .unwrap();
        let subtree: Vec<Section> = rows[first..first + 3].to_vec();
        let expected = reconstruct(&root.children[0].children[0]);
        assert_eq!(join_sections(&subtree), expected);
        assert!(expected.starts_with("## First Section"));
        assert!(expected.ends_with("Second sub content.\n"));
    }
}
