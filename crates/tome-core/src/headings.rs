//! Markdown heading discovery with line positions.
//!
//! Headings are located with `pulldown-cmark`'s offset iterator, so block
//! structure follows CommonMark: lines starting with `#` inside fenced or
//! indented code blocks are not headings, and setext headings span their
//! paragraph plus the underline.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag};

/// A heading found in markdown text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Plain text of the heading (inline code included, markup removed).
    pub text: String,
    /// 1..=6. Setext headings are 1 (`===`) or 2 (`---`).
    pub level: u8,
    /// 0-indexed line where the heading construct begins.
    pub start_line: usize,
    /// First line after the construct (after the underline for setext).
    pub end_line: usize,
}

/// Find all headings in `text`, in order of appearance.
///
/// Lines are counted by `'\n'`, matching how the chunker splits text. At
/// most one heading is reported per start line.
///
/// ```rust
/// use tome_core::headings::find_headings;
///
/// let headings = find_headings("# Title\n\nIntro\n\nUsage\n-----\n");
/// assert_eq!(headings.len(), 2);
/// assert_eq!(headings[1].text, "Usage");
/// assert_eq!(headings[1].level, 2);
/// assert_eq!((headings[1].start_line, headings[1].end_line), (4, 6));
/// ```
pub fn find_headings(text: &str) -> Vec<Heading> {
    let newlines: Vec<usize> = text
        .char_indices()
        .filter(|(_, c)| *c == '\n')
        .map(|(i, _)| i)
        .collect();
    let line_of = |offset: usize| newlines.partition_point(|&nl| nl < offset);

    let mut headings: Vec<Heading> = Vec::new();
    let mut open: Option<(u8, usize, usize, String)> = None;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading(level, _, _)) => {
                let last_byte = range.end.saturating_sub(1).max(range.start);
                open = Some((
                    level_number(level),
                    line_of(range.start),
                    line_of(last_byte) + 1,
                    String::new(),
                ));
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, _, _, buf)) = open.as_mut() {
                    buf.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, _, _, buf)) = open.as_mut() {
                    buf.push(' ');
                }
            }
            Event::End(Tag::Heading(..)) => {
                if let Some((level, start_line, end_line, text)) = open.take() {
                    if headings.last().map(|h| h.start_line) == Some(start_line) {
                        continue;
                    }
                    headings.push(Heading {
                        text: text.trim().to_string(),
                        level,
                        start_line,
                        end_line,
                    });
                }
            }
            _ => {}
        }
    }

    headings
}

fn level_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
