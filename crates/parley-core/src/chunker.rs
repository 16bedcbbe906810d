//! Outbound chunker.
//!
//! Splits a reply into [`OutboundFragment`]s no longer than a channel's
//! message limit. Lengths are counted in `char`s.
//!
//! - [`ChunkMode::Plain`] cuts greedily at the last paragraph break, line
//!   break or whitespace inside the limit, and hard-cuts when there is none.
//!   Nothing is trimmed, so the fragments concatenate back to the input.
//! - [`ChunkMode::Structured`] packs markdown blocks (paragraphs and fenced
//!   code) into fragments without splitting them. An oversized paragraph is
//!   split between headings, list items and lines; an oversized code block
//!   is split by lines and every piece re-wrapped in the original fences.

use parley_types::config::ChunkMode;
use parley_types::event::OutboundFragment;

/// Split `text` into fragments of at most `max_length` chars.
///
/// Empty input yields no fragments; any other input yields at least one.
/// A `max_length` of zero is treated as one.
pub fn split(text: &str, mode: ChunkMode, max_length: usize) -> Vec<OutboundFragment> {
    let max = max_length.max(1);
    let pieces = if text.is_empty() {
        Vec::new()
    } else if char_len(text) <= max {
        vec![text.to_owned()]
    } else {
        match mode {
            ChunkMode::Plain => split_plain(text, max),
            ChunkMode::Structured => {
                let pieces = split_structured(text, max);
                if pieces.is_empty() {
                    split_plain(text, max)
                } else {
                    pieces
                }
            }
        }
    };

    let last = pieces.len().saturating_sub(1);
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| OutboundFragment {
            text,
            sequence_index: i,
            is_last: i == last,
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`th char, or the end of the string.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

// ── Plain ────────────────────────────────────────────────────────────────

fn split_plain(text: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while char_len(rest) > max {
        let window = &rest[..byte_offset(rest, max)];
        let cut = find_break(window).unwrap_or(window.len());
        pieces.push(rest[..cut].to_owned());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_owned());
    }
    pieces
}

/// Byte offset just past the best break inside `window`: the last blank
/// line, else the last newline, else the last whitespace char. A break at
/// the very start does not count.
fn find_break(window: &str) -> Option<usize> {
    let after = |sep: &str| match window.rfind(sep) {
        Some(i) if i > 0 => Some(i + sep.len()),
        _ => None,
    };
    after("\n\n").or_else(|| after("\n")).or_else(|| {
        window
            .char_indices()
            .rev()
            .find(|(i, c)| *i > 0 && c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
    })
}

// ── Structured ───────────────────────────────────────────────────────────

enum Block {
    Text(String),
    Fence {
        header: String,
        fence: String,
        body: Vec<String>,
    },
}

impl Block {
    fn render(&self) -> String {
        match self {
            Block::Text(text) => text.clone(),
            Block::Fence {
                header,
                fence,
                body,
            } => {
                let mut out = header.clone();
                for line in body {
                    out.push('\n');
                    out.push_str(line);
                }
                out.push('\n');
                out.push_str(fence);
                out
            }
        }
    }
}

fn split_structured(text: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for block in parse_blocks(text) {
        let rendered = block.render();
        let len = char_len(&rendered);

        if current.is_empty() && len <= max {
            current = rendered;
            continue;
        }
        if !current.is_empty() && char_len(&current) + 2 + len <= max {
            current.push_str("\n\n");
            current.push_str(&rendered);
            continue;
        }

        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if len <= max {
            current = rendered;
        } else {
            pieces.extend(split_oversized(&block, &rendered, max));
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Break text into paragraphs and fenced code blocks. Blank lines outside
/// fences separate paragraphs; an unclosed fence is closed at the end.
fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut para: Vec<&str> = Vec::new();
    let mut fence: Option<(String, String, Vec<String>)> = None;

    for line in text.lines() {
        if let Some((header, marker, body)) = fence.as_mut() {
            if closes_fence(line, marker) {
                blocks.push(Block::Fence {
                    header: std::mem::take(header),
                    fence: line.trim().to_owned(),
                    body: std::mem::take(body),
                });
                fence = None;
            } else {
                body.push(line.to_owned());
            }
        } else if let Some(marker) = opening_fence(line) {
            flush_para(&mut para, &mut blocks);
            fence = Some((line.to_owned(), marker.to_owned(), Vec::new()));
        } else if line.trim().is_empty() {
            flush_para(&mut para, &mut blocks);
        } else {
            para.push(line);
        }
    }

    flush_para(&mut para, &mut blocks);
    if let Some((header, marker, body)) = fence {
        blocks.push(Block::Fence {
            header,
            fence: marker,
            body,
        });
    }
    blocks
}

fn flush_para(para: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if para.is_empty() {
        return;
    }
    let joined = para.join("\n");
    let trimmed = joined.trim_end();
    if !trimmed.is_empty() {
        blocks.push(Block::Text(trimmed.to_owned()));
    }
    para.clear();
}

/// The fence run (```` ``` ```` or `~~~`, three or more) opening a code block.
fn opening_fence(line: &str) -> Option<&str> {
    let first = line.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let run = line.len() - line.trim_start_matches(first).len();
    (run >= 3).then(|| &line[..run])
}

fn closes_fence(line: &str, marker: &str) -> bool {
    let trimmed = line.trim();
    let Some(ch) = marker.chars().next() else {
        return false;
    };
    trimmed.len() >= marker.len() && trimmed.chars().all(|c| c == ch)
}

fn split_oversized(block: &Block, rendered: &str, max: usize) -> Vec<String> {
    match block {
        Block::Text(text) => pack_units(&text_units(text), max),
        Block::Fence {
            header,
            fence,
            body,
        } => {
            // header + '\n' + piece + '\n' + fence must fit.
            let overhead = char_len(header) + char_len(fence) + 2;
            if overhead >= max {
                return split_plain(rendered, max);
            }
            let inner = max - overhead;
            split_plain(&body.join("\n"), inner)
                .into_iter()
                .map(|piece| format!("{header}\n{}\n{fence}", piece.trim_end_matches('\n')))
                .collect()
        }
    }
}

/// Units of a paragraph that must stay whole where possible: headings,
/// list items with their indented continuation lines, and single lines.
fn text_units(text: &str) -> Vec<String> {
    let mut units: Vec<String> = Vec::new();
    let mut in_item = false;

    for line in text.lines() {
        let continuation = line.starts_with([' ', '\t']) && !is_heading(line);
        if in_item
            && continuation
            && let Some(last) = units.last_mut()
        {
            last.push('\n');
            last.push_str(line);
            continue;
        }
        in_item = is_list_item(line);
        units.push(line.to_owned());
    }
    units
}

fn is_heading(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix(['-', '*', '+']) {
        return rest.starts_with(' ');
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0
        && trimmed[digits..]
            .strip_prefix(['.', ')'])
            .is_some_and(|rest| rest.starts_with(' '))
}

/// Greedily pack units joined by newlines; a unit longer than `max` is
/// split plainly.
fn pack_units(units: &[String], max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for unit in units {
        let len = char_len(unit);
        if !current.is_empty() && char_len(&current) + 1 + len <= max {
            current.push('\n');
            current.push_str(unit);
            continue;
        }
        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if len <= max {
            current = unit.clone();
        } else {
            pieces.extend(split_plain(unit, max));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(fragments: &[OutboundFragment]) -> Vec<&str> {
        fragments.iter().map(|f| f.text.as_str()).collect()
    }

    fn assert_bounded(fragments: &[OutboundFragment], max: usize) {
        for f in fragments {
            assert!(!f.text.is_empty(), "empty fragment");
            assert!(
                char_len(&f.text) <= max,
                "fragment of {} chars exceeds {max}: {:?}",
                char_len(&f.text),
                f.text
            );
        }
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split("", ChunkMode::Plain, 10).is_empty());
        assert!(split("", ChunkMode::Structured, 10).is_empty());
    }

    #[test]
    fn short_input_is_one_fragment() {
        let fragments = split("hello", ChunkMode::Structured, 10);
        assert_eq!(texts(&fragments), vec!["hello"]);
        assert_eq!(fragments[0].sequence_index, 0);
        assert!(fragments[0].is_last);
    }

    #[test]
    fn plain_9000_chars_into_three() {
        let text = "lorem ".repeat(1500);
        assert_eq!(char_len(&text), 9000);

        let fragments = split(&text, ChunkMode::Plain, 4096);
        assert_eq!(fragments.len(), 3);
        assert_bounded(&fragments, 4096);

        let joined: String = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(joined, text);
        assert_eq!(
            fragments.iter().map(|f| f.is_last).collect::<Vec<_>>(),
            vec![false, false, true]
        );
        assert_eq!(fragments[2].sequence_index, 2);
    }

    #[test]
    fn plain_hard_cut_without_whitespace() {
        let fragments = split("aaaaaaaaaa", ChunkMode::Plain, 4);
        assert_eq!(texts(&fragments), vec!["aaaa", "aaaa", "aa"]);
    }

    #[test]
    fn plain_prefers_paragraph_then_line_then_space() {
        let fragments = split("one two\n\nthree four", ChunkMode::Plain, 14);
        assert_eq!(texts(&fragments), vec!["one two\n\n", "three four"]);

        let fragments = split("one two\nthree four", ChunkMode::Plain, 14);
        assert_eq!(texts(&fragments), vec!["one two\n", "three four"]);

        let fragments = split("one two three four", ChunkMode::Plain, 10);
        assert_eq!(texts(&fragments), vec!["one two ", "three four"]);
    }

    #[test]
    fn lengths_are_counted_in_chars() {
        let text = "é".repeat(10);
        let fragments = split(&text, ChunkMode::Plain, 3);
        assert_eq!(fragments.len(), 4);
        assert_bounded(&fragments, 3);
        assert_eq!(fragments[3].text, "é");
    }

    #[test]
    fn zero_max_length_is_clamped() {
        let fragments = split("abc", ChunkMode::Plain, 0);
        assert_eq!(texts(&fragments), vec!["a", "b", "c"]);
    }

    #[test]
    fn structured_keeps_fence_whole() {
        let para = "x".repeat(50);
        let code = format!("```rust\n{}\n```", "let a = 1;\n".repeat(6).trim_end());
        assert!(char_len(&code) <= 100);
        let text = format!("{para}\n\n{code}\n\n{para}");

        let fragments = split(&text, ChunkMode::Structured, 100);
        assert_bounded(&fragments, 100);
        assert!(
            fragments.iter().any(|f| f.text.contains(&code)),
            "fence was split: {fragments:?}"
        );
        assert!(fragments.iter().all(|f| f.text.matches("```").count() % 2 == 0));
    }

    #[test]
    fn structured_packs_small_blocks() {
        let text = "first para\n\nsecond para\n\nthird para that is longer";
        let fragments = split(text, ChunkMode::Structured, 30);
        assert_eq!(
            texts(&fragments),
            vec!["first para\n\nsecond para", "third para that is longer"]
        );
    }

    #[test]
    fn oversized_fence_is_rewrapped() {
        let body: Vec<String> = (0..40).map(|i| format!("line {i:02}")).collect();
        let text = format!("```python\n{}\n```", body.join("\n"));

        let fragments = split(&text, ChunkMode::Structured, 60);
        assert!(fragments.len() > 1);
        assert_bounded(&fragments, 60);
        for f in &fragments {
            assert!(f.text.starts_with("```python\n"), "{:?}", f.text);
            assert!(f.text.ends_with("\n```"), "{:?}", f.text);
        }
        let all: String = fragments.iter().map(|f| f.text.as_str()).collect();
        for line in &body {
            assert!(all.contains(line.as_str()));
        }
    }

    #[test]
    fn unclosed_fence_is_closed() {
        let text = format!("~~~~\n{}", "code\n".repeat(30));
        let fragments = split(&text, ChunkMode::Structured, 40);
        assert_bounded(&fragments, 40);
        for f in &fragments {
            assert!(f.text.starts_with("~~~~\n"));
            assert!(f.text.ends_with("\n~~~~"));
        }
    }

    #[test]
    fn list_item_continuation_stays_together() {
        let text = "- item one\n  continues here\n- item two\n  also continues\n- item three";
        let fragments = split(text, ChunkMode::Structured, 30);
        assert_bounded(&fragments, 30);
        assert!(fragments.iter().any(|f| f.text == "- item one\n  continues here"));
        assert!(fragments.iter().any(|f| f.text.contains("- item two\n  also continues")));
    }

    #[test]
    fn headings_are_units() {
        let text = "# Title\nsome text here\n## Next\nmore text here";
        let fragments = split(text, ChunkMode::Structured, 25);
        assert_bounded(&fragments, 25);
        assert!(fragments.iter().all(|f| !f.text.ends_with('#')));
        assert!(fragments.iter().any(|f| f.text.starts_with("## Next")));
    }

    #[test]
    fn tiny_limit_never_exceeded() {
        let text = "# Head\n\n```js\nconsole.log(1);\nconsole.log(2);\n```\n\n- a\n  b\n\nplain words here";
        for max in 1..=60 {
            for mode in [ChunkMode::Plain, ChunkMode::Structured] {
                let fragments = split(text, mode, max);
                assert!(!fragments.is_empty());
                assert_bounded(&fragments, max);
                assert!(fragments.last().unwrap().is_last);
            }
        }
    }

    #[test]
    fn whitespace_only_input_still_yields_fragments() {
        let fragments = split(&" ".repeat(25), ChunkMode::Structured, 10);
        assert!(!fragments.is_empty());
        assert_bounded(&fragments, 10);
    }

    #[test]
    fn list_item_detection() {
        assert!(is_list_item("- a"));
        assert!(is_list_item("  * a"));
        assert!(is_list_item("12. a"));
        assert!(is_list_item("3) a"));
        assert!(!is_list_item("-a"));
        assert!(!is_list_item("12 a"));
        assert!(!is_list_item("text"));
    }
}
