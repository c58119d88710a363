//! Text helpers shared by the scanner, emitter and editor: byte-range edits,
//! escaping of typed text, and the mapping between raw run text and the
//! characters a reader sees.

use serde::{Deserialize, Serialize};

/// Characters that LaTeX escapes with a single backslash and that the scanner
/// keeps as plain text.
pub const ESCAPED_SPECIALS: &[char] = &['{', '}', '$', '%', '&', '#', '_'];

/// A byte-range replacement on a source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub start: usize,
    pub old_len: usize,
    pub new_text: String,
}

impl TextEdit {
    pub fn new(start: usize, old_len: usize, new_text: impl Into<String>) -> Self {
        Self {
            start,
            old_len,
            new_text: new_text.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::new(at, 0, text)
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Self::new(start, end.saturating_sub(start), String::new())
    }

    pub fn old_end(&self) -> usize {
        self.start + self.old_len
    }

    pub fn new_end(&self) -> usize {
        self.start + self.new_text.len()
    }

    pub fn is_noop(&self) -> bool {
        self.old_len == 0 && self.new_text.is_empty()
    }

    /// Whether the edit addresses valid char boundaries of `source`.
    pub fn fits(&self, source: &str) -> bool {
        self.old_end() <= source.len()
            && source.is_char_boundary(self.start)
            && source.is_char_boundary(self.old_end())
    }

    /// Apply to `source`. The edit must [`fit`](Self::fits) the source.
    pub fn apply(&self, source: &mut String) {
        source.replace_range(self.start..self.old_end(), &self.new_text);
    }

    /// The edit that undoes this one, given the source it was applied to.
    pub fn inverse(&self, old_source: &str) -> Self {
        Self::new(
            self.start,
            self.new_text.len(),
            &old_source[self.start..self.old_end()],
        )
    }

    /// The same change without the prefix and suffix it leaves unchanged.
    /// The edit must fit `source`.
    pub fn trimmed(&self, source: &str) -> Self {
        let old = &source[self.start..self.old_end()];
        let new = self.new_text.as_str();
        let prefix = old
            .chars()
            .zip(new.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum::<usize>();
        let suffix = old[prefix..]
            .chars()
            .rev()
            .zip(new[prefix..].chars().rev())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum::<usize>();
        Self::new(
            self.start + prefix,
            old.len() - prefix - suffix,
            &new[prefix..new.len() - suffix],
        )
    }

    /// Position of an old offset after the edit; `None` inside the replaced range.
    pub fn map_offset(&self, offset: usize) -> Option<usize> {
        if offset <= self.start {
            Some(offset)
        } else if offset >= self.old_end() {
            Some(offset - self.old_len + self.new_text.len())
        } else {
            None
        }
    }
}

/// Escape text typed by the user so that it can only ever produce text in the
/// source, never structure.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            c if ESCAPED_SPECIALS.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            '\\' => out.push_str("\\textbackslash{}"),
            '^' => out.push_str("\\^{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            c => out.push(c),
        }
    }
    out
}

/// Visible characters of a raw run, with `\{`-style escapes collapsed.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if ESCAPED_SPECIALS.contains(&next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Number of visible characters in a raw run.
pub fn visual_len(raw: &str) -> usize {
    visual_boundaries(raw).count() - 1
}

/// Byte offset in `raw` of the visible character at `visual`, clamped to the
/// end of the run. Escapes are never split.
pub fn raw_offset(raw: &str, visual: usize) -> usize {
    visual_boundaries(raw).nth(visual).unwrap_or(raw.len())
}

/// Byte offsets of every visible character boundary, including 0 and the end.
fn visual_boundaries(raw: &str) -> impl Iterator<Item = usize> + '_ {
    let bytes = raw.as_bytes();
    let mut pos = 0;
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let current = pos;
        if pos >= raw.len() {
            done = true;
            return Some(current);
        }
        let escaped = bytes[pos] == b'\\'
            && raw[pos + 1..]
                .chars()
                .next()
                .map_or(false, |c| ESCAPED_SPECIALS.contains(&c));
        pos += if escaped {
            2
        } else {
            raw[pos..].chars().next().map_or(1, char::len_utf8)
        };
        Some(current)
    })
}

/// Whitespace holding a blank line separates paragraphs.
pub fn is_paragraph_break(raw: &str) -> bool {
    raw.chars().all(char::is_whitespace) && raw.matches('\n').count() >= 2
}

/// 1-based line and column (in chars) of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..floor_char_boundary(source, offset)];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line, before[line_start..].chars().count() + 1)
}

fn floor_char_boundary(source: &str, mut offset: usize) -> usize {
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("50% of {x}"), "50\\% of \\{x\\}");
        assert_eq!(escape_text("a\\b"), "a\\textbackslash{}b");
        assert_eq!(escape_text("x^2~y"), "x\\^{}2\\textasciitilde{}y");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn test_visual_len_counts_escapes_once() {
        assert_eq!(visual_len("a\\{b"), 3);
        assert_eq!(visual_len("héllo"), 5);
        assert_eq!(visual_len(""), 0);
        assert_eq!(unescape("\\$5 \\& \\_"), "$5 & _");
    }

    #[test]
    fn test_raw_offset_never_splits_escape() {
        let raw = "a\\%b";
        assert_eq!(raw_offset(raw, 0), 0);
        assert_eq!(raw_offset(raw, 1), 1);
        assert_eq!(raw_offset(raw, 2), 3);
        assert_eq!(raw_offset(raw, 3), 4);
        assert_eq!(raw_offset(raw, 10), 4);
    }

    #[test]
    fn test_paragraph_break() {
        assert!(is_paragraph_break("\n\n"));
        assert!(is_paragraph_break(" \n  \n "));
        assert!(!is_paragraph_break(" \n "));
        assert!(!is_paragraph_break("a\n\n"));
    }

    #[test]
    fn test_text_edit_inverse_and_mapping() {
        let mut source = String::from("hello world");
        let edit = TextEdit::new(6, 5, "there");
        let inverse = edit.inverse(&source);
        edit.apply(&mut source);
        assert_eq!(source, "hello there");
        inverse.apply(&mut source);
        assert_eq!(source, "hello world");

        let grow = TextEdit::new(2, 1, "xyz");
        assert_eq!(grow.map_offset(1), Some(1));
        assert_eq!(grow.map_offset(2), Some(2));
        assert_eq!(grow.map_offset(4), Some(6));
        assert_eq!(grow.map_offset(3), Some(5));
    }

    #[test]
    fn test_trimmed_edit() {
        let source = "\\textbf{Hi} $x$";
        let edit = TextEdit::new(7, 4, "{}").trimmed(source);
        assert_eq!(edit, TextEdit::new(8, 2, ""));

        let same = TextEdit::new(0, 3, "abc").trimmed("abc");
        assert!(same.is_noop());

        let edit = TextEdit::new(0, 4, "aéb").trimmed("aüb!");
        assert_eq!(edit, TextEdit::new(1, 2, "é"));
    }

    #[test]
    fn test_line_col() {
        let source = "ab\ncd\n\nef";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 4), (2, 2));
        assert_eq!(line_col(source, 7), (4, 1));
    }
}
