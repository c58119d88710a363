//! Token scanner for LaTeX source.
//!
//! Scanning is total: every byte of the input ends up in exactly one token, so
//! the token stream always tiles the source. Bytes no pattern accepts become
//! one-character text tokens.

use logos::Logos;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use crate::ast::Span;
use crate::text::TextEdit;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
    #[regex(r"\\[a-zA-Z@]+\*?")]
    Command,

    // Control symbols such as `\\`, `\,` or `\^`
    #[regex(r"\\[^a-zA-Z@{}$%&#_\[\]()]")]
    ControlSymbol,

    #[regex(r"\\[{}$%&#_]")]
    Escape,

    #[token("$")]
    #[token("\\[")]
    #[token("\\]")]
    #[token("\\(")]
    #[token("\\)")]
    MathDelim,

    #[token("{")]
    BraceOpen,

    #[token("}")]
    BraceClose,

    #[token("[")]
    #[token("]")]
    Bracket,

    #[regex(r"%[^\n]*")]
    Comment,

    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    #[regex(r"[^\\{}$%\[\] \t\r\n]+")]
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenKind {
    CommandName,
    BraceOpen,
    BraceClose,
    MathDelim,
    Text,
    Comment,
    Whitespace,
}

/// A lexed token. Immutable once produced by a scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Braces, math delimiters, brackets and `\begin`/`\end`: tokens whose
    /// appearance or removal can change structure beyond their own group.
    pub structural: bool,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
            structural: false,
        }
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.range()]
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }
}

/// Scan a whole source text.
pub fn scan(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    lex_from(source, 0, |token| {
        tokens.push(token);
        true
    });
    tokens
}

/// Result of an incremental re-scan.
#[derive(Debug, Clone)]
pub struct Rescan {
    /// The complete token stream for the edited source.
    pub tokens: Vec<Token>,
    /// Indices (into `tokens`) of the relexed tokens.
    pub dirty: Range<usize>,
    /// Whether a structural token was removed or produced in the dirty region.
    pub structural: bool,
}

impl Rescan {
    /// Source span covered by the relexed tokens, in new coordinates.
    pub fn dirty_span(&self) -> Span {
        if self.dirty.is_empty() {
            let at = self
                .tokens
                .get(self.dirty.start)
                .map(|t| t.span.start)
                .or_else(|| self.tokens.last().map(|t| t.span.end))
                .unwrap_or(0);
            return Span::new(at, at);
        }
        Span::new(
            self.tokens[self.dirty.start].span.start,
            self.tokens[self.dirty.end - 1].span.end,
        )
    }
}

/// Re-scan after `edit` has been applied, producing `source`.
///
/// Only the tokens around the edit are relexed: scanning restarts at the token
/// touching the edit start and stops as soon as a produced token ends exactly
/// where an old token (past the edit) now starts. Everything after that point
/// is reused and shifted.
pub fn rescan(old: &[Token], source: &str, edit: &TextEdit) -> Rescan {
    let old_end = edit.old_end();
    let new_end = edit.new_end();
    let shifted = |start: usize| start - edit.old_len + edit.new_text.len();

    let first = old.partition_point(|t| t.span.end < edit.start);
    let (first, from) = match old.get(first) {
        Some(token) => (first, token.span.start),
        None => (0, 0),
    };

    let mut relexed = Vec::new();
    let mut resume = old.len();
    let mut cursor = first;

    lex_from(source, from, |token| {
        relexed.push(token);
        let end = token.span.end;
        if end < new_end {
            return true;
        }
        while cursor < old.len()
            && (old[cursor].span.start < old_end || shifted(old[cursor].span.start) < end)
        {
            cursor += 1;
        }
        if cursor < old.len() && shifted(old[cursor].span.start) == end {
            resume = cursor;
            return false;
        }
        true
    });

    let structural = old[first..resume].iter().any(|t| t.structural)
        || relexed.iter().any(|t| t.structural);

    let dirty = first..first + relexed.len();
    let mut tokens = Vec::with_capacity(first + relexed.len() + old.len() - resume);
    tokens.extend_from_slice(&old[..first]);
    tokens.extend(relexed);
    tokens.extend(old[resume..].iter().map(|t| Token {
        span: Span::new(shifted(t.span.start), shifted(t.span.end)),
        ..*t
    }));

    debug!(
        relexed = dirty.len(),
        removed = resume - first,
        structural,
        "Rescanned edit"
    );

    Rescan {
        tokens,
        dirty,
        structural,
    }
}

/// Lex `source[from..]`, handing each token to `sink` until it returns false.
fn lex_from(source: &str, from: usize, mut sink: impl FnMut(Token) -> bool) {
    let mut lexer = RawToken::lexer(&source[from..]);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let (start, end) = (from + span.start, from + span.end);
        match result {
            Ok(raw) => {
                if !sink(classify(raw, source, start, end)) {
                    return;
                }
            }
            Err(()) => {
                for (offset, ch) in source[start..end].char_indices() {
                    let at = start + offset;
                    if !sink(Token::new(TokenKind::Text, at, at + ch.len_utf8())) {
                        return;
                    }
                }
            }
        }
    }
}

fn classify(raw: RawToken, source: &str, start: usize, end: usize) -> Token {
    let (kind, structural) = match raw {
        RawToken::Command => {
            let name = &source[start + 1..end];
            (TokenKind::CommandName, name == "begin" || name == "end")
        }
        RawToken::ControlSymbol => (TokenKind::CommandName, false),
        RawToken::Escape | RawToken::Text => (TokenKind::Text, false),
        RawToken::Bracket => (TokenKind::Text, true),
        RawToken::MathDelim => (TokenKind::MathDelim, true),
        RawToken::BraceOpen => (TokenKind::BraceOpen, true),
        RawToken::BraceClose => (TokenKind::BraceClose, true),
        RawToken::Comment => (TokenKind::Comment, false),
        RawToken::Whitespace => (TokenKind::Whitespace, false),
    };
    Token {
        kind,
        span: Span::new(start, end),
        structural,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, &str)> {
        scan(source)
            .iter()
            .map(|t| (t.kind, t.text(source)))
            .collect()
    }

    #[test]
    fn test_scan_basic() {
        assert_eq!(
            kinds("\\textbf{Hi} $x$"),
            vec![
                (TokenKind::CommandName, "\\textbf"),
                (TokenKind::BraceOpen, "{"),
                (TokenKind::Text, "Hi"),
                (TokenKind::BraceClose, "}"),
                (TokenKind::Whitespace, " "),
                (TokenKind::MathDelim, "$"),
                (TokenKind::Text, "x"),
                (TokenKind::MathDelim, "$"),
            ]
        );
    }

    #[test]
    fn test_escapes_are_text() {
        assert_eq!(
            kinds("\\{\\}\\$\\%"),
            vec![
                (TokenKind::Text, "\\{"),
                (TokenKind::Text, "\\}"),
                (TokenKind::Text, "\\$"),
                (TokenKind::Text, "\\%"),
            ]
        );
    }

    #[test]
    fn test_comments_and_display_math() {
        assert_eq!(
            kinds("a % {not a group}\n\\[x\\]"),
            vec![
                (TokenKind::Text, "a"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Comment, "% {not a group}"),
                (TokenKind::Whitespace, "\n"),
                (TokenKind::MathDelim, "\\["),
                (TokenKind::Text, "x"),
                (TokenKind::MathDelim, "\\]"),
            ]
        );
    }

    #[test]
    fn test_starred_and_control_symbols() {
        assert_eq!(
            kinds("\\section*{A}\\\\\\,"),
            vec![
                (TokenKind::CommandName, "\\section*"),
                (TokenKind::BraceOpen, "{"),
                (TokenKind::Text, "A"),
                (TokenKind::BraceClose, "}"),
                (TokenKind::CommandName, "\\\\"),
                (TokenKind::CommandName, "\\,"),
            ]
        );
    }

    #[test]
    fn test_trailing_backslash_is_tolerated() {
        let source = "abc\\";
        let tokens = scan(source);
        assert_eq!(tokens.last().map(|t| (t.kind, t.text(source))), Some((TokenKind::Text, "\\")));
        assert_eq!(tokens.last().map(|t| t.span.end), Some(source.len()));
    }

    #[test]
    fn test_structural_flags() {
        let source = "\\begin{x}[a]\\item";
        let flags: Vec<bool> = scan(source).iter().map(|t| t.structural).collect();
        assert_eq!(flags, vec![true, true, false, true, true, false, true, false]);
    }

    fn check_rescan(before: &str, edit: TextEdit) -> Rescan {
        let old = scan(before);
        let mut after = before.to_string();
        edit.apply(&mut after);
        let result = rescan(&old, &after, &edit);
        assert_eq!(result.tokens, scan(&after), "rescan of {:?}", after);
        result
    }

    #[test]
    fn test_rescan_extends_command() {
        let result = check_rescan("\\tex{a} b", TextEdit::insert(4, "tbf"));
        assert_eq!(result.dirty, 0..1);
        assert!(!result.structural);
    }

    #[test]
    fn test_rescan_stops_at_sync_point() {
        let before = "one two three four five";
        let result = check_rescan(before, TextEdit::new(4, 3, "2"));
        assert!(result.dirty.len() <= 3);
        assert_eq!(result.tokens.len(), scan(before).len());
    }

    #[test]
    fn test_rescan_comment_swallows_line() {
        let result = check_rescan("a {b} c\nd", TextEdit::insert(1, "%"));
        assert!(result.structural);
    }

    #[test]
    fn test_rescan_edges() {
        check_rescan("", TextEdit::insert(0, "\\x{y}"));
        check_rescan("abc", TextEdit::delete(0, 3));
        check_rescan("ab cd", TextEdit::insert(5, "\\"));
        check_rescan("$a$ $b$", TextEdit::insert(3, "$"));
        check_rescan("x\\", TextEdit::insert(2, "{"));
    }
}
