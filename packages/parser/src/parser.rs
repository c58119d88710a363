//! Recursive-descent structural parser.
//!
//! The parser keeps a stack of open constructs, each waiting for its closer.
//! A closer found while parsing a sequence is matched against that stack:
//! it either ends the innermost construct, ends an outer one (the inner ones
//! become unclosed error nodes), or matches nothing and becomes an error node
//! of its own. Parsing never fails.

use std::collections::HashSet;
use std::ops::Range;
use tracing::{info, instrument};

use crate::ast::{GroupDelim, MathDelim, Node, NodeKind, Span};
use crate::commands::{
    command_arg_spec, environment_arg_spec, is_builtin_math_environment, is_environment_name,
    ArgMode, ArgSpec,
};
use crate::error::StructuralError;
use crate::id_generator::IdGenerator;
use crate::text::is_paragraph_break;
use crate::tokenizer::{Token, TokenKind};

/// Parser settings
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Extra environments whose body is math, on top of the built-in ones
    pub math_environments: HashSet<String>,
}

impl ParseOptions {
    pub fn is_math_environment(&self, name: &str) -> bool {
        is_builtin_math_environment(name) || self.math_environments.contains(name)
    }
}

/// Parse a token stream into a document tree with default options.
pub fn parse(source: &str, tokens: &[Token], ids: &mut IdGenerator) -> Node {
    parse_with_options(source, tokens, ids, &ParseOptions::default())
}

#[instrument(skip(source, tokens, ids, options), fields(tokens = tokens.len()))]
pub fn parse_with_options(
    source: &str,
    tokens: &[Token],
    ids: &mut IdGenerator,
    options: &ParseOptions,
) -> Node {
    let root = ids.new_id();
    let mut parser = Parser::new(source, tokens, ids, options, vec![Frame::document()], 0);
    let (children, _) = parser.parse_sequence();
    let tree = Node {
        id: root,
        kind: NodeKind::Document,
        children,
        span: Some(Span::new(0, source.len())),
    };
    info!(
        nodes = tree.node_count(),
        errors = tree.error_ids().len(),
        "Parsed document"
    );
    tree
}

/// What an open construct is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Closer {
    Eof,
    Brace,
    Bracket,
    Math(MathDelim),
    End(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub closer: Closer,
    pub math: bool,
}

impl Frame {
    pub fn document() -> Self {
        Self {
            closer: Closer::Eof,
            math: false,
        }
    }

    /// Frame a node's content was parsed in, given the mode outside it.
    /// Leaves, commands and error nodes yield none.
    pub fn for_node(node: &Node, outer_math: bool, options: &ParseOptions) -> Option<Frame> {
        let (closer, math) = match &node.kind {
            NodeKind::Document => (Closer::Eof, false),
            NodeKind::Group { delim } => (Closer::group(*delim), outer_math),
            NodeKind::MathSpan { delim } => (Closer::Math(*delim), true),
            NodeKind::Environment { name, .. } => (
                Closer::End(name.clone()),
                outer_math || options.is_math_environment(name),
            ),
            NodeKind::TextRun { .. }
            | NodeKind::Comment { .. }
            | NodeKind::Command { .. }
            | NodeKind::Error { .. } => return None,
        };
        Some(Frame { closer, math })
    }
}

impl Closer {
    fn group(delim: GroupDelim) -> Self {
        match delim {
            GroupDelim::Brace => Closer::Brace,
            GroupDelim::Bracket => Closer::Bracket,
        }
    }
}

/// Mode of the arguments of `\name` read in a context with mode `outer_math`.
pub(crate) fn argument_math(name: &str, outer_math: bool) -> bool {
    match command_arg_spec(name).mode {
        ArgMode::Inherit => outer_math,
        ArgMode::Text => false,
        ArgMode::Math => true,
    }
}

/// Why a sequence stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    /// The innermost construct's closer (spanning this many tokens) is next
    Own(usize),
    /// A closer belonging to an outer construct is next
    Outer,
    Eof,
}

/// How the token at the cursor relates to the open constructs
enum Closing {
    Own(usize),
    Outer,
    Unmatched(usize),
}

pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    ids: &'a mut IdGenerator,
    options: &'a ParseOptions,
    frames: Vec<Frame>,
}

impl<'a> Parser<'a> {
    pub fn new(
        source: &'a str,
        tokens: &'a [Token],
        ids: &'a mut IdGenerator,
        options: &'a ParseOptions,
        frames: Vec<Frame>,
        pos: usize,
    ) -> Self {
        Self {
            source,
            tokens,
            pos,
            ids,
            options,
            frames,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Parse nodes until a closer of an open construct or the end of input.
    pub fn parse_sequence(&mut self) -> (Vec<Node>, Stop) {
        let mut nodes = Vec::new();
        loop {
            if self.pos >= self.tokens.len() {
                return (nodes, Stop::Eof);
            }
            match self.closing_here() {
                Some(Closing::Own(len)) => return (nodes, Stop::Own(len)),
                Some(Closing::Outer) => return (nodes, Stop::Outer),
                Some(Closing::Unmatched(len)) => nodes.push(self.unmatched(len)),
                None => nodes.push(self.parse_node()),
            }
        }
    }

    fn parse_node(&mut self) -> Node {
        let token = self.tokens[self.pos];
        match token.kind {
            TokenKind::Text | TokenKind::Whitespace | TokenKind::BraceClose => self.parse_text(),
            TokenKind::Comment => {
                self.pos += 1;
                self.leaf(
                    NodeKind::Comment {
                        text: self.text(&token).to_string(),
                    },
                    token.span,
                )
            }
            TokenKind::BraceOpen => self.parse_group(GroupDelim::Brace, self.in_math()),
            TokenKind::MathDelim => self.parse_math(),
            TokenKind::CommandName => match self.environment_header(self.pos, "\\begin") {
                Some(name) => self.parse_environment(name),
                None => self.parse_command(),
            },
        }
    }

    fn parse_text(&mut self) -> Node {
        let start = self.tokens[self.pos].span.start;
        if self.is_paragraph_break(self.pos) {
            self.pos += 1;
            return self.leaf_text(start, self.prev_end());
        }
        self.pos += 1;
        while let Some(token) = self.tokens.get(self.pos) {
            let continues = match token.kind {
                TokenKind::Text => self.text(token) != "]" || self.closing_here().is_none(),
                TokenKind::BraceClose => self.closing_here().is_none(),
                TokenKind::Whitespace => !self.is_paragraph_break(self.pos),
                _ => false,
            };
            if !continues {
                break;
            }
            self.pos += 1;
        }
        self.leaf_text(start, self.prev_end())
    }

    fn parse_group(&mut self, delim: GroupDelim, math: bool) -> Node {
        let start = self.tokens[self.pos].span.start;
        self.pos += 1;
        let open_end = self.prev_end();
        self.frames.push(Frame {
            closer: Closer::group(delim),
            math,
        });
        let (children, stop) = self.parse_sequence();
        self.frames.pop();
        let closer = if delim == GroupDelim::Brace { '}' } else { ']' };
        self.finish(
            start..open_end,
            stop,
            children,
            NodeKind::Group { delim },
            StructuralError::unclosed_group(closer),
        )
    }

    fn parse_math(&mut self) -> Node {
        let token = self.tokens[self.pos];
        let start = token.span.start;
        let delim = match self.text(&token) {
            "\\[" => MathDelim::Bracket,
            "\\(" => MathDelim::Paren,
            _ if self.next_is_dollar(self.pos) => MathDelim::DoubleDollar,
            _ => MathDelim::Dollar,
        };
        self.pos += if delim == MathDelim::DoubleDollar { 2 } else { 1 };
        let open_end = self.prev_end();
        self.frames.push(Frame {
            closer: Closer::Math(delim),
            math: true,
        });
        let (children, stop) = self.parse_sequence();
        self.frames.pop();
        self.finish(
            start..open_end,
            stop,
            children,
            NodeKind::MathSpan { delim },
            StructuralError::unclosed_math(delim.close()),
        )
    }

    fn parse_environment(&mut self, name: String) -> Node {
        let start = self.tokens[self.pos].span.start;
        self.pos += 4;
        let open_end = self.prev_end();
        let math = self.in_math() || self.options.is_math_environment(&name);
        let mut children = self.parse_args(&environment_arg_spec(&name), self.in_math());
        let args = children.len();
        self.frames.push(Frame {
            closer: Closer::End(name.clone()),
            math,
        });
        let (body, stop) = self.parse_sequence();
        self.frames.pop();
        children.extend(body);
        self.finish(
            start..open_end,
            stop,
            children,
            NodeKind::Environment {
                name: name.clone(),
                args,
            },
            StructuralError::unclosed_environment(name),
        )
    }

    fn parse_command(&mut self) -> Node {
        let token = self.tokens[self.pos];
        self.pos += 1;
        let name = self.text(&token)[1..].to_string();
        let spec = command_arg_spec(&name);
        let children = self.parse_args(&spec, argument_math(&name, self.in_math()));
        Node {
            id: self.ids.new_id(),
            kind: NodeKind::Command { name },
            children,
            span: Some(Span::new(token.span.start, self.prev_end())),
        }
    }

    /// Arguments must follow immediately, without whitespace.
    fn parse_args(&mut self, spec: &ArgSpec, math: bool) -> Vec<Node> {
        let mut args = Vec::new();
        let (mut optional, mut required) = (0, 0);
        while let Some(token) = self.tokens.get(self.pos) {
            let bracket = token.kind == TokenKind::Text
                && self.text(token) == "["
                && self.bracket_closes_ahead(self.pos + 1);
            let brace = token.kind == TokenKind::BraceOpen;
            if spec.greedy {
                if bracket {
                    args.push(self.parse_group(GroupDelim::Bracket, math));
                } else if brace {
                    args.push(self.parse_group(GroupDelim::Brace, math));
                } else {
                    break;
                }
            } else if bracket && required == 0 && optional < spec.optional {
                optional += 1;
                args.push(self.parse_group(GroupDelim::Bracket, math));
            } else if brace && required < spec.required {
                required += 1;
                args.push(self.parse_group(GroupDelim::Brace, math));
            } else {
                break;
            }
        }
        args
    }

    /// Whether a `]` at brace depth zero follows before the enclosing group or
    /// environment ends.
    fn bracket_closes_ahead(&self, from: usize) -> bool {
        let mut depth = 0usize;
        for token in &self.tokens[from.min(self.tokens.len())..] {
            match token.kind {
                TokenKind::BraceOpen => depth += 1,
                TokenKind::BraceClose => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                TokenKind::Text if depth == 0 && self.text(token) == "]" => return true,
                TokenKind::CommandName if depth == 0 && self.text(token) == "\\end" => {
                    return false
                }
                _ => {}
            }
        }
        false
    }

    /// Close a construct whose opener spans `opener`, or turn it into an error
    /// node if its closer never came.
    fn finish(
        &mut self,
        opener: Range<usize>,
        stop: Stop,
        children: Vec<Node>,
        kind: NodeKind,
        error: StructuralError,
    ) -> Node {
        let kind = match stop {
            Stop::Own(len) => {
                self.pos += len;
                kind
            }
            Stop::Outer | Stop::Eof => NodeKind::Error {
                open: self.source[opener.clone()].to_string(),
                error,
            },
        };
        Node {
            id: self.ids.new_id(),
            kind,
            children,
            span: Some(Span::new(opener.start, self.prev_end())),
        }
    }

    fn unmatched(&mut self, len: usize) -> Node {
        let start = self.tokens[self.pos].span.start;
        self.pos += len;
        let end = self.prev_end();
        let text = self.source[start..end].to_string();
        Node {
            id: self.ids.new_id(),
            kind: NodeKind::Error {
                error: StructuralError::unmatched_close(text.clone()),
                open: text,
            },
            children: Vec::new(),
            span: Some(Span::new(start, end)),
        }
    }

    /// Classify the token at the cursor against the open constructs.
    /// `None` means the token is plain content.
    fn closing_here(&self) -> Option<Closing> {
        let token = &self.tokens[self.pos];
        match (token.kind, self.text(token)) {
            (TokenKind::BraceClose, _) => self.brace_closing(),
            (TokenKind::Text, "]") => self
                .find_frame(
                    |c| *c == Closer::Bracket,
                    |c| matches!(c, Closer::Math(_) | Closer::End(_)),
                )
                .map(|depth| Self::closing(depth, 1)),
            (TokenKind::CommandName, "\\end") => {
                let name = self.environment_header(self.pos, "\\end")?;
                Some(
                    self.find_frame(
                        |c| matches!(c, Closer::End(n) if *n == name),
                        |c| matches!(c, Closer::End(_) | Closer::Math(_) | Closer::Bracket),
                    )
                    .map_or(Closing::Unmatched(4), |depth| Self::closing(depth, 4)),
                )
            }
            (TokenKind::MathDelim, "$") => self.dollar_closing(),
            (TokenKind::MathDelim, "\\]") => Some(self.math_closing(MathDelim::Bracket)),
            (TokenKind::MathDelim, "\\)") => Some(self.math_closing(MathDelim::Paren)),
            (TokenKind::MathDelim, _) if self.in_math() => Some(Closing::Unmatched(1)),
            _ => None,
        }
    }

    /// Braces are not counted across a math delimiter: a `}` with no group
    /// opened inside the innermost math span is literal math content.
    fn brace_closing(&self) -> Option<Closing> {
        let shielded = self
            .frames
            .iter()
            .rev()
            .find(|frame| matches!(frame.closer, Closer::Brace | Closer::Math(_)))
            .map_or(false, |frame| matches!(frame.closer, Closer::Math(_)));
        if shielded {
            return None;
        }
        Some(
            self.find_frame(
                |c| *c == Closer::Brace,
                |c| matches!(c, Closer::Bracket | Closer::End(_)),
            )
            .map_or(Closing::Unmatched(1), |depth| Self::closing(depth, 1)),
        )
    }

    fn math_closing(&self, delim: MathDelim) -> Closing {
        self.find_frame(
            |c| *c == Closer::Math(delim),
            |c| matches!(c, Closer::End(_) | Closer::Bracket),
        )
        .map_or(Closing::Unmatched(1), |depth| Self::closing(depth, 1))
    }

    fn dollar_closing(&self) -> Option<Closing> {
        let found = self.frames.iter().rev().enumerate().find(|(_, frame)| {
            !matches!(frame.closer, Closer::End(_) | Closer::Bracket)
        });
        match found {
            Some((depth, frame)) => match frame.closer {
                Closer::Math(MathDelim::Dollar) => Some(Self::closing(depth, 1)),
                Closer::Math(MathDelim::DoubleDollar) if self.next_is_dollar(self.pos) => {
                    Some(Self::closing(depth, 2))
                }
                Closer::Math(_) => Some(Closing::Unmatched(1)),
                _ if self.in_math() => Some(Closing::Unmatched(1)),
                _ => None,
            },
            None => None,
        }
    }

    fn closing(depth: usize, len: usize) -> Closing {
        if depth == 0 {
            Closing::Own(len)
        } else {
            Closing::Outer
        }
    }

    /// Depth (0 = innermost) of the first frame accepted by `target`, walking
    /// outwards only through frames accepted by `passes`.
    fn find_frame(
        &self,
        target: impl Fn(&Closer) -> bool,
        passes: impl Fn(&Closer) -> bool,
    ) -> Option<usize> {
        for (depth, frame) in self.frames.iter().rev().enumerate() {
            if target(&frame.closer) {
                return Some(depth);
            }
            if !passes(&frame.closer) {
                return None;
            }
        }
        None
    }

    /// Name of a well-formed `\begin{name}` / `\end{name}` header at `pos`.
    fn environment_header(&self, pos: usize, command: &str) -> Option<String> {
        let [cmd, open, name, close] = self.tokens.get(pos..pos + 4)? else {
            return None;
        };
        let name_text = self.text(name);
        (cmd.kind == TokenKind::CommandName
            && self.text(cmd) == command
            && open.kind == TokenKind::BraceOpen
            && name.kind == TokenKind::Text
            && close.kind == TokenKind::BraceClose
            && is_environment_name(name_text))
        .then(|| name_text.to_string())
    }

    fn next_is_dollar(&self, pos: usize) -> bool {
        self.tokens
            .get(pos + 1)
            .map_or(false, |t| t.kind == TokenKind::MathDelim && self.text(t) == "$")
    }

    fn is_paragraph_break(&self, pos: usize) -> bool {
        let token = &self.tokens[pos];
        token.kind == TokenKind::Whitespace && is_paragraph_break(self.text(token))
    }

    fn in_math(&self) -> bool {
        self.frames.last().map_or(false, |f| f.math)
    }

    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    fn text(&self, token: &Token) -> &'a str {
        token.text(self.source)
    }

    fn leaf(&mut self, kind: NodeKind, span: Span) -> Node {
        Node {
            id: self.ids.new_id(),
            kind,
            children: Vec::new(),
            span: Some(span),
        }
    }

    fn leaf_text(&mut self, start: usize, end: usize) -> Node {
        let text = self.source[start..end].to_string();
        self.leaf(NodeKind::TextRun { text }, Span::new(start, end))
    }
}
