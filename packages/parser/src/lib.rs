pub mod ast;
pub mod commands;
pub mod emitter;
pub mod error;
pub mod id_generator;
pub mod parser;
pub mod reparse;
pub mod text;
pub mod tokenizer;

pub use ast::{GroupDelim, MathDelim, Node, NodeId, NodeKind, Span};
pub use emitter::{emit, emit_incremental, node_text, refresh_spans};
pub use error::StructuralError;
pub use id_generator::{get_document_seed, IdGenerator};
pub use parser::{parse, parse_with_options, ParseOptions};
pub use reparse::{reconcile_document, reparse, Reparse, Shift};
pub use text::TextEdit;
pub use tokenizer::{rescan, scan, Rescan, Token, TokenKind};

/// Scan and parse a whole source text.
pub fn parse_source(
    source: &str,
    ids: &mut IdGenerator,
    options: &ParseOptions,
) -> (Vec<Token>, Node) {
    let tokens = scan(source);
    let tree = parse_with_options(source, &tokens, ids, options);
    (tokens, tree)
}
