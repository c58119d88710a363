use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use vlatex_parser::{Node, NodeKind};

use super::{input_files, load_document, OutputFormat};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Input .tex file or directory
    pub input: PathBuf,

    /// Output format: indented outline or the tree as JSON
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Also print the token stream
    #[arg(long)]
    pub tokens: bool,
}

pub fn parse(args: ParseArgs, config: &Config) -> Result<()> {
    for file in input_files(&args.input, config)? {
        parse_file(&file, &args, config)?;
    }
    Ok(())
}

fn parse_file(path: &Path, args: &ParseArgs, config: &Config) -> Result<()> {
    let doc = load_document(path, config)?;

    match args.format {
        OutputFormat::Json => {
            let json = if args.tokens {
                serde_json::to_string_pretty(&serde_json::json!({
                    "tokens": doc.tokens(),
                    "tree": doc.tree(),
                }))?
            } else {
                serde_json::to_string_pretty(doc.tree())?
            };
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!("{}", path.display().to_string().bold());
            if args.tokens {
                for token in doc.tokens() {
                    println!(
                        "  {:>5}..{:<5} {:?} {:?}",
                        token.span.start,
                        token.span.end,
                        token.kind,
                        token.text(doc.source())
                    );
                }
                println!();
            }
            print!("{}", outline(doc.tree()));
            println!();
        }
    }
    Ok(())
}

/// Indented one-line-per-node rendering of a tree
pub fn outline(tree: &Node) -> String {
    let mut out = String::new();
    write_outline(tree, 1, &mut out);
    out
}

fn write_outline(node: &Node, depth: usize, out: &mut String) {
    let label = match &node.kind {
        NodeKind::Document => "document".to_string(),
        NodeKind::TextRun { text } => format!("text {:?}", text),
        NodeKind::Comment { text } => format!("comment {:?}", text).dimmed().to_string(),
        NodeKind::Command { name } => format!("\\{}", name).cyan().to_string(),
        NodeKind::Group { delim } => format!("group {}{}", delim.open(), delim.close()),
        NodeKind::MathSpan { delim } => format!("math {}{}", delim.open(), delim.close()).magenta().to_string(),
        NodeKind::Environment { name, args } => {
            format!("env {} ({} args)", name, args).green().to_string()
        }
        NodeKind::Error { error, open } => format!("error {:?}: {}", open, error).red().to_string(),
    };
    let span = node
        .span
        .map(|s| format!(" [{}..{}]", s.start, s.end))
        .unwrap_or_default();
    let _ = writeln!(out, "{}{}{}", "  ".repeat(depth), label, span.dimmed());
    for child in &node.children {
        write_outline(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vlatex_parser::{parse_source, IdGenerator, ParseOptions};

    #[test]
    fn test_outline_lists_every_node() {
        colored::control::set_override(false);
        let (_, tree) = parse_source(
            "\\emph{a} $x$",
            &mut IdGenerator::new("outline"),
            &ParseOptions::default(),
        );
        let text = outline(&tree);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "  document [0..12]");
        assert_eq!(lines[1], "    \\emph [0..8]");
        assert_eq!(lines[2], "      group {} [5..8]");
        assert_eq!(lines[3], "        text \"a\" [6..7]");
        assert_eq!(lines.len(), tree.ids().len());
    }
}
