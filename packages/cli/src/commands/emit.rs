use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use vlatex_parser::emit as emit_tree;

use super::{input_files, load_document};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct EmitArgs {
    /// Input .tex file or directory
    pub input: PathBuf,

    /// Print the emitted source instead of only checking it
    #[arg(long)]
    pub stdout: bool,
}

/// Parse and re-emit every file; fails if any output differs from its input.
pub fn emit(args: EmitArgs, config: &Config) -> Result<()> {
    let files = input_files(&args.input, config)?;
    let mut mismatched = 0;

    for file in &files {
        let doc = load_document(file, config)?;
        let emitted = emit_tree(doc.tree());
        if args.stdout {
            print!("{}", emitted);
        }
        match first_difference(doc.source(), &emitted) {
            None => {
                if !args.stdout {
                    println!("{} {}", "✓".green(), file.display());
                }
            }
            Some(offset) => {
                mismatched += 1;
                let (line, col) = vlatex_parser::text::line_col(doc.source(), offset);
                eprintln!(
                    "{} {}:{}:{} emitted source differs from the input",
                    "✗".red(),
                    file.display(),
                    line,
                    col
                );
            }
        }
    }

    if mismatched > 0 {
        return Err(anyhow!(
            "{} of {} files did not round-trip",
            mismatched,
            files.len()
        ));
    }
    Ok(())
}

/// Byte offset of the first difference between two texts
fn first_difference(a: &str, b: &str) -> Option<usize> {
    if a == b {
        return None;
    }
    let common = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map(|((i, _), _)| i);
    Some(common.unwrap_or_else(|| a.len().min(b.len())))
}
