use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use vlatex_parser::text::line_col;

use super::{input_files, load_document, OutputFormat};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Input .tex file or directory
    pub input: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// One structural problem, located for humans
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub fn check(args: CheckArgs, config: &Config) -> Result<()> {
    let files = input_files(&args.input, config)?;
    let mut reports = Vec::new();
    for file in &files {
        reports.extend(check_file(file, config)?);
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                println!(
                    "{}:{}:{} {} {}",
                    report.file,
                    report.line,
                    report.column,
                    "error".red().bold(),
                    report.message
                );
            }
            println!();
            println!("   Files checked: {}", files.len());
            if reports.is_empty() {
                println!("   {} No structural errors found", "✓".green());
            }
        }
    }

    if !reports.is_empty() {
        return Err(anyhow!("{} structural errors", reports.len()));
    }
    Ok(())
}

fn check_file(path: &Path, config: &Config) -> Result<Vec<Report>> {
    let doc = load_document(path, config)?;
    let file = path.display().to_string();
    Ok(doc
        .diagnostics()
        .into_iter()
        .map(|diagnostic| {
            let offset = diagnostic.span.map_or(0, |span| span.start);
            let (line, column) = line_col(doc.source(), offset);
            Report {
                file: file.clone(),
                line,
                column,
                message: diagnostic.message,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_check_file_locates_errors() {
        let dir = std::env::temp_dir().join(format!("vlatex-check-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.tex");
        fs::write(&path, "Fine line.\nThen {unclosed").unwrap();

        let reports = check_file(&path, &Config::default()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!((reports[0].line, reports[0].column), (2, 6));
        assert!(!reports[0].message.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }
}
