pub mod check;
pub mod emit;
pub mod parse;
pub mod project;

pub use check::{check, CheckArgs};
pub use emit::{emit, EmitArgs};
pub use parse::{parse, ParseArgs};
pub use project::{project, ProjectArgs};

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use std::fs;
use std::path::{Path, PathBuf};
use vlatex_editor::Document;
use walkdir::WalkDir;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// The file itself, or every matching file below a directory, sorted
pub fn input_files(input: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(anyhow!("Input path does not exist: {}", input.display()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| path.is_file() && config.matches(path))
        .collect();
    files.sort();
    Ok(files)
}

pub fn load_document(path: &Path, config: &Config) -> Result<Document> {
    let source = fs::read_to_string(path)
        .map_err(|e| anyhow!("Cannot read {}: {}", path.display(), e))?;
    Ok(Document::load(
        &path.to_string_lossy(),
        &source,
        config.editor.clone(),
    ))
}
