use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::{input_files, load_document, OutputFormat};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ProjectArgs {
    /// Input .tex file or directory
    pub input: PathBuf,

    /// `json` dumps the visual tree, `text` prints what a reader would see
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

pub fn project(args: ProjectArgs, config: &Config) -> Result<()> {
    for file in input_files(&args.input, config)? {
        let doc = load_document(&file, config)?;
        let visual = doc.visual();
        match args.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(visual)?),
            OutputFormat::Text => {
                println!(
                    "{} {}",
                    file.display().to_string().bold(),
                    format!("({} units, {} boxes)", visual.extent(), visual.box_count()).dimmed()
                );
                println!("{}", visual.root.plain_text());
            }
        }
    }
    Ok(())
}
