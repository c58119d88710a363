mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, emit, parse, project, CheckArgs, EmitArgs, ParseArgs, ProjectArgs};
use config::Config;
use std::path::PathBuf;

/// vlatex - inspect LaTeX documents the way the visual editor sees them
#[derive(Parser, Debug)]
#[command(name = "vlatex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./vlatex.config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the document tree
    Parse(ParseArgs),

    /// Check that parsing and emitting reproduces the input byte for byte
    Emit(EmitArgs),

    /// Print the visual projection
    Project(ProjectArgs),

    /// Report structural errors
    Check(CheckArgs),
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let config = Config::load(&cwd, cli.config.as_deref())?;

    match cli.command {
        Command::Parse(args) => parse(args, &config),
        Command::Emit(args) => emit(args, &config),
        Command::Project(args) => project(args, &config),
        Command::Check(args) => check(args, &config),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
