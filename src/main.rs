//! fastar - Streaming Concurrent Archiver
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use fastar::config::{CliArgs, CreateConfig, ExtractConfig, RunMode};
use fastar::create::Archiver;
use fastar::extract::Unarchiver;
use fastar::progress::{print_create_summary, print_extract_summary};
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    match RunMode::from_args(args)? {
        RunMode::Create(config) => run_create(config),
        RunMode::Extract(config) => run_extract(config),
    }
}

fn run_create(config: CreateConfig) -> Result<()> {
    let output: Box<dyn Write + Send> = match &config.output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Error creating output file '{}'", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    let verbose = config.verbose;
    let roots = config.roots.clone();
    let mut archiver = Archiver::new(config);
    for root in &roots {
        archiver.add_root(root)?;
    }

    let summary = archiver.run(output).context("Archive creation failed")?;
    if verbose {
        print_create_summary(&summary);
    }
    Ok(())
}

fn run_extract(config: ExtractConfig) -> Result<()> {
    let input: Box<dyn Read> = match &config.input {
        Some(path) => Box::new(
            File::open(path)
                .with_context(|| format!("Error opening input file '{}'", path.display()))?,
        ),
        None => Box::new(io::stdin()),
    };

    let verbose = config.verbose;
    let unarchiver = Unarchiver::new(config);

    let summary = unarchiver.run(input).context("Archive extraction failed")?;
    if verbose {
        print_extract_summary(&summary);
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("fastar=debug")
    } else {
        EnvFilter::new("fastar=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
