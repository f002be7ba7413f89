use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod batch;
mod core_flows;
mod dispatch;
mod render;

use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "mpm")]
#[command(
    about = "Install MATLAB packages from GitHub or File Exchange",
    long_about = None
)]
pub(crate) struct Cli {
    /// Name of the package
    name: Option<String>,
    /// URL of the package archive
    url: Option<String>,
    /// Install every package listed in a requirements file
    #[arg(short = 'r', long = "reqsfile")]
    reqsfile: Option<PathBuf>,
    /// Installation directory
    #[arg(short = 'i', long = "installdir", env = "MPM_INSTALL_DIR")]
    installdir: Option<PathBuf>,
    /// Overwrite the package if it already exists
    #[arg(short = 'f', long)]
    force: bool,
    /// Keep the archive's own top-level layout
    #[arg(long)]
    allow_nesting: bool,
    /// Add this internal directory to the path instead
    #[arg(short = 'n', long = "internaldir")]
    internaldir: Option<String>,
    /// Search only, do not install
    #[arg(short = 's', long = "searchonly")]
    searchonly: bool,
    /// Search GitHub before File Exchange
    #[arg(short = 'g', long = "githubfirst")]
    githubfirst: bool,
    /// Install the GitHub release tagged exactly with this name
    #[arg(short = 'v', long = "version")]
    version: Option<String>,
    /// List the packages recorded in the installation directory
    #[arg(long)]
    list: bool,
    #[arg(long)]
    verbose: bool,
}

pub(crate) fn validate_cli(cli: &Cli) -> Vec<String> {
    let mut messages = Vec::new();
    if cli.reqsfile.is_none() && cli.name.is_none() && !cli.list {
        messages.push("Must provide a package name".to_string());
    }
    if cli.reqsfile.is_some() && cli.version.is_some() {
        messages.push(
            "Specifying a version is not allowed when loading from requirements file.".to_string(),
        );
    }
    if cli.reqsfile.is_some() && cli.internaldir.is_some() {
        messages.push(
            "Specifying an internaldir is illegal when loading from requirements file."
                .to_string(),
        );
    }
    if cli.reqsfile.is_some() && cli.githubfirst {
        messages.push(
            "Specifying to search githubfirst is illegal when loading from requirements file."
                .to_string(),
        );
    }
    messages
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let messages = validate_cli(&cli);
    if !messages.is_empty() {
        let _ = Cli::command().print_help();
        println!();
        for message in messages {
            eprintln!("{message}");
        }
        std::process::exit(1);
    }

    run_cli(cli)
}

#[cfg(test)]
mod tests;
