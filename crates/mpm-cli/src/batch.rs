use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use mpm_core::{InstallRequest, ProviderPreference};
use mpm_installer::ArchiveFetcher;
use tracing::info;

use crate::core_flows::{format_install_report_lines, InstallPipeline};
use crate::render::LineKind;

/// Options that would be unsafe to override per line: the invocation-wide
/// value always applies. Checked in this order as `(arg id, short, long)`.
const UNSAFE_LINE_OPTIONS: &[(&str, &str, &str)] = &[
    ("search_only", "-s", "--searchonly"),
    ("force", "-f", "--force"),
    ("install_dir", "-i", "--installdir"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SharedOptions {
    pub(crate) install_root: PathBuf,
    pub(crate) force: bool,
    pub(crate) search_only: bool,
}

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
struct LineArgs {
    name: String,
    url: Option<String>,
    #[arg(short = 'u', long = "url", conflicts_with = "url")]
    url_flag: Option<String>,
    #[arg(long)]
    allow_nesting: bool,
    #[arg(short = 'g', long = "githubfirst")]
    github_first: bool,
    #[arg(short = 'v', long = "version")]
    version: Option<String>,
    #[arg(short = 'n', long = "internaldir")]
    internal_dir: Option<String>,
    #[arg(id = "force", short = 'f', long = "force", hide = true)]
    _force: bool,
    #[arg(id = "search_only", short = 's', long = "searchonly", hide = true)]
    _search_only: bool,
    #[arg(id = "install_dir", short = 'i', long = "installdir", hide = true)]
    _install_dir: Option<String>,
}

#[derive(Debug)]
pub(crate) struct BatchEntry {
    pub(crate) line_number: usize,
    pub(crate) warnings: Vec<String>,
    pub(crate) request: Result<InstallRequest, String>,
}

/// Lazily turns each non-blank line into a request; the next line is not read
/// until the caller asks for it.
pub(crate) struct RequirementLines<R> {
    lines: io::Lines<R>,
    line_number: usize,
    shared: SharedOptions,
}

impl<R: BufRead> RequirementLines<R> {
    pub(crate) fn new(reader: R, shared: SharedOptions) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            shared,
        }
    }
}

impl<R: BufRead> Iterator for RequirementLines<R> {
    type Item = io::Result<BatchEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(Ok(parse_requirement_line(
                &line,
                self.line_number,
                &self.shared,
            )));
        }
    }
}

/// One warning per unsafe option clap saw on the line, whatever spelling was
/// used (`--installdir=x`, `-ix`, `-fs`). Exact short or long tokens are
/// echoed as written; other spellings are reported by their long name.
pub(crate) fn ignored_option_warnings(
    matches: &ArgMatches,
    tokens: &[&str],
    line_number: usize,
) -> Vec<String> {
    UNSAFE_LINE_OPTIONS
        .iter()
        .filter(|(id, _, _)| matches.value_source(id) == Some(ValueSource::CommandLine))
        .map(|(_, short, long)| {
            let spelled = if tokens.contains(short) { *short } else { *long };
            format!("Ignoring {spelled} option in line {line_number}")
        })
        .collect()
}

pub(crate) fn parse_requirement_line(
    line: &str,
    line_number: usize,
    shared: &SharedOptions,
) -> BatchEntry {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let parsed = LineArgs::command()
        .try_get_matches_from(tokens.iter().copied())
        .and_then(|matches| {
            let args = LineArgs::from_arg_matches(&matches)?;
            Ok((matches, args))
        });

    let (warnings, request) = match parsed {
        Ok((matches, args)) => (
            ignored_option_warnings(&matches, &tokens, line_number),
            Ok(InstallRequest {
                name: args.name,
                url: args.url_flag.or(args.url),
                install_root: shared.install_root.clone(),
                force: shared.force,
                allow_nesting: args.allow_nesting,
                internal_dir: args.internal_dir,
                search_only: shared.search_only,
                preference: ProviderPreference::from_github_first(args.github_first),
                version: args.version,
            }),
        ),
        Err(err) => (Vec::new(), Err(first_error_line(&err.to_string()))),
    };

    BatchEntry {
        line_number,
        warnings,
        request,
    }
}

fn first_error_line(rendered: &str) -> String {
    let line = rendered.lines().next().unwrap_or_default().trim();
    line.strip_prefix("error: ").unwrap_or(line).to_string()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchSummary {
    pub(crate) processed: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
}

pub(crate) fn run_requirements_file<F: ArchiveFetcher>(
    pipeline: &InstallPipeline<'_, F>,
    path: &Path,
    shared: SharedOptions,
) -> Result<BatchSummary> {
    let file = File::open(path)
        .with_context(|| format!("failed to open requirements file: {}", path.display()))?;
    run_requirements(pipeline, BufReader::new(file), shared)
}

pub(crate) fn run_requirements<F: ArchiveFetcher, R: BufRead>(
    pipeline: &InstallPipeline<'_, F>,
    reader: R,
    shared: SharedOptions,
) -> Result<BatchSummary> {
    let renderer = pipeline.renderer;
    let mut summary = BatchSummary::default();

    for entry in RequirementLines::new(reader, shared) {
        let entry = entry.context("failed to read requirements file")?;
        summary.processed += 1;

        let warnings: Vec<(LineKind, String)> = entry
            .warnings
            .iter()
            .map(|warning| (LineKind::Warning, format!("WARNING: {warning}")))
            .collect();
        renderer.print_lines(&warnings);

        let request = match entry.request {
            Ok(request) => request,
            Err(message) => {
                summary.failed += 1;
                renderer.print_error(&format!(
                    "ERROR: Skipping line {}: {message}",
                    entry.line_number
                ));
                continue;
            }
        };

        match pipeline.install(&request) {
            Ok(report) => {
                if report.succeeded() {
                    summary.succeeded += 1;
                } else {
                    summary.failed += 1;
                }
                renderer.print_lines(&format_install_report_lines(&report));
            }
            Err(err) => {
                summary.failed += 1;
                renderer.print_error(&format!(
                    "ERROR: Could not install \"{}\": {err:#}",
                    request.trimmed_name()
                ));
            }
        }
    }

    info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "requirements file finished"
    );
    Ok(summary)
}
