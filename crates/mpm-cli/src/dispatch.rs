use anyhow::{anyhow, Result};
use mpm_core::{InstallRequest, ProviderPreference};
use mpm_installer::{default_install_root, read_manifest, HttpFetcher, InstallLayout, Retriever};
use mpm_resolver::{ProviderConfig, Resolver};

use crate::batch::{run_requirements_file, SharedOptions};
use crate::core_flows::{format_install_report_lines, InstallPipeline};
use crate::render::TerminalRenderer;
use crate::Cli;

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let install_root = match cli.installdir.clone() {
        Some(dir) => dir,
        None => default_install_root()?,
    };
    let renderer = TerminalRenderer::current();

    if cli.list {
        let layout = InstallLayout::new(&install_root);
        for line in format_manifest_listing(&layout)? {
            println!("{line}");
        }
        return Ok(());
    }

    let config = ProviderConfig::default().with_github_token(std::env::var("GITHUB_TOKEN").ok());
    let resolver = Resolver::from_config(&config)?;
    let retriever = Retriever::new(HttpFetcher::new(&config.user_agent, config.timeout)?);
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer,
    };

    if let Some(reqsfile) = cli.reqsfile.as_deref() {
        if !cli.searchonly {
            InstallLayout::new(&install_root).ensure_root_exists()?;
        }
        let shared = SharedOptions {
            install_root,
            force: cli.force,
            search_only: cli.searchonly,
        };
        run_requirements_file(&pipeline, reqsfile, shared)?;
        return Ok(());
    }

    let name = cli.name.ok_or_else(|| anyhow!("Must provide a package name"))?;
    let request = InstallRequest {
        name,
        url: cli.url,
        install_root,
        force: cli.force,
        allow_nesting: cli.allow_nesting,
        internal_dir: cli.internaldir,
        search_only: cli.searchonly,
        preference: ProviderPreference::from_github_first(cli.githubfirst),
        version: cli.version,
    };
    let report = pipeline.install(&request)?;
    renderer.print_lines(&format_install_report_lines(&report));
    Ok(())
}

pub(crate) fn format_manifest_listing(layout: &InstallLayout) -> Result<Vec<String>> {
    let document = read_manifest(layout)?;
    if document.is_empty() {
        return Ok(vec![format!(
            "No packages installed in {}",
            layout.root().display()
        )]);
    }

    Ok(document
        .packages
        .iter()
        .map(|entry| format!("{}  {}  {}", entry.name, entry.url, entry.mdir))
        .collect())
}
