use super::*;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::rc::Rc;

use anyhow::anyhow;
use clap::CommandFactory;
use mpm_core::{InstallRequest, ProviderKind, ProviderPreference, UpsertOutcome};
use mpm_installer::{read_manifest, ArchiveFetcher, InstallLayout, Retriever};
use mpm_resolver::{Resolver, SearchProvider};
use zip::write::SimpleFileOptions;

use crate::batch::{parse_requirement_line, run_requirements, RequirementLines, SharedOptions};
use crate::core_flows::{format_install_report_lines, InstallPipeline, InstallStatus};
use crate::dispatch::format_manifest_listing;
use crate::render::{render_line, LineKind, OutputStyle, TerminalRenderer};

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        writer.start_file(*name, options).expect("must start file");
        writer
            .write_all(contents.as_bytes())
            .expect("must write file");
    }
    writer.finish().expect("must finish zip").into_inner()
}

#[derive(Clone, Default)]
struct MapFetcher {
    responses: HashMap<String, Vec<u8>>,
    requested: Rc<RefCell<Vec<String>>>,
}

impl MapFetcher {
    fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), body);
        self
    }
}

impl ArchiveFetcher for MapFetcher {
    fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.requested.borrow_mut().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found"))
    }
}

struct FixedProvider {
    kind: ProviderKind,
    url: Option<&'static str>,
}

impl SearchProvider for FixedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn search(&self, _query: &str) -> anyhow::Result<Option<String>> {
        Ok(self.url.map(str::to_string))
    }
}

fn resolver(github: Option<&'static str>, exchange: Option<&'static str>) -> Resolver {
    Resolver::new(
        Box::new(FixedProvider {
            kind: ProviderKind::GitHub,
            url: github,
        }),
        Box::new(FixedProvider {
            kind: ProviderKind::FileExchange,
            url: exchange,
        }),
    )
}

fn plain() -> TerminalRenderer {
    TerminalRenderer::from_style(OutputStyle::Plain)
}

fn line_texts(lines: &[(LineKind, String)]) -> Vec<&str> {
    lines.iter().map(|(_, line)| line.as_str()).collect()
}

fn top_level_names(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .expect("must read dir")
        .map(|entry| {
            entry
                .expect("must read entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

fn shared(root: &Path) -> SharedOptions {
    SharedOptions {
        install_root: root.to_path_buf(),
        force: false,
        search_only: false,
    }
}

const FOO_URL: &str = "https://example.test/foo.zip";

fn foo_archive() -> Vec<u8> {
    zip_bytes(&[
        ("foo-archive/A.m", "function A"),
        ("foo-archive/B.m", "function B"),
    ])
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn validation_requires_name_without_requirements_file() {
    let cli = Cli::try_parse_from(["mpm"]).expect("must parse");
    assert_eq!(validate_cli(&cli), vec!["Must provide a package name"]);

    let cli = Cli::try_parse_from(["mpm", "--list"]).expect("must parse");
    assert!(validate_cli(&cli).is_empty());
}

#[test]
fn validation_rejects_per_install_options_with_requirements_file() {
    let cli = Cli::try_parse_from([
        "mpm",
        "-r",
        "requirements.txt",
        "-v",
        "v1.0",
        "-n",
        "src",
        "-g",
    ])
    .expect("must parse");

    let messages = validate_cli(&cli);
    assert_eq!(messages.len(), 3);
    assert!(messages[0].contains("version"));
    assert!(messages[1].contains("internaldir"));
    assert!(messages[2].contains("githubfirst"));
}

#[test]
fn validation_accepts_shared_options_with_requirements_file() {
    let cli = Cli::try_parse_from(["mpm", "-r", "reqs.txt", "-f", "-s", "-i", "/opt/matlab"])
        .expect("must parse");
    assert!(validate_cli(&cli).is_empty());
}

#[test]
fn requirement_line_accepts_positional_and_marker_urls() {
    let root = Path::new("/opt/matlab");

    let entry = parse_requirement_line("export_fig https://example.test/e.zip", 1, &shared(root));
    let request = entry.request.expect("must parse");
    assert_eq!(request.name, "export_fig");
    assert_eq!(request.url.as_deref(), Some("https://example.test/e.zip"));

    let entry = parse_requirement_line("export_fig -u https://example.test/e.zip", 2, &shared(root));
    let request = entry.request.expect("must parse");
    assert_eq!(request.url.as_deref(), Some("https://example.test/e.zip"));

    let entry = parse_requirement_line("matlab2tikz", 3, &shared(root));
    let request = entry.request.expect("must parse");
    assert_eq!(request.url, None);
    assert_eq!(request.install_root, root);
}

#[test]
fn requirement_line_keeps_per_install_options() {
    let entry = parse_requirement_line(
        "chebfun -g -v v5.7.0 -n src --allow-nesting",
        4,
        &shared(Path::new("/opt/matlab")),
    );
    let request = entry.request.expect("must parse");
    assert_eq!(request.preference, ProviderPreference::GitHubFirst);
    assert_eq!(request.version.as_deref(), Some("v5.7.0"));
    assert_eq!(request.internal_dir.as_deref(), Some("src"));
    assert!(request.allow_nesting);
    assert!(entry.warnings.is_empty());
}

#[test]
fn unsafe_line_options_are_ignored_with_warnings() {
    let mut options = shared(Path::new("/opt/matlab"));
    options.force = true;

    let entry = parse_requirement_line(
        "foo https://example.test/foo.zip --searchonly -i /elsewhere",
        7,
        &options,
    );

    assert_eq!(
        entry.warnings,
        vec![
            "Ignoring --searchonly option in line 7".to_string(),
            "Ignoring -i option in line 7".to_string(),
        ]
    );
    let request = entry.request.expect("must parse");
    assert_eq!(request.install_root, Path::new("/opt/matlab"));
    assert!(request.force);
    assert!(!request.search_only);
}

#[test]
fn unsafe_line_options_are_reported_in_every_spelling() {
    let root = Path::new("/opt/matlab");

    let entry = parse_requirement_line("pkg --installdir=/elsewhere", 2, &shared(root));
    assert_eq!(
        entry.warnings,
        vec!["Ignoring --installdir option in line 2".to_string()]
    );
    assert_eq!(entry.request.expect("must parse").install_root, root);

    let entry = parse_requirement_line("pkg -i/elsewhere", 3, &shared(root));
    assert_eq!(
        entry.warnings,
        vec!["Ignoring --installdir option in line 3".to_string()]
    );
    assert_eq!(entry.request.expect("must parse").install_root, root);

    let entry = parse_requirement_line("pkg -fs", 4, &shared(root));
    assert_eq!(
        entry.warnings,
        vec![
            "Ignoring --searchonly option in line 4".to_string(),
            "Ignoring --force option in line 4".to_string(),
        ]
    );
    let request = entry.request.expect("must parse");
    assert!(!request.force);
    assert!(!request.search_only);
}

#[test]
fn exact_spellings_are_echoed_as_written() {
    let entry = parse_requirement_line("foo -f --searchonly", 2, &shared(Path::new("/r")));
    assert_eq!(
        entry.warnings,
        vec![
            "Ignoring --searchonly option in line 2".to_string(),
            "Ignoring -f option in line 2".to_string(),
        ]
    );
}

#[test]
fn malformed_requirement_line_is_reported_not_fatal() {
    let entry = parse_requirement_line("foo --bogus", 5, &shared(Path::new("/opt/matlab")));
    let message = entry.request.expect_err("unknown option must fail");
    assert!(message.contains("--bogus"), "unexpected message: {message}");
}

#[test]
fn requirement_lines_skip_blanks_and_count_physical_lines() {
    let input = "foo\n\n   \nbar -f\n";
    let entries: Vec<_> = RequirementLines::new(input.as_bytes(), shared(Path::new("/r")))
        .map(|entry| entry.expect("must read"))
        .collect();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].line_number, 1);
    assert_eq!(entries[1].line_number, 4);
    assert_eq!(
        entries[1].warnings,
        vec!["Ignoring -f option in line 4".to_string()]
    );
}

#[test]
fn explicit_url_install_flattens_and_records_manifest_entry() {
    let root = tempfile::tempdir().expect("must create root");
    let resolver = resolver(None, None);
    let retriever = Retriever::new(MapFetcher::default().with(FOO_URL, foo_archive()));
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let request = InstallRequest::new("foo", root.path()).with_url(FOO_URL);
    let report = pipeline.install(&request).expect("must install");

    let package_dir = root.path().join("foo");
    assert!(matches!(report.status, InstallStatus::Installed { .. }));
    assert_eq!(
        top_level_names(&package_dir),
        BTreeSet::from(["A.m".to_string(), "B.m".to_string()])
    );

    let document = read_manifest(&InstallLayout::new(root.path())).expect("must read manifest");
    assert_eq!(document.packages.len(), 1);
    assert_eq!(document.packages[0].name, "foo");
    assert_eq!(document.packages[0].url, FOO_URL);
    assert_eq!(
        document.packages[0].mdir,
        package_dir.display().to_string()
    );

    let lines = format_install_report_lines(&report);
    assert_eq!(
        line_texts(&lines),
        vec![
            format!("Package \"foo\" found at \"{FOO_URL}\"."),
            format!("Installed \"foo\" to {}", package_dir.display()),
            format!("Will add \"{}\" to path.", package_dir.display()),
        ]
    );
}

#[test]
fn existing_package_without_force_is_left_untouched() {
    let root = tempfile::tempdir().expect("must create root");
    let package_dir = root.path().join("foo");
    fs::create_dir_all(&package_dir).expect("must create dir");
    fs::write(package_dir.join("old.m"), "old").expect("must write");

    let resolver = resolver(None, None);
    let fetcher = MapFetcher::default().with(FOO_URL, foo_archive());
    let requested = Rc::clone(&fetcher.requested);
    let retriever = Retriever::new(fetcher);
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let request = InstallRequest::new("foo", root.path()).with_url(FOO_URL);
    let report = pipeline.install(&request).expect("must report");

    assert!(matches!(report.status, InstallStatus::AlreadyExists { .. }));
    assert_eq!(
        top_level_names(&package_dir),
        BTreeSet::from(["old.m".to_string()])
    );
    assert_eq!(
        top_level_names(root.path()),
        BTreeSet::from(["foo".to_string()])
    );
    assert!(requested.borrow().is_empty());
}

#[test]
fn forced_reinstall_keeps_a_single_manifest_entry() {
    let root = tempfile::tempdir().expect("must create root");
    let second_url = "https://example.test/foo-2.zip";
    let resolver = resolver(None, None);
    let retriever = Retriever::new(
        MapFetcher::default()
            .with(FOO_URL, foo_archive())
            .with(second_url, zip_bytes(&[("foo-2/src/C.m", "function C")])),
    );
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let mut request = InstallRequest::new("foo", root.path()).with_url(FOO_URL);
    request.force = true;
    pipeline.install(&request).expect("first install");
    let report = pipeline
        .install(&request.clone().with_url(second_url))
        .expect("second install");

    match &report.status {
        InstallStatus::Installed { manifest, .. } => {
            assert_eq!(*manifest, UpsertOutcome::Replaced);
        }
        other => panic!("expected install, got {other:?}"),
    }
    let document = read_manifest(&InstallLayout::new(root.path())).expect("must read manifest");
    assert_eq!(document.packages.len(), 1);
    assert_eq!(document.packages[0].url, second_url);
    assert_eq!(
        document.packages[0].mdir,
        root.path().join("foo").join("src").display().to_string()
    );
    assert!(line_texts(&format_install_report_lines(&report))
        .contains(&"Overwriting entry for \"foo\" in mpm.json"));
}

#[test]
fn resolved_install_uses_provider_url() {
    let root = tempfile::tempdir().expect("must create root");
    let listing = "https://www.mathworks.com/matlabcentral/fileexchange/1-foo";
    let resolver = resolver(None, Some(listing));
    let retriever = Retriever::new(
        MapFetcher::default().with(&format!("{listing}?download=true"), foo_archive()),
    );
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let report = pipeline
        .install(&InstallRequest::new("foo", root.path()))
        .expect("must install");

    assert!(report.succeeded());
    assert_eq!(report.source.as_deref(), Some(listing));
    assert!(root.path().join("foo").join("A.m").is_file());
}

#[test]
fn search_only_reports_without_touching_disk() {
    let root = tempfile::tempdir().expect("must create root");
    let resolver = resolver(Some("https://gh.test/zip"), None);
    let fetcher = MapFetcher::default();
    let requested = Rc::clone(&fetcher.requested);
    let retriever = Retriever::new(fetcher);
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let mut request = InstallRequest::new("foo", root.path());
    request.search_only = true;
    let report = pipeline.install(&request).expect("must report");

    assert_eq!(
        line_texts(&format_install_report_lines(&report)),
        vec![
            "Package \"foo\" found at \"https://gh.test/zip\".",
            "Not installing \"foo\" because search-only was requested.",
        ]
    );
    assert!(top_level_names(root.path()).is_empty());
    assert!(requested.borrow().is_empty());
}

#[test]
fn unresolvable_package_reports_one_status_line() {
    let root = tempfile::tempdir().expect("must create root");
    let resolver = resolver(None, None);
    let retriever = Retriever::new(MapFetcher::default());
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let mut request = InstallRequest::new("nothing", root.path());
    let report = pipeline.install(&request).expect("must report");
    assert_eq!(
        line_texts(&format_install_report_lines(&report)),
        vec!["Could not find any package named \"nothing\" on GitHub or File Exchange."]
    );

    request.version = Some("v1.0".to_string());
    let report = pipeline.install(&request).expect("must report");
    assert_eq!(
        line_texts(&format_install_report_lines(&report)),
        vec!["Could not find any package named \"nothing\" on GitHub with version v1.0."]
    );
}

#[test]
fn retrieval_failure_is_reported_without_residue() {
    let root = tempfile::tempdir().expect("must create root");
    let resolver = resolver(None, None);
    let retriever = Retriever::new(MapFetcher::default());
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let request = InstallRequest::new("foo", root.path()).with_url(FOO_URL);
    let report = pipeline.install(&request).expect("must report");

    assert!(matches!(report.status, InstallStatus::RetrievalFailed { .. }));
    assert!(!report.succeeded());
    let lines = format_install_report_lines(&report);
    assert_eq!(lines.last().map(|(kind, _)| *kind), Some(LineKind::Error));
    assert!(lines
        .last()
        .is_some_and(|(_, line)| line.starts_with("ERROR: Could not install \"foo\"")));
    assert!(top_level_names(root.path()).is_empty());
}

#[test]
fn unwritable_manifest_still_reports_one_install_status() {
    let root = tempfile::tempdir().expect("must create root");
    let manifest_path = root.path().join("mpm.json");
    fs::write(&manifest_path, "{ not json").expect("must seed corrupt manifest");

    let resolver = resolver(None, None);
    let retriever = Retriever::new(MapFetcher::default().with(FOO_URL, foo_archive()));
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let request = InstallRequest::new("foo", root.path()).with_url(FOO_URL);
    let report = pipeline.install(&request).expect("must report");

    assert!(matches!(
        report.status,
        InstallStatus::InstalledUnrecorded { .. }
    ));
    assert!(!report.succeeded());
    assert!(root.path().join("foo").join("A.m").is_file());
    assert_eq!(
        fs::read_to_string(&manifest_path).expect("must read manifest"),
        "{ not json"
    );

    let lines = format_install_report_lines(&report);
    let errors: Vec<&str> = lines
        .iter()
        .filter(|(kind, _)| *kind == LineKind::Error)
        .map(|(_, line)| line.as_str())
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with(&format!(
        "ERROR: Installed \"foo\" to {} but could not update mpm.json",
        root.path().join("foo").display()
    )));
}

#[test]
fn missing_install_root_is_a_hard_error() {
    let root = tempfile::tempdir().expect("must create root");
    let resolver = resolver(None, None);
    let retriever = Retriever::new(MapFetcher::default().with(FOO_URL, foo_archive()));
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };

    let request = InstallRequest::new("foo", root.path().join("absent")).with_url(FOO_URL);
    let err = pipeline
        .install(&request)
        .expect_err("missing root must fail");
    assert!(err.to_string().contains("Invalid installation directory"));
}

#[test]
fn requirements_run_continues_past_failing_lines() {
    let root = tempfile::tempdir().expect("must create root");
    let resolver = resolver(None, None);
    let retriever = Retriever::new(
        MapFetcher::default()
            .with(FOO_URL, foo_archive())
            .with(
                "https://example.test/bar.zip",
                zip_bytes(&[("bar/bar.m", "function bar")]),
            ),
    );
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };
    let requirements = format!(
        "foo {FOO_URL} -f\n\nmissing\nbroken --bogus\nbar -u https://example.test/bar.zip\n"
    );

    let summary = run_requirements(&pipeline, requirements.as_bytes(), shared(root.path()))
        .expect("batch must finish");

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert!(root.path().join("foo").join("A.m").is_file());
    assert!(root.path().join("bar").join("bar.m").is_file());

    let document = read_manifest(&InstallLayout::new(root.path())).expect("must read manifest");
    let names: Vec<&str> = document.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["foo", "bar"]);
}

#[test]
fn manifest_listing_handles_empty_and_populated_roots() {
    let root = tempfile::tempdir().expect("must create root");
    let layout = InstallLayout::new(root.path());
    assert_eq!(
        format_manifest_listing(&layout).expect("must list"),
        vec![format!("No packages installed in {}", root.path().display())]
    );

    let resolver = resolver(None, None);
    let retriever = Retriever::new(MapFetcher::default().with(FOO_URL, foo_archive()));
    let pipeline = InstallPipeline {
        resolver: &resolver,
        retriever: &retriever,
        renderer: plain(),
    };
    pipeline
        .install(&InstallRequest::new("foo", root.path()).with_url(FOO_URL))
        .expect("must install");

    let listing = format_manifest_listing(&layout).expect("must list");
    assert_eq!(
        listing,
        vec![format!(
            "foo  {FOO_URL}  {}",
            root.path().join("foo").display()
        )]
    );
}

#[test]
fn plain_output_has_no_escape_codes() {
    assert_eq!(
        render_line(OutputStyle::Plain, LineKind::Error, "ERROR: x"),
        "ERROR: x"
    );
    let rich = render_line(OutputStyle::Rich, LineKind::Success, "Installed");
    assert!(rich.contains("Installed"));
    assert!(rich.starts_with('\u{1b}'));
}
