use std::{
    collections::HashMap,
    fs,
    io::{self, BufRead},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use approval_groups::{
    parser::{self, ParseResult},
    teams::StaticRosters,
    CancellationToken, Engine, PullRequestSnapshot, Report, ResolvedFileOwnership, ResolveOptions,
    RosterProvider,
};

#[derive(Parser)]
#[command(version, about = "Show the fewest approvals a change needs")]
struct Cli {
    /// Changed files. Directories are walked; with no paths the current
    /// directory is walked.
    paths: Vec<PathBuf>,

    #[clap(short = 'f', long = "file")]
    codeowners_file: Option<PathBuf>,

    /// Read changed files from a newline-separated list (`-` for stdin).
    #[arg(long)]
    files_from: Option<PathBuf>,

    /// A user who has approved the change. May be repeated.
    #[arg(short = 'a', long = "approval")]
    approvals: Vec<String>,

    /// Team requested for review. May be repeated.
    #[arg(long = "requested-team")]
    requested_teams: Vec<String>,

    /// JSON file mapping team names (`org/team`) to member logins.
    #[arg(long)]
    rosters: Option<PathBuf>,

    /// Maximum number of roster lookups in flight.
    #[arg(long, default_value_t = ResolveOptions::default().concurrency)]
    concurrency: usize,

    /// Give up on roster lookups after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Print every rule matching each file instead of the approval report.
    #[arg(long)]
    all_matching_rules: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl Cli {
    fn codeowners_path(&self) -> PathBuf {
        self.codeowners_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("./CODEOWNERS"))
    }

    fn root_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() && self.files_from.is_none() {
            vec![PathBuf::from(".")]
        } else {
            self.paths.clone()
        }
    }

    fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            concurrency: self.concurrency,
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }

    fn changed_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        if let Some(list) = &self.files_from {
            files.extend(read_file_list(list)?);
        }

        for root_path in self.root_paths() {
            if root_path.is_dir() {
                files.extend(walk_files(&root_path).map(|e| relative_path(e.path())));
            } else {
                // Changed files may have been deleted, so they don't need to exist
                files.push(relative_path(&root_path));
            }
        }
        Ok(files)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let codeowners_path = cli.codeowners_path();
    let parsed = match parser::parse_file(&codeowners_path) {
        Ok(parsed) => parsed,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(
                path = %codeowners_path.display(),
                "no CODEOWNERS file, no approvals will be required"
            );
            ParseResult::default()
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", codeowners_path.display()))
        }
    };

    let engine = Engine::from_parsed(parsed);
    for diagnostic in engine.diagnostics() {
        debug!(line = diagnostic.line, "{}", diagnostic.message);
    }

    let pr = PullRequestSnapshot {
        changed_files: cli.changed_files()?,
        approvals: cli.approvals.clone(),
        requested_reviewers: Vec::new(),
        requested_teams: cli.requested_teams.clone(),
    };

    if cli.all_matching_rules {
        print_matching_rules(&engine, &pr.changed_files);
        return Ok(());
    }

    let rosters = cli.rosters.as_deref().map(load_rosters).transpose()?;
    let provider = rosters.as_ref().map(|r| r as &dyn RosterProvider);
    let report = engine
        .evaluate(&pr, provider, &cli.resolve_options(), &CancellationToken::new())
        .await;

    match cli.format {
        Format::Text => print_report(&report),
        Format::Json => {
            let resolved = engine.resolve(&pr.changed_files);
            let output = JsonOutput {
                files: &resolved,
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    files: &'a [ResolvedFileOwnership],
    #[serde(flatten)]
    report: &'a Report,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_rosters(path: &Path) -> Result<StaticRosters> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let rosters: HashMap<String, Vec<String>> = serde_json::from_str(&text)
        .with_context(|| format!("parsing rosters from {}", path.display()))?;
    Ok(StaticRosters::new(rosters))
}

fn read_file_list(path: &Path) -> Result<Vec<String>> {
    let lines = if path == Path::new("-") {
        io::stdin().lock().lines().collect::<io::Result<Vec<_>>>()?
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?
            .lines()
            .map(str::to_owned)
            .collect()
    };
    Ok(lines
        .into_iter()
        .map(|l| l.trim().to_owned())
        .filter(|l| !l.is_empty())
        .collect())
}

fn print_matching_rules(engine: &Engine, files: &[String]) {
    for path in files {
        let rules = engine.rules().matching_rules(path);
        if rules.is_empty() {
            println!("{:<70}  (unowned)", path);
            continue;
        }
        for rule in rules {
            let owners = rule
                .owners
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            println!(
                "{:<70}  {:>4}  {:<30}  {}",
                path,
                rule.line,
                rule.pattern,
                owners.join(" ")
            );
        }
    }
}

fn print_report(report: &Report) {
    for group in &report.groups {
        let owners = group
            .owners
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        let status = match group.satisfaction.via() {
            Some("team") => format!(
                "approved by {} via @{}",
                group.satisfied_by().unwrap_or_default(),
                group.satisfaction.satisfying_team().unwrap_or_default()
            ),
            Some(_) => format!("approved by {}", group.satisfied_by().unwrap_or_default()),
            None if !group.unresolved_teams.is_empty() => format!(
                "needs approval (unknown roster: {})",
                group.unresolved_teams.join(", ")
            ),
            None => "needs approval".to_owned(),
        };
        println!("[{}] {}  {}", group.label, owners, status);
        for file in &group.files {
            println!("    {}", file);
        }
    }

    if !report.unowned_files.is_empty() {
        println!("(unowned)");
        for file in &report.unowned_files {
            println!("    {}", file);
        }
    }

    println!();
    if report.groups.is_empty() {
        println!("no ownership rules apply to this change");
    } else if report.ready_to_merge {
        println!("all {} approval groups satisfied", report.groups.len());
    } else {
        println!(
            "{} more approval(s) needed across {} group(s)",
            report.groups_needing_approval,
            report.groups.len()
        );
    }
}

fn relative_path(path: &Path) -> String {
    path.strip_prefix(".")
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn walk_files(root: impl AsRef<Path>) -> impl Iterator<Item = walkdir::DirEntry> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|entry| !entry.file_type().is_dir())
}
