//! git-tar CLI
//!
//! Entry point for the `git-tar` command-line tool.

use clap::{Parser, Subcommand};
use git_tar::config::{ConfigError, EffectiveConfig};
use git_tar::pipeline::{self, CloneDir, PipelineError, PipelineResult};
use git_tar::GitTarConfig;
use serde_json::{json, Map, Value};
use std::error::Error as _;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing::Level;

#[derive(Parser)]
#[command(name = "git-tar")]
#[command(about = "Reproducible, provenance-annotated tarballs of git commits", version)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RepoArgs {
    /// URL of the git repository
    #[arg(long)]
    repo: Option<String>,

    /// Directory for the bare clone (default: temporary, removed at exit)
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Commit, branch or tag to use (default: HEAD)
    #[arg(long)]
    commit: Option<String>,

    /// Do not fetch when the clone already exists
    #[arg(long)]
    no_fetch: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the archive
    Archive {
        #[command(flatten)]
        repo: RepoArgs,

        /// Archive path
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Directory entries are placed under inside the archive
        #[arg(long)]
        base_dir: Option<String>,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the patch line for a commit
    PatchLine {
        #[command(flatten)]
        repo: RepoArgs,
    },

    /// Clone or update the bare mirror only
    Fetch {
        #[command(flatten)]
        repo: RepoArgs,
    },

    /// Print the effective configuration and the sources it was merged from
    Config {
        #[command(flatten)]
        repo: RepoArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Archive {
            repo,
            output,
            base_dir,
            json,
        } => {
            let mut overrides = repo_overrides(&repo);
            if let Some(output) = output {
                overrides["archive"]["output"] = json!(output.to_string_lossy());
            }
            if let Some(base_dir) = base_dir {
                overrides["archive"]["base_dir"] = json!(base_dir);
            }
            run_archive(cli.config, overrides, json)
        }
        Commands::PatchLine { repo } => run_patch_line(cli.config, repo_overrides(&repo)),
        Commands::Fetch { repo } => run_fetch(cli.config, repo_overrides(&repo)),
        Commands::Config { repo } => run_config(cli.config, repo_overrides(&repo)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        process::exit(e.exit_code());
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// CLI flags as a config layer; only flags that were given are set.
fn repo_overrides(args: &RepoArgs) -> Value {
    let mut repo = Map::new();
    let mut archive = Map::new();
    if let Some(url) = &args.repo {
        repo.insert("url".to_string(), json!(url));
    }
    if let Some(directory) = &args.directory {
        repo.insert("directory".to_string(), json!(directory.to_string_lossy()));
    }
    if let Some(commit) = &args.commit {
        archive.insert("commit".to_string(), json!(commit));
    }
    if args.no_fetch {
        archive.insert("fetch".to_string(), json!(false));
    }
    json!({"repo": repo, "archive": archive})
}

fn load_config(path: Option<PathBuf>, overrides: Value) -> PipelineResult<GitTarConfig> {
    let effective = EffectiveConfig::build(path.as_deref(), Some(overrides))?;
    for source in &effective.sources {
        tracing::debug!(
            origin = ?source.origin,
            path = source.path.as_deref().unwrap_or("-"),
            digest = source.digest.as_deref().unwrap_or("-"),
            "config source"
        );
    }
    Ok(effective.config)
}

fn run_config(path: Option<PathBuf>, overrides: Value) -> PipelineResult<()> {
    let effective = EffectiveConfig::build(path.as_deref(), Some(overrides))?;
    let out = effective.to_json().map_err(|e| PipelineError::Output {
        path: PathBuf::from("<stdout>"),
        source: e.into(),
    })?;
    println!("{}", out);
    Ok(())
}

fn run_archive(path: Option<PathBuf>, overrides: Value, json: bool) -> PipelineResult<()> {
    let config = load_config(path, overrides)?;
    let summary = pipeline::run_archive(&config)?;

    if json {
        let out = serde_json::to_string_pretty(&summary).map_err(|e| PipelineError::Output {
            path: PathBuf::from("<stdout>"),
            source: e.into(),
        })?;
        println!("{}", out);
    } else {
        println!("{}", summary.patch_line);
        println!(
            "{}: {} entries, {} bytes, sha256 {}",
            summary.output.display(),
            summary.entries,
            summary.size,
            summary.sha256
        );
    }
    Ok(())
}

fn run_patch_line(path: Option<PathBuf>, overrides: Value) -> PipelineResult<()> {
    let config = load_config(path, overrides)?;
    let clone_dir = CloneDir::prepare(&config)?;
    let mirror = pipeline::open_mirror(&config, clone_dir.path())?;
    let line = pipeline::compute_patch_line(&mirror, &config)?;
    println!("{}", line);
    Ok(())
}

fn run_fetch(path: Option<PathBuf>, overrides: Value) -> PipelineResult<()> {
    let mut config = load_config(path, overrides)?;
    if config.repo.directory.is_none() {
        return Err(ConfigError::Validation(
            "fetch needs --directory (a temporary clone would be removed on exit)".to_string(),
        )
        .into());
    }
    config.archive.fetch = true;
    let clone_dir = CloneDir::prepare(&config)?;
    let mirror = pipeline::open_mirror(&config, clone_dir.path())?;
    println!("{}", mirror.dir().display());
    Ok(())
}
