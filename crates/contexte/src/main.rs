use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use contexte_core::config::{ContexteConfig, load_config, resolve_config_path};
use contexte_core::{RewriteOptions, RewriteReport, TracingSink, rewrite_file};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "frontmatter-to-contexte",
    version,
    about = "Rewrite the front matter of a markdown file to the contexte title section"
)]
struct Cli {
    #[arg(short = 'i', long, value_name = "PATH", help = "Path to the input file")]
    input: PathBuf,
    #[arg(
        short = 'f',
        long,
        help = "Overwrite the Contexte section even if it already has content"
    )]
    force: bool,
    #[arg(long, help = "Print the diff instead of writing the file")]
    dry_run: bool,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
    #[arg(long, value_name = "PATH", help = "Config file (default: ./.contexte.toml)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Print resolved configuration diagnostics")]
    diagnostics: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let cwd = env::current_dir().context("failed to read current directory")?;
    let config_path = resolve_config_path(cli.config.as_deref(), &cwd);
    let config = load_config(&config_path)?;
    init_logging(config.log_level());
    tracing::debug!(
        config = %normalize_path(&config_path),
        found = config_path.exists(),
        "configuration loaded"
    );

    run(&cli, &config, &config_path)
}

/// `CONTEXTE_LOG` > `RUST_LOG` > config level.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env("CONTEXTE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // try_init fails only when a subscriber is already set; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn run(cli: &Cli, config: &ContexteConfig, config_path: &Path) -> Result<()> {
    let options = RewriteOptions {
        force: cli.force,
        dry_run: cli.dry_run,
        markers: config.section_markers(),
    };
    let mut sink = TracingSink;
    let report = rewrite_file(&cli.input, &options, &mut sink)
        .with_context(|| format!("failed to rewrite {}", normalize_path(&cli.input)))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if cli.diagnostics {
        println!(
            "\n[diagnostics]\nconfig_path={} ({})\n{}",
            normalize_path(config_path),
            if config_path.exists() {
                "found"
            } else {
                "missing"
            },
            config.diagnostics()
        );
    }
    Ok(())
}

fn print_report(report: &RewriteReport) {
    println!("contexte rewrite");
    println!("file: {}", report.path);
    println!(
        "date: {}",
        if report.date.is_empty() {
            "<none>"
        } else {
            report.date.as_str()
        }
    );
    println!("description: {}", report.description);
    println!(
        "stats: {}",
        if report.stats.is_empty() {
            "<none>"
        } else {
            report.stats.as_str()
        }
    );
    println!("changed: {}", format_flag(report.changed));
    println!("written: {}", format_flag(report.written));
    if !report.warnings.is_empty() {
        println!("warnings:");
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }
    if let Some(diff) = &report.diff {
        if diff.is_empty() {
            println!("diff: <none>");
        } else {
            println!();
            print!("{diff}");
        }
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
