use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use depscope::analysis::resolve_dependency_usage;
use depscope::config::{ignore_names, ProjectConfig};
use depscope::lockfile;
use depscope::report::{self, DisplayOptions};
use depscope::scanner::{scan_sources, ScanFilter};

#[derive(Parser)]
#[command(name = "depscope")]
#[command(version)]
#[command(about = "Find unused dependencies by cross-checking lockfiles against source imports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the project for unused dependencies
    Check {
        /// Project directory containing the lockfile
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Read pnpm-lock.yaml instead of package-lock.json
        #[arg(long)]
        pnpm: bool,

        /// Show per-file warnings and unused devDependencies
        #[arg(short, long)]
        verbose: bool,

        /// Suppress remediation hints
        #[arg(short, long)]
        silence: bool,

        /// Comma-separated dependency names to exclude
        #[arg(long, default_value = "")]
        ignore_dep: String,

        /// Comma-separated directory names to skip while scanning
        #[arg(long, default_value = "")]
        ignore_path: String,

        /// Comma-separated file names to skip while scanning
        #[arg(long, default_value = "")]
        ignore_file: String,

        /// Explicit config file (defaults to depscope.config.json in the project)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Check {
            path,
            pnpm,
            verbose,
            silence,
            ignore_dep,
            ignore_path,
            ignore_file,
            config,
        }) => {
            if let Err(err) = run_check(
                &path,
                pnpm,
                verbose,
                silence,
                &ignore_dep,
                &ignore_path,
                &ignore_file,
                config.as_deref(),
            ) {
                eprintln!("\n{} {err:#}", "Analysis failed:".red().bold());
                std::process::exit(1);
            }
        }
        Some(Commands::Version) => {
            println!("depscope v{}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            println!("depscope - unused dependency checker");
            println!("Run 'depscope check' to analyze the current project");
            println!("Run 'depscope --help' for more information");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_check(
    path: &std::path::Path,
    pnpm: bool,
    verbose: bool,
    silence: bool,
    ignore_dep: &str,
    ignore_path: &str,
    ignore_file: &str,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let config = ProjectConfig::load(path, config_path).context("loading configuration")?;
    let ignored: HashSet<String> = ignore_names(&config, ignore_dep);

    let progress = ProgressBar::new(4);
    progress.set_style(
        ProgressStyle::with_template(" {bar:40.cyan/blue} | {msg} | {pos}/{len}")
            .expect("static progress template")
            .progress_chars("=>-"),
    );

    progress.set_message("Scanning sources");
    let mut filter = ScanFilter {
        ignore_paths: config.ignore_path.clone(),
        ignore_files: config.ignore_file.clone(),
    };
    filter
        .ignore_paths
        .extend(split_list(ignore_path));
    filter
        .ignore_files
        .extend(split_list(ignore_file));
    let scan = scan_sources(path, &filter);
    progress.inc(1);

    if !scan.warnings.is_empty() {
        if verbose {
            for warning in &scan.warnings {
                progress.println(format!("{} {}", "warning:".yellow(), warning));
            }
        } else {
            progress.println(format!(
                "{} {} files skipped (run with --verbose for details)",
                "warning:".yellow(),
                scan.warnings.len()
            ));
        }
    }

    progress.set_message("Reading lockfile");
    let graph = lockfile::load(path, pnpm)?;
    progress.inc(1);

    progress.set_message("Resolving usage");
    let summary = resolve_dependency_usage(&graph, &scan.files, &ignored)?;
    progress.inc(1);

    progress.set_message("Done");
    progress.inc(1);
    progress.finish_and_clear();

    report::render(
        &summary,
        DisplayOptions {
            verbose,
            silence,
            pnpm,
            has_ignore_config: config.has_exclusions() || !ignored.is_empty(),
        },
    );
    Ok(())
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
