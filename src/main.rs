use clap::Parser;
use colored::Colorize;
use miette::{miette, Result};
use std::path::PathBuf;
use tracing::info;

use apkmerge::config::Config;
use apkmerge::discovery::SplitSet;
use apkmerge::engine::Reconciler;
use apkmerge::report::{ReportFormat, Reporter};

/// apkmerge - Merge decompiled split APKs into a single rebuildable package
#[derive(Parser, Debug)]
#[command(name = "apkmerge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extracted package trees to reconcile (base and splits, any order)
    #[arg(required = true)]
    trees: Vec<PathBuf>,

    /// Tree to treat as the base package (default: auto-detect from manifests)
    #[arg(short, long)]
    base: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Placeholder name prefix assigned by the decompiler
    #[arg(long, value_name = "PREFIX")]
    dummy_prefix: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "terminal")]
    format: OutputFormat,

    /// Output file (for json format)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep split declarations in the merged manifest
    #[arg(long)]
    keep_split_manifest: bool,

    /// Skip the duplicate style item cleanup
    #[arg(long)]
    no_styles_dedup: bool,

    /// Skip the bare-ampersand repair
    #[arg(long)]
    no_fix_ampersands: bool,

    /// Skip forcing resources public before rebuild
    #[arg(long)]
    no_publicize: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terminal => ReportFormat::Terminal,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    info!("apkmerge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config(&cli)?;

    run_merge(&config, &cli)
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        // Try to load from default locations
        Config::from_default_locations(&working_dir)?
    };

    // Override with CLI arguments
    if let Some(prefix) = &cli.dummy_prefix {
        config.placeholder_prefix = prefix.clone();
    }
    if cli.keep_split_manifest {
        config.normalize.disable_splitting = false;
    }
    if cli.no_styles_dedup {
        config.normalize.dedup_style_items = false;
    }
    if cli.no_fix_ampersands {
        config.normalize.fix_ampersands = false;
    }
    if cli.no_publicize {
        config.normalize.publicize_resources = false;
    }

    Ok(config)
}

fn run_merge(config: &Config, cli: &Cli) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Instant;

    let start_time = Instant::now();

    for tree in &cli.trees {
        if !tree.is_dir() {
            return Err(miette!("{} is not a directory", tree.display()));
        }
    }

    let set = classify_trees(cli)?;
    if !cli.quiet {
        println!(
            "Base package: {}",
            set.base.root.display().to_string().cyan().bold()
        );
        for split in &set.splits {
            println!("  split: {}", split.name);
        }
    }

    let progress = if cli.quiet || matches!(cli.format, OutputFormat::Json) {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("valid template"),
        );
        pb.set_message("Reconciling split packages...");
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb
    };

    let reconciler = Reconciler::new(config);
    let result = reconciler.reconcile(&set);
    progress.finish_and_clear();

    let summary = result.map_err(|e| miette!("{e}"))?;

    if !cli.quiet && !matches!(cli.format, OutputFormat::Json) {
        println!(
            "Reconciled in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
    }

    let reporter = Reporter::new(cli.format.clone().into(), cli.output.clone());
    reporter.report(&summary)
}

/// Classify the input trees into base and splits.
///
/// An explicit `--base` wins; otherwise the tree whose manifest carries no
/// split identity is the base. Zero or several candidates fall back to an
/// interactive choice.
fn classify_trees(cli: &Cli) -> Result<SplitSet> {
    if let Some(base) = &cli.base {
        let base_index = cli
            .trees
            .iter()
            .position(|t| t == base)
            .ok_or_else(|| miette!("--base {} is not among the input trees", base.display()))?;
        return Ok(SplitSet::from_roots(&cli.trees, base_index));
    }

    let candidates =
        SplitSet::base_candidates(&cli.trees).map_err(|e| miette!("{e}"))?;
    match candidates.as_slice() {
        [index] => Ok(SplitSet::from_roots(&cli.trees, *index)),
        [] if cli.trees.len() == 1 => Ok(SplitSet::from_roots(&cli.trees, 0)),
        _ => {
            if cli.quiet {
                return Err(miette!(
                    "Could not determine the base package, pass --base"
                ));
            }
            let names: Vec<String> = cli
                .trees
                .iter()
                .map(|t| t.display().to_string())
                .collect();
            let selection = dialoguer::Select::new()
                .with_prompt("Select the base package")
                .items(&names)
                .default(0)
                .interact()
                .map_err(|e| miette!("Base selection failed: {e}"))?;
            Ok(SplitSet::from_roots(&cli.trees, selection))
        }
    }
}
