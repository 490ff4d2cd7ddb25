use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use variant_builder::{execute, load_config, logger, ConfigOverrides};

#[derive(Parser)]
#[command(name = "variant-builder", version)]
#[command(about = "Build N distinct, policy-checked obfuscated variants of one artifact")]
struct Cli {
    /// Pipeline config file (YAML, JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of accepted variants to produce
    #[arg(short = 'n', long)]
    count: Option<u64>,

    #[arg(long)]
    auto_wordlist: Option<PathBuf>,

    #[arg(long)]
    manual_wordlist: Option<PathBuf>,

    /// Give up after this many attempts (default: never)
    #[arg(long)]
    max_attempts: Option<u64>,

    /// Do not ring the terminal bell on rejections
    #[arg(long)]
    no_bell: bool,

    #[arg(long)]
    json_logs: bool,

    /// Write a JSON run summary here
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_logging(cli.json_logs);

    let overrides = ConfigOverrides {
        output_dir: cli.output_dir,
        target_count: cli.count,
        auto_wordlist: cli.auto_wordlist,
        manual_wordlist: cli.manual_wordlist,
        max_attempts: cli.max_attempts,
        no_bell: cli.no_bell,
        report_path: cli.report,
    };
    let cfg = load_config(cli.config.as_deref(), &overrides).context("loading configuration")?;

    let registry = prometheus::Registry::new();
    let summary = execute(&cfg, &registry).await?;

    info!(
        "{} archives written to {}",
        summary.archives.len(),
        cfg.zips_dir().display()
    );
    Ok(())
}
