// This software is licensed under a dual license model:
//
// GNU Affero General Public License v3 (AGPLv3): You may use, modify, and
// distribute this software under the terms of the AGPLv3.
//
// Elastic License v2 (ELv2): You may also use, modify, and distribute this
// software under the Elastic License v2, which has specific restrictions.
//
// We welcome any commercial collaboration or support. For inquiries
// regarding the licenses, please contact us at:
// vectorchord-inquiry@tensorchord.ai
//
// Copyright (c) 2025 TensorChord Inc.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use random_projection::{ProjectionMatrix, generate, seeded_rng};
use randproj::SweepOptions;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Random orthonormal projection matrices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check orthonormality over a sweep of dimensions
    Verify(VerifyArgs),
    /// Print one projection matrix as JSON
    Generate(GenerateArgs),
}

#[derive(Args)]
struct VerifyArgs {
    /// TOML file with sweep options
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    threads: Option<u16>,
    #[arg(long)]
    max_dim: Option<u32>,
    #[arg(long)]
    include_square: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Precision {
    F32,
    F64,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long)]
    src_dim: usize,
    #[arg(long)]
    dst_dim: usize,
    /// Skip orthonormalization
    #[arg(long)]
    raw: bool,
    #[arg(long, value_enum, default_value = "f32")]
    precision: Precision,
    #[arg(long)]
    seed: Option<u64>,
}

fn verify(args: VerifyArgs) -> Result<()> {
    let mut options = if let Some(path) = &args.config {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        SweepOptions::from_toml(&s).with_context(|| format!("in {}", path.display()))?
    } else {
        SweepOptions::default()
    };
    if args.seed.is_some() {
        options.seed = args.seed;
    }
    if let Some(threads) = args.threads {
        options.threads = threads;
    }
    if let Some(max_dim) = args.max_dim {
        options.max_dim = max_dim;
    }
    options.include_square |= args.include_square;
    validator::Validate::validate(&options).context("invalid options")?;
    let report = randproj::run(&options);
    if report.failed != 0 {
        bail!("{} of {} (sub) tests failed", report.failed, report.tests);
    }
    println!("{} (sub) tests performed {} failed", report.tests, report.failed);
    Ok(())
}

fn print_json<T: serde::Serialize>(matrix: &T) -> Result<()> {
    let stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(stdout, matrix)?;
    println!();
    Ok(())
}

fn generate_matrix(args: GenerateArgs) -> Result<()> {
    let mut rng = match args.seed {
        Some(seed) => seeded_rng(seed),
        None => rand::SeedableRng::from_rng(&mut rand::rng()),
    };
    let orthonormal = !args.raw;
    match args.precision {
        Precision::F32 => {
            let matrix: ProjectionMatrix<f32> =
                generate(&mut rng, args.src_dim, args.dst_dim, orthonormal)?;
            print_json(&matrix)
        }
        Precision::F64 => {
            let matrix: ProjectionMatrix<f64> =
                generate(&mut rng, args.src_dim, args.dst_dim, orthonormal)?;
            print_json(&matrix)
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Verify(args) => verify(args),
        Commands::Generate(args) => generate_matrix(args),
    }
}
