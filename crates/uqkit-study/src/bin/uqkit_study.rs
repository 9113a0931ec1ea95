use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use uqkit_study::config::StudyConfig;
use uqkit_study::executor::executor_for;
use uqkit_study::logging::init_logging;
use uqkit_study::presets::{describe, preset, PRESET_NAMES};
use uqkit_study::{create_timestamped_output_dir, run_study};

#[derive(Debug, Parser)]
#[command(author, version, about = "Run a sampled UQ study and summarize its responses")]
struct Cli {
    /// Experiment record (.json or .toml)
    #[arg(long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Built-in experiment, see --list-presets
    #[arg(long)]
    preset: Option<String>,

    /// Print the built-in experiments and exit
    #[arg(long)]
    list_presets: bool,

    /// Results table written by the execution engine, replayed instead of
    /// running the analysis driver
    #[arg(long)]
    table: Option<PathBuf>,

    /// Output base directory; each study gets a timestamped subdirectory
    #[arg(long, default_value = "output-uqkit-study")]
    output: PathBuf,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of samples for lhs and random designs
    #[arg(long)]
    samples: Option<usize>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_presets {
        for name in PRESET_NAMES {
            println!("{name:<18} {}", describe(name).unwrap_or_default());
        }
        return Ok(());
    }

    let mut config = match (&cli.config, &cli.preset) {
        (Some(path), _) => StudyConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, Some(name)) => match preset(name) {
            Some(config) => config,
            None => bail!("unknown preset '{name}' (try --list-presets)"),
        },
        (None, None) => preset("rosenbrock-vector").context("rosenbrock-vector preset missing")?,
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(samples) = cli.samples {
        config.samples = samples;
    }

    let output_dir = create_timestamped_output_dir(&cli.output)
        .with_context(|| format!("failed to create run directory under {}", cli.output.display()))?;
    init_logging(cli.verbose, Some(&output_dir.join("study.log")))?;

    let mut executor = executor_for(&config, cli.table.as_deref())?;
    let report = run_study(&config, executor.as_mut(), &output_dir)
        .with_context(|| format!("study failed; partial outputs in {}", output_dir.display()))?;

    println!(
        "Study complete. Method: {} | Runs: {} | Base samples: {}",
        report.method, report.runs, report.base_samples
    );
    println!("Run directory: {}", report.output_dir.display());
    for response in &report.responses {
        let s = &response.summary;
        let interval = match &s.confidence_interval {
            Some(ci) => format!(
                "{:.0}% CI [{:.4}, {:.4}]",
                100.0 * ci.level,
                ci.lower,
                ci.upper
            ),
            None => "quadrature-weighted".to_string(),
        };
        println!(
            "{} ({}): mean {:.4} | std {:.4} | {}",
            response.name, response.statistic, s.mean, s.std_dev, interval
        );
        if let Some(ri) = s.recurrence_interval {
            println!("  recurrence interval at median count: {ri:.2}");
        }
        if let Some(recurrence) = &response.recurrence {
            println!(
                "  per-run recurrence interval: mean {:.2} | median {:.2} | {} runs undefined",
                recurrence.summary.mean, recurrence.summary.median, recurrence.undefined_runs
            );
        }
        if let Some(note) = &response.recurrence_note {
            println!("  {note}");
        }
        if let Some(sensitivity) = &response.sensitivity {
            for index in &sensitivity.indices {
                println!(
                    "  {}: S = {:.4} | ST = {:.4}",
                    index.variable, index.first_order, index.total_effect
                );
            }
        }
    }

    Ok(())
}
