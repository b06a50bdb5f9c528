use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};

use spectra_learn::config::{Config, DEFAULT_CONFIG_FILE};
use spectra_learn::output::ResultRow;
use spectra_learn::pipeline;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Train spectroscopy classifiers and predict single files, directories or maps"
)]
struct Cli {
    /// TOML configuration; defaults are used when the file does not exist
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train on a labeled file and classify one spectrum
    Predict {
        #[arg(value_hint = ValueHint::FilePath)]
        learn: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        sample: PathBuf,
    },

    /// Train and report accuracy on a test file or a held-out split
    Train {
        #[arg(value_hint = ValueHint::FilePath)]
        learn: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        test: Option<PathBuf>,
    },

    /// Classify every .txt file in a directory into a summary CSV
    Batch {
        #[arg(value_hint = ValueHint::FilePath)]
        learn: PathBuf,
        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },

    /// Classify every pixel of a 2D map
    Map {
        #[arg(value_hint = ValueHint::FilePath)]
        learn: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        map: PathBuf,
    },

    /// Principal component analysis of the training data
    Pca {
        #[arg(value_hint = ValueHint::FilePath)]
        learn: PathBuf,
        /// Number of components (default: one per distinct label)
        #[arg(long)]
        components: Option<usize>,
    },

    /// Write the default configuration
    InitConfig {
        #[arg(default_value = DEFAULT_CONFIG_FILE, value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
}

fn print_row(row: &ResultRow) {
    println!("\n  Prediction for {}", row.file);
    for (family, pred) in &row.predictions {
        match pred.accuracy {
            Some(accuracy) => println!(
                "  {:<24} {:<12} {:>6.1}%  (accuracy {:.1}%)",
                family.title(),
                pred.label,
                pred.confidence * 100.0,
                accuracy * 100.0
            ),
            None => println!(
                "  {:<24} {:<12} {:>6.1}%",
                family.title(),
                pred.label,
                pred.confidence * 100.0
            ),
        }
    }
}

fn init_config(path: &Path) -> Result<()> {
    let text = Config::default().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    println!("default configuration written to {}", path.display());
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if let Command::InitConfig { path } = &cli.command {
        return init_config(path);
    }
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Predict { learn, sample } => {
            let row = pipeline::learn_predict_file(&config, &learn, &sample)?;
            print_row(&row);
        }
        Command::Train { learn, test } => {
            let accuracies = pipeline::train_accuracy(&config, &learn, test.as_deref())?;
            println!("\n  Accuracy on test data");
            for (family, accuracy) in accuracies {
                println!("  {:<24} {:>6.1}%", family.title(), accuracy * 100.0);
            }
        }
        Command::Batch { learn, dir } => {
            let report = pipeline::learn_predict_batch(&config, &learn, &dir)?;
            println!(
                "{} files summarised in {}",
                report.processed,
                report.summary_path.display()
            );
            for (path, reason) in &report.failed {
                println!("  skipped {}: {reason}", path.display());
            }
        }
        Command::Map { learn, map } => {
            let report = pipeline::learn_predict_map(&config, &learn, &map)?;
            for path in report.outputs.iter().chain(&report.plots) {
                println!("  wrote {}", path.display());
            }
        }
        Command::Pca { learn, components } => {
            let fit = pipeline::learn_pca(&config, &learn, components)?;
            for (i, ratio) in fit.explained_variance_ratio.iter().enumerate() {
                println!("  PC{i}: {:.1}%", ratio * 100.0);
            }
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose > 0 { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
