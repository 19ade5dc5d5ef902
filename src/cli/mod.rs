//! Command-line parsing for the background F-test.
//!
//! Argument parsing and command dispatch stay separate from the selection
//! engine: flags are converted once into an immutable `FtestConfig`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{
    DEFAULT_BINS, DEFAULT_BLIND_HIGH, DEFAULT_BLIND_LOW, DEFAULT_ENVELOPE_THRESHOLD, DEFAULT_FIT_RETRIES,
    DEFAULT_GOF_THRESHOLD, DEFAULT_MASS_HIGH, DEFAULT_MASS_LOW, DEFAULT_MAX_FIT_ITERS, DEFAULT_MAX_ORDER,
    DEFAULT_TOY_SEED, DEFAULT_TOYS, DEFAULT_TRUTH_THRESHOLD, FunctionFamily,
};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "ftest",
    version,
    about = "Background function selection by F-test, goodness of fit and penalized likelihood"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Full selection: truth orders, envelopes, multi-pdf best index and exports.
    Run(RunArgs),
    /// Truth-order search only; prints the results table.
    Scan(RunArgs),
}

/// Options shared by `run` and `scan`.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Observation CSV (`category,<observable>[,weight]`).
    #[arg(short = 'i', long, value_name = "CSV")]
    pub input: PathBuf,

    /// Comma-separated category names, in processing order.
    #[arg(short = 'c', long, value_delimiter = ',', required = true)]
    pub categories: Vec<String>,

    /// Process only the category at this index (output files get a `_<cat>` suffix).
    #[arg(long = "single-cat")]
    pub single_cat: Option<usize>,

    /// Output directory.
    #[arg(short = 'o', long, default_value = "plots/fTest")]
    pub out_dir: PathBuf,

    /// Extension tag appended to model and output names.
    #[arg(long, default_value = "13TeV")]
    pub ext: String,

    /// Observable column name.
    #[arg(long, default_value = "CMS_higgs_mass")]
    pub observable: String,

    #[arg(long, default_value_t = DEFAULT_MASS_LOW)]
    pub mass_low: f64,

    #[arg(long, default_value_t = DEFAULT_MASS_HIGH)]
    pub mass_high: f64,

    #[arg(long, default_value_t = DEFAULT_BLIND_LOW)]
    pub blind_low: f64,

    #[arg(long, default_value_t = DEFAULT_BLIND_HIGH)]
    pub blind_high: f64,

    /// Show data inside the blind window in plots.
    #[arg(long)]
    pub unblind: bool,

    /// Number of bins of the binned view.
    #[arg(long, default_value_t = DEFAULT_BINS)]
    pub bins: usize,

    /// Function families to try (comma-separated).
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = FunctionFamily::DEFAULT_SET)]
    pub families: Vec<FunctionFamily>,

    /// Use toys for the nested-model test instead of the asymptotic chi-square.
    #[arg(long)]
    pub ftest_toys: bool,

    #[arg(long, default_value_t = DEFAULT_TOYS)]
    pub n_toys: usize,

    /// Base seed for toys and fit randomization.
    #[arg(long, default_value_t = DEFAULT_TOY_SEED)]
    pub seed: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_ORDER)]
    pub max_order: u32,

    #[arg(long, default_value_t = DEFAULT_TRUTH_THRESHOLD)]
    pub truth_threshold: f64,

    #[arg(long, default_value_t = DEFAULT_ENVELOPE_THRESHOLD)]
    pub envelope_threshold: f64,

    #[arg(long, default_value_t = DEFAULT_GOF_THRESHOLD)]
    pub gof_threshold: f64,

    /// Extra attempts after a fit that did not converge.
    #[arg(long, default_value_t = DEFAULT_FIT_RETRIES)]
    pub fit_retries: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_FIT_ITERS)]
    pub max_fit_iters: u64,

    /// Do not rescale fit covariances for weighted data.
    #[arg(long)]
    pub no_sum_w2_error: bool,

    /// Multi-pdf penalty per free parameter.
    #[arg(long, default_value_t = 0.5)]
    pub penalty_factor: f64,

    /// Skip the SVG diagnostics.
    #[arg(long)]
    pub no_plots: bool,

    /// Debug-level logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_match_the_standard_configuration() {
        let cli = Cli::try_parse_from(["ftest", "run", "-i", "data.csv", "-c", "cat0,cat1"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.categories, vec!["cat0", "cat1"]);
        assert_eq!(args.families, FunctionFamily::DEFAULT_SET.to_vec());
        assert_eq!(args.bins, 60);
        assert_eq!(args.seed, 1234);
        assert!(!args.unblind);
    }

    #[test]
    fn families_parse_as_a_list() {
        let cli = Cli::try_parse_from([
            "ftest",
            "scan",
            "-i",
            "d.csv",
            "-c",
            "cat0",
            "--families",
            "chebyshev,power-law",
        ])
        .unwrap();
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.families, vec![FunctionFamily::Chebyshev, FunctionFamily::PowerLaw]);
    }
}
