//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments into an `FtestConfig`
//! - runs the selection pipeline
//! - prints the results and writes the exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, RunArgs};
use crate::domain::{BlindWindow, FtestConfig, Observable};
use crate::error::AppError;
use crate::io::{OutputPaths, WorkspaceFile, write_text, write_workspace_json};
use crate::report::{format_bias_summary, format_recommended, format_results_table};

pub mod pipeline;

/// Entry point for the `ftest` binary.
pub fn run() -> Result<(), AppError> {
    // A missing `.env` is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            init_logging(args.verbose);
            handle_run(&ftest_config_from_args(&args)?)
        }
        Command::Scan(args) => {
            init_logging(args.verbose);
            handle_scan(&ftest_config_from_args(&args)?)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

fn handle_run(config: &FtestConfig) -> Result<(), AppError> {
    let run = pipeline::run_selection(config)?;
    let paths = OutputPaths::new(config);

    if !run.results.is_empty() {
        let table = format_results_table(run.results.iter().map(|r| r.rows.as_slice()));
        write_text(&paths.results_table, "results table", &table)?;
        write_text(&paths.bias_summary, "bias-study summary", &format_bias_summary(&run.results))?;

        let workspace = WorkspaceFile::new(&config.ext, &config.observable, &run.results);
        write_workspace_json(&paths.workspace, &workspace)?;
        info!(path = %paths.workspace.display(), "saved multi-pdf container");

        print!("{}", format_recommended(&run.results));
    }

    pipeline::finish(run.failures)
}

fn handle_scan(config: &FtestConfig) -> Result<(), AppError> {
    let scan = pipeline::run_scan(config)?;
    print!("{}", format_results_table(scan.rows.iter().map(Vec::as_slice)));
    pipeline::finish(scan.failures)
}

/// Validate CLI flags and build the immutable run configuration.
pub fn ftest_config_from_args(args: &RunArgs) -> Result<FtestConfig, AppError> {
    if !(args.mass_low < args.mass_high) {
        return Err(AppError::new(
            2,
            format!("Invalid observable range [{}, {}].", args.mass_low, args.mass_high),
        ));
    }
    if !(args.blind_low < args.blind_high) {
        return Err(AppError::new(
            2,
            format!("Invalid blind window ({}, {}).", args.blind_low, args.blind_high),
        ));
    }
    if args.bins == 0 {
        return Err(AppError::new(2, "`--bins` must be positive."));
    }
    if args.families.is_empty() {
        return Err(AppError::new(2, "At least one function family is required."));
    }
    if args.ftest_toys && args.n_toys == 0 {
        return Err(AppError::new(2, "`--ftest-toys` needs `--n-toys` > 0."));
    }
    if let Some(idx) = args.single_cat.filter(|i| *i >= args.categories.len()) {
        return Err(AppError::new(
            2,
            format!("`--single-cat {idx}` is out of range ({} categories).", args.categories.len()),
        ));
    }

    Ok(FtestConfig {
        input: args.input.clone(),
        out_dir: args.out_dir.clone(),
        categories: args.categories.clone(),
        single_category: args.single_cat,
        ext: args.ext.clone(),
        observable: Observable::new(args.observable.clone(), args.mass_low, args.mass_high),
        blind_window: BlindWindow {
            low: args.blind_low,
            high: args.blind_high,
        },
        blind: !args.unblind,
        bins: args.bins,
        families: args.families.clone(),
        ftest_toys: args.ftest_toys,
        n_toys: args.n_toys,
        toy_seed: args.seed,
        max_order: args.max_order,
        truth_threshold: args.truth_threshold,
        envelope_threshold: args.envelope_threshold,
        gof_threshold: args.gof_threshold,
        fit_retries: args.fit_retries,
        max_fit_iters: args.max_fit_iters,
        sum_w2_error: !args.no_sum_w2_error,
        penalty_factor: args.penalty_factor,
        plots: !args.no_plots,
        verbose: args.verbose,
    })
}
