#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use lasso_select::config::WorkflowConfig;
use lasso_select::model::Model;
use lasso_select::report::{render_evaluations, render_model, render_probes, write_evaluations_csv};
use lasso_select::workflow::{WorkflowError, prepare, run_grid_search, run_sparsity_search};

#[derive(Args)]
pub struct RunArgs {
    /// Delimited sales file with a header row
    #[arg(value_name = "DATA")]
    pub data: PathBuf,

    /// Workflow configuration (.toml); defaults apply when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seed for the training / validation / test split
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Also write the per-penalty evaluation table to this CSV file
    #[arg(long, value_name = "CSV")]
    pub table_out: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "lasso-select",
    about = "Choose an L1 penalty for housing-price regression",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pick the penalty with the lowest validation RSS
    #[command(about = "Validation grid search over L1 penalties")]
    Grid(RunArgs),

    /// Pick the best penalty that leaves an exact number of nonzero coefficients
    #[command(about = "Bracketing plus refinement for a target sparsity")]
    Sparsity {
        #[command(flatten)]
        run: RunArgs,

        /// Required nonzero coefficients, intercept included
        #[arg(long, value_name = "N")]
        target_nonzeros: Option<usize>,
    },

    /// Write the default configuration to a file
    #[command(about = "Write the default configuration (outputs: FILE)")]
    InitConfig {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Grid(run)) => run_grid(run),
        Some(Commands::Sparsity {
            run,
            target_nonzeros,
        }) => run_sparsity(run, target_nonzeros),
        Some(Commands::InitConfig { path }) => init_config(path),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| WorkflowError::Config(e.into())),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Reads the configuration file (or the defaults) and applies flag overrides.
fn load_config(
    run: &RunArgs,
    target_nonzeros: Option<usize>,
) -> Result<WorkflowConfig, WorkflowError> {
    let mut config = match &run.config {
        Some(path) => {
            log::info!("Reading configuration from '{}'", path.display());
            WorkflowConfig::load(path)?
        }
        None => WorkflowConfig::default(),
    };
    if let Some(seed) = run.seed {
        config.split.seed = seed;
    }
    if let Some(target) = target_nonzeros {
        config.sparsity.target_nonzeros = target;
    }
    config.validate()?;
    Ok(config)
}

fn print_model(model: &Model, nonzero_only: bool) {
    println!("{}", render_model(model, nonzero_only));
}

fn run_grid(run: RunArgs) -> Result<(), WorkflowError> {
    let config = load_config(&run, None)?;
    let data = prepare(&config, &run.data)?;
    let outcome = run_grid_search(&config.solver, &config, &data)?;

    println!("{}", render_evaluations(&outcome.report.evaluations));
    if let Some(path) = &run.table_out {
        write_evaluations_csv(path, &outcome.report.evaluations)?;
    }

    println!(
        "Best l1_penalty: {:.6e} (validation RSS {:.6e})",
        outcome.report.best.penalty, outcome.report.best.rss
    );
    println!("Test RSS: {:.6e}", outcome.test_rss);
    println!(
        "Nonzero coefficients: {}",
        outcome.report.model.nonzero_count()
    );
    print_model(&outcome.report.model, false);
    Ok(())
}

fn run_sparsity(run: RunArgs, target_nonzeros: Option<usize>) -> Result<(), WorkflowError> {
    let config = load_config(&run, target_nonzeros)?;
    let data = prepare(&config, &run.data)?;
    let outcome = run_sparsity_search(&config.solver, &config, &data)?;
    let bracket = &outcome.report.bracket;
    let selection = &outcome.report.selection;

    println!("{}", render_probes(&bracket.probes));
    if !bracket.monotone {
        println!("Warning: nonzero counts were not monotone across the coarse sweep.");
    }
    println!(
        "Bracket: [{:.6e}, {:.6e}]",
        bracket.penalty_min, bracket.penalty_max
    );
    println!("{}", render_evaluations(&selection.evaluations));
    if let Some(path) = &run.table_out {
        write_evaluations_csv(path, &selection.evaluations)?;
    }

    println!(
        "Selected l1_penalty: {:.6e} (validation RSS {:.6e}, {} nonzero coefficients)",
        selection.penalty,
        selection.rss,
        selection.model.nonzero_count()
    );
    println!("Test RSS: {:.6e}", outcome.test_rss);
    print_model(&selection.model, true);
    Ok(())
}

fn init_config(path: PathBuf) -> Result<(), WorkflowError> {
    WorkflowConfig::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
