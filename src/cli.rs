//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::ambiguity::AmbiguityPolicy;
use crate::domain::bar::BarSeries;
use crate::domain::batch::{self, Distribution, SweepParam};
use crate::domain::config::SimulationConfig;
use crate::domain::config_validation::{build_simulation_config, read_seed};
use crate::domain::engine::Simulator;
use crate::domain::error::SimError;
use crate::domain::metrics::Summary;
use crate::ports::data_port::BarSource;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "execsim", about = "Execution-aware trade simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate one run over a bar file
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        bars: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Seed for ambiguous-bar coin flips (overrides [simulation] seed)
        #[arg(long)]
        seed: Option<u64>,
        /// Override [exits] ambiguity
        #[arg(long)]
        ambiguity: Option<AmbiguityPolicy>,
    },
    /// Validate a configuration file and, optionally, a bar file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        bars: Option<PathBuf>,
    },
    /// Repeat a run with independently seeded coin flips
    MonteCarlo {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        bars: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, default_value_t = 1000)]
        trials: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// One run per value of a single parameter
    Sweep {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        bars: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        param: SweepParam,
        /// Comma-separated values, e.g. 1,2,5
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<f64>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            bars,
            output,
            seed,
            ambiguity,
        } => run_simulation(config.as_ref(), &bars, output.as_ref(), seed, ambiguity),
        Command::Validate { config, bars } => run_validate(&config, bars.as_ref()),
        Command::MonteCarlo {
            config,
            bars,
            output,
            trials,
            seed,
        } => run_monte_carlo(config.as_ref(), &bars, output.as_ref(), trials, seed),
        Command::Sweep {
            config,
            bars,
            output,
            param,
            values,
            seed,
        } => run_sweep(config.as_ref(), &bars, output.as_ref(), param, &values, seed),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SimError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Validated config plus the configured seed; defaults when no file is given.
fn load_settings(path: Option<&PathBuf>) -> Result<(SimulationConfig, Option<u64>), ExitCode> {
    let Some(path) = path else {
        return Ok((SimulationConfig::default(), None));
    };
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    let settings = build_simulation_config(&adapter).and_then(|c| Ok((c, read_seed(&adapter)?)));
    settings.map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn load_bars(path: &PathBuf) -> Result<BarSeries, ExitCode> {
    eprintln!("Loading bars from {}", path.display());
    CsvAdapter::new(path.clone()).load_bars().map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn resolve_seed(flag: Option<u64>, configured: Option<u64>) -> u64 {
    flag.or(configured).unwrap_or_else(|| {
        let seed = rand::random::<u64>();
        tracing::info!(seed, "no seed configured, drew one");
        seed
    })
}

fn run_simulation(
    config_path: Option<&PathBuf>,
    bars_path: &PathBuf,
    output_path: Option<&PathBuf>,
    seed: Option<u64>,
    ambiguity: Option<AmbiguityPolicy>,
) -> ExitCode {
    // Stage 1: Load config and bars
    let (mut config, configured_seed) = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if let Some(policy) = ambiguity {
        config.ambiguity = policy;
    }
    let series = match load_bars(bars_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let seed = resolve_seed(seed, configured_seed);

    // Stage 2: Simulate
    eprintln!(
        "Simulating {} bars (ambiguity: {}, seed: {})",
        series.len(),
        config.ambiguity,
        seed
    );
    let result = match Simulator::new(config.clone(), StdRng::seed_from_u64(seed))
        .and_then(|sim| sim.run(&series))
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let summary = Summary::compute(&result.ledger, &config);

    // Stage 3: Print console summary to stderr
    eprintln!("\n=== Results ===");
    eprintln!("Final Balance:    {:.2}", summary.final_balance);
    eprintln!("Total Return:     {:.2}%", summary.total_return * 100.0);
    eprintln!("Max Drawdown:     -{:.1}%", summary.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", summary.total_trades);
    eprintln!(
        "Wins / Losses:    {} / {} ({} ambiguous)",
        summary.wins, summary.losses, summary.ambiguous
    );
    eprintln!("Win Rate:         {:.1}%", summary.win_rate * 100.0);
    eprintln!("Ambiguity Rate:   {:.1}%", summary.ambiguity_rate * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", summary.sharpe_ratio);
    if config.periods_per_year.is_some() {
        eprintln!("Annualized:       {:.2}", summary.annualized_sharpe);
    }
    if let Some(open) = &result.open_position {
        eprintln!(
            "Open position:    {} from bar {} at {:.4}",
            open.direction, open.entry_index, open.entry_price
        );
    }
    if let Some(pending) = &result.pending_entry {
        eprintln!(
            "Pending entry:    {} at {:.4} (signal bar {})",
            pending.direction, pending.trigger_price, pending.signal_index
        );
    }
    if !result.diagnostics.is_empty() {
        eprintln!("\n{} signal(s) skipped:", result.diagnostics.len());
        for diagnostic in &result.diagnostics {
            eprintln!("  {diagnostic}");
        }
    }

    // Stage 4: Write reports
    if let Some(dir) = output_path {
        let reporter = CsvReportAdapter::new(dir);
        if let Err(e) = reporter.write_run(&result, &summary) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("\nReports written to {}", reporter.dir().display());
    }

    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf, bars_path: Option<&PathBuf>) -> ExitCode {
    let (config, seed) = match load_settings(Some(config_path)) {
        Ok(s) => s,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");
    eprintln!("  initial_balance:    {}", config.initial_balance);
    eprintln!("  leverage:           {}", config.leverage);
    eprintln!("  fee_rate:           {}", config.fee_rate);
    eprintln!("  trigger_multiplier: {}", config.trigger_multiplier);
    eprintln!("  max_wait_bars:      {}", config.max_wait_bars);
    eprintln!("  levels:             {:?}", config.level_policy());
    eprintln!("  ambiguity:          {}", config.ambiguity);
    if let Some(seed) = seed {
        eprintln!("  seed:               {seed}");
    }

    if let Some(path) = bars_path {
        let series = match load_bars(path) {
            Ok(s) => s,
            Err(code) => return code,
        };
        let missing_vol = series.iter().filter(|b| b.volatility.is_none()).count();
        let missing_atr = series.iter().filter(|b| b.atr.is_none()).count();
        let signals = series.iter().filter(|b| b.signal.direction().is_some()).count();
        eprintln!(
            "Bars validated: {} bars, {} signals, {} without volatility, {} without ATR",
            series.len(),
            signals,
            missing_vol,
            missing_atr
        );
        if config.uses_limit_entries() && missing_vol > 0 {
            eprintln!("Warning: signals on bars without volatility will be skipped");
        }
        if config.level_policy().needs_atr() && missing_atr > 0 {
            eprintln!("Warning: entries on bars without ATR will be skipped");
        }
    }
    ExitCode::SUCCESS
}

fn print_distribution(name: &str, d: &Distribution) {
    eprintln!(
        "{name:<16}min {:>10.4}  p05 {:>10.4}  median {:>10.4}  mean {:>10.4}  p95 {:>10.4}  max {:>10.4}",
        d.min, d.p05, d.median, d.mean, d.p95, d.max
    );
}

fn run_monte_carlo(
    config_path: Option<&PathBuf>,
    bars_path: &PathBuf,
    output_path: Option<&PathBuf>,
    trials: usize,
    seed: Option<u64>,
) -> ExitCode {
    let (config, configured_seed) = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let series = match load_bars(bars_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let seed = resolve_seed(seed, configured_seed);

    eprintln!("Running {trials} trials over {} bars (master seed {seed})", series.len());
    let report = match batch::monte_carlo(&series, &config, trials, seed) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\n=== Monte Carlo ===");
    print_distribution("Final Balance", &report.final_balance);
    print_distribution("Max Drawdown", &report.max_drawdown);
    print_distribution("Ambiguous", &report.ambiguous);
    print_distribution("Sharpe Ratio", &report.sharpe);

    if let Some(dir) = output_path {
        let reporter = CsvReportAdapter::new(dir);
        if let Err(e) = reporter.write_monte_carlo(&report) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("\nReports written to {}", reporter.dir().display());
    }
    ExitCode::SUCCESS
}

fn run_sweep(
    config_path: Option<&PathBuf>,
    bars_path: &PathBuf,
    output_path: Option<&PathBuf>,
    param: SweepParam,
    values: &[f64],
    seed: Option<u64>,
) -> ExitCode {
    let (config, configured_seed) = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let series = match load_bars(bars_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let seed = resolve_seed(seed, configured_seed);

    eprintln!("Sweeping {param} over {} values (seed {seed})", values.len());
    let points = match batch::sweep(&series, &config, param, values, seed) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!(
        "\n{:>12}  {:>12}  {:>8}  {:>6}  {:>9}  {:>7}",
        param.name(),
        "balance",
        "max dd",
        "trades",
        "ambiguous",
        "sharpe"
    );
    for p in &points {
        eprintln!(
            "{:>12}  {:>12.2}  {:>7.1}%  {:>6}  {:>9}  {:>7.2}",
            p.value,
            p.summary.final_balance,
            p.summary.max_drawdown * 100.0,
            p.summary.total_trades,
            p.summary.ambiguous,
            p.summary.sharpe_ratio
        );
    }

    if let Some(dir) = output_path {
        let reporter = CsvReportAdapter::new(dir);
        if let Err(e) = reporter.write_sweep(param.name(), &points) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("\nReports written to {}", reporter.dir().display());
    }
    ExitCode::SUCCESS
}
