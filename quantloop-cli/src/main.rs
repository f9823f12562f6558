//! Quantloop CLI: backtests, sharded sweeps, aggregation and the task loop.
//!
//! Commands:
//! - `backtest`: run one config and print its result as JSON
//! - `sweep`: run one shard of a sweep and write its report and results CSV
//! - `aggregate`: merge shard reports into a top-K best-parameters file
//! - `todo`: turn weak backtest results into backlog tasks
//! - `orchestrate`: work through the task backlog under the safety limits

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quantloop_core::data::Timeframe;
use quantloop_core::engine::ExecutionMode;
use quantloop_core::strategy::StrategySpec;
use quantloop_runner::aggregate::{aggregate, check_coverage, select_best, BestFilter, Objective};
use quantloop_runner::attempt_log::AttemptLog;
use quantloop_runner::collaborators::{CommandGenerator, CommandVerifier, GitWorkingTree};
use quantloop_runner::config::{ControlConfig, DataSettings, RunConfig, SourceKind, SweepConfig};
use quantloop_runner::export::{
    read_results_csv, read_shard_reports, shard_report_path, write_best_params,
    write_results_csv, write_shard_report, BestParams,
};
use quantloop_runner::grid::ParamGrid;
use quantloop_runner::loader::load_series;
use quantloop_runner::notify::{deliver, LogNotifier, NotificationSummary, Notifier};
use quantloop_runner::orchestrator::{
    Collaborators, FileSentinel, Orchestrator, SystemClock, Verifier,
};
use quantloop_runner::shard::ShardSpec;
use quantloop_runner::sweep::{RunOutcome, RunRecord, ShardRunner};
use quantloop_runner::task_sources::{load_junit, scan_code_markers};
use quantloop_runner::tasks::{backtest_alerts, TaskList, TaskStatus};

#[derive(Parser)]
#[command(
    name = "quantloop",
    about = "Quantloop: mean-reversion backtests, sharded sweeps and a bounded task loop"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where bars come from; shared by `backtest` and `sweep`.
#[derive(clap::Args)]
struct DataArgs {
    /// Trading pair, e.g. BTCUSDT.
    #[arg(long)]
    pair: Option<String>,

    /// Bar interval: 1m, 5m, 15m, 1h, 4h, 1d.
    #[arg(long)]
    timeframe: Option<Timeframe>,

    /// Directory holding `<PAIR>_<tf>.csv` files.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// First day to keep (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// Last day to keep (YYYY-MM-DD).
    #[arg(long)]
    end: Option<String>,

    /// Fail instead of falling back to synthetic bars when CSV data is missing.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

impl DataArgs {
    fn apply(&self, settings: &mut DataSettings) -> Result<()> {
        if let Some(pair) = &self.pair {
            settings.pair = pair.clone();
        }
        if let Some(tf) = self.timeframe {
            settings.timeframe = tf;
        }
        if let Some(dir) = &self.data_dir {
            settings.data_dir = dir.clone();
        }
        if let Some(start) = parse_date(self.start.as_deref())? {
            settings.start = Some(start);
        }
        if let Some(end) = parse_date(self.end.as_deref())? {
            settings.end = Some(end);
        }
        if self.strict {
            settings.fallback_to_synthetic = false;
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest and print the result as JSON.
    Backtest {
        /// Execution mode: close or onebar.
        #[arg(long, default_value = "close")]
        mode: ExecutionMode,

        /// Number of bars to load.
        #[arg(long, default_value_t = 500)]
        bars: usize,

        /// Fee per side as a fraction of notional.
        #[arg(long, default_value_t = 0.001)]
        fee: f64,

        /// Band half-width around the SMA.
        #[arg(long, default_value_t = 0.005)]
        threshold: f64,

        /// Seed for the synthetic walk.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// SMA window.
        #[arg(long, default_value_t = 20)]
        window: usize,

        /// Use the filtered strategy (z-score, ADX, ATR%, cooldown).
        #[arg(long, default_value_t = false)]
        optimized: bool,

        #[arg(long, default_value_t = 1.5)]
        zscore: f64,

        #[arg(long, default_value_t = 25.0)]
        adx_max: f64,

        #[arg(long, default_value_t = 0.003)]
        atr_min: f64,

        #[arg(long, default_value_t = 3)]
        cooldown: usize,

        /// Bar source: synthetic or csv.
        #[arg(long, default_value = "synthetic")]
        source: SourceKind,

        #[command(flatten)]
        data: DataArgs,

        /// Append the result row to this results CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Run one shard of a sweep.
    Sweep {
        /// Sweep TOML file. Defaults to the built-in grid.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use the optimizer grid (standard, soft fallback) instead of the config's grid.
        #[arg(long, default_value_t = false)]
        optimizer: bool,

        /// Shard to run, as `index/count`.
        #[arg(long, default_value = "0/1")]
        shard: ShardSpec,

        /// Bar source: synthetic or csv.
        #[arg(long, default_value = "synthetic")]
        source: SourceKind,

        #[command(flatten)]
        data: DataArgs,

        /// Output directory for the shard report and results CSV.
        #[arg(long, default_value = "results")]
        out: PathBuf,

        /// Run configs one at a time instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Merge shard reports and write the best parameters.
    Aggregate {
        /// Directory holding `shard_*.json` reports.
        #[arg(long, default_value = "results")]
        dir: PathBuf,

        /// Ranking objective: final-equity, pf, return-pct, win-rate, score.
        #[arg(long)]
        objective: Option<Objective>,

        #[arg(long)]
        top_k: Option<usize>,

        /// Sweep TOML the shards came from; supplies objective and top_k defaults.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Expected grid size, soft cells included; every index must be covered exactly once.
        #[arg(long)]
        grid_size: Option<usize>,

        /// Output path. Defaults to `<dir>/best_params.json`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Add backlog tasks for failing tests, weak results and code markers.
    Todo {
        #[arg(long, default_value = "results/results.csv")]
        results: PathBuf,

        #[arg(long, default_value = "TODO.md")]
        tasks: PathBuf,

        /// JUnit XML reports; missing files are skipped.
        #[arg(long, num_args = 1.., default_values = ["artifacts/tests/junit.xml", "reports/junit.xml"])]
        junit: Vec<PathBuf>,

        /// Source tree to scan for TODO/FIXME/NOTE markers.
        #[arg(long)]
        scan: Option<PathBuf>,
    },
    /// Work through pending tasks within the configured limits.
    ///
    /// Limits come from MAX_ITERATIONS, TASKS_PER_RUN, TIME_BUDGET_MIN and STOP_FILE.
    Orchestrate {
        /// Markdown task list.
        #[arg(long, default_value = "TODO.md")]
        tasks: PathBuf,

        /// Repository the proposed diffs apply to.
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Directory for per-task attempt logs.
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,

        /// Change generator command; prints a unified diff on stdout.
        #[arg(long, required = true, num_args = 1.., allow_hyphen_values = true)]
        generator: Vec<String>,

        /// Verification command, run in the repository. Defaults to `cargo test --workspace --quiet`.
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        verify: Option<Vec<String>>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            mode,
            bars,
            fee,
            threshold,
            seed,
            window,
            optimized,
            zscore,
            adx_max,
            atr_min,
            cooldown,
            source,
            data,
            csv,
        } => {
            let strategy = if optimized {
                StrategySpec::Optimized {
                    window,
                    zscore_threshold: zscore,
                    adx_max,
                    atr_pct_min: atr_min,
                    cooldown_bars: cooldown,
                }
            } else {
                StrategySpec::MeanReversion { window }
            };
            let config = RunConfig {
                mode,
                bars,
                fee,
                threshold,
                seed,
                strategy,
                source,
            };
            run_backtest_cmd(config, &data, csv.as_deref())
        }
        Commands::Sweep {
            config,
            optimizer,
            shard,
            source,
            data,
            out,
            sequential,
        } => run_sweep_cmd(config.as_deref(), optimizer, shard, source, &data, &out, sequential),
        Commands::Aggregate {
            dir,
            objective,
            top_k,
            config,
            grid_size,
            out,
        } => run_aggregate_cmd(&dir, objective, top_k, config.as_deref(), grid_size, out),
        Commands::Todo {
            results,
            tasks,
            junit,
            scan,
        } => run_todo_cmd(&results, &tasks, &junit, scan.as_deref()),
        Commands::Orchestrate {
            tasks,
            repo,
            log_dir,
            generator,
            verify,
        } => run_orchestrate_cmd(&tasks, &repo, &log_dir, generator, verify),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

fn parse_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
    })
    .transpose()
}

fn run_backtest_cmd(config: RunConfig, data: &DataArgs, csv: Option<&Path>) -> Result<()> {
    let mut settings = DataSettings::default();
    data.apply(&mut settings)?;

    let series = load_series(&settings, config.source, config.bars, config.seed)?;
    if series.fell_back {
        warn!("results are based on SYNTHETIC data");
    }
    info!(
        run_id = %config.run_id(),
        source = %series.source,
        bars = series.bars.len(),
        dataset = %series.dataset_hash,
        "running backtest"
    );

    let runner = ShardRunner::new(settings);
    let outcome = runner.run_config(&config, &series);
    let record = RunRecord {
        grid_index: 0,
        config,
        outcome,
    };

    match &record.outcome {
        RunOutcome::Ok(result) => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        RunOutcome::Failed { kind, message } => bail!("{kind}: {message}"),
    }

    if let Some(path) = csv {
        write_results_csv(path, std::slice::from_ref(&record), true)?;
        info!(path = %path.display(), "result appended");
    }
    Ok(())
}

fn run_sweep_cmd(
    config_path: Option<&Path>,
    optimizer: bool,
    shard: ShardSpec,
    source: SourceKind,
    data: &DataArgs,
    out: &Path,
    sequential: bool,
) -> Result<()> {
    let mut sweep = match config_path {
        Some(path) => SweepConfig::from_file(path)?,
        None => SweepConfig::default(),
    };
    if optimizer {
        sweep.grid = ParamGrid::optimizer_standard();
        sweep.soft = Some(ParamGrid::optimizer_soft());
    }
    data.apply(&mut sweep.data)?;

    let base = RunConfig {
        source,
        ..RunConfig::default()
    };
    let runner = ShardRunner::new(sweep.data.clone()).with_parallelism(!sequential);
    let report = runner.run_sweep_shard(&sweep, &base, shard)?;

    let report_path = shard_report_path(out, shard.index, shard.count);
    write_shard_report(&report_path, &report)?;
    let csv_path = out.join(format!("results_shard_{}_of_{}.csv", shard.index, shard.count));
    write_results_csv(&csv_path, &report.records, false)?;

    println!(
        "Shard {shard}: {} ok, {} failed, {} trades, {} soft-grid cells",
        report.succeeded(),
        report.failed(),
        report.total_trades(),
        report.soft_cells()
    );
    println!("Report: {}", report_path.display());
    println!("Results: {}", csv_path.display());
    Ok(())
}

fn run_aggregate_cmd(
    dir: &Path,
    objective: Option<Objective>,
    top_k: Option<usize>,
    config_path: Option<&Path>,
    grid_size: Option<usize>,
    out: Option<PathBuf>,
) -> Result<()> {
    let defaults = match config_path {
        Some(path) => SweepConfig::from_file(path)?.aggregate,
        None => Default::default(),
    };
    let objective = objective.unwrap_or(defaults.objective);
    let k = top_k.unwrap_or(defaults.top_k);

    let shards = read_shard_reports(dir)?;
    if shards.is_empty() {
        bail!("no shard reports found in {}", dir.display());
    }
    if let Some(n) = grid_size {
        check_coverage(&shards, n)?;
    }

    let agg = aggregate(&shards, objective, k)?;
    let best = select_best(&agg, &BestFilter::default());
    let artifact = BestParams::new(&agg, best);
    let out = out.unwrap_or_else(|| dir.join("best_params.json"));
    write_best_params(&out, &artifact)?;

    println!(
        "Aggregated {} shard(s): {} ok, {} failed{}",
        shards.len(),
        agg.succeeded,
        agg.failed,
        if agg.used_soft_grid { " (soft grid)" } else { "" }
    );
    for (rank, rec) in agg.top().iter().enumerate() {
        let value = rec
            .result()
            .and_then(|r| objective.extract(r))
            .map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
        println!(
            "{:>2}. #{:<5} {:<7} {:<20} {objective}={value}",
            rank + 1,
            rec.grid_index,
            rec.config.mode.as_str(),
            rec.config.strategy.id()
        );
    }
    match &artifact.best {
        Some(pick) => println!(
            "Best: #{} score={:.4}{}",
            pick.record.grid_index,
            pick.score,
            if pick.passed_filters { "" } else { " (no config passed the filters)" }
        ),
        None => println!("Best: none"),
    }
    println!("Written: {}", out.display());

    let run_id = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sweep".to_string());
    let summary = NotificationSummary::from_aggregate(run_id, &agg, Some(out));
    let notifiers: [&dyn Notifier; 1] = [&LogNotifier];
    deliver(&notifiers, &summary);
    Ok(())
}

fn run_todo_cmd(
    results: &Path,
    tasks_path: &Path,
    junit: &[PathBuf],
    scan: Option<&Path>,
) -> Result<()> {
    let mut candidates = Vec::new();
    for report in junit {
        candidates.extend(load_junit(report)?.iter().map(|f| f.task_text()));
    }
    if results.exists() {
        candidates.extend(backtest_alerts(&read_results_csv(results)?));
    } else {
        warn!(path = %results.display(), "results CSV not found, no backtest alerts");
    }
    if let Some(root) = scan {
        candidates.extend(scan_code_markers(root).iter().map(|m| m.task_text()));
    }

    let mut tasks = if tasks_path.exists() {
        TaskList::load(tasks_path)?
    } else {
        TaskList::parse("# Backlog\n")
    };

    let mut added = 0;
    for text in candidates {
        if tasks.push_pending(&text) {
            println!("+ {text}");
            added += 1;
        }
    }
    if added > 0 {
        tasks.save(tasks_path)?;
    }
    println!("{added} task(s) added to {}", tasks_path.display());
    Ok(())
}

fn run_orchestrate_cmd(
    tasks_path: &Path,
    repo: &Path,
    log_dir: &Path,
    generator: Vec<String>,
    verify: Option<Vec<String>>,
) -> Result<()> {
    let control = ControlConfig::from_env()?;
    let tasks = TaskList::load(tasks_path)?;
    info!(
        max_iterations = control.max_iterations,
        tasks_per_run = control.tasks_per_run,
        time_budget_min = control.time_budget_min,
        stop_file = %control.stop_file.display(),
        pending = tasks.count(TaskStatus::Pending),
        "orchestrator starting"
    );

    let Some((program, args)) = generator.split_first() else {
        bail!("--generator needs a program");
    };
    let mut generator = CommandGenerator::new(program.clone(), args.to_vec()).in_dir(repo);
    let mut tree = GitWorkingTree::new(repo);
    let mut verifier: Box<dyn Verifier> = match verify.as_deref() {
        Some([program, args @ ..]) => {
            Box::new(CommandVerifier::new(program.clone(), args.to_vec()).in_dir(repo))
        }
        _ => Box::new(CommandVerifier::workspace_tests(repo)),
    };
    let clock = SystemClock::start();
    let sentinel = FileSentinel::new(control.stop_file.clone());

    let mut orchestrator = Orchestrator::new(
        control,
        tasks,
        Collaborators {
            generator: &mut generator,
            tree: &mut tree,
            verifier: verifier.as_mut(),
            clock: &clock,
            sentinel: &sentinel,
        },
    )
    .with_task_file(tasks_path)
    .with_attempt_log(AttemptLog::new(log_dir));

    let summary = orchestrator.run()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let run_id = format!("orchestrate-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
    let notice = NotificationSummary::from_run_summary(run_id, &summary, Some(tasks_path.to_path_buf()));
    let notifiers: [&dyn Notifier; 1] = [&LogNotifier];
    deliver(&notifiers, &notice);
    Ok(())
}
