//! Adaptive Sequential Testing Core - CLI
//!
//! The main entry point for seq-core, handling:
//! - Local and global design analyses of an observed trial history
//! - Working-test construction
//! - Conditional power and sample-size planning
//! - Exact inference after a terminal decision

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use seq_common::{format_error_human, Error, OutputFormat, Result, StructuredError};
use seq_core::config::NumericsConfig;
use seq_core::design::{
    compute_power, compute_sample_size, AnalysisOptions, AnalysisReport, DesignKind, GlobalDesign,
    History, LocalDesign, NextLook, PowerReport, SampleSizeReport, WorkingTest, WorkingTestSpec,
};
use seq_core::exit_codes::ExitCode;
use seq_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogFormat, LogLevel, Stage,
};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Adaptive Sequential Testing Core - conditional-error designs for group-sequential trials
#[derive(Parser)]
#[command(name = "seq-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Numerics configuration file (.toml or .json)
    #[arg(long, global = true, env = "SEQ_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a trial history with the local design
    Local(LocalArgs),

    /// Build and describe a working test
    WorkingTest(WorkingTestArgs),

    /// Analyze a trial history with the global design
    Global(GlobalArgs),

    /// Final information needed to reach a target power
    SampleSize(SampleSizeArgs),

    /// Power at a planned final analysis
    Power(PowerArgs),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Local(_) => "local",
            Commands::WorkingTest(_) => "working-test",
            Commands::Global(_) => "global",
            Commands::SampleSize(_) => "sample-size",
            Commands::Power(_) => "power",
        }
    }
}

// ============================================================================
// Command argument structs
// ============================================================================

/// Observed analyses, as comma-separated lists.
#[derive(Args, Debug)]
struct HistoryArgs {
    /// Information times of the analyses so far
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    times: Vec<f64>,

    /// Score statistics at those times
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    stats: Vec<f64>,

    /// Working-clock times (global design; default: the information times)
    #[arg(long, value_delimiter = ',')]
    costs: Option<Vec<f64>>,
}

impl HistoryArgs {
    fn history(&self) -> Result<History> {
        History::with_costs(&self.times, &self.stats, self.costs.as_deref())
    }
}

#[derive(Args, Debug)]
struct LocalArgs {
    /// Overall one-sided significance level
    #[arg(long)]
    alpha: f64,

    /// Design drift of the working SPRT
    #[arg(long)]
    effect: f64,

    /// Information times of the analyses so far
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    times: Vec<f64>,

    /// Score statistics at those times
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    stats: Vec<f64>,

    /// The last analysis is the final one
    #[arg(long = "final")]
    final_analysis: bool,

    /// Exact p-value and confidence limits after a terminal decision
    #[arg(long)]
    estimate: bool,
}

#[derive(Args, Debug)]
struct WorkingTestArgs {
    /// Overall one-sided significance level
    #[arg(long)]
    alpha: f64,

    /// Type II error the working test is designed for
    #[arg(long, default_value_t = 0.2)]
    beta: f64,

    /// Design drift of the working test
    #[arg(long)]
    effect: f64,

    /// Loss of a Type I error (default: calibrated to alpha)
    #[arg(long = "cost-type1")]
    cost_type1: Option<f64>,

    /// Loss of accepting at the last analysis (default: fixed-sample information)
    #[arg(long = "cost-type2")]
    cost_type2: Option<f64>,
}

impl WorkingTestArgs {
    fn spec(&self) -> WorkingTestSpec {
        let spec = WorkingTestSpec::new(self.alpha, self.beta, self.effect)
            .with_cost_type_1_err(self.cost_type1.unwrap_or(0.0));
        match self.cost_type2 {
            Some(c2) => spec.with_cost_type_2_err(c2),
            None => spec,
        }
    }
}

#[derive(Args, Debug)]
struct GlobalArgs {
    #[command(flatten)]
    working: WorkingTestArgs,

    #[command(flatten)]
    history: HistoryArgs,

    /// The last analysis is the final one
    #[arg(long = "final")]
    final_analysis: bool,

    /// Exact p-value and confidence limits after a terminal decision
    #[arg(long)]
    estimate: bool,
}

/// Design and history shared by the planning commands.
#[derive(Args, Debug)]
struct PlanArgs {
    /// Engine to plan with
    #[arg(long, value_enum, default_value_t = DesignKind::Local)]
    design: DesignKind,

    #[command(flatten)]
    working: WorkingTestArgs,

    #[command(flatten)]
    history: HistoryArgs,

    /// Drift under which power is evaluated
    #[arg(long)]
    alternative: f64,

    /// Information time of one more planned interim analysis
    #[arg(long)]
    next_time: Option<f64>,

    /// Working-clock time of the planned interim analysis
    #[arg(long, requires = "next_time")]
    next_cost: Option<f64>,
}

impl PlanArgs {
    fn next_look(&self) -> Option<NextLook> {
        self.next_time.map(|time| NextLook {
            time,
            cost: self.next_cost,
        })
    }
}

#[derive(Args, Debug)]
struct SampleSizeArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Target power
    #[arg(long)]
    power: f64,
}

#[derive(Args, Debug)]
struct PowerArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Information time of the final analysis
    #[arg(long)]
    final_time: f64,
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if err.use_stderr() {
                let _ = err.print();
                std::process::exit(ExitCode::ArgsError.as_i32());
            }
            err.exit();
        }
    };

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        LogFormat::for_output(cli.global.format.is_machine_readable()),
    );
    init_logging(&log_config);

    let run_id = generate_run_id();
    let span = tracing::info_span!("run", run_id = %run_id, command = cli.command.name());
    let _guard = span.enter();
    tracing::info!(
        event = event_names::RUN_STARTED,
        stage = %Stage::Init,
        "starting {} command",
        cli.command.name()
    );

    let exit_code = match execute(&cli, &run_id) {
        Ok(code) => code,
        Err(err) => {
            report_error(&cli.global, &err);
            ExitCode::from_error(&err)
        }
    };

    tracing::info!(
        event = event_names::RUN_FINISHED,
        stage = %Stage::Init,
        exit_code = exit_code.as_i32(),
        "finished with {}",
        exit_code
    );
    std::process::exit(exit_code.as_i32());
}

fn execute(cli: &Cli, run_id: &str) -> Result<ExitCode> {
    let numerics = NumericsConfig::resolve(cli.global.config.as_deref())?;
    tracing::debug!(
        event = event_names::CONFIG_LOADED,
        stage = %Stage::Init,
        path = ?cli.global.config,
        simpson_div = numerics.simpson_div,
        max_iter = numerics.max_iter,
        "numerics configuration loaded"
    );

    let out = Output {
        format: cli.global.format,
        run_id,
        command: cli.command.name(),
    };
    match &cli.command {
        Commands::Local(args) => run_local(&out, args, numerics),
        Commands::WorkingTest(args) => run_working_test(&out, args, numerics),
        Commands::Global(args) => run_global(&out, args, numerics),
        Commands::SampleSize(args) => run_sample_size(&out, args, numerics),
        Commands::Power(args) => run_power(&out, args, numerics),
    }
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_local(out: &Output<'_>, args: &LocalArgs, numerics: NumericsConfig) -> Result<ExitCode> {
    let design = LocalDesign::new(args.alpha, args.effect, numerics)?;
    let report = design.analyze(
        &args.times,
        &args.stats,
        AnalysisOptions {
            final_analysis: args.final_analysis,
            estimate: args.estimate,
        },
    )?;
    out.emit(&report, || analysis_summary(&report))?;
    Ok(ExitCode::from_decision(report.decision))
}

fn run_working_test(
    out: &Output<'_>,
    args: &WorkingTestArgs,
    numerics: NumericsConfig,
) -> Result<ExitCode> {
    let working = WorkingTest::build(&args.spec(), &numerics)?;
    out.emit(&working, || working_test_summary(&working))?;
    Ok(ExitCode::Continue)
}

fn run_global(out: &Output<'_>, args: &GlobalArgs, numerics: NumericsConfig) -> Result<ExitCode> {
    let working = WorkingTest::build(&args.working.spec(), &numerics)?;
    let design = GlobalDesign::new(&working, numerics);
    let report = design.analyze(
        &args.history.times,
        &args.history.stats,
        args.history.costs.as_deref(),
        AnalysisOptions {
            final_analysis: args.final_analysis,
            estimate: args.estimate,
        },
    )?;
    out.emit(&report, || analysis_summary(&report))?;
    Ok(ExitCode::from_decision(report.decision))
}

fn run_sample_size(
    out: &Output<'_>,
    args: &SampleSizeArgs,
    numerics: NumericsConfig,
) -> Result<ExitCode> {
    let plan = &args.plan;
    let history = plan.history.history()?;
    let report = match plan.design {
        DesignKind::Local => {
            let design = LocalDesign::new(plan.working.alpha, plan.working.effect, numerics)?;
            compute_sample_size(&design, &history, plan.alternative, args.power, plan.next_look())?
        }
        DesignKind::Global => {
            let working = WorkingTest::build(&plan.working.spec(), &numerics)?;
            let design = GlobalDesign::new(&working, numerics);
            compute_sample_size(&design, &history, plan.alternative, args.power, plan.next_look())?
        }
    };
    out.emit(&report, || sample_size_summary(&report))?;
    Ok(ExitCode::Continue)
}

fn run_power(out: &Output<'_>, args: &PowerArgs, numerics: NumericsConfig) -> Result<ExitCode> {
    let plan = &args.plan;
    let history = plan.history.history()?;
    let report = match plan.design {
        DesignKind::Local => {
            let design = LocalDesign::new(plan.working.alpha, plan.working.effect, numerics)?;
            compute_power(&design, &history, plan.alternative, args.final_time, plan.next_look())?
        }
        DesignKind::Global => {
            let working = WorkingTest::build(&plan.working.spec(), &numerics)?;
            let design = GlobalDesign::new(&working, numerics);
            compute_power(&design, &history, plan.alternative, args.final_time, plan.next_look())?
        }
    };
    out.emit(&report, || power_summary(&report))?;
    Ok(ExitCode::Continue)
}

// ============================================================================
// Output helpers
// ============================================================================

struct Output<'a> {
    format: OutputFormat,
    run_id: &'a str,
    command: &'static str,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    run_id: &'a str,
    command: &'a str,
    result: &'a T,
}

impl Output<'_> {
    /// Write the result payload to stdout.
    fn emit<T, F>(&self, result: &T, summary: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce() -> String,
    {
        match self.format {
            OutputFormat::Json => {
                let envelope = Envelope {
                    run_id: self.run_id,
                    command: self.command,
                    result,
                };
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            }
            OutputFormat::Summary => {
                println!("[{}] {}", self.run_id, self.command);
                println!("{}", summary());
            }
        }
        Ok(())
    }
}

fn report_error(global: &GlobalOpts, err: &Error) {
    match global.format {
        OutputFormat::Json => eprintln!("{}", StructuredError::from(err).to_json()),
        OutputFormat::Summary => {
            eprintln!("{}", format_error_human(err, std::io::stderr().is_terminal()))
        }
    }
}

fn analysis_summary(report: &AnalysisReport) -> String {
    let mut lines = vec![format!(
        "{:>8} {:>10} {:>10} {:>10} {:>12}  {}",
        "analysis", "time", "stat", "boundary", "cond_error", "decision"
    )];
    for (i, stage) in report.stages.iter().enumerate() {
        match stage {
            Some(r) => lines.push(format!(
                "{:>8} {:>10.4} {:>10.4} {:>10.4} {:>12.6}  {}",
                r.analysis, r.time, r.stat, r.boundary, r.cond_error, r.decision
            )),
            None => lines.push(format!("{:>8} {:>10}", i + 1, "-")),
        }
    }
    lines.push(format!("decision: {}", report.decision));
    if let Some(est) = &report.estimate {
        lines.push(format!(
            "p-value: {:.6}  estimate: {:.4}  {:.0}% CI: [{:.4}, {:.4}]",
            est.p_value,
            est.median_unbiased,
            100.0 * est.coverage,
            est.lower_limit,
            est.upper_limit
        ));
    }
    lines.join("\n")
}

fn working_test_summary(working: &WorkingTest) -> String {
    let mut lines = vec![format!(
        "{:>8} {:>10} {:>10} {:>12}",
        "analysis", "info", "boundary", "null_spend"
    )];
    for (i, ((s, u), p)) in working
        .schedule()
        .iter()
        .zip(working.boundaries())
        .zip(working.null_spending())
        .enumerate()
    {
        lines.push(format!("{:>8} {:>10.4} {:>10.4} {:>12.6}", i + 1, s, u, p));
    }
    lines.push(format!(
        "size: {:.6}  power: {:.4}  c1: {:.4}  c2: {:.4}",
        working.size(),
        working.power(),
        working.cost_type_1_err(),
        working.cost_type_2_err()
    ));
    lines.join("\n")
}

fn sample_size_summary(report: &SampleSizeReport) -> String {
    let mut line = format!(
        "final time: {:.4} (remaining {:.4})  power: {:.4}",
        report.final_time, report.remaining_information, report.achieved_power
    );
    if report.overpowered {
        line.push_str("  [target met without further information]");
    }
    line
}

fn power_summary(report: &PowerReport) -> String {
    match report.interim_power {
        Some(interim) => format!(
            "power at {:.4}: {:.4} (interim {:.4})",
            report.final_time, report.power, interim
        ),
        None => format!("power at {:.4}: {:.4}", report.final_time, report.power),
    }
}
