#![forbid(unsafe_code)]

use std::error::Error as _;

use clap::{Parser, Subcommand};
use dw_config::{Settings, MAX_WINDOW_HOURS};
use dw_core::{logging, ExitCode, Orchestrator, PipelineError, WarehouseOverview};

#[derive(Parser)]
#[command(name = "driftwatch")]
#[command(version, about = "Detection drift monitoring over warehouse telemetry")]
#[command(
    after_help = "Environment:\n  CLICKHOUSE_*             Warehouse connection\n  EVIDENTLY_*              Drift service connection\n  REFERENCE_*              Reference dataset selection\n  CURRENT_DAYS_AGO         Current window length in days\n  RUST_LOG                 Log filter (default info)\n  DRIFTWATCH_LOG_JSON      Emit JSON log lines"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the current window against the reference and print the report URL
    Run,
    /// Curate a reference dataset from the warehouse and print its id
    CreateReference,
    /// Print prediction totals and per-class counts
    Summary {
        /// Restrict class counts to the last N hours
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_HOURS))]
        hours: Option<i64>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate configuration and probe the warehouse
    Check {
        /// Print the effective settings (secrets omitted) as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                ExitCode::Failed
            } else {
                ExitCode::Clean
            };
            return std::process::ExitCode::from(code.as_i32() as u8);
        }
    };
    logging::init(logging::json_requested());

    let mut orchestrator = Orchestrator::connect(Settings::from_env());
    let code = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => finish(orchestrator.run(), |url| println!("{url}")),
        Commands::CreateReference => finish(orchestrator.create_reference(), |id| {
            println!("{id}");
            eprintln!("set REFERENCE_DATASET_ID={id} to use it for drift runs");
        }),
        Commands::Summary { hours, json } => {
            finish(orchestrator.summarize(hours), |overview| {
                print_overview(&overview, json)
            })
        }
        Commands::Check { json } => finish(orchestrator.check(), |()| {
            if !json {
                println!("ok");
                return;
            }
            match serde_json::to_string_pretty(orchestrator.settings()) {
                Ok(text) => println!("{text}"),
                Err(err) => eprintln!("error: cannot render settings: {err}"),
            }
        }),
    };
    std::process::ExitCode::from(code.as_i32() as u8)
}

fn finish<T>(result: Result<T, PipelineError>, on_success: impl FnOnce(T)) -> ExitCode {
    let code = ExitCode::from(&result);
    match result {
        Ok(value) => on_success(value),
        Err(err) => report(&err),
    }
    code
}

fn report(err: &PipelineError) {
    match err.configuration_issues() {
        Some(issues) => {
            eprintln!("error: invalid configuration ({} issue(s))", issues.len());
            for issue in issues {
                eprintln!("  - {issue}");
            }
        }
        None => {
            eprintln!("error: {err}");
            let mut cause = err.source.source();
            while let Some(inner) = cause {
                eprintln!("  caused by: {inner}");
                cause = inner.source();
            }
        }
    }
}

fn print_overview(overview: &WarehouseOverview, json: bool) {
    if json {
        match serde_json::to_string_pretty(overview) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("error: cannot render summary: {err}"),
        }
        return;
    }

    let summary = &overview.summary;
    println!("total predictions:   {}", summary.total_predictions);
    println!("unique predictions:  {}", summary.unique_predictions);
    if let (Some(first), Some(last)) = (summary.earliest_prediction, summary.latest_prediction) {
        println!("time range:          {first} .. {last}");
    }
    if let Some(avg) = summary.avg_processing_time {
        println!("avg processing time: {avg:.4}s");
    }
    println!();
    println!("{:<24} {:>8} {:>10}", "class", "count", "avg conf");
    for share in &overview.classes {
        let conf = share
            .avg_confidence
            .map(|c| format!("{c:.3}"))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<24} {:>8} {:>10}", share.class_name, share.count, conf);
    }
}
