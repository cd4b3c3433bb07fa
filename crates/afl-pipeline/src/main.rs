//! afl-pipeline - main entry point

use afl_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use afl_pipeline::backend::build_pipeline;
use afl_pipeline::{BatchReport, Cli, CombinedOutcome, Commands, PipelineConfig, ProcessingOutcome};
use anyhow::Context;
use clap::Parser;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = cli.command.as_ref() else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .build()
        .merge_env()
        .unwrap_or_else(|_| LogConfig::builder().level(level).build());

    // Keep running without logs rather than refusing to work
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    match execute_command(&cli, command).await {
        Ok(true) => {},
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            process::exit(1);
        },
    }
}

/// Returns whether the command achieved anything
async fn execute_command(cli: &Cli, command: &Commands) -> anyhow::Result<bool> {
    let config = PipelineConfig::load().context("Failed to load configuration")?;
    let pipeline = build_pipeline(&config, cli.backend)
        .await
        .context("Failed to initialize pipeline")?;

    match command {
        Commands::Run {
            years,
            sample,
            skip_upload,
            no_combined,
        } => {
            let report = pipeline
                .run_pipeline(years, *sample, *skip_upload, !*no_combined)
                .await;
            print_report(&report);
            Ok(!report.successful_years().is_empty())
        },
        Commands::Year {
            year,
            sample,
            skip_upload,
        } => {
            let outcome = pipeline.process_year(*year, *sample, *skip_upload).await;
            print_outcome(*year, &outcome);
            Ok(outcome.is_success())
        },
        Commands::Combine { years } => match pipeline.combine(years).await {
            CombinedOutcome::Created { table } => {
                println!("Combined table: {}", table);
                Ok(true)
            },
            other => {
                print_combined(&other);
                Ok(false)
            },
        },
    }
}

fn print_outcome(year: i32, outcome: &ProcessingOutcome) {
    match outcome {
        ProcessingOutcome::Succeeded { table } => println!("  {}  ok      {}", year, table),
        _ => {
            let detail = outcome
                .failure()
                .map(ToString::to_string)
                .unwrap_or_default();
            println!("  {}  {:<16} {}", year, outcome.as_str(), detail);
        },
    }
}

fn print_combined(combined: &CombinedOutcome) {
    match combined {
        CombinedOutcome::NotRequested => println!("Combined table: not requested"),
        CombinedOutcome::Skipped => println!("Combined table: skipped (no successful years)"),
        CombinedOutcome::Created { table } => println!("Combined table: {}", table),
        CombinedOutcome::Failed(detail) => println!("Combined table: failed {}", detail),
    }
}

fn print_report(report: &BatchReport) {
    println!("Pipeline summary ({:.1}s)", report.duration.as_secs_f64());
    for year in &report.outcomes {
        print_outcome(year.year, &year.outcome);
    }
    println!(
        "Successfully processed {} of {} years: {:?}",
        report.successful_years().len(),
        report.outcomes.len(),
        report.successful_years()
    );
    print_combined(&report.combined);
}
