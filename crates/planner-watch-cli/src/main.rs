mod commands;
mod logging;
mod progress;
mod report;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use planner_watch_core::dates::{DateIndexSource, ExistingDateIndex, GapDetector, SummaryFileSource};
use planner_watch_core::digitizer::command::validate_command;
use planner_watch_core::digitizer::output::parse_date_str;
use planner_watch_core::{AppConfig, Coordinator, FolderWatcher, Notification};
use progress::CliReporter;
use report::{notification_sink, stdout_is_terminal, ConsoleSink};
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match planner_watch_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let outcome = match args.command {
        Some(Commands::Run { skip_existing }) => run_watch(&config, skip_existing),
        Some(Commands::Process { files }) => run_process(&config, files),
        Some(Commands::Gaps { dates }) => run_gaps(&config, &dates),
        Some(Commands::CheckEnv) => run_check_env(&config),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

fn run_watch(config: &AppConfig, skip_existing: bool) -> anyhow::Result<()> {
    let coordinator = Arc::new(
        Coordinator::from_config(config, notification_sink(stdout_is_terminal()))
            .context("building the processing pipeline")?,
    );
    if let Err(err) = coordinator.refresh_index() {
        warn!("Starting without existing dates: {}", err);
    }

    let watch = config.watch();
    let watcher = FolderWatcher::new(&watch, coordinator.batch_callback())
        .with_context(|| format!("watching {}", watch.folder.display()))?;

    info!(
        "Watching {} for {} (quiet period {}s)",
        format!("{}", watch.folder.display()).cyan(),
        watch.extensions.join(", "),
        watch.quiet_period.as_secs()
    );
    let startup_limit = (!skip_existing).then_some(config.max_startup_files);
    coordinator.start_watching(&watcher, startup_limit)?;

    // Batches run on the watcher's timer thread until the process is killed.
    loop {
        thread::park();
    }
}

fn run_process(config: &AppConfig, files: Vec<PathBuf>) -> anyhow::Result<()> {
    for file in &files {
        if !file.is_file() {
            bail!("Not a file: {}", file.display());
        }
    }

    let coordinator = Coordinator::from_config(config, Arc::new(ConsoleSink))?
        .with_reporter(Arc::new(CliReporter::new()));
    if let Err(err) = coordinator.refresh_index() {
        warn!("Processing without existing dates: {}", err);
    }

    let report = coordinator.handle_batch(files);

    println!();
    for (file, decision) in &report.decisions {
        let action = match decision.action.as_str() {
            "new" => decision.action.as_str().green(),
            "update" => decision.action.as_str().cyan(),
            _ => decision.action.as_str().yellow(),
        };
        println!("  {:<8} {} - {}", action, file.display(), decision.reason);
    }
    info!(
        "Batch handled in {}",
        format!("{:.2}s", report.elapsed.as_secs_f64()).green()
    );

    if let Some(err) = report.error {
        bail!(err);
    }
    Ok(())
}

fn run_gaps(config: &AppConfig, raw_dates: &[String]) -> anyhow::Result<()> {
    let dates = raw_dates
        .iter()
        .map(|raw| parse_date_str(raw).with_context(|| format!("Unrecognised date: {}", raw)))
        .collect::<anyhow::Result<Vec<NaiveDate>>>()?;

    let index = match &config.date_index {
        Some(index_config) => SummaryFileSource::from_config(index_config).load()?,
        None => ExistingDateIndex::new(),
    };
    info!("Comparing {} dates against {} existing", dates.len(), index.len());

    let gaps = GapDetector.detect(&dates, &index);
    if gaps.is_empty() {
        println!("{}", "No gaps found".green());
        return Ok(());
    }

    let report = Notification::GapReport {
        gaps,
        analyzed_dates: dates.len(),
    };
    println!("{}", report.headline().yellow());
    println!("{}", report.render());
    Ok(())
}

fn run_check_env(config: &AppConfig) -> anyhow::Result<()> {
    let mut issues = Vec::new();

    if let Err(err) = config.validate() {
        issues.push(err.to_string());
    }
    let folder = config.watch().folder;
    if !config.watch_folder.is_empty() && !folder.is_dir() {
        issues.push(format!("Watch folder not found: {}", folder.display()));
    }

    issues.extend(validate_command("extractor", &config.extractor));
    if let Some(uploader) = &config.uploader {
        issues.extend(validate_command("uploader", uploader));
    }
    if let Some(index) = &config.date_index {
        match &index.refresh_command {
            Some(command) => issues.extend(validate_command("date index query", command)),
            None if !index.summary_file.exists() => issues.push(format!(
                "Date summary file not found: {}",
                index.summary_file.display()
            )),
            None => {}
        }
    }

    if issues.is_empty() {
        println!("{} Environment looks good", "✓".green());
        println!(
            "  Watching {} for {} every {}s of quiet",
            folder.display(),
            config.supported_extensions.join(", "),
            config.quiet_period_secs
        );
        return Ok(());
    }

    for issue in &issues {
        println!("{} {}", "✗".red(), issue);
    }
    bail!("{} environment issue(s) found", issues.len());
}
