//! tq - priority task queue
//!
//! CLI entry point for probing item lists and exercising the scheduler.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result, bail};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use taskqueue::cli::{Cli, Command, OutputFormat, QueueArgs};
use taskqueue::config::Config;
use taskqueue::domain::Priority;
use taskqueue::queue::{QueueStats, TaskOptions, TaskQueue};
use taskqueue::status::{ContextHandle, HttpProbe, StatusBoard, StatusReport, ViewContext, WatchItem};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskqueue")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("tq.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Probe {
            file,
            priority,
            backend,
            workspace,
            format,
            queue,
        }) => {
            let priority = priority.unwrap_or(config.probe.default_priority);
            let context = ViewContext {
                workspace: workspace.or_else(|| config.probe.workspace.clone()),
                backend: backend.or_else(|| config.probe.backend.clone()),
                filter: String::new(),
            };
            cmd_probe(&config, &file, priority, context, &queue, format).await
        }
        Some(Command::Simulate {
            count,
            min_ms,
            max_ms,
            fail_rate,
            format,
            queue,
        }) => {
            let plan = SimulationPlan {
                count,
                min_ms,
                max_ms,
                fail_rate,
            };
            cmd_simulate(&config, &plan, &queue, format).await
        }
        Some(Command::Config) => cmd_config(&config),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

fn read_items(path: &Path) -> Result<Vec<WatchItem>> {
    debug!(?path, "read_items: called");
    let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    let items: Vec<WatchItem> = content.lines().filter_map(WatchItem::parse_line).collect();
    debug!(count = items.len(), "read_items: parsed items");
    Ok(items)
}

/// Probe every item in a file through the queue
async fn cmd_probe(
    config: &Config,
    file: &Path,
    priority: Priority,
    context: ViewContext,
    queue: &QueueArgs,
    format: OutputFormat,
) -> Result<()> {
    debug!(?file, %priority, ?context, "cmd_probe: called");
    let items = read_items(file)?;
    if items.is_empty() {
        bail!("No items found in {}", file.display());
    }

    let probe = HttpProbe::new(config.probe.timeout(), &config.probe.user_agent).context("Failed to build HTTP client")?;
    let queue_config = queue.apply(config.queue.clone());
    let board = StatusBoard::new(queue_config, Arc::new(probe), ContextHandle::new(context))
        .context("Invalid queue configuration")?;

    let submitted = board.refresh(&items, priority).await;
    info!(submitted, total = items.len(), "cmd_probe: items submitted");
    board.wait().await;

    let reports = board.reports();
    let stats = board.queue().stats().await;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "reports": reports,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
            println!();
            print_stats(&stats);
        }
    }

    Ok(())
}

fn print_report(report: &StatusReport) {
    let icon = if report.is_healthy() {
        "✓".green()
    } else {
        "✗".red()
    };
    match (&report.status, &report.error) {
        (Some(status), _) => println!(
            "{} {} {:>3} {:>6}ms",
            icon,
            format!("{:<30}", report.key).cyan(),
            status.code,
            status.latency_ms
        ),
        (None, Some(error)) => println!("{} {} {}", icon, format!("{:<30}", report.key).cyan(), error.dimmed()),
        (None, None) => println!("{} {}", icon, report.key.cyan()),
    }
}

fn print_stats(stats: &QueueStats) {
    println!(
        "{} started, {} succeeded, {} failed, peak concurrency {}",
        stats.total_started,
        stats.total_succeeded.to_string().green(),
        stats.total_failed.to_string().red(),
        stats.peak_concurrent
    );
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Shape of the synthetic workload
struct SimulationPlan {
    count: usize,
    min_ms: u64,
    max_ms: u64,
    fail_rate: f64,
}

/// One synthetic task as observed by the caller
#[derive(Debug, Serialize)]
struct SimulatedTask {
    index: usize,
    priority: Priority,
    duration_ms: u64,
    started_ms: Option<u64>,
    succeeded: bool,
}

/// Submit synthetic tasks and report when each one started
async fn cmd_simulate(config: &Config, plan: &SimulationPlan, queue: &QueueArgs, format: OutputFormat) -> Result<()> {
    debug!(count = plan.count, "cmd_simulate: called");
    if plan.min_ms > plan.max_ms {
        bail!("--min-ms ({}) must not exceed --max-ms ({})", plan.min_ms, plan.max_ms);
    }
    if !(0.0..=1.0).contains(&plan.fail_rate) {
        bail!("--fail-rate must be between 0 and 1, got {}", plan.fail_rate);
    }

    let workload: Vec<(Priority, u64, bool)> = {
        let mut rng = rand::rng();
        let levels = [Priority::Low, Priority::Normal, Priority::High, Priority::Critical];
        (0..plan.count)
            .map(|_| {
                let priority = levels.choose(&mut rng).copied().unwrap_or_default();
                let duration_ms = rng.random_range(plan.min_ms..=plan.max_ms);
                (priority, duration_ms, rng.random_bool(plan.fail_rate))
            })
            .collect()
    };

    let queue_config = queue.apply(config.queue.clone());
    let scheduler: TaskQueue = TaskQueue::new(queue_config).context("Invalid queue configuration")?;
    let origin = Instant::now();

    let mut handles = Vec::with_capacity(workload.len());
    for &(priority, duration_ms, fails) in &workload {
        let handle = scheduler
            .add(
                move || async move {
                    let started_ms = millis(origin.elapsed());
                    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                    if fails { Err(started_ms) } else { Ok(started_ms) }
                },
                TaskOptions::new().with_priority(priority),
            )
            .await;
        handles.push(handle);
    }

    let mut tasks = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let (priority, duration_ms, _) = workload[index];
        let (started_ms, succeeded) = match handle.await {
            Ok(started_ms) => (Some(started_ms), true),
            Err(e) => (e.into_failure(), false),
        };
        tasks.push(SimulatedTask {
            index,
            priority,
            duration_ms,
            started_ms,
            succeeded,
        });
    }
    scheduler.on_idle().await;
    let stats = scheduler.stats().await;
    let elapsed_ms = millis(origin.elapsed());
    info!(elapsed_ms, ?stats, "cmd_simulate: finished");

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "tasks": tasks,
                "stats": stats,
                "elapsed_ms": elapsed_ms,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            tasks.sort_by_key(|t| (t.started_ms, t.index));
            for task in &tasks {
                let outcome = if task.succeeded {
                    "ok".green()
                } else {
                    "failed".red()
                };
                let started = task
                    .started_ms
                    .map(|ms| format!("+{}ms", ms))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "#{:<4} {:<8} {:>8} {:>6}ms {}",
                    task.index,
                    task.priority.to_string(),
                    started,
                    task.duration_ms,
                    outcome
                );
            }
            println!();
            print_stats(&stats);
            println!("elapsed {}ms", elapsed_ms);
        }
    }

    Ok(())
}
