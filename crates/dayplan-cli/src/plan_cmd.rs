//! CLI handler for `dayplan plan`: collect tasks, resolve preferences, run
//! the planning pipeline, print the result, then persist and export it.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveTime};
use clap::Args;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dayplan_core::clock::parse_hhmm;
use dayplan_core::export::write_markdown;
use dayplan_core::generator::{GenerationError, OpenAiGenerator};
use dayplan_core::preferences::{PreferenceOverrides, resolve};
use dayplan_core::{
    Generator, PipelineError, PlanStore, Planner, ScheduleRequest, Task, normalize_tasks,
};

use crate::config::{API_KEY_ENV, DayplanConfig};
use crate::resolve::resolve_date;
use crate::show_cmd::format_plan;

/// Arguments for `dayplan plan`.
#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Comma-separated task list, e.g. "Write report priority=high duration=90,Email"
    #[arg(long, conflicts_with = "file")]
    pub tasks: Option<String>,
    /// File with one task per line (lines starting with # are skipped)
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Date to plan (YYYY-MM-DD or YYYY/MM/DD; default: today)
    #[arg(long)]
    pub date: Option<String>,
    /// Work day start for this run (HH:MM)
    #[arg(long, value_parser = parse_time_arg)]
    pub start: Option<NaiveTime>,
    /// Work day end for this run (HH:MM)
    #[arg(long, value_parser = parse_time_arg)]
    pub end: Option<NaiveTime>,
    /// Break length in minutes
    #[arg(long)]
    pub break_interval: Option<u32>,
    /// Continuous work in minutes after which a break is due
    #[arg(long)]
    pub max_block: Option<u32>,
    /// Put demanding work at peak energy (true/false)
    #[arg(long)]
    pub deep_work: Option<bool>,
    /// Store the overrides above as the new default preferences once the
    /// plan is saved
    #[arg(long)]
    pub save_prefs: bool,
    /// Skip the generation engine and use the local scheduler only
    #[arg(long)]
    pub offline: bool,
    /// Model name (overrides DAYPLAN_MODEL and the config file)
    #[arg(long)]
    pub model: Option<String>,
    /// Extra generation attempts after the first
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Directory for the markdown export
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Do not write a markdown file
    #[arg(long)]
    pub no_export: bool,
}

impl PlanArgs {
    fn overrides(&self) -> PreferenceOverrides {
        PreferenceOverrides {
            work_start: self.start,
            work_end: self.end,
            break_interval_minutes: self.break_interval,
            max_block_minutes: self.max_block,
            deep_work_enabled: self.deep_work,
        }
    }
}

fn parse_time_arg(s: &str) -> Result<NaiveTime, String> {
    parse_hhmm(s).ok_or_else(|| format!("invalid time {s:?} (expected HH:MM)"))
}

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

pub async fn run_plan(args: PlanArgs, pool: &SqlitePool, mut config: DayplanConfig) -> Result<()> {
    // 1. Tasks.
    let lines = read_task_lines(&args)?;
    let normalized = normalize_tasks(&lines)?;
    for warning in &normalized.warnings {
        eprintln!("warning: {warning}");
    }

    // 2. Preferences: stored (or default) + per-run overrides.
    let store = PlanStore::new(pool.clone());
    let overrides = args.overrides();
    let prefs = resolve(store.preferences().await?, &overrides)?;
    let save_prefs = args.save_prefs && !overrides.is_empty();
    if args.save_prefs && overrides.is_empty() {
        eprintln!("warning: --save-prefs given without any preference flags; nothing to save");
    }

    // 3. Request.
    let now = Local::now().naive_local();
    let date = resolve_date(args.date.as_deref(), now.date())?;
    let request = ScheduleRequest::new(date, normalized.tasks, prefs, now);
    print!("{}", format_task_list(request.tasks()));

    // 4. Generator (optional).
    if let Some(max_retries) = args.max_retries {
        config.policy.max_retries = max_retries;
    }
    let generator = if args.offline {
        info!("offline mode: using the local scheduler only");
        None
    } else {
        match OpenAiGenerator::from_config(&config.generator) {
            Ok(generator) => Some(generator),
            Err(GenerationError::MissingApiKey) => {
                eprintln!(
                    "note: no API key configured (set {API_KEY_ENV} or generator.api_key); \
                     using the local scheduler"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "generation engine unavailable");
                eprintln!("warning: {e}; using the local scheduler");
                None
            }
        }
    };

    // 5. Run the pipeline, cancellable with Ctrl+C.
    let cancel = CancellationToken::new();
    let watcher = spawn_interrupt_watcher(cancel.clone());

    let planner = Planner::new(
        generator.as_ref().map(|g| g as &dyn Generator),
        config.policy,
    )
    .with_cancellation(cancel.clone());
    let result = planner.plan(&request).await;
    // From here on a Ctrl+C interrupts the process instead.
    cancel.cancel();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(PipelineError::Cancelled) => bail!("planning cancelled; nothing was saved"),
        Err(e) => return Err(e).context("planning failed"),
    };
    for failure in &outcome.engine_failures {
        eprintln!("warning: generation attempt failed: {failure}");
    }

    // 6. Show, persist, export.
    print!("{}", format_plan(&outcome.plan));

    store
        .upsert(&outcome.plan)
        .await
        .context("failed to save plan (shown above)")?;
    if save_prefs {
        store.save_preferences(request.preferences()).await?;
        println!("Saved preferences as the new default.");
    }

    if !args.no_export {
        let output_dir = args.output_dir.unwrap_or(config.output_dir);
        match write_markdown(&output_dir, &outcome.plan) {
            Ok(path) => println!("\nSaved to {}", path.display()),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "markdown export failed");
                eprintln!("warning: could not export plan: {e:#}");
            }
        }
    }

    watcher.abort();
    Ok(())
}

/// What a Ctrl+C does at a given point of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Planning is still running: stop it, nothing gets saved.
    CancelPlanning,
    /// Planning is over (or already cancelled): leave right away.
    Exit,
}

fn interrupt_action(cancel: &CancellationToken) -> Interrupt {
    if cancel.is_cancelled() {
        Interrupt::Exit
    } else {
        Interrupt::CancelPlanning
    }
}

fn spawn_interrupt_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match interrupt_action(&cancel) {
                Interrupt::CancelPlanning => {
                    eprintln!("\nCancelling...");
                    cancel.cancel();
                }
                Interrupt::Exit => {
                    eprintln!("\nInterrupted.");
                    std::process::exit(130);
                }
            }
        }
    })
}

/// Numbered listing of the tasks in scheduling order.
pub fn format_task_list(tasks: &[Task]) -> String {
    let mut out = String::from("Tasks to schedule:\n");
    for (i, task) in tasks.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, task.summary()));
    }
    out.push('\n');
    out
}

// -----------------------------------------------------------------------
// Task input
// -----------------------------------------------------------------------

/// Collect raw task lines from `--tasks`, `--file`, or interactive stdin.
fn read_task_lines(args: &PlanArgs) -> Result<Vec<String>> {
    if let Some(list) = &args.tasks {
        return Ok(split_task_list(list));
    }
    if let Some(path) = &args.file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read task file: {}", path.display()))?;
        return Ok(task_file_lines(&content));
    }

    let stdin = io::stdin();
    let mut stderr = io::stderr();
    read_interactive(&mut stdin.lock(), &mut stderr)
}

pub fn split_task_list(list: &str) -> Vec<String> {
    list.split(',').map(|s| s.trim().to_string()).collect()
}

pub fn task_file_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read tasks one per line until the first blank line that follows at
/// least one task, or end of input.
pub fn read_interactive<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<Vec<String>> {
    writeln!(
        out,
        "Enter tasks, one per line. Optional: priority=high|normal|low duration=45 due=HH:MM"
    )?;
    writeln!(out, "Finish with an empty line.")?;

    let mut lines = Vec::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("failed to read from stdin")?;
        if read == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            if lines.is_empty() {
                continue;
            }
            break;
        }
        lines.push(line.to_string());
    }
    Ok(lines)
}
