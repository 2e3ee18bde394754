//! CLI handlers for `dayplan prefs` subcommands.
//!
//! - `dayplan prefs show` -- print the stored preferences (or the defaults)
//! - `dayplan prefs edit` -- interactive editor; re-prompts until the
//!   values are consistent, then saves them

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use sqlx::SqlitePool;

use dayplan_core::PlanStore;
use dayplan_core::clock::{hhmm, parse_hhmm};
use dayplan_core::preferences::validate;
use dayplan_db::models::Preferences;

use crate::PrefsCommands;

/// Dispatch a `PrefsCommands` variant to the appropriate handler.
pub async fn run_prefs_command(command: PrefsCommands, pool: &SqlitePool) -> Result<()> {
    let store = PlanStore::new(pool.clone());
    match command {
        PrefsCommands::Show => {
            let stored = store.preferences().await?;
            let source = if stored.is_some() {
                "saved"
            } else {
                "defaults, nothing saved yet"
            };
            println!("Preferences ({source}):");
            print!("{}", format_preferences(&stored.unwrap_or_default()));
            Ok(())
        }
        PrefsCommands::Edit => {
            let current = store.preferences().await?.unwrap_or_default();
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            let prefs = edit_preferences(current, &mut stdin.lock(), &mut stdout)?;
            store.save_preferences(&prefs).await?;
            println!("Preferences saved.");
            Ok(())
        }
    }
}

pub fn format_preferences(prefs: &Preferences) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "  work hours:      {} - {}\n",
        hhmm(prefs.work_start),
        hhmm(prefs.work_end)
    ));
    out.push_str(&format!("  break interval:  {} min\n", prefs.break_interval_minutes));
    out.push_str(&format!("  max block:       {} min\n", prefs.max_block_minutes));
    out.push_str(&format!(
        "  deep work:       {}\n",
        if prefs.deep_work_enabled { "on" } else { "off" }
    ));
    out
}

// -----------------------------------------------------------------------
// Interactive editor
// -----------------------------------------------------------------------

/// Prompt for every field, starting from `current`. An empty answer keeps
/// the shown value. Loops until the result passes validation.
pub fn edit_preferences<R: BufRead, W: Write>(
    current: Preferences,
    input: &mut R,
    out: &mut W,
) -> Result<Preferences> {
    let mut draft = current;
    loop {
        draft.work_start = prompt(
            input,
            out,
            "Work start (HH:MM)",
            draft.work_start,
            |v| hhmm(*v),
            parse_hhmm,
        )?;
        draft.work_end = prompt(
            input,
            out,
            "Work end (HH:MM)",
            draft.work_end,
            |v| hhmm(*v),
            parse_hhmm,
        )?;
        draft.break_interval_minutes = prompt(
            input,
            out,
            "Break interval (minutes)",
            draft.break_interval_minutes,
            |v| v.to_string(),
            |s| s.parse().ok(),
        )?;
        draft.max_block_minutes = prompt(
            input,
            out,
            "Max continuous work (minutes)",
            draft.max_block_minutes,
            |v| v.to_string(),
            |s| s.parse().ok(),
        )?;
        draft.deep_work_enabled = prompt(
            input,
            out,
            "Schedule deep work at peak energy (y/n)",
            draft.deep_work_enabled,
            |v| if *v { "y".to_string() } else { "n".to_string() },
            parse_yes_no,
        )?;

        match validate(&draft) {
            Ok(()) => return Ok(draft),
            Err(e) => writeln!(out, "{e}\nPlease enter the values again.\n")?,
        }
    }
}

fn prompt<R, W, T, S, P>(
    input: &mut R,
    out: &mut W,
    label: &str,
    current: T,
    show: S,
    parse: P,
) -> Result<T>
where
    R: BufRead,
    W: Write,
    S: Fn(&T) -> String,
    P: Fn(&str) -> Option<T>,
{
    loop {
        write!(out, "{label} [{}]: ", show(&current))?;
        out.flush()?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("failed to read from stdin")?;
        if read == 0 {
            bail!("input closed before preferences were saved");
        }

        let answer = line.trim();
        if answer.is_empty() {
            return Ok(current);
        }
        match parse(answer) {
            Some(value) => return Ok(value),
            None => writeln!(out, "  invalid value {answer:?}")?,
        }
    }
}

fn parse_yes_no(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "on" => Some(true),
        "n" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}
