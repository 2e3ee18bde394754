//! Task normalization: raw input lines into canonical [`Task`] records.
//!
//! A line is a task name with optional inline `key=value` modifiers:
//!
//! ```text
//! Write project report priority=high duration=120 due=17:00
//! ```
//!
//! Normalization degrades gracefully. A malformed modifier produces a
//! warning and a default, never an error; only an input set with no usable
//! task at all is fatal.

use chrono::NaiveTime;
use thiserror::Error;
use tracing::warn;

use dayplan_db::models::{Priority, TaskId};

use crate::clock::{self, hhmm};

/// Duration assumed when a line has no (valid) `duration=` modifier.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;

/// A canonical unit of work. Immutable once normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Position among the accepted input lines (stable tie-break key).
    pub id: TaskId,
    pub name: String,
    pub priority: Priority,
    pub duration_minutes: u32,
    pub deadline: Option<NaiveTime>,
}

impl Task {
    /// One-line summary used in prompts and CLI listings.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            self.name.clone(),
            format!("Priority: {}", self.priority),
            format!("Duration: {} min", self.duration_minutes),
        ];
        if let Some(deadline) = self.deadline {
            parts.push(format!("Due: {}", hhmm(deadline)));
        }
        parts.join(" | ")
    }
}

/// Errors that abort normalization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("no tasks provided: enter at least one task")]
    Empty,
}

/// Result of normalizing a whole input set.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTasks {
    /// Accepted tasks, in input order.
    pub tasks: Vec<Task>,
    /// Human-readable warnings for every degraded or rejected line.
    pub warnings: Vec<String>,
}

/// Normalize an input set, one task per line.
///
/// Blank lines are skipped. Fails only when no line yields a task.
pub fn normalize_tasks<I, S>(lines: I) -> Result<NormalizedTasks, NormalizeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = NormalizedTasks::default();

    for (line_no, line) in lines.into_iter().enumerate() {
        let id = TaskId(out.tasks.len() as u32);
        let mut line_warnings = Vec::new();
        let task = parse_task_line(line.as_ref(), id, &mut line_warnings);

        for w in line_warnings {
            let w = format!("line {}: {w}", line_no + 1);
            warn!(line = line_no + 1, "{w}");
            out.warnings.push(w);
        }
        if let Some(task) = task {
            out.tasks.push(task);
        }
    }

    if out.tasks.is_empty() {
        return Err(NormalizeError::Empty);
    }
    Ok(out)
}

/// Parse a single line.
///
/// Returns `None` for blank lines and for lines rejected outright (no name
/// left once modifiers are removed). Warnings are appended to `warnings`.
pub fn parse_task_line(line: &str, id: TaskId, warnings: &mut Vec<String>) -> Option<Task> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut name_words = Vec::new();
    let mut priority = Priority::default();
    let mut duration_minutes = DEFAULT_DURATION_MINUTES;
    let mut deadline = None;

    for word in line.split_whitespace() {
        let Some((key, value)) = split_modifier(word) else {
            name_words.push(word);
            continue;
        };

        match key.to_ascii_lowercase().as_str() {
            "priority" => match value.parse::<Priority>() {
                Ok(p) => priority = p,
                Err(_) => warnings.push(format!(
                    "unknown priority {value:?}, using {}",
                    Priority::default()
                )),
            },
            "duration" => match parse_duration(value) {
                Some(minutes) => duration_minutes = minutes,
                None => warnings.push(format!(
                    "invalid duration {value:?}, using {DEFAULT_DURATION_MINUTES} min"
                )),
            },
            "due" => match clock::parse_hhmm(value) {
                Some(t) => deadline = Some(t),
                None => warnings.push(format!(
                    "invalid due time {value:?} (expected HH:MM), ignoring deadline"
                )),
            },
            _ => warnings.push(format!("ignoring unknown modifier {word:?}")),
        }
    }

    if name_words.is_empty() {
        warnings.push(format!("rejected {line:?}: task has no name"));
        return None;
    }

    Some(Task {
        id,
        name: name_words.join(" "),
        priority,
        duration_minutes,
        deadline,
    })
}

/// Split `key=value` when `key` looks like a modifier name.
fn split_modifier(word: &str) -> Option<(&str, &str)> {
    let (key, value) = word.split_once('=')?;
    let is_key = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphabetic() || c == '_');
    is_key.then_some((key, value))
}

/// Parse a positive duration: `45`, `45m`, `45min`, `45mins` or `2h`.
fn parse_duration(value: &str) -> Option<u32> {
    let lower = value.trim().to_ascii_lowercase();
    let (digits, factor) = if let Some(h) = lower.strip_suffix('h') {
        (h, 60)
    } else {
        let m = lower
            .strip_suffix("mins")
            .or_else(|| lower.strip_suffix("min"))
            .or_else(|| lower.strip_suffix('m'))
            .unwrap_or(&lower);
        (m, 1)
    };
    let n: u32 = digits.parse().ok()?;
    let minutes = n.checked_mul(factor)?;
    (minutes > 0).then_some(minutes)
}
