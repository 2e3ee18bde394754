use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Priority of a task.
///
/// The derived ordering is the scheduling order: `High < Normal < Low`, so
/// sorting ascending puts high-priority work first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "High",
            Self::Normal => "Normal",
            Self::Low => "Low",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = PriorityParseError;

    /// Case-insensitive. `medium` is accepted as an alias of `normal`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "normal" | "medium" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(PriorityParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Priority`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid priority: {0:?} (expected high, normal, or low)")]
pub struct PriorityParseError(pub String);

// ---------------------------------------------------------------------------

/// Provenance of a plan or of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GeneratedBy {
    /// Proposed by the external generation engine (after validation/repair).
    Engine,
    /// Produced by the deterministic local scheduler.
    Fallback,
}

impl fmt::Display for GeneratedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Engine => "engine",
            Self::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

impl FromStr for GeneratedBy {
    type Err = GeneratedByParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "engine" => Ok(Self::Engine),
            "fallback" => Ok(Self::Fallback),
            other => Err(GeneratedByParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`GeneratedBy`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid plan provenance: {0:?}")]
pub struct GeneratedByParseError(pub String);

// ---------------------------------------------------------------------------

/// Why a task ended up without a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscheduledReason {
    /// The generation engine returned no usable block for the task.
    NotReturnedByGenerator,
    /// The fallback scheduler ran out of working hours.
    ExceedsWorkHours,
    /// Overlap repair (or a deadline bump) pushed the block past `work_end`.
    PushedPastWorkEnd,
    /// The engine placed the block outside the working hours.
    OutsideWorkHours,
}

impl fmt::Display for UnscheduledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotReturnedByGenerator => "not returned by generator",
            Self::ExceedsWorkHours => "exceeds available work hours",
            Self::PushedPastWorkEnd => "pushed past end of work day",
            Self::OutsideWorkHours => "outside working hours",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Identifier of a task within one planning run: its zero-based position
/// among the accepted input lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One time-bounded slot of a plan, attributed to a single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub title: String,
    /// Back-reference to the task this block schedules. Lookup only.
    pub source_task: TaskId,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub rationale: String,
    pub origin: GeneratedBy,
    /// Set when the block ends after the task's deadline.
    #[serde(default)]
    pub at_risk: bool,
}

impl ScheduleBlock {
    /// Length of the block in whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Whether the half-open intervals `[start, end)` intersect.
    pub fn overlaps(&self, other: &ScheduleBlock) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A task the plan explicitly leaves out, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnscheduledTask {
    pub task: TaskId,
    pub title: String,
    pub reason: UnscheduledReason,
}

/// The finalized schedule for one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub date: NaiveDate,
    /// Work window in effect when the plan was generated.
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub blocks: Vec<ScheduleBlock>,
    pub unscheduled: Vec<UnscheduledTask>,
    pub overall_rationale: String,
    pub generated_by: GeneratedBy,
}

/// User scheduling preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Preferences {
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub break_interval_minutes: u32,
    /// Continuous work (minutes) after which a break is due.
    pub max_block_minutes: u32,
    pub deep_work_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(9, 0, 0).expect("09:00 is a valid time"),
            work_end: NaiveTime::from_hms_opt(18, 0, 0).expect("18:00 is a valid time"),
            break_interval_minutes: 15,
            max_block_minutes: 90,
            deep_work_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A row of the `plans` table.
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub date: NaiveDate,
    pub generated_by: GeneratedBy,
    pub overall_rationale: String,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub blocks: Json<Vec<ScheduleBlock>>,
    pub unscheduled: Json<Vec<UnscheduledTask>>,
    pub updated_at: DateTime<Utc>,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Self {
            date: row.date,
            work_start: row.work_start,
            work_end: row.work_end,
            blocks: row.blocks.0,
            unscheduled: row.unscheduled.0,
            overall_rationale: row.overall_rationale,
            generated_by: row.generated_by,
        }
    }
}
