//! Validation and repair of engine-proposed schedules, plus the plan
//! invariant checks shared with the store.

use std::collections::{HashMap, HashSet};

use chrono::NaiveTime;
use thiserror::Error;
use tracing::debug;

use dayplan_db::models::{
    GeneratedBy, Plan, ScheduleBlock, TaskId, UnscheduledReason, UnscheduledTask,
};

use crate::clock::{self, hhmm};
use crate::request::ScheduleRequest;
use crate::response::{RawBlock, RawSchedule};
use crate::task::Task;

pub const NO_OVERALL_RATIONALE: &str = "No detailed rationale provided.";
pub const NO_BLOCK_RATIONALE: &str = "No rationale provided.";

/// The repaired engine proposal: every block valid and placed, every
/// other task accounted for in `unscheduled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSchedule {
    pub blocks: Vec<ScheduleBlock>,
    pub unscheduled: Vec<UnscheduledTask>,
    pub overall_rationale: String,
    /// Raw blocks thrown away (bad times, unknown or duplicate task).
    pub discarded: usize,
}

impl ValidatedSchedule {
    /// The outcome of an attempt that produced nothing usable.
    pub fn empty(request: &ScheduleRequest) -> Self {
        Self {
            blocks: Vec::new(),
            unscheduled: request
                .tasks()
                .iter()
                .map(|t| unscheduled(t, UnscheduledReason::NotReturnedByGenerator))
                .collect(),
            overall_rationale: NO_OVERALL_RATIONALE.to_string(),
            discarded: 0,
        }
    }

    /// Fraction of the request's tasks left unscheduled (0.0 for no tasks).
    pub fn unscheduled_fraction(&self, request: &ScheduleRequest) -> f64 {
        let total = request.tasks().len();
        if total == 0 {
            return 0.0;
        }
        self.unscheduled.len() as f64 / total as f64
    }
}

/// Turn a parsed reply into a valid partial schedule.
pub fn validate_response(request: &ScheduleRequest, raw: &RawSchedule) -> ValidatedSchedule {
    let prefs = request.preferences();
    let mut blocks = Vec::new();
    let mut covered = HashSet::new();
    let mut discarded = 0;
    let mut outside = Vec::new();

    for raw_block in &raw.blocks {
        let Some(task) = match_task(request, raw_block) else {
            debug!(title = %raw_block.title, "discarding block for unknown task");
            discarded += 1;
            continue;
        };
        if covered.contains(&task.id) {
            debug!(task = %task.id, "discarding duplicate block");
            discarded += 1;
            continue;
        }
        let Some((start, end)) = parse_span(raw_block) else {
            debug!(
                start = %raw_block.start,
                end = %raw_block.end,
                "discarding block with invalid times"
            );
            discarded += 1;
            continue;
        };

        let Some((start, end)) = clamp_to_work_start(start, end, prefs.work_start) else {
            outside.push(unscheduled(task, UnscheduledReason::OutsideWorkHours));
            continue;
        };
        if end > prefs.work_end {
            outside.push(unscheduled(task, UnscheduledReason::OutsideWorkHours));
            continue;
        }
        covered.insert(task.id);

        blocks.push(ScheduleBlock {
            start,
            end,
            title: task.name.clone(),
            source_task: task.id,
            priority: task.priority,
            description: raw_block.description.clone(),
            rationale: raw_block
                .rationale
                .clone()
                .unwrap_or_else(|| NO_BLOCK_RATIONALE.to_string()),
            origin: GeneratedBy::Engine,
            at_risk: false,
        });
    }

    sort_blocks(request, &mut blocks);
    let repair = resolve_overlaps(blocks, prefs.work_end);
    let mut blocks = repair.blocks;
    mark_deadline_risk(request, &mut blocks);

    let mut dropped: HashMap<TaskId, UnscheduledTask> = outside
        .into_iter()
        .chain(repair.dropped)
        .map(|u| (u.task, u))
        .collect();
    let placed: HashSet<TaskId> = blocks.iter().map(|b| b.source_task).collect();
    let unscheduled_tasks = request
        .tasks()
        .iter()
        .filter(|t| !placed.contains(&t.id))
        .map(|t| {
            dropped
                .remove(&t.id)
                .unwrap_or_else(|| unscheduled(t, UnscheduledReason::NotReturnedByGenerator))
        })
        .collect();

    ValidatedSchedule {
        blocks,
        unscheduled: unscheduled_tasks,
        overall_rationale: raw
            .overall_rationale
            .clone()
            .unwrap_or_else(|| NO_OVERALL_RATIONALE.to_string()),
        discarded,
    }
}

/// Resolve a raw block to a task: by id, then exact title, then unique
/// substring match.
fn match_task<'a>(request: &'a ScheduleRequest, raw: &RawBlock) -> Option<&'a Task> {
    if let Some(task) = raw.task_id.and_then(|id| request.task(TaskId(id))) {
        return Some(task);
    }

    let title = raw.title.trim().to_lowercase();
    if title.is_empty() {
        return None;
    }
    if let Some(task) = request
        .tasks()
        .iter()
        .find(|t| t.name.to_lowercase() == title)
    {
        return Some(task);
    }

    let mut candidates = request.tasks().iter().filter(|t| {
        let name = t.name.to_lowercase();
        title.contains(&name) || name.contains(&title)
    });
    match (candidates.next(), candidates.next()) {
        (Some(task), None) => Some(task),
        _ => None,
    }
}

fn parse_span(raw: &RawBlock) -> Option<(NaiveTime, NaiveTime)> {
    let start = clock::parse_time(&raw.start)?;
    let end = clock::parse_time(&raw.end)?;
    (start < end).then_some((start, end))
}

/// Move a block that starts before `work_start` to `work_start`,
/// preserving its duration.
fn clamp_to_work_start(
    start: NaiveTime,
    end: NaiveTime,
    work_start: NaiveTime,
) -> Option<(NaiveTime, NaiveTime)> {
    if start >= work_start {
        return Some((start, end));
    }
    let minutes = (end - start).num_minutes();
    Some((work_start, clock::add_minutes(work_start, minutes)?))
}

/// Sort by start time; ties keep scheduling order.
fn sort_blocks(request: &ScheduleRequest, blocks: &mut [ScheduleBlock]) {
    let rank: HashMap<TaskId, usize> = request
        .tasks()
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id, i))
        .collect();
    blocks.sort_by_key(|b| (b.start, rank.get(&b.source_task).copied().unwrap_or(usize::MAX)));
}

/// Blocks after overlap repair, and the ones that no longer fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlapRepair {
    pub blocks: Vec<ScheduleBlock>,
    pub dropped: Vec<UnscheduledTask>,
}

/// Shift each block that overlaps its predecessor to begin at the
/// predecessor's end, preserving duration. Blocks pushed past `work_end`
/// are dropped.
///
/// `blocks` must already be in the desired order; a block that sorts
/// earlier keeps its slot.
pub fn resolve_overlaps(blocks: Vec<ScheduleBlock>, work_end: NaiveTime) -> OverlapRepair {
    let mut repair = OverlapRepair::default();

    for mut block in blocks {
        if let Some(prev) = repair.blocks.last() {
            if block.start < prev.end {
                let minutes = block.duration_minutes();
                let shifted = clock::add_minutes(prev.end, minutes).filter(|end| *end <= work_end);
                let Some(end) = shifted else {
                    debug!(task = %block.source_task, "dropping block pushed past work end");
                    repair.dropped.push(UnscheduledTask {
                        task: block.source_task,
                        title: block.title,
                        reason: UnscheduledReason::PushedPastWorkEnd,
                    });
                    continue;
                };
                debug!(
                    task = %block.source_task,
                    from = %hhmm(block.start),
                    to = %hhmm(prev.end),
                    "shifting overlapping block"
                );
                block.start = prev.end;
                block.end = end;
            }
        }
        repair.blocks.push(block);
    }

    repair
}

const AT_RISK_NOTE: &str = "At risk of missing deadline";

/// Set `at_risk` on every block that ends after its task's deadline.
pub fn mark_deadline_risk(request: &ScheduleRequest, blocks: &mut [ScheduleBlock]) {
    for block in blocks {
        let deadline = request.task(block.source_task).and_then(|t| t.deadline);
        block.at_risk = deadline.is_some_and(|d| block.end > d);
        if let (true, Some(deadline)) = (block.at_risk, deadline) {
            if !block.rationale.contains(AT_RISK_NOTE) {
                block
                    .rationale
                    .push_str(&format!(" ({AT_RISK_NOTE} {}.)", hhmm(deadline)));
            }
        }
    }
}

pub(crate) fn unscheduled(task: &Task, reason: UnscheduledReason) -> UnscheduledTask {
    UnscheduledTask {
        task: task.id,
        title: task.name.clone(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

/// A plan that breaks one of the structural invariants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanInvariantError {
    #[error("block {title:?} does not end after it starts")]
    EmptyBlock { title: String },

    #[error("blocks {first:?} and {second:?} are out of order")]
    OutOfOrder { first: String, second: String },

    #[error("blocks {first:?} and {second:?} overlap")]
    Overlap { first: String, second: String },

    #[error("block {title:?} lies outside the work window")]
    OutsideWindow { title: String },

    #[error("task {0} is scheduled more than once")]
    DuplicateTask(TaskId),

    #[error("task {0} is neither scheduled nor marked unscheduled")]
    Uncovered(TaskId),

    #[error("plan references unknown task {0}")]
    UnknownTask(TaskId),
}

/// Check ordering, non-overlap, the work window and single placement.
pub fn check_invariants(plan: &Plan) -> Result<(), PlanInvariantError> {
    let mut seen = HashSet::new();

    for block in &plan.blocks {
        if block.start >= block.end {
            return Err(PlanInvariantError::EmptyBlock {
                title: block.title.clone(),
            });
        }
        if block.start < plan.work_start || block.end > plan.work_end {
            return Err(PlanInvariantError::OutsideWindow {
                title: block.title.clone(),
            });
        }
        if !seen.insert(block.source_task) {
            return Err(PlanInvariantError::DuplicateTask(block.source_task));
        }
    }

    for pair in plan.blocks.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.start > b.start {
            return Err(PlanInvariantError::OutOfOrder {
                first: a.title.clone(),
                second: b.title.clone(),
            });
        }
        if a.overlaps(b) {
            return Err(PlanInvariantError::Overlap {
                first: a.title.clone(),
                second: b.title.clone(),
            });
        }
    }

    for u in &plan.unscheduled {
        if !seen.insert(u.task) {
            return Err(PlanInvariantError::DuplicateTask(u.task));
        }
    }

    Ok(())
}

/// Check that every task of `request` appears exactly once in the plan,
/// either as a block or as unscheduled, and nothing else does.
pub fn check_coverage(plan: &Plan, request: &ScheduleRequest) -> Result<(), PlanInvariantError> {
    let mut remaining: HashSet<TaskId> = request.tasks().iter().map(|t| t.id).collect();
    let ids = plan
        .blocks
        .iter()
        .map(|b| b.source_task)
        .chain(plan.unscheduled.iter().map(|u| u.task));

    for id in ids {
        if request.task(id).is_none() {
            return Err(PlanInvariantError::UnknownTask(id));
        }
        if !remaining.remove(&id) {
            return Err(PlanInvariantError::DuplicateTask(id));
        }
    }

    match remaining.into_iter().min() {
        Some(id) => Err(PlanInvariantError::Uncovered(id)),
        None => Ok(()),
    }
}
