//! Deterministic local scheduler.
//!
//! Used when there is no generation engine, and to place whatever the
//! engine left unscheduled. Identical inputs always produce identical
//! output: there is no clock access, randomness or hashing order involved.

use std::collections::BTreeSet;

use chrono::NaiveTime;
use tracing::{debug, info};

use dayplan_db::models::{GeneratedBy, ScheduleBlock, TaskId, UnscheduledReason, UnscheduledTask};

use crate::clock::{self, hhmm};
use crate::request::ScheduleRequest;
use crate::task::Task;
use crate::validate::{mark_deadline_risk, resolve_overlaps, unscheduled};

/// Blocks produced by the fallback scheduler, merged with any seed blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOutcome {
    /// The full timeline: seed blocks plus newly placed blocks, sorted.
    pub blocks: Vec<ScheduleBlock>,
    /// Pending tasks that could not be placed, in scheduling order.
    pub unscheduled: Vec<UnscheduledTask>,
}

/// Place the `pending` tasks of `request` after the `existing` blocks.
///
/// Tasks are walked in the request's scheduling order (not the order of
/// `pending`). Placement starts at the later of the request's effective
/// start and the end of the last existing block.
pub fn schedule_fallback(
    request: &ScheduleRequest,
    pending: &[TaskId],
    mut existing: Vec<ScheduleBlock>,
) -> FallbackOutcome {
    let prefs = request.preferences();
    let pending: BTreeSet<TaskId> = pending.iter().copied().collect();
    let tasks: Vec<&Task> = request
        .tasks()
        .iter()
        .filter(|t| pending.contains(&t.id))
        .collect();

    existing.sort_by_key(|b| b.start);
    let mut cursor = request.effective_start();
    let mut continuous = 0i64;
    for block in &existing {
        continuous = if block.start <= cursor {
            continuous + block.duration_minutes()
        } else {
            block.duration_minutes()
        };
        cursor = cursor.max(block.end);
    }
    let run_ends_at_cursor = existing.iter().map(|b| b.end).max() == Some(cursor);
    if !run_ends_at_cursor {
        continuous = 0;
    } else if continuous > i64::from(prefs.max_block_minutes) {
        cursor = clock::add_minutes(cursor, i64::from(prefs.break_interval_minutes))
            .unwrap_or(prefs.work_end);
        continuous = 0;
    }

    let mut timeline = existing;
    let mut placed = Vec::new();
    let mut unscheduled_tasks = Vec::new();

    for (idx, task) in tasks.iter().enumerate() {
        let end = clock::add_minutes(cursor, i64::from(task.duration_minutes))
            .filter(|end| *end <= prefs.work_end);
        let Some(end) = end else {
            debug!(
                task = %task.id,
                cursor = %hhmm(cursor),
                "out of working hours, stopping"
            );
            unscheduled_tasks.extend(
                tasks[idx..]
                    .iter()
                    .map(|t| unscheduled(t, UnscheduledReason::ExceedsWorkHours)),
            );
            break;
        };

        timeline.push(fallback_block(task, cursor, end));
        placed.push(task.id);
        cursor = end;

        continuous += i64::from(task.duration_minutes);
        if continuous > i64::from(prefs.max_block_minutes) {
            cursor = clock::add_minutes(cursor, i64::from(prefs.break_interval_minutes))
                .unwrap_or(prefs.work_end);
            continuous = 0;
        }
    }

    for id in placed {
        let dropped = reinsert_before_deadline(request, &mut timeline, id);
        unscheduled_tasks.extend(dropped);
    }
    mark_deadline_risk(request, &mut timeline);

    info!(
        placed = timeline.len(),
        unscheduled = unscheduled_tasks.len(),
        "fallback scheduling complete"
    );

    FallbackOutcome {
        blocks: timeline,
        unscheduled: unscheduled_tasks,
    }
}

fn fallback_block(task: &Task, start: NaiveTime, end: NaiveTime) -> ScheduleBlock {
    let rationale = match task.deadline {
        Some(deadline) => format!(
            "{} priority, due {}: placed in priority order by the local scheduler.",
            task.priority,
            hhmm(deadline)
        ),
        None => format!(
            "{} priority: placed in priority order by the local scheduler.",
            task.priority
        ),
    };
    ScheduleBlock {
        start,
        end,
        title: task.name.clone(),
        source_task: task.id,
        priority: task.priority,
        description: None,
        rationale,
        origin: GeneratedBy::Fallback,
        at_risk: false,
    }
}

/// Move the block of task `id` in front of the earliest lower-priority
/// block where it still meets its deadline, bumping later blocks.
///
/// Returns the tasks bumped past `work_end`. Leaves the timeline untouched
/// when the task meets its deadline already or no slot qualifies.
fn reinsert_before_deadline(
    request: &ScheduleRequest,
    timeline: &mut Vec<ScheduleBlock>,
    id: TaskId,
) -> Vec<UnscheduledTask> {
    let Some(task) = request.task(id) else {
        return Vec::new();
    };
    let Some(deadline) = task.deadline else {
        return Vec::new();
    };
    let Some(pos) = timeline.iter().position(|b| b.source_task == id) else {
        return Vec::new();
    };
    if timeline[pos].end <= deadline {
        return Vec::new();
    }

    let minutes = timeline[pos].duration_minutes();
    let current_start = timeline[pos].start;
    let slot = timeline.iter().position(|b| {
        b.priority > task.priority
            && b.start < current_start
            && clock::add_minutes(b.start, minutes).is_some_and(|end| end <= deadline)
    });
    let Some(slot) = slot else {
        debug!(task = %id, deadline = %hhmm(deadline), "no earlier slot, deadline at risk");
        return Vec::new();
    };

    let mut block = timeline.remove(pos);
    let start = timeline[slot].start;
    let Some(end) = clock::add_minutes(start, minutes) else {
        timeline.insert(pos, block);
        return Vec::new();
    };
    debug!(
        task = %id,
        from = %hhmm(block.start),
        to = %hhmm(start),
        "moving block ahead of its deadline"
    );
    block.start = start;
    block.end = end;
    timeline.insert(slot, block);

    let repair = resolve_overlaps(std::mem::take(timeline), request.preferences().work_end);
    *timeline = repair.blocks;
    repair.dropped
}
