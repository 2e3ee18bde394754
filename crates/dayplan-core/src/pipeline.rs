//! The planning pipeline: generation, validation, retry and fallback.
//!
//! ```text
//! ScheduleRequest -> Generator -> parse -> validate/repair
//!                        ^                      |
//!                        +--- one retry --------+ (too much unscheduled)
//!                                               |
//!                                 fallback for the remainder -> Plan
//! ```
//!
//! The pipeline is a function of the request plus the generator. It never
//! touches storage; the caller persists the returned plan.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dayplan_db::models::{GeneratedBy, Plan, TaskId};

use crate::clock::hhmm;
use crate::fallback::schedule_fallback;
use crate::generator::Generator;
use crate::request::ScheduleRequest;
use crate::response::parse_response;
use crate::validate::{
    PlanInvariantError, ValidatedSchedule, check_coverage, check_invariants, validate_response,
};

/// Retry and timeout policy for generation attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Retry while the unscheduled fraction exceeds this value.
    pub unscheduled_threshold: f64,
    /// Bound on a single generation call.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            unscheduled_threshold: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Errors that stop a planning run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("planning cancelled")]
    Cancelled,

    #[error("assembled plan is invalid: {0}")]
    Invariant(#[from] PlanInvariantError),
}

/// A finished plan plus how it came about.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    /// Generation calls made (0 when running offline).
    pub attempts: u32,
    /// One message per failed or timed-out generation call.
    pub engine_failures: Vec<String>,
}

/// Runs the pipeline for one request.
pub struct Planner<'a> {
    generator: Option<&'a dyn Generator>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<'a> Planner<'a> {
    /// `generator: None` plans with the fallback scheduler only.
    pub fn new(generator: Option<&'a dyn Generator>, policy: RetryPolicy) -> Self {
        Self {
            generator,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `token`: cancelling it aborts the run with
    /// [`PipelineError::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn plan(&self, request: &ScheduleRequest) -> Result<PlanOutcome, PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut attempts = 0;
        let mut engine_failures = Vec::new();
        let mut best: Option<ValidatedSchedule> = None;

        if let Some(generator) = self.generator {
            for attempt in 0..=self.policy.max_retries {
                let attempt_request = match &best {
                    Some(prev) => request.with_flagged(prev.unscheduled.iter().map(|u| u.task)),
                    None => request.clone(),
                };
                let prompt = attempt_request.build_prompt();
                info!(
                    generator = generator.name(),
                    attempt = attempt + 1,
                    tasks = request.tasks().len(),
                    "requesting schedule"
                );

                let reply = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                    reply = tokio::time::timeout(self.policy.timeout, generator.generate(&prompt)) => reply,
                };
                attempts += 1;

                let candidate = match reply {
                    Ok(Ok(text)) => validate_response(request, &parse_response(&text)),
                    Ok(Err(e)) => {
                        warn!(error = %e, attempt = attempt + 1, "generation failed");
                        engine_failures.push(e.to_string());
                        ValidatedSchedule::empty(request)
                    }
                    Err(_) => {
                        warn!(
                            timeout_secs = self.policy.timeout.as_secs_f64(),
                            attempt = attempt + 1,
                            "generation timed out"
                        );
                        engine_failures.push(format!(
                            "generation timed out after {:?}",
                            self.policy.timeout
                        ));
                        ValidatedSchedule::empty(request)
                    }
                };
                info!(
                    placed = candidate.blocks.len(),
                    unscheduled = candidate.unscheduled.len(),
                    discarded = candidate.discarded,
                    "validated engine reply"
                );

                let current = match best.take() {
                    Some(prev) if prev.unscheduled.len() < candidate.unscheduled.len() => prev,
                    _ => candidate,
                };
                let fraction = current.unscheduled_fraction(request);
                best = Some(current);

                if fraction <= self.policy.unscheduled_threshold {
                    break;
                }
            }
        }

        let plan = match best {
            Some(engine) if engine.unscheduled.is_empty() => Plan {
                date: request.date(),
                work_start: request.preferences().work_start,
                work_end: request.preferences().work_end,
                blocks: engine.blocks,
                unscheduled: Vec::new(),
                overall_rationale: engine.overall_rationale,
                generated_by: GeneratedBy::Engine,
            },
            Some(engine) => {
                let pending: Vec<TaskId> = engine.unscheduled.iter().map(|u| u.task).collect();
                info!(pending = pending.len(), "placing remaining tasks with fallback scheduler");
                let overall_rationale = if engine.blocks.is_empty() {
                    fallback_rationale(request)
                } else {
                    engine.overall_rationale
                };
                let outcome = schedule_fallback(request, &pending, engine.blocks);
                let placed = outcome
                    .blocks
                    .iter()
                    .filter(|b| b.origin == GeneratedBy::Fallback)
                    .count();
                Plan {
                    date: request.date(),
                    work_start: request.preferences().work_start,
                    work_end: request.preferences().work_end,
                    blocks: outcome.blocks,
                    unscheduled: outcome.unscheduled,
                    overall_rationale: format!(
                        "{overall_rationale}\n\nThe local scheduler placed {placed} of {} task(s) \
                         the generation engine did not schedule.",
                        pending.len()
                    ),
                    generated_by: GeneratedBy::Fallback,
                }
            }
            None => {
                let all: Vec<TaskId> = request.tasks().iter().map(|t| t.id).collect();
                let outcome = schedule_fallback(request, &all, Vec::new());
                Plan {
                    date: request.date(),
                    work_start: request.preferences().work_start,
                    work_end: request.preferences().work_end,
                    blocks: outcome.blocks,
                    unscheduled: outcome.unscheduled,
                    overall_rationale: fallback_rationale(request),
                    generated_by: GeneratedBy::Fallback,
                }
            }
        };

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        check_invariants(&plan)?;
        check_coverage(&plan, request)?;

        info!(
            date = %plan.date,
            blocks = plan.blocks.len(),
            unscheduled = plan.unscheduled.len(),
            generated_by = %plan.generated_by,
            attempts,
            "plan assembled"
        );

        Ok(PlanOutcome {
            plan,
            attempts,
            engine_failures,
        })
    }
}

fn fallback_rationale(request: &ScheduleRequest) -> String {
    let prefs = request.preferences();
    let mut text = format!(
        "Generated by the local scheduler. Tasks are placed back to back in priority order \
         (high first, then earliest deadline, then input order) starting at {}.",
        hhmm(request.effective_start())
    );
    if prefs.break_interval_minutes > 0 {
        text.push_str(&format!(
            " A {}-minute break follows every stretch of more than {} minutes of continuous work.",
            prefs.break_interval_minutes, prefs.max_block_minutes
        ));
    }
    text
}
