//! End-to-end tests for the planning pipeline.
//!
//! The generation engine is replaced by a [`ScriptedGenerator`] so every
//! scenario (clean reply, overlaps, omissions, failures, timeouts,
//! cancellation) is reproducible.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use tokio_util::sync::CancellationToken;

use dayplan_core::generator::{Generator, ScriptedGenerator, ScriptedReply};
use dayplan_core::{PipelineError, Planner, RetryPolicy, ScheduleRequest, normalize_tasks};
use dayplan_db::models::{GeneratedBy, Plan, Preferences, UnscheduledReason};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
}

fn request_from(lines: &[&str], reference: NaiveTime) -> ScheduleRequest {
    let tasks = normalize_tasks(lines).expect("tasks should normalize").tasks;
    ScheduleRequest::new(date(), tasks, Preferences::default(), date().and_time(reference))
}

/// A(High, 60), B(Normal, 30), C(Low, 30).
fn abc() -> ScheduleRequest {
    request_from(
        &[
            "A priority=high duration=60",
            "B duration=30",
            "C priority=low duration=30",
        ],
        t(8, 0),
    )
}

fn blocks(plan: &Plan) -> Vec<(&str, NaiveTime, NaiveTime, GeneratedBy)> {
    plan.blocks
        .iter()
        .map(|b| (b.title.as_str(), b.start, b.end, b.origin))
        .collect()
}

fn json_reply(entries: &[(u32, &str, &str, &str)]) -> String {
    let blocks: Vec<serde_json::Value> = entries
        .iter()
        .map(|(id, title, start, end)| {
            serde_json::json!({
                "task_id": id,
                "title": title,
                "start": start,
                "end": end,
                "rationale": format!("{title} fits here"),
            })
        })
        .collect();
    serde_json::json!({ "blocks": blocks, "overall_rationale": "engine reasoning" }).to_string()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(200),
        ..RetryPolicy::default()
    }
}

// -----------------------------------------------------------------------
// Fallback only
// -----------------------------------------------------------------------

#[tokio::test]
async fn offline_high_then_normal() {
    let request = request_from(&["B duration=30", "A priority=high duration=60"], t(9, 0));
    let outcome = Planner::new(None, RetryPolicy::default())
        .plan(&request)
        .await
        .unwrap();

    assert_eq!(
        blocks(&outcome.plan),
        vec![
            ("A", t(9, 0), t(10, 0), GeneratedBy::Fallback),
            ("B", t(10, 0), t(10, 30), GeneratedBy::Fallback),
        ]
    );
    assert_eq!(outcome.plan.generated_by, GeneratedBy::Fallback);
    assert_eq!(outcome.attempts, 0);
}

#[tokio::test]
async fn offline_plans_are_byte_identical() {
    let lines = [
        "Write report priority=high duration=90 due=12:00",
        "Email duration=20",
        "Review PR priority=high duration=45",
        "Call vendor priority=low duration=30 due=10:00",
        "Plan sprint duration=120",
    ];
    let first = Planner::new(None, RetryPolicy::default())
        .plan(&request_from(&lines, t(9, 7)))
        .await
        .unwrap();
    let second = Planner::new(None, RetryPolicy::default())
        .plan(&request_from(&lines, t(9, 7)))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_string(&first.plan).unwrap(),
        serde_json::to_string(&second.plan).unwrap()
    );
}

// -----------------------------------------------------------------------
// Engine replies
// -----------------------------------------------------------------------

#[tokio::test]
async fn clean_engine_reply_is_accepted() {
    let generator = ScriptedGenerator::with_texts([json_reply(&[
        (0, "A", "09:00", "10:00"),
        (1, "B", "10:15", "10:45"),
        (2, "C", "11:00", "11:30"),
    ])]);
    let outcome = Planner::new(Some(&generator), fast_policy())
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(outcome.plan.generated_by, GeneratedBy::Engine);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(outcome.plan.overall_rationale, "engine reasoning");
    assert_eq!(outcome.plan.blocks[1].rationale, "B fits here");
    assert!(outcome.plan.unscheduled.is_empty());
}

#[tokio::test]
async fn overlapping_engine_blocks_are_repaired() {
    let generator = ScriptedGenerator::with_texts([json_reply(&[
        (0, "A", "09:00", "10:00"),
        (1, "B", "09:30", "10:00"),
        (2, "C", "13:00", "13:30"),
    ])]);
    let outcome = Planner::new(Some(&generator), fast_policy())
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(
        blocks(&outcome.plan),
        vec![
            ("A", t(9, 0), t(10, 0), GeneratedBy::Engine),
            ("B", t(10, 0), t(10, 30), GeneratedBy::Engine),
            ("C", t(13, 0), t(13, 30), GeneratedBy::Engine),
        ]
    );
    assert_eq!(outcome.plan.generated_by, GeneratedBy::Engine);
}

#[tokio::test]
async fn omitted_task_is_retried_then_placed_by_fallback() {
    let partial = json_reply(&[(0, "A", "09:00", "10:00"), (1, "B", "10:00", "10:30")]);
    let generator = ScriptedGenerator::with_texts([partial.clone(), partial]);
    let outcome = Planner::new(Some(&generator), fast_policy())
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2, "exactly one retry");
    assert_eq!(generator.call_count(), 2);

    let prompts = generator.prompts();
    assert!(!prompts[0].user.contains("Previous attempt left these unscheduled"));
    assert!(prompts[1].user.contains("Previous attempt left these unscheduled"));
    assert!(prompts[1].user.contains("task_id 2: C"));

    assert_eq!(
        blocks(&outcome.plan),
        vec![
            ("A", t(9, 0), t(10, 0), GeneratedBy::Engine),
            ("B", t(10, 0), t(10, 30), GeneratedBy::Engine),
            ("C", t(10, 30), t(11, 0), GeneratedBy::Fallback),
        ]
    );
    assert_eq!(outcome.plan.generated_by, GeneratedBy::Fallback);
    assert!(outcome.plan.unscheduled.is_empty());
    assert!(
        outcome
            .plan
            .overall_rationale
            .contains("placed 1 of 1 task(s)")
    );
}

#[tokio::test]
async fn successful_retry_keeps_engine_provenance() {
    let generator = ScriptedGenerator::with_texts([
        json_reply(&[(0, "A", "09:00", "10:00"), (1, "B", "10:00", "10:30")]),
        json_reply(&[
            (0, "A", "09:00", "10:00"),
            (1, "B", "10:00", "10:30"),
            (2, "C", "10:45", "11:15"),
        ]),
    ]);
    let outcome = Planner::new(Some(&generator), fast_policy())
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.plan.generated_by, GeneratedBy::Engine);
    assert_eq!(outcome.plan.blocks.len(), 3);
}

#[tokio::test]
async fn worse_retry_is_ignored() {
    let generator = ScriptedGenerator::with_texts([
        json_reply(&[(0, "A", "09:00", "10:00"), (1, "B", "10:00", "10:30")]),
        json_reply(&[(0, "A", "14:00", "15:00")]),
    ]);
    let outcome = Planner::new(Some(&generator), fast_policy())
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(
        blocks(&outcome.plan),
        vec![
            ("A", t(9, 0), t(10, 0), GeneratedBy::Engine),
            ("B", t(10, 0), t(10, 30), GeneratedBy::Engine),
            ("C", t(10, 30), t(11, 0), GeneratedBy::Fallback),
        ]
    );
}

#[tokio::test]
async fn threshold_suppresses_retry() {
    let generator = ScriptedGenerator::with_texts([json_reply(&[
        (0, "A", "09:00", "10:00"),
        (1, "B", "10:00", "10:30"),
    ])]);
    let policy = RetryPolicy {
        unscheduled_threshold: 0.5,
        ..fast_policy()
    };
    let outcome = Planner::new(Some(&generator), policy)
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.plan.blocks.len(), 3);
}

#[tokio::test]
async fn markdown_reply_is_understood() {
    let reply = "\
## Today's Schedule

9:00 AM - 10:00 AM - A (Priority: High, Duration: 60 min)
  \u{2022} Rationale: hardest first
10:00 - 10:30 - B
10:30 - 11:00 - C

## Schedule Rationale
Front-loaded.";
    let generator = ScriptedGenerator::with_texts([reply]);
    let outcome = Planner::new(Some(&generator), fast_policy())
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(outcome.plan.generated_by, GeneratedBy::Engine);
    assert_eq!(outcome.plan.blocks[0].rationale, "hardest first");
    assert_eq!(outcome.plan.overall_rationale, "Front-loaded.");
}

// -----------------------------------------------------------------------
// Failures
// -----------------------------------------------------------------------

#[tokio::test]
async fn generator_errors_fall_back_completely() {
    let generator = ScriptedGenerator::new(vec![
        ScriptedReply::Error("503".to_string()),
        ScriptedReply::Text("I cannot help with that.".to_string()),
    ]);
    let outcome = Planner::new(Some(&generator), fast_policy())
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.engine_failures, vec!["generation failed: 503"]);
    assert_eq!(outcome.plan.generated_by, GeneratedBy::Fallback);
    assert_eq!(
        blocks(&outcome.plan),
        vec![
            ("A", t(9, 0), t(10, 0), GeneratedBy::Fallback),
            ("B", t(10, 0), t(10, 30), GeneratedBy::Fallback),
            ("C", t(10, 30), t(11, 0), GeneratedBy::Fallback),
        ]
    );
    assert!(
        outcome
            .plan
            .overall_rationale
            .starts_with("Generated by the local scheduler")
    );
}

#[tokio::test]
async fn timeout_counts_as_failed_attempt() {
    let generator = ScriptedGenerator::new(vec![ScriptedReply::Hang]);
    let policy = RetryPolicy {
        max_retries: 0,
        timeout: Duration::from_millis(50),
        ..RetryPolicy::default()
    };
    let outcome = Planner::new(Some(&generator), policy)
        .plan(&abc())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.engine_failures.len(), 1);
    assert!(outcome.engine_failures[0].contains("timed out"));
    assert_eq!(outcome.plan.generated_by, GeneratedBy::Fallback);
    assert_eq!(outcome.plan.blocks.len(), 3);
}

#[tokio::test]
async fn cancellation_during_generation_aborts() {
    let generator = ScriptedGenerator::new(vec![ScriptedReply::Hang]);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let policy = RetryPolicy {
        timeout: Duration::from_secs(30),
        ..RetryPolicy::default()
    };
    let result = Planner::new(Some(&generator), policy)
        .with_cancellation(token)
        .plan(&abc())
        .await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn day_too_short_marks_tasks_unscheduled() {
    let tasks = normalize_tasks(["A priority=high duration=60", "B duration=90"])
        .unwrap()
        .tasks;
    let prefs = Preferences {
        work_start: t(9, 0),
        work_end: t(10, 30),
        ..Preferences::default()
    };
    let request = ScheduleRequest::new(date(), tasks, prefs, date().and_time(t(8, 0)));
    let generator: &dyn Generator = &ScriptedGenerator::new(vec![]);
    let outcome = Planner::new(Some(generator), fast_policy())
        .plan(&request)
        .await
        .unwrap();

    assert_eq!(outcome.plan.blocks.len(), 1);
    assert_eq!(outcome.plan.unscheduled.len(), 1);
    assert_eq!(outcome.plan.unscheduled[0].title, "B");
    assert_eq!(
        outcome.plan.unscheduled[0].reason,
        UnscheduledReason::ExceedsWorkHours
    );
}
