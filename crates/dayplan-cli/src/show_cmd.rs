//! CLI handler for `dayplan show` and the terminal plan view shared with
//! `dayplan plan`.


use anyhow::Result;
use chrono::NaiveDate;
use sqlx::SqlitePool;

use dayplan_core::PlanStore;
use dayplan_core::clock::hhmm;
use dayplan_db::models::{GeneratedBy, Plan};

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Show the plan for `date`, or list the `recent` most recent plans.
pub async fn run_show(pool: &SqlitePool, date: NaiveDate, recent: Option<u32>) -> Result<()> {
    let store = PlanStore::new(pool.clone());

    if let Some(limit) = recent {
        let plans = store.recent(limit).await?;
        if plans.is_empty() {
            println!("No plans stored yet.");
            return Ok(());
        }
        print!("{}", format_plan_list(&plans));
        return Ok(());
    }

    match store.get(date).await? {
        Some(plan) => print!("{}", format_plan(&plan)),
        None => println!("No plan for {date}. Run `dayplan plan --date {date}` to create one."),
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Formatting
// -----------------------------------------------------------------------

fn provenance(generated_by: GeneratedBy) -> &'static str {
    match generated_by {
        GeneratedBy::Engine => "generation engine",
        GeneratedBy::Fallback => "local scheduler",
    }
}

/// Terminal rendering of a single plan.
pub fn format_plan(plan: &Plan) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Plan for {} ({} - {}, generated by {})\n",
        plan.date.format("%A, %Y-%m-%d"),
        hhmm(plan.work_start),
        hhmm(plan.work_end),
        provenance(plan.generated_by)
    ));
    out.push_str(&format!("{}\n", "=".repeat(60)));

    if plan.blocks.is_empty() {
        out.push_str("  (nothing scheduled)\n");
    }
    for block in &plan.blocks {
        let marker = match block.origin {
            GeneratedBy::Engine => ' ',
            GeneratedBy::Fallback => '*',
        };
        out.push_str(&format!(
            "{marker} {} - {}  {:<36} {:<6} {:>4} min{}\n",
            hhmm(block.start),
            hhmm(block.end),
            block.title,
            block.priority,
            block.duration_minutes(),
            if block.at_risk { "  [at risk]" } else { "" }
        ));
        if let Some(description) = &block.description {
            out.push_str(&format!("                 {description}\n"));
        }
        out.push_str(&format!("                 why: {}\n", block.rationale));
    }

    // Only worth a legend when both sources contributed blocks.
    if plan.blocks.iter().any(|b| b.origin == GeneratedBy::Fallback)
        && plan.blocks.iter().any(|b| b.origin == GeneratedBy::Engine)
    {
        out.push_str("\n  * placed by the local scheduler\n");
    }

    if !plan.unscheduled.is_empty() {
        out.push_str("\nUnscheduled:\n");
        for u in &plan.unscheduled {
            out.push_str(&format!("  - {} ({})\n", u.title, u.reason));
        }
    }

    out.push_str(&format!("\n{}\n", plan.overall_rationale.trim()));
    out
}

/// One line per plan: date, counts, provenance.
pub fn format_plan_list(plans: &[Plan]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:>6} {:>12}  GENERATED BY\n",
        "DATE", "BLOCKS", "UNSCHEDULED"
    ));
    for plan in plans {
        out.push_str(&format!(
            "{:<12} {:>6} {:>12}  {}\n",
            plan.date.format("%Y-%m-%d").to_string(),
            plan.blocks.len(),
            plan.unscheduled.len(),
            provenance(plan.generated_by)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;
    use dayplan_db::models::{
        Priority, ScheduleBlock, TaskId, UnscheduledReason, UnscheduledTask,
    };

    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn block(start: NaiveTime, end: NaiveTime, title: &str, origin: GeneratedBy) -> ScheduleBlock {
        ScheduleBlock {
            start,
            end,
            title: title.to_string(),
            source_task: TaskId(0),
            priority: Priority::High,
            description: None,
            rationale: "because".to_string(),
            origin,
            at_risk: false,
        }
    }

    fn mixed_plan() -> Plan {
        let mut risky = block(t(10, 0), t(10, 30), "Call bank", GeneratedBy::Fallback);
        risky.source_task = TaskId(1);
        risky.at_risk = true;
        Plan {
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            work_start: t(9, 0),
            work_end: t(18, 0),
            blocks: vec![block(t(9, 0), t(10, 0), "Write report", GeneratedBy::Engine), risky],
            unscheduled: vec![UnscheduledTask {
                task: TaskId(2),
                title: "Clean garage".to_string(),
                reason: UnscheduledReason::ExceedsWorkHours,
            }],
            overall_rationale: "Focus first.".to_string(),
            generated_by: GeneratedBy::Fallback,
        }
    }

    #[test]
    fn plan_view_lists_blocks_and_unscheduled() {
        let text = format_plan(&mixed_plan());
        assert!(text.starts_with("Plan for Friday, 2025-03-14 (09:00 - 18:00, generated by local scheduler)"));
        assert!(text.contains("  09:00 - 10:00  Write report"));
        assert!(text.contains("* 10:00 - 10:30  Call bank"));
        assert!(text.contains("[at risk]"));
        assert!(text.contains("* placed by the local scheduler"));
        assert!(text.contains("Unscheduled:\n  - Clean garage (exceeds available work hours)"));
        assert!(text.trim_end().ends_with("Focus first."));
    }

    #[test]
    fn empty_plan_view() {
        let plan = Plan {
            blocks: vec![],
            unscheduled: vec![],
            ..mixed_plan()
        };
        let text = format_plan(&plan);
        assert!(text.contains("(nothing scheduled)"));
        assert!(!text.contains("Unscheduled:"));
        assert!(!text.contains("placed by the local scheduler"));
    }

    #[test]
    fn plan_list_has_one_row_per_plan() {
        let text = format_plan_list(&[mixed_plan()]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("DATE"));
        assert!(lines[1].starts_with("2025-03-14"));
        assert!(lines[1].ends_with("local scheduler"));
    }
}
