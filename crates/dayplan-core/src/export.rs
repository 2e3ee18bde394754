//! Markdown rendering and export of plans.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use dayplan_db::models::{GeneratedBy, Plan};

use crate::clock::hhmm;

pub const DEFAULT_OUTPUT_DIR: &str = "DailyPlans";

/// Render a plan as a markdown document.
pub fn render_markdown(plan: &Plan) -> String {
    let mut out = String::with_capacity(1024);

    out.push_str(&format!("# Daily Plan - {}\n", plan.date.format("%Y-%m-%d")));
    out.push_str(&format!(
        "\n_{} | working hours {} - {} | generated by {}_\n",
        plan.date.format("%A, %B %d, %Y"),
        hhmm(plan.work_start),
        hhmm(plan.work_end),
        match plan.generated_by {
            GeneratedBy::Engine => "generation engine",
            GeneratedBy::Fallback => "local scheduler",
        }
    ));

    out.push_str("\n## Schedule\n\n");
    if plan.blocks.is_empty() {
        out.push_str("Nothing scheduled.\n");
    }
    for block in &plan.blocks {
        out.push_str(&format!(
            "### {} - {} | {}\n",
            hhmm(block.start),
            hhmm(block.end),
            block.title
        ));
        out.push_str(&format!(
            "- Priority: {} | Duration: {} min{}\n",
            block.priority,
            block.duration_minutes(),
            if block.at_risk { " | **at risk**" } else { "" }
        ));
        if let Some(description) = &block.description {
            out.push_str(&format!("- Description: {description}\n"));
        }
        out.push_str(&format!("- Rationale: {}\n\n", block.rationale));
    }

    if !plan.unscheduled.is_empty() {
        out.push_str("## Unscheduled\n\n");
        for u in &plan.unscheduled {
            out.push_str(&format!("- {} ({})\n", u.title, u.reason));
        }
        out.push('\n');
    }

    out.push_str("## Reasoning\n\n");
    out.push_str(plan.overall_rationale.trim());
    out.push('\n');
    out
}

/// `<output_dir>/<YYYY-MM-DD>.md`
pub fn plan_file_path(output_dir: &Path, plan: &Plan) -> PathBuf {
    output_dir.join(format!("{}.md", plan.date.format("%Y-%m-%d")))
}

/// Write the rendered plan, creating `output_dir` if needed.
pub fn write_markdown(output_dir: &Path, plan: &Plan) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let path = plan_file_path(output_dir, plan);
    std::fs::write(&path, render_markdown(plan))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
