//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use sqlx::types::Json;

use crate::models::{Plan, PlanRow};

/// Insert a plan, replacing any existing plan for the same date.
///
/// The replacement happens inside a single transaction so readers never
/// observe a partially written row.
pub async fn upsert_plan(pool: &SqlitePool, plan: &Plan) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    sqlx::query(
        "INSERT INTO plans \
             (date, generated_by, overall_rationale, work_start, work_end, blocks, unscheduled, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT (date) DO UPDATE SET \
             generated_by = excluded.generated_by, \
             overall_rationale = excluded.overall_rationale, \
             work_start = excluded.work_start, \
             work_end = excluded.work_end, \
             blocks = excluded.blocks, \
             unscheduled = excluded.unscheduled, \
             updated_at = excluded.updated_at",
    )
    .bind(plan.date)
    .bind(plan.generated_by)
    .bind(&plan.overall_rationale)
    .bind(plan.work_start)
    .bind(plan.work_end)
    .bind(Json(&plan.blocks))
    .bind(Json(&plan.unscheduled))
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to upsert plan for {}", plan.date))?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(())
}

/// Fetch the plan for a date.
pub async fn get_plan(pool: &SqlitePool, date: NaiveDate) -> Result<Option<Plan>> {
    let row = sqlx::query_as::<_, PlanRow>("SELECT * FROM plans WHERE date = ?1")
        .bind(date)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch plan for {date}"))?;

    Ok(row.map(Plan::from))
}

/// List up to `limit` plans, newest date first.
pub async fn recent_plans(pool: &SqlitePool, limit: u32) -> Result<Vec<Plan>> {
    let rows = sqlx::query_as::<_, PlanRow>("SELECT * FROM plans ORDER BY date DESC LIMIT ?1")
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("failed to list recent plans")?;

    Ok(rows.into_iter().map(Plan::from).collect())
}

/// Count stored plans.
pub async fn count_plans(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM plans")
        .fetch_one(pool)
        .await
        .context("failed to count plans")?;

    Ok(count)
}
