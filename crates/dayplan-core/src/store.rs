//! Plan store service layer.
//!
//! Wraps the `dayplan-db` queries with the checks that must hold for
//! anything written: a plan violating the structural invariants is refused
//! before any SQL runs.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::info;

use dayplan_db::models::{Plan, Preferences};
use dayplan_db::queries::{plans as plan_queries, preferences as pref_queries};

use crate::preferences::validate;
use crate::validate::check_invariants;

/// Plan and preference persistence keyed by date.
#[derive(Debug, Clone)]
pub struct PlanStore {
    pool: SqlitePool,
}

impl PlanStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace the plan for `plan.date`. Last write wins.
    pub async fn upsert(&self, plan: &Plan) -> Result<()> {
        check_invariants(plan)
            .with_context(|| format!("refusing to store invalid plan for {}", plan.date))?;
        plan_queries::upsert_plan(&self.pool, plan).await?;
        info!(date = %plan.date, blocks = plan.blocks.len(), "plan stored");
        Ok(())
    }

    /// The plan for `date`, or `None` if no plan exists.
    pub async fn get(&self, date: NaiveDate) -> Result<Option<Plan>> {
        plan_queries::get_plan(&self.pool, date).await
    }

    /// Up to `limit` plans, newest date first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<Plan>> {
        plan_queries::recent_plans(&self.pool, limit).await
    }

    pub async fn preferences(&self) -> Result<Option<Preferences>> {
        pref_queries::load_preferences(&self.pool).await
    }

    /// Persist `prefs` as the default for future runs.
    pub async fn save_preferences(&self, prefs: &Preferences) -> Result<()> {
        validate(prefs).context("refusing to store invalid preferences")?;
        pref_queries::save_preferences(&self.pool, prefs).await?;
        info!("preferences saved");
        Ok(())
    }
}
