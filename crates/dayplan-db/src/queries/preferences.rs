//! Database query functions for the singleton `preferences` table.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::Preferences;

/// Load the stored preferences, if any have been saved.
pub async fn load_preferences(pool: &SqlitePool) -> Result<Option<Preferences>> {
    let prefs = sqlx::query_as::<_, Preferences>(
        "SELECT work_start, work_end, break_interval_minutes, max_block_minutes, deep_work_enabled \
         FROM preferences WHERE id = 1",
    )
    .fetch_optional(pool)
    .await
    .context("failed to load preferences")?;

    Ok(prefs)
}

/// Store `prefs` as the default for future runs, replacing the previous row.
pub async fn save_preferences(pool: &SqlitePool, prefs: &Preferences) -> Result<()> {
    sqlx::query(
        "INSERT INTO preferences \
             (id, work_start, work_end, break_interval_minutes, max_block_minutes, deep_work_enabled, updated_at) \
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT (id) DO UPDATE SET \
             work_start = excluded.work_start, \
             work_end = excluded.work_end, \
             break_interval_minutes = excluded.break_interval_minutes, \
             max_block_minutes = excluded.max_block_minutes, \
             deep_work_enabled = excluded.deep_work_enabled, \
             updated_at = excluded.updated_at",
    )
    .bind(prefs.work_start)
    .bind(prefs.work_end)
    .bind(prefs.break_interval_minutes)
    .bind(prefs.max_block_minutes)
    .bind(prefs.deep_work_enabled)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("failed to save preferences")?;

    Ok(())
}
