//! Plugin run repository.
//!
//! Tracks plugin executions per (scene, plugin) pair. A missing row means
//! "not yet attempted"; once an attempt finishes, `completed` is set whether
//! it succeeded or not, so pending lists drain even for plugins that always
//! fail. Only an explicit reset re-queues a run.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::info;

use crate::models::{PluginOutcome, PluginRun};
use crate::schema::plugin_runs;

use super::models::{NewPluginRun, PluginRunRecord};
use super::{format_datetime, AsyncSqlitePool, DieselError};

/// Which scenes a plugin reset applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    One(i64),
    All,
}

/// Repository for plugin execution records.
#[derive(Clone)]
pub struct PluginRunRepository {
    pool: AsyncSqlitePool,
}

impl PluginRunRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Plugin keys from `registered` that still need a run for this scene:
    /// no row at all, or a row whose attempt never finished.
    pub async fn pending_for_scene(
        &self,
        pid: i64,
        registered: &[String],
    ) -> Result<Vec<String>, DieselError> {
        let mut conn = self.pool.get().await?;
        let finished: Vec<String> = plugin_runs::table
            .filter(plugin_runs::scene_pid.eq(pid))
            .filter(plugin_runs::completed.eq(true))
            .select(plugin_runs::plugin_key)
            .load(&mut conn)
            .await?;
        Ok(registered
            .iter()
            .filter(|key| !finished.contains(key))
            .cloned()
            .collect())
    }

    /// All runs recorded for a scene.
    pub async fn runs_for_scene(&self, pid: i64) -> Result<Vec<PluginRun>, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<PluginRunRecord> = plugin_runs::table
            .filter(plugin_runs::scene_pid.eq(pid))
            .order(plugin_runs::plugin_key.asc())
            .load(&mut conn)
            .await?;
        Ok(records
            .into_iter()
            .map(PluginRunRecord::into_plugin_run)
            .collect())
    }

    /// One run, if recorded.
    pub async fn get_run(
        &self,
        pid: i64,
        plugin_key: &str,
    ) -> Result<Option<PluginRun>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<PluginRunRecord> = plugin_runs::table
            .filter(plugin_runs::scene_pid.eq(pid))
            .filter(plugin_runs::plugin_key.eq(plugin_key))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(PluginRunRecord::into_plugin_run))
    }

    /// Record that an attempt has started. Replaces any previous
    /// (incomplete or reset) row for the pair.
    pub async fn record_start(
        &self,
        pid: i64,
        plugin_key: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let row = NewPluginRun {
            scene_pid: pid,
            plugin_key,
            completed: false,
            success: false,
            produced_artifacts: false,
            error: None,
            started_at: Some(format_datetime(&started_at)),
            finished_at: None,
            output: None,
        };
        diesel::replace_into(plugin_runs::table)
            .values(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Record the outcome of an attempt. Always sets `completed`.
    pub async fn record_outcome(
        &self,
        pid: i64,
        plugin_key: &str,
        outcome: &PluginOutcome,
        error: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let output = outcome
            .output
            .as_ref()
            .and_then(|doc| serde_json::to_string(doc).ok());
        diesel::update(
            plugin_runs::table
                .filter(plugin_runs::scene_pid.eq(pid))
                .filter(plugin_runs::plugin_key.eq(plugin_key)),
        )
        .set((
            plugin_runs::completed.eq(true),
            plugin_runs::success.eq(outcome.success),
            plugin_runs::produced_artifacts.eq(outcome.produced_artifacts),
            plugin_runs::error.eq(error),
            plugin_runs::finished_at.eq(format_datetime(&finished_at)),
            plugin_runs::output.eq(output),
        ))
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    /// Remove run records so the named plugins become pending again.
    ///
    /// An empty `keys` slice resets every plugin for the scope.
    pub async fn reset(&self, scope: ResetScope, keys: &[String]) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let removed = match (scope, keys.is_empty()) {
            (ResetScope::One(pid), true) => {
                diesel::delete(plugin_runs::table.filter(plugin_runs::scene_pid.eq(pid)))
                    .execute(&mut conn)
                    .await?
            }
            (ResetScope::One(pid), false) => {
                diesel::delete(
                    plugin_runs::table
                        .filter(plugin_runs::scene_pid.eq(pid))
                        .filter(plugin_runs::plugin_key.eq_any(keys)),
                )
                .execute(&mut conn)
                .await?
            }
            (ResetScope::All, true) => {
                diesel::delete(plugin_runs::table).execute(&mut conn).await?
            }
            (ResetScope::All, false) => {
                diesel::delete(plugin_runs::table.filter(plugin_runs::plugin_key.eq_any(keys)))
                    .execute(&mut conn)
                    .await?
            }
        };
        info!(removed, "plugin runs reset");
        Ok(removed as u64)
    }

    /// Summary counts for one plugin across all scenes.
    pub async fn plugin_report(&self, plugin_key: &str) -> Result<PluginReport, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<PluginRunRecord> = plugin_runs::table
            .filter(plugin_runs::plugin_key.eq(plugin_key))
            .load(&mut conn)
            .await?;
        let mut report = PluginReport::default();
        for record in records {
            report.attempted += 1;
            if record.completed {
                report.completed += 1;
            }
            if record.success {
                report.succeeded += 1;
            } else if record.completed {
                report.failed += 1;
            }
            if record.produced_artifacts {
                report.with_artifacts += 1;
            }
        }
        Ok(report)
    }
}

/// Aggregate outcome counts for one plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginReport {
    pub attempted: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub with_artifacts: u64,
}
