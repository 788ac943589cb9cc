//! Usage log repository.
//!
//! Append-only: the pipeline driver writes one entry when a stage block
//! starts and one when it ends. Nothing here updates or deletes rows.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::models::UsageLogEntry;
use crate::schema::usage_log;

use super::models::{NewUsageLog, UsageLogRecord};
use super::{format_datetime, AsyncSqlitePool, DieselError};

/// Repository for the append-only usage audit trail.
#[derive(Clone)]
pub struct UsageLogRepository {
    pool: AsyncSqlitePool,
}

impl UsageLogRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry. The stored timestamp is the insertion time unless
    /// the entry carries its own.
    pub async fn add_entry(&self, entry: &UsageLogEntry) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let logged_at = entry.logged_at.unwrap_or_else(Utc::now);
        let row = NewUsageLog {
            logged_at: format_datetime(&logged_at),
            sensor: &entry.sensor,
            description: &entry.description,
            updated_local_db: entry.updated_local_db,
            found_new_scenes: entry.found_new_scenes,
            downloaded_scenes: entry.downloaded_scenes,
            converted_ard: entry.converted_ard,
            loaded_datacube: entry.loaded_datacube,
            start_block: entry.start_block,
            end_block: entry.end_block,
        };
        diesel::insert_into(usage_log::table)
            .values(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// The most recent entries, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<UsageLogEntry>, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<UsageLogRecord> = usage_log::table
            .order(usage_log::id.desc())
            .limit(limit)
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(UsageLogRecord::into_entry).collect())
    }
}
