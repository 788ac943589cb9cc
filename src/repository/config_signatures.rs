//! Config signature repository.
//!
//! Configuration files are read-only at runtime after an initial hash is
//! recorded; later loads verify the file has not silently changed. A
//! mismatch is a fatal configuration error until an explicit update
//! re-signs the file.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::schema::config_signatures;

use super::models::{ConfigSignatureRecord, NewConfigSignature};
use super::{format_datetime, AsyncSqlitePool, DieselError};

/// Repository for recorded configuration file signatures.
#[derive(Clone)]
pub struct ConfigSignatureRepository {
    pool: AsyncSqlitePool,
}

impl ConfigSignatureRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// The recorded signature for a named config file, if any.
    pub async fn signature_for(&self, name: &str) -> Result<Option<String>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<ConfigSignatureRecord> = config_signatures::table
            .filter(config_signatures::name.eq(name))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(|r| r.sig_hash))
    }

    /// Record (or re-record) a signature.
    pub async fn record(&self, name: &str, sig_hash: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let row = NewConfigSignature {
            name,
            sig_hash,
            updated_at: format_datetime(&Utc::now()),
        };
        diesel::replace_into(config_signatures::table)
            .values(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
