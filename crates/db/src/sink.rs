//! PostgreSQL-backed [`ReadingSink`].

use async_trait::async_trait;
use soilwatch_core::error::CoreError;
use soilwatch_core::reading::Reading;
use soilwatch_core::sink::ReadingSink;

use crate::repositories::ReadingRepo;
use crate::DbPool;

/// Appends readings through the shared connection pool.
#[derive(Clone)]
pub struct PgReadingSink {
    pool: DbPool,
}

impl PgReadingSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingSink for PgReadingSink {
    async fn append(&self, reading: &Reading) -> Result<(), CoreError> {
        let id = ReadingRepo::insert(&self.pool, reading)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        tracing::debug!(id, "Reading persisted");
        Ok(())
    }
}
