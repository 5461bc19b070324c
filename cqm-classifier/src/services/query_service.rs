//! Read-only queries over stored classification sessions

use cqm_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sessions;
use crate::models::{ClassificationSession, LotAverageQuality, OverallAverageQuality};

/// Classification query operations
#[derive(Clone)]
pub struct ClassificationQueries {
    pool: SqlitePool,
}

impl ClassificationQueries {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_session_by_id(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ClassificationSession>> {
        sessions::load_session(&self.pool, session_id).await
    }

    /// Sessions of one coffee lot, newest first
    pub async fn get_sessions_by_coffee_lot(
        &self,
        coffee_lot_id: i64,
    ) -> Result<Vec<ClassificationSession>> {
        sessions::sessions_by_coffee_lot(&self.pool, coffee_lot_id).await
    }

    /// Every session, newest first
    pub async fn get_all_sessions(&self) -> Result<Vec<ClassificationSession>> {
        sessions::all_sessions(&self.pool).await
    }

    /// `None` when the lot has no analysed beans
    pub async fn get_average_quality_by_coffee_lot(
        &self,
        coffee_lot_id: i64,
    ) -> Result<Option<LotAverageQuality>> {
        sessions::average_quality_by_coffee_lot(&self.pool, coffee_lot_id).await
    }

    /// `None` when no beans have been analysed
    pub async fn get_overall_average_quality(&self) -> Result<Option<OverallAverageQuality>> {
        sessions::overall_average_quality(&self.pool).await
    }
}
