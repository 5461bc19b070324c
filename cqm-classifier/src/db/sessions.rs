//! Classification session persistence and queries

use async_trait::async_trait;
use cqm_common::time::{from_storage, to_storage};
use cqm_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::collaborators::SessionStore;
use crate::grading::round_to;
use crate::models::{
    ClassificationResult, ClassificationSession, GrainAnalysis, ImageReference,
    LotAverageQuality, OverallAverageQuality, SessionStatus, QUALITY_SCALE,
};

const SESSION_COLUMNS: &str = r#"
    session_id, coffee_lot_id, user_id, status, classification_result,
    total_grains_analyzed, processing_time_seconds, created_at, completed_at
"#;

/// Save a session and all its analyses in one transaction
///
/// Saving an already stored session replaces its row and analyses.
pub async fn save_session(pool: &SqlitePool, session: &ClassificationSession) -> Result<()> {
    // Serialize everything before touching the database
    let session_id = session.session_id().to_string();
    let classification_result = session
        .classification_result()
        .map(serde_json::to_string)
        .transpose()?;
    let created_at = to_storage(&session.created_at());
    let completed_at = session.completed_at().map(|dt| to_storage(&dt));

    struct AnalysisRow {
        analysis_id: String,
        bean_index: i64,
        image_url: Option<String>,
        storage_public_id: Option<String>,
        color_percentages: String,
        features: String,
        quality_assessment: String,
        final_score: f64,
        final_category: String,
        created_at: String,
    }

    let analyses = session
        .analyses()
        .iter()
        .map(|a| {
            Ok(AnalysisRow {
                analysis_id: a.analysis_id().to_string(),
                bean_index: a.bean_index() as i64,
                image_url: a.image_url().map(str::to_string),
                storage_public_id: a.storage_public_id().map(str::to_string),
                color_percentages: serde_json::to_string(a.color_percentages())?,
                features: serde_json::to_string(a.features())?,
                quality_assessment: serde_json::to_string(a.quality_assessment())?,
                final_score: a.final_score(),
                final_category: a.final_category().to_string(),
                created_at: to_storage(&a.created_at()),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO classification_sessions (
            session_id, coffee_lot_id, user_id, status, classification_result,
            total_grains_analyzed, processing_time_seconds, created_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            status = excluded.status,
            classification_result = excluded.classification_result,
            total_grains_analyzed = excluded.total_grains_analyzed,
            processing_time_seconds = excluded.processing_time_seconds,
            completed_at = excluded.completed_at
        "#,
    )
    .bind(&session_id)
    .bind(session.coffee_lot_id())
    .bind(session.user_id())
    .bind(session.status().as_str())
    .bind(&classification_result)
    .bind(session.total_grains_analyzed() as i64)
    .bind(session.processing_time_seconds())
    .bind(&created_at)
    .bind(&completed_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM grain_analyses WHERE session_id = ?")
        .bind(&session_id)
        .execute(&mut *tx)
        .await?;

    for row in &analyses {
        sqlx::query(
            r#"
            INSERT INTO grain_analyses (
                analysis_id, session_id, bean_index, image_url, storage_public_id,
                color_percentages, features, quality_assessment,
                final_score, final_category, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.analysis_id)
        .bind(&session_id)
        .bind(row.bean_index)
        .bind(&row.image_url)
        .bind(&row.storage_public_id)
        .bind(&row.color_percentages)
        .bind(&row.features)
        .bind(&row.quality_assessment)
        .bind(row.final_score)
        .bind(&row.final_category)
        .bind(&row.created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::debug!(
        session_id = %session_id,
        analyses = analyses.len(),
        "Classification session saved"
    );

    Ok(())
}

/// Load one session with its analyses
pub async fn load_session(
    pool: &SqlitePool,
    session_id: Uuid,
) -> Result<Option<ClassificationSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM classification_sessions WHERE session_id = ?",
        SESSION_COLUMNS
    ))
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(session_from_row(pool, &row).await?)),
        None => Ok(None),
    }
}

/// Sessions of one coffee lot, newest first
pub async fn sessions_by_coffee_lot(
    pool: &SqlitePool,
    coffee_lot_id: i64,
) -> Result<Vec<ClassificationSession>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM classification_sessions WHERE coffee_lot_id = ? ORDER BY created_at DESC, rowid DESC",
        SESSION_COLUMNS
    ))
    .bind(coffee_lot_id)
    .fetch_all(pool)
    .await?;

    sessions_from_rows(pool, &rows).await
}

/// Every stored session, newest first
pub async fn all_sessions(pool: &SqlitePool) -> Result<Vec<ClassificationSession>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM classification_sessions ORDER BY created_at DESC, rowid DESC",
        SESSION_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    sessions_from_rows(pool, &rows).await
}

/// Average final score of a lot's analyses, `None` when the lot has none
pub async fn average_quality_by_coffee_lot(
    pool: &SqlitePool,
    coffee_lot_id: i64,
) -> Result<Option<LotAverageQuality>> {
    let row = sqlx::query(
        r#"
        SELECT AVG(g.final_score) AS avg_score, COUNT(g.analysis_id) AS total_grains
        FROM grain_analyses g
        JOIN classification_sessions s ON g.session_id = s.session_id
        WHERE s.coffee_lot_id = ?
        "#,
    )
    .bind(coffee_lot_id)
    .fetch_one(pool)
    .await?;

    let avg_score: Option<f64> = row.try_get("avg_score")?;
    Ok(avg_score.map(|avg| LotAverageQuality {
        coffee_lot_id,
        average_quality_percentage: round_to(avg * 100.0, 2),
        total_grains_analyzed: row.get("total_grains"),
        quality_scale: QUALITY_SCALE.to_string(),
    }))
}

/// Average final score over every analysis, `None` when there are none
pub async fn overall_average_quality(pool: &SqlitePool) -> Result<Option<OverallAverageQuality>> {
    let row = sqlx::query(
        r#"
        SELECT AVG(g.final_score) AS avg_score,
               COUNT(g.analysis_id) AS total_grains,
               COUNT(DISTINCT s.coffee_lot_id) AS total_lots
        FROM grain_analyses g
        JOIN classification_sessions s ON g.session_id = s.session_id
        "#,
    )
    .fetch_one(pool)
    .await?;

    let avg_score: Option<f64> = row.try_get("avg_score")?;
    Ok(avg_score.map(|avg| OverallAverageQuality {
        average_quality_percentage: round_to(avg * 100.0, 2),
        total_grains_analyzed: row.get("total_grains"),
        total_coffee_lots: row.get("total_lots"),
        quality_scale: QUALITY_SCALE.to_string(),
    }))
}

async fn sessions_from_rows(
    pool: &SqlitePool,
    rows: &[SqliteRow],
) -> Result<Vec<ClassificationSession>> {
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        sessions.push(session_from_row(pool, row).await?);
    }
    Ok(sessions)
}

async fn session_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<ClassificationSession> {
    let session_id: String = row.try_get("session_id")?;
    let session_id = cqm_common::uuid_utils::parse(&session_id)?;

    let status: String = row.try_get("status")?;
    let status: SessionStatus = status.parse().map_err(Error::Internal)?;

    let classification_result: Option<String> = row.try_get("classification_result")?;
    let classification_result = classification_result
        .map(|json| serde_json::from_str::<ClassificationResult>(&json))
        .transpose()?;

    let created_at: String = row.try_get("created_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let completed_at = completed_at.as_deref().map(from_storage).transpose()?;

    let analyses = load_analyses(pool, session_id).await?;

    Ok(ClassificationSession::restore(
        session_id,
        row.try_get("coffee_lot_id")?,
        row.try_get("user_id")?,
        status,
        classification_result,
        row.try_get::<i64, _>("total_grains_analyzed")? as usize,
        row.try_get("processing_time_seconds")?,
        from_storage(&created_at)?,
        completed_at,
        analyses,
    ))
}

async fn load_analyses(pool: &SqlitePool, session_id: Uuid) -> Result<Vec<GrainAnalysis>> {
    let rows = sqlx::query(
        r#"
        SELECT analysis_id, bean_index, image_url, storage_public_id,
               color_percentages, features, quality_assessment, created_at
        FROM grain_analyses
        WHERE session_id = ?
        ORDER BY bean_index ASC
        "#,
    )
    .bind(session_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let analysis_id: String = row.try_get("analysis_id")?;
            let color_percentages: String = row.try_get("color_percentages")?;
            let features: String = row.try_get("features")?;
            let quality_assessment: String = row.try_get("quality_assessment")?;
            let created_at: String = row.try_get("created_at")?;

            // final_score/final_category are derived from the assessment again
            Ok(GrainAnalysis::restore(
                cqm_common::uuid_utils::parse(&analysis_id)?,
                session_id,
                row.try_get::<i64, _>("bean_index")? as usize,
                ImageReference {
                    url: row.try_get("image_url")?,
                    public_id: row.try_get("storage_public_id")?,
                },
                serde_json::from_str(&color_percentages)?,
                serde_json::from_str(&features)?,
                serde_json::from_str(&quality_assessment)?,
                from_storage(&created_at)?,
            ))
        })
        .collect()
}

/// [`SessionStore`] writing to the SQLite pool
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(&self, session: &ClassificationSession) -> Result<()> {
        save_session(&self.pool, session).await
    }
}
