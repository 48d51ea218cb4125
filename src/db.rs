use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::aggregate::{AverageStore, ScoreStore};
use crate::error::AppError;
use crate::models::{
    ClassAverage, DbClassAverage, DbProgressRecord, DbProgressWithStudent, ProgressRecord,
    ProgressWithStudent,
};

/// Primary record store: individual score rows, externally owned.
pub struct PrimaryDb(pub Pool<Sqlite>);

/// Secondary analytics store: one computed average per classroom.
/// Deliberately a separate database with its own connection string;
/// there is no cross-store transaction.
pub struct AnalyticsDb(pub Pool<Sqlite>);

#[instrument(skip(pool))]
pub async fn fetch_classroom_scores(
    pool: &Pool<Sqlite>,
    classroom_id: &str,
) -> Result<Vec<f64>, AppError> {
    info!("Fetching scores for classroom");
    let rows: Vec<(f64,)> = sqlx::query_as("SELECT score FROM progress WHERE classroom_id = ?")
        .bind(classroom_id)
        .fetch_all(pool)
        .await?;

    // Zero matching rows is a legitimate result, not an error.
    Ok(rows.into_iter().map(|(score,)| score).collect())
}

#[instrument(skip(pool))]
pub async fn get_classroom_progress(
    pool: &Pool<Sqlite>,
    classroom_id: &str,
) -> Result<Vec<ProgressWithStudent>, AppError> {
    info!("Getting classroom progress");
    let rows = sqlx::query_as::<_, DbProgressWithStudent>(
        "SELECT p.id, p.student_id, pr.full_name AS student_name, p.classroom_id,
                p.school_id, p.subject, p.score, p.updated_at
         FROM progress p
         LEFT JOIN profiles pr ON pr.id = p.student_id
         WHERE p.classroom_id = ?
         ORDER BY p.updated_at DESC",
    )
    .bind(classroom_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ProgressWithStudent::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_student_progress(
    pool: &Pool<Sqlite>,
    student_id: &str,
) -> Result<Vec<ProgressRecord>, AppError> {
    info!("Getting student progress");
    let rows = sqlx::query_as::<_, DbProgressRecord>(
        "SELECT id, student_id, classroom_id, school_id, subject, score, updated_at
         FROM progress
         WHERE student_id = ?
         ORDER BY updated_at DESC",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ProgressRecord::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_progress_record(
    pool: &Pool<Sqlite>,
    id: &str,
) -> Result<ProgressRecord, AppError> {
    info!("Getting progress record");
    let row = sqlx::query_as::<_, DbProgressRecord>(
        "SELECT id, student_id, classroom_id, school_id, subject, score, updated_at
         FROM progress
         WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(record) => Ok(ProgressRecord::from(record)),
        _ => Err(AppError::NotFound(format!(
            "Progress record {} not found",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn create_progress_record(
    pool: &Pool<Sqlite>,
    student_id: &str,
    classroom_id: &str,
    school_id: &str,
    subject: &str,
    score: f64,
) -> Result<ProgressRecord, AppError> {
    info!("Creating progress record");
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        "INSERT INTO progress (id, student_id, classroom_id, school_id, subject, score, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(student_id)
    .bind(classroom_id)
    .bind(school_id)
    .bind(subject)
    .bind(score)
    .bind(now)
    .execute(pool)
    .await?;

    get_progress_record(pool, &id).await
}

#[instrument(skip(pool))]
pub async fn update_score(pool: &Pool<Sqlite>, id: &str, score: f64) -> Result<(), AppError> {
    info!("Updating score");
    let now = Utc::now().naive_utc();

    let result = sqlx::query("UPDATE progress SET score = ?, updated_at = ? WHERE id = ?")
        .bind(score)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Progress record {} not found",
            id
        )));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn upsert_class_average(
    pool: &Pool<Sqlite>,
    classroom_id: &str,
    average: f64,
    calculated_at: DateTime<Utc>,
) -> Result<(), AppError> {
    info!("Upserting class average");

    // Single statement, atomic per key: a reader sees either the prior
    // row or the new one, never a partial update.
    let result = sqlx::query(
        "INSERT INTO class_averages (classroom_id, average_score, last_calculated)
         VALUES (?, ?, ?)
         ON CONFLICT(classroom_id) DO UPDATE SET
             average_score = excluded.average_score,
             last_calculated = excluded.last_calculated",
    )
    .bind(classroom_id)
    .bind(average)
    .bind(calculated_at.naive_utc())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Store(format!(
            "average upsert for classroom {} reported no row written",
            classroom_id
        )));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_class_average(
    pool: &Pool<Sqlite>,
    classroom_id: &str,
) -> Result<Option<ClassAverage>, AppError> {
    info!("Getting class average");
    let row = sqlx::query_as::<_, DbClassAverage>(
        "SELECT classroom_id, average_score, last_calculated
         FROM class_averages
         WHERE classroom_id = ?",
    )
    .bind(classroom_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ClassAverage::from))
}

pub struct SqliteScoreStore {
    pool: Pool<Sqlite>,
}

impl SqliteScoreStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn fetch_scores(&self, classroom_id: &str) -> Result<Vec<f64>, AppError> {
        fetch_classroom_scores(&self.pool, classroom_id).await
    }
}

pub struct SqliteAverageStore {
    pool: Pool<Sqlite>,
}

impl SqliteAverageStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl AverageStore for SqliteAverageStore {
    async fn upsert_average(
        &self,
        classroom_id: &str,
        average: f64,
        calculated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        upsert_class_average(&self.pool, classroom_id, average, calculated_at).await
    }
}
