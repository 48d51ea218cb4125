use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

#[derive(Serialize, Clone, Debug)]
pub struct ProgressRecord {
    pub id: String,
    pub student_id: String,
    pub classroom_id: String,
    pub school_id: String,
    pub subject: String,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbProgressRecord {
    pub id: Option<String>,
    pub student_id: Option<String>,
    pub classroom_id: Option<String>,
    pub school_id: Option<String>,
    pub subject: Option<String>,
    pub score: Option<f64>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbProgressRecord> for ProgressRecord {
    fn from(db: DbProgressRecord) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            student_id: db.student_id.unwrap_or_default(),
            classroom_id: db.classroom_id.unwrap_or_default(),
            school_id: db.school_id.unwrap_or_default(),
            subject: db.subject.unwrap_or_default(),
            score: db.score.unwrap_or_default(),
            updated_at: to_utc(db.updated_at),
        }
    }
}

/// Progress row joined with the student's profile name. The identity
/// data lives in an external platform; the join result gets an explicit
/// shape here instead of a loosely-typed nested object.
#[derive(Serialize, Clone, Debug)]
pub struct ProgressWithStudent {
    pub id: String,
    pub student_id: String,
    pub student_name: Option<String>,
    pub classroom_id: String,
    pub school_id: String,
    pub subject: String,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbProgressWithStudent {
    pub id: Option<String>,
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub classroom_id: Option<String>,
    pub school_id: Option<String>,
    pub subject: Option<String>,
    pub score: Option<f64>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbProgressWithStudent> for ProgressWithStudent {
    fn from(db: DbProgressWithStudent) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            student_id: db.student_id.unwrap_or_default(),
            student_name: db.student_name,
            classroom_id: db.classroom_id.unwrap_or_default(),
            school_id: db.school_id.unwrap_or_default(),
            subject: db.subject.unwrap_or_default(),
            score: db.score.unwrap_or_default(),
            updated_at: to_utc(db.updated_at),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ClassAverage {
    pub classroom_id: String,
    pub average_score: f64,
    pub last_calculated: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbClassAverage {
    pub classroom_id: Option<String>,
    pub average_score: Option<f64>,
    pub last_calculated: Option<NaiveDateTime>,
}

impl From<DbClassAverage> for ClassAverage {
    fn from(db: DbClassAverage) -> Self {
        Self {
            classroom_id: db.classroom_id.unwrap_or_default(),
            average_score: db.average_score.unwrap_or_default(),
            last_calculated: to_utc(db.last_calculated),
        }
    }
}

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}
