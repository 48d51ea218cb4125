use std::time::Duration;

use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use validator::Validate;

use crate::aggregate::AverageService;
use crate::db::{
    AnalyticsDb, PrimaryDb, create_progress_record, get_class_average, get_classroom_progress,
    get_student_progress, update_score,
};
use crate::models::{ClassAverage, ProgressRecord, ProgressWithStudent};
use crate::validation::AppErrorExt;
use crate::validation::JsonValidateExt;
use crate::validation::ValidationResponse;

#[derive(Deserialize, Validate)]
pub struct ClassAverageRequest {
    #[validate(length(min = 1, message = "classroom_id is required"))]
    pub classroom_id: String,
    /// Optional caller-supplied deadline for the whole pipeline.
    pub deadline_ms: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct ClassAverageResponse {
    pub success: bool,
    pub average_score: f64,
}

#[derive(Serialize, Deserialize)]
pub struct StoredAverageResponse {
    pub classroom_id: String,
    pub average_score: f64,
    pub last_calculated: String,
}

impl From<ClassAverage> for StoredAverageResponse {
    fn from(average: ClassAverage) -> Self {
        Self {
            classroom_id: average.classroom_id,
            average_score: average.average_score,
            last_calculated: average.last_calculated.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ProgressResponse {
    pub id: String,
    pub student_id: String,
    pub student_name: Option<String>,
    pub classroom_id: String,
    pub subject: String,
    pub score: f64,
    pub updated_at: String,
}

impl From<ProgressWithStudent> for ProgressResponse {
    fn from(record: ProgressWithStudent) -> Self {
        Self {
            id: record.id,
            student_id: record.student_id,
            student_name: record.student_name,
            classroom_id: record.classroom_id,
            subject: record.subject,
            score: record.score,
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

impl From<ProgressRecord> for ProgressResponse {
    fn from(record: ProgressRecord) -> Self {
        Self {
            id: record.id,
            student_id: record.student_id,
            student_name: None,
            classroom_id: record.classroom_id,
            subject: record.subject,
            score: record.score,
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct StudentScoreResponse {
    pub id: String,
    pub classroom_id: String,
    pub subject: String,
    pub score: f64,
    pub updated_at: String,
}

impl From<ProgressRecord> for StudentScoreResponse {
    fn from(record: ProgressRecord) -> Self {
        Self {
            id: record.id,
            classroom_id: record.classroom_id,
            subject: record.subject,
            score: record.score,
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct CreateProgressRequest {
    #[validate(length(min = 1, message = "student_id is required"))]
    pub student_id: String,
    #[validate(length(min = 1, message = "classroom_id is required"))]
    pub classroom_id: String,
    #[validate(length(min = 1, message = "school_id is required"))]
    pub school_id: String,
    #[validate(length(min = 1, message = "subject is required"))]
    pub subject: String,
    // Expected range is 0-100 but not enforced here; the record store
    // owns that policy.
    pub score: f64,
}

#[derive(Deserialize)]
pub struct ScoreUpdateRequest {
    pub score: f64,
}

/// The remote-procedure entry point: compute and persist the class
/// average for one classroom, returning the computed value. A store
/// failure is reported as a failure, never as a fabricated zero.
#[post("/class-average", data = "<request>")]
pub async fn api_class_average(
    request: Json<ClassAverageRequest>,
    service: &State<AverageService>,
) -> Result<Json<ClassAverageResponse>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;
    let deadline = validated.deadline_ms.map(Duration::from_millis);

    let average_score = service
        .run(&validated.classroom_id, deadline)
        .await
        .validate_custom()?;

    Ok(Json(ClassAverageResponse {
        success: true,
        average_score,
    }))
}

// CORS preflight: answered permissively with no body processing. The
// headers themselves come from the Cors fairing.
#[options("/<_..>")]
pub fn api_preflight() -> &'static str {
    "ok"
}

#[get("/classrooms/<classroom_id>/progress")]
pub async fn api_get_classroom_progress(
    classroom_id: &str,
    db: &State<PrimaryDb>,
) -> Result<Json<Vec<ProgressResponse>>, Status> {
    let records = get_classroom_progress(&db.0, classroom_id).await?;

    Ok(Json(
        records.into_iter().map(ProgressResponse::from).collect(),
    ))
}

#[get("/classrooms/<classroom_id>/average")]
pub async fn api_get_class_average(
    classroom_id: &str,
    db: &State<AnalyticsDb>,
) -> Result<Json<StoredAverageResponse>, Status> {
    match get_class_average(&db.0, classroom_id).await? {
        Some(average) => Ok(Json(StoredAverageResponse::from(average))),
        None => Err(Status::NotFound),
    }
}

#[get("/students/<student_id>/progress")]
pub async fn api_get_student_progress(
    student_id: &str,
    db: &State<PrimaryDb>,
) -> Result<Json<Vec<StudentScoreResponse>>, Status> {
    let records = get_student_progress(&db.0, student_id).await?;

    Ok(Json(
        records.into_iter().map(StudentScoreResponse::from).collect(),
    ))
}

#[post("/progress", data = "<request>")]
pub async fn api_create_progress(
    request: Json<CreateProgressRequest>,
    db: &State<PrimaryDb>,
) -> Result<Json<ProgressResponse>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    let record = create_progress_record(
        &db.0,
        &validated.student_id,
        &validated.classroom_id,
        &validated.school_id,
        &validated.subject,
        validated.score,
    )
    .await
    .validate_custom()?;

    Ok(Json(ProgressResponse::from(record)))
}

#[put("/progress/<id>", data = "<request>")]
pub async fn api_update_score(
    id: &str,
    request: Json<ScoreUpdateRequest>,
    db: &State<PrimaryDb>,
) -> Result<Status, Status> {
    update_score(&db.0, id, request.score).await?;

    Ok(Status::Ok)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
