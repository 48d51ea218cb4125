use crate::error::AppError;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Serialize;
use std::collections::HashMap;
use tracing::instrument;
use validator::Validate;

#[derive(Debug, Serialize, Clone)]
pub struct ValidationResponse {
    pub status: &'static str,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error",
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

pub trait ToValidationResponse {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>>;
}

impl ToValidationResponse for AppError {
    #[instrument]
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        self.log_and_record("API Validation Error");
        let status = self.status_code();

        let (field, message) = match &self {
            AppError::Database(db_err) => ("database", format!("Database error: {}", db_err)),
            AppError::Store(msg) => ("store", format!("Store error: {}", msg)),
            AppError::Validation(msg) => ("validation", format!("Validation error: {}", msg)),
            AppError::Configuration(_) => {
                ("configuration", "Service is misconfigured".to_string())
            }
            AppError::NotFound(msg) => ("resource", format!("Not found: {}", msg)),
            AppError::Cancelled(msg) => ("request", format!("Request cancelled: {}", msg)),
            AppError::Internal(_) => ("server", "Internal server error".to_string()),
        };

        Custom(
            status,
            Json(ValidationResponse::with_error(field, &message)),
        )
    }
}

#[derive(Debug)]
pub struct ValidationErrorWrapper(pub validator::ValidationErrors);

impl From<ValidationErrorWrapper> for Custom<Json<ValidationResponse>> {
    #[instrument]
    fn from(wrapper: ValidationErrorWrapper) -> Self {
        let errors = wrapper.0;
        let mut error_map = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::new(error_map)),
        )
    }
}

pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, Custom<Json<ValidationResponse>>>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, Custom<Json<ValidationResponse>>> {
        if let Err(errors) = self.0.validate() {
            return Err(ValidationErrorWrapper(errors).into());
        }
        Ok(self.0)
    }
}

pub trait AppErrorExt<T> {
    fn validate_custom(self) -> Result<T, Custom<Json<ValidationResponse>>>;
}

impl<T> AppErrorExt<T> for Result<T, AppError> {
    fn validate_custom(self) -> Result<T, Custom<Json<ValidationResponse>>> {
        self.map_err(|err| err.to_validation_response())
    }
}
