use actix_web::{HttpResponse, http::StatusCode};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Body shape shared by every JSON response, success or failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[schema(example = "2026-01-12 00:05:31")]
    pub timestamp: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(success: bool, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success,
            message: message.into(),
            data,
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

pub fn envelope<T: Serialize>(
    status: StatusCode,
    success: bool,
    message: impl Into<String>,
    data: Option<T>,
) -> HttpResponse {
    HttpResponse::build(status).json(ApiResponse::new(success, message, data))
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
    envelope(StatusCode::OK, true, message, Some(data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
    envelope(StatusCode::CREATED, true, message, Some(data))
}

/// 200 with `data: null`, for lookups where "nothing yet" is not an error.
pub fn empty(message: impl Into<String>) -> HttpResponse {
    envelope::<()>(StatusCode::OK, true, message, None)
}

pub fn failure(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    envelope::<()>(status, false, message, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn envelope_carries_all_fields() {
        let res = ok("Attendance statistics retrieved", serde_json::json!({"n": 1}));
        assert_eq!(res.status(), StatusCode::OK);

        let body = to_bytes(res.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["n"], 1);
        assert_eq!(value["timestamp"].as_str().unwrap().len(), 19);
    }

    #[actix_web::test]
    async fn empty_has_null_data() {
        let res = empty("No attendance record for today");
        let body = to_bytes(res.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["data"].is_null());
        assert_eq!(value["message"], "No attendance record for today");
    }
}
