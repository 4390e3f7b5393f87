use actix_web::{HttpMessage, HttpRequest, HttpResponse, web};
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::attendance::AttendanceStore;
use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::gate::{
    context::HeaderSnapshot,
    geo::is_valid_coordinate,
    location::{LocationContext, LocationGate},
    middleware::NetworkClearance,
};
use crate::model::attendance::{AttendanceHistoryItem, AttendanceResponse};
use crate::models::{AttendanceReq, HistoryQuery};
use crate::utils::{
    response::{empty, ok},
    validation::Validator,
};

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceHistoryResponse {
    pub history: Vec<AttendanceHistoryItem>,
    pub pagination: Pagination,
}

/// `(page, limit)` with page ≥ 1 and limit in 1..=100; anything else falls
/// back to the defaults.
fn page_window(query: &HistoryQuery) -> (u32, u32) {
    let page = query
        .page
        .filter(|p| *p >= 1)
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or(1);

    let limit = query
        .limit
        .and_then(|l| u32::try_from(l).ok())
        .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
        .unwrap_or(DEFAULT_PAGE_SIZE);

    (page, limit)
}

fn total_pages(total: i64, limit: u32) -> i64 {
    let limit = i64::from(limit);
    (total + limit - 1) / limit
}

/// Coordinate validity, then spoof heuristics and geofencing.
/// `attendances.address` column width.
const ADDRESS_MAX_CHARS: usize = 255;

fn gate_location(req: &HttpRequest, body: &AttendanceReq, gate: &LocationGate) -> Result<(), AppError> {
    if !is_valid_coordinate(body.latitude, body.longitude) {
        return Err(AppError::BadRequest("Invalid GPS coordinates".into()));
    }
    Validator::new()
        .optional_length("address", body.address.as_deref(), 0, Some(ADDRESS_MAX_CHARS))
        .finish()?;

    let admin_bypassed = req
        .extensions()
        .get::<NetworkClearance>()
        .is_some_and(NetworkClearance::is_admin_bypass);

    let ctx = LocationContext::with_headers(body.point(), HeaderSnapshot::from_header_map(req.headers()));
    gate.check(&ctx, admin_bypassed).map_err(AppError::GateRejected)
}

/// Record today's check in
#[utoipa::path(
    post,
    path = "/api/v1/attendance/checkin",
    request_body = AttendanceReq,
    responses(
        (status = 200, description = "Check in successful", body = AttendanceResponse),
        (status = 400, description = "Invalid GPS coordinates or address"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Rejected by a network or location gate"),
        (status = 409, description = "Already checked in today"),
        (status = 503, description = "Database unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_checkin", skip_all, fields(user_id = auth.user_id))]
pub async fn check_in(
    req: HttpRequest,
    auth: AuthUser,
    body: web::Json<AttendanceReq>,
    gate: web::Data<LocationGate>,
    store: web::Data<AttendanceStore>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    gate_location(&req, &body, &gate)?;

    let record = store.check_in(auth.user_id, body.into_location()).await?;
    info!(status = %record.status, "Check in accepted");

    Ok(ok(
        "Check in successful",
        AttendanceResponse {
            record,
            user: auth.profile,
        },
    ))
}

/// Record today's check out
#[utoipa::path(
    post,
    path = "/api/v1/attendance/checkout",
    request_body = AttendanceReq,
    responses(
        (status = 200, description = "Check out successful", body = AttendanceResponse),
        (status = 400, description = "Invalid GPS coordinates or address"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Rejected by a network or location gate"),
        (status = 409, description = "No check in today, or already checked out"),
        (status = 503, description = "Database unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_checkout", skip_all, fields(user_id = auth.user_id))]
pub async fn check_out(
    req: HttpRequest,
    auth: AuthUser,
    body: web::Json<AttendanceReq>,
    gate: web::Data<LocationGate>,
    store: web::Data<AttendanceStore>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    gate_location(&req, &body, &gate)?;

    let record = store.check_out(auth.user_id, &body.into_location()).await?;

    Ok(ok(
        "Check out successful",
        AttendanceResponse {
            record,
            user: auth.profile,
        },
    ))
}

/// Today's record, or `data: null` before check in
#[utoipa::path(
    get,
    path = "/api/v1/attendance/today",
    responses(
        (status = 200, description = "Today's attendance (null when none)", body = AttendanceResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, store: web::Data<AttendanceStore>) -> Result<HttpResponse, AppError> {
    match store.get_today(auth.user_id).await? {
        Some(record) => Ok(ok(
            "Today's attendance retrieved",
            AttendanceResponse {
                record,
                user: auth.profile,
            },
        )),
        None => Ok(empty("No attendance record for today")),
    }
}

/// Paged history, newest first
#[utoipa::path(
    get,
    path = "/api/v1/attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Attendance history", body = AttendanceHistoryResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    query: web::Query<HistoryQuery>,
    store: web::Data<AttendanceStore>,
) -> Result<HttpResponse, AppError> {
    let (page, limit) = page_window(&query);
    let offset = (page - 1).saturating_mul(limit);

    let (records, total) = store.get_history(auth.user_id, limit, offset).await?;

    if offset > 0 && records.is_empty() && total > 0 {
        warn!(user_id = auth.user_id, page, total, "History page past the end");
    }

    Ok(ok(
        "Attendance history retrieved",
        AttendanceHistoryResponse {
            history: records.into_iter().map(AttendanceHistoryItem::from).collect(),
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: total_pages(total, limit),
            },
        },
    ))
}

/// Counts per status and the present percentage
#[utoipa::path(
    get,
    path = "/api/v1/attendance/stats",
    responses(
        (status = 200, description = "Attendance statistics", body = crate::model::attendance::AttendanceStats),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn stats(auth: AuthUser, store: web::Data<AttendanceStore>) -> Result<HttpResponse, AppError> {
    let stats = store.get_stats(auth.user_id).await?;
    Ok(ok("Attendance statistics retrieved", stats))
}


#[cfg(test)]
mod paging_tests {
    use super::*;

    fn query(page: Option<i64>, limit: Option<i64>) -> HistoryQuery {
        HistoryQuery { page, limit }
    }

    #[test]
    fn page_window_clamps_to_defaults() {
        assert_eq!(page_window(&query(None, None)), (1, 10));
        assert_eq!(page_window(&query(Some(0), Some(0))), (1, 10));
        assert_eq!(page_window(&query(Some(3), Some(101))), (3, 10));
        assert_eq!(page_window(&query(Some(-2), Some(100))), (1, 100));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(21, 10), 3);
        assert_eq!(total_pages(20, 10), 2);
    }
}
