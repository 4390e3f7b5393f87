use crate::api::attendance::{AttendanceHistoryResponse, Pagination};
use crate::api::health::HealthStatus;
use crate::api::user::UserListResponse;
use crate::model::attendance::{
    AttendanceHistoryItem, AttendanceRecord, AttendanceResponse, AttendanceStats, AttendanceStatus,
    Location,
};
use crate::model::user::UserPublic;
use crate::models::{
    AttendanceReq, AuthResponse, ChangePasswordReq, LoginReqDto, RegisterReq, TokenPair,
    UpdateProfileReq,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Presensi API",
        version = "1.0.0",
        description = r#"
## School Attendance (Presensi) API

Students check in and out once per school day from inside the school
geofence, on the school network.

### Key Features
- **Accounts**: register, login, token refresh and logout
- **Profile**: view and update the student profile, change password
- **Attendance**: check in, check out, today's record, history and statistics

### Gating
Attendance requests pass a **network gate** (IP allow-list, WiFi SSID and
carrier headers) and a **location gate** (fake-GPS heuristics, country bounds,
school radius) before anything is written.

### Response Format
Every response is wrapped as `{success, message, data, timestamp}`.
"#,
    ),
    paths(
        crate::api::health::health,

        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::user::get_profile,
        crate::api::user::update_profile,
        crate::api::user::change_password,
        crate::api::user::deactivate,
        crate::api::user::list_users,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::history,
        crate::api::attendance::stats
    ),
    components(
        schemas(
            HealthStatus,
            RegisterReq,
            LoginReqDto,
            AuthResponse,
            TokenPair,
            UserPublic,
            UpdateProfileReq,
            ChangePasswordReq,
            UserListResponse,
            AttendanceReq,
            AttendanceStatus,
            Location,
            AttendanceRecord,
            AttendanceResponse,
            AttendanceHistoryItem,
            AttendanceHistoryResponse,
            Pagination,
            AttendanceStats
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Registration and token APIs"),
        (name = "User", description = "Student profile APIs"),
        (name = "Attendance", description = "Check in/out and attendance reads"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_attendance_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/attendance/checkin"));
        assert!(doc.paths.paths.contains_key("/api/v1/attendance/history"));
        let schemes = doc.components.as_ref().unwrap();
        assert!(schemes.security_schemes.contains_key("bearer_auth"));
    }
}
