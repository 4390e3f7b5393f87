use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::gate::geo::GeoPoint;
use crate::model::attendance::Location;
use crate::model::user::UserPublic;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterReq {
    #[schema(example = "2200123")]
    pub nis: String,
    #[schema(example = "Siti Rahma")]
    pub name: String,
    #[schema(example = "XII RPL 1")]
    pub class_name: String,
    #[schema(example = "Rekayasa Perangkat Lunak")]
    pub major: String,
    #[schema(example = "siti@school.sch.id", format = "email")]
    pub email: String,
    #[schema(example = "rahasia123")]
    pub password: String,
    #[schema(example = "081234567890")]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "siti@school.sch.id", format = "email")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserPublic,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Only non-empty fields are applied.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProfileReq {
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub major: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "https://cdn.school.sch.id/avatar/7.png")]
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordReq {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttendanceReq {
    #[schema(example = json!(-8.1575))]
    pub latitude: f64,
    #[schema(example = 113.722778)]
    pub longitude: f64,
    #[schema(example = "Gerbang utama")]
    pub address: Option<String>,
}

impl AttendanceReq {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn into_location(self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            address: self
                .address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Page number, from 1
    pub page: Option<i64>,
    /// Items per page, 1 to 100
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// User email
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub jti: String,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}
