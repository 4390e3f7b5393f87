use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::user::UserPublic;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    #[schema(example = json!(-8.1575))]
    pub latitude: f64,
    #[schema(example = 113.722778)]
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// One row per student per UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceRecord {
    pub id: u64,
    pub user_id: u64,
    #[schema(example = "2026-01-12", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(value_type = String, format = "date-time")]
    pub check_in: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub location: Location,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

/// Flat database shape of [`AttendanceRecord`].
#[derive(Debug, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub user_id: u64,
    pub date: NaiveDate,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub status: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = strum::ParseError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            date: row.date,
            check_in: row.check_in,
            check_out: row.check_out,
            status: row.status.parse()?,
            location: Location {
                latitude: row.latitude,
                longitude: row.longitude,
                address: row.address,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, ToSchema)]
pub struct AttendanceStats {
    pub total_present: i64,
    pub total_late: i64,
    pub total_absent: i64,
    #[schema(example = 60.0)]
    pub percentage: f64,
}

impl AttendanceStats {
    /// `percentage` is present over all classified days, 0 with no records.
    pub fn from_counts(present: i64, late: i64, absent: i64) -> Self {
        let total = present + late + absent;
        let percentage = if total > 0 {
            present as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_present: present,
            total_late: late,
            total_absent: absent,
            percentage,
        }
    }
}

/// Check-in/check-out response: the record plus who it belongs to.
#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceResponse {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub user: UserPublic,
}

/// Compact row for the history listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceHistoryItem {
    #[schema(example = "2026-01-12", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(value_type = String, format = "date-time")]
    pub check_in: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub location: Location,
}

impl From<AttendanceRecord> for AttendanceHistoryItem {
    fn from(record: AttendanceRecord) -> Self {
        Self {
            date: record.date,
            check_in: record.check_in,
            check_out: record.check_out,
            status: record.status,
            location: record.location,
        }
    }
}
