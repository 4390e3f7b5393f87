use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::MySqlPool;
use tracing::warn;

use crate::error::StoreError;
use crate::model::attendance::{AttendanceRecord, AttendanceRow, AttendanceStatus, Location};

const ATTENDANCE_COLUMNS: &str = "id, user_id, date, check_in, check_out, status, latitude, \
                                  longitude, address, created_at, updated_at";

/// Values for a fresh check-in row.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub user_id: u64,
    pub date: NaiveDate,
    pub check_in: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub location: Location,
}

/// Per-user, per-date access to attendance rows. Implementations must reject a
/// second row for the same `(user_id, date)` with [`StoreError::Duplicate`].
#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    async fn find_by_date(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    async fn insert(&self, new: NewAttendance) -> Result<AttendanceRecord, StoreError>;

    /// Sets check-out only if it is still empty. `false` when nothing changed.
    async fn mark_checked_out(&self, id: u64, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Newest first, plus the total row count for the user.
    async fn history(
        &self,
        user_id: u64,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<AttendanceRecord>, i64), StoreError>;

    async fn count_by_status(&self, user_id: u64) -> Result<Vec<(AttendanceStatus, i64)>, StoreError>;
}

pub struct MySqlAttendanceRepository {
    pool: MySqlPool,
}

impl MySqlAttendanceRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn into_record(row: AttendanceRow) -> Result<AttendanceRecord, StoreError> {
    let id = row.id;
    AttendanceRecord::try_from(row).map_err(|e| StoreError::Corrupt(format!("attendance {id}: {e}")))
}

#[async_trait]
impl AttendanceRepository for MySqlAttendanceRepository {
    async fn find_by_date(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE user_id = ? AND date = ?");

        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(into_record)
            .transpose()
    }

    async fn insert(&self, new: NewAttendance) -> Result<AttendanceRecord, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendances
                (user_id, date, check_in, status, latitude, longitude, address, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.user_id)
        .bind(new.date)
        .bind(new.check_in)
        .bind(new.status.to_string())
        .bind(new.location.latitude)
        .bind(new.location.longitude)
        .bind(new.location.address.as_deref())
        .bind(new.check_in)
        .bind(new.check_in)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_insert)?;

        Ok(AttendanceRecord {
            id: result.last_insert_id(),
            user_id: new.user_id,
            date: new.date,
            check_in: new.check_in,
            check_out: None,
            status: new.status,
            location: new.location,
            created_at: new.check_in,
            updated_at: new.check_in,
        })
    }

    async fn mark_checked_out(&self, id: u64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendances
            SET check_out = ?, updated_at = ?
            WHERE id = ?
            AND check_out IS NULL
            "#,
        )
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn history(
        &self,
        user_id: u64,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<AttendanceRecord>, i64), StoreError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attendances WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE user_id = ? \
             ORDER BY date DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let records = rows.into_iter().map(into_record).collect::<Result<Vec<_>, _>>()?;
        Ok((records, total))
    }

    async fn count_by_status(&self, user_id: u64) -> Result<Vec<(AttendanceStatus, i64)>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM attendances WHERE user_id = ? GROUP BY status",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(status, count)| match status.parse() {
                Ok(status) => Some((status, count)),
                Err(_) => {
                    warn!(user_id, status = %status, "Skipping unknown attendance status");
                    None
                }
            })
            .collect())
    }
}
