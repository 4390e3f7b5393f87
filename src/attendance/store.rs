use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::attendance::{
    classifier::classify,
    repository::{AttendanceRepository, NewAttendance},
};
use crate::error::{AppError, StateConflict, StoreError};
use crate::model::attendance::{AttendanceRecord, AttendanceStats, AttendanceStatus, Location};
use crate::policy::SchoolPolicy;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error(transparent)]
    Conflict(#[from] StateConflict),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AttendanceError> for AppError {
    fn from(e: AttendanceError) -> Self {
        match e {
            AttendanceError::Conflict(c) => AppError::Conflict(c),
            AttendanceError::Store(s) => AppError::Persistence(s),
        }
    }
}

/// Check-in/check-out state machine keyed by `(user, UTC date)`.
///
/// The existence check before insert is only a fast path; the repository's
/// unique key decides races, and a duplicate insert is reported as
/// [`StateConflict::AlreadyCheckedIn`].
pub struct AttendanceStore {
    repo: Arc<dyn AttendanceRepository>,
    policy: SchoolPolicy,
    clock: Clock,
}

impl AttendanceStore {
    pub fn new(repo: Arc<dyn AttendanceRepository>, policy: SchoolPolicy) -> Self {
        Self {
            repo,
            policy,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &SchoolPolicy {
        &self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub async fn check_in(
        &self,
        user_id: u64,
        location: Location,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let now = self.now();
        let date = now.date_naive();

        if self.repo.find_by_date(user_id, date).await?.is_some() {
            return Err(StateConflict::AlreadyCheckedIn.into());
        }

        let status = classify(now, &self.policy);
        let new = NewAttendance {
            user_id,
            date,
            check_in: now,
            status,
            location,
        };

        match self.repo.insert(new).await {
            Ok(record) => {
                info!(user_id, %date, status = %record.status, "Check in recorded");
                Ok(record)
            }
            Err(StoreError::Duplicate) => {
                debug!(user_id, %date, "Concurrent check in lost the race");
                Err(StateConflict::AlreadyCheckedIn.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The location is gated by the caller; the stored row keeps the
    /// check-in location.
    pub async fn check_out(
        &self,
        user_id: u64,
        location: &Location,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let now = self.now();
        let date = now.date_naive();

        let mut record = self
            .repo
            .find_by_date(user_id, date)
            .await?
            .ok_or(StateConflict::NoCheckInFound)?;

        if record.check_out.is_some() {
            return Err(StateConflict::AlreadyCheckedOut.into());
        }

        let at = now.max(record.check_in);
        if !self.repo.mark_checked_out(record.id, at).await? {
            return Err(StateConflict::AlreadyCheckedOut.into());
        }

        record.check_out = Some(at);
        record.updated_at = at;
        info!(
            user_id,
            %date,
            latitude = location.latitude,
            longitude = location.longitude,
            "Check out recorded"
        );
        Ok(record)
    }

    /// `Ok(None)` means no record yet, distinct from a failed lookup.
    pub async fn get_today(&self, user_id: u64) -> Result<Option<AttendanceRecord>, AttendanceError> {
        self.get_by_date(user_id, self.now().date_naive()).await
    }

    pub async fn get_by_date(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        Ok(self.repo.find_by_date(user_id, date).await?)
    }

    pub async fn get_history(
        &self,
        user_id: u64,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<AttendanceRecord>, i64), AttendanceError> {
        Ok(self.repo.history(user_id, limit, offset).await?)
    }

    pub async fn get_stats(&self, user_id: u64) -> Result<AttendanceStats, AttendanceError> {
        let counts = self.repo.count_by_status(user_id).await?;
        let count_of = |wanted: AttendanceStatus| {
            counts
                .iter()
                .filter(|(status, _)| *status == wanted)
                .map(|(_, n)| *n)
                .sum::<i64>()
        };

        Ok(AttendanceStats::from_counts(
            count_of(AttendanceStatus::Present),
            count_of(AttendanceStatus::Late),
            count_of(AttendanceStatus::Absent),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::repository::memory::MemoryRepository;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    const USER: u64 = 7;

    fn school() -> Location {
        Location {
            latitude: -8.1575,
            longitude: 113.722778,
            address: Some("Gerbang utama".into()),
        }
    }

    /// A clock the test can move.
    fn manual_clock(start: DateTime<Utc>) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let cell = Arc::new(Mutex::new(start));
        let handle = cell.clone();
        (Arc::new(move || *cell.lock().unwrap()), handle)
    }

    fn store_at(repo: Arc<MemoryRepository>, at: DateTime<Utc>) -> (AttendanceStore, Arc<Mutex<DateTime<Utc>>>) {
        let (clock, handle) = manual_clock(at);
        (AttendanceStore::new(repo, SchoolPolicy::default()).with_clock(clock), handle)
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 12, h, m, 0).unwrap()
    }

    #[actix_web::test]
    async fn check_in_classifies_and_persists() {
        let repo = Arc::new(MemoryRepository::default());
        // 00:10 UTC is 07:10 in Jakarta
        let (store, _) = store_at(repo.clone(), utc(0, 10));

        let record = store.check_in(USER, school()).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.date, utc(0, 10).date_naive());
        assert_eq!(record.check_out, None);
        assert_eq!(repo.len(), 1);
    }

    #[actix_web::test]
    async fn second_check_in_same_day_conflicts() {
        let repo = Arc::new(MemoryRepository::default());
        let (store, _) = store_at(repo.clone(), utc(0, 0));

        store.check_in(USER, school()).await.unwrap();
        let err = store.check_in(USER, school()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Conflict(StateConflict::AlreadyCheckedIn)));
        assert_eq!(repo.len(), 1);
    }

    #[actix_web::test]
    async fn racing_check_ins_leave_exactly_one_row() {
        let repo = Arc::new(MemoryRepository::racing());
        let (store, _) = store_at(repo.clone(), utc(0, 0));

        let (a, b) = futures::join!(store.check_in(USER, school()), store.check_in(USER, school()));
        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(
            loser,
            Err(AttendanceError::Conflict(StateConflict::AlreadyCheckedIn))
        ));
        assert_eq!(repo.len(), 1);
    }

    #[actix_web::test]
    async fn check_out_state_transitions() {
        let repo = Arc::new(MemoryRepository::default());
        let (store, clock) = store_at(repo, utc(0, 0));

        let err = store.check_out(USER, &school()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Conflict(StateConflict::NoCheckInFound)));

        store.check_in(USER, school()).await.unwrap();
        *clock.lock().unwrap() = utc(8, 30);

        let record = store.check_out(USER, &school()).await.unwrap();
        assert_eq!(record.check_out, Some(utc(8, 30)));
        // status is fixed at check in
        assert_eq!(record.status, AttendanceStatus::Present);

        let err = store.check_out(USER, &school()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Conflict(StateConflict::AlreadyCheckedOut)));
    }

    #[actix_web::test]
    async fn check_out_never_precedes_check_in() {
        let repo = Arc::new(MemoryRepository::default());
        let (store, clock) = store_at(repo, utc(1, 0));

        store.check_in(USER, school()).await.unwrap();
        *clock.lock().unwrap() = utc(0, 59);

        let record = store.check_out(USER, &school()).await.unwrap();
        assert_eq!(record.check_out, Some(utc(1, 0)));
    }

    #[actix_web::test]
    async fn today_is_none_before_check_in_and_resets_next_day() {
        let repo = Arc::new(MemoryRepository::default());
        let (store, clock) = store_at(repo, utc(0, 0));

        assert!(store.get_today(USER).await.unwrap().is_none());
        store.check_in(USER, school()).await.unwrap();
        assert!(store.get_today(USER).await.unwrap().is_some());

        *clock.lock().unwrap() = utc(0, 0) + Duration::days(1);
        assert!(store.get_today(USER).await.unwrap().is_none());
        assert!(store.get_by_date(USER, utc(0, 0).date_naive()).await.unwrap().is_some());
    }

    fn record(id: u64, day: u32, status: AttendanceStatus) -> AttendanceRecord {
        let at = Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap();
        AttendanceRecord {
            id,
            user_id: USER,
            date: at.date_naive(),
            check_in: at,
            check_out: None,
            status,
            location: school(),
            created_at: at,
            updated_at: at,
        }
    }

    #[actix_web::test]
    async fn stats_and_history() {
        use AttendanceStatus::*;
        let rows = vec![
            record(1, 5, Present),
            record(2, 6, Present),
            record(3, 7, Late),
            record(4, 8, Present),
            record(5, 9, Absent),
        ];
        let repo = Arc::new(MemoryRepository::with_rows(rows));
        let (store, _) = store_at(repo, utc(0, 0));

        let stats = store.get_stats(USER).await.unwrap();
        assert_eq!((stats.total_present, stats.total_late, stats.total_absent), (3, 1, 1));
        assert_eq!(stats.percentage, 60.0);

        let (page, total) = store.get_history(USER, 2, 0).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5, 4]);

        let (page, _) = store.get_history(USER, 2, 4).await.unwrap();
        assert_eq!(page.len(), 1);

        let empty = store.get_stats(99).await.unwrap();
        assert_eq!(empty.percentage, 0.0);
    }
}
