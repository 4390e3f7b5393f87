use chrono::{DateTime, Duration, Utc};

use crate::model::attendance::AttendanceStatus;
use crate::policy::SchoolPolicy;

/// Status for a check-in observed at `instant`, judged on the school's wall
/// clock. Arriving exactly at the start time counts as present.
pub fn classify(instant: DateTime<Utc>, policy: &SchoolPolicy) -> AttendanceStatus {
    let local = instant.with_timezone(&policy.utc_offset).naive_local();
    let school_start = local.date().and_time(policy.start);
    let late_until = school_start + Duration::minutes(i64::from(policy.late_threshold_minutes));

    if local <= school_start {
        AttendanceStatus::Present
    } else if local < late_until {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Absent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveTime, TimeZone};

    fn jakarta(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 12, h, m, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn boundaries_around_school_start() {
        let policy = SchoolPolicy::default();

        assert_eq!(classify(jakarta(6, 59, 0), &policy), AttendanceStatus::Present);
        assert_eq!(classify(jakarta(7, 0, 0), &policy), AttendanceStatus::Present);
        assert_eq!(classify(jakarta(7, 0, 1), &policy), AttendanceStatus::Late);
        assert_eq!(classify(jakarta(7, 15, 0), &policy), AttendanceStatus::Late);
        assert_eq!(classify(jakarta(7, 29, 59), &policy), AttendanceStatus::Late);
        assert_eq!(classify(jakarta(7, 30, 0), &policy), AttendanceStatus::Absent);
        assert_eq!(classify(jakarta(13, 0, 0), &policy), AttendanceStatus::Absent);
    }

    #[test]
    fn utc_instant_is_converted_to_local_time() {
        let policy = SchoolPolicy::default();
        // 00:00 UTC is 07:00 in Jakarta
        let midnight_utc = Utc.with_ymd_and_hms(2026, 1, 12, 0, 0, 0).unwrap();
        assert_eq!(classify(midnight_utc, &policy), AttendanceStatus::Present);

        let half_past = Utc.with_ymd_and_hms(2026, 1, 12, 0, 30, 0).unwrap();
        assert_eq!(classify(half_past, &policy), AttendanceStatus::Absent);
    }

    #[test]
    fn zero_threshold_has_no_late_window() {
        let policy = SchoolPolicy {
            late_threshold_minutes: 0,
            ..SchoolPolicy::default()
        };
        assert_eq!(classify(jakarta(7, 0, 0), &policy), AttendanceStatus::Present);
        assert_eq!(classify(jakarta(7, 0, 1), &policy), AttendanceStatus::Absent);
    }

    #[test]
    fn custom_start_time() {
        let policy = SchoolPolicy {
            start: NaiveTime::from_hms_opt(6, 45, 0).unwrap(),
            late_threshold_minutes: 15,
            ..SchoolPolicy::default()
        };
        assert_eq!(classify(jakarta(6, 50, 0), &policy), AttendanceStatus::Late);
        assert_eq!(classify(jakarta(7, 0, 0), &policy), AttendanceStatus::Absent);
    }
}
