use chrono::{FixedOffset, NaiveTime, Offset, Utc};

use crate::gate::{
    geo::{BoundingBox, GeoPoint},
    network::NetworkPolicy,
    spoof::SpoofPolicy,
};

/// Asia/Jakarta, which has no daylight saving.
pub const JAKARTA_UTC_OFFSET_MINUTES: i32 = 7 * 60;

/// Where and when the school day happens. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolPolicy {
    pub location: GeoPoint,
    pub radius_km: f64,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub late_threshold_minutes: u32,
    pub utc_offset: FixedOffset,
}

impl Default for SchoolPolicy {
    fn default() -> Self {
        Self {
            location: GeoPoint::new(-8.1575, 113.722778),
            radius_km: 0.1,
            start: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
            late_threshold_minutes: 30,
            utc_offset: jakarta(),
        }
    }
}

/// `None` when the offset is a day or more.
pub fn utc_offset(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

pub fn jakarta() -> FixedOffset {
    utc_offset(JAKARTA_UTC_OFFSET_MINUTES).unwrap_or_else(|| Utc.fix())
}

/// Every process-wide policy value the gates and the classifier read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Policies {
    pub school: SchoolPolicy,
    pub country: BoundingBox,
    pub network: NetworkPolicy,
    pub spoof: SpoofPolicy,
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox::INDONESIA
    }
}
