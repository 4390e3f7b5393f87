use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::gate::{Gate, GateDecision, Rejection, location::LocationContext};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[schema(example = json!(-8.1575))]
    pub latitude: f64,
    #[schema(example = 113.722778)]
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Axis-aligned lat/lng rectangle. No geodesic correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Rough box around the Indonesian archipelago.
    pub const INDONESIA: BoundingBox = BoundingBox {
        south: -11.0,
        north: 6.0,
        west: 95.0,
        east: 141.0,
    };

    /// Parses `south,north,west,east`.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;

        match parts.as_slice() {
            [south, north, west, east] if south <= north && west <= east => Some(Self {
                south: *south,
                north: *north,
                west: *west,
                east: *east,
            }),
            _ => None,
        }
    }
}

/// Great-circle distance in kilometers (haversine).
pub fn distance(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lng = (p2.longitude - p1.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + p1.latitude.to_radians().cos()
            * p2.latitude.to_radians().cos()
            * (d_lng / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn is_within_radius(point: GeoPoint, center: GeoPoint, radius_km: f64) -> bool {
    distance(point, center) <= radius_km
}

pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

pub fn is_within_bounds(point: GeoPoint, bbox: &BoundingBox) -> bool {
    point.latitude >= bbox.south
        && point.latitude <= bbox.north
        && point.longitude >= bbox.west
        && point.longitude <= bbox.east
}

pub struct CountryBoundsGate {
    pub bounds: BoundingBox,
}

impl Gate<LocationContext> for CountryBoundsGate {
    fn name(&self) -> &'static str {
        "country_bounds"
    }

    fn evaluate(&self, ctx: &LocationContext) -> GateDecision {
        if is_within_bounds(ctx.point, &self.bounds) {
            GateDecision::Pass
        } else {
            GateDecision::Reject(Rejection::new(
                self.name(),
                "Location must be within the country",
            ))
        }
    }
}

pub struct SchoolRadiusGate {
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl Gate<LocationContext> for SchoolRadiusGate {
    fn name(&self) -> &'static str {
        "school_radius"
    }

    fn evaluate(&self, ctx: &LocationContext) -> GateDecision {
        if is_within_radius(ctx.point, self.center, self.radius_km) {
            GateDecision::Pass
        } else {
            GateDecision::Reject(Rejection::new(
                self.name(),
                "Location is outside school area",
            ))
        }
    }
}
