use crate::gate::{
    GateOutcome, GatePipeline, Rejection,
    context::HeaderSnapshot,
    geo::{CountryBoundsGate, GeoPoint, SchoolRadiusGate},
    spoof,
};
use crate::policy::Policies;

/// What the location stage sees: the submitted coordinates plus the headers
/// a client might use to declare mocked positions or accuracy.
#[derive(Debug, Clone)]
pub struct LocationContext {
    pub point: GeoPoint,
    pub headers: HeaderSnapshot,
}

impl LocationContext {
    pub fn new(point: GeoPoint) -> Self {
        Self {
            point,
            headers: HeaderSnapshot::default(),
        }
    }

    pub fn with_headers(point: GeoPoint, headers: HeaderSnapshot) -> Self {
        Self { point, headers }
    }
}

/// Spoof checks followed by geofencing, run on check-in and check-out bodies.
pub struct LocationGate {
    spoof: GatePipeline<LocationContext>,
    geo: GatePipeline<LocationContext>,
}

impl LocationGate {
    pub fn from_policies(policies: &Policies) -> Self {
        Self {
            spoof: spoof::build_pipeline(&policies.spoof),
            geo: GatePipeline::new()
                .with(CountryBoundsGate {
                    bounds: policies.country,
                })
                .with(SchoolRadiusGate {
                    center: policies.school.location,
                    radius_km: policies.school.radius_km,
                }),
        }
    }

    /// `admin_bypassed` skips the spoof heuristics; geofencing always applies.
    pub fn check(&self, ctx: &LocationContext, admin_bypassed: bool) -> Result<(), Rejection> {
        if !admin_bypassed {
            self.spoof.run(ctx)?;
        }

        match self.geo.run(ctx)? {
            GateOutcome::Accepted | GateOutcome::Bypassed(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> LocationGate {
        LocationGate::from_policies(&Policies::default())
    }

    #[test]
    fn school_location_passes() {
        let ctx = LocationContext::new(GeoPoint::new(-8.1575, 113.722778));
        assert_eq!(gate().check(&ctx, false), Ok(()));
    }

    #[test]
    fn outside_country_is_rejected_before_radius() {
        let ctx = LocationContext::new(GeoPoint::new(35.6762, 139.6503));
        assert_eq!(gate().check(&ctx, false).unwrap_err().gate, "country_bounds");
    }

    #[test]
    fn in_country_but_far_from_school_is_rejected() {
        let ctx = LocationContext::new(GeoPoint::new(-6.2088, 106.8456));
        assert_eq!(gate().check(&ctx, false).unwrap_err().gate, "school_radius");
    }

    #[test]
    fn admin_bypass_skips_spoof_but_not_geofence() {
        let headers = HeaderSnapshot::from_pairs([("X-Fake-GPS", "1")]);
        let spoofed_at_school =
            LocationContext::with_headers(GeoPoint::new(-8.1575, 113.722778), headers.clone());
        assert!(gate().check(&spoofed_at_school, false).is_err());
        assert_eq!(gate().check(&spoofed_at_school, true), Ok(()));

        let spoofed_far = LocationContext::with_headers(GeoPoint::new(-6.2088, 106.8456), headers);
        assert_eq!(
            gate().check(&spoofed_far, true).unwrap_err().gate,
            "school_radius"
        );
    }
}
