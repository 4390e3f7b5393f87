//! Mock-location heuristics. Best effort only: a determined client can
//! defeat every one of these, they just catch the lazy cases.

use crate::gate::{
    Gate, GateDecision, GatePipeline, Rejection,
    context::X_GPS_ACCURACY,
    location::LocationContext,
};

pub const MOCK_LOCATION_HEADERS: [&str; 3] = ["X-Mock-Location", "X-Fake-GPS", "X-Location-Spoofed"];

const FAKE_GPS: &str = "Access denied: Fake GPS detected";

#[derive(Debug, Clone, PartialEq)]
pub struct SpoofPolicy {
    /// Coordinates with more decimal places than this are treated as generated.
    pub max_precision: usize,
    pub precision_check: bool,
    pub zero_run_check: bool,
    pub mock_header_check: bool,
    pub accuracy_check: bool,
}

impl Default for SpoofPolicy {
    fn default() -> Self {
        Self {
            max_precision: 10,
            precision_check: true,
            zero_run_check: true,
            mock_header_check: true,
            accuracy_check: true,
        }
    }
}

pub fn build_pipeline(policy: &SpoofPolicy) -> GatePipeline<LocationContext> {
    GatePipeline::new()
        .with_if(
            policy.precision_check,
            PrecisionGate {
                max_precision: policy.max_precision,
            },
        )
        .with_if(
            policy.zero_run_check,
            ZeroRunGate {
                max_precision: policy.max_precision,
            },
        )
        .with_if(policy.mock_header_check, MockHeaderGate)
        .with_if(policy.accuracy_check, AccuracyGate)
}

/// Digits after the decimal point in the shortest round-trip rendering.
pub fn decimal_places(value: f64) -> usize {
    let rendered = value.to_string();
    rendered
        .find('.')
        .map(|dot| rendered.len() - dot - 1)
        .unwrap_or(0)
}

pub struct PrecisionGate {
    pub max_precision: usize,
}

impl Gate<LocationContext> for PrecisionGate {
    fn name(&self) -> &'static str {
        "spoof_precision"
    }

    fn evaluate(&self, ctx: &LocationContext) -> GateDecision {
        let lat = decimal_places(ctx.point.latitude);
        let lng = decimal_places(ctx.point.longitude);

        if lat > self.max_precision || lng > self.max_precision {
            GateDecision::Reject(Rejection::new(self.name(), FAKE_GPS))
        } else {
            GateDecision::Pass
        }
    }
}

/// A `000` run inside an over-precise coordinate, typical of values typed
/// into a mock-location app.
pub struct ZeroRunGate {
    pub max_precision: usize,
}

impl ZeroRunGate {
    fn suspicious(&self, value: f64) -> bool {
        value.to_string().contains("000") && decimal_places(value) > self.max_precision
    }
}

impl Gate<LocationContext> for ZeroRunGate {
    fn name(&self) -> &'static str {
        "spoof_zero_run"
    }

    fn evaluate(&self, ctx: &LocationContext) -> GateDecision {
        if self.suspicious(ctx.point.latitude) || self.suspicious(ctx.point.longitude) {
            GateDecision::Reject(Rejection::new(self.name(), FAKE_GPS))
        } else {
            GateDecision::Pass
        }
    }
}

pub struct MockHeaderGate;

impl Gate<LocationContext> for MockHeaderGate {
    fn name(&self) -> &'static str {
        "spoof_mock_header"
    }

    fn evaluate(&self, ctx: &LocationContext) -> GateDecision {
        if MOCK_LOCATION_HEADERS.iter().any(|h| ctx.headers.contains(h)) {
            GateDecision::Reject(Rejection::new(self.name(), FAKE_GPS))
        } else {
            GateDecision::Pass
        }
    }
}

/// Real fixes almost never report sub-meter accuracy.
pub struct AccuracyGate;

impl Gate<LocationContext> for AccuracyGate {
    fn name(&self) -> &'static str {
        "spoof_accuracy"
    }

    fn evaluate(&self, ctx: &LocationContext) -> GateDecision {
        let accuracy = ctx
            .headers
            .get(X_GPS_ACCURACY)
            .and_then(|raw| raw.parse::<f64>().ok());

        match accuracy {
            Some(acc) if acc < 1.0 => GateDecision::Reject(Rejection::new(self.name(), FAKE_GPS)),
            _ => GateDecision::Pass,
        }
    }
}
