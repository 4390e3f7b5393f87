//! Request gating.
//!
//! A gate is a single pass/fail policy check. Gates are composed into a
//! [`GatePipeline`] once at startup from configuration; the pipeline runs them
//! in order and stops at the first rejection or bypass.

pub mod context;
pub mod geo;
pub mod location;
pub mod middleware;
pub mod network;
pub mod spoof;

use std::borrow::Cow;

use tracing::{debug, warn};

/// Why a gate refused the request. `reason` is safe to show to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub gate: &'static str,
    pub reason: Cow<'static, str>,
}

impl Rejection {
    pub fn new(gate: &'static str, reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            gate,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Check satisfied, continue with the next gate.
    Pass,
    /// Skip every remaining gate and accept, tagging the request.
    Bypass(&'static str),
    Reject(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Every gate passed.
    Accepted,
    /// A gate short-circuited the chain with the given tag.
    Bypassed(&'static str),
}

pub trait Gate<C>: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &C) -> GateDecision;
}

pub struct GatePipeline<C> {
    gates: Vec<Box<dyn Gate<C>>>,
}

impl<C> Default for GatePipeline<C> {
    fn default() -> Self {
        Self { gates: Vec::new() }
    }
}

impl<C> GatePipeline<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gate: impl Gate<C> + 'static) -> Self {
        self.gates.push(Box::new(gate));
        self
    }

    /// Appends `gate` only when `enabled` is set.
    pub fn with_if(self, enabled: bool, gate: impl Gate<C> + 'static) -> Self {
        if enabled { self.with(gate) } else { self }
    }

    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    pub fn run(&self, ctx: &C) -> Result<GateOutcome, Rejection> {
        for gate in &self.gates {
            match gate.evaluate(ctx) {
                GateDecision::Pass => continue,
                GateDecision::Bypass(tag) => {
                    debug!(gate = gate.name(), tag, "Gate chain bypassed");
                    return Ok(GateOutcome::Bypassed(tag));
                }
                GateDecision::Reject(rejection) => {
                    warn!(gate = rejection.gate, reason = %rejection.reason, "Request rejected");
                    return Err(rejection);
                }
            }
        }

        Ok(GateOutcome::Accepted)
    }
}
