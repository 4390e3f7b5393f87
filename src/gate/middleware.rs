use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::{HeaderName, HeaderValue, USER_AGENT},
    middleware::Next,
    web::Data,
};
use tracing::debug;

use crate::error::AppError;
use crate::gate::{
    GateOutcome,
    context::{AdminOverride, HeaderSnapshot, NetworkContext, NetworkInfo, X_ADMIN_OVERRIDE},
    network::{NetworkPipeline, TAG_ADMIN_BYPASSED},
};
use crate::policy::Policies;

const X_NETWORK_SECURITY: &str = "x-network-security";
const X_CLIENT_IP: &str = "x-client-ip";
const X_SECURITY_LEVEL: &str = "x-security-level";

/// Result of the network gate, stored in request extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkClearance {
    Validated { client_ip: String },
    Bypassed(&'static str),
}

impl NetworkClearance {
    pub fn tag(&self) -> &'static str {
        match self {
            NetworkClearance::Validated { .. } => "validated",
            NetworkClearance::Bypassed(tag) => *tag,
        }
    }

    pub fn is_admin_bypass(&self) -> bool {
        matches!(self, NetworkClearance::Bypassed(TAG_ADMIN_BYPASSED))
    }
}

/// Marks requests that carry the admin override key so inner layers can
/// see it without re-reading the header.
pub async fn admin_override_marker(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let marked = match req.app_data::<Data<Policies>>() {
        Some(policies) => {
            let key = &policies.network.admin_override_key;
            !key.is_empty()
                && req
                    .headers()
                    .get(X_ADMIN_OVERRIDE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.trim() == key)
        }
        None => false,
    };

    if marked {
        debug!(path = %req.path(), "Admin override key present");
        req.extensions_mut().insert(AdminOverride);
    }

    let mut res = next.call(req).await?;

    if marked && !res.headers().contains_key(X_NETWORK_SECURITY) {
        res.headers_mut()
            .insert(HeaderName::from_static(X_NETWORK_SECURITY), HeaderValue::from_static("admin-override"));
    }

    Ok(res)
}

pub async fn network_gate(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let pipeline = req
        .app_data::<Data<NetworkPipeline>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Network policy missing"))?;

    let admin_flag = req.extensions().get::<AdminOverride>().is_some();
    let ctx = NetworkContext::new(
        req.path(),
        req.peer_addr().map(|addr| addr.ip()),
        HeaderSnapshot::from_header_map(req.headers()),
        admin_flag,
    );

    let info = NetworkInfo::from_context(&ctx);
    debug!(
        client_ip = %info.client_ip,
        user_agent = ?info.user_agent,
        network_type = ?info.network_type,
        wifi_ssid = ?info.wifi_ssid,
        carrier = ?info.carrier,
        device_id = ?info.device_id,
        app_version = ?info.app_version,
        "Declared network info"
    );

    let clearance = match pipeline.run(&ctx) {
        Ok(GateOutcome::Accepted) => NetworkClearance::Validated {
            client_ip: ctx.client_ip.clone(),
        },
        Ok(GateOutcome::Bypassed(tag)) => NetworkClearance::Bypassed(tag),
        Err(rejection) => {
            let resp = AppError::GateRejected(rejection).error_response();
            return Ok(req.into_response(resp));
        }
    };

    req.extensions_mut().insert(clearance.clone());
    req.extensions_mut().insert(info);

    let mut res = next.call(req).await?;
    let headers = res.headers_mut();
    headers.insert(
        HeaderName::from_static(X_NETWORK_SECURITY),
        HeaderValue::from_static(clearance.tag()),
    );

    if let NetworkClearance::Validated { client_ip } = &clearance {
        if let Ok(value) = HeaderValue::from_str(client_ip) {
            headers.insert(HeaderName::from_static(X_CLIENT_IP), value);
        }
        headers.insert(HeaderName::from_static(X_SECURITY_LEVEL), HeaderValue::from_static("high"));
    }

    Ok(res)
}

/// Attendance submissions must identify their client.
pub async fn require_user_agent(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let present = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty());

    if !present {
        debug!(path = %req.path(), "Missing User-Agent");
        let resp = AppError::BadRequest("User-Agent header is required".into()).error_response();
        return Ok(req.into_response(resp));
    }

    next.call(req).await
}
