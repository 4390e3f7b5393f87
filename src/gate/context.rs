use std::collections::HashMap;
use std::net::IpAddr;

use actix_web::http::header::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";
pub const X_ADMIN_OVERRIDE: &str = "x-admin-override";
pub const X_NETWORK_TYPE: &str = "x-network-type";
pub const X_WIFI_SSID: &str = "x-wifi-ssid";
pub const X_CARRIER: &str = "x-carrier";
pub const X_GPS_ACCURACY: &str = "x-gps-accuracy";
pub const X_TTL: &str = "x-ttl";
pub const USER_AGENT: &str = "user-agent";
pub const X_DEVICE_ID: &str = "x-device-id";
pub const X_APP_VERSION: &str = "x-app-version";

/// Owned, lower-cased copy of the request headers the gates look at.
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default)]
pub struct HeaderSnapshot(HashMap<String, String>);

impl HeaderSnapshot {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let mut map = HashMap::new();
        for (name, value) in headers {
            // opaque bytes still count as present
            map.entry(name.as_str().to_ascii_lowercase())
                .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        Self(map)
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Marker placed in request extensions when an upstream layer has already
/// recognised the admin override key.
#[derive(Debug, Clone, Copy)]
pub struct AdminOverride;

/// Per-request network facts, derived from headers and the socket.
/// Nothing here is trusted until the network gates have run.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    pub path: String,
    pub client_ip: String,
    pub wifi_ssid: String,
    pub carrier: String,
    pub network_type: String,
    pub admin_flag: bool,
    pub headers: HeaderSnapshot,
}

impl NetworkContext {
    pub fn new(
        path: impl Into<String>,
        peer_ip: Option<IpAddr>,
        headers: HeaderSnapshot,
        admin_flag: bool,
    ) -> Self {
        let client_ip = resolve_client_ip(&headers, peer_ip);
        let field = |name: &str| headers.get(name).unwrap_or_default().to_string();

        Self {
            path: path.into(),
            client_ip,
            wifi_ssid: field(X_WIFI_SSID),
            carrier: field(X_CARRIER),
            network_type: field(X_NETWORK_TYPE),
            admin_flag,
            headers,
        }
    }

    pub fn admin_key(&self) -> Option<&str> {
        self.headers.get(X_ADMIN_OVERRIDE)
    }

    pub fn user_agent(&self) -> &str {
        self.headers.get(USER_AGENT).unwrap_or_default()
    }
}

/// What the client declares about its device and connection. Kept in
/// request extensions for logging; none of it is checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub network_type: Option<String>,
    pub wifi_ssid: Option<String>,
    pub carrier: Option<String>,
    pub device_id: Option<String>,
    pub app_version: Option<String>,
}

impl NetworkInfo {
    pub fn from_context(ctx: &NetworkContext) -> Self {
        let declared = |name: &str| ctx.headers.get(name).map(str::to_string);

        Self {
            client_ip: ctx.client_ip.clone(),
            user_agent: declared(USER_AGENT),
            network_type: declared(X_NETWORK_TYPE),
            wifi_ssid: declared(X_WIFI_SSID),
            carrier: declared(X_CARRIER),
            device_id: declared(X_DEVICE_ID),
            app_version: declared(X_APP_VERSION),
        }
    }
}

/// Forwarded-for (first hop) > X-Real-IP > CF-Connecting-IP > socket peer.
pub fn resolve_client_ip(headers: &HeaderSnapshot, peer_ip: Option<IpAddr>) -> String {
    if let Some(first) = headers
        .get(X_FORWARDED_FOR)
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return first.to_string();
    }

    if let Some(ip) = headers.get(X_REAL_IP) {
        return ip.to_string();
    }

    if let Some(ip) = headers.get(CF_CONNECTING_IP) {
        return ip.to_string();
    }

    peer_ip.map(|ip| ip.to_string()).unwrap_or_default()
}
