use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use dotenvy::dotenv;
use tracing::{Level, warn};

use crate::gate::{
    geo::{BoundingBox, GeoPoint},
    network::{
        DEFAULT_CARRIERS, DEFAULT_IP_RANGES, DEFAULT_SSID_PREFIXES, DEFAULT_SSIDS, NetworkPolicy,
        NetworkToggles, exempt_paths_for, parse_ip_rules,
    },
    spoof::SpoofPolicy,
};
use crate::policy::{JAKARTA_UTC_OFFSET_MINUTES, Policies, SchoolPolicy, utc_offset};

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub log_level: Level,

    pub policies: Policies,
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(&|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// `LOG_LEVEL` alone, so logging can start before the rest of the
    /// configuration is parsed and its fallbacks are reported.
    pub fn log_level_from_env() -> Level {
        dotenv().ok();
        log_level(&|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    pub fn from_lookup(vars: Lookup<'_>) -> Result<Self> {
        let required = |key: &str| vars(key).with_context(|| format!("{key} must be set"));
        let api_prefix = vars("API_PREFIX").unwrap_or_else(|| "/api/v1".to_string());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            server_addr: vars("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            access_token_ttl: parse_or(vars, "ACCESS_TOKEN_TTL", 86_400), // 24h
            refresh_token_ttl: parse_or(vars, "REFRESH_TOKEN_TTL", 604_800), // 7 days

            rate_login_per_min: parse_or(vars, "RATE_LOGIN_PER_MIN", 60),
            rate_register_per_min: parse_or(vars, "RATE_REGISTER_PER_MIN", 30),
            rate_refresh_per_min: parse_or(vars, "RATE_REFRESH_PER_MIN", 30),
            rate_protected_per_min: parse_or(vars, "RATE_PROTECTED_PER_MIN", 1000),

            log_level: log_level(vars),
            policies: load_policies(vars, &api_prefix),
            api_prefix,
        })
    }
}

fn log_level(vars: Lookup<'_>) -> Level {
    parse_or(vars, "LOG_LEVEL", Level::INFO)
}

fn load_policies(vars: Lookup<'_>, api_prefix: &str) -> Policies {
    Policies {
        school: load_school(vars),
        country: vars("COUNTRY_BOUNDS")
            .and_then(|raw| {
                let parsed = BoundingBox::parse(&raw);
                if parsed.is_none() {
                    warn!(value = %raw, "COUNTRY_BOUNDS is not south,north,west,east; using default");
                }
                parsed
            })
            .unwrap_or(BoundingBox::INDONESIA),
        network: NetworkPolicy {
            exempt_paths: exempt_paths_for(api_prefix),
            admin_override_key: vars("ADMIN_OVERRIDE_KEY").unwrap_or_default(),
            allowed_ip_ranges: parse_ip_rules(
                list_or(vars, "ALLOWED_IP_RANGES", &DEFAULT_IP_RANGES)
                    .iter()
                    .map(String::as_str),
            ),
            allowed_ssids: list_or(vars, "ALLOWED_SSIDS", &DEFAULT_SSIDS),
            ssid_prefixes: list_or(vars, "SSID_PREFIXES", &DEFAULT_SSID_PREFIXES),
            allowed_carriers: list_or(vars, "ALLOWED_CARRIERS", &DEFAULT_CARRIERS),
            toggles: NetworkToggles {
                vpn_check: flag_or(vars, "GATE_VPN_CHECK", false),
                network_type_check: flag_or(vars, "GATE_NETWORK_TYPE_CHECK", false),
                wifi_check: flag_or(vars, "GATE_WIFI_CHECK", true),
                carrier_check: flag_or(vars, "GATE_CARRIER_CHECK", true),
            },
        },
        spoof: SpoofPolicy {
            max_precision: parse_or(vars, "SPOOF_MAX_PRECISION", 10),
            precision_check: flag_or(vars, "SPOOF_PRECISION_CHECK", true),
            zero_run_check: flag_or(vars, "SPOOF_ZERO_RUN_CHECK", true),
            mock_header_check: flag_or(vars, "SPOOF_MOCK_HEADER_CHECK", true),
            accuracy_check: flag_or(vars, "SPOOF_ACCURACY_CHECK", true),
        },
    }
}

fn load_school(vars: Lookup<'_>) -> SchoolPolicy {
    let defaults = SchoolPolicy::default();

    let time_or = |hour_key: &str, minute_key: &str, fallback: NaiveTime| {
        let hour: u32 = parse_or(vars, hour_key, u32::MAX);
        let minute: u32 = parse_or(vars, minute_key, 0);
        if hour == u32::MAX {
            return fallback;
        }
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_else(|| {
            warn!(hour, minute, "Invalid {hour_key}/{minute_key}; using default");
            fallback
        })
    };

    let offset_minutes: i32 = parse_or(vars, "SCHOOL_UTC_OFFSET_MINUTES", JAKARTA_UTC_OFFSET_MINUTES);

    SchoolPolicy {
        location: GeoPoint::new(
            parse_or(vars, "SCHOOL_LATITUDE", defaults.location.latitude),
            parse_or(vars, "SCHOOL_LONGITUDE", defaults.location.longitude),
        ),
        radius_km: parse_or(vars, "SCHOOL_RADIUS", defaults.radius_km),
        start: time_or("SCHOOL_START_HOUR", "SCHOOL_START_MINUTE", defaults.start),
        end: time_or("SCHOOL_END_HOUR", "SCHOOL_END_MINUTE", defaults.end),
        late_threshold_minutes: parse_or(vars, "LATE_THRESHOLD", defaults.late_threshold_minutes),
        utc_offset: utc_offset(offset_minutes).unwrap_or_else(|| {
            warn!(offset_minutes, "SCHOOL_UTC_OFFSET_MINUTES out of range; using default");
            defaults.utc_offset
        }),
    }
}

/// Missing or unparseable values fall back to `default`.
fn parse_or<T: FromStr>(vars: Lookup<'_>, key: &str, default: T) -> T {
    match vars(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Unparseable config value; using default");
            default
        }),
        None => default,
    }
}

fn flag_or(vars: Lookup<'_>, key: &str, default: bool) -> bool {
    match vars(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn list_or(vars: Lookup<'_>, key: &str, default: &[&str]) -> Vec<String> {
    match vars(key) {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}
