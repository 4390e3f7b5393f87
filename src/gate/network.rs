use std::net::IpAddr;
use std::str::FromStr;

use regex::RegexSet;
use tracing::warn;

use crate::gate::{
    Gate, GateDecision, GatePipeline, Rejection,
    context::{NetworkContext, X_TTL},
};

pub type NetworkPipeline = GatePipeline<NetworkContext>;

pub const TAG_EXEMPT: &str = "exempt";
pub const TAG_ADMIN_BYPASSED: &str = "admin-bypassed";

pub const PROXY_HEADERS: [&str; 4] = ["X-VPN-Client", "X-Forwarded-Proto", "X-Proxy-Authorization", "Via"];
pub const VPN_USER_AGENT_KEYWORDS: [&str; 7] = [
    "vpn",
    "proxy",
    "tunnel",
    "nordvpn",
    "expressvpn",
    "cyberghost",
    "protonvpn",
];
pub const MIN_TTL: i64 = 50;
pub const ALLOWED_NETWORK_TYPES: [&str; 6] = ["wifi", "cellular", "4g", "5g", "lte", "ethernet"];
pub const SECURE_CELLULAR_TYPES: [&str; 4] = ["4g", "5g", "lte", "lte-a"];

/// An allow-list entry: a single address or a CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRule {
    Exact(IpAddr),
    Cidr { network: IpAddr, prefix: u8 },
}

impl IpRule {
    /// `::ffff:a.b.c.d` is matched as the IPv4 address it carries.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
            v4 => v4,
        };

        match *self {
            IpRule::Exact(addr) => addr == ip,
            IpRule::Cidr { network, prefix } => match (network, ip) {
                (IpAddr::V4(net), IpAddr::V4(ip)) => {
                    let mask = u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0);
                    u32::from(net) & mask == u32::from(ip) & mask
                }
                (IpAddr::V6(net), IpAddr::V6(ip)) => {
                    let mask = u128::MAX.checked_shl(128 - prefix as u32).unwrap_or(0);
                    u128::from(net) & mask == u128::from(ip) & mask
                }
                _ => false,
            },
        }
    }
}

impl FromStr for IpRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            None => s
                .parse::<IpAddr>()
                .map(IpRule::Exact)
                .map_err(|e| format!("invalid address {s:?}: {e}")),
            Some((addr, prefix)) => {
                let network = addr
                    .parse::<IpAddr>()
                    .map_err(|e| format!("invalid network {addr:?}: {e}"))?;
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|e| format!("invalid prefix {prefix:?}: {e}"))?;
                let max = if network.is_ipv4() { 32 } else { 128 };
                if prefix > max {
                    return Err(format!("prefix /{prefix} too long for {network}"));
                }
                Ok(IpRule::Cidr { network, prefix })
            }
        }
    }
}

/// Parses each entry, logging and skipping the ones that do not parse.
pub fn parse_ip_rules<'a>(entries: impl IntoIterator<Item = &'a str>) -> Vec<IpRule> {
    entries
        .into_iter()
        .filter(|e| !e.trim().is_empty())
        .filter_map(|entry| match entry.parse::<IpRule>() {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(error = %e, "Ignoring IP allow-list entry");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkToggles {
    pub vpn_check: bool,
    pub network_type_check: bool,
    pub wifi_check: bool,
    pub carrier_check: bool,
}

impl Default for NetworkToggles {
    fn default() -> Self {
        Self {
            vpn_check: false,
            network_type_check: false,
            wifi_check: true,
            carrier_check: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkPolicy {
    pub exempt_paths: Vec<String>,
    /// Shared secret for `X-Admin-Override`. Empty disables the override.
    pub admin_override_key: String,
    pub allowed_ip_ranges: Vec<IpRule>,
    pub allowed_ssids: Vec<String>,
    pub ssid_prefixes: Vec<String>,
    pub allowed_carriers: Vec<String>,
    pub toggles: NetworkToggles,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            exempt_paths: exempt_paths_for("/api/v1"),
            admin_override_key: String::new(),
            allowed_ip_ranges: parse_ip_rules(DEFAULT_IP_RANGES),
            allowed_ssids: to_strings(DEFAULT_SSIDS),
            ssid_prefixes: to_strings(DEFAULT_SSID_PREFIXES),
            allowed_carriers: to_strings(DEFAULT_CARRIERS),
            toggles: NetworkToggles::default(),
        }
    }
}

pub const DEFAULT_IP_RANGES: [&str; 9] = [
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "127.0.0.0/8",
    "103.0.0.0/8",
    "114.0.0.0/8",
    "202.0.0.0/8",
    "103.156.71.94",
    "203.78.113.253",
];
pub const DEFAULT_SSIDS: [&str; 5] = ["JTI-3.01", "JTI-3.02", "JTI-3.03", "JTI-3.04", "JTI-3.05"];
pub const DEFAULT_SSID_PREFIXES: [&str; 2] = ["JTI-", "UJIKOM-"];
pub const DEFAULT_CARRIERS: [&str; 7] = ["telkomsel", "indosat", "xl", "axis", "tri", "smartfren", "by.u"];

pub fn exempt_paths_for(api_prefix: &str) -> Vec<String> {
    ["/health", "/auth/login", "/auth/register"]
        .iter()
        .map(|p| format!("{api_prefix}{p}"))
        .collect()
}

fn to_strings(items: impl IntoIterator<Item = &'static str>) -> Vec<String> {
    items.into_iter().map(str::to_string).collect()
}

/// Assembles the chain in its fixed order. Toggles are read here, once.
pub fn build_pipeline(policy: &NetworkPolicy) -> NetworkPipeline {
    let toggles = policy.toggles;

    GatePipeline::new()
        .with(PathExemptionGate {
            paths: policy.exempt_paths.clone(),
        })
        .with(AdminOverrideGate {
            key: policy.admin_override_key.clone(),
        })
        .with(IpAllowListGate {
            rules: policy.allowed_ip_ranges.clone(),
        })
        .with_if(toggles.vpn_check, VpnHeuristicGate)
        .with_if(toggles.network_type_check, NetworkTypeGate)
        .with_if(
            toggles.wifi_check,
            WifiSsidGate::new(&policy.allowed_ssids, &policy.ssid_prefixes),
        )
        .with_if(
            toggles.carrier_check,
            CarrierGate {
                carriers: policy
                    .allowed_carriers
                    .iter()
                    .map(|c| c.to_lowercase())
                    .collect(),
            },
        )
}

pub struct PathExemptionGate {
    pub paths: Vec<String>,
}

impl Gate<NetworkContext> for PathExemptionGate {
    fn name(&self) -> &'static str {
        "path_exemption"
    }

    fn evaluate(&self, ctx: &NetworkContext) -> GateDecision {
        if self.paths.iter().any(|p| p == &ctx.path) {
            GateDecision::Bypass(TAG_EXEMPT)
        } else {
            GateDecision::Pass
        }
    }
}

pub struct AdminOverrideGate {
    pub key: String,
}

impl Gate<NetworkContext> for AdminOverrideGate {
    fn name(&self) -> &'static str {
        "admin_override"
    }

    fn evaluate(&self, ctx: &NetworkContext) -> GateDecision {
        let header_matches =
            !self.key.is_empty() && ctx.admin_key().is_some_and(|k| k == self.key);

        if ctx.admin_flag || header_matches {
            GateDecision::Bypass(TAG_ADMIN_BYPASSED)
        } else {
            GateDecision::Pass
        }
    }
}

pub struct IpAllowListGate {
    pub rules: Vec<IpRule>,
}

impl Gate<NetworkContext> for IpAllowListGate {
    fn name(&self) -> &'static str {
        "ip_allow_list"
    }

    fn evaluate(&self, ctx: &NetworkContext) -> GateDecision {
        let allowed = ctx
            .client_ip
            .parse::<IpAddr>()
            .is_ok_and(|ip| self.rules.iter().any(|r| r.contains(ip)));

        if allowed {
            GateDecision::Pass
        } else {
            GateDecision::Reject(Rejection::new(self.name(), "Access denied: Invalid IP range"))
        }
    }
}

pub struct VpnHeuristicGate;

impl VpnHeuristicGate {
    fn detected(ctx: &NetworkContext) -> bool {
        if PROXY_HEADERS.iter().any(|h| ctx.headers.contains(h)) {
            return true;
        }

        let user_agent = ctx.user_agent().to_lowercase();
        if VPN_USER_AGENT_KEYWORDS.iter().any(|k| user_agent.contains(k)) {
            return true;
        }

        ctx.headers
            .get(X_TTL)
            .and_then(|ttl| ttl.parse::<i64>().ok())
            .is_some_and(|ttl| ttl < MIN_TTL)
    }
}

impl Gate<NetworkContext> for VpnHeuristicGate {
    fn name(&self) -> &'static str {
        "vpn_heuristic"
    }

    fn evaluate(&self, ctx: &NetworkContext) -> GateDecision {
        if Self::detected(ctx) {
            GateDecision::Reject(Rejection::new(self.name(), "Access denied: VPN usage detected"))
        } else {
            GateDecision::Pass
        }
    }
}

pub struct NetworkTypeGate;

impl Gate<NetworkContext> for NetworkTypeGate {
    fn name(&self) -> &'static str {
        "network_type"
    }

    fn evaluate(&self, ctx: &NetworkContext) -> GateDecision {
        let declared = ctx.network_type.to_lowercase();
        if ALLOWED_NETWORK_TYPES.contains(&declared.as_str()) {
            GateDecision::Pass
        } else {
            GateDecision::Reject(Rejection::new(self.name(), "Access denied: Invalid network type"))
        }
    }
}

pub struct WifiSsidGate {
    allowed: Vec<String>,
    prefixes: RegexSet,
}

impl WifiSsidGate {
    pub fn new(allowed: &[String], prefixes: &[String]) -> Self {
        let patterns = prefixes
            .iter()
            .map(|p| format!("^{}", regex::escape(&p.to_uppercase())));

        Self {
            allowed: allowed.to_vec(),
            prefixes: RegexSet::new(patterns).unwrap_or_else(|_| RegexSet::empty()),
        }
    }

    pub fn accepts(&self, ssid: &str) -> bool {
        if ssid.is_empty() {
            return false;
        }

        self.allowed.iter().any(|a| a.eq_ignore_ascii_case(ssid))
            || self.prefixes.is_match(&ssid.to_uppercase())
    }
}

impl Gate<NetworkContext> for WifiSsidGate {
    fn name(&self) -> &'static str {
        "wifi_ssid"
    }

    fn evaluate(&self, ctx: &NetworkContext) -> GateDecision {
        if self.accepts(&ctx.wifi_ssid) {
            GateDecision::Pass
        } else {
            GateDecision::Reject(Rejection::new(self.name(), "Access denied: Invalid WiFi network"))
        }
    }
}

pub struct CarrierGate {
    /// Lower-cased carrier names.
    pub carriers: Vec<String>,
}

impl Gate<NetworkContext> for CarrierGate {
    fn name(&self) -> &'static str {
        "cellular_carrier"
    }

    fn evaluate(&self, ctx: &NetworkContext) -> GateDecision {
        let carrier = ctx.carrier.to_lowercase();
        let network_type = ctx.network_type.to_lowercase();

        let known_carrier = !carrier.is_empty() && self.carriers.iter().any(|c| carrier.contains(c.as_str()));
        let secure = SECURE_CELLULAR_TYPES.contains(&network_type.as_str());

        if known_carrier && secure {
            GateDecision::Pass
        } else {
            GateDecision::Reject(Rejection::new(
                self.name(),
                "Access denied: Insecure cellular network",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{GateOutcome, context::HeaderSnapshot};

    const CHECKIN: &str = "/api/v1/attendance/checkin";

    fn ctx(path: &str, pairs: &[(&str, &str)]) -> NetworkContext {
        NetworkContext::new(path, None, HeaderSnapshot::from_pairs(pairs.iter().copied()), false)
    }

    fn campus(extra: &[(&str, &str)]) -> NetworkContext {
        let mut pairs = vec![
            ("X-Forwarded-For", "103.20.30.40"),
            ("X-WiFi-SSID", "JTI-3.01"),
            ("X-Carrier", "Telkomsel"),
            ("X-Network-Type", "4g"),
        ];
        pairs.extend_from_slice(extra);
        ctx(CHECKIN, &pairs)
    }

    fn policy_with_key(key: &str) -> NetworkPolicy {
        NetworkPolicy {
            admin_override_key: key.to_string(),
            ..NetworkPolicy::default()
        }
    }

    #[test]
    fn cidr_and_exact_rules() {
        let rule: IpRule = "172.16.0.0/12".parse().unwrap();
        assert!(rule.contains("172.31.255.1".parse().unwrap()));
        assert!(!rule.contains("172.32.0.1".parse().unwrap()));

        let exact: IpRule = "203.78.113.253".parse().unwrap();
        assert!(exact.contains("203.78.113.253".parse().unwrap()));
        assert!(!exact.contains("203.78.113.254".parse().unwrap()));

        let any: IpRule = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains("8.8.8.8".parse().unwrap()));
        assert!(!any.contains("::1".parse().unwrap()));

        assert!("10.0.0.0/33".parse::<IpRule>().is_err());
        assert!("not-an-ip".parse::<IpRule>().is_err());
    }

    #[test]
    fn mapped_ipv6_matches_ipv4_rules() {
        let rule: IpRule = "10.0.0.0/8".parse().unwrap();
        assert!(rule.contains("::ffff:10.1.2.3".parse().unwrap()));
        assert!(!rule.contains("::ffff:11.1.2.3".parse().unwrap()));

        let exact: IpRule = "103.156.71.94".parse().unwrap();
        assert!(exact.contains("::ffff:103.156.71.94".parse().unwrap()));

        let pipeline = build_pipeline(&NetworkPolicy::default());
        let mapped = campus(&[("X-Forwarded-For", "::ffff:10.1.2.3")]);
        assert_eq!(pipeline.run(&mapped), Ok(GateOutcome::Accepted));
    }

    #[test]
    fn bad_rules_are_skipped() {
        let rules = parse_ip_rules(["10.0.0.0/8", "garbage", "", "::1/128"]);
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn campus_request_is_validated() {
        let pipeline = build_pipeline(&NetworkPolicy::default());
        assert_eq!(pipeline.run(&campus(&[])), Ok(GateOutcome::Accepted));
    }

    #[test]
    fn exempt_paths_bypass_everything() {
        let pipeline = build_pipeline(&NetworkPolicy::default());
        let login = ctx("/api/v1/auth/login", &[("X-Forwarded-For", "8.8.8.8")]);
        assert_eq!(pipeline.run(&login), Ok(GateOutcome::Bypassed(TAG_EXEMPT)));
    }

    #[test]
    fn admin_header_bypasses_ip_check() {
        let pipeline = build_pipeline(&policy_with_key("s3cret"));
        let request = ctx(CHECKIN, &[("X-Forwarded-For", "8.8.8.8"), ("X-Admin-Override", "s3cret")]);
        assert_eq!(pipeline.run(&request), Ok(GateOutcome::Bypassed(TAG_ADMIN_BYPASSED)));

        let wrong = ctx(CHECKIN, &[("X-Forwarded-For", "8.8.8.8"), ("X-Admin-Override", "guess")]);
        assert_eq!(pipeline.run(&wrong).unwrap_err().gate, "ip_allow_list");
    }

    #[test]
    fn admin_flag_bypasses_without_header() {
        let pipeline = build_pipeline(&policy_with_key("s3cret"));
        let mut request = ctx(CHECKIN, &[("X-Forwarded-For", "8.8.8.8")]);
        request.admin_flag = true;
        assert_eq!(pipeline.run(&request), Ok(GateOutcome::Bypassed(TAG_ADMIN_BYPASSED)));
    }

    #[test]
    fn empty_admin_key_never_matches() {
        let pipeline = build_pipeline(&policy_with_key(""));
        let request = ctx(CHECKIN, &[("X-Forwarded-For", "8.8.8.8"), ("X-Admin-Override", "")]);
        assert_eq!(pipeline.run(&request).unwrap_err().gate, "ip_allow_list");
    }

    #[test]
    fn foreign_ip_is_rejected() {
        let pipeline = build_pipeline(&NetworkPolicy::default());
        let request = campus(&[]);
        let request = NetworkContext {
            client_ip: "8.8.8.8".into(),
            ..request
        };
        let err = pipeline.run(&request).unwrap_err();
        assert_eq!(err.reason, "Access denied: Invalid IP range");
    }

    #[test]
    fn ssid_matching() {
        let gate = WifiSsidGate::new(&to_strings(DEFAULT_SSIDS), &to_strings(DEFAULT_SSID_PREFIXES));
        assert!(gate.accepts("JTI-3.01"));
        assert!(gate.accepts("jti-3.01"));
        assert!(gate.accepts("JTI-9.99"));
        assert!(gate.accepts("ujikom-lab"));
        assert!(!gate.accepts("RandomWifi"));
        assert!(!gate.accepts("MY-JTI-3.01"));
        assert!(!gate.accepts(""));
    }

    #[test]
    fn ssid_prefixes_are_literal() {
        let gate = WifiSsidGate::new(&[], &["A.B".to_string()]);
        assert!(gate.accepts("a.b-lab"));
        assert!(!gate.accepts("AXB-lab"));
    }

    #[test]
    fn carrier_needs_known_name_and_secure_type() {
        let gate = CarrierGate {
            carriers: to_strings(DEFAULT_CARRIERS),
        };
        let with = |carrier: &str, kind: &str| {
            gate.evaluate(&ctx(CHECKIN, &[("X-Carrier", carrier), ("X-Network-Type", kind)]))
        };

        assert_eq!(with("Telkomsel", "LTE"), GateDecision::Pass);
        assert_eq!(with("XL Axiata", "lte-a"), GateDecision::Pass);
        assert!(matches!(with("Telkomsel", "3g"), GateDecision::Reject(_)));
        assert!(matches!(with("Verizon", "5g"), GateDecision::Reject(_)));
    }

    #[test]
    fn vpn_heuristics() {
        let gate = VpnHeuristicGate;
        assert!(matches!(gate.evaluate(&campus(&[("Via", "1.1 squid")])), GateDecision::Reject(_)));
        assert!(matches!(
            gate.evaluate(&campus(&[("User-Agent", "NordVPN/6.1 Android")])),
            GateDecision::Reject(_)
        ));
        assert!(matches!(gate.evaluate(&campus(&[("X-TTL", "32")])), GateDecision::Reject(_)));
        assert_eq!(gate.evaluate(&campus(&[("X-TTL", "64")])), GateDecision::Pass);
        assert_eq!(gate.evaluate(&campus(&[("X-TTL", "low")])), GateDecision::Pass);
        assert_eq!(gate.evaluate(&campus(&[("User-Agent", "okhttp/4.9")])), GateDecision::Pass);
    }

    #[test]
    fn network_type_allow_list_is_case_insensitive() {
        let gate = NetworkTypeGate;
        assert_eq!(gate.evaluate(&ctx(CHECKIN, &[("X-Network-Type", "WiFi")])), GateDecision::Pass);
        assert!(matches!(
            gate.evaluate(&ctx(CHECKIN, &[("X-Network-Type", "satellite")])),
            GateDecision::Reject(_)
        ));
    }

    #[test]
    fn optional_gates_follow_toggles() {
        let default = build_pipeline(&NetworkPolicy::default());
        assert_eq!(
            default.gate_names(),
            vec!["path_exemption", "admin_override", "ip_allow_list", "wifi_ssid", "cellular_carrier"]
        );

        let strict = build_pipeline(&NetworkPolicy {
            toggles: NetworkToggles {
                vpn_check: true,
                network_type_check: true,
                ..NetworkToggles::default()
            },
            ..NetworkPolicy::default()
        });
        assert_eq!(
            strict.run(&campus(&[("X-VPN-Client", "1")])).unwrap_err().gate,
            "vpn_heuristic"
        );
    }
}
