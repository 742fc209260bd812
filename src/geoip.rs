// src/geoip.rs
//! Country lookup for connecting IP addresses
//!
//! The lookup database itself lives outside this crate; audit logging only
//! needs `lookup(ip) -> country code`.

use std::collections::HashMap;
use std::net::IpAddr;

/// Country code reported when a lookup has no answer
pub const UNKNOWN_COUNTRY: &str = "XX";

/// Resolves an IP address to an ISO 3166 country code
pub trait GeoIpLookup: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> String;
}

/// Lookup backed by a fixed table, `XX` for everything else
#[derive(Debug, Clone, Default)]
pub struct StaticGeoIp {
    entries: HashMap<IpAddr, String>,
}

impl StaticGeoIp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, ip: IpAddr, country: impl Into<String>) -> Self {
        self.entries.insert(ip, country.into());
        self
    }
}

impl GeoIpLookup for StaticGeoIp {
    fn lookup(&self, ip: IpAddr) -> String {
        self.entries
            .get(&ip)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
    }
}
