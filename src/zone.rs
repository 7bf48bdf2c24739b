use std::collections::BTreeMap;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::filter::{is_subdomain_of, normalize};

/// Relative name the provider uses for the zone apex.
pub const APEX: &str = "@";

/// An authoritative zone held by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: String,
    pub domain: String,
}

impl Zone {
    pub fn new(id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
        }
    }
}

/// The zone that owns a DNS name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneMatch<'a> {
    pub id: &'a str,
    pub domain: &'a str,
}

/// Zone ID to domain lookup, rebuilt for every `apply_changes` call.
#[derive(Debug, Clone, Default)]
pub struct ZoneMap {
    domains: BTreeMap<String, String>,
}

impl ZoneMap {
    pub fn new(zones: &[Zone]) -> Self {
        let mut map = Self::default();
        for zone in zones {
            map.add(&zone.id, &zone.domain);
        }
        map
    }

    pub fn add(&mut self, zone_id: &str, domain: &str) {
        self.domains.insert(zone_id.to_owned(), normalize(domain));
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Finds the zone owning `dns_name`. When zones are nested the longest
    /// domain wins, so `x.sub.example.com` lands in `sub.example.com` rather
    /// than `example.com`.
    pub fn find_zone(&self, dns_name: &str) -> Option<ZoneMatch<'_>> {
        let name = normalize(dns_name);

        self.domains
            .iter()
            .filter(|(_, domain)| is_subdomain_of(&name, domain))
            .max_by_key(|(_, domain)| domain.len())
            .map(|(id, domain)| ZoneMatch { id, domain })
    }
}

/// Endpoints destined for one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneChanges<'a> {
    pub zone_id: String,
    pub domain: String,
    pub endpoints: Vec<&'a Endpoint>,
}

/// Buckets endpoints by the zone that owns them, ordered by zone ID.
/// Endpoints outside every known zone are dropped.
pub fn endpoints_by_zone<'a>(zones: &ZoneMap, endpoints: &'a [Endpoint]) -> Vec<ZoneChanges<'a>> {
    let mut by_zone: BTreeMap<&str, ZoneChanges<'a>> = BTreeMap::new();

    for endpoint in endpoints {
        match zones.find_zone(&endpoint.dns_name) {
            Some(zone) => by_zone
                .entry(zone.id)
                .or_insert_with(|| ZoneChanges {
                    zone_id: zone.id.to_owned(),
                    domain: zone.domain.to_owned(),
                    endpoints: Vec::new(),
                })
                .endpoints
                .push(endpoint),
            None => debug!(
                dns_name = %endpoint.dns_name,
                "skipping record because no hosted zone matches its DNS name"
            ),
        }
    }

    by_zone.into_values().collect()
}

/// Converts a fully-qualified name into the provider's zone-relative form.
/// The apex becomes [`APEX`].
pub fn relative_name(dns_name: &str, domain: &str) -> String {
    let name = dns_name.trim_end_matches('.');
    let domain = domain.trim_end_matches('.');

    if name.is_empty() || name.eq_ignore_ascii_case(domain) {
        return APEX.to_owned();
    }

    let relative = name
        .len()
        .checked_sub(domain.len() + 1)
        .and_then(|split| {
            let suffix = name.get(split..)?;
            (suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(domain))
                .then(|| &name[..split])
        })
        .unwrap_or(name);

    if relative.is_empty() {
        APEX.to_owned()
    } else {
        relative.to_owned()
    }
}

/// Converts a provider-relative name into a fully-qualified one.
pub fn absolute_name(name: &str, domain: &str) -> String {
    if is_apex(name) {
        domain.to_owned()
    } else {
        format!("{name}.{domain}")
    }
}

pub fn is_apex(name: &str) -> bool {
    name.is_empty() || name == APEX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::RecordType;

    fn zones() -> ZoneMap {
        ZoneMap::new(&[
            Zone::new("zone-root", "example.com"),
            Zone::new("zone-sub", "sub.example.com"),
        ])
    }

    #[test]
    fn longest_suffix_wins() {
        let zones = zones();
        let found = zones.find_zone("x.sub.example.com").unwrap();
        assert_eq!(found.id, "zone-sub");
        assert_eq!(found.domain, "sub.example.com");

        assert_eq!(zones.find_zone("y.example.com").unwrap().id, "zone-root");
    }

    #[test]
    fn unknown_names_have_no_zone() {
        assert_eq!(zones().find_zone("y.other.com"), None);
        assert_eq!(zones().find_zone("notexample.com"), None);
    }

    #[test]
    fn apex_and_trailing_dot_resolve() {
        let zones = zones();
        assert_eq!(zones.find_zone("example.com.").unwrap().id, "zone-root");
        assert_eq!(zones.find_zone("SUB.Example.com").unwrap().id, "zone-sub");
    }

    #[test]
    fn groups_endpoints_and_skips_orphans() {
        let endpoints = vec![
            Endpoint::new("a.example.com", RecordType::A, 300, ["1.1.1.1"]),
            Endpoint::new("b.sub.example.com", RecordType::A, 300, ["2.2.2.2"]),
            Endpoint::new("c.example.com", RecordType::Txt, 300, ["hi"]),
            Endpoint::new("y.other.com", RecordType::A, 300, ["3.3.3.3"]),
        ];

        let zones = zones();
        let grouped = endpoints_by_zone(&zones, &endpoints);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].zone_id, "zone-root");
        assert_eq!(grouped[0].domain, "example.com");
        let root: Vec<_> = grouped[0].endpoints.iter().map(|e| e.dns_name.as_str()).collect();
        assert_eq!(root, vec!["a.example.com", "c.example.com"]);
        assert_eq!(grouped[1].zone_id, "zone-sub");
        assert_eq!(grouped[1].endpoints[0].dns_name, "b.sub.example.com");
    }

    #[test]
    fn relative_names() {
        assert_eq!(relative_name("a.example.com", "example.com"), "a");
        assert_eq!(relative_name("a.b.example.com.", "example.com"), "a.b");
        assert_eq!(relative_name("A.Example.com", "example.com"), "A");
        assert_eq!(relative_name("example.com", "example.com"), APEX);
        assert_eq!(relative_name("", "example.com"), APEX);
    }

    #[test]
    fn apex_round_trips() {
        for name in ["", "@"] {
            let dns_name = absolute_name(name, "example.com");
            assert_eq!(dns_name, "example.com");
            assert_eq!(relative_name(&dns_name, "example.com"), "@");
        }
        assert_eq!(absolute_name("www", "example.com"), "www.example.com");
    }
}
