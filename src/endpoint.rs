use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// TTL used when an endpoint arrives without one.
pub const DEFAULT_TTL: u32 = 300;

/// DNS record types this backend manages. Anything else the provider holds
/// (SOA, CAA, ...) is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Srv,
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = UnsupportedRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "MX" => Ok(RecordType::Mx),
            "NS" => Ok(RecordType::Ns),
            "SRV" => Ok(RecordType::Srv),
            "TXT" => Ok(RecordType::Txt),
            _ => Err(UnsupportedRecordType(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported record type {0:?}")]
pub struct UnsupportedRecordType(pub String);

/// A DNS name with all of its values, independent of how the provider
/// stores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    pub record_type: RecordType,
    #[serde(rename = "recordTTL", default)]
    pub ttl: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub targets: Vec<String>,
}

impl Endpoint {
    pub fn new<N, I, T>(dns_name: N, record_type: RecordType, ttl: u32, targets: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            dns_name: dns_name.into(),
            record_type,
            ttl,
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }

    /// The TTL to write, falling back to [`DEFAULT_TTL`] when unset.
    pub fn effective_ttl(&self) -> u32 {
        if self.ttl == 0 {
            DEFAULT_TTL
        } else {
            self.ttl
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.dns_name,
            self.ttl,
            self.record_type,
            self.targets.join(", ")
        )
    }
}

/// A precomputed set of changes for one reconciliation pass.
///
/// Field names follow the external-dns plan JSON so a plan can be fed in
/// directly. Updates carry both sides: `update_old` is removed and
/// `update_new` is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changes {
    #[serde(rename = "Create", default, deserialize_with = "nullable")]
    pub create: Vec<Endpoint>,
    #[serde(rename = "UpdateOld", default, deserialize_with = "nullable")]
    pub update_old: Vec<Endpoint>,
    #[serde(rename = "UpdateNew", default, deserialize_with = "nullable")]
    pub update_new: Vec<Endpoint>,
    #[serde(rename = "Delete", default, deserialize_with = "nullable")]
    pub delete: Vec<Endpoint>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update_old.is_empty()
            && self.update_new.is_empty()
            && self.delete.is_empty()
    }
}

// external-dns sends `null` for empty lists.
fn nullable<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Collapses endpoints sharing a DNS name and record type into one endpoint
/// carrying all of their targets.
///
/// The provider stores one value per record, so a round-robin `A` set comes
/// back as several rows. Targets are concatenated in input order and the
/// first endpoint of each group supplies the TTL. Groups appear in the order
/// their first member was seen.
pub fn merge_by_name_type(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut index: HashMap<(String, RecordType), usize> = HashMap::new();
    let mut merged: Vec<Endpoint> = Vec::with_capacity(endpoints.len());

    for endpoint in endpoints {
        match index.entry((endpoint.dns_name.clone(), endpoint.record_type)) {
            Entry::Occupied(slot) => merged[*slot.get()].targets.extend(endpoint.targets),
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(endpoint);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_records_sharing_name_and_type() {
        let merged = merge_by_name_type(vec![
            Endpoint::new("a.example.com", RecordType::A, 300, ["1.1.1.1"]),
            Endpoint::new("a.example.com", RecordType::A, 300, ["2.2.2.2"]),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].dns_name, "a.example.com");
        assert_eq!(merged[0].record_type, RecordType::A);
        let mut targets = merged[0].targets.clone();
        targets.sort();
        assert_eq!(targets, vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[test]
    fn merge_keeps_distinct_types_apart() {
        let merged = merge_by_name_type(vec![
            Endpoint::new("a.example.com", RecordType::A, 300, ["1.1.1.1"]),
            Endpoint::new("a.example.com", RecordType::Txt, 300, ["hello"]),
            Endpoint::new("b.example.com", RecordType::A, 300, ["1.1.1.1"]),
        ]);

        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn merge_takes_ttl_from_first_member() {
        let merged = merge_by_name_type(vec![
            Endpoint::new("a.example.com", RecordType::A, 60, ["1.1.1.1"]),
            Endpoint::new("a.example.com", RecordType::A, 3600, ["2.2.2.2"]),
        ]);

        assert_eq!(merged[0].ttl, 60);
    }

    #[test]
    fn merge_is_idempotent() {
        let once = merge_by_name_type(vec![
            Endpoint::new("a.example.com", RecordType::A, 300, ["1.1.1.1"]),
            Endpoint::new("a.example.com", RecordType::A, 300, ["2.2.2.2"]),
            Endpoint::new("example.com", RecordType::Mx, 300, ["10 mail.example.com"]),
        ]);
        let twice = merge_by_name_type(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn parses_record_types_case_insensitively() {
        assert_eq!("aaaa".parse::<RecordType>(), Ok(RecordType::Aaaa));
        assert_eq!("CNAME".parse::<RecordType>(), Ok(RecordType::Cname));
        assert_eq!(
            "SOA".parse::<RecordType>(),
            Err(UnsupportedRecordType("SOA".into()))
        );
    }

    #[test]
    fn record_type_round_trips_through_display() {
        for rt in [RecordType::A, RecordType::Aaaa, RecordType::Srv, RecordType::Txt] {
            assert_eq!(rt.to_string().parse::<RecordType>(), Ok(rt));
        }
    }

    #[test]
    fn unset_ttl_falls_back_to_default() {
        let endpoint = Endpoint::new("a.example.com", RecordType::A, 0, ["1.1.1.1"]);
        assert_eq!(endpoint.effective_ttl(), DEFAULT_TTL);
    }

    #[test]
    fn decodes_external_dns_plan() {
        let json = r#"{
            "Create": [
                {
                    "dnsName": "a.example.com",
                    "recordType": "A",
                    "recordTTL": 120,
                    "targets": ["1.1.1.1"]
                }
            ],
            "UpdateOld": null,
            "UpdateNew": null,
            "Delete": [
                {
                    "dnsName": "txt.example.com",
                    "recordType": "TXT",
                    "targets": ["\"heritage=external-dns\""],
                    "labels": {}
                }
            ]
        }"#;

        let changes: Changes = serde_json::from_str(json).unwrap();

        assert_eq!(
            changes.create,
            vec![Endpoint::new("a.example.com", RecordType::A, 120, ["1.1.1.1"])]
        );
        assert!(changes.update_old.is_empty());
        assert!(changes.update_new.is_empty());
        assert_eq!(changes.delete[0].record_type, RecordType::Txt);
        assert_eq!(changes.delete[0].ttl, 0);
    }

    #[test]
    fn rejects_unsupported_type_in_plan() {
        let json = r#"{
            "Create": [{"dnsName": "a.example.com", "recordType": "SOA", "targets": []}]
        }"#;
        assert!(serde_json::from_str::<Changes>(json).is_err());
    }
}
