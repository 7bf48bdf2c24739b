use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::{ApiError, DnsApi, NewRecord, ProviderRecord};
use crate::zone::Zone;

/// A mutation the fixture has seen, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { zone_id: String, record: NewRecord },
    Delete { zone_id: String, record_id: String },
}

#[derive(Debug, Default)]
struct State {
    zones: Vec<Zone>,
    records: HashMap<String, Vec<ProviderRecord>>,
    calls: Vec<Call>,
    next_id: u64,
}

/// In-memory provider used in test mode and by the reconciliation tests.
///
/// Never touches the network. Creates assign sequential record IDs, deletes
/// remove the record, and every mutation is journaled.
#[derive(Debug, Default)]
pub struct FixtureApi {
    state: Mutex<State>,
}

impl FixtureApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Three empty zones, as served in test mode.
    pub fn stock() -> Self {
        Self::new()
            .with_zone("TEST_ZONE_ID1", "zone1.test")
            .with_zone("TEST_ZONE_ID2", "zone2.test")
            .with_zone("TEST_ZONE_ID3", "zone3.test")
    }

    pub fn with_zone(self, id: &str, domain: &str) -> Self {
        {
            let mut state = self.lock();
            state.zones.push(Zone::new(id, domain));
            state.records.entry(id.to_owned()).or_default();
        }
        self
    }

    pub fn with_record(
        self,
        zone_id: &str,
        id: &str,
        name: &str,
        record_type: &str,
        ttl: u32,
        data: &str,
    ) -> Self {
        self.lock()
            .records
            .entry(zone_id.to_owned())
            .or_default()
            .push(ProviderRecord {
                id: id.to_owned(),
                name: name.to_owned(),
                record_type: record_type.to_owned(),
                ttl,
                data: data.to_owned(),
            });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn records(&self, zone_id: &str) -> Vec<ProviderRecord> {
        self.lock().records.get(zone_id).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Poisoned only by a panicking test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl DnsApi for FixtureApi {
    async fn list_zones(&self) -> Result<Vec<Zone>, ApiError> {
        Ok(self.lock().zones.clone())
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<ProviderRecord>, ApiError> {
        self.lock()
            .records
            .get(zone_id)
            .cloned()
            .ok_or_else(|| ApiError::ZoneNotFound(zone_id.to_owned()))
    }

    async fn create_record(
        &self,
        zone_id: &str,
        record: &NewRecord,
    ) -> Result<ProviderRecord, ApiError> {
        let mut state = self.lock();
        state.next_id += 1;
        let created = ProviderRecord {
            id: format!("fixture-{}", state.next_id),
            name: record.name.clone(),
            record_type: record.record_type.to_string(),
            ttl: record.ttl,
            data: record.data.clone(),
        };

        state
            .records
            .get_mut(zone_id)
            .ok_or_else(|| ApiError::ZoneNotFound(zone_id.to_owned()))?
            .push(created.clone());
        state.calls.push(Call::Create {
            zone_id: zone_id.to_owned(),
            record: record.clone(),
        });
        debug!(zone_id, record_id = %created.id, "fixture created record");

        Ok(created)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        let records = state
            .records
            .get_mut(zone_id)
            .ok_or_else(|| ApiError::ZoneNotFound(zone_id.to_owned()))?;
        let position = records
            .iter()
            .position(|r| r.id == record_id)
            .ok_or_else(|| ApiError::RecordNotFound {
                zone_id: zone_id.to_owned(),
                record_id: record_id.to_owned(),
            })?;

        records.remove(position);
        state.calls.push(Call::Delete {
            zone_id: zone_id.to_owned(),
            record_id: record_id.to_owned(),
        });
        debug!(zone_id, record_id, "fixture deleted record");

        Ok(())
    }
}
