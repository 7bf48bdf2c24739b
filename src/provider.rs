use std::collections::HashMap;
use std::future::Future;

use thiserror::Error;
use tracing::{debug, info};

use crate::dns::{ApiError, DnsApi, NewRecord, ProviderRecord};
use crate::endpoint::{merge_by_name_type, Changes, Endpoint, RecordType};
use crate::filter::{DomainFilter, ZoneIdFilter};
use crate::zone::{absolute_name, endpoints_by_zone, is_apex, relative_name, Zone, ZoneMap};

/// Provider records per zone ID, taken once per pass before any mutation.
pub type RecordSnapshot = HashMap<String, Vec<ProviderRecord>>;

#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub domain_filter: DomainFilter,
    pub zone_id_filter: ZoneIdFilter,
    pub dry_run: bool,
}

/// Reconciles a change set against StackPath DNS.
///
/// Every call re-reads zones and records; nothing is cached between passes.
/// Provider calls are issued one at a time and the first failure aborts the
/// pass, leaving whatever was already applied for the next pass to correct.
#[derive(Debug)]
pub struct StackPathProvider<A> {
    api: A,
    domain_filter: DomainFilter,
    zone_id_filter: ZoneIdFilter,
    dry_run: bool,
}

impl<A: DnsApi> StackPathProvider<A> {
    pub fn new(api: A, config: ProviderConfig) -> Self {
        info!(dry_run = config.dry_run, "creating StackPath provider");
        Self {
            api,
            domain_filter: config.domain_filter,
            zone_id_filter: config.zone_id_filter,
            dry_run: config.dry_run,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Zones that pass both the zone ID and the domain filter.
    pub async fn zones(&self) -> Result<Vec<Zone>, ProviderError> {
        let zones = self.api.list_zones().await?;

        Ok(zones
            .into_iter()
            .filter(|zone| {
                let keep = self.zone_id_filter.matches(&zone.id)
                    && self.domain_filter.matches(&zone.domain);
                if keep {
                    debug!(zone_id = %zone.id, domain = %zone.domain, "matched zone");
                } else {
                    debug!(zone_id = %zone.id, domain = %zone.domain, "filtered zone");
                }
                keep
            })
            .collect())
    }

    /// Raw provider records of every zone given.
    pub async fn snapshot(&self, zones: &[Zone]) -> Result<RecordSnapshot, ProviderError> {
        let mut snapshot = RecordSnapshot::with_capacity(zones.len());
        for zone in zones {
            let records = self.api.list_records(&zone.id).await?;
            snapshot.insert(zone.id.clone(), records);
        }
        Ok(snapshot)
    }

    /// Current state of the given zones as merged endpoints.
    pub async fn list_records(&self, zones: &[Zone]) -> Result<Vec<Endpoint>, ProviderError> {
        let snapshot = self.snapshot(zones).await?;
        Ok(current_endpoints(zones, &snapshot))
    }

    /// Current state of every zone this provider may touch.
    #[tracing::instrument(skip(self))]
    pub async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        info!("getting records from StackPath");
        let zones = self.zones().await?;
        self.list_records(&zones).await
    }

    /// Applies one change set: creates, then deletes, then updates.
    #[tracing::instrument(skip_all, level = "info")]
    pub async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError> {
        let zones = self.zones().await?;
        let zone_map = ZoneMap::new(&zones);
        debug!("resolved {} zones", zone_map.len());

        let snapshot = self.snapshot(&zones).await?;
        let current = current_endpoints(&zones, &snapshot);
        debug!(endpoints = current.len(), "took record snapshot");

        self.create(&changes.create, &zone_map).await?;
        self.delete(&changes.delete, &zone_map, &snapshot).await?;
        self.update(&changes.update_old, &changes.update_new, &zone_map, &snapshot)
            .await
    }

    /// Runs [`apply_changes`](Self::apply_changes) until `cancel` resolves.
    /// Mutations issued before cancellation stay applied.
    pub async fn apply_changes_until<F>(
        &self,
        changes: &Changes,
        cancel: F,
    ) -> Result<(), ProviderError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = cancel => Err(ProviderError::Interrupted),
            res = self.apply_changes(changes) => res,
        }
    }

    /// Writes one provider record per target of every endpoint.
    pub async fn create(
        &self,
        endpoints: &[Endpoint],
        zones: &ZoneMap,
    ) -> Result<(), ProviderError> {
        for bucket in endpoints_by_zone(zones, endpoints) {
            info!(
                "creating {} records in zone {} (ID: {})",
                bucket.endpoints.len(),
                bucket.domain,
                bucket.zone_id
            );

            for endpoint in &bucket.endpoints {
                for target in &endpoint.targets {
                    let record = NewRecord {
                        name: relative_name(&endpoint.dns_name, &bucket.domain),
                        record_type: endpoint.record_type,
                        ttl: endpoint.effective_ttl(),
                        data: target.clone(),
                    };

                    if self.dry_run {
                        info!(
                            "would have created record: {} {} {} {}",
                            endpoint.dns_name, endpoint.record_type, target, record.ttl
                        );
                        continue;
                    }

                    info!(
                        "creating record {} {} {} {}",
                        absolute_name(&record.name, &bucket.domain),
                        record.record_type,
                        record.data,
                        record.ttl
                    );
                    let created = self.api.create_record(&bucket.zone_id, &record).await?;
                    info!(
                        "created record {} (ID: {})",
                        absolute_name(&created.name, &bucket.domain),
                        created.id
                    );
                }
            }
        }

        Ok(())
    }

    /// Removes the provider record behind every target of every endpoint.
    ///
    /// Records are located in `snapshot` by name, type and value. A target
    /// with no matching record fails the call; later targets are left alone.
    pub async fn delete(
        &self,
        endpoints: &[Endpoint],
        zones: &ZoneMap,
        snapshot: &RecordSnapshot,
    ) -> Result<(), ProviderError> {
        info!("deleting {} record(s)", endpoints.len());

        for bucket in endpoints_by_zone(zones, endpoints) {
            let records = snapshot
                .get(&bucket.zone_id)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for endpoint in &bucket.endpoints {
                for target in &endpoint.targets {
                    let record_id = find_record_id(endpoint, target, records, &bucket.domain)
                        .ok_or_else(|| ProviderError::RecordNotFound {
                            dns_name: endpoint.dns_name.clone(),
                            record_type: endpoint.record_type,
                            target: target.clone(),
                        })?;

                    if self.dry_run {
                        info!(
                            "would have deleted record: {} {} {} {}",
                            endpoint.dns_name, endpoint.record_type, target, endpoint.ttl
                        );
                        continue;
                    }

                    self.api.delete_record(&bucket.zone_id, record_id).await?;
                    info!("deleted record {record_id}");
                }
            }
        }

        Ok(())
    }

    /// Replaces `old` with `new` in two phases.
    ///
    /// Phase one creates every value of `new`; phase two deletes every value
    /// of `old`, matched against `snapshot` as it was before phase one. There
    /// is no atomic swap: between the phases both sets are live, and if phase
    /// two fails they stay live until the next pass removes the old values.
    pub async fn update(
        &self,
        old: &[Endpoint],
        new: &[Endpoint],
        zones: &ZoneMap,
        snapshot: &RecordSnapshot,
    ) -> Result<(), ProviderError> {
        self.create(new, zones).await?;
        self.delete(old, zones, snapshot).await
    }
}

/// Converts a snapshot into merged endpoints, dropping record types this
/// crate does not manage.
fn current_endpoints(zones: &[Zone], snapshot: &RecordSnapshot) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();

    for zone in zones {
        for record in snapshot.get(&zone.id).into_iter().flatten() {
            match record.supported_type() {
                Some(record_type) => endpoints.push(Endpoint::new(
                    absolute_name(&record.name, &zone.domain),
                    record_type,
                    record.ttl,
                    [record.data.as_str()],
                )),
                None => debug!(
                    record_id = %record.id,
                    record_type = %record.record_type,
                    "ignoring unsupported record"
                ),
            }
        }
    }

    let merged = merge_by_name_type(endpoints);
    info!("found {} endpoints", merged.len());
    for endpoint in &merged {
        debug!(%endpoint, "found endpoint");
    }

    merged
}

/// Finds the provider record holding `target` for `endpoint`.
///
/// The provider has no stable key for a value, so the match is on relative
/// name, record type and value. Surrounding quotes and backslashes are not
/// part of the value: TXT data picks them up in transit. TTL is ignored.
pub fn find_record_id<'r>(
    endpoint: &Endpoint,
    target: &str,
    records: &'r [ProviderRecord],
    domain: &str,
) -> Option<&'r str> {
    let name = relative_name(&endpoint.dns_name, domain);
    let value = trim_quotes(target);

    records
        .iter()
        .find(|record| {
            same_name(&record.name, &name)
                && record.supported_type() == Some(endpoint.record_type)
                && trim_quotes(&record.data) == value
        })
        .map(|record| record.id.as_str())
}

fn same_name(stored: &str, wanted: &str) -> bool {
    (is_apex(stored) && is_apex(wanted)) || stored.eq_ignore_ascii_case(wanted)
}

fn trim_quotes(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\\')
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("record not found: {dns_name} {record_type} {target}")]
    RecordNotFound {
        dns_name: String,
        record_type: RecordType,
        target: String,
    },
    #[error("interrupted, remaining changes were not applied")]
    Interrupted,
}
