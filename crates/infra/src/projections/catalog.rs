use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use pitstop_catalog::{ServiceEvent, ServiceField, ServiceId};
use pitstop_core::{AggregateId, BusinessId, Money};
use pitstop_events::EventEnvelope;

use crate::read_model::BusinessStore;

/// Queryable service catalog read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub service_id: ServiceId,
    pub name: String,
    pub price: Money,
    pub fields: Vec<ServiceField>,
}

/// Stream type this projection consumes; other envelopes are ignored.
pub const SERVICE_AGGREGATE_TYPE: &str = "catalog.service";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    business_id: BusinessId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum CatalogProjectionError {
    #[error("failed to deserialize service event: {0}")]
    Deserialize(String),

    #[error("business isolation violation: {0}")]
    BusinessIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("price change for unknown service {0}")]
    UnknownService(ServiceId),
}

/// Service catalog projection: one record per service.
#[derive(Debug)]
pub struct ServiceCatalogProjection<S>
where
    S: BusinessStore<ServiceId, ServiceRecord>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> ServiceCatalogProjection<S>
where
    S: BusinessStore<ServiceId, ServiceRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, business_id: BusinessId, service_id: &ServiceId) -> Option<ServiceRecord> {
        self.store.get(business_id, service_id)
    }

    pub fn list(&self, business_id: BusinessId) -> Vec<ServiceRecord> {
        let mut records = self.store.list(business_id);
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Apply a published envelope into the projection.
    ///
    /// Enforces business isolation and monotonic sequence per stream.
    /// Replays at or below the cursor are ignored.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CatalogProjectionError> {
        if envelope.aggregate_type() != SERVICE_AGGREGATE_TYPE {
            return Ok(());
        }

        let business_id = envelope.business_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                business_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: ServiceEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| CatalogProjectionError::Deserialize(e.to_string()))?;

            let (event_business, service_id) = match &event {
                ServiceEvent::ServiceCreated(e) => (e.business_id, e.service_id),
                ServiceEvent::ServicePriceChanged(e) => (e.business_id, e.service_id),
            };

            if event_business != business_id {
                return Err(CatalogProjectionError::BusinessIsolation(
                    "event business_id does not match envelope business_id".to_string(),
                ));
            }

            if service_id.0 != aggregate_id {
                return Err(CatalogProjectionError::BusinessIsolation(
                    "event service_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                ServiceEvent::ServiceCreated(e) => {
                    self.store.upsert(
                        business_id,
                        e.service_id,
                        ServiceRecord {
                            service_id: e.service_id,
                            name: e.name,
                            price: e.price,
                            fields: e.fields,
                        },
                    );
                }
                ServiceEvent::ServicePriceChanged(e) => {
                    let mut record = self
                        .store
                        .get(business_id, &e.service_id)
                        .ok_or(CatalogProjectionError::UnknownService(e.service_id))?;
                    record.price = e.price;
                    self.store.upsert(business_id, e.service_id, record);
                }
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), CatalogProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut businesses = envs.iter().map(|e| e.business_id()).collect::<Vec<_>>();
            businesses.sort_by_key(|b| *b.as_uuid().as_bytes());
            businesses.dedup();
            for b in businesses {
                self.store.clear_business(b);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.business_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
