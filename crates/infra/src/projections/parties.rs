//! Directory read models for customers and suppliers.
//!
//! Both are upsert-shaped directories over low-churn aggregates; they share
//! the same cursor discipline as the other projections.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use pitstop_core::{AggregateId, BusinessId};
use pitstop_events::EventEnvelope;
use pitstop_parties::{
    ContactInfo, CustomerEvent, CustomerId, SupplierEvent, SupplierId, Vehicle,
};

use crate::read_model::BusinessStore;

/// Queryable customer read model, vehicles included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub vehicles: Vec<Vehicle>,
}

/// Queryable supplier read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierRecord {
    pub supplier_id: SupplierId,
    pub name: String,
    pub contact: ContactInfo,
}

/// Stream types these projections consume; other envelopes are ignored.
pub const CUSTOMER_AGGREGATE_TYPE: &str = "parties.customer";
pub const SUPPLIER_AGGREGATE_TYPE: &str = "parties.supplier";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    business_id: BusinessId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum DirectoryProjectionError {
    #[error("failed to deserialize directory event: {0}")]
    Deserialize(String),

    #[error("business isolation violation: {0}")]
    BusinessIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown customer {0}")]
    UnknownCustomer(CustomerId),
}

fn check_cursor(
    cursors: &mut HashMap<CursorKey, u64>,
    key: CursorKey,
    seq: u64,
) -> Result<Option<()>, DirectoryProjectionError> {
    let last = *cursors.get(&key).unwrap_or(&0);

    if seq == 0 {
        return Err(DirectoryProjectionError::NonMonotonicSequence { last, found: seq });
    }
    if seq <= last {
        // Duplicate or replay; safe to ignore.
        return Ok(None);
    }
    if seq != last + 1 && last != 0 {
        return Err(DirectoryProjectionError::NonMonotonicSequence { last, found: seq });
    }

    Ok(Some(()))
}

/// Customer directory projection.
#[derive(Debug)]
pub struct CustomerDirectoryProjection<S>
where
    S: BusinessStore<CustomerId, CustomerRecord>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> CustomerDirectoryProjection<S>
where
    S: BusinessStore<CustomerId, CustomerRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, business_id: BusinessId, customer_id: &CustomerId) -> Option<CustomerRecord> {
        self.store.get(business_id, customer_id)
    }

    pub fn list(&self, business_id: BusinessId) -> Vec<CustomerRecord> {
        let mut records = self.store.list(business_id);
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), DirectoryProjectionError> {
        if envelope.aggregate_type() != CUSTOMER_AGGREGATE_TYPE {
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
            if check_cursor(&mut cursors, key, seq)?.is_none() {
                return Ok(());
            }

            let event: CustomerEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| DirectoryProjectionError::Deserialize(e.to_string()))?;

            let (event_business, customer_id) = match &event {
                CustomerEvent::CustomerRegistered(e) => (e.business_id, e.customer_id),
                CustomerEvent::VehicleAdded(e) => (e.business_id, e.customer_id),
            };

            if event_business != business_id {
                return Err(DirectoryProjectionError::BusinessIsolation(
                    "event business_id does not match envelope business_id".to_string(),
                ));
            }

            if customer_id.0 != aggregate_id {
                return Err(DirectoryProjectionError::BusinessIsolation(
                    "event customer_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                CustomerEvent::CustomerRegistered(e) => {
                    self.store.upsert(
                        business_id,
                        e.customer_id,
                        CustomerRecord {
                            customer_id: e.customer_id,
                            name: e.name,
                            email: e.email,
                            phone: e.phone,
                            vehicles: e.vehicles,
                        },
                    );
                }
                CustomerEvent::VehicleAdded(e) => {
                    let mut record = self
                        .store
                        .get(business_id, &e.customer_id)
                        .ok_or(DirectoryProjectionError::UnknownCustomer(e.customer_id))?;
                    record.vehicles.push(e.vehicle);
                    self.store.upsert(business_id, e.customer_id, record);
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
    ) -> Result<(), DirectoryProjectionError> {
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

/// Supplier directory projection.
#[derive(Debug)]
pub struct SupplierDirectoryProjection<S>
where
    S: BusinessStore<SupplierId, SupplierRecord>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> SupplierDirectoryProjection<S>
where
    S: BusinessStore<SupplierId, SupplierRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, business_id: BusinessId, supplier_id: &SupplierId) -> Option<SupplierRecord> {
        self.store.get(business_id, supplier_id)
    }

    pub fn list(&self, business_id: BusinessId) -> Vec<SupplierRecord> {
        let mut records = self.store.list(business_id);
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), DirectoryProjectionError> {
        if envelope.aggregate_type() != SUPPLIER_AGGREGATE_TYPE {
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
            if check_cursor(&mut cursors, key, seq)?.is_none() {
                return Ok(());
            }

            let event: SupplierEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| DirectoryProjectionError::Deserialize(e.to_string()))?;

            let SupplierEvent::SupplierRegistered(e) = event;

            if e.business_id != business_id {
                return Err(DirectoryProjectionError::BusinessIsolation(
                    "event business_id does not match envelope business_id".to_string(),
                ));
            }

            if e.supplier_id.0 != aggregate_id {
                return Err(DirectoryProjectionError::BusinessIsolation(
                    "event supplier_id does not match envelope aggregate_id".to_string(),
                ));
            }

            self.store.upsert(
                business_id,
                e.supplier_id,
                SupplierRecord {
                    supplier_id: e.supplier_id,
                    name: e.name,
                    contact: e.contact,
                },
            );

            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), DirectoryProjectionError> {
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
