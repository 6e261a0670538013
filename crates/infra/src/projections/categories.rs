use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use pitstop_core::{AggregateId, BusinessId};
use pitstop_events::EventEnvelope;
use pitstop_inventory::{CategoryEvent, CategoryId};

use crate::read_model::BusinessStore;

/// Queryable part category read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRecord {
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub field_names: Vec<String>,
    pub compatible_vehicles: Vec<String>,
}

/// Stream type this projection consumes; other envelopes are ignored.
pub const CATEGORY_AGGREGATE_TYPE: &str = "inventory.category";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    business_id: BusinessId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum CategoryProjectionError {
    #[error("failed to deserialize category event: {0}")]
    Deserialize(String),

    #[error("business isolation violation: {0}")]
    BusinessIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event references unknown category {0}")]
    UnknownCategory(CategoryId),
}

fn check_source(
    envelope_business: BusinessId,
    event_business: BusinessId,
    envelope_aggregate: AggregateId,
    event_category: CategoryId,
) -> Result<(), CategoryProjectionError> {
    if event_business != envelope_business {
        return Err(CategoryProjectionError::BusinessIsolation(
            "event business_id does not match envelope business_id".to_string(),
        ));
    }
    if event_category.0 != envelope_aggregate {
        return Err(CategoryProjectionError::BusinessIsolation(
            "event category_id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}

/// Part categories projection: one record per category.
#[derive(Debug)]
pub struct CategoriesProjection<S>
where
    S: BusinessStore<CategoryId, CategoryRecord>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> CategoriesProjection<S>
where
    S: BusinessStore<CategoryId, CategoryRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, business_id: BusinessId, category_id: &CategoryId) -> Option<CategoryRecord> {
        self.store.get(business_id, category_id)
    }

    pub fn list(&self, business_id: BusinessId) -> Vec<CategoryRecord> {
        let mut records = self.store.list(business_id);
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CategoryProjectionError> {
        if envelope.aggregate_type() != CATEGORY_AGGREGATE_TYPE {
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
                return Err(CategoryProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(CategoryProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: CategoryEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| CategoryProjectionError::Deserialize(e.to_string()))?;

            match event {
                CategoryEvent::CategoryCreated(e) => {
                    check_source(business_id, e.business_id, aggregate_id, e.category_id)?;
                    self.store.upsert(
                        business_id,
                        e.category_id,
                        CategoryRecord {
                            category_id: e.category_id,
                            name: e.name,
                            description: e.description,
                            field_names: e.field_names,
                            compatible_vehicles: e.compatible_vehicles,
                        },
                    );
                }
                CategoryEvent::CategoryRenamed(e) => {
                    check_source(business_id, e.business_id, aggregate_id, e.category_id)?;
                    let mut record = self
                        .store
                        .get(business_id, &e.category_id)
                        .ok_or(CategoryProjectionError::UnknownCategory(e.category_id))?;
                    record.name = e.name;
                    self.store.upsert(business_id, e.category_id, record);
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
    ) -> Result<(), CategoryProjectionError> {
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
