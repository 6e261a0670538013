use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use pitstop_core::{AggregateId, BusinessId, Money};
use pitstop_events::EventEnvelope;
use pitstop_inventory::{StockItemEvent, StockItemId};

use crate::read_model::BusinessStore;

/// Queryable stock read model: current on-hand per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub item_id: StockItemId,
    pub name: String,
    pub sku: String,
    pub retail_price: Money,
    pub on_hand: i64,
    pub reorder_point: i64,
}

impl StockLevel {
    pub fn needs_reorder(&self) -> bool {
        self.on_hand <= self.reorder_point
    }
}

/// Stream type this projection consumes; other envelopes are ignored.
pub const STOCK_ITEM_AGGREGATE_TYPE: &str = "inventory.stock_item";

/// Business+aggregate cursor supporting at-least-once delivery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    business_id: BusinessId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize stock event: {0}")]
    Deserialize(String),

    #[error("business isolation violation: {0}")]
    BusinessIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Stock levels projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a
/// business-isolated read model. Disposable and rebuildable from the
/// event stream.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: BusinessStore<StockItemId, StockLevel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> StockLevelsProjection<S>
where
    S: BusinessStore<StockItemId, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, business_id: BusinessId, item_id: &StockItemId) -> Option<StockLevel> {
        self.store.get(business_id, item_id)
    }

    pub fn list(&self, business_id: BusinessId) -> Vec<StockLevel> {
        self.store.list(business_id)
    }

    /// Items at or below their reorder point.
    pub fn list_low_stock(&self, business_id: BusinessId) -> Vec<StockLevel> {
        self.store
            .list(business_id)
            .into_iter()
            .filter(StockLevel::needs_reorder)
            .collect()
    }

    /// Apply a published envelope into the projection.
    ///
    /// Enforces business isolation and monotonic sequence per stream.
    /// Replays at or below the cursor are ignored.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        if envelope.aggregate_type() != STOCK_ITEM_AGGREGATE_TYPE {
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
                return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: StockItemEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

            let (event_business, item_id) = match &event {
                StockItemEvent::ItemCreated(e) => (e.business_id, e.item_id),
                StockItemEvent::StockReceived(e) => (e.business_id, e.item_id),
                StockItemEvent::StockConsumed(e) => (e.business_id, e.item_id),
                StockItemEvent::StockRestocked(e) => (e.business_id, e.item_id),
            };

            if event_business != business_id {
                return Err(StockProjectionError::BusinessIsolation(
                    "event business_id does not match envelope business_id".to_string(),
                ));
            }

            if item_id.0 != aggregate_id {
                return Err(StockProjectionError::BusinessIsolation(
                    "event item_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                StockItemEvent::ItemCreated(e) => {
                    self.store.upsert(
                        business_id,
                        e.item_id,
                        StockLevel {
                            item_id: e.item_id,
                            name: e.name,
                            sku: e.sku,
                            retail_price: e.retail_price,
                            on_hand: 0,
                            reorder_point: e.reorder_point,
                        },
                    );
                }
                StockItemEvent::StockReceived(e) => {
                    self.adjust(business_id, e.item_id, e.quantity);
                }
                StockItemEvent::StockConsumed(e) => {
                    self.adjust(business_id, e.item_id, -e.quantity);
                }
                StockItemEvent::StockRestocked(e) => {
                    self.adjust(business_id, e.item_id, e.quantity);
                }
            }

            // Advance cursor after successful apply.
            cursors.insert(key, seq);
        }

        Ok(())
    }

    fn adjust(&self, business_id: BusinessId, item_id: StockItemId, delta: i64) {
        let mut level = self
            .store
            .get(business_id, &item_id)
            .unwrap_or(StockLevel {
                item_id,
                name: String::new(),
                sku: String::new(),
                retail_price: Money::ZERO,
                on_hand: 0,
                reorder_point: 0,
            });
        level.on_hand += delta;
        self.store.upsert(business_id, item_id, level);
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockProjectionError> {
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

        // Deterministic replay order: business, aggregate, sequence.
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
