use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use pitstop_bookings::{
    BookingEvent, BookingId, BookingStatus, PartsLine, PaymentMethod, PaymentStatus, ServiceLine,
};
use pitstop_core::{AggregateId, BusinessId, UserId};
use pitstop_events::EventEnvelope;
use pitstop_parties::{CustomerId, VehicleId};

use crate::read_model::BusinessStore;

/// Queryable booking read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSummary {
    pub booking_id: BookingId,
    pub scheduled_at: DateTime<Utc>,
    pub customer_id: CustomerId,
    pub vehicle_id: Option<VehicleId>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub service_lines: Vec<ServiceLine>,
    pub parts_lines: Vec<PartsLine>,
    pub technician_ids: Vec<UserId>,
    pub note: String,
}

/// Stream type this projection consumes; other envelopes are ignored.
pub const BOOKING_AGGREGATE_TYPE: &str = "bookings.booking";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    business_id: BusinessId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum BookingProjectionError {
    #[error("failed to deserialize booking event: {0}")]
    Deserialize(String),

    #[error("business isolation violation: {0}")]
    BusinessIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown booking {0}")]
    UnknownBooking(BookingId),
}

/// Bookings projection: one summary row per booking.
#[derive(Debug)]
pub struct BookingsProjection<S>
where
    S: BusinessStore<BookingId, BookingSummary>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> BookingsProjection<S>
where
    S: BusinessStore<BookingId, BookingSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, business_id: BusinessId, booking_id: &BookingId) -> Option<BookingSummary> {
        self.store.get(business_id, booking_id)
    }

    pub fn list(&self, business_id: BusinessId) -> Vec<BookingSummary> {
        let mut rows = self.store.list(business_id);
        rows.sort_by_key(|b| b.scheduled_at);
        rows
    }

    pub fn list_by_status(
        &self,
        business_id: BusinessId,
        status: BookingStatus,
    ) -> Vec<BookingSummary> {
        self.list(business_id)
            .into_iter()
            .filter(|b| b.status == status)
            .collect()
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BookingProjectionError> {
        if envelope.aggregate_type() != BOOKING_AGGREGATE_TYPE {
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
                return Err(BookingProjectionError::NonMonotonicSequence { last, found: seq });
            }
            if seq <= last {
                return Ok(());
            }
            if seq != last + 1 && last != 0 {
                return Err(BookingProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: BookingEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| BookingProjectionError::Deserialize(e.to_string()))?;

            let (event_business, booking_id) = match &event {
                BookingEvent::BookingScheduled(e) => (e.business_id, e.booking_id),
                BookingEvent::BookingRescheduled(e) => (e.business_id, e.booking_id),
                BookingEvent::StatusChanged(e) => (e.business_id, e.booking_id),
                BookingEvent::PaymentStatusChanged(e) => (e.business_id, e.booking_id),
                BookingEvent::PaymentMethodSet(e) => (e.business_id, e.booking_id),
                BookingEvent::TechniciansAssigned(e) => (e.business_id, e.booking_id),
                BookingEvent::NoteSet(e) => (e.business_id, e.booking_id),
                BookingEvent::PartsLinesReplaced(e) => (e.business_id, e.booking_id),
            };

            if event_business != business_id {
                return Err(BookingProjectionError::BusinessIsolation(
                    "event business_id does not match envelope business_id".to_string(),
                ));
            }
            if booking_id.0 != aggregate_id {
                return Err(BookingProjectionError::BusinessIsolation(
                    "event booking_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                BookingEvent::BookingScheduled(e) => {
                    self.store.upsert(
                        business_id,
                        e.booking_id,
                        BookingSummary {
                            booking_id: e.booking_id,
                            scheduled_at: e.scheduled_at,
                            customer_id: e.customer_id,
                            vehicle_id: e.vehicle_id,
                            status: BookingStatus::Pending,
                            payment_status: PaymentStatus::Pending,
                            payment_method: None,
                            service_lines: e.service_lines,
                            parts_lines: Vec::new(),
                            technician_ids: Vec::new(),
                            note: String::new(),
                        },
                    );
                }
                BookingEvent::BookingRescheduled(e) => {
                    self.update(business_id, e.booking_id, |s| s.scheduled_at = e.scheduled_at)?;
                }
                BookingEvent::StatusChanged(e) => {
                    self.update(business_id, e.booking_id, |s| s.status = e.status)?;
                }
                BookingEvent::PaymentStatusChanged(e) => {
                    self.update(business_id, e.booking_id, |s| {
                        s.payment_status = e.payment_status
                    })?;
                }
                BookingEvent::PaymentMethodSet(e) => {
                    self.update(business_id, e.booking_id, |s| {
                        s.payment_method = Some(e.payment_method)
                    })?;
                }
                BookingEvent::TechniciansAssigned(e) => {
                    self.update(business_id, e.booking_id, |s| {
                        s.technician_ids = e.technician_ids.clone()
                    })?;
                }
                BookingEvent::NoteSet(e) => {
                    self.update(business_id, e.booking_id, |s| s.note = e.note.clone())?;
                }
                BookingEvent::PartsLinesReplaced(e) => {
                    self.update(business_id, e.booking_id, |s| {
                        s.parts_lines = e.lines.clone()
                    })?;
                }
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }

    fn update(
        &self,
        business_id: BusinessId,
        booking_id: BookingId,
        apply: impl FnOnce(&mut BookingSummary),
    ) -> Result<(), BookingProjectionError> {
        let mut summary = self
            .store
            .get(business_id, &booking_id)
            .ok_or(BookingProjectionError::UnknownBooking(booking_id))?;
        apply(&mut summary);
        self.store.upsert(business_id, booking_id, summary);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), BookingProjectionError> {
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
