//! Command execution pipeline.
//!
//! Implements the command dispatch pattern for event-sourced aggregates:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (business-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply history)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (projections, workflows)
//! ```
//!
//! The dispatcher contains no IO itself; it composes the `EventStore` and
//! `EventBus` traits, so tests run it against in-memory implementations.
//! Events are persisted before publication; a publish failure after a
//! successful append is surfaced to the caller (at-least-once delivery,
//! projections are idempotent).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use pitstop_core::{Aggregate, AggregateId, BusinessId, DomainError, ExpectedVersion};
use pitstop_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    Concurrency(String),
    /// Business isolation violation (cross-business stream mixing).
    BusinessIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// A consumption would drive quantity-on-hand below zero.
    InsufficientStock { requested: i64, available: i64 },
    /// Domain-level not found.
    NotFound,
    /// Failed to deserialize historical event payloads.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append.
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::BusinessIsolation(msg) => {
                DispatchError::BusinessIsolation(msg.clone())
            }
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => DispatchError::InsufficientStock {
                requested,
                available,
            },
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

impl DispatchError {
    /// Whether a retry with a fresh stream load could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Sits between the API layer and the store/bus. Uses optimistic
/// concurrency: the stream version observed at load time is the expected
/// version at append time, so two concurrent consumptions of the same
/// stock item serialize and the loser retries against fresh state.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Attempts per command before a concurrency conflict is surfaced.
const MAX_DISPATCH_ATTEMPTS: u32 = 5;

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline once.
    ///
    /// The `make_aggregate` closure builds a fresh instance for rehydration
    /// (e.g. `StockItem::empty(id)`); the dispatcher does not need to know
    /// how aggregates are constructed.
    ///
    /// Returns the committed events with assigned sequence numbers, or
    /// `DispatchError::Concurrency` if another writer got in first.
    pub fn dispatch<A>(
        &self,
        business_id: BusinessId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: &A::Command,
        make_aggregate: impl FnOnce(BusinessId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: pitstop_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_inner::<A>(
            business_id,
            aggregate_id,
            aggregate_type,
            None,
            command,
            make_aggregate,
        )
    }

    /// Dispatch a command only if the stream is still at `required_version`.
    ///
    /// For workflows that validated the command against a snapshot and must
    /// not let the aggregate advance underneath them. A stream that moved
    /// past the snapshot fails with `DispatchError::Concurrency`; callers
    /// decide whether to re-plan or compensate, so there is no retry.
    pub fn dispatch_at_version<A>(
        &self,
        business_id: BusinessId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        required_version: u64,
        command: &A::Command,
        make_aggregate: impl FnOnce(BusinessId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: pitstop_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_inner::<A>(
            business_id,
            aggregate_id,
            aggregate_type,
            Some(required_version),
            command,
            make_aggregate,
        )
    }

    fn dispatch_inner<A>(
        &self,
        business_id: BusinessId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        required_version: Option<u64>,
        command: &A::Command,
        make_aggregate: impl FnOnce(BusinessId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: pitstop_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (business-scoped)
        let history = self.store.load_stream(business_id, aggregate_id)?;
        validate_loaded_stream(business_id, aggregate_id, &history)?;
        let current = stream_version(&history);
        if let Some(required) = required_version {
            if current != required {
                return Err(DispatchError::Concurrency(format!(
                    "stream at version {current}, required {required}"
                )));
            }
        }
        let expected = ExpectedVersion::Exact(current);

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(business_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    business_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Dispatch with bounded retry on concurrency conflicts.
    ///
    /// Each retry reloads the stream, so the command is re-validated
    /// against fresh state. Deterministic domain failures are never
    /// retried.
    pub fn dispatch_with_retry<A>(
        &self,
        business_id: BusinessId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(BusinessId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: pitstop_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.dispatch::<A>(
                business_id,
                aggregate_id,
                aggregate_type,
                command,
                &make_aggregate,
            ) {
                Err(err) if err.is_retryable() && attempt < MAX_DISPATCH_ATTEMPTS => {
                    debug!(
                        aggregate_type,
                        attempt, "concurrency conflict, retrying dispatch"
                    );
                }
                other => return other,
            }
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    business_id: BusinessId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce business isolation even if a buggy backend returns
    // cross-business data, and require monotonic sequence numbers.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.business_id != business_id {
            return Err(DispatchError::BusinessIsolation(format!(
                "loaded stream contains wrong business_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::BusinessIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
