//! End-to-end pipeline tests: dispatcher + in-memory store + bus +
//! projections + reconciliation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::Utc;
use serde_json::Value as JsonValue;

use pitstop_bookings::{
    Booking, BookingCommand, BookingId, BookingStatus, PartsLine, ScheduleBooking, ServiceLine,
};
use pitstop_catalog::ServiceId;
use pitstop_core::{Aggregate, AggregateId, BusinessId, ExpectedVersion, Money};
use pitstop_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use pitstop_inventory::{
    ConsumeStock, CreateItem, ReceiveStock, StockItem, StockItemCommand, StockItemId,
};
use pitstop_parties::CustomerId;

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent,
};
use crate::projections::bookings::{BOOKING_AGGREGATE_TYPE, BookingsProjection};
use crate::projections::stock_levels::{STOCK_ITEM_AGGREGATE_TYPE, StockLevelsProjection};
use crate::read_model::InMemoryBusinessStore;
use crate::reconcile::{ReconcileError, cancel_booking, reconcile_parts};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

fn dispatcher() -> (
    Dispatcher,
    Arc<InMemoryEventStore>,
    Subscription<EventEnvelope<JsonValue>>,
) {
    let store = Arc::new(InMemoryEventStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let subscription = bus.subscribe();
    (
        CommandDispatcher::new(Arc::clone(&store), bus),
        store,
        subscription,
    )
}

/// Store wrapper that rejects appends to one stream while armed.
struct FaultyStore {
    inner: InMemoryEventStore,
    target: AggregateId,
    armed: AtomicBool,
}

impl FaultyStore {
    fn new(target: AggregateId) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            target,
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl EventStore for FaultyStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if self.armed.load(Ordering::SeqCst) && events.iter().any(|e| e.aggregate_id == self.target)
        {
            return Err(EventStoreError::InvalidAppend(
                "injected append failure".to_string(),
            ));
        }
        self.inner.append(events, expected_version)
    }

    fn load_stream(
        &self,
        business_id: BusinessId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_stream(business_id, aggregate_id)
    }
}

fn create_item<S: EventStore>(
    dispatcher: &CommandDispatcher<S, Bus>,
    business_id: BusinessId,
    name: &str,
    retail_cents: u64,
) -> StockItemId {
    let item_id = StockItemId::new(AggregateId::new());
    dispatcher
        .dispatch::<StockItem>(
            business_id,
            item_id.0,
            STOCK_ITEM_AGGREGATE_TYPE,
            &StockItemCommand::CreateItem(CreateItem {
                business_id,
                item_id,
                name: name.to_string(),
                brand: "OEM".to_string(),
                sku: format!("SKU-{}", item_id.0),
                category_id: None,
                unit_cost: Some(Money::from_cents(retail_cents / 2)),
                retail_price: Money::from_cents(retail_cents),
                unit: "pcs".to_string(),
                reorder_point: 2,
                location: None,
                attributes: vec![],
                occurred_at: Utc::now(),
            }),
            |_, id| StockItem::empty(StockItemId::new(id)),
        )
        .unwrap();
    item_id
}

fn receive<S: EventStore>(
    dispatcher: &CommandDispatcher<S, Bus>,
    business_id: BusinessId,
    item_id: StockItemId,
    qty: i64,
) {
    dispatcher
        .dispatch::<StockItem>(
            business_id,
            item_id.0,
            STOCK_ITEM_AGGREGATE_TYPE,
            &StockItemCommand::ReceiveStock(ReceiveStock {
                business_id,
                item_id,
                quantity: qty,
                supplier_id: None,
                cost: None,
                reference: None,
                note: None,
                occurred_at: Utc::now(),
            }),
            |_, id| StockItem::empty(StockItemId::new(id)),
        )
        .unwrap();
}

fn on_hand<S: EventStore>(
    dispatcher: &CommandDispatcher<S, Bus>,
    business_id: BusinessId,
    item_id: StockItemId,
) -> i64 {
    rehydrate_item(dispatcher, business_id, item_id).on_hand()
}

fn rehydrate_item<S: EventStore>(
    dispatcher: &CommandDispatcher<S, Bus>,
    business_id: BusinessId,
    item_id: StockItemId,
) -> StockItem {
    let history = dispatcher
        .store()
        .load_stream(business_id, item_id.0)
        .unwrap();
    let mut item = StockItem::empty(item_id);
    for stored in history {
        let ev = serde_json::from_value(stored.payload).unwrap();
        item.apply(&ev);
    }
    item
}

fn rehydrate_booking<S: EventStore>(
    dispatcher: &CommandDispatcher<S, Bus>,
    business_id: BusinessId,
    booking_id: BookingId,
) -> Booking {
    let history = dispatcher
        .store()
        .load_stream(business_id, booking_id.0)
        .unwrap();
    let mut booking = Booking::empty(booking_id);
    for stored in history {
        let ev = serde_json::from_value(stored.payload).unwrap();
        booking.apply(&ev);
    }
    booking
}

fn schedule_booking<S: EventStore>(
    dispatcher: &CommandDispatcher<S, Bus>,
    business_id: BusinessId,
) -> BookingId {
    let booking_id = BookingId::new(AggregateId::new());
    dispatcher
        .dispatch::<Booking>(
            business_id,
            booking_id.0,
            BOOKING_AGGREGATE_TYPE,
            &BookingCommand::ScheduleBooking(ScheduleBooking {
                business_id,
                booking_id,
                scheduled_at: Utc::now(),
                customer_id: CustomerId::new(AggregateId::new()),
                vehicle_id: None,
                service_lines: vec![ServiceLine {
                    service_id: ServiceId::new(AggregateId::new()),
                    quantity: 1,
                }],
                occurred_at: Utc::now(),
            }),
            |_, id| Booking::empty(BookingId::new(id)),
        )
        .unwrap();
    booking_id
}

fn parts(entries: &[(StockItemId, i64)]) -> Vec<PartsLine> {
    entries
        .iter()
        .map(|(item_id, quantity)| PartsLine {
            item_id: *item_id,
            quantity: *quantity,
            included_with_service: false,
        })
        .collect()
}

#[test]
fn dispatch_persists_and_publishes() {
    let (dispatcher, _store, subscription) = dispatcher();
    let business_id = BusinessId::new();
    let item_id = create_item(&dispatcher, business_id, "Oil Filter", 1_500);
    receive(&dispatcher, business_id, item_id, 10);

    let first = subscription.try_recv().unwrap();
    assert_eq!(first.aggregate_type(), STOCK_ITEM_AGGREGATE_TYPE);
    assert_eq!(first.sequence_number(), 1);
    let second = subscription.try_recv().unwrap();
    assert_eq!(second.sequence_number(), 2);

    assert_eq!(on_hand(&dispatcher, business_id, item_id), 10);
}

#[test]
fn booking_parts_edit_consumes_the_delta() {
    let (dispatcher, _store, _sub) = dispatcher();
    let business_id = BusinessId::new();
    let item_id = create_item(&dispatcher, business_id, "Brake Pad", 4_000);
    receive(&dispatcher, business_id, item_id, 10);
    let booking_id = schedule_booking(&dispatcher, business_id);

    // Add 3 of the part.
    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    reconcile_parts(
        &dispatcher,
        business_id,
        &booking,
        booking_id,
        parts(&[(item_id, 3)]),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 7);

    // Raise 3 -> 5: only the delta of 2 moves.
    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    reconcile_parts(
        &dispatcher,
        business_id,
        &booking,
        booking_id,
        parts(&[(item_id, 5)]),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 5);

    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    assert_eq!(booking.parts_lines(), parts(&[(item_id, 5)]).as_slice());
}

#[test]
fn removing_a_parts_line_restores_stock() {
    let (dispatcher, _store, _sub) = dispatcher();
    let business_id = BusinessId::new();
    let item_id = create_item(&dispatcher, business_id, "Wiper Blade", 1_200);
    receive(&dispatcher, business_id, item_id, 6);
    let booking_id = schedule_booking(&dispatcher, business_id);

    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    reconcile_parts(
        &dispatcher,
        business_id,
        &booking,
        booking_id,
        parts(&[(item_id, 4)]),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 2);

    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    reconcile_parts(
        &dispatcher,
        business_id,
        &booking,
        booking_id,
        vec![],
        Utc::now(),
    )
    .unwrap();
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 6);
}

#[test]
fn insufficient_stock_compensates_applied_steps() {
    let (dispatcher, _store, _sub) = dispatcher();
    let business_id = BusinessId::new();
    let plentiful = create_item(&dispatcher, business_id, "Oil Filter", 1_500);
    let scarce = create_item(&dispatcher, business_id, "Timing Belt", 9_000);
    receive(&dispatcher, business_id, plentiful, 10);
    receive(&dispatcher, business_id, scarce, 1);
    let booking_id = schedule_booking(&dispatcher, business_id);

    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    let err = reconcile_parts(
        &dispatcher,
        business_id,
        &booking,
        booking_id,
        parts(&[(plentiful, 2), (scarce, 3)]),
        Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Stock(DispatchError::InsufficientStock { .. })
    ));

    // The plentiful consumption was rolled back, the booking untouched.
    assert_eq!(on_hand(&dispatcher, business_id, plentiful), 10);
    assert_eq!(on_hand(&dispatcher, business_id, scarce), 1);
    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    assert!(booking.parts_lines().is_empty());
}

#[test]
fn cancelling_restocks_consumed_parts() {
    let (dispatcher, _store, _sub) = dispatcher();
    let business_id = BusinessId::new();
    let item_id = create_item(&dispatcher, business_id, "Air Filter", 2_200);
    receive(&dispatcher, business_id, item_id, 8);
    let booking_id = schedule_booking(&dispatcher, business_id);

    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    reconcile_parts(
        &dispatcher,
        business_id,
        &booking,
        booking_id,
        parts(&[(item_id, 5)]),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 3);

    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    cancel_booking(&dispatcher, business_id, &booking, booking_id, Utc::now()).unwrap();
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 8);

    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    assert_eq!(booking.status(), BookingStatus::Cancelled);
}

#[test]
fn failed_cancel_compensates_restocks_and_keeps_the_booking_alive() {
    let business_id = BusinessId::new();
    let booking_agg = AggregateId::new();
    let store = Arc::new(FaultyStore::new(booking_agg));
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(Arc::clone(&store), bus);

    let item_id = create_item(&dispatcher, business_id, "Serpentine Belt", 3_500);
    receive(&dispatcher, business_id, item_id, 6);

    let booking_id = BookingId::new(booking_agg);
    dispatcher
        .dispatch::<Booking>(
            business_id,
            booking_agg,
            BOOKING_AGGREGATE_TYPE,
            &BookingCommand::ScheduleBooking(ScheduleBooking {
                business_id,
                booking_id,
                scheduled_at: Utc::now(),
                customer_id: CustomerId::new(AggregateId::new()),
                vehicle_id: None,
                service_lines: vec![ServiceLine {
                    service_id: ServiceId::new(AggregateId::new()),
                    quantity: 1,
                }],
                occurred_at: Utc::now(),
            }),
            |_, id| Booking::empty(BookingId::new(id)),
        )
        .unwrap();

    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    reconcile_parts(
        &dispatcher,
        business_id,
        &booking,
        booking_id,
        parts(&[(item_id, 4)]),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 2);

    // The status change cannot commit; the restocks must be unwound.
    store.arm();
    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    let err = cancel_booking(&dispatcher, business_id, &booking, booking_id, Utc::now())
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Booking(_)));

    assert_eq!(on_hand(&dispatcher, business_id, item_id), 2);
    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    assert_ne!(booking.status(), BookingStatus::Cancelled);
    assert_eq!(booking.parts_lines(), parts(&[(item_id, 4)]).as_slice());
}

#[test]
fn stale_parts_edit_conflicts_and_compensates() {
    let (dispatcher, _store, _sub) = dispatcher();
    let business_id = BusinessId::new();
    let item_id = create_item(&dispatcher, business_id, "Radiator Hose", 2_600);
    receive(&dispatcher, business_id, item_id, 10);
    let booking_id = schedule_booking(&dispatcher, business_id);

    let snapshot = rehydrate_booking(&dispatcher, business_id, booking_id);

    // Another edit lands while the snapshot is held.
    reconcile_parts(
        &dispatcher,
        business_id,
        &snapshot,
        booking_id,
        parts(&[(item_id, 2)]),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 8);

    // The stale snapshot's deltas no longer match the booking; the edit
    // must conflict and its ledger movements must be rolled back.
    let err = reconcile_parts(
        &dispatcher,
        business_id,
        &snapshot,
        booking_id,
        parts(&[(item_id, 5)]),
        Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Booking(DispatchError::Concurrency(_))
    ));

    assert_eq!(on_hand(&dispatcher, business_id, item_id), 8);
    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    assert_eq!(booking.parts_lines(), parts(&[(item_id, 2)]).as_slice());
}

#[test]
fn concurrent_consumption_never_oversells() {
    let (dispatcher, _store, _sub) = dispatcher();
    let dispatcher = Arc::new(dispatcher);
    let business_id = BusinessId::new();
    let item_id = create_item(&dispatcher, business_id, "Spark Plug", 900);
    receive(&dispatcher, business_id, item_id, 10);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(thread::spawn(move || {
            dispatcher.dispatch_with_retry::<StockItem>(
                business_id,
                item_id.0,
                STOCK_ITEM_AGGREGATE_TYPE,
                &StockItemCommand::ConsumeStock(ConsumeStock {
                    business_id,
                    item_id,
                    quantity: 1,
                    booking_ref: None,
                    occurred_at: Utc::now(),
                }),
                |_, id| StockItem::empty(StockItemId::new(id)),
            )
        }));
    }

    let mut ok = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => ok += 1,
            Err(DispatchError::InsufficientStock { .. }) => out_of_stock += 1,
            Err(other) => panic!("unexpected dispatch error: {other:?}"),
        }
    }

    assert_eq!(ok, 10);
    assert_eq!(out_of_stock, 10);
    assert_eq!(on_hand(&dispatcher, business_id, item_id), 0);
}

#[test]
fn projections_follow_the_bus() {
    let (dispatcher, store, subscription) = dispatcher();
    let business_id = BusinessId::new();
    let stock_projection = StockLevelsProjection::new(InMemoryBusinessStore::new());
    let bookings_projection = BookingsProjection::new(InMemoryBusinessStore::new());

    let item_id = create_item(&dispatcher, business_id, "Coolant", 1_800);
    receive(&dispatcher, business_id, item_id, 12);
    let booking_id = schedule_booking(&dispatcher, business_id);
    let booking = rehydrate_booking(&dispatcher, business_id, booking_id);
    reconcile_parts(
        &dispatcher,
        business_id,
        &booking,
        booking_id,
        parts(&[(item_id, 2)]),
        Utc::now(),
    )
    .unwrap();

    while let Ok(envelope) = subscription.try_recv() {
        stock_projection.apply_envelope(&envelope).unwrap();
        bookings_projection.apply_envelope(&envelope).unwrap();
    }

    let level = stock_projection.get(business_id, &item_id).unwrap();
    assert_eq!(level.on_hand, 10);
    assert_eq!(level.name, "Coolant");

    let summary = bookings_projection.get(business_id, &booking_id).unwrap();
    assert_eq!(summary.parts_lines, parts(&[(item_id, 2)]));

    // A rebuild from the store converges to the same state.
    let fresh = StockLevelsProjection::new(InMemoryBusinessStore::new());
    fresh.rebuild_from_scratch(store.all_envelopes()).unwrap();
    assert_eq!(fresh.get(business_id, &item_id).unwrap().on_hand, 10);
}

#[test]
fn business_isolation_holds_across_streams() {
    let (dispatcher, _store, _sub) = dispatcher();
    let business_a = BusinessId::new();
    let business_b = BusinessId::new();
    let item_id = create_item(&dispatcher, business_a, "Cabin Filter", 2_000);
    receive(&dispatcher, business_a, item_id, 5);

    // Business B sees an empty stream for A's item.
    let history = dispatcher
        .store()
        .load_stream(business_b, item_id.0)
        .unwrap();
    assert!(history.is_empty());
}
