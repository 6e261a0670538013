use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use pitstop_core::{AggregateId, BusinessId, Money};
use pitstop_events::{EventEnvelope, InMemoryEventBus};
use pitstop_infra::command_dispatcher::CommandDispatcher;
use pitstop_infra::event_store::InMemoryEventStore;
use pitstop_inventory::{
    CreateItem, ReceiveStock, StockItem, StockItemCommand, StockItemId,
};
use std::sync::Arc;

type Dispatcher =
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

fn setup() -> (Dispatcher, BusinessId) {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(store, bus), BusinessId::new())
}

fn create_cmd(business_id: BusinessId, item_id: StockItemId) -> StockItemCommand {
    StockItemCommand::CreateItem(CreateItem {
        business_id,
        item_id,
        name: "Oil Filter".to_string(),
        brand: "OEM".to_string(),
        sku: "FLT-100".to_string(),
        category_id: None,
        unit_cost: Some(Money::from_cents(700)),
        retail_price: Money::from_cents(1500),
        unit: "pcs".to_string(),
        reorder_point: 5,
        location: None,
        attributes: vec![],
        occurred_at: Utc::now(),
    })
}

fn receive_cmd(business_id: BusinessId, item_id: StockItemId, qty: i64) -> StockItemCommand {
    StockItemCommand::ReceiveStock(ReceiveStock {
        business_id,
        item_id,
        quantity: qty,
        supplier_id: None,
        cost: None,
        reference: None,
        note: None,
        occurred_at: Utc::now(),
    })
}

fn dispatch(dispatcher: &Dispatcher, business_id: BusinessId, item_id: StockItemId, cmd: &StockItemCommand) {
    dispatcher
        .dispatch::<StockItem>(business_id, item_id.0, "inventory.stock_item", cmd, |_, id| {
            StockItem::empty(StockItemId::new(id))
        })
        .unwrap();
}

fn bench_command_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_latency");

    group.bench_function("create_item_fresh", |b| {
        let (dispatcher, business_id) = setup();
        b.iter(|| {
            let item_id = StockItemId::new(AggregateId::new());
            dispatch(
                &dispatcher,
                business_id,
                item_id,
                black_box(&create_cmd(business_id, item_id)),
            );
        });
    });

    group.bench_function("receive_stock_with_history", |b| {
        let (dispatcher, business_id) = setup();
        let item_id = StockItemId::new(AggregateId::new());
        dispatch(&dispatcher, business_id, item_id, &create_cmd(business_id, item_id));
        b.iter(|| {
            dispatch(
                &dispatcher,
                business_id,
                item_id,
                black_box(&receive_cmd(business_id, item_id, 1)),
            );
        });
    });

    group.finish();
}

fn bench_replay_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_replay");

    for depth in [10u64, 100, 1000] {
        let (dispatcher, business_id) = setup();
        let item_id = StockItemId::new(AggregateId::new());
        dispatch(&dispatcher, business_id, item_id, &create_cmd(business_id, item_id));
        for _ in 0..depth {
            dispatch(&dispatcher, business_id, item_id, &receive_cmd(business_id, item_id, 1));
        }

        group.throughput(Throughput::Elements(depth));
        group.bench_with_input(
            BenchmarkId::from_parameter(depth),
            &depth,
            |b, _| {
                // Each dispatch replays the full ledger before deciding.
                b.iter(|| {
                    dispatch(
                        &dispatcher,
                        business_id,
                        item_id,
                        black_box(&receive_cmd(business_id, item_id, 1)),
                    );
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_command_latency, bench_replay_depth);
criterion_main!(benches);
