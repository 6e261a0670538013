//! Booking/stock reconciliation workflow.
//!
//! Editing a booking's parts list must keep the inventory ledger in step:
//! added parts (or raised quantities) consume stock, removed parts (or
//! lowered quantities) restock it, and only the net delta moves. If any
//! ledger step fails, the steps already applied are compensated in reverse
//! order and the booking is left unchanged, so the booking and the ledger
//! never disagree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

use pitstop_bookings::{
    Booking, BookingCommand, BookingId, BookingStatus, ChangeStatus, PartsLine, ReplacePartsLines,
};
use pitstop_core::{Aggregate, AggregateRoot, BusinessId};
use pitstop_events::{EventBus, EventEnvelope};
use pitstop_inventory::{ConsumeStock, RestockReturn, StockItem, StockItemCommand, StockItemId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::stock_levels::STOCK_ITEM_AGGREGATE_TYPE;
use crate::projections::bookings::BOOKING_AGGREGATE_TYPE;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("stock adjustment failed: {0:?}")]
    Stock(DispatchError),

    #[error("booking update failed: {0:?}")]
    Booking(DispatchError),

    /// A compensation step failed after the original failure; the ledger
    /// may hold adjustments not reflected on the booking.
    #[error("compensation failed after {original:?}: {failure:?}")]
    CompensationFailed {
        original: Box<ReconcileError>,
        failure: DispatchError,
    },
}

/// One ledger movement planned from the parts diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StockOp {
    Consume { item_id: StockItemId, quantity: i64 },
    Restock { item_id: StockItemId, quantity: i64 },
}

impl StockOp {
    fn inverse(self) -> StockOp {
        match self {
            StockOp::Consume { item_id, quantity } => StockOp::Restock { item_id, quantity },
            StockOp::Restock { item_id, quantity } => StockOp::Consume { item_id, quantity },
        }
    }
}

/// Diff current vs desired parts lines into net ledger movements.
///
/// Quantity raises consume the difference, quantity drops restock it; a
/// line present in both with the same quantity moves nothing (flipping
/// `included_with_service` alone is not a stock movement).
fn plan_stock_ops(current: &[PartsLine], desired: &[PartsLine]) -> Vec<StockOp> {
    let mut deltas: BTreeMap<StockItemId, i64> = BTreeMap::new();
    for line in desired {
        *deltas.entry(line.item_id).or_insert(0) += line.quantity;
    }
    for line in current {
        *deltas.entry(line.item_id).or_insert(0) -= line.quantity;
    }

    deltas
        .into_iter()
        .filter_map(|(item_id, delta)| {
            if delta > 0 {
                Some(StockOp::Consume {
                    item_id,
                    quantity: delta,
                })
            } else if delta < 0 {
                Some(StockOp::Restock {
                    item_id,
                    quantity: -delta,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Replace a booking's parts lines and reconcile the inventory ledger.
///
/// Ledger movements are applied before the booking is updated; a failure
/// at any point compensates already-applied movements in reverse order.
/// Must be called with the booking rehydrated to its current state.
pub fn reconcile_parts<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    business_id: BusinessId,
    booking: &Booking,
    booking_id: BookingId,
    desired: Vec<PartsLine>,
    occurred_at: DateTime<Utc>,
) -> Result<(), ReconcileError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    // Validate the booking edit up front so no stock moves for a doomed
    // command. The aggregate re-checks when the command actually runs.
    let replace = ReplacePartsLines {
        business_id,
        booking_id,
        lines: desired,
        occurred_at,
    };
    booking
        .handle(&BookingCommand::ReplacePartsLines(replace.clone()))
        .map_err(|e| ReconcileError::Booking(DispatchError::from(e)))?;

    let ops = plan_stock_ops(booking.parts_lines(), &replace.lines);

    let mut applied: Vec<StockOp> = Vec::with_capacity(ops.len());
    for op in &ops {
        if let Err(err) = apply_stock_op(dispatcher, business_id, booking_id, *op, occurred_at) {
            let original = ReconcileError::Stock(err);
            return Err(compensate(
                dispatcher,
                business_id,
                booking_id,
                &applied,
                original,
                occurred_at,
            ));
        }
        applied.push(*op);
    }

    // Booking deltas were planned from the snapshot, so the booking must
    // still be at the snapshot version when the update commits. A stream
    // that advanced in between gets compensated, not retried.
    if let Err(err) = dispatcher.dispatch_at_version::<Booking>(
        business_id,
        booking_id.0,
        BOOKING_AGGREGATE_TYPE,
        booking.version(),
        &BookingCommand::ReplacePartsLines(replace),
        |_, id| Booking::empty(BookingId::new(id)),
    ) {
        let original = ReconcileError::Booking(err);
        return Err(compensate(
            dispatcher,
            business_id,
            booking_id,
            &applied,
            original,
            occurred_at,
        ));
    }

    Ok(())
}

/// Cancel a booking, returning its consumed parts to the shelf.
///
/// Restocks are applied before the status change commits. If the cancel
/// itself then fails, the restocks are compensated in reverse order; a
/// booking is never left Cancelled while its parts stay consumed.
pub fn cancel_booking<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    business_id: BusinessId,
    booking: &Booking,
    booking_id: BookingId,
    occurred_at: DateTime<Utc>,
) -> Result<(), ReconcileError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let cancel = BookingCommand::ChangeStatus(ChangeStatus {
        business_id,
        booking_id,
        status: BookingStatus::Cancelled,
        occurred_at,
    });
    booking
        .handle(&cancel)
        .map_err(|e| ReconcileError::Booking(DispatchError::from(e)))?;

    let ops = plan_stock_ops(booking.parts_lines(), &[]);
    let mut applied: Vec<StockOp> = Vec::with_capacity(ops.len());
    for op in &ops {
        if let Err(err) = apply_stock_op(dispatcher, business_id, booking_id, *op, occurred_at) {
            let original = ReconcileError::Stock(err);
            return Err(compensate(
                dispatcher,
                business_id,
                booking_id,
                &applied,
                original,
                occurred_at,
            ));
        }
        applied.push(*op);
    }

    if let Err(err) = dispatcher.dispatch_at_version::<Booking>(
        business_id,
        booking_id.0,
        BOOKING_AGGREGATE_TYPE,
        booking.version(),
        &cancel,
        |_, id| Booking::empty(BookingId::new(id)),
    ) {
        let original = ReconcileError::Booking(err);
        return Err(compensate(
            dispatcher,
            business_id,
            booking_id,
            &applied,
            original,
            occurred_at,
        ));
    }

    Ok(())
}

fn apply_stock_op<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    business_id: BusinessId,
    booking_id: BookingId,
    op: StockOp,
    occurred_at: DateTime<Utc>,
) -> Result<(), DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let (item_id, command) = match op {
        StockOp::Consume { item_id, quantity } => (
            item_id,
            StockItemCommand::ConsumeStock(ConsumeStock {
                business_id,
                item_id,
                quantity,
                booking_ref: Some(booking_id.0),
                occurred_at,
            }),
        ),
        StockOp::Restock { item_id, quantity } => (
            item_id,
            StockItemCommand::RestockReturn(RestockReturn {
                business_id,
                item_id,
                quantity,
                booking_ref: booking_id.0,
                occurred_at,
            }),
        ),
    };

    dispatcher
        .dispatch_with_retry::<StockItem>(
            business_id,
            item_id.0,
            STOCK_ITEM_AGGREGATE_TYPE,
            &command,
            |_, id| StockItem::empty(StockItemId::new(id)),
        )
        .map(|_| ())
}

/// Undo already-applied movements in reverse order.
fn compensate<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    business_id: BusinessId,
    booking_id: BookingId,
    applied: &[StockOp],
    original: ReconcileError,
    occurred_at: DateTime<Utc>,
) -> ReconcileError
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    for op in applied.iter().rev() {
        if let Err(failure) =
            apply_stock_op(dispatcher, business_id, booking_id, op.inverse(), occurred_at)
        {
            warn!(?failure, "compensation step failed, ledger may be ahead of booking");
            return ReconcileError::CompensationFailed {
                original: Box::new(original),
                failure,
            };
        }
    }
    original
}
