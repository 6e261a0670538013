use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use pitstop_bookings::{Booking, BookingStatus};
use pitstop_catalog::ServiceId;
use pitstop_core::{BusinessId, DomainError, Money, TaxRate, Totals};
use pitstop_inventory::StockItemId;

/// Price source for settlement.
///
/// Implemented over projections in production and over fixed maps in tests.
/// A `None` return means the referenced service or item does not exist for
/// that business, which fails the settlement.
pub trait PriceBook {
    fn service_price(&self, business_id: BusinessId, service_id: ServiceId) -> Option<Money>;
    fn service_name(&self, business_id: BusinessId, service_id: ServiceId) -> Option<String>;
    fn part_retail_price(&self, business_id: BusinessId, item_id: StockItemId) -> Option<Money>;
    fn part_name(&self, business_id: BusinessId, item_id: StockItemId) -> Option<String>;
}

/// Fixed-map price book.
#[derive(Debug, Default, Clone)]
pub struct StaticPriceBook {
    services: HashMap<(BusinessId, ServiceId), (String, Money)>,
    parts: HashMap<(BusinessId, StockItemId), (String, Money)>,
}

impl StaticPriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(
        mut self,
        business_id: BusinessId,
        service_id: ServiceId,
        name: impl Into<String>,
        price: Money,
    ) -> Self {
        self.services
            .insert((business_id, service_id), (name.into(), price));
        self
    }

    pub fn with_part(
        mut self,
        business_id: BusinessId,
        item_id: StockItemId,
        name: impl Into<String>,
        retail_price: Money,
    ) -> Self {
        self.parts
            .insert((business_id, item_id), (name.into(), retail_price));
        self
    }
}

impl PriceBook for StaticPriceBook {
    fn service_price(&self, business_id: BusinessId, service_id: ServiceId) -> Option<Money> {
        self.services.get(&(business_id, service_id)).map(|v| v.1)
    }

    fn service_name(&self, business_id: BusinessId, service_id: ServiceId) -> Option<String> {
        self.services
            .get(&(business_id, service_id))
            .map(|v| v.0.clone())
    }

    fn part_retail_price(&self, business_id: BusinessId, item_id: StockItemId) -> Option<Money> {
        self.parts.get(&(business_id, item_id)).map(|v| v.1)
    }

    fn part_name(&self, business_id: BusinessId, item_id: StockItemId) -> Option<String> {
        self.parts.get(&(business_id, item_id)).map(|v| v.0.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementLineKind {
    Service,
    Part,
}

/// One billed line of a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementLine {
    pub kind: SettlementLineKind,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub amount: Money,
}

/// A priced booking: billed lines plus computed totals.
///
/// Parts marked `included_with_service` are bundled into the service price
/// and never appear as billed lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub lines: Vec<SettlementLine>,
    pub totals: Totals,
    pub tax_rate: TaxRate,
}

impl Settlement {
    /// Price a booking against the catalog and inventory retail prices.
    ///
    /// Cancelled bookings cannot be settled.
    pub fn compute<P: PriceBook>(
        booking: &Booking,
        price_book: &P,
        tax_rate: TaxRate,
    ) -> Result<Self, DomainError> {
        let business_id = booking
            .business_id()
            .ok_or_else(DomainError::not_found)?;
        if booking.status() == BookingStatus::Cancelled {
            return Err(DomainError::invariant(
                "cancelled bookings cannot be settled",
            ));
        }

        let mut lines = Vec::new();
        let mut subtotal = Money::ZERO;

        for line in booking.service_lines() {
            let price = price_book
                .service_price(business_id, line.service_id)
                .ok_or_else(|| {
                    DomainError::validation(format!("unknown service {}", line.service_id))
                })?;
            let description = price_book
                .service_name(business_id, line.service_id)
                .ok_or_else(|| {
                    DomainError::validation(format!("unknown service {}", line.service_id))
                })?;
            let amount = price.checked_mul_qty(line.quantity)?;
            subtotal = subtotal.checked_add(amount)?;
            lines.push(SettlementLine {
                kind: SettlementLineKind::Service,
                description,
                quantity: line.quantity,
                unit_price: price,
                amount,
            });
        }

        for line in booking.parts_lines() {
            if line.included_with_service {
                continue;
            }
            let price = price_book
                .part_retail_price(business_id, line.item_id)
                .ok_or_else(|| {
                    DomainError::validation(format!("unknown item {}", line.item_id))
                })?;
            let description = price_book
                .part_name(business_id, line.item_id)
                .ok_or_else(|| {
                    DomainError::validation(format!("unknown item {}", line.item_id))
                })?;
            let amount = price.checked_mul_qty(line.quantity)?;
            subtotal = subtotal.checked_add(amount)?;
            lines.push(SettlementLine {
                kind: SettlementLineKind::Part,
                description,
                quantity: line.quantity,
                unit_price: price,
                amount,
            });
        }

        let totals = Totals::compute(subtotal, tax_rate)?;

        Ok(Settlement {
            lines,
            totals,
            tax_rate,
        })
    }
}
