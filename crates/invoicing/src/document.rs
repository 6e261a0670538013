use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pitstop_bookings::{Booking, BookingId, PaymentStatus};
use pitstop_core::{DomainError, Money, TaxRate};

use crate::settlement::{Settlement, SettlementLineKind};

/// Header block of an invoice document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub invoice_number: String,
    pub issued_at: DateTime<Utc>,
    pub business_name: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub vehicle: Option<String>,
}

/// One printed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRow {
    pub kind: SettlementLineKind,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub amount: Money,
}

/// A complete, render-ready invoice.
///
/// Built from a booking and its settlement; serialized as-is by the API and
/// suitable for handing to a print layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub header: InvoiceHeader,
    pub rows: Vec<InvoiceRow>,
    pub subtotal: Money,
    pub tax_rate: TaxRate,
    pub tax: Money,
    pub total: Money,
    pub payment_status: PaymentStatus,
}

/// Invoice numbers derive from the booking id so regeneration is stable.
pub fn invoice_number(booking_id: BookingId) -> String {
    format!("INV-{booking_id}")
}

impl InvoiceDocument {
    pub fn build(
        booking: &Booking,
        settlement: &Settlement,
        business_name: impl Into<String>,
        customer_name: impl Into<String>,
        customer_phone: Option<String>,
        vehicle: Option<String>,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if booking.business_id().is_none() {
            return Err(DomainError::not_found());
        }

        let rows = settlement
            .lines
            .iter()
            .map(|line| InvoiceRow {
                kind: line.kind,
                description: line.description.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                amount: line.amount,
            })
            .collect();

        Ok(Self {
            header: InvoiceHeader {
                invoice_number: invoice_number(booking.id_typed()),
                issued_at,
                business_name: business_name.into(),
                customer_name: customer_name.into(),
                customer_phone,
                vehicle,
            },
            rows,
            subtotal: settlement.totals.subtotal,
            tax_rate: settlement.tax_rate,
            tax: settlement.totals.tax,
            total: settlement.totals.total,
            payment_status: booking.payment_status(),
        })
    }

    /// Plain-text rendition, used by the terminal print path and in tests.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", self.header.invoice_number));
        out.push_str(&format!("{}\n", self.header.business_name));
        out.push_str(&format!("Billed to: {}\n", self.header.customer_name));
        if let Some(phone) = &self.header.customer_phone {
            out.push_str(&format!("Phone: {phone}\n"));
        }
        if let Some(vehicle) = &self.header.vehicle {
            out.push_str(&format!("Vehicle: {vehicle}\n"));
        }
        out.push('\n');
        for row in &self.rows {
            out.push_str(&format!(
                "{:<40} {:>4} x {:>10} = {:>10}\n",
                row.description,
                row.quantity,
                row.unit_price.to_string(),
                row.amount.to_string()
            ));
        }
        out.push('\n');
        out.push_str(&format!("Subtotal: {}\n", self.subtotal));
        out.push_str(&format!("Tax:      {}\n", self.tax));
        out.push_str(&format!("Total:    {}\n", self.total));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pitstop_bookings::{BookingCommand, ScheduleBooking, ServiceLine};
    use pitstop_catalog::ServiceId;
    use pitstop_core::{Aggregate, AggregateId, BusinessId, TaxRate};
    use pitstop_parties::CustomerId;

    use crate::settlement::StaticPriceBook;

    fn booking_with_one_service() -> (Booking, StaticPriceBook) {
        let business_id = BusinessId::new();
        let booking_id = BookingId::new(AggregateId::new());
        let service_id = ServiceId::new(AggregateId::new());
        let mut booking = Booking::empty(booking_id);
        let events = booking
            .handle(&BookingCommand::ScheduleBooking(ScheduleBooking {
                business_id,
                booking_id,
                scheduled_at: Utc::now(),
                customer_id: CustomerId::new(AggregateId::new()),
                vehicle_id: None,
                service_lines: vec![ServiceLine {
                    service_id,
                    quantity: 2,
                }],
                occurred_at: Utc::now(),
            }))
            .unwrap();
        booking.apply(&events[0]);

        let price_book = StaticPriceBook::new().with_service(
            business_id,
            service_id,
            "Brake Inspection",
            Money::from_cents(3_000),
        );
        (booking, price_book)
    }

    #[test]
    fn document_carries_settlement_totals() {
        let (booking, price_book) = booking_with_one_service();
        let tax_rate = TaxRate::from_basis_points(1300).unwrap();
        let settlement = Settlement::compute(&booking, &price_book, tax_rate).unwrap();

        let doc = InvoiceDocument::build(
            &booking,
            &settlement,
            "Main Street Auto",
            "Dana Whitfield",
            Some("555-0142".to_string()),
            Some("2019 Subaru Outback".to_string()),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(doc.subtotal, Money::from_cents(6_000));
        assert_eq!(doc.tax, Money::from_cents(780));
        assert_eq!(doc.total, Money::from_cents(6_780));
        assert_eq!(doc.rows.len(), 1);
        assert!(doc.header.invoice_number.starts_with("INV-"));
    }

    #[test]
    fn render_text_includes_every_row() {
        let (booking, price_book) = booking_with_one_service();
        let tax_rate = TaxRate::from_basis_points(0).unwrap();
        let settlement = Settlement::compute(&booking, &price_book, tax_rate).unwrap();

        let doc = InvoiceDocument::build(
            &booking,
            &settlement,
            "Main Street Auto",
            "Dana Whitfield",
            None,
            None,
            Utc::now(),
        )
        .unwrap();
        let text = doc.render_text();
        assert!(text.contains("Brake Inspection"));
        assert!(text.contains("Total:    60.00"));
    }
}
