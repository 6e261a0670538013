use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use pitstop_core::{AggregateId, Money};
use pitstop_infra::projections::{
    BookingSummary, CategoryRecord, CustomerRecord, ServiceRecord, StockLevel, SupplierRecord,
};
use pitstop_parties::{ContactInfo, Vehicle, VehicleId};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AttributeFieldDto {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub sku: String,
    pub category_id: Option<String>,
    pub unit_cost: Option<String>,
    pub retail_price: String,
    pub unit: String,
    #[serde(default)]
    pub reorder_point: i64,
    pub location: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeFieldDto>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub quantity: i64,
    pub supplier_id: Option<String>,
    pub cost: Option<String>,
    pub reference: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeStockRequest {
    pub quantity: i64,
    pub booking_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestockReturnRequest {
    pub quantity: i64,
    pub booking_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub field_names: Vec<String>,
    #[serde(default)]
    pub compatible_vehicles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameCategoryRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub price: String,
    #[serde(default)]
    pub fields: Vec<AttributeFieldDto>,
}

#[derive(Debug, Deserialize)]
pub struct SetServicePriceRequest {
    pub price: String,
}

#[derive(Debug, Deserialize)]
pub struct VehicleDto {
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub year: String,
}

impl VehicleDto {
    pub fn into_vehicle(self) -> Vehicle {
        Vehicle {
            vehicle_id: VehicleId::new(),
            make: self.make,
            model: self.model,
            year: self.year,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterCustomerRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub vehicles: Vec<VehicleDto>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterSupplierRequest {
    pub name: String,
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceLineDto {
    pub service_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleBookingRequest {
    pub scheduled_at: DateTime<Utc>,
    pub customer_id: String,
    pub vehicle_id: Option<Uuid>,
    pub service_lines: Vec<ServiceLineDto>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePaymentStatusRequest {
    pub payment_status: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPaymentMethodRequest {
    pub payment_method: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignTechniciansRequest {
    pub technician_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SetNoteRequest {
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct PartsLineDto {
    pub item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub included_with_service: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReplacePartsRequest {
    pub lines: Vec<PartsLineDto>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateInvoiceRequest {
    pub business_name: String,
    #[serde(default)]
    pub tax_rate_bps: u32,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_aggregate_id(
    s: &str,
    label: &'static str,
) -> Result<AggregateId, axum::response::Response> {
    s.parse()
        .map_err(|_| errors::field_error("invalid_id", label, format!("invalid {label}")))
}

pub fn parse_money(s: &str, label: &'static str) -> Result<Money, axum::response::Response> {
    Money::parse(s)
        .map_err(|e| errors::field_error("invalid_amount", label, format!("invalid {label}: {e}")))
}

// -------------------------
// Response mapping
// -------------------------

pub fn stock_level_to_json(level: &StockLevel) -> JsonValue {
    json!({
        "item_id": level.item_id.to_string(),
        "name": level.name,
        "sku": level.sku,
        "retail_price": level.retail_price.to_string(),
        "on_hand": level.on_hand,
        "reorder_point": level.reorder_point,
        "needs_reorder": level.needs_reorder(),
    })
}

pub fn booking_to_json(summary: &BookingSummary) -> JsonValue {
    json!({
        "booking_id": summary.booking_id.to_string(),
        "scheduled_at": summary.scheduled_at,
        "customer_id": summary.customer_id.to_string(),
        "vehicle_id": summary.vehicle_id.map(|v| v.to_string()),
        "status": summary.status,
        "payment_status": summary.payment_status,
        "payment_method": summary.payment_method,
        "service_lines": summary
            .service_lines
            .iter()
            .map(|l| json!({
                "service_id": l.service_id.to_string(),
                "quantity": l.quantity,
            }))
            .collect::<Vec<_>>(),
        "parts_lines": summary
            .parts_lines
            .iter()
            .map(|l| json!({
                "item_id": l.item_id.to_string(),
                "quantity": l.quantity,
                "included_with_service": l.included_with_service,
            }))
            .collect::<Vec<_>>(),
        "technician_ids": summary
            .technician_ids
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>(),
        "note": summary.note,
    })
}

pub fn service_to_json(record: &ServiceRecord) -> JsonValue {
    json!({
        "service_id": record.service_id.to_string(),
        "name": record.name,
        "price": record.price.to_string(),
        "fields": record
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "value": f.value }))
            .collect::<Vec<_>>(),
    })
}

pub fn customer_to_json(record: &CustomerRecord) -> JsonValue {
    json!({
        "customer_id": record.customer_id.to_string(),
        "name": record.name,
        "email": record.email,
        "phone": record.phone,
        "vehicles": record
            .vehicles
            .iter()
            .map(|v| json!({
                "vehicle_id": v.vehicle_id.to_string(),
                "make": v.make,
                "model": v.model,
                "year": v.year,
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn supplier_to_json(record: &SupplierRecord) -> JsonValue {
    json!({
        "supplier_id": record.supplier_id.to_string(),
        "name": record.name,
        "contact": {
            "email": record.contact.email,
            "phone": record.contact.phone,
            "address": record.contact.address,
        },
    })
}

pub fn category_to_json(record: &CategoryRecord) -> JsonValue {
    json!({
        "category_id": record.category_id.to_string(),
        "name": record.name,
        "description": record.description,
        "field_names": record.field_names,
        "compatible_vehicles": record.compatible_vehicles,
    })
}
