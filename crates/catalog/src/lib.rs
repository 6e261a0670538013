//! `pitstop-catalog`: the service catalog.
//!
//! Services (oil change, brake job, alignment) are reference data for
//! booking line items: a name, a unit price, and free-form attribute
//! fields.

pub mod service;

pub use service::{
    CreateService, Service, ServiceCommand, ServiceCreated, ServiceEvent, ServiceField, ServiceId,
    ServicePriceChanged, SetServicePrice,
};
