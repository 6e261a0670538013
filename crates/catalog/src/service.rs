use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pitstop_core::{Aggregate, AggregateId, AggregateRoot, BusinessId, DomainError, Money};
use pitstop_events::Event;

/// Service identifier (business-scoped via `business_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub AggregateId);

impl ServiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Free-form name/value pair on a service (e.g. "duration" / "45min").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceField {
    pub name: String,
    pub value: String,
}

/// Aggregate root: Service.
///
/// Read-only reference data from the booking's point of view; bookings
/// record `(service_id, qty)` lines and settlement looks the price up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    id: ServiceId,
    business_id: Option<BusinessId>,
    name: String,
    price: Money,
    fields: Vec<ServiceField>,
    version: u64,
    created: bool,
}

impl Service {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ServiceId) -> Self {
        Self {
            id,
            business_id: None,
            name: String::new(),
            price: Money::ZERO,
            fields: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ServiceId {
        self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn fields(&self) -> &[ServiceField] {
        &self.fields
    }
}

impl AggregateRoot for Service {
    type Id = ServiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateService.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateService {
    pub business_id: BusinessId,
    pub service_id: ServiceId,
    pub name: String,
    pub price: Money,
    pub fields: Vec<ServiceField>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetServicePrice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetServicePrice {
    pub business_id: BusinessId,
    pub service_id: ServiceId,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceCommand {
    CreateService(CreateService),
    SetServicePrice(SetServicePrice),
}

/// Event: ServiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCreated {
    pub business_id: BusinessId,
    pub service_id: ServiceId,
    pub name: String,
    pub price: Money,
    pub fields: Vec<ServiceField>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ServicePriceChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePriceChanged {
    pub business_id: BusinessId,
    pub service_id: ServiceId,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceEvent {
    ServiceCreated(ServiceCreated),
    ServicePriceChanged(ServicePriceChanged),
}

impl Event for ServiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ServiceEvent::ServiceCreated(_) => "catalog.service.created",
            ServiceEvent::ServicePriceChanged(_) => "catalog.service.price_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ServiceEvent::ServiceCreated(e) => e.occurred_at,
            ServiceEvent::ServicePriceChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Service {
    type Command = ServiceCommand;
    type Event = ServiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ServiceEvent::ServiceCreated(e) => {
                self.id = e.service_id;
                self.business_id = Some(e.business_id);
                self.name = e.name.clone();
                self.price = e.price;
                self.fields = e.fields.clone();
                self.created = true;
            }
            ServiceEvent::ServicePriceChanged(e) => {
                self.price = e.price;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ServiceCommand::CreateService(cmd) => self.handle_create(cmd),
            ServiceCommand::SetServicePrice(cmd) => self.handle_set_price(cmd),
        }
    }
}

impl Service {
    fn ensure_business(&self, business_id: BusinessId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateService) -> Result<Vec<ServiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("service already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.price == Money::ZERO {
            return Err(DomainError::validation("price must be positive"));
        }
        if cmd
            .fields
            .iter()
            .any(|f| f.name.trim().is_empty() || f.value.trim().is_empty())
        {
            return Err(DomainError::validation(
                "field names and values cannot be empty",
            ));
        }

        Ok(vec![ServiceEvent::ServiceCreated(ServiceCreated {
            business_id: cmd.business_id,
            service_id: cmd.service_id,
            name: cmd.name.clone(),
            price: cmd.price,
            fields: cmd.fields.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_price(&self, cmd: &SetServicePrice) -> Result<Vec<ServiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_business(cmd.business_id)?;

        if cmd.price == Money::ZERO {
            return Err(DomainError::validation("price must be positive"));
        }

        Ok(vec![ServiceEvent::ServicePriceChanged(ServicePriceChanged {
            business_id: cmd.business_id,
            service_id: cmd.service_id,
            price: cmd.price,
            occurred_at: cmd.occurred_at,
        })])
    }
}
