use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pitstop_core::{Aggregate, AggregateId, AggregateRoot, BusinessId, DomainError};
use pitstop_events::Event;

/// Customer identifier (business-scoped via `business_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of a vehicle within a customer aggregate.
///
/// Stable across edits so bookings can reference a specific car.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub Uuid);

impl VehicleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl core::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A customer's car.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: VehicleId,
    pub make: String,
    pub model: String,
    pub year: String,
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    business_id: Option<BusinessId>,
    name: String,
    email: String,
    phone: String,
    vehicles: Vec<Vehicle>,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            business_id: None,
            name: String::new(),
            email: String::new(),
            phone: String::new(),
            vehicles: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.vehicle_id == vehicle_id)
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub business_id: BusinessId,
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub vehicles: Vec<Vehicle>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddVehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVehicle {
    pub business_id: BusinessId,
    pub customer_id: CustomerId,
    pub vehicle: Vehicle,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    AddVehicle(AddVehicle),
}

/// Event: CustomerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub business_id: BusinessId,
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub vehicles: Vec<Vehicle>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VehicleAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleAdded {
    pub business_id: BusinessId,
    pub customer_id: CustomerId,
    pub vehicle: Vehicle,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    VehicleAdded(VehicleAdded),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "parties.customer.registered",
            CustomerEvent::VehicleAdded(_) => "parties.customer.vehicle_added",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::VehicleAdded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.business_id = Some(e.business_id);
                self.name = e.name.clone();
                self.email = e.email.clone();
                self.phone = e.phone.clone();
                self.vehicles = e.vehicles.clone();
                self.created = true;
            }
            CustomerEvent::VehicleAdded(e) => {
                self.vehicles.push(e.vehicle.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::AddVehicle(cmd) => self.handle_add_vehicle(cmd),
        }
    }
}

impl Customer {
    fn ensure_business(&self, business_id: BusinessId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if !cmd.email.contains('@') {
            return Err(DomainError::validation("email is not valid"));
        }
        if cmd.phone.trim().is_empty() {
            return Err(DomainError::validation("phone cannot be empty"));
        }

        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            business_id: cmd.business_id,
            customer_id: cmd.customer_id,
            name: cmd.name.clone(),
            email: cmd.email.clone(),
            phone: cmd.phone.clone(),
            vehicles: cmd.vehicles.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_vehicle(&self, cmd: &AddVehicle) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_business(cmd.business_id)?;

        if cmd.vehicle.make.trim().is_empty() || cmd.vehicle.model.trim().is_empty() {
            return Err(DomainError::validation("vehicle make and model required"));
        }
        if self
            .vehicles
            .iter()
            .any(|v| v.vehicle_id == cmd.vehicle.vehicle_id)
        {
            return Err(DomainError::conflict("vehicle already registered"));
        }

        Ok(vec![CustomerEvent::VehicleAdded(VehicleAdded {
            business_id: cmd.business_id,
            customer_id: cmd.customer_id,
            vehicle: cmd.vehicle.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_cmd(business_id: BusinessId, customer_id: CustomerId) -> RegisterCustomer {
        RegisterCustomer {
            business_id,
            customer_id,
            name: "Dana Whitfield".to_string(),
            email: "dana@example.com".to_string(),
            phone: "555-0142".to_string(),
            vehicles: vec![Vehicle {
                vehicle_id: VehicleId::new(),
                make: "Honda".to_string(),
                model: "Civic".to_string(),
                year: "2019".to_string(),
            }],
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn register_records_vehicles() {
        let business_id = BusinessId::new();
        let customer_id = CustomerId::new(AggregateId::new());
        let mut customer = Customer::empty(customer_id);

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(
                business_id,
                customer_id,
            )))
            .unwrap();
        customer.apply(&events[0]);

        assert_eq!(customer.vehicles().len(), 1);
        assert_eq!(customer.vehicles()[0].make, "Honda");
    }

    #[test]
    fn invalid_email_is_rejected() {
        let customer_id = CustomerId::new(AggregateId::new());
        let customer = Customer::empty(customer_id);
        let mut cmd = register_cmd(BusinessId::new(), customer_id);
        cmd.email = "not-an-email".to_string();

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn add_vehicle_appends_and_duplicate_id_conflicts() {
        let business_id = BusinessId::new();
        let customer_id = CustomerId::new(AggregateId::new());
        let mut customer = Customer::empty(customer_id);
        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(
                business_id,
                customer_id,
            )))
            .unwrap();
        customer.apply(&events[0]);

        let vehicle = Vehicle {
            vehicle_id: VehicleId::new(),
            make: "Ford".to_string(),
            model: "F-150".to_string(),
            year: "2021".to_string(),
        };
        let events = customer
            .handle(&CustomerCommand::AddVehicle(AddVehicle {
                business_id,
                customer_id,
                vehicle: vehicle.clone(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        customer.apply(&events[0]);
        assert_eq!(customer.vehicles().len(), 2);

        let err = customer
            .handle(&CustomerCommand::AddVehicle(AddVehicle {
                business_id,
                customer_id,
                vehicle,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
