//! `pitstop-parties`: customers (with their vehicles) and part suppliers.

pub mod customer;
pub mod supplier;

pub use customer::{
    AddVehicle, Customer, CustomerCommand, CustomerEvent, CustomerId, CustomerRegistered,
    RegisterCustomer, Vehicle, VehicleAdded, VehicleId,
};
pub use supplier::{
    ContactInfo, RegisterSupplier, Supplier, SupplierCommand, SupplierEvent, SupplierId,
    SupplierRegistered,
};
