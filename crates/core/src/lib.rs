//! `pitstop-core`: domain foundation building blocks.
//!
//! Pure domain primitives shared by every shop module (no infrastructure
//! concerns): typed identifiers, the domain error taxonomy, aggregate
//! traits, and money/tax value types.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, BusinessId, UserId};
pub use money::{Money, TaxRate, Totals};
