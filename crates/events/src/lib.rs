//! `pitstop-events`: event abstractions shared by domain and infrastructure.
//!
//! Domain modules describe what happened with typed events; this crate
//! provides the mechanics around them: the `Event` trait, the persisted
//! envelope, and a pub/sub bus for distributing committed events to
//! projections.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod scoped;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
pub use scoped::BusinessScoped;
