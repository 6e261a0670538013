//! `pitstop-bookings`: appointment bookings and their lifecycle.
//!
//! A booking carries the scheduled work (service lines), the parts used on
//! the job (parts lines), status and payment lifecycles, and technician
//! assignment. Stock reconciliation against the inventory ledger is driven
//! by the infrastructure workflow, not by this aggregate.

pub mod booking;

pub use booking::{
    AssignTechnicians, Booking, BookingCommand, BookingEvent, BookingId, BookingRescheduled,
    BookingScheduled, BookingStatus, ChangePaymentStatus, ChangeStatus, NoteSet, PartsLine,
    PartsLinesReplaced, PaymentMethod, PaymentMethodSet, PaymentStatus, PaymentStatusChanged,
    ReplacePartsLines, Reschedule, ScheduleBooking, ServiceLine, SetNote, SetPaymentMethod,
    StatusChanged, TechniciansAssigned,
};
