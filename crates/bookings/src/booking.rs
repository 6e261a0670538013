use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pitstop_catalog::ServiceId;
use pitstop_core::{Aggregate, AggregateId, AggregateRoot, BusinessId, DomainError, UserId};
use pitstop_events::Event;
use pitstop_inventory::StockItemId;
use pitstop_parties::{CustomerId, VehicleId};

/// Booking identifier (business-scoped via `business_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub AggregateId);

impl BookingId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BookingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Booking status lifecycle.
///
/// Moves forward through pending → ongoing → completed; cancellable from
/// any non-terminal state. Completed and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Ongoing,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    fn rank(self) -> u8 {
        match self {
            BookingStatus::Pending => 0,
            BookingStatus::Ongoing => 1,
            BookingStatus::Completed => 2,
            BookingStatus::Cancelled => 3,
        }
    }

    /// Whether a move from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            BookingStatus::Cancelled => true,
            _ => next.rank() > self.rank(),
        }
    }
}

/// Payment status lifecycle. Locked once paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Unpaid,
    Charge,
}

/// How the customer settles the bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Debit,
    Credit,
    Interac,
}

/// A booked service and how many of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub service_id: ServiceId,
    pub quantity: i64,
}

/// A part used on the job.
///
/// `included_with_service` marks parts bundled into the service price;
/// those do not bill separately on the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartsLine {
    pub item_id: StockItemId,
    pub quantity: i64,
    pub included_with_service: bool,
}

/// Aggregate root: Booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    id: BookingId,
    business_id: Option<BusinessId>,
    scheduled_at: DateTime<Utc>,
    customer_id: Option<CustomerId>,
    vehicle_id: Option<VehicleId>,
    status: BookingStatus,
    payment_status: PaymentStatus,
    payment_method: Option<PaymentMethod>,
    service_lines: Vec<ServiceLine>,
    parts_lines: Vec<PartsLine>,
    technician_ids: Vec<UserId>,
    note: String,
    version: u64,
    created: bool,
}

impl Booking {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BookingId) -> Self {
        Self {
            id,
            business_id: None,
            scheduled_at: DateTime::<Utc>::MIN_UTC,
            customer_id: None,
            vehicle_id: None,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            service_lines: Vec::new(),
            parts_lines: Vec::new(),
            technician_ids: Vec::new(),
            note: String::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BookingId {
        self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn vehicle_id(&self) -> Option<VehicleId> {
        self.vehicle_id
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn service_lines(&self) -> &[ServiceLine] {
        &self.service_lines
    }

    pub fn parts_lines(&self) -> &[PartsLine] {
        &self.parts_lines
    }

    pub fn technician_ids(&self) -> &[UserId] {
        &self.technician_ids
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    /// Completed and paid: nothing about this booking may change anymore.
    pub fn is_settled(&self) -> bool {
        self.status == BookingStatus::Completed && self.payment_status == PaymentStatus::Paid
    }

    /// Whether job details (parts, technicians, schedule) may still change.
    pub fn is_job_editable(&self) -> bool {
        !self.status.is_terminal()
    }
}

impl AggregateRoot for Booking {
    type Id = BookingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ScheduleBooking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleBooking {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub scheduled_at: DateTime<Utc>,
    pub customer_id: CustomerId,
    pub vehicle_id: Option<VehicleId>,
    pub service_lines: Vec<ServiceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reschedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reschedule {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub scheduled_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub status: BookingStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangePaymentStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePaymentStatus {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub payment_status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPaymentMethod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPaymentMethod {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub payment_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignTechnicians (replaces the assigned set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignTechnicians {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub technician_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetNote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetNote {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplacePartsLines.
///
/// Carries the full desired parts list after an edit. The aggregate only
/// records the lines; the caller (infra reconciliation) is responsible for
/// applying consume/restock deltas to the ledger first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacePartsLines {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub lines: Vec<PartsLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingCommand {
    ScheduleBooking(ScheduleBooking),
    Reschedule(Reschedule),
    ChangeStatus(ChangeStatus),
    ChangePaymentStatus(ChangePaymentStatus),
    SetPaymentMethod(SetPaymentMethod),
    AssignTechnicians(AssignTechnicians),
    SetNote(SetNote),
    ReplacePartsLines(ReplacePartsLines),
}

/// Event: BookingScheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingScheduled {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub scheduled_at: DateTime<Utc>,
    pub customer_id: CustomerId,
    pub vehicle_id: Option<VehicleId>,
    pub service_lines: Vec<ServiceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BookingRescheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRescheduled {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub scheduled_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub status: BookingStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChanged {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub payment_status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentMethodSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodSet {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub payment_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TechniciansAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniciansAssigned {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub technician_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NoteSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSet {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartsLinesReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartsLinesReplaced {
    pub business_id: BusinessId,
    pub booking_id: BookingId,
    pub lines: Vec<PartsLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEvent {
    BookingScheduled(BookingScheduled),
    BookingRescheduled(BookingRescheduled),
    StatusChanged(StatusChanged),
    PaymentStatusChanged(PaymentStatusChanged),
    PaymentMethodSet(PaymentMethodSet),
    TechniciansAssigned(TechniciansAssigned),
    NoteSet(NoteSet),
    PartsLinesReplaced(PartsLinesReplaced),
}

impl Event for BookingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BookingEvent::BookingScheduled(_) => "bookings.booking.scheduled",
            BookingEvent::BookingRescheduled(_) => "bookings.booking.rescheduled",
            BookingEvent::StatusChanged(_) => "bookings.booking.status_changed",
            BookingEvent::PaymentStatusChanged(_) => "bookings.booking.payment_status_changed",
            BookingEvent::PaymentMethodSet(_) => "bookings.booking.payment_method_set",
            BookingEvent::TechniciansAssigned(_) => "bookings.booking.technicians_assigned",
            BookingEvent::NoteSet(_) => "bookings.booking.note_set",
            BookingEvent::PartsLinesReplaced(_) => "bookings.booking.parts_lines_replaced",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BookingEvent::BookingScheduled(e) => e.occurred_at,
            BookingEvent::BookingRescheduled(e) => e.occurred_at,
            BookingEvent::StatusChanged(e) => e.occurred_at,
            BookingEvent::PaymentStatusChanged(e) => e.occurred_at,
            BookingEvent::PaymentMethodSet(e) => e.occurred_at,
            BookingEvent::TechniciansAssigned(e) => e.occurred_at,
            BookingEvent::NoteSet(e) => e.occurred_at,
            BookingEvent::PartsLinesReplaced(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Booking {
    type Command = BookingCommand;
    type Event = BookingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BookingEvent::BookingScheduled(e) => {
                self.id = e.booking_id;
                self.business_id = Some(e.business_id);
                self.scheduled_at = e.scheduled_at;
                self.customer_id = Some(e.customer_id);
                self.vehicle_id = e.vehicle_id;
                self.status = BookingStatus::Pending;
                self.payment_status = PaymentStatus::Pending;
                self.service_lines = e.service_lines.clone();
                self.parts_lines.clear();
                self.created = true;
            }
            BookingEvent::BookingRescheduled(e) => {
                self.scheduled_at = e.scheduled_at;
            }
            BookingEvent::StatusChanged(e) => {
                self.status = e.status;
            }
            BookingEvent::PaymentStatusChanged(e) => {
                self.payment_status = e.payment_status;
            }
            BookingEvent::PaymentMethodSet(e) => {
                self.payment_method = Some(e.payment_method);
            }
            BookingEvent::TechniciansAssigned(e) => {
                self.technician_ids = e.technician_ids.clone();
            }
            BookingEvent::NoteSet(e) => {
                self.note = e.note.clone();
            }
            BookingEvent::PartsLinesReplaced(e) => {
                self.parts_lines = e.lines.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BookingCommand::ScheduleBooking(cmd) => self.handle_schedule(cmd),
            BookingCommand::Reschedule(cmd) => self.handle_reschedule(cmd),
            BookingCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            BookingCommand::ChangePaymentStatus(cmd) => self.handle_change_payment_status(cmd),
            BookingCommand::SetPaymentMethod(cmd) => self.handle_set_payment_method(cmd),
            BookingCommand::AssignTechnicians(cmd) => self.handle_assign_technicians(cmd),
            BookingCommand::SetNote(cmd) => self.handle_set_note(cmd),
            BookingCommand::ReplacePartsLines(cmd) => self.handle_replace_parts(cmd),
        }
    }
}

fn validate_service_lines(lines: &[ServiceLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "booking must include at least one service",
        ));
    }
    for line in lines {
        if line.quantity <= 0 {
            return Err(DomainError::validation(
                "service quantity must be a positive integer",
            ));
        }
    }
    for (i, line) in lines.iter().enumerate() {
        if lines[..i].iter().any(|l| l.service_id == line.service_id) {
            return Err(DomainError::validation("duplicate service line"));
        }
    }
    Ok(())
}

fn validate_parts_lines(lines: &[PartsLine]) -> Result<(), DomainError> {
    for line in lines {
        if line.quantity <= 0 {
            return Err(DomainError::validation(
                "part quantity must be a positive integer",
            ));
        }
    }
    for (i, line) in lines.iter().enumerate() {
        if lines[..i].iter().any(|l| l.item_id == line.item_id) {
            return Err(DomainError::validation("duplicate parts line"));
        }
    }
    Ok(())
}

impl Booking {
    fn ensure_business(&self, business_id: BusinessId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.business_id != Some(business_id) {
            return Err(DomainError::invariant("business mismatch"));
        }
        Ok(())
    }

    fn ensure_booking_id(&self, booking_id: BookingId) -> Result<(), DomainError> {
        if self.id != booking_id {
            return Err(DomainError::invariant("booking_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_not_settled(&self) -> Result<(), DomainError> {
        if self.is_settled() {
            return Err(DomainError::invariant(
                "booking is completed and paid; no further changes allowed",
            ));
        }
        Ok(())
    }

    fn ensure_job_editable(&self) -> Result<(), DomainError> {
        if !self.is_job_editable() {
            return Err(DomainError::invariant(
                "cannot edit a completed or cancelled booking",
            ));
        }
        Ok(())
    }

    fn guard(&self, business_id: BusinessId, booking_id: BookingId) -> Result<(), DomainError> {
        self.ensure_exists()?;
        self.ensure_business(business_id)?;
        self.ensure_booking_id(booking_id)?;
        self.ensure_not_settled()
    }

    fn handle_schedule(&self, cmd: &ScheduleBooking) -> Result<Vec<BookingEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("booking already exists"));
        }
        validate_service_lines(&cmd.service_lines)?;

        Ok(vec![BookingEvent::BookingScheduled(BookingScheduled {
            business_id: cmd.business_id,
            booking_id: cmd.booking_id,
            scheduled_at: cmd.scheduled_at,
            customer_id: cmd.customer_id,
            vehicle_id: cmd.vehicle_id,
            service_lines: cmd.service_lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reschedule(&self, cmd: &Reschedule) -> Result<Vec<BookingEvent>, DomainError> {
        self.guard(cmd.business_id, cmd.booking_id)?;
        self.ensure_job_editable()?;

        Ok(vec![BookingEvent::BookingRescheduled(BookingRescheduled {
            business_id: cmd.business_id,
            booking_id: cmd.booking_id,
            scheduled_at: cmd.scheduled_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<BookingEvent>, DomainError> {
        self.guard(cmd.business_id, cmd.booking_id)?;

        if !self.status.can_transition_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot move booking from {:?} to {:?}",
                self.status, cmd.status
            )));
        }

        Ok(vec![BookingEvent::StatusChanged(StatusChanged {
            business_id: cmd.business_id,
            booking_id: cmd.booking_id,
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_payment_status(
        &self,
        cmd: &ChangePaymentStatus,
    ) -> Result<Vec<BookingEvent>, DomainError> {
        self.guard(cmd.business_id, cmd.booking_id)?;

        if self.payment_status == PaymentStatus::Paid {
            return Err(DomainError::invariant(
                "payment status is locked once paid",
            ));
        }
        if cmd.payment_status == PaymentStatus::Pending
            && self.payment_status != PaymentStatus::Pending
        {
            return Err(DomainError::invariant(
                "payment status cannot move back to pending",
            ));
        }

        Ok(vec![BookingEvent::PaymentStatusChanged(
            PaymentStatusChanged {
                business_id: cmd.business_id,
                booking_id: cmd.booking_id,
                payment_status: cmd.payment_status,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_set_payment_method(
        &self,
        cmd: &SetPaymentMethod,
    ) -> Result<Vec<BookingEvent>, DomainError> {
        self.guard(cmd.business_id, cmd.booking_id)?;

        if self.payment_status == PaymentStatus::Paid {
            return Err(DomainError::invariant(
                "payment method is locked once paid",
            ));
        }

        Ok(vec![BookingEvent::PaymentMethodSet(PaymentMethodSet {
            business_id: cmd.business_id,
            booking_id: cmd.booking_id,
            payment_method: cmd.payment_method,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_technicians(
        &self,
        cmd: &AssignTechnicians,
    ) -> Result<Vec<BookingEvent>, DomainError> {
        self.guard(cmd.business_id, cmd.booking_id)?;
        self.ensure_job_editable()?;

        for (i, id) in cmd.technician_ids.iter().enumerate() {
            if cmd.technician_ids[..i].contains(id) {
                return Err(DomainError::validation("duplicate technician"));
            }
        }

        Ok(vec![BookingEvent::TechniciansAssigned(TechniciansAssigned {
            business_id: cmd.business_id,
            booking_id: cmd.booking_id,
            technician_ids: cmd.technician_ids.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_note(&self, cmd: &SetNote) -> Result<Vec<BookingEvent>, DomainError> {
        self.guard(cmd.business_id, cmd.booking_id)?;

        Ok(vec![BookingEvent::NoteSet(NoteSet {
            business_id: cmd.business_id,
            booking_id: cmd.booking_id,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replace_parts(
        &self,
        cmd: &ReplacePartsLines,
    ) -> Result<Vec<BookingEvent>, DomainError> {
        self.guard(cmd.business_id, cmd.booking_id)?;
        self.ensure_job_editable()?;
        validate_parts_lines(&cmd.lines)?;

        Ok(vec![BookingEvent::PartsLinesReplaced(PartsLinesReplaced {
            business_id: cmd.business_id,
            booking_id: cmd.booking_id,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
