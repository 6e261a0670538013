use pitstop_core::BusinessId;

use crate::EventEnvelope;

/// Helper trait for business-scoped messages.
///
/// Marks types carrying a `BusinessId`, so subscription loops and
/// projections can filter or assert scope without knowing the payload type.
pub trait BusinessScoped {
    fn business_id(&self) -> BusinessId;
}

impl<E> BusinessScoped for EventEnvelope<E> {
    fn business_id(&self) -> BusinessId {
        self.business_id()
    }
}
