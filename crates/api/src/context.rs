use pitstop_core::BusinessId;

/// Business context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BusinessContext {
    business_id: BusinessId,
}

impl BusinessContext {
    pub fn new(business_id: BusinessId) -> Self {
        Self { business_id }
    }

    pub fn business_id(&self) -> BusinessId {
        self.business_id
    }
}
