use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use pitstop_bookings::{Booking, BookingId, BookingStatus, PartsLine};
use pitstop_catalog::ServiceId;
use pitstop_core::{Aggregate, AggregateId, BusinessId, DomainError};
use pitstop_events::{EventBus, EventEnvelope, InMemoryEventBus};
use pitstop_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, InMemoryEventStore, StoredEvent},
    projections::{
        BookingSummary, BookingsProjection, CategoriesProjection, CategoryRecord,
        CustomerDirectoryProjection, CustomerRecord, ServiceCatalogProjection, ServiceRecord,
        StockLevel, StockLevelsProjection, SupplierDirectoryProjection, SupplierRecord,
        bookings::BOOKING_AGGREGATE_TYPE,
        catalog::SERVICE_AGGREGATE_TYPE,
        categories::CATEGORY_AGGREGATE_TYPE,
        parties::{CUSTOMER_AGGREGATE_TYPE, SUPPLIER_AGGREGATE_TYPE},
        stock_levels::STOCK_ITEM_AGGREGATE_TYPE,
    },
    read_model::InMemoryBusinessStore,
    reconcile::{self, ReconcileError, reconcile_parts},
};
use pitstop_inventory::{CategoryId, StockItemId};
use pitstop_parties::{CustomerId, SupplierId};

#[cfg(feature = "postgres")]
use pitstop_infra::event_store::PostgresEventStore;
#[cfg(feature = "postgres")]
use sqlx::PgPool;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

type InMemoryDispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

#[cfg(feature = "postgres")]
type PersistentDispatcher = CommandDispatcher<Arc<PostgresEventStore>, Bus>;

type StockProjectionHandle =
    Arc<StockLevelsProjection<Arc<InMemoryBusinessStore<StockItemId, StockLevel>>>>;
type BookingsProjectionHandle =
    Arc<BookingsProjection<Arc<InMemoryBusinessStore<BookingId, BookingSummary>>>>;
type CatalogProjectionHandle =
    Arc<ServiceCatalogProjection<Arc<InMemoryBusinessStore<ServiceId, ServiceRecord>>>>;
type CustomersProjectionHandle =
    Arc<CustomerDirectoryProjection<Arc<InMemoryBusinessStore<CustomerId, CustomerRecord>>>>;
type SuppliersProjectionHandle =
    Arc<SupplierDirectoryProjection<Arc<InMemoryBusinessStore<SupplierId, SupplierRecord>>>>;
type CategoriesProjectionHandle =
    Arc<CategoriesProjection<Arc<InMemoryBusinessStore<CategoryId, CategoryRecord>>>>;

/// Write-side backend: event store + dispatcher pairing.
enum Backend {
    InMemory {
        dispatcher: Arc<InMemoryDispatcher>,
        store: Arc<InMemoryEventStore>,
    },
    #[cfg(feature = "postgres")]
    Persistent {
        dispatcher: Arc<PersistentDispatcher>,
        store: Arc<PostgresEventStore>,
    },
}

/// Shared service container handed to every handler via `Extension`.
///
/// Read models are in-memory in both backends; they are disposable and
/// rebuild from the event stream on restart.
pub struct AppServices {
    backend: Backend,
    stock: StockProjectionHandle,
    bookings: BookingsProjectionHandle,
    catalog: CatalogProjectionHandle,
    customers: CustomersProjectionHandle,
    suppliers: SuppliersProjectionHandle,
    categories: CategoriesProjectionHandle,
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "postgres")]
        {
            return build_persistent_services().await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
            return build_in_memory_services();
        }
    }

    build_in_memory_services()
}

struct ProjectionSet {
    stock: StockProjectionHandle,
    bookings: BookingsProjectionHandle,
    catalog: CatalogProjectionHandle,
    customers: CustomersProjectionHandle,
    suppliers: SuppliersProjectionHandle,
    categories: CategoriesProjectionHandle,
}

fn build_projections() -> ProjectionSet {
    ProjectionSet {
        stock: Arc::new(StockLevelsProjection::new(Arc::new(
            InMemoryBusinessStore::new(),
        ))),
        bookings: Arc::new(BookingsProjection::new(Arc::new(
            InMemoryBusinessStore::new(),
        ))),
        catalog: Arc::new(ServiceCatalogProjection::new(Arc::new(
            InMemoryBusinessStore::new(),
        ))),
        customers: Arc::new(CustomerDirectoryProjection::new(Arc::new(
            InMemoryBusinessStore::new(),
        ))),
        suppliers: Arc::new(SupplierDirectoryProjection::new(Arc::new(
            InMemoryBusinessStore::new(),
        ))),
        categories: Arc::new(CategoriesProjection::new(Arc::new(
            InMemoryBusinessStore::new(),
        ))),
    }
}

/// Background subscriber: bus -> projections.
///
/// Fan-out is by aggregate type; an envelope nobody consumes is dropped.
fn spawn_projection_worker(bus: &Bus, projections: &ProjectionSet) {
    let sub = bus.subscribe();
    let stock = projections.stock.clone();
    let bookings = projections.bookings.clone();
    let catalog = projections.catalog.clone();
    let customers = projections.customers.clone();
    let suppliers = projections.suppliers.clone();
    let categories = projections.categories.clone();

    tokio::task::spawn_blocking(move || {
        loop {
            match sub.recv() {
                Ok(env) => {
                    let apply_ok = match env.aggregate_type() {
                        STOCK_ITEM_AGGREGATE_TYPE => {
                            stock.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        BOOKING_AGGREGATE_TYPE => {
                            bookings.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        SERVICE_AGGREGATE_TYPE => {
                            catalog.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        CUSTOMER_AGGREGATE_TYPE => {
                            customers.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        SUPPLIER_AGGREGATE_TYPE => {
                            suppliers.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        CATEGORY_AGGREGATE_TYPE => {
                            categories.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        _ => Ok(()),
                    };

                    if let Err(e) = apply_ok {
                        tracing::warn!("projection apply failed: {e}");
                    }
                }
                Err(_) => break,
            }
        }
    });
}

fn build_in_memory_services() -> AppServices {
    // In-memory infra wiring (dev/test): store + bus + projections.
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let projections = build_projections();
    spawn_projection_worker(&bus, &projections);

    let dispatcher: Arc<InMemoryDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

    AppServices {
        backend: Backend::InMemory { dispatcher, store },
        stock: projections.stock,
        bookings: projections.bookings,
        catalog: projections.catalog,
        customers: projections.customers,
        suppliers: projections.suppliers,
        categories: projections.categories,
    }
}

#[cfg(feature = "postgres")]
async fn build_persistent_services() -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    let store = Arc::new(PostgresEventStore::new(pool));
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let projections = build_projections();
    spawn_projection_worker(&bus, &projections);

    let dispatcher: Arc<PersistentDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

    AppServices {
        backend: Backend::Persistent { dispatcher, store },
        stock: projections.stock,
        bookings: projections.bookings,
        catalog: projections.catalog,
        customers: projections.customers,
        suppliers: projections.suppliers,
        categories: projections.categories,
    }
}

fn rehydrate<A, S>(
    store: &S,
    business_id: BusinessId,
    aggregate_id: AggregateId,
    mut aggregate: A,
) -> Result<A, DispatchError>
where
    S: EventStore,
    A: Aggregate<Error = DomainError>,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(business_id, aggregate_id)?;
    for stored in history {
        let event: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&event);
    }
    Ok(aggregate)
}

impl AppServices {
    /// Dispatch a command with bounded retry on concurrency conflicts.
    pub fn dispatch<A>(
        &self,
        business_id: BusinessId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(BusinessId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: pitstop_events::Event + serde::Serialize + DeserializeOwned,
    {
        match &self.backend {
            Backend::InMemory { dispatcher, .. } => dispatcher.dispatch_with_retry::<A>(
                business_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
            ),
            #[cfg(feature = "postgres")]
            Backend::Persistent { dispatcher, .. } => dispatcher.dispatch_with_retry::<A>(
                business_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
            ),
        }
    }

    /// Rehydrate a booking from its event stream.
    ///
    /// Used by the parts/cancel/invoice paths, which need full aggregate
    /// state rather than the projection row.
    pub fn load_booking(
        &self,
        business_id: BusinessId,
        booking_id: BookingId,
    ) -> Result<Booking, DispatchError> {
        let booking = match &self.backend {
            Backend::InMemory { store, .. } => rehydrate(
                store,
                business_id,
                booking_id.0,
                Booking::empty(booking_id),
            )?,
            #[cfg(feature = "postgres")]
            Backend::Persistent { store, .. } => rehydrate(
                store,
                business_id,
                booking_id.0,
                Booking::empty(booking_id),
            )?,
        };
        if booking.business_id().is_none() {
            return Err(DispatchError::NotFound);
        }
        Ok(booking)
    }

    /// Replace a booking's parts lines, reconciling the stock ledger.
    pub fn replace_booking_parts(
        &self,
        business_id: BusinessId,
        booking_id: BookingId,
        desired: Vec<PartsLine>,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        let booking = self
            .load_booking(business_id, booking_id)
            .map_err(ReconcileError::Booking)?;

        match &self.backend {
            Backend::InMemory { dispatcher, .. } => reconcile_parts(
                dispatcher,
                business_id,
                &booking,
                booking_id,
                desired,
                occurred_at,
            ),
            #[cfg(feature = "postgres")]
            Backend::Persistent { dispatcher, .. } => reconcile_parts(
                dispatcher,
                business_id,
                &booking,
                booking_id,
                desired,
                occurred_at,
            ),
        }
    }

    /// Cancel a booking and return its consumed parts to the shelf.
    ///
    /// Restocks commit before the status change; the workflow compensates
    /// them if the cancel itself fails.
    pub fn cancel_booking(
        &self,
        business_id: BusinessId,
        booking_id: BookingId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        let booking = self
            .load_booking(business_id, booking_id)
            .map_err(ReconcileError::Booking)?;

        match &self.backend {
            Backend::InMemory { dispatcher, .. } => {
                reconcile::cancel_booking(dispatcher, business_id, &booking, booking_id, occurred_at)
            }
            #[cfg(feature = "postgres")]
            Backend::Persistent { dispatcher, .. } => {
                reconcile::cancel_booking(dispatcher, business_id, &booking, booking_id, occurred_at)
            }
        }
    }

    pub fn stock_get(&self, business_id: BusinessId, item_id: &StockItemId) -> Option<StockLevel> {
        self.stock.get(business_id, item_id)
    }

    pub fn stock_list(&self, business_id: BusinessId) -> Vec<StockLevel> {
        self.stock.list(business_id)
    }

    pub fn stock_low(&self, business_id: BusinessId) -> Vec<StockLevel> {
        self.stock.list_low_stock(business_id)
    }

    pub fn booking_get(
        &self,
        business_id: BusinessId,
        booking_id: &BookingId,
    ) -> Option<BookingSummary> {
        self.bookings.get(business_id, booking_id)
    }

    pub fn bookings_list(&self, business_id: BusinessId) -> Vec<BookingSummary> {
        self.bookings.list(business_id)
    }

    pub fn bookings_list_by_status(
        &self,
        business_id: BusinessId,
        status: BookingStatus,
    ) -> Vec<BookingSummary> {
        self.bookings.list_by_status(business_id, status)
    }

    pub fn service_get(
        &self,
        business_id: BusinessId,
        service_id: &ServiceId,
    ) -> Option<ServiceRecord> {
        self.catalog.get(business_id, service_id)
    }

    pub fn services_list(&self, business_id: BusinessId) -> Vec<ServiceRecord> {
        self.catalog.list(business_id)
    }

    pub fn customer_get(
        &self,
        business_id: BusinessId,
        customer_id: &CustomerId,
    ) -> Option<CustomerRecord> {
        self.customers.get(business_id, customer_id)
    }

    pub fn customers_list(&self, business_id: BusinessId) -> Vec<CustomerRecord> {
        self.customers.list(business_id)
    }

    pub fn supplier_get(
        &self,
        business_id: BusinessId,
        supplier_id: &SupplierId,
    ) -> Option<SupplierRecord> {
        self.suppliers.get(business_id, supplier_id)
    }

    pub fn suppliers_list(&self, business_id: BusinessId) -> Vec<SupplierRecord> {
        self.suppliers.list(business_id)
    }

    pub fn category_get(
        &self,
        business_id: BusinessId,
        category_id: &CategoryId,
    ) -> Option<CategoryRecord> {
        self.categories.get(business_id, category_id)
    }

    pub fn categories_list(&self, business_id: BusinessId) -> Vec<CategoryRecord> {
        self.categories.list(business_id)
    }
}
