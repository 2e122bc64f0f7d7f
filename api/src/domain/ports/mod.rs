//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod beneficiary_repository;
mod booking_housekeeping_repository;
mod booking_repository;
mod catalogue_sync_repository;
mod collective_booking_repository;
mod deposit_repository;
mod finance_event_repository;
mod notification_queue;
mod offer_indexer;
mod stock_details_source;
mod stock_repository;

#[cfg(test)]
pub use beneficiary_repository::MockBeneficiaryRepository;
pub use beneficiary_repository::{BeneficiaryRepository, BeneficiaryRepositoryError};
#[cfg(test)]
pub use booking_housekeeping_repository::MockBookingHousekeepingRepository;
pub use booking_housekeeping_repository::{
    BookingHousekeepingError, BookingHousekeepingRepository, ExpiredBatch, ExpiryQuery,
    SoonToExpireQuery,
};
#[cfg(test)]
pub use booking_repository::MockBookingRepository;
pub use booking_repository::{BookingRepository, BookingRepositoryError, FixtureBookingRepository};
#[cfg(test)]
pub use catalogue_sync_repository::MockCatalogueSyncRepository;
pub use catalogue_sync_repository::{CatalogueSyncRepository, CatalogueSyncRepositoryError};
#[cfg(test)]
pub use collective_booking_repository::MockCollectiveBookingRepository;
pub use collective_booking_repository::{
    CollectiveBookingRepository, CollectiveBookingRepositoryError,
};
#[cfg(test)]
pub use deposit_repository::MockDepositRepository;
pub use deposit_repository::{DepositRepository, DepositRepositoryError};
#[cfg(test)]
pub use finance_event_repository::MockFinanceEventRepository;
pub use finance_event_repository::{FinanceEventRepository, FinanceEventRepositoryError};
#[cfg(test)]
pub use notification_queue::MockNotificationQueue;
pub use notification_queue::{JobDispatchError, NotificationQueue};
#[cfg(test)]
pub use offer_indexer::MockOfferIndexer;
pub use offer_indexer::{NoopOfferIndexer, OfferIndexer, OfferIndexerError};
#[cfg(test)]
pub use stock_details_source::MockStockDetailsSource;
pub use stock_details_source::{StockDetailsSource, StockDetailsSourceError};
#[cfg(test)]
pub use stock_repository::MockStockRepository;
pub use stock_repository::{StockRepository, StockRepositoryError};
