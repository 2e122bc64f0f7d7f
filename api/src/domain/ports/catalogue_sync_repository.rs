//! Port for the database side of provider stock synchronisation.

use async_trait::async_trait;

use crate::domain::catalogue_sync::{StockDetail, StockSyncPlan, SyncLookups, VenueProviderLink};
use crate::domain::{OfferId, ProviderId, VenueId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by catalogue synchronisation adapters.
    pub enum CatalogueSyncRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "catalogue sync repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "catalogue sync repository query failed: {message}",
    }
}

/// Port for synchronisation reads and writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogueSyncRepository: Send + Sync {
    /// Active venues fed by a provider.
    async fn list_active_venue_providers(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<VenueProviderLink>, CatalogueSyncRepositoryError>;

    /// Products, offers and stocks matching the details' references.
    async fn load_lookups(
        &self,
        details: &[StockDetail],
        venue_id: VenueId,
    ) -> Result<SyncLookups, CatalogueSyncRepositoryError>;

    /// Apply a plan in one transaction, returning the ids of created offers.
    async fn apply_plan(
        &self,
        plan: &StockSyncPlan,
        provider_id: ProviderId,
    ) -> Result<Vec<OfferId>, CatalogueSyncRepositoryError>;
}
