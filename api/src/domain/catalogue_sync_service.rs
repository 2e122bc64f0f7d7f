//! Provider stock synchronisation runs.
//!
//! A run reads every page a provider reports for a venue, plans the writes
//! with [`plan_stock_sync`], applies the plan in one transaction and asks
//! search to refresh the touched offers.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::catalogue_sync::{
    ProviderStockLine, StockDetail, StockSyncReport, VenueProviderLink, plan_stock_sync,
};
use crate::domain::indexing::IndexationReason;
use crate::domain::ports::{
    CatalogueSyncRepository, CatalogueSyncRepositoryError, OfferIndexer, StockDetailsSource,
    StockDetailsSourceError,
};
use crate::domain::siren::{IdentifierError, Siret};
use crate::domain::{Error, OfferId, ProviderId, VenueId};

/// Failures of a synchronisation run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The venue has no provider-side identifier.
    #[error("venue {venue_id} has no SIRET at its provider")]
    NoSiretSpecified {
        /// Venue being synchronised.
        venue_id: VenueId,
    },
    /// The provider-side identifier is not a valid SIRET.
    #[error("venue {venue_id} SIRET {siret:?} is not registered: {source}")]
    VenueSiretNotRegistered {
        /// Venue being synchronised.
        venue_id: VenueId,
        /// Identifier received.
        siret: String,
        /// Validation failure.
        source: IdentifierError,
    },
    /// The provider could not be read.
    #[error(transparent)]
    Source(#[from] StockDetailsSourceError),
    /// The catalogue could not be read or written.
    #[error(transparent)]
    Repository(#[from] CatalogueSyncRepositoryError),
}

impl From<SyncError> for Error {
    fn from(value: SyncError) -> Self {
        let message = value.to_string();
        match value {
            SyncError::NoSiretSpecified { .. } | SyncError::VenueSiretNotRegistered { .. } => {
                Self::invalid_request(message)
            }
            SyncError::Source(StockDetailsSourceError::Unavailable { .. })
            | SyncError::Repository(CatalogueSyncRepositoryError::Connection { .. }) => {
                Self::service_unavailable(message)
            }
            SyncError::Source(StockDetailsSourceError::Malformed { .. })
            | SyncError::Repository(CatalogueSyncRepositoryError::Query { .. }) => {
                Self::internal(message)
            }
        }
    }
}

/// Synchronises venue stocks from provider feeds.
#[derive(Clone)]
pub struct CatalogueSyncService {
    repository: Arc<dyn CatalogueSyncRepository>,
    source: Arc<dyn StockDetailsSource>,
    indexer: Arc<dyn OfferIndexer>,
}

impl CatalogueSyncService {
    /// Build the service.
    pub fn new(
        repository: Arc<dyn CatalogueSyncRepository>,
        source: Arc<dyn StockDetailsSource>,
        indexer: Arc<dyn OfferIndexer>,
    ) -> Self {
        Self {
            repository,
            source,
            indexer,
        }
    }

    /// Synchronise one venue.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoSiretSpecified`] or
    /// [`SyncError::VenueSiretNotRegistered`] when the venue reference is
    /// missing or invalid, and propagates source and repository failures.
    /// Nothing is written when a failure occurs.
    pub async fn synchronize_venue_stocks(
        &self,
        link: &VenueProviderLink,
    ) -> Result<StockSyncReport, SyncError> {
        let siret = venue_siret(link)?;
        let lines = self.fetch_all_lines(link).await?;
        let details: Vec<StockDetail> = lines
            .iter()
            .map(|line| StockDetail::from_line(line, &siret, link.venue_id))
            .collect();

        let lookups = self.repository.load_lookups(&details, link.venue_id).await?;
        let plan = plan_stock_sync(&details, &lookups, link.venue_id, link.provider_id);
        let report = StockSyncReport::for_plan(&plan);
        if plan.is_empty() {
            info!(venue_id = %link.venue_id, lines = lines.len(), "nothing to synchronise");
            return Ok(report);
        }

        let created_offer_ids = self.repository.apply_plan(&plan, link.provider_id).await?;
        let mut to_reindex: Vec<OfferId> = plan.offers_to_reindex.iter().copied().collect();
        to_reindex.extend(created_offer_ids);
        to_reindex.sort_unstable();
        to_reindex.dedup();
        self.reindex(&to_reindex).await;

        info!(
            venue_id = %link.venue_id,
            provider_id = %link.provider_id,
            lines = lines.len(),
            new_offers = report.new_offers,
            new_stocks = report.new_stocks,
            updated_stocks = report.updated_stocks,
            "venue stocks synchronised"
        );
        Ok(report)
    }

    /// Synchronise every active venue of a provider. A failing venue is
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails only when the venues cannot be listed.
    pub async fn synchronize_provider(
        &self,
        provider_id: ProviderId,
    ) -> Result<StockSyncReport, SyncError> {
        let links = self
            .repository
            .list_active_venue_providers(provider_id)
            .await?;
        let mut total = StockSyncReport::default();
        let mut failures = 0_usize;
        for link in &links {
            match self.synchronize_venue_stocks(link).await {
                Ok(report) => total = total.merge(report),
                Err(err) => {
                    failures += 1;
                    error!(
                        provider_id = %provider_id,
                        venue_id = %link.venue_id,
                        error = %err,
                        "venue synchronisation failed"
                    );
                }
            }
        }
        info!(
            provider_id = %provider_id,
            venues = links.len(),
            failures,
            new_offers = total.new_offers,
            new_stocks = total.new_stocks,
            updated_stocks = total.updated_stocks,
            "provider synchronised"
        );
        Ok(total)
    }

    async fn fetch_all_lines(
        &self,
        link: &VenueProviderLink,
    ) -> Result<Vec<ProviderStockLine>, SyncError> {
        let mut lines = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.source.fetch_page(link, cursor.take()).await?;
            lines.extend(page.lines);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(lines)
    }

    async fn reindex(&self, offer_ids: &[OfferId]) {
        if offer_ids.is_empty() {
            return;
        }
        if let Err(err) = self
            .indexer
            .index_offer_ids(offer_ids, IndexationReason::StockSynchronization)
            .await
        {
            warn!(error = %err, offers = offer_ids.len(), "offer reindexing not queued");
        }
    }
}

fn venue_siret(link: &VenueProviderLink) -> Result<Siret, SyncError> {
    let raw = link
        .venue_id_at_offer_provider
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(SyncError::NoSiretSpecified {
            venue_id: link.venue_id,
        })?;
    Siret::parse(raw).map_err(|source| SyncError::VenueSiretNotRegistered {
        venue_id: link.venue_id,
        siret: raw.to_owned(),
        source,
    })
}

#[cfg(test)]
#[path = "catalogue_sync_service_tests.rs"]
mod tests;
