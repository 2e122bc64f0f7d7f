//! Port signalling offers that the search index must refresh.

use async_trait::async_trait;

use crate::domain::OfferId;
use crate::domain::indexing::IndexationReason;

use super::define_port_error;

define_port_error! {
    /// Errors raised by indexing adapters.
    pub enum OfferIndexerError {
        /// The signal backend is unavailable.
        Unavailable { message: String } =>
            "offer indexer is unavailable: {message}",
    }
}

/// Port for queuing offers for reindexing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OfferIndexer: Send + Sync {
    /// Queue offers for asynchronous reindexing.
    async fn index_offer_ids(
        &self,
        offer_ids: &[OfferId],
        reason: IndexationReason,
    ) -> Result<(), OfferIndexerError>;
}

/// Indexer that drops every signal, for jobs run without search.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOfferIndexer;

#[async_trait]
impl OfferIndexer for NoopOfferIndexer {
    async fn index_offer_ids(
        &self,
        _offer_ids: &[OfferId],
        _reason: IndexationReason,
    ) -> Result<(), OfferIndexerError> {
        Ok(())
    }
}
