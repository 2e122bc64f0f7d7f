//! Offer reindexing signals stored in a Redis set.

use async_trait::async_trait;
use bb8_redis::redis;
use tracing::debug;

use crate::domain::OfferId;
use crate::domain::indexing::IndexationReason;
use crate::domain::ports::{OfferIndexer, OfferIndexerError};

use super::RedisPool;

/// Set of offer ids the indexing worker drains.
pub const OFFER_IDS_KEY: &str = "search:algolia:offer-ids";

/// Redis implementation of [`OfferIndexer`].
#[derive(Clone)]
pub struct RedisOfferIndexer {
    pool: RedisPool,
}

impl RedisOfferIndexer {
    /// Create an indexer writing through `pool`.
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

fn raw_ids(offer_ids: &[OfferId]) -> Vec<i64> {
    let mut ids: Vec<i64> = offer_ids.iter().map(|id| id.get()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[async_trait]
impl OfferIndexer for RedisOfferIndexer {
    async fn index_offer_ids(
        &self,
        offer_ids: &[OfferId],
        reason: IndexationReason,
    ) -> Result<(), OfferIndexerError> {
        if offer_ids.is_empty() {
            return Ok(());
        }
        let ids = raw_ids(offer_ids);
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| OfferIndexerError::unavailable(err.to_string()))?;
        let added: i64 = redis::cmd("SADD")
            .arg(OFFER_IDS_KEY)
            .arg(&ids)
            .query_async(&mut *conn)
            .await
            .map_err(|err| OfferIndexerError::unavailable(err.to_string()))?;
        debug!(
            requested = ids.len(),
            added,
            reason = reason.as_str(),
            "offers queued for reindexing"
        );
        Ok(())
    }
}
