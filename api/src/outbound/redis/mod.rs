//! Redis-backed signal adapters.
//!
//! Both adapters share one `bb8-redis` pool. Keys are namespaced so the
//! indexing and notification workers reading them can evolve separately:
//!
//! - `search:algolia:offer-ids` is a set of offer ids awaiting reindexing.
//! - `pcapi:queue:notifications` is a list of JSON notification jobs.

mod notification_queue;
mod offer_indexer;

use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection};

pub use notification_queue::{NOTIFICATION_QUEUE_KEY, RedisNotificationQueue};
pub use offer_indexer::{OFFER_IDS_KEY, RedisOfferIndexer};

/// Errors raised while building the Redis pool or checking out a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedisPoolError {
    /// The pool could not be built.
    #[error("failed to build redis pool: {message}")]
    Build {
        /// Underlying failure.
        message: String,
    },

    /// No connection could be checked out.
    #[error("failed to get redis connection: {message}")]
    Checkout {
        /// Underlying failure.
        message: String,
    },
}

/// Pool of multiplexed Redis connections.
#[derive(Clone)]
pub struct RedisPool {
    inner: Pool<RedisConnectionManager>,
}

impl RedisPool {
    /// Build a pool for `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RedisPoolError::Build`] when the URL is invalid or the
    /// first connection cannot be opened.
    pub async fn new(redis_url: &str) -> Result<Self, RedisPoolError> {
        let manager = RedisConnectionManager::new(redis_url).map_err(|err| {
            RedisPoolError::Build {
                message: err.to_string(),
            }
        })?;
        let inner = Pool::builder()
            .max_size(4)
            .build(manager)
            .await
            .map_err(|err| RedisPoolError::Build {
                message: err.to_string(),
            })?;
        Ok(Self { inner })
    }

    pub(crate) async fn get(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, RedisPoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| RedisPoolError::Checkout {
                message: err.to_string(),
            })
    }
}
