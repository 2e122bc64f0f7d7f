//! Notification jobs pushed onto a Redis list.

use std::sync::Arc;

use async_trait::async_trait;
use bb8_redis::redis;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::notification::Notification;
use crate::domain::ports::{JobDispatchError, NotificationQueue};

use super::RedisPool;

/// List the notification workers pop jobs from.
pub const NOTIFICATION_QUEUE_KEY: &str = "pcapi:queue:notifications";

/// Envelope stored for each job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueuedNotification<'a> {
    id: Uuid,
    enqueued_at: DateTime<Utc>,
    notification: &'a Notification,
}

fn encode(
    notification: &Notification,
    id: Uuid,
    enqueued_at: DateTime<Utc>,
) -> Result<String, JobDispatchError> {
    serde_json::to_string(&QueuedNotification {
        id,
        enqueued_at,
        notification,
    })
    .map_err(|err| JobDispatchError::rejected(err.to_string()))
}

/// Redis implementation of [`NotificationQueue`].
#[derive(Clone)]
pub struct RedisNotificationQueue {
    pool: RedisPool,
    clock: Arc<dyn Clock>,
}

impl RedisNotificationQueue {
    /// Create a queue writing through `pool`.
    pub fn new(pool: RedisPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl NotificationQueue for RedisNotificationQueue {
    async fn enqueue(&self, notification: &Notification) -> Result<(), JobDispatchError> {
        let id = Uuid::new_v4();
        let payload = encode(notification, id, self.clock.utc())?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| JobDispatchError::unavailable(err.to_string()))?;
        let length: i64 = redis::cmd("RPUSH")
            .arg(NOTIFICATION_QUEUE_KEY)
            .arg(payload)
            .query_async(&mut *conn)
            .await
            .map_err(|err| JobDispatchError::unavailable(err.to_string()))?;
        debug!(%id, kind = notification.kind(), queue_length = length, "notification queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;
    use crate::domain::{BookingId, UserId};

    #[rstest]
    fn envelope_wraps_the_tagged_notification() {
        let id = Uuid::nil();
        let at = Utc
            .with_ymd_and_hms(2024, 3, 1, 8, 0, 0)
            .single()
            .expect("valid timestamp");
        let notification = Notification::ExpiredBookingsToBeneficiary {
            user_id: UserId::new(7),
            booking_ids: vec![BookingId::new(1), BookingId::new(3)],
        };

        let encoded = encode(&notification, id, at).expect("serialisable");
        let value: Value = serde_json::from_str(&encoded).expect("valid json");

        assert_eq!(value["id"], json!("00000000-0000-0000-0000-000000000000"));
        assert_eq!(value["enqueuedAt"], json!("2024-03-01T08:00:00Z"));
        assert_eq!(
            value["notification"]["kind"],
            json!("expired_bookings_to_beneficiary")
        );
        assert_eq!(value["notification"]["booking_ids"], json!([1, 3]));
    }
}
