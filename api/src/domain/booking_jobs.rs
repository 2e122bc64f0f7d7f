//! Scheduled booking maintenance.
//!
//! Each job is one method on [`BookingJobs`], run from the `pcapi-jobs`
//! binary. Jobs work on sets of bookings through the housekeeping port and
//! report counts so the caller can print a summary.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use mockable::Clock;
use tracing::{error, info, warn};

use crate::domain::booking::{
    ARCHIVE_DELAY, AUTO_USE_AFTER_EVENT_TIME_DELAY, Booking, expiry_cutoffs,
    soon_to_expire_windows,
};
use crate::domain::notification::Notification;
use crate::domain::ports::{
    BookingHousekeepingError, BookingHousekeepingRepository, CollectiveBookingRepository,
    CollectiveBookingRepositoryError, ExpiryQuery, NotificationQueue,
    SoonToExpireQuery,
};
use crate::domain::subcategory::{self, Subcategory};
use crate::domain::{BookingId, Error, StockId};

fn map_housekeeping_error(error: BookingHousekeepingError) -> Error {
    match error {
        BookingHousekeepingError::Connection { message } => {
            Error::service_unavailable(format!("booking housekeeping unavailable: {message}"))
        }
        BookingHousekeepingError::Query { message } => {
            Error::internal(format!("booking housekeeping error: {message}"))
        }
    }
}

fn map_collective_repository_error(error: CollectiveBookingRepositoryError) -> Error {
    match error {
        CollectiveBookingRepositoryError::Connection { message } => Error::service_unavailable(
            format!("collective booking repository unavailable: {message}"),
        ),
        CollectiveBookingRepositoryError::Query { message } => {
            Error::internal(format!("collective booking repository error: {message}"))
        }
    }
}

fn book_subcategory_ids() -> Vec<&'static str> {
    subcategory::ids_where(|sub: &Subcategory| sub.can_expire && sub.is_book)
}

fn other_expirable_subcategory_ids() -> Vec<&'static str> {
    subcategory::ids_where(|sub: &Subcategory| sub.can_expire && !sub.is_book)
}

fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    (start, start + Duration::days(1))
}

/// Outcome of [`BookingJobs::cancel_expired_bookings`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiredBookingsReport {
    /// Bookings cancelled as expired.
    pub cancelled: usize,
    /// Batches that failed and were skipped.
    pub failed_batches: usize,
    /// Stocks whose booked quantity was recomputed.
    pub touched_stocks: BTreeSet<StockId>,
}

/// Outcome of [`BookingJobs::auto_mark_as_used_after_event`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoUseReport {
    /// Individual bookings marked as used.
    pub individual: usize,
    /// Collective bookings marked as used.
    pub collective: usize,
}

/// Port bundle required by [`BookingJobs`].
#[derive(Clone)]
pub struct BookingJobsPorts {
    /// Set-based booking maintenance.
    pub housekeeping: Arc<dyn BookingHousekeepingRepository>,
    /// Collective booking maintenance.
    pub collective_bookings: Arc<dyn CollectiveBookingRepository>,
    /// Notification job queue.
    pub notifications: Arc<dyn NotificationQueue>,
}

/// Scheduled booking jobs.
#[derive(Clone)]
pub struct BookingJobs {
    ports: BookingJobsPorts,
    clock: Arc<dyn Clock>,
    update_booking_used: bool,
}

impl BookingJobs {
    /// Build the jobs. `update_booking_used` gates
    /// [`Self::auto_mark_as_used_after_event`].
    pub fn new(ports: BookingJobsPorts, clock: Arc<dyn Clock>, update_booking_used: bool) -> Self {
        Self {
            ports,
            clock,
            update_booking_used,
        }
    }

    /// Cancel confirmed bookings nobody collected in time.
    ///
    /// Paper books expire 10 days after booking, other expirable goods 30
    /// days after. Bookings are cancelled `batch_size` at a time; a failed
    /// batch is logged and the job moves on.
    ///
    /// # Errors
    ///
    /// Fails on a zero batch size or when expiring bookings cannot be
    /// listed.
    pub async fn cancel_expired_bookings(
        &self,
        batch_size: usize,
    ) -> Result<ExpiredBookingsReport, Error> {
        if batch_size == 0 {
            return Err(Error::invalid_request("batch size must be positive"));
        }
        let now = self.clock.utc();
        let query = ExpiryQuery {
            cutoffs: expiry_cutoffs(now),
            book_subcategory_ids: book_subcategory_ids(),
            other_expirable_subcategory_ids: other_expirable_subcategory_ids(),
        };
        let ids = self
            .ports
            .housekeeping
            .find_expiring_booking_ids(&query)
            .await
            .map_err(map_housekeeping_error)?;
        info!(total = ids.len(), batch_size, "cancelling expired bookings");

        let mut report = ExpiredBookingsReport::default();
        for (index, batch) in ids.chunks(batch_size).enumerate() {
            match self.ports.housekeeping.cancel_expired_batch(batch, now).await {
                Ok(outcome) => {
                    report.cancelled += outcome.cancelled;
                    report.touched_stocks.extend(outcome.stock_ids);
                    info!(
                        batch = index + 1,
                        cancelled = outcome.cancelled,
                        total_cancelled = report.cancelled,
                        "expired bookings batch cancelled"
                    );
                }
                Err(err) => {
                    report.failed_batches += 1;
                    error!(
                        batch = index + 1,
                        first_booking_id = batch.first().map(|id| id.get()),
                        error = %err,
                        "expired bookings batch failed"
                    );
                }
            }
        }

        info!(
            cancelled = report.cancelled,
            failed_batches = report.failed_batches,
            stocks = report.touched_stocks.len(),
            "expired bookings cancelled"
        );
        Ok(report)
    }

    /// Tell each beneficiary which of their bookings expired on
    /// `expired_on`. Returns the number of notifications queued.
    ///
    /// # Errors
    ///
    /// Fails when expired bookings cannot be listed.
    pub async fn notify_users_of_expired_bookings(
        &self,
        expired_on: NaiveDate,
    ) -> Result<usize, Error> {
        let bookings = self.expired_on(expired_on).await?;
        let notifications = group_booking_ids(&bookings, |booking| booking.user_id)
            .into_iter()
            .map(|(user_id, booking_ids)| Notification::ExpiredBookingsToBeneficiary {
                user_id,
                booking_ids,
            });
        let sent = self.enqueue_all(notifications).await;
        info!(%expired_on, sent, "beneficiaries notified of expired bookings");
        Ok(sent)
    }

    /// Tell each offerer which of their bookings expired on `expired_on`.
    /// Returns the number of notifications queued.
    ///
    /// # Errors
    ///
    /// Fails when expired bookings cannot be listed.
    pub async fn notify_offerers_of_expired_bookings(
        &self,
        expired_on: NaiveDate,
    ) -> Result<usize, Error> {
        let bookings = self.expired_on(expired_on).await?;
        let notifications = group_booking_ids(&bookings, |booking| booking.offerer_id)
            .into_iter()
            .map(|(offerer_id, booking_ids)| Notification::ExpiredBookingsToOfferer {
                offerer_id,
                booking_ids,
            });
        let sent = self.enqueue_all(notifications).await;
        info!(%expired_on, sent, "offerers notified of expired bookings");
        Ok(sent)
    }

    /// Warn beneficiaries whose bookings expire soon: 5 days ahead for
    /// books, 7 days ahead for other goods.
    ///
    /// # Errors
    ///
    /// Fails when bookings cannot be listed.
    pub async fn notify_soon_to_be_expired_bookings(
        &self,
        given_date: NaiveDate,
    ) -> Result<usize, Error> {
        let (books_window, others_window) = soon_to_expire_windows(given_date);
        let query = SoonToExpireQuery {
            books_window,
            others_window,
            book_subcategory_ids: book_subcategory_ids(),
            other_expirable_subcategory_ids: other_expirable_subcategory_ids(),
        };
        let bookings = self
            .ports
            .housekeeping
            .list_soon_to_expire(&query)
            .await
            .map_err(map_housekeeping_error)?;
        let notifications = group_booking_ids(&bookings, |booking| booking.user_id)
            .into_iter()
            .map(
                |(user_id, booking_ids)| Notification::SoonToBeExpiredBookingsToBeneficiary {
                    user_id,
                    booking_ids,
                },
            );
        let sent = self.enqueue_all(notifications).await;
        info!(%given_date, sent, "beneficiaries warned of soon to be expired bookings");
        Ok(sent)
    }

    /// Mark as used the confirmed bookings of events that began more than
    /// 48 hours ago, individual and collective alike.
    ///
    /// # Errors
    ///
    /// Fails with `Forbidden` when the `update_booking_used` toggle is off,
    /// or when a repository fails.
    pub async fn auto_mark_as_used_after_event(&self) -> Result<AutoUseReport, Error> {
        if !self.update_booking_used {
            return Err(Error::forbidden(
                "automatic use of bookings is behind a deactivated feature toggle",
            ));
        }
        let now = self.clock.utc();
        let threshold = now - AUTO_USE_AFTER_EVENT_TIME_DELAY;

        // Both writes record the BookingUsed finance events themselves.
        let individual = self
            .ports
            .housekeeping
            .mark_event_bookings_used(threshold, now)
            .await
            .map_err(map_housekeeping_error)?;
        let collective = self
            .ports
            .collective_bookings
            .mark_used_after_event(threshold, now)
            .await
            .map_err(map_collective_repository_error)?;
        for booking in &collective {
            info!(
                target: "data",
                event_name = "BookingUsed",
                booking_id = %booking.id,
                stock_id = booking.collective_stock_id,
                "collective booking used"
            );
        }

        let report = AutoUseReport {
            individual: individual.len(),
            collective: collective.len(),
        };
        info!(
            date_used = %now,
            individual_bookings_updated = report.individual,
            collective_bookings_updated = report.collective,
            "automatically marked bookings as used after event"
        );
        Ok(report)
    }

    /// Reset stock counters from their live bookings.
    ///
    /// # Errors
    ///
    /// Fails when the update fails.
    pub async fn recompute_dn_booked_quantity(&self, stock_ids: &[StockId]) -> Result<usize, Error> {
        if stock_ids.is_empty() {
            return Ok(0);
        }
        let updated = self
            .ports
            .housekeeping
            .recompute_dn_booked_quantity(stock_ids)
            .await
            .map_err(map_housekeeping_error)?;
        info!(requested = stock_ids.len(), updated, "recomputed booked quantities");
        Ok(updated)
    }

    /// Flag activation code and subscription bookings older than 30 days
    /// as ended.
    ///
    /// # Errors
    ///
    /// Fails when the update fails.
    pub async fn archive_old_bookings(&self) -> Result<usize, Error> {
        let created_before = self.clock.utc() - ARCHIVE_DELAY;
        let display_even_if_used = subcategory::ids_where(|sub| sub.display_even_if_used);
        let archived = self
            .ports
            .housekeeping
            .archive_bookings(created_before, &display_even_if_used)
            .await
            .map_err(map_housekeeping_error)?;
        info!(archived_bookings = archived, "old bookings archived");
        Ok(archived)
    }

    async fn expired_on(&self, day: NaiveDate) -> Result<Vec<Booking>, Error> {
        let (start, end) = day_bounds(day);
        self.ports
            .housekeeping
            .list_expired_between(start, end)
            .await
            .map_err(map_housekeeping_error)
    }

    async fn enqueue_all(&self, notifications: impl IntoIterator<Item = Notification>) -> usize {
        let mut sent = 0;
        for notification in notifications {
            match self.ports.notifications.enqueue(&notification).await {
                Ok(()) => sent += 1,
                Err(err) => warn!(error = %err, kind = notification.kind(), "notification not queued"),
            }
        }
        sent
    }
}

fn group_booking_ids<K: Ord>(
    bookings: &[Booking],
    key: impl Fn(&Booking) -> K,
) -> BTreeMap<K, Vec<BookingId>> {
    let mut groups: BTreeMap<K, Vec<BookingId>> = BTreeMap::new();
    for booking in bookings {
        groups.entry(key(booking)).or_default().push(booking.id);
    }
    groups
}

#[cfg(test)]
#[path = "booking_jobs_tests.rs"]
mod tests;
