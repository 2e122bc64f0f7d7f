//! Run the scheduled booking jobs and provider stock synchronisation.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;

use pcapi::config::{JobSettings, PcapiSettings};
use pcapi::domain::catalogue_sync::{StockSyncReport, VenueProviderLink};
use pcapi::domain::{BookingJobs, BookingJobsPorts, CatalogueSyncService, ProviderId, StockId, VenueId};
use pcapi::logging::init_tracing;
use pcapi::outbound::persistence::{
    DbPool, DieselBookingHousekeepingRepository, DieselCatalogueSyncRepository,
    DieselCollectiveBookingRepository, PoolConfig,
};
use pcapi::outbound::redis::{RedisNotificationQueue, RedisOfferIndexer, RedisPool};
use pcapi::outbound::stock_file_source::StockFileSource;

/// `pcapi-jobs` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pcapi-jobs",
    about = "Run pass Culture booking maintenance jobs",
    version
)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Cancel confirmed bookings past their withdrawal deadline.
    CancelExpiredBookings {
        /// Bookings per transaction. Defaults to the configured size.
        #[arg(long = "batch-size", value_name = "n")]
        batch_size: Option<usize>,
    },
    /// Tell beneficiaries and offerers which bookings expired on a day.
    NotifyExpiredBookings {
        /// Day the bookings expired. Defaults to today.
        #[arg(long = "date", value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },
    /// Warn beneficiaries whose bookings expire soon.
    NotifySoonToBeExpiredBookings {
        /// Reference day. Defaults to today.
        #[arg(long = "date", value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },
    /// Mark bookings used 48 hours after their event began.
    AutoMarkUsed,
    /// Recompute booked quantities of stocks from their bookings.
    RecomputeBookedQuantity {
        /// Stock to recompute. Repeat for several stocks.
        #[arg(long = "stock-id", value_name = "id", required = true)]
        stock_ids: Vec<i64>,
    },
    /// Flag old digital bookings as ended.
    ArchiveOldBookings,
    /// Synchronise stocks from a provider feed file.
    SyncVenueStocks {
        /// Provider feeding the venues.
        #[arg(long = "provider-id", value_name = "id")]
        provider_id: i64,
        /// Single venue to synchronise. All active venues otherwise.
        #[arg(long = "venue-id", value_name = "id", requires = "siret")]
        venue_id: Option<i64>,
        /// SIRET of the venue at the provider.
        #[arg(long = "siret", value_name = "siret", requires = "venue_id")]
        siret: Option<String>,
        /// JSON-lines feed exported by the provider.
        #[arg(long = "file", value_name = "path")]
        file: PathBuf,
    },
}

fn main() -> io::Result<()> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::try_parse().map_err(io::Error::other)?;
    let settings = PcapiSettings::load_from_iter([OsString::from("pcapi-jobs")])
        .map_err(|error| io::Error::other(format!("load settings: {error}")))?
        .validate()
        .map_err(io::Error::other)?;
    init_tracing(settings.log_format);

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let pool = DbPool::new(PoolConfig::new(&settings.database_url))
        .await
        .map_err(|error| io::Error::other(format!("create database pool: {error}")))?;
    let redis = RedisPool::new(&settings.redis_url)
        .await
        .map_err(|error| io::Error::other(format!("create redis pool: {error}")))?;

    match args.command {
        Command::SyncVenueStocks {
            provider_id,
            venue_id,
            siret,
            file,
        } => {
            let service = CatalogueSyncService::new(
                Arc::new(DieselCatalogueSyncRepository::new(pool)),
                Arc::new(StockFileSource::new(file)),
                Arc::new(RedisOfferIndexer::new(redis)),
            );
            let provider_id = ProviderId::new(provider_id);
            let report = match venue_id {
                Some(venue_id) => {
                    let link = VenueProviderLink {
                        venue_id: VenueId::new(venue_id),
                        provider_id,
                        venue_id_at_offer_provider: siret,
                    };
                    service.synchronize_venue_stocks(&link).await
                }
                None => service.synchronize_provider(provider_id).await,
            }
            .map_err(|error| io::Error::other(format!("stock synchronisation failed: {error}")))?;
            print_sync_report(&report);
        }
        command => {
            let jobs = booking_jobs(&settings, pool, redis, Arc::clone(&clock));
            let today = clock.utc().date_naive();
            run_booking_job(&jobs, command, &settings, today).await?;
        }
    }

    Ok(())
}

fn booking_jobs(
    settings: &JobSettings,
    pool: DbPool,
    redis: RedisPool,
    clock: Arc<dyn Clock>,
) -> BookingJobs {
    let ports = BookingJobsPorts {
        housekeeping: Arc::new(DieselBookingHousekeepingRepository::new(pool.clone())),
        collective_bookings: Arc::new(DieselCollectiveBookingRepository::new(pool)),
        notifications: Arc::new(RedisNotificationQueue::new(redis, Arc::clone(&clock))),
    };
    BookingJobs::new(ports, clock, settings.update_booking_used)
}

async fn run_booking_job(
    jobs: &BookingJobs,
    command: Command,
    settings: &JobSettings,
    today: NaiveDate,
) -> io::Result<()> {
    let failed = |error: pcapi::domain::Error| io::Error::other(format!("job failed: {error}"));
    match command {
        Command::CancelExpiredBookings { batch_size } => {
            let report = jobs
                .cancel_expired_bookings(batch_size.unwrap_or(settings.expiry_batch_size))
                .await
                .map_err(failed)?;
            println!("cancelled={}", report.cancelled);
            println!("failed_batches={}", report.failed_batches);
            println!("touched_stocks={}", report.touched_stocks.len());
        }
        Command::NotifyExpiredBookings { date } => {
            let day = date.unwrap_or(today);
            let users = jobs
                .notify_users_of_expired_bookings(day)
                .await
                .map_err(failed)?;
            let offerers = jobs
                .notify_offerers_of_expired_bookings(day)
                .await
                .map_err(failed)?;
            println!("date={day}");
            println!("beneficiary_notifications={users}");
            println!("offerer_notifications={offerers}");
        }
        Command::NotifySoonToBeExpiredBookings { date } => {
            let day = date.unwrap_or(today);
            let sent = jobs
                .notify_soon_to_be_expired_bookings(day)
                .await
                .map_err(failed)?;
            println!("date={day}");
            println!("notifications={sent}");
        }
        Command::AutoMarkUsed => {
            let report = jobs.auto_mark_as_used_after_event().await.map_err(failed)?;
            println!("individual_bookings={}", report.individual);
            println!("collective_bookings={}", report.collective);
        }
        Command::RecomputeBookedQuantity { stock_ids } => {
            let stock_ids: Vec<StockId> = stock_ids.into_iter().map(StockId::new).collect();
            let updated = jobs
                .recompute_dn_booked_quantity(&stock_ids)
                .await
                .map_err(failed)?;
            println!("updated_stocks={updated}");
        }
        Command::ArchiveOldBookings => {
            let archived = jobs.archive_old_bookings().await.map_err(failed)?;
            println!("archived_bookings={archived}");
        }
        Command::SyncVenueStocks { .. } => {
            return Err(io::Error::other("stock synchronisation is not a booking job"));
        }
    }
    Ok(())
}

fn print_sync_report(report: &StockSyncReport) {
    println!("new_offers={}", report.new_offers);
    println!("new_stocks={}", report.new_stocks);
    println!("updated_stocks={}", report.updated_stocks);
}
