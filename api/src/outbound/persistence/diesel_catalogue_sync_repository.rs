//! PostgreSQL-backed reads and writes of provider stock synchronisation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::domain::catalogue_sync::{
    ExistingStock, OfferRef, Product, StockDetail, StockSyncPlan, SyncLookups, VenueProviderLink,
};
use crate::domain::offer::OfferValidation;
use crate::domain::ports::{CatalogueSyncRepository, CatalogueSyncRepositoryError};
use crate::domain::{Cents, OfferId, ProductId, ProviderId, StockId, VenueId};

use super::diesel_helpers::{
    count_for_db, count_from_db, map_basic_diesel_error, map_basic_pool_error,
};
use super::models::{NewOfferRow, NewStockRow};
use super::pool::{DbPool, PoolError};
use super::schema::{offer, product, stock, venue_provider};

/// Diesel-backed implementation of [`CatalogueSyncRepository`].
#[derive(Clone)]
pub struct DieselCatalogueSyncRepository {
    pool: DbPool,
}

impl DieselCatalogueSyncRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Failures carried out of the plan transaction.
#[derive(Debug)]
enum PlanWriteError {
    Diesel(diesel::result::Error),
    UnplannedOffer(String),
}

impl From<diesel::result::Error> for PlanWriteError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

fn map_pool_error(error: PoolError) -> CatalogueSyncRepositoryError {
    map_basic_pool_error(error, CatalogueSyncRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> CatalogueSyncRepositoryError {
    map_basic_diesel_error(
        error,
        CatalogueSyncRepositoryError::query,
        CatalogueSyncRepositoryError::connection,
    )
}

fn map_plan_error(error: PlanWriteError) -> CatalogueSyncRepositoryError {
    match error {
        PlanWriteError::Diesel(error) => map_diesel_error(error),
        PlanWriteError::UnplannedOffer(reference) => CatalogueSyncRepositoryError::query(format!(
            "stock refers to offer {reference:?} missing from the plan"
        )),
    }
}

async fn offers_by_reference(
    conn: &mut AsyncPgConnection,
    venue_id: i64,
    references: &[String],
) -> Result<HashMap<String, OfferId>, diesel::result::Error> {
    let rows: Vec<(i64, Option<String>)> = offer::table
        .filter(offer::venue_id.eq(venue_id))
        .filter(offer::id_at_provider.eq_any(references))
        .select((offer::id, offer::id_at_provider))
        .load(conn)
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, reference)| reference.map(|reference| (reference, OfferId::new(id))))
        .collect())
}

async fn apply_plan_in(
    conn: &mut AsyncPgConnection,
    plan: &StockSyncPlan,
    provider_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<OfferId>, PlanWriteError> {
    if !plan.relinked_offer_ids.is_empty() {
        let relinked: Vec<i64> = plan.relinked_offer_ids.iter().map(|id| id.get()).collect();
        diesel::update(offer::table.filter(offer::id.eq_any(&relinked)))
            .set((
                offer::last_provider_id.eq(Some(provider_id)),
                offer::date_modified.eq(now),
            ))
            .execute(conn)
            .await?;
    }

    let mut created: HashMap<String, i64> = HashMap::new();
    if !plan.new_offers.is_empty() {
        let rows: Vec<NewOfferRow<'_>> = plan
            .new_offers
            .iter()
            .map(|new_offer| NewOfferRow {
                venue_id: new_offer.venue_id.get(),
                product_id: Some(new_offer.product_id.get()),
                subcategory_id: new_offer.subcategory_id.as_str(),
                name: new_offer.name.as_str(),
                is_duo: false,
                is_active: true,
                validation: OfferValidation::Approved.as_str(),
                ean: new_offer.ean.as_deref(),
                last_provider_id: Some(new_offer.last_provider_id.get()),
                id_at_provider: Some(new_offer.id_at_provider.as_str()),
                date_created: now,
                date_modified: now,
            })
            .collect();
        let inserted: Vec<(i64, Option<String>)> = diesel::insert_into(offer::table)
            .values(&rows)
            .returning((offer::id, offer::id_at_provider))
            .get_results(conn)
            .await?;
        created.extend(
            inserted
                .into_iter()
                .filter_map(|(id, reference)| reference.map(|reference| (reference, id))),
        );
    }

    for update in &plan.stock_updates {
        diesel::update(stock::table.find(update.stock_id.get()))
            .set((
                stock::quantity.eq(Some(count_for_db(update.quantity))),
                stock::raw_provider_quantity.eq(Some(count_for_db(update.raw_provider_quantity))),
                stock::price_cents.eq(update.price.get()),
                stock::last_provider_id.eq(Some(provider_id)),
                stock::date_modified.eq(now),
            ))
            .execute(conn)
            .await?;
    }

    if !plan.new_stocks.is_empty() {
        let mut rows = Vec::with_capacity(plan.new_stocks.len());
        for new_stock in &plan.new_stocks {
            let offer_id = match &new_stock.offer {
                OfferRef::Existing(offer_id) => offer_id.get(),
                OfferRef::New(reference) => *created
                    .get(reference)
                    .ok_or_else(|| PlanWriteError::UnplannedOffer(reference.clone()))?,
            };
            rows.push(NewStockRow {
                offer_id,
                price_cents: new_stock.price.get(),
                quantity: Some(count_for_db(new_stock.quantity)),
                dn_booked_quantity: 0,
                is_soft_deleted: false,
                id_at_providers: Some(new_stock.id_at_providers.as_str()),
                raw_provider_quantity: Some(count_for_db(new_stock.quantity)),
                last_provider_id: Some(provider_id),
                date_modified: now,
            });
        }
        diesel::insert_into(stock::table)
            .values(&rows)
            .execute(conn)
            .await?;
    }

    let mut created_ids: Vec<OfferId> = created.into_values().map(OfferId::new).collect();
    created_ids.sort_unstable();
    Ok(created_ids)
}

#[async_trait::async_trait]
impl CatalogueSyncRepository for DieselCatalogueSyncRepository {
    async fn list_active_venue_providers(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<VenueProviderLink>, CatalogueSyncRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(i64, i64, Option<String>)> = venue_provider::table
            .filter(venue_provider::provider_id.eq(provider_id.get()))
            .filter(venue_provider::is_active.eq(true))
            .order(venue_provider::venue_id.asc())
            .select((
                venue_provider::venue_id,
                venue_provider::provider_id,
                venue_provider::venue_id_at_offer_provider,
            ))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows
            .into_iter()
            .map(
                |(venue_id, provider_id, venue_id_at_offer_provider)| VenueProviderLink {
                    venue_id: VenueId::new(venue_id),
                    provider_id: ProviderId::new(provider_id),
                    venue_id_at_offer_provider,
                },
            )
            .collect())
    }

    async fn load_lookups(
        &self,
        details: &[StockDetail],
        venue_id: VenueId,
    ) -> Result<SyncLookups, CatalogueSyncRepositoryError> {
        let product_refs: Vec<String> = details
            .iter()
            .map(|detail| detail.products_provider_reference.clone())
            .collect();
        let offer_refs: Vec<String> = details
            .iter()
            .map(|detail| detail.offers_provider_reference.clone())
            .collect();
        let venue_refs: Vec<String> = details
            .iter()
            .map(|detail| detail.venue_reference.clone())
            .collect();
        let stock_refs: Vec<String> = details
            .iter()
            .map(|detail| detail.stocks_provider_reference.clone())
            .collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let product_rows: Vec<(i64, String, String, Option<String>)> = product::table
            .filter(product::ean.eq_any(&product_refs))
            .select((
                product::id,
                product::name,
                product::subcategory_id,
                product::ean,
            ))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let products = product_rows
            .into_iter()
            .filter_map(|(id, name, subcategory_id, ean)| {
                let reference = ean.clone()?;
                Some((
                    reference,
                    Product {
                        id: ProductId::new(id),
                        name,
                        subcategory_id,
                        ean,
                    },
                ))
            })
            .collect();

        let offers_by_provider_reference =
            offers_by_reference(&mut conn, venue_id.get(), &offer_refs)
                .await
                .map_err(map_diesel_error)?;
        let offers_by_venue_reference = offers_by_reference(&mut conn, venue_id.get(), &venue_refs)
            .await
            .map_err(map_diesel_error)?;

        let stock_rows: Vec<(i64, i64, i64, Option<i32>, i32, Option<String>)> = stock::table
            .filter(stock::id_at_providers.eq_any(&stock_refs))
            .filter(stock::is_soft_deleted.eq(false))
            .select((
                stock::id,
                stock::offer_id,
                stock::price_cents,
                stock::quantity,
                stock::dn_booked_quantity,
                stock::id_at_providers,
            ))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let stocks_by_provider_reference = stock_rows
            .into_iter()
            .filter_map(|(id, offer_id, price_cents, quantity, booked, reference)| {
                Some((
                    reference?,
                    ExistingStock {
                        id: StockId::new(id),
                        offer_id: OfferId::new(offer_id),
                        price: Cents::new(price_cents),
                        quantity: quantity.map(count_from_db),
                        booked_quantity: count_from_db(booked),
                    },
                ))
            })
            .collect();

        Ok(SyncLookups {
            products,
            offers_by_provider_reference,
            offers_by_venue_reference,
            stocks_by_provider_reference,
        })
    }

    async fn apply_plan(
        &self,
        plan: &StockSyncPlan,
        provider_id: ProviderId,
    ) -> Result<Vec<OfferId>, CatalogueSyncRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let now = Utc::now();
        let provider_id = provider_id.get();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let applied: Result<Vec<OfferId>, PlanWriteError> = conn
            .transaction(|conn| {
                async move { apply_plan_in(conn, plan, provider_id, now).await }.scope_boxed()
            })
            .await;
        applied.map_err(map_plan_error)
    }
}
