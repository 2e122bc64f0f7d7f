//! Planning of provider stock synchronisation.
//!
//! Providers (bookshop and cinema software) report, per venue, how many
//! units of each product they hold and at which price. Planning turns a
//! batch of such lines into the offers and stocks to create or update. It
//! is a pure function of the provider lines and what the database already
//! holds, so adapters only have to read lookups and write the plan.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::offer::validate_stock_price;
use crate::domain::siren::Siret;
use crate::domain::{Cents, OfferId, ProductId, ProviderId, StockId, VenueId};

/// One line reported by a provider for a venue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStockLine {
    /// Product reference at the provider (an EAN for books).
    pub reference: String,
    /// Units available for sale.
    pub available_quantity: u32,
    /// Unit price in cents.
    pub price: Cents,
}

/// A venue synchronised by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueProviderLink {
    /// Synchronised venue.
    pub venue_id: VenueId,
    /// Provider feeding the venue.
    pub provider_id: ProviderId,
    /// Identifier of the venue at the provider, a SIRET for bookshops.
    pub venue_id_at_offer_provider: Option<String>,
}

/// One page of provider lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockDetailsPage {
    /// Lines of this page.
    pub lines: Vec<ProviderStockLine>,
    /// Cursor of the next page, if any.
    pub next_cursor: Option<String>,
}

/// A provider line with the references derived for one venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDetail {
    /// Reference of the product in the catalogue.
    pub products_provider_reference: String,
    /// Reference stored on the offer.
    pub offers_provider_reference: String,
    /// Reference stored on the stock.
    pub stocks_provider_reference: String,
    /// Legacy venue-scoped reference.
    pub venue_reference: String,
    /// Units available for sale.
    pub available_quantity: u32,
    /// Unit price.
    pub price: Cents,
}

impl StockDetail {
    /// Derive references for `line` at the venue identified by `siret`.
    pub fn from_line(line: &ProviderStockLine, siret: &Siret, venue_id: VenueId) -> Self {
        let scoped = format!("{}@{}", line.reference, siret);
        Self {
            products_provider_reference: line.reference.clone(),
            offers_provider_reference: scoped.clone(),
            stocks_provider_reference: scoped,
            venue_reference: format!("{}-{}", line.reference, venue_id),
            available_quantity: line.available_quantity,
            price: line.price,
        }
    }
}

/// Catalogue product offers are created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Product id.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Subcategory identifier.
    pub subcategory_id: String,
    /// EAN, when the product is a book or record.
    pub ean: Option<String>,
}

/// Provider-fed stock already in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingStock {
    /// Stock id.
    pub id: StockId,
    /// Offer of the stock.
    pub offer_id: OfferId,
    /// Current price.
    pub price: Cents,
    /// Current total quantity.
    pub quantity: Option<u32>,
    /// Units held by live bookings.
    pub booked_quantity: u32,
}

impl ExistingStock {
    fn is_empty(&self) -> bool {
        self.quantity
            .is_some_and(|quantity| quantity.saturating_sub(self.booked_quantity) == 0)
    }
}

/// What the database already knows about a batch of stock details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncLookups {
    /// Products keyed by provider reference.
    pub products: HashMap<String, Product>,
    /// Offers keyed by `offers_provider_reference`.
    pub offers_by_provider_reference: HashMap<String, OfferId>,
    /// Offers keyed by legacy venue reference.
    pub offers_by_venue_reference: HashMap<String, OfferId>,
    /// Stocks keyed by `stocks_provider_reference`.
    pub stocks_by_provider_reference: HashMap<String, ExistingStock>,
}

/// Offer to create from a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProviderOffer {
    /// Source product.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Subcategory identifier.
    pub subcategory_id: String,
    /// EAN of the product.
    pub ean: Option<String>,
    /// Hosting venue.
    pub venue_id: VenueId,
    /// Provider owning the offer.
    pub last_provider_id: ProviderId,
    /// `offers_provider_reference`.
    pub id_at_provider: String,
}

/// Offer a new stock attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferRef {
    /// Offer already in the database.
    Existing(OfferId),
    /// Offer created by the same plan, keyed by `id_at_provider`.
    New(String),
}

/// Update of a provider-fed stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStockUpdate {
    /// Stock updated.
    pub stock_id: StockId,
    /// Available plus already booked units.
    pub quantity: u32,
    /// Units reported by the provider.
    pub raw_provider_quantity: u32,
    /// Price to store.
    pub price: Cents,
}

/// Stock to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProviderStock {
    /// Offer of the stock.
    pub offer: OfferRef,
    /// `stocks_provider_reference`.
    pub id_at_providers: String,
    /// Units available.
    pub quantity: u32,
    /// Price.
    pub price: Cents,
}

/// Everything one synchronisation batch writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockSyncPlan {
    /// Existing offers to attach to the provider.
    pub relinked_offer_ids: Vec<OfferId>,
    /// Offers to create.
    pub new_offers: Vec<NewProviderOffer>,
    /// Stocks to update.
    pub stock_updates: Vec<ProviderStockUpdate>,
    /// Stocks to create.
    pub new_stocks: Vec<NewProviderStock>,
    /// Existing offers search must refresh.
    pub offers_to_reindex: BTreeSet<OfferId>,
}

impl StockSyncPlan {
    /// Whether applying the plan would write nothing.
    pub fn is_empty(&self) -> bool {
        self.relinked_offer_ids.is_empty()
            && self.new_offers.is_empty()
            && self.stock_updates.is_empty()
            && self.new_stocks.is_empty()
    }
}

/// Counts returned by a synchronisation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockSyncReport {
    /// Offers created.
    pub new_offers: usize,
    /// Stocks created.
    pub new_stocks: usize,
    /// Stocks updated.
    pub updated_stocks: usize,
}

impl StockSyncReport {
    /// Counts for `plan`.
    pub fn for_plan(plan: &StockSyncPlan) -> Self {
        Self {
            new_offers: plan.new_offers.len(),
            new_stocks: plan.new_stocks.len(),
            updated_stocks: plan.stock_updates.len(),
        }
    }

    /// Add another batch's counts.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            new_offers: self.new_offers + other.new_offers,
            new_stocks: self.new_stocks + other.new_stocks,
            updated_stocks: self.updated_stocks + other.updated_stocks,
        }
    }
}

fn build_new_offer(
    detail: &StockDetail,
    product: &Product,
    venue_id: VenueId,
    provider_id: ProviderId,
) -> Option<NewProviderOffer> {
    if product.name.trim().is_empty() {
        warn!(
            reference = %detail.products_provider_reference,
            "product has no name, offer not created"
        );
        return None;
    }
    Some(NewProviderOffer {
        product_id: product.id,
        name: product.name.clone(),
        subcategory_id: product.subcategory_id.clone(),
        ean: product.ean.clone(),
        venue_id,
        last_provider_id: provider_id,
        id_at_provider: detail.offers_provider_reference.clone(),
    })
}

fn plan_existing_stock(
    detail: &StockDetail,
    existing: &ExistingStock,
    plan: &mut StockSyncPlan,
) {
    let price = if detail.price.is_zero() && !existing.price.is_zero() {
        info!(
            stock_id = %existing.id,
            previous_price = %existing.price,
            "provider sent a zero price, keeping the previous one"
        );
        existing.price
    } else {
        detail.price
    };
    let update = ProviderStockUpdate {
        stock_id: existing.id,
        quantity: detail
            .available_quantity
            .saturating_add(existing.booked_quantity),
        raw_provider_quantity: detail.available_quantity,
        price,
    };
    let becomes_empty = detail.available_quantity == 0;
    if price != existing.price || existing.is_empty() != becomes_empty {
        plan.offers_to_reindex.insert(existing.offer_id);
    }
    plan.stock_updates.push(update);
}

/// Plan the writes for one batch of stock details at a venue.
pub fn plan_stock_sync(
    details: &[StockDetail],
    lookups: &SyncLookups,
    venue_id: VenueId,
    provider_id: ProviderId,
) -> StockSyncPlan {
    let mut plan = StockSyncPlan::default();
    let known: Vec<&StockDetail> = details
        .iter()
        .filter(|detail| {
            lookups
                .products
                .contains_key(&detail.products_provider_reference)
        })
        .collect();

    let mut relinked = HashSet::new();
    let mut planned_offers = HashSet::new();
    for detail in &known {
        if let Some(offer_id) = lookups
            .offers_by_provider_reference
            .get(&detail.offers_provider_reference)
        {
            if relinked.insert(*offer_id) {
                plan.relinked_offer_ids.push(*offer_id);
            }
            continue;
        }
        if lookups
            .offers_by_venue_reference
            .contains_key(&detail.venue_reference)
        {
            error!(
                venue_reference = %detail.venue_reference,
                offers_provider_reference = %detail.offers_provider_reference,
                "offer already exists under a legacy venue reference"
            );
            continue;
        }
        if detail.available_quantity == 0 {
            continue;
        }
        if planned_offers.contains(&detail.offers_provider_reference) {
            continue;
        }
        let Some(product) = lookups.products.get(&detail.products_provider_reference) else {
            continue;
        };
        if let Some(offer) = build_new_offer(detail, product, venue_id, provider_id) {
            planned_offers.insert(offer.id_at_provider.clone());
            plan.new_offers.push(offer);
        }
    }

    let mut planned_stocks = HashSet::new();
    for detail in &known {
        if !planned_stocks.insert(detail.stocks_provider_reference.clone()) {
            continue;
        }
        if let Some(existing) = lookups
            .stocks_by_provider_reference
            .get(&detail.stocks_provider_reference)
        {
            plan_existing_stock(detail, existing, &mut plan);
            continue;
        }
        if detail.available_quantity == 0 {
            continue;
        }
        let offer = if let Some(offer_id) = lookups
            .offers_by_provider_reference
            .get(&detail.offers_provider_reference)
        {
            OfferRef::Existing(*offer_id)
        } else if planned_offers.contains(&detail.offers_provider_reference) {
            OfferRef::New(detail.offers_provider_reference.clone())
        } else {
            continue;
        };
        if let Err(err) = validate_stock_price(detail.price) {
            warn!(
                reference = %detail.stocks_provider_reference,
                price = %detail.price,
                error = %err,
                "invalid provider price, stock not created"
            );
            continue;
        }
        if let OfferRef::Existing(offer_id) = &offer {
            plan.offers_to_reindex.insert(*offer_id);
        }
        plan.new_stocks.push(NewProviderStock {
            offer,
            id_at_providers: detail.stocks_provider_reference.clone(),
            quantity: detail.available_quantity,
            price: detail.price,
        });
    }

    plan
}

#[cfg(test)]
#[path = "catalogue_sync_tests.rs"]
mod tests;
