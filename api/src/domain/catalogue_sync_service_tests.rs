//! Tests for provider stock synchronisation runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rstest::rstest;

use super::*;
use crate::domain::catalogue_sync::{
    ExistingStock, Product, StockDetailsPage, SyncLookups,
};
use crate::domain::ports::{MockCatalogueSyncRepository, MockOfferIndexer, MockStockDetailsSource};
use crate::domain::{Cents, ErrorCode, ProductId, StockId};

const SIRET: &str = "12345678900012";

fn link(venue_id: i64, siret: Option<&str>) -> VenueProviderLink {
    VenueProviderLink {
        venue_id: VenueId::new(venue_id),
        provider_id: ProviderId::new(3),
        venue_id_at_offer_provider: siret.map(str::to_owned),
    }
}

fn line(reference: &str, quantity: u32, euros: i64) -> ProviderStockLine {
    ProviderStockLine {
        reference: reference.to_owned(),
        available_quantity: quantity,
        price: Cents::euros(euros),
    }
}

fn lookups() -> SyncLookups {
    let mut lookups = SyncLookups::default();
    for (id, reference) in [(1, "A"), (2, "B")] {
        lookups.products.insert(
            reference.to_owned(),
            Product {
                id: ProductId::new(id),
                name: format!("Livre {reference}"),
                subcategory_id: "LIVRE_PAPIER".to_owned(),
                ean: None,
            },
        );
    }
    lookups
        .offers_by_provider_reference
        .insert(format!("B@{SIRET}"), OfferId::new(20));
    lookups.stocks_by_provider_reference.insert(
        format!("B@{SIRET}"),
        ExistingStock {
            id: StockId::new(200),
            offer_id: OfferId::new(20),
            price: Cents::euros(8),
            quantity: Some(3),
            booked_quantity: 1,
        },
    );
    lookups
}

fn service(
    repository: MockCatalogueSyncRepository,
    source: MockStockDetailsSource,
    indexer: MockOfferIndexer,
) -> CatalogueSyncService {
    CatalogueSyncService::new(Arc::new(repository), Arc::new(source), Arc::new(indexer))
}

fn two_page_source() -> MockStockDetailsSource {
    let mut source = MockStockDetailsSource::new();
    source
        .expect_fetch_page()
        .withf(|_, cursor| cursor.is_none())
        .times(1)
        .return_once(|_, _| {
            Ok(StockDetailsPage {
                lines: vec![line("A", 4, 12)],
                next_cursor: Some("page-2".to_owned()),
            })
        });
    source
        .expect_fetch_page()
        .withf(|_, cursor| cursor.as_deref() == Some("page-2"))
        .times(1)
        .return_once(|_, _| {
            Ok(StockDetailsPage {
                lines: vec![line("B", 5, 10), line("UNKNOWN", 2, 5)],
                next_cursor: None,
            })
        });
    source
}

#[rstest]
#[case::missing(None)]
#[case::blank(Some("  "))]
#[tokio::test]
async fn venue_without_siret_is_rejected(#[case] siret: Option<&'static str>) {
    let mut source = MockStockDetailsSource::new();
    source.expect_fetch_page().never();

    let error = service(
        MockCatalogueSyncRepository::new(),
        source,
        MockOfferIndexer::new(),
    )
    .synchronize_venue_stocks(&link(12, siret))
    .await
    .expect_err("no SIRET");

    assert_eq!(
        error,
        SyncError::NoSiretSpecified {
            venue_id: VenueId::new(12)
        }
    );
    assert_eq!(Error::from(error).code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn venue_with_invalid_siret_is_rejected() {
    let error = service(
        MockCatalogueSyncRepository::new(),
        MockStockDetailsSource::new(),
        MockOfferIndexer::new(),
    )
    .synchronize_venue_stocks(&link(12, Some("1234")))
    .await
    .expect_err("invalid SIRET");

    assert!(matches!(
        error,
        SyncError::VenueSiretNotRegistered { ref siret, .. } if siret == "1234"
    ));
}

#[tokio::test]
async fn synchronises_all_pages_and_reindexes_touched_offers() {
    let mut repository = MockCatalogueSyncRepository::new();
    repository
        .expect_load_lookups()
        .withf(|details, venue_id| details.len() == 3 && *venue_id == VenueId::new(12))
        .times(1)
        .return_once(|_, _| Ok(lookups()));
    repository
        .expect_apply_plan()
        .withf(|plan, provider_id| {
            plan.new_offers.len() == 1
                && plan.new_stocks.len() == 1
                && plan.stock_updates.len() == 1
                && plan.stock_updates[0].quantity == 6
                && *provider_id == ProviderId::new(3)
        })
        .times(1)
        .return_once(|_, _| Ok(vec![OfferId::new(31)]));
    let mut indexer = MockOfferIndexer::new();
    indexer
        .expect_index_offer_ids()
        .withf(|ids, reason| {
            ids.to_vec() == vec![OfferId::new(20), OfferId::new(31)]
                && *reason == IndexationReason::StockSynchronization
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let report = service(repository, two_page_source(), indexer)
        .synchronize_venue_stocks(&link(12, Some(SIRET)))
        .await
        .expect("synchronisation succeeds");

    assert_eq!(
        report,
        StockSyncReport {
            new_offers: 1,
            new_stocks: 1,
            updated_stocks: 1,
        }
    );
}

#[tokio::test]
async fn nothing_is_written_for_unknown_products() {
    let mut source = MockStockDetailsSource::new();
    source.expect_fetch_page().return_once(|_, _| {
        Ok(StockDetailsPage {
            lines: vec![line("UNKNOWN", 2, 5)],
            next_cursor: None,
        })
    });
    let mut repository = MockCatalogueSyncRepository::new();
    repository
        .expect_load_lookups()
        .return_once(|_, _| Ok(SyncLookups::default()));
    repository.expect_apply_plan().never();
    let mut indexer = MockOfferIndexer::new();
    indexer.expect_index_offer_ids().never();

    let report = service(repository, source, indexer)
        .synchronize_venue_stocks(&link(12, Some(SIRET)))
        .await
        .expect("empty run succeeds");

    assert_eq!(report, StockSyncReport::default());
}

#[tokio::test]
async fn indexing_failure_does_not_fail_the_run() {
    let mut repository = MockCatalogueSyncRepository::new();
    repository
        .expect_load_lookups()
        .return_once(|_, _| Ok(lookups()));
    repository
        .expect_apply_plan()
        .return_once(|_, _| Ok(vec![OfferId::new(31)]));
    let mut indexer = MockOfferIndexer::new();
    indexer
        .expect_index_offer_ids()
        .times(1)
        .returning(|_, _| Err(crate::domain::ports::OfferIndexerError::unavailable("redis down")));

    let report = service(repository, two_page_source(), indexer)
        .synchronize_venue_stocks(&link(12, Some(SIRET)))
        .await
        .expect("indexing is best effort");

    assert_eq!(report.updated_stocks, 1);
}

#[tokio::test]
async fn provider_run_continues_after_a_failing_venue() {
    let mut repository = MockCatalogueSyncRepository::new();
    repository
        .expect_list_active_venue_providers()
        .withf(|provider_id| *provider_id == ProviderId::new(3))
        .times(1)
        .return_once(|_| Ok(vec![link(11, None), link(12, Some(SIRET))]));
    repository
        .expect_load_lookups()
        .times(1)
        .return_once(|_, _| Ok(lookups()));
    repository
        .expect_apply_plan()
        .times(1)
        .return_once(|_, _| Ok(Vec::new()));
    let mut indexer = MockOfferIndexer::new();
    indexer
        .expect_index_offer_ids()
        .returning(|_, _| Ok(()));

    let report = service(repository, two_page_source(), indexer)
        .synchronize_provider(ProviderId::new(3))
        .await
        .expect("provider run completes");

    assert_eq!(report.new_offers, 1);
    assert_eq!(report.updated_stocks, 1);
}

#[tokio::test]
async fn source_failure_aborts_before_any_write() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let mut source = MockStockDetailsSource::new();
    source.expect_fetch_page().returning(move |_, _| {
        counted.fetch_add(1, Ordering::SeqCst);
        Err(StockDetailsSourceError::malformed("line 3: missing price"))
    });
    let mut repository = MockCatalogueSyncRepository::new();
    repository.expect_load_lookups().never();
    repository.expect_apply_plan().never();

    let error = service(repository, source, MockOfferIndexer::new())
        .synchronize_venue_stocks(&link(12, Some(SIRET)))
        .await
        .expect_err("malformed feed");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(Error::from(error).code(), ErrorCode::InternalError);
}
