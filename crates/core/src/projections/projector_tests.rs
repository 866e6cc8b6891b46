use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

use super::{
    InMemoryHoldings, InMemoryLedger, InMemoryProjectionCheckpoints, LedgerEntryFilter,
    LedgerEntryKind, Projector,
};
use crate::events::{
    BroadcastEventSink, CommittedEventSink, EventRecord, EventStoreTrait, InMemoryEventStore,
    NewEvent, PortfolioEvent, PortfolioId, Symbol,
};

struct Fixture {
    event_store: Arc<InMemoryEventStore>,
    holdings: Arc<InMemoryHoldings>,
    ledger: Arc<InMemoryLedger>,
    checkpoints: Arc<InMemoryProjectionCheckpoints>,
    projector: Arc<Projector>,
}

fn fixture() -> Fixture {
    let event_store = Arc::new(InMemoryEventStore::new());
    let holdings = Arc::new(InMemoryHoldings::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let checkpoints = Arc::new(InMemoryProjectionCheckpoints::new());
    let projector = Arc::new(Projector::new(
        event_store.clone(),
        holdings.clone(),
        ledger.clone(),
        checkpoints.clone(),
    ));
    Fixture {
        event_store,
        holdings,
        ledger,
        checkpoints,
        projector,
    }
}

fn at(day: u32, hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, day, hour, 0, 0).unwrap()
}

fn lifecycle_events() -> Vec<NewEvent> {
    vec![
        NewEvent::new(
            PortfolioEvent::PortfolioOpened {
                owner_id: "owner-1".to_string(),
                name: "Growth".to_string(),
            },
            at(1, 9),
        ),
        NewEvent::new(
            PortfolioEvent::PositionOpened {
                symbol: Symbol::new("AAPL"),
            },
            at(1, 10),
        ),
        NewEvent::new(
            PortfolioEvent::SharesBought {
                symbol: Symbol::new("AAPL"),
                quantity: dec!(10),
                unit_price: dec!(100),
                lot_id: "lot-1".to_string(),
            },
            at(1, 10),
        ),
        NewEvent::new(
            PortfolioEvent::SharesBought {
                symbol: Symbol::new("AAPL"),
                quantity: dec!(5),
                unit_price: dec!(120),
                lot_id: "lot-2".to_string(),
            },
            at(2, 10),
        ),
        NewEvent::new(
            PortfolioEvent::SharesSold {
                symbol: Symbol::new("AAPL"),
                quantity: dec!(12),
                unit_price: dec!(150),
            },
            at(3, 10),
        ),
        NewEvent::new(
            PortfolioEvent::DividendReceived {
                symbol: Symbol::new("AAPL"),
                amount: dec!(3.20),
                pay_date: chrono::NaiveDate::from_ymd_opt(2024, 4, 4).unwrap(),
            },
            at(4, 0),
        ),
    ]
}

async fn seed(fx: &Fixture, id: &str) -> Vec<EventRecord> {
    let id = PortfolioId::new(id);
    fx.event_store
        .append(&id, 0, lifecycle_events())
        .await
        .unwrap();
    fx.event_store.read_from(&id, 1).unwrap()
}

async fn apply_all(fx: &Fixture, records: &[EventRecord]) {
    for record in records {
        fx.projector.apply(record).await.unwrap();
    }
}

#[tokio::test]
async fn test_holdings_row_tracks_position() {
    let fx = fixture();
    let records = seed(&fx, "p1").await;
    apply_all(&fx, &records).await;

    let rows = fx.holdings.holdings(&PortfolioId::new("p1")).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.symbol, Symbol::new("AAPL"));
    assert_eq!(row.quantity, dec!(3));
    assert_eq!(row.cost_basis, dec!(360));
    assert_eq!(row.average_cost, dec!(360) / dec!(3));
    assert_eq!(row.opened_at, at(1, 10));
}

#[tokio::test]
async fn test_ledger_rows_in_stream_order_with_amounts() {
    let fx = fixture();
    let records = seed(&fx, "p1").await;
    apply_all(&fx, &records).await;

    let rows = fx
        .ledger
        .entries(&PortfolioId::new("p1"), &LedgerEntryFilter::default())
        .unwrap();
    assert_eq!(rows.len(), 6);
    let versions: Vec<u64> = rows.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);

    let buy = &rows[2];
    assert_eq!(buy.kind, LedgerEntryKind::SharesBought);
    assert_eq!(buy.amount, Some(dec!(1000)));

    let dividend = &rows[5];
    assert_eq!(dividend.kind, LedgerEntryKind::DividendReceived);
    assert_eq!(dividend.amount, Some(dec!(3.20)));
    assert_eq!(dividend.quantity, None);
}

#[tokio::test]
async fn test_history_filters() {
    let fx = fixture();
    let records = seed(&fx, "p1").await;
    apply_all(&fx, &records).await;
    let id = PortfolioId::new("p1");

    let buys = fx
        .ledger
        .entries(
            &id,
            &LedgerEntryFilter {
                kind: Some(LedgerEntryKind::SharesBought),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(buys.len(), 2);

    let aapl = fx
        .ledger
        .entries(
            &id,
            &LedgerEntryFilter {
                symbol: Some(Symbol::new("AAPL")),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(aapl.len(), 5, "the portfolio_opened row carries no symbol");

    let day_two_on = fx
        .ledger
        .entries(
            &id,
            &LedgerEntryFilter {
                from: Some(at(2, 0)),
                to: Some(at(3, 23)),
                ..Default::default()
            },
        )
        .unwrap();
    let versions: Vec<u64> = day_two_on.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![4, 5]);
}

#[tokio::test]
async fn test_redelivered_record_is_skipped() {
    let fx = fixture();
    let records = seed(&fx, "p1").await;
    apply_all(&fx, &records).await;
    let id = PortfolioId::new("p1");

    // At-least-once delivery replays an old record.
    fx.projector.apply(&records[2]).await.unwrap();
    fx.projector.apply(&records[5]).await.unwrap();

    assert_eq!(fx.checkpoints.load(&id).unwrap(), 6);
    let rows = fx.ledger.entries(&id, &LedgerEntryFilter::default()).unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(fx.holdings.holdings(&id).unwrap()[0].quantity, dec!(3));
}

#[tokio::test]
async fn test_gap_is_healed_from_the_store() {
    let fx = fixture();
    let records = seed(&fx, "p1").await;
    let id = PortfolioId::new("p1");

    // Only the last record is delivered; everything before it was missed.
    fx.projector.apply(&records[5]).await.unwrap();

    assert_eq!(fx.checkpoints.load(&id).unwrap(), 6);
    let rows = fx.ledger.entries(&id, &LedgerEntryFilter::default()).unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(fx.holdings.holdings(&id).unwrap()[0].quantity, dec!(3));
}

#[tokio::test]
async fn test_rebuild_matches_incremental_projection() {
    let fx = fixture();
    let p1 = seed(&fx, "p1").await;
    let p2 = seed(&fx, "p2").await;
    apply_all(&fx, &p1).await;
    apply_all(&fx, &p2).await;

    let id = PortfolioId::new("p1");
    let holdings_before = fx.holdings.holdings(&id).unwrap();
    let ledger_before = fx.ledger.entries(&id, &LedgerEntryFilter::default()).unwrap();

    fx.projector.rebuild().await.unwrap();
    assert_eq!(fx.holdings.holdings(&id).unwrap(), holdings_before);
    assert_eq!(
        fx.ledger.entries(&id, &LedgerEntryFilter::default()).unwrap(),
        ledger_before
    );

    // Rebuilding again changes nothing.
    fx.projector.rebuild().await.unwrap();
    assert_eq!(fx.holdings.holdings(&id).unwrap(), holdings_before);
    assert_eq!(fx.checkpoints.load(&PortfolioId::new("p2")).unwrap(), 6);
}

#[tokio::test]
async fn test_position_sold_to_zero_keeps_row() {
    let fx = fixture();
    let id = PortfolioId::new("p1");
    fx.event_store
        .append(
            &id,
            0,
            vec![
                NewEvent::new(
                    PortfolioEvent::PortfolioOpened {
                        owner_id: "owner-1".to_string(),
                        name: "Growth".to_string(),
                    },
                    at(1, 9),
                ),
                NewEvent::new(
                    PortfolioEvent::PositionOpened {
                        symbol: Symbol::new("AAPL"),
                    },
                    at(1, 10),
                ),
                NewEvent::new(
                    PortfolioEvent::SharesBought {
                        symbol: Symbol::new("AAPL"),
                        quantity: dec!(4),
                        unit_price: dec!(50),
                        lot_id: "lot-1".to_string(),
                    },
                    at(1, 10),
                ),
                NewEvent::new(
                    PortfolioEvent::SharesSold {
                        symbol: Symbol::new("AAPL"),
                        quantity: dec!(4),
                        unit_price: dec!(60),
                    },
                    at(2, 10),
                ),
            ],
        )
        .await
        .unwrap();

    for record in fx.event_store.read_from(&id, 1).unwrap() {
        fx.projector.apply(&record).await.unwrap();
    }

    let rows = fx.holdings.holdings(&id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].quantity, dec!(0));
    assert_eq!(rows[0].cost_basis, dec!(0));
    assert_eq!(rows[0].average_cost, dec!(0));
}

#[tokio::test]
async fn test_spawned_projector_consumes_published_records() {
    let fx = fixture();
    let records = seed(&fx, "p1").await;

    let sink = BroadcastEventSink::new(16);
    let handle = fx.projector.clone().spawn(sink.subscribe());

    sink.publish_batch(&records);
    drop(sink);
    handle.await.unwrap();

    let id = PortfolioId::new("p1");
    assert_eq!(fx.checkpoints.load(&id).unwrap(), 6);
    assert_eq!(fx.holdings.holdings(&id).unwrap()[0].quantity, dec!(3));
}
