use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

use super::command_service::{decide, PortfolioCommandService, RetryPolicy};
use super::snapshot::{InMemorySnapshotStore, Snapshotter};
use super::{CommandEnvelope, Portfolio, PortfolioCommand};
use crate::errors::{CommandError, ConflictError, Error};
use crate::events::{
    EventRecord, EventStoreTrait, InMemoryEventStore, MockEventSink, NewEvent, PortfolioId, Symbol,
};

struct Fixture {
    event_store: Arc<InMemoryEventStore>,
    snapshot_store: Arc<InMemorySnapshotStore>,
    sink: Arc<MockEventSink>,
    service: PortfolioCommandService,
}

fn fixture() -> Fixture {
    let event_store = Arc::new(InMemoryEventStore::new());
    let snapshot_store = Arc::new(InMemorySnapshotStore::new());
    let sink = Arc::new(MockEventSink::new());
    let service = PortfolioCommandService::new(
        event_store.clone(),
        snapshot_store.clone(),
        sink.clone(),
    );
    Fixture {
        event_store,
        snapshot_store,
        sink,
        service,
    }
}

fn executed_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap()
}

fn open_cmd() -> PortfolioCommand {
    PortfolioCommand::OpenPortfolio {
        owner_id: "owner-1".to_string(),
        name: "Growth".to_string(),
    }
}

fn buy(symbol: &str, quantity: rust_decimal::Decimal, price: rust_decimal::Decimal) -> PortfolioCommand {
    PortfolioCommand::BuyShares {
        symbol: Symbol::new(symbol),
        quantity,
        price,
        executed_at: executed_at(),
    }
}

fn sell(symbol: &str, quantity: rust_decimal::Decimal, price: rust_decimal::Decimal) -> PortfolioCommand {
    PortfolioCommand::SellShares {
        symbol: Symbol::new(symbol),
        quantity,
        price,
        executed_at: executed_at(),
    }
}

async fn open_portfolio(fx: &Fixture, id: &str) {
    fx.service
        .execute(CommandEnvelope::new(id, open_cmd()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_open_portfolio_records_genesis() {
    let fx = fixture();
    let envelope = CommandEnvelope::new("p1", open_cmd());
    let command_id = envelope.command_id.clone();

    let receipt = fx.service.execute(envelope).await.unwrap();

    assert_eq!(receipt.new_version, 1);
    assert_eq!(receipt.event_ids.len(), 1);

    let published = fx.sink.records();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_type(), "portfolio_opened");
    assert_eq!(published[0].causation_id.as_deref(), Some(command_id.as_str()));

    let state = fx.service.load_aggregate(&PortfolioId::new("p1")).unwrap();
    assert!(state.exists());
    assert_eq!(state.name, "Growth");
    assert_eq!(state.owner_id, "owner-1");
}

#[tokio::test]
async fn test_buy_auto_opens_position_in_one_append() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;

    let receipt = fx
        .service
        .execute(CommandEnvelope::new("p1", buy("AAPL", dec!(10), dec!(100))))
        .await
        .unwrap();

    assert_eq!(receipt.new_version, 3);
    assert_eq!(receipt.event_ids.len(), 2);

    let stream = fx
        .event_store
        .read_from(&PortfolioId::new("p1"), 1)
        .unwrap();
    let types: Vec<&str> = stream.iter().map(|r| r.event_type()).collect();
    assert_eq!(
        types,
        vec!["portfolio_opened", "position_opened", "shares_bought"]
    );

    let state = fx.service.load_aggregate(&PortfolioId::new("p1")).unwrap();
    assert_eq!(state.held_quantity(&Symbol::new("AAPL")), dec!(10));
}

#[tokio::test]
async fn test_second_buy_reuses_open_position() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;
    fx.service
        .execute(CommandEnvelope::new("p1", buy("AAPL", dec!(10), dec!(100))))
        .await
        .unwrap();

    let receipt = fx
        .service
        .execute(CommandEnvelope::new("p1", buy("AAPL", dec!(5), dec!(120))))
        .await
        .unwrap();

    // Only shares_bought this time.
    assert_eq!(receipt.event_ids.len(), 1);
    assert_eq!(receipt.new_version, 4);

    let state = fx.service.load_aggregate(&PortfolioId::new("p1")).unwrap();
    let position = state.position(&Symbol::new("AAPL")).unwrap();
    assert_eq!(position.quantity, dec!(15));
    assert_eq!(position.lots.len(), 2);
}

#[tokio::test]
async fn test_sell_consumes_lots_oldest_first() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;
    fx.service
        .execute(CommandEnvelope::new("p1", buy("AAPL", dec!(10), dec!(100))))
        .await
        .unwrap();
    fx.service
        .execute(CommandEnvelope::new("p1", buy("AAPL", dec!(5), dec!(120))))
        .await
        .unwrap();

    fx.service
        .execute(CommandEnvelope::new("p1", sell("AAPL", dec!(12), dec!(150))))
        .await
        .unwrap();

    let state = fx.service.load_aggregate(&PortfolioId::new("p1")).unwrap();
    let position = state.position(&Symbol::new("AAPL")).unwrap();
    assert_eq!(position.quantity, dec!(3));
    assert_eq!(position.cost_basis(), dec!(360));
}

#[tokio::test]
async fn test_rejected_command_appends_nothing() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;
    fx.sink.clear();

    let err = fx
        .service
        .execute(CommandEnvelope::new("p1", sell("AAPL", dec!(1), dec!(10))))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Command(CommandError::PositionNotFound(_))
    ));

    assert_eq!(
        fx.event_store
            .current_version(&PortfolioId::new("p1"))
            .unwrap(),
        1
    );
    assert!(fx.sink.is_empty());
}

#[tokio::test]
async fn test_command_against_unknown_portfolio_is_rejected() {
    let fx = fixture();
    let err = fx
        .service
        .execute(CommandEnvelope::new("ghost", buy("AAPL", dec!(1), dec!(1))))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Command(CommandError::PortfolioNotFound(_))
    ));
}

#[tokio::test]
async fn test_open_twice_is_rejected() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;

    let err = fx
        .service
        .execute(CommandEnvelope::new("p1", open_cmd()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Command(CommandError::PortfolioExists(_))
    ));
}

#[tokio::test]
async fn test_closed_portfolio_rejects_further_commands() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;
    fx.service
        .execute(CommandEnvelope::new("p1", PortfolioCommand::ClosePortfolio))
        .await
        .unwrap();

    for command in [
        buy("AAPL", dec!(1), dec!(1)),
        PortfolioCommand::RenamePortfolio {
            name: "after".to_string(),
        },
        PortfolioCommand::ClosePortfolio,
    ] {
        let err = fx
            .service
            .execute(CommandEnvelope::new("p1", command))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Command(CommandError::PortfolioClosed(_))
        ));
    }
}

#[tokio::test]
async fn test_dividend_requires_open_position() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;

    let err = fx
        .service
        .execute(CommandEnvelope::new(
            "p1",
            PortfolioCommand::ReceiveDividend {
                symbol: Symbol::new("AAPL"),
                amount: dec!(3.20),
                pay_date: chrono::NaiveDate::from_ymd_opt(2024, 6, 14).unwrap(),
            },
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Command(CommandError::PositionNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_sells_cannot_oversell() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;
    fx.service
        .execute(CommandEnvelope::new("p1", buy("AAPL", dec!(10), dec!(100))))
        .await
        .unwrap();

    let service = Arc::new(fx.service);
    let a = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .execute(CommandEnvelope::new("p1", sell("AAPL", dec!(8), dec!(150))))
                .await
        })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .execute(CommandEnvelope::new("p1", sell("AAPL", dec!(8), dec!(150))))
                .await
        })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let wins = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(wins, 1, "exactly one concurrent sell may win");

    // The loser was re-validated against the winner's events and rejected,
    // not silently applied.
    let loss = outcomes.into_iter().find(|o| o.is_err()).unwrap();
    assert!(matches!(
        loss.unwrap_err(),
        Error::Command(CommandError::InsufficientShares { .. })
    ));

    let state = service.load_aggregate(&PortfolioId::new("p1")).unwrap();
    assert_eq!(state.held_quantity(&Symbol::new("AAPL")), dec!(2));
}

#[tokio::test]
async fn test_conflict_retry_succeeds_when_commands_compose() {
    // Two concurrent buys of different symbols both fit; the loser of the
    // first append must win on retry.
    let fx = fixture();
    open_portfolio(&fx, "p1").await;

    let service = Arc::new(
        fx.service,
    );
    let a = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .execute(CommandEnvelope::new("p1", buy("AAPL", dec!(1), dec!(10))))
                .await
        })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .execute(CommandEnvelope::new("p1", buy("MSFT", dec!(2), dec!(20))))
                .await
        })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let state = service.load_aggregate(&PortfolioId::new("p1")).unwrap();
    assert_eq!(state.held_quantity(&Symbol::new("AAPL")), dec!(1));
    assert_eq!(state.held_quantity(&Symbol::new("MSFT")), dec!(2));
}

/// Store whose appends always lose the version race, to exercise the
/// retry budget.
struct AlwaysConflictStore {
    inner: InMemoryEventStore,
}

#[async_trait::async_trait]
impl EventStoreTrait for AlwaysConflictStore {
    async fn append(
        &self,
        aggregate_id: &PortfolioId,
        expected_version: u64,
        _events: Vec<NewEvent>,
    ) -> crate::errors::Result<u64> {
        Err(ConflictError {
            aggregate_id: aggregate_id.to_string(),
            expected: expected_version,
            actual: expected_version + 1,
        }
        .into())
    }

    fn read_from(
        &self,
        aggregate_id: &PortfolioId,
        from_version: u64,
    ) -> crate::errors::Result<Vec<EventRecord>> {
        self.inner.read_from(aggregate_id, from_version)
    }

    fn current_version(&self, aggregate_id: &PortfolioId) -> crate::errors::Result<u64> {
        self.inner.current_version(aggregate_id)
    }

    fn aggregate_ids(&self) -> crate::errors::Result<Vec<PortfolioId>> {
        self.inner.aggregate_ids()
    }
}

#[tokio::test]
async fn test_retry_budget_exhaustion_surfaces_conflict() {
    let inner = InMemoryEventStore::new();
    inner
        .append(
            &PortfolioId::new("p1"),
            0,
            decide(
                &Portfolio::seed(PortfolioId::new("p1")),
                &open_cmd(),
                Utc::now(),
            )
            .unwrap(),
        )
        .await
        .unwrap();

    let service = PortfolioCommandService::new(
        Arc::new(AlwaysConflictStore { inner }),
        Arc::new(InMemorySnapshotStore::new()),
        Arc::new(MockEventSink::new()),
    )
    .with_retry_policy(RetryPolicy {
        max_attempts: 2,
        base_backoff: std::time::Duration::from_millis(1),
    });

    let err = service
        .execute(CommandEnvelope::new(
            "p1",
            PortfolioCommand::RenamePortfolio {
                name: "unlucky".to_string(),
            },
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_load_aggregate_uses_snapshot_and_tail() {
    let fx = fixture();
    open_portfolio(&fx, "p1").await;
    fx.service
        .execute(CommandEnvelope::new("p1", buy("AAPL", dec!(10), dec!(100))))
        .await
        .unwrap();

    let snapshotter = Snapshotter::new(fx.event_store.clone(), fx.snapshot_store.clone());
    snapshotter
        .take_snapshot(&PortfolioId::new("p1"))
        .await
        .unwrap();

    fx.service
        .execute(CommandEnvelope::new("p1", sell("AAPL", dec!(4), dec!(150))))
        .await
        .unwrap();

    let state = fx.service.load_aggregate(&PortfolioId::new("p1")).unwrap();
    assert_eq!(state.held_quantity(&Symbol::new("AAPL")), dec!(6));
    assert_eq!(state.version, 4);
}

#[test]
fn test_decide_rejects_non_positive_inputs() {
    let mut state = Portfolio::seed("p1".into());
    state.version = 1;
    let now = Utc::now();

    let cases = vec![
        (
            buy("AAPL", dec!(0), dec!(10)),
            CommandError::NonPositiveQuantity(dec!(0)),
        ),
        (
            buy("AAPL", dec!(-1), dec!(10)),
            CommandError::NonPositiveQuantity(dec!(-1)),
        ),
        (
            buy("AAPL", dec!(1), dec!(0)),
            CommandError::NonPositivePrice(dec!(0)),
        ),
        (
            PortfolioCommand::ApplySplit {
                symbol: Symbol::new("AAPL"),
                ratio: dec!(0),
                effective_at: executed_at(),
            },
            CommandError::NonPositiveRatio(dec!(0)),
        ),
        (
            PortfolioCommand::RenamePortfolio {
                name: "   ".to_string(),
            },
            CommandError::EmptyName,
        ),
    ];

    for (command, expected) in cases {
        match decide(&state, &command, now) {
            Err(Error::Command(actual)) => assert_eq!(actual, expected),
            other => panic!("expected rejection for {command:?}, got {other:?}"),
        }
    }
}
