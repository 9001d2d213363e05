//! PostgreSQL store tests. Each test gets a fresh database with the
//! migrations applied; run with `DATABASE_URL` set and `--ignored`.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use parking_server::engine::clock::ManualClock;
use parking_server::engine::error::EngineError;
use parking_server::engine::retry::RetryPolicy;
use parking_server::engine::TicketEngine;
use parking_server::models::{GeoPoint, NewParkingLot, ParkingLot, TicketQuery, TicketStatus};
use parking_server::store::PgStore;

const OWNER: &str = "owner-1";
const STAFF: &str = "staff-1";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 15, 14, 30, 0).unwrap()
}

fn engine(pool: PgPool) -> (Arc<TicketEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let retry = RetryPolicy {
        max_attempts: 3,
        base_backoff_ms: 1,
    };
    let engine = TicketEngine::new(Arc::new(PgStore::new(pool)), clock.clone(), retry);
    (Arc::new(engine), clock)
}

async fn staffed_lot(engine: &TicketEngine, total_spots: i32) -> ParkingLot {
    let lot = engine
        .register_lot(
            OWNER,
            NewParkingLot {
                name: "Ben Thanh Parking".to_string(),
                address: "1 Le Loi, District 1".to_string(),
                description: None,
                location: GeoPoint {
                    latitude: 10.7725,
                    longitude: 106.6980,
                },
                total_spots,
                hourly_price: Decimal::from(15000),
                bank_id: Some("vcb".to_string()),
                bank_account: Some("0123456789".to_string()),
                image_urls: vec![],
            },
        )
        .await
        .unwrap();
    engine.assign_staff(lot.id, OWNER, STAFF).await.unwrap()
}

async fn active_count(engine: &TicketEngine, lot_id: Uuid) -> usize {
    let query = TicketQuery {
        status: Some(TicketStatus::Active),
        plate: None,
    };
    engine.list_tickets(lot_id, &query).await.unwrap().len()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local PostgreSQL"]
async fn open_and_close_move_counter_and_plate_set(pool: PgPool) {
    let (engine, clock) = engine(pool);
    let lot = staffed_lot(&engine, 10).await;

    let ticket = engine.open_ticket(lot.id, "51a-123.45", STAFF, None).await.unwrap();
    assert_eq!(ticket.license_plate, "51A-123.45");
    assert_eq!(ticket.hourly_price, Decimal::from(15000));
    let occupancy = engine.occupancy(lot.id).await.unwrap();
    assert_eq!(occupancy.available_spots, 9);
    assert_eq!(occupancy.active_vehicles, vec!["51A-123.45".to_string()]);

    clock.advance(Duration::minutes(90));
    let closed = engine.checkout(lot.id, ticket.id, STAFF).await.unwrap();
    assert_eq!(closed.status, TicketStatus::Completed);
    assert_eq!(closed.total_amount, Decimal::from(30000));

    let occupancy = engine.occupancy(lot.id).await.unwrap();
    assert_eq!(occupancy.available_spots, 10);
    assert!(occupancy.active_vehicles.is_empty());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local PostgreSQL"]
async fn full_lot_and_duplicate_plate_are_rejected(pool: PgPool) {
    let (engine, _) = engine(pool);
    let lot = staffed_lot(&engine, 2).await;

    engine.open_ticket(lot.id, "A1", STAFF, None).await.unwrap();
    let err = engine.open_ticket(lot.id, "a1", STAFF, None).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateActiveTicket { .. }));

    engine.open_ticket(lot.id, "B2", STAFF, None).await.unwrap();
    let err = engine.open_ticket(lot.id, "C3", STAFF, None).await.unwrap_err();
    assert!(matches!(err, EngineError::LotFull(id) if id == lot.id));

    let lot = engine.get_lot(lot.id).await.unwrap();
    assert_eq!(lot.available_spots, 0);
    assert_eq!(active_count(&engine, lot.id).await, 2);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local PostgreSQL"]
async fn concurrent_opens_for_one_plate_admit_one(pool: PgPool) {
    let (engine, _) = engine(pool);
    let lot = staffed_lot(&engine, 10).await;
    let lot_id = lot.id;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.open_ticket(lot_id, "29A-111.11", STAFF, None).await })
        })
        .collect();

    let mut opened = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => opened += 1,
            Err(err) => assert!(
                matches!(err, EngineError::DuplicateActiveTicket { .. }),
                "unexpected error: {err}"
            ),
        }
    }
    assert_eq!(opened, 1);

    let lot = engine.get_lot(lot_id).await.unwrap();
    assert_eq!(lot.available_spots, 9);
    assert_eq!(lot.active_vehicles, vec!["29A-111.11".to_string()]);
    assert_eq!(active_count(&engine, lot_id).await, 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local PostgreSQL"]
async fn closing_twice_counts_once(pool: PgPool) {
    let (engine, clock) = engine(pool);
    let lot = staffed_lot(&engine, 3).await;
    let ticket = engine.open_ticket(lot.id, "A1", STAFF, None).await.unwrap();
    clock.advance(Duration::minutes(10));

    engine.checkout(lot.id, ticket.id, STAFF).await.unwrap();
    let err = engine.checkout(lot.id, ticket.id, STAFF).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyClosed(id) if id == ticket.id));

    let lot = engine.get_lot(lot.id).await.unwrap();
    assert_eq!(lot.available_spots, 3);

    let completed = TicketQuery {
        status: Some(TicketStatus::Completed),
        plate: None,
    };
    let tickets = engine.list_tickets(lot.id, &completed).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].total_amount, Decimal::from(15000));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL and a local PostgreSQL"]
async fn reconcile_repairs_drifted_row(pool: PgPool) {
    let (engine, _) = engine(pool.clone());
    let lot = staffed_lot(&engine, 10).await;
    engine.open_ticket(lot.id, "B2", STAFF, None).await.unwrap();
    engine.open_ticket(lot.id, "A1", STAFF, None).await.unwrap();

    let clean = engine.reconcile_lot(lot.id).await.unwrap();
    assert!(!clean.drifted);

    sqlx::query(
        "UPDATE parking_lots SET available_spots = 10, active_vehicles = ARRAY['ZZ'] WHERE id = $1",
    )
    .bind(lot.id)
    .execute(&pool)
    .await
    .unwrap();

    let report = engine.reconcile_lot(lot.id).await.unwrap();
    assert!(report.drifted);
    assert_eq!(report.recorded_available, 10);
    assert_eq!(report.expected_available, 8);
    assert_eq!(report.active_vehicles, vec!["A1".to_string(), "B2".to_string()]);

    let lot = engine.get_lot(lot.id).await.unwrap();
    assert_eq!(lot.available_spots, 8);
}
