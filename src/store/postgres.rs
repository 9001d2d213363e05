use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::TicketStore;
use crate::engine::error::EngineError;
use crate::engine::fee;
use crate::models::{LotStatus, LotUpdate, NewTicket, ParkingLot, Ticket, TicketStatus};

const LOT_COLUMNS: &str = "id, name, address, description, latitude, longitude, total_spots, \
    available_spots, hourly_price, owner_id, active_vehicles, staff_ids, bank_id, bank_account, \
    image_urls, status, created_at, updated_at";

const TICKET_COLUMNS: &str = "id, lot_id, license_plate, entry_time, exit_time, status, \
    hourly_price, total_amount, created_by, customer_id";

const ONE_ACTIVE_PER_PLATE: &str = "tickets_one_active_per_plate";

/// PostgreSQL store. Lot rows are locked with `FOR UPDATE` for every
/// operation that changes occupancy, and the counter only moves through SQL
/// arithmetic inside that transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn lock_lot(conn: &mut PgConnection, lot_id: Uuid) -> Result<ParkingLot, EngineError> {
    sqlx::query_as::<_, ParkingLot>(&format!(
        "SELECT {LOT_COLUMNS} FROM parking_lots WHERE id = $1 FOR UPDATE"
    ))
    .bind(lot_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(EngineError::LotNotFound(lot_id))
}

async fn active_plates(conn: &mut PgConnection, lot_id: Uuid) -> Result<Vec<String>, EngineError> {
    let plates = sqlx::query_scalar::<_, String>(
        "SELECT license_plate FROM tickets \
         WHERE lot_id = $1 AND status = 'active' ORDER BY license_plate",
    )
    .bind(lot_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(plates)
}

#[async_trait]
impl TicketStore for PgStore {
    async fn insert_lot(&self, lot: &ParkingLot) -> Result<(), EngineError> {
        sqlx::query(&format!(
            "INSERT INTO parking_lots ({LOT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        ))
        .bind(lot.id)
        .bind(&lot.name)
        .bind(&lot.address)
        .bind(&lot.description)
        .bind(lot.location.latitude)
        .bind(lot.location.longitude)
        .bind(lot.total_spots)
        .bind(lot.available_spots)
        .bind(lot.hourly_price)
        .bind(&lot.owner_id)
        .bind(&lot.active_vehicles)
        .bind(&lot.staff_ids)
        .bind(&lot.bank_id)
        .bind(&lot.bank_account)
        .bind(&lot.image_urls)
        .bind(lot.status)
        .bind(lot.created_at)
        .bind(lot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_lot(&self, lot_id: Uuid) -> Result<Option<ParkingLot>, EngineError> {
        let lot = sqlx::query_as::<_, ParkingLot>(&format!(
            "SELECT {LOT_COLUMNS} FROM parking_lots WHERE id = $1"
        ))
        .bind(lot_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lot)
    }

    async fn list_lots(&self, owner_id: Option<&str>) -> Result<Vec<ParkingLot>, EngineError> {
        let lots = sqlx::query_as::<_, ParkingLot>(&format!(
            "SELECT {LOT_COLUMNS} FROM parking_lots \
             WHERE ($1::text IS NULL OR owner_id = $1) ORDER BY created_at"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lots)
    }

    async fn update_lot(
        &self,
        lot_id: Uuid,
        update: &LotUpdate,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError> {
        let mut tx = self.pool.begin().await?;
        let mut lot = lock_lot(&mut *tx, lot_id).await?;

        if let Some(total) = update.total_spots {
            let active = active_plates(&mut *tx, lot_id).await?.len() as i32;
            if total < active {
                return Err(EngineError::CapacityBelowOccupancy {
                    requested: total,
                    active,
                });
            }
            lot.total_spots = total;
            lot.available_spots = total - active;
        }
        update.apply_details(&mut lot);

        let lot = sqlx::query_as::<_, ParkingLot>(&format!(
            "UPDATE parking_lots SET name = $2, address = $3, description = $4, latitude = $5, \
             longitude = $6, total_spots = $7, available_spots = $8, hourly_price = $9, \
             bank_id = $10, bank_account = $11, image_urls = $12, updated_at = $13 \
             WHERE id = $1 RETURNING {LOT_COLUMNS}"
        ))
        .bind(lot_id)
        .bind(&lot.name)
        .bind(&lot.address)
        .bind(&lot.description)
        .bind(lot.location.latitude)
        .bind(lot.location.longitude)
        .bind(lot.total_spots)
        .bind(lot.available_spots)
        .bind(lot.hourly_price)
        .bind(&lot.bank_id)
        .bind(&lot.bank_account)
        .bind(&lot.image_urls)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(lot)
    }

    async fn set_lot_status(
        &self,
        lot_id: Uuid,
        status: LotStatus,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError> {
        sqlx::query_as::<_, ParkingLot>(&format!(
            "UPDATE parking_lots SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {LOT_COLUMNS}"
        ))
        .bind(lot_id)
        .bind(status)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(EngineError::LotNotFound(lot_id))
    }

    async fn delete_lot(&self, lot_id: Uuid) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;
        let lot = lock_lot(&mut *tx, lot_id).await?;
        if !lot.active_vehicles.is_empty() || !lot.staff_ids.is_empty() {
            return Err(EngineError::LotInUse {
                active_vehicles: lot.active_vehicles.len(),
                staff: lot.staff_ids.len(),
            });
        }
        sqlx::query("DELETE FROM parking_lots WHERE id = $1")
            .bind(lot_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn assign_staff(
        &self,
        lot_id: Uuid,
        staff_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError> {
        let mut tx = self.pool.begin().await?;
        lock_lot(&mut *tx, lot_id).await?;

        let elsewhere = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM parking_lots WHERE $1 = ANY(staff_ids) AND id <> $2 LIMIT 1",
        )
        .bind(staff_id)
        .bind(lot_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(other) = elsewhere {
            return Err(EngineError::StaffAlreadyAssigned {
                staff_id: staff_id.to_string(),
                lot_id: other,
            });
        }

        let lot = sqlx::query_as::<_, ParkingLot>(&format!(
            "UPDATE parking_lots SET \
             staff_ids = CASE WHEN $2 = ANY(staff_ids) THEN staff_ids ELSE array_append(staff_ids, $2) END, \
             updated_at = $3 WHERE id = $1 RETURNING {LOT_COLUMNS}"
        ))
        .bind(lot_id)
        .bind(staff_id)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(lot)
    }

    async fn remove_staff(
        &self,
        lot_id: Uuid,
        staff_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError> {
        sqlx::query_as::<_, ParkingLot>(&format!(
            "UPDATE parking_lots SET staff_ids = array_remove(staff_ids, $2), updated_at = $3 \
             WHERE id = $1 RETURNING {LOT_COLUMNS}"
        ))
        .bind(lot_id)
        .bind(staff_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(EngineError::LotNotFound(lot_id))
    }

    async fn lot_for_staff(&self, staff_id: &str) -> Result<Option<ParkingLot>, EngineError> {
        let lot = sqlx::query_as::<_, ParkingLot>(&format!(
            "SELECT {LOT_COLUMNS} FROM parking_lots WHERE $1 = ANY(staff_ids) LIMIT 1"
        ))
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lot)
    }

    async fn open_ticket(&self, new: &NewTicket) -> Result<(Ticket, ParkingLot), EngineError> {
        let mut tx = self.pool.begin().await?;
        let lot = lock_lot(&mut *tx, new.lot_id).await?;
        if lot.available_spots <= 0 {
            return Err(EngineError::LotFull(new.lot_id));
        }

        let duplicate = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM tickets \
             WHERE lot_id = $1 AND license_plate = $2 AND status = 'active')",
        )
        .bind(new.lot_id)
        .bind(&new.license_plate)
        .fetch_one(&mut *tx)
        .await?;
        if duplicate {
            return Err(EngineError::DuplicateActiveTicket {
                lot_id: new.lot_id,
                plate: new.license_plate.clone(),
            });
        }

        let inserted = sqlx::query_as::<_, Ticket>(&format!(
            "INSERT INTO tickets (id, lot_id, license_plate, entry_time, status, hourly_price, \
             total_amount, created_by, customer_id) \
             VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8) RETURNING {TICKET_COLUMNS}"
        ))
        .bind(new.id)
        .bind(new.lot_id)
        .bind(&new.license_plate)
        .bind(new.entry_time)
        .bind(lot.hourly_price)
        .bind(fee::initial_amount(lot.hourly_price))
        .bind(&new.created_by)
        .bind(&new.customer_id)
        .fetch_one(&mut *tx)
        .await;

        let ticket = match inserted {
            Ok(ticket) => ticket,
            Err(sqlx::Error::Database(db)) if db.constraint() == Some(ONE_ACTIVE_PER_PLATE) => {
                return Err(EngineError::DuplicateActiveTicket {
                    lot_id: new.lot_id,
                    plate: new.license_plate.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let lot = sqlx::query_as::<_, ParkingLot>(&format!(
            "UPDATE parking_lots SET available_spots = available_spots - 1, \
             active_vehicles = CASE WHEN $2 = ANY(active_vehicles) THEN active_vehicles \
             ELSE array_append(active_vehicles, $2) END, updated_at = $3 \
             WHERE id = $1 RETURNING {LOT_COLUMNS}"
        ))
        .bind(new.lot_id)
        .bind(&new.license_plate)
        .bind(new.entry_time)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((ticket, lot))
    }

    async fn close_ticket(
        &self,
        lot_id: Uuid,
        ticket_id: Uuid,
        exit_time: DateTime<Utc>,
    ) -> Result<(Ticket, ParkingLot), EngineError> {
        let mut tx = self.pool.begin().await?;
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 AND lot_id = $2 FOR UPDATE"
        ))
        .bind(ticket_id)
        .bind(lot_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::TicketNotFound(ticket_id))?;

        if ticket.status != TicketStatus::Active {
            return Err(EngineError::AlreadyClosed(ticket_id));
        }
        if ticket.entry_time > exit_time {
            return Err(EngineError::InvalidTicketState {
                ticket_id,
                reason: "entry time is after exit time".to_string(),
            });
        }
        let total = fee::final_amount(ticket.entry_time, exit_time, ticket.hourly_price)
            .map_err(|e| e.for_ticket(ticket_id))?;

        let closed = sqlx::query_as::<_, Ticket>(&format!(
            "UPDATE tickets SET status = 'completed', exit_time = $2, total_amount = $3 \
             WHERE id = $1 RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket_id)
        .bind(exit_time)
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;

        let lot = sqlx::query_as::<_, ParkingLot>(&format!(
            "UPDATE parking_lots SET available_spots = LEAST(available_spots + 1, total_spots), \
             active_vehicles = array_remove(active_vehicles, $2), updated_at = $3 \
             WHERE id = $1 RETURNING {LOT_COLUMNS}"
        ))
        .bind(lot_id)
        .bind(&closed.license_plate)
        .bind(exit_time)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::LotNotFound(lot_id))?;

        tx.commit().await?;
        Ok((closed, lot))
    }

    async fn get_ticket(&self, lot_id: Uuid, ticket_id: Uuid) -> Result<Option<Ticket>, EngineError> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 AND lot_id = $2"
        ))
        .bind(ticket_id)
        .bind(lot_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn list_tickets(
        &self,
        lot_id: Uuid,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, EngineError> {
        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE lot_id = $1 AND ($2::ticket_status IS NULL OR status = $2) \
             ORDER BY entry_time DESC"
        ))
        .bind(lot_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn tickets_for_plate(&self, plate: &str) -> Result<Vec<Ticket>, EngineError> {
        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE license_plate = $1 ORDER BY entry_time DESC"
        ))
        .bind(plate)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn reconcile_lot(
        &self,
        lot_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(ParkingLot, ParkingLot), EngineError> {
        let mut tx = self.pool.begin().await?;
        let before = lock_lot(&mut *tx, lot_id).await?;
        let plates = active_plates(&mut *tx, lot_id).await?;

        let expected = (before.total_spots - plates.len() as i32).max(0);
        let mut recorded = before.active_vehicles.clone();
        recorded.sort();
        if before.available_spots == expected && recorded == plates {
            tx.commit().await?;
            return Ok((before.clone(), before));
        }

        let after = sqlx::query_as::<_, ParkingLot>(&format!(
            "UPDATE parking_lots SET available_spots = $2, active_vehicles = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {LOT_COLUMNS}"
        ))
        .bind(lot_id)
        .bind(expected)
        .bind(&plates)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((before, after))
    }
}
