//! Ticket lifecycle: opening tickets against a lot's capacity, live fee
//! estimates, checkout billing and counter reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    ActiveParking, GeoPoint, LotStatus, LotUpdate, NearbyLot, NewParkingLot, NewTicket,
    Occupancy, ParkingHistoryEntry, ParkingLot, PlateStatus, Ticket, TicketEstimate, TicketQuery,
};
use crate::store::TicketStore;

pub mod clock;
pub mod error;
pub mod fee;
pub mod geo;
pub mod payment;
pub mod plate;
pub mod reconcile;
pub mod retry;


use clock::Clock;
use error::EngineError;
use plate::normalize_plate;
use retry::RetryPolicy;

/// Outcome of reconciling one lot. `drifted` means the recorded counter or
/// active set disagreed with the active tickets and has been overwritten.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub lot_id: Uuid,
    pub recorded_available: i32,
    pub expected_available: i32,
    pub recorded_active_vehicles: Vec<String>,
    pub active_vehicles: Vec<String>,
    pub drifted: bool,
}

pub struct TicketEngine {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl TicketEngine {
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }

    // ---- Lots ----

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn register_lot(
        &self,
        owner_id: &str,
        new: NewParkingLot,
    ) -> Result<ParkingLot, EngineError> {
        require_text("name", &new.name)?;
        require_text("address", &new.address)?;
        validate_capacity(new.total_spots)?;
        validate_price(new.hourly_price)?;
        validate_location(new.location)?;

        let now = self.clock.now();
        let lot = ParkingLot {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            address: new.address.trim().to_string(),
            description: new.description,
            location: new.location,
            total_spots: new.total_spots,
            available_spots: new.total_spots,
            hourly_price: new.hourly_price,
            owner_id: owner_id.to_string(),
            active_vehicles: Vec::new(),
            staff_ids: Vec::new(),
            bank_id: new.bank_id.map(|b| b.trim().to_lowercase()),
            bank_account: new.bank_account.map(|a| a.trim().to_string()),
            image_urls: new.image_urls,
            status: LotStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.retry
            .run("insert_lot", || self.store.insert_lot(&lot))
            .await?;
        info!(lot_id = %lot.id, owner_id, "Parking lot registered");
        Ok(lot)
    }

    pub async fn get_lot(&self, lot_id: Uuid) -> Result<ParkingLot, EngineError> {
        self.retry
            .run("get_lot", || self.store.get_lot(lot_id))
            .await?
            .ok_or(EngineError::LotNotFound(lot_id))
    }

    pub async fn list_lots(&self, owner_id: Option<&str>) -> Result<Vec<ParkingLot>, EngineError> {
        self.retry
            .run("list_lots", || self.store.list_lots(owner_id))
            .await
    }

    pub async fn nearest_lots(
        &self,
        origin: GeoPoint,
        limit: Option<usize>,
    ) -> Result<Vec<NearbyLot>, EngineError> {
        validate_location(origin)?;
        let limit = limit
            .unwrap_or(geo::DEFAULT_NEARBY_LIMIT)
            .clamp(1, geo::MAX_NEARBY_LIMIT);
        let lots = self.list_lots(None).await?;
        Ok(geo::nearest(origin, lots, limit))
    }

    #[instrument(skip(self, update))]
    pub async fn update_lot(
        &self,
        lot_id: Uuid,
        actor: &str,
        mut update: LotUpdate,
    ) -> Result<ParkingLot, EngineError> {
        self.owned_lot(lot_id, actor).await?;
        if let Some(name) = &update.name {
            require_text("name", name)?;
        }
        if let Some(address) = &update.address {
            require_text("address", address)?;
        }
        if let Some(total) = update.total_spots {
            validate_capacity(total)?;
        }
        if let Some(price) = update.hourly_price {
            validate_price(price)?;
        }
        if let Some(location) = update.location {
            validate_location(location)?;
        }
        update.name = update.name.map(|n| n.trim().to_string());
        update.address = update.address.map(|a| a.trim().to_string());
        update.bank_id = update.bank_id.map(|b| b.trim().to_lowercase());
        update.bank_account = update.bank_account.map(|a| a.trim().to_string());

        let now = self.clock.now();
        let lot = self
            .retry
            .run("update_lot", || self.store.update_lot(lot_id, &update, now))
            .await?;
        info!(lot_id = %lot.id, "Parking lot updated");
        Ok(lot)
    }

    pub async fn set_lot_status(
        &self,
        lot_id: Uuid,
        status: LotStatus,
    ) -> Result<ParkingLot, EngineError> {
        let now = self.clock.now();
        let lot = self
            .retry
            .run("set_lot_status", || {
                self.store.set_lot_status(lot_id, status, now)
            })
            .await?;
        info!(lot_id = %lot_id, ?status, "Parking lot status changed");
        Ok(lot)
    }

    #[instrument(skip(self))]
    pub async fn delete_lot(&self, lot_id: Uuid, actor: &str) -> Result<(), EngineError> {
        self.owned_lot(lot_id, actor).await?;
        self.retry
            .run("delete_lot", || self.store.delete_lot(lot_id))
            .await?;
        info!(lot_id = %lot_id, "Parking lot deleted");
        Ok(())
    }

    // ---- Staff ----

    pub async fn assign_staff(
        &self,
        lot_id: Uuid,
        actor: &str,
        staff_id: &str,
    ) -> Result<ParkingLot, EngineError> {
        require_text("staff_id", staff_id)?;
        self.owned_lot(lot_id, actor).await?;
        let staff_id = staff_id.trim();
        let now = self.clock.now();
        let lot = self
            .retry
            .run("assign_staff", || self.store.assign_staff(lot_id, staff_id, now))
            .await?;
        info!(lot_id = %lot_id, staff_id, "Staff assigned");
        Ok(lot)
    }

    pub async fn remove_staff(
        &self,
        lot_id: Uuid,
        actor: &str,
        staff_id: &str,
    ) -> Result<ParkingLot, EngineError> {
        self.owned_lot(lot_id, actor).await?;
        let now = self.clock.now();
        let lot = self
            .retry
            .run("remove_staff", || self.store.remove_staff(lot_id, staff_id, now))
            .await?;
        info!(lot_id = %lot_id, staff_id, "Staff removed");
        Ok(lot)
    }

    pub async fn lot_for_staff(&self, staff_id: &str) -> Result<Option<ParkingLot>, EngineError> {
        self.retry
            .run("lot_for_staff", || self.store.lot_for_staff(staff_id))
            .await
    }

    // ---- Tickets ----

    /// Opens an active ticket for `plate`. The lot's price is snapshotted on
    /// the ticket and one spot is taken in the same store transaction.
    #[instrument(skip(self, customer_id))]
    pub async fn open_ticket(
        &self,
        lot_id: Uuid,
        plate: &str,
        creator: &str,
        customer_id: Option<String>,
    ) -> Result<Ticket, EngineError> {
        let plate = normalize_plate(plate)?;
        let lot = self.get_lot(lot_id).await?;
        if !lot.is_staffed_by(creator) {
            return Err(EngineError::Forbidden(
                "Only the lot owner or its staff can open tickets".to_string(),
            ));
        }

        let new = NewTicket {
            id: Uuid::new_v4(),
            lot_id,
            license_plate: plate,
            entry_time: self.clock.now(),
            created_by: creator.to_string(),
            customer_id: customer_id
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
        };

        let (ticket, lot) = self
            .retry
            .run("open_ticket", || self.store.open_ticket(&new))
            .await?;
        info!(
            lot_id = %lot_id,
            ticket_id = %ticket.id,
            plate = %ticket.license_plate,
            available_spots = lot.available_spots,
            "Ticket opened"
        );
        Ok(ticket)
    }

    pub async fn get_ticket(&self, lot_id: Uuid, ticket_id: Uuid) -> Result<Ticket, EngineError> {
        self.retry
            .run("get_ticket", || self.store.get_ticket(lot_id, ticket_id))
            .await?
            .ok_or(EngineError::TicketNotFound(ticket_id))
    }

    /// Live duration and fee for a ticket. Read-only; completed tickets
    /// report their final figures.
    pub async fn estimate(&self, lot_id: Uuid, ticket_id: Uuid) -> Result<TicketEstimate, EngineError> {
        let lot = self.get_lot(lot_id).await?;
        let ticket = self.get_ticket(lot_id, ticket_id).await?;
        let until = ticket.exit_time.unwrap_or_else(|| self.clock.now());
        let estimate = fee::estimate(ticket.entry_time, until, ticket.hourly_price)
            .map_err(|e| e.for_ticket(ticket.id))?;

        let payment_qr_url = match (&lot.bank_id, &lot.bank_account) {
            (Some(bank), Some(account)) => Some(payment::vietqr_url(
                bank,
                account,
                estimate.estimated_fee,
                &ticket.license_plate,
            )),
            _ => None,
        };

        Ok(TicketEstimate {
            ticket,
            estimate,
            payment_qr_url,
        })
    }

    /// Closes an active ticket at the current server time and frees its spot.
    #[instrument(skip(self))]
    pub async fn checkout(
        &self,
        lot_id: Uuid,
        ticket_id: Uuid,
        actor: &str,
    ) -> Result<Ticket, EngineError> {
        let lot = self.get_lot(lot_id).await?;
        if !lot.is_staffed_by(actor) {
            return Err(EngineError::Forbidden(
                "Only the lot owner or its staff can check vehicles out".to_string(),
            ));
        }

        let exit_time = self.clock.now();
        let result = self
            .retry
            .run("close_ticket", || {
                self.store.close_ticket(lot_id, ticket_id, exit_time)
            })
            .await;

        match result {
            Ok((ticket, lot)) => {
                info!(
                    lot_id = %lot_id,
                    ticket_id = %ticket_id,
                    plate = %ticket.license_plate,
                    total_amount = %ticket.total_amount,
                    available_spots = lot.available_spots,
                    "Ticket closed"
                );
                Ok(ticket)
            }
            Err(err @ EngineError::InvalidTicketState { .. }) => {
                warn!(lot_id = %lot_id, ticket_id = %ticket_id, error = %err, "Ticket cannot be closed");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn occupancy(&self, lot_id: Uuid) -> Result<Occupancy, EngineError> {
        Ok(Occupancy::from(&self.get_lot(lot_id).await?))
    }

    /// Tickets of a lot, newest first, optionally filtered by status and a
    /// case-insensitive plate fragment.
    pub async fn list_tickets(
        &self,
        lot_id: Uuid,
        query: &TicketQuery,
    ) -> Result<Vec<Ticket>, EngineError> {
        let mut tickets = self
            .retry
            .run("list_tickets", || self.store.list_tickets(lot_id, query.status))
            .await?;
        if let Some(fragment) = query.plate.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            let fragment = fragment.to_uppercase();
            tickets.retain(|t| t.license_plate.contains(&fragment));
        }
        Ok(tickets)
    }

    /// Where a plate is parked right now, if anywhere, and its past stays.
    pub async fn plate_status(&self, plate: &str) -> Result<PlateStatus, EngineError> {
        let plate = normalize_plate(plate)?;
        let tickets = self
            .retry
            .run("tickets_for_plate", || self.store.tickets_for_plate(&plate))
            .await?;
        let now = self.clock.now();

        let mut lots: HashMap<Uuid, Option<ParkingLot>> = HashMap::new();
        let mut active = None;
        let mut history = Vec::new();
        for ticket in tickets {
            if !lots.contains_key(&ticket.lot_id) {
                let fetched = self
                    .retry
                    .run("get_lot", || self.store.get_lot(ticket.lot_id))
                    .await?;
                lots.insert(ticket.lot_id, fetched);
            }
            let lot = lots.get(&ticket.lot_id).and_then(Option::as_ref);
            if ticket.is_active() {
                if active.is_some() {
                    continue;
                }
                let estimate = fee::estimate(ticket.entry_time, now, ticket.hourly_price)
                    .map_err(|e| e.for_ticket(ticket.id))?;
                let (lot_name, lot_address) = lot
                    .map(|l| (l.name.clone(), l.address.clone()))
                    .unwrap_or_default();
                active = Some(ActiveParking {
                    lot_name,
                    lot_address,
                    ticket,
                    estimate,
                });
            } else {
                let exit = ticket.exit_time.unwrap_or(ticket.entry_time);
                let elapsed = (exit - ticket.entry_time).num_minutes().max(0);
                history.push(ParkingHistoryEntry {
                    lot_name: lot.map(|l| l.name.clone()),
                    duration: fee::format_duration(elapsed),
                    ticket,
                });
            }
        }

        Ok(PlateStatus {
            license_plate: plate,
            active,
            history,
        })
    }

    // ---- Reconciliation ----

    /// On-demand reconciliation, limited to the lot's owner.
    pub async fn reconcile_owned_lot(
        &self,
        lot_id: Uuid,
        actor: &str,
    ) -> Result<ReconciliationReport, EngineError> {
        self.owned_lot(lot_id, actor).await?;
        self.reconcile_lot(lot_id).await
    }

    pub async fn reconcile_lot(&self, lot_id: Uuid) -> Result<ReconciliationReport, EngineError> {
        let now = self.clock.now();
        let (before, after) = self
            .retry
            .run("reconcile_lot", || self.store.reconcile_lot(lot_id, now))
            .await?;

        let drifted = before.available_spots != after.available_spots
            || before.active_vehicles != after.active_vehicles;
        if drifted {
            warn!(
                lot_id = %lot_id,
                recorded_available = before.available_spots,
                expected_available = after.available_spots,
                recorded_active = before.active_vehicles.len(),
                expected_active = after.active_vehicles.len(),
                "Reconciliation drift corrected"
            );
        }

        Ok(ReconciliationReport {
            lot_id,
            recorded_available: before.available_spots,
            expected_available: after.available_spots,
            recorded_active_vehicles: before.active_vehicles,
            active_vehicles: after.active_vehicles,
            drifted,
        })
    }

    /// Reconciles every lot. A failure on one lot is logged and does not
    /// stop the pass; the first failure is returned after all lots ran.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconciliationReport>, EngineError> {
        let lots = self.list_lots(None).await?;
        let mut reports = Vec::with_capacity(lots.len());
        let mut first_error = None;
        for lot in lots {
            match self.reconcile_lot(lot.id).await {
                Ok(report) => reports.push(report),
                Err(EngineError::LotNotFound(_)) => {}
                Err(err) => {
                    warn!(lot_id = %lot.id, error = %err, "Reconciliation failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }

    async fn owned_lot(&self, lot_id: Uuid, actor: &str) -> Result<ParkingLot, EngineError> {
        let lot = self.get_lot(lot_id).await?;
        if lot.owner_id != actor {
            return Err(EngineError::Forbidden(
                "Only the lot owner can manage this parking lot".to_string(),
            ));
        }
        Ok(lot)
    }
}

fn require_text(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_capacity(total_spots: i32) -> Result<(), EngineError> {
    if total_spots < 0 {
        return Err(EngineError::Validation(
            "total_spots must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Highest accepted hourly price, in whole VND.
pub const MAX_HOURLY_PRICE: i64 = 100_000_000;

fn validate_price(price: Decimal) -> Result<(), EngineError> {
    if price.is_sign_negative() || !price.fract().is_zero() {
        return Err(EngineError::Validation(
            "hourly_price must be a non-negative whole amount".to_string(),
        ));
    }
    if price > Decimal::from(MAX_HOURLY_PRICE) {
        return Err(EngineError::Validation(format!(
            "hourly_price must not exceed {MAX_HOURLY_PRICE}"
        )));
    }
    Ok(())
}

fn validate_location(point: GeoPoint) -> Result<(), EngineError> {
    if !(-90.0..=90.0).contains(&point.latitude) || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(EngineError::Validation(
            "location is outside valid coordinates".to_string(),
        ));
    }
    Ok(())
}
