use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::TicketStore;
use crate::engine::error::EngineError;
use crate::engine::fee;
use crate::models::{LotStatus, LotUpdate, NewTicket, ParkingLot, Ticket, TicketStatus};

#[derive(Debug, Default)]
struct Tables {
    lots: HashMap<Uuid, ParkingLot>,
    tickets: HashMap<Uuid, Ticket>,
}

impl Tables {
    fn lot_mut(&mut self, lot_id: Uuid) -> Result<&mut ParkingLot, EngineError> {
        self.lots
            .get_mut(&lot_id)
            .ok_or(EngineError::LotNotFound(lot_id))
    }

    fn active_plates(&self, lot_id: Uuid) -> Vec<String> {
        let mut plates: Vec<String> = self
            .tickets
            .values()
            .filter(|t| t.lot_id == lot_id && t.is_active())
            .map(|t| t.license_plate.clone())
            .collect();
        plates.sort();
        plates
    }
}

/// In-process store. Each operation runs under a single write guard, which
/// makes every check-then-write sequence atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a lot's counter and active set without touching tickets.
    #[cfg(test)]
    pub(crate) async fn corrupt_lot(&self, lot_id: Uuid, available: i32, active: Vec<String>) {
        let mut tables = self.tables.write().await;
        if let Some(lot) = tables.lots.get_mut(&lot_id) {
            lot.available_spots = available;
            lot.active_vehicles = active;
        }
    }
}

fn newest_first(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| b.entry_time.cmp(&a.entry_time));
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_lot(&self, lot: &ParkingLot) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        if tables.lots.contains_key(&lot.id) {
            return Err(EngineError::Validation(format!(
                "Parking lot '{}' already exists",
                lot.id
            )));
        }
        tables.lots.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn get_lot(&self, lot_id: Uuid) -> Result<Option<ParkingLot>, EngineError> {
        Ok(self.tables.read().await.lots.get(&lot_id).cloned())
    }

    async fn list_lots(&self, owner_id: Option<&str>) -> Result<Vec<ParkingLot>, EngineError> {
        let tables = self.tables.read().await;
        let mut lots: Vec<ParkingLot> = tables
            .lots
            .values()
            .filter(|lot| owner_id.map_or(true, |owner| lot.owner_id == owner))
            .cloned()
            .collect();
        lots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(lots)
    }

    async fn update_lot(
        &self,
        lot_id: Uuid,
        update: &LotUpdate,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError> {
        let mut tables = self.tables.write().await;
        let active = tables.active_plates(lot_id).len() as i32;
        let lot = tables.lot_mut(lot_id)?;

        if let Some(total) = update.total_spots {
            if total < active {
                return Err(EngineError::CapacityBelowOccupancy {
                    requested: total,
                    active,
                });
            }
            lot.total_spots = total;
            lot.available_spots = total - active;
        }
        update.apply_details(lot);
        lot.updated_at = at;
        Ok(lot.clone())
    }

    async fn set_lot_status(
        &self,
        lot_id: Uuid,
        status: LotStatus,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError> {
        let mut tables = self.tables.write().await;
        let lot = tables.lot_mut(lot_id)?;
        lot.status = status;
        lot.updated_at = at;
        Ok(lot.clone())
    }

    async fn delete_lot(&self, lot_id: Uuid) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        let lot = tables.lot_mut(lot_id)?;
        if !lot.active_vehicles.is_empty() || !lot.staff_ids.is_empty() {
            return Err(EngineError::LotInUse {
                active_vehicles: lot.active_vehicles.len(),
                staff: lot.staff_ids.len(),
            });
        }
        tables.lots.remove(&lot_id);
        Ok(())
    }

    async fn assign_staff(
        &self,
        lot_id: Uuid,
        staff_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError> {
        let mut tables = self.tables.write().await;
        if let Some(other) = tables
            .lots
            .values()
            .find(|lot| lot.id != lot_id && lot.staff_ids.iter().any(|s| s == staff_id))
        {
            return Err(EngineError::StaffAlreadyAssigned {
                staff_id: staff_id.to_string(),
                lot_id: other.id,
            });
        }
        let lot = tables.lot_mut(lot_id)?;
        if !lot.staff_ids.iter().any(|s| s == staff_id) {
            lot.staff_ids.push(staff_id.to_string());
            lot.updated_at = at;
        }
        Ok(lot.clone())
    }

    async fn remove_staff(
        &self,
        lot_id: Uuid,
        staff_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError> {
        let mut tables = self.tables.write().await;
        let lot = tables.lot_mut(lot_id)?;
        let before = lot.staff_ids.len();
        lot.staff_ids.retain(|s| s != staff_id);
        if lot.staff_ids.len() != before {
            lot.updated_at = at;
        }
        Ok(lot.clone())
    }

    async fn lot_for_staff(&self, staff_id: &str) -> Result<Option<ParkingLot>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables
            .lots
            .values()
            .find(|lot| lot.staff_ids.iter().any(|s| s == staff_id))
            .cloned())
    }

    async fn open_ticket(&self, new: &NewTicket) -> Result<(Ticket, ParkingLot), EngineError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.tickets.values().any(|t| {
            t.lot_id == new.lot_id && t.is_active() && t.license_plate == new.license_plate
        });

        let lot = tables.lot_mut(new.lot_id)?;
        if lot.available_spots <= 0 {
            return Err(EngineError::LotFull(new.lot_id));
        }
        if duplicate {
            return Err(EngineError::DuplicateActiveTicket {
                lot_id: new.lot_id,
                plate: new.license_plate.clone(),
            });
        }

        let ticket = Ticket {
            id: new.id,
            lot_id: new.lot_id,
            license_plate: new.license_plate.clone(),
            entry_time: new.entry_time,
            exit_time: None,
            status: TicketStatus::Active,
            hourly_price: lot.hourly_price,
            total_amount: fee::initial_amount(lot.hourly_price),
            created_by: new.created_by.clone(),
            customer_id: new.customer_id.clone(),
        };

        lot.available_spots -= 1;
        if !lot.active_vehicles.contains(&new.license_plate) {
            lot.active_vehicles.push(new.license_plate.clone());
        }
        lot.updated_at = new.entry_time;
        let lot = lot.clone();

        tables.tickets.insert(ticket.id, ticket.clone());
        Ok((ticket, lot))
    }

    async fn close_ticket(
        &self,
        lot_id: Uuid,
        ticket_id: Uuid,
        exit_time: DateTime<Utc>,
    ) -> Result<(Ticket, ParkingLot), EngineError> {
        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .get(&ticket_id)
            .filter(|t| t.lot_id == lot_id)
            .cloned()
            .ok_or(EngineError::TicketNotFound(ticket_id))?;

        if !ticket.is_active() {
            return Err(EngineError::AlreadyClosed(ticket_id));
        }
        if ticket.entry_time > exit_time {
            return Err(EngineError::InvalidTicketState {
                ticket_id,
                reason: "entry time is after exit time".to_string(),
            });
        }

        let total_amount = fee::final_amount(ticket.entry_time, exit_time, ticket.hourly_price)
            .map_err(|e| e.for_ticket(ticket_id))?;

        let lot = tables.lot_mut(lot_id)?;
        lot.available_spots = (lot.available_spots + 1).min(lot.total_spots);
        lot.active_vehicles.retain(|p| p != &ticket.license_plate);
        lot.updated_at = exit_time;
        let lot = lot.clone();

        let closed = Ticket {
            exit_time: Some(exit_time),
            status: TicketStatus::Completed,
            total_amount,
            ..ticket
        };
        tables.tickets.insert(ticket_id, closed.clone());
        Ok((closed, lot))
    }

    async fn get_ticket(&self, lot_id: Uuid, ticket_id: Uuid) -> Result<Option<Ticket>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .get(&ticket_id)
            .filter(|t| t.lot_id == lot_id)
            .cloned())
    }

    async fn list_tickets(
        &self,
        lot_id: Uuid,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, EngineError> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.lot_id == lot_id && status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        newest_first(&mut tickets);
        Ok(tickets)
    }

    async fn tickets_for_plate(&self, plate: &str) -> Result<Vec<Ticket>, EngineError> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.license_plate == plate)
            .cloned()
            .collect();
        newest_first(&mut tickets);
        Ok(tickets)
    }

    async fn reconcile_lot(
        &self,
        lot_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(ParkingLot, ParkingLot), EngineError> {
        let mut tables = self.tables.write().await;
        let plates = tables.active_plates(lot_id);
        let lot = tables.lot_mut(lot_id)?;
        let before = lot.clone();

        let expected = (lot.total_spots - plates.len() as i32).max(0);
        let mut recorded = lot.active_vehicles.clone();
        recorded.sort();
        if lot.available_spots != expected || recorded != plates {
            lot.available_spots = expected;
            lot.active_vehicles = plates;
            lot.updated_at = at;
        }
        Ok((before, lot.clone()))
    }
}
