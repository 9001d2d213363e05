use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::error::EngineError;
use crate::models::{LotStatus, LotUpdate, NewTicket, ParkingLot, Ticket, TicketStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence behind the ticket engine.
///
/// Every method is one logical transaction: either all of its writes become
/// visible or none do. Implementations must enforce the occupancy rules
/// themselves (full lot, one active ticket per plate, delete guard) inside
/// that transaction rather than trusting an earlier read by the caller.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert_lot(&self, lot: &ParkingLot) -> Result<(), EngineError>;

    async fn get_lot(&self, lot_id: Uuid) -> Result<Option<ParkingLot>, EngineError>;

    async fn list_lots(&self, owner_id: Option<&str>) -> Result<Vec<ParkingLot>, EngineError>;

    /// Applies `update`. A new total recomputes the available count from the
    /// active tickets and fails with `CapacityBelowOccupancy` when too small.
    async fn update_lot(
        &self,
        lot_id: Uuid,
        update: &LotUpdate,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError>;

    async fn set_lot_status(
        &self,
        lot_id: Uuid,
        status: LotStatus,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError>;

    /// Deletes a lot that has neither parked vehicles nor assigned staff.
    async fn delete_lot(&self, lot_id: Uuid) -> Result<(), EngineError>;

    async fn assign_staff(
        &self,
        lot_id: Uuid,
        staff_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError>;

    async fn remove_staff(
        &self,
        lot_id: Uuid,
        staff_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ParkingLot, EngineError>;

    async fn lot_for_staff(&self, staff_id: &str) -> Result<Option<ParkingLot>, EngineError>;

    /// Inserts an active ticket priced from the lot, takes one spot and adds
    /// the plate to the lot's active set.
    async fn open_ticket(&self, ticket: &NewTicket) -> Result<(Ticket, ParkingLot), EngineError>;

    /// Completes an active ticket at `exit_time`, bills it, frees its spot
    /// and removes the plate from the lot's active set.
    async fn close_ticket(
        &self,
        lot_id: Uuid,
        ticket_id: Uuid,
        exit_time: DateTime<Utc>,
    ) -> Result<(Ticket, ParkingLot), EngineError>;

    async fn get_ticket(&self, lot_id: Uuid, ticket_id: Uuid) -> Result<Option<Ticket>, EngineError>;

    /// Tickets of a lot, newest entry first.
    async fn list_tickets(
        &self,
        lot_id: Uuid,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, EngineError>;

    /// Tickets of a plate across all lots, newest entry first.
    async fn tickets_for_plate(&self, plate: &str) -> Result<Vec<Ticket>, EngineError>;

    /// Recomputes the lot's available count and active set from its active
    /// tickets, inside one transaction. Returns the lot as recorded before
    /// the pass and as stored after it; they are equal when nothing drifted.
    async fn reconcile_lot(
        &self,
        lot_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(ParkingLot, ParkingLot), EngineError>;
}
