use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Parking lot '{0}' was not found")]
    LotNotFound(Uuid),

    #[error("Ticket '{0}' was not found")]
    TicketNotFound(Uuid),

    #[error("Parking lot '{0}' has no available spots")]
    LotFull(Uuid),

    #[error("Vehicle {plate} already has an active ticket in this lot")]
    DuplicateActiveTicket { lot_id: Uuid, plate: String },

    #[error("Ticket '{0}' is already closed")]
    AlreadyClosed(Uuid),

    #[error("Ticket '{ticket_id}' is in an invalid state: {reason}")]
    InvalidTicketState { ticket_id: Uuid, reason: String },

    #[error("Parking lot still has {active_vehicles} parked vehicle(s) and {staff} assigned staff")]
    LotInUse { active_vehicles: usize, staff: usize },

    #[error("Total spots {requested} is below the {active} vehicle(s) currently parked")]
    CapacityBelowOccupancy { requested: i32, active: i32 },

    #[error("Staff '{staff_id}' is already assigned to parking lot '{lot_id}'")]
    StaffAlreadyAssigned { staff_id: String, lot_id: Uuid },

    #[error("Store unavailable after {attempts} attempt(s): {message}")]
    Transient { attempts: usize, message: String },

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    /// Failures worth retrying: connectivity, pool exhaustion and
    /// serialization conflicts. Everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Transient { .. } => true,
            EngineError::Database(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => matches!(
                    db.code().as_deref(),
                    Some("40001") | Some("40P01") | Some("57P01")
                ),
                _ => false,
            },
            _ => false,
        }
    }
}
