use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::engine::fee::FeeEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub lot_id: Uuid,
    pub license_plate: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub status: TicketStatus,
    /// Lot price copied at entry; later lot price edits never reach it.
    pub hourly_price: Decimal,
    pub total_amount: Decimal,
    pub created_by: String,
    pub customer_id: Option<String>,
}

impl Ticket {
    pub fn is_active(&self) -> bool {
        self.status == TicketStatus::Active
    }
}

/// Everything the store needs to open a ticket. Price and amount are taken
/// from the lot inside the same transaction.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub id: Uuid,
    pub lot_id: Uuid,
    pub license_plate: String,
    pub entry_time: DateTime<Utc>,
    pub created_by: String,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenTicketRequest {
    pub license_plate: String,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketQuery {
    pub status: Option<TicketStatus>,
    pub plate: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketEstimate {
    pub ticket: Ticket,
    #[serde(flatten)]
    pub estimate: FeeEstimate,
    pub payment_qr_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveParking {
    pub lot_name: String,
    pub lot_address: String,
    pub ticket: Ticket,
    #[serde(flatten)]
    pub estimate: FeeEstimate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParkingHistoryEntry {
    pub lot_name: Option<String>,
    pub ticket: Ticket,
    pub duration: String,
}

/// A customer's view of one plate across every lot.
#[derive(Debug, Clone, Serialize)]
pub struct PlateStatus {
    pub license_plate: String,
    pub active: Option<ActiveParking>,
    pub history: Vec<ParkingHistoryEntry>,
}
