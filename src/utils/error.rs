use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::engine::error::EngineError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Ticket(#[from] EngineError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Ticket(e) => match e {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
                EngineError::LotNotFound(_) | EngineError::TicketNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                EngineError::LotFull(_)
                | EngineError::DuplicateActiveTicket { .. }
                | EngineError::AlreadyClosed(_)
                | EngineError::LotInUse { .. }
                | EngineError::CapacityBelowOccupancy { .. }
                | EngineError::StaffAlreadyAssigned { .. } => StatusCode::CONFLICT,
                EngineError::InvalidTicketState { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Ticket(e) => match e {
                EngineError::Validation(_) => "VALIDATION_ERROR",
                EngineError::Forbidden(_) => "FORBIDDEN",
                EngineError::LotNotFound(_) | EngineError::TicketNotFound(_) => "NOT_FOUND",
                EngineError::LotFull(_) => "LOT_FULL",
                EngineError::DuplicateActiveTicket { .. } => "DUPLICATE_ACTIVE_TICKET",
                EngineError::AlreadyClosed(_) => "ALREADY_CLOSED",
                EngineError::InvalidTicketState { .. } => "INVALID_TICKET_STATE",
                EngineError::LotInUse { .. } => "LOT_IN_USE",
                EngineError::CapacityBelowOccupancy { .. } => "CAPACITY_BELOW_OCCUPANCY",
                EngineError::StaffAlreadyAssigned { .. } => "STAFF_ALREADY_ASSIGNED",
                EngineError::Transient { .. } => "STORE_UNAVAILABLE",
                EngineError::Database(_) => "DATABASE_ERROR",
            },
        }
    }

    fn log(&self) {
        match self {
            AppError::Ticket(EngineError::Database(e)) => {
                error!(error = ?e, "Database error");
            }
            AppError::Ticket(e @ EngineError::InvalidTicketState { .. })
            | AppError::Ticket(e @ EngineError::Transient { .. }) => {
                error!(error = %e, code = self.code(), "Ticket operation failed");
            }
            other => {
                warn!(error = %other, code = other.code(), "Request rejected");
            }
        }
    }

    /// Structured context for conflicts a client can act on.
    fn details(&self) -> Option<Value> {
        match self {
            AppError::Ticket(EngineError::DuplicateActiveTicket { lot_id, plate }) => {
                Some(json!({ "lot_id": lot_id, "license_plate": plate }))
            }
            AppError::Ticket(EngineError::LotFull(lot_id)) => Some(json!({ "lot_id": lot_id })),
            AppError::Ticket(EngineError::LotInUse {
                active_vehicles,
                staff,
            }) => Some(json!({ "active_vehicles": active_vehicles, "staff": staff })),
            AppError::Ticket(EngineError::CapacityBelowOccupancy { requested, active }) => {
                Some(json!({ "requested": requested, "active": active }))
            }
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::Ticket(EngineError::Database(_)) => {
                "A database error occurred".to_string()
            }
            AppError::Ticket(EngineError::Transient { .. }) => {
                "The parking service is temporarily unavailable, please try again".to_string()
            }
            AppError::Ticket(e) => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        error_response(code, self.public_message(), self.details(), status)
    }
}
